use zbus::blocking::Connection;

use crate::strata::State;

pub mod light_sensor;

use self::light_sensor::LightSensorToStrata;

#[derive(Default)]
pub struct DBusClients {
    pub conn_light_sensor: Option<Connection>,
}

impl DBusClients {
    pub fn start(state: &mut State) {
        let _span = tracy_client::span!("DBusClients::start");

        let strata = &mut state.strata;
        let mut dbus = Self::default();

        let (to_strata, from_light_sensor) = calloop::channel::channel();
        let source = strata
            .event_loop
            .insert_source(from_light_sensor, move |event, _, state| match event {
                calloop::channel::Event::Msg(LightSensorToStrata::Reading(lux)) => {
                    state.strata.on_light_level(lux)
                }
                calloop::channel::Event::Closed => (),
            });
        match source {
            Ok(_) => match light_sensor::start(to_strata) {
                Ok(conn) => dbus.conn_light_sensor = Some(conn),
                Err(err) => warn!("error starting the light sensor client: {err:?}"),
            },
            Err(err) => warn!("error inserting the light sensor channel: {err}"),
        }

        strata.dbus = Some(dbus);
    }
}
