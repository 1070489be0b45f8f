//! Ambient light readings from iio-sensor-proxy.

use futures_util::StreamExt;
use zbus::names::InterfaceName;
use zbus::{fdo, zvariant};

const SERVICE: &str = "net.hadess.SensorProxy";
const PATH: &str = "/net/hadess/SensorProxy";

pub enum LightSensorToStrata {
    /// Ambient light level in lux.
    Reading(f64),
}

fn as_f64(value: &zvariant::Value<'_>) -> Option<f64> {
    match value {
        zvariant::Value::F64(v) => Some(*v),
        _ => None,
    }
}

fn as_str<'a>(value: &'a zvariant::Value<'_>) -> Option<&'a str> {
    match value {
        zvariant::Value::Str(s) => Some(s.as_str()),
        _ => None,
    }
}

pub fn start(
    to_strata: calloop::channel::Sender<LightSensorToStrata>,
) -> anyhow::Result<zbus::blocking::Connection> {
    let conn = zbus::blocking::Connection::system()?;

    let async_conn = conn.inner().clone();
    let future = async move {
        let proxy = match fdo::PropertiesProxy::new(&async_conn, SERVICE, PATH).await {
            Ok(x) => x,
            Err(err) => {
                warn!("error creating PropertiesProxy: {err:?}");
                return;
            }
        };

        let mut props_changed = match proxy.receive_properties_changed().await {
            Ok(x) => x,
            Err(err) => {
                warn!("error subscribing to PropertiesChanged: {err:?}");
                return;
            }
        };

        let claimed = async_conn
            .call_method(Some(SERVICE), PATH, Some(SERVICE), "ClaimLight", &())
            .await;
        if let Err(err) = claimed {
            debug!("error claiming the light sensor: {err:?}");
            return;
        }

        let interface = InterfaceName::from_static_str_unchecked(SERVICE);
        let props = match proxy.get_all(interface).await {
            Ok(x) => x,
            Err(err) => {
                warn!("error receiving initial light sensor properties: {err:?}");
                return;
            }
        };
        trace!("initial light sensor properties: {props:?}");

        let has_light = props
            .get("HasAmbientLight")
            .is_some_and(|v| matches!(&**v, zvariant::Value::Bool(true)));
        if !has_light {
            debug!("no ambient light sensor");
            return;
        }
        let unit = props.get("LightLevelUnit").and_then(|v| as_str(v)).unwrap_or("");
        if unit != "lux" {
            debug!("ignoring the light sensor, it reports in {unit:?}");
            return;
        }

        let mut level = props.get("LightLevel").and_then(|v| as_f64(v));
        if let Some(level) = level {
            if let Err(err) = to_strata.send(LightSensorToStrata::Reading(level)) {
                warn!("error sending message to strata: {err:?}");
                return;
            }
        }

        while let Some(changed) = props_changed.next().await {
            let args = match changed.args() {
                Ok(args) => args,
                Err(err) => {
                    warn!("error parsing light sensor PropertiesChanged args: {err:?}");
                    return;
                }
            };

            let Some(new) = args.changed_properties().get("LightLevel").and_then(as_f64) else {
                continue;
            };
            if level == Some(new) {
                continue;
            }
            level = Some(new);

            if let Err(err) = to_strata.send(LightSensorToStrata::Reading(new)) {
                warn!("error sending message to strata: {err:?}");
                return;
            }
        }
    };

    let task = conn
        .inner()
        .executor()
        .spawn(future, "monitor ambient light level");
    task.detach();

    Ok(conn)
}
