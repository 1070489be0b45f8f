use std::cmp::min;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use calloop::EventLoop;
use calloop_wayland_source::WaylandSource;
use wayland_client::protocol::wl_compositor::WlCompositor;
use wayland_client::protocol::wl_keyboard::{self, WlKeyboard};
use wayland_client::protocol::wl_output::{self, WlOutput};
use wayland_client::protocol::wl_registry::{self, WlRegistry};
use wayland_client::protocol::wl_seat::WlSeat;
use wayland_client::protocol::wl_surface::WlSurface;
use wayland_client::{Connection, Dispatch, Proxy as _, QueueHandle};

use super::*;
use crate::display::{ClientId, Interfaces, ProtocolError};

/// Client talking to the compositor over a socket.
struct WireClient {
    event_loop: EventLoop<'static, WireState>,
    connection: Connection,
    qh: QueueHandle<WireState>,
    state: WireState,
}

#[derive(Default)]
struct WireState {
    compositor: Option<WlCompositor>,
    keyboard: Option<WlKeyboard>,
    output_modes: Vec<(i32, i32)>,
    keymap_size: Option<u32>,
    repeat_info: Option<(i32, i32)>,
}

impl WireClient {
    fn new(stream: UnixStream) -> Self {
        let event_loop = EventLoop::try_new().unwrap();
        let connection = Connection::from_socket(stream).unwrap();
        let queue = connection.new_event_queue();
        let qh = queue.handle();
        WaylandSource::new(connection.clone(), queue)
            .insert(event_loop.handle())
            .unwrap();

        connection.display().get_registry(&qh, ());
        connection.flush().unwrap();

        Self {
            event_loop,
            connection,
            qh,
            state: WireState::default(),
        }
    }

    fn try_dispatch(&mut self) -> Result<(), calloop::Error> {
        self.event_loop.dispatch(Duration::ZERO, &mut self.state)?;
        let _ = self.connection.flush();
        Ok(())
    }
}

impl Fixture {
    fn connect_wire_client(&mut self) -> (ClientId, WireClient) {
        let (server, client) = UnixStream::pair().unwrap();
        let strata = self.strata();
        let id = strata.display.create_client(None);
        let data = strata.frontend.client_state(id);
        let wl_client = strata
            .frontend
            .display_handle
            .insert_client(server, data)
            .unwrap();
        strata.frontend.client_connected(id, wl_client);
        (id, WireClient::new(client))
    }

    fn wire_roundtrip(&mut self, client: &mut WireClient) {
        for _ in 0..4 {
            let _ = client.try_dispatch();
            self.dispatch();
        }
        let _ = client.try_dispatch();
    }
}

#[test]
fn seat_devices_receive_keyboard_state() {
    let mut f = Fixture::new();
    let (id, mut client) = f.connect_wire_client();
    f.wire_roundtrip(&mut client);

    assert!(client.state.keyboard.is_some());
    assert!(f.strata().display.has_bound(id, Interfaces::KEYBOARD));
    assert_eq!(client.state.repeat_info, Some((25, 600)));

    let keymap = f.strata().seat.keymap().map(|k| k.keymap_string().len() + 1);
    assert_eq!(client.state.keymap_size, keymap.map(|size| size as u32));
}

#[test]
fn outputs_become_globals() {
    let mut f = Fixture::new();
    f.add_output(1, (1920, 1080));
    let (_, mut client) = f.connect_wire_client();
    f.wire_roundtrip(&mut client);

    assert!(client.state.output_modes.contains(&(1920, 1080)));
}

#[test]
fn surfaces_are_mirrored() {
    let mut f = Fixture::new();
    let (id, mut client) = f.connect_wire_client();
    f.wire_roundtrip(&mut client);

    let compositor = client.state.compositor.clone().unwrap();
    let surface = compositor.create_surface(&client.qh, ());
    surface.commit();
    f.wire_roundtrip(&mut client);

    let strata = f.strata();
    let surface = strata
        .frontend
        .surface_ids()
        .find(|s| strata.display.surface_client(*s) == Some(id));
    let surface = surface.unwrap();
    assert_eq!(strata.display.surface(surface).unwrap().commit_count, 1);
}

#[test]
fn closed_connection_disconnects_the_client() {
    let mut f = Fixture::new();
    let (id, mut client) = f.connect_wire_client();
    f.wire_roundtrip(&mut client);
    assert!(f.strata().frontend.is_wire_client(id));

    drop(client);
    f.dispatch();
    f.dispatch();

    assert!(!f.strata().display.is_connected(id));
    assert!(!f.strata().frontend.is_wire_client(id));
}

#[test]
fn protocol_error_kills_the_connection() {
    let mut f = Fixture::new();
    let (id, mut client) = f.connect_wire_client();
    f.wire_roundtrip(&mut client);

    f.strata()
        .post_error(id, ProtocolError::new("xdg_wm_base", 4, "invalid surface state"));
    f.dispatch();
    assert!(!f.strata().display.is_connected(id));

    let _ = client.try_dispatch();
    let error = client.connection.protocol_error().unwrap();
    assert_eq!(error.code, 4);
}

impl Dispatch<WlRegistry, ()> for WireState {
    fn event(
        state: &mut Self,
        registry: &WlRegistry,
        event: wl_registry::Event,
        _data: &(),
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        let wl_registry::Event::Global {
            name,
            interface,
            version,
        } = event
        else {
            return;
        };
        if interface == WlCompositor::interface().name {
            let version = min(version, WlCompositor::interface().version);
            state.compositor = Some(registry.bind(name, version, qh, ()));
        } else if interface == WlSeat::interface().name {
            let version = min(version, WlSeat::interface().version);
            let seat: WlSeat = registry.bind(name, version, qh, ());
            state.keyboard = Some(seat.get_keyboard(qh, ()));
        } else if interface == WlOutput::interface().name {
            let version = min(version, WlOutput::interface().version);
            let _: WlOutput = registry.bind(name, version, qh, ());
        }
    }
}

impl Dispatch<WlCompositor, ()> for WireState {
    fn event(
        _state: &mut Self,
        _proxy: &WlCompositor,
        _event: <WlCompositor as wayland_client::Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<WlSurface, ()> for WireState {
    fn event(
        _state: &mut Self,
        _proxy: &WlSurface,
        _event: <WlSurface as wayland_client::Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<WlSeat, ()> for WireState {
    fn event(
        _state: &mut Self,
        _proxy: &WlSeat,
        _event: <WlSeat as wayland_client::Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<WlKeyboard, ()> for WireState {
    fn event(
        state: &mut Self,
        _proxy: &WlKeyboard,
        event: wl_keyboard::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        match event {
            wl_keyboard::Event::Keymap { size, .. } => state.keymap_size = Some(size),
            wl_keyboard::Event::RepeatInfo { rate, delay } => {
                state.repeat_info = Some((rate, delay));
            }
            _ => (),
        }
    }
}

impl Dispatch<WlOutput, ()> for WireState {
    fn event(
        state: &mut Self,
        _proxy: &WlOutput,
        event: wl_output::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_output::Event::Mode { width, height, .. } = event {
            state.output_modes.push((width, height));
        }
    }
}
