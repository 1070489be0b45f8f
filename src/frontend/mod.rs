//! Wayland wire frontend.
//!
//! Client requests arrive through smithay's protocol implementations and are forwarded to the
//! [`Strata`] operations; the events the compositor queued in [`crate::display::Display`] are
//! written out to the real protocol objects when clients are flushed. Clients created directly on
//! the display, without a connection, are left alone.

use std::collections::{HashMap, VecDeque};
use std::ffi::OsString;
use std::io::Write as _;
use std::os::fd::{AsFd as _, FromRawFd as _, OwnedFd};
use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use calloop::generic::Generic;
use calloop::{Interest, LoopHandle, Mode, PostAction};
use smithay::backend::input::{Axis, AxisSource, ButtonState, KeyState};
use smithay::output::Output as WlOutput;
use smithay::reexports::wayland_protocols::xdg::decoration::zv1::server::zxdg_toplevel_decoration_v1;
use smithay::reexports::wayland_protocols::xdg::shell::server::xdg_toplevel;
use smithay::reexports::wayland_server::backend::{
    ClientData, ClientId as WlClientId, DisconnectReason, GlobalId, ObjectId, ProtocolError,
};
use smithay::reexports::wayland_server::protocol::wl_buffer::WlBuffer;
use smithay::reexports::wayland_server::protocol::wl_callback::WlCallback;
use smithay::reexports::wayland_server::protocol::wl_keyboard::{self, WlKeyboard};
use smithay::reexports::wayland_server::protocol::wl_pointer::{self, WlPointer};
use smithay::reexports::wayland_server::protocol::wl_seat::WlSeat;
use smithay::reexports::wayland_server::protocol::wl_surface::WlSurface;
use smithay::reexports::wayland_server::protocol::wl_touch::WlTouch;
use smithay::reexports::wayland_server::protocol::wl_shm;
use smithay::reexports::wayland_server::{Client, Display as WlDisplay, DisplayHandle, Resource};
use smithay::utils::{Logical, Rectangle, Serial as WireSerial, Size};
use smithay::wayland::compositor::{CompositorClientState, CompositorState};
use smithay::wayland::output::OutputManagerState;
use smithay::wayland::shell::xdg::decoration::XdgDecorationState;
use smithay::wayland::shell::xdg::{PopupSurface, ShellClient, ToplevelSurface, XdgShellState};
use smithay::wayland::shm::ShmState;
use smithay::wayland::socket::ListeningSocketSource;
use smithay::xwayland::XWaylandClientData;

use crate::display::{ClientEvent, ClientId, SurfaceId};
use crate::input::SEAT_VERSION;
use crate::output::OutputId;
use crate::strata::{State, Strata};
use crate::texture::buffer::BufferId;
use crate::utils::serial::Serial;
use crate::window::xdg::XdgStates;

mod compositor;
mod output;
mod seat;
mod xdg_shell;
pub mod xwayland;

pub use compositor::region_from_attributes;
pub use xdg_shell::positioner_from_state;

const XDG_STATES: [(XdgStates, xdg_toplevel::State); 9] = [
    (XdgStates::MAXIMIZED, xdg_toplevel::State::Maximized),
    (XdgStates::FULLSCREEN, xdg_toplevel::State::Fullscreen),
    (XdgStates::RESIZING, xdg_toplevel::State::Resizing),
    (XdgStates::ACTIVATED, xdg_toplevel::State::Activated),
    (XdgStates::TILED_LEFT, xdg_toplevel::State::TiledLeft),
    (XdgStates::TILED_RIGHT, xdg_toplevel::State::TiledRight),
    (XdgStates::TILED_TOP, xdg_toplevel::State::TiledTop),
    (XdgStates::TILED_BOTTOM, xdg_toplevel::State::TiledBottom),
    (XdgStates::SUSPENDED, xdg_toplevel::State::Suspended),
];

/// Per-connection data of a wire client.
pub struct ClientState {
    pub compositor_state: CompositorClientState,
    pub id: ClientId,
    disconnected: Arc<Mutex<Vec<ClientId>>>,
}

impl ClientData for ClientState {
    fn initialized(&self, _client_id: WlClientId) {}

    fn disconnected(&self, _client_id: WlClientId, reason: DisconnectReason) {
        trace!("{:?} connection closed: {reason:?}", self.id);
        if let Ok(mut disconnected) = self.disconnected.lock() {
            disconnected.push(self.id);
        }
    }
}

/// Last xdg_surface state forwarded for a surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct XdgCached {
    geometry: Option<Rectangle<i32, Logical>>,
    min_size: Size<i32, Logical>,
    max_size: Size<i32, Logical>,
}

/// Protocol objects a wire client has bound.
struct WireClient {
    client: Client,
    pointers: Vec<WlPointer>,
    keyboards: Vec<WlKeyboard>,
    touches: Vec<WlTouch>,
    shell: Option<ShellClient>,
    /// Pings sent and not answered yet.
    pings: Vec<Serial>,
}

impl WireClient {
    fn new(client: Client) -> Self {
        Self {
            client,
            pointers: Vec::new(),
            keyboards: Vec::new(),
            touches: Vec::new(),
            shell: None,
            pings: Vec::new(),
        }
    }
}

pub struct Frontend {
    pub display_handle: DisplayHandle,
    pub compositor_state: CompositorState,
    pub xdg_shell_state: XdgShellState,
    pub xdg_decoration_state: XdgDecorationState,
    pub shm_state: ShmState,
    pub output_manager_state: OutputManagerState,
    pub socket_name: Option<OsString>,

    clients: HashMap<ClientId, WireClient>,
    surfaces: HashMap<ObjectId, SurfaceId>,
    wl_surfaces: HashMap<SurfaceId, WlSurface>,
    buffers: HashMap<ObjectId, BufferId>,
    wl_buffers: HashMap<BufferId, WlBuffer>,
    toplevels: HashMap<SurfaceId, ToplevelSurface>,
    popups: HashMap<SurfaceId, PopupSurface>,
    /// Wire configure serials mapped to the serials the compositor issued.
    configures: HashMap<SurfaceId, Vec<(WireSerial, Serial)>>,
    frame_callbacks: HashMap<SurfaceId, VecDeque<WlCallback>>,
    xdg_cached: HashMap<SurfaceId, XdgCached>,
    outputs: HashMap<OutputId, (WlOutput, GlobalId)>,
    disconnected: Arc<Mutex<Vec<ClientId>>>,
}

impl Frontend {
    /// Creates the display and its globals, and inserts the display into the event loop.
    pub fn new(event_loop: &LoopHandle<'static, State>) -> anyhow::Result<Self> {
        let display = WlDisplay::<State>::new().context("error creating the Wayland display")?;
        let display_handle = display.handle();

        let compositor_state = CompositorState::new::<State>(&display_handle);
        let xdg_shell_state = XdgShellState::new::<State>(&display_handle);
        let xdg_decoration_state = XdgDecorationState::new::<State>(&display_handle);
        let shm_state = ShmState::new::<State>(
            &display_handle,
            vec![wl_shm::Format::Xbgr8888, wl_shm::Format::Abgr8888],
        );
        let output_manager_state =
            OutputManagerState::new_with_xdg_output::<State>(&display_handle);
        display_handle.create_global::<State, WlSeat, _>(SEAT_VERSION, ());

        let source = Generic::new(display, Interest::READ, Mode::Level);
        event_loop
            .insert_source(source, |_, display, state| {
                // SAFETY: we don't drop the display.
                let result = unsafe { display.get_mut().dispatch_clients(state) };
                if let Err(err) = result {
                    warn!("error dispatching Wayland clients: {err}");
                }
                Ok(PostAction::Continue)
            })
            .map_err(|err| anyhow::anyhow!("error inserting the display source: {err}"))?;

        Ok(Self {
            display_handle,
            compositor_state,
            xdg_shell_state,
            xdg_decoration_state,
            shm_state,
            output_manager_state,
            socket_name: None,
            clients: HashMap::new(),
            surfaces: HashMap::new(),
            wl_surfaces: HashMap::new(),
            buffers: HashMap::new(),
            wl_buffers: HashMap::new(),
            toplevels: HashMap::new(),
            popups: HashMap::new(),
            configures: HashMap::new(),
            frame_callbacks: HashMap::new(),
            xdg_cached: HashMap::new(),
            outputs: HashMap::new(),
            disconnected: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Data to insert a new wire client with.
    pub fn client_state(&self, id: ClientId) -> Arc<ClientState> {
        Arc::new(ClientState {
            compositor_state: CompositorClientState::default(),
            id,
            disconnected: self.disconnected.clone(),
        })
    }

    pub fn client_connected(&mut self, id: ClientId, client: Client) {
        self.clients.insert(id, WireClient::new(client));
    }

    pub fn is_wire_client(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn surface_id(&self, surface: &WlSurface) -> Option<SurfaceId> {
        self.surfaces.get(&surface.id()).copied()
    }

    /// Surfaces created over the wire.
    pub fn surface_ids(&self) -> impl Iterator<Item = SurfaceId> + '_ {
        self.wl_surfaces.keys().copied()
    }

    pub fn wl_surface(&self, surface: SurfaceId) -> Option<&WlSurface> {
        self.wl_surfaces.get(&surface)
    }

    fn insert_surface(&mut self, wl_surface: &WlSurface, id: SurfaceId) {
        self.surfaces.insert(wl_surface.id(), id);
        self.wl_surfaces.insert(id, wl_surface.clone());
    }

    fn forget_surface(&mut self, id: SurfaceId) {
        if let Some(wl_surface) = self.wl_surfaces.remove(&id) {
            self.surfaces.remove(&wl_surface.id());
        }
        self.toplevels.remove(&id);
        self.popups.remove(&id);
        self.configures.remove(&id);
        self.frame_callbacks.remove(&id);
        self.xdg_cached.remove(&id);
    }

    fn forget_client(&mut self, id: ClientId, surfaces: &[SurfaceId]) {
        self.clients.remove(&id);
        for surface in surfaces {
            self.forget_surface(*surface);
        }
    }

    fn record_configure(&mut self, surface: SurfaceId, wire: WireSerial, serial: Serial) {
        let configures = self.configures.entry(surface).or_default();
        configures.push((wire, serial));
    }

    /// Compositor serial of an acked wire configure, dropping the older ones.
    fn take_configure(&mut self, surface: SurfaceId, wire: WireSerial) -> Option<Serial> {
        let configures = self.configures.get_mut(&surface)?;
        let idx = configures.iter().position(|(w, _)| *w == wire)?;
        let serial = configures[idx].1;
        configures.drain(..=idx);
        Some(serial)
    }

    /// Listens on a new `wayland-N` socket and points `WAYLAND_DISPLAY` at it.
    pub fn add_listening_socket(&mut self, event_loop: &LoopHandle<'static, State>) -> anyhow::Result<()> {
        let source = ListeningSocketSource::new_auto().context("error creating the socket")?;
        let name = source.socket_name().to_os_string();
        event_loop
            .insert_source(source, |stream, _, state| {
                let strata = &mut state.strata;
                let id = strata.display.create_client(None);
                let data = strata.frontend.client_state(id);
                match strata.frontend.display_handle.insert_client(stream, data) {
                    Ok(client) => {
                        let pid = client
                            .get_credentials(&strata.frontend.display_handle)
                            .ok()
                            .map(|c| c.pid);
                        strata.display.set_client_pid(id, pid);
                        debug!("new wire client {id:?} (pid {pid:?})");
                        strata.frontend.client_connected(id, client);
                    }
                    Err(err) => {
                        warn!("error inserting client: {err}");
                        strata.client_disconnected(id);
                    }
                }
            })
            .map_err(|err| anyhow::anyhow!("error inserting the socket source: {err}"))?;

        info!("listening on Wayland socket: {name:?}");
        std::env::set_var("WAYLAND_DISPLAY", &name);
        self.socket_name = Some(name);
        Ok(())
    }
}

/// Compositor client id of a wire client.
pub fn client_id(client: &Client) -> Option<ClientId> {
    if let Some(data) = client.get_data::<XWaylandClientData>() {
        return data.user_data().get::<ClientId>().copied();
    }
    client.get_data::<ClientState>().map(|data| data.id)
}

/// Creates a sealed memfd holding the keymap text and its terminating NUL.
fn keymap_fd(keymap: &str) -> std::io::Result<OwnedFd> {
    // SAFETY: the name is a valid C string and the returned fd is checked.
    let fd = unsafe {
        libc::memfd_create(
            c"strata-keymap".as_ptr(),
            libc::MFD_CLOEXEC | libc::MFD_ALLOW_SEALING,
        )
    };
    if fd < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: memfd_create returned a new fd that nothing else owns.
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };

    let mut file = std::fs::File::from(fd);
    file.write_all(keymap.as_bytes())?;
    file.write_all(&[0])?;
    let fd = OwnedFd::from(file);

    let seals = libc::F_SEAL_SEAL | libc::F_SEAL_SHRINK | libc::F_SEAL_GROW | libc::F_SEAL_WRITE;
    // SAFETY: fcntl on an fd we own.
    if unsafe { libc::fcntl(std::os::fd::AsRawFd::as_raw_fd(&fd), libc::F_ADD_SEALS, seals) } < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(fd)
}

fn wire_axis(axis: Axis) -> wl_pointer::Axis {
    match axis {
        Axis::Vertical => wl_pointer::Axis::VerticalScroll,
        Axis::Horizontal => wl_pointer::Axis::HorizontalScroll,
    }
}

fn wire_axis_source(source: AxisSource) -> wl_pointer::AxisSource {
    match source {
        AxisSource::Wheel => wl_pointer::AxisSource::Wheel,
        AxisSource::Finger => wl_pointer::AxisSource::Finger,
        AxisSource::Continuous => wl_pointer::AxisSource::Continuous,
        AxisSource::WheelTilt => wl_pointer::AxisSource::WheelTilt,
    }
}

/// xdg_toplevel states for the compositor's state flags.
pub fn wire_states(states: XdgStates) -> Vec<xdg_toplevel::State> {
    XDG_STATES
        .iter()
        .filter(|(flag, _)| states.contains(*flag))
        .map(|(_, state)| *state)
        .collect()
}

impl Strata {
    /// Applies what happened on the wire since the last flush and writes out queued events.
    pub fn flush_frontend(&mut self) {
        let _span = tracy_client::span!("Strata::flush_frontend");

        let disconnected = self
            .frontend
            .disconnected
            .lock()
            .map(|mut list| std::mem::take(&mut *list))
            .unwrap_or_default();
        for id in disconnected {
            self.wire_client_gone(id);
        }

        let dh = self.frontend.display_handle.clone();
        let ids: Vec<_> = self.frontend.clients.keys().copied().collect();
        for id in ids {
            let Some(wire) = self.frontend.clients.get(&id) else {
                continue;
            };
            if dh.get_client(wire.client.id()).is_err() {
                self.wire_client_gone(id);
                continue;
            }
            if !self.display.is_connected(id) {
                debug!("closing the connection of {id:?}");
                wire.client.kill(
                    &dh,
                    ProtocolError {
                        code: 0,
                        object_id: 1,
                        object_interface: "wl_display".to_owned(),
                        message: "disconnected by the compositor".to_owned(),
                    },
                );
                self.wire_client_gone(id);
                continue;
            }
            if let Some(error) = self.display.take_errors(id).into_iter().next() {
                debug!("killing {id:?} for a protocol error: {error}");
                wire.client.kill(
                    &dh,
                    ProtocolError {
                        code: error.code,
                        object_id: 1,
                        object_interface: error.interface.to_owned(),
                        message: error.message,
                    },
                );
                self.wire_client_gone(id);
                continue;
            }

            for event in self.display.take_events(id) {
                self.send_wire_event(id, event);
            }
        }

        self.resolve_xwayland_surfaces();
        self.sync_wire_outputs();

        if let Err(err) = self.frontend.display_handle.flush_clients() {
            warn!("error flushing Wayland clients: {err}");
        }
    }

    fn wire_client_gone(&mut self, id: ClientId) {
        let surfaces: Vec<_> = self
            .frontend
            .wl_surfaces
            .keys()
            .copied()
            .filter(|s| self.display.surface_client(*s) == Some(id))
            .collect();
        let buffers: Vec<_> = self
            .frontend
            .wl_buffers
            .keys()
            .copied()
            .filter(|b| self.buffers.get(*b).and_then(|b| b.client) == Some(id))
            .collect();
        for buffer in buffers {
            if let Some(wl_buffer) = self.frontend.wl_buffers.remove(&buffer) {
                self.frontend.buffers.remove(&wl_buffer.id());
            }
        }
        self.frontend.forget_client(id, &surfaces);
        if self.display.is_connected(id) {
            self.client_disconnected(id);
        }
    }

    fn resolve_xwayland_surfaces(&mut self) {
        if self.pending_xwayland_surfaces.is_empty() {
            return;
        }
        let Some(xwayland) = self
            .frontend
            .clients
            .iter()
            .find(|(id, _)| self.display.client(**id).is_some_and(|c| c.is_xwayland))
            .map(|(_, wire)| wire.client.clone())
        else {
            return;
        };
        let dh = self.frontend.display_handle.clone();

        let mut unresolved = Vec::new();
        for (xid, protocol_id) in std::mem::take(&mut self.pending_xwayland_surfaces) {
            let wl_surface = xwayland.object_from_protocol_id::<WlSurface>(&dh, protocol_id);
            match wl_surface.ok().and_then(|s| self.frontend.surface_id(&s)) {
                Some(surface) => self.associate_xwayland_surface(xid, surface),
                // The surface request may still be in flight.
                None => unresolved.push((xid, protocol_id)),
            }
        }
        self.pending_xwayland_surfaces = unresolved;
    }

    fn send_wire_event(&mut self, id: ClientId, event: ClientEvent) {
        let frontend = &mut self.frontend;
        let surface = |frontend: &Frontend, surface: SurfaceId| frontend.wl_surfaces.get(&surface).cloned();

        match event {
            ClientEvent::PointerEnter {
                serial,
                surface: s,
                position,
            } => {
                let (Some(wire), Some(wl_surface)) = (frontend.clients.get(&id), surface(frontend, s)) else {
                    return;
                };
                for pointer in &wire.pointers {
                    pointer.enter(serial.0, &wl_surface, position.x, position.y);
                }
            }
            ClientEvent::PointerLeave { serial, surface: s } => {
                let (Some(wire), Some(wl_surface)) = (frontend.clients.get(&id), surface(frontend, s)) else {
                    return;
                };
                for pointer in &wire.pointers {
                    pointer.leave(serial.0, &wl_surface);
                }
            }
            ClientEvent::PointerMotion { time, position } => {
                let Some(wire) = frontend.clients.get(&id) else {
                    return;
                };
                for pointer in &wire.pointers {
                    pointer.motion(time, position.x, position.y);
                }
            }
            ClientEvent::PointerButton {
                serial,
                time,
                button,
                state,
            } => {
                let Some(wire) = frontend.clients.get(&id) else {
                    return;
                };
                let state = match state {
                    ButtonState::Pressed => wl_pointer::ButtonState::Pressed,
                    ButtonState::Released => wl_pointer::ButtonState::Released,
                };
                for pointer in &wire.pointers {
                    pointer.button(serial.0, time, button, state);
                }
            }
            ClientEvent::PointerAxis {
                time,
                axis,
                value,
                v120,
                source,
            } => {
                let Some(wire) = frontend.clients.get(&id) else {
                    return;
                };
                for pointer in &wire.pointers {
                    if pointer.version() >= 5 {
                        pointer.axis_source(wire_axis_source(source));
                    }
                    if v120 != 0 && pointer.version() >= 8 {
                        pointer.axis_value120(wire_axis(axis), v120);
                    }
                    pointer.axis(time, wire_axis(axis), value);
                }
            }
            ClientEvent::PointerFrame => {
                let Some(wire) = frontend.clients.get(&id) else {
                    return;
                };
                for pointer in wire.pointers.iter().filter(|p| p.version() >= 5) {
                    pointer.frame();
                }
            }

            ClientEvent::KeyboardKeymap { size } => {
                let Some(wire) = frontend.clients.get(&id) else {
                    return;
                };
                let Some(keymap) = self.seat.keymap() else {
                    return;
                };
                for keyboard in &wire.keyboards {
                    match keymap_fd(keymap.keymap_string()) {
                        Ok(fd) => keyboard.keymap(
                            wl_keyboard::KeymapFormat::XkbV1,
                            fd.as_fd(),
                            size as u32,
                        ),
                        Err(err) => warn!("error creating the keymap fd: {err}"),
                    }
                }
            }
            ClientEvent::KeyboardRepeatInfo { rate, delay } => {
                let Some(wire) = frontend.clients.get(&id) else {
                    return;
                };
                for keyboard in wire.keyboards.iter().filter(|k| k.version() >= 4) {
                    keyboard.repeat_info(rate, delay);
                }
            }
            ClientEvent::KeyboardEnter {
                serial,
                surface: s,
                keys,
            } => {
                let (Some(wire), Some(wl_surface)) = (frontend.clients.get(&id), surface(frontend, s)) else {
                    return;
                };
                let keys: Vec<u8> = keys.iter().flat_map(|k| k.to_ne_bytes()).collect();
                for keyboard in &wire.keyboards {
                    keyboard.enter(serial.0, &wl_surface, keys.clone());
                }
            }
            ClientEvent::KeyboardLeave { serial, surface: s } => {
                let (Some(wire), Some(wl_surface)) = (frontend.clients.get(&id), surface(frontend, s)) else {
                    return;
                };
                for keyboard in &wire.keyboards {
                    keyboard.leave(serial.0, &wl_surface);
                }
            }
            ClientEvent::KeyboardKey {
                serial,
                time,
                key,
                state,
            } => {
                let Some(wire) = frontend.clients.get(&id) else {
                    return;
                };
                let state = match state {
                    KeyState::Pressed => wl_keyboard::KeyState::Pressed,
                    KeyState::Released => wl_keyboard::KeyState::Released,
                };
                for keyboard in &wire.keyboards {
                    keyboard.key(serial.0, time, key, state);
                }
            }
            ClientEvent::KeyboardModifiers {
                serial,
                depressed,
                latched,
                locked,
                group,
            } => {
                let Some(wire) = frontend.clients.get(&id) else {
                    return;
                };
                for keyboard in &wire.keyboards {
                    keyboard.modifiers(serial.0, depressed, latched, locked, group);
                }
            }

            ClientEvent::TouchDown {
                serial,
                time,
                surface: s,
                id: touch_id,
                position,
            } => {
                let (Some(wire), Some(wl_surface)) = (frontend.clients.get(&id), surface(frontend, s)) else {
                    return;
                };
                for touch in &wire.touches {
                    touch.down(serial.0, time, &wl_surface, touch_id, position.x, position.y);
                }
            }
            ClientEvent::TouchUp {
                serial,
                time,
                id: touch_id,
            } => {
                let Some(wire) = frontend.clients.get(&id) else {
                    return;
                };
                for touch in &wire.touches {
                    touch.up(serial.0, time, touch_id);
                }
            }
            ClientEvent::TouchMotion {
                time,
                id: touch_id,
                position,
            } => {
                let Some(wire) = frontend.clients.get(&id) else {
                    return;
                };
                for touch in &wire.touches {
                    touch.motion(time, touch_id, position.x, position.y);
                }
            }
            ClientEvent::TouchFrame => {
                if let Some(wire) = frontend.clients.get(&id) {
                    wire.touches.iter().for_each(|t| t.frame());
                }
            }
            ClientEvent::TouchCancel => {
                if let Some(wire) = frontend.clients.get(&id) {
                    wire.touches.iter().for_each(|t| t.cancel());
                }
            }

            ClientEvent::XdgConfigure {
                surface: s,
                serial,
                size,
                states,
            } => {
                let Some(toplevel) = frontend.toplevels.get(&s) else {
                    return;
                };
                toplevel.with_pending_state(|state| {
                    state.size = (!size.is_empty()).then_some(size);
                    for (_, wire_state) in XDG_STATES {
                        state.states.unset(wire_state);
                    }
                    for wire_state in wire_states(states) {
                        state.states.set(wire_state);
                    }
                });
                let wire = toplevel.send_configure();
                frontend.record_configure(s, wire, serial);
            }
            ClientEvent::XdgPopupConfigure {
                surface: s,
                serial,
                geometry,
            } => {
                let Some(popup) = frontend.popups.get(&s) else {
                    return;
                };
                popup.with_pending_state(|state| state.geometry = geometry);
                match popup.send_configure() {
                    Ok(wire) => frontend.record_configure(s, wire, serial),
                    Err(err) => debug!("error configuring popup {s:?}: {err:?}"),
                }
            }
            ClientEvent::XdgPopupRepositioned { surface: s, token } => {
                if let Some(popup) = frontend.popups.get(&s) {
                    popup.send_repositioned(token);
                }
            }
            ClientEvent::XdgPopupDone { surface: s } => {
                if let Some(popup) = frontend.popups.get(&s) {
                    popup.send_popup_done();
                }
            }
            ClientEvent::XdgClose { surface: s } => {
                if let Some(toplevel) = frontend.toplevels.get(&s) {
                    toplevel.send_close();
                }
            }
            ClientEvent::Ping { serial } => {
                let Some(wire) = frontend.clients.get_mut(&id) else {
                    return;
                };
                let Some(shell) = &wire.shell else {
                    debug!("no xdg_wm_base to ping {id:?} on");
                    return;
                };
                // Only one ping is in flight on the wire; its pong answers all of ours.
                if let Err(err) = shell.send_ping(WireSerial::from(serial.0)) {
                    trace!("ping of {id:?} not sent: {err:?}");
                }
                wire.pings.push(serial);
            }
            ClientEvent::DecorationMode {
                surface: s,
                server_side,
            } => {
                let Some(toplevel) = frontend.toplevels.get(&s) else {
                    return;
                };
                let mode = if server_side {
                    zxdg_toplevel_decoration_v1::Mode::ServerSide
                } else {
                    zxdg_toplevel_decoration_v1::Mode::ClientSide
                };
                toplevel.with_pending_state(|state| state.decoration_mode = Some(mode));
                if toplevel.is_initial_configure_sent() {
                    toplevel.send_pending_configure();
                }
            }

            ClientEvent::FrameDone { surface: s, time } => {
                let callback = frontend
                    .frame_callbacks
                    .get_mut(&s)
                    .and_then(|callbacks| callbacks.pop_front());
                if let Some(callback) = callback {
                    callback.done(time);
                }
            }
            ClientEvent::BufferRelease { buffer } => {
                if let Some(wl_buffer) = frontend.wl_buffers.get(&buffer) {
                    wl_buffer.release();
                }
            }

            event => trace!("{id:?}: not sent on the wire: {event:?}"),
        }
    }
}
