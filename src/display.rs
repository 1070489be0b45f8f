//! Wayland client and surface bookkeeping.
//!
//! The display owns every connected client, the surfaces they created, and the queue of events the
//! compositor has sent to each client. Protocol objects are modeled by what they mean to the
//! compositor rather than by their wire representation.

use std::collections::HashMap;

use bitflags::bitflags;
use smithay::backend::input::{Axis, AxisSource, ButtonState, KeyState};
use smithay::utils::{Logical, Point, Rectangle, Size};

use crate::input::tablet::{TabletId, TabletToolId, ToolType};
use crate::output::OutputId;
use crate::protocols::dmabuf::DmabufFeedback;
use crate::texture::buffer::{BufferId, SyncPoint};
use crate::utils::id::define_id;
use crate::utils::region::Region;
use crate::utils::serial::{Serial, SerialCounter};
use crate::window::xdg::XdgStates;

define_id!(ClientId);
define_id!(SurfaceId);

bitflags! {
    /// Interfaces a client has bound.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Interfaces: u32 {
        const POINTER = 1 << 0;
        const KEYBOARD = 1 << 1;
        const TOUCH = 1 << 2;
        const DATA_DEVICE = 1 << 3;
        const TEXT_INPUT = 1 << 4;
        const POINTER_GESTURES = 1 << 5;
        const RELATIVE_POINTER = 1 << 6;
        const TABLET = 1 << 7;
        const XDG_WM_BASE = 1 << 8;
        const PRESENTATION = 1 << 9;
    }
}

/// Protocol violation by a client.
///
/// The offending resource is destroyed and the client is informed; the compositor carries on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{interface}#{code}: {message}")]
pub struct ProtocolError {
    pub interface: &'static str,
    pub code: u32,
    pub message: String,
}

impl ProtocolError {
    pub fn new(interface: &'static str, code: u32, message: impl Into<String>) -> Self {
        Self {
            interface,
            code,
            message: message.into(),
        }
    }
}

/// Globals advertised to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Global {
    Compositor,
    Subcompositor,
    Shm,
    Seat { version: u32 },
    Output(OutputId),
    DataDeviceManager,
    XdgWmBase,
    XdgDecorationManager,
    ServerDecorationManager,
    PlasmaShell,
    LinuxDmabuf,
    WlDrm,
    PointerGestures,
    RelativePointerManager,
    KeyboardShortcutsInhibitManager,
    TabletManager,
    TextInputManager,
    XwaylandKeyboardGrabManager,
    LockscreenOverlay,
    SinglePixelBufferManager,
    Presentation,
}

impl Global {
    pub fn interface(&self) -> &'static str {
        match self {
            Global::Compositor => "wl_compositor",
            Global::Subcompositor => "wl_subcompositor",
            Global::Shm => "wl_shm",
            Global::Seat { .. } => "wl_seat",
            Global::Output(_) => "wl_output",
            Global::DataDeviceManager => "wl_data_device_manager",
            Global::XdgWmBase => "xdg_wm_base",
            Global::XdgDecorationManager => "zxdg_decoration_manager_v1",
            Global::ServerDecorationManager => "org_kde_kwin_server_decoration_manager",
            Global::PlasmaShell => "org_kde_plasma_shell",
            Global::LinuxDmabuf => "zwp_linux_dmabuf_v1",
            Global::WlDrm => "wl_drm",
            Global::PointerGestures => "zwp_pointer_gestures_v1",
            Global::RelativePointerManager => "zwp_relative_pointer_manager_v1",
            Global::KeyboardShortcutsInhibitManager => "zwp_keyboard_shortcuts_inhibit_manager_v1",
            Global::TabletManager => "zwp_tablet_manager_v2",
            Global::TextInputManager => "zwp_text_input_manager_v3",
            Global::XwaylandKeyboardGrabManager => "zwp_xwayland_keyboard_grab_manager_v1",
            Global::LockscreenOverlay => "kde_lockscreen_overlay_v1",
            Global::SinglePixelBufferManager => "wp_single_pixel_buffer_manager_v1",
            Global::Presentation => "wp_presentation",
        }
    }

    /// Whether only Xwayland may see this global.
    pub fn is_xwayland_only(&self) -> bool {
        matches!(self, Global::XwaylandKeyboardGrabManager)
    }
}

/// Event sent from the compositor to a client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    PointerEnter {
        serial: Serial,
        surface: SurfaceId,
        position: Point<f64, Logical>,
    },
    PointerLeave {
        serial: Serial,
        surface: SurfaceId,
    },
    PointerMotion {
        time: u32,
        position: Point<f64, Logical>,
    },
    PointerButton {
        serial: Serial,
        time: u32,
        button: u32,
        state: ButtonState,
    },
    PointerAxis {
        time: u32,
        axis: Axis,
        value: f64,
        v120: i32,
        source: AxisSource,
    },
    PointerFrame,
    RelativeMotion {
        utime: u64,
        delta: Point<f64, Logical>,
        delta_unaccel: Point<f64, Logical>,
    },

    KeyboardKeymap {
        size: usize,
    },
    KeyboardRepeatInfo {
        rate: i32,
        delay: i32,
    },
    KeyboardEnter {
        serial: Serial,
        surface: SurfaceId,
        keys: Vec<u32>,
    },
    KeyboardLeave {
        serial: Serial,
        surface: SurfaceId,
    },
    KeyboardKey {
        serial: Serial,
        time: u32,
        key: u32,
        state: KeyState,
    },
    KeyboardModifiers {
        serial: Serial,
        depressed: u32,
        latched: u32,
        locked: u32,
        group: u32,
    },

    TouchDown {
        serial: Serial,
        time: u32,
        surface: SurfaceId,
        id: i32,
        position: Point<f64, Logical>,
    },
    TouchUp {
        serial: Serial,
        time: u32,
        id: i32,
    },
    TouchMotion {
        time: u32,
        id: i32,
        position: Point<f64, Logical>,
    },
    TouchFrame,
    TouchCancel,

    DataOfferEnter {
        serial: Serial,
        surface: SurfaceId,
        position: Point<f64, Logical>,
        mime_types: Vec<String>,
    },
    DataOfferLeave,
    DataOfferMotion {
        time: u32,
        position: Point<f64, Logical>,
    },
    DataOfferDrop,
    DataSourceDropPerformed,
    DataSourceCancelled,
    Selection {
        mime_types: Option<Vec<String>>,
    },

    TextInputEnter {
        surface: SurfaceId,
    },
    TextInputLeave {
        surface: SurfaceId,
    },

    SwipeBegin {
        serial: Serial,
        time: u32,
        surface: SurfaceId,
        fingers: u32,
    },
    SwipeUpdate {
        time: u32,
        delta: Point<f64, Logical>,
    },
    SwipeEnd {
        serial: Serial,
        time: u32,
        cancelled: bool,
    },
    PinchBegin {
        serial: Serial,
        time: u32,
        surface: SurfaceId,
        fingers: u32,
    },
    PinchUpdate {
        time: u32,
        delta: Point<f64, Logical>,
        scale: f64,
        rotation: f64,
    },
    PinchEnd {
        serial: Serial,
        time: u32,
        cancelled: bool,
    },
    HoldBegin {
        serial: Serial,
        time: u32,
        surface: SurfaceId,
        fingers: u32,
    },
    HoldEnd {
        serial: Serial,
        time: u32,
        cancelled: bool,
    },

    TabletAdded {
        tablet: TabletId,
        name: String,
    },
    TabletRemoved {
        tablet: TabletId,
    },
    ToolAdded {
        tool: TabletToolId,
        tool_type: ToolType,
    },
    ToolRemoved {
        tool: TabletToolId,
    },
    ToolProximityIn {
        tool: TabletToolId,
        serial: Serial,
        tablet: TabletId,
        surface: SurfaceId,
    },
    ToolProximityOut {
        tool: TabletToolId,
    },
    ToolMotion {
        tool: TabletToolId,
        position: Point<f64, Logical>,
    },
    ToolPressure {
        tool: TabletToolId,
        pressure: f64,
    },
    ToolDown {
        tool: TabletToolId,
        serial: Serial,
    },
    ToolUp {
        tool: TabletToolId,
    },
    ToolButton {
        tool: TabletToolId,
        serial: Serial,
        button: u32,
        pressed: bool,
    },
    ToolFrame {
        tool: TabletToolId,
        time: u32,
    },

    XdgConfigure {
        surface: SurfaceId,
        serial: Serial,
        size: Size<i32, Logical>,
        states: XdgStates,
    },
    XdgPopupConfigure {
        surface: SurfaceId,
        serial: Serial,
        geometry: Rectangle<i32, Logical>,
    },
    XdgPopupRepositioned {
        surface: SurfaceId,
        token: u32,
    },
    XdgPopupDone {
        surface: SurfaceId,
    },
    XdgClose {
        surface: SurfaceId,
    },
    Ping {
        serial: Serial,
    },
    DecorationMode {
        surface: SurfaceId,
        server_side: bool,
    },

    ShortcutsInhibitorActive {
        surface: SurfaceId,
    },
    ShortcutsInhibitorInactive {
        surface: SurfaceId,
    },

    DmabufFeedback(DmabufFeedback),
    /// `zwp_linux_buffer_params_v1.failed`.
    DmabufFailed,
    DrmDevice {
        path: String,
    },
    DrmCapabilities {
        prime: bool,
    },

    FrameDone {
        surface: SurfaceId,
        time: u32,
    },
    Presented {
        surface: SurfaceId,
        output: OutputId,
        time: u32,
        refresh_ns: u32,
        seq: u64,
    },
    Discarded {
        surface: SurfaceId,
    },
    BufferRelease {
        buffer: BufferId,
    },
}

#[derive(Debug)]
pub struct ClientData {
    pub id: ClientId,
    pub pid: Option<i32>,
    pub bound: Interfaces,
    pub is_xwayland: bool,
    pub connected: bool,
    events: Vec<ClientEvent>,
    errors: Vec<ProtocolError>,
}

/// Role a surface has been assigned.
///
/// A surface can have at most one role during its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SurfaceRole {
    #[default]
    None,
    Toplevel,
    Popup,
    Subsurface,
    Cursor,
    DragIcon,
    Xwayland,
}

/// Double-buffered surface state.
#[derive(Debug, Clone, Default)]
pub struct SurfaceState {
    /// `Some(None)` means the buffer was detached.
    pub buffer: Option<Option<BufferId>>,
    pub damage: Region,
    pub input_region: Option<Region>,
    pub opaque_region: Option<Region>,
    pub subsurface_offset: Option<Point<i32, Logical>>,
    pub frame_callbacks: u32,
    pub acquire_point: Option<SyncPoint>,
    pub release_point: Option<SyncPoint>,
}

#[derive(Debug)]
pub struct Surface {
    pub id: SurfaceId,
    pub client: ClientId,
    pub role: SurfaceRole,
    pub parent: Option<SurfaceId>,
    pub children: Vec<SurfaceId>,
    pub offset: Point<i32, Logical>,
    pub buffer: Option<BufferId>,
    /// Size of the attached buffer in surface-local coordinates.
    pub size: Size<i32, Logical>,
    pub buffer_scale: i32,
    pub damage: Region,
    pub input_region: Option<Region>,
    pub opaque_region: Region,
    pub frame_callbacks: u32,
    pub acquire_point: Option<SyncPoint>,
    pub release_point: Option<SyncPoint>,
    pub pending: SurfaceState,
    pub commit_count: u64,
}

impl Surface {
    pub fn is_mapped(&self) -> bool {
        self.buffer.is_some()
    }

    /// Whether the point, in surface-local coordinates, accepts input.
    pub fn accepts_input_at(&self, point: Point<f64, Logical>) -> bool {
        let p = point.to_i32_floor();
        let bounds = Rectangle::from_size(self.size);
        if !bounds.contains(p) {
            return false;
        }
        match &self.input_region {
            Some(region) => region.contains_point(p),
            None => true,
        }
    }
}

/// What changed during a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitInfo {
    pub buffer_changed: bool,
    pub became_mapped: bool,
    pub became_unmapped: bool,
}

#[derive(Debug)]
pub struct Display {
    serial: SerialCounter,
    clients: HashMap<ClientId, ClientData>,
    surfaces: HashMap<SurfaceId, Surface>,
    globals: Vec<Global>,
}

impl Display {
    pub fn new() -> Self {
        Self {
            serial: SerialCounter::new(),
            clients: HashMap::new(),
            surfaces: HashMap::new(),
            globals: Vec::new(),
        }
    }

    pub fn next_serial(&mut self) -> Serial {
        self.serial.next_serial()
    }

    pub fn advertise(&mut self, global: Global) {
        if !self.globals.contains(&global) {
            debug!("advertising global {}", global.interface());
            self.globals.push(global);
        }
    }

    pub fn withdraw(&mut self, global: Global) {
        self.globals.retain(|g| *g != global);
    }

    /// Globals visible to the given client.
    pub fn globals_for(&self, client: ClientId) -> Vec<Global> {
        let is_xwayland = self.client(client).is_some_and(|c| c.is_xwayland);
        self.globals
            .iter()
            .copied()
            .filter(|g| is_xwayland || !g.is_xwayland_only())
            .collect()
    }

    pub fn create_client(&mut self, pid: Option<i32>) -> ClientId {
        let id = ClientId::next();
        self.clients.insert(
            id,
            ClientData {
                id,
                pid,
                bound: Interfaces::empty(),
                is_xwayland: false,
                connected: true,
                events: Vec::new(),
                errors: Vec::new(),
            },
        );
        debug!("new client {id:?} (pid {pid:?})");
        id
    }

    pub fn create_xwayland_client(&mut self, pid: Option<i32>) -> ClientId {
        let id = self.create_client(pid);
        if let Some(client) = self.clients.get_mut(&id) {
            client.is_xwayland = true;
        }
        id
    }

    pub fn client(&self, id: ClientId) -> Option<&ClientData> {
        self.clients.get(&id)
    }

    pub fn clients(&self) -> impl Iterator<Item = &ClientData> + '_ {
        self.clients.values().filter(|c| c.connected)
    }

    pub fn is_connected(&self, id: ClientId) -> bool {
        self.client(id).is_some_and(|c| c.connected)
    }

    pub fn bind(&mut self, id: ClientId, interfaces: Interfaces) {
        if let Some(client) = self.clients.get_mut(&id) {
            client.bound |= interfaces;
        }
    }

    pub fn has_bound(&self, id: ClientId, interface: Interfaces) -> bool {
        self.client(id)
            .is_some_and(|c| c.connected && c.bound.contains(interface))
    }

    pub fn send(&mut self, id: ClientId, event: ClientEvent) {
        if let Some(client) = self.clients.get_mut(&id) {
            if client.connected {
                trace!("{id:?} <- {event:?}");
                client.events.push(event);
            }
        }
    }

    /// Sends an event to the client owning the surface.
    pub fn send_to_surface(&mut self, surface: SurfaceId, event: ClientEvent) {
        if let Some(client) = self.surface_client(surface) {
            self.send(client, event);
        }
    }

    pub fn events(&self, id: ClientId) -> &[ClientEvent] {
        self.client(id).map_or(&[], |c| &c.events[..])
    }

    pub fn take_events(&mut self, id: ClientId) -> Vec<ClientEvent> {
        self.clients
            .get_mut(&id)
            .map(|c| std::mem::take(&mut c.events))
            .unwrap_or_default()
    }

    pub fn post_error(&mut self, id: ClientId, error: ProtocolError) {
        debug!("protocol error for {id:?}: {error}");
        if let Some(client) = self.clients.get_mut(&id) {
            client.errors.push(error);
        }
    }

    pub fn errors(&self, id: ClientId) -> &[ProtocolError] {
        self.client(id).map_or(&[], |c| &c.errors[..])
    }

    pub fn take_errors(&mut self, id: ClientId) -> Vec<ProtocolError> {
        self.clients
            .get_mut(&id)
            .map(|c| std::mem::take(&mut c.errors))
            .unwrap_or_default()
    }

    pub fn set_client_pid(&mut self, id: ClientId, pid: Option<i32>) {
        if let Some(client) = self.clients.get_mut(&id) {
            client.pid = pid;
        }
    }

    /// Disconnects a client, returning the surfaces that were destroyed with it.
    pub fn disconnect(&mut self, id: ClientId) -> Vec<SurfaceId> {
        let Some(client) = self.clients.get_mut(&id) else {
            return Vec::new();
        };
        if !client.connected {
            return Vec::new();
        }
        debug!("client {id:?} disconnected");
        client.connected = false;
        client.events.clear();

        let destroyed: Vec<_> = self
            .surfaces
            .values()
            .filter(|s| s.client == id)
            .map(|s| s.id)
            .collect();
        for surface in &destroyed {
            self.surfaces.remove(surface);
        }
        destroyed
    }

    pub fn create_surface(&mut self, client: ClientId) -> Option<SurfaceId> {
        if !self.is_connected(client) {
            return None;
        }

        let id = SurfaceId::next();
        self.surfaces.insert(
            id,
            Surface {
                id,
                client,
                role: SurfaceRole::None,
                parent: None,
                children: Vec::new(),
                offset: Point::from((0, 0)),
                buffer: None,
                size: Size::from((0, 0)),
                buffer_scale: 1,
                damage: Region::new(),
                input_region: None,
                opaque_region: Region::new(),
                frame_callbacks: 0,
                acquire_point: None,
                release_point: None,
                pending: SurfaceState::default(),
                commit_count: 0,
            },
        );
        Some(id)
    }

    pub fn surface(&self, id: SurfaceId) -> Option<&Surface> {
        self.surfaces.get(&id)
    }

    pub fn surface_mut(&mut self, id: SurfaceId) -> Option<&mut Surface> {
        self.surfaces.get_mut(&id)
    }

    pub fn surface_client(&self, id: SurfaceId) -> Option<ClientId> {
        self.surface(id).map(|s| s.client)
    }

    pub fn surface_exists(&self, id: SurfaceId) -> bool {
        self.surfaces.contains_key(&id)
    }

    /// Assigns a role, failing if the surface already has a different one.
    pub fn set_role(&mut self, id: SurfaceId, role: SurfaceRole) -> Result<(), ProtocolError> {
        let surface = self
            .surfaces
            .get_mut(&id)
            .ok_or_else(|| ProtocolError::new("wl_surface", 0, "no such surface"))?;
        if surface.role != SurfaceRole::None && surface.role != role {
            return Err(ProtocolError::new(
                "wl_surface",
                0,
                format!("surface already has role {:?}", surface.role),
            ));
        }
        surface.role = role;
        Ok(())
    }

    pub fn set_subsurface(
        &mut self,
        child: SurfaceId,
        parent: SurfaceId,
    ) -> Result<(), ProtocolError> {
        if child == parent || self.surface_tree(child).contains(&parent) {
            return Err(ProtocolError::new(
                "wl_subcompositor",
                1,
                "subsurface parent would create a cycle",
            ));
        }
        if !self.surface_exists(parent) {
            return Err(ProtocolError::new("wl_subcompositor", 1, "no such parent"));
        }
        self.set_role(child, SurfaceRole::Subsurface)?;

        if let Some(surface) = self.surfaces.get_mut(&child) {
            surface.parent = Some(parent);
        }
        if let Some(surface) = self.surfaces.get_mut(&parent) {
            surface.children.push(child);
        }
        Ok(())
    }

    /// Root surface followed by its subsurface descendants, in stacking order.
    pub fn surface_tree(&self, root: SurfaceId) -> Vec<SurfaceId> {
        let mut rv = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(surface) = self.surface(id) else {
                continue;
            };
            rv.push(id);
            stack.extend(surface.children.iter().rev().copied());
        }
        rv
    }

    /// Offset of a subsurface relative to its root surface.
    pub fn offset_in_root(&self, id: SurfaceId) -> Point<i32, Logical> {
        let mut offset = Point::from((0, 0));
        let mut current = self.surface(id);
        while let Some(surface) = current {
            let Some(parent) = surface.parent else {
                break;
            };
            offset += surface.offset;
            current = self.surface(parent);
        }
        offset
    }

    pub fn root_surface(&self, id: SurfaceId) -> SurfaceId {
        let mut id = id;
        while let Some(parent) = self.surface(id).and_then(|s| s.parent) {
            id = parent;
        }
        id
    }

    /// Bounding rectangle of the mapped surfaces in the tree, relative to the root.
    pub fn surface_tree_bbox(&self, root: SurfaceId) -> Rectangle<i32, Logical> {
        let mut bbox: Option<Rectangle<i32, Logical>> = None;
        for id in self.surface_tree(root) {
            let Some(surface) = self.surface(id) else {
                continue;
            };
            if !surface.is_mapped() {
                continue;
            }
            let rect = Rectangle::new(self.offset_in_root(id), surface.size);
            bbox = Some(match bbox {
                Some(bbox) => bbox.merge(rect),
                None => rect,
            });
        }
        bbox.unwrap_or_default()
    }

    pub fn attach(&mut self, id: SurfaceId, buffer: Option<BufferId>) {
        if let Some(surface) = self.surfaces.get_mut(&id) {
            surface.pending.buffer = Some(buffer);
        }
    }

    pub fn damage(&mut self, id: SurfaceId, rect: Rectangle<i32, Logical>) {
        if let Some(surface) = self.surfaces.get_mut(&id) {
            surface.pending.damage.add_rect(rect);
        }
    }

    pub fn request_frame(&mut self, id: SurfaceId) {
        if let Some(surface) = self.surfaces.get_mut(&id) {
            surface.pending.frame_callbacks += 1;
        }
    }

    /// Applies pending state.
    ///
    /// `buffer_size` gives the logical size of the newly attached buffer, if any.
    pub fn commit(
        &mut self,
        id: SurfaceId,
        buffer_size: impl FnOnce(BufferId) -> Option<Size<i32, Logical>>,
    ) -> Option<CommitInfo> {
        let surface = self.surfaces.get_mut(&id)?;
        let pending = std::mem::take(&mut surface.pending);
        let was_mapped = surface.is_mapped();
        let mut info = CommitInfo::default();

        if let Some(buffer) = pending.buffer {
            info.buffer_changed = true;
            surface.buffer = buffer;
            surface.size = buffer
                .and_then(buffer_size)
                .unwrap_or_else(|| Size::from((0, 0)));
            if buffer.is_some() && pending.damage.is_empty() && !was_mapped {
                surface.damage = Region::from_rect(Rectangle::from_size(surface.size));
            } else {
                surface.damage = pending.damage;
            }
        } else {
            surface.damage = pending.damage;
        }

        if let Some(region) = pending.input_region {
            surface.input_region = Some(region);
        }
        if let Some(region) = pending.opaque_region {
            surface.opaque_region = region;
        }
        if let Some(offset) = pending.subsurface_offset {
            surface.offset = offset;
        }
        surface.frame_callbacks += pending.frame_callbacks;
        surface.acquire_point = pending.acquire_point;
        if pending.release_point.is_some() {
            surface.release_point = pending.release_point;
        }
        surface.commit_count += 1;

        let is_mapped = surface.is_mapped();
        info.became_mapped = !was_mapped && is_mapped;
        info.became_unmapped = was_mapped && !is_mapped;
        Some(info)
    }

    /// Destroys a surface, detaching it from its parent and orphaning its children.
    pub fn destroy_surface(&mut self, id: SurfaceId) -> Option<Surface> {
        let surface = self.surfaces.remove(&id)?;
        if let Some(parent) = surface.parent {
            if let Some(parent) = self.surfaces.get_mut(&parent) {
                parent.children.retain(|c| *c != id);
            }
        }
        for child in &surface.children {
            if let Some(child) = self.surfaces.get_mut(child) {
                child.parent = None;
            }
        }
        Some(surface)
    }

    /// Delivers pending frame callbacks of the given surfaces.
    pub fn send_frame_callbacks(&mut self, surfaces: &[SurfaceId], time: u32) {
        for &id in surfaces {
            let Some(surface) = self.surfaces.get_mut(&id) else {
                continue;
            };
            let count = std::mem::take(&mut surface.frame_callbacks);
            let client = surface.client;
            for _ in 0..count {
                self.send(client, ClientEvent::FrameDone { surface: id, time });
            }
        }
    }
}

impl Default for Display {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_cannot_change() {
        let mut display = Display::new();
        let client = display.create_client(None);
        let surface = display.create_surface(client).unwrap();

        display.set_role(surface, SurfaceRole::Toplevel).unwrap();
        display.set_role(surface, SurfaceRole::Toplevel).unwrap();
        assert!(display.set_role(surface, SurfaceRole::Cursor).is_err());
    }

    #[test]
    fn subsurface_cycle_is_rejected() {
        let mut display = Display::new();
        let client = display.create_client(None);
        let a = display.create_surface(client).unwrap();
        let b = display.create_surface(client).unwrap();

        display.set_subsurface(b, a).unwrap();
        assert!(display.set_subsurface(a, b).is_err());
        assert_eq!(display.surface_tree(a), vec![a, b]);
        assert_eq!(display.root_surface(b), a);
    }

    #[test]
    fn events_are_dropped_after_disconnect() {
        let mut display = Display::new();
        let client = display.create_client(Some(42));
        let surface = display.create_surface(client).unwrap();

        display.send(client, ClientEvent::PointerFrame);
        assert_eq!(display.events(client).len(), 1);

        let destroyed = display.disconnect(client);
        assert_eq!(destroyed, vec![surface]);
        display.send(client, ClientEvent::PointerFrame);
        assert!(display.events(client).is_empty());
        assert!(display.create_surface(client).is_none());
    }

    #[test]
    fn xwayland_only_globals() {
        let mut display = Display::new();
        display.advertise(Global::Compositor);
        display.advertise(Global::XwaylandKeyboardGrabManager);

        let client = display.create_client(None);
        let xwayland = display.create_xwayland_client(None);
        assert_eq!(display.globals_for(client), vec![Global::Compositor]);
        assert_eq!(display.globals_for(xwayland).len(), 2);
    }

    #[test]
    fn commit_tracks_mapping() {
        let mut display = Display::new();
        let client = display.create_client(None);
        let surface = display.create_surface(client).unwrap();
        let buffer = BufferId::next();

        display.attach(surface, Some(buffer));
        let info = display
            .commit(surface, |_| Some(Size::from((10, 20))))
            .unwrap();
        assert!(info.became_mapped);
        let s = display.surface(surface).unwrap();
        assert_eq!(s.size, Size::from((10, 20)));
        assert_eq!(s.damage.area(), 200);

        display.attach(surface, None);
        let info = display.commit(surface, |_| None).unwrap();
        assert!(info.became_unmapped);
    }
}
