//! X11 window manager side.
//!
//! Everything the window manager asks of the X server goes through [`X11Connection`]. The real
//! connection is [`connection::XConnection`] on top of x11rb; tests use [`RecordingConnection`]
//! which keeps the requests and root properties in memory.

use std::any::Any;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use smithay::utils::{Logical, Rectangle};

use crate::window::x11::MappingState;
use crate::workspace::stacking::X11Propagation;

pub mod atoms;
pub mod connection;
pub mod events;

pub use self::atoms::Atoms;

pub const ATOM_NONE: u32 = 0;
pub const ATOM_ATOM: u32 = 4;
pub const ATOM_CARDINAL: u32 = 6;
pub const ATOM_WINDOW: u32 = 33;
pub const CURRENT_TIME: u32 = 0;

#[derive(Debug, thiserror::Error)]
pub enum X11Error {
    #[error(transparent)]
    Connect(#[from] x11rb::errors::ConnectError),
    #[error(transparent)]
    Connection(#[from] x11rb::errors::ConnectionError),
    #[error(transparent)]
    Reply(#[from] x11rb::errors::ReplyError),
    #[error(transparent)]
    ReplyOrId(#[from] x11rb::errors::ReplyOrIdError),
    #[error("{name} extension missing or older than {major}.{minor}")]
    MissingExtension {
        name: &'static str,
        major: u32,
        minor: u32,
    },
    #[error("another window manager is running")]
    WmRunning,
}

/// Windows created around a managed client window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameWindows {
    pub frame: u32,
    pub wrapper: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MapState {
    #[default]
    Unmapped,
    Unviewable,
    Viewable,
}

/// The part of `GetWindowAttributes` the window manager looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowAttributes {
    pub override_redirect: bool,
    pub map_state: MapState,
    pub input_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WindowTree {
    pub parent: u32,
    /// Children in stacking order, bottom-most first.
    pub children: Vec<u32>,
}

pub trait X11Connection: Any {
    fn root(&self) -> u32;
    fn atoms(&self) -> &Atoms;

    fn intern_atom(&mut self, name: &str) -> Result<u32, X11Error>;

    /// Reparents the client window into a new frame and wrapper.
    fn create_frame(
        &mut self,
        window: u32,
        geometry: Rectangle<i32, Logical>,
    ) -> Result<FrameWindows, X11Error>;
    /// Moves the client window back to the root and destroys its frame.
    fn destroy_frame(&mut self, window: u32, frame: FrameWindows) -> Result<(), X11Error>;
    /// Destroys the frame of a client window that is gone or no longer ours.
    fn discard_frame(&mut self, frame: FrameWindows) -> Result<(), X11Error>;

    fn query_tree(&mut self, window: u32) -> Result<WindowTree, X11Error>;
    fn get_window_attributes(&mut self, window: u32) -> Result<WindowAttributes, X11Error>;

    fn get_geometry(&mut self, window: u32) -> Result<Rectangle<i32, Logical>, X11Error>;
    fn map_window(&mut self, window: u32) -> Result<(), X11Error>;
    fn unmap_window(&mut self, window: u32) -> Result<(), X11Error>;
    fn configure_window(
        &mut self,
        window: u32,
        geometry: Rectangle<i32, Logical>,
    ) -> Result<(), X11Error>;
    /// Tells the client its geometry without moving anything.
    fn send_configure_notify(
        &mut self,
        window: u32,
        geometry: Rectangle<i32, Logical>,
    ) -> Result<(), X11Error>;
    /// Restacks the windows so that each is directly below the previous one.
    fn restack(&mut self, windows: &[u32]) -> Result<(), X11Error>;

    fn set_input_focus(&mut self, window: u32, time: u32) -> Result<(), X11Error>;
    fn send_client_message(
        &mut self,
        window: u32,
        message_type: u32,
        data: [u32; 5],
    ) -> Result<(), X11Error>;

    fn change_property32(
        &mut self,
        window: u32,
        property: u32,
        type_: u32,
        data: &[u32],
    ) -> Result<(), X11Error>;
    fn change_property8(
        &mut self,
        window: u32,
        property: u32,
        type_: u32,
        data: &[u8],
    ) -> Result<(), X11Error>;
    fn delete_property(&mut self, window: u32, property: u32) -> Result<(), X11Error>;
    fn get_property32(&mut self, window: u32, property: u32)
        -> Result<Option<Vec<u32>>, X11Error>;

    fn grab_server(&mut self) -> Result<(), X11Error>;
    fn ungrab_server(&mut self) -> Result<(), X11Error>;
    fn flush(&mut self) -> Result<(), X11Error>;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Holds the X server grabbed until dropped.
pub struct ServerGrab<'a> {
    conn: &'a mut dyn X11Connection,
}

impl<'a> ServerGrab<'a> {
    pub fn new(conn: &'a mut dyn X11Connection) -> Result<Self, X11Error> {
        conn.grab_server()?;
        Ok(Self { conn })
    }
}

impl<'a> Deref for ServerGrab<'a> {
    type Target = dyn X11Connection + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.conn
    }
}

impl<'a> DerefMut for ServerGrab<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.conn
    }
}

impl Drop for ServerGrab<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.conn.ungrab_server() {
            warn!("error ungrabbing the X server: {err}");
        }
        if let Err(err) = self.conn.flush() {
            warn!("error flushing the X connection: {err}");
        }
    }
}

/// Writes `WM_STATE` for the mapping state of a managed window.
pub fn set_wm_state(
    conn: &mut dyn X11Connection,
    window: u32,
    state: MappingState,
) -> Result<(), X11Error> {
    // ICCCM WithdrawnState, NormalState and IconicState.
    let value = match state {
        MappingState::Withdrawn => 0,
        MappingState::Mapped => 1,
        MappingState::Kept => 3,
    };
    let wm_state = conn.atoms().WM_STATE;
    if state == MappingState::Withdrawn {
        conn.delete_property(window, wm_state)
    } else {
        conn.change_property32(window, wm_state, wm_state, &[value, ATOM_NONE])
    }
}

/// Focuses an X11 client, following its `WM_TAKE_FOCUS` and input hint.
pub fn focus_window(
    conn: &mut dyn X11Connection,
    window: u32,
    input_hint: bool,
    take_focus: bool,
    time: u32,
) -> Result<(), X11Error> {
    if input_hint {
        conn.set_input_focus(window, time)?;
    }
    if take_focus {
        let atoms = conn.atoms();
        let (protocols, take_focus) = (atoms.WM_PROTOCOLS, atoms.WM_TAKE_FOCUS);
        conn.send_client_message(window, protocols, [take_focus, time, 0, 0, 0])?;
    }
    Ok(())
}

/// Asks the client to close the window.
pub fn send_delete_window(conn: &mut dyn X11Connection, window: u32) -> Result<(), X11Error> {
    let atoms = conn.atoms();
    let (protocols, delete) = (atoms.WM_PROTOCOLS, atoms.WM_DELETE_WINDOW);
    conn.send_client_message(window, protocols, [delete, CURRENT_TIME, 0, 0, 0])
}

/// Applies a stacking change to the X server.
pub fn propagate_stacking(
    conn: &mut dyn X11Connection,
    propagation: &X11Propagation,
) -> Result<(), X11Error> {
    let root = conn.root();
    let atoms = conn.atoms();
    let (client_list, client_list_stacking) =
        (atoms._NET_CLIENT_LIST, atoms._NET_CLIENT_LIST_STACKING);

    conn.restack(&propagation.restack)?;
    if let Some(list) = &propagation.client_list {
        conn.change_property32(root, client_list, ATOM_WINDOW, list)?;
    }
    conn.change_property32(
        root,
        client_list_stacking,
        ATOM_WINDOW,
        &propagation.client_list_stacking,
    )
}

pub fn set_active_window_property(
    conn: &mut dyn X11Connection,
    window: Option<u32>,
) -> Result<(), X11Error> {
    let root = conn.root();
    let property = conn.atoms()._NET_ACTIVE_WINDOW;
    conn.change_property32(root, property, ATOM_WINDOW, &[window.unwrap_or(ATOM_NONE)])
}

/// Publishes the virtual desktop state on the root window; desktops are numbered from 1.
pub fn set_desktop_properties(
    conn: &mut dyn X11Connection,
    count: u32,
    current: u32,
) -> Result<(), X11Error> {
    let root = conn.root();
    let atoms = conn.atoms();
    let (number, current_atom) = (atoms._NET_NUMBER_OF_DESKTOPS, atoms._NET_CURRENT_DESKTOP);
    conn.change_property32(root, number, ATOM_CARDINAL, &[count])?;
    conn.change_property32(root, current_atom, ATOM_CARDINAL, &[current.saturating_sub(1)])
}

/// Request sent through a [`RecordingConnection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    CreateFrame(u32, FrameWindows),
    DestroyFrame(u32),
    DiscardFrame(u32),
    Map(u32),
    Unmap(u32),
    Configure(u32, Rectangle<i32, Logical>),
    ConfigureNotify(u32, Rectangle<i32, Logical>),
    Restack(Vec<u32>),
    SetInputFocus(u32, u32),
    ClientMessage(u32, u32, [u32; 5]),
    ChangeProperty(u32, u32),
    DeleteProperty(u32, u32),
    GrabServer,
    UngrabServer,
}

/// Connection that keeps everything in memory.
#[derive(Debug)]
pub struct RecordingConnection {
    root: u32,
    atoms: Atoms,
    interned: HashMap<String, u32>,
    next_atom: u32,
    next_window: u32,
    properties: HashMap<(u32, u32), Vec<u32>>,
    properties8: HashMap<(u32, u32), Vec<u8>>,
    geometries: HashMap<u32, Rectangle<i32, Logical>>,
    parents: HashMap<u32, u32>,
    attributes: HashMap<u32, WindowAttributes>,
    /// Every window known to the server, oldest first.
    windows: Vec<u32>,
    requests: Vec<Request>,
    grabs: u32,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self {
            root: 1,
            atoms: Atoms::sequential(100),
            interned: HashMap::new(),
            next_atom: 1000,
            next_window: 0x200000,
            properties: HashMap::new(),
            properties8: HashMap::new(),
            geometries: HashMap::new(),
            parents: HashMap::new(),
            attributes: HashMap::new(),
            windows: Vec::new(),
            requests: Vec::new(),
            grabs: 0,
        }
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    pub fn take_requests(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.requests)
    }

    pub fn property(&self, window: u32, property: u32) -> Option<&[u32]> {
        self.properties.get(&(window, property)).map(Vec::as_slice)
    }

    pub fn property8(&self, window: u32, property: u32) -> Option<&[u8]> {
        self.properties8.get(&(window, property)).map(Vec::as_slice)
    }

    pub fn is_grabbed(&self) -> bool {
        self.grabs > 0
    }

    /// Sets a property as if a client had written it.
    pub fn set_property(&mut self, window: u32, property: u32, data: &[u32]) {
        self.properties.insert((window, property), data.to_vec());
    }

    pub fn set_geometry(&mut self, window: u32, geometry: Rectangle<i32, Logical>) {
        self.geometries.insert(window, geometry);
    }

    /// Creates a top-level client window as if a client had done it.
    pub fn add_window(&mut self, window: u32, attributes: WindowAttributes) {
        self.windows.retain(|w| *w != window);
        self.windows.push(window);
        self.parents.insert(window, self.root);
        self.attributes.insert(window, attributes);
    }

    /// Reparents a window as if a client had done it.
    pub fn reparent(&mut self, window: u32, parent: u32) {
        self.parents.insert(window, parent);
    }

    fn new_window(&mut self) -> u32 {
        self.next_window += 1;
        self.windows.push(self.next_window);
        self.next_window
    }
}

impl Default for RecordingConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl X11Connection for RecordingConnection {
    fn root(&self) -> u32 {
        self.root
    }

    fn atoms(&self) -> &Atoms {
        &self.atoms
    }

    fn intern_atom(&mut self, name: &str) -> Result<u32, X11Error> {
        if let Some(atom) = self.interned.get(name) {
            return Ok(*atom);
        }
        self.next_atom += 1;
        self.interned.insert(name.to_owned(), self.next_atom);
        Ok(self.next_atom)
    }

    fn create_frame(
        &mut self,
        window: u32,
        _geometry: Rectangle<i32, Logical>,
    ) -> Result<FrameWindows, X11Error> {
        let frame = FrameWindows {
            frame: self.new_window(),
            wrapper: self.new_window(),
        };
        self.parents.insert(frame.frame, self.root);
        self.parents.insert(frame.wrapper, frame.frame);
        self.parents.insert(window, frame.wrapper);
        self.requests.push(Request::CreateFrame(window, frame));
        Ok(frame)
    }

    fn destroy_frame(&mut self, window: u32, frame: FrameWindows) -> Result<(), X11Error> {
        self.parents.insert(window, self.root);
        self.windows.retain(|w| *w != frame.frame && *w != frame.wrapper);
        self.requests.push(Request::DestroyFrame(window));
        Ok(())
    }

    fn discard_frame(&mut self, frame: FrameWindows) -> Result<(), X11Error> {
        self.windows.retain(|w| *w != frame.frame && *w != frame.wrapper);
        self.requests.push(Request::DiscardFrame(frame.frame));
        Ok(())
    }

    fn query_tree(&mut self, window: u32) -> Result<WindowTree, X11Error> {
        let parent = if window == self.root {
            x11rb::NONE
        } else {
            self.parents.get(&window).copied().unwrap_or(self.root)
        };
        let children = self
            .windows
            .iter()
            .copied()
            .filter(|w| self.parents.get(w).copied().unwrap_or(self.root) == window)
            .collect();
        Ok(WindowTree { parent, children })
    }

    fn get_window_attributes(&mut self, window: u32) -> Result<WindowAttributes, X11Error> {
        Ok(self.attributes.get(&window).copied().unwrap_or(WindowAttributes {
            map_state: MapState::Viewable,
            ..Default::default()
        }))
    }

    fn get_geometry(&mut self, window: u32) -> Result<Rectangle<i32, Logical>, X11Error> {
        let geometry = self.geometries.get(&window).copied();
        Ok(geometry.unwrap_or_else(|| Rectangle::new((0, 0).into(), (1, 1).into())))
    }

    fn map_window(&mut self, window: u32) -> Result<(), X11Error> {
        self.requests.push(Request::Map(window));
        Ok(())
    }

    fn unmap_window(&mut self, window: u32) -> Result<(), X11Error> {
        self.requests.push(Request::Unmap(window));
        Ok(())
    }

    fn configure_window(
        &mut self,
        window: u32,
        geometry: Rectangle<i32, Logical>,
    ) -> Result<(), X11Error> {
        self.geometries.insert(window, geometry);
        self.requests.push(Request::Configure(window, geometry));
        Ok(())
    }

    fn send_configure_notify(
        &mut self,
        window: u32,
        geometry: Rectangle<i32, Logical>,
    ) -> Result<(), X11Error> {
        self.requests.push(Request::ConfigureNotify(window, geometry));
        Ok(())
    }

    fn restack(&mut self, windows: &[u32]) -> Result<(), X11Error> {
        self.requests.push(Request::Restack(windows.to_vec()));
        Ok(())
    }

    fn set_input_focus(&mut self, window: u32, time: u32) -> Result<(), X11Error> {
        self.requests.push(Request::SetInputFocus(window, time));
        Ok(())
    }

    fn send_client_message(
        &mut self,
        window: u32,
        message_type: u32,
        data: [u32; 5],
    ) -> Result<(), X11Error> {
        self.requests
            .push(Request::ClientMessage(window, message_type, data));
        Ok(())
    }

    fn change_property32(
        &mut self,
        window: u32,
        property: u32,
        _type_: u32,
        data: &[u32],
    ) -> Result<(), X11Error> {
        self.properties.insert((window, property), data.to_vec());
        self.requests.push(Request::ChangeProperty(window, property));
        Ok(())
    }

    fn change_property8(
        &mut self,
        window: u32,
        property: u32,
        _type_: u32,
        data: &[u8],
    ) -> Result<(), X11Error> {
        self.properties8.insert((window, property), data.to_vec());
        self.requests.push(Request::ChangeProperty(window, property));
        Ok(())
    }

    fn delete_property(&mut self, window: u32, property: u32) -> Result<(), X11Error> {
        self.properties.remove(&(window, property));
        self.properties8.remove(&(window, property));
        self.requests.push(Request::DeleteProperty(window, property));
        Ok(())
    }

    fn get_property32(
        &mut self,
        window: u32,
        property: u32,
    ) -> Result<Option<Vec<u32>>, X11Error> {
        Ok(self.properties.get(&(window, property)).cloned())
    }

    fn grab_server(&mut self) -> Result<(), X11Error> {
        self.grabs += 1;
        self.requests.push(Request::GrabServer);
        Ok(())
    }

    fn ungrab_server(&mut self) -> Result<(), X11Error> {
        self.grabs = self.grabs.saturating_sub(1);
        self.requests.push(Request::UngrabServer);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), X11Error> {
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_grab_is_released_on_drop() {
        let mut conn = RecordingConnection::new();
        {
            let mut grab = ServerGrab::new(&mut conn).unwrap();
            grab.map_window(5).unwrap();
        }
        assert!(!conn.is_grabbed());
        assert_eq!(
            conn.requests(),
            &[Request::GrabServer, Request::Map(5), Request::UngrabServer]
        );
    }

    #[test]
    fn server_grab_is_released_on_early_return() {
        fn configure(conn: &mut dyn X11Connection) -> Result<(), X11Error> {
            let _grab = ServerGrab::new(conn)?;
            Err(X11Error::WmRunning)
        }

        let mut conn = RecordingConnection::new();
        assert!(configure(&mut conn).is_err());
        assert!(!conn.is_grabbed());
    }

    #[test]
    fn wm_state_follows_mapping() {
        let mut conn = RecordingConnection::new();
        let wm_state = conn.atoms().WM_STATE;
        set_wm_state(&mut conn, 7, MappingState::Mapped).unwrap();
        assert_eq!(conn.property(7, wm_state), Some(&[1, 0][..]));
        set_wm_state(&mut conn, 7, MappingState::Kept).unwrap();
        assert_eq!(conn.property(7, wm_state), Some(&[3, 0][..]));
        set_wm_state(&mut conn, 7, MappingState::Withdrawn).unwrap();
        assert_eq!(conn.property(7, wm_state), None);
    }

    #[test]
    fn take_focus_message() {
        let mut conn = RecordingConnection::new();
        let atoms = conn.atoms().clone();
        focus_window(&mut conn, 9, false, true, 1234).unwrap();
        assert_eq!(
            conn.requests(),
            &[Request::ClientMessage(
                9,
                atoms.WM_PROTOCOLS,
                [atoms.WM_TAKE_FOCUS, 1234, 0, 0, 0]
            )]
        );
    }

    #[test]
    fn stacking_is_propagated_to_root() {
        let mut conn = RecordingConnection::new();
        let atoms = conn.atoms().clone();
        let propagation = X11Propagation {
            restack: vec![10, 20, 30],
            client_list: Some(vec![30, 20]),
            client_list_stacking: vec![30, 20],
        };
        propagate_stacking(&mut conn, &propagation).unwrap();
        assert_eq!(conn.requests()[0], Request::Restack(vec![10, 20, 30]));
        assert_eq!(conn.property(1, atoms._NET_CLIENT_LIST), Some(&[30, 20][..]));
        assert_eq!(
            conn.property(1, atoms._NET_CLIENT_LIST_STACKING),
            Some(&[30, 20][..])
        );
    }
}
