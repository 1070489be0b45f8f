//! Connection to a real X server.

use std::any::Any;
use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::net::UnixStream;

use smithay::utils::{Logical, Rectangle};
use x11rb::connection::{Connection as _, RequestConnection as _};
use x11rb::protocol::composite::ConnectionExt as _;
use x11rb::protocol::damage::ConnectionExt as _;
use x11rb::protocol::randr::ConnectionExt as _;
use x11rb::protocol::shape::ConnectionExt as _;
use x11rb::protocol::sync::ConnectionExt as _;
use x11rb::protocol::xfixes::ConnectionExt as _;
use x11rb::protocol::xproto::{
    AtomEnum, ChangeWindowAttributesAux, ClientMessageEvent, ConfigureNotifyEvent,
    ConfigureWindowAux, ConnectionExt as _, CreateWindowAux, EventMask, InputFocus, MapState,
    PropMode, SetMode, StackMode, WindowClass, CONFIGURE_NOTIFY_EVENT,
};
use x11rb::protocol::{composite, damage, randr, shape, sync, xfixes, ErrorKind};
use x11rb::errors::ConnectError;
use x11rb::rust_connection::{DefaultStream, RustConnection};
use x11rb::wrapper::ConnectionExt as _;

use super::events::X11Event;
use super::{Atoms, FrameWindows, WindowAttributes, WindowTree, X11Connection, X11Error};

/// Lowest extension versions the window manager works with.
const REQUIRED_EXTENSIONS: [(&str, u32, u32); 6] = [
    (composite::X11_EXTENSION_NAME, 0, 3),
    (damage::X11_EXTENSION_NAME, 1, 1),
    (xfixes::X11_EXTENSION_NAME, 3, 0),
    (randr::X11_EXTENSION_NAME, 1, 4),
    (shape::X11_EXTENSION_NAME, 1, 1),
    (sync::X11_EXTENSION_NAME, 3, 0),
];

pub struct XConnection {
    conn: RustConnection,
    screen: usize,
    root: u32,
    atoms: Atoms,
    /// `_NET_SUPPORTING_WM_CHECK` window.
    support_window: u32,
}

impl XConnection {
    /// Connects and takes over window management of the default screen.
    pub fn connect(display: Option<&str>) -> Result<Self, X11Error> {
        let _span = tracy_client::span!("XConnection::connect");

        let (conn, screen) = RustConnection::connect(display)?;
        Self::take_over(conn, screen)
    }

    /// Takes over window management through an already connected socket, like the one Xwayland
    /// is started with.
    pub fn from_stream(stream: UnixStream) -> Result<Self, X11Error> {
        let _span = tracy_client::span!("XConnection::from_stream");

        let (stream, _) = DefaultStream::from_unix_stream(stream).map_err(ConnectError::from)?;
        let conn = RustConnection::connect_to_stream(stream, 0)?;
        Self::take_over(conn, 0)
    }

    fn take_over(conn: RustConnection, screen: usize) -> Result<Self, X11Error> {
        let root = conn.setup().roots[screen].root;
        let atoms = Atoms::new(&conn)?.reply()?;

        let mut rv = Self {
            conn,
            screen,
            root,
            atoms,
            support_window: 0,
        };
        rv.check_extensions()?;
        rv.become_wm()?;
        Ok(rv)
    }

    pub fn screen(&self) -> usize {
        self.screen
    }

    pub fn support_window(&self) -> u32 {
        self.support_window
    }

    /// Duplicated connection fd for polling in the event loop.
    pub fn fd(&self) -> std::io::Result<OwnedFd> {
        self.conn.stream().as_fd().try_clone_to_owned()
    }

    /// Returns the next event the window manager handles, skipping the others.
    pub fn poll_event(&mut self) -> Result<Option<X11Event>, X11Error> {
        while let Some(event) = self.conn.poll_for_event()? {
            if let Some(event) = X11Event::from_x11rb(&event) {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    fn check_extensions(&self) -> Result<(), X11Error> {
        for (name, major, minor) in REQUIRED_EXTENSIONS {
            if self.conn.extension_information(name)?.is_none() {
                return Err(X11Error::MissingExtension { name, major, minor });
            }
            let version = self.query_version(name)?;
            debug!("{name} extension {}.{}", version.0, version.1);
            if version < (major, minor) {
                return Err(X11Error::MissingExtension { name, major, minor });
            }
        }
        Ok(())
    }

    fn query_version(&self, name: &str) -> Result<(u32, u32), X11Error> {
        let version = match name {
            composite::X11_EXTENSION_NAME => {
                let r = self.conn.composite_query_version(0, 4)?.reply()?;
                (r.major_version, r.minor_version)
            }
            damage::X11_EXTENSION_NAME => {
                let r = self.conn.damage_query_version(1, 1)?.reply()?;
                (r.major_version, r.minor_version)
            }
            xfixes::X11_EXTENSION_NAME => {
                let r = self.conn.xfixes_query_version(5, 0)?.reply()?;
                (r.major_version, r.minor_version)
            }
            randr::X11_EXTENSION_NAME => {
                let r = self.conn.randr_query_version(1, 6)?.reply()?;
                (r.major_version, r.minor_version)
            }
            shape::X11_EXTENSION_NAME => {
                let r = self.conn.shape_query_version()?.reply()?;
                (u32::from(r.major_version), u32::from(r.minor_version))
            }
            sync::X11_EXTENSION_NAME => {
                let r = self.conn.sync_initialize(3, 1)?.reply()?;
                (u32::from(r.major_version), u32::from(r.minor_version))
            }
            _ => (0, 0),
        };
        Ok(version)
    }

    fn become_wm(&mut self) -> Result<(), X11Error> {
        let mask = EventMask::SUBSTRUCTURE_REDIRECT
            | EventMask::SUBSTRUCTURE_NOTIFY
            | EventMask::PROPERTY_CHANGE
            | EventMask::FOCUS_CHANGE;
        let attrs = ChangeWindowAttributesAux::new().event_mask(mask);
        match self.conn.change_window_attributes(self.root, &attrs)?.check() {
            Ok(()) => (),
            Err(x11rb::errors::ReplyError::X11Error(err)) if err.error_kind == ErrorKind::Access => {
                return Err(X11Error::WmRunning);
            }
            Err(err) => return Err(err.into()),
        }

        let support = self.conn.generate_id()?;
        self.conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            support,
            self.root,
            -1,
            -1,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new().override_redirect(1),
        )?;
        self.support_window = support;

        let atoms = self.atoms;
        for window in [self.root, support] {
            self.conn.change_property32(
                PropMode::REPLACE,
                window,
                atoms._NET_SUPPORTING_WM_CHECK,
                AtomEnum::WINDOW,
                &[support],
            )?;
        }
        self.conn.change_property8(
            PropMode::REPLACE,
            support,
            atoms._NET_WM_NAME,
            atoms.UTF8_STRING,
            b"strata",
        )?;

        let supported = [
            atoms._NET_SUPPORTED,
            atoms._NET_SUPPORTING_WM_CHECK,
            atoms._NET_ACTIVE_WINDOW,
            atoms._NET_CLIENT_LIST,
            atoms._NET_CLIENT_LIST_STACKING,
            atoms._NET_NUMBER_OF_DESKTOPS,
            atoms._NET_CURRENT_DESKTOP,
            atoms._NET_WORKAREA,
            atoms._NET_WM_DESKTOP,
            atoms._NET_WM_STATE,
            atoms._NET_WM_STATE_MODAL,
            atoms._NET_WM_STATE_MAXIMIZED_VERT,
            atoms._NET_WM_STATE_MAXIMIZED_HORZ,
            atoms._NET_WM_STATE_HIDDEN,
            atoms._NET_WM_STATE_FULLSCREEN,
            atoms._NET_WM_STATE_ABOVE,
            atoms._NET_WM_STATE_BELOW,
            atoms._NET_WM_STATE_DEMANDS_ATTENTION,
            atoms._NET_WM_WINDOW_TYPE,
            atoms._NET_WM_STRUT,
            atoms._NET_WM_STRUT_PARTIAL,
            atoms._NET_WM_USER_TIME,
            atoms._NET_WM_SYNC_REQUEST,
            atoms._NET_WM_OPAQUE_REGION,
            atoms._NET_CLOSE_WINDOW,
            atoms._GTK_FRAME_EXTENTS,
        ];
        self.conn.change_property32(
            PropMode::REPLACE,
            self.root,
            atoms._NET_SUPPORTED,
            AtomEnum::ATOM,
            &supported,
        )?;
        self.conn.flush()?;
        info!("managing X11 screen {}", self.screen);
        Ok(())
    }
}

impl X11Connection for XConnection {
    fn root(&self) -> u32 {
        self.root
    }

    fn atoms(&self) -> &Atoms {
        &self.atoms
    }

    fn intern_atom(&mut self, name: &str) -> Result<u32, X11Error> {
        Ok(self.conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
    }

    fn create_frame(
        &mut self,
        window: u32,
        geometry: Rectangle<i32, Logical>,
    ) -> Result<FrameWindows, X11Error> {
        let w = geometry.size.w.max(1) as u16;
        let h = geometry.size.h.max(1) as u16;
        let mask = EventMask::SUBSTRUCTURE_REDIRECT
            | EventMask::SUBSTRUCTURE_NOTIFY
            | EventMask::ENTER_WINDOW
            | EventMask::BUTTON_PRESS
            | EventMask::BUTTON_RELEASE;

        let frame = self.conn.generate_id()?;
        self.conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            frame,
            self.root,
            geometry.loc.x as i16,
            geometry.loc.y as i16,
            w,
            h,
            0,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new().event_mask(mask),
        )?;

        let wrapper = self.conn.generate_id()?;
        self.conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            wrapper,
            frame,
            0,
            0,
            w,
            h,
            0,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new()
                .event_mask(EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY),
        )?;

        self.conn.change_save_set(SetMode::INSERT, window)?;
        self.conn.reparent_window(window, wrapper, 0, 0)?;
        self.conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new()
                .event_mask(EventMask::PROPERTY_CHANGE | EventMask::FOCUS_CHANGE),
        )?;
        self.conn.map_window(wrapper)?;
        Ok(FrameWindows { frame, wrapper })
    }

    fn destroy_frame(&mut self, window: u32, frame: FrameWindows) -> Result<(), X11Error> {
        self.conn.reparent_window(window, self.root, 0, 0)?;
        self.conn.change_save_set(SetMode::DELETE, window)?;
        self.conn.destroy_window(frame.frame)?;
        Ok(())
    }

    fn discard_frame(&mut self, frame: FrameWindows) -> Result<(), X11Error> {
        self.conn.destroy_window(frame.frame)?;
        Ok(())
    }

    fn query_tree(&mut self, window: u32) -> Result<WindowTree, X11Error> {
        let reply = self.conn.query_tree(window)?.reply()?;
        Ok(WindowTree {
            parent: reply.parent,
            children: reply.children,
        })
    }

    fn get_window_attributes(&mut self, window: u32) -> Result<WindowAttributes, X11Error> {
        let reply = self.conn.get_window_attributes(window)?.reply()?;
        let map_state = match reply.map_state {
            MapState::VIEWABLE => super::MapState::Viewable,
            MapState::UNVIEWABLE => super::MapState::Unviewable,
            _ => super::MapState::Unmapped,
        };
        Ok(WindowAttributes {
            override_redirect: reply.override_redirect,
            map_state,
            input_only: reply.class == WindowClass::INPUT_ONLY,
        })
    }

    fn get_geometry(&mut self, window: u32) -> Result<Rectangle<i32, Logical>, X11Error> {
        let reply = self.conn.get_geometry(window)?.reply()?;
        Ok(Rectangle::new(
            (i32::from(reply.x), i32::from(reply.y)).into(),
            (i32::from(reply.width), i32::from(reply.height)).into(),
        ))
    }

    fn map_window(&mut self, window: u32) -> Result<(), X11Error> {
        self.conn.map_window(window)?;
        Ok(())
    }

    fn unmap_window(&mut self, window: u32) -> Result<(), X11Error> {
        self.conn.unmap_window(window)?;
        Ok(())
    }

    fn configure_window(
        &mut self,
        window: u32,
        geometry: Rectangle<i32, Logical>,
    ) -> Result<(), X11Error> {
        let aux = ConfigureWindowAux::new()
            .x(geometry.loc.x)
            .y(geometry.loc.y)
            .width(geometry.size.w.max(1) as u32)
            .height(geometry.size.h.max(1) as u32);
        self.conn.configure_window(window, &aux)?;
        Ok(())
    }

    fn send_configure_notify(
        &mut self,
        window: u32,
        geometry: Rectangle<i32, Logical>,
    ) -> Result<(), X11Error> {
        let event = ConfigureNotifyEvent {
            response_type: CONFIGURE_NOTIFY_EVENT,
            sequence: 0,
            event: window,
            window,
            above_sibling: x11rb::NONE,
            x: geometry.loc.x as i16,
            y: geometry.loc.y as i16,
            width: geometry.size.w.max(1) as u16,
            height: geometry.size.h.max(1) as u16,
            border_width: 0,
            override_redirect: false,
        };
        self.conn
            .send_event(false, window, EventMask::STRUCTURE_NOTIFY, event)?;
        Ok(())
    }

    fn restack(&mut self, windows: &[u32]) -> Result<(), X11Error> {
        for pair in windows.windows(2) {
            let aux = ConfigureWindowAux::new()
                .sibling(pair[0])
                .stack_mode(StackMode::BELOW);
            self.conn.configure_window(pair[1], &aux)?;
        }
        Ok(())
    }

    fn set_input_focus(&mut self, window: u32, time: u32) -> Result<(), X11Error> {
        self.conn
            .set_input_focus(InputFocus::POINTER_ROOT, window, time)?;
        Ok(())
    }

    fn send_client_message(
        &mut self,
        window: u32,
        message_type: u32,
        data: [u32; 5],
    ) -> Result<(), X11Error> {
        let event = ClientMessageEvent::new(32, window, message_type, data);
        self.conn
            .send_event(false, window, EventMask::NO_EVENT, event)?;
        Ok(())
    }

    fn change_property32(
        &mut self,
        window: u32,
        property: u32,
        type_: u32,
        data: &[u32],
    ) -> Result<(), X11Error> {
        self.conn
            .change_property32(PropMode::REPLACE, window, property, type_, data)?;
        Ok(())
    }

    fn change_property8(
        &mut self,
        window: u32,
        property: u32,
        type_: u32,
        data: &[u8],
    ) -> Result<(), X11Error> {
        self.conn
            .change_property8(PropMode::REPLACE, window, property, type_, data)?;
        Ok(())
    }

    fn delete_property(&mut self, window: u32, property: u32) -> Result<(), X11Error> {
        self.conn.delete_property(window, property)?;
        Ok(())
    }

    fn get_property32(
        &mut self,
        window: u32,
        property: u32,
    ) -> Result<Option<Vec<u32>>, X11Error> {
        let reply = self
            .conn
            .get_property(false, window, property, AtomEnum::ANY, 0, u32::MAX / 4)?
            .reply()?;
        Ok(reply.value32().map(|v| v.collect()))
    }

    fn grab_server(&mut self) -> Result<(), X11Error> {
        self.conn.grab_server()?;
        Ok(())
    }

    fn ungrab_server(&mut self) -> Result<(), X11Error> {
        self.conn.ungrab_server()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), X11Error> {
        self.conn.flush()?;
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for XConnection {
    fn drop(&mut self) {
        if self.support_window != 0 {
            let _ = self.conn.destroy_window(self.support_window);
            let _ = self.conn.delete_property(self.root, self.atoms._NET_SUPPORTING_WM_CHECK);
            let _ = self.conn.flush();
        }
    }
}
