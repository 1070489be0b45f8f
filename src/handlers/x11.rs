use smithay::utils::{Logical, Rectangle};

use crate::display::{SurfaceId, SurfaceRole};
use crate::effects::paint::EffectWindow;
use crate::strata::Strata;
use crate::window::decoration::Decoration;
use crate::window::rules::WindowRules;
use crate::window::x11::{parse_gtk_frame_extents, MappingState, MotifHints, X11State};
use crate::window::{MaximizeMode, Window, WindowId, WindowKind, WindowType};
use crate::x11::events::{
    find_owner, ConfigureMask, ConfigureRequest, NotifyDetail, NotifyMode, Owner, StackMode,
    X11Event,
};
use crate::x11::connection::XConnection;
use crate::x11::{self, Atoms, MapState, ServerGrab, X11Connection, X11Error, ATOM_ATOM};

// _NET_WM_STATE actions.
const STATE_REMOVE: u32 = 0;
const STATE_ADD: u32 = 1;
const STATE_TOGGLE: u32 = 2;

/// `_NET_ACTIVE_WINDOW` source indication of pagers and taskbars.
const SOURCE_PAGER: u32 = 2;

/// ICCCM IconicState requested through `WM_CHANGE_STATE`.
const ICONIC_STATE: u32 = 3;

/// Properties read when a window starts being managed.
#[derive(Debug, Default)]
struct X11Properties {
    geometry: Rectangle<i32, Logical>,
    window_type: WindowType,
    user_time: Option<u32>,
    leader: u32,
    pid: Option<i32>,
    motif: Option<MotifHints>,
    gtk_frame_extents: Option<crate::window::Margins>,
}

fn window_type_from_atoms(atoms: &Atoms, types: &[u32]) -> WindowType {
    // The first type we know of wins.
    for &atom in types {
        let window_type = match atom {
            a if a == atoms._NET_WM_WINDOW_TYPE_NORMAL => WindowType::Normal,
            a if a == atoms._NET_WM_WINDOW_TYPE_DESKTOP => WindowType::Desktop,
            a if a == atoms._NET_WM_WINDOW_TYPE_DOCK => WindowType::Dock,
            a if a == atoms._NET_WM_WINDOW_TYPE_TOOLBAR => WindowType::Toolbar,
            a if a == atoms._NET_WM_WINDOW_TYPE_MENU => WindowType::Menu,
            a if a == atoms._NET_WM_WINDOW_TYPE_DIALOG => WindowType::Dialog,
            a if a == atoms._NET_WM_WINDOW_TYPE_UTILITY => WindowType::Utility,
            a if a == atoms._NET_WM_WINDOW_TYPE_SPLASH => WindowType::Splash,
            a if a == atoms._NET_WM_WINDOW_TYPE_NOTIFICATION => WindowType::Notification,
            a if a == atoms._NET_WM_WINDOW_TYPE_TOOLTIP => WindowType::Tooltip,
            a if a == atoms._NET_WM_WINDOW_TYPE_COMBO => WindowType::ComboBox,
            a if a == atoms._NET_WM_WINDOW_TYPE_DROPDOWN_MENU => WindowType::DropdownMenu,
            a if a == atoms._NET_WM_WINDOW_TYPE_POPUP_MENU => WindowType::PopupMenu,
            _ => continue,
        };
        return window_type;
    }
    WindowType::Normal
}

fn read_properties(conn: &mut dyn X11Connection, xid: u32) -> Result<X11Properties, X11Error> {
    let atoms = conn.atoms().clone();
    let mut grab = ServerGrab::new(conn)?;

    let geometry = grab.get_geometry(xid)?;
    let types = grab
        .get_property32(xid, atoms._NET_WM_WINDOW_TYPE)?
        .unwrap_or_default();
    let first = |data: Option<Vec<u32>>| data.and_then(|d| d.first().copied());
    let user_time = first(grab.get_property32(xid, atoms._NET_WM_USER_TIME)?);
    let leader = first(grab.get_property32(xid, atoms.WM_CLIENT_LEADER)?).unwrap_or(0);
    let pid = first(grab.get_property32(xid, atoms._NET_WM_PID)?)
        .and_then(|pid| i32::try_from(pid).ok());
    let motif = grab
        .get_property32(xid, atoms._MOTIF_WM_HINTS)?
        .map(|data| MotifHints::parse(&data));
    let gtk_frame_extents = grab
        .get_property32(xid, atoms._GTK_FRAME_EXTENTS)?
        .and_then(|data| parse_gtk_frame_extents(&data));

    Ok(X11Properties {
        geometry,
        window_type: window_type_from_atoms(&atoms, &types),
        user_time,
        leader,
        pid,
        motif,
        gtk_frame_extents,
    })
}

impl Strata {
    /// Handles every event queued on a real X server connection.
    pub fn dispatch_x11_events(&mut self) {
        loop {
            let Some(conn) = self.x11.as_deref_mut() else {
                return;
            };
            let Some(conn) = conn.as_any_mut().downcast_mut::<XConnection>() else {
                return;
            };
            match conn.poll_event() {
                Ok(Some(event)) => self.handle_x11_event(event),
                Ok(None) => break,
                Err(err) => {
                    warn!("error reading X11 events: {err}");
                    break;
                }
            }
        }
    }

    pub fn handle_x11_event(&mut self, event: X11Event) {
        let _span = tracy_client::span!("Strata::handle_x11_event");
        trace!("X11 event: {event:?}");

        let owner = find_owner(&self.workspace, event.event_window());
        match event {
            X11Event::MapRequest { window, .. } => match owner {
                Some(owner) => self.set_minimized(owner.id(), false),
                None => self.manage_x11_window(window),
            },
            X11Event::MapNotify {
                window,
                override_redirect: true,
                ..
            } => {
                if owner.is_none() {
                    self.manage_unmanaged_window(window);
                }
            }
            X11Event::MapNotify { .. } => (),
            X11Event::UnmapNotify {
                event,
                window,
                synthetic,
            } => match find_owner(&self.workspace, window) {
                Some(Owner::Unmanaged(id)) => self.release_window(id),
                Some(Owner::Window(id)) => self.x11_unmap_notify(id, event, synthetic),
                _ => (),
            },
            X11Event::DestroyNotify { window, .. } => match find_owner(&self.workspace, window) {
                Some(Owner::Window(id)) => self.release_x11_window(id, true),
                Some(Owner::Unmanaged(id)) => self.release_window(id),
                _ => (),
            },
            X11Event::ConfigureRequest(request) => self.x11_configure_request(owner, request),
            X11Event::ConfigureNotify {
                window, geometry, ..
            } => {
                if let Some(Owner::Unmanaged(id)) = find_owner(&self.workspace, window) {
                    if let Some(window) = self.workspace.window_mut(id) {
                        window.set_frame_geometry(geometry);
                    }
                    self.geometry_changed(id);
                }
            }
            X11Event::PropertyNotify { window, atom, time, .. } => {
                let id = owner.map(Owner::id);
                self.effects.property_notify(id, atom);
                let user_time = self.x11.as_deref().map(|c| c.atoms()._NET_WM_USER_TIME);
                if let (Some(Owner::Window(id)), Some(user_time)) = (owner, user_time) {
                    if atom == user_time {
                        trace!("user time of {window:#x} changed at {time}");
                        self.update_x11_user_time(id);
                    }
                }
            }
            X11Event::FocusIn { window, mode, detail } => {
                self.x11_focus_in(owner, window, mode, detail);
            }
            X11Event::FocusOut { mode, detail, .. } => {
                if mode == NotifyMode::Grab
                    || !matches!(detail, NotifyDetail::Nonlinear | NotifyDetail::NonlinearVirtual)
                {
                    return;
                }
                if let Some(Owner::Window(id)) = owner {
                    self.pending_focus_out = Some(id);
                }
            }
            X11Event::ClientMessage {
                window,
                message_type,
                data,
            } => self.x11_client_message(window, message_type, data),
            X11Event::ButtonPress { time, .. } => {
                if let Some(owner @ (Owner::Frame(_) | Owner::Wrapper(_) | Owner::Window(_))) =
                    owner
                {
                    let id = owner.id();
                    self.workspace.update_user_time(id, time);
                    self.workspace.activate_window(Some(id), false);
                    self.process_workspace_events();
                }
            }
            X11Event::KeyPress { time, .. } => {
                if let Some(Owner::Window(id)) = owner {
                    self.workspace.update_user_time(id, time);
                }
            }
            X11Event::DamageNotify { .. } | X11Event::ShapeNotify { .. } => {
                if let Some(owner) = owner {
                    self.sync_window(owner.id());
                    self.compositor.queue_redraw_all();
                }
            }
            X11Event::ButtonRelease { .. } | X11Event::EnterNotify { .. } => (),
        }
    }

    /// Takes over the windows that existed before the window manager connected.
    pub(crate) fn adopt_x11_windows(&mut self) {
        let Some(conn) = self.x11.as_deref_mut() else {
            return;
        };
        let root = conn.root();
        let children = match conn.query_tree(root) {
            Ok(tree) => tree.children,
            Err(err) => {
                warn!("error listing the existing X11 windows: {err}");
                return;
            }
        };

        self.workspace.block_stacking_updates(true);
        for xid in children {
            let Some(conn) = self.x11.as_deref_mut() else {
                break;
            };
            let attrs = match conn.get_window_attributes(xid) {
                Ok(attrs) => attrs,
                Err(err) => {
                    debug!("error getting the attributes of X11 window {xid:#x}: {err}");
                    continue;
                }
            };
            if find_owner(&self.workspace, xid).is_some() {
                continue;
            }

            if attrs.override_redirect {
                if attrs.map_state == MapState::Viewable && !attrs.input_only {
                    self.manage_unmanaged_window(xid);
                }
            } else if attrs.map_state != MapState::Unmapped {
                self.manage_x11_window(xid);
            }
        }
        self.workspace.update_stacking_order(true);
        self.workspace.block_stacking_updates(false);
        self.process_workspace_events();
    }

    /// Starts managing a client window that asked to be mapped.
    fn manage_x11_window(&mut self, xid: u32) {
        let Some(conn) = self.x11.as_deref_mut() else {
            return;
        };
        let props = match read_properties(conn, xid) {
            Ok(props) => props,
            Err(err) => {
                warn!("error reading the properties of X11 window {xid:#x}: {err}");
                return;
            }
        };
        let frames = match conn.create_frame(xid, props.geometry) {
            Ok(frames) => frames,
            Err(err) => {
                warn!("error creating a frame for X11 window {xid:#x}: {err}");
                return;
            }
        };

        let mut window = Window::new(WindowKind::X11Managed);
        let mut state = X11State::managed(xid, frames.frame, frames.wrapper);
        state.leader = props.leader;
        state.user_creation_time = props.user_time;
        if let Some(motif) = props.motif {
            state.motif = motif;
        }
        state.gtk_frame_extents = props.gtk_frame_extents;

        let decorated = props.gtk_frame_extents.is_none()
            && !(state.motif.has_decorations && state.motif.no_border)
            && !matches!(
                props.window_type,
                WindowType::Desktop | WindowType::Dock | WindowType::Splash
            );
        if decorated {
            window.decoration = Some(Decoration::default());
        }
        if let Some(extents) = props.gtk_frame_extents {
            window.client_frame_extents = extents;
        }

        window.window_type = props.window_type;
        window.pid = props.pid;
        window.user_time = props.user_time;
        window.window_geometry = Rectangle::from_size(props.geometry.size);
        window.set_buffer_size(props.geometry.size);
        window.ready_for_painting = true;
        if props.leader != 0 {
            window.group = Some(self.workspace.group_for_leader(props.leader));
        }
        window.rules = WindowRules::compute(&self.config.borrow(), &window.match_props());

        let current = self.workspace.current_desktop();
        window.desktop = window.rules.check_desktop(current, true);
        window.states.keep_above = window.rules.check_keep_above(false, true);
        window.states.keep_below = window.rules.check_keep_below(false, true);
        let client_rect = props.geometry;
        let frame = window.client_rect_to_frame_rect(client_rect);
        window.set_frame_geometry(frame);
        state.mapping_state = MappingState::Mapped;
        window.x11 = Some(state);

        let id = self.workspace.add_window(window);
        debug!("managing X11 window {xid:#x} as {id:?}");

        let placed = self.workspace.place_window(id, frame.size).unwrap_or(frame);
        self.request_geometry(id, placed);

        if let Some(conn) = self.x11.as_deref_mut() {
            let result = x11::set_wm_state(conn, xid, MappingState::Mapped)
                .and_then(|()| conn.map_window(xid))
                .and_then(|()| conn.map_window(frames.wrapper))
                .and_then(|()| conn.map_window(frames.frame));
            if let Err(err) = result {
                warn!("error mapping X11 window {xid:#x}: {err}");
            }
        }

        self.workspace.update_window_outputs(&self.outputs);
        if let Some(window) = self.workspace.window(id) {
            self.effects.window_added(&EffectWindow::new(window));
        }
        self.workspace.activate_mapped_window(id);
        if self
            .workspace
            .window(id)
            .is_some_and(|w| w.rules.check_minimize(false, true))
        {
            self.set_minimized(id, true);
        }
        self.update_net_wm_state(id);
        self.process_workspace_events();
        self.sync_window(id);
    }

    fn manage_unmanaged_window(&mut self, xid: u32) {
        let Some(conn) = self.x11.as_deref_mut() else {
            return;
        };
        let geometry = match conn.get_geometry(xid) {
            Ok(geometry) => geometry,
            Err(err) => {
                debug!("error getting the geometry of override-redirect {xid:#x}: {err}");
                return;
            }
        };

        let mut window = Window::new(WindowKind::X11Unmanaged);
        window.x11 = Some(X11State::unmanaged(xid));
        window.wants_input = false;
        window.on_all_desktops = true;
        window.ready_for_painting = true;
        window.window_geometry = Rectangle::from_size(geometry.size);
        window.set_buffer_size(geometry.size);
        window.set_frame_geometry(geometry);

        let id = self.workspace.add_window(window);
        trace!("tracking override-redirect {xid:#x} as {id:?}");
        self.workspace.update_window_outputs(&self.outputs);
        if let Some(window) = self.workspace.window(id) {
            self.effects.window_added(&EffectWindow::new(window));
        }
        self.process_workspace_events();
        self.sync_window(id);
    }

    fn x11_unmap_notify(&mut self, id: WindowId, event: u32, synthetic: bool) {
        let Some((xid, wrapper)) = self
            .workspace
            .window(id)
            .and_then(|w| w.x11.as_ref())
            .map(|x| (x.window, x.wrapper))
        else {
            return;
        };
        let Some(conn) = self.x11.as_deref_mut() else {
            return;
        };

        // Only unmaps seen through the wrapper and ICCCM withdrawals sent to the root count.
        if event != wrapper && !(event == conn.root() && synthetic) {
            trace!("ignoring unmap of {xid:#x} reported to {event:#x}");
            return;
        }

        // A client reparented away is no longer ours to give back to the root.
        match conn.query_tree(xid) {
            Ok(tree) if tree.parent == wrapper => self.release_x11_window(id, false),
            Ok(tree) => {
                debug!("X11 window {xid:#x} was reparented to {:#x}", tree.parent);
                self.release_x11_window(id, true);
            }
            Err(err) => {
                debug!("error querying the parent of X11 window {xid:#x}: {err}");
                self.release_x11_window(id, true);
            }
        }
    }

    /// Stops managing an X11 window.
    ///
    /// The client is only given back to the root when it still exists and is inside our wrapper;
    /// otherwise just the frame is destroyed.
    fn release_x11_window(&mut self, id: WindowId, gone: bool) {
        let state = self
            .workspace
            .window(id)
            .and_then(|w| w.x11.as_ref())
            .map(|x| (x.window, x.frame, x.wrapper));
        if let (Some(conn), Some((xid, frame, wrapper))) = (self.x11.as_deref_mut(), state) {
            let frames = x11::FrameWindows { frame, wrapper };
            let result = if gone {
                conn.discard_frame(frames)
            } else {
                x11::set_wm_state(conn, xid, MappingState::Withdrawn)
                    .and_then(|()| conn.destroy_frame(xid, frames))
            };
            if let Err(err) = result {
                warn!("error releasing X11 window {xid:#x}: {err}");
            }
        }
        if let Some(surface) = self.workspace.window(id).and_then(|w| w.surface) {
            self.surface_windows.remove(&surface);
        }
        self.release_window(id);
    }

    fn x11_configure_request(&mut self, owner: Option<Owner>, request: ConfigureRequest) {
        let Some(Owner::Window(id)) = owner else {
            // Not ours, let it through.
            if let Some(conn) = self.x11.as_deref_mut() {
                if let Err(err) = conn.configure_window(request.window, request.geometry) {
                    debug!("error configuring unmanaged {:#x}: {err}", request.window);
                }
            }
            return;
        };
        let Some(window) = self.workspace.window(id) else {
            return;
        };

        if window.interactive_move_resize || window.is_fullscreen() {
            // Tell the client it stays where it is.
            let client = window.client_geometry();
            if let (Some(conn), Some(state)) = (self.x11.as_deref_mut(), window.x11.as_ref()) {
                if let Err(err) = conn.send_configure_notify(state.window, client) {
                    warn!("error sending a configure notify: {err}");
                }
            }
            return;
        }

        let geometry_mask = ConfigureMask::X | ConfigureMask::Y | ConfigureMask::WIDTH
            | ConfigureMask::HEIGHT;
        if request.mask.intersects(geometry_mask) {
            let mut client = window.client_geometry();
            if request.mask.contains(ConfigureMask::X) {
                client.loc.x = request.geometry.loc.x;
            }
            if request.mask.contains(ConfigureMask::Y) {
                client.loc.y = request.geometry.loc.y;
            }
            if request.mask.contains(ConfigureMask::WIDTH) {
                client.size.w = request.geometry.size.w;
            }
            if request.mask.contains(ConfigureMask::HEIGHT) {
                client.size.h = request.geometry.size.h;
            }
            let mut frame = window.client_rect_to_frame_rect(client);
            if !window.maximize_mode().is_empty() {
                // Maximized windows keep the maximized edges.
                let current = window.frame_geometry();
                if window.maximize_mode().contains(MaximizeMode::HORIZONTAL) {
                    frame.loc.x = current.loc.x;
                    frame.size.w = current.size.w;
                }
                if window.maximize_mode().contains(MaximizeMode::VERTICAL) {
                    frame.loc.y = current.loc.y;
                    frame.size.h = current.size.h;
                }
            }
            self.request_geometry(id, frame);
        }

        if request.mask.contains(ConfigureMask::STACK_MODE) {
            let time = self
                .workspace
                .window(id)
                .and_then(|w| w.user_time)
                .unwrap_or(0);
            match request.stack_mode {
                StackMode::Above | StackMode::TopIf => {
                    if self.workspace.allow_full_client_raising(id, time) {
                        self.workspace.raise_window(id, false);
                    } else {
                        self.workspace.restack_window_under_active(id);
                    }
                }
                StackMode::Below | StackMode::BottomIf => self.workspace.lower_window(id, false),
                StackMode::Opposite => self.workspace.raise_or_lower_window(id),
            }
            self.process_workspace_events();
        }
    }

    fn x11_focus_in(
        &mut self,
        owner: Option<Owner>,
        window: u32,
        mode: NotifyMode,
        detail: NotifyDetail,
    ) {
        let root = self.x11.as_deref().map(|c| c.root());
        if Some(window) == root {
            if matches!(detail, NotifyDetail::PointerRoot | NotifyDetail::None) {
                debug!("focus went to the root window, restoring it");
                self.workspace.restore_focus();
                self.process_workspace_events();
            }
            return;
        }
        if mode == NotifyMode::Ungrab || detail == NotifyDetail::Pointer {
            return;
        }
        let Some(Owner::Window(id)) = owner else {
            return;
        };
        if self.pending_focus_out == Some(id) {
            self.pending_focus_out = None;
        }
        self.workspace.handle_focus_in(id);
        self.process_workspace_events();
    }

    /// Deactivates the window that lost focus without another one gaining it.
    pub(crate) fn flush_focus_out(&mut self) {
        if let Some(id) = self.pending_focus_out.take() {
            trace!("{id:?} lost focus");
            self.workspace.set_window_active(id, false);
            self.process_workspace_events();
        }
    }

    fn update_x11_user_time(&mut self, id: WindowId) {
        let Some(xid) = self
            .workspace
            .window(id)
            .and_then(|w| w.x11.as_ref())
            .map(|x| x.window)
        else {
            return;
        };
        let Some(conn) = self.x11.as_deref_mut() else {
            return;
        };
        let atom = conn.atoms()._NET_WM_USER_TIME;
        match conn.get_property32(xid, atom) {
            Ok(Some(data)) => {
                if let Some(&time) = data.first() {
                    self.workspace.update_user_time(id, time);
                }
            }
            Ok(None) => (),
            Err(err) => debug!("error reading the user time of {xid:#x}: {err}"),
        }
    }

    fn x11_client_message(&mut self, xid: u32, message_type: u32, data: [u32; 5]) {
        let Some(atoms) = self.x11.as_deref().map(|c| c.atoms().clone()) else {
            return;
        };
        let root = self.x11.as_deref().map(|c| c.root());

        if message_type == atoms.WL_SURFACE_ID {
            // Resolved against the Xwayland client's objects when the frontend flushes.
            trace!("X11 window {xid:#x} has wl_surface {}", data[0]);
            self.pending_xwayland_surfaces.push((xid, data[0]));
            return;
        }

        if message_type == atoms._NET_CURRENT_DESKTOP && Some(xid) == root {
            self.workspace.set_current_desktop(data[0].saturating_add(1));
            self.process_workspace_events();
            return;
        }

        let Some(Owner::Window(id)) = find_owner(&self.workspace, xid) else {
            return;
        };

        if message_type == atoms._NET_ACTIVE_WINDOW {
            let time = (data[1] != 0).then_some(data[1]);
            if data[0] == SOURCE_PAGER
                || self.workspace.allow_window_activation(id, time, false, false)
            {
                self.workspace.activate_window(Some(id), false);
            } else {
                self.workspace.demand_attention(id, true);
            }
            self.process_workspace_events();
        } else if message_type == atoms.WM_CHANGE_STATE {
            if data[0] == ICONIC_STATE {
                self.set_minimized(id, true);
            }
        } else if message_type == atoms._NET_WM_STATE {
            let action = data[0];
            for property in [data[1], data[2]] {
                if property != 0 {
                    self.change_net_wm_state(id, &atoms, action, property);
                }
            }
            self.update_net_wm_state(id);
        } else if message_type == atoms._NET_WM_DESKTOP {
            let desktop = (data[0] != u32::MAX).then(|| data[0].saturating_add(1));
            self.workspace.set_window_desktop(id, desktop);
            self.process_workspace_events();
        } else if message_type == atoms._NET_CLOSE_WINDOW {
            self.close_window(id);
        }
    }

    fn change_net_wm_state(&mut self, id: WindowId, atoms: &Atoms, action: u32, property: u32) {
        let Some(window) = self.workspace.window(id) else {
            return;
        };
        let apply = |current: bool| match action {
            STATE_REMOVE => false,
            STATE_ADD => true,
            STATE_TOGGLE => !current,
            _ => current,
        };

        if property == atoms._NET_WM_STATE_FULLSCREEN {
            let fullscreen = apply(window.is_fullscreen());
            self.set_fullscreen(id, fullscreen);
        } else if property == atoms._NET_WM_STATE_MAXIMIZED_VERT
            || property == atoms._NET_WM_STATE_MAXIMIZED_HORZ
        {
            let flag = if property == atoms._NET_WM_STATE_MAXIMIZED_VERT {
                MaximizeMode::VERTICAL
            } else {
                MaximizeMode::HORIZONTAL
            };
            let mut mode = window.maximize_mode();
            mode.set(flag, apply(mode.contains(flag)));
            self.maximize(id, mode);
        } else if property == atoms._NET_WM_STATE_ABOVE {
            let above = apply(window.keep_above());
            self.workspace.set_keep_above(id, above);
        } else if property == atoms._NET_WM_STATE_BELOW {
            let below = apply(window.keep_below());
            self.workspace.set_keep_below(id, below);
        } else if property == atoms._NET_WM_STATE_DEMANDS_ATTENTION {
            let demands = apply(window.states.demands_attention);
            self.workspace.demand_attention(id, demands);
        } else if property == atoms._NET_WM_STATE_SKIP_TASKBAR {
            let skip = apply(window.states.skip_taskbar);
            if let Some(window) = self.workspace.window_mut(id) {
                window.states.skip_taskbar = window.rules.check_skip_taskbar(skip);
            }
        } else if property == atoms._NET_WM_STATE_HIDDEN && apply(window.is_minimized()) {
            self.set_minimized(id, true);
        }
        self.process_workspace_events();
    }

    /// Publishes the states of an X11 window in `_NET_WM_STATE`.
    pub fn update_net_wm_state(&mut self, id: WindowId) {
        let Some(window) = self.workspace.window(id) else {
            return;
        };
        let Some(xid) = window
            .x11
            .as_ref()
            .filter(|x| !x.override_redirect)
            .map(|x| x.window)
        else {
            return;
        };
        let Some(conn) = self.x11.as_deref_mut() else {
            return;
        };

        let atoms = conn.atoms();
        let states = &window.states;
        let list: Vec<u32> = [
            (states.modal, atoms._NET_WM_STATE_MODAL),
            (
                states.maximize.contains(MaximizeMode::VERTICAL),
                atoms._NET_WM_STATE_MAXIMIZED_VERT,
            ),
            (
                states.maximize.contains(MaximizeMode::HORIZONTAL),
                atoms._NET_WM_STATE_MAXIMIZED_HORZ,
            ),
            (states.minimized, atoms._NET_WM_STATE_HIDDEN),
            (states.fullscreen, atoms._NET_WM_STATE_FULLSCREEN),
            (states.keep_above, atoms._NET_WM_STATE_ABOVE),
            (states.keep_below, atoms._NET_WM_STATE_BELOW),
            (states.demands_attention, atoms._NET_WM_STATE_DEMANDS_ATTENTION),
            (states.skip_taskbar, atoms._NET_WM_STATE_SKIP_TASKBAR),
        ]
        .into_iter()
        .filter_map(|(set, atom)| set.then_some(atom))
        .collect();

        let property = atoms._NET_WM_STATE;
        if let Err(err) = conn.change_property32(xid, property, ATOM_ATOM, &list) {
            warn!("error setting _NET_WM_STATE of {xid:#x}: {err}");
        }
    }

    /// Ties the Xwayland surface carrying the contents of an X11 window to it.
    pub fn associate_xwayland_surface(&mut self, xid: u32, surface: SurfaceId) {
        let Some(owner @ (Owner::Window(_) | Owner::Unmanaged(_))) =
            find_owner(&self.workspace, xid)
        else {
            debug!("no X11 window {xid:#x} for {surface:?}");
            return;
        };
        if let Err(err) = self.display.set_role(surface, SurfaceRole::Xwayland) {
            if let Some(client) = self.display.surface_client(surface) {
                self.post_error(client, err);
            }
            return;
        }

        let id = owner.id();
        if let Some(window) = self.workspace.window_mut(id) {
            window.surface = Some(surface);
            window.client = self.display.surface_client(surface);
        }
        self.surface_windows.insert(surface, id);
        self.sync_window(id);
        self.compositor.queue_redraw_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_known_window_type_wins() {
        let atoms = Atoms::sequential(100);
        let types = [
            atoms._KDE_NET_WM_WINDOW_TYPE_OVERRIDE,
            atoms._NET_WM_WINDOW_TYPE_DOCK,
            atoms._NET_WM_WINDOW_TYPE_NORMAL,
        ];
        assert_eq!(window_type_from_atoms(&atoms, &types), WindowType::Dock);
        assert_eq!(window_type_from_atoms(&atoms, &[]), WindowType::Normal);
    }
}
