use smithay::utils::{Logical, Point, Rectangle, Size};

use crate::display::{
    ClientEvent, ClientId, CommitInfo, Display, ProtocolError, SurfaceId, SurfaceRole,
};
use crate::effects::paint::EffectWindow;
use crate::strata::{Strata, KILL_TIMEOUT};
use crate::utils::serial::Serial;
use crate::window::configure::PendingConfigure;
use crate::window::decoration::{Decoration, DecorationMode};
use crate::window::positioner::Positioner;
use crate::window::rules::WindowRules;
use crate::window::xdg::{PingReason, PopupState, WaylandState, XdgStates};
use crate::window::{MaximizeMode, Window, WindowId, WindowKind};
use crate::workspace::areas::ClientAreaOption;

const XDG_WM_BASE: &str = "xdg_wm_base";
const XDG_SURFACE: &str = "xdg_surface";
const XDG_TOPLEVEL: &str = "xdg_toplevel";

// xdg_wm_base.error
const ERROR_INVALID_POPUP_PARENT: u32 = 3;
// xdg_surface.error
const ERROR_UNCONFIGURED_BUFFER: u32 = 3;
const ERROR_INVALID_SIZE: u32 = 5;
// xdg_toplevel.error
const ERROR_TOPLEVEL_INVALID_SIZE: u32 = 2;

/// Sends an `xdg_toplevel.configure` proposing `frame` and queues it until acked.
pub(crate) fn send_toplevel_configure(
    display: &mut Display,
    window: &mut Window,
    frame: Rectangle<i32, Logical>,
    maximize: MaximizeMode,
    fullscreen: bool,
) -> Serial {
    let size = if frame.size.is_empty() {
        Size::from((0, 0))
    } else {
        window.frame_rect_to_client_rect(frame).size
    };

    let mut states = XdgStates::empty();
    if maximize == MaximizeMode::FULL {
        states |= XdgStates::MAXIMIZED;
    } else if maximize == MaximizeMode::VERTICAL {
        states |= XdgStates::TILED_TOP | XdgStates::TILED_BOTTOM;
    } else if maximize == MaximizeMode::HORIZONTAL {
        states |= XdgStates::TILED_LEFT | XdgStates::TILED_RIGHT;
    }
    if fullscreen {
        states |= XdgStates::FULLSCREEN;
    }
    if window.active {
        states |= XdgStates::ACTIVATED;
    }
    if window.interactive_move_resize {
        states |= XdgStates::RESIZING;
    }

    let serial = display.next_serial();
    if let Some(surface) = window.surface {
        trace!("configuring {surface:?} to {size:?} {states:?}, serial {serial:?}");
        display.send_to_surface(
            surface,
            ClientEvent::XdgConfigure {
                surface,
                serial,
                size,
                states,
            },
        );
    }
    window.configure.push(PendingConfigure {
        serial,
        geometry: frame,
        maximize,
        fullscreen,
    });
    if let Some(wayland) = window.wayland.as_mut() {
        wayland.last_states = states;
        wayland.initial_configure_sent = true;
    }
    serial
}

/// Latches the double-buffered xdg-surface state on commit.
///
/// The window geometry is clipped to the bounding box of the surface tree.
fn apply_pending_state(display: &Display, window: &mut Window) {
    let Some(surface) = window.surface else {
        return;
    };
    let bbox = display.surface_tree_bbox(surface);
    let Some(wayland) = window.wayland.as_mut() else {
        return;
    };

    let geometry = match wayland.pending_window_geometry {
        Some(requested) => requested.intersection(bbox).unwrap_or(bbox),
        None => bbox,
    };
    let min_size = wayland.pending_min_size.take();
    let max_size = wayland.pending_max_size.take();

    window.window_geometry = geometry;
    if let Some(size) = display.surface(surface).map(|s| s.size) {
        window.set_buffer_size(size);
    }
    if let Some(size) = min_size {
        window.min_size = window.rules.check_min_size(size);
    }
    if let Some(size) = max_size {
        window.max_size = window.rules.check_max_size(size);
    }
}

impl Strata {
    pub(crate) fn post_error(&mut self, client: ClientId, error: ProtocolError) {
        debug!("protocol error for {client:?}: {error}");
        self.display.post_error(client, error);
    }

    /// Window of a surface, mapped or not.
    pub(crate) fn xdg_window_mut(&mut self, surface: SurfaceId) -> Option<&mut Window> {
        match self.surface_windows.get(&surface) {
            Some(id) => self.workspace.window_mut(*id),
            None => self.unmapped_windows.get_mut(&surface),
        }
    }

    pub(crate) fn window_for_surface(&self, surface: SurfaceId) -> Option<WindowId> {
        self.surface_windows.get(&surface).copied()
    }

    fn unmapped_toplevel(&self, surface: SurfaceId, client: ClientId) -> Window {
        let mut window = Window::new(WindowKind::WaylandToplevel);
        window.surface = Some(surface);
        window.client = Some(client);
        window.pid = self.display.client(client).and_then(|c| c.pid);
        window.wayland = Some(WaylandState::default());
        window.rules = WindowRules::compute(&self.config.borrow(), &window.match_props());
        window
    }

    /// Handles `xdg_surface.get_toplevel`.
    pub fn new_toplevel(&mut self, surface: SurfaceId) -> Option<WindowId> {
        let client = self.display.surface_client(surface)?;
        if let Err(err) = self.display.set_role(surface, SurfaceRole::Toplevel) {
            self.post_error(client, err);
            return None;
        }

        let window = self.unmapped_toplevel(surface, client);
        let id = window.id;
        debug!("new toplevel {id:?} for {surface:?}");
        self.unmapped_windows.insert(surface, window);
        Some(id)
    }

    /// Handles `xdg_surface.get_popup`.
    pub fn new_popup(
        &mut self,
        surface: SurfaceId,
        parent: Option<SurfaceId>,
        positioner: Positioner,
    ) -> Option<WindowId> {
        let client = self.display.surface_client(surface)?;
        if let Err(err) = positioner.validate() {
            self.post_error(client, err);
            return None;
        }
        let Some(parent) = parent.and_then(|p| self.window_for_surface(p)) else {
            self.post_error(
                client,
                ProtocolError::new(
                    XDG_WM_BASE,
                    ERROR_INVALID_POPUP_PARENT,
                    "the popup parent is not a mapped xdg surface",
                ),
            );
            return None;
        };
        if let Err(err) = self.display.set_role(surface, SurfaceRole::Popup) {
            self.post_error(client, err);
            return None;
        }

        let (desktop, on_all_desktops) = self
            .workspace
            .window(parent)
            .map_or((1, false), |p| (p.desktop, p.on_all_desktops));

        let mut window = Window::new(WindowKind::WaylandPopup);
        window.surface = Some(surface);
        window.client = Some(client);
        window.pid = self.display.client(client).and_then(|c| c.pid);
        window.transient_for = Some(parent);
        window.desktop = desktop;
        window.on_all_desktops = on_all_desktops;
        window.wants_input = false;
        window.wayland = Some(WaylandState::popup(PopupState {
            parent,
            positioner,
            grab: None,
            relative: Rectangle::default(),
            reposition_token: None,
        }));

        let id = window.id;
        debug!("new popup {id:?} for {surface:?} with parent {parent:?}");
        self.unmapped_windows.insert(surface, window);
        Some(id)
    }

    /// Global position of a window's client area and the bounds its popups must stay in.
    fn popup_placement_context(
        &self,
        parent: WindowId,
    ) -> Option<(Point<i32, Logical>, Rectangle<i32, Logical>)> {
        let window = self.workspace.window(parent)?;
        let origin = window.client_geometry().loc;
        let bounds = self
            .workspace
            .client_area_for(ClientAreaOption::ScreenArea, parent);
        Some((origin, bounds))
    }

    /// Places a popup and sends it the configure with its position relative to the parent.
    fn configure_popup(&mut self, surface: SurfaceId) {
        let Some(popup) = self
            .xdg_window_mut(surface)
            .and_then(|w| w.wayland.as_ref())
            .and_then(|w| w.popup.clone())
        else {
            return;
        };
        let Some((origin, bounds)) = self.popup_placement_context(popup.parent) else {
            return;
        };

        let geometry = popup.positioner.place(origin, bounds);
        let relative = Rectangle::new(geometry.loc - origin, geometry.size);

        let serial = self.display.next_serial();
        let Some(window) = self.xdg_window_mut(surface) else {
            return;
        };
        if let Some(state) = window.wayland.as_mut() {
            state.initial_configure_sent = true;
            if let Some(popup) = state.popup.as_mut() {
                popup.relative = relative;
            }
        }
        window.configure.push(PendingConfigure {
            serial,
            geometry,
            maximize: MaximizeMode::empty(),
            fullscreen: false,
        });
        trace!("configuring popup {surface:?} at {relative:?}");
        self.display.send_to_surface(
            surface,
            ClientEvent::XdgPopupConfigure {
                surface,
                serial,
                geometry: relative,
            },
        );
    }

    /// Handles `xdg_popup.reposition`.
    pub fn reposition_popup(&mut self, surface: SurfaceId, positioner: Positioner, token: u32) {
        let Some(client) = self.display.surface_client(surface) else {
            return;
        };
        if let Err(err) = positioner.validate() {
            self.post_error(client, err);
            return;
        }
        let Some(popup) = self
            .xdg_window_mut(surface)
            .and_then(|w| w.wayland.as_mut())
            .and_then(|w| w.popup.as_mut())
        else {
            return;
        };
        popup.positioner = positioner;
        popup.reposition_token = Some(token);

        self.display
            .send_to_surface(surface, ClientEvent::XdgPopupRepositioned { surface, token });
        self.configure_popup(surface);
    }

    /// Handles `xdg_popup.grab`.
    ///
    /// The grab must come from an input event the seat still knows of, otherwise the popup is
    /// dismissed right away.
    pub fn popup_grab(&mut self, surface: SurfaceId, serial: Serial) {
        let valid = self.seat.pointer_button_for_serial(serial).is_some()
            || self.seat.touch_id_for_serial(serial).is_some();
        if !valid {
            debug!("dismissing popup {surface:?}, grab serial {serial:?} is stale");
            self.dismiss_popup(surface);
            return;
        }
        if let Some(popup) = self
            .xdg_window_mut(surface)
            .and_then(|w| w.wayland.as_mut())
            .and_then(|w| w.popup.as_mut())
        {
            popup.grab = Some(serial);
        }
    }

    fn dismiss_popup(&mut self, surface: SurfaceId) {
        self.display
            .send_to_surface(surface, ClientEvent::XdgPopupDone { surface });
        if let Some(id) = self.window_for_surface(surface) {
            self.close_popups_of(id);
            self.release_window(id);
        }
    }

    /// Dismisses every popup of a window, innermost first.
    pub(crate) fn close_popups_of(&mut self, parent: WindowId) {
        let popups: Vec<_> = self
            .workspace
            .windows()
            .filter(|w| {
                w.wayland
                    .as_ref()
                    .and_then(|w| w.popup.as_ref())
                    .is_some_and(|p| p.parent == parent)
            })
            .filter_map(|w| w.surface)
            .collect();
        for surface in popups {
            self.dismiss_popup(surface);
        }
    }

    /// Moves the popups of a window along with it.
    pub(crate) fn update_popups(&mut self, parent: WindowId) {
        let Some(origin) = self.workspace.window(parent).map(|w| w.client_geometry().loc) else {
            return;
        };
        let popups: Vec<_> = self
            .workspace
            .windows()
            .filter_map(|w| {
                let popup = w.wayland.as_ref()?.popup.as_ref()?;
                (popup.parent == parent).then_some((w.id, popup.relative.loc))
            })
            .collect();
        for (id, relative) in popups {
            if let Some(window) = self.workspace.window_mut(id) {
                window.move_to(origin + relative);
            }
            self.update_popups(id);
        }
    }

    /// Handles `xdg_surface.ack_configure`.
    pub fn ack_configure(&mut self, surface: SurfaceId, serial: Serial) {
        let Some(client) = self.display.surface_client(surface) else {
            return;
        };
        let Some(window) = self.xdg_window_mut(surface) else {
            return;
        };
        if let Err(err) = window.configure.ack(serial) {
            self.post_error(client, err);
        }
    }

    /// Handles `xdg_surface.set_window_geometry`.
    pub fn set_window_geometry(&mut self, surface: SurfaceId, geometry: Rectangle<i32, Logical>) {
        let Some(client) = self.display.surface_client(surface) else {
            return;
        };
        if geometry.size.w <= 0 || geometry.size.h <= 0 {
            self.post_error(
                client,
                ProtocolError::new(
                    XDG_SURFACE,
                    ERROR_INVALID_SIZE,
                    "window geometry must be positive",
                ),
            );
            return;
        }
        if let Some(wayland) = self.xdg_window_mut(surface).and_then(|w| w.wayland.as_mut()) {
            wayland.pending_window_geometry = Some(geometry);
        }
    }

    pub fn set_min_size(&mut self, surface: SurfaceId, size: Size<i32, Logical>) {
        self.set_size_limit(surface, size, true);
    }

    pub fn set_max_size(&mut self, surface: SurfaceId, size: Size<i32, Logical>) {
        self.set_size_limit(surface, size, false);
    }

    fn set_size_limit(&mut self, surface: SurfaceId, size: Size<i32, Logical>, min: bool) {
        let Some(client) = self.display.surface_client(surface) else {
            return;
        };
        if size.w < 0 || size.h < 0 {
            self.post_error(
                client,
                ProtocolError::new(XDG_TOPLEVEL, ERROR_TOPLEVEL_INVALID_SIZE, "negative size"),
            );
            return;
        }
        if let Some(wayland) = self.xdg_window_mut(surface).and_then(|w| w.wayland.as_mut()) {
            if min {
                wayland.pending_min_size = Some(size);
            } else {
                wayland.pending_max_size = Some(size);
            }
        }
    }

    pub fn set_title(&mut self, surface: SurfaceId, title: String) {
        if let Some(window) = self.xdg_window_mut(surface) {
            window.title = title;
        }
        self.recompute_rules(surface);
    }

    pub fn set_app_id(&mut self, surface: SurfaceId, app_id: String) {
        if let Some(window) = self.xdg_window_mut(surface) {
            if window.app_id == app_id {
                return;
            }
            window.desktop_file_name = app_id.clone();
            window.app_id = app_id;
        }
        self.recompute_rules(surface);
    }

    fn recompute_rules(&mut self, surface: SurfaceId) {
        let config = self.config.clone();
        if let Some(window) = self.xdg_window_mut(surface) {
            window.rules = WindowRules::compute(&config.borrow(), &window.match_props());
        }
    }

    /// Handles `xdg_toplevel.set_parent`.
    pub fn set_parent(&mut self, surface: SurfaceId, parent: Option<SurfaceId>) {
        let parent = parent.and_then(|p| self.window_for_surface(p));
        match self.window_for_surface(surface) {
            Some(id) => self.workspace.set_transient_for(id, parent),
            None => {
                if let Some(window) = self.unmapped_windows.get_mut(&surface) {
                    window.transient_for = parent;
                }
            }
        }
    }

    /// Handles `xdg_toplevel.set_maximized` and `unset_maximized`.
    pub fn request_maximized(&mut self, surface: SurfaceId, maximized: bool) {
        let mode = if maximized {
            MaximizeMode::FULL
        } else {
            MaximizeMode::empty()
        };
        match self.window_for_surface(surface) {
            Some(id) => self.maximize(id, mode),
            None => {
                if let Some(window) = self.unmapped_windows.get_mut(&surface) {
                    window.states.maximize = mode;
                }
            }
        }
    }

    /// Handles `xdg_toplevel.set_fullscreen` and `unset_fullscreen`.
    pub fn request_fullscreen(&mut self, surface: SurfaceId, fullscreen: bool) {
        match self.window_for_surface(surface) {
            Some(id) => self.set_fullscreen(id, fullscreen),
            None => {
                if let Some(window) = self.unmapped_windows.get_mut(&surface) {
                    window.states.fullscreen = fullscreen;
                }
            }
        }
    }

    /// Handles `xdg_toplevel.set_minimized`.
    pub fn request_minimized(&mut self, surface: SurfaceId) {
        if let Some(id) = self.window_for_surface(surface) {
            self.set_minimized(id, true);
        }
    }

    /// Commit of an xdg surface that has no buffer yet.
    pub(crate) fn unmapped_commit(&mut self, surface: SurfaceId, info: CommitInfo) {
        let has_buffer = self
            .display
            .surface(surface)
            .is_some_and(|s| s.is_mapped());
        let Some(window) = self.unmapped_windows.get(&surface) else {
            return;
        };
        let Some(client) = window.client else {
            return;
        };
        let kind = window.kind;
        let configured = window
            .wayland
            .as_ref()
            .is_some_and(|w| w.initial_configure_sent);

        if has_buffer && (!configured || window.configure.last_acked().is_none()) {
            self.post_error(
                client,
                ProtocolError::new(
                    XDG_SURFACE,
                    ERROR_UNCONFIGURED_BUFFER,
                    "a buffer was committed before the first configure was acked",
                ),
            );
            return;
        }

        if !configured {
            match kind {
                WindowKind::WaylandPopup => self.configure_popup(surface),
                _ => self.send_initial_configure(surface),
            }
            return;
        }

        if info.became_mapped {
            self.map_xdg_window(surface);
        }
    }

    /// Area on the active output a window about to be mapped gets laid out in.
    fn initial_area(&self, option: ClientAreaOption) -> Rectangle<i32, Logical> {
        let output = self
            .workspace
            .active_output()
            .or_else(|| self.outputs.first());
        match output {
            Some(output) => {
                self.workspace
                    .client_area(option, output, self.workspace.current_desktop())
            }
            None => Rectangle::default(),
        }
    }

    fn send_initial_configure(&mut self, surface: SurfaceId) {
        let maximize_area = self.initial_area(ClientAreaOption::MaximizeArea);
        let fullscreen_area = self.initial_area(ClientAreaOption::FullScreenArea);
        let Some(window) = self.unmapped_windows.get_mut(&surface) else {
            return;
        };
        apply_pending_state(&self.display, window);

        let rules = &window.rules;
        let maximize = rules.check_maximize(window.states.maximize, true);
        let fullscreen = rules.check_fullscreen(window.states.fullscreen, true);
        let size = rules.check_size(Size::from((0, 0)), true);

        let geometry = if fullscreen {
            fullscreen_area
        } else if maximize == MaximizeMode::FULL {
            maximize_area
        } else if size.is_empty() {
            Rectangle::default()
        } else {
            window.client_rect_to_frame_rect(Rectangle::from_size(size))
        };

        debug!("initial configure of {surface:?}: {geometry:?}");
        send_toplevel_configure(&mut self.display, window, geometry, maximize, fullscreen);
    }

    /// Starts managing an xdg window after its first buffer.
    fn map_xdg_window(&mut self, surface: SurfaceId) {
        let Some(mut window) = self.unmapped_windows.remove(&surface) else {
            return;
        };
        let acked = window.configure.take_acked();
        apply_pending_state(&self.display, &mut window);
        window.lockscreen_overlay = self.lockscreen_overlay_state.is_allowed(surface);

        if let Some(configure) = acked {
            window.states.maximize = configure.maximize;
            window.states.fullscreen = configure.fullscreen;
        }
        let server_side = window
            .wayland
            .as_ref()
            .is_some_and(|w| w.decoration_mode == DecorationMode::ServerSide);
        if server_side && window.kind == WindowKind::WaylandToplevel {
            window.decoration = Some(Decoration::default());
        }

        let client_size = window.window_geometry.size;
        let frame_size = window
            .client_rect_to_frame_rect(Rectangle::from_size(client_size))
            .size;

        let is_popup = window.kind == WindowKind::WaylandPopup;
        let placed = acked
            .filter(|c| is_popup || !c.maximize.is_empty() || c.fullscreen)
            .map(|c| Rectangle::new(c.geometry.loc, frame_size));

        if !is_popup {
            let current = self.workspace.current_desktop();
            let rules = &window.rules;
            window.desktop = rules.check_desktop(current, true);
            window.on_all_desktops = rules.check_on_all_desktops(window.on_all_desktops, true);
            window.states.keep_above = rules.check_keep_above(window.states.keep_above, true);
            window.states.keep_below = rules.check_keep_below(window.states.keep_below, true);
            window.states.skip_taskbar = rules.check_skip_taskbar(window.states.skip_taskbar);
        }
        let minimize = window.rules.check_minimize(false, true);
        window.ready_for_painting = true;
        window.set_frame_geometry(Rectangle::from_size(frame_size));

        let id = self.workspace.add_window(window);
        self.surface_windows.insert(surface, id);

        let geometry = placed.or_else(|| self.workspace.place_window(id, frame_size));
        if let Some(window) = self.workspace.window_mut(id) {
            if let Some(geometry) = geometry {
                window.set_frame_geometry(geometry);
            }
            debug!("mapped {id:?} at {:?}", window.frame_geometry());
        }
        self.workspace.update_window_outputs(&self.outputs);
        if let Some(window) = self.workspace.window(id) {
            self.effects.window_added(&EffectWindow::new(window));
        }

        self.plasma_shell_state.update_struts(&mut self.workspace, id);
        if !is_popup {
            self.workspace.activate_mapped_window(id);
            if minimize {
                self.workspace.set_minimized(id, true);
            }
        }
        self.process_workspace_events();
        self.sync_window(id);
        self.compositor.queue_redraw_all();
    }

    /// Commit of a mapped xdg window.
    pub(crate) fn mapped_commit(&mut self, id: WindowId, info: CommitInfo) {
        if info.became_unmapped {
            self.unmap_xdg_window(id);
            return;
        }

        let Some(window) = self.workspace.window_mut(id) else {
            return;
        };
        if window.wayland.is_none() {
            return;
        }
        let acked = window.configure.take_acked();
        apply_pending_state(&self.display, window);

        let was_fullscreen = window.states.fullscreen;
        let old = window.frame_geometry();
        let frame_size = window
            .client_rect_to_frame_rect(Rectangle::from_size(window.window_geometry.size))
            .size;
        let loc = match acked {
            Some(configure) => {
                window.states.maximize = configure.maximize;
                window.states.fullscreen = configure.fullscreen;
                configure.geometry.loc
            }
            None => old.loc,
        };
        let geometry = Rectangle::new(loc, frame_size);
        let fullscreen_changed = was_fullscreen != window.states.fullscreen;
        if geometry != old {
            trace!("{id:?} committed {geometry:?}");
            window.set_frame_geometry(geometry);
        } else {
            // The buffer may have moved relative to the window geometry.
            window.set_frame_geometry(old);
        }

        if fullscreen_changed {
            if let Some(window) = self.workspace.window_mut(id) {
                window.layer = None;
            }
            self.workspace.update_stacking_order(false);
        }
        if geometry != old {
            self.geometry_changed(id);
        }
    }

    fn unmap_xdg_window(&mut self, id: WindowId) {
        let Some(window) = self.workspace.window(id) else {
            return;
        };
        let (kind, surface, client) = (window.kind, window.surface, window.client);
        debug!("{id:?} unmapped");

        self.close_popups_of(id);
        self.release_window(id);

        // A toplevel can map again after another initial configure.
        if let (WindowKind::WaylandToplevel, Some(surface), Some(client)) = (kind, surface, client)
        {
            let window = self.unmapped_toplevel(surface, client);
            self.unmapped_windows.insert(surface, window);
        }
    }

    /// Stops managing a window and hands it to the close effects.
    pub(crate) fn release_window(&mut self, id: WindowId) {
        let Some(window) = self.workspace.remove_window(id) else {
            return;
        };
        if let Some(surface) = window.surface {
            self.surface_windows.remove(&surface);
        }
        if self.pending_focus_out == Some(id) {
            self.pending_focus_out = None;
        }
        self.compositor.window_closed(
            &mut self.scene,
            &mut self.workspace,
            &mut self.effects,
            &window,
        );
        self.process_workspace_events();
        self.compositor.queue_redraw_all();
    }

    /// Reconfigures the toplevels whose activated state changed since their last configure.
    pub(crate) fn update_activated_states(&mut self) {
        let stale: Vec<_> = self
            .workspace
            .windows()
            .filter(|w| w.kind == WindowKind::WaylandToplevel)
            .filter(|w| {
                w.wayland.as_ref().is_some_and(|s| {
                    s.initial_configure_sent
                        && s.last_states.contains(XdgStates::ACTIVATED) != w.active
                })
            })
            .map(|w| w.id)
            .collect();

        for id in stale {
            let Some(window) = self.workspace.window_mut(id) else {
                continue;
            };
            let frame = window
                .configure
                .latest()
                .map_or(window.frame_geometry(), |c| c.geometry);
            let maximize = window.requested_maximize_mode();
            let fullscreen = window.requested_fullscreen();
            send_toplevel_configure(&mut self.display, window, frame, maximize, fullscreen);
        }
    }

    /// Asks a window to close.
    pub fn close_window(&mut self, id: WindowId) {
        let Some(window) = self.workspace.window_mut(id) else {
            return;
        };
        match window.kind {
            WindowKind::WaylandToplevel => {
                if let (Some(surface), Some(wayland)) = (window.surface, window.wayland.as_mut()) {
                    wayland.close_requested = true;
                    self.display
                        .send_to_surface(surface, ClientEvent::XdgClose { surface });
                }
                self.ping_window(id, PingReason::CloseWindow);
            }
            WindowKind::WaylandPopup => {
                if let Some(surface) = window.surface {
                    self.dismiss_popup(surface);
                }
            }
            WindowKind::X11Managed => {
                let xid = window.x11.as_ref().map(|x| x.window);
                if let (Some(conn), Some(xid)) = (self.x11.as_deref_mut(), xid) {
                    if let Err(err) = crate::x11::send_delete_window(conn, xid) {
                        warn!("error closing X11 window {xid:#x}: {err}");
                    }
                }
            }
            WindowKind::X11Unmanaged => (),
            WindowKind::Internal => self.release_window(id),
        }
    }

    /// Pings the client of a Wayland window.
    pub fn ping_window(&mut self, id: WindowId, reason: PingReason) {
        let now = self.clock.now();
        let Some(window) = self.workspace.window_mut(id) else {
            return;
        };
        let (Some(client), Some(wayland)) = (window.client, window.wayland.as_mut()) else {
            return;
        };
        let serial = self.display.next_serial();
        trace!("pinging {id:?} for {reason:?} with {serial:?}");
        self.display.send(client, ClientEvent::Ping { serial });
        wayland.add_ping(serial, reason, now);
    }

    /// Handles `xdg_wm_base.pong`.
    pub fn pong(&mut self, client: ClientId, serial: Serial) {
        for window in self.workspace.windows_mut() {
            if window.client != Some(client) {
                continue;
            }
            let Some(wayland) = window.wayland.as_mut() else {
                continue;
            };
            if wayland.pong(serial) && window.unresponsive {
                debug!("{:?} is responsive again", window.id);
                window.unresponsive = false;
                if let Some(decoration) = window.decoration.as_mut() {
                    decoration.dimmed = false;
                }
            }
        }
    }

    /// Advances the ping timers, marking windows unresponsive and killing clients that ignored a
    /// close request.
    pub(crate) fn check_pings(&mut self) {
        let now = self.clock.now();
        let mut kill = Vec::new();
        for window in self.workspace.windows_mut() {
            let Some(wayland) = window.wayland.as_mut() else {
                continue;
            };
            if wayland.pings.is_empty() {
                continue;
            }
            let update = wayland.update_pings(now);
            if update.delayed && !window.unresponsive {
                debug!("{:?} is not responding", window.id);
                window.unresponsive = true;
                if let Some(decoration) = window.decoration.as_mut() {
                    decoration.dimmed = true;
                }
            }
            if update.kill {
                kill.extend(window.client);
            }
        }
        for client in kill {
            self.kill_client(client);
        }
    }

    /// Sends SIGTERM to the client, disconnecting it if it's still around after a while.
    pub fn kill_client(&mut self, client: ClientId) {
        if self.killed_clients.iter().any(|(c, _)| *c == client) {
            return;
        }
        let pid = self.display.client(client).and_then(|c| c.pid);
        match pid {
            Some(pid) if pid > 0 => {
                warn!("killing unresponsive client {client:?} with pid {pid}");
                // SAFETY: kill() has no memory safety requirements.
                if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
                    let err = std::io::Error::last_os_error();
                    warn!("error sending SIGTERM to {pid}: {err}");
                }
                let deadline = self.clock.now() + KILL_TIMEOUT;
                self.killed_clients.push((client, deadline));
            }
            _ => {
                warn!("disconnecting unresponsive client {client:?}");
                self.client_disconnected(client);
            }
        }
    }
}
