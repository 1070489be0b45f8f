use smithay::utils::{Logical, Point, Rectangle, Size};

use super::xdg_shell::send_toplevel_configure;
use crate::strata::Strata;
use crate::window::x11::MappingState;
use crate::window::{MaximizeMode, Window, WindowId, WindowKind};
use crate::workspace::areas::ClientAreaOption;
use crate::x11;

/// Clamps a frame size to the window's min and max size, which apply to the client area.
fn constrain_size(window: &Window, frame: Rectangle<i32, Logical>) -> Rectangle<i32, Logical> {
    let margins = window.frame_margins();
    let extra = Size::from((margins.left + margins.right, margins.top + margins.bottom));
    let mut client = window.frame_rect_to_client_rect(frame).size;

    let min = window.rules.check_min_size(window.min_size);
    let max = window.rules.check_max_size(window.max_size);
    client.w = client.w.max(min.w);
    client.h = client.h.max(min.h);
    if max.w > 0 {
        client.w = client.w.min(max.w);
    }
    if max.h > 0 {
        client.h = client.h.min(max.h);
    }
    Rectangle::new(frame.loc, client + extra)
}

impl Strata {
    /// Moves and resizes a window, asking the client first when it has to agree.
    pub fn request_geometry(&mut self, id: WindowId, rect: Rectangle<i32, Logical>) {
        let Some(window) = self.workspace.window_mut(id) else {
            return;
        };
        let rect = if window.is_fullscreen() || window.maximize_mode() == MaximizeMode::FULL {
            rect
        } else {
            constrain_size(window, rect)
        };
        trace!("requesting {rect:?} for {id:?}");

        match window.kind {
            WindowKind::WaylandToplevel => {
                let maximize = window.requested_maximize_mode();
                let fullscreen = window.requested_fullscreen();
                self.configure_toplevel(id, rect, maximize, fullscreen);
                return;
            }
            WindowKind::X11Managed => {
                window.set_frame_geometry(rect);
                let client = window.client_geometry();
                let margins = window.frame_margins();
                if let (Some(conn), Some(state)) = (self.x11.as_deref_mut(), window.x11.as_ref()) {
                    let wrapper = Rectangle::new(
                        Point::from((margins.left, margins.top)),
                        client.size,
                    );
                    let result = conn
                        .configure_window(state.frame, rect)
                        .and_then(|()| conn.configure_window(state.wrapper, wrapper))
                        .and_then(|()| {
                            conn.configure_window(state.window, Rectangle::from_size(client.size))
                        })
                        .and_then(|()| conn.send_configure_notify(state.window, client));
                    if let Err(err) = result {
                        warn!("error configuring X11 window {:#x}: {err}", state.window);
                    }
                }
            }
            _ => window.set_frame_geometry(rect),
        }
        self.geometry_changed(id);
    }

    /// Configures a toplevel, moving it right away when the client has nothing to redraw.
    pub(crate) fn configure_toplevel(
        &mut self,
        id: WindowId,
        rect: Rectangle<i32, Logical>,
        maximize: MaximizeMode,
        fullscreen: bool,
    ) {
        let Some(window) = self.workspace.window_mut(id) else {
            return;
        };
        let unchanged = window.configure.is_empty()
            && window.frame_geometry().size == rect.size
            && window.maximize_mode() == maximize
            && window.is_fullscreen() == fullscreen;
        if unchanged {
            if window.frame_geometry().loc != rect.loc {
                window.move_to(rect.loc);
                self.geometry_changed(id);
            }
            return;
        }
        send_toplevel_configure(&mut self.display, window, rect, maximize, fullscreen);
    }

    /// Sets the maximization of a window.
    pub fn maximize(&mut self, id: WindowId, mode: MaximizeMode) {
        let Some(window) = self.workspace.window_mut(id) else {
            return;
        };
        if window.in_maximize || (window.is_special_window() && !window.is_dialog()) {
            return;
        }
        let mode = window.rules.check_maximize(mode, false);
        let old_mode = window.requested_maximize_mode();
        if mode == old_mode {
            return;
        }
        if old_mode.is_empty() && !window.is_fullscreen() {
            window.restore_geometry = window.frame_geometry();
        }
        window.in_maximize = true;
        debug!("maximizing {id:?}: {old_mode:?} -> {mode:?}");

        let area = self
            .workspace
            .client_area_for(ClientAreaOption::MaximizeArea, id);
        let Some(window) = self.workspace.window_mut(id) else {
            return;
        };
        let restore = window.restore_geometry;
        let current = window.frame_geometry();
        let mut target = current;
        if mode.contains(MaximizeMode::HORIZONTAL) {
            target.loc.x = area.loc.x;
            target.size.w = area.size.w;
        } else if !restore.is_empty() {
            target.loc.x = restore.loc.x;
            target.size.w = restore.size.w;
        }
        if mode.contains(MaximizeMode::VERTICAL) {
            target.loc.y = area.loc.y;
            target.size.h = area.size.h;
        } else if !restore.is_empty() {
            target.loc.y = restore.loc.y;
            target.size.h = restore.size.h;
        }

        match window.kind {
            WindowKind::WaylandToplevel => {
                let fullscreen = window.requested_fullscreen();
                self.configure_toplevel(id, target, mode, fullscreen);
            }
            _ => {
                window.states.maximize = mode;
                self.request_geometry(id, target);
                self.update_net_wm_state(id);
            }
        }
        if let Some(window) = self.workspace.window_mut(id) {
            window.in_maximize = false;
        }
    }

    /// Puts a window in or out of fullscreen.
    pub fn set_fullscreen(&mut self, id: WindowId, fullscreen: bool) {
        let Some(window) = self.workspace.window_mut(id) else {
            return;
        };
        if window.in_fullscreen {
            return;
        }
        let fullscreen = window.rules.check_fullscreen(fullscreen, false);
        if window.requested_fullscreen() == fullscreen {
            return;
        }
        if fullscreen {
            window.fullscreen_restore_geometry = window.frame_geometry();
        }
        window.in_fullscreen = true;
        debug!("{id:?} fullscreen: {fullscreen}");

        let target = if fullscreen {
            self.workspace
                .client_area_for(ClientAreaOption::FullScreenArea, id)
        } else {
            self.workspace
                .window(id)
                .map(|w| w.fullscreen_restore_geometry)
                .unwrap_or_default()
        };
        let Some(window) = self.workspace.window_mut(id) else {
            return;
        };
        let target = if target.is_empty() {
            window.frame_geometry()
        } else {
            target
        };

        match window.kind {
            WindowKind::WaylandToplevel => {
                let maximize = window.requested_maximize_mode();
                self.configure_toplevel(id, target, maximize, fullscreen);
            }
            _ => {
                window.states.fullscreen = fullscreen;
                window.layer = None;
                self.workspace.update_stacking_order(false);
                self.request_geometry(id, target);
                self.update_net_wm_state(id);
            }
        }
        if let Some(window) = self.workspace.window_mut(id) {
            window.in_fullscreen = false;
        }
        self.process_workspace_events();
    }

    /// Minimizes or unminimizes a window.
    pub fn set_minimized(&mut self, id: WindowId, minimized: bool) {
        let Some(window) = self.workspace.window(id) else {
            return;
        };
        if window.is_minimized() == minimized {
            return;
        }
        let x11 = window.x11.as_ref().filter(|_| window.kind == WindowKind::X11Managed);
        let ids = x11.map(|x| (x.window, x.frame));

        self.workspace.set_minimized(id, minimized);

        if let (Some(conn), Some((xid, frame))) = (self.x11.as_deref_mut(), ids) {
            let state = state_after(minimized);
            let result = x11::set_wm_state(conn, xid, state).and_then(|()| {
                if minimized {
                    conn.unmap_window(frame)
                } else {
                    conn.map_window(frame)
                }
            });
            if let Err(err) = result {
                warn!("error changing the mapping of X11 window {xid:#x}: {err}");
            }
            if let Some(window) = self.workspace.window_mut(id) {
                if let Some(state) = window.x11.as_mut() {
                    state.mapping_state = state_after(minimized);
                }
            }
            self.update_net_wm_state(id);
        }

        self.process_workspace_events();
        self.sync_window(id);
        self.compositor.queue_redraw_all();
    }

    /// Updates everything that depends on where a window is.
    pub(crate) fn geometry_changed(&mut self, id: WindowId) {
        if self.workspace.window(id).is_some_and(|w| w.is_dock()) {
            self.plasma_shell_state.update_struts(&mut self.workspace, id);
        }
        self.update_popups(id);
        self.workspace.update_window_outputs(&self.outputs);
        self.process_workspace_events();
        self.compositor.queue_redraw_all();
    }
}

fn state_after(minimized: bool) -> MappingState {
    if minimized {
        MappingState::Kept
    } else {
        MappingState::Mapped
    }
}
