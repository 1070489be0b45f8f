//! `org_kde_plasma_shell`: roles and panel behavior for shell surfaces.

use smithay::utils::{Logical, Point, Rectangle};

use crate::display::{Display, Global};
use crate::window::xdg::{PanelBehavior, PlasmaRole};
use crate::window::{Struts, WindowId, WindowType};
use crate::workspace::areas::ClientAreaOption;
use crate::workspace::focus_chain::FocusChainChange;
use crate::workspace::Workspace;

const VERSION: u32 = 8;

#[derive(Debug, Default)]
pub struct PlasmaShellState;

pub fn window_type_for_role(role: PlasmaRole) -> WindowType {
    match role {
        PlasmaRole::Normal => WindowType::Normal,
        PlasmaRole::Desktop => WindowType::Desktop,
        PlasmaRole::Panel => WindowType::Dock,
        PlasmaRole::OnScreenDisplay => WindowType::OnScreenDisplay,
        PlasmaRole::Notification => WindowType::Notification,
        PlasmaRole::ToolTip => WindowType::Tooltip,
        PlasmaRole::CriticalNotification => WindowType::CriticalNotification,
        PlasmaRole::AppletPopup => WindowType::AppletPopup,
    }
}

/// Space an always visible panel reserves, going by the output edge it is attached to.
pub fn panel_struts(frame: Rectangle<i32, Logical>, output: Rectangle<i32, Logical>) -> Struts {
    let mut struts = Struts::default();
    if frame.is_empty() || output.intersection(frame).is_none() {
        return struts;
    }

    let right = output.loc.x + output.size.w;
    let bottom = output.loc.y + output.size.h;
    let frame_right = frame.loc.x + frame.size.w;
    let frame_bottom = frame.loc.y + frame.size.h;
    if frame.size.w >= frame.size.h {
        if frame.loc.y <= output.loc.y {
            struts.top = frame_bottom - output.loc.y;
        } else if frame_bottom >= bottom {
            struts.bottom = bottom - frame.loc.y;
        }
    } else if frame.loc.x <= output.loc.x {
        struts.left = frame_right - output.loc.x;
    } else if frame_right >= right {
        struts.right = right - frame.loc.x;
    }
    struts
}

impl PlasmaShellState {
    pub fn new(display: &mut Display) -> Self {
        trace!("plasma shell v{VERSION}");
        display.advertise(Global::PlasmaShell);
        Self
    }

    /// Handles `org_kde_plasma_surface.set_role`.
    pub fn set_role(&self, ws: &mut Workspace, id: WindowId, role: PlasmaRole) {
        let Some(window) = ws.window_mut(id) else {
            return;
        };
        let Some(wayland) = window.wayland.as_mut() else {
            return;
        };
        if wayland.plasma_role == Some(role) {
            return;
        }
        wayland.plasma_role = Some(role);
        let takes_focus = wayland.panel_takes_focus;
        window.window_type = window_type_for_role(role);
        window.wants_input = match role {
            PlasmaRole::OnScreenDisplay | PlasmaRole::ToolTip => false,
            PlasmaRole::Notification | PlasmaRole::CriticalNotification | PlasmaRole::Panel => {
                takes_focus
            }
            _ => true,
        };
        debug!("window {id:?} got plasma role {role:?}");

        let everywhere = matches!(
            role,
            PlasmaRole::Desktop
                | PlasmaRole::Panel
                | PlasmaRole::OnScreenDisplay
                | PlasmaRole::Notification
                | PlasmaRole::ToolTip
                | PlasmaRole::CriticalNotification
                | PlasmaRole::AppletPopup
        );
        ws.with_stacking_blocked(|ws| {
            if everywhere {
                ws.set_window_desktop(id, None);
            }
            ws.update_focus_chain(id, FocusChainChange::Update);
        });
        self.update_struts(ws, id);
    }

    pub fn set_panel_behavior(&self, ws: &mut Workspace, id: WindowId, behavior: PanelBehavior) {
        let Some(wayland) = ws.window_mut(id).and_then(|w| w.wayland.as_mut()) else {
            return;
        };
        if wayland.panel_behavior == behavior {
            return;
        }
        wayland.panel_behavior = behavior;
        self.update_struts(ws, id);
        ws.update_stacking_order(false);
    }

    pub fn set_panel_takes_focus(&self, ws: &mut Workspace, id: WindowId, takes_focus: bool) {
        let Some(window) = ws.window_mut(id) else {
            return;
        };
        let Some(wayland) = window.wayland.as_mut() else {
            return;
        };
        wayland.panel_takes_focus = takes_focus;
        if matches!(
            wayland.plasma_role,
            Some(PlasmaRole::Panel | PlasmaRole::Notification | PlasmaRole::CriticalNotification)
        ) {
            window.wants_input = takes_focus;
        }
    }

    /// Handles `set_position`; shell surfaces place themselves.
    pub fn set_position(&self, ws: &mut Workspace, id: WindowId, pos: Point<i32, Logical>) {
        let Some(window) = ws.window_mut(id) else {
            return;
        };
        if window.frame_geometry().loc == pos {
            return;
        }
        window.move_to(pos);
        self.update_struts(ws, id);
    }

    pub fn set_skip_taskbar(&self, ws: &mut Workspace, id: WindowId, skip: bool) {
        if let Some(window) = ws.window_mut(id) {
            window.states.skip_taskbar = skip;
        }
    }

    pub fn set_skip_switcher(&self, ws: &mut Workspace, id: WindowId, skip: bool) {
        let Some(window) = ws.window_mut(id) else {
            return;
        };
        window.states.skip_switcher = skip;
        if let Some(wayland) = window.wayland.as_mut() {
            wayland.skip_switcher_requested = skip;
        }
        ws.update_focus_chain(id, FocusChainChange::Update);
    }

    /// Recomputes the struts of a panel after its geometry or behavior changed.
    pub fn update_struts(&self, ws: &mut Workspace, id: WindowId) {
        let output = ws.client_area_for(ClientAreaOption::ScreenArea, id);
        let Some(window) = ws.window_mut(id) else {
            return;
        };
        let reserves = window.is_dock()
            && window
                .wayland
                .as_ref()
                .is_some_and(|w| w.panel_behavior == PanelBehavior::AlwaysVisible);
        let struts = if reserves {
            panel_struts(window.frame_geometry(), output)
        } else {
            Struts::default()
        };
        if window.struts != struts {
            window.struts = struts;
            ws.update_work_area();
        }
    }
}
