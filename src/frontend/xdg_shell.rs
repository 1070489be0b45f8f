use smithay::delegate_xdg_decoration;
use smithay::delegate_xdg_shell;
use smithay::reexports::wayland_protocols::xdg::decoration::zv1::server::zxdg_toplevel_decoration_v1;
use smithay::reexports::wayland_protocols::xdg::shell::server::xdg_positioner::{
    Anchor, ConstraintAdjustment, Gravity,
};
use smithay::reexports::wayland_server::protocol::wl_output::WlOutput;
use smithay::reexports::wayland_server::protocol::wl_seat::WlSeat;
use smithay::reexports::wayland_server::protocol::wl_surface::WlSurface;
use smithay::utils::Serial as WireSerial;
use smithay::wayland::compositor::with_states;
use smithay::wayland::shell::xdg::decoration::XdgDecorationHandler;
use smithay::wayland::shell::xdg::{
    Configure, PopupSurface, PositionerState, ShellClient, ToplevelSurface, XdgShellHandler,
    XdgShellState, XdgToplevelSurfaceData,
};

use super::client_id;
use crate::display::SurfaceId;
use crate::strata::State;
use crate::utils::serial::Serial;
use crate::window::decoration::DecorationMode;
use crate::window::positioner::{ConstraintAdjustments, Edges, Positioner};

fn anchor_edges(anchor: Anchor) -> Edges {
    match anchor {
        Anchor::Top => Edges::TOP,
        Anchor::Bottom => Edges::BOTTOM,
        Anchor::Left => Edges::LEFT,
        Anchor::Right => Edges::RIGHT,
        Anchor::TopLeft => Edges::TOP | Edges::LEFT,
        Anchor::BottomLeft => Edges::BOTTOM | Edges::LEFT,
        Anchor::TopRight => Edges::TOP | Edges::RIGHT,
        Anchor::BottomRight => Edges::BOTTOM | Edges::RIGHT,
        _ => Edges::empty(),
    }
}

fn gravity_edges(gravity: Gravity) -> Edges {
    match gravity {
        Gravity::Top => Edges::TOP,
        Gravity::Bottom => Edges::BOTTOM,
        Gravity::Left => Edges::LEFT,
        Gravity::Right => Edges::RIGHT,
        Gravity::TopLeft => Edges::TOP | Edges::LEFT,
        Gravity::BottomLeft => Edges::BOTTOM | Edges::LEFT,
        Gravity::TopRight => Edges::TOP | Edges::RIGHT,
        Gravity::BottomRight => Edges::BOTTOM | Edges::RIGHT,
        _ => Edges::empty(),
    }
}

pub fn positioner_from_state(state: &PositionerState) -> Positioner {
    let mut constraint_adjustments = ConstraintAdjustments::empty();
    for (wire, ours) in [
        (ConstraintAdjustment::SlideX, ConstraintAdjustments::SLIDE_X),
        (ConstraintAdjustment::SlideY, ConstraintAdjustments::SLIDE_Y),
        (ConstraintAdjustment::FlipX, ConstraintAdjustments::FLIP_X),
        (ConstraintAdjustment::FlipY, ConstraintAdjustments::FLIP_Y),
        (ConstraintAdjustment::ResizeX, ConstraintAdjustments::RESIZE_X),
        (ConstraintAdjustment::ResizeY, ConstraintAdjustments::RESIZE_Y),
    ] {
        if state.constraint_adjustment.contains(wire) {
            constraint_adjustments |= ours;
        }
    }

    Positioner {
        size: state.rect_size,
        anchor_rect: state.anchor_rect,
        anchor_edges: anchor_edges(state.anchor_edges),
        gravity: gravity_edges(state.gravity),
        offset: state.offset,
        constraint_adjustments,
        reactive: state.reactive,
    }
}

fn wire_serial(serial: WireSerial) -> Serial {
    Serial(u32::from(serial))
}

impl State {
    fn toplevel_id(&self, toplevel: &ToplevelSurface) -> Option<SurfaceId> {
        self.strata.frontend.surface_id(toplevel.wl_surface())
    }

    fn surface_of(&self, wl_surface: &WlSurface) -> Option<SurfaceId> {
        self.strata.frontend.surface_id(wl_surface)
    }
}

impl XdgShellHandler for State {
    fn xdg_shell_state(&mut self) -> &mut XdgShellState {
        &mut self.strata.frontend.xdg_shell_state
    }

    fn new_toplevel(&mut self, toplevel: ToplevelSurface) {
        let Some(surface) = self.toplevel_id(&toplevel) else {
            return;
        };
        if let Some(wire) = toplevel
            .wl_surface()
            .client()
            .as_ref()
            .and_then(client_id)
            .and_then(|id| self.strata.frontend.clients.get_mut(&id))
        {
            wire.shell.get_or_insert_with(|| toplevel.client());
        }

        if self.strata.new_toplevel(surface).is_some() {
            self.strata.frontend.toplevels.insert(surface, toplevel);
        }
    }

    fn new_popup(&mut self, popup: PopupSurface, positioner: PositionerState) {
        let Some(surface) = self.surface_of(popup.wl_surface()) else {
            return;
        };
        let parent = popup
            .get_parent_surface()
            .and_then(|parent| self.surface_of(&parent));

        let positioner = positioner_from_state(&positioner);
        if self.strata.new_popup(surface, parent, positioner).is_some() {
            self.strata.frontend.popups.insert(surface, popup);
        }
    }

    fn grab(&mut self, popup: PopupSurface, _seat: WlSeat, serial: WireSerial) {
        if let Some(surface) = self.surface_of(popup.wl_surface()) {
            self.strata.popup_grab(surface, wire_serial(serial));
        }
    }

    fn reposition_request(&mut self, popup: PopupSurface, positioner: PositionerState, token: u32) {
        if let Some(surface) = self.surface_of(popup.wl_surface()) {
            self.strata
                .reposition_popup(surface, positioner_from_state(&positioner), token);
        }
    }

    fn ack_configure(&mut self, wl_surface: WlSurface, configure: Configure) {
        let Some(surface) = self.surface_of(&wl_surface) else {
            return;
        };
        let wire = match configure {
            Configure::Toplevel(configure) => configure.serial,
            Configure::Popup(configure) => configure.serial,
        };
        // Configures sent by smithay on its own, like decoration changes, have no counterpart.
        if let Some(serial) = self.strata.frontend.take_configure(surface, wire) {
            self.strata.ack_configure(surface, serial);
        }
    }

    fn client_pong(&mut self, client: ShellClient) {
        let Some((id, pings)) = self
            .strata
            .frontend
            .clients
            .iter_mut()
            .find(|(_, wire)| wire.shell.as_ref() == Some(&client))
            .map(|(id, wire)| (*id, std::mem::take(&mut wire.pings)))
        else {
            return;
        };
        for serial in pings {
            self.strata.pong(id, serial);
        }
    }

    fn maximize_request(&mut self, toplevel: ToplevelSurface) {
        if let Some(surface) = self.toplevel_id(&toplevel) {
            self.strata.request_maximized(surface, true);
        }
    }

    fn unmaximize_request(&mut self, toplevel: ToplevelSurface) {
        if let Some(surface) = self.toplevel_id(&toplevel) {
            self.strata.request_maximized(surface, false);
        }
    }

    fn fullscreen_request(&mut self, toplevel: ToplevelSurface, _output: Option<WlOutput>) {
        if let Some(surface) = self.toplevel_id(&toplevel) {
            self.strata.request_fullscreen(surface, true);
        }
    }

    fn unfullscreen_request(&mut self, toplevel: ToplevelSurface) {
        if let Some(surface) = self.toplevel_id(&toplevel) {
            self.strata.request_fullscreen(surface, false);
        }
    }

    fn minimize_request(&mut self, toplevel: ToplevelSurface) {
        if let Some(surface) = self.toplevel_id(&toplevel) {
            self.strata.request_minimized(surface);
        }
    }

    fn toplevel_destroyed(&mut self, toplevel: ToplevelSurface) {
        let Some(surface) = self.toplevel_id(&toplevel) else {
            return;
        };
        self.strata.frontend.toplevels.remove(&surface);
        self.strata.xdg_surface_destroyed(surface);
    }

    fn popup_destroyed(&mut self, popup: PopupSurface) {
        let Some(surface) = self.surface_of(popup.wl_surface()) else {
            return;
        };
        self.strata.frontend.popups.remove(&surface);
        self.strata.xdg_surface_destroyed(surface);
    }

    fn title_changed(&mut self, toplevel: ToplevelSurface) {
        let Some(surface) = self.toplevel_id(&toplevel) else {
            return;
        };
        let title = with_states(toplevel.wl_surface(), |states| {
            states
                .data_map
                .get::<XdgToplevelSurfaceData>()
                .and_then(|data| data.lock().ok()?.title.clone())
        });
        self.strata.set_title(surface, title.unwrap_or_default());
    }

    fn app_id_changed(&mut self, toplevel: ToplevelSurface) {
        let Some(surface) = self.toplevel_id(&toplevel) else {
            return;
        };
        let app_id = with_states(toplevel.wl_surface(), |states| {
            states
                .data_map
                .get::<XdgToplevelSurfaceData>()
                .and_then(|data| data.lock().ok()?.app_id.clone())
        });
        self.strata.set_app_id(surface, app_id.unwrap_or_default());
    }

    fn parent_changed(&mut self, toplevel: ToplevelSurface) {
        let Some(surface) = self.toplevel_id(&toplevel) else {
            return;
        };
        let parent = toplevel.parent().and_then(|p| self.surface_of(&p));
        self.strata.set_parent(surface, parent);
    }
}

impl XdgDecorationHandler for State {
    fn new_decoration(&mut self, toplevel: ToplevelSurface) {
        if let Some(surface) = self.toplevel_id(&toplevel) {
            self.strata.request_decoration_mode(surface, None);
        }
    }

    fn request_mode(&mut self, toplevel: ToplevelSurface, mode: zxdg_toplevel_decoration_v1::Mode) {
        let mode = match mode {
            zxdg_toplevel_decoration_v1::Mode::ServerSide => DecorationMode::ServerSide,
            _ => DecorationMode::ClientSide,
        };
        if let Some(surface) = self.toplevel_id(&toplevel) {
            self.strata.request_decoration_mode(surface, Some(mode));
        }
    }

    fn unset_mode(&mut self, toplevel: ToplevelSurface) {
        if let Some(surface) = self.toplevel_id(&toplevel) {
            self.strata.request_decoration_mode(surface, None);
        }
    }
}

delegate_xdg_shell!(State);
delegate_xdg_decoration!(State);

#[cfg(test)]
mod tests {
    use smithay::utils::Rectangle;

    use super::*;

    #[test]
    fn positioner_edges_and_adjustments() {
        let state = PositionerState {
            rect_size: (200, 100).into(),
            anchor_rect: Rectangle::new((10, 20).into(), (30, 40).into()),
            anchor_edges: Anchor::BottomRight,
            gravity: Gravity::Bottom,
            constraint_adjustment: ConstraintAdjustment::FlipY | ConstraintAdjustment::SlideX,
            offset: (0, 4).into(),
            reactive: true,
            ..PositionerState::default()
        };

        let positioner = positioner_from_state(&state);
        assert_eq!(positioner.size, (200, 100).into());
        assert_eq!(positioner.anchor_edges, Edges::BOTTOM | Edges::RIGHT);
        assert_eq!(positioner.gravity, Edges::BOTTOM);
        assert_eq!(
            positioner.constraint_adjustments,
            ConstraintAdjustments::FLIP_Y | ConstraintAdjustments::SLIDE_X
        );
        assert!(positioner.reactive);
        assert!(positioner.validate().is_ok());
    }

    #[test]
    fn centered_positioner_has_no_edges() {
        let state = PositionerState {
            rect_size: (10, 10).into(),
            anchor_edges: Anchor::None,
            gravity: Gravity::None,
            ..PositionerState::default()
        };
        let positioner = positioner_from_state(&state);
        assert_eq!(positioner.anchor_edges, Edges::empty());
        assert_eq!(positioner.gravity, Edges::empty());
        assert_eq!(positioner.constraint_adjustments, ConstraintAdjustments::empty());
    }
}
