//! `zwp_xwayland_keyboard_grab_manager_v1`, only visible to Xwayland.

use crate::display::{Display, Global, ProtocolError, SurfaceId};
use crate::input::Seat;

const VERSION: u32 = 1;

#[derive(Debug, Default)]
pub struct XwaylandKeyboardGrabState {
    grab: Option<SurfaceId>,
}

impl XwaylandKeyboardGrabState {
    pub fn new(display: &mut Display) -> Self {
        trace!("xwayland keyboard grab manager v{VERSION}");
        display.advertise(Global::XwaylandKeyboardGrabManager);
        Self::default()
    }

    pub fn grab(&self) -> Option<SurfaceId> {
        self.grab
    }

    pub fn grab_keyboard(
        &mut self,
        display: &mut Display,
        seat: &mut Seat,
        surface: SurfaceId,
    ) -> Result<(), ProtocolError> {
        let is_xwayland = display
            .surface_client(surface)
            .and_then(|c| display.client(c))
            .is_some_and(|c| c.is_xwayland);
        if !is_xwayland {
            return Err(ProtocolError::new(
                "zwp_xwayland_keyboard_grab_manager_v1",
                0,
                "only Xwayland may grab the keyboard",
            ));
        }

        debug!("xwayland keyboard grab on {surface:?}");
        self.grab = Some(surface);
        seat.set_xwayland_keyboard_grab(display, Some(surface));
        Ok(())
    }

    /// Destroys the grab object.
    pub fn ungrab_keyboard(&mut self, display: &mut Display, seat: &mut Seat) {
        if self.grab.take().is_some() {
            seat.set_xwayland_keyboard_grab(display, None);
        }
    }

    pub fn surface_destroyed(&mut self, surface: SurfaceId) {
        if self.grab == Some(surface) {
            self.grab = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_xwayland_can_grab() {
        let mut display = Display::new();
        let mut seat = Seat::new("seat0");
        let mut state = XwaylandKeyboardGrabState::new(&mut display);

        let client = display.create_client(None);
        let surface = display.create_surface(client).unwrap();
        assert!(state.grab_keyboard(&mut display, &mut seat, surface).is_err());

        let xwayland = display.create_xwayland_client(None);
        let x_surface = display.create_surface(xwayland).unwrap();
        state.grab_keyboard(&mut display, &mut seat, x_surface).unwrap();
        assert_eq!(seat.keyboard_focus(), Some(x_surface));

        seat.set_focused_keyboard_surface(&mut display, Some(surface));
        assert_eq!(seat.keyboard_focus(), Some(x_surface));

        state.ungrab_keyboard(&mut display, &mut seat);
        seat.set_focused_keyboard_surface(&mut display, Some(surface));
        assert_eq!(seat.keyboard_focus(), Some(surface));
    }
}
