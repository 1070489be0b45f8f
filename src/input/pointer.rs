use glam::DMat4;
use smithay::backend::input::{Axis, AxisSource, ButtonState};
use smithay::utils::{Logical, Point};

use super::{send_if_bound, FocusSlot, Seat};
use crate::display::{ClientEvent, Display, Interfaces, SurfaceId};
use crate::utils::serial::Serial;

pub const BTN_LEFT: u32 = 0x110;

#[derive(Debug, Default)]
pub struct PointerState {
    pub(crate) position: Point<f64, Logical>,
    pub(crate) focus: Option<FocusSlot>,
    /// Pressed buttons with the serial of their press.
    pub(crate) buttons: Vec<(u32, Serial)>,
    /// Surface holding the implicit grab while buttons are pressed.
    pub(crate) grab_surface: Option<SurfaceId>,
}

impl Seat {
    pub fn pointer_position(&self) -> Point<f64, Logical> {
        self.pointer.position
    }

    pub fn pointer_focus(&self) -> Option<SurfaceId> {
        self.pointer.focus.as_ref().map(|f| f.surface)
    }

    pub fn pointer_focus_slot(&self) -> Option<&FocusSlot> {
        self.pointer.focus.as_ref()
    }

    /// Whether buttons are held, so that pointer focus must stay where it is.
    pub fn has_implicit_pointer_grab(&self) -> bool {
        !self.pointer.buttons.is_empty()
    }

    pub fn implicit_grab_surface(&self) -> Option<SurfaceId> {
        self.pointer.grab_surface
    }

    pub fn is_pointer_button_pressed(&self, button: u32) -> bool {
        self.pointer.buttons.iter().any(|(b, _)| *b == button)
    }

    /// Serial of the press of a button that is still held.
    pub fn pointer_button_serial(&self, button: u32) -> Option<Serial> {
        self.pointer
            .buttons
            .iter()
            .find(|(b, _)| *b == button)
            .map(|(_, serial)| *serial)
    }

    /// Button whose held press was delivered with `serial`.
    pub fn pointer_button_for_serial(&self, serial: Serial) -> Option<u32> {
        self.pointer
            .buttons
            .iter()
            .find(|(_, s)| *s == serial)
            .map(|(b, _)| *b)
    }

    /// Moves the pointer and sends motion to the focused surface.
    pub fn set_pointer_pos(&mut self, display: &mut Display, position: Point<f64, Logical>, time: u32) {
        self.pointer.position = position;

        // Motion during a drag goes to the drag target.
        if self.is_pointer_drag() {
            return;
        }

        if let Some(focus) = &self.pointer.focus {
            send_if_bound(
                display,
                focus.client,
                Interfaces::POINTER,
                ClientEvent::PointerMotion {
                    time,
                    position: focus.to_local(position),
                },
            );
        }
    }

    /// Moves pointer focus, sending leave to the old and enter to the new surface.
    pub fn set_focused_pointer_surface(
        &mut self,
        display: &mut Display,
        surface: Option<SurfaceId>,
        transform: DMat4,
    ) {
        if let (Some(focus), Some(surface)) = (&mut self.pointer.focus, surface) {
            if focus.surface == surface {
                focus.transform = transform;
                return;
            }
        }
        if self.pointer.focus.is_none() && surface.is_none() {
            return;
        }

        let new_client = surface.and_then(|s| display.surface_client(s));

        if let Some(old) = self.pointer.focus.take() {
            if display.has_bound(old.client, Interfaces::POINTER) {
                let serial = display.next_serial();
                display.send(
                    old.client,
                    ClientEvent::PointerLeave {
                        serial,
                        surface: old.surface,
                    },
                );
                if new_client != Some(old.client) {
                    display.send(old.client, ClientEvent::PointerFrame);
                }
            }
        }

        let (Some(surface), Some(client)) = (surface, new_client) else {
            return;
        };

        let serial = display.next_serial();
        let focus = FocusSlot {
            surface,
            client,
            transform,
            serial,
        };
        if display.has_bound(client, Interfaces::POINTER) {
            display.send(
                client,
                ClientEvent::PointerEnter {
                    serial,
                    surface,
                    position: focus.to_local(self.pointer.position),
                },
            );
            display.send(client, ClientEvent::PointerFrame);
        }
        self.pointer.focus = Some(focus);
    }

    /// Updates the input transformation of the focused surface, e.g. after it moved.
    pub fn set_focused_pointer_surface_transformation(&mut self, transform: DMat4) {
        if let Some(focus) = &mut self.pointer.focus {
            focus.transform = transform;
        }
    }

    pub fn notify_pointer_button(
        &mut self,
        display: &mut Display,
        button: u32,
        state: ButtonState,
        time: u32,
    ) -> Serial {
        let serial = display.next_serial();

        match state {
            ButtonState::Pressed => {
                if self.pointer.buttons.is_empty() {
                    self.pointer.grab_surface = self.pointer_focus();
                }
                self.pointer.buttons.retain(|(b, _)| *b != button);
                self.pointer.buttons.push((button, serial));

                if self.is_pointer_drag() {
                    return serial;
                }
                self.focus_keyboard_child(display);
            }
            ButtonState::Released => {
                let was_pressed = self.is_pointer_button_pressed(button);
                self.pointer.buttons.retain(|(b, _)| *b != button);
                if self.pointer.buttons.is_empty() {
                    self.pointer.grab_surface = None;
                }

                if self.drag.as_ref().is_some_and(|d| d.is_pointer_button(button)) {
                    self.end_drag(display);
                    return serial;
                }
                if !was_pressed {
                    trace!("release of button {button} that was not pressed");
                }
            }
        }

        if let Some(focus) = &self.pointer.focus {
            send_if_bound(
                display,
                focus.client,
                Interfaces::POINTER,
                ClientEvent::PointerButton {
                    serial,
                    time,
                    button,
                    state,
                },
            );
        }
        serial
    }

    /// Moves keyboard focus to the pressed subsurface of the keyboard-focused surface.
    fn focus_keyboard_child(&mut self, display: &mut Display) {
        let Some(pointer) = self.pointer_focus() else {
            return;
        };
        let Some(keyboard) = &self.keyboard.focus else {
            return;
        };
        if keyboard.surface == pointer
            || display.root_surface(pointer) != display.root_surface(keyboard.surface)
        {
            return;
        }
        self.set_keyboard_child_surface(display, pointer);
    }

    pub fn notify_pointer_axis(
        &mut self,
        display: &mut Display,
        axis: Axis,
        value: f64,
        v120: i32,
        source: AxisSource,
        time: u32,
    ) {
        if let Some(focus) = &self.pointer.focus {
            send_if_bound(
                display,
                focus.client,
                Interfaces::POINTER,
                ClientEvent::PointerAxis {
                    time,
                    axis,
                    value,
                    v120,
                    source,
                },
            );
        }
    }

    pub fn notify_pointer_frame(&mut self, display: &mut Display) {
        if let Some(focus) = &self.pointer.focus {
            send_if_bound(display, focus.client, Interfaces::POINTER, ClientEvent::PointerFrame);
        }
    }

    /// Sends unaccelerated and accelerated motion deltas to the focused surface.
    pub fn relative_pointer_motion(
        &mut self,
        display: &mut Display,
        delta: Point<f64, Logical>,
        delta_unaccel: Point<f64, Logical>,
        utime: u64,
    ) {
        if let Some(focus) = &self.pointer.focus {
            send_if_bound(
                display,
                focus.client,
                Interfaces::RELATIVE_POINTER,
                ClientEvent::RelativeMotion {
                    utime,
                    delta,
                    delta_unaccel,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::offset_transform;
    use crate::input::tests::setup;

    #[test]
    fn button_serials_and_implicit_grab() {
        let (mut display, mut seat, client) = setup(Interfaces::POINTER);
        let s = display.create_surface(client).unwrap();
        seat.set_focused_pointer_surface(&mut display, Some(s), DMat4::IDENTITY);

        let serial = seat.notify_pointer_button(&mut display, BTN_LEFT, ButtonState::Pressed, 1);
        assert!(seat.has_implicit_pointer_grab());
        assert_eq!(seat.implicit_grab_surface(), Some(s));
        assert_eq!(seat.pointer_button_serial(BTN_LEFT), Some(serial));
        assert_eq!(seat.pointer_button_for_serial(serial), Some(BTN_LEFT));

        seat.notify_pointer_button(&mut display, BTN_LEFT, ButtonState::Released, 2);
        assert!(!seat.has_implicit_pointer_grab());
        assert_eq!(seat.pointer_button_serial(BTN_LEFT), None);
    }

    #[test]
    fn motion_is_transformed() {
        let (mut display, mut seat, client) = setup(Interfaces::POINTER);
        let s = display.create_surface(client).unwrap();
        seat.set_focused_pointer_surface(&mut display, Some(s), offset_transform((100., 50.).into()));
        display.take_events(client);

        seat.set_pointer_pos(&mut display, (110., 70.).into(), 5);
        seat.notify_pointer_frame(&mut display);
        assert_eq!(
            display.take_events(client),
            vec![
                ClientEvent::PointerMotion {
                    time: 5,
                    position: (10., 20.).into(),
                },
                ClientEvent::PointerFrame,
            ]
        );
    }

    #[test]
    fn unbound_clients_get_nothing() {
        let (mut display, mut seat, client) = setup(Interfaces::KEYBOARD);
        let s = display.create_surface(client).unwrap();
        seat.set_focused_pointer_surface(&mut display, Some(s), DMat4::IDENTITY);
        seat.notify_pointer_button(&mut display, BTN_LEFT, ButtonState::Pressed, 1);

        assert_eq!(seat.pointer_focus(), Some(s));
        assert!(display.events(client).is_empty());
    }
}
