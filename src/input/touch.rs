use std::collections::HashMap;

use glam::DMat4;
use smithay::backend::input::ButtonState;
use smithay::utils::{Logical, Point};

use super::pointer::BTN_LEFT;
use super::{FocusSlot, Seat};
use crate::display::{ClientEvent, Display, Interfaces, SurfaceId};
use crate::utils::serial::Serial;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    /// Serial of the down event.
    pub serial: Serial,
    pub position: Point<f64, Logical>,
}

#[derive(Debug, Default)]
pub struct TouchState {
    pub(crate) focus: Option<FocusSlot>,
    pub(crate) points: HashMap<i32, TouchPoint>,
    /// Touch point driving the emulated pointer for clients without touch support.
    pub(crate) emulated: Option<i32>,
}

impl Seat {
    pub fn touch_focus(&self) -> Option<SurfaceId> {
        self.touch.focus.as_ref().map(|f| f.surface)
    }

    /// Whether a touch sequence is in progress.
    pub fn is_touch_sequence(&self) -> bool {
        !self.touch.points.is_empty()
    }

    pub fn touch_point(&self, id: i32) -> Option<&TouchPoint> {
        self.touch.points.get(&id)
    }

    pub fn touch_down_serial(&self, id: i32) -> Option<Serial> {
        self.touch.points.get(&id).map(|p| p.serial)
    }

    /// Touch point whose down event was delivered with `serial`.
    pub fn touch_id_for_serial(&self, serial: Serial) -> Option<i32> {
        self.touch
            .points
            .iter()
            .find(|(_, p)| p.serial == serial)
            .map(|(id, _)| *id)
    }

    /// Sets the surface touch points go to.
    ///
    /// The surface cannot change in the middle of a sequence, returns `false` in that case.
    pub fn set_focused_touch_surface(
        &mut self,
        display: &Display,
        surface: Option<SurfaceId>,
        transform: DMat4,
    ) -> bool {
        if self.is_touch_sequence() {
            let same = self.touch.focus.as_ref().map(|f| f.surface) == surface;
            if !same {
                debug!("not moving touch focus during a touch sequence");
            }
            return same;
        }

        self.touch.focus = surface.and_then(|surface| {
            Some(FocusSlot {
                surface,
                client: display.surface_client(surface)?,
                transform,
                serial: Serial(0),
            })
        });
        true
    }

    pub fn notify_touch_down(
        &mut self,
        display: &mut Display,
        id: i32,
        position: Point<f64, Logical>,
        time: u32,
    ) -> Option<Serial> {
        let focus = self.touch.focus.clone()?;
        if self.touch.points.contains_key(&id) {
            debug!("duplicate touch down for id {id}");
            return None;
        }

        if !display.has_bound(focus.client, Interfaces::TOUCH) {
            // Clients without touch support see the first touch point as a left click.
            if id != 0 || self.touch.emulated.is_some() {
                return None;
            }
            self.touch.emulated = Some(id);
            self.set_focused_pointer_surface(display, Some(focus.surface), focus.transform);
            self.set_pointer_pos(display, position, time);
            let serial = self.notify_pointer_button(display, BTN_LEFT, ButtonState::Pressed, time);
            self.notify_pointer_frame(display);
            self.touch.points.insert(id, TouchPoint { serial, position });
            return Some(serial);
        }

        let serial = display.next_serial();
        display.send(
            focus.client,
            ClientEvent::TouchDown {
                serial,
                time,
                surface: focus.surface,
                id,
                position: focus.to_local(position),
            },
        );
        self.touch.points.insert(id, TouchPoint { serial, position });
        Some(serial)
    }

    pub fn notify_touch_motion(
        &mut self,
        display: &mut Display,
        id: i32,
        position: Point<f64, Logical>,
        time: u32,
    ) {
        let Some(point) = self.touch.points.get_mut(&id) else {
            return;
        };
        point.position = position;

        if self.drag.as_ref().is_some_and(|d| d.is_touch_id(id)) {
            return;
        }
        let Some(focus) = self.touch.focus.clone() else {
            return;
        };

        if self.touch.emulated == Some(id) {
            self.set_pointer_pos(display, position, time);
            self.notify_pointer_frame(display);
        } else if display.has_bound(focus.client, Interfaces::TOUCH) {
            display.send(
                focus.client,
                ClientEvent::TouchMotion {
                    time,
                    id,
                    position: focus.to_local(position),
                },
            );
        }
    }

    /// Lifts a touch point. Unknown points are ignored.
    pub fn notify_touch_up(&mut self, display: &mut Display, id: i32, time: u32) {
        if self.touch.points.remove(&id).is_none() {
            return;
        }

        if self.drag.as_ref().is_some_and(|d| d.is_touch_id(id)) {
            self.end_drag(display);
            return;
        }

        if self.touch.emulated == Some(id) {
            self.touch.emulated = None;
            self.notify_pointer_button(display, BTN_LEFT, ButtonState::Released, time);
            self.notify_pointer_frame(display);
            return;
        }

        let Some(focus) = &self.touch.focus else {
            return;
        };
        if display.has_bound(focus.client, Interfaces::TOUCH) {
            let serial = display.next_serial();
            display.send(focus.client, ClientEvent::TouchUp { serial, time, id });
        }
    }

    pub fn notify_touch_frame(&mut self, display: &mut Display) {
        if let Some(focus) = &self.touch.focus {
            if display.has_bound(focus.client, Interfaces::TOUCH) {
                display.send(focus.client, ClientEvent::TouchFrame);
            }
        }
    }

    /// Cancels the touch sequence on every client with touch support.
    pub fn cancel_touch_sequence(&mut self, display: &mut Display) {
        let clients: Vec<_> = display
            .clients()
            .filter(|c| c.bound.contains(Interfaces::TOUCH))
            .map(|c| c.id)
            .collect();
        for client in clients {
            display.send(client, ClientEvent::TouchCancel);
        }

        if self.touch.emulated.take().is_some() {
            self.notify_pointer_button(display, BTN_LEFT, ButtonState::Released, 0);
        }
        if self.drag.as_ref().is_some_and(|d| d.is_touch()) {
            self.cancel_drag(display);
        }
        self.touch.points.clear();
        self.touch.focus = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::offset_transform;
    use crate::input::tests::setup;

    #[test]
    fn cancel_on_surface_destroy() {
        let (mut display, mut seat, client) = setup(Interfaces::TOUCH);
        let s = display.create_surface(client).unwrap();
        assert!(seat.set_focused_touch_surface(&display, Some(s), DMat4::IDENTITY));

        seat.notify_touch_down(&mut display, 0, (1., 1.).into(), 1).unwrap();
        seat.notify_touch_down(&mut display, 1, (2., 2.).into(), 2).unwrap();
        assert!(seat.is_touch_sequence());

        display.destroy_surface(s);
        seat.surface_destroyed(&mut display, s);
        assert!(!seat.is_touch_sequence());
        assert_eq!(display.events(client).last(), Some(&ClientEvent::TouchCancel));

        display.take_events(client);
        seat.notify_touch_up(&mut display, 0, 3);
        assert!(display.events(client).is_empty());
    }

    #[test]
    fn focus_is_fixed_during_sequence() {
        let (mut display, mut seat, client) = setup(Interfaces::TOUCH);
        let s1 = display.create_surface(client).unwrap();
        let s2 = display.create_surface(client).unwrap();

        seat.set_focused_touch_surface(&display, Some(s1), offset_transform((10., 10.).into()));
        seat.notify_touch_down(&mut display, 0, (15., 15.).into(), 1);
        assert!(!seat.set_focused_touch_surface(&display, Some(s2), DMat4::IDENTITY));
        assert_eq!(seat.touch_focus(), Some(s1));

        seat.notify_touch_up(&mut display, 0, 2);
        assert!(seat.set_focused_touch_surface(&display, Some(s2), DMat4::IDENTITY));

        let events = display.events(client);
        assert!(matches!(
            events[0],
            ClientEvent::TouchDown { id: 0, position, .. } if position == Point::from((5., 5.))
        ));
    }

    #[test]
    fn first_touch_emulates_pointer() {
        let (mut display, mut seat, client) = setup(Interfaces::POINTER);
        let s = display.create_surface(client).unwrap();
        seat.set_focused_touch_surface(&display, Some(s), DMat4::IDENTITY);

        seat.notify_touch_down(&mut display, 0, (3., 4.).into(), 1);
        assert!(seat.is_pointer_button_pressed(BTN_LEFT));
        assert_eq!(seat.pointer_focus(), Some(s));
        // Further touch points are not emulated.
        assert_eq!(seat.notify_touch_down(&mut display, 1, (5., 5.).into(), 2), None);

        seat.notify_touch_up(&mut display, 0, 3);
        assert!(!seat.is_pointer_button_pressed(BTN_LEFT));

        let buttons: Vec<_> = display
            .events(client)
            .iter()
            .filter_map(|e| match e {
                ClientEvent::PointerButton { state, .. } => Some(*state),
                _ => None,
            })
            .collect();
        assert_eq!(buttons, [ButtonState::Pressed, ButtonState::Released]);
    }
}
