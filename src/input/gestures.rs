//! Pointer gestures.
//!
//! A gesture sticks to the surface that had pointer focus when it began. Updates and the end go
//! there even if pointer focus moves in between.

use smithay::utils::{Logical, Point};

use super::{FocusSlot, Seat};
use crate::display::{ClientEvent, ClientId, Display, Interfaces};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Swipe,
    Pinch,
    Hold,
}

#[derive(Debug, Clone)]
pub struct ActiveGesture {
    pub kind: GestureKind,
    pub fingers: u32,
    pub(crate) focus: FocusSlot,
}

impl Seat {
    pub fn active_gesture(&self) -> Option<&ActiveGesture> {
        self.gesture.as_ref()
    }

    fn start_gesture(&mut self, display: &mut Display, kind: GestureKind, fingers: u32, time: u32) {
        if let Some(active) = self.gesture.as_ref().map(|g| g.kind) {
            debug!("{kind:?} gesture started during a {active:?} gesture");
            self.end_gesture(display, active, true, time);
        }

        let Some(focus) = self.pointer.focus.clone() else {
            return;
        };
        if !display.has_bound(focus.client, Interfaces::POINTER_GESTURES) {
            return;
        }

        let serial = display.next_serial();
        let surface = focus.surface;
        let event = match kind {
            GestureKind::Swipe => ClientEvent::SwipeBegin {
                serial,
                time,
                surface,
                fingers,
            },
            GestureKind::Pinch => ClientEvent::PinchBegin {
                serial,
                time,
                surface,
                fingers,
            },
            GestureKind::Hold => ClientEvent::HoldBegin {
                serial,
                time,
                surface,
                fingers,
            },
        };
        display.send(focus.client, event);
        self.gesture = Some(ActiveGesture {
            kind,
            fingers,
            focus,
        });
    }

    fn end_gesture(&mut self, display: &mut Display, kind: GestureKind, cancelled: bool, time: u32) {
        let Some(gesture) = self.gesture.take_if(|g| g.kind == kind) else {
            return;
        };

        let serial = display.next_serial();
        let event = match kind {
            GestureKind::Swipe => ClientEvent::SwipeEnd {
                serial,
                time,
                cancelled,
            },
            GestureKind::Pinch => ClientEvent::PinchEnd {
                serial,
                time,
                cancelled,
            },
            GestureKind::Hold => ClientEvent::HoldEnd {
                serial,
                time,
                cancelled,
            },
        };
        display.send(gesture.focus.client, event);
    }

    fn gesture_client(&self, kind: GestureKind) -> Option<ClientId> {
        self.gesture
            .as_ref()
            .filter(|g| g.kind == kind)
            .map(|g| g.focus.client)
    }

    pub fn start_pointer_swipe_gesture(&mut self, display: &mut Display, fingers: u32, time: u32) {
        self.start_gesture(display, GestureKind::Swipe, fingers, time);
    }

    pub fn update_pointer_swipe_gesture(
        &mut self,
        display: &mut Display,
        delta: Point<f64, Logical>,
        time: u32,
    ) {
        if let Some(client) = self.gesture_client(GestureKind::Swipe) {
            display.send(client, ClientEvent::SwipeUpdate { time, delta });
        }
    }

    pub fn end_pointer_swipe_gesture(&mut self, display: &mut Display, time: u32) {
        self.end_gesture(display, GestureKind::Swipe, false, time);
    }

    pub fn cancel_pointer_swipe_gesture(&mut self, display: &mut Display, time: u32) {
        self.end_gesture(display, GestureKind::Swipe, true, time);
    }

    pub fn start_pointer_pinch_gesture(&mut self, display: &mut Display, fingers: u32, time: u32) {
        self.start_gesture(display, GestureKind::Pinch, fingers, time);
    }

    pub fn update_pointer_pinch_gesture(
        &mut self,
        display: &mut Display,
        delta: Point<f64, Logical>,
        scale: f64,
        rotation: f64,
        time: u32,
    ) {
        if let Some(client) = self.gesture_client(GestureKind::Pinch) {
            display.send(
                client,
                ClientEvent::PinchUpdate {
                    time,
                    delta,
                    scale,
                    rotation,
                },
            );
        }
    }

    pub fn end_pointer_pinch_gesture(&mut self, display: &mut Display, time: u32) {
        self.end_gesture(display, GestureKind::Pinch, false, time);
    }

    pub fn cancel_pointer_pinch_gesture(&mut self, display: &mut Display, time: u32) {
        self.end_gesture(display, GestureKind::Pinch, true, time);
    }

    pub fn start_pointer_hold_gesture(&mut self, display: &mut Display, fingers: u32, time: u32) {
        self.start_gesture(display, GestureKind::Hold, fingers, time);
    }

    pub fn end_pointer_hold_gesture(&mut self, display: &mut Display, time: u32) {
        self.end_gesture(display, GestureKind::Hold, false, time);
    }

    pub fn cancel_pointer_hold_gesture(&mut self, display: &mut Display, time: u32) {
        self.end_gesture(display, GestureKind::Hold, true, time);
    }
}

#[cfg(test)]
mod tests {
    use glam::DMat4;

    use super::*;
    use crate::input::tests::setup;

    #[test]
    fn gesture_sticks_to_start_surface() {
        let (mut display, mut seat, a) = setup(Interfaces::POINTER | Interfaces::POINTER_GESTURES);
        let b = display.create_client(None);
        display.bind(b, Interfaces::POINTER | Interfaces::POINTER_GESTURES);
        let sa = display.create_surface(a).unwrap();
        let sb = display.create_surface(b).unwrap();

        seat.set_focused_pointer_surface(&mut display, Some(sa), DMat4::IDENTITY);
        seat.start_pointer_swipe_gesture(&mut display, 3, 1);
        seat.set_focused_pointer_surface(&mut display, Some(sb), DMat4::IDENTITY);
        seat.update_pointer_swipe_gesture(&mut display, (1., 0.).into(), 2);
        seat.end_pointer_swipe_gesture(&mut display, 3);

        let gestures_of = |events: &[ClientEvent]| {
            events
                .iter()
                .filter(|e| {
                    matches!(
                        e,
                        ClientEvent::SwipeBegin { .. }
                            | ClientEvent::SwipeUpdate { .. }
                            | ClientEvent::SwipeEnd { .. }
                    )
                })
                .count()
        };
        assert_eq!(gestures_of(display.events(a)), 3);
        assert_eq!(gestures_of(display.events(b)), 0);
        assert!(seat.active_gesture().is_none());
    }

    #[test]
    fn mismatched_end_is_ignored() {
        let (mut display, mut seat, a) = setup(Interfaces::POINTER | Interfaces::POINTER_GESTURES);
        let s = display.create_surface(a).unwrap();
        seat.set_focused_pointer_surface(&mut display, Some(s), DMat4::IDENTITY);

        seat.start_pointer_pinch_gesture(&mut display, 2, 1);
        seat.end_pointer_swipe_gesture(&mut display, 2);
        assert_eq!(seat.active_gesture().map(|g| g.kind), Some(GestureKind::Pinch));

        seat.cancel_pointer_pinch_gesture(&mut display, 3);
        assert!(matches!(
            display.events(a).last(),
            Some(ClientEvent::PinchEnd { cancelled: true, .. })
        ));
    }
}
