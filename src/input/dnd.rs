//! Drag-and-drop.
//!
//! A drag starts from an implicit grab, a held pointer button or touch point, and follows that
//! device until the button is released, the touch point lifted, or the source goes away.

use glam::DMat4;
use smithay::utils::{Logical, Point};

use super::{FocusSlot, Seat, SeatEvent};
use crate::display::{ClientEvent, ClientId, Display, Interfaces, SurfaceId};
use crate::utils::serial::Serial;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragMode {
    Pointer { button: u32 },
    Touch { id: i32 },
}

/// Data source offered by the dragging client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragSource {
    pub client: ClientId,
    pub mime_types: Vec<String>,
}

#[derive(Debug)]
pub struct Drag {
    pub mode: DragMode,
    pub origin: SurfaceId,
    pub source: Option<DragSource>,
    pub icon: Option<SurfaceId>,
    /// Serial of the press that started the drag.
    pub serial: Serial,
    pub(crate) target: Option<FocusSlot>,
}

impl Drag {
    pub fn target(&self) -> Option<SurfaceId> {
        self.target.as_ref().map(|t| t.surface)
    }

    pub fn is_touch(&self) -> bool {
        matches!(self.mode, DragMode::Touch { .. })
    }

    pub fn is_pointer_button(&self, button: u32) -> bool {
        self.mode == DragMode::Pointer { button }
    }

    pub fn is_touch_id(&self, id: i32) -> bool {
        self.mode == DragMode::Touch { id }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DragError {
    #[error("a drag is already in progress")]
    AlreadyDragging,
    #[error("serial does not belong to an implicit grab on the origin surface")]
    NoImplicitGrab,
}

impl Seat {
    pub fn drag(&self) -> Option<&Drag> {
        self.drag.as_ref()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn is_pointer_drag(&self) -> bool {
        self.drag.as_ref().is_some_and(|d| !d.is_touch())
    }

    pub fn is_touch_drag(&self) -> bool {
        self.drag.as_ref().is_some_and(|d| d.is_touch())
    }

    /// Starts a drag from `origin`.
    ///
    /// `serial` must be the serial of a button press or touch down that is still held on the
    /// origin surface tree.
    pub fn start_drag(
        &mut self,
        display: &Display,
        origin: SurfaceId,
        source: Option<DragSource>,
        icon: Option<SurfaceId>,
        serial: Serial,
    ) -> Result<(), DragError> {
        if self.drag.is_some() {
            return Err(DragError::AlreadyDragging);
        }

        let root = display.root_surface(origin);
        let on_origin = |surface: Option<SurfaceId>| {
            surface.is_some_and(|s| display.root_surface(s) == root)
        };

        let mode = if let Some(button) = self
            .pointer_button_for_serial(serial)
            .filter(|_| on_origin(self.implicit_grab_surface()))
        {
            DragMode::Pointer { button }
        } else if let Some(id) = self
            .touch_id_for_serial(serial)
            .filter(|_| on_origin(self.touch_focus()))
        {
            DragMode::Touch { id }
        } else {
            return Err(DragError::NoImplicitGrab);
        };

        debug!("starting {mode:?} drag from {origin:?}");
        self.drag = Some(Drag {
            mode,
            origin,
            source,
            icon,
            serial,
            target: None,
        });
        self.push_event(SeatEvent::DragStarted);
        Ok(())
    }

    /// Moves the drag over `surface` at the global `position`.
    pub fn set_drag_target(
        &mut self,
        display: &mut Display,
        surface: Option<SurfaceId>,
        position: Point<f64, Logical>,
        transform: DMat4,
        time: u32,
    ) {
        let Some(drag) = &mut self.drag else {
            return;
        };

        match drag.mode {
            DragMode::Pointer { .. } => self.pointer.position = position,
            DragMode::Touch { id } => {
                if let Some(point) = self.touch.points.get_mut(&id) {
                    point.position = position;
                }
            }
        }

        if let (Some(target), Some(surface)) = (&mut drag.target, surface) {
            if target.surface == surface {
                target.transform = transform;
                if display.has_bound(target.client, Interfaces::DATA_DEVICE) {
                    display.send(
                        target.client,
                        ClientEvent::DataOfferMotion {
                            time,
                            position: target.to_local(position),
                        },
                    );
                }
                return;
            }
        }

        if let Some(old) = drag.target.take() {
            if display.has_bound(old.client, Interfaces::DATA_DEVICE) {
                display.send(old.client, ClientEvent::DataOfferLeave);
            }
        }

        let Some(surface) = surface else {
            return;
        };
        let Some(client) = display.surface_client(surface) else {
            return;
        };

        let serial = display.next_serial();
        let target = FocusSlot {
            surface,
            client,
            transform,
            serial,
        };
        if display.has_bound(client, Interfaces::DATA_DEVICE) {
            let mime_types = drag
                .source
                .as_ref()
                .map(|s| s.mime_types.clone())
                .unwrap_or_default();
            display.send(
                client,
                ClientEvent::DataOfferEnter {
                    serial,
                    surface,
                    position: target.to_local(position),
                    mime_types,
                },
            );
        }
        drag.target = Some(target);
    }

    /// Finishes the drag, dropping on the target if there is one.
    pub(crate) fn end_drag(&mut self, display: &mut Display) {
        let Some(drag) = self.drag.take() else {
            return;
        };

        let dropped = drag.target.is_some();
        if let Some(target) = &drag.target {
            display.send(target.client, ClientEvent::DataOfferDrop);
        }
        if let Some(source) = &drag.source {
            let event = if dropped {
                ClientEvent::DataSourceDropPerformed
            } else {
                ClientEvent::DataSourceCancelled
            };
            display.send(source.client, event);
        }

        debug!("drag ended, dropped: {dropped}");
        self.push_event(SeatEvent::DragEnded { dropped });
    }

    /// Aborts the drag without dropping.
    pub(crate) fn cancel_drag(&mut self, display: &mut Display) {
        let Some(drag) = self.drag.take() else {
            return;
        };

        if let Some(target) = &drag.target {
            display.send(target.client, ClientEvent::DataOfferLeave);
        }
        if let Some(source) = &drag.source {
            display.send(source.client, ClientEvent::DataSourceCancelled);
        }

        debug!("drag cancelled");
        self.push_event(SeatEvent::DragEnded { dropped: false });
    }

    /// Ends the drag after its data source was destroyed.
    pub fn drag_source_destroyed(&mut self, display: &mut Display) {
        if let Some(drag) = &mut self.drag {
            drag.source = None;
        }
        self.cancel_drag(display);
    }

    pub(super) fn drag_surface_destroyed(&mut self, surface: SurfaceId) {
        let Some(drag) = &mut self.drag else {
            return;
        };
        if drag.target.as_ref().is_some_and(|t| t.surface == surface) {
            drag.target = None;
        }
        if drag.icon == Some(surface) {
            drag.icon = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use smithay::backend::input::ButtonState;

    use super::*;
    use crate::input::pointer::BTN_LEFT;
    use crate::input::tests::setup;

    fn source(client: ClientId) -> Option<DragSource> {
        Some(DragSource {
            client,
            mime_types: vec![String::from("text/uri-list")],
        })
    }

    #[test]
    fn pointer_drag_drops_on_release() {
        let (mut display, mut seat, a) = setup(Interfaces::POINTER | Interfaces::DATA_DEVICE);
        let b = display.create_client(None);
        display.bind(b, Interfaces::DATA_DEVICE);
        let origin = display.create_surface(a).unwrap();
        let target = display.create_surface(b).unwrap();

        seat.set_focused_pointer_surface(&mut display, Some(origin), DMat4::IDENTITY);
        let serial = seat.notify_pointer_button(&mut display, BTN_LEFT, ButtonState::Pressed, 1);

        assert_eq!(
            seat.start_drag(&display, origin, source(a), None, Serial(serial.0 + 100)),
            Err(DragError::NoImplicitGrab)
        );
        seat.start_drag(&display, origin, source(a), None, serial).unwrap();
        assert_eq!(
            seat.start_drag(&display, origin, source(a), None, serial),
            Err(DragError::AlreadyDragging)
        );
        assert!(seat.is_pointer_drag());

        seat.set_drag_target(&mut display, Some(target), (5., 5.).into(), DMat4::IDENTITY, 2);
        seat.set_drag_target(&mut display, Some(target), (6., 5.).into(), DMat4::IDENTITY, 3);
        display.take_events(a);

        seat.notify_pointer_button(&mut display, BTN_LEFT, ButtonState::Released, 4);
        assert!(!seat.is_dragging());

        let events = display.take_events(b);
        assert!(matches!(events[0], ClientEvent::DataOfferEnter { .. }));
        assert!(matches!(events[1], ClientEvent::DataOfferMotion { time: 3, .. }));
        assert_eq!(events[2], ClientEvent::DataOfferDrop);
        assert_eq!(display.events(a), &[ClientEvent::DataSourceDropPerformed]);
        assert_eq!(
            seat.take_events(),
            vec![SeatEvent::DragStarted, SeatEvent::DragEnded { dropped: true }]
        );
    }

    #[test]
    fn touch_drag_ends_on_touch_up() {
        let (mut display, mut seat, a) = setup(Interfaces::TOUCH | Interfaces::DATA_DEVICE);
        let origin = display.create_surface(a).unwrap();
        seat.set_focused_touch_surface(&display, Some(origin), DMat4::IDENTITY);
        let serial = seat
            .notify_touch_down(&mut display, 3, (1., 1.).into(), 1)
            .unwrap();

        seat.start_drag(&display, origin, source(a), None, serial).unwrap();
        assert!(seat.is_touch_drag());

        // Without a target there is nothing to drop on.
        seat.notify_touch_up(&mut display, 3, 2);
        assert!(!seat.is_dragging());
        assert_eq!(
            display.events(a).last(),
            Some(&ClientEvent::DataSourceCancelled)
        );
    }

    #[test]
    fn source_destruction_cancels() {
        let (mut display, mut seat, a) = setup(Interfaces::POINTER | Interfaces::DATA_DEVICE);
        let origin = display.create_surface(a).unwrap();
        seat.set_focused_pointer_surface(&mut display, Some(origin), DMat4::IDENTITY);
        let serial = seat.notify_pointer_button(&mut display, BTN_LEFT, ButtonState::Pressed, 1);
        seat.start_drag(&display, origin, source(a), None, serial).unwrap();
        seat.set_drag_target(&mut display, Some(origin), (1., 1.).into(), DMat4::IDENTITY, 2);
        display.take_events(a);

        seat.drag_source_destroyed(&mut display);
        assert!(!seat.is_dragging());
        assert_eq!(display.events(a), &[ClientEvent::DataOfferLeave]);
        assert_eq!(
            seat.take_events().last(),
            Some(&SeatEvent::DragEnded { dropped: false })
        );
    }
}
