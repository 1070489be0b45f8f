use smithay::backend::input::{
    AbsolutePositionEvent, Axis, AxisSource, ButtonState, Event, InputBackend, InputEvent,
    KeyState, KeyboardKeyEvent, PointerAxisEvent, PointerButtonEvent, PointerMotionEvent,
};
use smithay::utils::{Logical, Point};

use crate::input::offset_transform;
use crate::input::shortcuts::ShortcutAction;
use crate::strata::Strata;

impl Strata {
    /// Feeds an event from an input backend such as libinput into the seat.
    pub fn process_input_event<I: InputBackend>(&mut self, event: InputEvent<I>) {
        let _span = tracy_client::span!("Strata::process_input_event");

        match event {
            InputEvent::Keyboard { event } => {
                // evdev key codes, without the xkb offset.
                let key = event.key_code().raw().saturating_sub(8);
                self.handle_keyboard_key(key, event.state(), event.time_msec());
            }
            InputEvent::PointerMotion { event } => {
                let bounds = self.outputs.bounding_rect();
                if bounds.is_empty() {
                    return;
                }
                let mut pos = self.seat.pointer_position() + event.delta();
                let right = bounds.loc.x + bounds.size.w - 1;
                let bottom = bounds.loc.y + bounds.size.h - 1;
                pos.x = pos.x.clamp(f64::from(bounds.loc.x), f64::from(right));
                pos.y = pos.y.clamp(f64::from(bounds.loc.y), f64::from(bottom));
                self.handle_pointer_motion(pos, event.time_msec());
            }
            InputEvent::PointerMotionAbsolute { event } => {
                let bounds = self.outputs.bounding_rect();
                let pos = event.position_transformed(bounds.size) + bounds.loc.to_f64();
                self.handle_pointer_motion(pos, event.time_msec());
            }
            InputEvent::PointerButton { event } => {
                self.handle_pointer_button(event.button_code(), event.state(), event.time_msec());
            }
            InputEvent::PointerAxis { event } => {
                let time = event.time_msec();
                for axis in [Axis::Vertical, Axis::Horizontal] {
                    let v120 = event.amount_v120(axis);
                    let value = event
                        .amount(axis)
                        .or_else(|| v120.map(|v120| v120 / 120. * 15.));
                    let Some(value) = value.filter(|value| *value != 0.) else {
                        continue;
                    };
                    let v120 = v120.map_or(0, |v| v.round() as i32);
                    self.handle_pointer_axis(axis, value, v120, event.source(), time);
                }
            }
            InputEvent::DeviceAdded { .. } | InputEvent::DeviceRemoved { .. } => (),
            _ => trace!("ignoring input event"),
        }
    }

    pub fn handle_keyboard_key(&mut self, key: u32, state: KeyState, time: u32) {
        if let Some(action) = self
            .seat
            .notify_keyboard_key(&mut self.display, key, state, time)
        {
            self.do_shortcut(action);
        }
    }

    pub fn do_shortcut(&mut self, action: ShortcutAction) {
        debug!("global shortcut: {action:?}");
        match action {
            ShortcutAction::CloseWindow => {
                if let Some(id) = self.workspace.active_window() {
                    self.close_window(id);
                }
            }
            ShortcutAction::SwitchToDesktop(desktop) => {
                self.workspace.set_current_desktop(desktop);
            }
            ShortcutAction::NextDesktop | ShortcutAction::PreviousDesktop => {
                let count = self.workspace.desktop_count();
                let current = self.workspace.current_desktop();
                let desktop = if action == ShortcutAction::NextDesktop {
                    current % count + 1
                } else {
                    (current + count - 2) % count + 1
                };
                self.workspace.set_current_desktop(desktop);
            }
            ShortcutAction::NextKeyboardLayout => {
                self.seat
                    .switch_keyboard_layout(&mut self.display, |keymap| {
                        keymap.switch_to_next_layout()
                    });
            }
        }
        self.process_workspace_events();
    }

    /// Moves the pointer, giving pointer focus to the window under it.
    pub fn handle_pointer_motion(&mut self, position: Point<f64, Logical>, time: u32) {
        self.seat.set_pointer_pos(&mut self.display, position, time);
        if self.seat.has_implicit_pointer_grab() {
            return;
        }

        let focus = self
            .workspace
            .window_under(position.to_i32_round(), None)
            .and_then(|id| self.workspace.window(id))
            .and_then(|w| Some((w.surface?, w.buffer_geometry().loc)));
        match focus {
            Some((surface, origin)) => self.seat.set_focused_pointer_surface(
                &mut self.display,
                Some(surface),
                offset_transform(origin.to_f64()),
            ),
            None => {
                self.seat
                    .set_focused_pointer_surface(&mut self.display, None, Default::default())
            }
        }
        self.seat.notify_pointer_frame(&mut self.display);
    }

    /// Clicking a window activates and raises it.
    pub fn handle_pointer_button(&mut self, button: u32, state: ButtonState, time: u32) {
        if state == ButtonState::Pressed {
            let position = self.seat.pointer_position().to_i32_round();
            if let Some(id) = self.workspace.window_under(position, None) {
                if self.workspace.active_window() != Some(id) {
                    self.workspace.activate_window(Some(id), true);
                    self.process_workspace_events();
                }
            }
        }
        self.seat
            .notify_pointer_button(&mut self.display, button, state, time);
        self.seat.notify_pointer_frame(&mut self.display);
    }

    pub fn handle_pointer_axis(
        &mut self,
        axis: Axis,
        value: f64,
        v120: i32,
        source: AxisSource,
        time: u32,
    ) {
        self.seat
            .notify_pointer_axis(&mut self.display, axis, value, v120, source, time);
        self.seat.notify_pointer_frame(&mut self.display);
    }
}
