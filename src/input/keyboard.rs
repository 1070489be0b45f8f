use smithay::backend::input::KeyState;
use super::keymap::{Keymap, KeymapError, ModifierState};
use super::shortcuts::ShortcutAction;
use super::{Seat, SeatEvent};
use crate::display::{ClientEvent, ClientId, Display, Interfaces, SurfaceId};
use crate::utils::serial::Serial;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardFocus {
    /// Surface that was asked to have focus.
    pub root: SurfaceId,
    /// Surface that got the enter, `root` or one of its subsurfaces.
    pub surface: SurfaceId,
    pub client: ClientId,
    pub serial: Serial,
}

#[derive(Debug)]
pub struct KeyboardState {
    pub(crate) keymap: Option<Keymap>,
    pub(crate) focus: Option<KeyboardFocus>,
    /// Pressed evdev keycodes.
    pub(crate) pressed: Vec<u32>,
    /// Pressed keys that triggered a global shortcut; their release is not forwarded either.
    pub(crate) intercepted: Vec<u32>,
    pub(crate) repeat_rate: i32,
    pub(crate) repeat_delay: i32,
    /// Xwayland surface that holds the keyboard.
    pub(crate) xwayland_grab: Option<(ClientId, SurfaceId)>,
}

impl Default for KeyboardState {
    fn default() -> Self {
        Self {
            keymap: None,
            focus: None,
            pressed: Vec::new(),
            intercepted: Vec::new(),
            repeat_rate: 25,
            repeat_delay: 600,
            xwayland_grab: None,
        }
    }
}

impl Seat {
    pub fn keymap(&self) -> Option<&Keymap> {
        self.keyboard.keymap.as_ref()
    }

    pub fn keyboard_focus(&self) -> Option<SurfaceId> {
        self.keyboard.focus.map(|f| f.root)
    }

    pub fn keyboard_focus_slot(&self) -> Option<KeyboardFocus> {
        self.keyboard.focus
    }

    pub fn pressed_keys(&self) -> &[u32] {
        &self.keyboard.pressed
    }

    /// Installs a keymap and sends it to every client with a keyboard.
    pub fn set_keymap(&mut self, display: &mut Display, keymap: Keymap) {
        self.keyboard.keymap = Some(keymap);
        self.send_keymap(display);
    }

    /// Runs `f` on the keymap, resending it if it changed.
    pub fn update_keymap(
        &mut self,
        display: &mut Display,
        f: impl FnOnce(&mut Keymap) -> Result<bool, KeymapError>,
    ) -> Result<(), KeymapError> {
        let Some(keymap) = &mut self.keyboard.keymap else {
            return Ok(());
        };
        if f(keymap)? {
            self.send_keymap(display);
        }
        Ok(())
    }

    fn send_keymap(&mut self, display: &mut Display) {
        let Some(keymap) = &self.keyboard.keymap else {
            return;
        };
        // Clients get the keymap as a NUL-terminated string.
        let size = keymap.keymap_string().len() + 1;
        let clients: Vec<_> = display
            .clients()
            .filter(|c| c.bound.contains(Interfaces::KEYBOARD))
            .map(|c| c.id)
            .collect();
        for client in clients {
            display.send(client, ClientEvent::KeyboardKeymap { size });
        }
        self.send_modifiers(display);
    }

    pub fn set_keyboard_repeat_info(&mut self, display: &mut Display, rate: i32, delay: i32) {
        self.keyboard.repeat_rate = rate;
        self.keyboard.repeat_delay = delay;
        let clients: Vec<_> = display
            .clients()
            .filter(|c| c.bound.contains(Interfaces::KEYBOARD))
            .map(|c| c.id)
            .collect();
        for client in clients {
            display.send(client, ClientEvent::KeyboardRepeatInfo { rate, delay });
        }
    }

    /// Sends the repeat info and keymap to a client that just bound a keyboard.
    pub fn keyboard_bound(&self, display: &mut Display, client: ClientId) {
        display.send(
            client,
            ClientEvent::KeyboardRepeatInfo {
                rate: self.keyboard.repeat_rate,
                delay: self.keyboard.repeat_delay,
            },
        );
        if let Some(keymap) = &self.keyboard.keymap {
            let size = keymap.keymap_string().len() + 1;
            display.send(client, ClientEvent::KeyboardKeymap { size });
        }
    }

    /// Moves keyboard focus, sending leave to the old and enter to the new surface.
    ///
    /// The new surface gets the pressed keys and the modifiers. Text input and shortcut inhibitors
    /// follow the keyboard focus and the clipboard selection is offered to the new client.
    pub fn set_focused_keyboard_surface(&mut self, display: &mut Display, surface: Option<SurfaceId>) {
        let mut surface = surface;
        if let Some((grab_client, grab)) = self.keyboard.xwayland_grab {
            let client = surface.and_then(|s| display.surface_client(s));
            if client != Some(grab_client) {
                trace!("keyboard focus held by the Xwayland grab");
                surface = Some(grab);
            }
        }

        if self.keyboard_focus() == surface {
            return;
        }

        if let Some(old) = self.keyboard.focus.take() {
            self.shortcuts_inhibitors.deactivate(display, old.root);
            if display.has_bound(old.client, Interfaces::KEYBOARD) {
                let serial = display.next_serial();
                display.send(
                    old.client,
                    ClientEvent::KeyboardLeave {
                        serial,
                        surface: old.surface,
                    },
                );
            }
        }

        let client = surface.and_then(|s| display.surface_client(s));
        if let (Some(surface), Some(client)) = (surface, client) {
            let serial = self.send_keyboard_enter(display, client, surface);
            self.keyboard.focus = Some(KeyboardFocus {
                root: surface,
                surface,
                client,
                serial,
            });
            self.send_modifiers(display);
            self.send_selection(display, client);
            self.shortcuts_inhibitors.activate(display, surface);
        }

        let focus = self.keyboard_focus();
        self.update_text_input(display, focus);
        self.push_event(SeatEvent::KeyboardFocusChanged(focus));
    }

    fn send_keyboard_enter(&self, display: &mut Display, client: ClientId, surface: SurfaceId) -> Serial {
        let serial = display.next_serial();
        if display.has_bound(client, Interfaces::KEYBOARD) {
            display.send(
                client,
                ClientEvent::KeyboardEnter {
                    serial,
                    surface,
                    keys: self.keyboard.pressed.clone(),
                },
            );
        }
        serial
    }

    /// Moves the enter within the focused surface tree to `child`.
    pub(crate) fn set_keyboard_child_surface(&mut self, display: &mut Display, child: SurfaceId) {
        let Some(focus) = self.keyboard.focus else {
            return;
        };
        if focus.surface == child {
            return;
        }

        if display.has_bound(focus.client, Interfaces::KEYBOARD) {
            let serial = display.next_serial();
            display.send(
                focus.client,
                ClientEvent::KeyboardLeave {
                    serial,
                    surface: focus.surface,
                },
            );
        }
        let serial = self.send_keyboard_enter(display, focus.client, child);
        self.keyboard.focus = Some(KeyboardFocus {
            surface: child,
            serial,
            ..focus
        });
        self.send_modifiers(display);
    }

    fn send_modifiers(&self, display: &mut Display) {
        let (Some(focus), Some(keymap)) = (&self.keyboard.focus, &self.keyboard.keymap) else {
            return;
        };
        if !display.has_bound(focus.client, Interfaces::KEYBOARD) {
            return;
        }
        let ModifierState {
            depressed,
            latched,
            locked,
            group,
        } = keymap.modifiers();
        let serial = display.next_serial();
        display.send(
            focus.client,
            ClientEvent::KeyboardModifiers {
                serial,
                depressed,
                latched,
                locked,
                group,
            },
        );
    }

    /// Feeds a key to xkb and the focused client.
    ///
    /// A press matching a global shortcut is consumed unless the focused surface inhibits
    /// shortcuts, and the shortcut is returned.
    pub fn notify_keyboard_key(
        &mut self,
        display: &mut Display,
        key: u32,
        state: KeyState,
        time: u32,
    ) -> Option<ShortcutAction> {
        let _span = tracy_client::span!("Seat::notify_keyboard_key");

        match state {
            KeyState::Pressed => {
                if !self.keyboard.pressed.contains(&key) {
                    self.keyboard.pressed.push(key);
                }
            }
            KeyState::Released => self.keyboard.pressed.retain(|k| *k != key),
        }

        let mut modifiers_changed = false;
        if let Some(keymap) = &mut self.keyboard.keymap {
            let before = keymap.modifiers();
            keymap.update_key(key, state);
            let after = keymap.modifiers();
            modifiers_changed = before != after;
            if before.group != after.group {
                self.events.push(SeatEvent::LayoutChanged(after.group));
            }
        }

        let mut shortcut = None;
        let forward = match state {
            KeyState::Pressed => {
                shortcut = self.filter_global_shortcut();
                if shortcut.is_some() {
                    trace!("key {key} triggered {shortcut:?}");
                    self.keyboard.intercepted.push(key);
                }
                shortcut.is_none()
            }
            KeyState::Released => {
                let intercepted = self.keyboard.intercepted.contains(&key);
                self.keyboard.intercepted.retain(|k| *k != key);
                !intercepted
            }
        };

        if let Some(focus) = self.keyboard.focus.as_ref().filter(|_| forward) {
            if display.has_bound(focus.client, Interfaces::KEYBOARD) {
                let serial = display.next_serial();
                display.send(
                    focus.client,
                    ClientEvent::KeyboardKey {
                        serial,
                        time,
                        key,
                        state,
                    },
                );
            }
        }
        if modifiers_changed {
            self.send_modifiers(display);
        }
        shortcut
    }

    fn filter_global_shortcut(&self) -> Option<ShortcutAction> {
        if self.keyboard_shortcuts_inhibited() {
            return None;
        }
        let keymap = self.keyboard.keymap.as_ref()?;
        let modifiers = keymap.modifiers_relevant_for_global_shortcuts();
        self.shortcuts.find(modifiers, keymap.keysym())
    }

    /// Sets the modifiers directly and sends them to the focused client.
    pub fn notify_keyboard_modifiers(&mut self, display: &mut Display, modifiers: ModifierState) {
        let Some(keymap) = &mut self.keyboard.keymap else {
            return;
        };
        let group = keymap.modifiers().group;
        if keymap.update_modifiers_from(modifiers) {
            if group != modifiers.group {
                self.events.push(SeatEvent::LayoutChanged(modifiers.group));
            }
            self.send_modifiers(display);
        }
    }

    /// Switches the keyboard layout with `f`, announcing the change.
    pub fn switch_keyboard_layout(&mut self, display: &mut Display, f: impl FnOnce(&mut Keymap) -> bool) {
        let Some(keymap) = &mut self.keyboard.keymap else {
            return;
        };
        if f(keymap) {
            let layout = keymap.current_layout();
            self.events.push(SeatEvent::LayoutChanged(layout));
            self.send_modifiers(display);
        }
    }

    /// Gives an Xwayland surface the keyboard until the grab is released.
    pub fn set_xwayland_keyboard_grab(&mut self, display: &mut Display, grab: Option<SurfaceId>) {
        self.keyboard.xwayland_grab =
            grab.and_then(|surface| Some((display.surface_client(surface)?, surface)));
        if let Some((_, surface)) = self.keyboard.xwayland_grab {
            self.set_focused_keyboard_surface(display, Some(surface));
        }
    }

    pub(super) fn keyboard_surface_destroyed(&mut self, surface: SurfaceId) {
        if self.keyboard.xwayland_grab.is_some_and(|(_, s)| s == surface) {
            self.keyboard.xwayland_grab = None;
        }
        let Some(focus) = &mut self.keyboard.focus else {
            return;
        };
        if focus.root == surface {
            self.keyboard.focus = None;
            self.push_event(SeatEvent::KeyboardFocusChanged(None));
        } else if focus.surface == surface {
            focus.surface = focus.root;
        }
    }
}

#[cfg(test)]
mod tests {
    use smithay::backend::input::ButtonState;

    use super::*;
    use crate::input::pointer::BTN_LEFT;
    use crate::input::tests::setup;
    use glam::DMat4;

    const KEY_K: u32 = 37;
    const KEY_LEFTALT: u32 = 56;
    const KEY_LEFTMETA: u32 = 125;

    fn us_keymap() -> Keymap {
        let config = strata_config::Keyboard {
            xkb: strata_config::Xkb {
                layout: String::from("us"),
                ..Default::default()
            },
            ..Default::default()
        };
        Keymap::new(&config, false, |_| None).unwrap()
    }

    fn key_events(display: &mut Display, client: ClientId) -> Vec<(u32, KeyState)> {
        display
            .take_events(client)
            .into_iter()
            .filter_map(|event| match event {
                ClientEvent::KeyboardKey { key, state, .. } => Some((key, state)),
                _ => None,
            })
            .collect()
    }

    /// Presses and releases Meta+Alt+K.
    fn next_layout_shortcut(seat: &mut Seat, display: &mut Display) -> Option<ShortcutAction> {
        seat.notify_keyboard_key(display, KEY_LEFTMETA, KeyState::Pressed, 1);
        seat.notify_keyboard_key(display, KEY_LEFTALT, KeyState::Pressed, 2);
        let action = seat.notify_keyboard_key(display, KEY_K, KeyState::Pressed, 3);
        seat.notify_keyboard_key(display, KEY_K, KeyState::Released, 4);
        seat.notify_keyboard_key(display, KEY_LEFTALT, KeyState::Released, 5);
        seat.notify_keyboard_key(display, KEY_LEFTMETA, KeyState::Released, 6);
        action
    }

    #[test]
    fn global_shortcut_is_consumed() {
        let (mut display, mut seat, client) = setup(Interfaces::KEYBOARD);
        let surface = display.create_surface(client).unwrap();
        seat.set_keymap(&mut display, us_keymap());
        seat.set_focused_keyboard_surface(&mut display, Some(surface));
        display.take_events(client);

        assert_eq!(
            next_layout_shortcut(&mut seat, &mut display),
            Some(ShortcutAction::NextKeyboardLayout)
        );
        assert_eq!(
            key_events(&mut display, client),
            [
                (KEY_LEFTMETA, KeyState::Pressed),
                (KEY_LEFTALT, KeyState::Pressed),
                (KEY_LEFTALT, KeyState::Released),
                (KEY_LEFTMETA, KeyState::Released),
            ]
        );
    }

    #[test]
    fn inhibited_surface_gets_shortcut_keys() {
        let (mut display, mut seat, client) = setup(Interfaces::KEYBOARD);
        let surface = display.create_surface(client).unwrap();
        seat.set_keymap(&mut display, us_keymap());
        seat.set_focused_keyboard_surface(&mut display, Some(surface));
        seat.shortcuts_inhibitors_mut()
            .inhibit(&mut display, surface, true)
            .unwrap();
        assert!(seat.keyboard_shortcuts_inhibited());
        display.take_events(client);

        assert_eq!(next_layout_shortcut(&mut seat, &mut display), None);
        assert_eq!(key_events(&mut display, client).len(), 6);
    }

    #[test]
    fn enter_carries_pressed_keys() {
        let (mut display, mut seat, client) = setup(Interfaces::KEYBOARD);
        let s1 = display.create_surface(client).unwrap();
        let s2 = display.create_surface(client).unwrap();

        seat.set_focused_keyboard_surface(&mut display, Some(s1));
        seat.notify_keyboard_key(&mut display, 30, KeyState::Pressed, 1);
        display.take_events(client);

        seat.set_focused_keyboard_surface(&mut display, Some(s2));
        let events = display.take_events(client);
        assert!(matches!(
            &events[0],
            ClientEvent::KeyboardLeave { surface, .. } if *surface == s1
        ));
        assert!(matches!(
            &events[1],
            ClientEvent::KeyboardEnter { surface, keys, .. } if *surface == s2 && keys == &[30]
        ));
        assert_eq!(
            seat.take_events(),
            vec![
                SeatEvent::KeyboardFocusChanged(Some(s1)),
                SeatEvent::KeyboardFocusChanged(Some(s2)),
            ]
        );
    }

    #[test]
    fn press_on_subsurface_moves_keyboard_enter() {
        let (mut display, mut seat, client) = setup(Interfaces::KEYBOARD | Interfaces::POINTER);
        let root = display.create_surface(client).unwrap();
        let child = display.create_surface(client).unwrap();
        display.set_subsurface(child, root).unwrap();

        seat.set_focused_keyboard_surface(&mut display, Some(root));
        seat.set_focused_pointer_surface(&mut display, Some(child), DMat4::IDENTITY);
        display.take_events(client);

        seat.notify_pointer_button(&mut display, BTN_LEFT, ButtonState::Pressed, 1);
        let events = display.take_events(client);
        assert!(matches!(
            &events[0],
            ClientEvent::KeyboardLeave { surface, .. } if *surface == root
        ));
        assert!(matches!(
            &events[1],
            ClientEvent::KeyboardEnter { surface, .. } if *surface == child
        ));
        assert_eq!(seat.keyboard_focus(), Some(root));
        assert_eq!(seat.keyboard_focus_slot().unwrap().surface, child);
    }

    #[test]
    fn xwayland_grab_holds_focus() {
        let (mut display, mut seat, client) = setup(Interfaces::KEYBOARD);
        let xwayland = display.create_xwayland_client(None);
        let x = display.create_surface(xwayland).unwrap();
        let x2 = display.create_surface(xwayland).unwrap();
        let s = display.create_surface(client).unwrap();

        seat.set_xwayland_keyboard_grab(&mut display, Some(x));
        assert_eq!(seat.keyboard_focus(), Some(x));

        seat.set_focused_keyboard_surface(&mut display, Some(s));
        assert_eq!(seat.keyboard_focus(), Some(x));
        seat.set_focused_keyboard_surface(&mut display, Some(x2));
        assert_eq!(seat.keyboard_focus(), Some(x2));

        seat.set_xwayland_keyboard_grab(&mut display, None);
        seat.set_focused_keyboard_surface(&mut display, Some(s));
        assert_eq!(seat.keyboard_focus(), Some(s));
    }
}
