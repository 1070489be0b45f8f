//! Global keyboard shortcuts.
//!
//! A key press that matches a shortcut is consumed by the compositor and never reaches the
//! focused client, together with its release. Surfaces with an active shortcuts inhibitor get
//! every key.

use smithay::input::keyboard::{xkb, Keysym};

use super::keymap::ShortcutModifiers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutAction {
    CloseWindow,
    SwitchToDesktop(u32),
    NextDesktop,
    PreviousDesktop,
    NextKeyboardLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortcut {
    pub modifiers: ShortcutModifiers,
    pub keysym: Keysym,
    pub action: ShortcutAction,
}

#[derive(Debug, Clone)]
pub struct GlobalShortcuts {
    shortcuts: Vec<Shortcut>,
}

impl Default for GlobalShortcuts {
    fn default() -> Self {
        let alt = ShortcutModifiers::ALT;
        let ctrl = ShortcutModifiers::CTRL;
        let ctrl_logo = ShortcutModifiers::CTRL | ShortcutModifiers::LOGO;
        let logo_alt = ShortcutModifiers::LOGO | ShortcutModifiers::ALT;

        let mut rv = Self::empty();
        rv.add(alt, Keysym::F4, ShortcutAction::CloseWindow);
        for (n, keysym) in [Keysym::F1, Keysym::F2, Keysym::F3, Keysym::F4]
            .into_iter()
            .enumerate()
        {
            rv.add(ctrl, keysym, ShortcutAction::SwitchToDesktop(n as u32 + 1));
        }
        rv.add(ctrl_logo, Keysym::Right, ShortcutAction::NextDesktop);
        rv.add(ctrl_logo, Keysym::Left, ShortcutAction::PreviousDesktop);
        rv.add(logo_alt, Keysym::k, ShortcutAction::NextKeyboardLayout);
        rv
    }
}

impl GlobalShortcuts {
    pub fn empty() -> Self {
        Self {
            shortcuts: Vec::new(),
        }
    }

    /// Adds a shortcut, replacing the action of an existing one with the same keys.
    pub fn add(&mut self, modifiers: ShortcutModifiers, keysym: Keysym, action: ShortcutAction) {
        self.shortcuts
            .retain(|s| !(s.modifiers == modifiers && s.keysym == keysym));
        self.shortcuts.push(Shortcut {
            modifiers,
            keysym,
            action,
        });
    }

    pub fn remove(&mut self, modifiers: ShortcutModifiers, keysym: Keysym) {
        self.shortcuts
            .retain(|s| !(s.modifiers == modifiers && s.keysym == keysym));
    }

    /// Finds the shortcut for a key press. Letters match regardless of case.
    pub fn find(&self, modifiers: ShortcutModifiers, keysym: Keysym) -> Option<ShortcutAction> {
        self.shortcuts
            .iter()
            .find(|s| s.modifiers == modifiers && same_key(s.keysym, keysym))
            .map(|s| s.action)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shortcut> {
        self.shortcuts.iter()
    }
}

fn same_key(a: Keysym, b: Keysym) -> bool {
    if a == b {
        return true;
    }
    let letter = |keysym: Keysym| {
        char::from_u32(xkb::keysym_to_utf32(keysym))
            .filter(|c| c.is_alphabetic())
            .map(|c| c.to_lowercase().collect::<String>())
    };
    letter(a).is_some_and(|a| Some(a) == letter(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_match_either_case() {
        let shortcuts = GlobalShortcuts::default();
        let logo_alt = ShortcutModifiers::LOGO | ShortcutModifiers::ALT;
        assert_eq!(
            shortcuts.find(logo_alt, Keysym::K),
            Some(ShortcutAction::NextKeyboardLayout)
        );
        assert_eq!(shortcuts.find(ShortcutModifiers::LOGO, Keysym::k), None);
    }

    #[test]
    fn adding_replaces_the_action() {
        let mut shortcuts = GlobalShortcuts::empty();
        shortcuts.add(ShortcutModifiers::ALT, Keysym::F4, ShortcutAction::CloseWindow);
        shortcuts.add(ShortcutModifiers::ALT, Keysym::F4, ShortcutAction::NextDesktop);
        assert_eq!(shortcuts.iter().count(), 1);
        assert_eq!(
            shortcuts.find(ShortcutModifiers::ALT, Keysym::F4),
            Some(ShortcutAction::NextDesktop)
        );

        shortcuts.remove(ShortcutModifiers::ALT, Keysym::F4);
        assert_eq!(shortcuts.find(ShortcutModifiers::ALT, Keysym::F4), None);
    }
}
