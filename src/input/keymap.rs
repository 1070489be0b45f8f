//! Keymap and xkb state.
//!
//! The keymap tracks the full xkb state for the seat keyboard: modifiers, LEDs, the active layout
//! and the compose sequence in progress. Clients get the keymap as a string and follow along with
//! the serialized modifiers.

use std::ffi::OsString;

use bitflags::bitflags;
use smithay::backend::input::KeyState;
use smithay::input::keyboard::xkb::{self, compose};
use smithay::input::keyboard::Keysym;
use strata_config::{Keyboard, NumLock, Xkb};

/// Offset between evdev and xkb keycodes.
const EVDEV_OFFSET: u32 = 8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeymapError {
    #[error("error compiling keymap from {0:?}")]
    Compile(RuleNames),
    #[error("layout {index} does not exist, the keymap has {count}")]
    InvalidLayout { index: u32, count: u32 },
}

/// Rule names used to compile a keymap.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RuleNames {
    pub rules: String,
    pub model: String,
    pub layout: String,
    pub variant: String,
    pub options: Option<String>,
}

impl RuleNames {
    /// Takes every name from the config, or from `XKB_DEFAULT_*` where the config has none.
    ///
    /// xkb reads the same variables itself through `secure_getenv`, which returns nothing for
    /// processes with raised capabilities, so the fallback is done here.
    pub fn resolve(config: &Xkb, getenv: impl Fn(&str) -> Option<String>) -> Self {
        let pick = |value: &str, var: &str| {
            if value.is_empty() {
                getenv(var).unwrap_or_default()
            } else {
                value.to_owned()
            }
        };

        Self {
            rules: pick(&config.rules, "XKB_DEFAULT_RULES"),
            model: pick(&config.model, "XKB_DEFAULT_MODEL"),
            layout: pick(&config.layout, "XKB_DEFAULT_LAYOUT"),
            variant: pick(&config.variant, "XKB_DEFAULT_VARIANT"),
            options: config
                .options
                .clone()
                .or_else(|| getenv("XKB_DEFAULT_OPTIONS")),
        }
    }
}

/// Serialized modifier state as sent to clients.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ModifierState {
    pub depressed: u32,
    pub latched: u32,
    pub locked: u32,
    pub group: u32,
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct Leds: u8 {
        const NUM_LOCK = 1 << 0;
        const CAPS_LOCK = 1 << 1;
        const SCROLL_LOCK = 1 << 2;
        const COMPOSE = 1 << 3;
        const KANA = 1 << 4;
    }
}

bitflags! {
    /// Modifiers as far as global shortcuts are concerned.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct ShortcutModifiers: u8 {
        const SHIFT = 1 << 0;
        const CTRL = 1 << 1;
        const ALT = 1 << 2;
        const LOGO = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy)]
struct ModIndices {
    shift: xkb::ModIndex,
    ctrl: xkb::ModIndex,
    alt: xkb::ModIndex,
    logo: xkb::ModIndex,
    caps: xkb::ModIndex,
    num: xkb::ModIndex,
}

impl ModIndices {
    fn new(keymap: &xkb::Keymap) -> Self {
        Self {
            shift: keymap.mod_get_index(xkb::MOD_NAME_SHIFT),
            ctrl: keymap.mod_get_index(xkb::MOD_NAME_CTRL),
            alt: keymap.mod_get_index(xkb::MOD_NAME_ALT),
            logo: keymap.mod_get_index(xkb::MOD_NAME_LOGO),
            caps: keymap.mod_get_index(xkb::MOD_NAME_CAPS),
            num: keymap.mod_get_index(xkb::MOD_NAME_NUM),
        }
    }
}

fn mask(index: xkb::ModIndex) -> u32 {
    if index == xkb::MOD_INVALID || index >= 32 {
        0
    } else {
        1 << index
    }
}

pub struct Keymap {
    context: xkb::Context,
    keymap: xkb::Keymap,
    state: xkb::State,
    compose: Option<compose::State>,
    indices: ModIndices,
    keymap_string: String,
    names: RuleNames,

    modifiers: ModifierState,
    leds: Leds,
    keysym: Keysym,
    /// Modifiers that were consumed producing `keysym`.
    consumed: xkb::ModMask,

    numlock: NumLock,
    force_num_lock_evaluation: bool,
    /// Whether a keymap has been loaded before.
    started: bool,
}

impl std::fmt::Debug for Keymap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keymap")
            .field("names", &self.names)
            .field("modifiers", &self.modifiers)
            .field("leds", &self.leds)
            .field("keysym", &self.keysym)
            .finish_non_exhaustive()
    }
}

impl Keymap {
    /// Compiles the keymap described by the config.
    ///
    /// `getenv` is consulted for the `XKB_DEFAULT_*` fallbacks and for the compose locale.
    pub fn new(
        config: &Keyboard,
        force_num_lock_evaluation: bool,
        getenv: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, KeymapError> {
        let _span = tracy_client::span!("Keymap::new");

        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let names = RuleNames::resolve(&config.xkb, &getenv);
        let keymap = compile(&context, &names)?;
        let compose = compose_state(&context, &getenv);

        let state = xkb::State::new(&keymap);
        let mut rv = Self {
            indices: ModIndices::new(&keymap),
            keymap_string: keymap.get_as_string(xkb::KEYMAP_FORMAT_TEXT_V1),
            context,
            keymap,
            state,
            compose,
            names,
            modifiers: ModifierState::default(),
            leds: Leds::empty(),
            keysym: Keysym::NoSymbol,
            consumed: 0,
            numlock: config.numlock,
            force_num_lock_evaluation,
            started: false,
        };
        rv.evaluate_startup_num_lock();
        rv.started = true;
        rv.update_modifiers();
        Ok(rv)
    }

    /// Recompiles the keymap after a config change.
    ///
    /// Returns whether the keymap changed, in which case it must be sent to clients again.
    pub fn reconfigure(
        &mut self,
        config: &Keyboard,
        getenv: impl Fn(&str) -> Option<String>,
    ) -> Result<bool, KeymapError> {
        self.numlock = config.numlock;
        let names = RuleNames::resolve(&config.xkb, getenv);
        if names == self.names && !self.force_num_lock_evaluation {
            return Ok(false);
        }

        let keymap = compile(&self.context, &names)?;
        self.names = names;
        self.update_keymap(keymap);
        Ok(true)
    }

    /// Switches to a new keymap, keeping the lock state of NumLock and CapsLock.
    pub fn update_keymap(&mut self, keymap: xkb::Keymap) {
        let preserved = self.started.then(|| {
            let locked = self.state.serialize_mods(xkb::STATE_MODS_LOCKED);
            (
                locked & mask(self.indices.num) != 0,
                locked & mask(self.indices.caps) != 0,
            )
        });

        self.indices = ModIndices::new(&keymap);
        self.keymap_string = keymap.get_as_string(xkb::KEYMAP_FORMAT_TEXT_V1);
        self.state = xkb::State::new(&keymap);
        self.keymap = keymap;

        if let Some((num, caps)) = preserved {
            self.set_locked(self.indices.num, num);
            self.set_locked(self.indices.caps, caps);
        }

        // The startup NumLock setting is applied again only on request.
        if !self.started || self.force_num_lock_evaluation {
            self.evaluate_startup_num_lock();
        }
        self.started = true;
        self.update_modifiers();
    }

    fn evaluate_startup_num_lock(&mut self) {
        match self.numlock {
            NumLock::On => self.set_locked(self.indices.num, true),
            NumLock::Off => self.set_locked(self.indices.num, false),
            NumLock::Unchanged => (),
        }
    }

    fn set_locked(&mut self, index: xkb::ModIndex, locked: bool) {
        let bit = mask(index);
        if bit == 0 {
            return;
        }

        let depressed = self.state.serialize_mods(xkb::STATE_MODS_DEPRESSED);
        let latched = self.state.serialize_mods(xkb::STATE_MODS_LATCHED);
        let mut locked_mods = self.state.serialize_mods(xkb::STATE_MODS_LOCKED);
        if locked {
            locked_mods |= bit;
        } else {
            locked_mods &= !bit;
        }
        let layout = self.state.serialize_layout(xkb::STATE_LAYOUT_EFFECTIVE);
        self.state
            .update_mask(depressed, latched, locked_mods, 0, 0, layout);
    }

    pub fn keymap_string(&self) -> &str {
        &self.keymap_string
    }

    pub fn names(&self) -> &RuleNames {
        &self.names
    }

    /// Feeds a key event, given as an evdev keycode.
    ///
    /// Returns the resulting keysym on press. While a compose sequence is in progress the keysym
    /// is `NoSymbol`.
    pub fn update_key(&mut self, key: u32, state: KeyState) -> Keysym {
        let code = xkb::Keycode::new(key + EVDEV_OFFSET);
        let sym = self.state.key_get_one_sym(code);

        if state == KeyState::Pressed {
            self.consumed = (0..self.keymap.num_mods())
                .filter(|&index| self.state.mod_index_is_consumed(code, index))
                .fold(0, |acc, index| acc | mask(index));
        }

        let direction = match state {
            KeyState::Pressed => xkb::KeyDirection::Down,
            KeyState::Released => xkb::KeyDirection::Up,
        };
        self.state.update_key(code, direction);
        self.update_modifiers();

        if state == KeyState::Pressed {
            self.keysym = self.compose(sym);
        }
        self.keysym
    }

    fn compose(&mut self, sym: Keysym) -> Keysym {
        let Some(compose) = &mut self.compose else {
            return sym;
        };

        compose.feed(sym);
        match compose.status() {
            compose::Status::Nothing => sym,
            compose::Status::Composed => {
                let composed = compose.keysym().unwrap_or(sym);
                compose.reset();
                composed
            }
            compose::Status::Composing | compose::Status::Cancelled => Keysym::NoSymbol,
        }
    }

    /// Sets the modifier state directly, as done for Xwayland and virtual keyboards.
    pub fn update_modifiers_from(&mut self, modifiers: ModifierState) -> bool {
        self.state.update_mask(
            modifiers.depressed,
            modifiers.latched,
            modifiers.locked,
            0,
            0,
            modifiers.group,
        );
        self.update_modifiers()
    }

    /// Re-reads modifiers and LEDs from the xkb state. Returns whether the modifiers changed.
    fn update_modifiers(&mut self) -> bool {
        let modifiers = ModifierState {
            depressed: self.state.serialize_mods(xkb::STATE_MODS_DEPRESSED),
            latched: self.state.serialize_mods(xkb::STATE_MODS_LATCHED),
            locked: self.state.serialize_mods(xkb::STATE_MODS_LOCKED),
            group: self.state.serialize_layout(xkb::STATE_LAYOUT_EFFECTIVE),
        };

        let mut leds = Leds::empty();
        for (name, led) in [
            (xkb::LED_NAME_NUM, Leds::NUM_LOCK),
            (xkb::LED_NAME_CAPS, Leds::CAPS_LOCK),
            (xkb::LED_NAME_SCROLL, Leds::SCROLL_LOCK),
            ("Compose", Leds::COMPOSE),
            ("Kana", Leds::KANA),
        ] {
            if self.state.led_name_is_active(name) {
                leds |= led;
            }
        }
        if leds != self.leds {
            debug!("keyboard LEDs changed: {leds:?}");
            self.leds = leds;
        }

        let changed = modifiers != self.modifiers;
        self.modifiers = modifiers;
        changed
    }

    pub fn modifiers(&self) -> ModifierState {
        self.modifiers
    }

    pub fn leds(&self) -> Leds {
        self.leds
    }

    pub fn keysym(&self) -> Keysym {
        self.keysym
    }

    fn is_active(&self, index: xkb::ModIndex) -> bool {
        index != xkb::MOD_INVALID
            && self
                .state
                .mod_index_is_active(index, xkb::STATE_MODS_EFFECTIVE)
    }

    fn to_shortcut_modifiers(&self, mods: impl Fn(xkb::ModIndex) -> bool) -> ShortcutModifiers {
        let mut rv = ShortcutModifiers::empty();
        for (index, flag) in [
            (self.indices.shift, ShortcutModifiers::SHIFT),
            (self.indices.ctrl, ShortcutModifiers::CTRL),
            (self.indices.alt, ShortcutModifiers::ALT),
            (self.indices.logo, ShortcutModifiers::LOGO),
        ] {
            if mods(index) {
                rv |= flag;
            }
        }
        rv
    }

    /// Active modifiers.
    pub fn shortcut_modifiers(&self) -> ShortcutModifiers {
        self.to_shortcut_modifiers(|index| self.is_active(index))
    }

    /// Active modifiers that were not consumed producing the current keysym.
    ///
    /// Shift stays in when it was the only consumed modifier and the keysym is a letter, so that
    /// Shift+W can be bound.
    pub fn modifiers_relevant_for_global_shortcuts(&self) -> ShortcutModifiers {
        let active = self.shortcut_modifiers();
        let mut consumed = self.to_shortcut_modifiers(|index| self.consumed & mask(index) != 0);

        if active.contains(ShortcutModifiers::SHIFT) && consumed == ShortcutModifiers::SHIFT {
            let is_letter = char::from_u32(xkb::keysym_to_utf32(self.keysym))
                .is_some_and(char::is_alphabetic);
            if is_letter {
                consumed = ShortcutModifiers::empty();
            }
        }

        active - consumed
    }

    pub fn num_layouts(&self) -> u32 {
        self.keymap.num_layouts()
    }

    pub fn current_layout(&self) -> u32 {
        self.modifiers.group
    }

    pub fn layout_name(&self, index: u32) -> &str {
        self.keymap.layout_get_name(index)
    }

    /// Switches to the given layout. Returns whether the layout changed.
    pub fn switch_to_layout(&mut self, index: u32) -> Result<bool, KeymapError> {
        let count = self.num_layouts();
        if index >= count {
            return Err(KeymapError::InvalidLayout { index, count });
        }
        if index == self.current_layout() {
            return Ok(false);
        }

        let modifiers = ModifierState {
            group: index,
            ..self.modifiers
        };
        self.update_modifiers_from(modifiers);
        debug!("switched to layout {index} ({})", self.layout_name(index));
        Ok(true)
    }

    pub fn switch_to_next_layout(&mut self) -> bool {
        let count = self.num_layouts();
        if count < 2 {
            return false;
        }
        let next = (self.current_layout() + 1) % count;
        self.switch_to_layout(next).unwrap_or(false)
    }

    pub fn switch_to_previous_layout(&mut self) -> bool {
        let count = self.num_layouts();
        if count < 2 {
            return false;
        }
        let previous = (self.current_layout() + count - 1) % count;
        self.switch_to_layout(previous).unwrap_or(false)
    }
}

fn compile(context: &xkb::Context, names: &RuleNames) -> Result<xkb::Keymap, KeymapError> {
    xkb::Keymap::new_from_names(
        context,
        &names.rules,
        &names.model,
        &names.layout,
        &names.variant,
        names.options.clone(),
        xkb::KEYMAP_COMPILE_NO_FLAGS,
    )
    .ok_or_else(|| KeymapError::Compile(names.clone()))
}

fn compose_state(
    context: &xkb::Context,
    getenv: impl Fn(&str) -> Option<String>,
) -> Option<compose::State> {
    let locale = ["LC_ALL", "LC_CTYPE", "LANG"]
        .into_iter()
        .filter_map(&getenv)
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| String::from("C"));

    match compose::Table::new_from_locale(
        context,
        &OsString::from(&locale),
        compose::COMPILE_NO_FLAGS,
    ) {
        Ok(table) => Some(compose::State::new(&table, compose::STATE_NO_FLAGS)),
        Err(()) => {
            debug!("no compose table for locale {locale}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_LEFTSHIFT: u32 = 42;
    const KEY_A: u32 = 30;
    const KEY_1: u32 = 2;

    fn keyboard(layout: &str, numlock: NumLock) -> Keyboard {
        Keyboard {
            xkb: Xkb {
                layout: layout.to_owned(),
                ..Default::default()
            },
            numlock,
            ..Default::default()
        }
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn environment_fills_missing_names() {
        let config = Xkb {
            layout: String::from("de"),
            ..Default::default()
        };
        let names = RuleNames::resolve(&config, |var| match var {
            "XKB_DEFAULT_LAYOUT" => Some(String::from("fr")),
            "XKB_DEFAULT_MODEL" => Some(String::from("pc105")),
            _ => None,
        });
        assert_eq!(names.layout, "de");
        assert_eq!(names.model, "pc105");
        assert_eq!(names.rules, "");
        assert_eq!(names.options, None);
    }

    #[test]
    fn shift_is_kept_for_letters() {
        let mut keymap = Keymap::new(&keyboard("us", NumLock::Unchanged), false, no_env).unwrap();

        keymap.update_key(KEY_LEFTSHIFT, KeyState::Pressed);
        assert_eq!(keymap.update_key(KEY_A, KeyState::Pressed), Keysym::A);
        assert_eq!(
            keymap.modifiers_relevant_for_global_shortcuts(),
            ShortcutModifiers::SHIFT
        );
        keymap.update_key(KEY_A, KeyState::Released);

        assert_eq!(keymap.update_key(KEY_1, KeyState::Pressed), Keysym::exclam);
        assert_eq!(
            keymap.modifiers_relevant_for_global_shortcuts(),
            ShortcutModifiers::empty()
        );
        keymap.update_key(KEY_1, KeyState::Released);
        keymap.update_key(KEY_LEFTSHIFT, KeyState::Released);
        assert_eq!(keymap.modifiers().depressed, 0);
    }

    #[test]
    fn layout_switching() {
        let mut keymap = Keymap::new(&keyboard("us,de", NumLock::Unchanged), false, no_env).unwrap();
        assert_eq!(keymap.num_layouts(), 2);
        assert_eq!(keymap.current_layout(), 0);

        assert!(keymap.switch_to_next_layout());
        assert_eq!(keymap.current_layout(), 1);
        assert!(keymap.switch_to_next_layout());
        assert_eq!(keymap.current_layout(), 0);
        assert!(keymap.switch_to_previous_layout());
        assert_eq!(keymap.current_layout(), 1);

        assert_eq!(keymap.switch_to_layout(1), Ok(false));
        assert_eq!(
            keymap.switch_to_layout(5),
            Err(KeymapError::InvalidLayout { index: 5, count: 2 })
        );
    }

    #[test]
    fn num_lock_startup_and_reload() {
        let mut keymap = Keymap::new(&keyboard("us", NumLock::On), false, no_env).unwrap();
        assert!(keymap.leds().contains(Leds::NUM_LOCK));

        // A reload keeps the current state even though the config now says off.
        assert_eq!(
            keymap.reconfigure(&keyboard("us,de", NumLock::Off), no_env),
            Ok(true)
        );
        assert!(keymap.leds().contains(Leds::NUM_LOCK));
    }

    #[test]
    fn forced_num_lock_evaluation() {
        let mut keymap = Keymap::new(&keyboard("us", NumLock::On), true, no_env).unwrap();
        assert!(keymap.leds().contains(Leds::NUM_LOCK));

        keymap
            .reconfigure(&keyboard("us", NumLock::Off), no_env)
            .unwrap();
        assert!(!keymap.leds().contains(Leds::NUM_LOCK));
    }
}
