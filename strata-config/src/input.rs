#[derive(knuffel::Decode, Debug, Default, Clone, PartialEq, Eq)]
pub struct Input {
    #[knuffel(child, default)]
    pub keyboard: Keyboard,
}

#[derive(knuffel::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Keyboard {
    #[knuffel(child, default)]
    pub xkb: Xkb,
    #[knuffel(child, unwrap(argument), default)]
    pub numlock: NumLock,
    // The defaults were chosen to match wlroots and sway.
    #[knuffel(child, unwrap(argument), default = 600)]
    pub repeat_delay: u16,
    #[knuffel(child, unwrap(argument), default = 25)]
    pub repeat_rate: u8,
    #[knuffel(child, unwrap(argument), default)]
    pub track_layout: TrackLayout,
}

impl Default for Keyboard {
    fn default() -> Self {
        Self {
            xkb: Default::default(),
            numlock: Default::default(),
            repeat_delay: 600,
            repeat_rate: 25,
            track_layout: Default::default(),
        }
    }
}

#[derive(knuffel::Decode, Debug, Default, PartialEq, Eq, Clone)]
pub struct Xkb {
    #[knuffel(child, unwrap(argument), default)]
    pub rules: String,
    #[knuffel(child, unwrap(argument), default)]
    pub model: String,
    #[knuffel(child, unwrap(argument), default)]
    pub layout: String,
    #[knuffel(child, unwrap(argument), default)]
    pub variant: String,
    #[knuffel(child, unwrap(argument))]
    pub options: Option<String>,
}

impl Xkb {
    /// Whether no field was set, so the keymap falls back to the environment.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
            && self.model.is_empty()
            && self.layout.is_empty()
            && self.variant.is_empty()
            && self.options.is_none()
    }
}

/// NumLock state applied when the keymap is first loaded.
#[derive(knuffel::DecodeScalar, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum NumLock {
    On,
    Off,
    #[default]
    Unchanged,
}

#[derive(knuffel::DecodeScalar, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TrackLayout {
    /// The layout change is global.
    #[default]
    Global,
    /// The layout change is window local.
    Window,
}
