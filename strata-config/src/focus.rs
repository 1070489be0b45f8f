/// Focus stealing prevention level.
///
/// The same scale describes both the policy applied to a window asking for activation and the
/// protection an active window has against losing focus.
#[derive(knuffel::DecodeScalar, Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FocusStealingPrevention {
    /// Activation is always allowed.
    None,
    /// Prevention is applied, but activation is allowed when unsure.
    Low,
    /// Prevention is applied, and activation is denied when unsure.
    #[default]
    Medium,
    /// Only windows of the active application may take focus.
    High,
    /// No window takes focus without user interaction.
    Extreme,
}

#[derive(knuffel::Decode, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Focus {
    #[knuffel(child, unwrap(argument), default)]
    pub focus_stealing_prevention: FocusStealingPrevention,
    #[knuffel(child)]
    pub separate_screen_focus: bool,
    #[knuffel(child)]
    pub next_focus_prefers_mouse: bool,
}
