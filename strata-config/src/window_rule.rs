use crate::focus::FocusStealingPrevention;
use crate::utils::RegexEq;

#[derive(knuffel::Decode, Debug, Default, Clone, PartialEq)]
pub struct WindowRule {
    #[knuffel(children(name = "match"))]
    pub matches: Vec<Match>,
    #[knuffel(children(name = "exclude"))]
    pub excludes: Vec<Match>,

    #[knuffel(child)]
    pub keep_above: Option<BoolRule>,
    #[knuffel(child)]
    pub keep_below: Option<BoolRule>,
    #[knuffel(child)]
    pub accept_focus: Option<BoolRule>,
    /// Focus stealing prevention level applied when this window asks for activation.
    #[knuffel(child, unwrap(argument))]
    pub focus_stealing_prevention: Option<FocusStealingPrevention>,
    /// Protection this window has against other windows stealing focus while it is active.
    #[knuffel(child, unwrap(argument))]
    pub focus_protection: Option<FocusStealingPrevention>,

    // Rules applied when the window is first mapped.
    #[knuffel(child, unwrap(argument))]
    pub open_on_desktop: Option<u32>,
    #[knuffel(child, unwrap(argument))]
    pub open_on_all_desktops: Option<bool>,
    #[knuffel(child, unwrap(argument))]
    pub open_maximized: Option<bool>,
    #[knuffel(child, unwrap(argument))]
    pub open_fullscreen: Option<bool>,
    #[knuffel(child, unwrap(argument))]
    pub open_minimized: Option<bool>,
    #[knuffel(child, unwrap(argument))]
    pub skip_taskbar: Option<bool>,

    // Geometry rules, applied initially or forced on every request.
    #[knuffel(child)]
    pub position: Option<PointRule>,
    #[knuffel(child)]
    pub size: Option<SizeRule>,
    #[knuffel(child)]
    pub min_size: Option<SizeRule>,
    #[knuffel(child)]
    pub max_size: Option<SizeRule>,
}

#[derive(knuffel::Decode, Debug, Default, Clone, PartialEq)]
pub struct Match {
    /// Matched against the Wayland app id.
    #[knuffel(property, str)]
    pub app_id: Option<RegexEq>,
    #[knuffel(property, str)]
    pub title: Option<RegexEq>,
    /// Matched against the X11 resource class.
    #[knuffel(property, str)]
    pub class: Option<RegexEq>,
    #[knuffel(property, str)]
    pub desktop_file: Option<RegexEq>,
}

/// Boolean rule value.
///
/// Without `force=true` the value is applied when the window is mapped and the window may change
/// it afterwards. Forced values veto any later request.
#[derive(knuffel::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoolRule {
    #[knuffel(argument, default = true)]
    pub value: bool,
    #[knuffel(property, default)]
    pub force: bool,
}

#[derive(knuffel::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointRule {
    #[knuffel(property)]
    pub x: i32,
    #[knuffel(property)]
    pub y: i32,
    #[knuffel(property, default)]
    pub force: bool,
}

#[derive(knuffel::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeRule {
    #[knuffel(property)]
    pub w: i32,
    #[knuffel(property)]
    pub h: i32,
    #[knuffel(property, default)]
    pub force: bool,
}

/// Window properties that rules are matched against.
#[derive(Debug, Default, Clone, Copy)]
pub struct MatchProps<'a> {
    pub app_id: Option<&'a str>,
    pub title: Option<&'a str>,
    pub class: Option<&'a str>,
    pub desktop_file: Option<&'a str>,
}

impl Match {
    pub fn matches(&self, props: &MatchProps) -> bool {
        fn check(re: &Option<RegexEq>, value: Option<&str>) -> bool {
            match re {
                None => true,
                Some(re) => value.is_some_and(|value| re.0.is_match(value)),
            }
        }

        check(&self.app_id, props.app_id)
            && check(&self.title, props.title)
            && check(&self.class, props.class)
            && check(&self.desktop_file, props.desktop_file)
    }
}

impl WindowRule {
    /// Whether this rule applies to a window with these properties.
    ///
    /// A rule without `match` entries matches every window. Any matching `exclude` entry
    /// disqualifies the window.
    pub fn applies_to(&self, props: &MatchProps) -> bool {
        if !self.matches.is_empty() && !self.matches.iter().any(|m| m.matches(props)) {
            return false;
        }

        !self.excludes.iter().any(|m| m.matches(props))
    }
}
