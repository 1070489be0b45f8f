//! Window rules resolved for one window.

use smithay::utils::{Logical, Point, Size};
use strata_config::{BoolRule, Config, FocusStealingPrevention, MatchProps, WindowRule};

use super::MaximizeMode;

/// Rules that matched a window, in configuration order.
///
/// Each `check_*` method takes the value requested by the user or the program and returns the
/// value that should actually be used. Values without `force` only apply when `initial` is set,
/// i.e. when the window is being mapped. The first rule that sets a property wins.
#[derive(Debug, Default, Clone)]
pub struct WindowRules {
    rules: Vec<WindowRule>,
}

impl WindowRules {
    pub fn compute(config: &Config, props: &MatchProps) -> Self {
        let rules: Vec<_> = config.matching_rules(props).cloned().collect();
        if !rules.is_empty() {
            trace!("{} window rules matched {props:?}", rules.len());
        }
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn bool_rule(&self, f: impl Fn(&WindowRule) -> Option<BoolRule>, requested: bool, initial: bool) -> bool {
        for rule in &self.rules {
            if let Some(rule) = f(rule) {
                if rule.force || initial {
                    if rule.value != requested {
                        trace!("window rule overrides {requested} with {}", rule.value);
                    }
                    return rule.value;
                }
            }
        }
        requested
    }

    fn initial<T: Copy>(&self, f: impl Fn(&WindowRule) -> Option<T>) -> Option<T> {
        self.rules.iter().find_map(f)
    }

    pub fn check_keep_above(&self, requested: bool, initial: bool) -> bool {
        self.bool_rule(|r| r.keep_above, requested, initial)
    }

    pub fn check_keep_below(&self, requested: bool, initial: bool) -> bool {
        self.bool_rule(|r| r.keep_below, requested, initial)
    }

    pub fn check_accept_focus(&self, requested: bool, initial: bool) -> bool {
        self.bool_rule(|r| r.accept_focus, requested, initial)
    }

    /// Whether a rule explicitly refuses focus for this window.
    pub fn refuses_focus(&self) -> bool {
        self.rules
            .iter()
            .find_map(|r| r.accept_focus)
            .is_some_and(|r| r.force && !r.value)
    }

    /// Focus stealing prevention level applied to this window's activation requests.
    pub fn check_fsp(&self, default: FocusStealingPrevention) -> FocusStealingPrevention {
        self.initial(|r| r.focus_stealing_prevention)
            .unwrap_or(default)
    }

    /// Protection this window has while active against others stealing focus.
    pub fn check_fpp(&self, default: FocusStealingPrevention) -> FocusStealingPrevention {
        self.initial(|r| r.focus_protection).unwrap_or(default)
    }

    pub fn check_desktop(&self, requested: u32, initial: bool) -> u32 {
        if !initial {
            return requested;
        }
        self.initial(|r| r.open_on_desktop).unwrap_or(requested)
    }

    pub fn check_on_all_desktops(&self, requested: bool, initial: bool) -> bool {
        if !initial {
            return requested;
        }
        self.initial(|r| r.open_on_all_desktops)
            .unwrap_or(requested)
    }

    pub fn check_maximize(&self, requested: MaximizeMode, initial: bool) -> MaximizeMode {
        if !initial {
            return requested;
        }
        match self.initial(|r| r.open_maximized) {
            Some(true) => MaximizeMode::FULL,
            Some(false) => MaximizeMode::empty(),
            None => requested,
        }
    }

    pub fn check_fullscreen(&self, requested: bool, initial: bool) -> bool {
        if !initial {
            return requested;
        }
        self.initial(|r| r.open_fullscreen).unwrap_or(requested)
    }

    pub fn check_minimize(&self, requested: bool, initial: bool) -> bool {
        if !initial {
            return requested;
        }
        self.initial(|r| r.open_minimized).unwrap_or(requested)
    }

    pub fn check_skip_taskbar(&self, requested: bool) -> bool {
        self.initial(|r| r.skip_taskbar).unwrap_or(requested)
    }

    /// Whether a rule dictates the window position.
    pub fn has_position(&self, initial: bool) -> bool {
        self.rules
            .iter()
            .find_map(|r| r.position)
            .is_some_and(|p| p.force || initial)
    }

    pub fn check_position(&self, requested: Point<i32, Logical>, initial: bool) -> Point<i32, Logical> {
        match self.rules.iter().find_map(|r| r.position) {
            Some(p) if p.force || initial => Point::from((p.x, p.y)),
            _ => requested,
        }
    }

    pub fn check_size(&self, requested: Size<i32, Logical>, initial: bool) -> Size<i32, Logical> {
        match self.rules.iter().find_map(|r| r.size) {
            Some(s) if s.force || initial => Size::from((s.w, s.h)),
            _ => requested,
        }
    }

    pub fn check_min_size(&self, requested: Size<i32, Logical>) -> Size<i32, Logical> {
        match self.rules.iter().find_map(|r| r.min_size) {
            Some(s) => Size::from((s.w, s.h)),
            None => requested,
        }
    }

    pub fn check_max_size(&self, requested: Size<i32, Logical>) -> Size<i32, Logical> {
        match self.rules.iter().find_map(|r| r.max_size) {
            Some(s) => Size::from((s.w, s.h)),
            None => requested,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(kdl: &str) -> WindowRules {
        let config = Config::parse("test.kdl", kdl).unwrap();
        let props = MatchProps {
            app_id: Some("org.example.App"),
            title: Some("Example"),
            ..Default::default()
        };
        WindowRules::compute(&config, &props)
    }

    #[test]
    fn forced_rule_vetoes_requests() {
        let rules = rules(
            r#"
            window-rule {
                match app-id="^org\\.example\\."
                keep-above force=true
                keep-below false
            }
            "#,
        );

        assert!(rules.check_keep_above(false, false));
        assert!(rules.check_keep_above(false, true));
        // Not forced, only applies initially.
        assert!(rules.check_keep_below(true, false));
        assert!(!rules.check_keep_below(true, true));
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = rules(
            r#"
            window-rule {
                focus-stealing-prevention "extreme"
            }
            window-rule {
                focus-stealing-prevention "none"
                open-maximized true
            }
            "#,
        );

        assert_eq!(
            rules.check_fsp(FocusStealingPrevention::Medium),
            FocusStealingPrevention::Extreme
        );
        assert_eq!(
            rules.check_maximize(MaximizeMode::empty(), true),
            MaximizeMode::FULL
        );
        assert_eq!(
            rules.check_maximize(MaximizeMode::empty(), false),
            MaximizeMode::empty()
        );
    }

    #[test]
    fn excluded_window_gets_no_rules() {
        let rules = rules(
            r#"
            window-rule {
                exclude title="^Example$"
                keep-above force=true
            }
            "#,
        );
        assert!(rules.is_empty());
        assert!(!rules.check_keep_above(false, false));
    }

    #[test]
    fn position_rule() {
        let rules = rules(
            r#"
            window-rule {
                position x=10 y=20
            }
            "#,
        );
        assert!(rules.has_position(true));
        assert!(!rules.has_position(false));
        assert_eq!(
            rules.check_position((0, 0).into(), true),
            Point::from((10, 20))
        );
    }
}
