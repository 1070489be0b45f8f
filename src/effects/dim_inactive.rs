//! Dims windows that are not active.

use std::collections::HashMap;
use std::time::Duration;

use super::paint::{EffectWindow, PaintChain, PaintMask, WindowPaintData, WindowPrePaintData};
use super::Effect;
use crate::animation::{Animation, Curve};
use crate::utils::clock::Clock;
use crate::utils::region::Region;
use crate::window::WindowId;

pub const NAME: &str = "dim-inactive";

const STRENGTH: f64 = 0.25;
const DURATION: Duration = Duration::from_millis(250);

#[derive(Debug)]
pub struct DimInactive {
    clock: Clock,
    active: Option<WindowId>,
    /// Windows changing between dimmed and undimmed, by dim amount.
    transitions: HashMap<WindowId, Animation>,
}

impl DimInactive {
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            active: None,
            transitions: HashMap::new(),
        }
    }

    fn dims(window: &EffectWindow) -> bool {
        !window.desktop && !window.dock && !window.special && !window.deleted
    }

    /// Brightness factor for the window.
    pub fn brightness(&self, window: &EffectWindow) -> f64 {
        if !Self::dims(window) {
            return 1.;
        }
        let amount = match self.transitions.get(&window.id) {
            Some(anim) => anim.value(),
            None if self.active == Some(window.id) => 0.,
            None => STRENGTH,
        };
        1. - amount
    }

    fn transition(&mut self, id: WindowId, to: f64) {
        let anim = match self.transitions.get(&id) {
            Some(anim) => anim.restarted(to),
            None => Animation::new(
                self.clock.clone(),
                STRENGTH - to,
                to,
                DURATION,
                Curve::EaseInOutQuad,
            ),
        };
        self.transitions.insert(id, anim);
    }
}

impl Effect for DimInactive {
    fn is_active(&self) -> bool {
        self.active.is_some() || !self.transitions.is_empty()
    }

    fn pre_paint_window(
        &mut self,
        chain: &mut PaintChain<'_>,
        window: &EffectWindow,
        data: &mut WindowPrePaintData,
        present_time: Duration,
    ) {
        if self.transitions.contains_key(&window.id) {
            data.paint.add_rect(window.frame);
        }
        chain.pre_paint_window(window, data, present_time);
    }

    fn paint_window(
        &mut self,
        chain: &mut PaintChain<'_>,
        window: &EffectWindow,
        mask: PaintMask,
        region: &Region,
        data: &mut WindowPaintData,
    ) {
        data.multiply_brightness(self.brightness(window));
        chain.paint_window(window, mask, region, data);
    }

    fn post_paint_window(&mut self, chain: &mut PaintChain<'_>, window: &EffectWindow) {
        if self.transitions.get(&window.id).is_some_and(Animation::is_done) {
            self.transitions.remove(&window.id);
        }
        chain.post_paint_window(window);
    }

    fn window_activated(&mut self, window: Option<&EffectWindow>) {
        let new = window.map(|w| w.id);
        if new == self.active {
            return;
        }
        if let Some(old) = self.active {
            self.transition(old, STRENGTH);
        }
        if let Some(new) = new {
            self.transition(new, 0.);
        }
        self.active = new;
    }

    fn window_closed(&mut self, window: &EffectWindow) -> bool {
        self.transitions.remove(&window.id);
        if self.active == Some(window.id) {
            self.active = None;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use smithay::utils::Rectangle;

    use super::*;

    fn window() -> EffectWindow {
        EffectWindow {
            id: WindowId::next(),
            frame: Rectangle::new((0, 0).into(), (100, 100).into()),
            active: false,
            opacity: 1.,
            desktop: false,
            dock: false,
            special: false,
            minimized: false,
            deleted: false,
        }
    }

    #[test]
    fn activation_animates_brightness() {
        let clock = Clock::with_time(Duration::ZERO);
        let mut dim = DimInactive::new(clock.clone());
        let a = window();
        let b = window();
        assert_abs_diff_eq!(dim.brightness(&a), 0.75);

        dim.window_activated(Some(&a));
        assert_abs_diff_eq!(dim.brightness(&a), 0.75);
        clock.advance(DURATION);
        assert_abs_diff_eq!(dim.brightness(&a), 1.);
        assert_abs_diff_eq!(dim.brightness(&b), 0.75);

        dim.window_activated(Some(&b));
        clock.advance(DURATION);
        assert_abs_diff_eq!(dim.brightness(&a), 0.75);
        assert_abs_diff_eq!(dim.brightness(&b), 1.);
    }

    #[test]
    fn docks_are_never_dimmed() {
        let dim = DimInactive::new(Clock::with_time(Duration::ZERO));
        let mut dock = window();
        dock.dock = true;
        assert_abs_diff_eq!(dim.brightness(&dock), 1.);
    }
}
