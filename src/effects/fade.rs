//! Fades windows in when they appear and out when they close.

use std::collections::HashMap;
use std::time::Duration;

use super::paint::{EffectWindow, PaintChain, PaintMask, WindowPaintData, WindowPrePaintData};
use super::Effect;
use crate::animation::{Animation, Curve};
use crate::utils::clock::Clock;
use crate::utils::region::Region;
use crate::window::WindowId;

pub const NAME: &str = "fade";

const FADE_IN: Duration = Duration::from_millis(150);
const FADE_OUT: Duration = Duration::from_millis(150);

#[derive(Debug)]
pub struct Fade {
    clock: Clock,
    fading: HashMap<WindowId, Fading>,
}

#[derive(Debug)]
struct Fading {
    anim: Animation,
    closing: bool,
}

impl Fade {
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            fading: HashMap::new(),
        }
    }

    pub fn opacity(&self, id: WindowId) -> Option<f64> {
        self.fading.get(&id).map(|f| f.anim.value())
    }
}

impl Effect for Fade {
    fn is_active(&self) -> bool {
        !self.fading.is_empty()
    }

    fn pre_paint_window(
        &mut self,
        chain: &mut PaintChain<'_>,
        window: &EffectWindow,
        data: &mut WindowPrePaintData,
        present_time: Duration,
    ) {
        if self.fading.contains_key(&window.id) {
            data.set_translucent();
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
        if let Some(fading) = self.fading.get(&window.id) {
            data.multiply_opacity(fading.anim.value());
        }
        chain.paint_window(window, mask, region, data);
    }

    fn post_paint_window(&mut self, chain: &mut PaintChain<'_>, window: &EffectWindow) {
        if self.fading.get(&window.id).is_some_and(|f| f.anim.is_done()) {
            trace!("fade of {:?} done", window.id);
            self.fading.remove(&window.id);
        }
        chain.post_paint_window(window);
    }

    fn window_added(&mut self, window: &EffectWindow) {
        if window.desktop {
            return;
        }
        let anim = Animation::new(self.clock.clone(), 0., 1., FADE_IN, Curve::EaseOutCubic);
        self.fading.insert(
            window.id,
            Fading {
                anim,
                closing: false,
            },
        );
    }

    fn window_closed(&mut self, window: &EffectWindow) -> bool {
        if window.desktop || window.minimized {
            self.fading.remove(&window.id);
            return false;
        }
        let anim = match self.fading.get(&window.id) {
            Some(fading) => fading.anim.restarted(0.),
            None => Animation::new(self.clock.clone(), 1., 0., FADE_OUT, Curve::EaseOutQuad),
        };
        self.fading.insert(
            window.id,
            Fading {
                anim,
                closing: true,
            },
        );
        true
    }

    fn references_window(&self, id: WindowId) -> bool {
        self.fading.get(&id).is_some_and(|f| f.closing)
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
            active: true,
            opacity: 1.,
            desktop: false,
            dock: false,
            special: false,
            minimized: false,
            deleted: false,
        }
    }

    #[test]
    fn fades_in_and_out() {
        let clock = Clock::with_time(Duration::ZERO);
        let mut fade = Fade::new(clock.clone());
        assert!(!fade.is_active());

        let w = window();
        fade.window_added(&w);
        assert!(fade.is_active());
        assert_abs_diff_eq!(fade.opacity(w.id).unwrap(), 0.);
        clock.advance(FADE_IN);
        assert_abs_diff_eq!(fade.opacity(w.id).unwrap(), 1.);
        assert!(!fade.references_window(w.id));

        assert!(fade.window_closed(&w));
        assert!(fade.references_window(w.id));
        assert_abs_diff_eq!(fade.opacity(w.id).unwrap(), 1.);
        clock.advance(FADE_OUT / 2);
        let half = fade.opacity(w.id).unwrap();
        assert!(0. < half && half < 1.);
    }

    #[test]
    fn desktop_is_not_faded() {
        let mut fade = Fade::new(Clock::with_time(Duration::ZERO));
        let mut w = window();
        w.desktop = true;
        fade.window_added(&w);
        assert!(!fade.window_closed(&w));
        assert!(!fade.is_active());
    }
}
