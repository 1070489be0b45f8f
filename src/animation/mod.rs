use std::time::Duration;

use keyframe::functions::{EaseInOutQuad, EaseOutCubic, EaseOutQuad};
use keyframe::EasingFunction;

use crate::utils::clock::Clock;

/// Value eased between two points over a fixed duration.
#[derive(Debug, Clone)]
pub struct Animation {
    from: f64,
    to: f64,
    duration: Duration,
    start_time: Duration,
    clock: Clock,
    curve: Curve,
    /// Jump straight to `to`, e.g. because animations are disabled.
    instant: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    Linear,
    EaseOutQuad,
    EaseOutCubic,
    EaseInOutQuad,
}

impl Animation {
    pub fn new(clock: Clock, from: f64, to: f64, duration: Duration, curve: Curve) -> Self {
        Self {
            from,
            to,
            duration,
            start_time: clock.now(),
            clock,
            curve,
            instant: duration.is_zero(),
        }
    }

    pub fn instant(clock: Clock, to: f64) -> Self {
        let mut rv = Self::new(clock, to, to, Duration::ZERO, Curve::Linear);
        rv.instant = true;
        rv
    }

    /// Restarts from the current value, keeping the curve and duration.
    pub fn restarted(&self, to: f64) -> Self {
        let mut rv = Self::new(self.clock.clone(), self.value(), to, self.duration, self.curve);
        rv.instant = self.instant;
        rv
    }

    pub fn is_done(&self) -> bool {
        self.instant || self.clock.now() >= self.start_time + self.duration
    }

    pub fn value_at(&self, at: Duration) -> f64 {
        if self.instant || self.start_time + self.duration <= at {
            return self.to;
        }
        if at <= self.start_time {
            return self.from;
        }

        let passed = (at - self.start_time).as_secs_f64();
        let x = (passed / self.duration.as_secs_f64()).clamp(0., 1.);
        self.curve.y(x) * (self.to - self.from) + self.from
    }

    pub fn value(&self) -> f64 {
        self.value_at(self.clock.now())
    }

    pub fn from(&self) -> f64 {
        self.from
    }

    pub fn to(&self) -> f64 {
        self.to
    }

    pub fn end_time(&self) -> Duration {
        self.start_time + self.duration
    }
}

impl Curve {
    pub fn y(self, x: f64) -> f64 {
        match self {
            Curve::Linear => x,
            Curve::EaseOutQuad => EaseOutQuad.y(x),
            Curve::EaseOutCubic => EaseOutCubic.y(x),
            Curve::EaseInOutQuad => EaseInOutQuad.y(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn eases_over_duration() {
        let clock = Clock::with_time(Duration::from_secs(1));
        let anim = Animation::new(clock.clone(), 0., 1., Duration::from_millis(100), Curve::Linear);
        assert_eq!(anim.value(), 0.);
        clock.advance(Duration::from_millis(50));
        assert_abs_diff_eq!(anim.value(), 0.5);
        assert!(!anim.is_done());
        clock.advance(Duration::from_millis(50));
        assert_eq!(anim.value(), 1.);
        assert!(anim.is_done());
    }

    #[test]
    fn restart_continues_from_current_value() {
        let clock = Clock::with_time(Duration::ZERO);
        let anim = Animation::new(clock.clone(), 0., 1., Duration::from_millis(100), Curve::Linear);
        clock.advance(Duration::from_millis(25));
        let back = anim.restarted(0.);
        assert_abs_diff_eq!(back.from(), 0.25);
        assert_abs_diff_eq!(back.value(), 0.25);
    }

    #[test]
    fn instant_animation() {
        let clock = Clock::with_time(Duration::ZERO);
        let anim = Animation::instant(clock, 0.7);
        assert!(anim.is_done());
        assert_eq!(anim.value(), 0.7);
    }
}
