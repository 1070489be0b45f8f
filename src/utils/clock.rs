use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::utils::get_monotonic_time;

/// Shareable lazy clock.
///
/// The clock fetches the time once and retains it until explicitly cleared with [`Clock::clear`],
/// so that every deadline checked during one event loop iteration sees the same "now".
#[derive(Debug, Default, Clone)]
pub struct Clock {
    inner: Rc<RefCell<LazyClock>>,
}

#[derive(Debug, Default)]
struct LazyClock {
    time: Option<Duration>,
    frozen: bool,
}

impl Clock {
    /// Creates a frozen clock with the given time.
    ///
    /// A frozen clock never refetches the system time; it only moves with [`Clock::set`] and
    /// [`Clock::advance`].
    pub fn with_time(time: Duration) -> Self {
        let clock = LazyClock {
            time: Some(time),
            frozen: true,
        };
        Self {
            inner: Rc::new(RefCell::new(clock)),
        }
    }

    pub fn now(&self) -> Duration {
        let mut inner = self.inner.borrow_mut();
        *inner.time.get_or_insert_with(get_monotonic_time)
    }

    /// Current time in milliseconds, truncated to 32 bits like protocol timestamps.
    pub fn now_msec(&self) -> u32 {
        self.now().as_millis() as u32
    }

    pub fn set(&self, time: Duration) {
        self.inner.borrow_mut().time = Some(time);
    }

    pub fn advance(&self, delta: Duration) {
        let now = self.now();
        self.set(now + delta);
    }

    /// Clears the stored time so it's re-fetched again next.
    pub fn clear(&self) {
        let mut inner = self.inner.borrow_mut();
        if !inner.frozen {
            inner.time = None;
        }
    }
}

impl PartialEq for Clock {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Clock {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frozen_clock() {
        let clock = Clock::with_time(Duration::ZERO);
        assert_eq!(clock.now(), Duration::ZERO);

        clock.clear();
        assert_eq!(clock.now(), Duration::ZERO);

        clock.advance(Duration::from_millis(100));
        assert_eq!(clock.now(), Duration::from_millis(100));
        assert_eq!(clock.now_msec(), 100);

        let shared = clock.clone();
        shared.set(Duration::from_secs(5));
        assert_eq!(clock.now(), Duration::from_secs(5));
    }

    #[test]
    fn lazy_clock_retains_time() {
        let clock = Clock::default();
        let first = clock.now();
        assert_eq!(clock.now(), first);
        clock.clear();
        assert!(clock.now() >= first);
    }
}
