//! GPU render time tracking.

use std::collections::VecDeque;
use std::time::Duration;

use crate::backend::graphics::{Graphics, QueryName};

/// Default number of frames remembered by a [`RenderJournal`].
pub const DEFAULT_HISTORY: usize = 10;

/// How long the last few frames took to render.
#[derive(Debug)]
pub struct RenderJournal {
    log: VecDeque<Duration>,
    capacity: usize,
}

impl RenderJournal {
    pub fn new(capacity: usize) -> Self {
        Self {
            log: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn add(&mut self, time: Duration) {
        if self.log.len() == self.capacity {
            self.log.pop_back();
        }
        self.log.push_front(time);
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn minimum(&self) -> Duration {
        self.log.iter().copied().min().unwrap_or_default()
    }

    pub fn maximum(&self) -> Duration {
        self.log.iter().copied().max().unwrap_or_default()
    }

    pub fn average(&self) -> Duration {
        if self.log.is_empty() {
            return Duration::ZERO;
        }
        self.log.iter().sum::<Duration>() / self.log.len() as u32
    }

    /// Budget to reserve before the vblank when scheduling a frame.
    pub fn estimate(&self) -> Duration {
        self.maximum()
    }
}

impl Default for RenderJournal {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

/// Pair of timestamp queries around one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTimer {
    start: QueryName,
    end: Option<QueryName>,
}

impl RenderTimer {
    pub fn begin(gl: &mut dyn Graphics) -> Self {
        Self {
            start: gl.query_timestamp(),
            end: None,
        }
    }

    pub fn end(&mut self, gl: &mut dyn Graphics) {
        if self.end.is_none() {
            self.end = Some(gl.query_timestamp());
        }
    }

    /// GPU time between the two queries, once both results are available.
    ///
    /// The queries are deleted when the result is returned.
    pub fn query(&self, gl: &mut dyn Graphics) -> Option<Duration> {
        let end = self.end?;
        let start_time = gl.query_result(self.start)?;
        let end_time = gl.query_result(end)?;
        gl.delete_query(self.start);
        gl.delete_query(end);
        Some(end_time.saturating_sub(start_time))
    }

    pub fn discard(self, gl: &mut dyn Graphics) {
        gl.delete_query(self.start);
        if let Some(end) = self.end {
            gl.delete_query(end);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::graphics::VirtualGraphics;

    #[test]
    fn journal_keeps_recent_frames() {
        let mut journal = RenderJournal::new(3);
        for ms in [9, 1, 2, 3] {
            journal.add(Duration::from_millis(ms));
        }
        assert_eq!(journal.len(), 3);
        assert_eq!(journal.maximum(), Duration::from_millis(3));
        assert_eq!(journal.minimum(), Duration::from_millis(1));
        assert_eq!(journal.average(), Duration::from_millis(2));
    }

    #[test]
    fn timer_measures_gpu_time() {
        let mut gl = VirtualGraphics::new();
        gl.frame_time = Duration::from_millis(4);

        let mut timer = RenderTimer::begin(&mut gl);
        assert_eq!(timer.query(&mut gl), None);
        gl.draw((10, 10).into(), &[], &[]);
        timer.end(&mut gl);
        assert_eq!(timer.query(&mut gl), Some(Duration::from_millis(4)));
    }
}
