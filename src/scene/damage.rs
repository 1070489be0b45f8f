use std::collections::VecDeque;

use crate::utils::region::Region;

/// Default number of frames of damage kept per output.
pub const DEFAULT_CAPACITY: usize = 10;

/// Recent per-frame damage of one output, newest first.
#[derive(Debug)]
pub struct DamageJournal {
    log: VecDeque<Region>,
    capacity: usize,
}

impl DamageJournal {
    pub fn new(capacity: usize) -> Self {
        Self {
            log: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.log.truncate(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Records the damage of a frame that was just rendered.
    pub fn add(&mut self, region: Region) {
        if self.log.len() == self.capacity {
            self.log.pop_back();
        }
        self.log.push_front(region);
    }

    pub fn clear(&mut self) {
        self.log.clear();
    }

    /// Region that must be repainted into a buffer of the given age.
    ///
    /// A buffer of age `n` missed the damage of the last `n - 1` frames. Ages the journal can't
    /// answer for, including 0 (unknown contents), yield `fallback`.
    pub fn accumulate(&self, age: usize, fallback: &Region) -> Region {
        if age == 0 || age > self.log.len() {
            return fallback.clone();
        }

        let mut region = Region::new();
        for damage in self.log.iter().take(age - 1) {
            region.union(damage);
        }
        region
    }
}

impl Default for DamageJournal {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use smithay::utils::{Logical, Rectangle};

    use super::*;

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Rectangle<i32, Logical> {
        Rectangle::new((x, y).into(), (w, h).into())
    }

    #[test]
    fn unknown_age_falls_back() {
        let mut journal = DamageJournal::new(3);
        let full = Region::from_rect(rect(0, 0, 100, 100));
        journal.add(Region::from_rect(rect(0, 0, 10, 10)));

        assert_eq!(journal.accumulate(0, &full), full);
        assert_eq!(journal.accumulate(2, &full), full);
        assert!(journal.accumulate(1, &full).is_empty());
    }

    #[test]
    fn capacity_bounds_history() {
        let mut journal = DamageJournal::new(2);
        let full = Region::from_rect(rect(0, 0, 100, 100));
        journal.add(Region::from_rect(rect(0, 0, 10, 10)));
        journal.add(Region::from_rect(rect(20, 0, 10, 10)));
        journal.add(Region::from_rect(rect(40, 0, 10, 10)));

        assert_eq!(journal.len(), 2);
        assert_eq!(
            journal.accumulate(2, &full),
            Region::from_rect(rect(40, 0, 10, 10))
        );
        assert_eq!(journal.accumulate(3, &full), full);
    }

    proptest! {
        #[test]
        fn accumulate_is_union_of_recent_frames(
            frames in proptest::collection::vec((0..50, 0..50, 1..20, 1..20), 1..12),
            age in 1usize..12,
        ) {
            let capacity = 10;
            let mut journal = DamageJournal::new(capacity);
            let regions: Vec<_> = frames
                .iter()
                .map(|&(x, y, w, h)| Region::from_rect(rect(x, y, w, h)))
                .collect();
            for region in &regions {
                journal.add(region.clone());
            }

            prop_assume!(age <= journal.len());

            let mut expected = Region::new();
            for region in regions.iter().rev().take(age - 1) {
                expected.union(region);
            }
            let fallback = Region::from_rect(rect(0, 0, 1000, 1000));
            prop_assert_eq!(journal.accumulate(age, &fallback), expected);
        }
    }
}
