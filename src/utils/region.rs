use smithay::utils::{Logical, Point, Rectangle};

/// Set of pixels in logical coordinates, stored as non-overlapping rectangles.
#[derive(Debug, Clone, Default)]
pub struct Region {
    rects: Vec<Rectangle<i32, Logical>>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: Rectangle<i32, Logical>) -> Self {
        let mut region = Self::new();
        region.add_rect(rect);
        region
    }

    pub fn from_rects(rects: impl IntoIterator<Item = Rectangle<i32, Logical>>) -> Self {
        let mut region = Self::new();
        for rect in rects {
            region.add_rect(rect);
        }
        region
    }

    pub fn rects(&self) -> &[Rectangle<i32, Logical>] {
        &self.rects
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }

    pub fn add_rect(&mut self, rect: Rectangle<i32, Logical>) {
        if rect.is_empty() {
            return;
        }

        let new = Rectangle::subtract_rects_many([rect], self.rects.iter().copied());
        self.rects.extend(new);
    }

    pub fn union(&mut self, other: &Region) {
        for rect in &other.rects {
            self.add_rect(*rect);
        }
    }

    pub fn united(&self, other: &Region) -> Region {
        let mut rv = self.clone();
        rv.union(other);
        rv
    }

    pub fn subtract_rect(&mut self, rect: Rectangle<i32, Logical>) {
        if rect.is_empty() {
            return;
        }
        self.rects = Rectangle::subtract_rects_many(self.rects.iter().copied(), [rect]);
    }

    pub fn subtract(&mut self, other: &Region) {
        if other.is_empty() {
            return;
        }
        self.rects = Rectangle::subtract_rects_many(self.rects.iter().copied(), other.rects.iter().copied());
    }

    pub fn intersected_rect(&self, rect: Rectangle<i32, Logical>) -> Region {
        Region {
            rects: self
                .rects
                .iter()
                .filter_map(|r| r.intersection(rect))
                .filter(|r| !r.is_empty())
                .collect(),
        }
    }

    pub fn intersected(&self, other: &Region) -> Region {
        let mut rv = Region::new();
        for rect in &other.rects {
            // Both inputs are non-overlapping, so the pieces are as well.
            rv.rects.extend(self.intersected_rect(*rect).rects);
        }
        rv
    }

    pub fn intersects_rect(&self, rect: Rectangle<i32, Logical>) -> bool {
        self.rects.iter().any(|r| r.overlaps(rect))
    }

    pub fn translated(&self, offset: Point<i32, Logical>) -> Region {
        Region {
            rects: self
                .rects
                .iter()
                .map(|r| Rectangle::new(r.loc + offset, r.size))
                .collect(),
        }
    }

    pub fn bounding_rect(&self) -> Option<Rectangle<i32, Logical>> {
        self.rects.iter().copied().reduce(|a, b| a.merge(b))
    }

    pub fn contains_point(&self, point: Point<i32, Logical>) -> bool {
        self.rects.iter().any(|r| r.contains(point))
    }

    pub fn contains_rect(&self, rect: Rectangle<i32, Logical>) -> bool {
        Rectangle::subtract_rects_many([rect], self.rects.iter().copied()).is_empty()
    }

    pub fn area(&self) -> i64 {
        self.rects
            .iter()
            .map(|r| i64::from(r.size.w) * i64::from(r.size.h))
            .sum()
    }
}

impl From<Rectangle<i32, Logical>> for Region {
    fn from(rect: Rectangle<i32, Logical>) -> Self {
        Self::from_rect(rect)
    }
}

impl PartialEq for Region {
    /// Regions are equal when they cover the same pixels, regardless of how they are split.
    fn eq(&self, other: &Self) -> bool {
        self.area() == other.area()
            && Rectangle::subtract_rects_many(self.rects.iter().copied(), other.rects.iter().copied())
                .is_empty()
    }
}

impl Eq for Region {}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Rectangle<i32, Logical> {
        Rectangle::new((x, y).into(), (w, h).into())
    }

    #[test]
    fn union_does_not_double_count() {
        let mut region = Region::from_rect(rect(0, 0, 10, 10));
        region.add_rect(rect(5, 5, 10, 10));
        assert_eq!(region.area(), 175);
        assert_eq!(region.bounding_rect(), Some(rect(0, 0, 15, 15)));
    }

    #[test]
    fn equality_ignores_split() {
        let a = Region::from_rects([rect(0, 0, 5, 10), rect(5, 0, 5, 10)]);
        let b = Region::from_rect(rect(0, 0, 10, 10));
        assert_eq!(a, b);
        assert_ne!(a, Region::from_rect(rect(0, 0, 10, 9)));
    }

    #[test]
    fn subtract_and_intersect() {
        let mut region = Region::from_rect(rect(0, 0, 10, 10));
        region.subtract_rect(rect(0, 0, 10, 5));
        assert_eq!(region, Region::from_rect(rect(0, 5, 10, 5)));

        let clipped = region.intersected_rect(rect(8, 0, 10, 100));
        assert_eq!(clipped, Region::from_rect(rect(8, 5, 2, 5)));
        assert!(!region.contains_point((3, 3).into()));
        assert!(region.contains_point((3, 7).into()));
    }

    #[test]
    fn empty_rects_are_ignored() {
        let region = Region::from_rect(rect(3, 3, 0, 10));
        assert!(region.is_empty());
        assert_eq!(region.bounding_rect(), None);
    }

    fn arbitrary_rect() -> impl Strategy<Value = Rectangle<i32, Logical>> {
        (-50..50, -50..50, 0..40, 0..40).prop_map(|(x, y, w, h)| rect(x, y, w, h))
    }

    proptest! {
        #[test]
        fn rects_never_overlap(rects in prop::collection::vec(arbitrary_rect(), 0..8)) {
            let region = Region::from_rects(rects.iter().copied());
            for (i, a) in region.rects().iter().enumerate() {
                for b in &region.rects()[i + 1..] {
                    prop_assert!(!a.overlaps(*b));
                }
            }
            for r in rects {
                prop_assert!(region.contains_rect(r));
            }
        }
    }
}
