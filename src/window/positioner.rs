//! xdg_positioner placement.

use bitflags::bitflags;
use smithay::utils::{Logical, Point, Rectangle, Size};

use crate::display::ProtocolError;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct Edges: u8 {
        const TOP = 1 << 0;
        const BOTTOM = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct ConstraintAdjustments: u8 {
        const SLIDE_X = 1 << 0;
        const SLIDE_Y = 1 << 1;
        const FLIP_X = 1 << 2;
        const FLIP_Y = 1 << 3;
        const RESIZE_X = 1 << 4;
        const RESIZE_Y = 1 << 5;
    }
}

const HORIZONTAL: Edges = Edges::LEFT.union(Edges::RIGHT);
const VERTICAL: Edges = Edges::TOP.union(Edges::BOTTOM);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Positioner {
    pub size: Size<i32, Logical>,
    /// Anchor rectangle relative to the parent's window geometry.
    pub anchor_rect: Rectangle<i32, Logical>,
    pub anchor_edges: Edges,
    pub gravity: Edges,
    pub offset: Point<i32, Logical>,
    pub constraint_adjustments: ConstraintAdjustments,
    pub reactive: bool,
}

impl Positioner {
    /// Checks the positioner is complete before it's used for a popup.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.size.w <= 0 || self.size.h <= 0 {
            return Err(ProtocolError::new(
                "xdg_wm_base",
                5,
                "positioner size must be positive",
            ));
        }
        if self.anchor_rect.size.w < 0 || self.anchor_rect.size.h < 0 {
            return Err(ProtocolError::new(
                "xdg_positioner",
                0,
                "anchor rect size must be non-negative",
            ));
        }
        for edges in [self.anchor_edges, self.gravity] {
            if edges.contains(HORIZONTAL) || edges.contains(VERTICAL) {
                return Err(ProtocolError::new(
                    "xdg_positioner",
                    0,
                    "opposite edges are mutually exclusive",
                ));
            }
        }
        Ok(())
    }

    /// Popup geometry before any constraint adjustment, relative to the parent.
    pub fn unconstrained_geometry(&self) -> Rectangle<i32, Logical> {
        Rectangle::new(
            popup_offset(self.anchor_rect, self.anchor_edges, self.gravity, self.size) + self.offset,
            self.size,
        )
    }

    /// Global popup geometry constrained to `bounds`.
    ///
    /// `parent_origin` is the global position of the parent's window geometry.
    pub fn place(
        &self,
        parent_origin: Point<i32, Logical>,
        bounds: Rectangle<i32, Logical>,
    ) -> Rectangle<i32, Logical> {
        let geometry_for = |anchor: Edges, gravity: Edges| {
            Rectangle::new(
                popup_offset(self.anchor_rect, anchor, gravity, self.size)
                    + self.offset
                    + parent_origin,
                self.size,
            )
        };

        let mut rect = geometry_for(self.anchor_edges, self.gravity);
        if in_bounds(rect, bounds, Edges::all()) {
            return rect;
        }

        let adjustments = self.constraint_adjustments;

        if adjustments.contains(ConstraintAdjustments::FLIP_X) && !in_bounds(rect, bounds, HORIZONTAL) {
            let flipped = geometry_for(flip(self.anchor_edges, HORIZONTAL), flip(self.gravity, HORIZONTAL));
            if in_bounds(flipped, bounds, HORIZONTAL) {
                rect.loc.x = flipped.loc.x;
            }
        }
        if adjustments.contains(ConstraintAdjustments::SLIDE_X) {
            if !in_bounds(rect, bounds, Edges::LEFT) {
                rect.loc.x = bounds.loc.x;
            }
            if !in_bounds(rect, bounds, Edges::RIGHT) {
                rect.loc.x = bounds.loc.x + bounds.size.w - rect.size.w;
            }
        }
        if adjustments.contains(ConstraintAdjustments::RESIZE_X) {
            let mut left = rect.loc.x;
            let mut right = rect.loc.x + rect.size.w;
            left = left.max(bounds.loc.x);
            right = right.min(bounds.loc.x + bounds.size.w);
            if right > left {
                rect.loc.x = left;
                rect.size.w = right - left;
            }
        }

        if adjustments.contains(ConstraintAdjustments::FLIP_Y) && !in_bounds(rect, bounds, VERTICAL) {
            let flipped = geometry_for(flip(self.anchor_edges, VERTICAL), flip(self.gravity, VERTICAL));
            if in_bounds(flipped, bounds, VERTICAL) {
                rect.loc.y = flipped.loc.y;
            }
        }
        if adjustments.contains(ConstraintAdjustments::SLIDE_Y) {
            if !in_bounds(rect, bounds, Edges::TOP) {
                rect.loc.y = bounds.loc.y;
            }
            if !in_bounds(rect, bounds, Edges::BOTTOM) {
                rect.loc.y = bounds.loc.y + bounds.size.h - rect.size.h;
            }
        }
        if adjustments.contains(ConstraintAdjustments::RESIZE_Y) {
            let mut top = rect.loc.y;
            let mut bottom = rect.loc.y + rect.size.h;
            top = top.max(bounds.loc.y);
            bottom = bottom.min(bounds.loc.y + bounds.size.h);
            if bottom > top {
                rect.loc.y = top;
                rect.size.h = bottom - top;
            }
        }

        rect
    }
}

/// Flips both edges of an axis if either is set.
fn flip(edges: Edges, axis: Edges) -> Edges {
    if edges.intersects(axis) {
        edges ^ axis
    } else {
        edges
    }
}

fn in_bounds(
    target: Rectangle<i32, Logical>,
    bounds: Rectangle<i32, Logical>,
    edges: Edges,
) -> bool {
    if edges.contains(Edges::LEFT) && target.loc.x < bounds.loc.x {
        return false;
    }
    if edges.contains(Edges::TOP) && target.loc.y < bounds.loc.y {
        return false;
    }
    if edges.contains(Edges::RIGHT) && target.loc.x + target.size.w > bounds.loc.x + bounds.size.w {
        return false;
    }
    if edges.contains(Edges::BOTTOM) && target.loc.y + target.size.h > bounds.loc.y + bounds.size.h
    {
        return false;
    }
    true
}

fn popup_offset(
    anchor_rect: Rectangle<i32, Logical>,
    anchor: Edges,
    gravity: Edges,
    size: Size<i32, Logical>,
) -> Point<i32, Logical> {
    let anchor_x = if anchor.contains(Edges::LEFT) {
        anchor_rect.loc.x
    } else if anchor.contains(Edges::RIGHT) {
        anchor_rect.loc.x + anchor_rect.size.w
    } else {
        anchor_rect.loc.x + anchor_rect.size.w / 2
    };
    let anchor_y = if anchor.contains(Edges::TOP) {
        anchor_rect.loc.y
    } else if anchor.contains(Edges::BOTTOM) {
        anchor_rect.loc.y + anchor_rect.size.h
    } else {
        anchor_rect.loc.y + anchor_rect.size.h / 2
    };

    let x = if gravity.contains(Edges::LEFT) {
        anchor_x - size.w
    } else if gravity.contains(Edges::RIGHT) {
        anchor_x
    } else {
        anchor_x - size.w / 2
    };
    let y = if gravity.contains(Edges::TOP) {
        anchor_y - size.h
    } else if gravity.contains(Edges::BOTTOM) {
        anchor_y
    } else {
        anchor_y - size.h / 2
    };

    Point::from((x, y))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Rectangle<i32, Logical> {
        Rectangle::new((x, y).into(), (w, h).into())
    }

    #[test]
    fn anchor_and_gravity_combinations() {
        let mut positioner = Positioner {
            size: (50, 20).into(),
            anchor_rect: rect(10, 10, 100, 40),
            ..Default::default()
        };
        // Centered anchor and gravity.
        assert_eq!(positioner.unconstrained_geometry(), rect(35, 20, 50, 20));

        positioner.anchor_edges = Edges::BOTTOM | Edges::LEFT;
        positioner.gravity = Edges::BOTTOM | Edges::RIGHT;
        assert_eq!(positioner.unconstrained_geometry(), rect(10, 50, 50, 20));

        positioner.gravity = Edges::TOP | Edges::LEFT;
        positioner.offset = (1, 2).into();
        assert_eq!(positioner.unconstrained_geometry(), rect(-39, 32, 50, 20));
    }

    #[test]
    fn flip_y_near_bottom_edge() {
        let positioner = Positioner {
            size: (150, 150).into(),
            anchor_rect: rect(0, 200, 200, 1),
            anchor_edges: Edges::BOTTOM | Edges::RIGHT,
            gravity: Edges::BOTTOM | Edges::RIGHT,
            constraint_adjustments: ConstraintAdjustments::FLIP_Y,
            ..Default::default()
        };
        let bounds = rect(0, 0, 400, 300);
        let placed = positioner.place((100, 100).into(), bounds);

        assert_eq!(placed, rect(300, 150, 150, 150));
        assert!(placed.loc.y >= 0 && placed.loc.y + placed.size.h <= 300);
    }

    #[test]
    fn flip_is_rejected_when_it_does_not_fit() {
        // Flipping up would put the popup above the top edge, so the unflipped position stays.
        let positioner = Positioner {
            size: (150, 150).into(),
            anchor_rect: rect(0, 0, 200, 200),
            anchor_edges: Edges::BOTTOM | Edges::RIGHT,
            gravity: Edges::BOTTOM | Edges::RIGHT,
            constraint_adjustments: ConstraintAdjustments::FLIP_Y,
            ..Default::default()
        };
        let placed = positioner.place((100, 100).into(), rect(0, 0, 400, 300));
        assert_eq!(placed, rect(300, 300, 150, 150));
    }

    #[test]
    fn slide_then_resize() {
        let positioner = Positioner {
            size: (100, 500).into(),
            anchor_rect: rect(0, 0, 10, 10),
            anchor_edges: Edges::BOTTOM,
            gravity: Edges::BOTTOM,
            constraint_adjustments: ConstraintAdjustments::SLIDE_X
                | ConstraintAdjustments::RESIZE_Y,
            ..Default::default()
        };
        let placed = positioner.place((0, 0).into(), rect(0, 0, 400, 300));
        assert_eq!(placed, rect(0, 10, 100, 290));
    }

    #[test]
    fn validate_rejects_opposite_edges() {
        let positioner = Positioner {
            size: (10, 10).into(),
            anchor_edges: Edges::LEFT | Edges::RIGHT,
            ..Default::default()
        };
        assert!(positioner.validate().is_err());

        let empty = Positioner::default();
        assert!(empty.validate().is_err());
    }

    fn edges() -> impl Strategy<Value = Edges> {
        (0u8..3, 0u8..3).prop_map(|(h, v)| {
            let mut edges = Edges::empty();
            match h {
                1 => edges |= Edges::LEFT,
                2 => edges |= Edges::RIGHT,
                _ => (),
            }
            match v {
                1 => edges |= Edges::TOP,
                2 => edges |= Edges::BOTTOM,
                _ => (),
            }
            edges
        })
    }

    prop_compose! {
        fn positioner()(
            w in 1..200,
            h in 1..200,
            ax in -100..500,
            ay in -100..500,
            aw in 0..100,
            ah in 0..100,
            anchor_edges in edges(),
            gravity in edges(),
            ox in -20..20,
            oy in -20..20,
        ) -> Positioner {
            Positioner {
                size: (w, h).into(),
                anchor_rect: rect(ax, ay, aw, ah),
                anchor_edges,
                gravity,
                offset: (ox, oy).into(),
                constraint_adjustments: ConstraintAdjustments::empty(),
                reactive: false,
            }
        }
    }

    proptest! {
        #[test]
        fn fitting_placement_is_unchanged(
            positioner in positioner(),
            px in -100..100,
            py in -100..100,
            adjust in 0u8..64,
        ) {
            let mut positioner = positioner;
            positioner.constraint_adjustments = ConstraintAdjustments::from_bits_truncate(adjust);
            let bounds = rect(-1000, -1000, 3000, 3000);
            let origin = Point::from((px, py));

            let unconstrained = positioner.unconstrained_geometry();
            let expected = Rectangle::new(unconstrained.loc + origin, unconstrained.size);
            prop_assume!(bounds.contains_rect(expected));

            prop_assert_eq!(positioner.place(origin, bounds), expected);
        }

        #[test]
        fn flip_and_slide_stay_in_bounds(
            positioner in positioner(),
            px in -100..600,
            py in -100..600,
        ) {
            let mut positioner = positioner;
            positioner.constraint_adjustments = ConstraintAdjustments::FLIP_X
                | ConstraintAdjustments::FLIP_Y
                | ConstraintAdjustments::SLIDE_X
                | ConstraintAdjustments::SLIDE_Y;
            let bounds = rect(0, 0, 400, 300);

            let placed = positioner.place((px, py).into(), bounds);
            prop_assert!(bounds.contains_rect(placed), "{placed:?} not in {bounds:?}");
        }
    }
}
