//! Geometry the renderer draws for an item.

use smithay::utils::{Logical, Rectangle};

use crate::window::Margins;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuadKind {
    Contents,
    Decoration,
    Shadow,
}

/// A rectangle in item coordinates and the part of the texture mapped onto it.
///
/// Texture coordinates are normalized to `0..1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowQuad {
    pub kind: QuadKind,
    pub geometry: Rectangle<f64, Logical>,
    pub tex_coords: [f64; 4],
}

impl WindowQuad {
    pub fn new(kind: QuadKind, geometry: Rectangle<f64, Logical>) -> Self {
        Self {
            kind,
            geometry,
            tex_coords: [0., 0., 1., 1.],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowQuadList(pub Vec<WindowQuad>);

impl WindowQuadList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, quad: WindowQuad) {
        self.0.push(quad);
    }

    pub fn iter(&self) -> impl Iterator<Item = &WindowQuad> + '_ {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn filter(&self, kind: QuadKind) -> WindowQuadList {
        WindowQuadList(self.0.iter().filter(|q| q.kind == kind).copied().collect())
    }
}

/// Single quad covering the whole item.
pub fn contents_quads(size: smithay::utils::Size<f64, Logical>) -> WindowQuadList {
    if size.w <= 0. || size.h <= 0. {
        return WindowQuadList::new();
    }
    WindowQuadList(vec![WindowQuad::new(
        QuadKind::Contents,
        Rectangle::from_size(size),
    )])
}

/// Border quads of a decoration around a frame of the given size.
pub fn decoration_quads(size: smithay::utils::Size<f64, Logical>, borders: Margins) -> WindowQuadList {
    let (w, h) = (size.w, size.h);
    let left = f64::from(borders.left);
    let top = f64::from(borders.top);
    let right = f64::from(borders.right);
    let bottom = f64::from(borders.bottom);

    let rects = [
        Rectangle::new((0., 0.).into(), (w, top).into()),
        Rectangle::new((0., top).into(), (left, h - top - bottom).into()),
        Rectangle::new((w - right, top).into(), (right, h - top - bottom).into()),
        Rectangle::new((0., h - bottom).into(), (w, bottom).into()),
    ];

    WindowQuadList(
        rects
            .into_iter()
            .filter(|r| r.size.w > 0. && r.size.h > 0.)
            .map(|r| WindowQuad::new(QuadKind::Decoration, r))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoration_quads_skip_empty_borders() {
        let quads = decoration_quads((100., 100.).into(), Margins::new(0, 20, 0, 2));
        assert_eq!(quads.len(), 2);
        assert_eq!(
            quads.0[1].geometry,
            Rectangle::new((0., 98.).into(), (100., 2.).into())
        );
        assert!(contents_quads((0., 10.).into()).is_empty());
    }
}
