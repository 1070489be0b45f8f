use smithay::utils::{Logical, Rectangle};

use super::{Layer, Window, WindowId, WindowType};
use crate::output::OutputId;
use crate::scene::item::ItemId;

/// Remains of a closed window.
///
/// Keeps the last geometry and scene item around so that close animations have something to
/// paint. The entry is dropped once every holder has released it.
#[derive(Debug)]
pub struct Deleted {
    pub id: WindowId,
    pub window_type: WindowType,
    pub frame_geometry: Rectangle<i32, Logical>,
    pub buffer_geometry: Rectangle<i32, Logical>,
    pub layer: Layer,
    pub output: Option<OutputId>,
    pub desktop: u32,
    pub on_all_desktops: bool,
    pub item: Option<ItemId>,
    pub opacity: f64,
    refs: u32,
}

impl Deleted {
    pub fn new(window: &Window) -> Self {
        Self {
            id: window.id,
            window_type: window.window_type,
            frame_geometry: window.frame_geometry(),
            buffer_geometry: window.buffer_geometry(),
            layer: window.layer.unwrap_or(Layer::Normal),
            output: window.output,
            desktop: window.desktop,
            on_all_desktops: window.on_all_desktops,
            item: window.item,
            opacity: window.opacity,
            refs: 1,
        }
    }

    pub fn ref_count(&self) -> u32 {
        self.refs
    }

    pub fn add_ref(&mut self) {
        self.refs += 1;
    }

    /// Drops one reference, returning whether this was the last one.
    pub fn unref(&mut self) -> bool {
        self.refs = self.refs.saturating_sub(1);
        self.refs == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::WindowKind;

    #[test]
    fn released_after_last_unref() {
        let window = Window::new(WindowKind::WaylandToplevel);
        let mut deleted = Deleted::new(&window);
        assert_eq!(deleted.id, window.id);

        deleted.add_ref();
        assert!(!deleted.unref());
        assert!(deleted.unref());
    }
}
