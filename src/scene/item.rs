use std::collections::HashMap;
use std::rc::Rc;

use glam::DAffine2;
use smithay::utils::{Logical, Point, Size};

use super::node::RenderNode;
use super::quads::WindowQuadList;
use crate::display::SurfaceId;
use crate::output::OutputId;
use crate::texture::import::SurfaceTexture;
use crate::utils::id::define_id;
use crate::utils::region::Region;
use crate::window::{Margins, WindowId};

define_id!(ItemId);

#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    /// Groups children without content of its own.
    Container,
    /// Root item of a window; children are the decoration and the surface tree.
    Window(WindowId),
    Surface(SurfaceId),
    Decoration(Margins),
    Solid([f32; 4]),
}

impl ItemKind {
    pub fn has_content(&self) -> bool {
        matches!(
            self,
            ItemKind::Surface(_) | ItemKind::Decoration(_) | ItemKind::Solid(_)
        )
    }
}

#[derive(Debug)]
pub struct Item {
    pub id: ItemId,
    pub kind: ItemKind,
    pub(super) parent: Option<ItemId>,
    /// Children in insertion order.
    pub(super) children: Vec<ItemId>,
    /// Children stably sorted by z.
    pub(super) sorted_children: Vec<ItemId>,

    pub(super) position: Point<f64, Logical>,
    pub(super) size: Size<f64, Logical>,
    pub(super) transform: DAffine2,
    pub(super) opacity: f64,
    pub(super) z: i32,
    pub(super) explicit_visible: bool,
    pub(super) effective_visible: bool,

    pub(super) item_to_scene: Option<DAffine2>,
    pub(super) repaints: HashMap<OutputId, Region>,
    pub(super) quads: Option<WindowQuadList>,
    pub(super) render_node: Option<Rc<RenderNode>>,

    pub texture: Option<SurfaceTexture>,
    /// Damage in item coordinates not yet consumed by the renderer.
    pub damage: Region,
}

impl Item {
    pub(super) fn new(kind: ItemKind) -> Self {
        Self {
            id: ItemId::next(),
            kind,
            parent: None,
            children: Vec::new(),
            sorted_children: Vec::new(),
            position: Point::from((0., 0.)),
            size: Size::from((0., 0.)),
            transform: DAffine2::IDENTITY,
            opacity: 1.,
            z: 0,
            explicit_visible: true,
            effective_visible: true,
            item_to_scene: None,
            repaints: HashMap::new(),
            quads: None,
            render_node: None,
            texture: None,
            damage: Region::new(),
        }
    }

    pub fn parent(&self) -> Option<ItemId> {
        self.parent
    }

    pub fn children(&self) -> &[ItemId] {
        &self.children
    }

    pub fn sorted_children(&self) -> &[ItemId] {
        &self.sorted_children
    }

    pub fn position(&self) -> Point<f64, Logical> {
        self.position
    }

    pub fn size(&self) -> Size<f64, Logical> {
        self.size
    }

    pub fn transform(&self) -> DAffine2 {
        self.transform
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn z(&self) -> i32 {
        self.z
    }

    pub fn is_explicitly_visible(&self) -> bool {
        self.explicit_visible
    }

    pub fn is_visible(&self) -> bool {
        self.effective_visible
    }

    /// Transform from item coordinates into parent coordinates.
    pub fn item_to_parent(&self) -> DAffine2 {
        DAffine2::from_translation(glam::DVec2::new(self.position.x, self.position.y))
            * self.transform
    }

    pub fn repaints(&self, output: OutputId) -> Option<&Region> {
        self.repaints.get(&output)
    }
}
