use std::rc::Rc;

use glam::DAffine2;

use super::item::ItemId;
use super::quads::WindowQuadList;

/// Cached render graph built from the item tree.
///
/// Nodes are shared between frames until an item below them changes.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderNode {
    Container {
        children: Vec<Rc<RenderNode>>,
    },
    Transform {
        /// Item to parent transform.
        transform: DAffine2,
        opacity: f64,
        child: Rc<RenderNode>,
    },
    Content {
        item: ItemId,
        quads: WindowQuadList,
    },
}

/// Content node with the transform and opacity accumulated from the root.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatContent {
    pub item: ItemId,
    pub quads: WindowQuadList,
    pub transform: DAffine2,
    pub opacity: f64,
}

impl RenderNode {
    /// Content nodes bottom to top.
    pub fn flatten(&self) -> Vec<FlatContent> {
        let mut rv = Vec::new();
        self.flatten_into(DAffine2::IDENTITY, 1., &mut rv);
        rv
    }

    fn flatten_into(&self, transform: DAffine2, opacity: f64, out: &mut Vec<FlatContent>) {
        match self {
            RenderNode::Container { children } => {
                for child in children {
                    child.flatten_into(transform, opacity, out);
                }
            }
            RenderNode::Transform {
                transform: local,
                opacity: local_opacity,
                child,
            } => {
                child.flatten_into(transform * *local, opacity * local_opacity, out);
            }
            RenderNode::Content { item, quads } => out.push(FlatContent {
                item: *item,
                quads: quads.clone(),
                transform,
                opacity,
            }),
        }
    }
}
