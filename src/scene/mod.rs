//! Scene graph.
//!
//! Items form a tree rooted at [`Scene::root`]. Every mutation records a repaint of the area the
//! item covered before and after the change and drops the cached render nodes from the item up
//! to the root. Each output views the scene through a delegate that accumulates the damage
//! falling into its viewport.

use std::collections::HashMap;
use std::rc::Rc;

use glam::{DAffine2, DVec2};
use smithay::utils::{Logical, Point, Rectangle, Size};

use crate::output::OutputId;
use crate::utils::region::Region;

pub mod damage;
pub mod item;
pub mod node;
pub mod quads;

use self::damage::DamageJournal;
use self::item::{Item, ItemId, ItemKind};
use self::node::RenderNode;
use self::quads::{contents_quads, decoration_quads, WindowQuadList};

/// View of the scene for one output.
#[derive(Debug)]
pub struct SceneDelegate {
    pub output: OutputId,
    pub viewport: Rectangle<i32, Logical>,
    /// Area waiting to be repainted.
    pub dirty: Region,
    pub journal: DamageJournal,
}

#[derive(Debug)]
pub struct Scene {
    items: HashMap<ItemId, Item>,
    root: ItemId,
    delegates: Vec<SceneDelegate>,
    damage_history: usize,
}

impl Scene {
    pub fn new() -> Self {
        let root = Item::new(ItemKind::Container);
        let root_id = root.id;
        let mut items = HashMap::new();
        items.insert(root_id, root);
        Self {
            items,
            root: root_id,
            delegates: Vec::new(),
            damage_history: damage::DEFAULT_CAPACITY,
        }
    }

    pub fn root(&self) -> ItemId {
        self.root
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.items.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.len() <= 1
    }

    // Delegates.

    pub fn set_damage_history(&mut self, capacity: usize) {
        self.damage_history = capacity;
        for delegate in &mut self.delegates {
            delegate.journal.set_capacity(capacity);
        }
    }

    pub fn add_delegate(&mut self, output: OutputId, viewport: Rectangle<i32, Logical>) {
        if self.delegate(output).is_some() {
            return;
        }
        self.delegates.push(SceneDelegate {
            output,
            viewport,
            dirty: Region::from_rect(viewport),
            journal: DamageJournal::new(self.damage_history),
        });
    }

    pub fn remove_delegate(&mut self, output: OutputId) {
        self.delegates.retain(|d| d.output != output);
        for item in self.items.values_mut() {
            item.repaints.remove(&output);
        }
    }

    pub fn set_viewport(&mut self, output: OutputId, viewport: Rectangle<i32, Logical>) {
        if let Some(delegate) = self.delegates.iter_mut().find(|d| d.output == output) {
            if delegate.viewport != viewport {
                delegate.viewport = viewport;
                delegate.dirty = Region::from_rect(viewport);
                delegate.journal.clear();
            }
        }
    }

    pub fn delegate(&self, output: OutputId) -> Option<&SceneDelegate> {
        self.delegates.iter().find(|d| d.output == output)
    }

    pub fn delegate_mut(&mut self, output: OutputId) -> Option<&mut SceneDelegate> {
        self.delegates.iter_mut().find(|d| d.output == output)
    }

    pub fn delegates(&self) -> impl Iterator<Item = &SceneDelegate> + '_ {
        self.delegates.iter()
    }

    /// Whether any output has something to repaint.
    pub fn needs_repaint(&self, output: OutputId) -> bool {
        self.delegate(output).is_some_and(|d| !d.dirty.is_empty())
    }

    /// Takes the damage accumulated for an output and clears the per-item repaints.
    pub fn take_repaint(&mut self, output: OutputId) -> Region {
        for item in self.items.values_mut() {
            item.repaints.remove(&output);
        }
        self.delegate_mut(output)
            .map(|d| std::mem::take(&mut d.dirty))
            .unwrap_or_default()
    }

    // Tree structure.

    pub fn create_item(&mut self, kind: ItemKind, parent: ItemId) -> ItemId {
        let item = Item::new(kind);
        let id = item.id;
        self.items.insert(id, item);
        self.set_parent_item(id, Some(parent));
        id
    }

    /// Destroys an item and its subtree, repainting the area it covered.
    pub fn destroy_item(&mut self, id: ItemId) {
        if id == self.root {
            return;
        }
        if self.item(id).is_some_and(|i| i.effective_visible) {
            let rect = self.subtree_scene_rect(id);
            self.schedule_repaint_scene(&Region::from_rect(rect));
        }
        self.detach(id);

        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(item) = self.items.remove(&id) {
                stack.extend(item.children);
            }
        }
    }

    fn detach(&mut self, id: ItemId) {
        let Some(parent) = self.items.get_mut(&id).and_then(|i| i.parent.take()) else {
            return;
        };
        if let Some(parent_item) = self.items.get_mut(&parent) {
            parent_item.children.retain(|c| *c != id);
            parent_item.sorted_children.retain(|c| *c != id);
        }
        self.invalidate_node(parent);
    }

    pub fn set_parent_item(&mut self, id: ItemId, parent: Option<ItemId>) {
        if id == self.root {
            return;
        }
        if let Some(parent) = parent {
            if !self.items.contains_key(&parent) || self.is_ancestor(id, parent) {
                warn!("refusing to reparent {id:?} under {parent:?}");
                return;
            }
        }

        self.schedule_subtree_repaint(id);
        self.detach(id);

        if let Some(parent) = parent {
            if let Some(item) = self.items.get_mut(&id) {
                item.parent = Some(parent);
            }
            if let Some(parent_item) = self.items.get_mut(&parent) {
                parent_item.children.push(id);
            }
            self.resort_children(parent);
        }

        self.invalidate_transforms(id);
        self.update_effective_visibility(id);
        self.schedule_subtree_repaint(id);
        self.invalidate_node(id);
    }

    fn is_ancestor(&self, ancestor: ItemId, mut id: ItemId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.item(id).and_then(|i| i.parent) {
                Some(parent) => id = parent,
                None => return false,
            }
        }
    }

    fn resort_children(&mut self, parent: ItemId) {
        let Some(item) = self.items.get(&parent) else {
            return;
        };
        let mut sorted = item.children.clone();
        sorted.sort_by_key(|c| self.items.get(c).map_or(0, |c| c.z));
        if let Some(item) = self.items.get_mut(&parent) {
            item.sorted_children = sorted;
        }
        self.invalidate_node(parent);
    }

    // Properties.

    pub fn set_position(&mut self, id: ItemId, position: Point<f64, Logical>) {
        if self.item(id).map_or(true, |i| i.position == position) {
            return;
        }
        self.schedule_subtree_repaint(id);
        if let Some(item) = self.items.get_mut(&id) {
            item.position = position;
        }
        self.invalidate_transforms(id);
        self.schedule_subtree_repaint(id);
        self.invalidate_node(id);
    }

    pub fn set_size(&mut self, id: ItemId, size: Size<f64, Logical>) {
        if self.item(id).map_or(true, |i| i.size == size) {
            return;
        }
        self.schedule_subtree_repaint(id);
        if let Some(item) = self.items.get_mut(&id) {
            item.size = size;
            item.quads = None;
        }
        self.schedule_subtree_repaint(id);
        self.invalidate_node(id);
    }

    pub fn set_transform(&mut self, id: ItemId, transform: DAffine2) {
        if self.item(id).map_or(true, |i| i.transform == transform) {
            return;
        }
        self.schedule_subtree_repaint(id);
        if let Some(item) = self.items.get_mut(&id) {
            item.transform = transform;
        }
        self.invalidate_transforms(id);
        self.schedule_subtree_repaint(id);
        self.invalidate_node(id);
    }

    pub fn set_opacity(&mut self, id: ItemId, opacity: f64) {
        if self.item(id).map_or(true, |i| i.opacity == opacity) {
            return;
        }
        if let Some(item) = self.items.get_mut(&id) {
            item.opacity = opacity;
        }
        self.schedule_subtree_repaint(id);
        self.invalidate_node(id);
    }

    pub fn set_z(&mut self, id: ItemId, z: i32) {
        let Some(item) = self.items.get_mut(&id) else {
            return;
        };
        if item.z == z {
            return;
        }
        item.z = z;
        if let Some(parent) = item.parent {
            self.resort_children(parent);
        }
        self.schedule_subtree_repaint(id);
    }

    /// Moves `id` right before `sibling` in its parent's child list.
    pub fn stack_before(&mut self, id: ItemId, sibling: ItemId) {
        self.restack(id, sibling, false);
    }

    /// Moves `id` right after `sibling` in its parent's child list.
    pub fn stack_after(&mut self, id: ItemId, sibling: ItemId) {
        self.restack(id, sibling, true);
    }

    fn restack(&mut self, id: ItemId, sibling: ItemId, after: bool) {
        if id == sibling {
            return;
        }
        let parent = self.item(id).and_then(|i| i.parent);
        if parent.is_none() || parent != self.item(sibling).and_then(|i| i.parent) {
            warn!("can't restack {id:?} relative to non-sibling {sibling:?}");
            return;
        }
        let Some(parent) = parent else { return };
        let Some(parent_item) = self.items.get_mut(&parent) else {
            return;
        };
        parent_item.children.retain(|c| *c != id);
        let Some(idx) = parent_item.children.iter().position(|c| *c == sibling) else {
            return;
        };
        let idx = if after { idx + 1 } else { idx };
        parent_item.children.insert(idx, id);
        self.resort_children(parent);
        self.schedule_subtree_repaint(id);
    }

    pub fn set_visible(&mut self, id: ItemId, visible: bool) {
        let Some(item) = self.items.get_mut(&id) else {
            return;
        };
        if item.explicit_visible == visible {
            return;
        }
        item.explicit_visible = visible;
        self.update_effective_visibility(id);
    }

    fn update_effective_visibility(&mut self, id: ItemId) {
        let parent_visible = self
            .item(id)
            .and_then(|i| i.parent)
            .and_then(|p| self.item(p))
            .map_or(true, |p| p.effective_visible);
        let Some(item) = self.item(id) else {
            return;
        };
        let visible = item.explicit_visible && parent_visible;
        if visible == item.effective_visible {
            return;
        }

        if !visible {
            // Repaint while still visible so the vacated area is cleared.
            self.schedule_subtree_repaint(id);
        }

        let mut stack = vec![(id, visible)];
        while let Some((id, parent_visible)) = stack.pop() {
            let Some(item) = self.items.get_mut(&id) else {
                continue;
            };
            item.effective_visible = item.explicit_visible && parent_visible;
            let visible = item.effective_visible;
            stack.extend(item.children.iter().map(|c| (*c, visible)));
        }

        if visible {
            self.schedule_subtree_repaint(id);
        }
        self.invalidate_node(id);
    }

    // Transforms.

    /// Transform from item coordinates into scene coordinates.
    pub fn item_to_scene(&mut self, id: ItemId) -> DAffine2 {
        if let Some(transform) = self.item(id).and_then(|i| i.item_to_scene) {
            return transform;
        }
        let Some(item) = self.item(id) else {
            return DAffine2::IDENTITY;
        };
        let local = item.item_to_parent();
        let transform = match item.parent {
            Some(parent) => self.item_to_scene(parent) * local,
            None => local,
        };
        if let Some(item) = self.items.get_mut(&id) {
            item.item_to_scene = Some(transform);
        }
        transform
    }

    pub fn scene_to_item(&mut self, id: ItemId) -> DAffine2 {
        self.item_to_scene(id).inverse()
    }

    pub fn map_to_scene(&mut self, id: ItemId, point: Point<f64, Logical>) -> Point<f64, Logical> {
        let p = self
            .item_to_scene(id)
            .transform_point2(DVec2::new(point.x, point.y));
        Point::from((p.x, p.y))
    }

    pub fn map_from_scene(&mut self, id: ItemId, point: Point<f64, Logical>) -> Point<f64, Logical> {
        let p = self
            .scene_to_item(id)
            .transform_point2(DVec2::new(point.x, point.y));
        Point::from((p.x, p.y))
    }

    /// Axis-aligned scene rectangle covering a rectangle in item coordinates.
    pub fn map_rect_to_scene(
        &mut self,
        id: ItemId,
        rect: Rectangle<f64, Logical>,
    ) -> Rectangle<i32, Logical> {
        let transform = self.item_to_scene(id);
        map_rect(transform, rect)
    }

    fn invalidate_transforms(&mut self, id: ItemId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(item) = self.items.get_mut(&id) {
                item.item_to_scene = None;
                stack.extend(item.children.iter().copied());
            }
        }
    }

    /// Scene rectangle covered by the item and its descendants.
    pub fn subtree_scene_rect(&mut self, id: ItemId) -> Rectangle<i32, Logical> {
        let mut rv: Option<Rectangle<i32, Logical>> = None;
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let Some(item) = self.item(id) else {
                continue;
            };
            let size = item.size;
            let children = item.children.clone();
            if size.w > 0. && size.h > 0. {
                let rect = self.map_rect_to_scene(id, Rectangle::from_size(size));
                rv = Some(rv.map_or(rect, |r| r.merge(rect)));
            }
            stack.extend(children);
        }
        rv.unwrap_or_default()
    }

    // Repaints.

    /// Schedules a repaint of a region given in item coordinates.
    pub fn schedule_repaint(&mut self, id: ItemId, region: &Region) {
        if !self.item(id).is_some_and(|i| i.effective_visible) {
            return;
        }
        let transform = self.item_to_scene(id);
        let global = Region::from_rects(
            region
                .rects()
                .iter()
                .map(|r| map_rect(transform, r.to_f64())),
        );

        for delegate in &mut self.delegates {
            let dirty = global.intersected_rect(delegate.viewport);
            if dirty.is_empty() {
                continue;
            }
            delegate.dirty.union(&dirty);
            if let Some(item) = self.items.get_mut(&id) {
                item.repaints
                    .entry(delegate.output)
                    .or_default()
                    .union(&dirty);
            }
        }
    }

    /// Schedules a repaint of a region given in scene coordinates.
    pub fn schedule_repaint_scene(&mut self, region: &Region) {
        for delegate in &mut self.delegates {
            let dirty = region.intersected_rect(delegate.viewport);
            delegate.dirty.union(&dirty);
        }
    }

    pub fn schedule_repaint_all(&mut self) {
        for delegate in &mut self.delegates {
            delegate.dirty = Region::from_rect(delegate.viewport);
        }
    }

    fn schedule_subtree_repaint(&mut self, id: ItemId) {
        if !self.item(id).is_some_and(|i| i.effective_visible) {
            return;
        }
        let rect = self.subtree_scene_rect(id);
        if rect.is_empty() {
            return;
        }
        self.schedule_repaint_scene(&Region::from_rect(rect));
    }

    /// Records damage of an item's content and repaints it.
    pub fn add_damage(&mut self, id: ItemId, region: &Region) {
        if let Some(item) = self.items.get_mut(&id) {
            item.damage.union(region);
        }
        self.schedule_repaint(id, region);
        self.invalidate_node(id);
    }

    // Quads and render nodes.

    /// Quads of the item, built on first use and cached until the geometry changes.
    pub fn quads(&mut self, id: ItemId) -> WindowQuadList {
        let Some(item) = self.items.get_mut(&id) else {
            return WindowQuadList::new();
        };
        if let Some(quads) = &item.quads {
            return quads.clone();
        }
        let quads = match &item.kind {
            ItemKind::Surface(_) | ItemKind::Solid(_) => contents_quads(item.size),
            ItemKind::Decoration(borders) => decoration_quads(item.size, *borders),
            ItemKind::Container | ItemKind::Window(_) => WindowQuadList::new(),
        };
        item.quads = Some(quads.clone());
        quads
    }

    /// Drops the cached quads, e.g. when the subsurface tree changed.
    pub fn discard_quads(&mut self, id: ItemId) {
        if let Some(item) = self.items.get_mut(&id) {
            item.quads = None;
        }
        self.invalidate_node(id);
    }

    pub fn set_kind(&mut self, id: ItemId, kind: ItemKind) {
        if let Some(item) = self.items.get_mut(&id) {
            if item.kind != kind {
                item.kind = kind;
                item.quads = None;
            }
        }
        self.schedule_subtree_repaint(id);
        self.invalidate_node(id);
    }

    fn invalidate_node(&mut self, id: ItemId) {
        let mut current = Some(id);
        while let Some(id) = current {
            let Some(item) = self.items.get_mut(&id) else {
                break;
            };
            item.render_node = None;
            current = item.parent;
        }
    }

    /// Builds the render graph of a subtree, reusing cached nodes.
    ///
    /// Returns `None` for invisible items.
    pub fn update_node(&mut self, id: ItemId) -> Option<Rc<RenderNode>> {
        let item = self.item(id)?;
        if !item.effective_visible {
            return None;
        }
        if let Some(node) = &item.render_node {
            return Some(node.clone());
        }

        let has_content = item.kind.has_content();
        let children = item.sorted_children.clone();
        let transform = item.item_to_parent();
        let opacity = item.opacity;

        let mut nodes = Vec::with_capacity(children.len() + 1);
        if has_content {
            let quads = self.quads(id);
            nodes.push(Rc::new(RenderNode::Content { item: id, quads }));
        }
        for child in children {
            if let Some(node) = self.update_node(child) {
                nodes.push(node);
            }
        }

        let node = Rc::new(RenderNode::Transform {
            transform,
            opacity,
            child: Rc::new(RenderNode::Container { children: nodes }),
        });
        if let Some(item) = self.items.get_mut(&id) {
            item.render_node = Some(node.clone());
        }
        Some(node)
    }

    /// Topmost visible content item at a scene position.
    pub fn item_at(&mut self, point: Point<f64, Logical>) -> Option<ItemId> {
        self.topmost_at(self.root, point)
    }

    fn topmost_at(&mut self, id: ItemId, point: Point<f64, Logical>) -> Option<ItemId> {
        let item = self.item(id)?;
        if !item.effective_visible {
            return None;
        }
        let children: Vec<_> = item.sorted_children.iter().rev().copied().collect();
        let has_content = item.kind.has_content();
        let size = item.size;
        for child in children {
            if let Some(found) = self.topmost_at(child, point) {
                return Some(found);
            }
        }
        if has_content {
            let local = self.map_from_scene(id, point);
            if Rectangle::from_size(size).contains(local) {
                return Some(id);
            }
        }
        None
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

fn map_rect(transform: DAffine2, rect: Rectangle<f64, Logical>) -> Rectangle<i32, Logical> {
    let corners = [
        DVec2::new(rect.loc.x, rect.loc.y),
        DVec2::new(rect.loc.x + rect.size.w, rect.loc.y),
        DVec2::new(rect.loc.x, rect.loc.y + rect.size.h),
        DVec2::new(rect.loc.x + rect.size.w, rect.loc.y + rect.size.h),
    ]
    .map(|c| transform.transform_point2(c));

    let min = corners.iter().fold(DVec2::splat(f64::INFINITY), |a, c| a.min(*c));
    let max = corners
        .iter()
        .fold(DVec2::splat(f64::NEG_INFINITY), |a, c| a.max(*c));

    let loc = Point::from((min.x.floor() as i32, min.y.floor() as i32));
    let extremity = Point::from((max.x.ceil() as i32, max.y.ceil() as i32));
    Rectangle::from_extremities(loc, extremity)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Rectangle<i32, Logical> {
        Rectangle::new((x, y).into(), (w, h).into())
    }

    fn scene_with_output() -> (Scene, OutputId) {
        let mut scene = Scene::new();
        let output = OutputId::next();
        scene.add_delegate(output, rect(0, 0, 1000, 1000));
        scene.take_repaint(output);
        (scene, output)
    }

    #[test]
    fn move_repaints_old_and_new_area() {
        let (mut scene, output) = scene_with_output();
        let item = scene.create_item(ItemKind::Solid([1.; 4]), scene.root());
        scene.set_size(item, (10., 10.).into());
        scene.take_repaint(output);

        scene.set_position(item, (100., 0.).into());
        let dirty = scene.take_repaint(output);
        assert!(dirty.contains_rect(rect(0, 0, 10, 10)));
        assert!(dirty.contains_rect(rect(100, 0, 10, 10)));
        assert_eq!(dirty.area(), 200);
    }

    #[test]
    fn repaint_is_clipped_to_viewport() {
        let mut scene = Scene::new();
        let left = OutputId::next();
        let right = OutputId::next();
        scene.add_delegate(left, rect(0, 0, 100, 100));
        scene.add_delegate(right, rect(100, 0, 100, 100));
        scene.take_repaint(left);
        scene.take_repaint(right);

        let item = scene.create_item(ItemKind::Solid([1.; 4]), scene.root());
        scene.set_position(item, (90., 0.).into());
        scene.take_repaint(left);
        scene.take_repaint(right);
        scene.set_size(item, (20., 10.).into());

        assert_eq!(
            scene.take_repaint(left),
            Region::from_rect(rect(90, 0, 10, 10))
        );
        assert_eq!(
            scene.take_repaint(right),
            Region::from_rect(rect(100, 0, 10, 10))
        );
    }

    #[test]
    fn map_through_nested_transforms() {
        let mut scene = Scene::new();
        let parent = scene.create_item(ItemKind::Container, scene.root());
        scene.set_position(parent, (100., 50.).into());
        scene.set_transform(parent, DAffine2::from_scale(DVec2::splat(2.)));
        let child = scene.create_item(ItemKind::Container, parent);
        scene.set_position(child, (10., 10.).into());

        let p = scene.map_to_scene(child, (1., 1.).into());
        assert_relative_eq!(p.x, 122.);
        assert_relative_eq!(p.y, 72.);

        let back = scene.map_from_scene(child, p);
        assert_relative_eq!(back.x, 1.);
        assert_relative_eq!(back.y, 1.);

        // Moving the parent invalidates the cached child transform.
        scene.set_position(parent, (0., 0.).into());
        let p = scene.map_to_scene(child, (0., 0.).into());
        assert_relative_eq!(p.x, 20.);
    }

    #[test]
    fn children_sort_stably_by_z() {
        let mut scene = Scene::new();
        let root = scene.root();
        let a = scene.create_item(ItemKind::Container, root);
        let b = scene.create_item(ItemKind::Container, root);
        let c = scene.create_item(ItemKind::Container, root);
        assert_eq!(scene.item(root).unwrap().sorted_children(), [a, b, c]);

        scene.set_z(a, 1);
        assert_eq!(scene.item(root).unwrap().sorted_children(), [b, c, a]);

        scene.set_z(c, 1);
        assert_eq!(scene.item(root).unwrap().sorted_children(), [b, a, c]);

        scene.stack_before(c, a);
        assert_eq!(scene.item(root).unwrap().sorted_children(), [b, c, a]);
    }

    #[test]
    fn visibility_composes_with_parent() {
        let (mut scene, output) = scene_with_output();
        let parent = scene.create_item(ItemKind::Container, scene.root());
        let child = scene.create_item(ItemKind::Solid([1.; 4]), parent);
        scene.set_size(child, (10., 10.).into());
        scene.take_repaint(output);

        scene.set_visible(parent, false);
        assert!(!scene.item(child).unwrap().is_visible());
        assert!(scene.item(child).unwrap().is_explicitly_visible());
        assert_eq!(
            scene.take_repaint(output),
            Region::from_rect(rect(0, 0, 10, 10))
        );
        assert!(scene.update_node(parent).is_none());

        scene.set_visible(parent, true);
        assert!(scene.item(child).unwrap().is_visible());
        assert!(!scene.take_repaint(output).is_empty());
    }

    #[test]
    fn render_node_is_cached_until_invalidated() {
        let mut scene = Scene::new();
        let root = scene.root();
        let a = scene.create_item(ItemKind::Solid([1.; 4]), root);
        scene.set_size(a, (10., 10.).into());
        let b = scene.create_item(ItemKind::Solid([0.; 4]), root);
        scene.set_size(b, (5., 5.).into());

        let first = scene.update_node(root).unwrap();
        let second = scene.update_node(root).unwrap();
        assert!(Rc::ptr_eq(&first, &second));

        let b_node = scene.update_node(b).unwrap();
        scene.set_opacity(a, 0.5);
        let third = scene.update_node(root).unwrap();
        assert!(!Rc::ptr_eq(&first, &third));
        // The untouched sibling keeps its cached node.
        assert!(Rc::ptr_eq(&b_node, &scene.update_node(b).unwrap()));

        let flat = third.flatten();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].item, a);
        assert_relative_eq!(flat[0].opacity, 0.5);
    }

    #[test]
    fn destroying_an_item_repaints_and_removes_subtree() {
        let (mut scene, output) = scene_with_output();
        let parent = scene.create_item(ItemKind::Container, scene.root());
        let child = scene.create_item(ItemKind::Solid([1.; 4]), parent);
        scene.set_size(child, (10., 10.).into());
        scene.take_repaint(output);

        scene.destroy_item(parent);
        assert!(scene.item(child).is_none());
        assert_eq!(
            scene.take_repaint(output),
            Region::from_rect(rect(0, 0, 10, 10))
        );
        assert!(scene.is_empty());
    }

    #[test]
    fn item_at_prefers_topmost() {
        let mut scene = Scene::new();
        let root = scene.root();
        let below = scene.create_item(ItemKind::Solid([1.; 4]), root);
        scene.set_size(below, (100., 100.).into());
        let above = scene.create_item(ItemKind::Solid([1.; 4]), root);
        scene.set_size(above, (10., 10.).into());

        assert_eq!(scene.item_at((5., 5.).into()), Some(above));
        assert_eq!(scene.item_at((50., 50.).into()), Some(below));
        assert_eq!(scene.item_at((500., 50.).into()), None);
    }
}
