//! Turning the scene into frames.
//!
//! Every window gets a window item under the scene root with its decoration and surface tree as
//! children. A frame of an output runs the effect chains over the visible windows bottom to top;
//! the [`FinalPaint`] end of the chains turns the window items into draw commands for the
//! renderer.

use std::collections::HashMap;
use std::time::Duration;

use glam::{DAffine2, DVec2};
use smithay::utils::{Buffer, Logical, Physical, Point, Rectangle, Size, Transform};

use crate::backend::graphics::DrawCommand;
use crate::backend::RenderBackend;
use crate::display::{ClientEvent, CommitInfo, Display, SurfaceId};
use crate::effects::paint::{
    EffectWindow, FinalPaint, PaintMask, ScreenPaintData, ScreenPrePaintData, WindowPaintData,
    WindowPrePaintData,
};
use crate::effects::Effects;
use crate::output::{Output, OutputId};
use crate::scene::item::{ItemId, ItemKind};
use crate::scene::Scene;
use crate::texture::buffer::{BufferStore, SyncPoint};
use crate::utils::region::Region;
use crate::window::{Layer, Window, WindowId};
use crate::workspace::Workspace;

pub const DECORATION_COLOR: [f32; 4] = [0.2, 0.2, 0.22, 1.];
pub const DECORATION_DIMMED_COLOR: [f32; 4] = [0.35, 0.35, 0.37, 1.];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RedrawState {
    #[default]
    Idle,
    Queued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderResult {
    Rendered,
    /// Nothing changed on the output.
    Skipped,
    Failed,
}

#[derive(Debug, Default)]
struct OutputState {
    redraw_state: RedrawState,
    /// Number of frames presented so far.
    sequence: u64,
}

/// DRM syncobj timelines as far as the compositor knows them.
#[derive(Debug, Default)]
pub struct ExplicitSync {
    enabled: bool,
    /// Highest signaled point per timeline.
    timelines: HashMap<u32, u64>,
    /// Surfaces whose committed buffer can't be used before the point is signaled.
    waiting: HashMap<SurfaceId, SyncPoint>,
    /// Release points of the buffers currently in use.
    releases: HashMap<SurfaceId, SyncPoint>,
}

impl ExplicitSync {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_signaled(&self, point: SyncPoint) -> bool {
        self.timelines
            .get(&point.timeline)
            .is_some_and(|signaled| *signaled >= point.point)
    }

    /// Records a signaled point, returning the surfaces it unblocked.
    pub fn signal(&mut self, point: SyncPoint) -> Vec<SurfaceId> {
        let value = self.timelines.entry(point.timeline).or_insert(0);
        *value = (*value).max(point.point);

        let mut ready: Vec<_> = self
            .waiting
            .iter()
            .filter(|(_, p)| self.is_signaled(**p))
            .map(|(s, _)| *s)
            .collect();
        ready.sort();
        for surface in &ready {
            self.waiting.remove(surface);
        }
        ready
    }

    fn wait(&mut self, surface: SurfaceId, point: SyncPoint) {
        self.waiting.insert(surface, point);
    }

    /// Swaps in the release point of a newly used buffer, signaling the one it replaces.
    fn replace_release(&mut self, surface: SurfaceId, point: Option<SyncPoint>) {
        let old = match point {
            Some(point) => self.releases.insert(surface, point),
            None => self.releases.remove(&surface),
        };
        if let Some(old) = old.filter(|old| Some(*old) != point) {
            trace!("releasing buffer of {surface:?} at {old:?}");
            self.signal(old);
        }
    }

    fn forget(&mut self, surface: SurfaceId) {
        self.waiting.remove(&surface);
        if let Some(point) = self.releases.remove(&surface) {
            self.signal(point);
        }
    }
}

#[derive(Debug, Default)]
struct PresentationFeedback {
    /// Requested for the next commit.
    pending: u32,
    /// Waiting for the committed content to be presented.
    queued: u32,
}

/// Closed window painted for an effect.
#[derive(Debug)]
struct ClosedWindow {
    window: EffectWindow,
    item: ItemId,
    layer: Layer,
}

pub struct Compositor {
    outputs: HashMap<OutputId, OutputState>,
    surface_items: HashMap<SurfaceId, ItemId>,
    feedback: HashMap<SurfaceId, PresentationFeedback>,
    pub explicit_sync: ExplicitSync,
    closed: Vec<ClosedWindow>,
}

/// Everything a frame is made from.
pub struct FrameContext<'a> {
    pub scene: &'a mut Scene,
    pub display: &'a mut Display,
    pub workspace: &'a Workspace,
    pub effects: &'a mut Effects,
    pub renderer: &'a mut dyn RenderBackend,
}

impl Compositor {
    pub fn new(explicit_sync: bool) -> Self {
        Self {
            outputs: HashMap::new(),
            surface_items: HashMap::new(),
            feedback: HashMap::new(),
            explicit_sync: ExplicitSync::new(explicit_sync),
            closed: Vec::new(),
        }
    }

    pub fn add_output(&mut self, output: OutputId) {
        self.outputs.insert(
            output,
            OutputState {
                redraw_state: RedrawState::Queued,
                sequence: 0,
            },
        );
    }

    pub fn remove_output(&mut self, output: OutputId) {
        self.outputs.remove(&output);
    }

    pub fn queue_redraw(&mut self, output: OutputId) {
        if let Some(state) = self.outputs.get_mut(&output) {
            state.redraw_state = RedrawState::Queued;
        }
    }

    pub fn queue_redraw_all(&mut self) {
        for state in self.outputs.values_mut() {
            state.redraw_state = RedrawState::Queued;
        }
    }

    pub fn redraw_state(&self, output: OutputId) -> RedrawState {
        self.outputs
            .get(&output)
            .map_or(RedrawState::Idle, |s| s.redraw_state)
    }

    /// Outputs with a queued redraw, clearing the queue.
    pub fn take_queued(&mut self) -> Vec<OutputId> {
        let mut rv: Vec<_> = self
            .outputs
            .iter_mut()
            .filter(|(_, s)| s.redraw_state == RedrawState::Queued)
            .map(|(id, s)| {
                s.redraw_state = RedrawState::Idle;
                *id
            })
            .collect();
        rv.sort();
        rv
    }

    pub fn surface_item(&self, surface: SurfaceId) -> Option<ItemId> {
        self.surface_items.get(&surface).copied()
    }

    pub fn has_closed_windows(&self) -> bool {
        !self.closed.is_empty()
    }

    /// Brings the scene items of a window up to date with the window.
    pub fn sync_window(
        &mut self,
        scene: &mut Scene,
        display: &Display,
        window: &mut Window,
        visible: bool,
    ) {
        let root = scene.root();
        let item = *window
            .item
            .get_or_insert_with(|| scene.create_item(ItemKind::Window(window.id), root));

        let frame = window.frame_geometry();
        scene.set_position(item, frame.loc.to_f64());
        scene.set_size(item, frame.size.to_f64());
        scene.set_z(item, window.stacking_index as i32);
        scene.set_opacity(item, window.opacity);
        scene.set_visible(item, visible && window.ready_for_painting);

        let children = scene
            .item(item)
            .map(|i| i.children().to_vec())
            .unwrap_or_default();

        let decoration = children.iter().copied().find(|c| {
            scene
                .item(*c)
                .is_some_and(|i| matches!(i.kind, ItemKind::Decoration(_)))
        });
        match (&window.decoration, decoration) {
            (Some(deco), Some(id)) => {
                scene.set_kind(id, ItemKind::Decoration(deco.borders));
                scene.set_size(id, frame.size.to_f64());
            }
            (Some(deco), None) => {
                let id = scene.create_item(ItemKind::Decoration(deco.borders), item);
                scene.set_z(id, -1);
                scene.set_size(id, frame.size.to_f64());
            }
            (None, Some(id)) => scene.destroy_item(id),
            (None, None) => (),
        }

        let tree = window
            .surface
            .filter(|s| display.surface_exists(*s))
            .map(|s| display.surface_tree(s))
            .unwrap_or_default();

        for child in children {
            let Some(ItemKind::Surface(surface)) = scene.item(child).map(|i| i.kind.clone())
            else {
                continue;
            };
            if !tree.contains(&surface) {
                self.surface_items.remove(&surface);
                scene.destroy_item(child);
            }
        }

        let buffer_offset = window.buffer_geometry().loc - frame.loc;
        for (z, surface) in tree.iter().copied().enumerate() {
            let id = match self.surface_items.get(&surface) {
                Some(id) if scene.item(*id).is_some() => *id,
                _ => {
                    let id = scene.create_item(ItemKind::Surface(surface), item);
                    self.surface_items.insert(surface, id);
                    id
                }
            };
            let offset = buffer_offset + display.offset_in_root(surface);
            let size = display
                .surface(surface)
                .map_or(Size::from((0, 0)), |s| s.size);
            scene.set_position(id, offset.to_f64());
            scene.set_size(id, size.to_f64());
            scene.set_z(id, z as i32);
        }
    }

    /// Updates the texture of a committed surface.
    ///
    /// With explicit sync, a buffer whose acquire point isn't signaled yet is imported once
    /// [`Compositor::signal_sync_point`] signals it.
    pub fn surface_committed(
        &mut self,
        ctx: &mut FrameContext<'_>,
        buffers: &BufferStore,
        surface: SurfaceId,
        info: CommitInfo,
    ) {
        let _span = tracy_client::span!("Compositor::surface_committed");

        if let Some(feedback) = self.feedback.get_mut(&surface) {
            if feedback.queued > 0 {
                ctx.display
                    .send_to_surface(surface, ClientEvent::Discarded { surface });
            }
            feedback.queued = std::mem::take(&mut feedback.pending);
        }

        let acquire = ctx.display.surface(surface).and_then(|s| s.acquire_point);
        if let Some(acquire) = acquire.filter(|_| self.explicit_sync.is_enabled()) {
            if !self.explicit_sync.is_signaled(acquire) {
                trace!("{surface:?} waits for {acquire:?}");
                self.explicit_sync.wait(surface, acquire);
                return;
            }
        }
        self.import_surface(ctx, buffers, surface, info.buffer_changed);
    }

    /// Imports the buffers of surfaces whose acquire point got signaled.
    pub fn signal_sync_point(
        &mut self,
        ctx: &mut FrameContext<'_>,
        buffers: &BufferStore,
        point: SyncPoint,
    ) {
        for surface in self.explicit_sync.signal(point) {
            self.import_surface(ctx, buffers, surface, true);
        }
    }

    fn import_surface(
        &mut self,
        ctx: &mut FrameContext<'_>,
        buffers: &BufferStore,
        surface: SurfaceId,
        buffer_changed: bool,
    ) {
        let Some(state) = ctx.display.surface(surface) else {
            return;
        };
        let damage = state.damage.clone();
        let buffer = state.buffer;
        let size = state.size;
        let scale = state.buffer_scale.max(1);
        let release = state.release_point;

        if buffer_changed && self.explicit_sync.is_enabled() {
            self.explicit_sync.replace_release(surface, release);
        }

        let Some(id) = self.surface_item(surface) else {
            return;
        };
        ctx.scene.set_size(id, size.to_f64());

        match buffer.and_then(|b| buffers.get(b)) {
            Some(buffer) => {
                let buffer_damage: Vec<Rectangle<i32, Buffer>> = damage
                    .rects()
                    .iter()
                    .map(|r| r.to_buffer(scale, Transform::Normal, &size))
                    .collect();
                let mut texture = ctx.scene.item_mut(id).and_then(|i| i.texture.take());
                if let Err(err) = ctx
                    .renderer
                    .update_texture(&mut texture, buffer, &buffer_damage)
                {
                    warn!("error importing buffer of {surface:?}: {err}");
                    ctx.renderer.release_texture(texture.take());
                }
                if let Some(item) = ctx.scene.item_mut(id) {
                    item.texture = texture;
                }
            }
            None if buffer_changed => {
                let texture = ctx.scene.item_mut(id).and_then(|i| i.texture.take());
                ctx.renderer.release_texture(texture);
            }
            None => (),
        }

        let damage = if buffer_changed && damage.is_empty() {
            Region::from_rect(Rectangle::from_size(size))
        } else {
            damage
        };
        ctx.scene.add_damage(id, &damage);
    }

    /// Requests a `presented` event for the next commit of the surface.
    pub fn request_presentation_feedback(&mut self, surface: SurfaceId) {
        self.feedback.entry(surface).or_default().pending += 1;
    }

    pub fn surface_destroyed(
        &mut self,
        scene: &mut Scene,
        renderer: &mut dyn RenderBackend,
        surface: SurfaceId,
    ) {
        self.explicit_sync.forget(surface);
        self.feedback.remove(&surface);
        if let Some(id) = self.surface_items.remove(&surface) {
            let texture = scene.item_mut(id).and_then(|i| i.texture.take());
            renderer.release_texture(texture);
            scene.destroy_item(id);
        }
    }

    /// Handles a window that was removed from the workspace.
    ///
    /// Returns whether an effect keeps painting it.
    pub fn window_closed(
        &mut self,
        scene: &mut Scene,
        workspace: &mut Workspace,
        effects: &mut Effects,
        window: &Window,
    ) -> bool {
        let mut effect_window = EffectWindow::new(window);
        effect_window.deleted = true;
        let keep = effects.window_closed(&effect_window);

        // The surfaces go away with the window while its item keeps their last textures.
        if let Some(item) = window.item {
            self.surface_items
                .retain(|_, i| scene.item(*i).and_then(|i| i.parent()) != Some(item));
        }

        match window.item {
            Some(item) if keep => {
                debug!("keeping {:?} painted for a close effect", window.id);
                let layer = workspace
                    .deleted(window.id)
                    .map_or(Layer::Normal, |d| d.layer);
                self.closed.push(ClosedWindow {
                    window: effect_window,
                    item,
                    layer,
                });
            }
            Some(item) => {
                scene.destroy_item(item);
                workspace.unref_deleted(window.id);
            }
            None => {
                workspace.unref_deleted(window.id);
            }
        }
        keep
    }

    /// Drops closed windows that no effect paints anymore.
    pub fn release_closed(
        &mut self,
        scene: &mut Scene,
        workspace: &mut Workspace,
        effects: &Effects,
    ) {
        self.closed.retain(|closed| {
            if effects.references_window(closed.window.id) {
                return true;
            }
            trace!("releasing closed window {:?}", closed.window.id);
            scene.destroy_item(closed.item);
            workspace.unref_deleted(closed.window.id);
            false
        });
    }

    /// Windows to paint on the output bottom to top, closed ones on top of their layer.
    fn paint_list(
        &self,
        scene: &Scene,
        workspace: &Workspace,
        output: &Output,
    ) -> Vec<(EffectWindow, ItemId)> {
        let mut closed: Vec<_> = self
            .closed
            .iter()
            .filter(|c| c.window.frame.overlaps(output.geometry))
            .collect();
        let mut rv = Vec::new();

        for id in workspace.stacking_order() {
            let Some(window) = workspace.window(*id) else {
                continue;
            };
            let layer = workspace.window_layer(*id);
            closed.retain(|c| {
                if c.layer < layer {
                    rv.push((c.window.clone(), c.item));
                    false
                } else {
                    true
                }
            });

            let Some(item) = window.item else {
                continue;
            };
            let visible = scene.item(item).is_some_and(|i| i.is_visible());
            if !visible || !window.frame_geometry().overlaps(output.geometry) {
                continue;
            }
            rv.push((EffectWindow::new(window), item));
        }
        rv.extend(closed.into_iter().map(|c| (c.window.clone(), c.item)));
        rv
    }

    /// Renders a frame of the output if anything on it changed.
    pub fn render_output(&mut self, ctx: &mut FrameContext<'_>, output: &Output) -> RenderResult {
        let _span = tracy_client::span!("Compositor::render_output");

        match ctx.renderer.check_reset() {
            Ok(false) => (),
            Ok(true) => {
                // Textures were lost with the old context.
                warn!("renderer was reset, repainting everything");
                ctx.scene.schedule_repaint_all();
            }
            Err(err) => {
                error!("renderer is unusable: {err}");
                return RenderResult::Failed;
            }
        }

        let present_time = ctx.effects.clock().now();
        let viewport = output.geometry;
        ctx.effects.start_paint();

        let windows = self.paint_list(ctx.scene, ctx.workspace, output);
        let mut sink = SceneSink {
            output,
            current_item: None,
            screen_region: Region::new(),
            window_data: None,
            commands: Vec::new(),
            drawn_surfaces: Vec::new(),
            scene: &mut *ctx.scene,
            workspace: ctx.workspace,
        };

        let dirty = sink.scene.take_repaint(output.id);
        let mut screen = ScreenPrePaintData {
            output: output.id,
            mask: PaintMask::SCREEN_REGION,
            paint: dirty,
        };
        ctx.effects
            .pre_paint_screen(&mut sink, &mut screen, present_time);

        let mut prepainted = Vec::with_capacity(windows.len());
        for (window, item) in windows {
            let mut data = WindowPrePaintData {
                mask: if window.opacity >= 1. {
                    PaintMask::WINDOW_OPAQUE
                } else {
                    PaintMask::WINDOW_TRANSLUCENT
                },
                paint: Region::new(),
                opaque: Region::new(),
            };
            ctx.effects
                .pre_paint_window(&mut sink, &window, &mut data, present_time);
            screen.paint.union(&data.paint);
            prepainted.push((window, item, data.mask));
        }

        let damage = screen.paint.intersected_rect(viewport);
        if damage.is_empty() {
            for (window, _, _) in &prepainted {
                ctx.effects.post_paint_window(&mut sink, window);
            }
            ctx.effects.post_paint_screen(&mut sink);
            return RenderResult::Skipped;
        }

        let full = Region::from_rect(viewport);
        let age = ctx.renderer.buffer_age(output.id);
        let repaint = match sink.scene.delegate_mut(output.id) {
            Some(delegate) => {
                let repaint = damage.united(&delegate.journal.accumulate(age, &full));
                delegate.journal.add(damage);
                repaint
            }
            None => full,
        };

        let mut paint = ScreenPaintData {
            output: output.id,
            mask: screen.mask,
            region: repaint.clone(),
        };
        ctx.effects.paint_screen(&mut sink, &mut paint);

        for (window, item, mask) in &prepainted {
            sink.current_item = Some(*item);
            let region = sink.screen_region.clone();
            let mut data = WindowPaintData::default();
            ctx.effects
                .paint_window(&mut sink, window, *mask, &region, &mut data);
            let Some(mut data) = sink.window_data.take() else {
                // An effect stopped the chain.
                continue;
            };
            ctx.effects
                .draw_window(&mut sink, window, *mask, &region, &mut data);
        }
        for (window, _, _) in &prepainted {
            ctx.effects.post_paint_window(&mut sink, window);
        }
        ctx.effects.post_paint_screen(&mut sink);

        let commands = std::mem::take(&mut sink.commands);
        let drawn = std::mem::take(&mut sink.drawn_surfaces);
        let scissor: Vec<_> = repaint
            .rects()
            .iter()
            .map(|r| to_physical(*r, output))
            .collect();

        if let Err(err) = ctx.renderer.render(output, &commands, &scissor) {
            warn!("error rendering output {}: {err}", output.name);
            if let Some(delegate) = ctx.scene.delegate_mut(output.id) {
                delegate.journal.clear();
            }
            ctx.scene.schedule_repaint_all();
            return RenderResult::Failed;
        }

        let state = self.outputs.entry(output.id).or_default();
        state.sequence += 1;
        let sequence = state.sequence;
        self.frame_presented(ctx.display, output, &drawn, present_time, sequence);
        RenderResult::Rendered
    }

    /// Sends frame callbacks and presentation feedback to the surfaces drawn in the frame.
    fn frame_presented(
        &mut self,
        display: &mut Display,
        output: &Output,
        surfaces: &[SurfaceId],
        time: Duration,
        sequence: u64,
    ) {
        let msec = time.as_millis() as u32;
        display.send_frame_callbacks(surfaces, msec);

        let refresh_ns = output.refresh_interval().as_nanos() as u32;
        for surface in surfaces {
            let Some(feedback) = self.feedback.get_mut(surface) else {
                continue;
            };
            for _ in 0..std::mem::take(&mut feedback.queued) {
                display.send_to_surface(
                    *surface,
                    ClientEvent::Presented {
                        surface: *surface,
                        output: output.id,
                        time: msec,
                        refresh_ns,
                        seq: sequence,
                    },
                );
            }
        }
    }

    /// Collects the GPU times of finished frames.
    pub fn poll_frames(&mut self, renderer: &mut dyn RenderBackend) {
        let mut ids: Vec<_> = self.outputs.keys().copied().collect();
        ids.sort();
        for output in ids {
            if let Some(time) = renderer.poll_frame(output) {
                trace!("frame of {output:?} took {time:?} on the GPU");
            }
        }
    }
}

/// End of the paint chains.
struct SceneSink<'a> {
    scene: &'a mut Scene,
    workspace: &'a Workspace,
    output: &'a Output,
    current_item: Option<ItemId>,
    screen_region: Region,
    /// Paint data the window chain handed over.
    window_data: Option<WindowPaintData>,
    commands: Vec<DrawCommand>,
    drawn_surfaces: Vec<SurfaceId>,
}

impl FinalPaint for SceneSink<'_> {
    fn final_paint_screen(&mut self, data: &mut ScreenPaintData) {
        self.screen_region = data.region.clone();
    }

    fn final_paint_window(
        &mut self,
        _window: &EffectWindow,
        _mask: PaintMask,
        _region: &Region,
        data: &mut WindowPaintData,
    ) {
        self.window_data = Some(*data);
    }

    fn final_draw_window(
        &mut self,
        window: &EffectWindow,
        _mask: PaintMask,
        region: &Region,
        data: &mut WindowPaintData,
    ) {
        let Some(item) = self.current_item else {
            return;
        };
        if !data.is_transformed() && !region.intersects_rect(window.frame) {
            return;
        }
        let Some(node) = self.scene.update_node(item) else {
            return;
        };

        let dimmed = self
            .workspace
            .window(window.id)
            .and_then(|w| w.decoration.as_ref())
            .is_some_and(|d| d.dimmed);

        // Effect transforms apply around the window origin.
        let origin = DVec2::new(f64::from(window.frame.loc.x), f64::from(window.frame.loc.y));
        let effect = DAffine2::from_translation(origin + data.translation.truncate())
            * DAffine2::from_scale(data.scale.truncate())
            * DAffine2::from_translation(-origin);

        for content in node.flatten() {
            let Some(item) = self.scene.item(content.item) else {
                continue;
            };
            let (textures, color, flip_y) = match (&item.kind, &item.texture) {
                (ItemKind::Decoration(_), _) => {
                    let color = if dimmed {
                        DECORATION_DIMMED_COLOR
                    } else {
                        DECORATION_COLOR
                    };
                    (Vec::new(), Some(color), false)
                }
                (ItemKind::Solid(color), _) => (Vec::new(), Some(*color), false),
                (ItemKind::Surface(surface), Some(texture)) => {
                    self.drawn_surfaces.push(*surface);
                    let planes = texture.planes();
                    let flip_y = planes.first().is_some_and(|p| p.flip_y);
                    let names = planes.iter().map(|p| p.name).collect();
                    (names, texture.color(), flip_y)
                }
                // Nothing imported, e.g. after a failed import.
                (ItemKind::Surface(_), None) => continue,
                (ItemKind::Container | ItemKind::Window(_), _) => continue,
            };

            let transform = effect * content.transform;
            for quad in content.quads.iter() {
                let rect = map_rect(transform, quad.geometry);
                self.commands.push(DrawCommand {
                    textures: textures.clone(),
                    color,
                    geometry: to_physical(rect, self.output),
                    opacity: (content.opacity * data.opacity) as f32,
                    brightness: data.brightness as f32,
                    flip_y,
                });
            }
        }
    }
}

/// Bounding box of a rectangle after an affine transform.
fn map_rect(transform: DAffine2, rect: Rectangle<f64, Logical>) -> Rectangle<i32, Logical> {
    let corners = [
        DVec2::new(rect.loc.x, rect.loc.y),
        DVec2::new(rect.loc.x + rect.size.w, rect.loc.y),
        DVec2::new(rect.loc.x, rect.loc.y + rect.size.h),
        DVec2::new(rect.loc.x + rect.size.w, rect.loc.y + rect.size.h),
    ]
    .map(|p| transform.transform_point2(p));

    let min = corners.iter().fold(DVec2::splat(f64::MAX), |a, b| a.min(*b));
    let max = corners.iter().fold(DVec2::splat(f64::MIN), |a, b| a.max(*b));
    let loc = Point::from((min.x.round() as i32, min.y.round() as i32));
    let size = Size::from((
        (max.x - min.x).round() as i32,
        (max.y - min.y).round() as i32,
    ));
    Rectangle::new(loc, size)
}

/// Converts a rectangle in global coordinates to physical pixels of the output.
fn to_physical(rect: Rectangle<i32, Logical>, output: &Output) -> Rectangle<i32, Physical> {
    let local = Rectangle::new(rect.loc - output.geometry.loc, rect.size);
    local.to_f64().to_physical(output.scale).to_i32_round()
}

#[cfg(test)]
mod tests {
    use smithay::backend::allocator::Fourcc;

    use super::*;
    use crate::backend::graphics::RecordedFrame;
    use crate::backend::software::SoftwareBackend;
    use crate::effects::fade;
    use crate::texture::buffer::{BufferId, BufferKind, ShmAttributes};
    use crate::utils::clock::Clock;
    use crate::window::decoration::Decoration;
    use crate::window::WindowKind;
    use crate::workspace::tests::workspace;

    struct Harness {
        clock: Clock,
        scene: Scene,
        display: Display,
        workspace: Workspace,
        effects: Effects,
        renderer: SoftwareBackend,
        buffers: BufferStore,
        compositor: Compositor,
        output: Output,
    }

    impl Harness {
        fn new() -> Self {
            let clock = Clock::with_time(Duration::from_secs(1));
            let output = Output::new(
                String::from("headless-1"),
                Size::from((800, 600)),
                1.,
                Point::from((0, 0)),
            );
            let mut scene = Scene::new();
            scene.add_delegate(output.id, output.geometry);
            let mut renderer = SoftwareBackend::new();
            renderer.add_output(&output).unwrap();
            let mut compositor = Compositor::new(true);
            compositor.add_output(output.id);
            Self {
                effects: Effects::new(clock.clone()),
                clock,
                scene,
                display: Display::new(),
                workspace: workspace(),
                renderer,
                buffers: BufferStore::new(),
                compositor,
                output,
            }
        }

        fn split(&mut self) -> (&mut Compositor, &BufferStore, FrameContext<'_>) {
            let ctx = FrameContext {
                scene: &mut self.scene,
                display: &mut self.display,
                workspace: &self.workspace,
                effects: &mut self.effects,
                renderer: &mut self.renderer,
            };
            (&mut self.compositor, &self.buffers, ctx)
        }

        fn render(&mut self) -> RenderResult {
            let output = self.output.clone();
            let (compositor, _, mut ctx) = self.split();
            compositor.render_output(&mut ctx, &output)
        }

        fn commit(&mut self, surface: SurfaceId, info: CommitInfo) {
            let (compositor, buffers, mut ctx) = self.split();
            compositor.surface_committed(&mut ctx, buffers, surface, info);
        }

        fn shm_buffer(&mut self, surface: SurfaceId, format: Fourcc) -> BufferId {
            let client = self.display.surface_client(surface);
            self.buffers.create(
                client,
                BufferKind::Shm(ShmAttributes {
                    format,
                    width: 100,
                    height: 100,
                    stride: 400,
                }),
            )
        }

        /// Maps a window with a 100x100 buffer at the given position.
        fn map_window(&mut self, x: i32, y: i32) -> (WindowId, SurfaceId) {
            let client = self.display.create_client(None);
            let surface = self.display.create_surface(client).unwrap();
            let buffer = self.shm_buffer(surface, Fourcc::Argb8888);
            self.display.attach(surface, Some(buffer));
            self.display.request_frame(surface);
            let info = self
                .display
                .commit(surface, |_| Some(Size::from((100, 100))))
                .unwrap();

            let mut window = Window::new(WindowKind::WaylandToplevel);
            window.surface = Some(surface);
            window.ready_for_painting = true;
            window.set_buffer_size(Size::from((100, 100)));
            window.set_frame_geometry(Rectangle::new((x, y).into(), (100, 100).into()));
            let id = self.workspace.add_window(window);
            self.sync(id);
            self.commit(surface, info);
            (id, surface)
        }

        fn sync(&mut self, id: WindowId) {
            let window = self.workspace.window_mut(id).unwrap();
            self.compositor
                .sync_window(&mut self.scene, &self.display, window, true);
        }

        fn last_frame(&self) -> &RecordedFrame {
            self.renderer.frames.last().unwrap()
        }
    }

    #[test]
    fn renders_window_and_skips_unchanged_frames() {
        let mut h = Harness::new();
        let (_, surface) = h.map_window(10, 20);

        assert_eq!(h.render(), RenderResult::Rendered);
        let frame = h.last_frame();
        assert_eq!(frame.commands.len(), 1);
        assert_eq!(
            frame.commands[0].geometry,
            Rectangle::new((10, 20).into(), (100, 100).into())
        );
        // Nothing is known about the first buffer.
        assert_eq!(
            frame.scissor,
            vec![Rectangle::new((0, 0).into(), (800, 600).into())]
        );
        let client = h.display.surface_client(surface).unwrap();
        assert!(h
            .display
            .events(client)
            .contains(&ClientEvent::FrameDone { surface, time: 1000 }));

        assert_eq!(h.render(), RenderResult::Skipped);
        assert_eq!(h.renderer.frames.len(), 1);
    }

    #[test]
    fn partial_repaint_uses_buffer_age() {
        let mut h = Harness::new();
        let (_, surface) = h.map_window(0, 0);
        h.render();

        h.display
            .damage(surface, Rectangle::new((0, 0).into(), (10, 10).into()));
        let info = h.display.commit(surface, |_| None).unwrap();
        h.commit(surface, info);
        assert_eq!(h.render(), RenderResult::Rendered);
        // The software renderer paints into one persistent image.
        assert_eq!(
            h.last_frame().scissor,
            vec![Rectangle::new((0, 0).into(), (10, 10).into())]
        );
    }

    #[test]
    fn decoration_is_drawn_below_the_surface() {
        let mut h = Harness::new();
        let (id, _) = h.map_window(50, 50);
        let window = h.workspace.window_mut(id).unwrap();
        let client = window.client_geometry();
        window.decoration = Some(Decoration::default());
        let frame = window.client_rect_to_frame_rect(client);
        window.set_frame_geometry(frame);
        h.sync(id);

        h.render();
        let commands = &h.last_frame().commands;
        assert!(commands.len() > 1);
        assert_eq!(commands[0].color, Some(DECORATION_COLOR));
        let last = commands.last().unwrap();
        assert!(last.color.is_none());
        assert_eq!(
            last.geometry,
            Rectangle::new((50, 50).into(), (100, 100).into())
        );
    }

    #[test]
    fn failed_import_hides_surface() {
        let mut h = Harness::new();
        let (_, surface) = h.map_window(0, 0);
        h.render();

        let bad = h.shm_buffer(surface, Fourcc::Nv12);
        h.display.attach(surface, Some(bad));
        let info = h
            .display
            .commit(surface, |_| Some(Size::from((100, 100))))
            .unwrap();
        h.commit(surface, info);

        assert_eq!(h.render(), RenderResult::Rendered);
        assert!(h.last_frame().commands.is_empty());
    }

    #[test]
    fn acquire_point_delays_import() {
        let mut h = Harness::new();
        let (_, surface) = h.map_window(0, 0);
        h.render();

        let point = SyncPoint {
            timeline: 7,
            point: 3,
        };
        h.display
            .damage(surface, Rectangle::new((0, 0).into(), (5, 5).into()));
        h.display.surface_mut(surface).unwrap().pending.acquire_point = Some(point);
        let info = h.display.commit(surface, |_| None).unwrap();
        h.commit(surface, info);
        assert_eq!(h.render(), RenderResult::Skipped);

        let unblocked = h.compositor.explicit_sync.signal(SyncPoint {
            timeline: 7,
            point: 2,
        });
        assert!(unblocked.is_empty());

        let (compositor, buffers, mut ctx) = h.split();
        compositor.signal_sync_point(&mut ctx, buffers, point);
        assert_eq!(h.render(), RenderResult::Rendered);
    }

    #[test]
    fn replaced_buffer_release_point_is_signaled() {
        let mut h = Harness::new();
        let (_, surface) = h.map_window(0, 0);

        let release = SyncPoint {
            timeline: 2,
            point: 1,
        };
        let next = h.shm_buffer(surface, Fourcc::Argb8888);
        h.display.attach(surface, Some(next));
        h.display.surface_mut(surface).unwrap().pending.release_point = Some(release);
        let info = h
            .display
            .commit(surface, |_| Some(Size::from((100, 100))))
            .unwrap();
        h.commit(surface, info);
        assert!(!h.compositor.explicit_sync.is_signaled(release));

        let last = h.shm_buffer(surface, Fourcc::Argb8888);
        h.display.attach(surface, Some(last));
        h.display.surface_mut(surface).unwrap().pending.release_point = Some(SyncPoint {
            timeline: 2,
            point: 2,
        });
        let info = h
            .display
            .commit(surface, |_| Some(Size::from((100, 100))))
            .unwrap();
        h.commit(surface, info);
        assert!(h.compositor.explicit_sync.is_signaled(release));
    }

    #[test]
    fn presentation_feedback_follows_commits() {
        let mut h = Harness::new();
        let (_, surface) = h.map_window(0, 0);
        let client = h.display.surface_client(surface).unwrap();
        h.render();
        h.display.take_events(client);

        h.compositor.request_presentation_feedback(surface);
        let info = h.display.commit(surface, |_| None).unwrap();
        h.commit(surface, info);
        h.compositor.request_presentation_feedback(surface);
        h.display
            .damage(surface, Rectangle::new((0, 0).into(), (1, 1).into()));
        let info = h.display.commit(surface, |_| None).unwrap();
        h.commit(surface, info);
        h.render();

        let events = h.display.take_events(client);
        assert!(events.contains(&ClientEvent::Discarded { surface }));
        let presented = events
            .iter()
            .filter(|e| matches!(e, ClientEvent::Presented { seq: 2, .. }))
            .count();
        assert_eq!(presented, 1);
    }

    #[test]
    fn closed_window_is_painted_while_fading() {
        let mut h = Harness::new();
        h.effects
            .load(fade::NAME, 60, Box::new(fade::Fade::new(h.clock.clone())));
        let (id, surface) = h.map_window(0, 0);
        h.render();

        let window = h.workspace.remove_window(id).unwrap();
        assert!(h.compositor.window_closed(
            &mut h.scene,
            &mut h.workspace,
            &mut h.effects,
            &window
        ));
        h.compositor
            .surface_destroyed(&mut h.scene, &mut h.renderer, surface);
        assert!(h.workspace.deleted(id).is_some());

        h.clock.advance(Duration::from_millis(75));
        assert_eq!(h.render(), RenderResult::Rendered);
        let command = &h.last_frame().commands[0];
        assert!(command.opacity > 0. && command.opacity < 1.);

        h.clock.advance(Duration::from_secs(1));
        h.render();
        h.compositor
            .release_closed(&mut h.scene, &mut h.workspace, &h.effects);
        assert!(!h.compositor.has_closed_windows());
        assert!(h.workspace.deleted(id).is_none());
    }

    #[test]
    fn rects_map_to_output_pixels() {
        let transform = DAffine2::from_translation(DVec2::new(10., 10.))
            * DAffine2::from_scale(DVec2::new(0.5, 0.5));
        let rect = map_rect(
            transform,
            Rectangle::new((0., 0.).into(), (100., 50.).into()),
        );
        assert_eq!(rect, Rectangle::new((10, 10).into(), (50, 25).into()));

        let output = Output::new(
            String::from("scaled"),
            Size::from((200, 200)),
            2.,
            Point::from((100, 0)),
        );
        let physical = to_physical(Rectangle::new((110, 10).into(), (10, 10).into()), &output);
        assert_eq!(physical, Rectangle::new((20, 20).into(), (20, 20).into()));
    }
}
