use std::rc::Rc;

use smithay::reexports::wayland_server::protocol::wl_buffer::WlBuffer;
use smithay::reexports::wayland_server::protocol::wl_surface::WlSurface;
use smithay::reexports::wayland_server::{Client, Resource};
use smithay::utils::{Logical, Rectangle};
use smithay::wayland::buffer::BufferHandler;
use smithay::wayland::compositor::{
    get_children, is_sync_subsurface, with_states, BufferAssignment,
    CompositorClientState, CompositorHandler, CompositorState, Damage, RectangleKind,
    RegionAttributes, SubsurfaceCachedState, SurfaceAttributes,
};
use smithay::wayland::shell::xdg::SurfaceCachedState;
use smithay::wayland::shm::{self, ShmHandler, ShmState};
use smithay::xwayland::XWaylandClientData;
use smithay::{delegate_compositor, delegate_shm};

use super::{client_id, ClientState, XdgCached};
use crate::display::{ClientId, SurfaceId};
use crate::strata::State;
use crate::texture::buffer::{BufferId, BufferKind, ShmAttributes, ShmContents};
use crate::utils::region::Region;

/// Pixels of a client's `wl_shm` buffer.
#[derive(Debug)]
struct WireShm(WlBuffer);

impl ShmContents for WireShm {
    fn with_pixels(&self, f: &mut dyn FnMut(&[u8])) -> bool {
        shm::with_buffer_contents(&self.0, |ptr, len, data| {
            let offset = usize::try_from(data.offset).unwrap_or(usize::MAX);
            if offset > len {
                return false;
            }
            // SAFETY: smithay keeps the pool mapped for the duration of the call and `len` is
            // the size of the mapping.
            let pixels = unsafe { std::slice::from_raw_parts(ptr.add(offset), len - offset) };
            f(pixels);
            true
        })
        .unwrap_or(false)
    }
}

/// Converts a `wl_region` into the compositor's region type.
pub fn region_from_attributes(attributes: &RegionAttributes) -> Region {
    let mut region = Region::new();
    for (kind, rect) in &attributes.rects {
        match kind {
            RectangleKind::Add => region.add_rect(*rect),
            RectangleKind::Subtract => region.subtract_rect(*rect),
        }
    }
    region
}

fn surface_damage(damage: &Damage, scale: i32) -> Rectangle<i32, Logical> {
    match damage {
        Damage::Surface(rect) => *rect,
        Damage::Buffer(rect) => {
            let scale = scale.max(1);
            let x = rect.loc.x.div_euclid(scale);
            let y = rect.loc.y.div_euclid(scale);
            let right = (rect.loc.x + rect.size.w + scale - 1).div_euclid(scale);
            let bottom = (rect.loc.y + rect.size.h + scale - 1).div_euclid(scale);
            Rectangle::new((x, y).into(), (right - x, bottom - y).into())
        }
    }
}

impl State {
    /// Creates the compositor buffer for a `wl_buffer` the first time it's attached.
    fn import_wl_buffer(&mut self, client: ClientId, buffer: &WlBuffer) -> Option<BufferId> {
        let strata = &mut self.strata;
        if let Some(id) = strata.frontend.buffers.get(&buffer.id()) {
            return Some(*id);
        }

        let attributes = shm::with_buffer_contents(buffer, |_, _, data| {
            shm::shm_format_to_fourcc(data.format).map(|format| ShmAttributes {
                format,
                width: data.width,
                height: data.height,
                stride: data.stride,
            })
        });
        let attributes = match attributes {
            Ok(Some(attributes)) => attributes,
            Ok(None) => {
                debug!("{client:?} attached a buffer with an unsupported shm format");
                return None;
            }
            Err(err) => {
                debug!("{client:?} attached a buffer that isn't shm: {err:?}");
                return None;
            }
        };

        let id = strata.create_buffer(client, BufferKind::Shm(attributes));
        strata.buffers.set_contents(id, Rc::new(WireShm(buffer.clone())));
        strata.frontend.buffers.insert(buffer.id(), id);
        strata.frontend.wl_buffers.insert(id, buffer.clone());
        Some(id)
    }

    /// Moves the committed smithay surface state into the compositor's surface and commits it.
    fn apply_commit(&mut self, wl_surface: &WlSurface, surface: SurfaceId) {
        let Some(client) = self.strata.display.surface_client(surface) else {
            return;
        };

        let (assignment, damage, callbacks, input, opaque, scale, subsurface) =
            with_states(wl_surface, |states| {
                let mut guard = states.cached_state.get::<SurfaceAttributes>();
                let attributes = guard.current();
                let subsurface = (states.role == Some("subsurface")).then(|| {
                    states
                        .cached_state
                        .get::<SubsurfaceCachedState>()
                        .current()
                        .location
                });
                (
                    attributes.buffer.take(),
                    std::mem::take(&mut attributes.damage),
                    std::mem::take(&mut attributes.frame_callbacks),
                    attributes.input_region.as_ref().map(region_from_attributes),
                    attributes.opaque_region.as_ref().map(region_from_attributes),
                    attributes.buffer_scale,
                    subsurface,
                )
            });

        let buffer = match assignment {
            Some(BufferAssignment::NewBuffer(wl_buffer)) => {
                Some(self.import_wl_buffer(client, &wl_buffer))
            }
            Some(BufferAssignment::Removed) => Some(None),
            None => None,
        };

        let strata = &mut self.strata;
        let count = callbacks.len();
        strata
            .frontend
            .frame_callbacks
            .entry(surface)
            .or_default()
            .extend(callbacks);

        let Some(state) = strata.display.surface_mut(surface) else {
            return;
        };
        state.buffer_scale = scale.max(1);
        if input.is_none() {
            state.input_region = None;
        }
        let pending = &mut state.pending;
        if let Some(buffer) = buffer {
            pending.buffer = Some(buffer);
        }
        for rect in &damage {
            pending.damage.add_rect(surface_damage(rect, scale));
        }
        pending.input_region = input;
        pending.opaque_region = Some(opaque.unwrap_or_default());
        if let Some(location) = subsurface {
            pending.subsurface_offset = Some(location);
        }
        for _ in 0..count {
            strata.display.request_frame(surface);
        }

        strata.commit(surface);
    }

    /// Commits the sync subsurfaces below a surface, deepest first.
    fn apply_sync_children(&mut self, wl_surface: &WlSurface) {
        for child in get_children(wl_surface) {
            if !is_sync_subsurface(&child) {
                continue;
            }
            self.apply_sync_children(&child);
            if let Some(id) = self.strata.frontend.surface_id(&child) {
                self.apply_commit(&child, id);
            }
        }
    }

    /// Forwards changed xdg_surface geometry and toplevel size limits.
    fn update_xdg_cached_state(&mut self, wl_surface: &WlSurface, surface: SurfaceId) {
        let cached = with_states(wl_surface, |states| {
            let mut guard = states.cached_state.get::<SurfaceCachedState>();
            let cached = guard.current();
            XdgCached {
                geometry: cached.geometry,
                min_size: cached.min_size,
                max_size: cached.max_size,
            }
        });

        let strata = &mut self.strata;
        let is_toplevel = strata.frontend.toplevels.contains_key(&surface);
        let last = strata
            .frontend
            .xdg_cached
            .insert(surface, cached)
            .unwrap_or_default();

        if let Some(geometry) = cached.geometry {
            if last.geometry != Some(geometry) {
                strata.set_window_geometry(surface, geometry);
            }
        }
        if is_toplevel && last.min_size != cached.min_size {
            strata.set_min_size(surface, cached.min_size);
        }
        if is_toplevel && last.max_size != cached.max_size {
            strata.set_max_size(surface, cached.max_size);
        }
    }
}

impl CompositorHandler for State {
    fn compositor_state(&mut self) -> &mut CompositorState {
        &mut self.strata.frontend.compositor_state
    }

    fn client_compositor_state<'a>(&self, client: &'a Client) -> &'a CompositorClientState {
        if let Some(data) = client.get_data::<XWaylandClientData>() {
            return &data.compositor_state;
        }
        match client.get_data::<ClientState>() {
            Some(data) => &data.compositor_state,
            None => unreachable!("every client is inserted with its state"),
        }
    }

    fn new_surface(&mut self, wl_surface: &WlSurface) {
        let Some(client) = wl_surface.client().as_ref().and_then(client_id) else {
            return;
        };
        if let Some(surface) = self.strata.new_surface(client) {
            self.strata.frontend.insert_surface(wl_surface, surface);
        }
    }

    fn new_subsurface(&mut self, wl_surface: &WlSurface, parent: &WlSurface) {
        let frontend = &self.strata.frontend;
        let (Some(surface), Some(parent_id)) = (frontend.surface_id(wl_surface), frontend.surface_id(parent)) else {
            return;
        };
        if let Err(err) = self.strata.display.set_subsurface(surface, parent_id) {
            if let Some(client) = self.strata.display.surface_client(surface) {
                self.strata.post_error(client, err);
            }
        }
    }

    fn commit(&mut self, wl_surface: &WlSurface) {
        let _span = tracy_client::span!("CompositorHandler::commit");

        if is_sync_subsurface(wl_surface) {
            return;
        }
        let Some(surface) = self.strata.frontend.surface_id(wl_surface) else {
            return;
        };

        self.update_xdg_cached_state(wl_surface, surface);
        self.apply_sync_children(wl_surface);
        self.apply_commit(wl_surface, surface);
    }

    fn destroyed(&mut self, wl_surface: &WlSurface) {
        let Some(surface) = self.strata.frontend.surface_id(wl_surface) else {
            return;
        };
        self.strata.frontend.forget_surface(surface);
        self.strata.destroy_surface(surface);
    }
}

impl BufferHandler for State {
    fn buffer_destroyed(&mut self, buffer: &WlBuffer) {
        let strata = &mut self.strata;
        if let Some(id) = strata.frontend.buffers.remove(&buffer.id()) {
            strata.frontend.wl_buffers.remove(&id);
            strata.destroy_buffer(id);
        }
    }
}

impl ShmHandler for State {
    fn shm_state(&self) -> &ShmState {
        &self.strata.frontend.shm_state
    }
}

delegate_compositor!(State);
delegate_shm!(State);

#[cfg(test)]
mod tests {
    use smithay::utils::Buffer;

    use super::*;

    #[test]
    fn subtracted_rects_cut_the_region() {
        let attributes = RegionAttributes {
            rects: vec![
                (RectangleKind::Add, Rectangle::from_size((100, 100).into())),
                (RectangleKind::Subtract, Rectangle::new((0, 0).into(), (50, 100).into())),
            ],
        };
        let region = region_from_attributes(&attributes);
        assert_eq!(region.area(), 50 * 100);
        assert!(!region.contains_point((10, 10).into()));
        assert!(region.contains_point((60, 10).into()));
    }

    #[test]
    fn buffer_damage_covers_scaled_pixels() {
        let damage = Damage::Buffer(Rectangle::<i32, Buffer>::new((3, 3).into(), (3, 3).into()));
        assert_eq!(
            surface_damage(&damage, 2),
            Rectangle::new((1, 1).into(), (2, 2).into())
        );

        let damage = Damage::Surface(Rectangle::new((3, 3).into(), (3, 3).into()));
        assert_eq!(
            surface_damage(&damage, 2),
            Rectangle::new((3, 3).into(), (3, 3).into())
        );
    }
}
