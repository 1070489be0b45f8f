use crate::compositor::FrameContext;
use crate::display::{ClientId, SurfaceId};
use crate::strata::Strata;
use crate::texture::buffer::{BufferId, BufferKind, SyncPoint};
use crate::window::{WindowId, WindowKind};

impl Strata {
    pub fn new_surface(&mut self, client: ClientId) -> Option<SurfaceId> {
        let surface = self.display.create_surface(client);
        if surface.is_none() {
            debug!("not creating a surface for disconnected {client:?}");
        }
        surface
    }

    pub fn create_buffer(&mut self, client: ClientId, kind: BufferKind) -> BufferId {
        self.buffers.create(Some(client), kind)
    }

    /// Handles `wl_buffer.destroy`.
    pub fn destroy_buffer(&mut self, buffer: BufferId) {
        self.renderer.buffer_destroyed(buffer);
        self.buffers.destroy(buffer);
    }

    /// Handles `wl_surface.commit`.
    pub fn commit(&mut self, surface: SurfaceId) {
        let _span = tracy_client::span!("Strata::commit");

        let Some(state) = self.display.surface(surface) else {
            return;
        };
        let old_buffer = state.buffer;
        let scale = state.buffer_scale;
        let buffers = &self.buffers;
        let Some(info) = self
            .display
            .commit(surface, |buffer| buffers.logical_size(buffer, scale))
        else {
            return;
        };

        if info.buffer_changed {
            let new_buffer = self.display.surface(surface).and_then(|s| s.buffer);
            if new_buffer != old_buffer {
                if let Some(new) = new_buffer {
                    self.buffers.add_ref(new);
                }
                if let Some(old) = old_buffer {
                    self.buffers.unref(old, &mut self.display);
                }
            }
        }

        let root = self.display.root_surface(surface);
        if root == surface {
            if self.unmapped_windows.contains_key(&surface) {
                self.unmapped_commit(surface, info);
            } else if let Some(&id) = self.surface_windows.get(&surface) {
                self.mapped_commit(id, info);
            }
        }

        // The scene items of the window have to exist before the buffer is imported.
        if let Some(&id) = self.surface_windows.get(&root) {
            self.sync_window(id);
        }

        let mut ctx = FrameContext {
            scene: &mut self.scene,
            display: &mut self.display,
            workspace: &self.workspace,
            effects: &mut self.effects,
            renderer: &mut *self.renderer,
        };
        self.compositor
            .surface_committed(&mut ctx, &self.buffers, surface, info);
    }

    /// Handles a signaled explicit sync acquire point.
    pub fn sync_point_signaled(&mut self, point: SyncPoint) {
        let mut ctx = FrameContext {
            scene: &mut self.scene,
            display: &mut self.display,
            workspace: &self.workspace,
            effects: &mut self.effects,
            renderer: &mut *self.renderer,
        };
        self.compositor
            .signal_sync_point(&mut ctx, &self.buffers, point);
    }

    /// Handles `wp_presentation.feedback`.
    pub fn presentation_feedback(&mut self, surface: SurfaceId) {
        self.compositor.request_presentation_feedback(surface);
    }

    pub(crate) fn sync_window(&mut self, id: WindowId) {
        let desktop = self.workspace.current_desktop();
        let Some(window) = self.workspace.window_mut(id) else {
            return;
        };
        let visible = window.is_shown() && window.is_on_desktop(desktop);
        self.compositor
            .sync_window(&mut self.scene, &self.display, window, visible);
    }

    /// Handles `wl_surface.destroy`.
    pub fn destroy_surface(&mut self, surface: SurfaceId) {
        self.surface_gone(surface);
        if let Some(state) = self.display.destroy_surface(surface) {
            if let Some(buffer) = state.buffer {
                self.buffers.unref(buffer, &mut self.display);
            }
        }
    }

    /// Handles destruction of the xdg_toplevel or xdg_popup of a surface that lives on.
    pub fn xdg_surface_destroyed(&mut self, surface: SurfaceId) {
        if self.unmapped_windows.remove(&surface).is_some() {
            trace!("unmapped window of {surface:?} destroyed");
        }
        if let Some(id) = self.window_for_surface(surface) {
            self.close_popups_of(id);
            self.release_window(id);
        }
    }

    /// Tears down everything that refers to a surface that no longer exists.
    fn surface_gone(&mut self, surface: SurfaceId) {
        if self.unmapped_windows.remove(&surface).is_some() {
            trace!("unmapped window of {surface:?} destroyed");
        }

        if let Some(id) = self.surface_windows.get(&surface).copied() {
            let kind = self.workspace.window(id).map(|w| w.kind);
            match kind {
                Some(WindowKind::WaylandToplevel | WindowKind::WaylandPopup) => {
                    self.close_popups_of(id);
                    self.release_window(id);
                }
                // The X11 window outlives its Xwayland surface.
                _ => {
                    self.surface_windows.remove(&surface);
                    if let Some(window) = self.workspace.window_mut(id) {
                        window.surface = None;
                    }
                }
            }
        }

        self.seat.surface_destroyed(&mut self.display, surface);
        self.xwayland_keyboard_grab_state.surface_destroyed(surface);
        self.lockscreen_overlay_state.surface_destroyed(surface);
        self.compositor
            .surface_destroyed(&mut self.scene, &mut *self.renderer, surface);
    }

    pub fn client_disconnected(&mut self, client: ClientId) {
        let surfaces = self.display.disconnect(client);
        for surface in surfaces {
            self.surface_gone(surface);
        }

        for buffer in self.buffers.destroy_client_buffers(client) {
            self.renderer.buffer_destroyed(buffer);
        }
        self.dmabuf_state.client_disconnected(client);
        self.seat.client_disconnected(&mut self.display, client);
        self.killed_clients.retain(|(c, _)| *c != client);
        self.process_workspace_events();
    }
}
