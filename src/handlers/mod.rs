//! Client requests, translated into operations on the compositor state.

mod compositor;
mod geometry;
mod input;
mod x11;
mod xdg_shell;

use smithay::utils::{Logical, Point};

use crate::display::{ClientEvent, ClientId, Interfaces, SurfaceId};
use crate::protocols::decoration::negotiate;
use crate::protocols::dmabuf::CreateBufferError;
use crate::protocols::plasma_shell::window_type_for_role;
use crate::strata::Strata;
use crate::texture::buffer::{BufferId, DmabufAttributes};
use crate::window::decoration::DecorationMode;
use crate::window::xdg::{PanelBehavior, PlasmaRole};

impl Strata {
    /// Records the interfaces a client bound and sends it their initial state.
    pub fn bind(&mut self, client: ClientId, interfaces: Interfaces) {
        self.display.bind(client, interfaces);
        if interfaces.contains(Interfaces::KEYBOARD) {
            self.seat.keyboard_bound(&mut self.display, client);
        }
    }

    /// Handles binding `zwp_linux_dmabuf_v1`.
    pub fn bind_dmabuf(&mut self, client: ClientId) {
        self.dmabuf_state.subscribe(&mut self.display, client);
    }

    /// Handles binding `wl_drm`.
    pub fn bind_wl_drm(&mut self, client: ClientId) {
        self.wl_drm_state.bind(&mut self.display, client);
    }

    /// Handles `zwp_linux_buffer_params_v1.create`.
    pub fn create_dmabuf_buffer(
        &mut self,
        client: ClientId,
        attrs: DmabufAttributes,
    ) -> Option<BufferId> {
        let result = self.dmabuf_state.create_buffer(
            &mut self.buffers,
            &mut *self.renderer,
            client,
            attrs,
        );
        match result {
            Ok(buffer) => Some(buffer),
            Err(CreateBufferError::Protocol(err)) => {
                self.post_error(client, err);
                None
            }
            Err(CreateBufferError::ImportFailed) => {
                self.display.send(client, ClientEvent::DmabufFailed);
                None
            }
        }
    }

    /// Handles the `wl_drm` buffer creation requests.
    pub fn create_wl_drm_buffer(&mut self, client: ClientId) {
        if let Err(err) = self.wl_drm_state.create_buffer() {
            self.post_error(client, err);
        }
    }

    /// Handles xdg-decoration `set_mode` and `unset_mode`, and KDE server-decoration
    /// `request_mode`.
    pub fn request_decoration_mode(&mut self, surface: SurfaceId, mode: Option<DecorationMode>) {
        if let Some(id) = self.window_for_surface(surface) {
            if self
                .decoration_state
                .request_mode(&mut self.display, &mut self.workspace, id, mode)
            {
                self.geometry_changed(id);
            }
            return;
        }

        // Not mapped yet, the decoration is attached on map.
        let Some(wayland) = self
            .unmapped_windows
            .get_mut(&surface)
            .and_then(|w| w.wayland.as_mut())
        else {
            return;
        };
        let negotiated = negotiate(mode);
        wayland.requested_decoration = mode;
        wayland.decoration_mode = negotiated;
        self.display.send_to_surface(
            surface,
            ClientEvent::DecorationMode {
                surface,
                server_side: negotiated == DecorationMode::ServerSide,
            },
        );
    }

    /// Handles `org_kde_plasma_surface.set_role`.
    pub fn set_plasma_role(&mut self, surface: SurfaceId, role: PlasmaRole) {
        if let Some(id) = self.window_for_surface(surface) {
            self.plasma_shell_state
                .set_role(&mut self.workspace, id, role);
            self.process_workspace_events();
            return;
        }
        if let Some(window) = self.unmapped_windows.get_mut(&surface) {
            let Some(wayland) = window.wayland.as_mut() else {
                return;
            };
            wayland.plasma_role = Some(role);
            window.window_type = window_type_for_role(role);
            window.wants_input = !matches!(
                role,
                PlasmaRole::OnScreenDisplay
                    | PlasmaRole::ToolTip
                    | PlasmaRole::Notification
                    | PlasmaRole::CriticalNotification
                    | PlasmaRole::Panel
            ) || wayland.panel_takes_focus;
            if role != PlasmaRole::Normal {
                window.on_all_desktops = true;
            }
        }
    }

    pub fn set_panel_behavior(&mut self, surface: SurfaceId, behavior: PanelBehavior) {
        if let Some(id) = self.window_for_surface(surface) {
            self.plasma_shell_state
                .set_panel_behavior(&mut self.workspace, id, behavior);
            self.process_workspace_events();
        } else if let Some(wayland) = self
            .unmapped_windows
            .get_mut(&surface)
            .and_then(|w| w.wayland.as_mut())
        {
            wayland.panel_behavior = behavior;
        }
    }

    pub fn set_panel_takes_focus(&mut self, surface: SurfaceId, takes_focus: bool) {
        if let Some(id) = self.window_for_surface(surface) {
            self.plasma_shell_state
                .set_panel_takes_focus(&mut self.workspace, id, takes_focus);
        } else if let Some(wayland) = self
            .unmapped_windows
            .get_mut(&surface)
            .and_then(|w| w.wayland.as_mut())
        {
            wayland.panel_takes_focus = takes_focus;
        }
    }

    pub fn set_plasma_position(&mut self, surface: SurfaceId, pos: Point<i32, Logical>) {
        let Some(id) = self.window_for_surface(surface) else {
            return;
        };
        self.plasma_shell_state
            .set_position(&mut self.workspace, id, pos);
        self.geometry_changed(id);
    }

    pub fn set_skip_taskbar(&mut self, surface: SurfaceId, skip: bool) {
        match self.window_for_surface(surface) {
            Some(id) => self
                .plasma_shell_state
                .set_skip_taskbar(&mut self.workspace, id, skip),
            None => {
                if let Some(window) = self.unmapped_windows.get_mut(&surface) {
                    window.states.skip_taskbar = skip;
                }
            }
        }
    }

    pub fn set_skip_switcher(&mut self, surface: SurfaceId, skip: bool) {
        match self.window_for_surface(surface) {
            Some(id) => self
                .plasma_shell_state
                .set_skip_switcher(&mut self.workspace, id, skip),
            None => {
                if let Some(window) = self.unmapped_windows.get_mut(&surface) {
                    window.states.skip_switcher = skip;
                    if let Some(wayland) = window.wayland.as_mut() {
                        wayland.skip_switcher_requested = skip;
                    }
                }
            }
        }
    }

    /// Handles `zwp_xwayland_keyboard_grab_manager_v1.grab_keyboard`.
    pub fn grab_xwayland_keyboard(&mut self, surface: SurfaceId) {
        let result =
            self.xwayland_keyboard_grab_state
                .grab_keyboard(&mut self.display, &mut self.seat, surface);
        if let Err(err) = result {
            if let Some(client) = self.display.surface_client(surface) {
                self.post_error(client, err);
            }
        }
    }

    pub fn ungrab_xwayland_keyboard(&mut self) {
        self.xwayland_keyboard_grab_state
            .ungrab_keyboard(&mut self.display, &mut self.seat);
    }

    /// Handles `kde_lockscreen_overlay_v1.allow`.
    pub fn allow_on_lockscreen(&mut self, surface: SurfaceId) {
        if let Err(err) = self
            .lockscreen_overlay_state
            .allow(&self.display, surface)
        {
            if let Some(client) = self.display.surface_client(surface) {
                self.post_error(client, err);
            }
        }
    }

    /// Handles `inhibit_shortcuts`.
    pub fn inhibit_shortcuts(&mut self, surface: SurfaceId) {
        let focused = self.seat.keyboard_focus() == Some(surface);
        let result = self
            .seat
            .shortcuts_inhibitors_mut()
            .inhibit(&mut self.display, surface, focused);
        if let Err(err) = result {
            if let Some(client) = self.display.surface_client(surface) {
                self.post_error(client, err);
            }
        }
    }
}
