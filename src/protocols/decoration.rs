//! xdg-decoration and KDE server-decoration mode negotiation.

use crate::display::{ClientEvent, Display, Global};
use crate::window::decoration::{Decoration, DecorationMode};
use crate::window::WindowId;
use crate::workspace::Workspace;

const XDG_VERSION: u32 = 1;
const KDE_VERSION: u32 = 1;

#[derive(Debug, Default)]
pub struct DecorationState;

/// Mode the compositor settles on for a client preference.
pub fn negotiate(requested: Option<DecorationMode>) -> DecorationMode {
    match requested {
        Some(DecorationMode::ClientSide) => DecorationMode::ClientSide,
        Some(DecorationMode::ServerSide) | None => DecorationMode::ServerSide,
    }
}

impl DecorationState {
    pub fn new(display: &mut Display) -> Self {
        trace!("xdg-decoration v{XDG_VERSION}, server-decoration v{KDE_VERSION}");
        display.advertise(Global::XdgDecorationManager);
        display.advertise(Global::ServerDecorationManager);
        Self
    }

    /// Handles `set_mode` and `unset_mode` (with `None`).
    ///
    /// Sends the negotiated mode and attaches or removes the server-side decoration. Returns
    /// whether the mode changed.
    pub fn request_mode(
        &self,
        display: &mut Display,
        ws: &mut Workspace,
        id: WindowId,
        requested: Option<DecorationMode>,
    ) -> bool {
        let Some(window) = ws.window_mut(id) else {
            return false;
        };
        let Some(surface) = window.surface else {
            return false;
        };
        let Some(wayland) = window.wayland.as_mut() else {
            return false;
        };

        let mode = negotiate(requested);
        wayland.requested_decoration = requested;
        let changed = wayland.decoration_mode != mode;
        wayland.decoration_mode = mode;
        display.send_to_surface(
            surface,
            ClientEvent::DecorationMode {
                surface,
                server_side: mode == DecorationMode::ServerSide,
            },
        );

        if changed {
            debug!("window {id:?} decoration mode: {mode:?}");
            self.apply(ws, id);
        }
        changed
    }

    /// Makes the decoration of a window match its negotiated mode.
    ///
    /// The client area stays in place; the frame grows or shrinks around it.
    pub fn apply(&self, ws: &mut Workspace, id: WindowId) {
        let Some(window) = ws.window_mut(id) else {
            return;
        };
        let server_side = window
            .wayland
            .as_ref()
            .is_some_and(|w| w.decoration_mode == DecorationMode::ServerSide);
        let has_decoration = window.decoration.is_some();
        if server_side == has_decoration {
            return;
        }

        let old_frame = window.frame_geometry();
        let client = window.client_geometry();
        window.decoration = server_side.then(Decoration::default);
        if !old_frame.size.is_empty() {
            let frame = window.client_rect_to_frame_rect(client);
            window.set_frame_geometry(frame);
        }

        let frame = window.frame_geometry();
        if let Some(rect) = ws.check_workspace_position(id, frame, None) {
            if let Some(window) = ws.window_mut(id) {
                window.set_frame_geometry(rect);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use smithay::utils::Rectangle;

    use super::*;
    use crate::window::decoration::DEFAULT_BORDERS;
    use crate::window::xdg::WaylandState;
    use crate::window::{Window, WindowKind};
    use crate::workspace::tests::workspace;

    #[test]
    fn server_side_unless_client_insists() {
        assert_eq!(negotiate(None), DecorationMode::ServerSide);
        assert_eq!(
            negotiate(Some(DecorationMode::ClientSide)),
            DecorationMode::ClientSide
        );
    }

    #[test]
    fn decoration_wraps_client_area() {
        let mut display = Display::new();
        let state = DecorationState::new(&mut display);
        let client = display.create_client(None);
        let surface = display.create_surface(client).unwrap();

        let mut ws = workspace();
        let mut window = Window::new(WindowKind::WaylandToplevel);
        window.surface = Some(surface);
        window.wayland = Some(WaylandState::default());
        window.set_frame_geometry(Rectangle::new((100, 100).into(), (200, 200).into()));
        let id = ws.add_window(window);

        assert!(state.request_mode(&mut display, &mut ws, id, None));
        let window = ws.window(id).unwrap();
        assert_eq!(window.frame_margins(), DEFAULT_BORDERS);
        assert_eq!(
            window.client_geometry(),
            Rectangle::new((100, 100).into(), (200, 200).into())
        );

        assert!(!state.request_mode(&mut display, &mut ws, id, Some(DecorationMode::ServerSide)));
        assert!(state.request_mode(&mut display, &mut ws, id, Some(DecorationMode::ClientSide)));
        assert!(ws.window(id).unwrap().decoration.is_none());
        assert_eq!(
            ws.window(id).unwrap().frame_geometry(),
            Rectangle::new((100, 100).into(), (200, 200).into())
        );
        assert_eq!(
            display.events(client),
            &[
                ClientEvent::DecorationMode {
                    surface,
                    server_side: true
                },
                ClientEvent::DecorationMode {
                    surface,
                    server_side: true
                },
                ClientEvent::DecorationMode {
                    surface,
                    server_side: false
                },
            ]
        );
    }
}
