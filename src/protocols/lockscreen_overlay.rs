//! `kde_lockscreen_overlay_v1`: lets a client show a surface above the lock screen.

use std::collections::HashSet;

use crate::display::{Display, Global, ProtocolError, SurfaceId};

const VERSION: u32 = 1;

const ERROR_INVALID_SURFACE_STATE: u32 = 0;

#[derive(Debug, Default)]
pub struct LockscreenOverlayState {
    allowed: HashSet<SurfaceId>,
}

impl LockscreenOverlayState {
    pub fn new(display: &mut Display) -> Self {
        trace!("lockscreen overlay v{VERSION}");
        display.advertise(Global::LockscreenOverlay);
        Self::default()
    }

    /// Handles `allow`. The surface must not be mapped yet.
    pub fn allow(&mut self, display: &Display, surface: SurfaceId) -> Result<(), ProtocolError> {
        let Some(s) = display.surface(surface) else {
            return Err(ProtocolError::new(
                "kde_lockscreen_overlay_v1",
                ERROR_INVALID_SURFACE_STATE,
                "no such surface",
            ));
        };
        if s.is_mapped() {
            return Err(ProtocolError::new(
                "kde_lockscreen_overlay_v1",
                ERROR_INVALID_SURFACE_STATE,
                "the surface is already mapped",
            ));
        }

        debug!("allowing {surface:?} on the lock screen");
        self.allowed.insert(surface);
        Ok(())
    }

    pub fn is_allowed(&self, surface: SurfaceId) -> bool {
        self.allowed.contains(&surface)
    }

    pub fn surface_destroyed(&mut self, surface: SurfaceId) {
        self.allowed.remove(&surface);
    }
}

#[cfg(test)]
mod tests {
    use smithay::utils::Size;

    use super::*;
    use crate::texture::buffer::BufferId;

    #[test]
    fn mapped_surface_is_rejected() {
        let mut display = Display::new();
        let mut state = LockscreenOverlayState::new(&mut display);
        let client = display.create_client(None);
        let unmapped = display.create_surface(client).unwrap();
        let mapped = display.create_surface(client).unwrap();
        display.attach(mapped, Some(BufferId::next()));
        display.commit(mapped, |_| Some(Size::from((10, 10))));

        state.allow(&display, unmapped).unwrap();
        assert!(state.is_allowed(unmapped));

        let err = state.allow(&display, mapped).unwrap_err();
        assert_eq!(err.code, ERROR_INVALID_SURFACE_STATE);
        assert!(!state.is_allowed(mapped));
    }
}
