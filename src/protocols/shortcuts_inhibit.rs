use std::collections::HashMap;

use crate::display::{ClientEvent, ClientId, Display, Global, ProtocolError, SurfaceId};

const VERSION: u32 = 1;

const ERROR_ALREADY_INHIBITED: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Inhibitor {
    client: ClientId,
    active: bool,
}

/// Keyboard shortcuts inhibitors of the seat, at most one per surface.
#[derive(Debug, Default)]
pub struct ShortcutsInhibitors {
    inhibitors: HashMap<SurfaceId, Inhibitor>,
}

impl ShortcutsInhibitors {
    pub fn global(display: &mut Display) {
        trace!("keyboard shortcuts inhibit manager v{VERSION}");
        display.advertise(Global::KeyboardShortcutsInhibitManager);
    }

    /// Creates an inhibitor for `surface`.
    ///
    /// The inhibitor becomes active right away if the surface has keyboard focus.
    pub fn inhibit(
        &mut self,
        display: &mut Display,
        surface: SurfaceId,
        focused: bool,
    ) -> Result<(), ProtocolError> {
        if self.inhibitors.contains_key(&surface) {
            return Err(ProtocolError::new(
                "zwp_keyboard_shortcuts_inhibit_manager_v1",
                ERROR_ALREADY_INHIBITED,
                "the surface already has a shortcuts inhibitor for this seat",
            ));
        }
        let client = display.surface_client(surface).ok_or_else(|| {
            ProtocolError::new(
                "zwp_keyboard_shortcuts_inhibit_manager_v1",
                ERROR_ALREADY_INHIBITED,
                "no such surface",
            )
        })?;

        self.inhibitors.insert(
            surface,
            Inhibitor {
                client,
                active: false,
            },
        );
        if focused {
            self.activate(display, surface);
        }
        Ok(())
    }

    /// Destroys the inhibitor of `surface`, if any.
    pub fn remove(&mut self, surface: SurfaceId) -> bool {
        self.inhibitors.remove(&surface).is_some()
    }

    pub fn is_active(&self, surface: SurfaceId) -> bool {
        self.inhibitors.get(&surface).is_some_and(|i| i.active)
    }

    pub fn has_inhibitor(&self, surface: SurfaceId) -> bool {
        self.inhibitors.contains_key(&surface)
    }

    pub(crate) fn activate(&mut self, display: &mut Display, surface: SurfaceId) {
        if let Some(inhibitor) = self.inhibitors.get_mut(&surface) {
            if !inhibitor.active {
                inhibitor.active = true;
                display.send(
                    inhibitor.client,
                    ClientEvent::ShortcutsInhibitorActive { surface },
                );
            }
        }
    }

    pub(crate) fn deactivate(&mut self, display: &mut Display, surface: SurfaceId) {
        if let Some(inhibitor) = self.inhibitors.get_mut(&surface) {
            if inhibitor.active {
                inhibitor.active = false;
                display.send(
                    inhibitor.client,
                    ClientEvent::ShortcutsInhibitorInactive { surface },
                );
            }
        }
    }

    pub fn client_disconnected(&mut self, client: ClientId) {
        self.inhibitors.retain(|_, i| i.client != client);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_inhibitor_per_surface() {
        let mut display = Display::new();
        let client = display.create_client(None);
        let surface = display.create_surface(client).unwrap();
        let mut inhibitors = ShortcutsInhibitors::default();

        inhibitors.inhibit(&mut display, surface, true).unwrap();
        assert!(inhibitors.is_active(surface));
        let err = inhibitors.inhibit(&mut display, surface, true).unwrap_err();
        assert_eq!(err.code, ERROR_ALREADY_INHIBITED);

        inhibitors.deactivate(&mut display, surface);
        inhibitors.deactivate(&mut display, surface);
        assert_eq!(
            display.take_events(client),
            vec![
                ClientEvent::ShortcutsInhibitorActive { surface },
                ClientEvent::ShortcutsInhibitorInactive { surface },
            ]
        );

        assert!(inhibitors.remove(surface));
        inhibitors.inhibit(&mut display, surface, false).unwrap();
        assert!(!inhibitors.is_active(surface));
    }
}
