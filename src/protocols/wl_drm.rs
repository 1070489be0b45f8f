//! Legacy `wl_drm`.
//!
//! Only advertises the render node and PRIME support so that old EGL implementations find the
//! device. Buffers must be created through linux-dmabuf instead.

use crate::display::{ClientEvent, ClientId, Display, Global, ProtocolError};

const VERSION: u32 = 2;

const ERROR_INVALID_FORMAT: u32 = 1;

#[derive(Debug)]
pub struct WlDrmState {
    device_path: String,
}

impl WlDrmState {
    pub fn new(display: &mut Display, device_path: String) -> Self {
        trace!("wl_drm v{VERSION} for {device_path}");
        display.advertise(Global::WlDrm);
        Self { device_path }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    pub fn bind(&self, display: &mut Display, client: ClientId) {
        display.send(
            client,
            ClientEvent::DrmDevice {
                path: self.device_path.clone(),
            },
        );
        display.send(client, ClientEvent::DrmCapabilities { prime: true });
    }

    /// Handles `create_buffer`, `create_planar_buffer` and `create_prime_buffer`.
    pub fn create_buffer(&self) -> Result<(), ProtocolError> {
        Err(ProtocolError::new(
            "wl_drm",
            ERROR_INVALID_FORMAT,
            "wl_drm buffers are not supported, use linux-dmabuf",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announces_device_and_rejects_buffers() {
        let mut display = Display::new();
        let client = display.create_client(None);
        let state = WlDrmState::new(&mut display, String::from("/dev/dri/renderD128"));

        state.bind(&mut display, client);
        assert_eq!(
            display.events(client),
            &[
                ClientEvent::DrmDevice {
                    path: String::from("/dev/dri/renderD128")
                },
                ClientEvent::DrmCapabilities { prime: true },
            ]
        );
        assert!(state.create_buffer().is_err());
    }
}
