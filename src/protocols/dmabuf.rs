//! `zwp_linux_dmabuf_v1` with format feedback.

use std::collections::HashSet;

use smithay::backend::allocator::Fourcc;

use crate::backend::RenderBackend;
use crate::display::{ClientEvent, ClientId, Display, Global, ProtocolError};
use crate::texture::buffer::{BufferId, BufferKind, BufferStore, DmabufAttributes};
use crate::texture::formats::{yuv_conversion, DmabufFormat};

const VERSION: u32 = 5;

const PARAMS: &str = "zwp_linux_buffer_params_v1";
const ERROR_INCOMPLETE: u32 = 3;
const ERROR_INVALID_FORMAT: u32 = 4;
const ERROR_INVALID_DIMENSIONS: u32 = 5;

/// Set of (format, modifier) pairs advertised together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmabufTranche {
    pub target_device: String,
    /// The buffers can be scanned out directly.
    pub scanout: bool,
    pub formats: Vec<DmabufFormat>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmabufFeedback {
    pub main_device: String,
    /// Tranches in order of preference.
    pub tranches: Vec<DmabufTranche>,
}

impl DmabufFeedback {
    pub fn new(main_device: String, formats: Vec<DmabufFormat>) -> Self {
        let tranche = DmabufTranche {
            target_device: main_device.clone(),
            scanout: false,
            formats,
        };
        Self {
            main_device,
            tranches: vec![tranche],
        }
    }

    pub fn formats(&self) -> impl Iterator<Item = &DmabufFormat> + '_ {
        self.tranches.iter().flat_map(|t| t.formats.iter())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CreateBufferError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The client gets a `failed` event, this is not a protocol error.
    #[error("the renderer could not import the buffer")]
    ImportFailed,
}

#[derive(Debug)]
pub struct DmabufState {
    feedback: DmabufFeedback,
    /// Clients that asked for default feedback and get updates.
    subscribers: HashSet<ClientId>,
}

impl DmabufState {
    pub fn new(display: &mut Display, main_device: String, formats: Vec<DmabufFormat>) -> Self {
        trace!("linux-dmabuf v{VERSION} with {} formats", formats.len());
        display.advertise(Global::LinuxDmabuf);
        Self {
            feedback: DmabufFeedback::new(main_device, formats),
            subscribers: HashSet::new(),
        }
    }

    pub fn default_feedback(&self) -> &DmabufFeedback {
        &self.feedback
    }

    pub fn supports(&self, format: Fourcc) -> bool {
        self.feedback.formats().any(|f| f.format == format)
    }

    /// Handles `get_default_feedback`.
    pub fn subscribe(&mut self, display: &mut Display, client: ClientId) {
        self.subscribers.insert(client);
        display.send(client, ClientEvent::DmabufFeedback(self.feedback.clone()));
    }

    pub fn client_disconnected(&mut self, client: ClientId) {
        self.subscribers.remove(&client);
    }

    /// Replaces the advertised formats, e.g. after the renderer changed.
    pub fn set_formats(&mut self, display: &mut Display, formats: Vec<DmabufFormat>) {
        let feedback = DmabufFeedback::new(self.feedback.main_device.clone(), formats);
        if feedback == self.feedback {
            return;
        }
        debug!("dmabuf formats changed");
        self.feedback = feedback;

        self.subscribers.retain(|c| display.is_connected(*c));
        for client in self.subscribers.iter().copied() {
            display.send(client, ClientEvent::DmabufFeedback(self.feedback.clone()));
        }
    }

    /// Handles `zwp_linux_buffer_params_v1.create`.
    ///
    /// The buffer is accepted only after every plane of it was imported by the renderer.
    pub fn create_buffer(
        &self,
        buffers: &mut BufferStore,
        renderer: &mut dyn RenderBackend,
        client: ClientId,
        attrs: DmabufAttributes,
    ) -> Result<BufferId, CreateBufferError> {
        if attrs.planes.is_empty() {
            return Err(ProtocolError::new(PARAMS, ERROR_INCOMPLETE, "no planes were added").into());
        }
        if attrs.width <= 0 || attrs.height <= 0 {
            return Err(ProtocolError::new(
                PARAMS,
                ERROR_INVALID_DIMENSIONS,
                format!("invalid size {}x{}", attrs.width, attrs.height),
            )
            .into());
        }
        if !self.supports(attrs.format) {
            return Err(ProtocolError::new(
                PARAMS,
                ERROR_INVALID_FORMAT,
                format!("format {:?} is not supported", attrs.format),
            )
            .into());
        }
        if let Some(planes) = yuv_conversion(attrs.format) {
            if attrs.planes.len() < planes.len() {
                return Err(ProtocolError::new(
                    PARAMS,
                    ERROR_INCOMPLETE,
                    format!("{:?} needs {} planes", attrs.format, planes.len()),
                )
                .into());
            }
        }

        if !renderer.test_import_buffer(&attrs) {
            debug!("rejecting {:?} dmabuf that failed to import", attrs.format);
            return Err(CreateBufferError::ImportFailed);
        }

        Ok(buffers.create(Some(client), BufferKind::Dmabuf(attrs)))
    }
}

#[cfg(test)]
mod tests {
    use arrayvec::ArrayVec;
    use smithay::backend::allocator::Modifier;

    use super::*;
    use crate::backend::graphics::{Graphics, VirtualGraphics};
    use crate::backend::opengl::OpenGlBackend;
    use crate::texture::buffer::DmabufPlane;

    fn attrs(format: Fourcc, planes: usize) -> DmabufAttributes {
        let mut rv = ArrayVec::new();
        for i in 0..planes {
            rv.push(DmabufPlane {
                fd: 10 + i as i32,
                offset: 0,
                stride: 256,
            });
        }
        DmabufAttributes {
            format,
            modifier: Modifier::Linear,
            width: 64,
            height: 64,
            planes: rv,
        }
    }

    #[test]
    fn buffers_are_checked_before_creation() {
        let mut graphics = VirtualGraphics::new();
        graphics.failing_formats.push(Fourcc::Xrgb8888);
        let mut renderer = OpenGlBackend::new(graphics, 4).unwrap();

        let mut display = Display::new();
        let client = display.create_client(None);
        let state = DmabufState::new(
            &mut display,
            String::from("/dev/dri/renderD128"),
            renderer.dmabuf_formats(),
        );
        let mut buffers = BufferStore::new();

        let id = state
            .create_buffer(&mut buffers, &mut renderer, client, attrs(Fourcc::Argb8888, 1))
            .unwrap();
        assert!(buffers.get(id).is_some());

        assert!(matches!(
            state.create_buffer(&mut buffers, &mut renderer, client, attrs(Fourcc::Xrgb8888, 1)),
            Err(CreateBufferError::ImportFailed)
        ));
        assert!(matches!(
            state.create_buffer(&mut buffers, &mut renderer, client, attrs(Fourcc::Nv12, 1)),
            Err(CreateBufferError::Protocol(ProtocolError {
                code: ERROR_INCOMPLETE,
                ..
            }))
        ));
        assert!(matches!(
            state.create_buffer(&mut buffers, &mut renderer, client, attrs(Fourcc::Yuyv, 1)),
            Err(CreateBufferError::Protocol(ProtocolError {
                code: ERROR_INVALID_FORMAT,
                ..
            }))
        ));
        assert_eq!(buffers.len(), 1);
    }

    #[test]
    fn subscribers_get_format_updates() {
        let mut display = Display::new();
        let a = display.create_client(None);
        let b = display.create_client(None);
        let mut state = DmabufState::new(&mut display, String::from("/dev/dri/card0"), Vec::new());

        state.subscribe(&mut display, a);
        let formats = VirtualGraphics::new().dmabuf_formats();
        state.set_formats(&mut display, formats.clone());
        state.set_formats(&mut display, formats);

        assert_eq!(display.events(a).len(), 2);
        assert!(display.events(b).is_empty());
        assert!(state.supports(Fourcc::Nv12));
    }
}
