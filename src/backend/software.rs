//! CPU renderer used when no OpenGL backend can be created.

use std::any::Any;
use std::collections::HashMap;
use std::time::Duration;

use smithay::utils::{Buffer, Physical, Rectangle};

use super::graphics::{DrawCommand, RecordedFrame, TextureName, TextureTarget};
use super::{BackendInitError, CompositingType, ContextResetError, RenderBackend, RenderError, Swapchain};
use crate::output::{Output, OutputId};
use crate::texture::buffer::{BufferId, BufferKind, DmabufAttributes, GraphicsBuffer};
use crate::texture::formats::{format_info, DmabufFormat};
use crate::texture::import::{BufferImportError, PlaneTexture, SurfaceTexture};

#[derive(Debug, Default)]
pub struct SoftwareBackend {
    outputs: HashMap<OutputId, Swapchain>,
    next_image: u32,
    /// Frames drawn so far, oldest first.
    pub frames: Vec<RecordedFrame>,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn image(&mut self, size: smithay::utils::Size<i32, Buffer>) -> PlaneTexture {
        self.next_image += 1;
        PlaneTexture {
            name: TextureName(self.next_image),
            target: TextureTarget::Texture2D,
            size,
            flip_y: false,
        }
    }
}

impl RenderBackend for SoftwareBackend {
    fn compositing_type(&self) -> CompositingType {
        CompositingType::Software
    }

    fn name(&self) -> String {
        String::from("software")
    }

    fn add_output(&mut self, output: &Output) -> Result<(), BackendInitError> {
        // The frame is painted into one persistent image.
        self.outputs.entry(output.id).or_insert_with(|| Swapchain::new(1));
        Ok(())
    }

    fn remove_output(&mut self, output: OutputId) {
        self.outputs.remove(&output);
    }

    fn buffer_age(&self, output: OutputId) -> usize {
        self.outputs.get(&output).map_or(0, |s| s.age())
    }

    fn dmabuf_formats(&self) -> Vec<DmabufFormat> {
        Vec::new()
    }

    fn test_import_buffer(&mut self, _attrs: &DmabufAttributes) -> bool {
        false
    }

    fn update_texture(
        &mut self,
        texture: &mut Option<SurfaceTexture>,
        buffer: &GraphicsBuffer,
        _damage: &[Rectangle<i32, Buffer>],
    ) -> Result<(), BufferImportError> {
        let size = buffer.size();
        *texture = match &buffer.kind {
            BufferKind::Shm(attrs) => {
                if format_info(attrs.format).is_none() {
                    return Err(BufferImportError::UnsupportedFormat(attrs.format));
                }
                let plane = match texture {
                    Some(SurfaceTexture::Shm { plane, .. }) if plane.size == size => *plane,
                    _ => self.image(size),
                };
                Some(SurfaceTexture::Shm {
                    buffer: buffer.id,
                    format: attrs.format,
                    plane,
                })
            }
            BufferKind::Dmabuf(attrs) => {
                return Err(BufferImportError::UnsupportedFormat(attrs.format));
            }
            BufferKind::SinglePixel(pixel) => Some(SurfaceTexture::SinglePixel {
                buffer: buffer.id,
                color: pixel.to_f32(),
            }),
            BufferKind::Internal { size } => Some(SurfaceTexture::Internal {
                buffer: buffer.id,
                plane: self.image(*size),
            }),
        };
        Ok(())
    }

    fn release_texture(&mut self, _texture: Option<SurfaceTexture>) {}

    fn buffer_destroyed(&mut self, _buffer: BufferId) {}

    fn check_reset(&mut self) -> Result<bool, ContextResetError> {
        Ok(false)
    }

    fn render(
        &mut self,
        output: &Output,
        commands: &[DrawCommand],
        damage: &[Rectangle<i32, Physical>],
    ) -> Result<(), RenderError> {
        let _span = tracy_client::span!("SoftwareBackend::render");

        let swapchain = self
            .outputs
            .get_mut(&output.id)
            .ok_or(RenderError::UnknownOutput(output.id))?;
        swapchain.present();
        self.frames.push(RecordedFrame {
            size: output.mode_size,
            commands: commands.to_vec(),
            scissor: damage.to_vec(),
        });
        Ok(())
    }

    fn poll_frame(&mut self, _output: OutputId) -> Option<Duration> {
        None
    }

    fn render_time_estimate(&self, _output: OutputId) -> Duration {
        Duration::ZERO
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
