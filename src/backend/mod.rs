use std::any::Any;

use smithay::utils::{Buffer, Physical, Rectangle};

use crate::output::{Output, OutputId};
use crate::texture::buffer::{BufferId, DmabufAttributes, GraphicsBuffer};
use crate::texture::formats::DmabufFormat;
use crate::texture::import::{BufferImportError, SurfaceTexture};
use crate::Strata;

pub mod egl;
pub mod graphics;
pub mod headless;
pub mod libinput;
pub mod opengl;
pub mod render_time;
pub mod software;

pub use headless::Headless;

use self::graphics::DrawCommand;

/// Kind of renderer a backend can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositingType {
    OpenGl,
    Software,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendInitError {
    #[error("no GPU available")]
    NoDevice,
    #[error("missing required extension {0}")]
    MissingExtension(&'static str),
    #[error("failed to create the OpenGL context")]
    ContextCreation,
    #[error("compositing type {0:?} is not supported by this backend")]
    Unsupported(CompositingType),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextResetError {
    #[error("graphics reset did not complete within {0:?}")]
    Timeout(std::time::Duration),
    #[error("failed to recreate GL resources after a reset")]
    Rebuild,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("output {0:?} has no render target")]
    UnknownOutput(OutputId),
    #[error("failed to make the output context current")]
    MakeCurrent,
    #[error("the renderer has failed")]
    Failed,
}

/// Renderer the compositor draws frames with.
pub trait RenderBackend: Any {
    fn compositing_type(&self) -> CompositingType;
    fn name(&self) -> String;

    fn add_output(&mut self, output: &Output) -> Result<(), BackendInitError>;
    fn remove_output(&mut self, output: OutputId);

    /// Age of the buffer the next frame of the output renders into, 0 when unknown.
    fn buffer_age(&self, output: OutputId) -> usize;

    fn dmabuf_formats(&self) -> Vec<DmabufFormat>;
    fn test_import_buffer(&mut self, attrs: &DmabufAttributes) -> bool;
    fn update_texture(
        &mut self,
        texture: &mut Option<SurfaceTexture>,
        buffer: &GraphicsBuffer,
        damage: &[Rectangle<i32, Buffer>],
    ) -> Result<(), BufferImportError>;
    fn release_texture(&mut self, texture: Option<SurfaceTexture>);
    fn buffer_destroyed(&mut self, buffer: BufferId);

    /// Checks for a context reset and recovers from it.
    ///
    /// Returns `Ok(true)` when the resources were recreated, in which case every texture must be
    /// imported again.
    fn check_reset(&mut self) -> Result<bool, ContextResetError>;

    fn render(
        &mut self,
        output: &Output,
        commands: &[DrawCommand],
        damage: &[Rectangle<i32, Physical>],
    ) -> Result<(), RenderError>;

    /// Collects the GPU time of the last frame of the output once it has finished.
    fn poll_frame(&mut self, output: OutputId) -> Option<std::time::Duration>;
    /// Time to reserve for rendering a frame of the output.
    fn render_time_estimate(&self, output: OutputId) -> std::time::Duration;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Buffer ages of a double-buffered swapchain.
#[derive(Debug, Clone)]
pub struct Swapchain {
    ages: Vec<usize>,
    current: usize,
}

impl Swapchain {
    pub fn new(buffers: usize) -> Self {
        Self {
            ages: vec![0; buffers.max(1)],
            current: 0,
        }
    }

    pub fn age(&self) -> usize {
        self.ages[self.current]
    }

    /// Marks the current buffer as presented and moves on to the next one.
    pub fn present(&mut self) {
        for age in &mut self.ages {
            if *age > 0 {
                *age += 1;
            }
        }
        self.ages[self.current] = 1;
        self.current = (self.current + 1) % self.ages.len();
    }

    pub fn reset(&mut self) {
        self.ages.fill(0);
    }
}

pub enum Backend {
    Headless(Headless),
}

impl Backend {
    pub fn init(&mut self, strata: &mut Strata) {
        match self {
            Backend::Headless(headless) => headless.init(strata),
        }
    }

    pub fn seat_name(&self) -> String {
        match self {
            Backend::Headless(headless) => headless.seat_name(),
        }
    }

    /// Compositing types in order of preference.
    pub fn supported_compositors(&self) -> Vec<CompositingType> {
        match self {
            Backend::Headless(headless) => headless.supported_compositors(),
        }
    }

    pub fn create_render_backend(
        &mut self,
        kind: CompositingType,
        prefer_gles: bool,
        render_time_history: usize,
    ) -> Result<Box<dyn RenderBackend>, BackendInitError> {
        match self {
            Backend::Headless(headless) => match kind {
                CompositingType::OpenGl => {
                    headless.create_opengl_backend(prefer_gles, render_time_history)
                }
                CompositingType::Software => Ok(headless.create_software_backend()),
            },
        }
    }

    pub fn headless(&mut self) -> &mut Headless {
        let Self::Headless(v) = self;
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swapchain_ages() {
        let mut swapchain = Swapchain::new(2);
        assert_eq!(swapchain.age(), 0);
        swapchain.present();
        assert_eq!(swapchain.age(), 0);
        swapchain.present();
        assert_eq!(swapchain.age(), 2);
        swapchain.present();
        assert_eq!(swapchain.age(), 2);

        swapchain.reset();
        assert_eq!(swapchain.age(), 0);

        let mut single = Swapchain::new(1);
        single.present();
        assert_eq!(single.age(), 1);
    }
}
