//! OpenGL renderer.
//!
//! One share context owns every imported texture; each output renders with its own context
//! sharing with it. The renderer tracks which context is current itself and always releases the
//! previous one before switching.

use std::any::Any;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use smithay::utils::{Buffer, Physical, Rectangle};

use super::graphics::{ContextId, DrawCommand, FenceName, Graphics, ResetStatus};
use super::render_time::{RenderJournal, RenderTimer};
use super::{
    BackendInitError, CompositingType, ContextResetError, RenderBackend, RenderError, Swapchain,
};
use crate::output::{Output, OutputId};
use crate::texture::buffer::{BufferId, DmabufAttributes, GraphicsBuffer};
use crate::texture::formats::DmabufFormat;
use crate::texture::import::{BufferImportError, SurfaceTexture, TextureImporter};

/// How long to wait for a graphics reset to complete.
pub const RESET_TIMEOUT: Duration = Duration::from_secs(10);

const REQUIRED_EXTENSIONS: &[&str] = &["EGL_KHR_surfaceless_context"];

#[derive(Debug)]
struct PendingFrame {
    fence: FenceName,
    timer: RenderTimer,
}

#[derive(Debug)]
struct OutputContext {
    context: ContextId,
    swapchain: Swapchain,
    journal: RenderJournal,
    pending: Option<PendingFrame>,
}

#[derive(Debug)]
pub struct OpenGlBackend<G> {
    gl: G,
    share_context: ContextId,
    current: Option<ContextId>,
    outputs: HashMap<OutputId, OutputContext>,
    importer: TextureImporter,
    render_time_history: usize,
    reset_timeout: Duration,
    failed: bool,
}

impl<G: Graphics> OpenGlBackend<G> {
    pub fn new(mut gl: G, render_time_history: usize) -> Result<Self, BackendInitError> {
        let _span = tracy_client::span!("OpenGlBackend::new");

        for ext in REQUIRED_EXTENSIONS {
            if !gl.has_extension(ext) {
                return Err(BackendInitError::MissingExtension(ext));
            }
        }

        let share_context = gl
            .create_context(None)
            .ok_or(BackendInitError::ContextCreation)?;

        let formats = Self::supported_formats(&gl);
        info!(
            "initialized OpenGL renderer {} with {} dmabuf formats",
            gl.renderer_name(),
            formats.len()
        );

        Ok(Self {
            gl,
            share_context,
            current: None,
            outputs: HashMap::new(),
            importer: TextureImporter::new(formats),
            render_time_history,
            reset_timeout: RESET_TIMEOUT,
            failed: false,
        })
    }

    fn supported_formats(gl: &G) -> Vec<DmabufFormat> {
        if gl.has_extension("EGL_EXT_image_dma_buf_import") {
            gl.dmabuf_formats()
        } else {
            Vec::new()
        }
    }

    pub fn graphics(&mut self) -> &mut G {
        &mut self.gl
    }

    pub fn share_context(&self) -> ContextId {
        self.share_context
    }

    pub fn current_context(&self) -> Option<ContextId> {
        self.current
    }

    pub fn set_reset_timeout(&mut self, timeout: Duration) {
        self.reset_timeout = timeout;
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn cached_images(&self) -> usize {
        self.importer.cached_images()
    }

    fn make_current(&mut self, context: ContextId) -> bool {
        if self.current == Some(context) {
            return true;
        }
        if self.current.is_some() {
            self.gl.make_current(None);
            self.current = None;
        }
        if !self.gl.make_current(Some(context)) {
            warn!("failed to make context {context:?} current");
            return false;
        }
        self.current = Some(context);
        true
    }

    fn wait_for_reset(&mut self) -> Result<(), ContextResetError> {
        let deadline = Instant::now() + self.reset_timeout;
        loop {
            if self.gl.reset_status() == ResetStatus::NoError {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ContextResetError::Timeout(self.reset_timeout));
            }
            std::thread::sleep(Duration::from_micros(50));
        }
    }

    /// Recreates the contexts after a reset. Textures made in the lost contexts are gone.
    fn rebuild(&mut self) -> Result<(), ContextResetError> {
        self.gl.make_current(None);
        self.current = None;

        self.gl.destroy_context(self.share_context);
        self.share_context = self
            .gl
            .create_context(None)
            .ok_or(ContextResetError::Rebuild)?;

        for output in self.outputs.values_mut() {
            self.gl.destroy_context(output.context);
            output.context = self
                .gl
                .create_context(Some(self.share_context))
                .ok_or(ContextResetError::Rebuild)?;
            output.swapchain.reset();
            output.pending = None;
        }

        let formats = Self::supported_formats(&self.gl);
        self.importer = TextureImporter::new(formats);
        Ok(())
    }
}

impl<G: Graphics + 'static> RenderBackend for OpenGlBackend<G> {
    fn compositing_type(&self) -> CompositingType {
        CompositingType::OpenGl
    }

    fn name(&self) -> String {
        self.gl.renderer_name()
    }

    fn add_output(&mut self, output: &Output) -> Result<(), BackendInitError> {
        if self.outputs.contains_key(&output.id) {
            return Ok(());
        }
        let context = self
            .gl
            .create_context(Some(self.share_context))
            .ok_or(BackendInitError::ContextCreation)?;
        debug!("created context {context:?} for output {}", output.name);
        self.outputs.insert(
            output.id,
            OutputContext {
                context,
                swapchain: Swapchain::new(2),
                journal: RenderJournal::new(self.render_time_history),
                pending: None,
            },
        );
        Ok(())
    }

    fn remove_output(&mut self, output: OutputId) {
        let Some(ctx) = self.outputs.remove(&output) else {
            return;
        };
        if let Some(pending) = ctx.pending {
            self.gl.delete_fence(pending.fence);
            pending.timer.discard(&mut self.gl);
        }
        if self.current == Some(ctx.context) {
            self.gl.make_current(None);
            self.current = None;
        }
        self.gl.destroy_context(ctx.context);
    }

    fn buffer_age(&self, output: OutputId) -> usize {
        self.outputs.get(&output).map_or(0, |o| o.swapchain.age())
    }

    fn dmabuf_formats(&self) -> Vec<DmabufFormat> {
        self.importer.formats().to_vec()
    }

    fn test_import_buffer(&mut self, attrs: &DmabufAttributes) -> bool {
        if !self.make_current(self.share_context) {
            return false;
        }
        self.importer.test_import_buffer(&mut self.gl, attrs)
    }

    fn update_texture(
        &mut self,
        texture: &mut Option<SurfaceTexture>,
        buffer: &GraphicsBuffer,
        damage: &[Rectangle<i32, Buffer>],
    ) -> Result<(), BufferImportError> {
        self.make_current(self.share_context);
        self.importer.update(&mut self.gl, texture, buffer, damage)
    }

    fn release_texture(&mut self, texture: Option<SurfaceTexture>) {
        self.make_current(self.share_context);
        self.importer.release(&mut self.gl, texture);
    }

    fn buffer_destroyed(&mut self, buffer: BufferId) {
        self.make_current(self.share_context);
        self.importer.buffer_destroyed(&mut self.gl, buffer);
    }

    fn check_reset(&mut self) -> Result<bool, ContextResetError> {
        if self.failed {
            return Err(ContextResetError::Rebuild);
        }

        let status = self.gl.reset_status();
        if status == ResetStatus::NoError {
            return Ok(false);
        }

        error!("graphics reset detected ({status:?}), waiting for it to complete");
        if let Err(err) = self.wait_for_reset().and_then(|()| self.rebuild()) {
            error!("failed to recover from the graphics reset: {err}");
            self.failed = true;
            return Err(err);
        }

        info!("recovered from the graphics reset");
        Ok(true)
    }

    fn render(
        &mut self,
        output: &Output,
        commands: &[DrawCommand],
        damage: &[Rectangle<i32, Physical>],
    ) -> Result<(), RenderError> {
        let _span = tracy_client::span!("OpenGlBackend::render");

        if self.failed {
            return Err(RenderError::Failed);
        }
        let context = self
            .outputs
            .get(&output.id)
            .map(|o| o.context)
            .ok_or(RenderError::UnknownOutput(output.id))?;
        if !self.make_current(context) {
            return Err(RenderError::MakeCurrent);
        }

        let mut timer = RenderTimer::begin(&mut self.gl);
        self.gl.draw(output.mode_size, commands, damage);
        timer.end(&mut self.gl);
        let fence = self.gl.fence_sync();

        let Some(ctx) = self.outputs.get_mut(&output.id) else {
            return Err(RenderError::UnknownOutput(output.id));
        };
        if let Some(old) = ctx.pending.replace(PendingFrame { fence, timer }) {
            self.gl.delete_fence(old.fence);
            old.timer.discard(&mut self.gl);
        }
        ctx.swapchain.present();
        Ok(())
    }

    fn poll_frame(&mut self, output: OutputId) -> Option<Duration> {
        let ctx = self.outputs.get_mut(&output)?;
        let pending = ctx.pending.as_ref()?;
        if !self.gl.client_wait(pending.fence, Duration::ZERO) {
            return None;
        }

        let pending = ctx.pending.take()?;
        self.gl.delete_fence(pending.fence);
        match pending.timer.query(&mut self.gl) {
            Some(time) => {
                ctx.journal.add(time);
                Some(time)
            }
            None => {
                pending.timer.discard(&mut self.gl);
                None
            }
        }
    }

    fn render_time_estimate(&self, output: OutputId) -> Duration {
        self.outputs
            .get(&output)
            .map_or(Duration::ZERO, |o| o.journal.estimate())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
