//! Headless backend.
//!
//! Outputs are virtual and frames are drawn offscreen with EGL on the first available device, so
//! this backend works without a display server. Without a usable device only software
//! compositing is available.

use smithay::utils::{Point, Size};

use super::egl::EglGraphics;
#[cfg(test)]
use super::graphics::VirtualGraphics;
use super::opengl::OpenGlBackend;
use super::software::SoftwareBackend;
use super::{BackendInitError, CompositingType, RenderBackend};
use crate::output::{Output, OutputId};
use crate::Strata;

#[derive(Debug)]
enum Gpu {
    Egl,
    #[cfg(test)]
    Virtual(VirtualGraphics),
    None,
}

pub struct Headless {
    gpu: Gpu,
    next_output: u8,
}

impl Headless {
    pub fn new() -> Self {
        Self {
            gpu: Gpu::Egl,
            next_output: 1,
        }
    }

    /// Headless backend whose OpenGL renderer can't be created.
    pub fn without_gpu() -> Self {
        Self {
            gpu: Gpu::None,
            next_output: 1,
        }
    }

    #[cfg(test)]
    pub fn with_graphics(graphics: VirtualGraphics) -> Self {
        Self {
            gpu: Gpu::Virtual(graphics),
            next_output: 1,
        }
    }

    pub fn init(&mut self, strata: &mut Strata) {
        let configured: Vec<_> = strata.config.borrow().outputs.clone();
        for output in configured {
            let (w, h) = output
                .mode
                .map_or((1920, 1080), |m| (m.width, m.height));
            let position = output.position.map(|p| Point::from((p.x, p.y)));
            let mut new = Output::new(
                output.name.clone(),
                Size::from((i32::from(w), i32::from(h))),
                output.scale(),
                Point::from((0, 0)),
            );
            match position {
                Some(position) => new.geometry.loc = position,
                None => new.geometry.loc = Point::from((strata.outputs.bounding_rect().size.w, 0)),
            }
            self.next_output = self.next_output.saturating_add(1);
            strata.add_output(new);
        }
    }

    /// Adds an output to the right of the existing ones.
    pub fn add_output(&mut self, strata: &mut Strata, n: u8, size: (u16, u16)) -> OutputId {
        let x = strata.outputs.bounding_rect().size.w;
        let output = Output::new(
            format!("headless-{n}"),
            Size::from((i32::from(size.0), i32::from(size.1))),
            1.,
            Point::from((x, 0)),
        );
        self.next_output = self.next_output.max(n.saturating_add(1));
        strata.add_output(output)
    }

    /// Adds an output numbered after the existing ones.
    pub fn add_next_output(&mut self, strata: &mut Strata, size: (u16, u16)) -> OutputId {
        let n = self.next_output;
        self.add_output(strata, n, size)
    }

    pub fn seat_name(&self) -> String {
        "headless".to_owned()
    }

    pub fn supported_compositors(&self) -> Vec<CompositingType> {
        vec![CompositingType::OpenGl, CompositingType::Software]
    }

    pub fn create_opengl_backend(
        &mut self,
        prefer_gles: bool,
        render_time_history: usize,
    ) -> Result<Box<dyn RenderBackend>, BackendInitError> {
        match std::mem::replace(&mut self.gpu, Gpu::None) {
            Gpu::Egl => {
                // EGL device displays only offer GLES contexts.
                if !prefer_gles {
                    debug!("using GLES on the headless EGL device");
                }
                let graphics = EglGraphics::new().map_err(|err| {
                    warn!("error initializing EGL: {err:?}");
                    BackendInitError::NoDevice
                })?;
                let backend = OpenGlBackend::new(graphics, render_time_history)?;
                Ok(Box::new(backend))
            }
            #[cfg(test)]
            Gpu::Virtual(graphics) => {
                use super::graphics::Graphics as _;

                let gles = prefer_gles || graphics.is_gles();
                let graphics = graphics.with_gles(gles);
                let backend = OpenGlBackend::new(graphics, render_time_history)?;
                Ok(Box::new(backend))
            }
            Gpu::None => Err(BackendInitError::NoDevice),
        }
    }

    pub fn create_software_backend(&mut self) -> Box<dyn RenderBackend> {
        Box::new(SoftwareBackend::new())
    }
}

impl Default for Headless {
    fn default() -> Self {
        Self::new()
    }
}
