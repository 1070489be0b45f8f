//! Graphics driver interface.
//!
//! The OpenGL backend talks to the GPU exclusively through [`Graphics`]. The real driver lives in
//! [`super::egl`]. Tests use `VirtualGraphics`, an in-memory driver that tracks every object it
//! hands out and can be told to fail imports or to report a context reset.

#[cfg(test)]
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use smithay::backend::allocator::Fourcc;
#[cfg(test)]
use smithay::backend::allocator::Modifier;
use smithay::utils::{Buffer, Physical, Rectangle, Size};

use crate::texture::buffer::DmabufAttributes;
#[cfg(test)]
use crate::texture::formats::format_info;
use crate::texture::formats::{DmabufFormat, PlaneConversion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureName(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageName(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FenceName(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryName(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureTarget {
    Texture2D,
    ExternalOes,
}

/// Result of `glGetGraphicsResetStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetStatus {
    NoError,
    Guilty,
    Innocent,
    Unknown,
}

/// Client pixels for a texture upload.
#[derive(Debug, Clone, Copy)]
pub struct ShmPixels<'a> {
    pub data: &'a [u8],
    /// Bytes per row.
    pub stride: i32,
}

/// One textured or solid quad.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCommand {
    pub textures: Vec<TextureName>,
    pub color: Option<[f32; 4]>,
    pub geometry: Rectangle<i32, Physical>,
    pub opacity: f32,
    pub brightness: f32,
    pub flip_y: bool,
}

pub trait Graphics {
    fn renderer_name(&self) -> String;
    fn is_gles(&self) -> bool;
    fn has_extension(&self, name: &str) -> bool;

    fn create_context(&mut self, share: Option<ContextId>) -> Option<ContextId>;
    fn destroy_context(&mut self, context: ContextId);
    /// Makes the context current, or releases the current one for `None`.
    fn make_current(&mut self, context: Option<ContextId>) -> bool;

    fn create_texture(
        &mut self,
        target: TextureTarget,
        format: Fourcc,
        size: Size<i32, Buffer>,
    ) -> TextureName;
    /// Uploads the damaged part of a texture. Without pixels the texture contents are undefined.
    fn upload(
        &mut self,
        texture: TextureName,
        rect: Rectangle<i32, Buffer>,
        pixels: Option<ShmPixels<'_>>,
    );
    fn delete_texture(&mut self, texture: TextureName);

    /// Imports a dmabuf, or one plane of it when `plane` is set.
    fn create_image(
        &mut self,
        attrs: &DmabufAttributes,
        plane: Option<(usize, PlaneConversion)>,
    ) -> Option<ImageName>;
    fn destroy_image(&mut self, image: ImageName);
    fn bind_image(&mut self, texture: TextureName, image: ImageName);
    fn dmabuf_formats(&self) -> Vec<DmabufFormat>;

    fn fence_sync(&mut self) -> FenceName;
    /// Waits for the fence, returning whether it was signaled.
    fn client_wait(&mut self, fence: FenceName, timeout: Duration) -> bool;
    fn delete_fence(&mut self, fence: FenceName);

    fn query_timestamp(&mut self) -> QueryName;
    /// GPU timestamp of the query, `None` while it's not available yet.
    fn query_result(&mut self, query: QueryName) -> Option<Duration>;
    fn delete_query(&mut self, query: QueryName);

    fn reset_status(&mut self) -> ResetStatus;

    fn draw(
        &mut self,
        size: Size<i32, Physical>,
        commands: &[DrawCommand],
        scissor: &[Rectangle<i32, Physical>],
    );
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    pub size: Size<i32, Physical>,
    pub commands: Vec<DrawCommand>,
    pub scissor: Vec<Rectangle<i32, Physical>>,
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct VirtualGraphics {
    next_name: u32,
    gles: bool,
    extensions: HashSet<String>,
    formats: Vec<DmabufFormat>,

    contexts: HashSet<ContextId>,
    current: Option<ContextId>,
    textures: HashMap<TextureName, (TextureTarget, Fourcc, Size<i32, Buffer>)>,
    images: HashSet<ImageName>,
    fences: HashSet<FenceName>,
    queries: HashMap<QueryName, Duration>,
    gpu_time: Duration,

    /// Formats for which `create_image` fails.
    pub failing_formats: Vec<Fourcc>,
    /// Number of `reset_status` calls that report a reset before it completes.
    pub pending_reset: Option<u32>,
    /// GPU time taken by every drawn frame.
    pub frame_time: Duration,
    pub uploads: Vec<(TextureName, Rectangle<i32, Buffer>)>,
    /// Length and stride of the pixels passed with each upload.
    pub uploaded_pixels: Vec<Option<(usize, i32)>>,
    pub frames: Vec<RecordedFrame>,
}

#[cfg(test)]
impl VirtualGraphics {
    pub fn new() -> Self {
        let extensions = [
            "EGL_EXT_image_dma_buf_import",
            "EGL_EXT_image_dma_buf_import_modifiers",
            "GL_OES_EGL_image_external",
            "GL_EXT_disjoint_timer_query",
            "GL_KHR_robustness",
            "EGL_KHR_surfaceless_context",
        ];

        let mut formats = Vec::new();
        for format in [
            Fourcc::Argb8888,
            Fourcc::Xrgb8888,
            Fourcc::Abgr8888,
            Fourcc::Xbgr8888,
            Fourcc::Argb2101010,
            Fourcc::Xrgb2101010,
        ] {
            for modifier in [Modifier::Linear, Modifier::Invalid] {
                formats.push(DmabufFormat {
                    format,
                    modifier,
                    external_only: false,
                });
            }
        }
        for format in [Fourcc::Nv12, Fourcc::P010] {
            formats.push(DmabufFormat {
                format,
                modifier: Modifier::Linear,
                external_only: true,
            });
        }

        Self {
            next_name: 1,
            extensions: extensions.into_iter().map(String::from).collect(),
            formats,
            frame_time: Duration::from_micros(500),
            ..Default::default()
        }
    }

    pub fn with_gles(mut self, gles: bool) -> Self {
        self.gles = gles;
        self
    }

    pub fn without_extension(mut self, name: &str) -> Self {
        self.extensions.remove(name);
        self
    }

    fn name(&mut self) -> u32 {
        let name = self.next_name;
        self.next_name += 1;
        name
    }

    pub fn current_context(&self) -> Option<ContextId> {
        self.current
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_images(&self) -> usize {
        self.images.len()
    }

    pub fn live_fences(&self) -> usize {
        self.fences.len()
    }

    pub fn texture_target(&self, texture: TextureName) -> Option<TextureTarget> {
        self.textures.get(&texture).map(|(target, _, _)| *target)
    }
}

#[cfg(test)]
impl Graphics for VirtualGraphics {
    fn renderer_name(&self) -> String {
        if self.gles {
            String::from("virtual GLES 3.2")
        } else {
            String::from("virtual GL 4.6")
        }
    }

    fn is_gles(&self) -> bool {
        self.gles
    }

    fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains(name)
    }

    fn create_context(&mut self, share: Option<ContextId>) -> Option<ContextId> {
        if let Some(share) = share {
            if !self.contexts.contains(&share) {
                return None;
            }
        }
        let context = ContextId(self.name());
        self.contexts.insert(context);
        Some(context)
    }

    fn destroy_context(&mut self, context: ContextId) {
        self.contexts.remove(&context);
        if self.current == Some(context) {
            self.current = None;
        }
    }

    fn make_current(&mut self, context: Option<ContextId>) -> bool {
        match context {
            Some(context) if !self.contexts.contains(&context) => false,
            context => {
                self.current = context;
                true
            }
        }
    }

    fn create_texture(
        &mut self,
        target: TextureTarget,
        format: Fourcc,
        size: Size<i32, Buffer>,
    ) -> TextureName {
        let texture = TextureName(self.name());
        self.textures.insert(texture, (target, format, size));
        texture
    }

    fn upload(
        &mut self,
        texture: TextureName,
        rect: Rectangle<i32, Buffer>,
        pixels: Option<ShmPixels<'_>>,
    ) {
        self.uploads.push((texture, rect));
        self.uploaded_pixels
            .push(pixels.map(|p| (p.data.len(), p.stride)));
    }

    fn delete_texture(&mut self, texture: TextureName) {
        self.textures.remove(&texture);
    }

    fn create_image(
        &mut self,
        attrs: &DmabufAttributes,
        plane: Option<(usize, PlaneConversion)>,
    ) -> Option<ImageName> {
        if self.failing_formats.contains(&attrs.format) {
            return None;
        }
        match plane {
            Some((idx, conversion)) => {
                if idx >= attrs.planes.len() || format_info(conversion.format).is_none() {
                    return None;
                }
            }
            None => {
                let supported = self.formats.iter().any(|f| f.format == attrs.format);
                if !supported || attrs.planes.is_empty() {
                    return None;
                }
            }
        }
        let image = ImageName(self.name());
        self.images.insert(image);
        Some(image)
    }

    fn destroy_image(&mut self, image: ImageName) {
        self.images.remove(&image);
    }

    fn bind_image(&mut self, _texture: TextureName, _image: ImageName) {}

    fn dmabuf_formats(&self) -> Vec<DmabufFormat> {
        self.formats.clone()
    }

    fn fence_sync(&mut self) -> FenceName {
        let fence = FenceName(self.name());
        self.fences.insert(fence);
        fence
    }

    fn client_wait(&mut self, fence: FenceName, _timeout: Duration) -> bool {
        self.fences.contains(&fence)
    }

    fn delete_fence(&mut self, fence: FenceName) {
        self.fences.remove(&fence);
    }

    fn query_timestamp(&mut self) -> QueryName {
        let query = QueryName(self.name());
        self.queries.insert(query, self.gpu_time);
        query
    }

    fn query_result(&mut self, query: QueryName) -> Option<Duration> {
        self.queries.get(&query).copied()
    }

    fn delete_query(&mut self, query: QueryName) {
        self.queries.remove(&query);
    }

    fn reset_status(&mut self) -> ResetStatus {
        match &mut self.pending_reset {
            None => ResetStatus::NoError,
            Some(0) => {
                self.pending_reset = None;
                ResetStatus::NoError
            }
            Some(remaining) => {
                *remaining -= 1;
                ResetStatus::Innocent
            }
        }
    }

    fn draw(
        &mut self,
        size: Size<i32, Physical>,
        commands: &[DrawCommand],
        scissor: &[Rectangle<i32, Physical>],
    ) {
        self.gpu_time += self.frame_time;
        self.frames.push(RecordedFrame {
            size,
            commands: commands.to_vec(),
            scissor: scissor.to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_context_requires_live_share_context() {
        let mut gl = VirtualGraphics::new();
        let share = gl.create_context(None).unwrap();
        assert!(gl.create_context(Some(share)).is_some());
        gl.destroy_context(share);
        assert!(gl.create_context(Some(share)).is_none());
    }

    #[test]
    fn reset_completes_after_countdown() {
        let mut gl = VirtualGraphics::new();
        gl.pending_reset = Some(2);
        assert_eq!(gl.reset_status(), ResetStatus::Innocent);
        assert_eq!(gl.reset_status(), ResetStatus::Innocent);
        assert_eq!(gl.reset_status(), ResetStatus::NoError);
        assert_eq!(gl.pending_reset, None);
    }
}
