//! Graphics driver on top of EGL and OpenGL ES.
//!
//! Contexts are created on an EGL device display, so no window system is needed. All contexts
//! live in one share group rooted at a context that is never handed out, so textures, images and
//! programs are visible from every context. Output frames are drawn into an offscreen
//! framebuffer per context.

use std::collections::HashMap;
use std::ffi::CStr;
use std::fmt;
use std::ptr;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context as _};
use smithay::backend::allocator::Fourcc;
use smithay::backend::egl::ffi::egl as egl_ffi;
use smithay::backend::egl::{EGLContext, EGLDevice, EGLDisplay};
use smithay::backend::renderer::gles::{ffi, link_program, GlesRenderer};
use smithay::utils::{Buffer, Physical, Rectangle, Size};

use super::graphics::{
    ContextId, DrawCommand, FenceName, Graphics, ImageName, QueryName, ResetStatus, ShmPixels,
    TextureName, TextureTarget,
};
use crate::texture::buffer::DmabufAttributes;
use crate::texture::formats::{format_info, has_alpha, DmabufFormat, PlaneConversion};

const VERTEX_SRC: &str = r#"#version 100
attribute vec2 vert;
uniform vec4 rect;
uniform vec2 output_size;
uniform float flip_y;
varying vec2 v_coords;

void main() {
    v_coords = vec2(vert.x, mix(vert.y, 1.0 - vert.y, flip_y));
    vec2 pos = (rect.xy + vert * rect.zw) / output_size;
    gl_Position = vec4(pos.x * 2.0 - 1.0, 1.0 - pos.y * 2.0, 0.0, 1.0);
}
"#;

const SOLID_SRC: &str = r#"#version 100
precision mediump float;
uniform vec4 color;
uniform float alpha;
varying vec2 v_coords;

void main() {
    gl_FragColor = color * alpha;
}
"#;

const TEXTURE_SRC: &str = r#"#version 100
precision mediump float;
uniform sampler2D tex;
uniform float alpha;
uniform float brightness;
varying vec2 v_coords;

void main() {
    vec4 color = texture2D(tex, v_coords);
    gl_FragColor = vec4(color.rgb * brightness, color.a) * alpha;
}
"#;

const EXTERNAL_SRC: &str = r#"#version 100
#extension GL_OES_EGL_image_external : require
precision mediump float;
uniform samplerExternalOES tex;
uniform float alpha;
uniform float brightness;
varying vec2 v_coords;

void main() {
    vec4 color = texture2D(tex, v_coords);
    gl_FragColor = vec4(color.rgb * brightness, color.a) * alpha;
}
"#;

// BT.601 limited range.
const YUV_SRC: &str = r#"#version 100
precision mediump float;
uniform sampler2D tex;
uniform sampler2D tex_uv;
uniform float alpha;
uniform float brightness;
varying vec2 v_coords;

void main() {
    float y = texture2D(tex, v_coords).r - 0.0625;
    vec2 uv = texture2D(tex_uv, v_coords).rg - 0.5;
    vec3 rgb = vec3(
        1.164 * y + 1.596 * uv.y,
        1.164 * y - 0.392 * uv.x - 0.813 * uv.y,
        1.164 * y + 2.017 * uv.x
    );
    gl_FragColor = vec4(rgb * brightness, 1.0) * alpha;
}
"#;

const QUAD: [f32; 12] = [0., 0., 1., 0., 1., 1., 0., 0., 1., 1., 0., 1.];

#[derive(Debug, Clone, Copy)]
struct Program {
    program: u32,
    vert: i32,
    rect: i32,
    output_size: i32,
    flip_y: i32,
    alpha: i32,
    brightness: i32,
    color: i32,
    tex: i32,
    tex_uv: i32,
}

impl Program {
    unsafe fn compile(gl: &ffi::Gles2, fragment: &str) -> anyhow::Result<Self> {
        let program = link_program(gl, VERTEX_SRC, fragment)?;
        let uniform = |name: &CStr| gl.GetUniformLocation(program, name.as_ptr());
        Ok(Self {
            program,
            vert: gl.GetAttribLocation(program, c"vert".as_ptr()),
            rect: uniform(c"rect"),
            output_size: uniform(c"output_size"),
            flip_y: uniform(c"flip_y"),
            alpha: uniform(c"alpha"),
            brightness: uniform(c"brightness"),
            color: uniform(c"color"),
            tex: uniform(c"tex"),
            tex_uv: uniform(c"tex_uv"),
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Programs {
    solid: Program,
    texture: Program,
    external: Option<Program>,
    yuv: Program,
}

#[derive(Debug)]
struct Texture {
    target: TextureTarget,
    format: Fourcc,
    size: Size<i32, Buffer>,
    allocated: bool,
}

#[derive(Debug, Default)]
struct Framebuffer {
    fbo: u32,
    renderbuffer: u32,
    size: Size<i32, Physical>,
}

struct Context {
    renderer: GlesRenderer,
    framebuffer: Framebuffer,
}

/// Pixel transfer parameters for an shm format.
fn upload_format(fourcc: Fourcc) -> Option<(u32, u32, u32, i32)> {
    // (internal format, format, type, bytes per pixel)
    match fourcc {
        Fourcc::Argb8888 | Fourcc::Xrgb8888 => {
            Some((ffi::BGRA_EXT, ffi::BGRA_EXT, ffi::UNSIGNED_BYTE, 4))
        }
        Fourcc::Abgr8888 | Fourcc::Xbgr8888 => Some((ffi::RGBA, ffi::RGBA, ffi::UNSIGNED_BYTE, 4)),
        Fourcc::Abgr2101010 | Fourcc::Xbgr2101010 => Some((
            ffi::RGB10_A2,
            ffi::RGBA,
            ffi::UNSIGNED_INT_2_10_10_10_REV,
            4,
        )),
        Fourcc::R8 => Some((ffi::R8, ffi::RED, ffi::UNSIGNED_BYTE, 1)),
        Fourcc::Gr88 => Some((ffi::RG8, ffi::RG, ffi::UNSIGNED_BYTE, 2)),
        _ => None,
    }
}

fn gl_target(target: TextureTarget) -> u32 {
    match target {
        TextureTarget::Texture2D => ffi::TEXTURE_2D,
        TextureTarget::ExternalOes => ffi::TEXTURE_EXTERNAL_OES,
    }
}

pub struct EglGraphics {
    display: EGLDisplay,
    /// Owns the share group; never handed out.
    root: GlesRenderer,
    contexts: HashMap<ContextId, Context>,
    current: Option<ContextId>,
    next_name: u32,

    renderer_name: String,
    extensions: Vec<String>,
    formats: Vec<DmabufFormat>,
    programs: Programs,

    textures: HashMap<TextureName, Texture>,
    images: HashMap<ImageName, egl_ffi::types::EGLImage>,
    fences: HashMap<FenceName, ffi::types::GLsync>,
    /// Timestamps are taken when the fence placed at query time is first seen signaled.
    queries: HashMap<QueryName, (FenceName, Option<Duration>)>,
    epoch: Instant,
}

impl fmt::Debug for EglGraphics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EglGraphics")
            .field("renderer_name", &self.renderer_name)
            .field("contexts", &self.contexts.len())
            .field("current", &self.current)
            .field("textures", &self.textures.len())
            .field("images", &self.images.len())
            .finish_non_exhaustive()
    }
}

impl EglGraphics {
    /// Opens the first EGL device, preferring ones with a DRM render node.
    pub fn new() -> anyhow::Result<Self> {
        let _span = tracy_client::span!("EglGraphics::new");

        let mut devices: Vec<_> = EGLDevice::enumerate()
            .context("error enumerating EGL devices")?
            .collect();
        devices.sort_by_key(|device| !matches!(device.try_get_render_node(), Ok(Some(_))));
        let device = devices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no EGL devices"))?;

        let display = EGLDisplay::new(device).context("error creating EGL display")?;
        let context = EGLContext::new(&display).context("error creating EGL context")?;
        let mut root =
            unsafe { GlesRenderer::new(context) }.context("error creating GLES renderer")?;

        let (renderer_name, gl_extensions, programs) = root
            .with_context(|gl| unsafe {
                let string = |name| {
                    let ptr = gl.GetString(name);
                    if ptr.is_null() {
                        String::new()
                    } else {
                        CStr::from_ptr(ptr.cast()).to_string_lossy().into_owned()
                    }
                };
                let renderer_name = format!("{} ({})", string(ffi::RENDERER), string(ffi::VERSION));
                let extensions = string(ffi::EXTENSIONS);
                let extensions: Vec<String> =
                    extensions.split_whitespace().map(String::from).collect();

                let external = if extensions.iter().any(|e| e == "GL_OES_EGL_image_external") {
                    Some(Program::compile(gl, EXTERNAL_SRC)?)
                } else {
                    None
                };
                let programs = Programs {
                    solid: Program::compile(gl, SOLID_SRC)?,
                    texture: Program::compile(gl, TEXTURE_SRC)?,
                    external,
                    yuv: Program::compile(gl, YUV_SRC)?,
                };
                anyhow::Ok((renderer_name, extensions, programs))
            })
            .context("error making the EGL context current")??;

        let mut extensions: Vec<String> = display.extensions().to_vec();
        extensions.extend(gl_extensions);

        let render_formats: Vec<_> = display.dmabuf_render_formats().iter().copied().collect();
        let formats = display
            .dmabuf_texture_formats()
            .iter()
            .map(|format| DmabufFormat {
                format: format.code,
                modifier: format.modifier,
                external_only: !render_formats.contains(format),
            })
            .collect();

        unsafe {
            let _ = root.egl_context().unbind();
        }

        Ok(Self {
            display,
            root,
            contexts: HashMap::new(),
            current: None,
            next_name: 1,
            renderer_name,
            extensions,
            formats,
            programs,
            textures: HashMap::new(),
            images: HashMap::new(),
            fences: HashMap::new(),
            queries: HashMap::new(),
            epoch: Instant::now(),
        })
    }

    fn name(&mut self) -> u32 {
        let name = self.next_name;
        self.next_name += 1;
        name
    }

    /// Renderer of the current context, falling back to the root one.
    fn renderer(&mut self) -> &mut GlesRenderer {
        match self.current.and_then(|id| self.contexts.get_mut(&id)) {
            Some(context) => &mut context.renderer,
            None => &mut self.root,
        }
    }

    fn with_gl<R>(&mut self, f: impl FnOnce(&ffi::Gles2) -> R) -> Option<R> {
        match self.renderer().with_context(f) {
            Ok(rv) => Some(rv),
            Err(err) => {
                warn!("error making the GL context current: {err:?}");
                None
            }
        }
    }

    fn create_egl_image(
        &self,
        attrs: &DmabufAttributes,
        plane: Option<(usize, PlaneConversion)>,
    ) -> Option<egl_ffi::types::EGLImage> {
        const FD: [i32; 4] = [
            egl_ffi::DMA_BUF_PLANE0_FD_EXT as i32,
            egl_ffi::DMA_BUF_PLANE1_FD_EXT as i32,
            egl_ffi::DMA_BUF_PLANE2_FD_EXT as i32,
            egl_ffi::DMA_BUF_PLANE3_FD_EXT as i32,
        ];
        const OFFSET: [i32; 4] = [
            egl_ffi::DMA_BUF_PLANE0_OFFSET_EXT as i32,
            egl_ffi::DMA_BUF_PLANE1_OFFSET_EXT as i32,
            egl_ffi::DMA_BUF_PLANE2_OFFSET_EXT as i32,
            egl_ffi::DMA_BUF_PLANE3_OFFSET_EXT as i32,
        ];
        const PITCH: [i32; 4] = [
            egl_ffi::DMA_BUF_PLANE0_PITCH_EXT as i32,
            egl_ffi::DMA_BUF_PLANE1_PITCH_EXT as i32,
            egl_ffi::DMA_BUF_PLANE2_PITCH_EXT as i32,
            egl_ffi::DMA_BUF_PLANE3_PITCH_EXT as i32,
        ];
        const MODIFIER_LO: [i32; 4] = [
            egl_ffi::DMA_BUF_PLANE0_MODIFIER_LO_EXT as i32,
            egl_ffi::DMA_BUF_PLANE1_MODIFIER_LO_EXT as i32,
            egl_ffi::DMA_BUF_PLANE2_MODIFIER_LO_EXT as i32,
            egl_ffi::DMA_BUF_PLANE3_MODIFIER_LO_EXT as i32,
        ];
        const MODIFIER_HI: [i32; 4] = [
            egl_ffi::DMA_BUF_PLANE0_MODIFIER_HI_EXT as i32,
            egl_ffi::DMA_BUF_PLANE1_MODIFIER_HI_EXT as i32,
            egl_ffi::DMA_BUF_PLANE2_MODIFIER_HI_EXT as i32,
            egl_ffi::DMA_BUF_PLANE3_MODIFIER_HI_EXT as i32,
        ];

        let (format, width, height, planes) = match plane {
            Some((idx, conversion)) => {
                let p = attrs.planes.get(idx)?;
                format_info(conversion.format)?;
                (
                    conversion.format,
                    attrs.width / conversion.width_divisor,
                    attrs.height / conversion.height_divisor,
                    std::slice::from_ref(p),
                )
            }
            None => (attrs.format, attrs.width, attrs.height, &attrs.planes[..]),
        };
        if planes.is_empty() {
            return None;
        }

        let modifier: u64 = attrs.modifier.into();
        let with_modifier = self
            .display
            .extensions()
            .iter()
            .any(|e| e == "EGL_EXT_image_dma_buf_import_modifiers");

        let mut attribs = vec![
            egl_ffi::WIDTH as i32,
            width,
            egl_ffi::HEIGHT as i32,
            height,
            egl_ffi::LINUX_DRM_FOURCC_EXT as i32,
            format as i32,
        ];
        for (i, p) in planes.iter().enumerate() {
            attribs.extend([FD[i], p.fd, OFFSET[i], p.offset as i32, PITCH[i], p.stride as i32]);
            if with_modifier {
                attribs.extend([
                    MODIFIER_LO[i],
                    (modifier & 0xffff_ffff) as i32,
                    MODIFIER_HI[i],
                    (modifier >> 32) as i32,
                ]);
            }
        }
        attribs.push(egl_ffi::NONE as i32);

        let image = unsafe {
            egl_ffi::CreateImageKHR(
                **self.display.get_display_handle(),
                egl_ffi::NO_CONTEXT,
                egl_ffi::LINUX_DMA_BUF_EXT,
                ptr::null(),
                attribs.as_ptr(),
            )
        };
        if image == egl_ffi::NO_IMAGE_KHR {
            debug!("error importing {:?} dmabuf", attrs.format);
            return None;
        }
        Some(image)
    }

    fn ensure_framebuffer(&mut self, size: Size<i32, Physical>) -> Option<u32> {
        let id = self.current?;
        let context = self.contexts.get_mut(&id)?;
        let fb = &mut context.framebuffer;
        let rv = context.renderer.with_context(|gl| unsafe {
            if fb.fbo == 0 {
                gl.GenFramebuffers(1, &mut fb.fbo);
                gl.GenRenderbuffers(1, &mut fb.renderbuffer);
            }
            gl.BindFramebuffer(ffi::FRAMEBUFFER, fb.fbo);
            if fb.size != size {
                gl.BindRenderbuffer(ffi::RENDERBUFFER, fb.renderbuffer);
                gl.RenderbufferStorage(ffi::RENDERBUFFER, ffi::RGBA8, size.w, size.h);
                gl.FramebufferRenderbuffer(
                    ffi::FRAMEBUFFER,
                    ffi::COLOR_ATTACHMENT0,
                    ffi::RENDERBUFFER,
                    fb.renderbuffer,
                );
                fb.size = size;
            }
            gl.CheckFramebufferStatus(ffi::FRAMEBUFFER) == ffi::FRAMEBUFFER_COMPLETE
        });
        match rv {
            Ok(true) => Some(fb.fbo),
            Ok(false) => {
                warn!("offscreen framebuffer of size {size:?} is incomplete");
                None
            }
            Err(err) => {
                warn!("error making the GL context current: {err:?}");
                None
            }
        }
    }
}

impl Graphics for EglGraphics {
    fn renderer_name(&self) -> String {
        self.renderer_name.clone()
    }

    fn is_gles(&self) -> bool {
        true
    }

    fn has_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|e| e == name)
    }

    fn create_context(&mut self, share: Option<ContextId>) -> Option<ContextId> {
        let share = match share {
            Some(id) => self.contexts.get(&id)?.renderer.egl_context(),
            None => self.root.egl_context(),
        };
        let context = match EGLContext::new_shared(&self.display, share) {
            Ok(context) => context,
            Err(err) => {
                warn!("error creating shared EGL context: {err:?}");
                return None;
            }
        };
        let renderer = match unsafe { GlesRenderer::new(context) } {
            Ok(renderer) => renderer,
            Err(err) => {
                warn!("error creating GLES renderer: {err:?}");
                return None;
            }
        };

        let id = ContextId(self.name());
        self.contexts.insert(
            id,
            Context {
                renderer,
                framebuffer: Framebuffer::default(),
            },
        );
        // Creating the renderer leaves its context current.
        self.make_current(self.current);
        Some(id)
    }

    fn destroy_context(&mut self, id: ContextId) {
        let Some(mut context) = self.contexts.remove(&id) else {
            return;
        };
        let fb = std::mem::take(&mut context.framebuffer);
        if fb.fbo != 0 {
            let _ = context.renderer.with_context(|gl| unsafe {
                gl.DeleteFramebuffers(1, &fb.fbo);
                gl.DeleteRenderbuffers(1, &fb.renderbuffer);
            });
        }
        unsafe {
            let _ = context.renderer.egl_context().unbind();
        }
        if self.current == Some(id) {
            self.current = None;
        }
    }

    fn make_current(&mut self, id: Option<ContextId>) -> bool {
        match id {
            Some(id) => {
                let Some(context) = self.contexts.get(&id) else {
                    return false;
                };
                if let Err(err) = unsafe { context.renderer.egl_context().make_current() } {
                    warn!("error making EGL context current: {err:?}");
                    return false;
                }
                self.current = Some(id);
                true
            }
            None => {
                let context = match self.current.take() {
                    Some(id) => self.contexts.get(&id).map(|c| c.renderer.egl_context()),
                    None => Some(self.root.egl_context()),
                };
                if let Some(context) = context {
                    if let Err(err) = unsafe { context.unbind() } {
                        warn!("error releasing EGL context: {err:?}");
                    }
                }
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
        let opaque = format_info(format).is_some() && !has_alpha(format);
        let name = self
            .with_gl(|gl| unsafe {
                let mut tex = 0;
                gl.GenTextures(1, &mut tex);
                let target = gl_target(target);
                gl.BindTexture(target, tex);
                gl.TexParameteri(target, ffi::TEXTURE_MIN_FILTER, ffi::LINEAR as i32);
                gl.TexParameteri(target, ffi::TEXTURE_MAG_FILTER, ffi::LINEAR as i32);
                gl.TexParameteri(target, ffi::TEXTURE_WRAP_S, ffi::CLAMP_TO_EDGE as i32);
                gl.TexParameteri(target, ffi::TEXTURE_WRAP_T, ffi::CLAMP_TO_EDGE as i32);
                if opaque && target == ffi::TEXTURE_2D {
                    gl.TexParameteri(target, ffi::TEXTURE_SWIZZLE_A, ffi::ONE as i32);
                }
                gl.BindTexture(target, 0);
                tex
            })
            .unwrap_or(0);

        let texture = TextureName(name);
        self.textures.insert(
            texture,
            Texture {
                target,
                format,
                size,
                allocated: false,
            },
        );
        texture
    }

    fn upload(
        &mut self,
        texture: TextureName,
        rect: Rectangle<i32, Buffer>,
        pixels: Option<ShmPixels<'_>>,
    ) {
        let Some(tex) = self.textures.get(&texture) else {
            return;
        };
        let Some((internal, format, ty, bpp)) = upload_format(tex.format) else {
            debug!("can't upload {:?} pixels", tex.format);
            return;
        };
        let size = tex.size;
        let allocate = !tex.allocated;

        // The rect must lie within the buffer and the client memory must cover it.
        let rect = match rect.intersection(Rectangle::from_size(size)) {
            Some(rect) => rect,
            None => return,
        };
        let pixels = pixels.filter(|p| {
            let needed = i64::from(p.stride) * i64::from(rect.loc.y + rect.size.h - 1)
                + i64::from((rect.loc.x + rect.size.w) * bpp);
            p.stride > 0 && p.stride % bpp == 0 && needed <= p.data.len() as i64
        });

        let done = self.with_gl(|gl| unsafe {
            gl.BindTexture(ffi::TEXTURE_2D, texture.0);
            if allocate {
                gl.TexImage2D(
                    ffi::TEXTURE_2D,
                    0,
                    internal as i32,
                    size.w,
                    size.h,
                    0,
                    format,
                    ty,
                    ptr::null(),
                );
            }
            if let Some(pixels) = pixels {
                gl.PixelStorei(ffi::UNPACK_ROW_LENGTH, pixels.stride / bpp);
                gl.PixelStorei(ffi::UNPACK_SKIP_PIXELS, rect.loc.x);
                gl.PixelStorei(ffi::UNPACK_SKIP_ROWS, rect.loc.y);
                gl.TexSubImage2D(
                    ffi::TEXTURE_2D,
                    0,
                    rect.loc.x,
                    rect.loc.y,
                    rect.size.w,
                    rect.size.h,
                    format,
                    ty,
                    pixels.data.as_ptr().cast(),
                );
                gl.PixelStorei(ffi::UNPACK_ROW_LENGTH, 0);
                gl.PixelStorei(ffi::UNPACK_SKIP_PIXELS, 0);
                gl.PixelStorei(ffi::UNPACK_SKIP_ROWS, 0);
            }
            gl.BindTexture(ffi::TEXTURE_2D, 0);
        });
        if done.is_some() {
            if let Some(tex) = self.textures.get_mut(&texture) {
                tex.allocated = true;
            }
        }
    }

    fn delete_texture(&mut self, texture: TextureName) {
        if self.textures.remove(&texture).is_some() && texture.0 != 0 {
            self.with_gl(|gl| unsafe { gl.DeleteTextures(1, &texture.0) });
        }
    }

    fn create_image(
        &mut self,
        attrs: &DmabufAttributes,
        plane: Option<(usize, PlaneConversion)>,
    ) -> Option<ImageName> {
        let image = self.create_egl_image(attrs, plane)?;
        let name = ImageName(self.name());
        self.images.insert(name, image);
        Some(name)
    }

    fn destroy_image(&mut self, image: ImageName) {
        if let Some(image) = self.images.remove(&image) {
            unsafe {
                egl_ffi::DestroyImageKHR(**self.display.get_display_handle(), image);
            }
        }
    }

    fn bind_image(&mut self, texture: TextureName, image: ImageName) {
        let Some(&egl_image) = self.images.get(&image) else {
            return;
        };
        let Some(target) = self.textures.get(&texture).map(|t| gl_target(t.target)) else {
            return;
        };
        let bound = self.with_gl(|gl| unsafe {
            gl.BindTexture(target, texture.0);
            gl.EGLImageTargetTexture2DOES(target, egl_image);
            gl.BindTexture(target, 0);
        });
        if bound.is_some() {
            if let Some(tex) = self.textures.get_mut(&texture) {
                tex.allocated = true;
            }
        }
    }

    fn dmabuf_formats(&self) -> Vec<DmabufFormat> {
        self.formats.clone()
    }

    fn fence_sync(&mut self) -> FenceName {
        let sync = self
            .with_gl(|gl| unsafe { gl.FenceSync(ffi::SYNC_GPU_COMMANDS_COMPLETE, 0) })
            .unwrap_or(ptr::null());
        let fence = FenceName(self.name());
        self.fences.insert(fence, sync);
        fence
    }

    fn client_wait(&mut self, fence: FenceName, timeout: Duration) -> bool {
        let Some(&sync) = self.fences.get(&fence) else {
            return false;
        };
        if sync.is_null() {
            return true;
        }
        let timeout = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        self.with_gl(|gl| unsafe {
            let status = gl.ClientWaitSync(sync, ffi::SYNC_FLUSH_COMMANDS_BIT, timeout);
            status == ffi::ALREADY_SIGNALED || status == ffi::CONDITION_SATISFIED
        })
        .unwrap_or(false)
    }

    fn delete_fence(&mut self, fence: FenceName) {
        if let Some(sync) = self.fences.remove(&fence) {
            if !sync.is_null() {
                self.with_gl(|gl| unsafe { gl.DeleteSync(sync) });
            }
        }
    }

    fn query_timestamp(&mut self) -> QueryName {
        let fence = self.fence_sync();
        let query = QueryName(self.name());
        self.queries.insert(query, (fence, None));
        query
    }

    fn query_result(&mut self, query: QueryName) -> Option<Duration> {
        let (fence, time) = *self.queries.get(&query)?;
        if time.is_some() {
            return time;
        }
        if !self.client_wait(fence, Duration::ZERO) {
            return None;
        }
        let now = self.epoch.elapsed();
        self.delete_fence(fence);
        self.queries.insert(query, (fence, Some(now)));
        Some(now)
    }

    fn delete_query(&mut self, query: QueryName) {
        if let Some((fence, None)) = self.queries.remove(&query) {
            self.delete_fence(fence);
        }
    }

    fn reset_status(&mut self) -> ResetStatus {
        let status = self.with_gl(|gl| unsafe { gl.GetGraphicsResetStatus() });
        match status {
            Some(ffi::NO_ERROR) => ResetStatus::NoError,
            Some(ffi::GUILTY_CONTEXT_RESET) => ResetStatus::Guilty,
            Some(ffi::INNOCENT_CONTEXT_RESET) => ResetStatus::Innocent,
            _ => ResetStatus::Unknown,
        }
    }

    fn draw(
        &mut self,
        size: Size<i32, Physical>,
        commands: &[DrawCommand],
        scissor: &[Rectangle<i32, Physical>],
    ) {
        let _span = tracy_client::span!("EglGraphics::draw");

        let Some(fbo) = self.ensure_framebuffer(size) else {
            return;
        };
        let programs = self.programs;
        let targets: Vec<Vec<(u32, u32)>> = commands
            .iter()
            .map(|cmd| {
                cmd.textures
                    .iter()
                    .filter_map(|t| self.textures.get(t).map(|tex| (gl_target(tex.target), t.0)))
                    .collect()
            })
            .collect();
        let full = [Rectangle::from_size(size)];
        let scissor = if scissor.is_empty() { &full[..] } else { scissor };

        self.with_gl(|gl| unsafe {
            gl.BindFramebuffer(ffi::FRAMEBUFFER, fbo);
            gl.Viewport(0, 0, size.w, size.h);
            gl.Enable(ffi::BLEND);
            gl.BlendFunc(ffi::ONE, ffi::ONE_MINUS_SRC_ALPHA);
            gl.Enable(ffi::SCISSOR_TEST);

            for rect in scissor {
                // Scissor origin is bottom-left.
                gl.Scissor(
                    rect.loc.x,
                    size.h - rect.loc.y - rect.size.h,
                    rect.size.w,
                    rect.size.h,
                );

                for (cmd, textures) in commands.iter().zip(&targets) {
                    let program = match (cmd.color, textures.as_slice()) {
                        (Some(_), _) => programs.solid,
                        (None, [_, _, ..]) => programs.yuv,
                        (None, [(ffi::TEXTURE_EXTERNAL_OES, _)]) => match programs.external {
                            Some(program) => program,
                            None => continue,
                        },
                        (None, [_]) => programs.texture,
                        (None, []) => continue,
                    };

                    gl.UseProgram(program.program);
                    let g = cmd.geometry;
                    gl.Uniform4f(
                        program.rect,
                        g.loc.x as f32,
                        g.loc.y as f32,
                        g.size.w as f32,
                        g.size.h as f32,
                    );
                    gl.Uniform2f(program.output_size, size.w as f32, size.h as f32);
                    gl.Uniform1f(program.flip_y, if cmd.flip_y { 1. } else { 0. });
                    gl.Uniform1f(program.alpha, cmd.opacity);
                    gl.Uniform1f(program.brightness, cmd.brightness);
                    if let Some([r, g, b, a]) = cmd.color {
                        gl.Uniform4f(program.color, r, g, b, a);
                    }
                    for (unit, (target, tex)) in textures.iter().take(2).enumerate() {
                        gl.ActiveTexture(ffi::TEXTURE0 + unit as u32);
                        gl.BindTexture(*target, *tex);
                    }
                    gl.Uniform1i(program.tex, 0);
                    gl.Uniform1i(program.tex_uv, 1);

                    gl.EnableVertexAttribArray(program.vert as u32);
                    gl.VertexAttribPointer(
                        program.vert as u32,
                        2,
                        ffi::FLOAT,
                        ffi::FALSE,
                        0,
                        QUAD.as_ptr().cast(),
                    );
                    gl.DrawArrays(ffi::TRIANGLES, 0, 6);
                    gl.DisableVertexAttribArray(program.vert as u32);

                    for (unit, (target, _)) in textures.iter().take(2).enumerate() {
                        gl.ActiveTexture(ffi::TEXTURE0 + unit as u32);
                        gl.BindTexture(*target, 0);
                    }
                }
            }

            gl.Disable(ffi::SCISSOR_TEST);
            gl.Disable(ffi::BLEND);
            gl.BindFramebuffer(ffi::FRAMEBUFFER, 0);
            gl.Flush();
        });
    }
}

impl Drop for EglGraphics {
    fn drop(&mut self) {
        let images: Vec<_> = self.images.keys().copied().collect();
        for image in images {
            self.destroy_image(image);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shm_formats_upload_without_conversion() {
        assert_eq!(upload_format(Fourcc::Xrgb8888).map(|f| f.1), Some(ffi::BGRA_EXT));
        assert_eq!(upload_format(Fourcc::Abgr8888).map(|f| f.1), Some(ffi::RGBA));
        assert_eq!(upload_format(Fourcc::Gr88).map(|f| f.3), Some(2));
        assert_eq!(upload_format(Fourcc::Nv12), None);
    }

    #[test]
    fn draws_offscreen_when_a_device_is_present() {
        let Ok(mut gl) = EglGraphics::new() else {
            return;
        };
        assert!(gl.has_extension("EGL_KHR_surfaceless_context"));

        let share = gl.create_context(None).unwrap();
        let output = gl.create_context(Some(share)).unwrap();
        assert!(gl.make_current(Some(share)));

        let size = Size::from((4, 4));
        let texture = gl.create_texture(TextureTarget::Texture2D, Fourcc::Argb8888, size);
        let pixels = vec![0xffu8; 4 * 4 * 4];
        gl.upload(
            texture,
            Rectangle::from_size(size),
            Some(ShmPixels {
                data: &pixels,
                stride: 16,
            }),
        );

        assert!(gl.make_current(Some(output)));
        let command = DrawCommand {
            textures: vec![texture],
            color: None,
            geometry: Rectangle::from_size(Size::from((4, 4))),
            opacity: 1.,
            brightness: 1.,
            flip_y: false,
        };
        gl.draw(Size::from((8, 8)), &[command], &[]);
        let fence = gl.fence_sync();
        assert!(gl.client_wait(fence, Duration::from_secs(1)));
        gl.delete_fence(fence);

        gl.delete_texture(texture);
        assert!(gl.make_current(None));
        gl.destroy_context(output);
        gl.destroy_context(share);
    }
}
