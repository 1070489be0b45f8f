//! Turning client buffers into textures.

use std::collections::HashMap;

use smithay::backend::allocator::{Fourcc, Modifier};
use smithay::utils::{Buffer, Rectangle, Size};

use super::buffer::{BufferId, BufferKind, DmabufAttributes, GraphicsBuffer};
use super::formats::{format_info, yuv_conversion, DmabufFormat};
use crate::backend::graphics::{Graphics, ImageName, ShmPixels, TextureName, TextureTarget};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferImportError {
    #[error("unsupported format {0:?}")]
    UnsupportedFormat(Fourcc),
    #[error("dmabuf has no planes")]
    NoPlanes,
    #[error("failed to import plane {plane} of a {format:?} dmabuf")]
    ImageCreation { format: Fourcc, plane: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneTexture {
    pub name: TextureName,
    pub target: TextureTarget,
    pub size: Size<i32, Buffer>,
    /// GL textures are bottom-origin, so client content needs a vertical flip.
    pub flip_y: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceTexture {
    Shm {
        buffer: BufferId,
        format: Fourcc,
        plane: PlaneTexture,
    },
    Dmabuf {
        buffer: BufferId,
        planes: Vec<PlaneTexture>,
    },
    SinglePixel {
        buffer: BufferId,
        color: [f32; 4],
    },
    Internal {
        buffer: BufferId,
        plane: PlaneTexture,
    },
}

impl SurfaceTexture {
    pub fn buffer(&self) -> BufferId {
        match self {
            SurfaceTexture::Shm { buffer, .. }
            | SurfaceTexture::Dmabuf { buffer, .. }
            | SurfaceTexture::SinglePixel { buffer, .. }
            | SurfaceTexture::Internal { buffer, .. } => *buffer,
        }
    }

    pub fn planes(&self) -> Vec<PlaneTexture> {
        match self {
            SurfaceTexture::Shm { plane, .. } | SurfaceTexture::Internal { plane, .. } => {
                vec![*plane]
            }
            SurfaceTexture::Dmabuf { planes, .. } => planes.clone(),
            SurfaceTexture::SinglePixel { .. } => Vec::new(),
        }
    }

    pub fn color(&self) -> Option<[f32; 4]> {
        match self {
            SurfaceTexture::SinglePixel { color, .. } => Some(*color),
            _ => None,
        }
    }
}

/// Uploads part of an shm buffer, passing along its pixels when they are reachable.
fn upload_shm(
    gl: &mut dyn Graphics,
    buffer: &GraphicsBuffer,
    stride: i32,
    texture: TextureName,
    rect: Rectangle<i32, Buffer>,
) {
    let Some(contents) = &buffer.contents else {
        gl.upload(texture, rect, None);
        return;
    };
    let accessible = contents.with_pixels(&mut |data| {
        gl.upload(texture, rect, Some(ShmPixels { data, stride }));
    });
    if !accessible {
        warn!("contents of {:?} are gone, not uploading", buffer.id);
    }
}

#[derive(Debug, Clone, Copy)]
struct ImportedPlane {
    image: ImageName,
    texture: PlaneTexture,
}

/// Imports buffers and owns the EGLImages created for dmabufs.
///
/// Images are keyed by `(buffer, plane)` and live until the buffer is destroyed.
#[derive(Debug, Default)]
pub struct TextureImporter {
    images: HashMap<(BufferId, usize), ImportedPlane>,
    formats: Vec<DmabufFormat>,
}

impl TextureImporter {
    pub fn new(formats: Vec<DmabufFormat>) -> Self {
        Self {
            images: HashMap::new(),
            formats,
        }
    }

    pub fn formats(&self) -> &[DmabufFormat] {
        &self.formats
    }

    fn native_format(&self, format: Fourcc, modifier: Modifier) -> Option<&DmabufFormat> {
        self.formats
            .iter()
            .find(|f| f.format == format && f.modifier == modifier)
    }

    /// Brings `texture` up to date with the buffer contents.
    ///
    /// `damage` is in buffer coordinates. Shared memory textures for the same buffer kind are only
    /// partially re-uploaded.
    pub fn update(
        &mut self,
        gl: &mut dyn Graphics,
        texture: &mut Option<SurfaceTexture>,
        buffer: &GraphicsBuffer,
        damage: &[Rectangle<i32, Buffer>],
    ) -> Result<(), BufferImportError> {
        let _span = tracy_client::span!("TextureImporter::update");

        let size = buffer.size();
        match &buffer.kind {
            BufferKind::Shm(attrs) => {
                if format_info(attrs.format).is_none() {
                    return Err(BufferImportError::UnsupportedFormat(attrs.format));
                }

                if let Some(SurfaceTexture::Shm {
                    buffer: current,
                    format,
                    plane,
                }) = texture
                {
                    if *format == attrs.format && plane.size == size {
                        *current = buffer.id;
                        let bounds = Rectangle::from_size(size);
                        if damage.len() >= 3 {
                            let bbox = damage[1..]
                                .iter()
                                .fold(damage[0], |acc, r| acc.merge(*r));
                            if let Some(rect) = bbox.intersection(bounds) {
                                upload_shm(gl, buffer, attrs.stride, plane.name, rect);
                            }
                        } else {
                            for rect in damage {
                                if let Some(rect) = rect.intersection(bounds) {
                                    upload_shm(gl, buffer, attrs.stride, plane.name, rect);
                                }
                            }
                        }
                        return Ok(());
                    }
                }

                self.release(gl, texture.take());
                let name = gl.create_texture(TextureTarget::Texture2D, attrs.format, size);
                upload_shm(gl, buffer, attrs.stride, name, Rectangle::from_size(size));
                *texture = Some(SurfaceTexture::Shm {
                    buffer: buffer.id,
                    format: attrs.format,
                    plane: PlaneTexture {
                        name,
                        target: TextureTarget::Texture2D,
                        size,
                        flip_y: true,
                    },
                });
            }
            BufferKind::Dmabuf(attrs) => {
                if texture.as_ref().map(SurfaceTexture::buffer) == Some(buffer.id) {
                    return Ok(());
                }
                self.release(gl, texture.take());
                let planes = self.import_dmabuf(gl, buffer.id, attrs)?;
                *texture = Some(SurfaceTexture::Dmabuf {
                    buffer: buffer.id,
                    planes,
                });
            }
            BufferKind::SinglePixel(pixel) => {
                self.release(gl, texture.take());
                *texture = Some(SurfaceTexture::SinglePixel {
                    buffer: buffer.id,
                    color: pixel.to_f32(),
                });
            }
            BufferKind::Internal { size } => {
                if let Some(SurfaceTexture::Internal { buffer: current, plane }) = texture {
                    if *current == buffer.id && plane.size == *size {
                        return Ok(());
                    }
                }
                self.release(gl, texture.take());
                let name = gl.create_texture(TextureTarget::Texture2D, Fourcc::Abgr8888, *size);
                *texture = Some(SurfaceTexture::Internal {
                    buffer: buffer.id,
                    plane: PlaneTexture {
                        name,
                        target: TextureTarget::Texture2D,
                        size: *size,
                        flip_y: false,
                    },
                });
            }
        }

        Ok(())
    }

    fn import_dmabuf(
        &mut self,
        gl: &mut dyn Graphics,
        id: BufferId,
        attrs: &DmabufAttributes,
    ) -> Result<Vec<PlaneTexture>, BufferImportError> {
        if attrs.planes.is_empty() {
            return Err(BufferImportError::NoPlanes);
        }

        if let Some(imported) = self.images.get(&(id, 0)) {
            let mut planes = vec![imported.texture];
            let mut idx = 1;
            while let Some(imported) = self.images.get(&(id, idx)) {
                planes.push(imported.texture);
                idx += 1;
            }
            return Ok(planes);
        }

        let size = Size::from((attrs.width, attrs.height));

        if let Some(native) = self.native_format(attrs.format, attrs.modifier).copied() {
            let image = gl
                .create_image(attrs, None)
                .ok_or(BufferImportError::ImageCreation {
                    format: attrs.format,
                    plane: 0,
                })?;
            let target = if native.external_only {
                TextureTarget::ExternalOes
            } else {
                TextureTarget::Texture2D
            };
            let name = gl.create_texture(target, attrs.format, size);
            gl.bind_image(name, image);
            let texture = PlaneTexture {
                name,
                target,
                size,
                flip_y: true,
            };
            self.images.insert((id, 0), ImportedPlane { image, texture });
            return Ok(vec![texture]);
        }

        let Some(conversion) = yuv_conversion(attrs.format) else {
            return Err(BufferImportError::UnsupportedFormat(attrs.format));
        };

        let mut imported: Vec<ImportedPlane> = Vec::with_capacity(conversion.len());
        for (idx, plane) in conversion.iter().enumerate() {
            let Some(image) = gl.create_image(attrs, Some((idx, *plane))) else {
                for plane in imported {
                    gl.destroy_image(plane.image);
                    gl.delete_texture(plane.texture.name);
                }
                return Err(BufferImportError::ImageCreation {
                    format: attrs.format,
                    plane: idx,
                });
            };
            let plane_size = Size::from((
                attrs.width / plane.width_divisor,
                attrs.height / plane.height_divisor,
            ));
            let name = gl.create_texture(TextureTarget::Texture2D, plane.format, plane_size);
            gl.bind_image(name, image);
            imported.push(ImportedPlane {
                image,
                texture: PlaneTexture {
                    name,
                    target: TextureTarget::Texture2D,
                    size: plane_size,
                    flip_y: true,
                },
            });
        }

        let textures = imported.iter().map(|p| p.texture).collect();
        for (idx, plane) in imported.into_iter().enumerate() {
            self.images.insert((id, idx), plane);
        }
        Ok(textures)
    }

    /// Checks that every plane of the dmabuf imports before it's accepted from a client.
    pub fn test_import_buffer(&mut self, gl: &mut dyn Graphics, attrs: &DmabufAttributes) -> bool {
        if attrs.planes.is_empty() {
            return false;
        }

        if self.native_format(attrs.format, attrs.modifier).is_some() {
            return match gl.create_image(attrs, None) {
                Some(image) => {
                    gl.destroy_image(image);
                    true
                }
                None => false,
            };
        }

        let Some(conversion) = yuv_conversion(attrs.format) else {
            return false;
        };
        let mut images = Vec::new();
        let mut ok = true;
        for (idx, plane) in conversion.iter().enumerate() {
            match gl.create_image(attrs, Some((idx, *plane))) {
                Some(image) => images.push(image),
                None => {
                    ok = false;
                    break;
                }
            }
        }
        for image in images {
            gl.destroy_image(image);
        }
        ok
    }

    /// Drops a texture that is no longer used by a surface.
    ///
    /// Dmabuf textures stay cached with their images until the buffer is destroyed.
    pub fn release(&mut self, gl: &mut dyn Graphics, texture: Option<SurfaceTexture>) {
        match texture {
            Some(SurfaceTexture::Shm { plane, .. }) | Some(SurfaceTexture::Internal { plane, .. }) => {
                gl.delete_texture(plane.name)
            }
            Some(SurfaceTexture::Dmabuf { .. }) | Some(SurfaceTexture::SinglePixel { .. }) | None => {
            }
        }
    }

    /// Destroys the images of a destroyed buffer.
    pub fn buffer_destroyed(&mut self, gl: &mut dyn Graphics, id: BufferId) {
        let keys: Vec<_> = self
            .images
            .keys()
            .filter(|(buffer, _)| *buffer == id)
            .copied()
            .collect();
        for key in keys {
            if let Some(imported) = self.images.remove(&key) {
                gl.destroy_image(imported.image);
                gl.delete_texture(imported.texture.name);
            }
        }
    }

    pub fn cached_images(&self) -> usize {
        self.images.len()
    }
}
