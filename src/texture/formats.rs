//! DRM format tables.

use serde::Serialize;
use smithay::backend::allocator::{Fourcc, Modifier};

/// How a DRM format maps onto GL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    pub fourcc: Fourcc,
    pub bits_per_color: u32,
    pub alpha_bits: u32,
    /// Sized GL internal format.
    pub gl_format: u32,
}

const GL_RGBA8: u32 = 0x8058;
const GL_RGB10_A2: u32 = 0x8059;
const GL_RGBA16F: u32 = 0x881A;
const GL_R8: u32 = 0x8229;
const GL_RG8: u32 = 0x822B;
const GL_R16: u32 = 0x822A;
const GL_RG16: u32 = 0x822C;

const KNOWN_FORMATS: &[FormatInfo] = &[
    info(Fourcc::Argb8888, 8, 8, GL_RGBA8),
    info(Fourcc::Xrgb8888, 8, 0, GL_RGBA8),
    info(Fourcc::Abgr8888, 8, 8, GL_RGBA8),
    info(Fourcc::Xbgr8888, 8, 0, GL_RGBA8),
    info(Fourcc::Rgba8888, 8, 8, GL_RGBA8),
    info(Fourcc::Bgra8888, 8, 8, GL_RGBA8),
    info(Fourcc::Argb2101010, 10, 2, GL_RGB10_A2),
    info(Fourcc::Xrgb2101010, 10, 0, GL_RGB10_A2),
    info(Fourcc::Abgr2101010, 10, 2, GL_RGB10_A2),
    info(Fourcc::Xbgr2101010, 10, 0, GL_RGB10_A2),
    info(Fourcc::Abgr16161616f, 16, 16, GL_RGBA16F),
    info(Fourcc::Xbgr16161616f, 16, 0, GL_RGBA16F),
    info(Fourcc::R8, 8, 0, GL_R8),
    info(Fourcc::Gr88, 8, 0, GL_RG8),
    info(Fourcc::R16, 16, 0, GL_R16),
    info(Fourcc::Gr1616, 16, 0, GL_RG16),
];

const fn info(fourcc: Fourcc, bits_per_color: u32, alpha_bits: u32, gl_format: u32) -> FormatInfo {
    FormatInfo {
        fourcc,
        bits_per_color,
        alpha_bits,
        gl_format,
    }
}

pub fn format_info(fourcc: Fourcc) -> Option<&'static FormatInfo> {
    KNOWN_FORMATS.iter().find(|f| f.fourcc == fourcc)
}

pub fn has_alpha(fourcc: Fourcc) -> bool {
    format_info(fourcc).is_some_and(|f| f.alpha_bits > 0)
}

/// Plane of a multi-planar format that is sampled as its own texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneConversion {
    pub format: Fourcc,
    pub width_divisor: i32,
    pub height_divisor: i32,
}

const fn plane(format: Fourcc, width_divisor: i32, height_divisor: i32) -> PlaneConversion {
    PlaneConversion {
        format,
        width_divisor,
        height_divisor,
    }
}

const NV12_PLANES: &[PlaneConversion] = &[plane(Fourcc::R8, 1, 1), plane(Fourcc::Gr88, 2, 2)];
const P010_PLANES: &[PlaneConversion] = &[plane(Fourcc::R16, 1, 1), plane(Fourcc::Gr1616, 2, 2)];
const XYUV_PLANES: &[PlaneConversion] = &[plane(Fourcc::Xrgb8888, 1, 1)];

/// Per-plane formats for YUV formats converted to RGB in the shader.
pub fn yuv_conversion(fourcc: Fourcc) -> Option<&'static [PlaneConversion]> {
    match fourcc {
        Fourcc::Nv12 => Some(NV12_PLANES),
        Fourcc::P010 => Some(P010_PLANES),
        Fourcc::Xyuv8888 => Some(XYUV_PLANES),
        _ => None,
    }
}

/// A (format, modifier) pair the renderer can import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmabufFormat {
    pub format: Fourcc,
    pub modifier: Modifier,
    /// The driver can only sample this pair through `GL_TEXTURE_EXTERNAL_OES`.
    pub external_only: bool,
}

/// Serialized form of the format table.
#[derive(Debug, Serialize)]
pub struct FormatEntry {
    pub format: String,
    pub modifier: String,
    pub external_only: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub planes: Vec<PlaneEntry>,
}

#[derive(Debug, Serialize)]
pub struct PlaneEntry {
    pub format: String,
    pub width_divisor: i32,
    pub height_divisor: i32,
}

impl From<&DmabufFormat> for FormatEntry {
    fn from(format: &DmabufFormat) -> Self {
        let planes = yuv_conversion(format.format)
            .unwrap_or_default()
            .iter()
            .map(|p| PlaneEntry {
                format: format!("{:?}", p.format),
                width_divisor: p.width_divisor,
                height_divisor: p.height_divisor,
            })
            .collect();

        Self {
            format: format!("{:?}", format.format),
            modifier: format!("{:#x}", u64::from(format.modifier)),
            external_only: format.external_only,
            planes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_converts_through_two_planes() {
        let planes = yuv_conversion(Fourcc::Nv12).unwrap();
        assert_eq!(planes.len(), 2);
        assert_eq!(planes[0].format, Fourcc::R8);
        assert_eq!(planes[1].format, Fourcc::Gr88);
        assert_eq!((planes[1].width_divisor, planes[1].height_divisor), (2, 2));

        assert!(yuv_conversion(Fourcc::Argb8888).is_none());
    }

    #[test]
    fn alpha_bits() {
        assert!(has_alpha(Fourcc::Argb8888));
        assert!(!has_alpha(Fourcc::Xrgb8888));
        assert!(has_alpha(Fourcc::Abgr2101010));
        assert_eq!(
            format_info(Fourcc::Abgr16161616f).unwrap().gl_format,
            GL_RGBA16F
        );
    }

    #[test]
    fn format_entry_json() {
        let entry = FormatEntry::from(&DmabufFormat {
            format: Fourcc::Nv12,
            modifier: Modifier::Linear,
            external_only: true,
        });
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["modifier"], "0x0");
        assert_eq!(json["external_only"], true);
        assert_eq!(json["planes"].as_array().unwrap().len(), 2);
        assert_eq!(json["planes"][1]["width_divisor"], 2);

        let rgb = FormatEntry::from(&DmabufFormat {
            format: Fourcc::Argb8888,
            modifier: Modifier::Linear,
            external_only: false,
        });
        let json = serde_json::to_value(&rgb).unwrap();
        assert!(json.get("planes").is_none());
    }
}
