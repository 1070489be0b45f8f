//! Client buffers and the textures made from them.

pub mod buffer;
pub mod formats;
pub mod import;
