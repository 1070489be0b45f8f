//! Windows created by the compositor itself.

use crate::texture::buffer::BufferId;

#[derive(Debug, Default)]
pub struct InternalState {
    pub name: String,
    /// Framebuffer the compositor renders the window contents into.
    pub framebuffer: Option<BufferId>,
}
