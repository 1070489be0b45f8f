//! Client buffers.

use std::collections::HashMap;
use std::fmt;
use std::os::fd::RawFd;
use std::rc::Rc;

use arrayvec::ArrayVec;
use smithay::backend::allocator::{Fourcc, Modifier};
use smithay::utils::{Buffer, Logical, Size};

use super::formats;
use crate::display::{ClientEvent, ClientId, Display};
use crate::utils::id::define_id;

define_id!(BufferId);

/// Point on a DRM syncobj timeline used for explicit synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyncPoint {
    pub timeline: u32,
    pub point: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShmAttributes {
    pub format: Fourcc,
    pub width: i32,
    pub height: i32,
    pub stride: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmabufPlane {
    pub fd: RawFd,
    pub offset: u32,
    pub stride: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmabufAttributes {
    pub format: Fourcc,
    pub modifier: Modifier,
    pub width: i32,
    pub height: i32,
    pub planes: ArrayVec<DmabufPlane, 4>,
}

/// Color of a single-pixel buffer, each channel scaled to the full `u32` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinglePixel {
    pub r: u32,
    pub g: u32,
    pub b: u32,
    pub a: u32,
}

impl SinglePixel {
    pub fn is_opaque(&self) -> bool {
        self.a == u32::MAX
    }

    pub fn to_f32(self) -> [f32; 4] {
        let f = |c: u32| (c as f64 / u32::MAX as f64) as f32;
        [f(self.r), f(self.g), f(self.b), f(self.a)]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferKind {
    Shm(ShmAttributes),
    Dmabuf(DmabufAttributes),
    SinglePixel(SinglePixel),
    /// Framebuffer of a window rendered by the compositor itself.
    Internal { size: Size<i32, Buffer> },
}

/// Memory backing a shared-memory buffer.
pub trait ShmContents: fmt::Debug {
    /// Calls `f` with the pixels starting at the buffer offset.
    ///
    /// Returns `false` if the memory can't be accessed, e.g. because the client is gone.
    fn with_pixels(&self, f: &mut dyn FnMut(&[u8])) -> bool;
}

#[derive(Debug)]
pub struct GraphicsBuffer {
    pub id: BufferId,
    pub client: Option<ClientId>,
    pub kind: BufferKind,
    /// Pixels of an shm buffer, when it lives in real client memory.
    pub contents: Option<Rc<dyn ShmContents>>,
    /// Number of surfaces that currently reference the buffer.
    refs: u32,
}

impl GraphicsBuffer {
    pub fn size(&self) -> Size<i32, Buffer> {
        match &self.kind {
            BufferKind::Shm(attrs) => Size::from((attrs.width, attrs.height)),
            BufferKind::Dmabuf(attrs) => Size::from((attrs.width, attrs.height)),
            BufferKind::SinglePixel(_) => Size::from((1, 1)),
            BufferKind::Internal { size } => *size,
        }
    }

    pub fn has_alpha_channel(&self) -> bool {
        match &self.kind {
            BufferKind::Shm(attrs) => formats::has_alpha(attrs.format),
            BufferKind::Dmabuf(attrs) => formats::has_alpha(attrs.format),
            BufferKind::SinglePixel(pixel) => !pixel.is_opaque(),
            BufferKind::Internal { .. } => true,
        }
    }

    pub fn is_referenced(&self) -> bool {
        self.refs > 0
    }
}

/// Owner of all live buffers.
#[derive(Debug, Default)]
pub struct BufferStore {
    buffers: HashMap<BufferId, GraphicsBuffer>,
}

impl BufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, client: Option<ClientId>, kind: BufferKind) -> BufferId {
        let id = BufferId::next();
        trace!("new buffer {id:?}: {kind:?}");
        self.buffers.insert(
            id,
            GraphicsBuffer {
                id,
                client,
                kind,
                contents: None,
                refs: 0,
            },
        );
        id
    }

    pub fn set_contents(&mut self, id: BufferId, contents: Rc<dyn ShmContents>) {
        if let Some(buffer) = self.buffers.get_mut(&id) {
            buffer.contents = Some(contents);
        }
    }

    pub fn get(&self, id: BufferId) -> Option<&GraphicsBuffer> {
        self.buffers.get(&id)
    }

    /// Logical size of a buffer attached to a surface with the given scale.
    pub fn logical_size(&self, id: BufferId, scale: i32) -> Option<Size<i32, Logical>> {
        let buffer = self.get(id)?;
        let size = buffer.size();
        if let BufferKind::SinglePixel(_) = buffer.kind {
            // Single-pixel buffers are always scaled through a viewport.
            return Some(Size::from((1, 1)));
        }
        Some(size.to_logical(scale.max(1), smithay::utils::Transform::Normal))
    }

    pub fn add_ref(&mut self, id: BufferId) {
        if let Some(buffer) = self.buffers.get_mut(&id) {
            buffer.refs += 1;
        }
    }

    /// Drops a surface reference, sending `wl_buffer.release` when the last one goes away.
    pub fn unref(&mut self, id: BufferId, display: &mut Display) {
        let Some(buffer) = self.buffers.get_mut(&id) else {
            return;
        };
        buffer.refs = buffer.refs.saturating_sub(1);
        if buffer.refs == 0 {
            if let Some(client) = buffer.client {
                display.send(client, ClientEvent::BufferRelease { buffer: id });
            }
        }
    }

    /// Removes a buffer destroyed by its client.
    pub fn destroy(&mut self, id: BufferId) -> Option<GraphicsBuffer> {
        self.buffers.remove(&id)
    }

    /// Removes every buffer owned by the client.
    pub fn destroy_client_buffers(&mut self, client: ClientId) -> Vec<BufferId> {
        let ids: Vec<_> = self
            .buffers
            .values()
            .filter(|b| b.client == Some(client))
            .map(|b| b.id)
            .collect();
        for id in &ids {
            self.buffers.remove(id);
        }
        ids
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_sent_when_last_reference_dropped() {
        let mut display = Display::new();
        let client = display.create_client(None);
        let mut store = BufferStore::new();
        let id = store.create(
            Some(client),
            BufferKind::Shm(ShmAttributes {
                format: Fourcc::Argb8888,
                width: 10,
                height: 20,
                stride: 40,
            }),
        );

        store.add_ref(id);
        store.add_ref(id);
        store.unref(id, &mut display);
        assert!(display.events(client).is_empty());
        store.unref(id, &mut display);
        assert_eq!(
            display.events(client),
            [ClientEvent::BufferRelease { buffer: id }]
        );
    }

    #[test]
    fn logical_size_respects_scale() {
        let mut store = BufferStore::new();
        let id = store.create(
            None,
            BufferKind::Internal {
                size: Size::from((200, 100)),
            },
        );
        assert_eq!(store.logical_size(id, 2), Some(Size::from((100, 50))));

        let pixel = store.create(
            None,
            BufferKind::SinglePixel(SinglePixel {
                r: u32::MAX,
                g: 0,
                b: 0,
                a: u32::MAX,
            }),
        );
        assert_eq!(store.logical_size(pixel, 3), Some(Size::from((1, 1))));
        assert!(!store.get(pixel).unwrap().has_alpha_channel());
    }
}
