//! Bindless descriptor update queue (C4, §4.7 step 3, §4.9).
//!
//! Texture create/destroy events are batched here and flushed once per
//! `present` into a single set of descriptor writes against the shared
//! bindless descriptor set, instead of writing on every `create_texture`
//! call (grounded in `rikka_gpu-src-gpu.rs.rs`'s
//! `bindless_images_to_update` field and `gpu_device.cpp`'s
//! `texture_to_update_bindless` drain).

use crate::resources::TextureHandle;

#[derive(Debug, Clone, Copy)]
pub enum BindlessUpdateKind {
    /// A freshly created texture that must be written into its slot.
    Create,
    /// A texture being destroyed; its slot is rewritten to the dummy
    /// texture before the native image is released.
    Delete,
}

#[derive(Debug, Clone, Copy)]
pub struct BindlessUpdate {
    pub kind: BindlessUpdateKind,
    pub texture: TextureHandle,
    pub bindless_index: u32,
    pub is_compute_target: bool,
}

#[derive(Default)]
pub struct BindlessUpdateQueue {
    pending: Vec<BindlessUpdate>,
}

impl BindlessUpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the descriptor write that binds a newly created texture into
    /// its slot. The slot is the texture's own handle index, not a
    /// separately allocated counter — a destroy-then-recreate under the
    /// same handle index must land in the same bindless slot (glossary,
    /// scenario 3), and slots never need to be recycled since they are
    /// already keyed by the handle pool's own free list.
    pub fn queue_create(&mut self, texture: TextureHandle, is_compute_target: bool, capacity: u32) -> Option<u32> {
        let index = texture.index;
        if index >= capacity {
            tracing::warn!(capacity, index, "bindless array exhausted");
            return None;
        }
        self.pending.push(BindlessUpdate {
            kind: BindlessUpdateKind::Create,
            texture,
            bindless_index: index,
            is_compute_target,
        });
        Some(index)
    }

    /// Rewrites an already-allocated slot to point at `texture`'s current
    /// native image view, used when a render-target texture is recreated
    /// in place by `resize_texture` rather than re-created under a new
    /// handle (§4.11).
    pub fn queue_rewrite(&mut self, texture: TextureHandle, bindless_index: u32, is_compute_target: bool) {
        self.pending.push(BindlessUpdate {
            kind: BindlessUpdateKind::Create,
            texture,
            bindless_index,
            is_compute_target,
        });
    }

    pub fn queue_delete(&mut self, texture: TextureHandle, bindless_index: u32, is_compute_target: bool) {
        self.pending.push(BindlessUpdate {
            kind: BindlessUpdateKind::Delete,
            texture,
            bindless_index,
            is_compute_target,
        });
    }

    /// Takes every pending update for the caller to turn into descriptor
    /// writes; the queue is empty afterwards (§4.7 step 3 runs once per
    /// `present`, not incrementally).
    pub fn drain(&mut self) -> Vec<BindlessUpdate> {
        std::mem::take(&mut self.pending)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Handle;

    #[test]
    fn create_uses_handle_index_as_slot() {
        let mut q = BindlessUpdateQueue::new();
        let a = q.queue_create(Handle::new(0), false, 1024).unwrap();
        let b = q.queue_create(Handle::new(5), false, 1024).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 5);
    }

    #[test]
    fn recreate_under_same_handle_index_reuses_slot() {
        let mut q = BindlessUpdateQueue::new();
        let h: TextureHandle = Handle::new(3);
        assert_eq!(q.queue_create(h, false, 1024).unwrap(), 3);
        q.queue_delete(h, 3, false);
        assert_eq!(q.queue_create(h, false, 1024).unwrap(), 3);
    }

    #[test]
    fn exhausted_array_returns_none() {
        let mut q = BindlessUpdateQueue::new();
        let h: TextureHandle = Handle::new(0);
        assert!(q.queue_create(h, false, 0).is_none());
    }

    #[test]
    fn drain_empties_queue() {
        let mut q = BindlessUpdateQueue::new();
        let h: TextureHandle = Handle::new(0);
        q.queue_create(h, false, 1024);
        assert_eq!(q.drain().len(), 1);
        assert!(q.is_empty());
    }
}
