//! Deferred (two-phase) destruction (C3, §4.?, open question in §9.1).
//!
//! Destroying a resource never frees its native objects immediately;
//! instead an entry is enqueued and drained once the frame-lag window
//! (`max_frames`) has elapsed. There is no dummy-handle indirection: a
//! destroy call enqueues a tagged entry directly.

use crate::handle::INVALID_INDEX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Buffer,
    Texture,
    Sampler,
    ShaderState,
    Pipeline,
    DescriptorSetLayout,
    DescriptorSet,
    RenderPass,
    Framebuffer,
}

#[derive(Debug, Clone, Copy)]
pub struct DeletionEntry {
    pub kind: ResourceKind,
    pub index: u32,
    /// Frame (mod `max_frames`) at which this entry becomes safe to drain.
    pub ready_frame: u32,
}

/// A single tagged-union queue shared by every resource kind, per
/// SPEC_FULL.md §9.1's resolution of the dummy-handle open question.
#[derive(Default)]
pub struct DeletionQueue {
    entries: Vec<DeletionEntry>,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `index` for destruction once `current_frame` reaches
    /// `ready_frame` (computed by the caller from `(current_frame + 1) %
    /// max_frames`, i.e. one full lap of the pipeline).
    pub fn enqueue(&mut self, kind: ResourceKind, index: u32, ready_frame: u32) {
        if index == INVALID_INDEX {
            tracing::warn!(?kind, "ignoring deletion of invalid handle");
            return;
        }
        self.entries.push(DeletionEntry {
            kind,
            index,
            ready_frame,
        });
    }

    /// Removes and returns every entry ready to drain at `current_frame`,
    /// using swap-remove to match the source's swap-with-last pattern —
    /// order among ready entries does not matter.
    pub fn drain_ready(&mut self, current_frame: u32) -> Vec<DeletionEntry> {
        let mut ready = Vec::new();
        let mut i = 0;
        while i < self.entries.len() {
            if self.entries[i].ready_frame == current_frame {
                ready.push(self.entries.swap_remove(i));
            } else {
                i += 1;
            }
        }
        ready
    }

    pub fn pending_len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_drain_only_at_their_ready_frame() {
        let mut q = DeletionQueue::new();
        q.enqueue(ResourceKind::Buffer, 3, 2);
        q.enqueue(ResourceKind::Texture, 7, 0);

        assert!(q.drain_ready(0).iter().any(|e| e.index == 7));
        assert!(q.drain_ready(1).is_empty());
        let drained_at_2 = q.drain_ready(2);
        assert_eq!(drained_at_2.len(), 1);
        assert_eq!(drained_at_2[0].index, 3);
        assert_eq!(q.pending_len(), 0);
    }

    #[test]
    fn invalid_index_is_not_enqueued() {
        let mut q = DeletionQueue::new();
        q.enqueue(ResourceKind::Buffer, INVALID_INDEX, 0);
        assert_eq!(q.pending_len(), 0);
    }
}
