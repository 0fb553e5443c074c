//! Per-(frame × thread) command pools and primary/secondary buffer rings
//! (C7, §4.4). Pool addressing is a single discipline:
//! `pool_index(frame, thread) = frame * num_threads + thread`, so worker
//! threads recording concurrently never touch the same native pool
//! (§5 — disjointness by construction, not by locking).

use ash::vk;

/// Fixed ring size per `(frame, thread)` pool, for both the primary and the
/// secondary buffer rings. `get_command_buffer` beyond this is a programmer
/// error, not a condition to grow into (§8 boundary behavior).
pub const COMMAND_BUFFERS_PER_RING: u32 = 16;

pub struct ThreadFramePool {
    pub vk_pool: vk::CommandPool,
    pub primary_buffers: Vec<vk::CommandBuffer>,
    pub secondary_buffers: Vec<vk::CommandBuffer>,
    used_primary: u32,
    used_secondary: u32,
}

impl ThreadFramePool {
    pub fn new(vk_pool: vk::CommandPool) -> Self {
        ThreadFramePool {
            vk_pool,
            primary_buffers: Vec::new(),
            secondary_buffers: Vec::new(),
            used_primary: 0,
            used_secondary: 0,
        }
    }

    pub fn reset(&mut self) {
        self.used_primary = 0;
        self.used_secondary = 0;
    }

    /// Returns the index of the next unused primary buffer, allocating it
    /// lazily via `allocate` the first time the ring reaches this depth.
    /// Fatal assertion once `COMMAND_BUFFERS_PER_RING` is exceeded (§8).
    pub fn next_primary<F>(&mut self, allocate: F) -> u32
    where
        F: FnOnce(&vk::CommandPool) -> vk::CommandBuffer,
    {
        assert!(
            self.used_primary < COMMAND_BUFFERS_PER_RING,
            "primary command buffer ring exhausted: {} buffers already in use this frame",
            self.used_primary
        );
        if self.used_primary as usize >= self.primary_buffers.len() {
            self.primary_buffers.push(allocate(&self.vk_pool));
        }
        let index = self.used_primary;
        self.used_primary += 1;
        index
    }

    pub fn next_secondary<F>(&mut self, allocate: F) -> u32
    where
        F: FnOnce(&vk::CommandPool) -> vk::CommandBuffer,
    {
        assert!(
            self.used_secondary < COMMAND_BUFFERS_PER_RING,
            "secondary command buffer ring exhausted: {} buffers already in use this frame",
            self.used_secondary
        );
        if self.used_secondary as usize >= self.secondary_buffers.len() {
            self.secondary_buffers.push(allocate(&self.vk_pool));
        }
        let index = self.used_secondary;
        self.used_secondary += 1;
        index
    }
}

/// Owns every `(frame, thread)` pool for the main queue family, plus one
/// dedicated compute pool per frame.
pub struct CommandBufferManager {
    pub pools: Vec<ThreadFramePool>,
    pub compute_pools: Vec<ThreadFramePool>,
    num_threads: u32,
    max_frames: u32,
}

impl CommandBufferManager {
    pub fn new(num_threads: u32, max_frames: u32) -> Self {
        CommandBufferManager {
            pools: Vec::new(),
            compute_pools: Vec::new(),
            num_threads,
            max_frames,
        }
    }

    pub fn pool_index(&self, frame: u32, thread: u32) -> u32 {
        frame * self.num_threads + thread
    }

    pub fn reset_pools(&mut self, frame: u32) {
        for thread in 0..self.num_threads {
            let idx = self.pool_index(frame, thread) as usize;
            if let Some(pool) = self.pools.get_mut(idx) {
                pool.reset();
            }
        }
        if let Some(pool) = self.compute_pools.get_mut(frame as usize) {
            pool.reset();
        }
    }

    pub fn num_threads(&self) -> u32 {
        self.num_threads
    }

    pub fn max_frames(&self) -> u32 {
        self.max_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_index_is_disjoint_per_frame_and_thread() {
        let mgr = CommandBufferManager::new(4, 3);
        let mut seen = std::collections::HashSet::new();
        for frame in 0..3 {
            for thread in 0..4 {
                assert!(seen.insert(mgr.pool_index(frame, thread)));
            }
        }
    }

    #[test]
    fn ring_lazily_allocates_then_reuses_on_reset() {
        let mut pool = ThreadFramePool::new(vk::CommandPool::null());
        let mut allocated = 0;
        let a = pool.next_primary(|_| {
            allocated += 1;
            vk::CommandBuffer::null()
        });
        pool.reset();
        let b = pool.next_primary(|_| {
            allocated += 1;
            vk::CommandBuffer::null()
        });
        assert_eq!(a, 0);
        assert_eq!(b, 0);
        assert_eq!(allocated, 1, "reset should reuse the already-allocated buffer");
    }

    #[test]
    #[should_panic(expected = "ring exhausted")]
    fn ring_overflow_is_fatal() {
        let mut pool = ThreadFramePool::new(vk::CommandPool::null());
        for _ in 0..=COMMAND_BUFFERS_PER_RING {
            pool.next_primary(|_| vk::CommandBuffer::null());
        }
    }
}
