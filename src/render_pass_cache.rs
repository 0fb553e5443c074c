//! Content-addressed render-pass cache (C6, §4.3).
//!
//! Keyed by the fxhash fingerprint of a [`RenderPassOutput`]; misses
//! construct a fresh native render pass via the caller-supplied factory
//! closure, hits reuse the cached handle. Skipped entirely when dynamic
//! rendering is in use (the caller never calls in on that path).

use std::collections::HashMap;

use ash::vk;

use crate::resources::RenderPassOutput;

#[derive(Default)]
pub struct RenderPassCache {
    map: HashMap<u64, vk::RenderPass>,
}

impl RenderPassCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached render pass for `output`'s fingerprint, or
    /// invokes `create` to build one and caches it.
    pub fn get_or_create<F>(&mut self, output: &RenderPassOutput, create: F) -> vk::RenderPass
    where
        F: FnOnce() -> vk::RenderPass,
    {
        let fingerprint = output.fingerprint();
        if let Some(pass) = self.map.get(&fingerprint) {
            return *pass;
        }
        let pass = create();
        self.map.insert(fingerprint, pass);
        pass
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Destroys every cached render pass via `destroy`, called once at
    /// device shutdown.
    pub fn clear<F>(&mut self, mut destroy: F)
    where
        F: FnMut(vk::RenderPass),
    {
        for (_, pass) in self.map.drain() {
            destroy(pass);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_fingerprints_share_one_native_pass() {
        let mut cache = RenderPassCache::new();
        let mut output = RenderPassOutput::default();
        output.reset().color(
            vk::Format::B8G8R8A8_SRGB,
            vk::ImageLayout::PRESENT_SRC_KHR,
            crate::enums::RenderPassOperation::Clear,
        );

        let mut created = 0u32;
        let a = cache.get_or_create(&output, || {
            created += 1;
            vk::RenderPass::from_raw(1)
        });
        let b = cache.get_or_create(&output, || {
            created += 1;
            vk::RenderPass::from_raw(2)
        });

        assert_eq!(a, b);
        assert_eq!(created, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn distinct_fingerprints_get_distinct_passes() {
        let mut cache = RenderPassCache::new();
        let mut out1 = RenderPassOutput::default();
        out1.reset().color(
            vk::Format::B8G8R8A8_SRGB,
            vk::ImageLayout::PRESENT_SRC_KHR,
            crate::enums::RenderPassOperation::Clear,
        );
        let mut out2 = RenderPassOutput::default();
        out2.reset().color(
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageLayout::PRESENT_SRC_KHR,
            crate::enums::RenderPassOperation::Clear,
        );

        let a = cache.get_or_create(&out1, || vk::RenderPass::from_raw(1));
        let b = cache.get_or_create(&out2, || vk::RenderPass::from_raw(2));
        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
    }
}
