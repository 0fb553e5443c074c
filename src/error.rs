//! Error types for the steady-state (post-init) API.
//!
//! Device bring-up (`GpuDevice::init`) stays on `anyhow::Error`, matching
//! the donor's `VulkanContext::new`. Everything past that point uses
//! [`GpuError`] for the error kinds that are genuinely recoverable (§7);
//! native Vulkan failures are not represented here at all — they are
//! fatal and go through [`fatal_vk`].

use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("{kind} pool exhausted")]
    PoolExhausted { kind: &'static str },

    #[error("shader compilation failed for stage {stage}: {log}")]
    ShaderCompilation { stage: &'static str, log: String },

    #[error("descriptor set layout {0:?} has no binding at index {1}")]
    UnknownBinding(u32, u32),

    #[error("invalid handle passed to {0}")]
    InvalidHandle(&'static str),
}

/// Native Vulkan call failed. Per §7.2 this is treated as unrecoverable:
/// log the code and terminate. Steady-state code calls this instead of
/// propagating a `Result` for `vk::Result` errors.
#[track_caller]
pub fn fatal_vk(context: &'static str, result: vk::Result) -> ! {
    tracing::error!(context, error = %result, "unrecoverable Vulkan API failure");
    panic!("fatal Vulkan error in {context}: {result}");
}

pub trait VkResultExt<T> {
    fn or_fatal(self, context: &'static str) -> T;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    fn or_fatal(self, context: &'static str) -> T {
        match self {
            Ok(v) => v,
            Err(e) => fatal_vk(context, e),
        }
    }
}
