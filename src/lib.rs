//! A handle-based, bindless-first GPU device abstraction over Vulkan
//! (§1). The device itself lives in [`device::GpuDevice`]; the other
//! modules are the subsystems it composes: resource pools, deferred
//! deletion, the dynamic per-frame buffer, the bindless descriptor
//! update queue, render-pass/pipeline construction, the swapchain, and
//! the per-frame command/query pools.

pub mod bindless;
pub mod command_buffer;
pub mod command_pool;
pub mod config;
pub mod deletion_queue;
pub mod device;
pub mod dynamic_buffer;
pub mod enums;
pub mod error;
pub mod frame;
pub mod handle;
pub mod pipeline_factory;
pub mod query;
pub mod render_pass;
pub mod render_pass_cache;
pub mod resources;
pub mod spirv;
pub mod swapchain;
pub mod utils;

pub use config::{DebugOptions, DeviceLimits, GpuDeviceCreation, WindowHandle};
pub use device::{GpuDevice, MappedBuffer, QueueFamilyIndices, SupportedFeatures};
pub use error::GpuError;
pub use frame::PresentOutcome;
pub use handle::{Handle, INVALID_INDEX};
pub use resources::*;
