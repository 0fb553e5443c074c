//! Device creation options (§6), in the donor's builder style: methods
//! take and return `&mut Self` rather than the consuming-builder pattern,
//! matching the creation structs in `gpu_resources.hpp`.

use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle, RawDisplayHandle, RawWindowHandle};

/// Per-frame and per-thread capacities that are fixed at device creation
/// and referenced throughout the frame scheduler, command buffer manager,
/// and query manager.
#[derive(Debug, Clone, Copy)]
pub struct DeviceLimits {
    pub max_frames: u32,
    pub max_swapchain_images: u32,
    pub bindless_resources_per_array: u32,
    pub descriptor_pool_sets: u32,
    pub descriptor_pool_per_type: u32,
    pub max_color_attachments: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        DeviceLimits {
            max_frames: 3,
            max_swapchain_images: 3,
            bindless_resources_per_array: 1024,
            descriptor_pool_sets: 4096,
            descriptor_pool_per_type: 128,
            max_color_attachments: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DebugOptions {
    pub enable_validation_layer: bool,
    pub enable_debug_utils: bool,
    pub enable_synchronization_validation: bool,
}

/// An opaque, type-erased window/display handle pair the surface backend
/// consumes. The windowing library itself is an external collaborator
/// (SPEC_FULL.md §1); this struct only carries what `ash-window` needs.
pub struct WindowHandle {
    raw_window: RawWindowHandle,
    raw_display: RawDisplayHandle,
}

impl WindowHandle {
    pub fn new<W>(window: &W) -> Self
    where
        W: HasRawWindowHandle + HasRawDisplayHandle,
    {
        WindowHandle {
            raw_window: window.raw_window_handle(),
            raw_display: window.raw_display_handle(),
        }
    }
}

unsafe impl HasRawWindowHandle for WindowHandle {
    fn raw_window_handle(&self) -> RawWindowHandle {
        self.raw_window
    }
}

unsafe impl HasRawDisplayHandle for WindowHandle {
    fn raw_display_handle(&self) -> RawDisplayHandle {
        self.raw_display
    }
}

/// Builder for [`crate::device::GpuDevice::init`]. Mirrors the donor's
/// constructor arguments rather than a config-file layer (SPEC_FULL.md §1.1).
pub struct GpuDeviceCreation {
    pub(crate) window: Option<WindowHandle>,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) num_threads: u32,
    pub(crate) gpu_time_queries_per_frame: u32,
    pub(crate) force_disable_dynamic_rendering: bool,
    pub(crate) debug: DebugOptions,
    pub(crate) limits: DeviceLimits,
    pub(crate) application_name: String,
    pub(crate) engine_name: String,
}

impl Default for GpuDeviceCreation {
    fn default() -> Self {
        GpuDeviceCreation {
            window: None,
            width: 1,
            height: 1,
            num_threads: 1,
            gpu_time_queries_per_frame: 32,
            force_disable_dynamic_rendering: false,
            debug: DebugOptions::default(),
            limits: DeviceLimits::default(),
            application_name: "gpu-device".to_string(),
            engine_name: "gpu-device".to_string(),
        }
    }
}

impl GpuDeviceCreation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_window<W>(&mut self, window: &W, width: u32, height: u32) -> &mut Self
    where
        W: HasRawWindowHandle + HasRawDisplayHandle,
    {
        self.window = Some(WindowHandle::new(window));
        self.width = width;
        self.height = height;
        self
    }

    pub fn set_num_threads(&mut self, num_threads: u32) -> &mut Self {
        self.num_threads = num_threads.max(1);
        self
    }

    pub fn set_gpu_time_queries_per_frame(&mut self, count: u32) -> &mut Self {
        self.gpu_time_queries_per_frame = count;
        self
    }

    pub fn set_force_disable_dynamic_rendering(&mut self, disable: bool) -> &mut Self {
        self.force_disable_dynamic_rendering = disable;
        self
    }

    pub fn set_debug_options(&mut self, debug: DebugOptions) -> &mut Self {
        self.debug = debug;
        self
    }

    pub fn set_limits(&mut self, limits: DeviceLimits) -> &mut Self {
        self.limits = limits;
        self
    }

    pub fn set_application_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.application_name = name.into();
        self
    }
}
