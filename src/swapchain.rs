//! Swapchain subsystem (C9, §4.6). Kept from
//! `novade-vulkan-renderer/src/swapchain.rs` (instance/device/loader
//! plumbing, capability query, extent clamping, per-image view and
//! framebuffer creation) and generalized: a format preference list
//! instead of one hardcoded format, a [`PresentMode`] enum with FIFO
//! fallback, a per-image depth attachment, and an explicit `resize`.

use std::sync::Arc;

use ash::{vk, Device, Instance};
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, Allocator};
use gpu_allocator::MemoryLocation;

use crate::enums::PresentMode;
use crate::QueueFamilyIndices;

/// Preference order for the surface's color format (§4.6); the first
/// match with `SRGB_NONLINEAR` color space wins, falling back to
/// whatever the surface reports at index 0.
const FORMAT_PREFERENCE: &[vk::Format] = &[
    vk::Format::B8G8R8A8_SRGB,
    vk::Format::R8G8B8A8_SRGB,
    vk::Format::B8G8R8_SRGB,
    vk::Format::R8G8B8_SRGB,
];

const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

fn present_mode_to_vk(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentMode::VSync => vk::PresentModeKHR::FIFO,
        PresentMode::VSyncFast => vk::PresentModeKHR::MAILBOX,
        PresentMode::VSyncRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
    }
}

struct SwapchainImage {
    image: vk::Image,
    view: vk::ImageView,
    depth_image: vk::Image,
    depth_view: vk::ImageView,
    depth_allocation: Option<Allocation>,
    framebuffer: vk::Framebuffer,
}

pub struct Swapchain {
    device: Arc<Device>,
    pub swapchain_loader: ash::extensions::khr::Swapchain,
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub extent: vk::Extent2D,
    images: Vec<SwapchainImage>,
    pub present_mode: PresentMode,
}

impl Swapchain {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance: &Instance,
        device_arc: Arc<Device>,
        allocator: &mut Allocator,
        physical_device: vk::PhysicalDevice,
        surface_loader: &ash::extensions::khr::Surface,
        surface: vk::SurfaceKHR,
        queue_family_indices: &QueueFamilyIndices,
        width: u32,
        height: u32,
        present_mode: PresentMode,
        render_pass: vk::RenderPass,
    ) -> Result<Self, anyhow::Error> {
        let capabilities =
            unsafe { surface_loader.get_physical_device_surface_capabilities(physical_device, surface)? };
        let formats = unsafe { surface_loader.get_physical_device_surface_formats(physical_device, surface)? };
        let present_modes =
            unsafe { surface_loader.get_physical_device_surface_present_modes(physical_device, surface)? };

        if formats.is_empty() {
            return Err(anyhow::anyhow!("no surface formats available for swapchain"));
        }
        if present_modes.is_empty() {
            return Err(anyhow::anyhow!("no present modes available for swapchain"));
        }

        let selected_format = FORMAT_PREFERENCE
            .iter()
            .find_map(|&want| {
                formats
                    .iter()
                    .find(|f| f.format == want && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
                    .copied()
            })
            .unwrap_or(formats[0]);

        let wanted_present_mode = present_mode_to_vk(present_mode);
        let selected_present_mode = present_modes
            .iter()
            .cloned()
            .find(|&mode| mode == wanted_present_mode)
            .unwrap_or(vk::PresentModeKHR::FIFO);

        let selected_extent = if capabilities.current_extent.width != u32::MAX {
            capabilities.current_extent
        } else {
            vk::Extent2D {
                width: width
                    .max(1)
                    .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
                height: height
                    .max(1)
                    .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
            }
        };

        let mut image_count = capabilities.min_image_count + 1;
        if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
            image_count = capabilities.max_image_count;
        }

        let swapchain_loader = ash::extensions::khr::Swapchain::new(instance, &device_arc);

        let graphics_family_idx = queue_family_indices
            .graphics_family
            .ok_or_else(|| anyhow::anyhow!("graphics queue family index not found for swapchain"))?;
        let present_family_idx = queue_family_indices
            .present_family
            .ok_or_else(|| anyhow::anyhow!("present queue family index not found for swapchain"))?;
        let family_indices = [graphics_family_idx, present_family_idx];

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(selected_format.format)
            .image_color_space(selected_format.color_space)
            .image_extent(selected_extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(selected_present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        if graphics_family_idx != present_family_idx {
            create_info = create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices);
        } else {
            create_info = create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE);
        }

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };
        let raw_images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };

        let mut images = Vec::with_capacity(raw_images.len());
        for image in raw_images {
            images.push(Self::create_per_image_resources(
                &device_arc,
                allocator,
                image,
                selected_format.format,
                selected_extent,
                render_pass,
            )?);
        }

        Ok(Self {
            device: device_arc,
            swapchain_loader,
            swapchain,
            format: selected_format.format,
            color_space: selected_format.color_space,
            extent: selected_extent,
            images,
            present_mode,
        })
    }

    fn create_per_image_resources(
        device: &Device,
        allocator: &mut Allocator,
        image: vk::Image,
        format: vk::Format,
        extent: vk::Extent2D,
        render_pass: vk::RenderPass,
    ) -> Result<SwapchainImage, anyhow::Error> {
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = unsafe { device.create_image_view(&view_info, None)? };

        let depth_image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(DEPTH_FORMAT)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let depth_image = unsafe { device.create_image(&depth_image_info, None)? };
        let requirements = unsafe { device.get_image_memory_requirements(depth_image) };
        let allocation = allocator.allocate(&AllocationCreateDesc {
            name: "swapchain-depth",
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: gpu_allocator::vulkan::AllocationScheme::GpuAllocatorManaged,
        })?;
        unsafe {
            device.bind_image_memory(depth_image, allocation.memory(), allocation.offset())?;
        }

        let depth_view_info = vk::ImageViewCreateInfo::builder()
            .image(depth_image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(DEPTH_FORMAT)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::DEPTH,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let depth_view = unsafe { device.create_image_view(&depth_view_info, None)? };

        let attachments = [view, depth_view];
        let fb_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let framebuffer = unsafe { device.create_framebuffer(&fb_info, None)? };

        Ok(SwapchainImage {
            image,
            view,
            depth_image,
            depth_view,
            depth_allocation: Some(allocation),
            framebuffer,
        })
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn framebuffer(&self, index: usize) -> vk::Framebuffer {
        self.images[index].framebuffer
    }

    pub fn image(&self, index: usize) -> vk::Image {
        self.images[index].image
    }

    /// §4.6 resize: `vkDeviceWaitIdle` must already have been called by
    /// the caller (the frame scheduler, via `resize_swapchain`). Destroys
    /// every per-image resource and the swapchain itself; callers then
    /// construct a fresh `Swapchain` via `new`.
    pub fn destroy(&mut self, allocator: &mut Allocator) {
        for img in self.images.drain(..) {
            unsafe {
                self.device.destroy_framebuffer(img.framebuffer, None);
                self.device.destroy_image_view(img.depth_view, None);
                self.device.destroy_image(img.depth_image, None);
                self.device.destroy_image_view(img.view, None);
            }
            if let Some(allocation) = img.depth_allocation {
                let _ = allocator.free(allocation);
            }
        }
        unsafe {
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
        self.swapchain = vk::SwapchainKHR::null();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        if self.swapchain != vk::SwapchainKHR::null() {
            tracing::warn!("Swapchain dropped without an explicit destroy() — allocator cannot be reached from Drop");
            for img in &self.images {
                unsafe {
                    self.device.destroy_framebuffer(img.framebuffer, None);
                    self.device.destroy_image_view(img.depth_view, None);
                    self.device.destroy_image(img.depth_image, None);
                    self.device.destroy_image_view(img.view, None);
                }
            }
            unsafe {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
        }
    }
}
