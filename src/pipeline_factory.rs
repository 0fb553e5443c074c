//! Descriptor-set-layout / pipeline / descriptor-set creation (C12,
//! §4.9). Grounded on `gpu_device.cpp`'s `create_descriptor_set_layout`,
//! `create_pipeline`, `fill_write_descriptor_sets`, `create_descriptor_set`,
//! and the fixed-function pipeline state building kept (and generalized
//! from a hardcoded triangle) from `novade-vulkan-renderer/src/pipeline.rs`.

use std::ffi::CString;

use ash::vk;

use crate::enums::{Blend, BlendOperation, ComparisonFunction, CullMode, FillMode, FrontClockwise, ResourceUsageType, TopologyType};
use crate::resources::{
    BlendState, BufferHandle, DepthStencilCreation, DescriptorBinding, DescriptorResource, DescriptorSetLayout,
    DescriptorSetLayoutCreation, PipelineCreation, RasterizationCreation, SamplerHandle, TextureHandle,
};

/// Bindless-image-binding slot index, matching the source's
/// `k_bindless_image_binding` — the storage-image companion binding
/// written for compute-capable textures (§4.7 step 3).
pub const BINDLESS_TEXTURE_BINDING: u32 = 10;
pub const BINDLESS_IMAGE_BINDING: u32 = 11;

/// Builds the native descriptor-set layout bindings for a creation
/// request, applying the bindless-skip rule: when bindless is supported
/// and this is set 0 (and not the bindless layout itself), image-typed
/// bindings are omitted because they live in the bindless layout instead.
pub fn build_layout_bindings(
    creation: &DescriptorSetLayoutCreation,
    bindless_supported: bool,
) -> Vec<vk::DescriptorSetLayoutBinding> {
    creation
        .bindings
        .iter()
        .filter(|b| {
            if creation.bindless {
                return true;
            }
            let is_image_binding = matches!(
                b.descriptor_type,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER | vk::DescriptorType::STORAGE_IMAGE
            );
            !(bindless_supported && creation.set_index == 0 && is_image_binding)
        })
        .map(|b| {
            let descriptor_type = if b.descriptor_type == vk::DescriptorType::UNIFORM_BUFFER {
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
            } else {
                b.descriptor_type
            };
            vk::DescriptorSetLayoutBinding {
                binding: b.index,
                descriptor_type,
                descriptor_count: b.count.max(1),
                stage_flags: vk::ShaderStageFlags::ALL,
                p_immutable_samplers: std::ptr::null(),
            }
        })
        .collect()
}

/// Builds the index→binding lookup table used by `fill_write_descriptor_sets`.
pub fn build_index_to_binding(bindings: &[DescriptorBinding]) -> Vec<Option<u32>> {
    let max_index = bindings.iter().map(|b| b.index).max().unwrap_or(0);
    let mut table = vec![None; max_index as usize + 1];
    for (pos, b) in bindings.iter().enumerate() {
        table[b.index as usize] = Some(pos as u32);
    }
    table
}

/// One fully-resolved descriptor write, ready to hand to
/// `vkUpdateDescriptorSets` by the caller (which owns the native
/// `vk::DescriptorImageInfo`/`vk::DescriptorBufferInfo` storage and must
/// keep it alive until the call returns).
#[derive(Debug, Clone)]
pub enum ResolvedWrite {
    Image {
        binding: u32,
        descriptor_type: vk::DescriptorType,
        texture: TextureHandle,
        sampler: Option<SamplerHandle>,
        image_layout: vk::ImageLayout,
    },
    Buffer {
        binding: u32,
        descriptor_type: vk::DescriptorType,
        buffer: BufferHandle,
    },
}

/// Resolves a descriptor-set creation request into writes, applying:
/// (a) the binding skip rule (image bindings on a non-bindless set-0
/// layout are never written, they live in the bindless set), (b) sampler
/// precedence: per-slot override → texture's cached sampler → default.
pub fn fill_write_descriptor_sets(
    layout: &DescriptorSetLayout,
    resources: &[Option<DescriptorResource>],
    samplers: &[Option<SamplerHandle>],
    bindings: &[u32],
    bindless_supported: bool,
    texture_cached_sampler: impl Fn(TextureHandle) -> Option<SamplerHandle>,
    default_sampler: SamplerHandle,
) -> Vec<ResolvedWrite> {
    let mut writes = Vec::with_capacity(resources.len());
    for (i, resource) in resources.iter().enumerate() {
        let Some(resource) = resource else { continue };
        let binding_index = bindings[i];
        let Some(binding) = layout.binding_for_index(binding_index) else {
            tracing::warn!(binding_index, "descriptor write targets unknown binding, skipping");
            continue;
        };

        let is_image_binding = matches!(
            binding.descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER | vk::DescriptorType::STORAGE_IMAGE
        );
        if !layout.bindless && layout.set_index == 0 && bindless_supported && is_image_binding {
            continue;
        }

        match *resource {
            DescriptorResource::Texture(texture) => {
                let sampler = samplers[i].or_else(|| texture_cached_sampler(texture)).or(Some(default_sampler));
                let image_layout = if binding.descriptor_type == vk::DescriptorType::STORAGE_IMAGE {
                    vk::ImageLayout::GENERAL
                } else {
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                };
                writes.push(ResolvedWrite::Image {
                    binding: binding_index,
                    descriptor_type: binding.descriptor_type,
                    texture,
                    sampler,
                    image_layout,
                });
            }
            DescriptorResource::Buffer(buffer) => {
                writes.push(ResolvedWrite::Buffer {
                    binding: binding_index,
                    descriptor_type: binding.descriptor_type,
                    buffer,
                });
            }
        }
    }
    writes
}

/// Header validated byte-for-byte ahead of a pipeline cache blob on disk
/// (§6, §9.1 — this is a concrete wire format, not left to the
/// implementation). Mismatched headers cause the cache to be ignored
/// and regenerated (§7.5, non-fatal).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineCacheHeader {
    pub vendor_id: u32,
    pub device_id: u32,
    pub driver_version: u32,
    pub pipeline_cache_uuid: [u8; 16],
}

impl PipelineCacheHeader {
    pub fn from_properties(props: &vk::PhysicalDeviceProperties) -> Self {
        PipelineCacheHeader {
            vendor_id: props.vendor_id,
            device_id: props.device_id,
            driver_version: props.driver_version,
            pipeline_cache_uuid: props.pipeline_cache_uuid,
        }
    }

    pub fn matches(&self, other: &PipelineCacheHeader) -> bool {
        self == other
    }
}

/// `UNIFORM_BUFFER` bindings are always bound as dynamic-offset bindings
/// (§4.2, §4.9) so the per-frame dynamic buffer's `global_offset` applies;
/// this returns the dynamic offset to supply for a given bound buffer.
pub fn dynamic_offset_for_buffer(usage: ResourceUsageType, global_offset: u32) -> Option<u32> {
    match usage {
        ResourceUsageType::Dynamic => Some(global_offset),
        _ => None,
    }
}

fn to_vk_topology(topology: TopologyType) -> vk::PrimitiveTopology {
    match topology {
        TopologyType::Point => vk::PrimitiveTopology::POINT_LIST,
        TopologyType::Line => vk::PrimitiveTopology::LINE_LIST,
        TopologyType::Triangle | TopologyType::Unknown => vk::PrimitiveTopology::TRIANGLE_LIST,
        TopologyType::Patch => vk::PrimitiveTopology::PATCH_LIST,
    }
}

fn to_vk_cull_mode(cull: CullMode) -> vk::CullModeFlags {
    match cull {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

fn to_vk_front_face(front: FrontClockwise) -> vk::FrontFace {
    match front {
        FrontClockwise::True => vk::FrontFace::CLOCKWISE,
        FrontClockwise::False => vk::FrontFace::COUNTER_CLOCKWISE,
    }
}

fn to_vk_polygon_mode(fill: FillMode) -> vk::PolygonMode {
    match fill {
        FillMode::Solid => vk::PolygonMode::FILL,
        FillMode::Wireframe => vk::PolygonMode::LINE,
        FillMode::Point => vk::PolygonMode::POINT,
    }
}

fn to_vk_compare_op(cmp: ComparisonFunction) -> vk::CompareOp {
    match cmp {
        ComparisonFunction::Never => vk::CompareOp::NEVER,
        ComparisonFunction::Less => vk::CompareOp::LESS,
        ComparisonFunction::Equal => vk::CompareOp::EQUAL,
        ComparisonFunction::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
        ComparisonFunction::Greater => vk::CompareOp::GREATER,
        ComparisonFunction::NotEqual => vk::CompareOp::NOT_EQUAL,
        ComparisonFunction::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
        ComparisonFunction::Always => vk::CompareOp::ALWAYS,
    }
}

fn to_vk_blend_factor(blend: Blend) -> vk::BlendFactor {
    match blend {
        Blend::Zero => vk::BlendFactor::ZERO,
        Blend::One => vk::BlendFactor::ONE,
        Blend::SrcColor => vk::BlendFactor::SRC_COLOR,
        Blend::InvSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        Blend::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        Blend::InvSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        Blend::DstAlpha => vk::BlendFactor::DST_ALPHA,
        Blend::InvDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        Blend::DstColor => vk::BlendFactor::DST_COLOR,
        Blend::InvDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
    }
}

fn to_vk_blend_op(op: BlendOperation) -> vk::BlendOp {
    match op {
        BlendOperation::Add => vk::BlendOp::ADD,
        BlendOperation::Subtract => vk::BlendOp::SUBTRACT,
        BlendOperation::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOperation::Min => vk::BlendOp::MIN,
        BlendOperation::Max => vk::BlendOp::MAX,
    }
}

pub fn rasterization_state(rasterization: &RasterizationCreation) -> vk::PipelineRasterizationStateCreateInfo {
    vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(to_vk_polygon_mode(rasterization.fill))
        .cull_mode(to_vk_cull_mode(rasterization.cull_mode))
        .front_face(to_vk_front_face(rasterization.front))
        .depth_bias_enable(false)
        .line_width(1.0)
        .build()
}

pub fn depth_stencil_state(depth_stencil: &DepthStencilCreation) -> vk::PipelineDepthStencilStateCreateInfo {
    vk::PipelineDepthStencilStateCreateInfo::builder()
        .depth_test_enable(depth_stencil.depth_enable)
        .depth_write_enable(depth_stencil.depth_write_enable)
        .depth_compare_op(to_vk_compare_op(depth_stencil.depth_comparison))
        .stencil_test_enable(depth_stencil.stencil_enable)
        .build()
}

pub fn color_blend_attachment_state(blend: &BlendState) -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::builder()
        .blend_enable(blend.blend_enabled)
        .src_color_blend_factor(to_vk_blend_factor(blend.source_color))
        .dst_color_blend_factor(to_vk_blend_factor(blend.destination_color))
        .color_blend_op(to_vk_blend_op(blend.color_op))
        .src_alpha_blend_factor(to_vk_blend_factor(blend.source_alpha))
        .dst_alpha_blend_factor(to_vk_blend_factor(blend.destination_alpha))
        .alpha_blend_op(to_vk_blend_op(blend.alpha_op))
        .color_write_mask(vk::ColorComponentFlags::from_raw(blend.color_write_mask.bits() as u32))
        .build()
}

/// Builds a pipeline layout from the descriptor-set layouts the caller
/// resolved per §4.9 step 3 (set 0 is the shared bindless layout when
/// bindless is supported; the rest are freshly created per-pipeline).
pub fn create_pipeline_layout(
    device: &ash::Device,
    set_layouts: &[vk::DescriptorSetLayout],
) -> Result<vk::PipelineLayout, vk::Result> {
    let create_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);
    unsafe { device.create_pipeline_layout(&create_info, None) }
}

/// Builds a graphics pipeline from a [`PipelineCreation`] plus its
/// already-compiled shader modules (one per stage) and already-resolved
/// layout/render-pass. Matches the fixed-function assembly kept from the
/// donor's `GraphicsPipeline::new`, generalized from a hardcoded triangle
/// to the caller-supplied state (§4.9 "Pipeline creation").
pub fn create_graphics_pipeline(
    device: &ash::Device,
    creation: &PipelineCreation,
    shader_modules: &[(vk::ShaderModule, vk::ShaderStageFlags)],
    layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    cache: vk::PipelineCache,
) -> Result<vk::Pipeline, anyhow::Error> {
    let entry_point = CString::new("main").unwrap();
    let stages: Vec<_> = shader_modules
        .iter()
        .map(|(module, stage)| {
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(*stage)
                .module(*module)
                .name(&entry_point)
                .build()
        })
        .collect();

    let bindings: Vec<vk::VertexInputBindingDescription> = creation
        .vertex_input
        .streams
        .iter()
        .map(|s| vk::VertexInputBindingDescription {
            binding: s.binding as u32,
            stride: s.stride as u32,
            input_rate: match s.input_rate {
                crate::enums::VertexInputRate::PerVertex => vk::VertexInputRate::VERTEX,
                crate::enums::VertexInputRate::PerInstance => vk::VertexInputRate::INSTANCE,
            },
        })
        .collect();
    let attributes: Vec<vk::VertexInputAttributeDescription> = creation
        .vertex_input
        .attributes
        .iter()
        .map(|a| vk::VertexInputAttributeDescription {
            location: a.location as u32,
            binding: a.binding as u32,
            format: vertex_component_to_vk_format(a.format),
            offset: a.offset,
        })
        .collect();
    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(to_vk_topology(creation.topology))
        .primitive_restart_enable(false);

    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization_state = rasterization_state(&creation.rasterization);

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::builder()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1)
        .sample_shading_enable(false);

    let blend_attachments: Vec<_> = if creation.blend_state.blend_states.is_empty() {
        vec![color_blend_attachment_state(&BlendState::default())]
    } else {
        creation
            .blend_state
            .blend_states
            .iter()
            .map(color_blend_attachment_state)
            .collect()
    };
    let color_blend_state = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .attachments(&blend_attachments);

    let depth_stencil_state = depth_stencil_state(&creation.depth_stencil);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

    let create_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(&stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .color_blend_state(&color_blend_state)
        .depth_stencil_state(&depth_stencil_state)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0)
        .build();

    let result = unsafe { device.create_graphics_pipelines(cache, &[create_info], None) };
    match result {
        Ok(pipelines) => pipelines
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("create_graphics_pipelines returned no pipelines")),
        Err((_, result)) => Err(anyhow::anyhow!("failed to create graphics pipeline: {result:?}")),
    }
}

fn vertex_component_to_vk_format(format: crate::enums::VertexComponentFormat) -> vk::Format {
    use crate::enums::VertexComponentFormat as V;
    match format {
        V::Float => vk::Format::R32_SFLOAT,
        V::Float2 => vk::Format::R32G32_SFLOAT,
        V::Float3 => vk::Format::R32G32B32_SFLOAT,
        V::Float4 => vk::Format::R32G32B32A32_SFLOAT,
        V::Byte => vk::Format::R8_SINT,
        V::Byte4N => vk::Format::R8G8B8A8_SNORM,
        V::UByte => vk::Format::R8_UINT,
        V::UByte4N => vk::Format::R8G8B8A8_UNORM,
        V::Short2 => vk::Format::R16G16_SINT,
        V::Short2N => vk::Format::R16G16_SNORM,
        V::Short4 => vk::Format::R16G16B16A16_SINT,
        V::Short4N => vk::Format::R16G16B16A16_SNORM,
        V::Uint => vk::Format::R32_UINT,
        V::Uint2 => vk::Format::R32G32_UINT,
        V::Uint4 => vk::Format::R32G32B32A32_UINT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::DescriptorSetLayoutCreation;

    fn binding(index: u32, ty: vk::DescriptorType) -> DescriptorBinding {
        DescriptorBinding {
            descriptor_type: ty,
            index,
            count: 1,
            name: String::new(),
        }
    }

    #[test]
    fn bindless_skip_rule_drops_image_bindings_on_set_zero() {
        let mut creation = DescriptorSetLayoutCreation::default();
        creation
            .add_binding(binding(0, vk::DescriptorType::UNIFORM_BUFFER))
            .add_binding(binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER))
            .set_set_index(0);

        let bindings = build_layout_bindings(&creation, true);
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].binding, 0);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC);
    }

    #[test]
    fn non_zero_set_keeps_image_bindings() {
        let mut creation = DescriptorSetLayoutCreation::default();
        creation
            .add_binding(binding(0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER))
            .set_set_index(1);

        let bindings = build_layout_bindings(&creation, true);
        assert_eq!(bindings.len(), 1);
    }

    #[test]
    fn cache_header_mismatch_is_detected() {
        let a = PipelineCacheHeader {
            vendor_id: 1,
            device_id: 2,
            driver_version: 3,
            pipeline_cache_uuid: [0; 16],
        };
        let mut b = a;
        b.device_id = 99;
        assert!(!a.matches(&b));
        assert!(a.matches(&a.clone()));
    }
}
