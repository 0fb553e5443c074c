//! Resource creation structs and the live resource records they produce
//! (C2, §3, §4.9). Creation structs follow the source's builder-method
//! convention; records carry the native Vulkan objects plus enough
//! bookkeeping to support deferred destruction and bindless updates.

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use smallvec::SmallVec;

use crate::enums::*;
use crate::handle::Handle;

pub const MAX_IMAGE_OUTPUTS: usize = 8;
pub const MAX_DESCRIPTOR_SET_LAYOUTS: usize = 8;
pub const MAX_SHADER_STAGES: usize = 5;
pub const MAX_DESCRIPTORS_PER_SET: usize = 16;
pub const MAX_VERTEX_STREAMS: usize = 16;
pub const MAX_VERTEX_ATTRIBUTES: usize = 16;

// ---------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------

pub type BufferHandle = Handle<Buffer>;
pub type TextureHandle = Handle<Texture>;
pub type SamplerHandle = Handle<Sampler>;
pub type ShaderStateHandle = Handle<ShaderState>;
pub type PipelineHandle = Handle<Pipeline>;
pub type DescriptorSetLayoutHandle = Handle<DescriptorSetLayout>;
pub type DescriptorSetHandle = Handle<DescriptorSet>;
pub type RenderPassHandle = Handle<RenderPass>;
pub type FramebufferHandle = Handle<Framebuffer>;

// ---------------------------------------------------------------------
// Buffer
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BufferCreation {
    pub buffer_type: BufferType,
    pub usage: ResourceUsageType,
    pub size: u32,
    pub persistent: bool,
    pub device_only: bool,
    pub initial_data: Option<Vec<u8>>,
    pub name: String,
}

impl Default for BufferCreation {
    fn default() -> Self {
        BufferCreation {
            buffer_type: BufferType::Vertex,
            usage: ResourceUsageType::Immutable,
            size: 0,
            persistent: false,
            device_only: false,
            initial_data: None,
            name: String::new(),
        }
    }
}

impl BufferCreation {
    pub fn reset(&mut self) -> &mut Self {
        *self = BufferCreation::default();
        self
    }
    pub fn set(&mut self, buffer_type: BufferType, usage: ResourceUsageType, size: u32) -> &mut Self {
        self.buffer_type = buffer_type;
        self.usage = usage;
        // §8 boundary behavior: zero-sized buffers are bumped to 1.
        self.size = size.max(1);
        self
    }
    pub fn set_persistent(&mut self, persistent: bool) -> &mut Self {
        self.persistent = persistent;
        self
    }
    pub fn set_device_only(&mut self, device_only: bool) -> &mut Self {
        self.device_only = device_only;
        self
    }
    pub fn set_data(&mut self, data: Vec<u8>) -> &mut Self {
        self.initial_data = Some(data);
        self
    }
    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }
}

/// True when a buffer of this type/usage is virtualized into the process
/// wide dynamic buffer rather than owning its own native memory (§4.2).
pub fn is_dynamic_virtualized(buffer_type: BufferType, usage: ResourceUsageType) -> bool {
    usage == ResourceUsageType::Dynamic
        && matches!(
            buffer_type,
            BufferType::Vertex | BufferType::Index | BufferType::Uniform
        )
}

pub struct Buffer {
    pub vk_buffer: vk::Buffer,
    pub allocation: Option<Allocation>,
    pub size: u32,
    pub global_offset: u32,
    pub buffer_type: BufferType,
    pub usage: ResourceUsageType,
    /// Set when this buffer aliases the dynamic per-frame buffer (§4.2);
    /// such buffers own no native memory of their own.
    pub parent_buffer: Option<BufferHandle>,
    pub handle: BufferHandle,
    pub mapped_data: Option<*mut u8>,
    pub name: String,
}

// SAFETY: `mapped_data` is a pointer into persistently-mapped VMA memory
// owned by this record (or its parent dynamic buffer); it is never
// aliased mutably from more than one thread at a time by construction
// (§5 — resource creation/mutation is main-thread only).
unsafe impl Send for Buffer {}

impl Buffer {
    pub fn is_virtualized(&self) -> bool {
        self.parent_buffer.is_some()
    }
}

// ---------------------------------------------------------------------
// Texture
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TextureCreation {
    pub initial_data: Option<Vec<u8>>,
    pub width: u16,
    pub height: u16,
    pub depth: u16,
    pub mipmaps: u8,
    pub flags: TextureFlags,
    pub format: vk::Format,
    pub texture_type: TextureType,
    /// When set, this creation describes a *view* aliasing another texture
    /// rather than a fresh image.
    pub alias: Option<TextureHandle>,
    pub name: String,
}

impl Default for TextureCreation {
    fn default() -> Self {
        TextureCreation {
            initial_data: None,
            width: 1,
            height: 1,
            depth: 1,
            mipmaps: 1,
            flags: TextureFlags::empty(),
            format: vk::Format::R8G8B8A8_UNORM,
            texture_type: TextureType::Texture2D,
            alias: None,
            name: String::new(),
        }
    }
}

impl TextureCreation {
    pub fn set_size(&mut self, width: u16, height: u16, depth: u16) -> &mut Self {
        self.width = width.max(1);
        self.height = height.max(1);
        self.depth = depth.max(1);
        self
    }
    pub fn set_mips(&mut self, mipmaps: u8) -> &mut Self {
        self.mipmaps = mipmaps.max(1);
        self
    }
    pub fn set_flags(&mut self, flags: TextureFlags) -> &mut Self {
        self.flags = flags;
        self
    }
    pub fn set_format_type(&mut self, format: vk::Format, texture_type: TextureType) -> &mut Self {
        self.format = format;
        self.texture_type = texture_type;
        self
    }
    pub fn set_data(&mut self, data: Vec<u8>) -> &mut Self {
        self.initial_data = Some(data);
        self
    }
    pub fn set_alias(&mut self, alias: TextureHandle) -> &mut Self {
        self.alias = Some(alias);
        self
    }
    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }
}

pub struct Texture {
    pub vk_image: vk::Image,
    pub vk_image_view: vk::ImageView,
    pub vk_format: vk::Format,
    pub allocation: Option<Allocation>,
    pub state: ResourceState,
    pub width: u16,
    pub height: u16,
    pub depth: u16,
    pub mipmaps: u8,
    pub flags: TextureFlags,
    pub texture_type: TextureType,
    pub handle: TextureHandle,
    pub sampler: Option<SamplerHandle>,
    /// Index this texture currently occupies in the bindless array, if any.
    pub bindless_index: Option<u32>,
    /// Set when this record is a view created via `alias` in `TextureCreation`:
    /// `vk_image` and `allocation` then belong to the parent and must not be
    /// freed when this record is destroyed.
    pub parent_texture: Option<TextureHandle>,
    pub name: String,
}

impl Texture {
    pub fn has_depth_or_stencil(&self) -> bool {
        matches!(
            self.vk_format,
            vk::Format::D16_UNORM
                | vk::Format::D32_SFLOAT
                | vk::Format::D16_UNORM_S8_UINT
                | vk::Format::D24_UNORM_S8_UINT
                | vk::Format::D32_SFLOAT_S8_UINT
                | vk::Format::S8_UINT
        )
    }
}

// ---------------------------------------------------------------------
// Sampler
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SamplerCreation {
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub mip_filter: TextureMipFilter,
    pub address_mode_u: TextureAddressMode,
    pub address_mode_v: TextureAddressMode,
    pub address_mode_w: TextureAddressMode,
    pub name: String,
}

pub struct Sampler {
    pub vk_sampler: vk::Sampler,
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub mip_filter: TextureMipFilter,
    pub address_mode_u: TextureAddressMode,
    pub address_mode_v: TextureAddressMode,
    pub address_mode_w: TextureAddressMode,
    pub handle: SamplerHandle,
    pub name: String,
}

// ---------------------------------------------------------------------
// Shader state
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ShaderStage {
    pub code: Vec<u8>,
    pub stage: vk::ShaderStageFlags,
    pub is_spirv: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ShaderStateCreation {
    pub stages: SmallVec<[ShaderStage; MAX_SHADER_STAGES]>,
    pub name: String,
}

impl ShaderStateCreation {
    pub fn add_stage(&mut self, code: Vec<u8>, stage: vk::ShaderStageFlags, is_spirv: bool) -> &mut Self {
        self.stages.push(ShaderStage {
            code,
            stage,
            is_spirv,
        });
        self
    }
    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }
    pub fn is_compute(&self) -> bool {
        self.stages
            .iter()
            .any(|s| s.stage == vk::ShaderStageFlags::COMPUTE)
    }
}

pub struct ShaderState {
    pub shader_modules: SmallVec<[vk::ShaderModule; MAX_SHADER_STAGES]>,
    pub stages: SmallVec<[vk::ShaderStageFlags; MAX_SHADER_STAGES]>,
    pub is_compute: bool,
    pub parse_result: Option<crate::spirv::ParseResult>,
    pub handle: ShaderStateHandle,
    pub name: String,
}

// ---------------------------------------------------------------------
// Descriptor set layout
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DescriptorBinding {
    pub descriptor_type: vk::DescriptorType,
    pub index: u32,
    pub count: u32,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct DescriptorSetLayoutCreation {
    pub bindings: SmallVec<[DescriptorBinding; MAX_DESCRIPTORS_PER_SET]>,
    pub set_index: u32,
    pub bindless: bool,
    pub dynamic: bool,
    pub name: String,
}

impl DescriptorSetLayoutCreation {
    pub fn add_binding(&mut self, binding: DescriptorBinding) -> &mut Self {
        self.bindings.push(binding);
        self
    }
    pub fn set_set_index(&mut self, set_index: u32) -> &mut Self {
        self.set_index = set_index;
        self
    }
    pub fn set_bindless(&mut self, bindless: bool) -> &mut Self {
        self.bindless = bindless;
        self
    }
}

pub struct DescriptorSetLayout {
    pub vk_layout: vk::DescriptorSetLayout,
    pub bindings: SmallVec<[DescriptorBinding; MAX_DESCRIPTORS_PER_SET]>,
    /// binding index -> position in `bindings`, for `fill_write_descriptor_sets`.
    pub index_to_binding: Vec<Option<u32>>,
    pub set_index: u32,
    pub bindless: bool,
    pub dynamic: bool,
    pub handle: DescriptorSetLayoutHandle,
    pub name: String,
}

impl DescriptorSetLayout {
    pub fn binding_for_index(&self, index: u32) -> Option<&DescriptorBinding> {
        let pos = *self.index_to_binding.get(index as usize)?;
        pos.map(|p| &self.bindings[p as usize])
    }
}

// ---------------------------------------------------------------------
// Descriptor set
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub enum DescriptorResource {
    Texture(TextureHandle),
    Buffer(BufferHandle),
}

#[derive(Clone, Default)]
pub struct DescriptorSetCreation {
    pub resources: SmallVec<[Option<DescriptorResource>; MAX_DESCRIPTORS_PER_SET]>,
    pub samplers: SmallVec<[Option<SamplerHandle>; MAX_DESCRIPTORS_PER_SET]>,
    pub bindings: SmallVec<[u32; MAX_DESCRIPTORS_PER_SET]>,
    pub layout: DescriptorSetLayoutHandle,
    pub name: String,
}

impl DescriptorSetCreation {
    pub fn set_layout(&mut self, layout: DescriptorSetLayoutHandle) -> &mut Self {
        self.layout = layout;
        self
    }
    pub fn texture(&mut self, binding: u32, texture: TextureHandle) -> &mut Self {
        self.bindings.push(binding);
        self.resources.push(Some(DescriptorResource::Texture(texture)));
        self.samplers.push(None);
        self
    }
    pub fn buffer(&mut self, binding: u32, buffer: BufferHandle) -> &mut Self {
        self.bindings.push(binding);
        self.resources.push(Some(DescriptorResource::Buffer(buffer)));
        self.samplers.push(None);
        self
    }
    pub fn texture_sampler(
        &mut self,
        binding: u32,
        texture: TextureHandle,
        sampler: SamplerHandle,
    ) -> &mut Self {
        self.bindings.push(binding);
        self.resources.push(Some(DescriptorResource::Texture(texture)));
        self.samplers.push(Some(sampler));
        self
    }
}

/// A pending rewrite of a live descriptor set, drained at the start of
/// the next frame (§4.9 — `update_descriptor_set` does not write in
/// place because the set may be referenced by an in-flight frame).
pub struct DescriptorSetUpdate {
    pub descriptor_set: DescriptorSetHandle,
    pub frame_issued: u32,
}

pub struct DescriptorSet {
    pub vk_set: vk::DescriptorSet,
    pub resources: SmallVec<[Option<DescriptorResource>; MAX_DESCRIPTORS_PER_SET]>,
    pub samplers: SmallVec<[Option<SamplerHandle>; MAX_DESCRIPTORS_PER_SET]>,
    pub bindings: SmallVec<[u32; MAX_DESCRIPTORS_PER_SET]>,
    pub layout: DescriptorSetLayoutHandle,
    pub handle: DescriptorSetHandle,
    pub name: String,
}

// ---------------------------------------------------------------------
// Render pass
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RenderPassOutput {
    pub color_formats: [i32; MAX_IMAGE_OUTPUTS],
    pub color_final_layouts: [i32; MAX_IMAGE_OUTPUTS],
    pub color_operations: [RenderPassOperationRepr; MAX_IMAGE_OUTPUTS],
    pub num_color_formats: u32,
    pub depth_stencil_format: i32,
    pub depth_stencil_final_layout: i32,
    pub depth_operation: RenderPassOperationRepr,
    pub stencil_operation: RenderPassOperationRepr,
}

/// `RenderPassOperation` restated as a `Hash`-able byte so the fingerprint
/// in §4.3/§3 can be derived with a plain `#[derive(Hash)]`.
pub type RenderPassOperationRepr = u8;

pub fn operation_repr(op: RenderPassOperation) -> RenderPassOperationRepr {
    match op {
        RenderPassOperation::DontCare => 0,
        RenderPassOperation::Load => 1,
        RenderPassOperation::Clear => 2,
    }
}

impl RenderPassOutput {
    pub fn reset(&mut self) -> &mut Self {
        *self = RenderPassOutput::default();
        self.depth_stencil_format = vk::Format::UNDEFINED.as_raw();
        self
    }

    pub fn color(&mut self, format: vk::Format, layout: vk::ImageLayout, op: RenderPassOperation) -> &mut Self {
        let i = self.num_color_formats as usize;
        self.color_formats[i] = format.as_raw();
        self.color_final_layouts[i] = layout.as_raw();
        self.color_operations[i] = operation_repr(op);
        self.num_color_formats += 1;
        self
    }

    pub fn depth(&mut self, format: vk::Format, layout: vk::ImageLayout) -> &mut Self {
        self.depth_stencil_format = format.as_raw();
        self.depth_stencil_final_layout = layout.as_raw();
        self
    }

    pub fn set_depth_stencil_operations(
        &mut self,
        depth: RenderPassOperation,
        stencil: RenderPassOperation,
    ) -> &mut Self {
        self.depth_operation = operation_repr(depth);
        self.stencil_operation = operation_repr(stencil);
        self
    }

    /// Fingerprint used by the render-pass cache (C6): the fxhash of this
    /// struct's bytes, which is sound because every field is `Copy`/POD
    /// and padding is fully initialized by `reset`/the builder methods.
    pub fn fingerprint(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = fxhash::FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderPassCreation {
    pub output: RenderPassOutput,
    pub name: String,
}

pub struct RenderPass {
    pub vk_render_pass: vk::RenderPass,
    pub output: RenderPassOutput,
    pub num_render_targets: u32,
    pub name: String,
}

// ---------------------------------------------------------------------
// Framebuffer
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct FramebufferCreation {
    pub render_pass: RenderPassHandle,
    pub output_textures: SmallVec<[TextureHandle; MAX_IMAGE_OUTPUTS]>,
    pub depth_stencil_texture: Option<TextureHandle>,
    pub width: u16,
    pub height: u16,
    pub scale_x: f32,
    pub scale_y: f32,
    /// When set, this framebuffer is recreated by `resize_output_textures`
    /// (§4.11) whenever the swapchain resizes.
    pub resize: bool,
    pub name: String,
}

pub struct Framebuffer {
    pub vk_framebuffer: vk::Framebuffer,
    pub render_pass: RenderPassHandle,
    pub width: u16,
    pub height: u16,
    pub scale_x: f32,
    pub scale_y: f32,
    pub color_attachments: SmallVec<[TextureHandle; MAX_IMAGE_OUTPUTS]>,
    pub depth_stencil_attachment: Option<TextureHandle>,
    pub resize: bool,
    pub name: String,
}

// ---------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct RasterizationCreation {
    pub cull_mode: CullMode,
    pub front: FrontClockwise,
    pub fill: FillMode,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StencilOperationState {
    pub fail: StencilOperation,
    pub pass: StencilOperation,
    pub depth_fail: StencilOperation,
    pub compare: ComparisonFunction,
    pub compare_mask: u8,
    pub write_mask: u8,
    pub reference: u8,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DepthStencilCreation {
    pub front: StencilOperationState,
    pub back: StencilOperationState,
    pub depth_comparison: ComparisonFunction,
    pub depth_enable: bool,
    pub depth_write_enable: bool,
    pub stencil_enable: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BlendState {
    pub source_color: Blend,
    pub destination_color: Blend,
    pub color_op: BlendOperation,
    pub source_alpha: Blend,
    pub destination_alpha: Blend,
    pub alpha_op: BlendOperation,
    pub color_write_mask: ColorWriteEnabled,
    pub blend_enabled: bool,
    pub separate_blend: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BlendStateCreation {
    pub blend_states: SmallVec<[BlendState; MAX_IMAGE_OUTPUTS]>,
}

impl BlendStateCreation {
    pub fn add_blend_state(&mut self, state: BlendState) -> &mut Self {
        self.blend_states.push(state);
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VertexAttribute {
    pub location: u16,
    pub binding: u16,
    pub offset: u32,
    pub format: VertexComponentFormat,
}

#[derive(Debug, Clone, Copy)]
pub struct VertexStream {
    pub binding: u16,
    pub stride: u16,
    pub input_rate: VertexInputRate,
}

#[derive(Debug, Clone, Default)]
pub struct VertexInputCreation {
    pub attributes: SmallVec<[VertexAttribute; MAX_VERTEX_ATTRIBUTES]>,
    pub streams: SmallVec<[VertexStream; MAX_VERTEX_STREAMS]>,
}

#[derive(Clone, Default)]
pub struct PipelineCreation {
    pub rasterization: RasterizationCreation,
    pub depth_stencil: DepthStencilCreation,
    pub blend_state: BlendStateCreation,
    pub vertex_input: VertexInputCreation,
    pub shaders: ShaderStateCreation,
    pub topology: TopologyType,
    pub render_pass: RenderPassOutput,
    pub descriptor_set_layouts: SmallVec<[DescriptorSetLayoutHandle; MAX_DESCRIPTOR_SET_LAYOUTS]>,
    pub cache_path: Option<std::path::PathBuf>,
    pub name: String,
}

impl PipelineCreation {
    pub fn is_compute(&self) -> bool {
        self.shaders.is_compute()
    }
}

pub struct Pipeline {
    pub vk_pipeline: vk::Pipeline,
    pub vk_pipeline_layout: vk::PipelineLayout,
    pub bind_point: vk::PipelineBindPoint,
    pub shader_state: ShaderStateHandle,
    pub descriptor_set_layout_handles: SmallVec<[DescriptorSetLayoutHandle; MAX_DESCRIPTOR_SET_LAYOUTS]>,
    /// Set-0 is "borrowed" (the shared bindless layout) whenever bindless
    /// is supported; borrowed layouts are never destroyed by
    /// `destroy_pipeline` (§3 invariant 6, §9.1).
    pub borrows_bindless_layout: bool,
    pub depth_stencil: DepthStencilCreation,
    pub blend_state: BlendStateCreation,
    pub rasterization: RasterizationCreation,
    pub handle: PipelineHandle,
    pub name: String,
}

// ---------------------------------------------------------------------
// Description structs (C15 introspection — owned projections of a record)
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BufferDescription {
    pub name: String,
    pub buffer_type: BufferType,
    pub usage: ResourceUsageType,
    pub size: u32,
    pub parent_handle: Option<BufferHandle>,
}

#[derive(Debug, Clone)]
pub struct TextureDescription {
    pub name: String,
    pub width: u16,
    pub height: u16,
    pub depth: u16,
    pub mipmaps: u8,
    pub format: vk::Format,
    pub flags: TextureFlags,
}

#[derive(Debug, Clone)]
pub struct SamplerDescription {
    pub name: String,
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
}

#[derive(Debug, Clone)]
pub struct DescriptorSetLayoutDescription {
    pub name: String,
    pub set_index: u32,
    pub num_bindings: u32,
}

#[derive(Debug, Clone)]
pub struct DescriptorSetDescription {
    pub name: String,
    pub num_resources: u32,
}

#[derive(Debug, Clone)]
pub struct PipelineDescription {
    pub name: String,
    pub shader: ShaderStateHandle,
}
