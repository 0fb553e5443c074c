//! Resource-facing enums and bitmasks.
//!
//! Mirrors the flat C-style enum namespace of the source engine (blend,
//! comparison, cull, fill, vertex component formats, ...) translated to
//! Rust `enum`s, plus the bitmask types (`TextureFlags`, `ResourceState`)
//! translated to `bitflags!`.

use bitflags::bitflags;

/// Which hardware queue a piece of work targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueType {
    Graphics,
    Compute,
    CopyTransfer,
}

/// Coarse pipeline-stage role used by the barrier algorithm (§4.8) to
/// derive access masks and image layouts without the caller having to
/// know Vulkan's raw stage/access vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    DrawIndirect,
    VertexInput,
    VertexShader,
    FragmentShader,
    RenderTarget,
    ComputeShader,
    Transfer,
}

impl PipelineStage {
    pub fn queue_type(self) -> QueueType {
        match self {
            PipelineStage::ComputeShader => QueueType::Compute,
            PipelineStage::Transfer => QueueType::CopyTransfer,
            _ => QueueType::Graphics,
        }
    }
}

bitflags! {
    /// Extra behavior requested for a texture at creation time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TextureFlags: u8 {
        const RENDER_TARGET = 0x1;
        const COMPUTE       = 0x2;
        const SPARSE        = 0x4;
    }
}

bitflags! {
    /// Coarse resource lifecycle state, mirroring D3D12-style resource
    /// states. Drives access-mask / layout derivation in the barrier
    /// algorithm (§4.8) and is the authoritative field tracked per texture.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResourceState: u32 {
        const UNDEFINED                    = 0;
        const VERTEX_AND_CONSTANT_BUFFER   = 0x1;
        const INDEX_BUFFER                 = 0x2;
        const RENDER_TARGET                = 0x4;
        const UNORDERED_ACCESS             = 0x8;
        const DEPTH_WRITE                  = 0x10;
        const DEPTH_READ                   = 0x20;
        const NON_PIXEL_SHADER_RESOURCE    = 0x40;
        const PIXEL_SHADER_RESOURCE        = 0x80;
        const SHADER_RESOURCE              = 0x40 | 0x80;
        const STREAM_OUT                   = 0x100;
        const INDIRECT_ARGUMENT            = 0x200;
        const COPY_DEST                    = 0x400;
        const COPY_SOURCE                  = 0x800;
        const PRESENT                      = 0x1000;
        const COMMON                       = 0x2000;
        const RAYTRACING_ACCELERATION_STRUCTURE = 0x4000;
        const SHADING_RATE_SOURCE          = 0x8000;
    }
}

/// Surface presentation mode requested by the caller; falls back to FIFO
/// when the requested mode is unsupported (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentMode {
    Immediate,
    #[default]
    VSync,
    VSyncFast,
    VSyncRelaxed,
}

/// What a render-pass attachment does with its previous contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderPassOperation {
    #[default]
    DontCare,
    Load,
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TopologyType {
    Unknown,
    Point,
    Line,
    #[default]
    Triangle,
    Patch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexType {
    #[default]
    Uint16,
    Uint32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureType {
    #[default]
    Texture1D,
    Texture2D,
    Texture3D,
    TextureCube,
    Texture1DArray,
    Texture2DArray,
    TextureCubeArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureFilter {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureMipFilter {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureAddressMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampEdge,
    ClampBorder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferType {
    #[default]
    Vertex,
    Index,
    Uniform,
    Indirect,
    Storage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceUsageType {
    Immutable,
    #[default]
    Dynamic,
    Stream,
    Staging,
    Readback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VertexComponentFormat {
    #[default]
    Float,
    Float2,
    Float3,
    Float4,
    Byte,
    Byte4N,
    UByte,
    UByte4N,
    Short2,
    Short2N,
    Short4,
    Short4N,
    Uint,
    Uint2,
    Uint4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VertexInputRate {
    #[default]
    PerVertex,
    PerInstance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Blend {
    #[default]
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DstAlpha,
    InvDstAlpha,
    DstColor,
    InvDstColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendOperation {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComparisonFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    #[default]
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrontClockwise {
    True,
    #[default]
    False,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
    Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StencilOperation {
    #[default]
    Keep,
    Zero,
    Replace,
    IncrSat,
    DecrSat,
    Invert,
    Incr,
    Decr,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ColorWriteEnabled: u8 {
        const RED   = 0x1;
        const GREEN = 0x2;
        const BLUE  = 0x4;
        const ALPHA = 0x8;
        const ALL   = 0xF;
    }
}

impl Default for ColorWriteEnabled {
    fn default() -> Self {
        ColorWriteEnabled::ALL
    }
}
