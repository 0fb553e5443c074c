//! Command recording (C11, §4.8): the public recording verbs, the
//! barrier algorithm, and the texture state machine it drives.
//!
//! Grounded on `original_source/source/chapter5/graphics/command_buffer.cpp`
//! (verb signatures from the method grep; barrier algorithm from the
//! `CommandBuffer::barrier` implementation at lines 544-769 — this crate
//! implements only the "new" role-based path described there, not the
//! older switch-based fallback the source itself flags for reimplementation).

use ash::vk;
use smallvec::SmallVec;

use crate::enums::{PipelineStage, QueueType, ResourceState};
use crate::resources::{BufferHandle, FramebufferHandle, PipelineHandle, RenderPassHandle, TextureHandle};

pub const MAX_BARRIERS_PER_CALL: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct ImageBarrier {
    pub texture: TextureHandle,
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryBarrier {
    pub buffer: BufferHandle,
}

/// A batch of image/buffer barriers sharing one source/destination
/// pipeline-stage role, issued as a single `vkCmdPipelineBarrier`.
#[derive(Debug, Clone, Default)]
pub struct ExecutionBarrier {
    pub source_pipeline_stage: Option<PipelineStage>,
    pub destination_pipeline_stage: Option<PipelineStage>,
    pub image_barriers: SmallVec<[ImageBarrier; MAX_BARRIERS_PER_CALL]>,
    pub memory_barriers: SmallVec<[MemoryBarrier; MAX_BARRIERS_PER_CALL]>,
}

impl ExecutionBarrier {
    pub fn reset(&mut self) -> &mut Self {
        *self = ExecutionBarrier::default();
        self
    }
    pub fn set(&mut self, source: PipelineStage, destination: PipelineStage) -> &mut Self {
        self.source_pipeline_stage = Some(source);
        self.destination_pipeline_stage = Some(destination);
        self
    }
    pub fn add_image_barrier(&mut self, barrier: ImageBarrier) -> &mut Self {
        self.image_barriers.push(barrier);
        self
    }
    pub fn add_memory_barrier(&mut self, barrier: MemoryBarrier) -> &mut Self {
        self.memory_barriers.push(barrier);
        self
    }
}

/// Derives the coarse resource state a role implies, splitting depth/
/// stencil-capable formats from color (§4.8 "State machine").
pub fn state_for_role(stage: PipelineStage, is_depth_stencil: bool) -> ResourceState {
    match stage {
        PipelineStage::RenderTarget if is_depth_stencil => ResourceState::DEPTH_WRITE,
        PipelineStage::RenderTarget => ResourceState::RENDER_TARGET,
        PipelineStage::FragmentShader | PipelineStage::VertexShader if is_depth_stencil => {
            ResourceState::DEPTH_READ
        }
        PipelineStage::FragmentShader | PipelineStage::VertexShader => ResourceState::PIXEL_SHADER_RESOURCE,
        PipelineStage::ComputeShader => ResourceState::UNORDERED_ACCESS,
        PipelineStage::Transfer => ResourceState::COPY_DEST,
        PipelineStage::DrawIndirect => ResourceState::INDIRECT_ARGUMENT,
        PipelineStage::VertexInput => ResourceState::VERTEX_AND_CONSTANT_BUFFER,
    }
}

pub fn access_mask_for_state(state: ResourceState) -> vk::AccessFlags {
    let mut mask = vk::AccessFlags::empty();
    if state.contains(ResourceState::RENDER_TARGET) {
        mask |= vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    }
    if state.contains(ResourceState::DEPTH_WRITE) {
        mask |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    }
    if state.contains(ResourceState::DEPTH_READ) {
        mask |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ;
    }
    if state.contains(ResourceState::SHADER_RESOURCE) {
        mask |= vk::AccessFlags::SHADER_READ;
    }
    if state.contains(ResourceState::UNORDERED_ACCESS) {
        mask |= vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE;
    }
    if state.contains(ResourceState::COPY_DEST) {
        mask |= vk::AccessFlags::TRANSFER_WRITE;
    }
    if state.contains(ResourceState::COPY_SOURCE) {
        mask |= vk::AccessFlags::TRANSFER_READ;
    }
    if state.contains(ResourceState::INDIRECT_ARGUMENT) {
        mask |= vk::AccessFlags::INDIRECT_COMMAND_READ;
    }
    if state.contains(ResourceState::VERTEX_AND_CONSTANT_BUFFER) {
        mask |= vk::AccessFlags::VERTEX_ATTRIBUTE_READ | vk::AccessFlags::UNIFORM_READ;
    }
    mask
}

pub fn image_layout_for_state(state: ResourceState) -> vk::ImageLayout {
    if state.contains(ResourceState::RENDER_TARGET) {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    } else if state.contains(ResourceState::DEPTH_WRITE) {
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    } else if state.contains(ResourceState::DEPTH_READ) {
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
    } else if state.contains(ResourceState::SHADER_RESOURCE) {
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    } else if state.contains(ResourceState::UNORDERED_ACCESS) {
        vk::ImageLayout::GENERAL
    } else if state.contains(ResourceState::COPY_DEST) {
        vk::ImageLayout::TRANSFER_DST_OPTIMAL
    } else if state.contains(ResourceState::COPY_SOURCE) {
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL
    } else if state.contains(ResourceState::PRESENT) {
        vk::ImageLayout::PRESENT_SRC_KHR
    } else {
        vk::ImageLayout::UNDEFINED
    }
}

/// Derives the pipeline-stage mask a role maps to, split by whether the
/// role targets the compute or graphics queue (§4.8).
pub fn stage_mask_for_role(stage: PipelineStage) -> vk::PipelineStageFlags {
    match stage.queue_type() {
        QueueType::Compute => vk::PipelineStageFlags::COMPUTE_SHADER,
        QueueType::CopyTransfer => vk::PipelineStageFlags::TRANSFER,
        QueueType::Graphics => match stage {
            PipelineStage::DrawIndirect => vk::PipelineStageFlags::DRAW_INDIRECT,
            PipelineStage::VertexInput => vk::PipelineStageFlags::VERTEX_INPUT,
            PipelineStage::VertexShader => vk::PipelineStageFlags::VERTEX_SHADER,
            PipelineStage::FragmentShader => vk::PipelineStageFlags::FRAGMENT_SHADER,
            PipelineStage::RenderTarget => vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            _ => vk::PipelineStageFlags::TOP_OF_PIPE,
        },
    }
}

/// The outcome of deriving a barrier: native masks/layouts plus the next
/// `ResourceState` each image barrier's texture should be left in.
pub struct DerivedBarrier {
    pub src_stage_mask: vk::PipelineStageFlags,
    pub dst_stage_mask: vk::PipelineStageFlags,
    pub src_access_mask: vk::AccessFlags,
    pub dst_access_mask: vk::AccessFlags,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub next_state: ResourceState,
}

/// Derives the full barrier for one image transition. `is_depth_stencil`
/// comes from the texture's own format (`Texture::has_depth_or_stencil`).
/// When any image in the batch is depth/stencil, both stage masks gain
/// the early/late fragment-test bits (§4.8).
pub fn derive_image_barrier(
    source: PipelineStage,
    destination: PipelineStage,
    is_depth_stencil: bool,
    batch_has_depth_stencil: bool,
) -> DerivedBarrier {
    let prev_state = state_for_role(source, is_depth_stencil);
    let next_state = state_for_role(destination, is_depth_stencil);

    let mut src_stage_mask = stage_mask_for_role(source);
    let mut dst_stage_mask = stage_mask_for_role(destination);
    if batch_has_depth_stencil {
        let fragment_tests =
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        src_stage_mask |= fragment_tests;
        dst_stage_mask |= fragment_tests;
    }

    DerivedBarrier {
        src_stage_mask,
        dst_stage_mask,
        src_access_mask: access_mask_for_state(prev_state),
        dst_access_mask: access_mask_for_state(next_state),
        old_layout: image_layout_for_state(prev_state),
        new_layout: image_layout_for_state(next_state),
        next_state,
    }
}

/// Per-recording-session state the recorder tracks (current pass,
/// bound pipeline, pending clear values). One instance wraps each
/// command buffer obtained from [`crate::command_pool::CommandBufferManager`].
pub struct CommandRecorder {
    pub handle: vk::CommandBuffer,
    pub current_render_pass: Option<RenderPassHandle>,
    pub current_framebuffer: Option<FramebufferHandle>,
    pub current_pipeline: Option<PipelineHandle>,
    pub clear_values: SmallVec<[vk::ClearValue; 9]>,
    pub is_secondary: bool,
    /// Which `(frame, thread)` slot this recorder was issued from, so
    /// `push_marker`/`pop_marker` can find the matching query pool
    /// without the caller threading the index through every call.
    pub thread_index: u32,
    pub frame: u32,
}

impl CommandRecorder {
    pub fn new(handle: vk::CommandBuffer, is_secondary: bool, thread_index: u32, frame: u32) -> Self {
        CommandRecorder {
            handle,
            current_render_pass: None,
            current_framebuffer: None,
            current_pipeline: None,
            clear_values: SmallVec::new(),
            is_secondary,
            thread_index,
            frame,
        }
    }

    pub fn has_open_pass(&self) -> bool {
        self.current_render_pass.is_some()
    }

    pub fn set_clear_color(&mut self, index: usize, color: [f32; 4]) {
        if self.clear_values.len() <= index {
            self.clear_values.resize(index + 1, vk::ClearValue::default());
        }
        self.clear_values[index].color = vk::ClearColorValue { float32: color };
    }

    pub fn set_clear_depth_stencil(&mut self, depth: f32, stencil: u32) {
        let index = self.clear_values.len().max(8);
        if self.clear_values.len() <= index {
            self.clear_values.resize(index + 1, vk::ClearValue::default());
        }
        self.clear_values[index].depth_stencil = vk::ClearDepthStencilValue { depth, stencil };
    }

    pub fn end_current_render_pass(&mut self) {
        self.current_render_pass = None;
        self.current_framebuffer = None;
    }

    pub fn bind_pass(&mut self, pass: RenderPassHandle, framebuffer: FramebufferHandle) {
        if self.has_open_pass() {
            self.end_current_render_pass();
        }
        self.current_render_pass = Some(pass);
        self.current_framebuffer = Some(framebuffer);
    }

    pub fn bind_pipeline(&mut self, pipeline: PipelineHandle) {
        self.current_pipeline = Some(pipeline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_target_role_maps_to_color_attachment_state() {
        let s = state_for_role(PipelineStage::RenderTarget, false);
        assert_eq!(s, ResourceState::RENDER_TARGET);
        assert_eq!(image_layout_for_state(s), vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn depth_render_target_role_maps_to_depth_write() {
        let s = state_for_role(PipelineStage::RenderTarget, true);
        assert_eq!(s, ResourceState::DEPTH_WRITE);
        assert_eq!(
            image_layout_for_state(s),
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn depth_stencil_batch_adds_fragment_test_stages_to_both_masks() {
        let barrier = derive_image_barrier(
            PipelineStage::FragmentShader,
            PipelineStage::RenderTarget,
            true,
            true,
        );
        assert!(barrier
            .src_stage_mask
            .contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
        assert!(barrier
            .dst_stage_mask
            .contains(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS));
    }

    #[test]
    fn compute_role_targets_compute_stage_mask() {
        let mask = stage_mask_for_role(PipelineStage::ComputeShader);
        assert_eq!(mask, vk::PipelineStageFlags::COMPUTE_SHADER);
    }

    #[test]
    fn bind_pass_closes_a_previously_open_pass() {
        let mut rec = CommandRecorder::new(vk::CommandBuffer::null(), false, 0, 0);
        let a: RenderPassHandle = crate::handle::Handle::new(1);
        let b: RenderPassHandle = crate::handle::Handle::new(2);
        let fb: FramebufferHandle = crate::handle::Handle::new(1);
        rec.bind_pass(a, fb);
        assert!(rec.has_open_pass());
        rec.bind_pass(b, fb);
        assert_eq!(rec.current_render_pass.unwrap().index, 2);
    }
}
