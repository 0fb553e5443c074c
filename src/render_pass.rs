//! Native render-pass construction from a [`RenderPassOutput`] (§4.3,
//! §4.9). Generalized from `novade-vulkan-renderer/src/render_pass.rs`'s
//! hardcoded single-color-attachment `RenderPass::new` to an arbitrary
//! number of color attachments plus an optional depth/stencil attachment,
//! each with its own load/store operation and final layout, as described
//! by a [`RenderPassOutput`] fingerprint. Called by [`crate::render_pass_cache`]
//! on a cache miss.

use ash::vk;

use crate::enums::RenderPassOperation;
use crate::resources::RenderPassOutput;

fn op_from_repr(repr: u8) -> RenderPassOperation {
    match repr {
        1 => RenderPassOperation::Load,
        2 => RenderPassOperation::Clear,
        _ => RenderPassOperation::DontCare,
    }
}

fn load_op(op: RenderPassOperation) -> vk::AttachmentLoadOp {
    match op {
        RenderPassOperation::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        RenderPassOperation::Load => vk::AttachmentLoadOp::LOAD,
        RenderPassOperation::Clear => vk::AttachmentLoadOp::CLEAR,
    }
}

fn store_op(op: RenderPassOperation) -> vk::AttachmentStoreOp {
    match op {
        RenderPassOperation::DontCare => vk::AttachmentStoreOp::DONT_CARE,
        _ => vk::AttachmentStoreOp::STORE,
    }
}

/// Builds a native render pass for `output`: one subpass referencing
/// every color attachment (in order) plus the optional depth/stencil
/// attachment, with a single external dependency gating
/// `COLOR_ATTACHMENT_OUTPUT` (and fragment-test stages, when depth is
/// present) writes on a prior layout transition — the same dependency
/// shape the donor used for its single-attachment case.
pub fn create_render_pass(device: &ash::Device, output: &RenderPassOutput) -> Result<vk::RenderPass, vk::Result> {
    let mut attachments = Vec::with_capacity(output.num_color_formats as usize + 1);
    let mut color_refs = Vec::with_capacity(output.num_color_formats as usize);

    for i in 0..output.num_color_formats as usize {
        let op = op_from_repr(output.color_operations[i]);
        attachments.push(
            vk::AttachmentDescription::builder()
                .format(vk::Format::from_raw(output.color_formats[i]))
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(load_op(op))
                .store_op(store_op(op))
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::from_raw(output.color_final_layouts[i]))
                .build(),
        );
        color_refs.push(vk::AttachmentReference {
            attachment: i as u32,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        });
    }

    let has_depth = output.depth_stencil_format != vk::Format::UNDEFINED.as_raw();
    let depth_ref = if has_depth {
        let depth_index = attachments.len() as u32;
        attachments.push(
            vk::AttachmentDescription::builder()
                .format(vk::Format::from_raw(output.depth_stencil_format))
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(load_op(op_from_repr(output.depth_operation)))
                .store_op(store_op(op_from_repr(output.depth_operation)))
                .stencil_load_op(load_op(op_from_repr(output.stencil_operation)))
                .stencil_store_op(store_op(op_from_repr(output.stencil_operation)))
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::from_raw(output.depth_stencil_final_layout))
                .build(),
        );
        Some(vk::AttachmentReference {
            attachment: depth_index,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        })
    } else {
        None
    };

    let mut subpass_builder = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs);
    if let Some(depth_ref) = depth_ref.as_ref() {
        subpass_builder = subpass_builder.depth_stencil_attachment(depth_ref);
    }
    let subpass = subpass_builder.build();

    let mut dst_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    let mut dst_access = vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    if has_depth {
        dst_stage |= vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        dst_access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    }

    let dependency = vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(dst_stage)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(dst_stage)
        .dst_access_mask(dst_access)
        .build();

    let subpasses = [subpass];
    let dependencies = [dependency];
    let create_info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe { device.create_render_pass(&create_info, None) }
}
