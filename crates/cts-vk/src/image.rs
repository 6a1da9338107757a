use std::sync::Arc;

use ash::vk;
use cts_core::CtsError;

use crate::check::VkCheck;
use crate::command::color_range;
use crate::handles::Unique;

/// Create info for a single-mip, single-layer 2D optimal-tiling image.
pub fn image_2d_info(
    format: vk::Format,
    extent: vk::Extent2D,
    usage: vk::ImageUsageFlags,
    samples: vk::SampleCountFlags,
) -> vk::ImageCreateInfo<'static> {
    vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(samples)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
}

pub fn make_image_view(
    device: &Arc<ash::Device>,
    image: vk::Image,
    format: vk::Format,
    range: vk::ImageSubresourceRange,
) -> Result<Unique<vk::ImageView>, CtsError> {
    let info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(range);
    let view = unsafe { device.create_image_view(&info, None) }.vk_check("vkCreateImageView")?;
    Ok(Unique::new(device, view))
}

pub fn make_color_view(
    device: &Arc<ash::Device>,
    image: vk::Image,
    format: vk::Format,
) -> Result<Unique<vk::ImageView>, CtsError> {
    make_image_view(device, image, format, color_range())
}

pub fn make_buffer_view(
    device: &Arc<ash::Device>,
    buffer: vk::Buffer,
    format: vk::Format,
    offset: vk::DeviceSize,
    range: vk::DeviceSize,
) -> Result<Unique<vk::BufferView>, CtsError> {
    let info = vk::BufferViewCreateInfo::default()
        .buffer(buffer)
        .format(format)
        .offset(offset)
        .range(range);
    let view = unsafe { device.create_buffer_view(&info, None) }.vk_check("vkCreateBufferView")?;
    Ok(Unique::new(device, view))
}

pub fn make_sampler(
    device: &Arc<ash::Device>,
    info: &vk::SamplerCreateInfo,
) -> Result<Unique<vk::Sampler>, CtsError> {
    let sampler = unsafe { device.create_sampler(info, None) }.vk_check("vkCreateSampler")?;
    Ok(Unique::new(device, sampler))
}

pub fn make_framebuffer(
    device: &Arc<ash::Device>,
    render_pass: vk::RenderPass,
    attachments: &[vk::ImageView],
    extent: vk::Extent2D,
) -> Result<Unique<vk::Framebuffer>, CtsError> {
    let info = vk::FramebufferCreateInfo::default()
        .render_pass(render_pass)
        .attachments(attachments)
        .width(extent.width)
        .height(extent.height)
        .layers(1);
    let fb = unsafe { device.create_framebuffer(&info, None) }.vk_check("vkCreateFramebuffer")?;
    Ok(Unique::new(device, fb))
}

/// Render pass with one cleared color attachment that ends up in
/// TRANSFER_SRC_OPTIMAL, plus an optional cleared depth attachment.
pub fn make_render_pass(
    device: &Arc<ash::Device>,
    color_format: vk::Format,
    depth_format: Option<vk::Format>,
) -> Result<Unique<vk::RenderPass>, CtsError> {
    let mut attachments = vec![vk::AttachmentDescription::default()
        .format(color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)];
    if let Some(format) = depth_format {
        attachments.push(
            vk::AttachmentDescription::default()
                .format(format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        );
    }

    let color_ref = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };
    let mut subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_ref);
    if depth_format.is_some() {
        subpass = subpass.depth_stencil_attachment(&depth_ref);
    }

    let dependency = vk::SubpassDependency {
        src_subpass: 0,
        dst_subpass: vk::SUBPASS_EXTERNAL,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: vk::PipelineStageFlags::TRANSFER,
        src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        dst_access_mask: vk::AccessFlags::TRANSFER_READ,
        dependency_flags: vk::DependencyFlags::empty(),
    };

    let subpasses = [subpass];
    let dependencies = [dependency];
    let info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);
    let rp = unsafe { device.create_render_pass(&info, None) }.vk_check("vkCreateRenderPass")?;
    Ok(Unique::new(device, rp))
}
