use std::sync::Arc;

use ash::vk;
use cts_core::CtsError;

use crate::check::VkCheck;
use crate::handles::Unique;

pub fn create_command_pool(
    device: &Arc<ash::Device>,
    queue_family_index: u32,
    flags: vk::CommandPoolCreateFlags,
) -> Result<Unique<vk::CommandPool>, CtsError> {
    let info = vk::CommandPoolCreateInfo::default()
        .flags(flags)
        .queue_family_index(queue_family_index);
    let pool = unsafe { device.create_command_pool(&info, None) }.vk_check("vkCreateCommandPool")?;
    Ok(Unique::new(device, pool))
}

/// Allocate one command buffer. It is freed together with its pool.
pub fn allocate_command_buffer(
    device: &ash::Device,
    pool: vk::CommandPool,
    level: vk::CommandBufferLevel,
) -> Result<vk::CommandBuffer, CtsError> {
    let info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(level)
        .command_buffer_count(1);
    let buffers = unsafe { device.allocate_command_buffers(&info) }
        .vk_check("vkAllocateCommandBuffers")?;
    buffers
        .into_iter()
        .next()
        .ok_or_else(|| CtsError::fatal("vkAllocateCommandBuffers returned no buffers"))
}

pub fn begin_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<(), CtsError> {
    let info = vk::CommandBufferBeginInfo::default()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    unsafe { device.begin_command_buffer(cmd, &info) }.vk_check("vkBeginCommandBuffer")
}

/// Begin a secondary command buffer that is used outside any render pass.
pub fn begin_secondary_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
) -> Result<(), CtsError> {
    let inheritance = vk::CommandBufferInheritanceInfo::default();
    let info = vk::CommandBufferBeginInfo::default()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
        .inheritance_info(&inheritance);
    unsafe { device.begin_command_buffer(cmd, &info) }.vk_check("vkBeginCommandBuffer")
}

pub fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<(), CtsError> {
    unsafe { device.end_command_buffer(cmd) }.vk_check("vkEndCommandBuffer")
}

pub fn create_fence(
    device: &Arc<ash::Device>,
    flags: vk::FenceCreateFlags,
) -> Result<Unique<vk::Fence>, CtsError> {
    let info = vk::FenceCreateInfo::default().flags(flags);
    let fence = unsafe { device.create_fence(&info, None) }.vk_check("vkCreateFence")?;
    Ok(Unique::new(device, fence))
}

/// Timeline semaphores start at zero; binary ones get no type chain.
pub fn create_semaphore(
    device: &Arc<ash::Device>,
    semaphore_type: vk::SemaphoreType,
) -> Result<Unique<vk::Semaphore>, CtsError> {
    let mut type_info = vk::SemaphoreTypeCreateInfo::default()
        .semaphore_type(semaphore_type)
        .initial_value(0);
    let mut info = vk::SemaphoreCreateInfo::default();
    if semaphore_type == vk::SemaphoreType::TIMELINE {
        info = info.push_next(&mut type_info);
    }
    let semaphore =
        unsafe { device.create_semaphore(&info, None) }.vk_check("vkCreateSemaphore")?;
    Ok(Unique::new(device, semaphore))
}

pub fn create_query_pool(
    device: &Arc<ash::Device>,
    query_type: vk::QueryType,
    count: u32,
) -> Result<Unique<vk::QueryPool>, CtsError> {
    let info = vk::QueryPoolCreateInfo::default()
        .query_type(query_type)
        .query_count(count);
    let pool = unsafe { device.create_query_pool(&info, None) }.vk_check("vkCreateQueryPool")?;
    Ok(Unique::new(device, pool))
}

/// Submit `cmd` to `queue` and block until it has completed.
pub fn submit_commands_and_wait(
    device: &Arc<ash::Device>,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
) -> Result<(), CtsError> {
    let fence = create_fence(device, vk::FenceCreateFlags::empty())?;
    let cmds = [cmd];
    let submit = vk::SubmitInfo::default().command_buffers(&cmds);
    unsafe { device.queue_submit(queue, &[submit], fence.get()) }.vk_check("vkQueueSubmit")?;
    unsafe { device.wait_for_fences(&[fence.get()], true, u64::MAX) }
        .vk_check("vkWaitForFences")
}

// ── Barriers ────────────────────────────────────────────────────────────────

pub fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

pub fn color_layers() -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    }
}

pub fn image_barrier(
    image: vk::Image,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    range: vk::ImageSubresourceRange,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
}

pub fn buffer_barrier(
    buffer: vk::Buffer,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
) -> vk::BufferMemoryBarrier<'static> {
    vk::BufferMemoryBarrier::default()
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .buffer(buffer)
        .offset(0)
        .size(vk::WHOLE_SIZE)
}

pub fn memory_barrier(
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
) -> vk::MemoryBarrier<'static> {
    vk::MemoryBarrier::default()
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
}

pub fn cmd_image_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    src_stage: vk::PipelineStageFlags,
    dst_stage: vk::PipelineStageFlags,
    barrier: vk::ImageMemoryBarrier,
) {
    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        )
    };
}

pub fn cmd_buffer_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    src_stage: vk::PipelineStageFlags,
    dst_stage: vk::PipelineStageFlags,
    barrier: vk::BufferMemoryBarrier,
) {
    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[barrier],
            &[],
        )
    };
}

pub fn cmd_memory_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    src_stage: vk::PipelineStageFlags,
    dst_stage: vk::PipelineStageFlags,
    barrier: vk::MemoryBarrier,
) {
    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[barrier],
            &[],
            &[],
        )
    };
}

/// Copy a single-layer color image (already in TRANSFER_SRC_OPTIMAL) into
/// `buffer` and make the result visible to the host.
pub fn cmd_copy_image_to_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    buffer: vk::Buffer,
    extent: vk::Extent2D,
) {
    let region = vk::BufferImageCopy::default()
        .buffer_offset(0)
        .image_subresource(color_layers())
        .image_extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        });
    unsafe {
        device.cmd_copy_image_to_buffer(
            cmd,
            image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            buffer,
            &[region],
        )
    };
    cmd_buffer_barrier(
        device,
        cmd,
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::HOST,
        buffer_barrier(buffer, vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::HOST_READ),
    );
}

pub fn begin_render_pass(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    render_pass: vk::RenderPass,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
    clear_values: &[vk::ClearValue],
) {
    let info = vk::RenderPassBeginInfo::default()
        .render_pass(render_pass)
        .framebuffer(framebuffer)
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        })
        .clear_values(clear_values);
    unsafe { device.cmd_begin_render_pass(cmd, &info, vk::SubpassContents::INLINE) };
}
