//! Creates the resources behind a [`DescriptorCommands`] model, applies the
//! writes and copies in one update and runs the verification shader.

use ash::vk;
use cts_core::{CtsError, TestStatus};
use cts_vk::command::{
    allocate_command_buffer, begin_command_buffer, begin_render_pass, cmd_copy_image_to_buffer,
    cmd_image_barrier, color_range, create_command_pool, end_command_buffer, image_barrier,
    submit_commands_and_wait,
};
use cts_vk::descriptor::{
    allocate_descriptor_set, DescriptorPoolBuilder, DescriptorSetLayoutBuilder,
    DescriptorSetUpdateBuilder,
};
use cts_vk::image::{image_2d_info, make_buffer_view, make_color_view, make_framebuffer, make_sampler};
use cts_vk::pipeline::{make_compute_pipeline, make_pipeline_layout, GraphicsPipelineBuilder};
use cts_vk::{
    BinaryCollection, BufferWithMemory, Context, ImageWithMemory, MemoryRequirement, Unique, VkCheck,
};
use tracing::debug;

use super::model::{
    Descriptor, DescriptorCommands, DescriptorKind, InlineUniformBlockLimits, PipelineType,
    IUB_ELEMENT_SIZE,
};

const RENDER_SIZE: vk::Extent2D = vk::Extent2D {
    width: 64,
    height: 64,
};
const DESCRIPTOR_IMAGE_FORMAT: vk::Format = vk::Format::R32_SFLOAT;
const RESULT_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
/// Bytes between consecutive values in a descriptor buffer.
const BUFFER_STRIDE: u64 = 256;

enum Resources {
    Buffer {
        buffer: BufferWithMemory,
        infos: Vec<vk::DescriptorBufferInfo>,
        views: Vec<Unique<vk::BufferView>>,
    },
    Image {
        _images: Vec<ImageWithMemory>,
        views: Vec<Unique<vk::ImageView>>,
        _sampler: Unique<vk::Sampler>,
        infos: Vec<vk::DescriptorImageInfo>,
    },
    Sampler {
        _samplers: Vec<Unique<vk::Sampler>>,
        infos: Vec<vk::DescriptorImageInfo>,
    },
    InlineBlock {
        bytes: Vec<u8>,
    },
}

fn inline_uniform_block_limits(context: &Context) -> InlineUniformBlockLimits {
    if !context.features().inline_uniform_block() {
        return InlineUniformBlockLimits::default();
    }
    let mut iub = vk::PhysicalDeviceInlineUniformBlockProperties::default();
    {
        let mut props2 = vk::PhysicalDeviceProperties2::default().push_next(&mut iub);
        unsafe {
            context
                .instance()
                .get_physical_device_properties2(context.physical_device(), &mut props2)
        };
    }
    InlineUniformBlockLimits {
        max_inline_uniform_block_size: iub.max_inline_uniform_block_size,
        max_per_stage_descriptor_inline_uniform_blocks: iub
            .max_per_stage_descriptor_inline_uniform_blocks,
        max_descriptor_set_inline_uniform_blocks: iub.max_descriptor_set_inline_uniform_blocks,
    }
}

// ── Per-descriptor resources ────────────────────────────────────────────────

fn init_buffer(context: &Context, d: &Descriptor) -> Result<Resources, CtsError> {
    let device = context.device();
    let areas = d.num_dynamic_areas() as u64;
    let size = BUFFER_STRIDE * d.array_size() as u64 * areas;
    let mut buffer = BufferWithMemory::host_visible(context.allocator(), size, d.kind().buffer_usage())?;

    let range = if d.kind().is_dynamic() { BUFFER_STRIDE } else { 4 };
    let infos = (0..d.array_size() as u64)
        .map(|i| vk::DescriptorBufferInfo {
            buffer: buffer.buffer(),
            offset: BUFFER_STRIDE * areas * i,
            range,
        })
        .collect();

    let mut views = Vec::new();
    if d.kind().uses_buffer_view() {
        for i in 0..d.array_size() as u64 {
            views.push(make_buffer_view(
                device,
                buffer.buffer(),
                DESCRIPTOR_IMAGE_FORMAT,
                BUFFER_STRIDE * i,
                4,
            )?);
        }
    }

    let bytes = buffer.bytes_mut();
    for idx in 0..d.array_size() {
        for area in 0..d.num_dynamic_areas() {
            let value = d.id() + idx * d.num_dynamic_areas() + area;
            let word = if d.kind().uses_buffer_view() {
                (value as f32).to_bits()
            } else {
                value
            };
            let offset = BUFFER_STRIDE as usize * (d.num_dynamic_areas() * idx + area) as usize;
            bytes[offset..offset + 4].copy_from_slice(&word.to_ne_bytes());
        }
    }
    buffer.allocation().flush()?;

    Ok(Resources::Buffer {
        buffer,
        infos,
        views,
    })
}

fn init_image(context: &Context, d: &Descriptor, pipeline: PipelineType) -> Result<Resources, CtsError> {
    let device = context.device();
    let kind = d.kind();

    let sampler_info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::NEAREST)
        .min_filter(vk::Filter::NEAREST)
        .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
        .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .max_lod(0.0);
    let sampler = make_sampler(device, &sampler_info)?;

    let info = image_2d_info(
        DESCRIPTOR_IMAGE_FORMAT,
        RENDER_SIZE,
        kind.image_usage(),
        vk::SampleCountFlags::TYPE_1,
    );
    let mut images = Vec::new();
    let mut views = Vec::new();
    for _ in 0..d.array_size() {
        let image = ImageWithMemory::new(context.allocator(), &info, MemoryRequirement::ANY)?;
        views.push(make_color_view(device, image.image(), DESCRIPTOR_IMAGE_FORMAT)?);
        images.push(image);
    }
    let infos = views
        .iter()
        .map(|view| vk::DescriptorImageInfo {
            sampler: sampler.get(),
            image_view: view.get(),
            image_layout: kind.image_layout(),
        })
        .collect();

    let pool = create_command_pool(
        device,
        context.universal_queue_family_index(),
        vk::CommandPoolCreateFlags::TRANSIENT,
    )?;
    let cmd = allocate_command_buffer(device, pool.get(), vk::CommandBufferLevel::PRIMARY)?;
    begin_command_buffer(device, cmd)?;
    let shader_stage = match pipeline {
        PipelineType::Compute => vk::PipelineStageFlags::COMPUTE_SHADER,
        PipelineType::Graphics => vk::PipelineStageFlags::FRAGMENT_SHADER,
    };
    for (idx, image) in images.iter().enumerate() {
        let value = (d.id() + idx as u32) as f32;
        cmd_image_barrier(
            device,
            cmd,
            vk::PipelineStageFlags::HOST,
            vk::PipelineStageFlags::TRANSFER,
            image_barrier(
                image.image(),
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                color_range(),
            ),
        );
        let clear = vk::ClearColorValue {
            float32: [value; 4],
        };
        unsafe {
            device.cmd_clear_color_image(
                cmd,
                image.image(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &clear,
                &[color_range()],
            )
        };
        cmd_image_barrier(
            device,
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            shader_stage,
            image_barrier(
                image.image(),
                vk::AccessFlags::TRANSFER_WRITE,
                kind.image_access(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                kind.image_layout(),
                color_range(),
            ),
        );
    }
    end_command_buffer(device, cmd)?;
    submit_commands_and_wait(device, context.universal_queue(), cmd)?;

    Ok(Resources::Image {
        _images: images,
        views,
        _sampler: sampler,
        infos,
    })
}

fn init_samplers(context: &Context, d: &Descriptor) -> Result<Resources, CtsError> {
    let mut samplers = Vec::new();
    for i in 0..d.array_size() {
        let border = if (d.id() + i) % 2 == 1 {
            vk::BorderColor::FLOAT_OPAQUE_WHITE
        } else {
            vk::BorderColor::FLOAT_TRANSPARENT_BLACK
        };
        let info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::NEAREST)
            .min_filter(vk::Filter::NEAREST)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_BORDER)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_BORDER)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_BORDER)
            .border_color(border)
            .max_lod(0.0);
        samplers.push(make_sampler(context.device(), &info)?);
    }
    let infos = samplers
        .iter()
        .map(|s| vk::DescriptorImageInfo {
            sampler: s.get(),
            image_view: vk::ImageView::null(),
            image_layout: vk::ImageLayout::UNDEFINED,
        })
        .collect();
    Ok(Resources::Sampler {
        _samplers: samplers,
        infos,
    })
}

/// Block data padded to 16 bytes per element, `data[i] = id + i`.
fn init_inline_block(d: &Descriptor) -> Resources {
    let mut bytes = vec![0u8; d.iub_size_in_bytes() as usize];
    for i in 0..d.array_size() {
        let offset = (i * IUB_ELEMENT_SIZE) as usize;
        bytes[offset..offset + 4].copy_from_slice(&(d.id() + i).to_ne_bytes());
    }
    Resources::InlineBlock { bytes }
}

fn init_resources(context: &Context, d: &Descriptor, pipeline: PipelineType) -> Result<Resources, CtsError> {
    match d.kind() {
        DescriptorKind::InlineUniformBlock => Ok(init_inline_block(d)),
        DescriptorKind::Sampler => init_samplers(context, d),
        kind if kind.is_buffer() => init_buffer(context, d),
        _ => init_image(context, d, pipeline),
    }
}

fn record_write(
    updates: &mut DescriptorSetUpdateBuilder,
    set: vk::DescriptorSet,
    binding: u32,
    d: &Descriptor,
    resources: &Resources,
) {
    let first = d.first_written_element() as usize;
    let count = d.num_written_elements() as usize;
    if count == 0 {
        return;
    }
    let ty = d.kind().descriptor_type();
    let range = first..first + count;
    match resources {
        Resources::Buffer { views, .. } if d.kind().uses_buffer_view() => {
            let handles = views[range].iter().map(|v| v.get()).collect();
            updates.write_texel_buffers(set, binding, first as u32, ty, handles);
        }
        Resources::Buffer { infos, .. } => {
            updates.write_buffers(set, binding, first as u32, ty, infos[range].to_vec());
        }
        Resources::Image { infos, .. } | Resources::Sampler { infos, .. } => {
            updates.write_images(set, binding, first as u32, ty, infos[range].to_vec());
        }
        Resources::InlineBlock { bytes } => {
            let size = IUB_ELEMENT_SIZE as usize;
            updates.write_inline_uniform_block(
                set,
                binding,
                (first * size) as u32,
                bytes[first * size..(first + count) * size].to_vec(),
            );
        }
    }
}

// ── Render pass ─────────────────────────────────────────────────────────────

/// One cleared color attachment followed by one R32_SFLOAT input
/// attachment per reference. The color attachment ends up ready for a
/// transfer read.
fn make_input_render_pass(
    device: &std::sync::Arc<ash::Device>,
    input_refs: &[vk::AttachmentReference],
) -> Result<Unique<vk::RenderPass>, CtsError> {
    let mut attachments = vec![vk::AttachmentDescription::default()
        .format(RESULT_FORMAT)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)];
    for _ in input_refs {
        attachments.push(
            vk::AttachmentDescription::default()
                .format(DESCRIPTOR_IMAGE_FORMAT)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::LOAD)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .final_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        );
    }

    let color_ref = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .input_attachments(input_refs)
        .color_attachments(&color_ref)];
    let dependencies = [vk::SubpassDependency {
        src_subpass: 0,
        dst_subpass: vk::SUBPASS_EXTERNAL,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: vk::PipelineStageFlags::TRANSFER,
        src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        dst_access_mask: vk::AccessFlags::TRANSFER_READ,
        dependency_flags: vk::DependencyFlags::empty(),
    }];
    let info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);
    let rp = unsafe { device.create_render_pass(&info, None) }.vk_check("vkCreateRenderPass")?;
    Ok(Unique::new(device, rp))
}

// ── Run ─────────────────────────────────────────────────────────────────────

pub fn run(
    commands: &DescriptorCommands,
    context: &Context,
    binaries: &BinaryCollection,
) -> Result<TestStatus, CtsError> {
    let device = context.device();
    let pipeline_type = commands.pipeline_type();
    let stage = pipeline_type.shader_stage();

    let iub_usage = commands.check_limits(context.limits(), &inline_uniform_block_limits(context))?;

    let resources = commands
        .descriptors()
        .iter()
        .map(|d| init_resources(context, d, pipeline_type))
        .collect::<Result<Vec<_>, _>>()?;
    debug!("initialised {} descriptors", resources.len());

    let pool = commands
        .pool_sizes()
        .into_iter()
        .fold(DescriptorPoolBuilder::new(), |b, (ty, count)| b.add_type(ty, count))
        .inline_uniform_block_bindings(iub_usage.total_blocks)
        .build(
            device,
            vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET,
            commands.set_count() as u32,
        )?;

    let mut layouts = Vec::with_capacity(commands.set_count());
    for set in 0..commands.set_count() {
        let layout = commands
            .set_bindings(set)
            .fold(DescriptorSetLayoutBuilder::new(), |b, d| {
                b.add_array_binding(d.kind().descriptor_type(), d.layout_count(), stage)
            })
            .build(device)?;
        layouts.push(layout);
    }
    let sets = layouts
        .iter()
        .map(|layout| allocate_descriptor_set(device, pool.get(), layout.get()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut updates = DescriptorSetUpdateBuilder::new();
    for (set_idx, set) in sets.iter().enumerate() {
        for (binding, d) in commands.set_bindings(set_idx).enumerate() {
            let index = commands
                .descriptors()
                .iter()
                .position(|other| other.id() == d.id())
                .ok_or_else(|| CtsError::fatal("descriptor not registered"))?;
            record_write(&mut updates, *set, binding as u32, d, &resources[index]);
        }
    }
    for copy in commands.copies() {
        updates.copy(
            sets[copy.src_set as usize],
            copy.src_binding,
            copy.src_array_element,
            sets[copy.dst_set as usize],
            copy.dst_binding,
            copy.dst_array_element,
            copy.count,
        );
    }
    updates.update(device);

    let layout_handles: Vec<vk::DescriptorSetLayout> = layouts.iter().map(|l| l.get()).collect();
    let pipeline_layout = make_pipeline_layout(device, &layout_handles, &[])?;

    let pool_cmd = create_command_pool(
        device,
        context.universal_queue_family_index(),
        vk::CommandPoolCreateFlags::TRANSIENT,
    )?;
    let cmd = allocate_command_buffer(device, pool_cmd.get(), vk::CommandBufferLevel::PRIMARY)?;
    let offsets = commands.dynamic_offsets();

    match pipeline_type {
        PipelineType::Compute => {
            let module = binaries.create_module(device, "compute")?;
            let pipeline = make_compute_pipeline(
                device,
                pipeline_layout.get(),
                module.get(),
                vk::PipelineCache::null(),
            )?;

            begin_command_buffer(device, cmd)?;
            unsafe {
                device.cmd_bind_pipeline(cmd, pipeline_type.bind_point(), pipeline.get());
                device.cmd_bind_descriptor_sets(
                    cmd,
                    pipeline_type.bind_point(),
                    pipeline_layout.get(),
                    0,
                    &sets,
                    &offsets,
                );
                device.cmd_dispatch(cmd, 1, 1, 1);
            }
            end_command_buffer(device, cmd)?;
            submit_commands_and_wait(device, context.universal_queue(), cmd)?;

            let result_id = commands
                .result_buffer_id()
                .ok_or_else(|| CtsError::fatal("compute case without a result buffer"))?;
            let result = commands
                .descriptors()
                .iter()
                .position(|d| d.id() == result_id)
                .and_then(|i| match &resources[i] {
                    Resources::Buffer { buffer, .. } => Some(buffer),
                    _ => None,
                })
                .ok_or_else(|| CtsError::fatal("result buffer missing"))?;
            result.allocation().invalidate()?;
            let value = i32::from_ne_bytes([
                result.bytes()[0],
                result.bytes()[1],
                result.bytes()[2],
                result.bytes()[3],
            ]);
            if value == 1 {
                Ok(TestStatus::pass("Pass"))
            } else {
                Ok(TestStatus::fail("Data validation failed"))
            }
        }
        PipelineType::Graphics => {
            let allocator = context.allocator();
            let result_image = ImageWithMemory::new(
                allocator,
                &image_2d_info(
                    RESULT_FORMAT,
                    RENDER_SIZE,
                    vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
                    vk::SampleCountFlags::TYPE_1,
                ),
                MemoryRequirement::ANY,
            )?;
            let result_view = make_color_view(device, result_image.image(), RESULT_FORMAT)?;
            let readback = BufferWithMemory::host_visible(
                allocator,
                (RENDER_SIZE.width * RENDER_SIZE.height * 4) as u64,
                vk::BufferUsageFlags::TRANSFER_DST,
            )?;

            // The first attachment is the color buffer, so input attachment
            // indices are shifted by one.
            let mut input_refs = Vec::new();
            let mut attachments = vec![result_view.get()];
            for (d, res) in commands.descriptors().iter().zip(&resources) {
                if d.kind() != DescriptorKind::InputAttachment {
                    continue;
                }
                input_refs.extend(d.attachment_indices().iter().map(|&i| vk::AttachmentReference {
                    attachment: i + 1,
                    layout: d.kind().image_layout(),
                }));
                if let Resources::Image { views, .. } = res {
                    attachments.extend(views.iter().map(|v| v.get()));
                }
            }

            let render_pass = make_input_render_pass(device, &input_refs)?;
            let framebuffer = make_framebuffer(device, render_pass.get(), &attachments, RENDER_SIZE)?;
            let vs = binaries.create_module(device, "vertex")?;
            let fs = binaries.create_module(device, "fragment")?;
            let pipeline = GraphicsPipelineBuilder::new(RENDER_SIZE).build(
                device,
                pipeline_layout.get(),
                render_pass.get(),
                vs.get(),
                fs.get(),
                vk::PipelineCache::null(),
            )?;

            begin_command_buffer(device, cmd)?;
            let clear = [vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [1.0, 0.0, 0.0, 1.0],
                },
            }];
            begin_render_pass(device, cmd, render_pass.get(), framebuffer.get(), RENDER_SIZE, &clear);
            unsafe {
                device.cmd_bind_pipeline(cmd, pipeline_type.bind_point(), pipeline.get());
                device.cmd_bind_descriptor_sets(
                    cmd,
                    pipeline_type.bind_point(),
                    pipeline_layout.get(),
                    0,
                    &sets,
                    &offsets,
                );
                device.cmd_draw(cmd, 6, 1, 0, 0);
                device.cmd_end_render_pass(cmd);
            }
            cmd_copy_image_to_buffer(device, cmd, result_image.image(), readback.buffer(), RENDER_SIZE);
            end_command_buffer(device, cmd)?;
            submit_commands_and_wait(device, context.universal_queue(), cmd)?;

            readback.allocation().invalidate()?;
            let all_green = readback
                .bytes()
                .chunks_exact(4)
                .all(|px| px == [0u8, 255, 0, 255]);
            if all_green {
                Ok(TestStatus::pass("Pass"))
            } else {
                Ok(TestStatus::fail("Result image validation failed"))
            }
        }
    }
}
