//! Pixel selection consistency: a second subpass rendered at a coarse
//! fragment rate reads back the per-pixel tile index written by the first
//! subpass. Every coarse fragment must pick the same pixel of its tile.

use ash::vk;
use cts_core::{CtsError, ShaderStage, SourceCollections, TestGroup, TestStatus};
use cts_vk::command::{
    allocate_command_buffer, begin_command_buffer, begin_render_pass, cmd_copy_image_to_buffer,
    cmd_image_barrier, color_range, create_command_pool, end_command_buffer, image_barrier,
    submit_commands_and_wait,
};
use cts_vk::descriptor::{
    allocate_descriptor_set, DescriptorPoolBuilder, DescriptorSetLayoutBuilder,
    DescriptorSetUpdateBuilder,
};
use cts_vk::image::{image_2d_info, make_color_view, make_framebuffer};
use cts_vk::pipeline::{make_pipeline_layout, FragmentShadingRateState, GraphicsPipelineBuilder};
use cts_vk::{
    BinaryCollection, BufferWithMemory, Context, CustomDevice, ImageWithMemory, MemoryRequirement,
    TestCase, TestInstance, Unique, VkCheck,
};
use tracing::{debug, info};

use crate::registry::CaseBox;

const IMAGE_FORMAT: vk::Format = vk::Format::R32G32_UINT;
const UNCOVERED: u32 = u32::MAX;

const BASIC_TRIANGLES: [[f32; 2]; 6] = [
    [-1.0, -1.0],
    [1.0, -1.0],
    [1.0, 1.0],
    [-1.0, 1.0],
    [1.0, -1.0],
    [1.0, 1.0],
];

const RATES: [(u32, u32); 9] = [
    (1, 1),
    (1, 2),
    (1, 4),
    (2, 1),
    (2, 2),
    (2, 4),
    (4, 1),
    (4, 2),
    (4, 4),
];

const SAMPLES: [vk::SampleCountFlags; 5] = [
    vk::SampleCountFlags::TYPE_1,
    vk::SampleCountFlags::TYPE_2,
    vk::SampleCountFlags::TYPE_4,
    vk::SampleCountFlags::TYPE_8,
    vk::SampleCountFlags::TYPE_16,
];

const EXTENTS: [(u32, u32); 5] = [(1, 1), (4, 4), (33, 35), (151, 431), (256, 256)];

fn attachment_usage() -> vk::ImageUsageFlags {
    vk::ImageUsageFlags::COLOR_ATTACHMENT
        | vk::ImageUsageFlags::INPUT_ATTACHMENT
        | vk::ImageUsageFlags::TRANSFER_SRC
        | vk::ImageUsageFlags::TRANSFER_DST
}

#[derive(Debug, Clone, Copy)]
pub struct CaseDef {
    pub shading_rate: vk::Extent2D,
    pub samples: vk::SampleCountFlags,
    pub framebuffer_extent: vk::Extent2D,
    /// Derive the tile index from `gl_FragCoord.zw` instead of `.xy`.
    pub zw_coord: bool,
}

// ── Shading rate selection ──────────────────────────────────────────────────

/// One entry of `vkGetPhysicalDeviceFragmentShadingRatesKHR`.
#[derive(Debug, Clone, Copy)]
pub struct SupportedRate {
    pub fragment_size: vk::Extent2D,
    pub sample_counts: vk::SampleCountFlags,
}

fn aspect_ratio(size: vk::Extent2D) -> u32 {
    size.width.max(size.height) / size.width.min(size.height).max(1)
}

/// The rates an implementation may actually use when `desired` is requested.
///
/// An exact match is the only candidate. Otherwise the largest area not
/// exceeding `desired` in either dimension is searched for, halving the
/// area each round, and only the squarest candidates survive. At most two
/// are kept since the fragment shader has two output channels.
pub fn clamp_shading_rate(desired: vk::Extent2D, supported: &[SupportedRate]) -> Vec<vk::Extent2D> {
    let usable: Vec<vk::Extent2D> = supported
        .iter()
        .filter(|r| r.sample_counts.contains(vk::SampleCountFlags::TYPE_1))
        .map(|r| r.fragment_size)
        .collect();

    if usable.contains(&desired) {
        return vec![desired];
    }

    let mut area = desired.width * desired.height;
    while area > 0 {
        let mut candidates: Vec<vk::Extent2D> = usable
            .iter()
            .copied()
            .filter(|s| s.width <= desired.width && s.height <= desired.height)
            .filter(|s| s.width * s.height == area)
            .collect();
        if !candidates.is_empty() {
            candidates.sort_by_key(|s| aspect_ratio(*s));
            let best = aspect_ratio(candidates[0]);
            candidates.retain(|s| aspect_ratio(*s) == best);
            candidates.truncate(2);
            return candidates;
        }
        area /= 2;
    }
    Vec::new()
}

// ── Verification ────────────────────────────────────────────────────────────

/// Check channel `index` of the pass-1 image against one clamped rate.
///
/// Pixels of tiles cut by the framebuffer edge are skipped unless image
/// robustness is on, in which case they must agree with each other or be 0.
/// Every other covered pixel must carry the same in-tile index.
pub fn verify_pixel_consistency(
    pixels: &[[u32; 2]],
    width: u32,
    height: u32,
    index: usize,
    rate: vk::Extent2D,
    image_robustness: bool,
) -> TestStatus {
    let mut inside: Option<u32> = None;
    let mut outside: Option<u32> = None;

    let rows = pixels.chunks_exact(width.max(1) as usize).take(height as usize);
    for (y, row) in rows.enumerate() {
        let y = y as u32;
        for (x, texel) in row.iter().enumerate() {
            let x = x as u32;
            let pixel = texel[index];
            if pixel == UNCOVERED {
                continue;
            }

            let outside_w = (x / rate.width + 1) * rate.width > width;
            let outside_h = (y / rate.height + 1) * rate.height > height;

            if outside_w || outside_h {
                if !image_robustness {
                    continue;
                }
                match outside {
                    None | Some(0) => outside = Some(pixel),
                    Some(seen) if pixel != 0 && seen != pixel => {
                        return TestStatus::fail(format!(
                            "edge pixel ({}, {}) selected {} but another edge tile selected {}",
                            x, y, pixel, seen
                        ));
                    }
                    Some(_) => {}
                }
            } else {
                match inside {
                    None => {
                        if pixel >= rate.width * rate.height {
                            return TestStatus::fail(format!(
                                "pixel ({}, {}) selected {} outside a {}x{} tile",
                                x, y, pixel, rate.width, rate.height
                            ));
                        }
                        inside = Some(pixel);
                    }
                    Some(seen) if seen != pixel => {
                        return TestStatus::fail(format!(
                            "pixel ({}, {}) selected {} but earlier tiles selected {}",
                            x, y, pixel, seen
                        ));
                    }
                    Some(_) => {}
                }
            }
        }
    }
    TestStatus::pass("Pass")
}

// ── Shaders ─────────────────────────────────────────────────────────────────

fn vertex_source(zw_coord: bool) -> String {
    let position = if zw_coord {
        "vec4(position, position)"
    } else {
        "vec4(position, 0, 1)"
    };
    format!(
        "#version 450 core\n\
         layout(location = 0) in vec2 position;\n\
         out gl_PerVertex\n\
         {{\n\
         \x20  vec4 gl_Position;\n\
         }};\n\
         void main()\n\
         {{\n\
         \x20 gl_Position = {};\n\
         }}\n",
        position
    )
}

fn pass0_fragment_source(zw_coord: bool) -> String {
    let (a, b) = if zw_coord { ("z", "w") } else { ("x", "y") };
    let channel = |c: &str, i: u32| {
        format!(
            "  col0.{c} = (uint(gl_FragCoord.{a}) % pc.shadingRate[{i}].x) + ((uint(gl_FragCoord.{b}) % pc.shadingRate[{i}].y) * pc.shadingRate[{i}].x);\n"
        )
    };
    format!(
        "#version 450 core\n\
         layout(push_constant) uniform PC {{\n\
         \tuvec2 shadingRate[2];\n\
         }} pc;\n\
         layout(location = 0) out uvec2 col0;\n\
         void main()\n\
         {{\n\
         {}{}}}\n",
        channel("x", 0),
        channel("y", 1)
    )
}

fn pass1_fragment_source(samples: vk::SampleCountFlags) -> String {
    let (input, load) = if samples == vk::SampleCountFlags::TYPE_1 {
        ("usubpassInput", "subpassLoad(inputAttachment).xy")
    } else {
        ("usubpassInputMS", "subpassLoad(inputAttachment, 0).xy")
    };
    format!(
        "#version 450 core\n\
         layout(input_attachment_index=0, set=0, binding=0) uniform {} inputAttachment;\n\
         layout(location = 0) out uvec2 col0;\n\
         void main()\n\
         {{\n\
         \x20 col0 = {};\n\
         }}\n",
        input, load
    )
}

// ── Case ────────────────────────────────────────────────────────────────────

pub struct PixelConsistencyCase {
    def: CaseDef,
}

impl PixelConsistencyCase {
    pub fn new(def: CaseDef) -> Self {
        Self { def }
    }
}

impl TestCase for PixelConsistencyCase {
    fn check_support(&self, context: &Context) -> Result<(), CtsError> {
        context.require_device_extension(ash::khr::fragment_shading_rate::NAME)?;
        if !context.features().pipeline_fragment_shading_rate() {
            return Err(CtsError::not_supported("pipelineFragmentShadingRate not supported"));
        }

        let properties = context
            .image_format_properties(
                IMAGE_FORMAT,
                vk::ImageType::TYPE_2D,
                vk::ImageTiling::OPTIMAL,
                attachment_usage(),
            )
            .ok_or_else(|| CtsError::not_supported("VK_FORMAT_R32G32_UINT not supported"))?;
        if !properties.sample_counts.contains(self.def.samples) {
            return Err(CtsError::not_supported("Image sample count not supported"));
        }
        let extent = self.def.framebuffer_extent;
        if properties.max_extent.width < extent.width || properties.max_extent.height < extent.height {
            return Err(CtsError::not_supported("Image max extents are smaller than required"));
        }
        Ok(())
    }

    fn init_programs(&self, programs: &mut SourceCollections) {
        programs.add("vert", ShaderStage::Vertex, vertex_source(self.def.zw_coord));
        programs.add("frag_pass0", ShaderStage::Fragment, pass0_fragment_source(self.def.zw_coord));
        programs.add("frag_pass1", ShaderStage::Fragment, pass1_fragment_source(self.def.samples));
    }

    fn create_instance<'a>(
        &self,
        context: &'a Context,
        binaries: &'a BinaryCollection,
    ) -> Result<Box<dyn TestInstance + 'a>, CtsError> {
        let loader = ash::khr::fragment_shading_rate::Instance::new(context.entry(), context.instance());
        let supported: Vec<SupportedRate> =
            unsafe { loader.get_physical_device_fragment_shading_rates(context.physical_device()) }
                .vk_check("vkGetPhysicalDeviceFragmentShadingRatesKHR")?
                .iter()
                .map(|r| SupportedRate {
                    fragment_size: r.fragment_size,
                    sample_counts: r.sample_counts,
                })
                .collect();

        let clamped = clamp_shading_rate(self.def.shading_rate, &supported);
        if clamped.is_empty() {
            return Err(CtsError::fatal(format!(
                "no supported fragment size can replace {}x{}",
                self.def.shading_rate.width, self.def.shading_rate.height
            )));
        }
        debug!(
            "fragment size {}x{} clamped to {:?}",
            self.def.shading_rate.width, self.def.shading_rate.height, clamped
        );

        Ok(Box::new(PixelConsistencyInstance {
            def: self.def,
            clamped,
            context,
            binaries,
        }))
    }
}

struct PixelConsistencyInstance<'a> {
    def: CaseDef,
    clamped: Vec<vk::Extent2D>,
    context: &'a Context,
    binaries: &'a BinaryCollection,
}

impl PixelConsistencyInstance<'_> {
    fn push_constants(&self) -> [u32; 4] {
        let first = self.clamped[0];
        let second = self.clamped.get(1).copied().unwrap_or(first);
        [first.width, first.height, second.width, second.height]
    }

    fn render_pass(&self, device: &std::sync::Arc<ash::Device>) -> Result<Unique<vk::RenderPass>, CtsError> {
        let attachment = |samples| {
            vk::AttachmentDescription::default()
                .format(IMAGE_FORMAT)
                .samples(samples)
                .load_op(vk::AttachmentLoadOp::LOAD)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::GENERAL)
                .final_layout(vk::ImageLayout::GENERAL)
        };
        let attachments = [attachment(self.def.samples), attachment(vk::SampleCountFlags::TYPE_1)];

        let pass0_ref = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::GENERAL,
        }];
        let pass1_ref = [vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::GENERAL,
        }];
        let subpasses = [
            vk::SubpassDescription::default()
                .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                .color_attachments(&pass0_ref),
            vk::SubpassDescription::default()
                .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                .input_attachments(&pass0_ref)
                .color_attachments(&pass1_ref),
        ];
        let dependencies = [vk::SubpassDependency {
            src_subpass: 0,
            dst_subpass: 1,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER,
            src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            dst_access_mask: vk::AccessFlags::INPUT_ATTACHMENT_READ,
            dependency_flags: vk::DependencyFlags::empty(),
        }];

        let info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);
        let render_pass =
            unsafe { device.create_render_pass(&info, None) }.vk_check("vkCreateRenderPass")?;
        Ok(Unique::new(device, render_pass))
    }

    /// Draw both subpasses on `custom` and return the pass-1 image texels.
    fn render(&self, custom: &CustomDevice) -> Result<Vec<[u32; 2]>, CtsError> {
        let device = custom.device();
        let allocator = custom.allocator();
        let queue = custom
            .queue()
            .ok_or_else(|| CtsError::fatal("custom device has no queue"))?;
        let extent = self.def.framebuffer_extent;

        let mut vertex_buffer = BufferWithMemory::host_visible(
            allocator,
            std::mem::size_of_val(&BASIC_TRIANGLES) as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        vertex_buffer
            .bytes_mut()
            .copy_from_slice(bytemuck::cast_slice(&BASIC_TRIANGLES));
        vertex_buffer.allocation().flush()?;

        let pass0_image = ImageWithMemory::new(
            allocator,
            &image_2d_info(
                IMAGE_FORMAT,
                extent,
                vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::INPUT_ATTACHMENT
                    | vk::ImageUsageFlags::TRANSFER_DST,
                self.def.samples,
            ),
            MemoryRequirement::ANY,
        )?;
        let pass1_image = ImageWithMemory::new(
            allocator,
            &image_2d_info(
                IMAGE_FORMAT,
                extent,
                vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST,
                vk::SampleCountFlags::TYPE_1,
            ),
            MemoryRequirement::ANY,
        )?;
        let pass0_view = make_color_view(device, pass0_image.image(), IMAGE_FORMAT)?;
        let pass1_view = make_color_view(device, pass1_image.image(), IMAGE_FORMAT)?;

        let texel_count = (extent.width * extent.height) as vk::DeviceSize;
        let readback = BufferWithMemory::host_visible(allocator, texel_count * 8, vk::BufferUsageFlags::TRANSFER_DST)?;

        let render_pass = self.render_pass(device)?;
        let framebuffer = make_framebuffer(device, render_pass.get(), &[pass0_view.get(), pass1_view.get()], extent)?;

        let set_layout = DescriptorSetLayoutBuilder::new()
            .add_single_binding(vk::DescriptorType::INPUT_ATTACHMENT, vk::ShaderStageFlags::FRAGMENT)
            .build(device)?;
        let descriptor_pool = DescriptorPoolBuilder::new()
            .add_type(vk::DescriptorType::INPUT_ATTACHMENT, 1)
            .build(device, vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET, 1)?;
        let set = allocate_descriptor_set(device, descriptor_pool.get(), set_layout.get())?;
        let mut updates = DescriptorSetUpdateBuilder::new();
        updates.write_images(
            set,
            0,
            0,
            vk::DescriptorType::INPUT_ATTACHMENT,
            vec![vk::DescriptorImageInfo {
                sampler: vk::Sampler::null(),
                image_view: pass0_view.get(),
                image_layout: vk::ImageLayout::GENERAL,
            }],
        );
        updates.update(device);

        let push_range = vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            offset: 0,
            size: std::mem::size_of::<[u32; 4]>() as u32,
        };
        let pass0_layout = make_pipeline_layout(device, &[], &[push_range])?;
        let pass1_layout = make_pipeline_layout(device, &[set_layout.get()], &[])?;

        let vert = self.binaries.create_module(device, "vert")?;
        let frag_pass0 = self.binaries.create_module(device, "frag_pass0")?;
        let frag_pass1 = self.binaries.create_module(device, "frag_pass1")?;

        let pass0_pipeline = GraphicsPipelineBuilder::new(extent)
            .vertex_input(std::mem::size_of::<[f32; 2]>() as u32, vk::Format::R32G32_SFLOAT)
            .samples(self.def.samples)
            .subpass(0)
            .build(
                device,
                pass0_layout.get(),
                render_pass.get(),
                vert.get(),
                frag_pass0.get(),
                vk::PipelineCache::null(),
            )?;
        let pass1_pipeline = GraphicsPipelineBuilder::new(extent)
            .vertex_input(std::mem::size_of::<[f32; 2]>() as u32, vk::Format::R32G32_SFLOAT)
            .subpass(1)
            .shading_rate(FragmentShadingRateState {
                fragment_size: self.def.shading_rate,
                combiner_ops: [vk::FragmentShadingRateCombinerOpKHR::KEEP; 2],
            })
            .build(
                device,
                pass1_layout.get(),
                render_pass.get(),
                vert.get(),
                frag_pass1.get(),
                vk::PipelineCache::null(),
            )?;

        let cmd_pool = create_command_pool(device, queue.family_index, vk::CommandPoolCreateFlags::empty())?;
        let cmd = allocate_command_buffer(device, cmd_pool.get(), vk::CommandBufferLevel::PRIMARY)?;

        begin_command_buffer(device, cmd)?;
        for image in [pass0_image.image(), pass1_image.image()] {
            cmd_image_barrier(
                device,
                cmd,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                image_barrier(
                    image,
                    vk::AccessFlags::empty(),
                    vk::AccessFlags::TRANSFER_WRITE,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::GENERAL,
                    color_range(),
                ),
            );
        }
        let clear = vk::ClearColorValue {
            uint32: [UNCOVERED, 0, 0, 0],
        };
        for image in [pass0_image.image(), pass1_image.image()] {
            unsafe {
                device.cmd_clear_color_image(cmd, image, vk::ImageLayout::GENERAL, &clear, &[color_range()])
            };
        }
        for image in [pass0_image.image(), pass1_image.image()] {
            cmd_image_barrier(
                device,
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                image_barrier(
                    image,
                    vk::AccessFlags::TRANSFER_WRITE,
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                    vk::ImageLayout::GENERAL,
                    vk::ImageLayout::GENERAL,
                    color_range(),
                ),
            );
        }

        begin_render_pass(device, cmd, render_pass.get(), framebuffer.get(), extent, &[]);
        let rates = self.push_constants();
        unsafe {
            device.cmd_push_constants(
                cmd,
                pass0_layout.get(),
                vk::ShaderStageFlags::FRAGMENT,
                0,
                bytemuck::cast_slice(&rates),
            );
            device.cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer.buffer()], &[0]);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pass0_pipeline.get());
            device.cmd_draw(cmd, BASIC_TRIANGLES.len() as u32, 1, 0, 0);

            device.cmd_next_subpass(cmd, vk::SubpassContents::INLINE);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                pass1_layout.get(),
                0,
                &[set],
                &[],
            );
            device.cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer.buffer()], &[0]);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pass1_pipeline.get());
            device.cmd_draw(cmd, BASIC_TRIANGLES.len() as u32, 1, 0, 0);
            device.cmd_end_render_pass(cmd);
        }

        cmd_image_barrier(
            device,
            cmd,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::PipelineStageFlags::TRANSFER,
            image_barrier(
                pass1_image.image(),
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                vk::AccessFlags::TRANSFER_READ,
                vk::ImageLayout::GENERAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                color_range(),
            ),
        );
        cmd_copy_image_to_buffer(device, cmd, pass1_image.image(), readback.buffer(), extent);
        end_command_buffer(device, cmd)?;
        submit_commands_and_wait(device, queue.queue, cmd)?;

        readback.allocation().invalidate()?;
        Ok(readback
            .bytes()
            .chunks_exact(8)
            .map(bytemuck::pod_read_unaligned::<[u32; 2]>)
            .collect())
    }
}

impl TestInstance for PixelConsistencyInstance<'_> {
    fn iterate(&mut self) -> Result<TestStatus, CtsError> {
        let image_robustness = self
            .context
            .is_device_extension_supported(ash::ext::image_robustness::NAME);
        let mut builder = self
            .context
            .custom_device()
            .queue_family(self.context.universal_queue_family_index(), 1)
            .extension(ash::khr::fragment_shading_rate::NAME)?;
        if image_robustness {
            builder = builder.extension(ash::ext::image_robustness::NAME)?;
        }
        let custom = builder.build()?;

        let pixels = self.render(&custom)?;
        let extent = self.def.framebuffer_extent;
        for (index, rate) in self.clamped.iter().enumerate() {
            let status = verify_pixel_consistency(
                &pixels,
                extent.width,
                extent.height,
                index,
                *rate,
                image_robustness,
            );
            if status.is_pass() {
                return Ok(status);
            }
            info!("fragment size {}x{}: {}", rate.width, rate.height, status.description);
        }
        Ok(TestStatus::fail("Fail"))
    }
}

// ── Groups ──────────────────────────────────────────────────────────────────

fn samples_name(samples: vk::SampleCountFlags) -> String {
    format!("samples_{}", samples.as_raw())
}

pub fn create_tests() -> TestGroup<CaseBox> {
    let mut pixel_group: TestGroup<CaseBox> = TestGroup::new("pixel_consistency", "Pixel selection consistency");

    for (rate_w, rate_h) in RATES {
        let mut rate_group: TestGroup<CaseBox> = TestGroup::new(
            format!("rate_{}x{}", rate_w, rate_h),
            format!("{}x{} shading rate", rate_w, rate_h),
        );
        for samples in SAMPLES {
            let mut sample_group: TestGroup<CaseBox> = TestGroup::new(
                samples_name(samples),
                format!("{} raster samples", samples.as_raw()),
            );
            for (width, height) in EXTENTS {
                let mut def = CaseDef {
                    shading_rate: vk::Extent2D {
                        width: rate_w,
                        height: rate_h,
                    },
                    samples,
                    framebuffer_extent: vk::Extent2D { width, height },
                    zw_coord: false,
                };
                let name = format!("extent_{}x{}", width, height);
                sample_group.add_case(name.clone(), Box::new(PixelConsistencyCase::new(def)));

                let zw_samples = vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_4;
                if width > 150 && zw_samples.contains(samples) {
                    def.zw_coord = true;
                    sample_group.add_case(format!("{}_zw_coord", name), Box::new(PixelConsistencyCase::new(def)));
                }
            }
            rate_group.add_child(sample_group);
        }
        pixel_group.add_child(rate_group);
    }
    pixel_group
}
