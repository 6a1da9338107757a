use std::sync::Arc;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use cts_core::{CtsError, ShaderStage, SourceCollections, TestStatus};
use cts_vk::command::{
    allocate_command_buffer, begin_command_buffer, begin_render_pass, begin_secondary_command_buffer,
    buffer_barrier, cmd_buffer_barrier, cmd_image_barrier, cmd_memory_barrier, color_layers, color_range,
    create_command_pool, create_query_pool, end_command_buffer, image_barrier, memory_barrier,
    submit_commands_and_wait,
};
use cts_vk::descriptor::{
    allocate_descriptor_set, DescriptorPoolBuilder, DescriptorSetLayoutBuilder,
    DescriptorSetUpdateBuilder,
};
use cts_vk::image::{image_2d_info, make_color_view, make_framebuffer, make_image_view, make_render_pass};
use cts_vk::pipeline::{make_compute_pipeline, make_pipeline_layout, GraphicsPipelineBuilder};
use cts_vk::{
    BinaryCollection, BufferWithMemory, Context, ImageWithMemory, MemoryRequirement, TestCase,
    TestInstance, Unique, VkCheck,
};
use tracing::debug;

use super::{
    check_timestamp_bits, checked_timestamp_mask, require_host_query_reset, require_stage_features,
    require_timestamps,
    verify_consistent_results, verify_host_reset, verify_reset_before_copy, verify_timestamps,
    TimestampParams, TimestampValue, TransferMethod, ENTRY_COUNT,
};

const COLOR_VERT: &str = "#version 310 es
layout(location = 0) in vec4 position;
layout(location = 1) in vec4 color;
layout(location = 0) out highp vec4 vtxColor;
void main (void)
{
  gl_Position = position;
  vtxColor = color;
}
";

const COLOR_FRAG: &str = "#version 310 es
layout(location = 0) in highp vec4 vtxColor;
layout(location = 0) out highp vec4 fragColor;
void main (void)
{
  fragColor = vtxColor;
}
";

const GEOMETRY_PASSTHROUGH: &str = "#version 310 es
#extension GL_EXT_geometry_shader : enable
layout(triangles) in;
layout(triangle_strip, max_vertices = 3) out;
layout(location = 0) in highp vec4 in_vtxColor[];
layout(location = 0) out highp vec4 vtxColor;
void main (void)
{
  for(int ndx=0; ndx<3; ndx++)
  {
    gl_Position = gl_in[ndx].gl_Position;
    vtxColor    = in_vtxColor[ndx];
    EmitVertex();
  }
  EndPrimitive();
}
";

const BASIC_TESS_CONTROL: &str = "#version 310 es
#extension GL_EXT_tessellation_shader : enable
layout(vertices = 3) out;
layout(location = 0) in highp vec4 color[];
layout(location = 0) out highp vec4 vtxColor[];
void main()
{
  gl_TessLevelOuter[0] = 4.0;
  gl_TessLevelOuter[1] = 4.0;
  gl_TessLevelOuter[2] = 4.0;
  gl_TessLevelInner[0] = 4.0;
  gl_out[gl_InvocationID].gl_Position = gl_in[gl_InvocationID].gl_Position;
  vtxColor[gl_InvocationID] = color[gl_InvocationID];
}
";

const BASIC_TESS_EVALUATION: &str = "#version 310 es
#extension GL_EXT_tessellation_shader : enable
layout(triangles, fractional_even_spacing, ccw) in;
layout(location = 0) in highp vec4 colors[];
layout(location = 0) out highp vec4 vtxColor;
void main()
{
  float u = gl_TessCoord.x;
  float v = gl_TessCoord.y;
  float w = gl_TessCoord.z;
  vec4 pos = vec4(0);
  vec4 color = vec4(0);
  pos.xyz += u * gl_in[0].gl_Position.xyz;
  color.xyz += u * colors[0].xyz;
  pos.xyz += v * gl_in[1].gl_Position.xyz;
  color.xyz += v * colors[1].xyz;
  pos.xyz += w * gl_in[2].gl_Position.xyz;
  color.xyz += w * colors[2].xyz;
  pos.w = 1.0;
  color.w = 1.0;
  gl_Position = pos;
  vtxColor = color;
}
";

const BASIC_COMPUTE: &str = "#version 310 es
layout(local_size_x = 128) in;
layout(std430) buffer;
layout(binding = 0) readonly buffer Input0
{
  vec4 elements[];
} input_data0;
layout(binding = 1) writeonly buffer Output
{
  vec4 elements[];
} output_data;
void main()
{
  uint ident = gl_GlobalInvocationID.x;
  output_data.elements[ident] = input_data0.elements[ident] * input_data0.elements[ident];
}
";

/// Work recorded around the timestamp writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    None,
    Graphics,
    /// Indirect draw through every tessellation and geometry stage the
    /// device supports.
    AdvancedGraphics,
    Compute,
    Transfer(TransferMethod),
}

fn write_timestamps(device: &ash::Device, cmd: vk::CommandBuffer, pool: vk::QueryPool, stages: &[vk::PipelineStageFlags]) {
    for (entry, stage) in stages.iter().enumerate() {
        unsafe { device.cmd_write_timestamp(cmd, *stage, pool, entry as u32) };
    }
}

fn reset_in_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer, pool: vk::QueryPool, params: &TimestampParams) {
    if !params.host_query_reset {
        unsafe { device.cmd_reset_query_pool(cmd, pool, 0, ENTRY_COUNT) };
    }
}

// ── Graphics work ───────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 4],
    pub color: [f32; 4],
}

/// Four quads at increasing depth that overlap in the middle of the
/// target, two triangles each.
pub fn overlapping_quads() -> Vec<Vertex> {
    let quads = [
        ([-1.0, -1.0, 0.5, 0.5], 0.0, [1.0, 0.0, 0.0, 1.0]),
        ([-0.5, -1.0, 1.0, 0.5], 0.25, [0.0, 1.0, 0.0, 1.0]),
        ([-1.0, -0.5, 0.5, 1.0], 0.5, [0.0, 0.0, 1.0, 1.0]),
        ([-0.5, -0.5, 1.0, 1.0], 0.75, [1.0, 1.0, 0.0, 1.0]),
    ];
    let mut vertices = Vec::with_capacity(quads.len() * 6);
    for ([x0, y0, x1, y1], z, color) in quads {
        let corner = |x: f32, y: f32| Vertex {
            position: [x, y, z, 1.0],
            color,
        };
        vertices.extend([
            corner(x0, y0),
            corner(x1, y0),
            corner(x0, y1),
            corner(x1, y0),
            corner(x1, y1),
            corner(x0, y1),
        ]);
    }
    vertices
}

const RENDER_SIZE: vk::Extent2D = vk::Extent2D {
    width: 32,
    height: 32,
};
const COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
const DEPTH_FORMAT: vk::Format = vk::Format::D16_UNORM;

fn depth_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::DEPTH,
        ..color_range()
    }
}

/// Indirect draws issued by the advanced workload: the second overlaps the
/// first by one vertex.
const INDIRECT_DRAWS: [vk::DrawIndirectCommand; 2] = [
    vk::DrawIndirectCommand {
        vertex_count: 12,
        instance_count: 1,
        first_vertex: 0,
        first_instance: 0,
    },
    vk::DrawIndirectCommand {
        vertex_count: 12,
        instance_count: 1,
        first_vertex: 11,
        first_instance: 0,
    },
];

struct IndirectDraw {
    buffer: BufferWithMemory,
    draw_count: u32,
}

struct GraphicsWork {
    vertex_count: u32,
    indirect: Option<IndirectDraw>,
    pipeline: Unique<vk::Pipeline>,
    _layout: Unique<vk::PipelineLayout>,
    framebuffer: Unique<vk::Framebuffer>,
    render_pass: Unique<vk::RenderPass>,
    _views: [Unique<vk::ImageView>; 2],
    _images: [ImageWithMemory; 2],
    vertex_buffer: BufferWithMemory,
}

impl GraphicsWork {
    fn new(context: &Context, binaries: &BinaryCollection, advanced: bool) -> Result<Self, CtsError> {
        let device = context.device();
        let allocator = context.allocator();
        let core = &context.features().core;

        let vertices = overlapping_quads();
        let mut vertex_buffer =
            BufferWithMemory::host_visible(allocator, 1024, vk::BufferUsageFlags::VERTEX_BUFFER)?;
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        vertex_buffer.bytes_mut()[..bytes.len()].copy_from_slice(bytes);
        vertex_buffer.allocation().flush()?;

        let render_pass = make_render_pass(device, COLOR_FORMAT, Some(DEPTH_FORMAT))?;
        let color = ImageWithMemory::new(
            allocator,
            &image_2d_info(
                COLOR_FORMAT,
                RENDER_SIZE,
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
                vk::SampleCountFlags::TYPE_1,
            ),
            MemoryRequirement::ANY,
        )?;
        let depth = ImageWithMemory::new(
            allocator,
            &image_2d_info(
                DEPTH_FORMAT,
                RENDER_SIZE,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                vk::SampleCountFlags::TYPE_1,
            ),
            MemoryRequirement::ANY,
        )?;
        let color_view = make_color_view(device, color.image(), COLOR_FORMAT)?;
        let depth_view = make_image_view(device, depth.image(), DEPTH_FORMAT, depth_range())?;
        let framebuffer = make_framebuffer(
            device,
            render_pass.get(),
            &[color_view.get(), depth_view.get()],
            RENDER_SIZE,
        )?;

        let layout = make_pipeline_layout(device, &[], &[])?;
        let vs = binaries.create_module(device, "color_vert")?;
        let fs = binaries.create_module(device, "color_frag")?;
        let stride = std::mem::size_of::<Vertex>() as u32;
        let mut builder = GraphicsPipelineBuilder::new(RENDER_SIZE)
            .vertex_input(stride, vk::Format::R32G32B32A32_SFLOAT)
            .vertex_attribute(1, vk::Format::R32G32B32A32_SFLOAT, 16)
            .depth_test(true);

        let mut extra_modules = Vec::new();
        let mut indirect = None;
        if advanced {
            if core.geometry_shader == vk::TRUE {
                let gs = binaries.create_module(device, "dummy_geo")?;
                builder = builder.geometry(gs.get());
                extra_modules.push(gs);
            }
            if core.tessellation_shader == vk::TRUE {
                let tcs = binaries.create_module(device, "basic_tcs")?;
                let tes = binaries.create_module(device, "basic_tes")?;
                builder = builder.tessellation(tcs.get(), tes.get(), 3);
                extra_modules.push(tcs);
                extra_modules.push(tes);
            }

            let draw_count = if core.multi_draw_indirect == vk::TRUE { 2 } else { 1 };
            let mut buffer =
                BufferWithMemory::host_visible(allocator, 32, vk::BufferUsageFlags::INDIRECT_BUFFER)?;
            let words: Vec<u32> = INDIRECT_DRAWS[..draw_count as usize]
                .iter()
                .flat_map(|c| [c.vertex_count, c.instance_count, c.first_vertex, c.first_instance])
                .collect();
            let commands: &[u8] = bytemuck::cast_slice(&words);
            buffer.bytes_mut()[..commands.len()].copy_from_slice(commands);
            buffer.allocation().flush()?;
            indirect = Some(IndirectDraw { buffer, draw_count });
        }

        let pipeline = builder
            .build(
                device,
                layout.get(),
                render_pass.get(),
                vs.get(),
                fs.get(),
                vk::PipelineCache::null(),
            )?;

        Ok(Self {
            vertex_count: vertices.len() as u32,
            indirect,
            pipeline,
            _layout: layout,
            framebuffer,
            render_pass,
            _views: [color_view, depth_view],
            _images: [color, depth],
            vertex_buffer,
        })
    }

    fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer, pool: vk::QueryPool, params: &TimestampParams) {
        reset_in_command_buffer(device, cmd, pool, params);
        let clear = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 1.0],
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        begin_render_pass(device, cmd, self.render_pass.get(), self.framebuffer.get(), RENDER_SIZE, &clear);
        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.get());
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer()], &[0]);
            match &self.indirect {
                Some(draw) => device.cmd_draw_indirect(
                    cmd,
                    draw.buffer.buffer(),
                    0,
                    draw.draw_count,
                    std::mem::size_of::<vk::DrawIndirectCommand>() as u32,
                ),
                None => device.cmd_draw(cmd, self.vertex_count, 1, 0, 0),
            }
        }
        if params.in_render_pass {
            write_timestamps(device, cmd, pool, &params.stages);
        }
        unsafe { device.cmd_end_render_pass(cmd) };
        if !params.in_render_pass {
            write_timestamps(device, cmd, pool, &params.stages);
        }
    }
}

// ── Compute work ────────────────────────────────────────────────────────────

const COMPUTE_ELEMENTS: u32 = 128 * 128;

struct ComputeWork {
    pipeline: Unique<vk::Pipeline>,
    layout: Unique<vk::PipelineLayout>,
    set: vk::DescriptorSet,
    _pool: Unique<vk::DescriptorPool>,
    _set_layout: Unique<vk::DescriptorSetLayout>,
    _buffers: [BufferWithMemory; 2],
}

impl ComputeWork {
    fn new(context: &Context, binaries: &BinaryCollection) -> Result<Self, CtsError> {
        let device = context.device();
        let size = 16 * COMPUTE_ELEMENTS as u64;

        let mut input =
            BufferWithMemory::host_visible(context.allocator(), size, vk::BufferUsageFlags::STORAGE_BUFFER)?;
        let values: Vec<f32> = (0..COMPUTE_ELEMENTS)
            .flat_map(|ndx| (1..=4u32).map(move |component| (ndx * component) as f32))
            .collect();
        input.bytes_mut().copy_from_slice(bytemuck::cast_slice(&values));
        input.allocation().flush()?;
        let output =
            BufferWithMemory::host_visible(context.allocator(), size, vk::BufferUsageFlags::STORAGE_BUFFER)?;

        let set_layout = DescriptorSetLayoutBuilder::new()
            .add_single_binding(vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::COMPUTE)
            .add_single_binding(vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::COMPUTE)
            .build(device)?;
        let pool = DescriptorPoolBuilder::new()
            .add_type(vk::DescriptorType::STORAGE_BUFFER, 2)
            .build(device, vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET, 1)?;
        let set = allocate_descriptor_set(device, pool.get(), set_layout.get())?;

        let mut updates = DescriptorSetUpdateBuilder::new();
        for (binding, buffer) in [&input, &output].into_iter().enumerate() {
            updates.write_buffers(
                set,
                binding as u32,
                0,
                vk::DescriptorType::STORAGE_BUFFER,
                vec![vk::DescriptorBufferInfo {
                    buffer: buffer.buffer(),
                    offset: 0,
                    range: size,
                }],
            );
        }
        updates.update(device);

        let layout = make_pipeline_layout(device, &[set_layout.get()], &[])?;
        let module = binaries.create_module(device, "basic_compute")?;
        let pipeline = make_compute_pipeline(device, layout.get(), module.get(), vk::PipelineCache::null())?;

        Ok(Self {
            pipeline,
            layout,
            set,
            _pool: pool,
            _set_layout: set_layout,
            _buffers: [input, output],
        })
    }

    fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer, pool: vk::QueryPool, params: &TimestampParams) {
        reset_in_command_buffer(device, cmd, pool, params);
        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, self.pipeline.get());
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                self.layout.get(),
                0,
                &[self.set],
                &[],
            );
            device.cmd_dispatch(cmd, 128, 1, 1);
        }
        write_timestamps(device, cmd, pool, &params.stages);
    }
}

// ── Transfer work ───────────────────────────────────────────────────────────

const TRANSFER_IMAGE_SIZE: vk::Extent2D = vk::Extent2D {
    width: 4,
    height: 4,
};

struct TransferWork {
    method: TransferMethod,
    buf_size: u64,
    src_buffer: BufferWithMemory,
    dst_buffer: BufferWithMemory,
    src_image: ImageWithMemory,
    dst_image: ImageWithMemory,
    depth_image: ImageWithMemory,
    ms_image: ImageWithMemory,
}

impl TransferWork {
    fn new(context: &Context, method: TransferMethod, params: &TimestampParams) -> Result<Self, CtsError> {
        let allocator = context.allocator();
        let buf_size = if params.with_availability() { 512 } else { 256 };

        let mut src_buffer = BufferWithMemory::host_visible(
            allocator,
            buf_size,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        src_buffer.bytes_mut().fill(0xff);
        src_buffer.allocation().flush()?;
        let dst_buffer = BufferWithMemory::host_visible(
            allocator,
            buf_size,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        )?;

        let image = |format, usage, samples| {
            ImageWithMemory::new(
                allocator,
                &image_2d_info(format, TRANSFER_IMAGE_SIZE, usage, samples),
                MemoryRequirement::ANY,
            )
        };
        use vk::ImageUsageFlags as U;
        let one = vk::SampleCountFlags::TYPE_1;
        Ok(Self {
            method,
            buf_size,
            src_buffer,
            dst_buffer,
            src_image: image(COLOR_FORMAT, U::TRANSFER_DST | U::TRANSFER_SRC, one)?,
            dst_image: image(COLOR_FORMAT, U::COLOR_ATTACHMENT | U::TRANSFER_DST, one)?,
            depth_image: image(DEPTH_FORMAT, U::TRANSFER_DST, one)?,
            ms_image: image(
                COLOR_FORMAT,
                U::COLOR_ATTACHMENT | U::TRANSFER_SRC | U::TRANSFER_DST,
                vk::SampleCountFlags::TYPE_4,
            )?,
        })
    }

    fn to_general(device: &ash::Device, cmd: vk::CommandBuffer, image: vk::Image, range: vk::ImageSubresourceRange) {
        cmd_image_barrier(
            device,
            cmd,
            vk::PipelineStageFlags::HOST,
            vk::PipelineStageFlags::TRANSFER,
            image_barrier(
                image,
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::GENERAL,
                range,
            ),
        );
    }

    fn record(&self, device: &ash::Device, cmd: vk::CommandBuffer, pool: vk::QueryPool, params: &TimestampParams) {
        const GENERAL: vk::ImageLayout = vk::ImageLayout::GENERAL;
        let white = vk::ClearColorValue { float32: [1.0; 4] };
        let black = vk::ClearColorValue { float32: [0.0; 4] };
        let transfer_to_transfer = memory_barrier(
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::TRANSFER_READ | vk::AccessFlags::TRANSFER_WRITE,
        );
        let extent = vk::Extent3D {
            width: TRANSFER_IMAGE_SIZE.width,
            height: TRANSFER_IMAGE_SIZE.height,
            depth: 1,
        };
        let far_corner = vk::Offset3D {
            x: TRANSFER_IMAGE_SIZE.width as i32,
            y: TRANSFER_IMAGE_SIZE.height as i32,
            z: 1,
        };
        let buffer_image_copy = vk::BufferImageCopy::default()
            .buffer_row_length(TRANSFER_IMAGE_SIZE.width)
            .buffer_image_height(TRANSFER_IMAGE_SIZE.height)
            .image_subresource(color_layers())
            .image_extent(extent);

        unsafe { device.cmd_fill_buffer(cmd, self.dst_buffer.buffer(), 0, self.buf_size, 0) };
        Self::to_general(device, cmd, self.src_image.image(), color_range());
        Self::to_general(device, cmd, self.dst_image.image(), color_range());
        unsafe {
            device.cmd_clear_color_image(cmd, self.src_image.image(), GENERAL, &white, &[color_range()]);
            device.cmd_clear_color_image(cmd, self.dst_image.image(), GENERAL, &black, &[color_range()]);
        }
        cmd_memory_barrier(
            device,
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::TRANSFER,
            transfer_to_transfer,
        );
        reset_in_command_buffer(device, cmd, pool, params);

        match self.method {
            TransferMethod::CopyBuffer => unsafe {
                let region = vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size: self.buf_size,
                };
                device.cmd_copy_buffer(cmd, self.src_buffer.buffer(), self.dst_buffer.buffer(), &[region]);
            },
            TransferMethod::CopyImage => unsafe {
                let region = vk::ImageCopy::default()
                    .src_subresource(color_layers())
                    .dst_subresource(color_layers())
                    .extent(extent);
                device.cmd_copy_image(
                    cmd,
                    self.src_image.image(),
                    GENERAL,
                    self.dst_image.image(),
                    GENERAL,
                    &[region],
                );
            },
            TransferMethod::CopyBufferToImage => unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    self.src_buffer.buffer(),
                    self.dst_image.image(),
                    GENERAL,
                    &[buffer_image_copy],
                );
            },
            TransferMethod::CopyImageToBuffer => unsafe {
                device.cmd_copy_image_to_buffer(
                    cmd,
                    self.src_image.image(),
                    GENERAL,
                    self.dst_buffer.buffer(),
                    &[buffer_image_copy],
                );
            },
            TransferMethod::BlitImage => unsafe {
                let origin = vk::Offset3D::default();
                let region = vk::ImageBlit::default()
                    .src_subresource(color_layers())
                    .src_offsets([origin, far_corner])
                    .dst_subresource(color_layers())
                    .dst_offsets([origin, far_corner]);
                device.cmd_blit_image(
                    cmd,
                    self.src_image.image(),
                    GENERAL,
                    self.dst_image.image(),
                    GENERAL,
                    &[region],
                    vk::Filter::NEAREST,
                );
            },
            TransferMethod::ClearColorImage => unsafe {
                device.cmd_clear_color_image(cmd, self.dst_image.image(), GENERAL, &white, &[color_range()]);
            },
            TransferMethod::ClearDepthStencilImage => {
                Self::to_general(device, cmd, self.depth_image.image(), depth_range());
                let value = vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                };
                unsafe {
                    device.cmd_clear_depth_stencil_image(
                        cmd,
                        self.depth_image.image(),
                        GENERAL,
                        &value,
                        &[depth_range()],
                    )
                };
            }
            TransferMethod::FillBuffer => unsafe {
                device.cmd_fill_buffer(cmd, self.dst_buffer.buffer(), 0, self.buf_size, 0);
            },
            TransferMethod::UpdateBuffer => {
                let data: [u32; 3] = [0xdead_beef, 0xabcd_ef00, 0x1234_5678];
                unsafe {
                    device.cmd_update_buffer(cmd, self.dst_buffer.buffer(), 0x10, bytemuck::cast_slice(&data))
                };
            }
            TransferMethod::CopyQueryPoolResults => {
                unsafe {
                    device.cmd_write_timestamp(cmd, vk::PipelineStageFlags::TOP_OF_PIPE, pool, 0);
                    device.cmd_copy_query_pool_results(
                        cmd,
                        pool,
                        0,
                        1,
                        self.dst_buffer.buffer(),
                        0,
                        8,
                        vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
                    );
                }
                cmd_buffer_barrier(
                    device,
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::HOST,
                    buffer_barrier(self.dst_buffer.buffer(), vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::HOST_READ),
                );
                unsafe { device.cmd_reset_query_pool(cmd, pool, 0, 1) };
            }
            TransferMethod::ResolveImage => {
                Self::to_general(device, cmd, self.ms_image.image(), color_range());
                unsafe {
                    device.cmd_clear_color_image(cmd, self.ms_image.image(), GENERAL, &white, &[color_range()])
                };
                cmd_memory_barrier(
                    device,
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::TRANSFER,
                    transfer_to_transfer,
                );
                let region = vk::ImageResolve::default()
                    .src_subresource(color_layers())
                    .dst_subresource(color_layers())
                    .extent(extent);
                unsafe {
                    device.cmd_resolve_image(
                        cmd,
                        self.ms_image.image(),
                        GENERAL,
                        self.dst_image.image(),
                        GENERAL,
                        &[region],
                    )
                };
            }
        }

        write_timestamps(device, cmd, pool, &params.stages);
    }
}

// ── Timestamp case ──────────────────────────────────────────────────────────

enum Work {
    None,
    Graphics(GraphicsWork),
    Compute(ComputeWork),
    Transfer(TransferWork),
}

pub struct TimestampCase {
    params: TimestampParams,
    workload: Workload,
}

impl TimestampCase {
    pub fn new(params: TimestampParams, workload: Workload) -> Self {
        Self { params, workload }
    }
}

impl TestCase for TimestampCase {
    fn check_support(&self, context: &Context) -> Result<(), CtsError> {
        require_timestamps(context)?;
        if self.params.host_query_reset {
            require_host_query_reset(context)?;
        }
        if self.workload == Workload::AdvancedGraphics {
            require_stage_features(&context.features().core, &self.params.stages)?;
        }
        Ok(())
    }

    fn init_programs(&self, programs: &mut SourceCollections) {
        match self.workload {
            Workload::Graphics => {
                programs.add("color_vert", ShaderStage::Vertex, COLOR_VERT);
                programs.add("color_frag", ShaderStage::Fragment, COLOR_FRAG);
            }
            Workload::AdvancedGraphics => {
                programs.add("color_vert", ShaderStage::Vertex, COLOR_VERT);
                programs.add("color_frag", ShaderStage::Fragment, COLOR_FRAG);
                programs.add("dummy_geo", ShaderStage::Geometry, GEOMETRY_PASSTHROUGH);
                programs.add("basic_tcs", ShaderStage::TessControl, BASIC_TESS_CONTROL);
                programs.add("basic_tes", ShaderStage::TessEvaluation, BASIC_TESS_EVALUATION);
            }
            Workload::Compute => programs.add("basic_compute", ShaderStage::Compute, BASIC_COMPUTE),
            Workload::None | Workload::Transfer(_) => {}
        }
    }

    fn create_instance<'a>(
        &self,
        context: &'a Context,
        binaries: &'a BinaryCollection,
    ) -> Result<Box<dyn TestInstance + 'a>, CtsError> {
        let mask = checked_timestamp_mask(context)?;
        Ok(Box::new(TimestampInstance {
            params: self.params.clone(),
            workload: self.workload,
            mask,
            context,
            binaries,
        }))
    }
}

struct TimestampInstance<'a> {
    params: TimestampParams,
    workload: Workload,
    mask: u64,
    context: &'a Context,
    binaries: &'a BinaryCollection,
}

impl TimestampInstance<'_> {
    /// Read back the stage timestamps, masked to the valid bits.
    fn read_timestamps(&self, device: &ash::Device, pool: vk::QueryPool) -> Result<Vec<TimestampValue>, CtsError> {
        let count = self.params.stages.len();
        let flags = self.params.flags;
        if self.params.with_availability() {
            let mut raw = vec![[0u64; 2]; count];
            unsafe { device.get_query_pool_results(pool, 0, &mut raw, flags) }
                .vk_check("vkGetQueryPoolResults")?;
            Ok(raw
                .iter()
                .map(|[value, availability]| TimestampValue {
                    value: value & self.mask,
                    availability: Some(*availability),
                })
                .collect())
        } else {
            let mut raw = vec![0u64; count];
            unsafe { device.get_query_pool_results(pool, 0, &mut raw, flags) }
                .vk_check("vkGetQueryPoolResults")?;
            Ok(raw
                .iter()
                .map(|value| TimestampValue {
                    value: value & self.mask,
                    availability: None,
                })
                .collect())
        }
    }

    fn check_host_reset(
        &self,
        device: &ash::Device,
        pool: vk::QueryPool,
        values: &[TimestampValue],
    ) -> Option<TestStatus> {
        let count = values.len() as u32;
        let original: Vec<u64> = values.iter().map(|v| v.value).collect();
        let mut after: Vec<[u64; 2]> = original.iter().map(|v| [*v, 0]).collect();

        unsafe { device.reset_query_pool(pool, 0, count) };
        let result = unsafe {
            device.get_query_pool_results(
                pool,
                0,
                &mut after,
                vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WITH_AVAILABILITY,
            )
        };
        verify_host_reset(
            matches!(result, Err(vk::Result::NOT_READY)),
            &original,
            &after,
            self.mask,
        )
    }
}

impl TestInstance for TimestampInstance<'_> {
    fn iterate(&mut self) -> Result<TestStatus, CtsError> {
        let context = self.context;
        let device = context.device();
        let params = &self.params;

        let work = match self.workload {
            Workload::None => Work::None,
            Workload::Graphics => Work::Graphics(GraphicsWork::new(context, self.binaries, false)?),
            Workload::AdvancedGraphics => Work::Graphics(GraphicsWork::new(context, self.binaries, true)?),
            Workload::Compute => Work::Compute(ComputeWork::new(context, self.binaries)?),
            Workload::Transfer(method) => Work::Transfer(TransferWork::new(context, method, params)?),
        };

        let query_pool = create_query_pool(device, vk::QueryType::TIMESTAMP, ENTRY_COUNT)?;
        let cmd_pool = create_command_pool(
            device,
            context.universal_queue_family_index(),
            vk::CommandPoolCreateFlags::TRANSIENT,
        )?;
        let cmd = allocate_command_buffer(device, cmd_pool.get(), vk::CommandBufferLevel::PRIMARY)?;

        begin_command_buffer(device, cmd)?;
        match &work {
            Work::None => {
                reset_in_command_buffer(device, cmd, query_pool.get(), params);
                write_timestamps(device, cmd, query_pool.get(), &params.stages);
            }
            Work::Graphics(g) => g.record(device, cmd, query_pool.get(), params),
            Work::Compute(c) => c.record(device, cmd, query_pool.get(), params),
            Work::Transfer(t) => t.record(device, cmd, query_pool.get(), params),
        }
        end_command_buffer(device, cmd)?;

        if params.host_query_reset {
            unsafe { device.reset_query_pool(query_pool.get(), 0, ENTRY_COUNT) };
        }
        submit_commands_and_wait(device, context.universal_queue(), cmd)?;

        let values = self.read_timestamps(device, query_pool.get())?;
        debug!("timestamps: {:?}", values);

        if params.host_query_reset {
            if let Some(failure) = self.check_host_reset(device, query_pool.get(), &values) {
                return Ok(failure);
            }
        }
        Ok(verify_timestamps(&values))
    }
}

// ── Two command buffers ─────────────────────────────────────────────────────

/// The timestamp is written in one command buffer and copied out in
/// another; only successful execution is checked.
pub struct TwoCmdBuffersCase {
    level: vk::CommandBufferLevel,
    host_query_reset: bool,
    flags: vk::QueryResultFlags,
}

impl TwoCmdBuffersCase {
    pub fn new(level: vk::CommandBufferLevel, host_query_reset: bool, flags: vk::QueryResultFlags) -> Self {
        Self {
            level,
            host_query_reset,
            flags,
        }
    }
}

impl TestCase for TwoCmdBuffersCase {
    fn check_support(&self, context: &Context) -> Result<(), CtsError> {
        require_timestamps(context)?;
        if self.host_query_reset {
            require_host_query_reset(context)?;
        }
        Ok(())
    }

    fn create_instance<'a>(
        &self,
        context: &'a Context,
        _binaries: &'a BinaryCollection,
    ) -> Result<Box<dyn TestInstance + 'a>, CtsError> {
        checked_timestamp_mask(context)?;
        Ok(Box::new(TwoCmdBuffersInstance {
            level: self.level,
            host_query_reset: self.host_query_reset,
            flags: self.flags,
            context,
        }))
    }
}

struct TwoCmdBuffersInstance<'a> {
    level: vk::CommandBufferLevel,
    host_query_reset: bool,
    flags: vk::QueryResultFlags,
    context: &'a Context,
}

impl TwoCmdBuffersInstance<'_> {
    fn record_copy(&self, device: &ash::Device, cmd: vk::CommandBuffer, pool: vk::QueryPool, dst: vk::Buffer) {
        unsafe { device.cmd_copy_query_pool_results(cmd, pool, 0, 1, dst, 0, 0, self.flags) };
        cmd_buffer_barrier(
            device,
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::HOST,
            buffer_barrier(dst, vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::HOST_READ),
        );
    }
}

impl TestInstance for TwoCmdBuffersInstance<'_> {
    fn iterate(&mut self) -> Result<TestStatus, CtsError> {
        let device: &Arc<ash::Device> = self.context.device();
        let queue = self.context.universal_queue();

        let query_pool = create_query_pool(device, vk::QueryType::TIMESTAMP, ENTRY_COUNT)?;
        let cmd_pool = create_command_pool(
            device,
            self.context.universal_queue_family_index(),
            vk::CommandPoolCreateFlags::TRANSIENT,
        )?;
        let first = allocate_command_buffer(device, cmd_pool.get(), vk::CommandBufferLevel::PRIMARY)?;
        let second = allocate_command_buffer(device, cmd_pool.get(), self.level)?;
        let dst = BufferWithMemory::host_visible(
            self.context.allocator(),
            1024,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        )?;
        let pool = query_pool.get();

        let submitted = if self.level == vk::CommandBufferLevel::PRIMARY {
            begin_command_buffer(device, first)?;
            if !self.host_query_reset {
                unsafe { device.cmd_reset_query_pool(first, pool, 0, ENTRY_COUNT) };
            }
            unsafe { device.cmd_write_timestamp(first, vk::PipelineStageFlags::ALL_GRAPHICS, pool, 0) };
            end_command_buffer(device, first)?;

            begin_command_buffer(device, second)?;
            self.record_copy(device, second, pool, dst.buffer());
            end_command_buffer(device, second)?;
            vec![first, second]
        } else {
            begin_secondary_command_buffer(device, second)?;
            unsafe {
                device.cmd_reset_query_pool(second, pool, 0, ENTRY_COUNT);
                device.cmd_write_timestamp(second, vk::PipelineStageFlags::ALL_GRAPHICS, pool, 0);
            }
            end_command_buffer(device, second)?;

            begin_command_buffer(device, first)?;
            unsafe { device.cmd_execute_commands(first, &[second]) };
            self.record_copy(device, first, pool, dst.buffer());
            end_command_buffer(device, first)?;
            vec![first]
        };

        if self.host_query_reset {
            unsafe { device.reset_query_pool(pool, 0, ENTRY_COUNT) };
        }
        let submit = vk::SubmitInfo::default().command_buffers(&submitted);
        unsafe { device.queue_submit(queue, &[submit], vk::Fence::null()) }.vk_check("vkQueueSubmit")?;
        unsafe { device.queue_wait_idle(queue) }.vk_check("vkQueueWaitIdle")?;

        Ok(TestStatus::pass("Pass"))
    }
}

// ── Reset before copy ───────────────────────────────────────────────────────

fn single_query_setup(
    context: &Context,
) -> Result<(Unique<vk::QueryPool>, Unique<vk::CommandPool>, vk::CommandBuffer), CtsError> {
    let device = context.device();
    let query_pool = create_query_pool(device, vk::QueryType::TIMESTAMP, 1)?;
    let cmd_pool = create_command_pool(
        device,
        context.universal_queue_family_index(),
        vk::CommandPoolCreateFlags::TRANSIENT,
    )?;
    let cmd = allocate_command_buffer(device, cmd_pool.get(), vk::CommandBufferLevel::PRIMARY)?;
    Ok((query_pool, cmd_pool, cmd))
}

/// Copying a query that was reset after being written must report it as
/// unavailable.
pub struct ResetBeforeCopyCase;

impl TestCase for ResetBeforeCopyCase {
    fn check_support(&self, context: &Context) -> Result<(), CtsError> {
        require_timestamps(context)
    }

    fn create_instance<'a>(
        &self,
        context: &'a Context,
        _binaries: &'a BinaryCollection,
    ) -> Result<Box<dyn TestInstance + 'a>, CtsError> {
        checked_timestamp_mask(context)?;
        Ok(Box::new(ResetBeforeCopyInstance { context }))
    }
}

struct ResetBeforeCopyInstance<'a> {
    context: &'a Context,
}

impl TestInstance for ResetBeforeCopyInstance<'_> {
    fn iterate(&mut self) -> Result<TestStatus, CtsError> {
        let device = self.context.device();
        let (query_pool, _cmd_pool, cmd) = single_query_setup(self.context)?;
        let pool = query_pool.get();
        let result = BufferWithMemory::host_visible(self.context.allocator(), 16, vk::BufferUsageFlags::TRANSFER_DST)?;

        begin_command_buffer(device, cmd)?;
        unsafe {
            device.cmd_reset_query_pool(cmd, pool, 0, 1);
            device.cmd_write_timestamp(cmd, vk::PipelineStageFlags::TOP_OF_PIPE, pool, 0);
            device.cmd_reset_query_pool(cmd, pool, 0, 1);
            device.cmd_copy_query_pool_results(
                cmd,
                pool,
                0,
                1,
                result.buffer(),
                0,
                16,
                vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WITH_AVAILABILITY,
            );
        }
        cmd_buffer_barrier(
            device,
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::HOST,
            buffer_barrier(result.buffer(), vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::HOST_READ),
        );
        end_command_buffer(device, cmd)?;
        submit_commands_and_wait(device, self.context.universal_queue(), cmd)?;

        result.allocation().invalidate()?;
        let availability: u64 = bytemuck::pod_read_unaligned(&result.bytes()[8..16]);
        Ok(verify_reset_before_copy(availability))
    }
}

// ── 32/64-bit consistency ───────────────────────────────────────────────────

/// The same timestamp read as 32 and 64 bits, both through
/// `vkCmdCopyQueryPoolResults` and `vkGetQueryPoolResults`.
pub struct ConsistentResultsCase;

impl TestCase for ConsistentResultsCase {
    fn check_support(&self, context: &Context) -> Result<(), CtsError> {
        require_timestamps(context)
    }

    fn create_instance<'a>(
        &self,
        context: &'a Context,
        _binaries: &'a BinaryCollection,
    ) -> Result<Box<dyn TestInstance + 'a>, CtsError> {
        let mask = checked_timestamp_mask(context)?;
        Ok(Box::new(ConsistentResultsInstance { context, mask }))
    }
}

struct ConsistentResultsInstance<'a> {
    context: &'a Context,
    mask: u64,
}

impl TestInstance for ConsistentResultsInstance<'_> {
    fn iterate(&mut self) -> Result<TestStatus, CtsError> {
        let device = self.context.device();
        let allocator = self.context.allocator();
        let (query_pool, _cmd_pool, cmd) = single_query_setup(self.context)?;
        let pool = query_pool.get();
        let buffer32 = BufferWithMemory::host_visible(allocator, 4, vk::BufferUsageFlags::TRANSFER_DST)?;
        let buffer64 = BufferWithMemory::host_visible(allocator, 8, vk::BufferUsageFlags::TRANSFER_DST)?;

        begin_command_buffer(device, cmd)?;
        unsafe {
            device.cmd_reset_query_pool(cmd, pool, 0, 1);
            device.cmd_write_timestamp(cmd, vk::PipelineStageFlags::TOP_OF_PIPE, pool, 0);
        }
        for (buffer, stride, flags) in [
            (&buffer32, 4, vk::QueryResultFlags::WAIT),
            (&buffer64, 8, vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT),
        ] {
            unsafe { device.cmd_copy_query_pool_results(cmd, pool, 0, 1, buffer.buffer(), 0, stride, flags) };
            cmd_buffer_barrier(
                device,
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::HOST,
                buffer_barrier(buffer.buffer(), vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::HOST_READ),
            );
        }
        end_command_buffer(device, cmd)?;
        submit_commands_and_wait(device, self.context.universal_queue(), cmd)?;

        buffer32.allocation().invalidate()?;
        buffer64.allocation().invalidate()?;
        let b32: u32 = bytemuck::pod_read_unaligned(&buffer32.bytes()[..4]);
        let b64: u64 = bytemuck::pod_read_unaligned(&buffer64.bytes()[..8]);

        let mut g32 = [0u32; 1];
        let mut g64 = [0u64; 1];
        unsafe { device.get_query_pool_results(pool, 0, &mut g32, vk::QueryResultFlags::WAIT) }
            .vk_check("vkGetQueryPoolResults")?;
        unsafe {
            device.get_query_pool_results(
                pool,
                0,
                &mut g64,
                vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
            )
        }
        .vk_check("vkGetQueryPoolResults")?;

        check_timestamp_bits(b64, self.mask)?;
        check_timestamp_bits(g64[0], self.mask)?;
        Ok(verify_consistent_results(b32, b64, g32[0], g64[0]))
    }
}
