//! Synchronization smoke tests: fence status queries and waits with zero,
//! bounded and unbounded timeouts, and a semaphore handed between two
//! queues, each around a single triangle draw.

use std::sync::Arc;

use ash::vk;
use cts_core::{CtsError, ShaderStage, SourceCollections, TestGroup, TestStatus};
use cts_vk::command::{
    allocate_command_buffer, begin_command_buffer, begin_render_pass, cmd_copy_image_to_buffer,
    create_command_pool, create_fence, create_semaphore, end_command_buffer,
};
use cts_vk::image::{image_2d_info, make_color_view, make_framebuffer, make_render_pass};
use cts_vk::pipeline::{make_pipeline_layout, GraphicsPipelineBuilder};
use cts_vk::{
    BinaryCollection, BufferWithMemory, Context, ImageWithMemory, MemoryRequirement,
    SimpleAllocator, TestCase, TestInstance, Unique, VkCheck,
};
use tracing::{debug, info};

use crate::registry::CaseBox;

/// Two seconds, in nanoseconds.
pub const DEFAULT_TIMEOUT: u64 = 2 * 1000 * 1000 * 1000;

const RENDER_EXTENT: vk::Extent2D = vk::Extent2D {
    width: 256,
    height: 256,
};
const COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

const TRIANGLE: [[f32; 4]; 3] = [
    [0.5, 0.5, 0.0, 1.0],
    [-0.5, 0.5, 0.0, 1.0],
    [0.0, -0.5, 0.0, 1.0],
];

const FLIPPED_TRIANGLE: [[f32; 4]; 3] = [
    [-0.5, -0.5, 0.0, 1.0],
    [0.5, -0.5, 0.0, 1.0],
    [0.0, 0.5, 0.0, 1.0],
];

/// Queues the semaphore test spreads its two submits over.
pub const SEMAPHORE_QUEUE_COUNT: u32 = 2;

/// Value a timeline semaphore is signalled to and waited on.
const TIMELINE_VALUE: u64 = 1;

const VERTEX_SHADER: &str = "#version 310 es
precision mediump float;
layout (location = 0) in vec4 vertexPosition;
void main()
{
    gl_Position = vertexPosition;
}
";

const FRAGMENT_SHADER: &str = "#version 310 es
precision mediump float;
layout (location = 0) out vec4 outputColor;
void main()
{
    outputColor = vec4(1.0, 0.0, 0.0, 1.0);
}
";

/// Collapse an ash wait result back into the raw `VkResult`.
pub fn wait_code(result: ash::prelude::VkResult<()>) -> vk::Result {
    match result {
        Ok(()) => vk::Result::SUCCESS,
        Err(e) => e,
    }
}

/// Collapse an ash fence status query back into the raw `VkResult`.
pub fn status_code(result: ash::prelude::VkResult<bool>) -> vk::Result {
    match result {
        Ok(true) => vk::Result::SUCCESS,
        Ok(false) => vk::Result::NOT_READY,
        Err(e) => e,
    }
}

/// A wait with a finite timeout may legitimately end either way.
pub fn bounded_wait_ok(result: vk::Result) -> bool {
    matches!(result, vk::Result::SUCCESS | vk::Result::TIMEOUT)
}

/// First graphics family that exposes enough queues for the semaphore test.
pub fn semaphore_queue_family(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    families
        .iter()
        .position(|f| {
            f.queue_flags.contains(vk::QueueFlags::GRAPHICS) && f.queue_count >= SEMAPHORE_QUEUE_COUNT
        })
        .map(|i| i as u32)
}

/// A primary command buffer that draws one triangle into a 256x256 target
/// and copies the result to a host-visible buffer.
struct TriangleWork {
    cmd: vk::CommandBuffer,
    render_buffer: BufferWithMemory,
    _pipeline: Unique<vk::Pipeline>,
    _layout: Unique<vk::PipelineLayout>,
    _framebuffer: Unique<vk::Framebuffer>,
    _render_pass: Unique<vk::RenderPass>,
    _view: Unique<vk::ImageView>,
    _image: ImageWithMemory,
    _vertex_buffer: BufferWithMemory,
    _cmd_pool: Unique<vk::CommandPool>,
}

impl TriangleWork {
    fn record(
        device: &Arc<ash::Device>,
        allocator: &SimpleAllocator,
        queue_family_index: u32,
        binaries: &BinaryCollection,
        vertices: &[[f32; 4]; 3],
    ) -> Result<Self, CtsError> {
        let mut vertex_buffer = BufferWithMemory::host_visible(
            allocator,
            std::mem::size_of_val(vertices) as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        vertex_buffer
            .bytes_mut()
            .copy_from_slice(bytemuck::cast_slice(vertices));
        vertex_buffer.allocation().flush()?;

        let image = ImageWithMemory::new(
            allocator,
            &image_2d_info(
                COLOR_FORMAT,
                RENDER_EXTENT,
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
                vk::SampleCountFlags::TYPE_1,
            ),
            MemoryRequirement::ANY,
        )?;
        let view = make_color_view(device, image.image(), COLOR_FORMAT)?;
        let render_size = (RENDER_EXTENT.width * RENDER_EXTENT.height * 4) as vk::DeviceSize;
        let render_buffer =
            BufferWithMemory::host_visible(allocator, render_size, vk::BufferUsageFlags::TRANSFER_DST)?;

        let render_pass = make_render_pass(device, COLOR_FORMAT, None)?;
        let framebuffer = make_framebuffer(device, render_pass.get(), &[view.get()], RENDER_EXTENT)?;
        let layout = make_pipeline_layout(device, &[], &[])?;
        let vert = binaries.create_module(device, "glslvert")?;
        let frag = binaries.create_module(device, "glslfrag")?;
        let pipeline = GraphicsPipelineBuilder::new(RENDER_EXTENT)
            .vertex_input(std::mem::size_of::<[f32; 4]>() as u32, vk::Format::R32G32B32A32_SFLOAT)
            .build(
                device,
                layout.get(),
                render_pass.get(),
                vert.get(),
                frag.get(),
                vk::PipelineCache::null(),
            )?;

        let cmd_pool = create_command_pool(device, queue_family_index, vk::CommandPoolCreateFlags::empty())?;
        let cmd = allocate_command_buffer(device, cmd_pool.get(), vk::CommandBufferLevel::PRIMARY)?;
        begin_command_buffer(device, cmd)?;
        let clear = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            },
        }];
        begin_render_pass(device, cmd, render_pass.get(), framebuffer.get(), RENDER_EXTENT, &clear);
        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.get());
            device.cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer.buffer()], &[0]);
            device.cmd_draw(cmd, vertices.len() as u32, 1, 0, 0);
            device.cmd_end_render_pass(cmd);
        }
        cmd_copy_image_to_buffer(device, cmd, image.image(), render_buffer.buffer(), RENDER_EXTENT);
        end_command_buffer(device, cmd)?;

        Ok(Self {
            cmd,
            render_buffer,
            _pipeline: pipeline,
            _layout: layout,
            _framebuffer: framebuffer,
            _render_pass: render_pass,
            _view: view,
            _image: image,
            _vertex_buffer: vertex_buffer,
            _cmd_pool: cmd_pool,
        })
    }
}

fn init_triangle_programs(programs: &mut SourceCollections) {
    programs.add("glslvert", ShaderStage::Vertex, VERTEX_SHADER);
    programs.add("glslfrag", ShaderStage::Fragment, FRAGMENT_SHADER);
}

// ── Fences ──────────────────────────────────────────────────────────────────

pub struct FencesCase;

impl TestCase for FencesCase {
    fn init_programs(&self, programs: &mut SourceCollections) {
        init_triangle_programs(programs);
    }

    fn create_instance<'a>(
        &self,
        context: &'a Context,
        binaries: &'a BinaryCollection,
    ) -> Result<Box<dyn TestInstance + 'a>, CtsError> {
        Ok(Box::new(FencesInstance { context, binaries }))
    }
}

struct FencesInstance<'a> {
    context: &'a Context,
    binaries: &'a BinaryCollection,
}

impl TestInstance for FencesInstance<'_> {
    fn iterate(&mut self) -> Result<TestStatus, CtsError> {
        let device = self.context.device();
        let queue = self.context.universal_queue();

        let fences = [
            create_fence(device, vk::FenceCreateFlags::empty())?,
            create_fence(device, vk::FenceCreateFlags::empty())?,
        ];
        let work = TriangleWork::record(
            device,
            self.context.allocator(),
            self.context.universal_queue_family_index(),
            self.binaries,
            &TRIANGLE,
        )?;

        for (index, fence) in fences.iter().enumerate() {
            let status = status_code(unsafe { device.get_fence_status(fence.get()) });
            if status != vk::Result::NOT_READY {
                info!("fence {} should be reset but status is {:?}", index, status);
                return Ok(TestStatus::fail("Fence in incorrect state"));
            }
        }

        let cmds = [work.cmd];
        let submit = vk::SubmitInfo::default().command_buffers(&cmds);
        unsafe { device.queue_submit(queue, &[submit], fences[0].get()) }.vk_check("vkQueueSubmit")?;

        for timeout in [0, DEFAULT_TIMEOUT] {
            let result = wait_code(unsafe { device.wait_for_fences(&[fences[0].get()], true, timeout) });
            debug!("wait with timeout {} ns: {:?}", timeout, result);
            if !bounded_wait_ok(result) {
                info!("failed to wait for a single fence: {:?}", result);
                return Ok(TestStatus::fail("Failed to wait for a single fence"));
            }
        }

        let result = wait_code(unsafe { device.wait_for_fences(&[fences[0].get()], true, u64::MAX) });
        if result != vk::Result::SUCCESS {
            info!("failed to wait for a fence: {:?}", result);
            return Ok(TestStatus::fail("failed to wait for a fence"));
        }

        let result = wait_code(unsafe { device.wait_for_fences(&[fences[1].get()], true, 1) });
        if result != vk::Result::TIMEOUT {
            info!("failed to timeout on wait for single fence: {:?}", result);
            return Ok(TestStatus::fail("failed to timeout on wait for single fence"));
        }

        let status = status_code(unsafe { device.get_fence_status(fences[0].get()) });
        if status != vk::Result::SUCCESS {
            info!("fence should be signaled but status is {:?}", status);
            return Ok(TestStatus::fail("Fence in incorrect state"));
        }

        work.render_buffer.allocation().invalidate()?;
        Ok(TestStatus::pass("synchronization-fences passed"))
    }
}

// ── Semaphores ──────────────────────────────────────────────────────────────

/// Two submits on two queues of a dedicated device: the first signals a
/// semaphore without waiting, the second waits on it without signalling.
pub struct SemaphoresCase {
    semaphore_type: vk::SemaphoreType,
}

impl SemaphoresCase {
    pub fn new(semaphore_type: vk::SemaphoreType) -> Self {
        Self { semaphore_type }
    }

    fn is_timeline(&self) -> bool {
        self.semaphore_type == vk::SemaphoreType::TIMELINE
    }
}

impl TestCase for SemaphoresCase {
    fn check_support(&self, context: &Context) -> Result<(), CtsError> {
        if self.is_timeline() && !context.features().timeline_semaphore() {
            return Err(CtsError::not_supported("Timeline semaphore not supported"));
        }
        Ok(())
    }

    fn init_programs(&self, programs: &mut SourceCollections) {
        init_triangle_programs(programs);
    }

    fn create_instance<'a>(
        &self,
        context: &'a Context,
        binaries: &'a BinaryCollection,
    ) -> Result<Box<dyn TestInstance + 'a>, CtsError> {
        Ok(Box::new(SemaphoresInstance {
            context,
            binaries,
            timeline: self.is_timeline(),
            semaphore_type: self.semaphore_type,
        }))
    }
}

struct SemaphoresInstance<'a> {
    context: &'a Context,
    binaries: &'a BinaryCollection,
    timeline: bool,
    semaphore_type: vk::SemaphoreType,
}

impl SemaphoresInstance<'_> {
    /// Submit `cmd` with at most one semaphore wait and one signal, chaining
    /// the timeline values when the semaphore is a timeline one.
    fn submit(
        &self,
        device: &ash::Device,
        queue: vk::Queue,
        cmd: vk::CommandBuffer,
        wait: Option<vk::Semaphore>,
        signal: Option<vk::Semaphore>,
        fence: vk::Fence,
    ) -> Result<(), CtsError> {
        let cmds = [cmd];
        let wait_semaphores: Vec<vk::Semaphore> = wait.into_iter().collect();
        let wait_stages = vec![vk::PipelineStageFlags::TOP_OF_PIPE; wait_semaphores.len()];
        let wait_values = vec![TIMELINE_VALUE; wait_semaphores.len()];
        let signal_semaphores: Vec<vk::Semaphore> = signal.into_iter().collect();
        let signal_values = vec![TIMELINE_VALUE; signal_semaphores.len()];

        let mut timeline_info = vk::TimelineSemaphoreSubmitInfo::default()
            .wait_semaphore_values(&wait_values)
            .signal_semaphore_values(&signal_values);
        let mut submit = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&cmds)
            .signal_semaphores(&signal_semaphores);
        if self.timeline {
            submit = submit.push_next(&mut timeline_info);
        }
        unsafe { device.queue_submit(queue, &[submit], fence) }.vk_check("vkQueueSubmit")
    }
}

impl TestInstance for SemaphoresInstance<'_> {
    fn iterate(&mut self) -> Result<TestStatus, CtsError> {
        let Some(family) = semaphore_queue_family(&self.context.queue_family_properties()) else {
            return Err(CtsError::not_supported(format!(
                "Cannot create device with {} graphics queues",
                SEMAPHORE_QUEUE_COUNT
            )));
        };
        let custom = self
            .context
            .custom_device()
            .queue_family(family, SEMAPHORE_QUEUE_COUNT)
            .build()?;
        let device = custom.device();
        let queues = custom.queues();
        let (Some(first), Some(second)) = (queues.first(), queues.get(1)) else {
            return Err(CtsError::fatal("custom device is missing a queue"));
        };

        let semaphore = create_semaphore(device, self.semaphore_type)?;
        let fences = [
            create_fence(device, vk::FenceCreateFlags::empty())?,
            create_fence(device, vk::FenceCreateFlags::empty())?,
        ];
        let works = [
            TriangleWork::record(device, custom.allocator(), family, self.binaries, &TRIANGLE)?,
            TriangleWork::record(device, custom.allocator(), family, self.binaries, &FLIPPED_TRIANGLE)?,
        ];

        self.submit(device, first.queue, works[0].cmd, None, Some(semaphore.get()), fences[0].get())?;
        let result = wait_code(unsafe { device.wait_for_fences(&[fences[0].get()], true, u64::MAX) });
        if result != vk::Result::SUCCESS {
            info!("failed to wait for a set fence: {:?}", result);
            return Ok(TestStatus::fail("failed to wait for a set fence"));
        }
        works[0].render_buffer.allocation().invalidate()?;

        self.submit(device, second.queue, works[1].cmd, Some(semaphore.get()), None, fences[1].get())?;
        let result = wait_code(unsafe { device.wait_for_fences(&[fences[1].get()], true, u64::MAX) });
        if result != vk::Result::SUCCESS {
            info!("failed to wait for a set fence: {:?}", result);
            return Ok(TestStatus::fail("failed to wait for a set fence"));
        }
        works[1].render_buffer.allocation().invalidate()?;

        debug!(
            "semaphore handed from queue {} to queue {} of family {}",
            first.index, second.index, family
        );
        Ok(TestStatus::pass("synchronization-semaphores passed"))
    }
}

pub fn create_tests() -> TestGroup<CaseBox> {
    let mut group: TestGroup<CaseBox> = TestGroup::new("smoke", "Synchronization smoke tests");
    group.add_case("fences", Box::new(FencesCase));
    group.add_case(
        "binary_semaphores",
        Box::new(SemaphoresCase::new(vk::SemaphoreType::BINARY)),
    );
    group.add_case(
        "timeline_semaphores",
        Box::new(SemaphoresCase::new(vk::SemaphoreType::TIMELINE)),
    );
    group
}
