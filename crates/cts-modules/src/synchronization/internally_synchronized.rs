//! Internally synchronized objects: many threads create pipelines from one
//! shared `VkPipelineCache` while borrowing queues from a common pool.

use ash::vk;
use cts_common::platform::cpu_count;
use cts_core::{CtsError, ResultCollector, ShaderStage, SourceCollections, TestGroup, TestStatus};
use cts_vk::command::{
    allocate_command_buffer, begin_command_buffer, begin_render_pass, buffer_barrier,
    cmd_buffer_barrier, create_command_pool, end_command_buffer, submit_commands_and_wait,
};
use cts_vk::descriptor::{
    allocate_descriptor_set, DescriptorPoolBuilder, DescriptorSetLayoutBuilder,
    DescriptorSetUpdateBuilder,
};
use cts_vk::image::{image_2d_info, make_color_view, make_framebuffer, make_render_pass};
use cts_vk::pipeline::{make_compute_pipeline, make_pipeline_cache, make_pipeline_layout, GraphicsPipelineBuilder};
use cts_vk::stress::stress_thread_count;
use cts_vk::{
    BinaryCollection, BufferWithMemory, Context, CustomDevice, ImageWithMemory, MemoryRequirement,
    MultiQueues, SpinBarrier, TestCase, TestInstance, ThreadGroup, Unique,
};
use tracing::{debug, info};

use crate::registry::CaseBox;

pub const EXECUTION_PER_THREAD: usize = 100;
pub const BUFFER_ELEMENT_COUNT: usize = 16;
const BUFFER_SIZE: vk::DeviceSize = (BUFFER_ELEMENT_COUNT * 4) as vk::DeviceSize;

/// Invocation count of each shader variant, in variant order.
pub const SHADER_EXECUTIONS: [u32; 3] = [16, 1, 1];

const COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
const COLOR_EXTENT: vk::Extent2D = vk::Extent2D { width: 1, height: 1 };

/// Whether a family with `available` flags can serve work needing `needed`.
/// Graphics and compute families implicitly support transfer.
pub fn queue_family_matches(available: vk::QueueFlags, needed: vk::QueueFlags) -> bool {
    if needed == vk::QueueFlags::TRANSFER {
        available.intersects(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)
    } else {
        available.contains(needed)
    }
}

/// Every shader variant writes `result[i] = i`.
pub fn verify_result_buffer(values: &[i32]) -> TestStatus {
    let matches = values.len() >= BUFFER_ELEMENT_COUNT
        && values
            .iter()
            .take(BUFFER_ELEMENT_COUNT)
            .enumerate()
            .all(|(i, &v)| v == i as i32);
    if matches {
        TestStatus::pass("Passed")
    } else {
        TestStatus::fail("The data don't match")
    }
}

// ── Shaders ─────────────────────────────────────────────────────────────────

const OUTPUT_BLOCK: &str = "layout(set = 0, binding = 0, std430) buffer Output
{
	int result[];
} sb_out;
";

fn compute_sources() -> Vec<String> {
    let n = BUFFER_ELEMENT_COUNT;
    vec![
        format!(
            "#version 310 es\n\nlayout(local_size_x = 1, local_size_y = 1, local_size_z = 1) in;\n\n{OUTPUT_BLOCK}void main (void)\n{{\n\thighp uint ndx = gl_GlobalInvocationID.x;\n\tsb_out.result[ndx] = int(ndx);\n}}\n"
        ),
        format!(
            "#version 310 es\n\nlayout(local_size_x = 1, local_size_y = 1, local_size_z = 1) in;\n\n{OUTPUT_BLOCK}void main (void)\n{{\n\tfor (highp uint ndx = 0u; ndx < {n}u; ndx++)\n\t{{\n\t\tsb_out.result[ndx] = int(ndx);\n\t}}\n}}\n"
        ),
        format!(
            "#version 310 es\n\nlayout(local_size_x = {n}, local_size_y = 1, local_size_z = 1) in;\n\n{OUTPUT_BLOCK}void main (void)\n{{\n\thighp uint ndx = gl_LocalInvocationID.x;\n\tsb_out.result[ndx] = int(ndx);\n}}\n"
        ),
    ]
}

fn vertex_sources() -> Vec<String> {
    let n = BUFFER_ELEMENT_COUNT;
    let last = n - 1;
    vec![
        format!(
            "#version 440\n\n{OUTPUT_BLOCK}\nvoid main (void)\n{{\n   sb_out.result[gl_VertexIndex] = int(gl_VertexIndex);\n   gl_PointSize = 1.0f;\n}}\n"
        ),
        format!(
            "#version 440\n\n{OUTPUT_BLOCK}\nvoid main (void)\n{{\n\tfor (highp uint ndx = 0u; ndx < {n}u; ndx++)\n\t{{\n\t\tsb_out.result[ndx] = int(ndx);\n\t}}\n\tgl_PointSize = 1.0f;\n}}\n"
        ),
        format!(
            "#version 440\n\n{OUTPUT_BLOCK}\nvoid main (void)\n{{\n\tfor (int ndx = {last}; ndx >= 0; ndx--)\n\t{{\n\t\tsb_out.result[uint(ndx)] = ndx;\n\t}}\n\tgl_PointSize = 1.0f;\n}}\n"
        ),
    ]
}

const FRAGMENT_SHADER: &str = "#version 440

layout(location = 0) out vec4 o_color;

void main (void)
{
    o_color = vec4(1.0);
}
";

// ── Queues ──────────────────────────────────────────────────────────────────

/// A queue together with the command pool reserved for it.
#[derive(Debug, Clone, Copy)]
struct QueueSlot {
    queue: vk::Queue,
    pool: vk::CommandPool,
}

/// A device with every queue of the matching families, and one resettable
/// command pool per queue.
struct StressQueues {
    queues: MultiQueues<QueueSlot>,
    /// Owns the pools the slots refer to.
    _pools: Vec<Unique<vk::CommandPool>>,
    device: CustomDevice,
}

impl StressQueues {
    fn new(context: &Context, needed: vk::QueueFlags) -> Result<Self, CtsError> {
        let mut builder = context.custom_device();
        let mut found = false;
        for (index, family) in context.queue_family_properties().iter().enumerate() {
            if queue_family_matches(family.queue_flags, needed) && family.queue_count > 0 {
                builder = builder.queue_family(index as u32, family.queue_count);
                found = true;
            }
        }
        if !found {
            return Err(CtsError::not_supported("Queue not found"));
        }
        let device = builder.build()?;

        let queues = MultiQueues::new();
        let mut pools = Vec::new();
        let mut by_family: Vec<(u32, Vec<QueueSlot>)> = Vec::new();
        for info in device.queues() {
            let pool = create_command_pool(
                device.device(),
                info.family_index,
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?;
            let slot = QueueSlot {
                queue: info.queue,
                pool: pool.get(),
            };
            pools.push(pool);
            match by_family.iter_mut().find(|(family, _)| *family == info.family_index) {
                Some((_, slots)) => slots.push(slot),
                None => by_family.push((info.family_index, vec![slot])),
            }
        }
        for (family, slots) in by_family {
            queues.add_family(family, slots);
        }
        info!(
            "{} queue(s) from {} queue families available for stress",
            queues.queue_count(),
            queues.family_count()
        );

        Ok(Self {
            queues,
            _pools: pools,
            device,
        })
    }
}

// ── Execution ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    Compute,
    Graphics,
}

/// Objects every worker shares.
struct Shared<'a> {
    kind: PipelineKind,
    stress: &'a StressQueues,
    set_layout: vk::DescriptorSetLayout,
    pipeline_layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    cache: vk::PipelineCache,
    modules: &'a [Unique<vk::ShaderModule>],
    fragment: vk::ShaderModule,
}

impl Shared<'_> {
    fn create_pipeline(&self, variant: usize) -> Result<Unique<vk::Pipeline>, CtsError> {
        let device = self.stress.device.device();
        let module = self.modules[variant].get();
        match self.kind {
            PipelineKind::Compute => make_compute_pipeline(device, self.pipeline_layout, module, self.cache),
            PipelineKind::Graphics => GraphicsPipelineBuilder::new(COLOR_EXTENT)
                .topology(vk::PrimitiveTopology::POINT_LIST)
                .depth_test(true)
                .build(device, self.pipeline_layout, self.render_pass, module, self.fragment, self.cache),
        }
    }

    /// Borrow a queue, run `pipeline` for `executions` invocations and check
    /// the storage buffer it filled.
    fn execute(&self, pipeline: vk::Pipeline, executions: u32) -> Result<TestStatus, CtsError> {
        let device = self.stress.device.device();
        let allocator = self.stress.device.allocator();

        let descriptor_pool = DescriptorPoolBuilder::new()
            .add_type(vk::DescriptorType::STORAGE_BUFFER, 1)
            .build(device, vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET, 1)?;
        let set = allocate_descriptor_set(device, descriptor_pool.get(), self.set_layout)?;
        let mut result_buffer = BufferWithMemory::host_visible(allocator, BUFFER_SIZE, vk::BufferUsageFlags::STORAGE_BUFFER)?;
        result_buffer.bytes_mut().fill(0);
        result_buffer.allocation().flush()?;

        let mut updates = DescriptorSetUpdateBuilder::new();
        updates.write_buffers(
            set,
            0,
            0,
            vk::DescriptorType::STORAGE_BUFFER,
            vec![vk::DescriptorBufferInfo {
                buffer: result_buffer.buffer(),
                offset: 0,
                range: BUFFER_SIZE,
            }],
        );
        updates.update(device);

        let color = match self.kind {
            PipelineKind::Compute => None,
            PipelineKind::Graphics => {
                let image = ImageWithMemory::new(
                    allocator,
                    &image_2d_info(
                        COLOR_FORMAT,
                        COLOR_EXTENT,
                        vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC,
                        vk::SampleCountFlags::TYPE_1,
                    ),
                    MemoryRequirement::ANY,
                )?;
                let view = make_color_view(device, image.image(), COLOR_FORMAT)?;
                let framebuffer = make_framebuffer(device, self.render_pass, &[view.get()], COLOR_EXTENT)?;
                Some((image, view, framebuffer))
            }
        };

        let (bind_point, shader_stage) = match self.kind {
            PipelineKind::Compute => (vk::PipelineBindPoint::COMPUTE, vk::PipelineStageFlags::COMPUTE_SHADER),
            PipelineKind::Graphics => (vk::PipelineBindPoint::GRAPHICS, vk::PipelineStageFlags::VERTEX_SHADER),
        };

        {
            let lease = self.stress.queues.acquire();
            let slot = lease.slot();
            let cmd = allocate_command_buffer(device, slot.pool, vk::CommandBufferLevel::PRIMARY)?;

            let recorded = (|| -> Result<(), CtsError> {
                begin_command_buffer(device, cmd)?;
                if let Some((_, _, framebuffer)) = &color {
                    let clear = [vk::ClearValue {
                        color: vk::ClearColorValue {
                            float32: [0.0, 0.0, 0.0, 1.0],
                        },
                    }];
                    begin_render_pass(device, cmd, self.render_pass, framebuffer.get(), COLOR_EXTENT, &clear);
                }
                unsafe {
                    device.cmd_bind_pipeline(cmd, bind_point, pipeline);
                    device.cmd_bind_descriptor_sets(cmd, bind_point, self.pipeline_layout, 0, &[set], &[]);
                    match self.kind {
                        PipelineKind::Compute => device.cmd_dispatch(cmd, executions, 1, 1),
                        PipelineKind::Graphics => {
                            device.cmd_draw(cmd, executions, 1, 0, 0);
                            device.cmd_end_render_pass(cmd);
                        }
                    }
                }
                cmd_buffer_barrier(
                    device,
                    cmd,
                    shader_stage,
                    vk::PipelineStageFlags::HOST,
                    buffer_barrier(result_buffer.buffer(), vk::AccessFlags::SHADER_WRITE, vk::AccessFlags::HOST_READ),
                );
                end_command_buffer(device, cmd)?;
                submit_commands_and_wait(device, slot.queue, cmd)
            })();

            unsafe { device.free_command_buffers(slot.pool, &[cmd]) };
            recorded?;
        }

        result_buffer.allocation().invalidate()?;
        let values: Vec<i32> = result_buffer
            .bytes()
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned::<i32>)
            .collect();
        Ok(verify_result_buffer(&values))
    }

    fn worker(&self, barrier: &SpinBarrier) -> Result<TestStatus, CtsError> {
        let collector = ResultCollector::new();
        for execution in 0..EXECUTION_PER_THREAD {
            let variant = execution % self.modules.len();
            let pipeline = self.create_pipeline(variant)?;
            let status = self.execute(pipeline.get(), SHADER_EXECUTIONS[variant])?;
            barrier.sync();
            collector.add_status(status);
        }
        Ok(collector.get_result())
    }
}

// ── Case ────────────────────────────────────────────────────────────────────

pub struct PipelineCacheCase {
    kind: PipelineKind,
}

impl PipelineCacheCase {
    pub fn new(kind: PipelineKind) -> Self {
        Self { kind }
    }
}

impl TestCase for PipelineCacheCase {
    fn check_support(&self, context: &Context) -> Result<(), CtsError> {
        if self.kind == PipelineKind::Graphics
            && context.features().core.vertex_pipeline_stores_and_atomics != vk::TRUE
        {
            return Err(CtsError::not_supported("vertexPipelineStoresAndAtomics not supported"));
        }
        Ok(())
    }

    fn init_programs(&self, programs: &mut SourceCollections) {
        match self.kind {
            PipelineKind::Compute => {
                for (i, source) in compute_sources().into_iter().enumerate() {
                    programs.add(format!("compute_{}", i), ShaderStage::Compute, source);
                }
            }
            PipelineKind::Graphics => {
                for (i, source) in vertex_sources().into_iter().enumerate() {
                    programs.add(format!("vert_{}", i), ShaderStage::Vertex, source);
                }
                programs.add("frag", ShaderStage::Fragment, FRAGMENT_SHADER);
            }
        }
    }

    fn create_instance<'a>(
        &self,
        context: &'a Context,
        binaries: &'a BinaryCollection,
    ) -> Result<Box<dyn TestInstance + 'a>, CtsError> {
        Ok(Box::new(PipelineCacheInstance {
            kind: self.kind,
            context,
            binaries,
        }))
    }
}

struct PipelineCacheInstance<'a> {
    kind: PipelineKind,
    context: &'a Context,
    binaries: &'a BinaryCollection,
}

impl TestInstance for PipelineCacheInstance<'_> {
    fn iterate(&mut self) -> Result<TestStatus, CtsError> {
        let (needed, stage, prefix) = match self.kind {
            PipelineKind::Compute => (vk::QueueFlags::COMPUTE, vk::ShaderStageFlags::COMPUTE, "compute"),
            PipelineKind::Graphics => (vk::QueueFlags::GRAPHICS, vk::ShaderStageFlags::VERTEX, "vert"),
        };
        let stress = StressQueues::new(self.context, needed)?;
        let device = stress.device.device();

        let set_layout = DescriptorSetLayoutBuilder::new()
            .add_single_binding(vk::DescriptorType::STORAGE_BUFFER, stage)
            .build(device)?;
        let pipeline_layout = make_pipeline_layout(device, &[set_layout.get()], &[])?;
        let render_pass = match self.kind {
            PipelineKind::Compute => None,
            PipelineKind::Graphics => Some(make_render_pass(device, COLOR_FORMAT, None)?),
        };
        let modules = (0..SHADER_EXECUTIONS.len())
            .map(|i| self.binaries.create_module(device, &format!("{}_{}", prefix, i)))
            .collect::<Result<Vec<_>, _>>()?;
        let fragment = match self.kind {
            PipelineKind::Compute => None,
            PipelineKind::Graphics => Some(self.binaries.create_module(device, "frag")?),
        };
        let cache = make_pipeline_cache(device)?;

        let shared = Shared {
            kind: self.kind,
            stress: &stress,
            set_layout: set_layout.get(),
            pipeline_layout: pipeline_layout.get(),
            render_pass: render_pass.as_ref().map_or(vk::RenderPass::null(), |rp| rp.get()),
            cache: cache.get(),
            modules: &modules,
            fragment: fragment.as_ref().map_or(vk::ShaderModule::null(), |m| m.get()),
        };

        // Warm the cache on this thread before the workers start.
        let warm = shared.create_pipeline(0)?;
        let status = shared.execute(warm.get(), SHADER_EXECUTIONS[0])?;
        debug!("warm-up execution: {:?}", status.code);

        let thread_count = self
            .context
            .stress_threads()
            .unwrap_or_else(|| stress_thread_count(cpu_count()));
        let mut threads = ThreadGroup::new();
        for _ in 0..thread_count {
            let shared = &shared;
            threads.add(move |barrier| shared.worker(barrier));
        }
        info!("{} worker thread(s)", threads.len());

        let result = threads.run();
        if !result.is_pass() {
            return Ok(result);
        }
        Ok(TestStatus::pass("Passed"))
    }
}

pub fn create_tests() -> TestGroup<CaseBox> {
    let mut group: TestGroup<CaseBox> = TestGroup::new("internally_synchronized_objects", "Internally synchronized objects");
    group.add_case("pipeline_cache_compute", Box::new(PipelineCacheCase::new(PipelineKind::Compute)));
    group.add_case("pipeline_cache_graphics", Box::new(PipelineCacheCase::new(PipelineKind::Graphics)));
    group
}
