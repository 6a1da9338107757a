//! Ray watertightness: rays aimed at randomly subdivided squares must never
//! slip between triangles, and rays through the shared edges of a closed
//! fan must hit without reaching the miss shader.

use std::f32::consts::PI;

use ash::vk;
use cts_core::{CtsError, ShaderStage, SourceCollections, SpirvTarget, TestGroup, TestStatus};
use cts_vk::accel::{BottomLevelAccelerationStructure, TopLevelAccelerationStructure, TriangleGeometry};
use cts_vk::command::{
    allocate_command_buffer, begin_command_buffer, cmd_image_barrier, cmd_memory_barrier, color_layers,
    color_range, create_command_pool, end_command_buffer, image_barrier, memory_barrier,
    submit_commands_and_wait,
};
use cts_vk::descriptor::{
    allocate_descriptor_set, DescriptorPoolBuilder, DescriptorSetLayoutBuilder,
    DescriptorSetUpdateBuilder,
};
use cts_vk::pipeline::make_pipeline_layout;
use cts_vk::ray_tracing::{
    make_ray_tracing_pipeline, RayTracingLoaders, RayTracingProperties, RayTracingShaders,
    ShaderBindingTables,
};
use cts_vk::{
    BinaryCollection, BufferWithMemory, Context, ImageWithMemory, MemoryRequirement, TestCase,
    TestInstance, Unique, VkCheck,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::registry::CaseBox;

pub const LEGACY_SIZES: [u32; 8] = [4, 16, 64, 256, 1024, 4096, 16384, 65536];
pub const CLOSED_FAN_SIZES: [u32; 5] = [4, 16, 64, 256, 1024];
pub const LEGACY_GROUP_COUNT: u32 = 10;
const LEGACY_EXTENT: u32 = 256;

/// Value the miss shader adds in the closed fan layout.
pub const MISS_SENTINEL: u32 = 10000;
const LEGACY_CLEAR: u32 = 5;

/// Allocations made outside the acceleration structures.
const BASE_ALLOCATIONS: u32 = 8;
/// Each structure owns its storage, input and scratch allocations.
const ALLOCATIONS_PER_STRUCTURE: u32 = 3;

const ALL_RAY_TRACING_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::RAYGEN_KHR.as_raw()
        | vk::ShaderStageFlags::ANY_HIT_KHR.as_raw()
        | vk::ShaderStageFlags::CLOSEST_HIT_KHR.as_raw()
        | vk::ShaderStageFlags::MISS_KHR.as_raw()
        | vk::ShaderStageFlags::INTERSECTION_KHR.as_raw()
        | vk::ShaderStageFlags::CALLABLE_KHR.as_raw(),
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// A unit square split into `squares` random triangles, one ray per pixel.
    Subdivided { seed: u64 },
    /// `squares` triangles around the origin, one ray per shared edge.
    ClosedFan { blas_per_triangle: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaseDef {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub squares: u32,
    pub layout: Layout,
}

impl CaseDef {
    pub fn subdivided(test_index: u32, squares: u32) -> Self {
        Self {
            width: LEGACY_EXTENT,
            height: LEGACY_EXTENT,
            depth: 1,
            squares,
            layout: Layout::Subdivided {
                seed: u64::from(5 * test_index + 11 * squares),
            },
        }
    }

    /// The launch grid covers at least `edges + 2` rays.
    pub fn closed_fan(edges: u32, blas_per_triangle: bool) -> Self {
        let side = (edges as f64).sqrt() as u32;
        Self {
            width: 1 + side,
            height: side,
            depth: edges,
            squares: edges,
            layout: Layout::ClosedFan { blas_per_triangle },
        }
    }

    pub fn is_closed_fan(&self) -> bool {
        matches!(self.layout, Layout::ClosedFan { .. })
    }

    pub fn pixel_count(&self) -> u32 {
        self.width * self.height * self.depth
    }

    pub fn bottom_level_count(&self) -> u32 {
        match self.layout {
            Layout::ClosedFan {
                blas_per_triangle: true,
            } => self.squares,
            _ => 1,
        }
    }
}

// ── Geometry ────────────────────────────────────────────────────────────────

fn mix(a: [f32; 3], b: [f32; 3], alpha: f32) -> [f32; 3] {
    [
        a[0] * alpha + b[0] * (1.0 - alpha),
        a[1] * alpha + b[1] * (1.0 - alpha),
        a[2] * alpha + b[2] * (1.0 - alpha),
    ]
}

/// Split the unit square at z = -1 into `squares` triangles by repeatedly
/// replacing a random triangle with three that share a new inner vertex at
/// a random depth. Returns three vertices per triangle.
pub fn subdivided_square(squares: u32, seed: u64) -> Vec<[f32; 3]> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut vertices: Vec<[f32; 3]> = vec![
        [0.0, 0.0, -1.0],
        [0.0, 1.0, -1.0],
        [1.0, 0.0, -1.0],
        [1.0, 1.0, -1.0],
    ];
    let mut triangles: Vec<[usize; 3]> = vec![[0, 1, 2], [3, 2, 1]];

    while triangles.len() < squares as usize {
        let n = rng.gen_range(0..triangles.len());
        let [p, q, r] = triangles[n];
        let alpha = rng.gen_range(0.01f32..0.99);
        let beta = rng.gen_range(0.01f32..0.99);
        let mixed = mix(mix(vertices[p], vertices[q], alpha), vertices[r], beta);
        let z = -rng.gen_range(0.01f32..0.99);

        let inner = vertices.len();
        vertices.push([mixed[0], mixed[1], z]);
        triangles.push([q, r, inner]);
        triangles.push([p, r, inner]);
        triangles[n][2] = inner;
    }

    triangles
        .iter()
        .flat_map(|t| t.iter().map(|&i| vertices[i]))
        .collect()
}

/// `edges` triangles fanning around the origin in the z = 0 plane; each
/// triangle shares one edge with each neighbour.
pub fn closed_fan(edges: u32) -> Vec<[[f32; 3]; 3]> {
    let rim: Vec<[f32; 3]> = (0..edges)
        .map(|i| {
            let angle = 2.0 * i as f32 * PI / edges as f32;
            [angle.sin(), angle.cos(), 0.0]
        })
        .collect();
    (0..edges as usize)
        .map(|i| [[0.0, 0.0, 0.0], rim[i], rim[(i + 1) % rim.len()]])
        .collect()
}

// ── Verification ────────────────────────────────────────────────────────────

/// Every ray aimed at the subdivided square must have run the any-hit
/// shader, which writes 1.
pub fn verify_subdivided(values: &[u32], squares: u32) -> TestStatus {
    let failures = values
        .iter()
        .take(squares as usize)
        .filter(|&&v| v != 1)
        .count();
    if failures == 0 {
        TestStatus::pass("Pass")
    } else {
        TestStatus::fail(format!("failures={}", failures))
    }
}

/// Each (ray, primitive) texel counts any-hit invocations. Counts above one
/// mean a duplicated hit; the miss sentinel means a ray went through a
/// shared edge or vertex.
pub fn verify_closed_fan(values: &[u32]) -> TestStatus {
    let failures = values
        .iter()
        .filter(|&&v| v > 1 && v != MISS_SENTINEL)
        .count();
    if failures > 0 {
        return TestStatus::fail(format!("failures={}", failures));
    }
    if values.contains(&MISS_SENTINEL) {
        return TestStatus::quality_warning("Miss shader invoked for a shared edge/vertex.");
    }
    TestStatus::pass("Pass")
}

// ── Shaders ─────────────────────────────────────────────────────────────────

const SUBDIVIDED_AHIT: &str = "#version 460 core
#extension GL_EXT_ray_tracing : require
layout(location = 0) rayPayloadInEXT vec3 hitValue;
hitAttributeEXT vec3 attribs;
layout(r32ui, set = 0, binding = 0) uniform uimage2D result;
void main()
{
  uvec4 color = uvec4(1,0,0,1);
  imageStore(result, ivec2(gl_LaunchIDEXT.xy), color);
}
";

const SUBDIVIDED_MISS: &str = "#version 460 core
#extension GL_EXT_ray_tracing : require
layout(location = 0) rayPayloadInEXT dummyPayload { vec4 dummy; };
layout(r32ui, set = 0, binding = 0) uniform uimage2D result;
void main()
{
  uvec4 color = uvec4(2,0,0,1);
  imageStore(result, ivec2(gl_LaunchIDEXT.xy), color);
}
";

const SUBDIVIDED_RGEN: &str = "#version 460 core
#extension GL_EXT_ray_tracing : require
layout(location = 0) rayPayloadEXT vec3 hitValue;
layout(set = 0, binding = 1) uniform accelerationStructureEXT topLevelAS;
void main()
{
  uint  rayFlags = 0;
  uint  cullMask = 0xFF;
  float tmin     = 0.0;
  float tmax     = 9.0;
  vec3  origin   = vec3((float(gl_LaunchIDEXT.x) + 0.5f) / float(gl_LaunchSizeEXT.x),
                        (float(gl_LaunchIDEXT.y) + 0.5f) / float(gl_LaunchSizeEXT.y), 0.0);
  vec3  direct   = vec3(0.0, 0.0, -1.0);
  traceRayEXT(topLevelAS, rayFlags, cullMask, 0, 0, 0, origin, tmin, direct, tmax, 0);
}
";

const FAN_AHIT: &str = "#version 460 core
#extension GL_EXT_ray_tracing : require
layout(location = 0) rayPayloadInEXT vec3 hitValue;
layout(r32ui, set = 0, binding = 0) uniform uimage3D result;
hitAttributeEXT vec3 attribs;
void main()
{
    imageAtomicAdd(result, ivec3(gl_LaunchIDEXT.xy, gl_PrimitiveID), 1);
}
";

const FAN_MISS: &str = "#version 460 core
#extension GL_EXT_ray_tracing : require
layout(location = 0) rayPayloadInEXT dummyPayload { vec4 dummy; };
layout(r32ui, set = 0, binding = 0) uniform uimage3D result;
void main()
{
    imageAtomicAdd(result, ivec3(gl_LaunchIDEXT.xy, 0), 10000);
}
";

/// Ray 0 targets the fan centre; ray `k` targets the midpoint of shared edge `k - 1`.
pub fn fan_raygen_source(edges: u32) -> String {
    format!(
        "#version 460 core
#extension GL_EXT_ray_tracing : require
layout(location = 0) rayPayloadEXT vec3 hitValue;
layout(set = 0, binding = 1) uniform accelerationStructureEXT topLevelAS;
void main()
{{
    uint  rayFlags = 0;
    uint  cullMask = 0xFF;
    float tmin     = 0.01;
    float tmax     = 9.0;
    uint  nRay     = gl_LaunchIDEXT.y * gl_LaunchSizeEXT.x + gl_LaunchIDEXT.x;
    vec3  origin   = vec3(0.0, 0.0, -1.0);
    if (nRay > {last})
    {{
        return;
    }}
    float angleDiff    = 2.0 * 3.14159265 / {edges};
    vec2  sharedEdgeP1 = vec2(0, 0);
    vec2  sharedEdgeP2 = (nRay == 0) ? vec2(0, 0)
                                     : vec2(sin(angleDiff * (nRay - 1)), cos(angleDiff * (nRay - 1)));
    vec3  target       = vec3(mix(sharedEdgeP1, sharedEdgeP2, vec2(0.5)), 0.0);
    vec3  direct       = normalize(target - origin);
    traceRayEXT(topLevelAS, rayFlags, cullMask, 0, 0, 0, origin, tmin, direct, tmax, 0);
}}
",
        last = edges + 1,
        edges = edges
    )
}

// ── Case ────────────────────────────────────────────────────────────────────

pub struct WatertightnessCase {
    def: CaseDef,
}

impl WatertightnessCase {
    pub fn new(def: CaseDef) -> Self {
        Self { def }
    }
}

impl TestCase for WatertightnessCase {
    fn check_support(&self, context: &Context) -> Result<(), CtsError> {
        context.require_device_extension(ash::khr::acceleration_structure::NAME)?;
        context.require_device_extension(ash::khr::ray_tracing_pipeline::NAME)?;
        let features = context.features();
        if !features.ray_tracing_pipeline() {
            return Err(CtsError::not_supported(
                "Requires VkPhysicalDeviceRayTracingPipelineFeaturesKHR.rayTracingPipeline",
            ));
        }
        if !features.acceleration_structure() {
            return Err(CtsError::fatal(
                "VK_KHR_ray_tracing_pipeline requires VkPhysicalDeviceAccelerationStructureFeaturesKHR.accelerationStructure",
            ));
        }
        if self.def.depth > context.limits().max_image_dimension3_d {
            return Err(CtsError::not_supported("Result image depth required more than supported"));
        }
        Ok(())
    }

    fn init_programs(&self, programs: &mut SourceCollections) {
        let spirv = SpirvTarget::Spirv1_4;
        if self.def.is_closed_fan() {
            programs.add_with_target("ahit", ShaderStage::AnyHit, FAN_AHIT, spirv);
            programs.add_with_target("miss", ShaderStage::Miss, FAN_MISS, spirv);
            programs.add_with_target("rgen", ShaderStage::RayGen, fan_raygen_source(self.def.squares), spirv);
        } else {
            programs.add_with_target("ahit", ShaderStage::AnyHit, SUBDIVIDED_AHIT, spirv);
            programs.add_with_target("miss", ShaderStage::Miss, SUBDIVIDED_MISS, spirv);
            programs.add_with_target("rgen", ShaderStage::RayGen, SUBDIVIDED_RGEN, spirv);
        }
    }

    fn create_instance<'a>(
        &self,
        context: &'a Context,
        binaries: &'a BinaryCollection,
    ) -> Result<Box<dyn TestInstance + 'a>, CtsError> {
        let properties = RayTracingProperties::query(context);
        let def = self.def;
        let required_allocations =
            BASE_ALLOCATIONS + ALLOCATIONS_PER_STRUCTURE * (1 + def.bottom_level_count());

        if properties.max_primitive_count < u64::from(def.squares) {
            return Err(CtsError::not_supported("Triangles required more than supported"));
        }
        if properties.max_geometry_count < 1 {
            return Err(CtsError::not_supported("Geometries required more than supported"));
        }
        if properties.max_instance_count < u64::from(def.bottom_level_count()) {
            return Err(CtsError::not_supported("Instances required more than supported"));
        }
        if context.limits().max_memory_allocation_count < required_allocations {
            return Err(CtsError::not_supported("Test requires more allocations allowed"));
        }

        Ok(Box::new(WatertightnessInstance {
            def,
            properties,
            context,
            binaries,
        }))
    }
}

struct WatertightnessInstance<'a> {
    def: CaseDef,
    properties: RayTracingProperties,
    context: &'a Context,
    binaries: &'a BinaryCollection,
}

impl WatertightnessInstance<'_> {
    fn geometries(&self) -> Vec<Vec<TriangleGeometry>> {
        match self.def.layout {
            Layout::Subdivided { seed } => {
                vec![vec![TriangleGeometry::new(subdivided_square(self.def.squares, seed))]]
            }
            Layout::ClosedFan { blas_per_triangle } => {
                let flags = vk::GeometryFlagsKHR::NO_DUPLICATE_ANY_HIT_INVOCATION;
                let triangles = closed_fan(self.def.squares);
                if blas_per_triangle {
                    triangles
                        .iter()
                        .map(|t| vec![TriangleGeometry::new(t.to_vec()).with_flags(flags)])
                        .collect()
                } else {
                    let vertices = triangles.iter().flatten().copied().collect();
                    vec![vec![TriangleGeometry::new(vertices).with_flags(flags)]]
                }
            }
        }
    }

    fn make_result_image(&self) -> Result<(ImageWithMemory, Unique<vk::ImageView>), CtsError> {
        let device = self.context.device();
        let (image_type, view_type) = if self.def.depth == 1 {
            (vk::ImageType::TYPE_2D, vk::ImageViewType::TYPE_2D)
        } else {
            (vk::ImageType::TYPE_3D, vk::ImageViewType::TYPE_3D)
        };
        let info = vk::ImageCreateInfo::default()
            .image_type(image_type)
            .format(vk::Format::R32_UINT)
            .extent(vk::Extent3D {
                width: self.def.width,
                height: self.def.height,
                depth: self.def.depth,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(
                vk::ImageUsageFlags::STORAGE
                    | vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST,
            )
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = ImageWithMemory::new(self.context.allocator(), &info, MemoryRequirement::ANY)?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.image())
            .view_type(view_type)
            .format(vk::Format::R32_UINT)
            .subresource_range(color_range());
        let view = unsafe { device.create_image_view(&view_info, None) }.vk_check("vkCreateImageView")?;
        Ok((image, Unique::new(device, view)))
    }

    fn run(&self) -> Result<Vec<u32>, CtsError> {
        let context = self.context;
        let device = context.device();
        let allocator = context.allocator();
        let loaders = RayTracingLoaders::new(context);

        let set_layout = DescriptorSetLayoutBuilder::new()
            .add_single_binding(vk::DescriptorType::STORAGE_IMAGE, ALL_RAY_TRACING_STAGES)
            .add_single_binding(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR, ALL_RAY_TRACING_STAGES)
            .build(device)?;
        let descriptor_pool = DescriptorPoolBuilder::new()
            .add_type(vk::DescriptorType::STORAGE_IMAGE, 1)
            .add_type(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR, 1)
            .build(device, vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET, 1)?;
        let set = allocate_descriptor_set(device, descriptor_pool.get(), set_layout.get())?;
        let pipeline_layout = make_pipeline_layout(device, &[set_layout.get()], &[])?;

        let raygen = self.binaries.create_module(device, "rgen")?;
        let miss = self.binaries.create_module(device, "miss")?;
        let any_hit = self.binaries.create_module(device, "ahit")?;
        let pipeline = make_ray_tracing_pipeline(
            device,
            &loaders.pipeline,
            pipeline_layout.get(),
            &RayTracingShaders {
                raygen: raygen.get(),
                miss: miss.get(),
                any_hit: Some(any_hit.get()),
                closest_hit: None,
            },
        )?;
        let tables = ShaderBindingTables::new(&loaders.pipeline, allocator, pipeline.get(), &self.properties)?;

        let (image, view) = self.make_result_image()?;
        let pixel_count = self.def.pixel_count() as u64;
        let readback = BufferWithMemory::host_visible(allocator, pixel_count * 4, vk::BufferUsageFlags::TRANSFER_DST)?;

        let cmd_pool = create_command_pool(
            device,
            context.universal_queue_family_index(),
            vk::CommandPoolCreateFlags::empty(),
        )?;
        let cmd = allocate_command_buffer(device, cmd_pool.get(), vk::CommandBufferLevel::PRIMARY)?;

        let clear = if self.def.is_closed_fan() { 0 } else { LEGACY_CLEAR };
        let clear_value = vk::ClearColorValue {
            uint32: [clear, clear, clear, 255],
        };

        begin_command_buffer(device, cmd)?;
        cmd_image_barrier(
            device,
            cmd,
            vk::PipelineStageFlags::TOP_OF_PIPE,
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
        unsafe {
            device.cmd_clear_color_image(
                cmd,
                image.image(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &clear_value,
                &[color_range()],
            )
        };
        cmd_image_barrier(
            device,
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::RAY_TRACING_SHADER_KHR,
            image_barrier(
                image.image(),
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::GENERAL,
                color_range(),
            ),
        );

        let bottom_levels = self
            .geometries()
            .iter()
            .map(|g| BottomLevelAccelerationStructure::build(&loaders.acceleration_structure, allocator, cmd, g))
            .collect::<Result<Vec<_>, _>>()?;
        let top_level =
            TopLevelAccelerationStructure::build(&loaders.acceleration_structure, allocator, cmd, &bottom_levels)?;
        debug!(
            "watertightness: {} bottom level structures, {} triangles",
            bottom_levels.len(),
            self.def.squares
        );

        let mut updates = DescriptorSetUpdateBuilder::new();
        updates
            .write_images(
                set,
                0,
                0,
                vk::DescriptorType::STORAGE_IMAGE,
                vec![vk::DescriptorImageInfo {
                    sampler: vk::Sampler::null(),
                    image_view: view.get(),
                    image_layout: vk::ImageLayout::GENERAL,
                }],
            )
            .write_acceleration_structures(set, 1, vec![top_level.handle()]);
        updates.update(device);

        unsafe {
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::RAY_TRACING_KHR,
                pipeline_layout.get(),
                0,
                &[set],
                &[],
            );
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::RAY_TRACING_KHR, pipeline.get());
        }
        tables.cmd_trace_rays(&loaders.pipeline, cmd, self.def.width, self.def.height, 1);

        cmd_memory_barrier(
            device,
            cmd,
            vk::PipelineStageFlags::RAY_TRACING_SHADER_KHR,
            vk::PipelineStageFlags::TRANSFER,
            memory_barrier(vk::AccessFlags::SHADER_WRITE, vk::AccessFlags::TRANSFER_READ),
        );
        let region = vk::BufferImageCopy::default()
            .image_subresource(color_layers())
            .image_extent(vk::Extent3D {
                width: self.def.width,
                height: self.def.height,
                depth: self.def.depth,
            });
        unsafe {
            device.cmd_copy_image_to_buffer(
                cmd,
                image.image(),
                vk::ImageLayout::GENERAL,
                readback.buffer(),
                &[region],
            )
        };
        cmd_memory_barrier(
            device,
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::HOST,
            memory_barrier(vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::HOST_READ),
        );
        end_command_buffer(device, cmd)?;
        submit_commands_and_wait(device, context.universal_queue(), cmd)?;

        readback.allocation().invalidate()?;
        Ok(readback
            .bytes()
            .chunks_exact(4)
            .take(pixel_count as usize)
            .map(bytemuck::pod_read_unaligned::<u32>)
            .collect())
    }
}

impl TestInstance for WatertightnessInstance<'_> {
    fn iterate(&mut self) -> Result<TestStatus, CtsError> {
        let values = self.run()?;
        Ok(match self.def.layout {
            Layout::Subdivided { .. } => verify_subdivided(&values, self.def.squares),
            Layout::ClosedFan { .. } => verify_closed_fan(&values),
        })
    }
}

pub fn create_tests() -> TestGroup<CaseBox> {
    let mut root: TestGroup<CaseBox> = TestGroup::new("watertightness", "Ray watertightness tests");

    for test_index in 0..LEGACY_GROUP_COUNT {
        let mut group: TestGroup<CaseBox> = TestGroup::new(test_index.to_string(), "");
        for squares in LEGACY_SIZES {
            group.add_case(
                squares.to_string(),
                Box::new(WatertightnessCase::new(CaseDef::subdivided(test_index, squares))),
            );
        }
        root.add_child(group);
    }

    for (name, blas_per_triangle) in [("closedFan", false), ("closedFan2", true)] {
        let mut group: TestGroup<CaseBox> = TestGroup::new(name, "");
        for edges in CLOSED_FAN_SIZES {
            group.add_case(
                edges.to_string(),
                Box::new(WatertightnessCase::new(CaseDef::closed_fan(edges, blas_per_triangle))),
            );
        }
        root.add_child(group);
    }

    root
}
