use std::sync::Arc;

use ash::khr::{acceleration_structure, ray_tracing_pipeline};
use ash::vk;
use cts_core::CtsError;

use crate::check::{vk_error, VkCheck};
use crate::context::Context;
use crate::handles::Unique;
use crate::memory::{BufferWithMemory, MemoryRequirement, SimpleAllocator};

/// Limits from `VkPhysicalDeviceAccelerationStructurePropertiesKHR` and
/// `VkPhysicalDeviceRayTracingPipelinePropertiesKHR`.
#[derive(Debug, Clone, Copy)]
pub struct RayTracingProperties {
    pub max_geometry_count: u64,
    pub max_instance_count: u64,
    pub max_primitive_count: u64,
    pub shader_group_handle_size: u32,
    pub shader_group_handle_alignment: u32,
    pub shader_group_base_alignment: u32,
}

impl RayTracingProperties {
    pub fn query(context: &Context) -> Self {
        let mut accel = vk::PhysicalDeviceAccelerationStructurePropertiesKHR::default();
        let mut pipeline = vk::PhysicalDeviceRayTracingPipelinePropertiesKHR::default();
        let mut props2 = vk::PhysicalDeviceProperties2::default()
            .push_next(&mut accel)
            .push_next(&mut pipeline);
        unsafe {
            context
                .instance()
                .get_physical_device_properties2(context.physical_device(), &mut props2)
        };
        Self {
            max_geometry_count: accel.max_geometry_count,
            max_instance_count: accel.max_instance_count,
            max_primitive_count: accel.max_primitive_count,
            shader_group_handle_size: pipeline.shader_group_handle_size,
            shader_group_handle_alignment: pipeline.shader_group_handle_alignment,
            shader_group_base_alignment: pipeline.shader_group_base_alignment,
        }
    }
}

/// Extension loaders needed to build structures and trace rays.
pub struct RayTracingLoaders {
    pub acceleration_structure: acceleration_structure::Device,
    pub pipeline: ray_tracing_pipeline::Device,
}

impl RayTracingLoaders {
    pub fn new(context: &Context) -> Self {
        Self {
            acceleration_structure: acceleration_structure::Device::new(
                context.instance(),
                context.device(),
            ),
            pipeline: ray_tracing_pipeline::Device::new(context.instance(), context.device()),
        }
    }
}

/// Shader modules for the three groups of a simple ray tracing pipeline:
/// raygen is group 0, miss is group 1 and the hit group is group 2.
pub struct RayTracingShaders {
    pub raygen: vk::ShaderModule,
    pub miss: vk::ShaderModule,
    pub any_hit: Option<vk::ShaderModule>,
    pub closest_hit: Option<vk::ShaderModule>,
}

pub const RAYGEN_GROUP: u32 = 0;
pub const MISS_GROUP: u32 = 1;
pub const HIT_GROUP: u32 = 2;
pub const GROUP_COUNT: u32 = 3;

pub fn make_ray_tracing_pipeline(
    device: &Arc<ash::Device>,
    loader: &ray_tracing_pipeline::Device,
    layout: vk::PipelineLayout,
    shaders: &RayTracingShaders,
) -> Result<Unique<vk::Pipeline>, CtsError> {
    let mut stages = vec![
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::RAYGEN_KHR)
            .module(shaders.raygen)
            .name(c"main"),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::MISS_KHR)
            .module(shaders.miss)
            .name(c"main"),
    ];
    let mut any_hit = vk::SHADER_UNUSED_KHR;
    let mut closest_hit = vk::SHADER_UNUSED_KHR;
    if let Some(module) = shaders.any_hit {
        any_hit = stages.len() as u32;
        stages.push(
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::ANY_HIT_KHR)
                .module(module)
                .name(c"main"),
        );
    }
    if let Some(module) = shaders.closest_hit {
        closest_hit = stages.len() as u32;
        stages.push(
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::CLOSEST_HIT_KHR)
                .module(module)
                .name(c"main"),
        );
    }

    let general = |shader: u32| {
        vk::RayTracingShaderGroupCreateInfoKHR::default()
            .ty(vk::RayTracingShaderGroupTypeKHR::GENERAL)
            .general_shader(shader)
            .closest_hit_shader(vk::SHADER_UNUSED_KHR)
            .any_hit_shader(vk::SHADER_UNUSED_KHR)
            .intersection_shader(vk::SHADER_UNUSED_KHR)
    };
    let groups = [
        general(0),
        general(1),
        vk::RayTracingShaderGroupCreateInfoKHR::default()
            .ty(vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP)
            .general_shader(vk::SHADER_UNUSED_KHR)
            .closest_hit_shader(closest_hit)
            .any_hit_shader(any_hit)
            .intersection_shader(vk::SHADER_UNUSED_KHR),
    ];

    let info = vk::RayTracingPipelineCreateInfoKHR::default()
        .stages(&stages)
        .groups(&groups)
        .max_pipeline_ray_recursion_depth(1)
        .layout(layout);
    let result = unsafe {
        loader.create_ray_tracing_pipelines(
            vk::DeferredOperationKHR::null(),
            vk::PipelineCache::null(),
            &[info],
            None,
        )
    };
    match result {
        Ok(pipelines) => pipelines
            .into_iter()
            .next()
            .map(|p| Unique::new(device, p))
            .ok_or_else(|| CtsError::fatal("vkCreateRayTracingPipelinesKHR returned no pipelines")),
        Err((pipelines, e)) => {
            for p in pipelines.into_iter().filter(|p| *p != vk::Pipeline::null()) {
                unsafe { device.destroy_pipeline(p, None) };
            }
            Err(vk_error("vkCreateRayTracingPipelinesKHR", e))
        }
    }
}

/// One shader binding table buffer per group, each holding a single handle.
pub struct ShaderBindingTables {
    buffers: Vec<BufferWithMemory>,
    regions: Vec<vk::StridedDeviceAddressRegionKHR>,
}

impl ShaderBindingTables {
    pub fn new(
        loader: &ray_tracing_pipeline::Device,
        allocator: &SimpleAllocator,
        pipeline: vk::Pipeline,
        properties: &RayTracingProperties,
    ) -> Result<Self, CtsError> {
        let handle_size = properties.shader_group_handle_size as usize;
        let handles = unsafe {
            loader.get_ray_tracing_shader_group_handles(
                pipeline,
                0,
                GROUP_COUNT,
                GROUP_COUNT as usize * handle_size,
            )
        }
        .vk_check("vkGetRayTracingShaderGroupHandlesKHR")?;

        let stride = align_up(
            properties.shader_group_handle_size as u64,
            properties.shader_group_handle_alignment.max(1) as u64,
        );
        let mut buffers = Vec::with_capacity(GROUP_COUNT as usize);
        let mut regions = Vec::with_capacity(GROUP_COUNT as usize);
        for group in 0..GROUP_COUNT as usize {
            let size = align_up(stride, properties.shader_group_base_alignment.max(1) as u64);
            let info = vk::BufferCreateInfo::default()
                .size(size)
                .usage(
                    vk::BufferUsageFlags::SHADER_BINDING_TABLE_KHR
                        | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
                )
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            let mut buffer = BufferWithMemory::new(
                allocator,
                &info,
                MemoryRequirement::HOST_VISIBLE | MemoryRequirement::DEVICE_ADDRESS,
            )?;
            let src = &handles[group * handle_size..(group + 1) * handle_size];
            buffer.bytes_mut()[..handle_size].copy_from_slice(src);
            buffer.allocation().flush()?;

            regions.push(
                vk::StridedDeviceAddressRegionKHR::default()
                    .device_address(buffer.device_address())
                    .stride(stride)
                    .size(stride),
            );
            buffers.push(buffer);
        }
        Ok(Self { buffers, regions })
    }

    pub fn region(&self, group: u32) -> vk::StridedDeviceAddressRegionKHR {
        self.regions[group as usize]
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn cmd_trace_rays(
        &self,
        loader: &ray_tracing_pipeline::Device,
        cmd: vk::CommandBuffer,
        width: u32,
        height: u32,
        depth: u32,
    ) {
        let callable = vk::StridedDeviceAddressRegionKHR::default();
        unsafe {
            loader.cmd_trace_rays(
                cmd,
                &self.region(RAYGEN_GROUP),
                &self.region(MISS_GROUP),
                &self.region(HIT_GROUP),
                &callable,
                width,
                height,
                depth,
            )
        };
    }
}

pub fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}
