//! Bottom and top level acceleration structures built on the device.
//!
//! Builds are recorded into a caller-provided command buffer; the returned
//! objects keep their input and scratch buffers alive until dropped, so they
//! must outlive the submission.

use ash::khr::acceleration_structure;
use ash::vk;
use cts_core::CtsError;
use tracing::debug;

use crate::check::VkCheck;
use crate::command::{cmd_memory_barrier, memory_barrier};
use crate::memory::{BufferWithMemory, MemoryRequirement, SimpleAllocator};

/// One triangle-list geometry: every three vertices form a triangle.
#[derive(Debug, Clone)]
pub struct TriangleGeometry {
    pub vertices: Vec<[f32; 3]>,
    pub flags: vk::GeometryFlagsKHR,
}

impl TriangleGeometry {
    pub fn new(vertices: Vec<[f32; 3]>) -> Self {
        Self {
            vertices,
            flags: vk::GeometryFlagsKHR::empty(),
        }
    }

    pub fn with_flags(mut self, flags: vk::GeometryFlagsKHR) -> Self {
        self.flags = flags;
        self
    }

    pub fn triangle_count(&self) -> u32 {
        (self.vertices.len() / 3) as u32
    }
}

struct AccelerationStructure {
    loader: acceleration_structure::Device,
    handle: vk::AccelerationStructureKHR,
    _storage: BufferWithMemory,
}

impl AccelerationStructure {
    fn create(
        loader: &acceleration_structure::Device,
        allocator: &SimpleAllocator,
        ty: vk::AccelerationStructureTypeKHR,
        size: vk::DeviceSize,
    ) -> Result<Self, CtsError> {
        let storage = device_address_buffer(
            allocator,
            size,
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR,
            MemoryRequirement::ANY,
        )?;
        let info = vk::AccelerationStructureCreateInfoKHR::default()
            .buffer(storage.buffer())
            .size(size)
            .ty(ty);
        let handle = unsafe { loader.create_acceleration_structure(&info, None) }
            .vk_check("vkCreateAccelerationStructureKHR")?;
        Ok(Self {
            loader: loader.clone(),
            handle,
            _storage: storage,
        })
    }

    fn device_address(&self) -> vk::DeviceAddress {
        let info = vk::AccelerationStructureDeviceAddressInfoKHR::default()
            .acceleration_structure(self.handle);
        unsafe { self.loader.get_acceleration_structure_device_address(&info) }
    }
}

impl Drop for AccelerationStructure {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_acceleration_structure(self.handle, None) };
    }
}

fn device_address_buffer(
    allocator: &SimpleAllocator,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    requirement: MemoryRequirement,
) -> Result<BufferWithMemory, CtsError> {
    let info = vk::BufferCreateInfo::default()
        .size(size.max(4))
        .usage(usage | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);
    BufferWithMemory::new(allocator, &info, requirement | MemoryRequirement::DEVICE_ADDRESS)
}

fn build_sizes(
    loader: &acceleration_structure::Device,
    device: &ash::Device,
    info: &vk::AccelerationStructureBuildGeometryInfoKHR,
    max_primitive_counts: &[u32],
) -> vk::AccelerationStructureBuildSizesInfoKHR<'static> {
    let mut out = vk::AccelerationStructureBuildSizesInfoKHR::default();
    unsafe {
        (loader.fp().get_acceleration_structure_build_sizes_khr)(
            device.handle(),
            vk::AccelerationStructureBuildTypeKHR::DEVICE,
            info,
            max_primitive_counts.as_ptr(),
            &mut out,
        )
    };
    out
}

fn cmd_build(
    loader: &acceleration_structure::Device,
    cmd: vk::CommandBuffer,
    info: &vk::AccelerationStructureBuildGeometryInfoKHR,
    ranges: &[vk::AccelerationStructureBuildRangeInfoKHR],
) {
    let range_ptrs = [ranges.as_ptr()];
    unsafe {
        (loader.fp().cmd_build_acceleration_structures_khr)(
            cmd,
            1,
            info,
            range_ptrs.as_ptr(),
        )
    };
}

/// Later builds and ray tracing shaders must see the finished structure.
fn cmd_build_barrier(device: &ash::Device, cmd: vk::CommandBuffer) {
    cmd_memory_barrier(
        device,
        cmd,
        vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_KHR,
        vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_KHR
            | vk::PipelineStageFlags::RAY_TRACING_SHADER_KHR,
        memory_barrier(
            vk::AccessFlags::ACCELERATION_STRUCTURE_WRITE_KHR,
            vk::AccessFlags::ACCELERATION_STRUCTURE_READ_KHR,
        ),
    );
}

fn host_buffer_with<T: bytemuck::Pod>(
    allocator: &SimpleAllocator,
    data: &[T],
) -> Result<BufferWithMemory, CtsError> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    let mut buffer = device_address_buffer(
        allocator,
        bytes.len() as vk::DeviceSize,
        vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR,
        MemoryRequirement::HOST_VISIBLE,
    )?;
    buffer.bytes_mut()[..bytes.len()].copy_from_slice(bytes);
    buffer.allocation().flush()?;
    Ok(buffer)
}

// ── Bottom level ────────────────────────────────────────────────────────────

pub struct BottomLevelAccelerationStructure {
    structure: AccelerationStructure,
    _vertex_buffers: Vec<BufferWithMemory>,
    _scratch: BufferWithMemory,
}

impl BottomLevelAccelerationStructure {
    /// Record a build of one BLAS containing `geometries`.
    pub fn build(
        loader: &acceleration_structure::Device,
        allocator: &SimpleAllocator,
        cmd: vk::CommandBuffer,
        geometries: &[TriangleGeometry],
    ) -> Result<Self, CtsError> {
        let device = allocator.device();

        let vertex_buffers = geometries
            .iter()
            .map(|g| host_buffer_with(allocator, &g.vertices))
            .collect::<Result<Vec<_>, _>>()?;

        let vk_geometries: Vec<vk::AccelerationStructureGeometryKHR> = geometries
            .iter()
            .zip(&vertex_buffers)
            .map(|(g, buffer)| {
                let triangles = vk::AccelerationStructureGeometryTrianglesDataKHR::default()
                    .vertex_format(vk::Format::R32G32B32_SFLOAT)
                    .vertex_data(vk::DeviceOrHostAddressConstKHR {
                        device_address: buffer.device_address(),
                    })
                    .vertex_stride(std::mem::size_of::<[f32; 3]>() as vk::DeviceSize)
                    .max_vertex(g.vertices.len().saturating_sub(1) as u32)
                    .index_type(vk::IndexType::NONE_KHR);
                vk::AccelerationStructureGeometryKHR::default()
                    .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
                    .geometry(vk::AccelerationStructureGeometryDataKHR { triangles })
                    .flags(g.flags)
            })
            .collect();
        let counts: Vec<u32> = geometries.iter().map(|g| g.triangle_count()).collect();
        let ranges: Vec<vk::AccelerationStructureBuildRangeInfoKHR> = counts
            .iter()
            .map(|&c| vk::AccelerationStructureBuildRangeInfoKHR::default().primitive_count(c))
            .collect();

        let info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(&vk_geometries);
        let sizes = build_sizes(loader, device, &info, &counts);

        let structure = AccelerationStructure::create(
            loader,
            allocator,
            vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
            sizes.acceleration_structure_size,
        )?;
        let scratch = device_address_buffer(
            allocator,
            sizes.build_scratch_size,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            MemoryRequirement::ANY,
        )?;

        let info = info
            .dst_acceleration_structure(structure.handle)
            .scratch_data(vk::DeviceOrHostAddressKHR {
                device_address: scratch.device_address(),
            });
        cmd_build(loader, cmd, &info, &ranges);
        cmd_build_barrier(device, cmd);
        debug!(
            "BLAS recorded: {} geometries, {} triangles",
            geometries.len(),
            counts.iter().sum::<u32>()
        );

        Ok(Self {
            structure,
            _vertex_buffers: vertex_buffers,
            _scratch: scratch,
        })
    }

    pub fn handle(&self) -> vk::AccelerationStructureKHR {
        self.structure.handle
    }

    pub fn device_address(&self) -> vk::DeviceAddress {
        self.structure.device_address()
    }
}

// ── Top level ───────────────────────────────────────────────────────────────

const IDENTITY: vk::TransformMatrixKHR = vk::TransformMatrixKHR {
    matrix: [1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
};

pub struct TopLevelAccelerationStructure {
    structure: AccelerationStructure,
    _instances: BufferWithMemory,
    _scratch: BufferWithMemory,
}

impl TopLevelAccelerationStructure {
    /// Record a build of a TLAS with one identity-transformed instance per BLAS.
    pub fn build(
        loader: &acceleration_structure::Device,
        allocator: &SimpleAllocator,
        cmd: vk::CommandBuffer,
        bottom_levels: &[BottomLevelAccelerationStructure],
    ) -> Result<Self, CtsError> {
        let device = allocator.device();
        let flags = vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE.as_raw() as u8;

        let instances: Vec<vk::AccelerationStructureInstanceKHR> = bottom_levels
            .iter()
            .map(|blas| vk::AccelerationStructureInstanceKHR {
                transform: IDENTITY,
                instance_custom_index_and_mask: vk::Packed24_8::new(0, 0xff),
                instance_shader_binding_table_record_offset_and_flags: vk::Packed24_8::new(
                    0, flags,
                ),
                acceleration_structure_reference: vk::AccelerationStructureReferenceKHR {
                    device_handle: blas.device_address(),
                },
            })
            .collect();

        let byte_len = std::mem::size_of_val(instances.as_slice());
        let mut instance_buffer = device_address_buffer(
            allocator,
            byte_len as vk::DeviceSize,
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR,
            MemoryRequirement::HOST_VISIBLE,
        )?;
        // SAFETY: AccelerationStructureInstanceKHR is a repr(C) plain-data struct.
        let bytes = unsafe { std::slice::from_raw_parts(instances.as_ptr() as *const u8, byte_len) };
        instance_buffer.bytes_mut()[..byte_len].copy_from_slice(bytes);
        instance_buffer.allocation().flush()?;

        let instances_data = vk::AccelerationStructureGeometryInstancesDataKHR::default()
            .array_of_pointers(false)
            .data(vk::DeviceOrHostAddressConstKHR {
                device_address: instance_buffer.device_address(),
            });
        let geometry = vk::AccelerationStructureGeometryKHR::default()
            .geometry_type(vk::GeometryTypeKHR::INSTANCES)
            .geometry(vk::AccelerationStructureGeometryDataKHR {
                instances: instances_data,
            });
        let geometries = [geometry];
        let count = instances.len() as u32;

        let info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(&geometries);
        let sizes = build_sizes(loader, device, &info, &[count]);

        let structure = AccelerationStructure::create(
            loader,
            allocator,
            vk::AccelerationStructureTypeKHR::TOP_LEVEL,
            sizes.acceleration_structure_size,
        )?;
        let scratch = device_address_buffer(
            allocator,
            sizes.build_scratch_size,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            MemoryRequirement::ANY,
        )?;

        let info = info
            .dst_acceleration_structure(structure.handle)
            .scratch_data(vk::DeviceOrHostAddressKHR {
                device_address: scratch.device_address(),
            });
        let ranges = [vk::AccelerationStructureBuildRangeInfoKHR::default().primitive_count(count)];
        cmd_build(loader, cmd, &info, &ranges);
        cmd_build_barrier(device, cmd);
        debug!("TLAS recorded: {} instances", count);

        Ok(Self {
            structure,
            _instances: instance_buffer,
            _scratch: scratch,
        })
    }

    pub fn handle(&self) -> vk::AccelerationStructureKHR {
        self.structure.handle
    }
}
