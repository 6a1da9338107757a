use std::ops::BitOr;
use std::sync::Arc;

use ash::vk;
use cts_core::CtsError;
use tracing::debug;

use crate::check::VkCheck;

/// What a test needs from an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRequirement(u32);

impl MemoryRequirement {
    pub const ANY: Self = Self(0);
    pub const HOST_VISIBLE: Self = Self(1);
    pub const DEVICE_ADDRESS: Self = Self(1 << 1);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for MemoryRequirement {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Pick the first memory type allowed by `type_bits` whose flags contain `flags`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..props.memory_type_count).find(|&i| {
        (type_bits & (1 << i)) != 0 && props.memory_types[i as usize].property_flags.contains(flags)
    })
}

/// One dedicated `vkAllocateMemory` per request; host-visible memory stays
/// mapped for the allocation's lifetime.
#[derive(Clone)]
pub struct SimpleAllocator {
    device: Arc<ash::Device>,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl SimpleAllocator {
    pub fn new(device: &Arc<ash::Device>, memory_properties: vk::PhysicalDeviceMemoryProperties) -> Self {
        Self {
            device: Arc::clone(device),
            memory_properties,
        }
    }

    pub fn device(&self) -> &Arc<ash::Device> {
        &self.device
    }

    pub fn allocate(
        &self,
        requirements: vk::MemoryRequirements,
        requirement: MemoryRequirement,
    ) -> Result<Allocation, CtsError> {
        let flags = if requirement.contains(MemoryRequirement::HOST_VISIBLE) {
            vk::MemoryPropertyFlags::HOST_VISIBLE
        } else {
            vk::MemoryPropertyFlags::empty()
        };
        let type_index = find_memory_type(&self.memory_properties, requirements.memory_type_bits, flags)
            .ok_or_else(|| {
                CtsError::not_supported(format!(
                    "no memory type matches bits 0x{:x} with {:?}",
                    requirements.memory_type_bits, flags
                ))
            })?;

        let mut flags_info =
            vk::MemoryAllocateFlagsInfo::default().flags(vk::MemoryAllocateFlags::DEVICE_ADDRESS);
        let mut alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(type_index);
        if requirement.contains(MemoryRequirement::DEVICE_ADDRESS) {
            alloc_info = alloc_info.push_next(&mut flags_info);
        }

        let memory = unsafe { self.device.allocate_memory(&alloc_info, None) }
            .vk_check("vkAllocateMemory")?;

        let host_ptr = if requirement.contains(MemoryRequirement::HOST_VISIBLE) {
            match unsafe {
                self.device
                    .map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
            } {
                Ok(ptr) => ptr as *mut u8,
                Err(e) => {
                    unsafe { self.device.free_memory(memory, None) };
                    return Err(crate::check::vk_error("vkMapMemory", e));
                }
            }
        } else {
            std::ptr::null_mut()
        };

        debug!(
            "allocated {} bytes from memory type {} (mapped: {})",
            requirements.size,
            type_index,
            !host_ptr.is_null()
        );

        Ok(Allocation {
            device: Arc::clone(&self.device),
            memory,
            size: requirements.size,
            host_ptr,
        })
    }
}

/// A device memory allocation, freed on drop.
pub struct Allocation {
    device: Arc<ash::Device>,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    host_ptr: *mut u8,
}

// SAFETY: the mapping is owned exclusively by this allocation; access goes
// through &self / &mut self.
unsafe impl Send for Allocation {}
unsafe impl Sync for Allocation {}

impl Allocation {
    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn is_mapped(&self) -> bool {
        !self.host_ptr.is_null()
    }

    /// Mapped bytes; empty when the allocation is not host visible.
    pub fn host_bytes(&self) -> &[u8] {
        if self.host_ptr.is_null() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.host_ptr, self.size as usize) }
    }

    pub fn host_bytes_mut(&mut self) -> &mut [u8] {
        if self.host_ptr.is_null() {
            return &mut [];
        }
        unsafe { std::slice::from_raw_parts_mut(self.host_ptr, self.size as usize) }
    }

    /// Make host writes visible to the device.
    pub fn flush(&self) -> Result<(), CtsError> {
        let range = vk::MappedMemoryRange::default()
            .memory(self.memory)
            .offset(0)
            .size(vk::WHOLE_SIZE);
        unsafe { self.device.flush_mapped_memory_ranges(&[range]) }
            .vk_check("vkFlushMappedMemoryRanges")
    }

    /// Make device writes visible to the host.
    pub fn invalidate(&self) -> Result<(), CtsError> {
        let range = vk::MappedMemoryRange::default()
            .memory(self.memory)
            .offset(0)
            .size(vk::WHOLE_SIZE);
        unsafe { self.device.invalidate_mapped_memory_ranges(&[range]) }
            .vk_check("vkInvalidateMappedMemoryRanges")
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        unsafe { self.device.free_memory(self.memory, None) };
    }
}

// ── Buffers and images ──────────────────────────────────────────────────────

pub struct BufferWithMemory {
    buffer: vk::Buffer,
    allocation: Allocation,
    size: vk::DeviceSize,
}

impl BufferWithMemory {
    pub fn new(
        allocator: &SimpleAllocator,
        create_info: &vk::BufferCreateInfo,
        requirement: MemoryRequirement,
    ) -> Result<Self, CtsError> {
        let device = allocator.device();
        let buffer = unsafe { device.create_buffer(create_info, None) }.vk_check("vkCreateBuffer")?;
        let reqs = unsafe { device.get_buffer_memory_requirements(buffer) };

        let bound = allocator.allocate(reqs, requirement).and_then(|allocation| {
            unsafe { device.bind_buffer_memory(buffer, allocation.memory(), 0) }
                .vk_check("vkBindBufferMemory")?;
            Ok(allocation)
        });
        match bound {
            Ok(allocation) => Ok(Self {
                buffer,
                allocation,
                size: create_info.size,
            }),
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                Err(e)
            }
        }
    }

    /// Host-visible buffer of `size` bytes with the given usage.
    pub fn host_visible(
        allocator: &SimpleAllocator,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<Self, CtsError> {
        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        Self::new(allocator, &info, MemoryRequirement::HOST_VISIBLE)
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn allocation(&self) -> &Allocation {
        &self.allocation
    }

    pub fn allocation_mut(&mut self) -> &mut Allocation {
        &mut self.allocation
    }

    /// The first `size` mapped bytes of the buffer.
    pub fn bytes(&self) -> &[u8] {
        let bytes = self.allocation.host_bytes();
        &bytes[..bytes.len().min(self.size as usize)]
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        let size = self.size as usize;
        let bytes = self.allocation.host_bytes_mut();
        let len = bytes.len().min(size);
        &mut bytes[..len]
    }

    pub fn device_address(&self) -> vk::DeviceAddress {
        let info = vk::BufferDeviceAddressInfo::default().buffer(self.buffer);
        unsafe { self.allocation.device.get_buffer_device_address(&info) }
    }
}

impl Drop for BufferWithMemory {
    fn drop(&mut self) {
        unsafe { self.allocation.device.destroy_buffer(self.buffer, None) };
    }
}

pub struct ImageWithMemory {
    image: vk::Image,
    allocation: Allocation,
}

impl ImageWithMemory {
    pub fn new(
        allocator: &SimpleAllocator,
        create_info: &vk::ImageCreateInfo,
        requirement: MemoryRequirement,
    ) -> Result<Self, CtsError> {
        let device = allocator.device();
        let image = unsafe { device.create_image(create_info, None) }.vk_check("vkCreateImage")?;
        let reqs = unsafe { device.get_image_memory_requirements(image) };

        let bound = allocator.allocate(reqs, requirement).and_then(|allocation| {
            unsafe { device.bind_image_memory(image, allocation.memory(), 0) }
                .vk_check("vkBindImageMemory")?;
            Ok(allocation)
        });
        match bound {
            Ok(allocation) => Ok(Self { image, allocation }),
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                Err(e)
            }
        }
    }

    pub fn image(&self) -> vk::Image {
        self.image
    }

    pub fn allocation(&self) -> &Allocation {
        &self.allocation
    }
}

impl Drop for ImageWithMemory {
    fn drop(&mut self) {
        unsafe { self.allocation.device.destroy_image(self.image, None) };
    }
}
