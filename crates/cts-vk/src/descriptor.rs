//! Descriptor set layout, pool and update builders.

use std::sync::Arc;

use ash::vk;
use cts_core::CtsError;

use crate::check::VkCheck;
use crate::handles::Unique;

/// Bindings are numbered in insertion order.
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorSetLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_single_binding(self, ty: vk::DescriptorType, stages: vk::ShaderStageFlags) -> Self {
        self.add_array_binding(ty, 1, stages)
    }

    /// For inline uniform blocks `count` is the block size in bytes.
    pub fn add_array_binding(
        mut self,
        ty: vk::DescriptorType,
        count: u32,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        let binding = self.bindings.len() as u32;
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(ty)
                .descriptor_count(count)
                .stage_flags(stages),
        );
        self
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn build(&self, device: &Arc<ash::Device>) -> Result<Unique<vk::DescriptorSetLayout>, CtsError> {
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);
        let layout = unsafe { device.create_descriptor_set_layout(&info, None) }
            .vk_check("vkCreateDescriptorSetLayout")?;
        Ok(Unique::new(device, layout))
    }
}

#[derive(Default)]
pub struct DescriptorPoolBuilder {
    sizes: Vec<vk::DescriptorPoolSize>,
    inline_uniform_block_bindings: u32,
}

impl DescriptorPoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulates into an existing entry of the same type.
    pub fn add_type(mut self, ty: vk::DescriptorType, count: u32) -> Self {
        if count == 0 {
            return self;
        }
        match self.sizes.iter_mut().find(|s| s.ty == ty) {
            Some(size) => size.descriptor_count += count,
            None => self.sizes.push(vk::DescriptorPoolSize {
                ty,
                descriptor_count: count,
            }),
        }
        self
    }

    pub fn inline_uniform_block_bindings(mut self, count: u32) -> Self {
        self.inline_uniform_block_bindings = count;
        self
    }

    pub fn build(
        &self,
        device: &Arc<ash::Device>,
        flags: vk::DescriptorPoolCreateFlags,
        max_sets: u32,
    ) -> Result<Unique<vk::DescriptorPool>, CtsError> {
        let mut iub_info = vk::DescriptorPoolInlineUniformBlockCreateInfo::default()
            .max_inline_uniform_block_bindings(self.inline_uniform_block_bindings);
        let mut info = vk::DescriptorPoolCreateInfo::default()
            .flags(flags)
            .max_sets(max_sets)
            .pool_sizes(&self.sizes);
        if self.inline_uniform_block_bindings > 0 {
            info = info.push_next(&mut iub_info);
        }
        let pool = unsafe { device.create_descriptor_pool(&info, None) }
            .vk_check("vkCreateDescriptorPool")?;
        Ok(Unique::new(device, pool))
    }
}

pub fn allocate_descriptor_set(
    device: &ash::Device,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
) -> Result<vk::DescriptorSet, CtsError> {
    let layouts = [layout];
    let info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(pool)
        .set_layouts(&layouts);
    let sets = unsafe { device.allocate_descriptor_sets(&info) }
        .vk_check("vkAllocateDescriptorSets")?;
    sets.into_iter()
        .next()
        .ok_or_else(|| CtsError::fatal("vkAllocateDescriptorSets returned no sets"))
}

// ── Updates ─────────────────────────────────────────────────────────────────

enum WriteData {
    Buffers(Vec<vk::DescriptorBufferInfo>),
    Images(Vec<vk::DescriptorImageInfo>),
    TexelBuffers(Vec<vk::BufferView>),
    InlineUniformBlock(Vec<u8>),
    AccelerationStructures(Vec<vk::AccelerationStructureKHR>),
}

struct PendingWrite {
    set: vk::DescriptorSet,
    binding: u32,
    array_element: u32,
    ty: vk::DescriptorType,
    data: WriteData,
}

/// Collects writes and copies and applies them in one
/// `vkUpdateDescriptorSets` call.
#[derive(Default)]
pub struct DescriptorSetUpdateBuilder {
    writes: Vec<PendingWrite>,
    copies: Vec<vk::CopyDescriptorSet<'static>>,
}

impl DescriptorSetUpdateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_buffers(
        &mut self,
        set: vk::DescriptorSet,
        binding: u32,
        array_element: u32,
        ty: vk::DescriptorType,
        infos: Vec<vk::DescriptorBufferInfo>,
    ) -> &mut Self {
        self.push(set, binding, array_element, ty, WriteData::Buffers(infos))
    }

    pub fn write_images(
        &mut self,
        set: vk::DescriptorSet,
        binding: u32,
        array_element: u32,
        ty: vk::DescriptorType,
        infos: Vec<vk::DescriptorImageInfo>,
    ) -> &mut Self {
        self.push(set, binding, array_element, ty, WriteData::Images(infos))
    }

    pub fn write_texel_buffers(
        &mut self,
        set: vk::DescriptorSet,
        binding: u32,
        array_element: u32,
        ty: vk::DescriptorType,
        views: Vec<vk::BufferView>,
    ) -> &mut Self {
        self.push(set, binding, array_element, ty, WriteData::TexelBuffers(views))
    }

    /// `byte_offset` and the length of `data` are in bytes.
    pub fn write_inline_uniform_block(
        &mut self,
        set: vk::DescriptorSet,
        binding: u32,
        byte_offset: u32,
        data: Vec<u8>,
    ) -> &mut Self {
        self.push(
            set,
            binding,
            byte_offset,
            vk::DescriptorType::INLINE_UNIFORM_BLOCK,
            WriteData::InlineUniformBlock(data),
        )
    }

    pub fn write_acceleration_structures(
        &mut self,
        set: vk::DescriptorSet,
        binding: u32,
        structures: Vec<vk::AccelerationStructureKHR>,
    ) -> &mut Self {
        self.push(
            set,
            binding,
            0,
            vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
            WriteData::AccelerationStructures(structures),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn copy(
        &mut self,
        src_set: vk::DescriptorSet,
        src_binding: u32,
        src_array_element: u32,
        dst_set: vk::DescriptorSet,
        dst_binding: u32,
        dst_array_element: u32,
        count: u32,
    ) -> &mut Self {
        self.copies.push(
            vk::CopyDescriptorSet::default()
                .src_set(src_set)
                .src_binding(src_binding)
                .src_array_element(src_array_element)
                .dst_set(dst_set)
                .dst_binding(dst_binding)
                .dst_array_element(dst_array_element)
                .descriptor_count(count),
        );
        self
    }

    fn push(
        &mut self,
        set: vk::DescriptorSet,
        binding: u32,
        array_element: u32,
        ty: vk::DescriptorType,
        data: WriteData,
    ) -> &mut Self {
        self.writes.push(PendingWrite {
            set,
            binding,
            array_element,
            ty,
            data,
        });
        self
    }

    pub fn update(&self, device: &ash::Device) {
        let mut iub_infos: Vec<vk::WriteDescriptorSetInlineUniformBlock> = self
            .writes
            .iter()
            .filter_map(|w| match &w.data {
                WriteData::InlineUniformBlock(bytes) => {
                    Some(vk::WriteDescriptorSetInlineUniformBlock::default().data(bytes))
                }
                _ => None,
            })
            .collect();
        let mut as_infos: Vec<vk::WriteDescriptorSetAccelerationStructureKHR> = self
            .writes
            .iter()
            .filter_map(|w| match &w.data {
                WriteData::AccelerationStructures(handles) => Some(
                    vk::WriteDescriptorSetAccelerationStructureKHR::default()
                        .acceleration_structures(handles),
                ),
                _ => None,
            })
            .collect();

        let mut iub_iter = iub_infos.iter_mut();
        let mut as_iter = as_infos.iter_mut();
        let mut writes = Vec::with_capacity(self.writes.len());
        for w in &self.writes {
            let base = vk::WriteDescriptorSet::default()
                .dst_set(w.set)
                .dst_binding(w.binding)
                .dst_array_element(w.array_element)
                .descriptor_type(w.ty);
            let write = match &w.data {
                WriteData::Buffers(infos) => base.buffer_info(infos),
                WriteData::Images(infos) => base.image_info(infos),
                WriteData::TexelBuffers(views) => base.texel_buffer_view(views),
                WriteData::InlineUniformBlock(bytes) => match iub_iter.next() {
                    Some(ext) => base.descriptor_count(bytes.len() as u32).push_next(ext),
                    None => continue,
                },
                WriteData::AccelerationStructures(handles) => match as_iter.next() {
                    Some(ext) => base.descriptor_count(handles.len() as u32).push_next(ext),
                    None => continue,
                },
            };
            writes.push(write);
        }

        unsafe { device.update_descriptor_sets(&writes, &self.copies) };
    }
}
