//! Host-side model of descriptor sets, writes and copies.
//!
//! Every descriptor carries the values the shader is expected to read back.
//! Copies are applied to the model as they are recorded, so the generated
//! GLSL always checks the post-copy state.

use ash::vk;
use cts_core::CtsError;

/// Starting point for descriptor ids; keeps reference values away from 0.
pub const FIRST_DESCRIPTOR_ID: u32 = 0xabc;
/// Bytes per inline uniform block element (one `int` padded by std140).
pub const IUB_ELEMENT_SIZE: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineType {
    Compute,
    Graphics,
}

impl PipelineType {
    pub fn shader_stage(self) -> vk::ShaderStageFlags {
        match self {
            PipelineType::Compute => vk::ShaderStageFlags::COMPUTE,
            PipelineType::Graphics => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    pub fn bind_point(self) -> vk::PipelineBindPoint {
        match self {
            PipelineType::Compute => vk::PipelineBindPoint::COMPUTE,
            PipelineType::Graphics => vk::PipelineBindPoint::GRAPHICS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    UniformBuffer,
    UniformBufferDynamic,
    StorageBuffer,
    StorageBufferDynamic,
    UniformTexelBuffer,
    StorageTexelBuffer,
    InlineUniformBlock,
    CombinedImageSampler,
    SampledImage,
    Sampler,
    StorageImage,
    InputAttachment,
}

impl DescriptorKind {
    pub fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            DescriptorKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorKind::UniformBufferDynamic => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            DescriptorKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            DescriptorKind::StorageBufferDynamic => vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
            DescriptorKind::UniformTexelBuffer => vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
            DescriptorKind::StorageTexelBuffer => vk::DescriptorType::STORAGE_TEXEL_BUFFER,
            DescriptorKind::InlineUniformBlock => vk::DescriptorType::INLINE_UNIFORM_BLOCK,
            DescriptorKind::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            DescriptorKind::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
            DescriptorKind::Sampler => vk::DescriptorType::SAMPLER,
            DescriptorKind::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
            DescriptorKind::InputAttachment => vk::DescriptorType::INPUT_ATTACHMENT,
        }
    }

    pub fn is_dynamic(self) -> bool {
        matches!(
            self,
            DescriptorKind::UniformBufferDynamic | DescriptorKind::StorageBufferDynamic
        )
    }

    pub fn is_buffer(self) -> bool {
        matches!(
            self,
            DescriptorKind::UniformBuffer
                | DescriptorKind::UniformBufferDynamic
                | DescriptorKind::StorageBuffer
                | DescriptorKind::StorageBufferDynamic
                | DescriptorKind::UniformTexelBuffer
                | DescriptorKind::StorageTexelBuffer
        )
    }

    pub fn uses_buffer_view(self) -> bool {
        matches!(
            self,
            DescriptorKind::UniformTexelBuffer | DescriptorKind::StorageTexelBuffer
        )
    }

    pub fn is_image(self) -> bool {
        matches!(
            self,
            DescriptorKind::CombinedImageSampler
                | DescriptorKind::SampledImage
                | DescriptorKind::StorageImage
                | DescriptorKind::InputAttachment
        )
    }

    pub fn image_usage(self) -> vk::ImageUsageFlags {
        match self {
            DescriptorKind::InputAttachment => {
                vk::ImageUsageFlags::INPUT_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST
            }
            DescriptorKind::StorageImage => {
                vk::ImageUsageFlags::SAMPLED
                    | vk::ImageUsageFlags::STORAGE
                    | vk::ImageUsageFlags::TRANSFER_DST
            }
            _ => vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        }
    }

    pub fn image_layout(self) -> vk::ImageLayout {
        match self {
            DescriptorKind::StorageImage => vk::ImageLayout::GENERAL,
            _ => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    pub fn image_access(self) -> vk::AccessFlags {
        match self {
            DescriptorKind::InputAttachment => vk::AccessFlags::INPUT_ATTACHMENT_READ,
            _ => vk::AccessFlags::SHADER_READ,
        }
    }

    pub fn buffer_usage(self) -> vk::BufferUsageFlags {
        match self {
            DescriptorKind::UniformBuffer | DescriptorKind::UniformBufferDynamic => {
                vk::BufferUsageFlags::UNIFORM_BUFFER
            }
            DescriptorKind::UniformTexelBuffer => vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER,
            DescriptorKind::StorageTexelBuffer => vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER,
            _ => vk::BufferUsageFlags::STORAGE_BUFFER,
        }
    }
}

/// Reference state of one array element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    /// One value per dynamic area.
    pub data: Vec<u32>,
    pub written: bool,
    pub copied_into: bool,
}

#[derive(Debug, Clone)]
pub struct Descriptor {
    kind: DescriptorKind,
    id: u32,
    array_size: u32,
    num_dynamic_areas: u32,
    elements: Vec<ElementData>,
    dynamic_areas: Vec<u32>,
    attachment_indices: Vec<u32>,
    first_attachment_index: u32,
    /// Ids of the partner descriptors: the samplers a sampled image is read
    /// through, or the images a sampler reads from. One entry per element.
    partners: Vec<u32>,
}

impl Descriptor {
    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn array_size(&self) -> u32 {
        self.array_size
    }

    pub fn num_dynamic_areas(&self) -> u32 {
        self.num_dynamic_areas
    }

    pub fn elements(&self) -> &[ElementData] {
        &self.elements
    }

    pub fn attachment_indices(&self) -> &[u32] {
        &self.attachment_indices
    }

    /// Pair `count` elements of this descriptor with `partner`: a sampler
    /// with the image it samples, or a sampled image with its sampler.
    pub fn link(&mut self, partner: &Descriptor, count: u32) {
        for _ in 0..count {
            self.partners.push(partner.id);
        }
    }

    /// Reference value of one element in one dynamic area.
    pub fn reference_data(&self, array_idx: u32, area: u32) -> u32 {
        self.elements[array_idx as usize].data[area as usize]
    }

    pub fn first_written_element(&self) -> u32 {
        self.elements
            .iter()
            .position(|e| e.written)
            .map_or(0, |i| i as u32)
    }

    pub fn num_written_elements(&self) -> u32 {
        self.elements.iter().filter(|e| e.written).count() as u32
    }

    /// Block size in bytes for inline uniform blocks.
    pub fn iub_size_in_bytes(&self) -> u32 {
        self.array_size * IUB_ELEMENT_SIZE
    }

    /// Number of descriptors this binding consumes from a pool or limit.
    pub fn descriptor_count(&self) -> u32 {
        if self.kind == DescriptorKind::InlineUniformBlock {
            1
        } else {
            self.array_size
        }
    }

    /// Layout `descriptorCount`; bytes for inline uniform blocks.
    pub fn layout_count(&self) -> u32 {
        if self.kind == DescriptorKind::InlineUniformBlock {
            self.iub_size_in_bytes()
        } else {
            self.array_size
        }
    }

    fn array_string(&self, index: u32) -> String {
        if self.array_size > 1 {
            format!("[{}]", index)
        } else {
            String::new()
        }
    }

    fn dynamic_area(&self, array_idx: u32) -> u32 {
        self.dynamic_areas
            .get(array_idx as usize)
            .copied()
            .unwrap_or(0)
    }

    fn set_dynamic_areas(&mut self, areas: Vec<u32>) {
        self.dynamic_areas = areas;
    }

    /// Copy reference data from `src`; `src_element..src_element + count`
    /// must all have been written by the host.
    pub fn copy_value(
        &mut self,
        src: &Descriptor,
        src_element: u32,
        dst_element: u32,
        count: u32,
    ) -> Result<(), CtsError> {
        let areas = self.num_dynamic_areas.min(src.num_dynamic_areas) as usize;
        for i in 0..count as usize {
            let from = src
                .elements
                .get(src_element as usize + i)
                .ok_or_else(|| CtsError::fatal("descriptor copy source out of range"))?;
            if !from.written {
                return Err(CtsError::fatal(format!(
                    "descriptor {} element {} copied before it was written",
                    src.id,
                    src_element as usize + i
                )));
            }
            let data = from.data[..areas].to_vec();
            let to = self
                .elements
                .get_mut(dst_element as usize + i)
                .ok_or_else(|| CtsError::fatal("descriptor copy destination out of range"))?;
            to.data[..areas].copy_from_slice(&data);
            to.copied_into = true;
        }

        if self.kind == DescriptorKind::InputAttachment && src.kind == DescriptorKind::InputAttachment {
            for i in 0..count as usize {
                self.attachment_indices[dst_element as usize + i] =
                    src.attachment_indices[src_element as usize + i];
            }
        }
        Ok(())
    }

    /// GLSL text that follows `layout (set=S, binding=B`.
    pub fn shader_declaration(&self) -> String {
        let id = self.id;
        let arr = self.array_string(self.array_size);
        match self.kind {
            DescriptorKind::UniformBuffer => format!(
                ") uniform UniformBuffer{id}\n{{\n\tint data;\n}} uniformBuffer{id}{arr};\n"
            ),
            DescriptorKind::UniformBufferDynamic => format!(
                ") uniform UniformBuffer{id}\n{{\n\tint data;\n}} dynamicUniformBuffer{id}{arr};\n"
            ),
            DescriptorKind::StorageBuffer => format!(
                ") buffer StorageBuffer{id}\n{{\n\tint data;\n}} storageBuffer{id}{arr};\n"
            ),
            DescriptorKind::StorageBufferDynamic => format!(
                ") buffer StorageBuffer{id}\n{{\n\tint data;\n}} dynamicStorageBuffer{id}{arr};\n"
            ),
            DescriptorKind::InlineUniformBlock => format!(
                ") uniform InlineUniformBlock{id}\n{{\n\tint data{arr};\n}} inlineUniformBlock{id};\n"
            ),
            DescriptorKind::UniformTexelBuffer => {
                format!(") uniform textureBuffer uniformTexelBuffer{id}{arr};\n")
            }
            DescriptorKind::StorageTexelBuffer => {
                format!(", r32f) uniform imageBuffer storageTexelBuffer{id}{arr};\n")
            }
            DescriptorKind::CombinedImageSampler => {
                format!(") uniform sampler2D texSampler{id}{arr};\n")
            }
            DescriptorKind::StorageImage => {
                format!(", r32f) readonly uniform image2D image{id}{arr};\n")
            }
            DescriptorKind::InputAttachment => format!(
                ", input_attachment_index={}) uniform subpassInput inputAttachment{id}{arr};\n",
                self.first_attachment_index
            ),
            DescriptorKind::SampledImage => format!(") uniform texture2D sampledImage{id}{arr};\n"),
            DescriptorKind::Sampler => format!(") uniform sampler sampler{id}{arr};\n"),
        }
    }

    /// One `if (...) result = 0;` line per element the shader can observe.
    pub fn shader_verify_code(&self) -> String {
        let id = self.id;
        let mut out = String::new();
        for (i, element) in self.elements.iter().enumerate() {
            let i = i as u32;
            if !(element.written || element.copied_into) {
                continue;
            }
            let arr = self.array_string(i);
            let value = element.data[0];
            let line = match self.kind {
                DescriptorKind::UniformBuffer => {
                    format!("if (uniformBuffer{id}{arr}.data != {value}) result = 0;\n")
                }
                DescriptorKind::UniformBufferDynamic => format!(
                    "if (dynamicUniformBuffer{id}{arr}.data != {}) result = 0;\n",
                    element.data[self.dynamic_area(i) as usize]
                ),
                DescriptorKind::StorageBuffer => {
                    format!("if (storageBuffer{id}{arr}.data != {value}) result = 0;\n")
                }
                DescriptorKind::StorageBufferDynamic => format!(
                    "if (dynamicStorageBuffer{id}{arr}.data != {}) result = 0;\n",
                    element.data[self.dynamic_area(i) as usize]
                ),
                DescriptorKind::InlineUniformBlock => {
                    format!("if (inlineUniformBlock{id}.data{arr} != {value}) result = 0;\n")
                }
                DescriptorKind::UniformTexelBuffer => format!(
                    "if (texelFetch(uniformTexelBuffer{id}{arr}, 0).x != {value}) result = 0;\n"
                ),
                DescriptorKind::StorageTexelBuffer => format!(
                    "if (imageLoad(storageTexelBuffer{id}{arr}, 0).x != {value}) result = 0;\n"
                ),
                DescriptorKind::CombinedImageSampler => format!(
                    "if (texture(texSampler{id}{arr}, vec2(0)).x != {value}) result = 0;\n"
                ),
                DescriptorKind::StorageImage => format!(
                    "if (imageLoad(image{id}{arr}, ivec2(0)).x != {value}) result = 0;\n"
                ),
                DescriptorKind::InputAttachment => format!(
                    "if (subpassLoad(inputAttachment{id}{arr}).x != {value}) result = 0;\n"
                ),
                DescriptorKind::SampledImage => match self.partners.get(i as usize) {
                    Some(sampler) => format!(
                        "if (texture(sampler2D(sampledImage{id}{arr}, sampler{sampler}), vec2(0)).x != {value}) result = 0;\n"
                    ),
                    None => continue,
                },
                // Sampling at (-1, -1) returns the border color.
                DescriptorKind::Sampler => match self.partners.get(i as usize) {
                    Some(image) => format!(
                        "if (texture(sampler2D(sampledImage{image}, sampler{id}{arr}), vec2(-1)).x != {}) result = 0;\n",
                        value % 2
                    ),
                    None => continue,
                },
            };
            out.push_str(&line);
        }
        out
    }
}

// ── Id counters ─────────────────────────────────────────────────────────────

/// Hands out descriptor ids and input attachment indices. Each case starts
/// from a fresh counter so generated shaders are reproducible.
#[derive(Debug, Clone)]
pub struct IdCounters {
    next_id: u32,
    next_attachment_index: u32,
}

impl Default for IdCounters {
    fn default() -> Self {
        Self {
            next_id: FIRST_DESCRIPTOR_ID,
            next_attachment_index: 0,
        }
    }
}

impl IdCounters {
    pub fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn next_attachment_index(&mut self) -> u32 {
        let index = self.next_attachment_index;
        self.next_attachment_index += 1;
        index
    }
}

// ── Sets and copies ─────────────────────────────────────────────────────────

/// A recorded `VkCopyDescriptorSet`, already scaled to bytes for inline
/// uniform blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorCopy {
    pub src_set: u32,
    pub src_binding: u32,
    pub src_array_element: u32,
    pub dst_set: u32,
    pub dst_binding: u32,
    pub dst_array_element: u32,
    pub count: u32,
}

/// Limits that the run checks before creating anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineUniformBlockLimits {
    pub max_inline_uniform_block_size: u32,
    pub max_per_stage_descriptor_inline_uniform_blocks: u32,
    pub max_descriptor_set_inline_uniform_blocks: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IubUsage {
    pub total_blocks: u32,
    pub total_bytes: u32,
}

/// Descriptor sets of one case, the copies between them and the state the
/// verification shader checks.
#[derive(Debug, Clone)]
pub struct DescriptorCommands {
    pipeline_type: PipelineType,
    ids: IdCounters,
    descriptors: Vec<Descriptor>,
    /// Per set, indices into `descriptors` in binding order.
    sets: Vec<Vec<usize>>,
    copies: Vec<DescriptorCopy>,
    result_buffer: Option<usize>,
    dynamic_areas: Vec<u32>,
}

impl DescriptorCommands {
    pub fn new(pipeline_type: PipelineType) -> Self {
        Self {
            pipeline_type,
            ids: IdCounters::default(),
            descriptors: Vec::new(),
            sets: Vec::new(),
            copies: Vec::new(),
            result_buffer: None,
            dynamic_areas: Vec::new(),
        }
    }

    pub fn pipeline_type(&self) -> PipelineType {
        self.pipeline_type
    }

    /// Create a descriptor with the next id. Elements
    /// `write_start..write_start + elements_to_write` are written by the
    /// host; `num_dynamic_areas` only applies to dynamic kinds.
    pub fn descriptor(
        &mut self,
        kind: DescriptorKind,
        array_size: u32,
        write_start: u32,
        elements_to_write: u32,
        num_dynamic_areas: u32,
    ) -> Descriptor {
        let id = self.ids.next_id();
        let areas = if kind.is_dynamic() { num_dynamic_areas } else { 1 };
        let elements = (0..array_size)
            .map(|idx| ElementData {
                data: (0..areas).map(|area| id + idx * areas + area).collect(),
                written: idx >= write_start && idx < write_start + elements_to_write,
                copied_into: false,
            })
            .collect();

        let (first_attachment_index, attachment_indices) = if kind == DescriptorKind::InputAttachment {
            let indices: Vec<u32> = (0..array_size)
                .map(|_| self.ids.next_attachment_index())
                .collect();
            (indices.first().copied().unwrap_or(0), indices)
        } else {
            (0, Vec::new())
        };

        Descriptor {
            kind,
            id,
            array_size,
            num_dynamic_areas: areas,
            elements,
            dynamic_areas: Vec::new(),
            attachment_indices,
            first_attachment_index,
            partners: Vec::new(),
        }
    }

    /// A single-element descriptor that is fully written.
    pub fn single(&mut self, kind: DescriptorKind) -> Descriptor {
        self.descriptor(kind, 1, 0, 1, 1)
    }

    /// Append `descriptor` as the next binding of `set`, creating empty
    /// sets up to it.
    pub fn add_descriptor(&mut self, descriptor: Descriptor, set: u32) {
        while self.sets.len() <= set as usize {
            self.sets.push(Vec::new());
        }
        self.descriptors.push(descriptor);
        self.sets[set as usize].push(self.descriptors.len() - 1);
    }

    fn binding_index(&self, set: u32, binding: u32) -> Result<usize, CtsError> {
        self.sets
            .get(set as usize)
            .and_then(|s| s.get(binding as usize))
            .copied()
            .ok_or_else(|| CtsError::fatal(format!("no descriptor at set {} binding {}", set, binding)))
    }

    pub fn binding(&self, set: u32, binding: u32) -> Option<&Descriptor> {
        self.binding_index(set, binding)
            .ok()
            .map(|i| &self.descriptors[i])
    }

    /// Record a copy and apply it to the reference model. For inline
    /// uniform blocks the element indices are data array indices; the
    /// recorded copy is scaled to bytes.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_descriptor(
        &mut self,
        src_set: u32,
        src_binding: u32,
        src_array_element: u32,
        dst_set: u32,
        dst_binding: u32,
        dst_array_element: u32,
        count: u32,
    ) -> Result<(), CtsError> {
        let src_index = self.binding_index(src_set, src_binding)?;
        let dst_index = self.binding_index(dst_set, dst_binding)?;

        let scale = if self.descriptors[src_index].kind == DescriptorKind::InlineUniformBlock {
            IUB_ELEMENT_SIZE
        } else {
            1
        };
        self.copies.push(DescriptorCopy {
            src_set,
            src_binding,
            src_array_element: src_array_element * scale,
            dst_set,
            dst_binding,
            dst_array_element: dst_array_element * scale,
            count: count * scale,
        });

        let src = self.descriptors[src_index].clone();
        self.descriptors[dst_index].copy_value(&src, src_array_element, dst_array_element, count)
    }

    /// Copy element 0 of one binding over element 0 of another.
    pub fn copy_single(
        &mut self,
        src_set: u32,
        src_binding: u32,
        dst_set: u32,
        dst_binding: u32,
    ) -> Result<(), CtsError> {
        self.copy_descriptor(src_set, src_binding, 0, dst_set, dst_binding, 0, 1)
    }

    /// Compute pipelines get a storage buffer as the last binding of set 0
    /// for the verdict. Graphics pipelines render it instead.
    pub fn add_result_buffer(&mut self) {
        if self.pipeline_type == PipelineType::Compute {
            let buffer = self.single(DescriptorKind::StorageBuffer);
            self.add_descriptor(buffer, 0);
            self.result_buffer = Some(self.descriptors.len() - 1);
        }
    }

    pub fn result_buffer_id(&self) -> Option<u32> {
        self.result_buffer.map(|i| self.descriptors[i].id)
    }

    /// Areas selected for each element of each dynamic descriptor, in the
    /// order the descriptors were added.
    pub fn set_dynamic_areas(&mut self, areas: Vec<u32>) {
        let mut next = areas.iter().copied();
        for descriptor in self.descriptors.iter_mut().filter(|d| d.kind.is_dynamic()) {
            let picked: Vec<u32> = (0..descriptor.array_size)
                .map(|_| next.next().unwrap_or(0))
                .collect();
            descriptor.set_dynamic_areas(picked);
        }
        self.dynamic_areas = areas;
    }

    pub fn has_dynamic_areas(&self) -> bool {
        self.descriptors.iter().any(|d| d.kind.is_dynamic())
    }

    /// Dynamic offsets passed at bind time, one per dynamic element.
    pub fn dynamic_offsets(&self) -> Vec<u32> {
        if self.has_dynamic_areas() {
            self.dynamic_areas.iter().map(|area| area * 256).collect()
        } else {
            Vec::new()
        }
    }

    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    /// Bindings of `set` in binding order.
    pub fn set_bindings(&self, set: usize) -> impl Iterator<Item = &Descriptor> + '_ {
        self.sets
            .get(set)
            .into_iter()
            .flatten()
            .map(move |&i| &self.descriptors[i])
    }

    /// All descriptors in the order they were added.
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn copies(&self) -> &[DescriptorCopy] {
        &self.copies
    }

    pub fn shader_declarations(&self) -> String {
        let mut out = String::new();
        for set in 0..self.sets.len() {
            for (binding, descriptor) in self.set_bindings(set).enumerate() {
                out.push_str(&format!(
                    "layout (set={}, binding={}{}",
                    set,
                    binding,
                    descriptor.shader_declaration()
                ));
            }
        }
        out
    }

    /// Verification code for every binding except the compute result
    /// buffer, which is always the last binding of set 0.
    pub fn descriptor_verifications(&self) -> String {
        let mut out = String::new();
        for (set, bindings) in self.sets.iter().enumerate() {
            for (binding, &index) in bindings.iter().enumerate() {
                if self.pipeline_type == PipelineType::Compute
                    && set == 0
                    && binding == bindings.len() - 1
                {
                    continue;
                }
                out.push_str(&self.descriptors[index].shader_verify_code());
            }
        }
        out
    }

    /// Pool sizes per descriptor type in first-use order. Inline uniform
    /// block entries are counted in bytes.
    pub fn pool_sizes(&self) -> Vec<(vk::DescriptorType, u32)> {
        let mut sizes: Vec<(vk::DescriptorType, u32)> = Vec::new();
        for descriptor in &self.descriptors {
            let ty = descriptor.kind.descriptor_type();
            let count = if descriptor.kind == DescriptorKind::InlineUniformBlock {
                descriptor.iub_size_in_bytes()
            } else {
                descriptor.descriptor_count()
            };
            match sizes.iter_mut().find(|(t, _)| *t == ty) {
                Some((_, total)) => *total += count,
                None => sizes.push((ty, count)),
            }
        }
        sizes
    }

    /// Compare descriptor usage with the device limits. Returns the inline
    /// uniform block totals needed to size the pool.
    pub fn check_limits(
        &self,
        limits: &vk::PhysicalDeviceLimits,
        iub_limits: &InlineUniformBlockLimits,
    ) -> Result<IubUsage, CtsError> {
        if limits.max_bound_descriptor_sets as usize <= self.sets.len() {
            return Err(CtsError::not_supported(
                "Maximum bound descriptor sets limit exceeded.",
            ));
        }

        #[derive(Default)]
        struct Counts {
            samplers: u32,
            uniform_buffers: u32,
            uniform_buffers_dynamic: u32,
            storage_buffers: u32,
            storage_buffers_dynamic: u32,
            sampled_images: u32,
            storage_images: u32,
            input_attachments: u32,
            total_resources: u32,
        }

        let mut stage = Counts::default();
        let mut usage = IubUsage::default();

        for (set_idx, bindings) in self.sets.iter().enumerate() {
            let mut set = Counts {
                // The color attachment counts as a resource.
                total_resources: u32::from(self.pipeline_type == PipelineType::Graphics),
                ..Counts::default()
            };

            for (binding_idx, &index) in bindings.iter().enumerate() {
                let descriptor = &self.descriptors[index];
                let n = descriptor.array_size;
                if descriptor.kind == DescriptorKind::InlineUniformBlock {
                    let bytes = descriptor.iub_size_in_bytes();
                    if bytes > iub_limits.max_inline_uniform_block_size {
                        return Err(CtsError::not_supported(format!(
                            "Maximum size for an inline uniform block exceeded by binding {} from set {}",
                            binding_idx, set_idx
                        )));
                    }
                    usage.total_bytes += bytes;
                    usage.total_blocks += 1;
                    set.total_resources += 1;
                } else {
                    set.total_resources += n;
                }

                match descriptor.kind {
                    DescriptorKind::UniformBuffer => set.uniform_buffers += n,
                    DescriptorKind::UniformBufferDynamic => {
                        set.uniform_buffers += n;
                        set.uniform_buffers_dynamic += n;
                    }
                    DescriptorKind::StorageBuffer => set.storage_buffers += n,
                    DescriptorKind::StorageBufferDynamic => {
                        set.storage_buffers += n;
                        set.storage_buffers_dynamic += n;
                    }
                    DescriptorKind::CombinedImageSampler => {
                        set.samplers += n;
                        set.sampled_images += n;
                    }
                    DescriptorKind::StorageImage | DescriptorKind::StorageTexelBuffer => {
                        set.storage_images += n
                    }
                    DescriptorKind::InputAttachment => set.input_attachments += n,
                    DescriptorKind::UniformTexelBuffer | DescriptorKind::SampledImage => {
                        set.sampled_images += n
                    }
                    DescriptorKind::Sampler => set.samplers += n,
                    DescriptorKind::InlineUniformBlock => {}
                }
            }

            let per_set = [
                (set.samplers, limits.max_descriptor_set_samplers, "sampler"),
                (set.uniform_buffers, limits.max_descriptor_set_uniform_buffers, "uniform buffer"),
                (
                    set.uniform_buffers_dynamic,
                    limits.max_descriptor_set_uniform_buffers_dynamic,
                    "uniform buffer dynamic",
                ),
                (set.storage_buffers, limits.max_descriptor_set_storage_buffers, "storage buffer"),
                (
                    set.storage_buffers_dynamic,
                    limits.max_descriptor_set_storage_buffers_dynamic,
                    "storage buffer dynamic",
                ),
                (set.sampled_images, limits.max_descriptor_set_sampled_images, "sampled image"),
                (set.storage_images, limits.max_descriptor_set_storage_images, "storage image"),
                (
                    set.input_attachments,
                    limits.max_descriptor_set_input_attachments,
                    "input attachment",
                ),
            ];
            for (count, limit, what) in per_set {
                if count > limit {
                    return Err(CtsError::not_supported(format!(
                        "Maximum per descriptor set {} limit exceeded.",
                        what
                    )));
                }
            }

            stage.samplers += set.samplers;
            stage.uniform_buffers += set.uniform_buffers;
            stage.storage_buffers += set.storage_buffers;
            stage.sampled_images += set.sampled_images;
            stage.storage_images += set.storage_images;
            stage.input_attachments += set.input_attachments;
            stage.total_resources += set.total_resources;
        }

        let per_stage = [
            (stage.total_resources, limits.max_per_stage_resources, "total resource"),
            (stage.samplers, limits.max_per_stage_descriptor_samplers, "sampler"),
            (
                stage.uniform_buffers,
                limits.max_per_stage_descriptor_uniform_buffers,
                "uniform buffer",
            ),
            (
                stage.storage_buffers,
                limits.max_per_stage_descriptor_storage_buffers,
                "storage buffer",
            ),
            (
                stage.sampled_images,
                limits.max_per_stage_descriptor_sampled_images,
                "sampled image",
            ),
            (
                stage.storage_images,
                limits.max_per_stage_descriptor_storage_images,
                "storage image",
            ),
            (
                stage.input_attachments,
                limits.max_per_stage_descriptor_input_attachments,
                "input attachment",
            ),
        ];
        for (count, limit, what) in per_stage {
            if count > limit {
                return Err(CtsError::not_supported(format!(
                    "Maximum per stage {} limit exceeded.",
                    what
                )));
            }
        }

        if usage.total_blocks > iub_limits.max_descriptor_set_inline_uniform_blocks
            || usage.total_blocks > iub_limits.max_per_stage_descriptor_inline_uniform_blocks
        {
            return Err(CtsError::not_supported(
                "Number of per stage inline uniform blocks exceeds limits.",
            ));
        }

        Ok(usage)
    }
}
