use std::sync::Arc;

use ash::vk;
use cts_core::CtsError;

use crate::check::VkCheck;
use crate::handles::Unique;

pub fn make_pipeline_layout(
    device: &Arc<ash::Device>,
    set_layouts: &[vk::DescriptorSetLayout],
    push_constant_ranges: &[vk::PushConstantRange],
) -> Result<Unique<vk::PipelineLayout>, CtsError> {
    let info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(set_layouts)
        .push_constant_ranges(push_constant_ranges);
    let layout = unsafe { device.create_pipeline_layout(&info, None) }
        .vk_check("vkCreatePipelineLayout")?;
    Ok(Unique::new(device, layout))
}

pub fn make_pipeline_cache(device: &Arc<ash::Device>) -> Result<Unique<vk::PipelineCache>, CtsError> {
    let info = vk::PipelineCacheCreateInfo::default();
    let cache = unsafe { device.create_pipeline_cache(&info, None) }
        .vk_check("vkCreatePipelineCache")?;
    Ok(Unique::new(device, cache))
}

fn first_pipeline(
    result: Result<Vec<vk::Pipeline>, (Vec<vk::Pipeline>, vk::Result)>,
    device: &Arc<ash::Device>,
    call: &'static str,
) -> Result<Unique<vk::Pipeline>, CtsError> {
    match result {
        Ok(pipelines) => pipelines
            .into_iter()
            .next()
            .map(|p| Unique::new(device, p))
            .ok_or_else(|| CtsError::fatal(format!("{} returned no pipelines", call))),
        Err((pipelines, e)) => {
            for p in pipelines.into_iter().filter(|p| *p != vk::Pipeline::null()) {
                unsafe { device.destroy_pipeline(p, None) };
            }
            Err(crate::check::vk_error(call, e))
        }
    }
}

pub fn make_compute_pipeline(
    device: &Arc<ash::Device>,
    layout: vk::PipelineLayout,
    module: vk::ShaderModule,
    cache: vk::PipelineCache,
) -> Result<Unique<vk::Pipeline>, CtsError> {
    let stage = vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(module)
        .name(c"main");
    let info = vk::ComputePipelineCreateInfo::default()
        .stage(stage)
        .layout(layout);
    let result = unsafe { device.create_compute_pipelines(cache, &[info], None) };
    first_pipeline(result, device, "vkCreateComputePipelines")
}

/// Fragment shading rate state attached to a graphics pipeline.
#[derive(Debug, Clone, Copy)]
pub struct FragmentShadingRateState {
    pub fragment_size: vk::Extent2D,
    pub combiner_ops: [vk::FragmentShadingRateCombinerOpKHR; 2],
}

/// Fixed-function state for a simple graphics pipeline: one vertex buffer
/// binding, full-target viewport, no blending.
pub struct GraphicsPipelineBuilder {
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    topology: vk::PrimitiveTopology,
    extent: vk::Extent2D,
    samples: vk::SampleCountFlags,
    subpass: u32,
    color_attachments: u32,
    depth_test: bool,
    shading_rate: Option<FragmentShadingRateState>,
    geometry_module: Option<vk::ShaderModule>,
    tessellation: Option<TessellationStages>,
}

#[derive(Debug, Clone, Copy)]
struct TessellationStages {
    control: vk::ShaderModule,
    evaluation: vk::ShaderModule,
    patch_control_points: u32,
}

impl GraphicsPipelineBuilder {
    pub fn new(extent: vk::Extent2D) -> Self {
        Self {
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            extent,
            samples: vk::SampleCountFlags::TYPE_1,
            subpass: 0,
            color_attachments: 1,
            depth_test: false,
            shading_rate: None,
            geometry_module: None,
            tessellation: None,
        }
    }

    /// Binding 0 with a single attribute at location 0.
    pub fn vertex_input(mut self, stride: u32, format: vk::Format) -> Self {
        self.vertex_bindings = vec![vk::VertexInputBindingDescription {
            binding: 0,
            stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        self.vertex_attributes = vec![vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format,
            offset: 0,
        }];
        self
    }

    /// Extra attribute on binding 0; call after [`Self::vertex_input`].
    pub fn vertex_attribute(mut self, location: u32, format: vk::Format, offset: u32) -> Self {
        self.vertex_attributes.push(vk::VertexInputAttributeDescription {
            location,
            binding: 0,
            format,
            offset,
        });
        self
    }

    pub fn topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    pub fn subpass(mut self, subpass: u32) -> Self {
        self.subpass = subpass;
        self
    }

    pub fn color_attachments(mut self, count: u32) -> Self {
        self.color_attachments = count;
        self
    }

    pub fn depth_test(mut self, enabled: bool) -> Self {
        self.depth_test = enabled;
        self
    }

    pub fn shading_rate(mut self, state: FragmentShadingRateState) -> Self {
        self.shading_rate = Some(state);
        self
    }

    pub fn geometry(mut self, module: vk::ShaderModule) -> Self {
        self.geometry_module = Some(module);
        self
    }

    /// Adds both tessellation stages; input assembly switches to patch lists.
    pub fn tessellation(
        mut self,
        control: vk::ShaderModule,
        evaluation: vk::ShaderModule,
        patch_control_points: u32,
    ) -> Self {
        self.tessellation = Some(TessellationStages {
            control,
            evaluation,
            patch_control_points,
        });
        self
    }

    pub fn build(
        &self,
        device: &Arc<ash::Device>,
        layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
        vertex_module: vk::ShaderModule,
        fragment_module: vk::ShaderModule,
        cache: vk::PipelineCache,
    ) -> Result<Unique<vk::Pipeline>, CtsError> {
        let stage = |flags, module| {
            vk::PipelineShaderStageCreateInfo::default()
                .stage(flags)
                .module(module)
                .name(c"main")
        };
        let mut stages = vec![stage(vk::ShaderStageFlags::VERTEX, vertex_module)];
        if let Some(tess) = self.tessellation {
            stages.push(stage(vk::ShaderStageFlags::TESSELLATION_CONTROL, tess.control));
            stages.push(stage(vk::ShaderStageFlags::TESSELLATION_EVALUATION, tess.evaluation));
        }
        if let Some(module) = self.geometry_module {
            stages.push(stage(vk::ShaderStageFlags::GEOMETRY, module));
        }
        stages.push(stage(vk::ShaderStageFlags::FRAGMENT, fragment_module));

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);
        let topology = if self.tessellation.is_some() {
            vk::PrimitiveTopology::PATCH_LIST
        } else {
            self.topology
        };
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default().topology(topology);
        let tessellation_state = self.tessellation.map(|t| {
            vk::PipelineTessellationStateCreateInfo::default()
                .patch_control_points(t.patch_control_points)
        });

        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0);
        let multisample =
            vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(self.samples);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.depth_test)
            .depth_write_enable(self.depth_test)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = (0..self
            .color_attachments)
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(false)
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
            })
            .collect();
        let color_blend =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let mut shading_rate_info = self.shading_rate.map(|s| {
            vk::PipelineFragmentShadingRateStateCreateInfoKHR::default()
                .fragment_size(s.fragment_size)
                .combiner_ops(s.combiner_ops)
        });

        let mut info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(self.subpass);
        if let Some(tess) = tessellation_state.as_ref() {
            info = info.tessellation_state(tess);
        }
        if let Some(fsr) = shading_rate_info.as_mut() {
            info = info.push_next(fsr);
        }

        let result = unsafe { device.create_graphics_pipelines(cache, &[info], None) };
        first_pipeline(result, device, "vkCreateGraphicsPipelines")
    }
}
