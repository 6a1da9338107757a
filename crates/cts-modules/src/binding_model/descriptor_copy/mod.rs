//! Descriptor copy tests: descriptors are written on the host, moved around
//! with `VkCopyDescriptorSet`, and a generated shader checks every binding
//! against the values the host model expects.

pub mod cases;
pub mod model;
mod run;

use cts_core::{CtsError, ShaderStage, SourceCollections, TestGroup, TestStatus};
use cts_vk::{BinaryCollection, Context, TestCase, TestInstance};

use crate::registry::CaseBox;
use model::{DescriptorCommands, PipelineType};

const VERTEX_SHADER: &str = r#"#version 450
out gl_PerVertex
{
    vec4 gl_Position;
};
void main()
{
    gl_Position = vec4(((gl_VertexIndex + 2) / 3) % 2 == 0 ? -1.0 : 1.0,
                       ((gl_VertexIndex + 1) / 3) % 2 == 0 ? -1.0 : 1.0, 0.0, 1.0);
}
"#;

pub fn compute_source(commands: &DescriptorCommands, result_id: u32) -> String {
    format!(
        "#version 430\n\n{}\nvoid main()\n{{\nint result = 1;\n{}storageBuffer{}.data = result;\n}}\n",
        commands.shader_declarations(),
        commands.descriptor_verifications(),
        result_id
    )
}

pub fn fragment_source(commands: &DescriptorCommands) -> String {
    format!(
        "#version 430\n\n{}layout (location = 0) out vec4 outColor;\n\nvoid main()\n{{\nint result = 1;\n{}if (result == 1) outColor = vec4(0, 1, 0, 1);\nelse outColor = vec4(1, 0, 1, 0);\n}}\n",
        commands.shader_declarations(),
        commands.descriptor_verifications()
    )
}

pub struct DescriptorCopyCase {
    /// A case whose copy script is inconsistent reports an internal error
    /// when it runs instead of aborting group construction.
    commands: Result<DescriptorCommands, String>,
}

impl DescriptorCopyCase {
    pub fn new(commands: Result<DescriptorCommands, CtsError>) -> Self {
        Self {
            commands: commands.map_err(|e| e.message()),
        }
    }

    fn commands(&self) -> Result<&DescriptorCommands, CtsError> {
        self.commands.as_ref().map_err(|m| CtsError::fatal(m.clone()))
    }
}

impl TestCase for DescriptorCopyCase {
    fn check_support(&self, _context: &Context) -> Result<(), CtsError> {
        self.commands().map(|_| ())
    }

    fn init_programs(&self, programs: &mut SourceCollections) {
        let Ok(commands) = self.commands.as_ref() else {
            return;
        };
        match commands.pipeline_type() {
            PipelineType::Compute => {
                if let Some(result_id) = commands.result_buffer_id() {
                    programs.add("compute", ShaderStage::Compute, compute_source(commands, result_id));
                }
            }
            PipelineType::Graphics => {
                programs.add("vertex", ShaderStage::Vertex, VERTEX_SHADER);
                programs.add("fragment", ShaderStage::Fragment, fragment_source(commands));
            }
        }
    }

    fn create_instance<'a>(
        &self,
        context: &'a Context,
        binaries: &'a BinaryCollection,
    ) -> Result<Box<dyn TestInstance + 'a>, CtsError> {
        Ok(Box::new(DescriptorCopyInstance {
            commands: self.commands()?.clone(),
            context,
            binaries,
        }))
    }
}

struct DescriptorCopyInstance<'a> {
    commands: DescriptorCommands,
    context: &'a Context,
    binaries: &'a BinaryCollection,
}

impl TestInstance for DescriptorCopyInstance<'_> {
    fn iterate(&mut self) -> Result<TestStatus, CtsError> {
        run::run(&self.commands, self.context, self.binaries)
    }
}

// ── Groups ──────────────────────────────────────────────────────────────────

fn add_pipeline_cases(group: &mut TestGroup<CaseBox>, pipeline: PipelineType) {
    for (prefix, kind) in cases::generic_kinds(pipeline) {
        for (suffix, built) in cases::generic_cases(kind, pipeline) {
            group.add_case(format!("{}{}", prefix, suffix), Box::new(DescriptorCopyCase::new(built)));
        }
    }
    let special = cases::sampler_cases(pipeline)
        .into_iter()
        .chain(cases::sampled_image_cases(pipeline))
        .chain(cases::mixed_cases(pipeline));
    for (name, built) in special {
        group.add_case(name, Box::new(DescriptorCopyCase::new(built)));
    }
}

pub fn create_tests() -> TestGroup<CaseBox> {
    let mut root = TestGroup::new("descriptor_copy", "Descriptor copy tests");

    let mut compute = TestGroup::new("compute", "Compute tests");
    add_pipeline_cases(&mut compute, PipelineType::Compute);
    root.add_child(compute);

    let mut graphics = TestGroup::new("graphics", "Graphics tests");
    add_pipeline_cases(&mut graphics, PipelineType::Graphics);
    root.add_child(graphics);

    root
}
