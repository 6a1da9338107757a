use std::collections::BTreeMap;
use std::sync::Arc;

use ash::vk;
use cts_core::{CtsError, ShaderStage, SourceCollections, SpirvTarget};
use tracing::debug;

use crate::check::VkCheck;
use crate::handles::Unique;

/// SPIR-V compiled from a [`SourceCollections`], keyed by program name.
#[derive(Debug, Default)]
pub struct BinaryCollection {
    binaries: BTreeMap<String, Vec<u32>>,
}

impl BinaryCollection {
    /// Compile every source in `sources` with shaderc.
    pub fn compile(sources: &SourceCollections) -> Result<Self, CtsError> {
        let mut binaries = BTreeMap::new();
        if sources.is_empty() {
            return Ok(Self { binaries });
        }

        let compiler = shaderc::Compiler::new().or_unavailable("shaderc compiler")?;
        for (name, program) in sources.iter() {
            let mut options = shaderc::CompileOptions::new().or_unavailable("shaderc options")?;
            options.set_target_env(shaderc::TargetEnv::Vulkan, shaderc::EnvVersion::Vulkan1_2 as u32);
            if program.target == SpirvTarget::Spirv1_4 {
                options.set_target_spirv(shaderc::SpirvVersion::V1_4);
            }

            let artifact = compiler
                .compile_into_spirv(&program.source, shader_kind(program.stage), name, "main", Some(&options))
                .map_err(|e| CtsError::Shader {
                    name: name.to_string(),
                    message: e.to_string(),
                })?;
            let words = artifact.as_binary().to_vec();
            debug!("compiled \"{}\" ({} words)", name, words.len());
            binaries.insert(name.to_string(), words);
        }
        Ok(Self { binaries })
    }

    /// A lookup of a name that was never registered is an internal error.
    pub fn get(&self, name: &str) -> Result<&[u32], CtsError> {
        self.binaries
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| CtsError::fatal(format!("program \"{}\" not found", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.binaries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.binaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.binaries.is_empty()
    }

    pub fn create_module(
        &self,
        device: &Arc<ash::Device>,
        name: &str,
    ) -> Result<Unique<vk::ShaderModule>, CtsError> {
        create_shader_module(device, self.get(name)?)
    }
}

pub fn create_shader_module(
    device: &Arc<ash::Device>,
    code: &[u32],
) -> Result<Unique<vk::ShaderModule>, CtsError> {
    let info = vk::ShaderModuleCreateInfo::default().code(code);
    let module = unsafe { device.create_shader_module(&info, None) }
        .vk_check("vkCreateShaderModule")?;
    Ok(Unique::new(device, module))
}

fn shader_kind(stage: ShaderStage) -> shaderc::ShaderKind {
    match stage {
        ShaderStage::Vertex => shaderc::ShaderKind::Vertex,
        ShaderStage::TessControl => shaderc::ShaderKind::TessControl,
        ShaderStage::TessEvaluation => shaderc::ShaderKind::TessEvaluation,
        ShaderStage::Geometry => shaderc::ShaderKind::Geometry,
        ShaderStage::Fragment => shaderc::ShaderKind::Fragment,
        ShaderStage::Compute => shaderc::ShaderKind::Compute,
        ShaderStage::RayGen => shaderc::ShaderKind::RayGeneration,
        ShaderStage::AnyHit => shaderc::ShaderKind::AnyHit,
        ShaderStage::ClosestHit => shaderc::ShaderKind::ClosestHit,
        ShaderStage::Miss => shaderc::ShaderKind::Miss,
        ShaderStage::Intersection => shaderc::ShaderKind::Intersection,
        ShaderStage::Callable => shaderc::ShaderKind::Callable,
    }
}

/// shaderc has returned both `Option` and `Result` from its constructors
/// across releases; accept either.
trait OrUnavailable<T> {
    fn or_unavailable(self, what: &str) -> Result<T, CtsError>;
}

impl<T> OrUnavailable<T> for Option<T> {
    fn or_unavailable(self, what: &str) -> Result<T, CtsError> {
        self.ok_or_else(|| CtsError::fatal(format!("{} unavailable", what)))
    }
}

impl<T, E: std::fmt::Display> OrUnavailable<T> for Result<T, E> {
    fn or_unavailable(self, what: &str) -> Result<T, CtsError> {
        self.map_err(|e| CtsError::fatal(format!("{} unavailable: {}", what, e)))
    }
}
