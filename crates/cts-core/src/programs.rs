use std::collections::BTreeMap;

/// Pipeline stage a GLSL source is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    TessControl,
    TessEvaluation,
    Geometry,
    Fragment,
    Compute,
    RayGen,
    AnyHit,
    ClosestHit,
    Miss,
    Intersection,
    Callable,
}

/// SPIR-V version a program must be compiled to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpirvTarget {
    /// Whatever the Vulkan 1.2 environment defaults to.
    #[default]
    Default,
    /// Needed by ray tracing stages.
    Spirv1_4,
}

#[derive(Debug, Clone)]
pub struct ProgramSource {
    pub stage: ShaderStage,
    pub source: String,
    pub target: SpirvTarget,
}

/// Named GLSL sources produced by `init_programs`.
#[derive(Debug, Default)]
pub struct SourceCollections {
    programs: BTreeMap<String, ProgramSource>,
}

impl SourceCollections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, stage: ShaderStage, source: impl Into<String>) {
        self.add_with_target(name, stage, source, SpirvTarget::Default);
    }

    pub fn add_with_target(
        &mut self,
        name: impl Into<String>,
        stage: ShaderStage,
        source: impl Into<String>,
        target: SpirvTarget,
    ) {
        self.programs.insert(
            name.into(),
            ProgramSource {
                stage,
                source: source.into(),
                target,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&ProgramSource> {
        self.programs.get(name)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProgramSource)> {
        self.programs.iter().map(|(k, v)| (k.as_str(), v))
    }
}
