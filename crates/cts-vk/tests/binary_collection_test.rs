//! Integration test: program compilation
//!
//! Compiles GLSL through shaderc into a BinaryCollection and checks the
//! lookup rules. No Vulkan device is needed.
//!
//! Run with: cargo test --test binary_collection_test -- --nocapture

use cts_core::{CtsError, ErrorKind, ShaderStage, SourceCollections, SpirvTarget};
use cts_vk::ray_tracing::align_up;
use cts_vk::BinaryCollection;

const COMPUTE: &str = r#"#version 310 es
layout(local_size_x = 1) in;
layout(std430, binding = 0) buffer Out { int result[]; };
void main() { result[gl_GlobalInvocationID.x] = int(gl_GlobalInvocationID.x); }
"#;

const MISS: &str = r#"#version 460 core
#extension GL_EXT_ray_tracing : require
layout(location = 0) rayPayloadInEXT vec3 hitValue;
void main() { hitValue = vec3(0.0); }
"#;

#[test]
fn test_empty_collection() {
    let binaries = BinaryCollection::compile(&SourceCollections::new()).expect("compile");
    assert!(binaries.is_empty());
}

#[test]
fn test_compile_and_lookup() {
    let mut sources = SourceCollections::new();
    sources.add("comp", ShaderStage::Compute, COMPUTE);
    sources.add_with_target("miss", ShaderStage::Miss, MISS, SpirvTarget::Spirv1_4);

    let binaries = BinaryCollection::compile(&sources).expect("compile");
    assert_eq!(binaries.len(), 2);
    assert!(binaries.contains("comp"));

    let words = binaries.get("miss").expect("miss binary");
    println!("miss: {} words", words.len());
    assert_eq!(words[0], 0x0723_0203, "SPIR-V magic");
    assert_eq!(words[1], 0x0001_0400, "SPIR-V 1.4 header version");
}

#[test]
fn test_missing_program_is_internal_error() {
    let binaries = BinaryCollection::default();
    match binaries.get("frag") {
        Err(err @ CtsError::Fatal(_)) => {
            assert_eq!(err.kind(), ErrorKind::Fatal);
            assert_eq!(err.message(), "program \"frag\" not found");
        }
        other => panic!("expected Fatal, got {:?}", other),
    }
}

#[test]
fn test_compile_error_names_program() {
    let mut sources = SourceCollections::new();
    sources.add("broken", ShaderStage::Fragment, "#version 450\nvoid main() { nope }\n");

    match BinaryCollection::compile(&sources) {
        Err(CtsError::Shader { name, message }) => {
            println!("shader error: {}", message);
            assert_eq!(name, "broken");
        }
        other => panic!("expected Shader error, got {:?}", other.map(|b| b.len())),
    }
}

#[test]
fn test_align_up() {
    assert_eq!(align_up(32, 64), 64);
    assert_eq!(align_up(64, 64), 64);
    assert_eq!(align_up(65, 32), 96);
}
