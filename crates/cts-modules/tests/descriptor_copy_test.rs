//! Integration test: descriptor copy reference model
//!
//! Builds descriptor layouts on the host and checks that recorded copies
//! update the reference data the verification shader is generated from.
//!
//! Run with: cargo test --test descriptor_copy_test -- --nocapture

use ash::vk;
use cts_modules::binding_model::descriptor_copy::cases::{generic_cases, generic_kinds};
use cts_modules::binding_model::descriptor_copy::model::{
    DescriptorCommands, DescriptorKind, PipelineType, FIRST_DESCRIPTOR_ID,
};

#[test]
fn test_ids_and_reference_data() {
    let mut c = DescriptorCommands::new(PipelineType::Compute);
    let plain = c.descriptor(DescriptorKind::UniformBuffer, 1, 0, 1, 3);
    let dynamic = c.descriptor(DescriptorKind::UniformBufferDynamic, 2, 0, 2, 3);

    assert_eq!(plain.id(), FIRST_DESCRIPTOR_ID);
    assert_eq!(dynamic.id(), FIRST_DESCRIPTOR_ID + 1);

    // Non-dynamic kinds ignore the requested area count.
    assert_eq!(plain.num_dynamic_areas(), 1);
    assert_eq!(plain.reference_data(0, 0), plain.id());

    assert_eq!(dynamic.num_dynamic_areas(), 3);
    assert_eq!(dynamic.reference_data(0, 2), dynamic.id() + 2);
    assert_eq!(dynamic.reference_data(1, 0), dynamic.id() + 3);
}

#[test]
fn test_copy_updates_destination() {
    let mut c = DescriptorCommands::new(PipelineType::Compute);
    let src = c.single(DescriptorKind::StorageBuffer);
    let dst = c.single(DescriptorKind::StorageBuffer);
    let src_id = src.id();
    c.add_descriptor(src, 0);
    c.add_descriptor(dst, 1);

    c.copy_single(0, 0, 1, 0).expect("copy");

    let copied = c.binding(1, 0).expect("binding");
    assert_eq!(copied.reference_data(0, 0), src_id);
    assert!(copied.elements()[0].copied_into);
    assert_eq!(c.copies().len(), 1);
    assert_eq!(c.set_count(), 2);
}

#[test]
fn test_array_copy_touches_only_the_copied_range() {
    let mut c = DescriptorCommands::new(PipelineType::Compute);
    let src = c.descriptor(DescriptorKind::StorageBuffer, 4, 0, 4, 1);
    let dst = c.descriptor(DescriptorKind::StorageBuffer, 4, 0, 4, 1);
    let src_elements = src.elements().to_vec();
    let dst_before = dst.elements().to_vec();
    c.add_descriptor(src, 0);
    c.add_descriptor(dst, 0);

    // Elements 1 and 2 of binding 0 over elements 1 and 2 of binding 1.
    c.copy_descriptor(0, 0, 1, 0, 1, 1, 2).expect("copy");

    let copied = c.binding(0, 1).expect("binding").elements();
    for k in [0, 3] {
        assert_eq!(copied[k], dst_before[k], "element {} changed", k);
        assert!(!copied[k].copied_into);
    }
    for k in [1, 2] {
        assert_eq!(copied[k].data, src_elements[k].data, "element {}", k);
        assert_ne!(copied[k].data, dst_before[k].data);
        assert!(copied[k].copied_into);
    }
    assert!(c.binding(0, 0).expect("source").elements().iter().all(|e| !e.copied_into));

    let copy = c.copies()[0];
    assert_eq!((copy.src_array_element, copy.dst_array_element, copy.count), (1, 1, 2));
}

#[test]
fn test_dynamic_copy_uses_common_areas() {
    let mut c = DescriptorCommands::new(PipelineType::Compute);
    let wide = c.descriptor(DescriptorKind::StorageBufferDynamic, 1, 0, 1, 3);
    let narrow = c.descriptor(DescriptorKind::StorageBufferDynamic, 1, 0, 1, 2);
    let wide2 = c.descriptor(DescriptorKind::StorageBufferDynamic, 1, 0, 1, 3);
    let wide_data = wide.elements()[0].data.clone();
    let wide2_data = wide2.elements()[0].data.clone();
    c.add_descriptor(wide, 0);
    c.add_descriptor(narrow, 0);
    c.add_descriptor(wide2, 0);

    // Three areas into two: the destination keeps its own length.
    c.copy_single(0, 0, 0, 1).expect("wide into narrow");
    let narrow_data = &c.binding(0, 1).expect("narrow").elements()[0].data;
    assert_eq!(narrow_data, &wide_data[..2]);

    // Two areas into three: the last area is left alone.
    c.copy_single(0, 1, 0, 2).expect("narrow into wide");
    let widened = &c.binding(0, 2).expect("wide2").elements()[0];
    assert_eq!(widened.data, vec![wide_data[0], wide_data[1], wide2_data[2]]);
    assert!(widened.copied_into);
}

#[test]
fn test_copy_from_unwritten_element_fails() {
    let mut c = DescriptorCommands::new(PipelineType::Graphics);
    let written = c.single(DescriptorKind::UniformBuffer);
    let unwritten = c.descriptor(DescriptorKind::UniformBuffer, 1, 0, 0, 1);
    c.add_descriptor(written, 0);
    c.add_descriptor(unwritten, 0);

    let err = c.copy_single(0, 1, 0, 0).unwrap_err();
    println!("{}", err);
    assert!(c.copy_single(0, 0, 0, 5).is_err());
}

#[test]
fn test_inline_uniform_block_copy_is_scaled_to_bytes() {
    let mut c = DescriptorCommands::new(PipelineType::Compute);
    for _ in 0..2 {
        let d = c.descriptor(DescriptorKind::InlineUniformBlock, 4, 0, 4, 1);
        assert_eq!(d.layout_count(), 64);
        assert_eq!(d.descriptor_count(), 1);
        c.add_descriptor(d, 0);
    }

    c.copy_descriptor(0, 0, 1, 0, 1, 2, 2).expect("copy");
    let copy = c.copies()[0];
    assert_eq!(copy.src_array_element, 16);
    assert_eq!(copy.dst_array_element, 32);
    assert_eq!(copy.count, 32);
}

#[test]
fn test_result_buffer_only_for_compute() {
    let mut compute = DescriptorCommands::new(PipelineType::Compute);
    compute.add_result_buffer();
    assert!(compute.result_buffer_id().is_some());
    assert_eq!(compute.set_bindings(0).count(), 1);

    let mut graphics = DescriptorCommands::new(PipelineType::Graphics);
    graphics.add_result_buffer();
    assert!(graphics.result_buffer_id().is_none());
    assert_eq!(graphics.set_count(), 0);
}

#[test]
fn test_pool_sizes_and_dynamic_offsets() {
    let mut c = DescriptorCommands::new(PipelineType::Compute);
    for _ in 0..2 {
        let d = c.descriptor(DescriptorKind::StorageBufferDynamic, 1, 0, 1, 3);
        c.add_descriptor(d, 0);
    }
    let d = c.descriptor(DescriptorKind::SampledImage, 3, 0, 3, 1);
    c.add_descriptor(d, 1);
    c.set_dynamic_areas(vec![2, 1]);

    assert_eq!(
        c.pool_sizes(),
        vec![
            (vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, 2),
            (vk::DescriptorType::SAMPLED_IMAGE, 3),
        ]
    );
    assert_eq!(c.dynamic_offsets(), vec![512, 256]);
}

#[test]
fn test_generic_tables_build() {
    for pipeline in [PipelineType::Compute, PipelineType::Graphics] {
        for (prefix, kind) in generic_kinds(pipeline) {
            for (suffix, built) in generic_cases(kind, pipeline) {
                let commands = built.unwrap_or_else(|e| panic!("{}{}: {}", prefix, suffix, e));
                assert!(!commands.shader_declarations().is_empty());
            }
        }
    }
}
