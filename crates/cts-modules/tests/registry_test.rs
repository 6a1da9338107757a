//! Integration test: test tree assembly
//!
//! Builds the whole hierarchy without a device and checks that every
//! case path is unique and that representative cases resolve.
//!
//! Run with: cargo test --test registry_test -- --nocapture

use cts_core::TestFilter;
use cts_modules::create_test_tree;

#[test]
fn test_paths_are_unique() {
    let tree = create_test_tree();
    println!("{} cases", tree.case_count());
    assert_eq!(tree.find_duplicate_path(), None);
}

#[test]
fn test_known_paths_resolve() {
    let tree = create_test_tree();
    let paths = [
        "cts.api.fill_and_update_buffer.suballocation.fill_buffer_vk_whole_size_1_extra_bytes_offset_4",
        "cts.api.fill_and_update_buffer.suballocation_transfer_queue.update_buffer_second_part",
        "cts.binding_model.descriptor_copy.compute.uniform_buffer_0",
        "cts.binding_model.descriptor_copy.graphics.input_attachment_array2",
        "cts.pipeline.timestamp.basic_graphics_tests.vertex_shader_stage_in_render_pass",
        "cts.pipeline.timestamp.advanced_graphics_tests.draw_indirect_stage_in_render_pass",
        "cts.pipeline.timestamp.advanced_graphics_tests.geometry_shader_stage_out_of_render_pass_host_query_reset_with_availability_bit",
        "cts.pipeline.timestamp.transfer_tests.transfer_stage_with_copy_buffer_method",
        "cts.pipeline.timestamp.calibrated.calibration_test",
        "cts.pipeline.timestamp.misc_tests.two_cmd_buffers_secondary_host_query_reset",
        "cts.pipeline.timestamp.misc_tests.consistent_results",
        "cts.ray_tracing.watertightness.0.4",
        "cts.ray_tracing.watertightness.closedFan2.1024",
        "cts.fragment_shading_rate.pixel_consistency.rate_1x1.samples_1.extent_1x1",
        "cts.fragment_shading_rate.pixel_consistency.rate_4x2.samples_4.extent_256x256_zw_coord",
        "cts.synchronization.smoke.fences",
        "cts.synchronization.smoke.binary_semaphores",
        "cts.synchronization.smoke.timeline_semaphores",
        "cts.synchronization.internally_synchronized_objects.pipeline_cache_graphics",
    ];
    for path in paths {
        assert!(tree.find(path).is_some(), "missing {}", path);
    }
    assert!(tree.find("cts.synchronization.smoke").is_none());
    // Compute pipelines have no input attachments.
    assert!(tree
        .find("cts.binding_model.descriptor_copy.compute.input_attachment_0")
        .is_none());
}

#[test]
fn test_zw_coord_variants_only_for_wide_extents() {
    let tree = create_test_tree();
    let zw: Vec<String> = tree
        .cases()
        .into_iter()
        .map(|(path, _)| path)
        .filter(|p| p.ends_with("_zw_coord"))
        .collect();
    assert!(!zw.is_empty());
    for path in &zw {
        assert!(
            path.contains("extent_151x431") || path.contains("extent_256x256"),
            "{}",
            path
        );
        assert!(path.contains("samples_1.") || path.contains("samples_4."), "{}", path);
    }
}

#[test]
fn test_filter_selects_subtree() {
    let tree = create_test_tree();
    let filter = TestFilter::new(vec!["cts.synchronization.*".into()], Vec::new());
    let selected: Vec<String> = tree
        .cases()
        .into_iter()
        .map(|(path, _)| path)
        .filter(|p| filter.matches(p))
        .collect();
    assert_eq!(selected.len(), 5);
}

#[test]
fn test_advanced_graphics_group_size() {
    let tree = create_test_tree();
    let filter = TestFilter::new(
        vec!["cts.pipeline.timestamp.advanced_graphics_tests.*".into()],
        Vec::new(),
    );
    let selected: Vec<String> = tree
        .cases()
        .into_iter()
        .map(|(path, _)| path)
        .filter(|p| filter.matches(p))
        .collect();
    // Four stages, two result flag sets, four render pass / reset variants.
    assert_eq!(selected.len(), 32);
    for stage in [
        "tessellation_control_shader_stage_",
        "tessellation_evaluation_shader_stage_",
    ] {
        assert_eq!(selected.iter().filter(|p| p.contains(stage)).count(), 8, "{}", stage);
    }
}
