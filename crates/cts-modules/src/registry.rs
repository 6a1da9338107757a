//! The full test hierarchy, rooted at `cts`.

use cts_core::TestGroup;
use cts_vk::TestCase;
use tracing::debug;

use crate::{api, binding_model, fragment_shading_rate, pipeline, ray_tracing, synchronization};

/// How cases are stored in the tree.
pub type CaseBox = Box<dyn TestCase>;

pub fn create_test_tree() -> TestGroup<CaseBox> {
    let mut root = TestGroup::new("cts", "Vulkan conformance tests");
    root.add_child(api::create_tests());
    root.add_child(binding_model::create_tests());
    root.add_child(pipeline::create_tests());
    root.add_child(ray_tracing::create_tests());
    root.add_child(fragment_shading_rate::create_tests());
    root.add_child(synchronization::create_tests());
    debug!("test tree assembled with {} cases", root.case_count());
    root
}
