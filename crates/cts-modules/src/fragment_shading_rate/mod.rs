//! VK_KHR_fragment_shading_rate tests.

pub mod pixel_consistency;

use cts_core::TestGroup;

use crate::registry::CaseBox;

pub fn create_tests() -> TestGroup<CaseBox> {
    let mut group = TestGroup::new("fragment_shading_rate", "Fragment shading rate tests");
    group.add_child(pixel_consistency::create_tests());
    group
}
