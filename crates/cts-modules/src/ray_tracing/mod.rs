pub mod watertightness;

use cts_core::TestGroup;

use crate::registry::CaseBox;

pub fn create_tests() -> TestGroup<CaseBox> {
    let mut group = TestGroup::new("ray_tracing", "Ray tracing tests");
    group.add_child(watertightness::create_tests());
    group
}
