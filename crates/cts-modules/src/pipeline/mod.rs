//! Pipeline tests.

pub mod timestamp;

use cts_core::TestGroup;

use crate::registry::CaseBox;

pub fn create_tests() -> TestGroup<CaseBox> {
    let mut group = TestGroup::new("pipeline", "Pipeline tests");
    group.add_child(timestamp::create_tests());
    group
}
