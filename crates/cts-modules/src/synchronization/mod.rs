//! Synchronization tests: smoke tests for fences and semaphores, and
//! internally synchronized objects under concurrent use.

pub mod internally_synchronized;
pub mod smoke;

use cts_core::TestGroup;

use crate::registry::CaseBox;

pub fn create_tests() -> TestGroup<CaseBox> {
    let mut group = TestGroup::new("synchronization", "Synchronization tests");
    group.add_child(smoke::create_tests());
    group.add_child(internally_synchronized::create_tests());
    group
}
