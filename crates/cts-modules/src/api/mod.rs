pub mod fill_buffer;

use cts_core::TestGroup;

use crate::registry::CaseBox;

pub fn create_tests() -> TestGroup<CaseBox> {
    let mut group = TestGroup::new("api", "API Tests");
    group.add_child(fill_buffer::create_tests());
    group
}
