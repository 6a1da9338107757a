pub mod descriptor_copy;

use cts_core::TestGroup;

use crate::registry::CaseBox;

pub fn create_tests() -> TestGroup<CaseBox> {
    let mut group = TestGroup::new("binding_model", "Resource binding tests");
    group.add_child(descriptor_copy::create_tests());
    group
}
