//! The test case / test instance protocol and the per-case driver.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use cts_core::{CtsError, SourceCollections, TestStatus};
use tracing::{debug, warn};

use crate::context::Context;
use crate::shader::BinaryCollection;

/// Static identity of one test: its parameters, programs and support rules.
pub trait TestCase: Send + Sync {
    /// Returns `CtsError::NotSupported` when a capability is missing.
    fn check_support(&self, _context: &Context) -> Result<(), CtsError> {
        Ok(())
    }

    fn init_programs(&self, _programs: &mut SourceCollections) {}

    fn create_instance<'a>(
        &self,
        context: &'a Context,
        binaries: &'a BinaryCollection,
    ) -> Result<Box<dyn TestInstance + 'a>, CtsError>;
}

/// Per-run state. `iterate` is called once and returns the verdict.
pub trait TestInstance {
    fn iterate(&mut self) -> Result<TestStatus, CtsError>;
}

/// Run one case end to end: support check, program compilation, instance
/// creation and iteration. Errors and panics are folded into the status.
pub fn execute_case(case: &dyn TestCase, context: &Context) -> TestStatus {
    let start = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_case(case, context)));
    let status = match outcome {
        Ok(Ok(status)) => status,
        Ok(Err(err)) => TestStatus::from(err),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!("test panicked: {}", message);
            TestStatus::internal_error(format!("panic: {}", message))
        }
    };
    debug!(
        "case finished in {:.2?}: {:?} ({})",
        start.elapsed(),
        status.code,
        status.description
    );
    status
}

fn run_case(case: &dyn TestCase, context: &Context) -> Result<TestStatus, CtsError> {
    case.check_support(context)?;

    let mut programs = SourceCollections::new();
    case.init_programs(&mut programs);
    let binaries = BinaryCollection::compile(&programs)?;

    let mut instance = case.create_instance(context, &binaries)?;
    instance.iterate()
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
