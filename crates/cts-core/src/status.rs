use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{CtsError, ErrorKind};

/// Outcome of a single test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Pass,
    NotSupported,
    QualityWarning,
    Fail,
    InternalError,
}

impl StatusCode {
    /// Severity used when merging results; larger is worse.
    fn severity(self) -> u8 {
        match self {
            StatusCode::Pass => 0,
            StatusCode::NotSupported => 1,
            StatusCode::QualityWarning => 2,
            StatusCode::Fail => 3,
            StatusCode::InternalError => 4,
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(self, StatusCode::Fail | StatusCode::InternalError)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStatus {
    pub code: StatusCode,
    pub description: String,
}

impl TestStatus {
    fn new(code: StatusCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    pub fn pass(description: impl Into<String>) -> Self {
        Self::new(StatusCode::Pass, description)
    }

    pub fn fail(description: impl Into<String>) -> Self {
        Self::new(StatusCode::Fail, description)
    }

    pub fn quality_warning(description: impl Into<String>) -> Self {
        Self::new(StatusCode::QualityWarning, description)
    }

    pub fn not_supported(description: impl Into<String>) -> Self {
        Self::new(StatusCode::NotSupported, description)
    }

    pub fn internal_error(description: impl Into<String>) -> Self {
        Self::new(StatusCode::InternalError, description)
    }

    pub fn is_pass(&self) -> bool {
        self.code == StatusCode::Pass
    }
}

impl From<CtsError> for TestStatus {
    fn from(err: CtsError) -> Self {
        let message = err.message();
        match err.kind() {
            ErrorKind::NotSupported => TestStatus::not_supported(message),
            ErrorKind::VerificationFailed => TestStatus::fail(message),
            ErrorKind::QualityWarning => TestStatus::quality_warning(message),
            ErrorKind::Fatal => TestStatus::internal_error(message),
        }
    }
}

// ── Result aggregation ──────────────────────────────────────────────────────

struct Collected {
    code: StatusCode,
    messages: Vec<String>,
}

/// Thread-safe accumulator for results produced by several workers.
/// The worst result wins; every non-pass message is kept.
pub struct ResultCollector {
    inner: Mutex<Collected>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Collected {
                code: StatusCode::Pass,
                messages: Vec::new(),
            }),
        }
    }

    pub fn add_result(&self, code: StatusCode, message: impl Into<String>) {
        let mut inner = self.inner.lock();
        if code != StatusCode::Pass {
            inner.messages.push(message.into());
        }
        if code.severity() > inner.code.severity() {
            inner.code = code;
        }
    }

    pub fn add_status(&self, status: TestStatus) {
        self.add_result(status.code, status.description);
    }

    pub fn fail(&self, message: impl Into<String>) {
        self.add_result(StatusCode::Fail, message);
    }

    /// Record a failure unless `condition` holds. Returns `condition`.
    pub fn check(&self, condition: bool, message: impl Into<String>) -> bool {
        if !condition {
            self.fail(message);
        }
        condition
    }

    pub fn get_result(&self) -> TestStatus {
        let inner = self.inner.lock();
        if inner.code == StatusCode::Pass {
            return TestStatus::pass("Pass");
        }
        TestStatus::new(inner.code, inner.messages.join("; "))
    }
}

impl Default for ResultCollector {
    fn default() -> Self {
        Self::new()
    }
}
