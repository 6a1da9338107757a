//! Per-run record of case verdicts, shared by the pretty and JSON outputs.

use serde::{Deserialize, Serialize};

use crate::status::{StatusCode, TestStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub path: String,
    pub status: StatusCode,
    pub description: String,
    pub duration_ms: u64,
}

/// Case counts per verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub quality_warnings: usize,
    pub not_supported: usize,
    pub internal_errors: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.quality_warnings + self.not_supported + self.internal_errors
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub device: String,
    pub results: Vec<CaseResult>,
}

impl RunReport {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            results: Vec::new(),
        }
    }

    pub fn record(&mut self, path: impl Into<String>, status: TestStatus, duration_ms: u64) {
        self.results.push(CaseResult {
            path: path.into(),
            status: status.code,
            description: status.description,
            duration_ms,
        });
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for result in &self.results {
            match result.status {
                StatusCode::Pass => summary.passed += 1,
                StatusCode::Fail => summary.failed += 1,
                StatusCode::QualityWarning => summary.quality_warnings += 1,
                StatusCode::NotSupported => summary.not_supported += 1,
                StatusCode::InternalError => summary.internal_errors += 1,
            }
        }
        summary
    }

    /// True if any case failed or hit an internal error.
    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| r.status.is_failure())
    }
}
