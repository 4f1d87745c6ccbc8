//! Aggregated scan outcome and the out-of-band progress message.

use crate::findings::Issue;
use crate::types::{Category, ScanId, ScanStatus, TestRunStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Screenshot URL per viewport name; `None` when that capture failed.
pub type ScreenshotUrls = BTreeMap<String, Option<String>>;

/// Aggregated outcome of a scan, stored on the scan record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Number of issues across all modules
    pub total_issues: u32,
    /// Issues with severity critical or high
    pub critical_issues: u32,
    /// Severity-weighted score, 0-100
    pub overall_score: u8,
    /// Modules that were invoked and returned
    pub completed_tests: u32,
    /// Modules enabled for the scan
    pub total_tests: u32,
    /// Modules whose test run ended in `failed`
    pub failed_tests: u32,
    /// Error that failed the scan, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Summary {
    /// Summary for a scan that failed before or during the module loop.
    #[must_use]
    pub fn failed(error: impl Into<String>, total_tests: u32) -> Self {
        Self {
            overall_score: 0,
            total_tests,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Test run state carried in a progress message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunUpdate {
    /// Test run identifier
    pub id: String,
    /// Category of the run
    pub category: Category,
    /// New status
    pub status: TestRunStatus,
    /// Category score once terminal
    pub score: Option<u8>,
    /// Failure reason, if failed
    pub error: Option<String>,
}

/// Out-of-band progress message keyed by scan id.
///
/// Every field is optional and applied independently by receivers; a message
/// is a partial patch, never a full replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanUpdate {
    /// Scan the message refers to
    pub scan_id: ScanId,
    /// New scan status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ScanStatus>,
    /// New progress value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Category currently executing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_test: Option<Category>,
    /// Test run state change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<TestRunUpdate>,
    /// Newly recorded issue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<Box<Issue>>,
    /// Final summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
    /// Failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanUpdate {
    /// Empty patch for `scan_id`.
    #[must_use]
    pub fn new(scan_id: ScanId) -> Self {
        Self {
            scan_id,
            status: None,
            progress: None,
            current_test: None,
            test: None,
            issue: None,
            summary: None,
            error: None,
        }
    }

    /// Set the status field.
    #[must_use]
    pub fn status(mut self, status: ScanStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the progress field.
    #[must_use]
    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Set the current test field.
    #[must_use]
    pub fn current_test(mut self, category: Category) -> Self {
        self.current_test = Some(category);
        self
    }

    /// Set the test run field.
    #[must_use]
    pub fn test(mut self, test: TestRunUpdate) -> Self {
        self.test = Some(test);
        self
    }

    /// Set the issue field.
    #[must_use]
    pub fn issue(mut self, issue: Issue) -> Self {
        self.issue = Some(Box::new(issue));
        self
    }

    /// Set the summary field.
    #[must_use]
    pub fn summary(mut self, summary: Summary) -> Self {
        self.summary = Some(summary);
        self
    }

    /// Set the error field.
    #[must_use]
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
