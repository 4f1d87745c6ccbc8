//! Findings produced by scanner modules.

use crate::error::SiteprobeError;
use crate::types::{Category, ScanId, Severity, Timestamp};
use serde::{Deserialize, Serialize};

/// Where on the page a finding was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueLocation {
    /// Page URL
    pub url: String,
    /// CSS selector of the offending element, if any
    pub selector: Option<String>,
    /// Source line, if the engine reports one
    pub line: Option<u32>,
}

impl IssueLocation {
    /// Location pointing at a whole page.
    #[must_use]
    pub fn page(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            selector: None,
            line: None,
        }
    }

    /// Location pointing at one element on a page.
    #[must_use]
    pub fn element(url: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            selector: Some(selector.into()),
            line: None,
        }
    }
}

/// Lifecycle status of an issue. Only `Open` is ever written by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    /// Newly reported
    Open,
}

impl IssueStatus {
    /// Database/wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
        }
    }
}

/// A finding as produced by a module, before it is attached to a test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueDraft {
    /// Short title, e.g. "Missing Title Tag"
    pub title: String,
    /// What was found
    pub description: String,
    /// How bad it is
    pub severity: Severity,
    /// Where it was found
    pub location: IssueLocation,
    /// Captured outer HTML of the element
    pub element_snippet: Option<String>,
    /// Screenshot evidence
    pub screenshot_url: Option<String>,
    /// How to fix it
    pub recommendation: String,
}

impl IssueDraft {
    /// Create a page-level finding.
    ///
    /// # Errors
    /// Returns `SiteprobeError::Validation` if the title is blank.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
        location: IssueLocation,
        recommendation: impl Into<String>,
    ) -> Result<Self, SiteprobeError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(SiteprobeError::Validation(
                "issue title must not be empty".to_string(),
            ));
        }

        Ok(Self {
            title,
            description: description.into(),
            severity,
            location,
            element_snippet: None,
            screenshot_url: None,
            recommendation: recommendation.into(),
        })
    }

    /// Attach the captured element markup.
    #[must_use]
    pub fn with_element_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.element_snippet = Some(snippet.into());
        self
    }

    /// Attach a screenshot URL.
    #[must_use]
    pub fn with_screenshot_url(mut self, url: impl Into<String>) -> Self {
        self.screenshot_url = Some(url.into());
        self
    }
}

/// A persisted finding owned by exactly one test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// Unique identifier
    pub id: String,
    /// Owning scan
    pub scan_id: ScanId,
    /// Owning test run
    pub test_run_id: String,
    /// Mirrors the owning test run's category
    pub category: Category,
    /// Lifecycle status
    pub status: IssueStatus,
    /// When the issue was recorded
    pub created_at: Timestamp,
    /// Finding contents
    #[serde(flatten)]
    pub draft: IssueDraft,
}

impl Issue {
    /// Attach a draft to its owning test run.
    #[must_use]
    pub fn from_draft(
        scan_id: ScanId,
        test_run_id: impl Into<String>,
        category: Category,
        draft: IssueDraft,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            scan_id,
            test_run_id: test_run_id.into(),
            category,
            status: IssueStatus::Open,
            created_at: Timestamp::now(),
            draft,
        }
    }

    /// Severity shortcut.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.draft.severity
    }
}
