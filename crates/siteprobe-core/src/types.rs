//! Shared types used across Siteprobe.
//!
//! Newtypes and closed enums for scans, test runs and findings. Every value
//! that crosses a persistence or wire boundary round-trips through `as_str`
//! and `FromStr` so the database never holds a value the code cannot parse.

use crate::error::SiteprobeError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use url::Url;

/// Caller-supplied scan identifier.
///
/// Scan IDs are 1-128 characters of ASCII letters, digits, `-` or `_`, which
/// covers UUIDs and most database keys callers hand us.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScanId(String);

impl ScanId {
    /// Create a new `ScanId` from a string.
    ///
    /// # Errors
    /// Returns error if the ID is empty, too long, or contains other characters.
    pub fn new(id: impl Into<String>) -> Result<Self, SiteprobeError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> Result<(), SiteprobeError> {
        static SCAN_ID_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex =
            SCAN_ID_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("valid regex"));

        if regex.is_match(id) {
            Ok(())
        } else {
            Err(SiteprobeError::Validation(format!(
                "invalid scan ID: must be 1-128 characters of [A-Za-z0-9_-], got '{id}'"
            )))
        }
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ScanId {
    type Error = SiteprobeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ScanId> for String {
    fn from(id: ScanId) -> Self {
        id.0
    }
}

/// Parse and validate a scan target URL.
///
/// Only absolute `http`/`https` URLs with a host are accepted.
///
/// # Errors
/// Returns `SiteprobeError::Validation` for anything else.
pub fn parse_target_url(raw: &str) -> Result<Url, SiteprobeError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| SiteprobeError::Validation(format!("invalid url '{raw}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(SiteprobeError::Validation(format!(
            "invalid url '{raw}': scheme must be http or https"
        )));
    }
    if url.host_str().is_none() {
        return Err(SiteprobeError::Validation(format!(
            "invalid url '{raw}': missing host"
        )));
    }

    Ok(url)
}

/// Severity of a single finding.
///
/// Ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Blocks usage or exposes users to serious harm
    Critical,
    /// Significant problem that should be fixed soon
    High,
    /// Noticeable problem
    Medium,
    /// Minor polish item
    Low,
}

impl Severity {
    /// Points deducted from the overall scan score for one issue of this severity.
    #[must_use]
    pub fn weight(self) -> u32 {
        match self {
            Self::Critical => 20,
            Self::High => 10,
            Self::Medium => 5,
            Self::Low => 2,
        }
    }

    /// Map an accessibility-engine impact level onto a severity.
    ///
    /// Unknown or absent impacts map to `Medium`.
    #[must_use]
    pub fn from_impact(impact: Option<&str>) -> Self {
        match impact {
            Some("critical") => Self::Critical,
            Some("serious") => Self::High,
            Some("moderate") => Self::Medium,
            Some("minor") => Self::Low,
            _ => Self::Medium,
        }
    }

    /// Whether this severity counts toward the summary's critical count.
    #[must_use]
    pub fn is_critical_or_high(self) -> bool {
        matches!(self, Self::Critical | Self::High)
    }

    /// Database/wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = SiteprobeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(SiteprobeError::Validation(format!(
                "unknown severity '{other}'"
            ))),
        }
    }
}

/// Audit category handled by one scanner module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Page speed metrics
    Performance,
    /// DOM accessibility rules
    Accessibility,
    /// Search engine metadata
    Seo,
    /// Transport and header hardening
    Security,
    /// Console hygiene
    BestPractices,
}

impl Category {
    /// Every category, in the order modules run.
    ///
    /// Order matters: Security re-navigates the page and Best Practices opens
    /// its console capture before its own navigation.
    pub const ALL: [Self; 5] = [
        Self::Performance,
        Self::Accessibility,
        Self::Seo,
        Self::Security,
        Self::BestPractices,
    ];

    /// Database/wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Performance => "performance",
            Self::Accessibility => "accessibility",
            Self::Seo => "seo",
            Self::Security => "security",
            Self::BestPractices => "best_practices",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = SiteprobeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| SiteprobeError::Validation(format!("unknown category '{s}'")))
    }
}

/// Lifecycle status of a scan.
///
/// The only legal path is `Queued -> Running -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// Accepted, not yet started
    Queued,
    /// Orchestrator is working on it
    Running,
    /// All enabled modules were invoked
    Completed,
    /// Setup failed or an error escaped the module loop
    Failed,
}

impl ScanStatus {
    /// Whether the status is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Statuses from which `self` may be entered.
    #[must_use]
    pub fn predecessors(self) -> &'static [Self] {
        match self {
            Self::Queued => &[],
            Self::Running => &[Self::Queued],
            Self::Completed | Self::Failed => &[Self::Running],
        }
    }

    /// Database/wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = SiteprobeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(SiteprobeError::Validation(format!(
                "unknown scan status '{other}'"
            ))),
        }
    }
}

/// Status of one category's test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestRunStatus {
    /// Module is executing
    Running,
    /// Module finished and produced a score
    Completed,
    /// Module hit an error or timed out
    Failed,
}

impl TestRunStatus {
    /// Database/wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TestRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestRunStatus {
    type Err = SiteprobeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(SiteprobeError::Validation(format!(
                "unknown test run status '{other}'"
            ))),
        }
    }
}

/// Per-category enable switches. Absent means enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestToggles {
    /// Run the performance module
    pub performance: Option<bool>,
    /// Run the accessibility module
    pub accessibility: Option<bool>,
    /// Run the SEO module
    pub seo: Option<bool>,
    /// Run the security module
    pub security: Option<bool>,
    /// Run the best-practices module
    pub best_practices: Option<bool>,
}

impl TestToggles {
    /// Whether `category` is switched on.
    #[must_use]
    pub fn is_enabled(&self, category: Category) -> bool {
        let toggle = match category {
            Category::Performance => self.performance,
            Category::Accessibility => self.accessibility,
            Category::Seo => self.seo,
            Category::Security => self.security,
            Category::BestPractices => self.best_practices,
        };
        toggle.unwrap_or(true)
    }
}

/// Scan settings supplied with the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Which modules run
    pub tests: TestToggles,
}

impl ScanSettings {
    /// Settings with only the given categories enabled.
    #[must_use]
    pub fn only(categories: &[Category]) -> Self {
        let on = |c: Category| Some(categories.contains(&c));
        Self {
            tests: TestToggles {
                performance: on(Category::Performance),
                accessibility: on(Category::Accessibility),
                seo: on(Category::Seo),
                security: on(Category::Security),
                best_practices: on(Category::BestPractices),
            },
        }
    }

    /// Enabled categories in execution order.
    #[must_use]
    pub fn enabled_categories(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| self.tests.is_enabled(*c))
            .collect()
    }
}

/// Wrapper around `chrono::DateTime<Utc>` for consistent timestamp handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a timestamp representing the current moment.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Get the inner `DateTime<Utc>`.
    #[must_use]
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Parse a timestamp from an RFC3339 string.
    pub fn from_rfc3339(s: &str) -> Result<Self, SiteprobeError> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(|e| SiteprobeError::Validation(format!("invalid timestamp: {e}")))
    }

    /// Format as RFC3339 string.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}
