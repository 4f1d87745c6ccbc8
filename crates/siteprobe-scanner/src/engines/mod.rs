//! Third-party audit engines behind small traits.
//!
//! Modules depend only on [`PerformanceAuditor`] and [`AccessibilityAuditor`];
//! the adapters here drive the real tools.

mod axe;
mod lighthouse;

pub use axe::AxeCore;
pub use lighthouse::LighthouseCli;

use crate::error::AuditError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use siteprobe_browser::BrowserPage;
use std::collections::HashMap;

/// One named audit from a performance run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// `0.0..=1.0`; `None` when the audit is informative or not applicable
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub display_value: Option<String>,
}

/// Output of a performance-only audit pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerformanceReport {
    /// Category score in `0.0..=1.0`
    pub category_score: Option<f64>,
    /// Audits keyed by id (e.g. `server-response-time`)
    pub audits: HashMap<String, AuditResult>,
}

/// Runs a performance audit against a URL through the browser's control port.
#[async_trait]
pub trait PerformanceAuditor: Send + Sync {
    async fn run_performance_audit(
        &self,
        url: &str,
        control_port: Option<u16>,
    ) -> Result<PerformanceReport, AuditError>;
}

/// One step of an axe target path.
///
/// A plain step is a CSS selector. Nodes inside shadow roots come back as a
/// list of selectors, one per shadow host, ending at the node itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSelector {
    Css(String),
    Shadow(Vec<String>),
}

impl TargetSelector {
    /// Separator placed between shadow hosts in a flattened selector
    pub const SHADOW_SEPARATOR: &'static str = " >>> ";

    /// Flatten into a single selector string.
    pub fn to_selector(&self) -> String {
        match self {
            Self::Css(selector) => selector.clone(),
            Self::Shadow(path) => path.join(Self::SHADOW_SEPARATOR),
        }
    }
}

impl From<&str> for TargetSelector {
    fn from(selector: &str) -> Self {
        Self::Css(selector.to_string())
    }
}

/// A DOM node affected by an accessibility violation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationNode {
    #[serde(default)]
    pub html: String,
    /// Selector path to the node, outermost frame first
    #[serde(default)]
    pub target: Vec<TargetSelector>,
    #[serde(default)]
    pub failure_summary: Option<String>,
}

impl ViolationNode {
    /// The node's target flattened to one selector, if axe reported one.
    pub fn selector(&self) -> Option<String> {
        if self.target.is_empty() {
            return None;
        }
        let parts: Vec<String> = self.target.iter().map(TargetSelector::to_selector).collect();
        Some(parts.join(" "))
    }
}

/// One violated accessibility rule and every node it affects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub id: String,
    /// `critical`, `serious`, `moderate`, `minor`, or absent
    #[serde(default)]
    pub impact: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub help_url: Option<String>,
    #[serde(default)]
    pub nodes: Vec<ViolationNode>,
}

/// Runs a DOM accessibility rule engine once against the current page.
#[async_trait]
pub trait AccessibilityAuditor: Send + Sync {
    async fn run_accessibility_audit(
        &self,
        page: &dyn BrowserPage,
    ) -> Result<Vec<Violation>, AuditError>;
}
