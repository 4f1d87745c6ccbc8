use super::{AccessibilityAuditor, Violation};
use crate::error::AuditError;
use async_trait::async_trait;
use siteprobe_browser::BrowserPage;
use std::path::PathBuf;

const RUN_EXPRESSION: &str = "axe.run(document).then(results => results.violations)";

/// Injects axe-core into the page and runs it once.
#[derive(Debug, Clone)]
pub struct AxeCore {
    script_path: Option<PathBuf>,
}

impl AxeCore {
    /// `script_path` points at `axe.min.js`.
    #[must_use]
    pub fn new(script_path: Option<PathBuf>) -> Self {
        Self { script_path }
    }

    /// Decode the violations array returned by `axe.run`.
    pub fn parse_violations(value: serde_json::Value) -> Result<Vec<Violation>, AuditError> {
        if value.is_null() {
            return Err(AuditError::Parse("axe returned no result".to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl AccessibilityAuditor for AxeCore {
    async fn run_accessibility_audit(
        &self,
        page: &dyn BrowserPage,
    ) -> Result<Vec<Violation>, AuditError> {
        let path = self.script_path.as_ref().ok_or_else(|| {
            AuditError::Engine("axe-core script path is not configured".to_string())
        })?;

        let script = tokio::fs::read_to_string(path).await?;
        page.evaluate(&script).await?;

        Self::parse_violations(page.evaluate(RUN_EXPRESSION).await?)
    }
}
