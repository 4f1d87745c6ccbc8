use super::{AuditContext, IssueRecorder, ScannerModule};
use crate::engines::{AccessibilityAuditor, Violation, ViolationNode};
use crate::error::AuditError;
use crate::scoring::{self, ACCESSIBILITY_DEDUCTION};
use async_trait::async_trait;
use siteprobe_core::{Category, IssueDraft, IssueLocation, Severity};
use std::sync::Arc;

/// DOM accessibility rules, one issue per affected node.
pub struct AccessibilityModule {
    engine: Arc<dyn AccessibilityAuditor>,
}

impl AccessibilityModule {
    pub fn new(engine: Arc<dyn AccessibilityAuditor>) -> Self {
        Self { engine }
    }
}

fn node_draft(
    url: &str,
    violation: &Violation,
    node: &ViolationNode,
) -> Result<IssueDraft, AuditError> {
    let title = if violation.help.trim().is_empty() {
        violation.id.as_str()
    } else {
        violation.help.as_str()
    };

    let mut recommendation = node
        .failure_summary
        .clone()
        .unwrap_or_else(|| violation.help.clone());
    if let Some(help_url) = &violation.help_url {
        recommendation = format!("{recommendation}\nSee {help_url}");
    }

    let location = match node.selector() {
        Some(selector) => IssueLocation::element(url, selector),
        None => IssueLocation::page(url),
    };

    let mut draft = IssueDraft::new(
        title,
        violation.description.clone(),
        Severity::from_impact(violation.impact.as_deref()),
        location,
        recommendation,
    )?;
    if !node.html.is_empty() {
        draft = draft.with_element_snippet(node.html.clone());
    }
    Ok(draft)
}

#[async_trait]
impl ScannerModule for AccessibilityModule {
    fn category(&self) -> Category {
        Category::Accessibility
    }

    async fn audit(
        &self,
        ctx: &AuditContext<'_>,
        recorder: &mut IssueRecorder<'_>,
    ) -> Result<u8, AuditError> {
        let violations = self.engine.run_accessibility_audit(ctx.page).await?;

        for violation in &violations {
            for node in &violation.nodes {
                recorder
                    .record(node_draft(ctx.url.as_str(), violation, node)?)
                    .await;
            }
        }

        Ok(scoring::flat_deduction(recorder.len(), ACCESSIBILITY_DEDUCTION))
    }
}
