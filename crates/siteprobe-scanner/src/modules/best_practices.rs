use super::{AuditContext, IssueRecorder, ScannerModule};
use crate::error::AuditError;
use crate::scoring::{self, STANDARD_DEDUCTION};
use async_trait::async_trait;
use siteprobe_browser::ConsoleMessage;
use siteprobe_core::{Category, IssueDraft, IssueLocation, Severity};

const SAMPLE_MESSAGES: usize = 5;

/// Console errors logged while the page loads.
#[derive(Debug, Default, Clone, Copy)]
pub struct BestPracticesModule;

impl BestPracticesModule {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// One issue summarizing every console error, or none.
pub fn check_console(url: &str, messages: &[ConsoleMessage]) -> Result<Option<IssueDraft>, AuditError> {
    let errors: Vec<&ConsoleMessage> = messages.iter().filter(|m| m.is_error()).collect();
    if errors.is_empty() {
        return Ok(None);
    }

    let sample = errors
        .iter()
        .take(SAMPLE_MESSAGES)
        .map(|m| m.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    Ok(Some(
        IssueDraft::new(
            "Console Errors Detected",
            format!("{} console error(s) were logged while the page loaded.", errors.len()),
            Severity::Medium,
            IssueLocation::page(url),
            "Fix the scripts or resources that log errors to the browser console.",
        )?
        .with_element_snippet(sample),
    ))
}

#[async_trait]
impl ScannerModule for BestPracticesModule {
    fn category(&self) -> Category {
        Category::BestPractices
    }

    async fn audit(
        &self,
        ctx: &AuditContext<'_>,
        recorder: &mut IssueRecorder<'_>,
    ) -> Result<u8, AuditError> {
        // Capture must be open before the page loads
        let capture = ctx.page.capture_console(ctx.max_console_messages).await?;
        ctx.page
            .goto(ctx.url.as_str(), ctx.navigation_timeout)
            .await?;
        tokio::time::sleep(ctx.settle_delay).await;
        let messages = capture.finish();

        if let Some(draft) = check_console(ctx.url.as_str(), &messages)? {
            recorder.record(draft).await;
        }

        Ok(scoring::flat_deduction(recorder.len(), STANDARD_DEDUCTION))
    }
}
