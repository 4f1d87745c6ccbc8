use super::{AuditContext, IssueRecorder, ScannerModule};
use crate::error::AuditError;
use crate::scoring::{self, STANDARD_DEDUCTION};
use async_trait::async_trait;
use siteprobe_browser::NavigationResponse;
use siteprobe_core::{Category, IssueDraft, IssueLocation, Severity};
use url::Url;

/// Transport and response header checks.
#[derive(Debug, Default, Clone, Copy)]
pub struct SecurityModule;

impl SecurityModule {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Issue for a target that is not served over HTTPS.
pub fn check_scheme(url: &Url) -> Result<Option<IssueDraft>, AuditError> {
    if url.scheme() == "https" {
        return Ok(None);
    }
    Ok(Some(IssueDraft::new(
        "No HTTPS",
        format!("The page is served over {}, so traffic can be read or modified in transit.", url.scheme()),
        Severity::High,
        IssueLocation::page(url.as_str()),
        "Serve the site over HTTPS and redirect all HTTP requests to it.",
    )?))
}

/// Issues for security headers missing from the main document response.
pub fn check_headers(url: &str, response: &NavigationResponse) -> Result<Vec<IssueDraft>, AuditError> {
    let mut drafts = Vec::new();

    if response.header("content-security-policy").is_none() {
        drafts.push(IssueDraft::new(
            "Missing Content-Security-Policy Header",
            "The response has no Content-Security-Policy header, leaving the page more exposed to cross-site scripting.",
            Severity::Medium,
            IssueLocation::page(url),
            "Add a Content-Security-Policy header that restricts script, style and frame sources.",
        )?);
    }

    if response.header("x-frame-options").is_none() {
        drafts.push(IssueDraft::new(
            "Missing X-Frame-Options Header",
            "The response has no X-Frame-Options header, so the page can be framed by other sites.",
            Severity::Medium,
            IssueLocation::page(url),
            "Send X-Frame-Options: DENY or SAMEORIGIN.",
        )?);
    }

    Ok(drafts)
}

#[async_trait]
impl ScannerModule for SecurityModule {
    fn category(&self) -> Category {
        Category::Security
    }

    async fn audit(
        &self,
        ctx: &AuditContext<'_>,
        recorder: &mut IssueRecorder<'_>,
    ) -> Result<u8, AuditError> {
        if let Some(draft) = check_scheme(ctx.url)? {
            recorder.record(draft).await;
        }

        // Re-fetch to read the document response headers
        let response = ctx
            .page
            .goto(ctx.url.as_str(), ctx.navigation_timeout)
            .await?;

        for draft in check_headers(ctx.url.as_str(), &response)? {
            recorder.record(draft).await;
        }

        Ok(scoring::flat_deduction(recorder.len(), STANDARD_DEDUCTION))
    }
}
