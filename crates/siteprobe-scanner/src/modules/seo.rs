use super::{AuditContext, IssueRecorder, ScannerModule};
use crate::error::AuditError;
use crate::scoring::{self, STANDARD_DEDUCTION};
use async_trait::async_trait;
use scraper::{Html, Selector};
use siteprobe_core::{Category, IssueDraft, IssueLocation, Severity};

/// Longest title, in characters, before it is flagged.
pub const MAX_TITLE_LENGTH: usize = 60;

/// Longest meta description, in characters, before it is flagged.
pub const MAX_DESCRIPTION_LENGTH: usize = 160;

/// Title, meta description and H1 checks on the rendered DOM.
#[derive(Debug, Default, Clone, Copy)]
pub struct SeoModule;

impl SeoModule {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn selector(css: &str) -> Result<Selector, AuditError> {
    Selector::parse(css).map_err(|e| AuditError::Parse(format!("selector {css}: {e}")))
}

/// Inspect serialized HTML and return the drafts for every failed check.
pub fn check_document(html: &str, url: &str) -> Result<Vec<IssueDraft>, AuditError> {
    let document = Html::parse_document(html);
    let mut drafts = Vec::new();

    let title = document
        .select(&selector("title")?)
        .next()
        .map(|t| t.text().collect::<String>())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    match title {
        None => drafts.push(
            IssueDraft::new(
                "Missing Title Tag",
                "The page has no title, or the title is empty.",
                Severity::High,
                IssueLocation::element(url, "head > title"),
                "Add a unique, descriptive <title> element to the page head.",
            )?,
        ),
        Some(title) if title.chars().count() > MAX_TITLE_LENGTH => drafts.push(
            IssueDraft::new(
                "Title Tag Too Long",
                format!(
                    "The title is {} characters long; search results truncate titles after about {} characters.",
                    title.chars().count(),
                    MAX_TITLE_LENGTH
                ),
                Severity::Medium,
                IssueLocation::element(url, "head > title"),
                format!("Shorten the title to {MAX_TITLE_LENGTH} characters or fewer."),
            )?
            .with_element_snippet(format!("<title>{title}</title>")),
        ),
        Some(_) => {}
    }

    let description = document
        .select(&selector(r#"meta[name="description"]"#)?)
        .next()
        .and_then(|m| m.value().attr("content"))
        .map(str::trim)
        .filter(|d| !d.is_empty());

    match description {
        None => drafts.push(IssueDraft::new(
            "Missing Meta Description",
            "The page has no meta description.",
            Severity::High,
            IssueLocation::element(url, r#"meta[name="description"]"#),
            "Add a <meta name=\"description\"> tag summarizing the page content.",
        )?),
        Some(d) if d.chars().count() > MAX_DESCRIPTION_LENGTH => drafts.push(IssueDraft::new(
            "Meta Description Too Long",
            format!(
                "The meta description is {} characters long; search results truncate after about {} characters.",
                d.chars().count(),
                MAX_DESCRIPTION_LENGTH
            ),
            Severity::Medium,
            IssueLocation::element(url, r#"meta[name="description"]"#),
            format!("Shorten the meta description to {MAX_DESCRIPTION_LENGTH} characters or fewer."),
        )?),
        Some(_) => {}
    }

    // With more than one H1, each heading is reported at its own element
    let headings: Vec<_> = document.select(&selector("h1")?).collect();
    match headings.len() {
        0 => drafts.push(IssueDraft::new(
            "Missing H1 Tag",
            "The page has no H1 heading.",
            Severity::High,
            IssueLocation::page(url),
            "Add a single H1 heading that describes the page content.",
        )?),
        1 => {}
        n => {
            for (i, heading) in headings.iter().enumerate() {
                drafts.push(
                    IssueDraft::new(
                        "Multiple H1 Tags",
                        format!("H1 heading {} of {n} on the page.", i + 1),
                        Severity::Medium,
                        IssueLocation::element(url, "h1"),
                        "Use exactly one H1 heading per page and demote the others to H2 or lower.",
                    )?
                    .with_element_snippet(heading.html()),
                );
            }
        }
    }

    Ok(drafts)
}

#[async_trait]
impl ScannerModule for SeoModule {
    fn category(&self) -> Category {
        Category::Seo
    }

    async fn audit(
        &self,
        ctx: &AuditContext<'_>,
        recorder: &mut IssueRecorder<'_>,
    ) -> Result<u8, AuditError> {
        let html = ctx.page.content().await?;
        for draft in check_document(&html, ctx.url.as_str())? {
            recorder.record(draft).await;
        }
        Ok(scoring::flat_deduction(recorder.len(), STANDARD_DEDUCTION))
    }
}
