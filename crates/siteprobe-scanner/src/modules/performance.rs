use super::{AuditContext, IssueRecorder, ScannerModule};
use crate::engines::{AuditResult, PerformanceAuditor};
use crate::error::AuditError;
use crate::scoring;
use async_trait::async_trait;
use siteprobe_core::{Category, IssueDraft, IssueLocation, Severity};
use std::sync::Arc;

struct WatchedAudit {
    id: &'static str,
    title: &'static str,
    recommendation: &'static str,
}

const WATCHED_AUDITS: [WatchedAudit; 2] = [
    WatchedAudit {
        id: "server-response-time",
        title: "Slow Server Response Time",
        recommendation: "Reduce server response time by caching responses, optimizing \
                         database queries, or serving the page from a CDN.",
    },
    WatchedAudit {
        id: "largest-contentful-paint",
        title: "Slow Largest Contentful Paint",
        recommendation: "Optimize the largest above-the-fold element: compress and resize \
                         images, preload critical resources, and remove render-blocking scripts.",
    },
];

/// Performance audit through the browser's control port.
pub struct PerformanceModule {
    engine: Arc<dyn PerformanceAuditor>,
}

impl PerformanceModule {
    pub fn new(engine: Arc<dyn PerformanceAuditor>) -> Self {
        Self { engine }
    }
}

fn describe(audit: &AuditResult, watched: &WatchedAudit) -> String {
    match (&audit.display_value, audit.title.is_empty()) {
        (Some(value), false) => format!("{}: {}", audit.title, value),
        (Some(value), true) => format!("{}: {}", watched.title, value),
        (None, false) => audit.title.clone(),
        (None, true) => watched.title.to_string(),
    }
}

#[async_trait]
impl ScannerModule for PerformanceModule {
    fn category(&self) -> Category {
        Category::Performance
    }

    async fn audit(
        &self,
        ctx: &AuditContext<'_>,
        recorder: &mut IssueRecorder<'_>,
    ) -> Result<u8, AuditError> {
        let report = self
            .engine
            .run_performance_audit(ctx.url.as_str(), ctx.page.control_port())
            .await?;

        for watched in &WATCHED_AUDITS {
            let Some(audit) = report.audits.get(watched.id) else {
                continue;
            };
            // Null scores are informative or not applicable
            let Some(score) = audit.score else { continue };
            if score >= 1.0 {
                continue;
            }

            let draft = IssueDraft::new(
                watched.title,
                describe(audit, watched),
                Severity::High,
                IssueLocation::page(ctx.url.as_str()),
                watched.recommendation,
            )?;
            recorder.record(draft).await;
        }

        report
            .category_score
            .map(scoring::from_fraction)
            .ok_or_else(|| AuditError::Parse("performance category score missing".to_string()))
    }
}
