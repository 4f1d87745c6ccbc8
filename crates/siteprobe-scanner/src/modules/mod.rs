//! Scanner modules and the contract they share with the orchestrator.
//!
//! A module implements [`ScannerModule::audit`], recording issues as it finds
//! them and returning its category score. [`run_module`] wraps every call: it
//! opens the module's test run, enforces the per-module timeout, and closes
//! the test run as completed or failed. Issues recorded before a failure are
//! kept.

mod accessibility;
mod best_practices;
mod performance;
mod security;
mod seo;

pub use accessibility::AccessibilityModule;
pub use best_practices::BestPracticesModule;
pub use performance::PerformanceModule;
pub use security::SecurityModule;
pub use seo::SeoModule;

use crate::error::AuditError;
use crate::reporter::ProgressReporter;
use async_trait::async_trait;
use siteprobe_browser::BrowserPage;
use siteprobe_core::{
    Category, Issue, IssueDraft, ScanId, ScanUpdate, TestRunStatus, TestRunUpdate,
};
use siteprobe_db::{issues, test_runs, Database};
use std::time::Duration;
use url::Url;

/// Everything a module may use while auditing one page.
pub struct AuditContext<'a> {
    pub page: &'a dyn BrowserPage,
    pub url: &'a Url,
    pub scan_id: &'a ScanId,
    /// Bound for any navigation the module performs
    pub navigation_timeout: Duration,
    /// Wait after load before reading console output
    pub settle_delay: Duration,
    pub max_console_messages: usize,
}

/// A category-specific audit routine.
#[async_trait]
pub trait ScannerModule: Send + Sync {
    fn category(&self) -> Category;

    /// Audit the page, recording issues on `recorder`, and return the
    /// category score (0-100).
    async fn audit(
        &self,
        ctx: &AuditContext<'_>,
        recorder: &mut IssueRecorder<'_>,
    ) -> Result<u8, AuditError>;
}

/// Persists and announces each issue as a module records it.
///
/// Every insert stands alone; a failed insert is logged and the issue is
/// still kept in memory for the summary.
pub struct IssueRecorder<'a> {
    db: &'a Database,
    reporter: &'a dyn ProgressReporter,
    scan_id: ScanId,
    test_run_id: String,
    category: Category,
    issues: Vec<Issue>,
}

impl<'a> IssueRecorder<'a> {
    pub fn new(
        db: &'a Database,
        reporter: &'a dyn ProgressReporter,
        scan_id: ScanId,
        test_run_id: impl Into<String>,
        category: Category,
    ) -> Self {
        Self {
            db,
            reporter,
            scan_id,
            test_run_id: test_run_id.into(),
            category,
            issues: Vec::new(),
        }
    }

    pub async fn record(&mut self, draft: IssueDraft) {
        let issue = Issue::from_draft(
            self.scan_id.clone(),
            self.test_run_id.clone(),
            self.category,
            draft,
        );

        if let Err(e) = issues::insert_issue(self.db.pool(), &issue).await {
            tracing::error!(
                "Failed to store {} issue '{}' for scan {}: {}",
                self.category,
                issue.draft.title,
                self.scan_id,
                e
            );
        }

        let update = ScanUpdate::new(self.scan_id.clone()).issue(issue.clone());
        if let Err(e) = self.reporter.report(&update).await {
            tracing::warn!("Failed to report issue for scan {}: {}", self.scan_id, e);
        }

        self.issues.push(issue);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    #[must_use]
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    fn into_issues(self) -> Vec<Issue> {
        self.issues
    }
}

/// Result of one module invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOutcome {
    Succeeded {
        category: Category,
        score: u8,
        issues: Vec<Issue>,
    },
    Failed {
        category: Category,
        error: String,
        /// Issues recorded before the failure
        issues: Vec<Issue>,
    },
}

impl ModuleOutcome {
    #[must_use]
    pub fn category(&self) -> Category {
        match self {
            Self::Succeeded { category, .. } | Self::Failed { category, .. } => *category,
        }
    }

    #[must_use]
    pub fn issues(&self) -> &[Issue] {
        match self {
            Self::Succeeded { issues, .. } | Self::Failed { issues, .. } => issues,
        }
    }

    #[must_use]
    pub fn into_issues(self) -> Vec<Issue> {
        match self {
            Self::Succeeded { issues, .. } | Self::Failed { issues, .. } => issues,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Run `module` under its own test run and time limit.
///
/// Never fails: every error ends up in [`ModuleOutcome::Failed`].
pub async fn run_module(
    module: &dyn ScannerModule,
    ctx: &AuditContext<'_>,
    db: &Database,
    reporter: &dyn ProgressReporter,
    timeout: Duration,
) -> ModuleOutcome {
    let category = module.category();

    let run = match test_runs::create_test_run(db.pool(), ctx.scan_id, category).await {
        Ok(run) => run,
        Err(e) => {
            tracing::error!(
                "Could not open {} test run for scan {}: {}",
                category,
                ctx.scan_id,
                e
            );
            return ModuleOutcome::Failed {
                category,
                error: e.to_string(),
                issues: Vec::new(),
            };
        }
    };

    report_test(reporter, ctx.scan_id, &run.id, category, TestRunStatus::Running, None, None)
        .await;
    tracing::info!("Running {} module for scan {}", category, ctx.scan_id);

    let mut recorder = IssueRecorder::new(db, reporter, ctx.scan_id.clone(), &run.id, category);
    let result = tokio::time::timeout(timeout, module.audit(ctx, &mut recorder)).await;

    let outcome = match result {
        Ok(Ok(score)) => ModuleOutcome::Succeeded {
            category,
            score: score.min(100),
            issues: recorder.into_issues(),
        },
        Ok(Err(e)) => ModuleOutcome::Failed {
            category,
            error: e.to_string(),
            issues: recorder.into_issues(),
        },
        Err(_) => ModuleOutcome::Failed {
            category,
            error: format!("{category} module timed out after {timeout:?}"),
            issues: recorder.into_issues(),
        },
    };

    let (status, score, error) = match &outcome {
        ModuleOutcome::Succeeded { score, issues, .. } => {
            tracing::info!(
                "{} module finished for scan {}: score {}, {} issues",
                category,
                ctx.scan_id,
                score,
                issues.len()
            );
            (TestRunStatus::Completed, Some(*score), None)
        }
        ModuleOutcome::Failed { error, issues, .. } => {
            tracing::warn!(
                "{} module failed for scan {} after {} issues: {}",
                category,
                ctx.scan_id,
                issues.len(),
                error
            );
            (TestRunStatus::Failed, None, Some(error.as_str()))
        }
    };

    if let Err(e) = test_runs::finish_test_run(db.pool(), &run.id, status, score, error).await {
        tracing::error!(
            "Failed to finalize {} test run for scan {}: {}",
            category,
            ctx.scan_id,
            e
        );
    }
    report_test(reporter, ctx.scan_id, &run.id, category, status, score, error).await;

    outcome
}

async fn report_test(
    reporter: &dyn ProgressReporter,
    scan_id: &ScanId,
    test_run_id: &str,
    category: Category,
    status: TestRunStatus,
    score: Option<u8>,
    error: Option<&str>,
) {
    let mut update = ScanUpdate::new(scan_id.clone()).test(TestRunUpdate {
        id: test_run_id.to_string(),
        category,
        status,
        score,
        error: error.map(ToString::to_string),
    });
    if status == TestRunStatus::Running {
        update = update.current_test(category);
    }

    if let Err(e) = reporter.report(&update).await {
        tracing::warn!("Failed to report {} test for scan {}: {}", category, scan_id, e);
    }
}
