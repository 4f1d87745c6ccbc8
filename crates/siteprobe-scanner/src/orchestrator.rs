//! Scan orchestrator.
//!
//! Runs one scan end to end: lease a browser session, navigate, optionally
//! capture screenshots, run the enabled modules one after another against
//! the same page, then write the summary and the terminal status. The
//! session is always released, including after a timeout.

use crate::engines::{AxeCore, LighthouseCli};
use crate::error::{Result, ScanError};
use crate::modules::{
    run_module, AccessibilityModule, AuditContext, BestPracticesModule, ModuleOutcome,
    PerformanceModule, ScannerModule, SecurityModule, SeoModule,
};
use crate::progress::ProgressTracker;
use crate::reporter::{NoopReporter, ProgressReporter};
use crate::screenshots::{capture_screenshots, BlobStore};
use crate::scoring;
use siteprobe_browser::{BrowserPage, SessionProvider, Viewport};
use siteprobe_core::{
    parse_target_url, AppConfig, AuditConfig, Category, Issue, ScanId, ScanSettings, ScanStatus,
    ScanUpdate, Summary,
};
use siteprobe_db::{scans, test_runs, Database, DatabaseError, NewScan};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Timing and behaviour knobs for every scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Progress checkpoint once navigation succeeds
    pub setup_progress: u8,
    pub navigation_timeout: Duration,
    pub module_timeout: Duration,
    /// Bound on navigation, screenshots and all modules together
    pub scan_timeout: Duration,
    pub capture_screenshots: bool,
    pub settle_delay: Duration,
    pub max_console_messages: usize,
    /// Viewport the page returns to after screenshots
    pub viewport: Viewport,
}

impl ScanOptions {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            setup_progress: config.scanning.setup_progress,
            navigation_timeout: config.browser.navigation_timeout(),
            module_timeout: config.scanning.module_timeout(),
            scan_timeout: config.scanning.scan_timeout(),
            capture_screenshots: config.scanning.capture_screenshots,
            settle_delay: Duration::from_millis(config.scanning.settle_delay_ms),
            max_console_messages: config.scanning.max_console_messages,
            viewport: Viewport {
                name: "default",
                width: config.browser.viewport_width,
                height: config.browser.viewport_height,
            },
        }
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Final state of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub scan_id: ScanId,
    pub status: ScanStatus,
    pub summary: Summary,
    /// Issues from every module, in execution order. Empty for failed scans.
    pub issues: Vec<Issue>,
}

/// Orchestrates scans against pooled browser sessions.
pub struct ScanOrchestrator {
    sessions: Arc<dyn SessionProvider>,
    db: Arc<Database>,
    reporter: Arc<dyn ProgressReporter>,
    modules: Vec<Arc<dyn ScannerModule>>,
    blob_store: Option<Arc<dyn BlobStore>>,
    options: ScanOptions,
}

impl ScanOrchestrator {
    /// Create an orchestrator with no modules registered.
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionProvider>,
        db: Arc<Database>,
        options: ScanOptions,
    ) -> Self {
        Self {
            sessions,
            db,
            reporter: Arc::new(NoopReporter),
            modules: Vec::new(),
            blob_store: None,
            options,
        }
    }

    /// Register the five standard modules backed by Lighthouse and axe-core.
    #[must_use]
    pub fn with_default_modules(self, audits: &AuditConfig) -> Self {
        self.with_module(Arc::new(PerformanceModule::new(Arc::new(LighthouseCli::new(
            audits.lighthouse_bin.clone(),
        )))))
        .with_module(Arc::new(AccessibilityModule::new(Arc::new(AxeCore::new(
            audits.axe_script_path.clone(),
        )))))
        .with_module(Arc::new(SeoModule::new()))
        .with_module(Arc::new(SecurityModule::new()))
        .with_module(Arc::new(BestPracticesModule::new()))
    }

    /// Register a module, replacing any module of the same category.
    #[must_use]
    pub fn with_module(mut self, module: Arc<dyn ScannerModule>) -> Self {
        self.modules.retain(|m| m.category() != module.category());
        self.modules.push(module);
        self
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn with_blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(store);
        self
    }

    #[must_use]
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Create the scan record and run the scan in the background.
    ///
    /// Returns as soon as the record exists. The URL is validated first, so
    /// a rejected request leaves nothing behind.
    pub async fn submit(self: &Arc<Self>, scan: NewScan) -> Result<ScanId> {
        let url = parse_target_url(&scan.url)?;
        let scan_id = scan.id.clone();
        let settings = scan.settings;

        scans::create_scan(self.db.pool(), scan)
            .await
            .map_err(|e| match e {
                DatabaseError::AlreadyExists(_) => ScanError::Duplicate(scan_id.clone()),
                other => ScanError::Database(other),
            })?;

        self.notify(
            ScanUpdate::new(scan_id.clone())
                .status(ScanStatus::Queued)
                .progress(0),
        )
        .await;

        let orchestrator = Arc::clone(self);
        let task_id = scan_id.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.run_scan(&task_id, &url, &settings).await {
                tracing::error!("Scan {} could not run: {}", task_id, e);
            }
        });

        Ok(scan_id)
    }

    /// Run a queued scan to a terminal state.
    ///
    /// Setup failures, navigation failures and the scan-wide timeout mark the
    /// scan failed and still return `Ok`. `Err` means the scan could not be
    /// started at all (it was not queued, or its record could not be updated).
    pub async fn run_scan(
        &self,
        scan_id: &ScanId,
        url: &Url,
        settings: &ScanSettings,
    ) -> Result<ScanOutcome> {
        if !scans::transition(self.db.pool(), scan_id, ScanStatus::Running, None).await? {
            let reason = match scans::get_scan(self.db.pool(), scan_id).await? {
                Some(record) => format!("scan is {}, not queued", record.status),
                None => "scan does not exist".to_string(),
            };
            return Err(ScanError::InvalidState {
                scan_id: scan_id.clone(),
                reason,
            });
        }

        let plan = self.plan(settings);
        let total = u32::try_from(plan.len()).unwrap_or(u32::MAX);
        let mut tracker = ProgressTracker::new(self.options.setup_progress, plan.len());

        tracing::info!(
            "Starting scan {} of {} with {} modules",
            scan_id,
            url,
            plan.len()
        );
        self.notify(
            ScanUpdate::new(scan_id.clone())
                .status(ScanStatus::Running)
                .progress(tracker.current()),
        )
        .await;

        let session = match self.sessions.open_session().await {
            Ok(session) => session,
            Err(e) => return Ok(self.fail(scan_id, total, &ScanError::Browser(e)).await),
        };

        let result = tokio::time::timeout(
            self.options.scan_timeout,
            self.execute(session.page(), scan_id, url, &plan, &mut tracker),
        )
        .await;

        session.close().await;

        Ok(match result {
            Ok(Ok(outcomes)) => self.complete(scan_id, total, outcomes, &mut tracker).await,
            Ok(Err(e)) => self.fail(scan_id, total, &e).await,
            Err(_) => {
                self.fail(scan_id, total, &ScanError::Timeout(self.options.scan_timeout))
                    .await
            }
        })
    }

    /// Registered modules for the enabled categories, in execution order.
    fn plan(&self, settings: &ScanSettings) -> Vec<Arc<dyn ScannerModule>> {
        settings
            .enabled_categories()
            .into_iter()
            .filter_map(|category| {
                let module = self.modules.iter().find(|m| m.category() == category);
                if module.is_none() {
                    tracing::warn!("No module registered for {}, skipping", category);
                }
                module.cloned()
            })
            .collect()
    }

    async fn execute(
        &self,
        page: &dyn BrowserPage,
        scan_id: &ScanId,
        url: &Url,
        plan: &[Arc<dyn ScannerModule>],
        tracker: &mut ProgressTracker,
    ) -> Result<Vec<ModuleOutcome>> {
        let response = page
            .goto(url.as_str(), self.options.navigation_timeout)
            .await
            .map_err(|e| ScanError::Navigation(e.to_string()))?;
        tracing::debug!(
            "Scan {} loaded {} (status {:?})",
            scan_id,
            response.url,
            response.status
        );

        self.advance(scan_id, tracker.setup_complete()).await;

        if self.options.capture_screenshots {
            if let Some(store) = &self.blob_store {
                let urls = capture_screenshots(
                    page,
                    store.as_ref(),
                    scan_id,
                    &Viewport::SCREENSHOT_PRESETS,
                    self.options.viewport,
                )
                .await;
                if let Err(e) = scans::set_screenshots(self.db.pool(), scan_id, &urls).await {
                    tracing::error!("Failed to store screenshots for scan {}: {}", scan_id, e);
                }
            }
        }

        let ctx = AuditContext {
            page,
            url,
            scan_id,
            navigation_timeout: self.options.navigation_timeout,
            settle_delay: self.options.settle_delay,
            max_console_messages: self.options.max_console_messages,
        };

        let mut outcomes = Vec::with_capacity(plan.len());
        for module in plan {
            self.set_current_test(scan_id, Some(module.category())).await;
            let outcome = run_module(
                module.as_ref(),
                &ctx,
                &self.db,
                self.reporter.as_ref(),
                self.options.module_timeout,
            )
            .await;
            outcomes.push(outcome);
            self.advance(scan_id, tracker.module_finished()).await;
        }

        Ok(outcomes)
    }

    async fn complete(
        &self,
        scan_id: &ScanId,
        total: u32,
        outcomes: Vec<ModuleOutcome>,
        tracker: &mut ProgressTracker,
    ) -> ScanOutcome {
        let failed = u32::try_from(outcomes.iter().filter(|o| !o.is_success()).count())
            .unwrap_or(u32::MAX);
        let issues: Vec<Issue> = outcomes
            .into_iter()
            .flat_map(ModuleOutcome::into_issues)
            .collect();
        let summary = scoring::summarize(&issues, total, failed);

        if let Err(e) = scans::set_summary(self.db.pool(), scan_id, &summary).await {
            tracing::error!("Failed to store summary for scan {}: {}", scan_id, e);
        }
        self.set_current_test(scan_id, None).await;
        self.set_status(scan_id, ScanStatus::Completed, None).await;

        tracing::info!(
            "Scan {} completed: score {}, {} issues ({} critical/high), {}/{} modules failed",
            scan_id,
            summary.overall_score,
            summary.total_issues,
            summary.critical_issues,
            failed,
            total
        );

        self.notify(
            ScanUpdate::new(scan_id.clone())
                .status(ScanStatus::Completed)
                .progress(tracker.complete())
                .summary(summary.clone()),
        )
        .await;

        ScanOutcome {
            scan_id: scan_id.clone(),
            status: ScanStatus::Completed,
            summary,
            issues,
        }
    }

    async fn fail(&self, scan_id: &ScanId, total: u32, error: &ScanError) -> ScanOutcome {
        let message = error.to_string();
        tracing::error!("Scan {} failed: {}", scan_id, message);

        match test_runs::fail_open_runs(self.db.pool(), scan_id, &message).await {
            Ok(0) => {}
            Ok(n) => tracing::debug!("Closed {} open test run(s) of scan {}", n, scan_id),
            Err(e) => tracing::error!("Failed to close test runs of scan {}: {}", scan_id, e),
        }

        let summary = Summary::failed(message.clone(), total);
        if let Err(e) = scans::set_summary(self.db.pool(), scan_id, &summary).await {
            tracing::error!("Failed to store summary for scan {}: {}", scan_id, e);
        }
        self.set_current_test(scan_id, None).await;
        self.set_status(scan_id, ScanStatus::Failed, Some(&message)).await;

        self.notify(
            ScanUpdate::new(scan_id.clone())
                .status(ScanStatus::Failed)
                .summary(summary.clone())
                .error(message),
        )
        .await;

        ScanOutcome {
            scan_id: scan_id.clone(),
            status: ScanStatus::Failed,
            summary,
            issues: Vec::new(),
        }
    }

    async fn set_status(&self, scan_id: &ScanId, status: ScanStatus, error: Option<&str>) {
        match scans::transition(self.db.pool(), scan_id, status, error).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!("Scan {} could not move to {}", scan_id, status),
            Err(e) => tracing::error!("Failed to mark scan {} {}: {}", scan_id, status, e),
        }
    }

    async fn set_current_test(&self, scan_id: &ScanId, category: Option<Category>) {
        if let Err(e) = scans::set_current_test(self.db.pool(), scan_id, category).await {
            tracing::warn!("Failed to record current test for scan {}: {}", scan_id, e);
        }
    }

    async fn advance(&self, scan_id: &ScanId, progress: u8) {
        if let Err(e) = scans::update_progress(self.db.pool(), scan_id, progress).await {
            tracing::warn!("Failed to store progress for scan {}: {}", scan_id, e);
        }
        self.notify(ScanUpdate::new(scan_id.clone()).progress(progress))
            .await;
    }

    async fn notify(&self, update: ScanUpdate) {
        if let Err(e) = self.reporter.report(&update).await {
            tracing::warn!("Failed to report progress for scan {}: {}", update.scan_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let config = AppConfig::default();
        let options = ScanOptions::from_config(&config);

        assert_eq!(options.setup_progress, 10);
        assert_eq!(options.navigation_timeout, Duration::from_secs(60));
        assert!(options.module_timeout < options.scan_timeout);
        assert_eq!(options.viewport.width, 1920);
        assert_eq!(options.viewport.height, 1080);
    }
}
