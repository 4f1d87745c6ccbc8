//! Orchestrator tests against an in-process page.

use async_trait::async_trait;
use siteprobe_browser::{
    BrowserError, BrowserPage, BrowserSession, ConsoleCapture, ConsoleLevel, ConsoleMessage,
    NavigationResponse, SessionProvider,
};
use siteprobe_core::{
    Category, IssueDraft, IssueLocation, ScanId, ScanSettings, ScanStatus, ScanUpdate, Severity,
    TestRunStatus,
};
use siteprobe_db::{issues, scans, test_runs, Database, NewScan};
use siteprobe_scanner::{
    AccessibilityAuditor, AccessibilityModule, AuditContext, AuditError, AuditResult,
    BestPracticesModule, FsBlobStore, IssueRecorder, PerformanceAuditor, PerformanceModule,
    PerformanceReport, ProgressReporter, ScanError, ScanOptions, ScanOrchestrator,
    ScannerModule, SecurityModule, SeoModule, Violation, ViolationNode,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

const BROKEN_PAGE: &str = "<html><head></head><body><h1>One</h1><h1>Two</h1></body></html>";
const CLEAN_PAGE: &str = "<html><head><title>Home</title>\
    <meta name=\"description\" content=\"A tidy page\"></head>\
    <body><h1>Welcome</h1></body></html>";

/// Page with scripted content, headers and console output.
#[derive(Default)]
struct FakePage {
    html: String,
    headers: HashMap<String, String>,
    console: Vec<ConsoleMessage>,
    fail_navigation: bool,
    /// Screenshot fails while the viewport has this width
    fail_screenshot_width: Option<u32>,
    viewport: Mutex<(u32, u32)>,
    navigations: AtomicUsize,
}

impl FakePage {
    fn serving(html: &str) -> Self {
        Self {
            html: html.to_string(),
            ..Self::default()
        }
    }

    fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&self, url: &str, _timeout: Duration) -> siteprobe_browser::Result<NavigationResponse> {
        self.navigations.fetch_add(1, Ordering::SeqCst);
        if self.fail_navigation {
            return Err(BrowserError::NavigationError(format!(
                "net::ERR_NAME_NOT_RESOLVED at {url}"
            )));
        }
        Ok(NavigationResponse {
            url: url.to_string(),
            status: Some(200),
            headers: self.headers.clone(),
        })
    }

    async fn set_viewport(&self, width: u32, height: u32) -> siteprobe_browser::Result<()> {
        *self.viewport.lock().unwrap() = (width, height);
        Ok(())
    }

    async fn screenshot(&self, _full_page: bool) -> siteprobe_browser::Result<Vec<u8>> {
        let (width, _) = *self.viewport.lock().unwrap();
        if self.fail_screenshot_width == Some(width) {
            return Err(BrowserError::Screenshot("target closed".to_string()));
        }
        Ok(format!("png-{width}").into_bytes())
    }

    async fn content(&self) -> siteprobe_browser::Result<String> {
        Ok(self.html.clone())
    }

    async fn evaluate(&self, _expression: &str) -> siteprobe_browser::Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn capture_console(&self, _limit: usize) -> siteprobe_browser::Result<ConsoleCapture> {
        Ok(ConsoleCapture::from_messages(self.console.clone()))
    }

    fn control_port(&self) -> Option<u16> {
        Some(9222)
    }
}

struct FakeSession {
    page: Arc<FakePage>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserSession for FakeSession {
    fn page(&self) -> &dyn BrowserPage {
        self.page.as_ref()
    }

    async fn close(self: Box<Self>) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeProvider {
    page: Arc<FakePage>,
    closed: Arc<AtomicUsize>,
}

impl FakeProvider {
    fn new(page: FakePage) -> Self {
        Self {
            page: Arc::new(page),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl SessionProvider for FakeProvider {
    async fn open_session(&self) -> siteprobe_browser::Result<Box<dyn BrowserSession>> {
        Ok(Box::new(FakeSession {
            page: Arc::clone(&self.page),
            closed: Arc::clone(&self.closed),
        }))
    }
}

struct ExhaustedProvider;

#[async_trait]
impl SessionProvider for ExhaustedProvider {
    async fn open_session(&self) -> siteprobe_browser::Result<Box<dyn BrowserSession>> {
        Err(BrowserError::PoolExhausted(Duration::from_secs(30)))
    }
}

struct FixedPerformance(PerformanceReport);

#[async_trait]
impl PerformanceAuditor for FixedPerformance {
    async fn run_performance_audit(
        &self,
        _url: &str,
        _control_port: Option<u16>,
    ) -> Result<PerformanceReport, AuditError> {
        Ok(self.0.clone())
    }
}

struct FixedViolations(Vec<Violation>);

#[async_trait]
impl AccessibilityAuditor for FixedViolations {
    async fn run_accessibility_audit(
        &self,
        _page: &dyn BrowserPage,
    ) -> Result<Vec<Violation>, AuditError> {
        Ok(self.0.clone())
    }
}

/// Records one issue, then fails.
struct BrokenModule(Category);

#[async_trait]
impl ScannerModule for BrokenModule {
    fn category(&self) -> Category {
        self.0
    }

    async fn audit(
        &self,
        ctx: &AuditContext<'_>,
        recorder: &mut IssueRecorder<'_>,
    ) -> Result<u8, AuditError> {
        let draft = IssueDraft::new(
            "Partial Finding",
            "Found before the engine crashed",
            Severity::Low,
            IssueLocation::page(ctx.url.as_str()),
            "Investigate",
        )?;
        recorder.record(draft).await;
        Err(AuditError::Engine("engine crashed".to_string()))
    }
}

/// Never finishes within any test timeout.
struct StalledModule(Category);

#[async_trait]
impl ScannerModule for StalledModule {
    fn category(&self) -> Category {
        self.0
    }

    async fn audit(
        &self,
        _ctx: &AuditContext<'_>,
        _recorder: &mut IssueRecorder<'_>,
    ) -> Result<u8, AuditError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(100)
    }
}

#[derive(Default)]
struct RecordingReporter(Mutex<Vec<ScanUpdate>>);

impl RecordingReporter {
    fn updates(&self) -> Vec<ScanUpdate> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressReporter for RecordingReporter {
    async fn report(&self, update: &ScanUpdate) -> siteprobe_scanner::Result<()> {
        self.0.lock().unwrap().push(update.clone());
        Ok(())
    }
}

fn test_options() -> ScanOptions {
    ScanOptions {
        capture_screenshots: false,
        settle_delay: Duration::ZERO,
        module_timeout: Duration::from_secs(5),
        scan_timeout: Duration::from_secs(10),
        ..ScanOptions::default()
    }
}

async fn setup_test_db() -> Arc<Database> {
    let db = Database::new(":memory:").await.expect("create test database");
    db.run_migrations().await.expect("run migrations");
    Arc::new(db)
}

async fn queue_scan(db: &Database, id: &str, url: &str, settings: ScanSettings) -> ScanId {
    let scan_id = ScanId::new(id).expect("valid scan id");
    scans::create_scan(
        db.pool(),
        NewScan {
            id: scan_id.clone(),
            url: url.to_string(),
            user_id: "user-1".to_string(),
            project_id: None,
            client_id: None,
            settings,
        },
    )
    .await
    .expect("create scan");
    scan_id
}

fn all_modules(orchestrator: ScanOrchestrator) -> ScanOrchestrator {
    let mut audits = HashMap::new();
    audits.insert(
        "server-response-time".to_string(),
        AuditResult {
            title: "Initial server response time was long".to_string(),
            description: None,
            score: Some(0.4),
            display_value: Some("Root document took 1,200 ms".to_string()),
        },
    );
    let performance = FixedPerformance(PerformanceReport {
        category_score: Some(0.82),
        audits,
    });
    let accessibility = FixedViolations(vec![Violation {
        id: "image-alt".to_string(),
        impact: Some("critical".to_string()),
        description: "Images must have alternate text".to_string(),
        help: "Images must have alternate text".to_string(),
        help_url: None,
        nodes: vec![ViolationNode {
            html: "<img src=\"logo.png\">".to_string(),
            target: vec!["img".into()],
            failure_summary: None,
        }],
    }]);

    orchestrator
        .with_module(Arc::new(PerformanceModule::new(Arc::new(performance))))
        .with_module(Arc::new(AccessibilityModule::new(Arc::new(accessibility))))
        .with_module(Arc::new(SeoModule::new()))
        .with_module(Arc::new(SecurityModule::new()))
        .with_module(Arc::new(BestPracticesModule::new()))
}

#[tokio::test]
async fn test_seo_and_security_on_plain_http() {
    let db = setup_test_db().await;
    let provider = Arc::new(FakeProvider::new(FakePage::serving(BROKEN_PAGE)));
    let orchestrator = all_modules(ScanOrchestrator::new(
        provider.clone(),
        db.clone(),
        test_options(),
    ));
    let url = "http://example.com/";
    let settings = ScanSettings::only(&[Category::Seo, Category::Security]);
    let scan_id = queue_scan(&db, "scan-e2e", url, settings).await;

    let outcome = orchestrator
        .run_scan(&scan_id, &Url::parse(url).unwrap(), &settings)
        .await
        .unwrap();

    assert_eq!(outcome.status, ScanStatus::Completed);
    let high = outcome
        .issues
        .iter()
        .filter(|i| i.severity() == Severity::High)
        .count();
    let medium = outcome
        .issues
        .iter()
        .filter(|i| i.severity() == Severity::Medium)
        .count();
    assert_eq!(high, 3);
    assert_eq!(medium, 4);
    assert_eq!(outcome.summary.total_issues, 7);
    assert_eq!(outcome.summary.critical_issues, 3);
    assert_eq!(outcome.summary.overall_score, 50);
    assert_eq!(outcome.summary.total_tests, 2);
    assert_eq!(outcome.summary.completed_tests, 2);
    assert_eq!(outcome.summary.failed_tests, 0);

    let record = scans::get_scan(db.pool(), &scan_id).await.unwrap().unwrap();
    assert_eq!(record.status, ScanStatus::Completed);
    assert_eq!(record.progress, 100);
    assert_eq!(record.current_test, None);
    assert_eq!(record.summary, Some(outcome.summary.clone()));
    assert!(record.started_at.is_some());
    assert!(record.completed_at.is_some());

    let runs = test_runs::get_by_scan(db.pool(), &scan_id).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].category, Category::Seo);
    assert_eq!(runs[0].score, Some(60));
    assert_eq!(runs[1].category, Category::Security);
    assert_eq!(runs[1].score, Some(70));
    assert!(runs.iter().all(|r| r.status == TestRunStatus::Completed));

    let counts = issues::count_by_severity(db.pool(), &scan_id).await.unwrap();
    assert_eq!(counts.total, 7);
    assert_eq!(counts.high, 3);
    assert_eq!(counts.medium, 4);

    assert_eq!(provider.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_all_modules_on_clean_https_page() {
    let db = setup_test_db().await;
    let mut page = FakePage::serving(CLEAN_PAGE)
        .with_header("Content-Security-Policy", "default-src 'self'")
        .with_header("X-Frame-Options", "DENY");
    page.console = vec![ConsoleMessage::new(ConsoleLevel::Error, "Uncaught TypeError")];
    let provider = Arc::new(FakeProvider::new(page));
    let orchestrator = all_modules(ScanOrchestrator::new(provider, db.clone(), test_options()));
    let url = "https://example.com/";
    let scan_id = queue_scan(&db, "scan-all", url, ScanSettings::default()).await;

    let outcome = orchestrator
        .run_scan(&scan_id, &Url::parse(url).unwrap(), &ScanSettings::default())
        .await
        .unwrap();

    // One slow audit (high), one image node (critical), console errors (medium)
    assert_eq!(outcome.summary.total_issues, 3);
    assert_eq!(outcome.summary.critical_issues, 2);
    assert_eq!(outcome.summary.overall_score, 100 - 10 - 20 - 5);
    assert_eq!(outcome.summary.total_tests, 5);
    assert_eq!(outcome.summary.completed_tests, 5);

    let runs = test_runs::get_by_scan(db.pool(), &scan_id).await.unwrap();
    let categories: Vec<_> = runs.iter().map(|r| r.category).collect();
    assert_eq!(categories, Category::ALL.to_vec());
    let scores: Vec<_> = runs.iter().map(|r| r.score).collect();
    assert_eq!(
        scores,
        vec![Some(82), Some(95), Some(100), Some(100), Some(90)]
    );
}

#[tokio::test]
async fn test_progress_is_monotonic_and_completes_at_100() {
    let db = setup_test_db().await;
    let reporter = Arc::new(RecordingReporter::default());
    let provider = Arc::new(FakeProvider::new(FakePage::serving(CLEAN_PAGE)));
    let orchestrator =
        all_modules(ScanOrchestrator::new(provider, db.clone(), test_options()))
            .with_reporter(reporter.clone());
    let url = "https://example.com/";
    let scan_id = queue_scan(&db, "scan-progress", url, ScanSettings::default()).await;

    orchestrator
        .run_scan(&scan_id, &Url::parse(url).unwrap(), &ScanSettings::default())
        .await
        .unwrap();

    let updates = reporter.updates();
    let progress: Vec<u8> = updates.iter().filter_map(|u| u.progress).collect();
    assert_eq!(progress, vec![0, 10, 28, 46, 64, 82, 99, 100]);

    let last = updates.last().unwrap();
    assert_eq!(last.status, Some(ScanStatus::Completed));
    assert_eq!(last.progress, Some(100));
    assert!(last.summary.is_some());

    // Every module announced itself before running
    let started: Vec<_> = updates
        .iter()
        .filter(|u| u.test.as_ref().is_some_and(|t| t.status == TestRunStatus::Running))
        .filter_map(|u| u.current_test)
        .collect();
    assert_eq!(started, Category::ALL.to_vec());
}

#[tokio::test]
async fn test_failed_module_keeps_partial_results() {
    let db = setup_test_db().await;
    let provider = Arc::new(FakeProvider::new(
        FakePage::serving(CLEAN_PAGE)
            .with_header("Content-Security-Policy", "default-src 'self'")
            .with_header("X-Frame-Options", "DENY"),
    ));
    let orchestrator = ScanOrchestrator::new(provider, db.clone(), test_options())
        .with_module(Arc::new(BrokenModule(Category::Performance)))
        .with_module(Arc::new(SeoModule::new()));
    let url = "https://example.com/";
    let settings = ScanSettings::only(&[Category::Performance, Category::Seo]);
    let scan_id = queue_scan(&db, "scan-partial", url, settings).await;

    let outcome = orchestrator
        .run_scan(&scan_id, &Url::parse(url).unwrap(), &settings)
        .await
        .unwrap();

    assert_eq!(outcome.status, ScanStatus::Completed);
    assert_eq!(outcome.summary.total_tests, 2);
    assert_eq!(outcome.summary.completed_tests, 2);
    assert_eq!(outcome.summary.failed_tests, 1);
    assert_eq!(outcome.summary.total_issues, 1);
    assert_eq!(outcome.issues[0].draft.title, "Partial Finding");

    let runs = test_runs::get_by_scan(db.pool(), &scan_id).await.unwrap();
    assert_eq!(runs[0].status, TestRunStatus::Failed);
    assert_eq!(runs[0].score, None);
    assert!(runs[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("engine crashed"));
    assert_eq!(runs[1].status, TestRunStatus::Completed);

    let stored = issues::get_by_scan(db.pool(), &scan_id).await.unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn test_module_timeout_fails_only_that_module() {
    let db = setup_test_db().await;
    let provider = Arc::new(FakeProvider::new(FakePage::serving(CLEAN_PAGE)));
    let options = ScanOptions {
        module_timeout: Duration::from_millis(50),
        ..test_options()
    };
    let orchestrator = ScanOrchestrator::new(provider, db.clone(), options)
        .with_module(Arc::new(StalledModule(Category::Accessibility)))
        .with_module(Arc::new(SeoModule::new()));
    let url = "https://example.com/";
    let settings = ScanSettings::only(&[Category::Accessibility, Category::Seo]);
    let scan_id = queue_scan(&db, "scan-stalled", url, settings).await;

    let outcome = orchestrator
        .run_scan(&scan_id, &Url::parse(url).unwrap(), &settings)
        .await
        .unwrap();

    assert_eq!(outcome.status, ScanStatus::Completed);
    assert_eq!(outcome.summary.failed_tests, 1);

    let runs = test_runs::get_by_scan(db.pool(), &scan_id).await.unwrap();
    assert_eq!(runs[0].category, Category::Accessibility);
    assert_eq!(runs[0].status, TestRunStatus::Failed);
    assert!(runs[0].error_message.as_deref().unwrap().contains("timed out"));
    assert_eq!(runs[1].status, TestRunStatus::Completed);
}

#[tokio::test]
async fn test_navigation_failure_fails_scan() {
    let db = setup_test_db().await;
    let page = FakePage {
        fail_navigation: true,
        ..FakePage::default()
    };
    let provider = Arc::new(FakeProvider::new(page));
    let orchestrator = all_modules(ScanOrchestrator::new(
        provider.clone(),
        db.clone(),
        test_options(),
    ));
    let url = "https://unreachable.invalid/";
    let scan_id = queue_scan(&db, "scan-nav", url, ScanSettings::default()).await;

    let outcome = orchestrator
        .run_scan(&scan_id, &Url::parse(url).unwrap(), &ScanSettings::default())
        .await
        .unwrap();

    assert_eq!(outcome.status, ScanStatus::Failed);
    assert!(outcome.issues.is_empty());
    assert_eq!(outcome.summary.total_tests, 5);
    assert_eq!(outcome.summary.completed_tests, 0);
    assert!(outcome
        .summary
        .error
        .as_deref()
        .unwrap()
        .contains("ERR_NAME_NOT_RESOLVED"));

    let record = scans::get_scan(db.pool(), &scan_id).await.unwrap().unwrap();
    assert_eq!(record.status, ScanStatus::Failed);
    assert!(record.progress < 100);
    assert!(record.error_message.is_some());
    assert!(record.completed_at.is_some());
    assert!(test_runs::get_by_scan(db.pool(), &scan_id)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(provider.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_no_session_fails_scan() {
    let db = setup_test_db().await;
    let orchestrator = all_modules(ScanOrchestrator::new(
        Arc::new(ExhaustedProvider),
        db.clone(),
        test_options(),
    ));
    let url = "https://example.com/";
    let scan_id = queue_scan(&db, "scan-no-session", url, ScanSettings::default()).await;

    let outcome = orchestrator
        .run_scan(&scan_id, &Url::parse(url).unwrap(), &ScanSettings::default())
        .await
        .unwrap();

    assert_eq!(outcome.status, ScanStatus::Failed);
    let record = scans::get_scan(db.pool(), &scan_id).await.unwrap().unwrap();
    assert_eq!(record.status, ScanStatus::Failed);
    assert!(record
        .error_message
        .as_deref()
        .unwrap()
        .contains("no browser session available"));
}

#[tokio::test]
async fn test_scan_timeout_releases_session() {
    let db = setup_test_db().await;
    let provider = Arc::new(FakeProvider::new(FakePage::serving(CLEAN_PAGE)));
    let options = ScanOptions {
        module_timeout: Duration::from_secs(60),
        scan_timeout: Duration::from_millis(100),
        ..test_options()
    };
    let orchestrator = ScanOrchestrator::new(provider.clone(), db.clone(), options)
        .with_module(Arc::new(StalledModule(Category::Performance)));
    let url = "https://example.com/";
    let settings = ScanSettings::only(&[Category::Performance]);
    let scan_id = queue_scan(&db, "scan-timeout", url, settings).await;

    let outcome = orchestrator
        .run_scan(&scan_id, &Url::parse(url).unwrap(), &settings)
        .await
        .unwrap();

    assert_eq!(outcome.status, ScanStatus::Failed);
    assert!(outcome.summary.error.as_deref().unwrap().contains("timed out"));
    assert_eq!(provider.closed.load(Ordering::SeqCst), 1);

    // The run interrupted by the timeout is closed with the scan
    let runs = test_runs::get_by_scan(db.pool(), &scan_id).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].category, Category::Performance);
    assert_eq!(runs[0].status, TestRunStatus::Failed);
    assert_eq!(runs[0].progress, 100);
    assert!(runs[0].error_message.as_deref().unwrap().contains("timed out"));
    assert!(runs[0].completed_at.is_some());
}

#[tokio::test]
async fn test_screenshots_per_viewport() {
    let db = setup_test_db().await;
    let dir = tempfile::tempdir().unwrap();
    let page = FakePage {
        fail_screenshot_width: Some(768),
        ..FakePage::serving(CLEAN_PAGE)
    };
    let provider = Arc::new(FakeProvider::new(page));
    let options = ScanOptions {
        capture_screenshots: true,
        ..test_options()
    };
    let orchestrator = ScanOrchestrator::new(provider.clone(), db.clone(), options)
        .with_module(Arc::new(SeoModule::new()))
        .with_blob_store(Arc::new(FsBlobStore::new(dir.path(), "/screenshots")));
    let url = "https://example.com/";
    let settings = ScanSettings::only(&[Category::Seo]);
    let scan_id = queue_scan(&db, "scan-shots", url, settings).await;

    let outcome = orchestrator
        .run_scan(&scan_id, &Url::parse(url).unwrap(), &settings)
        .await
        .unwrap();
    assert_eq!(outcome.status, ScanStatus::Completed);

    let record = scans::get_scan(db.pool(), &scan_id).await.unwrap().unwrap();
    let shots = record.screenshots.unwrap();
    assert_eq!(
        shots.get("mobile"),
        Some(&Some("/screenshots/scan-shots/mobile.png".to_string()))
    );
    assert_eq!(shots.get("tablet"), Some(&None));
    assert_eq!(
        shots.get("desktop"),
        Some(&Some("/screenshots/scan-shots/desktop.png".to_string()))
    );
    assert!(dir.path().join("scan-shots/mobile.png").exists());
    assert!(!dir.path().join("scan-shots/tablet.png").exists());

    // Modules run at the default viewport
    assert_eq!(*provider.page.viewport.lock().unwrap(), (1920, 1080));
}

#[tokio::test]
async fn test_scan_only_runs_once() {
    let db = setup_test_db().await;
    let provider = Arc::new(FakeProvider::new(FakePage::serving(CLEAN_PAGE)));
    let orchestrator = ScanOrchestrator::new(provider, db.clone(), test_options())
        .with_module(Arc::new(SeoModule::new()));
    let url = Url::parse("https://example.com/").unwrap();
    let settings = ScanSettings::only(&[Category::Seo]);
    let scan_id = queue_scan(&db, "scan-once", url.as_str(), settings).await;

    orchestrator.run_scan(&scan_id, &url, &settings).await.unwrap();
    let second = orchestrator.run_scan(&scan_id, &url, &settings).await;

    match second {
        Err(e @ ScanError::InvalidState { .. }) => {
            assert_eq!(
                e.to_string(),
                "Scan scan-once cannot start: scan is completed, not queued"
            );
        }
        other => panic!("expected InvalidState, got {other:?}"),
    }
    let runs = test_runs::get_by_scan(db.pool(), &scan_id).await.unwrap();
    assert_eq!(runs.len(), 1);
}

#[tokio::test]
async fn test_unregistered_category_is_skipped() {
    let db = setup_test_db().await;
    let provider = Arc::new(FakeProvider::new(FakePage::serving(CLEAN_PAGE)));
    let orchestrator = ScanOrchestrator::new(provider, db.clone(), test_options())
        .with_module(Arc::new(SeoModule::new()));
    let url = Url::parse("https://example.com/").unwrap();
    let scan_id = queue_scan(&db, "scan-skip", url.as_str(), ScanSettings::default()).await;

    let outcome = orchestrator
        .run_scan(&scan_id, &url, &ScanSettings::default())
        .await
        .unwrap();

    assert_eq!(outcome.summary.total_tests, 1);
    assert_eq!(outcome.summary.completed_tests, 1);
}

#[tokio::test]
async fn test_submit_runs_in_background() {
    let db = setup_test_db().await;
    let provider = Arc::new(FakeProvider::new(FakePage::serving(BROKEN_PAGE)));
    let orchestrator = Arc::new(
        ScanOrchestrator::new(provider, db.clone(), test_options())
            .with_module(Arc::new(SeoModule::new())),
    );
    let scan_id = ScanId::new("scan-submit").unwrap();
    let request = NewScan {
        id: scan_id.clone(),
        url: "https://example.com".to_string(),
        user_id: "user-1".to_string(),
        project_id: Some("project-1".to_string()),
        client_id: None,
        settings: ScanSettings::only(&[Category::Seo]),
    };

    let returned = orchestrator.submit(request.clone()).await.unwrap();
    assert_eq!(returned, scan_id);

    let duplicate = orchestrator.submit(request).await;
    assert!(matches!(duplicate, Err(ScanError::Duplicate(_))));

    let record = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let record = scans::get_scan(db.pool(), &scan_id).await.unwrap().unwrap();
            if record.status.is_terminal() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("scan finishes");

    assert_eq!(record.status, ScanStatus::Completed);
    assert_eq!(record.project_id.as_deref(), Some("project-1"));
    assert_eq!(record.summary.unwrap().total_issues, 4);
}

#[tokio::test]
async fn test_submit_rejects_bad_url() {
    let db = setup_test_db().await;
    let provider = Arc::new(FakeProvider::new(FakePage::default()));
    let orchestrator = Arc::new(ScanOrchestrator::new(provider, db.clone(), test_options()));
    let scan_id = ScanId::new("scan-bad-url").unwrap();

    let result = orchestrator
        .submit(NewScan {
            id: scan_id.clone(),
            url: "ftp://example.com".to_string(),
            user_id: "user-1".to_string(),
            project_id: None,
            client_id: None,
            settings: ScanSettings::default(),
        })
        .await;

    assert!(matches!(result, Err(ScanError::Validation(_))));
    assert!(scans::get_scan(db.pool(), &scan_id).await.unwrap().is_none());
}
