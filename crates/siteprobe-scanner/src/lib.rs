//! Siteprobe Scanner - Website QA scan orchestration.
//!
//! This crate runs a scan of one URL: it leases an isolated browser session,
//! navigates once, captures screenshots, then runs the enabled audit modules
//! (performance, accessibility, SEO, security, best practices) against the
//! same page. Issues are stored as they are found, progress is reported after
//! every step, and the scan ends with a scored summary.
//!
//! # Features
//!
//! - One shared page per scan, sessions drawn from a bounded pool
//! - Per-module and per-scan timeouts; a failed module never fails the scan
//! - Monotonic progress that reaches 100 only on completion
//! - Pluggable progress reporters (in-process broadcast, HTTP relay)
//!
//! # Example
//!
//! ```rust,ignore
//! use siteprobe_scanner::{ScanOptions, ScanOrchestrator};
//! use std::sync::Arc;
//!
//! let orchestrator = Arc::new(
//!     ScanOrchestrator::new(Arc::new(session_pool), Arc::new(database), ScanOptions::default())
//!         .with_default_modules(&config.audits),
//! );
//!
//! let scan_id = orchestrator.submit(new_scan).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[allow(missing_docs)]
pub mod engines;
pub mod error;
#[allow(missing_docs)]
pub mod modules;
#[allow(missing_docs)]
pub mod orchestrator;
pub mod progress;
#[allow(missing_docs)]
pub mod reporter;
pub mod scoring;
pub mod screenshots;

// Re-export commonly used types
pub use engines::{
    AccessibilityAuditor, AuditResult, AxeCore, LighthouseCli, PerformanceAuditor,
    PerformanceReport, TargetSelector, Violation, ViolationNode,
};
pub use error::{AuditError, Result, ScanError};
pub use modules::{
    run_module, AccessibilityModule, AuditContext, BestPracticesModule, IssueRecorder,
    ModuleOutcome, PerformanceModule, ScannerModule, SecurityModule, SeoModule,
};
pub use orchestrator::{ScanOptions, ScanOrchestrator, ScanOutcome};
pub use progress::ProgressTracker;
pub use reporter::{
    BroadcastReporter, FanoutReporter, HttpRelayReporter, NoopReporter, ProgressReporter,
};
pub use screenshots::{capture_screenshots, BlobStore, FsBlobStore};
