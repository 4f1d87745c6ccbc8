//! Siteprobe Core - Foundation crate for the Siteprobe website auditor.
//!
//! This crate provides the shared domain types, error handling and
//! configuration management that all other Siteprobe crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Newtypes and closed enums (`ScanId`, `Severity`, `Category`, statuses)
//! - [`findings`] - Issues reported by scanner modules
//! - [`summary`] - Scan summary and the out-of-band progress message
//!
//! # Example
//!
//! ```rust
//! use siteprobe_core::{Category, ScanSettings, Severity};
//!
//! let settings = ScanSettings::only(&[Category::Seo, Category::Security]);
//! assert_eq!(settings.enabled_categories().len(), 2);
//! assert_eq!(Severity::from_impact(Some("serious")), Severity::High);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod findings;
pub mod summary;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, AuditConfig, BrowserConfig, NotificationConfig, ScanningConfig, ServerConfig,
    StorageConfig,
};
pub use error::{ConfigError, ConfigResult, Result, SiteprobeError};
pub use findings::{Issue, IssueDraft, IssueLocation, IssueStatus};
pub use summary::{ScanUpdate, ScreenshotUrls, Summary, TestRunUpdate};
pub use types::{
    parse_target_url, Category, ScanId, ScanSettings, ScanStatus, Severity, TestRunStatus,
    TestToggles, Timestamp,
};
