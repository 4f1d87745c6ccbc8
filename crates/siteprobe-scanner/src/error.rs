use siteprobe_core::{ScanId, SiteprobeError};
use std::time::Duration;
use thiserror::Error;

/// Errors that fail a whole scan, or a single call into the orchestrator.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid scan request: {0}")]
    Validation(#[from] SiteprobeError),

    #[error("Scan {0} already exists")]
    Duplicate(ScanId),

    #[error("Scan {scan_id} cannot start: {reason}")]
    InvalidState { scan_id: ScanId, reason: String },

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Scan timed out after {0:?}")]
    Timeout(Duration),

    #[error("Blob storage error: {0}")]
    Storage(String),

    #[error("Progress report failed: {0}")]
    Report(String),

    #[error("Database error: {0}")]
    Database(#[from] siteprobe_db::DatabaseError),

    #[error("Browser error: {0}")]
    Browser(#[from] siteprobe_browser::BrowserError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised inside a single scanner module. They fail that module's
/// test run only.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit engine error: {0}")]
    Engine(String),

    #[error("Failed to parse audit output: {0}")]
    Parse(String),

    #[error("Invalid finding: {0}")]
    Finding(#[from] SiteprobeError),

    #[error("Browser error: {0}")]
    Browser(#[from] siteprobe_browser::BrowserError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let id = ScanId::new("scan-1").expect("valid id");
        assert_eq!(
            ScanError::Duplicate(id).to_string(),
            "Scan scan-1 already exists"
        );
        assert_eq!(
            ScanError::Timeout(Duration::from_secs(5)).to_string(),
            "Scan timed out after 5s"
        );
        let err = ScanError::InvalidState {
            scan_id: ScanId::new("scan-2").expect("valid id"),
            reason: "scan is running, not queued".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Scan scan-2 cannot start: scan is running, not queued"
        );
    }

    #[test]
    fn test_browser_error_converts() {
        let err: AuditError =
            siteprobe_browser::BrowserError::Evaluation("axe is not defined".to_string()).into();
        assert!(matches!(err, AuditError::Browser(_)));
    }
}
