use super::{AuditResult, PerformanceAuditor, PerformanceReport};
use crate::error::AuditError;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::process::Command;

#[derive(Debug, Deserialize)]
struct LighthouseOutput {
    #[serde(default)]
    categories: Categories,
    #[serde(default)]
    audits: HashMap<String, AuditResult>,
}

#[derive(Debug, Default, Deserialize)]
struct Categories {
    performance: Option<CategoryScore>,
}

#[derive(Debug, Deserialize)]
struct CategoryScore {
    score: Option<f64>,
}

/// Drives the Lighthouse CLI against the shared browser's DevTools port.
#[derive(Debug, Clone)]
pub struct LighthouseCli {
    binary: String,
}

impl LighthouseCli {
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn args(url: &str, port: u16) -> Vec<String> {
        vec![
            url.to_string(),
            format!("--port={port}"),
            "--output=json".to_string(),
            "--output-path=stdout".to_string(),
            "--only-categories=performance".to_string(),
            "--quiet".to_string(),
        ]
    }

    /// Parse Lighthouse JSON output.
    pub fn parse_report(json: &[u8]) -> Result<PerformanceReport, AuditError> {
        let output: LighthouseOutput = serde_json::from_slice(json)?;
        Ok(PerformanceReport {
            category_score: output.categories.performance.and_then(|c| c.score),
            audits: output.audits,
        })
    }
}

#[async_trait]
impl PerformanceAuditor for LighthouseCli {
    async fn run_performance_audit(
        &self,
        url: &str,
        control_port: Option<u16>,
    ) -> Result<PerformanceReport, AuditError> {
        let port = control_port.ok_or_else(|| {
            AuditError::Engine("browser control port unavailable".to_string())
        })?;

        tracing::debug!("Running {} against {} on port {}", self.binary, url, port);

        // Killed if the module times out and drops this future
        let output = Command::new(&self.binary)
            .args(Self::args(url, port))
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AuditError::Engine(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        Self::parse_report(&output.stdout)
    }
}
