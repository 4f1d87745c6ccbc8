//! Progress reporting.
//!
//! Reporters deliver [`ScanUpdate`] messages to whoever follows a scan. The
//! orchestrator logs and drops reporter errors, so a broken channel never
//! affects the scan itself.

use crate::error::{Result, ScanError};
use async_trait::async_trait;
use siteprobe_core::ScanUpdate;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Destination for scan progress messages.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, update: &ScanUpdate) -> Result<()>;
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

#[async_trait]
impl ProgressReporter for NoopReporter {
    async fn report(&self, _update: &ScanUpdate) -> Result<()> {
        Ok(())
    }
}

/// In-process fan-out over a tokio broadcast channel. Backs the SSE endpoint.
#[derive(Debug, Clone)]
pub struct BroadcastReporter {
    sender: broadcast::Sender<ScanUpdate>,
}

impl BroadcastReporter {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ScanUpdate> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl ProgressReporter for BroadcastReporter {
    async fn report(&self, update: &ScanUpdate) -> Result<()> {
        // No subscribers is not an error
        let _ = self.sender.send(update.clone());
        Ok(())
    }
}

/// POSTs each update as JSON to an out-of-process receiver.
#[derive(Debug, Clone)]
pub struct HttpRelayReporter {
    client: reqwest::Client,
    endpoint: url::Url,
}

impl HttpRelayReporter {
    #[must_use]
    pub fn new(endpoint: url::Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }
}

#[async_trait]
impl ProgressReporter for HttpRelayReporter {
    async fn report(&self, update: &ScanUpdate) -> Result<()> {
        self.client
            .post(self.endpoint.clone())
            .json(update)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ScanError::Report(format!("relay to {} failed: {e}", self.endpoint)))?;
        Ok(())
    }
}

/// Sends every update to all inner reporters. One failing reporter does not
/// stop delivery to the others.
#[derive(Default, Clone)]
pub struct FanoutReporter {
    reporters: Vec<Arc<dyn ProgressReporter>>,
}

impl FanoutReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

#[async_trait]
impl ProgressReporter for FanoutReporter {
    async fn report(&self, update: &ScanUpdate) -> Result<()> {
        let results =
            futures::future::join_all(self.reporters.iter().map(|r| r.report(update))).await;

        let mut first_error = None;
        for result in results {
            if let Err(e) = result {
                tracing::warn!("Reporter failed for scan {}: {}", update.scan_id, e);
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}
