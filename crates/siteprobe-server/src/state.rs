//! Shared handler state.

use siteprobe_db::Database;
use siteprobe_scanner::{BroadcastReporter, ScanOrchestrator};
use std::sync::Arc;

/// State shared by every route.
#[derive(Clone)]
pub struct AppState {
    /// Runs submitted scans in the background
    pub orchestrator: Arc<ScanOrchestrator>,
    /// Record store backing the read endpoints
    pub db: Arc<Database>,
    /// Live updates for the SSE endpoint. Must be one of the orchestrator's
    /// reporters for events to flow.
    pub events: BroadcastReporter,
}

impl AppState {
    /// Bundle an orchestrator with the store it writes to and its broadcast reporter.
    pub fn new(orchestrator: Arc<ScanOrchestrator>, events: BroadcastReporter) -> Self {
        let db = Arc::clone(orchestrator.database());
        Self {
            orchestrator,
            db,
            events,
        }
    }
}
