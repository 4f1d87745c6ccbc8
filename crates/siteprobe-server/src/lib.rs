//! Siteprobe Server - HTTP front end for website scans.
//!
//! A thin axum layer over [`siteprobe_scanner::ScanOrchestrator`]. It checks
//! request shape, hands valid requests to the orchestrator and returns right
//! away; the scan itself runs in the background.
//!
//! # Routes
//!
//! - `POST /scan` - submit a scan (202 with `{scanId}`)
//! - `GET /health` - liveness
//! - `GET /scans/:id` - scan record, test runs and issue counts
//! - `GET /scans/:id/events` - live progress as server-sent events
//! - `POST /notifications` - apply a relayed progress message

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
#[allow(missing_docs)]
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/scan", post(routes::submit_scan))
        .route("/scans/:id", get(routes::get_scan))
        .route("/scans/:id/events", get(routes::scan_events))
        .route("/notifications", post(routes::receive_notification))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
