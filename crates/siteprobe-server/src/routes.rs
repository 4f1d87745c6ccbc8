//! HTTP handlers.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use siteprobe_core::{ScanId, ScanSettings, ScanUpdate};
use siteprobe_db::{
    issues, notifications, scans, test_runs, IssueCounts, NewScan, ScanRecord, TestRunRecord,
};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

/// Body of `POST /scan`. Required fields are optional here so a missing one
/// gets a precise message instead of a generic decode failure.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub url: Option<String>,
    pub scan_id: Option<String>,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub client_id: Option<String>,
    pub settings: Option<ScanSettings>,
}

impl ScanRequest {
    /// Check required fields and build the record to create.
    ///
    /// URL validation happens in the orchestrator so it is enforced for every
    /// caller, not just this endpoint.
    pub fn into_new_scan(self) -> Result<NewScan, ApiError> {
        let url = required(self.url, "url")?;
        let scan_id = required(self.scan_id, "scanId")?;
        let user_id = required(self.user_id, "userId")?;
        let id = ScanId::new(scan_id).map_err(|e| ApiError::bad_request(e.to_string()))?;

        Ok(NewScan {
            id,
            url,
            user_id,
            project_id: self.project_id,
            client_id: self.client_id,
            settings: self.settings.unwrap_or_default(),
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("Missing required field: {field}")))
}

/// Response of `POST /scan`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanAccepted {
    pub scan_id: ScanId,
}

/// Response of `GET /scans/:id`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanDetails {
    pub scan: ScanRecord,
    pub test_runs: Vec<TestRunRecord>,
    pub issue_counts: IssueCounts,
}

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `POST /scan`: create the record and start the scan in the background.
pub async fn submit_scan(
    State(state): State<AppState>,
    body: Result<Json<ScanRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let new_scan = request.into_new_scan()?;

    tracing::info!("Scan {} requested for {}", new_scan.id, new_scan.url);
    let scan_id = state.orchestrator.submit(new_scan).await?;

    Ok((StatusCode::ACCEPTED, Json(ScanAccepted { scan_id })))
}

/// `GET /scans/:id`
pub async fn get_scan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ScanDetails>, ApiError> {
    let scan_id = ScanId::new(id).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let pool = state.db.pool();

    let scan = scans::get_scan(pool, &scan_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Scan {scan_id} not found")))?;
    let test_runs = test_runs::get_by_scan(pool, &scan_id).await?;
    let issue_counts = issues::count_by_severity(pool, &scan_id).await?;

    Ok(Json(ScanDetails {
        scan,
        test_runs,
        issue_counts,
    }))
}

/// `GET /scans/:id/events`: live `ScanUpdate`s for one scan.
pub async fn scan_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let scan_id = ScanId::new(id).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let receiver = state.events.subscribe();

    let stream = BroadcastStream::new(receiver).filter_map(move |item| match item {
        Ok(update) if update.scan_id == scan_id => update_event(&update).map(Ok),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!("Event stream for scan {} lagged: {}", scan_id, e);
            None
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn update_event(update: &ScanUpdate) -> Option<Event> {
    Event::default()
        .event("update")
        .json_data(update)
        .map_err(|e| tracing::warn!("Failed to encode update for scan {}: {}", update.scan_id, e))
        .ok()
}

/// `POST /notifications`: apply a relayed `ScanUpdate` to the stored records.
pub async fn receive_notification(
    State(state): State<AppState>,
    body: Result<Json<ScanUpdate>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(update) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    notifications::apply_update(state.db.pool(), &update).await?;
    Ok(StatusCode::NO_CONTENT)
}
