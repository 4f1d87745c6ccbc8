//! Scan records.
//!
//! Status changes are conditional on the current status so the row can only
//! move `queued -> running -> completed | failed`. Progress only moves up and
//! reaches 100 together with the `completed` status.

use crate::error::{is_unique_violation, DatabaseError, Result};
use serde::{Deserialize, Serialize};
use siteprobe_core::{
    Category, ScanId, ScanSettings, ScanStatus, ScreenshotUrls, Summary, Timestamp,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

/// Highest progress value a scan can hold while it is still running.
pub const MAX_RUNNING_PROGRESS: u8 = 99;

/// Fields supplied when a scan is requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScan {
    /// Caller-assigned scan identifier
    pub id: ScanId,
    /// Target URL
    pub url: String,
    /// Requesting user
    pub user_id: String,
    /// Optional project the scan belongs to
    pub project_id: Option<String>,
    /// Optional client the scan belongs to
    pub client_id: Option<String>,
    /// Enabled modules
    pub settings: ScanSettings,
}

/// A persisted scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub id: ScanId,
    pub url: String,
    pub user_id: String,
    pub project_id: Option<String>,
    pub client_id: Option<String>,
    pub status: ScanStatus,
    pub progress: u8,
    pub current_test: Option<Category>,
    pub settings: ScanSettings,
    pub summary: Option<Summary>,
    pub screenshots: Option<ScreenshotUrls>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

/// Insert a new scan in the `queued` state.
///
/// # Errors
/// Returns `DatabaseError::AlreadyExists` if a scan with the same id exists.
pub async fn create_scan(pool: &Pool<Sqlite>, scan: NewScan) -> Result<ScanRecord> {
    let now = Timestamp::now();
    let settings_json = serde_json::to_string(&scan.settings)?;

    sqlx::query(
        "INSERT INTO scans (id, url, user_id, project_id, client_id, status, progress,
                            settings, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?)",
    )
    .bind(scan.id.as_str())
    .bind(&scan.url)
    .bind(&scan.user_id)
    .bind(&scan.project_id)
    .bind(&scan.client_id)
    .bind(ScanStatus::Queued.as_str())
    .bind(&settings_json)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            DatabaseError::AlreadyExists(format!("scan '{}'", scan.id))
        } else {
            DatabaseError::Sqlx(e)
        }
    })?;

    Ok(ScanRecord {
        id: scan.id,
        url: scan.url,
        user_id: scan.user_id,
        project_id: scan.project_id,
        client_id: scan.client_id,
        status: ScanStatus::Queued,
        progress: 0,
        current_test: None,
        settings: scan.settings,
        summary: None,
        screenshots: None,
        error_message: None,
        created_at: now,
        updated_at: now,
        started_at: None,
        completed_at: None,
    })
}

/// Fetch a scan by id.
///
/// # Errors
/// Returns `DatabaseError` if the query fails or a stored value cannot be decoded.
pub async fn get_scan(pool: &Pool<Sqlite>, id: &ScanId) -> Result<Option<ScanRecord>> {
    let row = sqlx::query(
        "SELECT id, url, user_id, project_id, client_id, status, progress, current_test,
                settings, summary, screenshots, error_message,
                created_at, updated_at, started_at, completed_at
         FROM scans
         WHERE id = ?",
    )
    .bind(id.as_str())
    .fetch_optional(pool)
    .await?;

    row.map(|r| parse_scan_row(&r)).transpose()
}

/// Move a scan into `status` if its current status allows it.
///
/// Entering `running` stamps `started_at`; entering a terminal status stamps
/// `completed_at`, and `completed` also sets progress to 100. `error` is
/// recorded when given.
///
/// Returns `false` when the transition was not legal from the stored status
/// (or the scan does not exist); the row is left untouched in that case.
///
/// # Errors
/// Returns `DatabaseError` if the update fails.
pub async fn transition(
    pool: &Pool<Sqlite>,
    id: &ScanId,
    status: ScanStatus,
    error: Option<&str>,
) -> Result<bool> {
    let from = status.predecessors();
    if from.is_empty() {
        return Ok(false);
    }

    let placeholders = vec!["?"; from.len()].join(", ");
    let sql = format!(
        "UPDATE scans
         SET status = ?,
             updated_at = ?,
             started_at = CASE WHEN ? THEN ? ELSE started_at END,
             completed_at = CASE WHEN ? THEN ? ELSE completed_at END,
             progress = CASE WHEN ? THEN 100 ELSE progress END,
             error_message = COALESCE(?, error_message)
         WHERE id = ? AND status IN ({placeholders})"
    );

    let now = Timestamp::now().to_rfc3339();
    let mut query = sqlx::query(&sql)
        .bind(status.as_str())
        .bind(&now)
        .bind(status == ScanStatus::Running)
        .bind(&now)
        .bind(status.is_terminal())
        .bind(&now)
        .bind(status == ScanStatus::Completed)
        .bind(error)
        .bind(id.as_str());
    for prev in from {
        query = query.bind(prev.as_str());
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

/// Raise the progress of a running scan. Lower values are ignored and the
/// stored value never exceeds [`MAX_RUNNING_PROGRESS`].
///
/// # Errors
/// Returns `DatabaseError` if the update fails.
pub async fn update_progress(pool: &Pool<Sqlite>, id: &ScanId, progress: u8) -> Result<bool> {
    let progress = progress.min(MAX_RUNNING_PROGRESS);

    let result = sqlx::query(
        "UPDATE scans SET progress = MAX(progress, ?), updated_at = ?
         WHERE id = ? AND status = 'running'",
    )
    .bind(i64::from(progress))
    .bind(Timestamp::now().to_rfc3339())
    .bind(id.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Record which module is currently running.
///
/// # Errors
/// Returns `DatabaseError` if the update fails.
pub async fn set_current_test(
    pool: &Pool<Sqlite>,
    id: &ScanId,
    category: Option<Category>,
) -> Result<()> {
    sqlx::query("UPDATE scans SET current_test = ?, updated_at = ? WHERE id = ?")
        .bind(category.map(Category::as_str))
        .bind(Timestamp::now().to_rfc3339())
        .bind(id.as_str())
        .execute(pool)
        .await?;
    Ok(())
}

/// Store the scan summary.
///
/// # Errors
/// Returns `DatabaseError` if serialization or the update fails.
pub async fn set_summary(pool: &Pool<Sqlite>, id: &ScanId, summary: &Summary) -> Result<()> {
    let json = serde_json::to_string(summary)?;
    sqlx::query("UPDATE scans SET summary = ?, updated_at = ? WHERE id = ?")
        .bind(&json)
        .bind(Timestamp::now().to_rfc3339())
        .bind(id.as_str())
        .execute(pool)
        .await?;
    Ok(())
}

/// Store the screenshot URLs captured for a scan.
///
/// # Errors
/// Returns `DatabaseError` if serialization or the update fails.
pub async fn set_screenshots(
    pool: &Pool<Sqlite>,
    id: &ScanId,
    screenshots: &ScreenshotUrls,
) -> Result<()> {
    let json = serde_json::to_string(screenshots)?;
    sqlx::query("UPDATE scans SET screenshots = ?, updated_at = ? WHERE id = ?")
        .bind(&json)
        .bind(Timestamp::now().to_rfc3339())
        .bind(id.as_str())
        .execute(pool)
        .await?;
    Ok(())
}

/// Record an error message without changing status.
///
/// # Errors
/// Returns `DatabaseError` if the update fails.
pub async fn set_error(pool: &Pool<Sqlite>, id: &ScanId, error: &str) -> Result<()> {
    sqlx::query("UPDATE scans SET error_message = ?, updated_at = ? WHERE id = ?")
        .bind(error)
        .bind(Timestamp::now().to_rfc3339())
        .bind(id.as_str())
        .execute(pool)
        .await?;
    Ok(())
}

fn parse_timestamp(raw: Option<String>) -> Result<Option<Timestamp>> {
    raw.map(|s| Timestamp::from_rfc3339(&s))
        .transpose()
        .map_err(DatabaseError::from)
}

fn parse_scan_row(row: &SqliteRow) -> Result<ScanRecord> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let progress: i64 = row.try_get("progress")?;
    let current_test: Option<String> = row.try_get("current_test")?;
    let settings: String = row.try_get("settings")?;
    let summary: Option<String> = row.try_get("summary")?;
    let screenshots: Option<String> = row.try_get("screenshots")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(ScanRecord {
        id: ScanId::new(id)?,
        url: row.try_get("url")?,
        user_id: row.try_get("user_id")?,
        project_id: row.try_get("project_id")?,
        client_id: row.try_get("client_id")?,
        status: status.parse()?,
        progress: u8::try_from(progress)
            .map_err(|_| DatabaseError::Decode(format!("progress out of range: {progress}")))?,
        current_test: current_test.map(|c| c.parse()).transpose()?,
        settings: serde_json::from_str(&settings)?,
        summary: summary.map(|s| serde_json::from_str(&s)).transpose()?,
        screenshots: screenshots.map(|s| serde_json::from_str(&s)).transpose()?,
        error_message: row.try_get("error_message")?,
        created_at: Timestamp::from_rfc3339(&created_at)?,
        updated_at: Timestamp::from_rfc3339(&updated_at)?,
        started_at: parse_timestamp(row.try_get("started_at")?)?,
        completed_at: parse_timestamp(row.try_get("completed_at")?)?,
    })
}
