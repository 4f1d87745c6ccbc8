//! Applies out-of-band progress messages to the stored records.
//!
//! Every field of a [`ScanUpdate`] is an independent partial patch. Applying
//! the same message twice leaves the records as they were after the first
//! application: status changes respect the state machine, progress only
//! rises, and inserts are keyed by id.
//!
//! Messages only patch scans this instance already stores; the receiver never
//! creates scan rows.

use crate::error::{DatabaseError, Result};
use crate::{issues, scans, test_runs};
use siteprobe_core::{ScanId, ScanUpdate, TestRunStatus};
use sqlx::{Pool, Sqlite};

/// Apply every field present in `update`.
///
/// A field that fails is logged and skipped; the remaining fields are still
/// applied.
///
/// # Errors
/// Returns `DatabaseError::NotFoundWithMessage` without touching anything if
/// the scan is unknown. Otherwise returns the first field error, after every
/// other field has been applied.
pub async fn apply_update(pool: &Pool<Sqlite>, update: &ScanUpdate) -> Result<()> {
    let scan_id = &update.scan_id;

    if scans::get_scan(pool, scan_id).await?.is_none() {
        return Err(DatabaseError::NotFoundWithMessage(format!(
            "scan '{scan_id}' not found"
        )));
    }

    let mut first_error = None;

    if let Some(progress) = update.progress {
        let result = scans::update_progress(pool, scan_id, progress).await;
        note(&mut first_error, scan_id, "progress", result.map(drop));
    }

    if let Some(category) = update.current_test {
        let result = scans::set_current_test(pool, scan_id, Some(category)).await;
        note(&mut first_error, scan_id, "currentTest", result);
    }

    if let Some(test) = &update.test {
        let result = async {
            test_runs::insert_if_absent(pool, &test.id, scan_id, test.category).await?;
            if test.status != TestRunStatus::Running {
                test_runs::finish_test_run(
                    pool,
                    &test.id,
                    test.status,
                    test.score,
                    test.error.as_deref(),
                )
                .await?;
            }
            Ok(())
        }
        .await;
        note(&mut first_error, scan_id, "test", result);
    }

    if let Some(issue) = &update.issue {
        let result = issues::insert_issue(pool, issue).await;
        note(&mut first_error, scan_id, "issue", result.map(drop));
    }

    if let Some(summary) = &update.summary {
        let result = scans::set_summary(pool, scan_id, summary).await;
        note(&mut first_error, scan_id, "summary", result);
    }

    match (update.status, update.error.as_deref()) {
        (Some(status), error) => match scans::transition(pool, scan_id, status, error).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(
                "Ignoring {} status for scan {}: not reachable from stored status",
                status,
                scan_id
            ),
            Err(e) => note(&mut first_error, scan_id, "status", Err(e)),
        },
        (None, Some(error)) => {
            let result = scans::set_error(pool, scan_id, error).await;
            note(&mut first_error, scan_id, "error", result);
        }
        (None, None) => {}
    }

    first_error.map_or(Ok(()), Err)
}

fn note(
    first_error: &mut Option<DatabaseError>,
    scan_id: &ScanId,
    field: &str,
    result: Result<()>,
) {
    if let Err(e) = result {
        tracing::warn!("Skipping {} of update for scan {}: {}", field, scan_id, e);
        first_error.get_or_insert(e);
    }
}
