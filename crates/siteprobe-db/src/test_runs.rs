//! Test run records: one per enabled category per scan.

use crate::error::{is_unique_violation, DatabaseError, Result};
use serde::{Deserialize, Serialize};
use siteprobe_core::{Category, ScanId, TestRunStatus, Timestamp};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

/// A persisted test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunRecord {
    /// Unique identifier
    pub id: String,
    /// Owning scan
    pub scan_id: ScanId,
    /// Module category
    pub category: Category,
    /// Current status
    pub status: TestRunStatus,
    /// Category score, set when the run finishes successfully
    pub score: Option<u8>,
    /// 0 while running, 100 once finished
    pub progress: u8,
    /// Failure reason
    pub error_message: Option<String>,
    /// When the module started
    pub started_at: Timestamp,
    /// When the module finished
    pub completed_at: Option<Timestamp>,
}

/// Open a test run in the `running` state.
///
/// # Errors
/// Returns `DatabaseError::AlreadyExists` if the scan already has a run for
/// `category`.
pub async fn create_test_run(
    pool: &Pool<Sqlite>,
    scan_id: &ScanId,
    category: Category,
) -> Result<TestRunRecord> {
    let id = uuid::Uuid::new_v4().to_string();
    let started_at = Timestamp::now();

    sqlx::query(
        "INSERT INTO test_runs (id, scan_id, category, status, progress, started_at)
         VALUES (?, ?, ?, ?, 0, ?)",
    )
    .bind(&id)
    .bind(scan_id.as_str())
    .bind(category.as_str())
    .bind(TestRunStatus::Running.as_str())
    .bind(started_at.to_rfc3339())
    .execute(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            DatabaseError::AlreadyExists(format!("{category} test run for scan '{scan_id}'"))
        } else {
            DatabaseError::Sqlx(e)
        }
    })?;

    Ok(TestRunRecord {
        id,
        scan_id: scan_id.clone(),
        category,
        status: TestRunStatus::Running,
        score: None,
        progress: 0,
        error_message: None,
        started_at,
        completed_at: None,
    })
}

/// Insert a running test run with a caller-chosen id unless it already exists.
///
/// Returns `true` if a row was inserted.
///
/// # Errors
/// Returns `DatabaseError` if the insert fails.
pub async fn insert_if_absent(
    pool: &Pool<Sqlite>,
    id: &str,
    scan_id: &ScanId,
    category: Category,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO test_runs (id, scan_id, category, status, progress, started_at)
         VALUES (?, ?, ?, 'running', 0, ?)",
    )
    .bind(id)
    .bind(scan_id.as_str())
    .bind(category.as_str())
    .bind(Timestamp::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Finalize a running test run. Runs that already finished are left alone.
///
/// Returns `true` if the run was finalized by this call.
///
/// # Errors
/// Returns `DatabaseError` if the update fails.
pub async fn finish_test_run(
    pool: &Pool<Sqlite>,
    id: &str,
    status: TestRunStatus,
    score: Option<u8>,
    error: Option<&str>,
) -> Result<bool> {
    if status == TestRunStatus::Running {
        return Ok(false);
    }

    let result = sqlx::query(
        "UPDATE test_runs
         SET status = ?, score = ?, progress = 100, error_message = ?, completed_at = ?
         WHERE id = ? AND status = 'running'",
    )
    .bind(status.as_str())
    .bind(score.map(i64::from))
    .bind(error)
    .bind(Timestamp::now().to_rfc3339())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Fail every run of a scan that is still `running`.
///
/// Used when a scan aborts mid-module so no run is left open. Returns the
/// number of runs finalized.
///
/// # Errors
/// Returns `DatabaseError` if the update fails.
pub async fn fail_open_runs(pool: &Pool<Sqlite>, scan_id: &ScanId, reason: &str) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE test_runs
         SET status = 'failed', progress = 100, error_message = ?, completed_at = ?
         WHERE scan_id = ? AND status = 'running'",
    )
    .bind(reason)
    .bind(Timestamp::now().to_rfc3339())
    .bind(scan_id.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// All test runs of a scan, in creation order.
///
/// # Errors
/// Returns `DatabaseError` if the query fails or a row cannot be decoded.
pub async fn get_by_scan(pool: &Pool<Sqlite>, scan_id: &ScanId) -> Result<Vec<TestRunRecord>> {
    let rows = sqlx::query(
        "SELECT id, scan_id, category, status, score, progress, error_message,
                started_at, completed_at
         FROM test_runs
         WHERE scan_id = ?
         ORDER BY rowid",
    )
    .bind(scan_id.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter().map(parse_test_run_row).collect()
}

fn parse_test_run_row(row: &SqliteRow) -> Result<TestRunRecord> {
    let scan_id: String = row.try_get("scan_id")?;
    let category: String = row.try_get("category")?;
    let status: String = row.try_get("status")?;
    let score: Option<i64> = row.try_get("score")?;
    let progress: i64 = row.try_get("progress")?;
    let started_at: String = row.try_get("started_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let clamp = |v: i64| v.clamp(0, 100) as u8;

    Ok(TestRunRecord {
        id: row.try_get("id")?,
        scan_id: ScanId::new(scan_id)?,
        category: category.parse()?,
        status: status.parse()?,
        score: score.map(clamp),
        progress: clamp(progress),
        error_message: row.try_get("error_message")?,
        started_at: Timestamp::from_rfc3339(&started_at)?,
        completed_at: completed_at
            .map(|s| Timestamp::from_rfc3339(&s))
            .transpose()?,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::scans::{create_scan, NewScan};
    use crate::Database;
    use siteprobe_core::ScanSettings;

    async fn setup_with_scan() -> (Database, ScanId) {
        let db = Database::new(":memory:").await.expect("create test database");
        db.run_migrations().await.expect("run migrations");
        let id = ScanId::new("scan-1").unwrap();
        create_scan(
            db.pool(),
            NewScan {
                id: id.clone(),
                url: "https://example.com".to_string(),
                user_id: "user-1".to_string(),
                project_id: None,
                client_id: None,
                settings: ScanSettings::default(),
            },
        )
        .await
        .unwrap();
        (db, id)
    }

    #[tokio::test]
    async fn test_create_and_finish() {
        let (db, scan_id) = setup_with_scan().await;
        let run = create_test_run(db.pool(), &scan_id, Category::Seo)
            .await
            .unwrap();
        assert_eq!(run.status, TestRunStatus::Running);

        assert!(
            finish_test_run(db.pool(), &run.id, TestRunStatus::Completed, Some(80), None)
                .await
                .unwrap()
        );

        let runs = get_by_scan(db.pool(), &scan_id).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, TestRunStatus::Completed);
        assert_eq!(runs[0].score, Some(80));
        assert_eq!(runs[0].progress, 100);
        assert!(runs[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn test_finished_run_is_never_reopened() {
        let (db, scan_id) = setup_with_scan().await;
        let run = create_test_run(db.pool(), &scan_id, Category::Security)
            .await
            .unwrap();

        finish_test_run(db.pool(), &run.id, TestRunStatus::Failed, None, Some("timeout"))
            .await
            .unwrap();
        assert!(
            !finish_test_run(db.pool(), &run.id, TestRunStatus::Completed, Some(100), None)
                .await
                .unwrap()
        );

        let runs = get_by_scan(db.pool(), &scan_id).await.unwrap();
        assert_eq!(runs[0].status, TestRunStatus::Failed);
        assert_eq!(runs[0].error_message.as_deref(), Some("timeout"));
        assert_eq!(runs[0].score, None);
    }

    #[tokio::test]
    async fn test_fail_open_runs_leaves_finished_runs() {
        let (db, scan_id) = setup_with_scan().await;
        let done = create_test_run(db.pool(), &scan_id, Category::Performance)
            .await
            .unwrap();
        finish_test_run(db.pool(), &done.id, TestRunStatus::Completed, Some(90), None)
            .await
            .unwrap();
        create_test_run(db.pool(), &scan_id, Category::Seo)
            .await
            .unwrap();

        let failed = fail_open_runs(db.pool(), &scan_id, "Scan timed out")
            .await
            .unwrap();
        assert_eq!(failed, 1);
        assert_eq!(
            fail_open_runs(db.pool(), &scan_id, "again").await.unwrap(),
            0
        );

        let runs = get_by_scan(db.pool(), &scan_id).await.unwrap();
        assert_eq!(runs[0].status, TestRunStatus::Completed);
        assert_eq!(runs[0].score, Some(90));
        assert_eq!(runs[1].status, TestRunStatus::Failed);
        assert_eq!(runs[1].progress, 100);
        assert_eq!(runs[1].error_message.as_deref(), Some("Scan timed out"));
        assert!(runs[1].completed_at.is_some());
    }

    #[tokio::test]
    async fn test_one_run_per_category() {
        let (db, scan_id) = setup_with_scan().await;
        create_test_run(db.pool(), &scan_id, Category::Performance)
            .await
            .unwrap();

        let second = create_test_run(db.pool(), &scan_id, Category::Performance).await;
        assert!(matches!(second, Err(DatabaseError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_insert_if_absent_is_idempotent() {
        let (db, scan_id) = setup_with_scan().await;
        assert!(insert_if_absent(db.pool(), "run-x", &scan_id, Category::Seo)
            .await
            .unwrap());
        assert!(!insert_if_absent(db.pool(), "run-x", &scan_id, Category::Seo)
            .await
            .unwrap());
        assert_eq!(get_by_scan(db.pool(), &scan_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_runs_ordered_by_creation() {
        let (db, scan_id) = setup_with_scan().await;
        for category in [Category::Seo, Category::Security, Category::BestPractices] {
            create_test_run(db.pool(), &scan_id, category).await.unwrap();
        }

        let categories: Vec<_> = get_by_scan(db.pool(), &scan_id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.category)
            .collect();
        assert_eq!(
            categories,
            vec![Category::Seo, Category::Security, Category::BestPractices]
        );
    }
}
