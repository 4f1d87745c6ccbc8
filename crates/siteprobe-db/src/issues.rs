//! Issue records.
//!
//! Each issue is written independently; there is no transaction spanning a
//! module's or a scan's issue set.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use siteprobe_core::{
    Issue, IssueDraft, IssueLocation, IssueStatus, ScanId, Severity, Timestamp,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

/// Issue totals per severity for one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCounts {
    pub total: u32,
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

/// Insert an issue. Re-inserting an id that already exists is a no-op.
///
/// Returns `true` if a row was inserted.
///
/// # Errors
/// Returns `DatabaseError` if the insert fails.
pub async fn insert_issue(pool: &Pool<Sqlite>, issue: &Issue) -> Result<bool> {
    let draft = &issue.draft;
    let result = sqlx::query(
        "INSERT OR IGNORE INTO issues (id, scan_id, test_run_id, category, title, description,
                                       severity, location_url, selector, line, element_snippet,
                                       screenshot_url, recommendation, status, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&issue.id)
    .bind(issue.scan_id.as_str())
    .bind(&issue.test_run_id)
    .bind(issue.category.as_str())
    .bind(&draft.title)
    .bind(&draft.description)
    .bind(draft.severity.as_str())
    .bind(&draft.location.url)
    .bind(&draft.location.selector)
    .bind(draft.location.line.map(i64::from))
    .bind(&draft.element_snippet)
    .bind(&draft.screenshot_url)
    .bind(&draft.recommendation)
    .bind(issue.status.as_str())
    .bind(issue.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// All issues of a scan, in insertion order.
///
/// # Errors
/// Returns `DatabaseError` if the query fails or a row cannot be decoded.
pub async fn get_by_scan(pool: &Pool<Sqlite>, scan_id: &ScanId) -> Result<Vec<Issue>> {
    let rows = sqlx::query(
        "SELECT id, scan_id, test_run_id, category, title, description, severity,
                location_url, selector, line, element_snippet, screenshot_url,
                recommendation, status, created_at
         FROM issues
         WHERE scan_id = ?
         ORDER BY rowid",
    )
    .bind(scan_id.as_str())
    .fetch_all(pool)
    .await?;

    rows.iter().map(parse_issue_row).collect()
}

/// Issues recorded by one test run.
///
/// # Errors
/// Returns `DatabaseError` if the query fails or a row cannot be decoded.
pub async fn get_by_test_run(pool: &Pool<Sqlite>, test_run_id: &str) -> Result<Vec<Issue>> {
    let rows = sqlx::query(
        "SELECT id, scan_id, test_run_id, category, title, description, severity,
                location_url, selector, line, element_snippet, screenshot_url,
                recommendation, status, created_at
         FROM issues
         WHERE test_run_id = ?
         ORDER BY rowid",
    )
    .bind(test_run_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(parse_issue_row).collect()
}

/// Count a scan's issues by severity.
///
/// # Errors
/// Returns `DatabaseError` if the query fails or a severity cannot be decoded.
pub async fn count_by_severity(pool: &Pool<Sqlite>, scan_id: &ScanId) -> Result<IssueCounts> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT severity, COUNT(*) FROM issues WHERE scan_id = ? GROUP BY severity",
    )
    .bind(scan_id.as_str())
    .fetch_all(pool)
    .await?;

    let mut counts = IssueCounts::default();
    for (severity, count) in rows {
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        match severity.parse::<Severity>()? {
            Severity::Critical => counts.critical += count,
            Severity::High => counts.high += count,
            Severity::Medium => counts.medium += count,
            Severity::Low => counts.low += count,
        }
        counts.total += count;
    }

    Ok(counts)
}

fn parse_issue_row(row: &SqliteRow) -> Result<Issue> {
    let scan_id: String = row.try_get("scan_id")?;
    let category: String = row.try_get("category")?;
    let severity: String = row.try_get("severity")?;
    let line: Option<i64> = row.try_get("line")?;
    let created_at: String = row.try_get("created_at")?;

    let draft = IssueDraft {
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        severity: severity.parse()?,
        location: IssueLocation {
            url: row.try_get("location_url")?,
            selector: row.try_get("selector")?,
            line: line.and_then(|l| u32::try_from(l).ok()),
        },
        element_snippet: row.try_get("element_snippet")?,
        screenshot_url: row.try_get("screenshot_url")?,
        recommendation: row.try_get("recommendation")?,
    };

    Ok(Issue {
        id: row.try_get("id")?,
        scan_id: ScanId::new(scan_id)?,
        test_run_id: row.try_get("test_run_id")?,
        category: category.parse()?,
        status: IssueStatus::Open,
        created_at: Timestamp::from_rfc3339(&created_at)?,
        draft,
    })
}
