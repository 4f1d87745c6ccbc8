//! Siteprobe Database Layer
//!
//! `SQLite` persistence for scans, their test runs and issues, using `SQLx`
//! with embedded migrations.
//!
//! # Example
//!
//! ```ignore
//! use siteprobe_db::Database;
//!
//! let db = Database::new("siteprobe.db").await?;
//! db.run_migrations().await?;
//! ```
//!
//! # Write model
//!
//! - Every write is a single statement; nothing wraps a scan's full issue set
//! - Scan status and progress updates are conditional, so stale or repeated
//!   writes cannot move a scan backwards
//! - [`notifications::apply_update`] applies relayed progress messages with
//!   the same guarantees

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod connection;
pub mod error;
/// Issue records.
pub mod issues;
pub mod notifications;
pub mod scans;
pub mod test_runs;

// Re-export commonly used types
pub use error::{DatabaseError, Result};
pub use issues::IssueCounts;
pub use scans::{NewScan, ScanRecord};
pub use test_runs::TestRunRecord;

use sqlx::{Pool, Sqlite};
use std::path::Path;

/// High-level database handle.
#[derive(Debug)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open the database at `path` (or `:memory:`).
    ///
    /// # Errors
    /// Returns `DatabaseError::Open` if the database cannot be opened.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let pool = connection::connect(path).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Apply any migrations under `migrations/` that have not run yet.
    ///
    /// # Errors
    /// Returns `DatabaseError::Migration` if any migration fails.
    pub async fn run_migrations(&self) -> Result<()> {
        tracing::info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        tracing::debug!("Database schema at version {}", self.get_schema_version().await?);
        Ok(())
    }

    /// Highest applied migration version, or 0 on a fresh database.
    ///
    /// # Errors
    /// Returns `DatabaseError` if the version cannot be queried.
    pub async fn get_schema_version(&self) -> Result<i64> {
        let has_table: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations')",
        )
        .fetch_one(&self.pool)
        .await?;

        if !has_table {
            return Ok(0);
        }

        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM _sqlx_migrations WHERE success = 1")
                .fetch_one(&self.pool)
                .await?;

        Ok(version.unwrap_or(0))
    }

    /// The underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Close all connections.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::info!("Database pool closed");
    }
}
