//! Durable work item store
//!
//! A thin repository over a SQLite pool. Every table belongs to one of the
//! submodules, which add their queries as `impl Store` blocks:
//!
//! - [`projects`]: projects and their settings
//! - [`items`]: work items and status transitions
//! - [`ledger`]: per-step runtimes
//! - [`attempts`]: per-engine search attempts
//! - [`results`]: peptides, resolved proteins and species summaries
//! - [`catalog`]: the shared reference catalog
//!
//! Several worker processes share one database file. The pool enables WAL
//! and a busy timeout so that their single-row writes queue instead of
//! failing.

pub mod attempts;
pub mod catalog;
pub mod items;
pub mod ledger;
pub mod projects;
pub mod results;

use crate::config::PipelineConfig;
use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

pub use attempts::EngineAttempt;
pub use catalog::{Proteome, ReferenceProtein};
pub use items::{NewWorkItem, WorkItem};
pub use ledger::{LedgerField, RunTimeLedger};
pub use projects::Project;
pub use results::{
    NewPeptide, NewProtein, NewPsm, PeptideRow, ProteinRow, PsmRatioRow, PsmRow, ReporterRatio,
    SpeciesFileSummary, SpeciesSummary, Validation,
};

/// Handle to the pipeline database
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database named in `config` and apply
    /// pending migrations.
    pub async fn connect(config: &PipelineConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout())
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.database_max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        tracing::info!(
            url = %config.database_url,
            max_connections = config.database_max_connections,
            "Database connection pool created"
        );

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Private in-memory database, used by tests and dry runs.
    ///
    /// A single connection keeps every query on the same memory database.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_in_memory_store_migrates() {
        let store = Store::open_in_memory().await.unwrap();
        store.health_check().await.unwrap();
        // migrations are idempotent
        store.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_creates_database_file() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("pipeline.db");
        let config = PipelineConfig {
            database_url: format!("sqlite://{}", db_path.display()),
            ..Default::default()
        };

        let store = Store::connect(&config).await.unwrap();
        store.health_check().await.unwrap();
        store.close().await;

        assert!(db_path.exists());
    }
}
