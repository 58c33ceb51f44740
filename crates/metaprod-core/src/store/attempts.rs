//! Per-engine search attempts
//!
//! The step-level error counter says an item is stuck in its search step;
//! these rows say which engines are responsible.

use super::Store;
use crate::error::Result;
use crate::pipeline::status::Pass;
use crate::search::engine::SearchEngine;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EngineAttempt {
    pub item_id: i64,
    pub pass: Pass,
    pub engine: SearchEngine,
    pub succeeded: bool,
    /// Re-invocations since the last success
    pub tries: i64,
}

impl Store {
    /// Start a search step: one zeroed row per enabled engine, stale rows
    /// for engines no longer enabled are dropped.
    pub async fn reset_attempts(&self, item_id: i64, pass: Pass, engines: &[SearchEngine]) -> Result<()> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM engine_attempts WHERE item_id = ?1 AND pass = ?2")
            .bind(item_id)
            .bind(pass)
            .execute(&mut *tx)
            .await?;

        for engine in engines {
            sqlx::query(
                "INSERT INTO engine_attempts (item_id, pass, engine, succeeded, tries) VALUES (?1, ?2, ?3, 0, 0)",
            )
            .bind(item_id)
            .bind(pass)
            .bind(engine)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn record_attempt(
        &self,
        item_id: i64,
        pass: Pass,
        engine: SearchEngine,
        succeeded: bool,
        tries: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO engine_attempts (item_id, pass, engine, succeeded, tries)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(item_id, pass, engine) DO UPDATE SET
                succeeded = excluded.succeeded,
                tries = excluded.tries
            "#,
        )
        .bind(item_id)
        .bind(pass)
        .bind(engine)
        .bind(succeeded)
        .bind(tries)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn attempts(&self, item_id: i64, pass: Pass) -> Result<Vec<EngineAttempt>> {
        let rows = sqlx::query_as::<_, EngineAttempt>(
            r#"
            SELECT item_id, pass, engine, succeeded, tries
            FROM engine_attempts
            WHERE item_id = ?1 AND pass = ?2
            ORDER BY engine
            "#,
        )
        .bind(item_id)
        .bind(pass)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
