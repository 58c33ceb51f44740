//! Per-step runtime ledger
//!
//! One row per work item with one whole-seconds column per timed step.
//! Skipped steps leave their column at zero, indistinguishable from a step
//! that ran in under a second.

use super::Store;
use crate::error::{PipelineError, Result};
use crate::pipeline::status::Pass;
use serde::{Deserialize, Serialize};

/// A timed step, i.e. one ledger column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerField {
    Conversion,
    Search(Pass),
    Score(Pass),
    QuantPrep(Pass),
    Quant(Pass),
    Ingest(Pass),
    Aggregate(Pass),
}

impl LedgerField {
    /// Column name in `run_time_ledgers`. Always one of a fixed set, so it is
    /// safe to splice into SQL.
    pub fn column(self) -> &'static str {
        use LedgerField::*;
        match self {
            Conversion => "conversion",
            Search(Pass::Profile) => "search_1",
            Score(Pass::Profile) => "score_1",
            QuantPrep(Pass::Profile) => "quant_prep_1",
            Quant(Pass::Profile) => "quant_1",
            Ingest(Pass::Profile) => "ingest_1",
            Aggregate(Pass::Profile) => "aggregate_1",
            Search(Pass::Proteome) => "search_2",
            Score(Pass::Proteome) => "score_2",
            QuantPrep(Pass::Proteome) => "quant_prep_2",
            Quant(Pass::Proteome) => "quant_2",
            Ingest(Pass::Proteome) => "ingest_2",
            Aggregate(Pass::Proteome) => "aggregate_2",
        }
    }
}

/// Runtime ledger row, seconds per step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RunTimeLedger {
    pub item_id: i64,
    pub conversion: i64,
    pub search_1: i64,
    pub score_1: i64,
    pub quant_prep_1: i64,
    pub quant_1: i64,
    pub ingest_1: i64,
    pub aggregate_1: i64,
    pub search_2: i64,
    pub score_2: i64,
    pub quant_prep_2: i64,
    pub quant_2: i64,
    pub ingest_2: i64,
    pub aggregate_2: i64,
}

impl RunTimeLedger {
    pub fn pass_fields(&self, pass: Pass) -> [i64; 6] {
        match pass {
            Pass::Profile => [
                self.search_1,
                self.score_1,
                self.quant_prep_1,
                self.quant_1,
                self.ingest_1,
                self.aggregate_1,
            ],
            Pass::Proteome => [
                self.search_2,
                self.score_2,
                self.quant_prep_2,
                self.quant_2,
                self.ingest_2,
                self.aggregate_2,
            ],
        }
    }

    /// Conversion plus every step up to and including `through`.
    pub fn total_through(&self, through: Pass) -> i64 {
        let mut total = self.conversion + self.pass_fields(Pass::Profile).iter().sum::<i64>();
        if through == Pass::Proteome {
            total += self.pass_fields(Pass::Proteome).iter().sum::<i64>();
        }
        total
    }

    /// Sum of every field.
    pub fn total(&self) -> i64 {
        self.total_through(Pass::Proteome)
    }

    pub fn get(&self, field: LedgerField) -> i64 {
        use LedgerField::*;
        match field {
            Conversion => self.conversion,
            Search(p) => self.pass_fields(p)[0],
            Score(p) => self.pass_fields(p)[1],
            QuantPrep(p) => self.pass_fields(p)[2],
            Quant(p) => self.pass_fields(p)[3],
            Ingest(p) => self.pass_fields(p)[4],
            Aggregate(p) => self.pass_fields(p)[5],
        }
    }
}

impl Store {
    pub async fn ledger(&self, item_id: i64) -> Result<RunTimeLedger> {
        sqlx::query_as::<_, RunTimeLedger>("SELECT * FROM run_time_ledgers WHERE item_id = ?1")
            .bind(item_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| PipelineError::not_found("runtime ledger", item_id))
    }

    /// Write the duration of one successful step.
    pub async fn record_duration(&self, item_id: i64, field: LedgerField, seconds: i64) -> Result<()> {
        let sql = format!(
            "UPDATE run_time_ledgers SET {} = ?2 WHERE item_id = ?1",
            field.column()
        );
        let updated = sqlx::query(&sql)
            .bind(item_id)
            .bind(seconds)
            .execute(self.pool())
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(PipelineError::not_found("runtime ledger", item_id));
        }
        Ok(())
    }

    /// Drop every record derived from an item and start a fresh ledger.
    ///
    /// This is the `ADDED` step: after it the item looks as if it had just
    /// been discovered, whatever state an earlier run left behind.
    pub async fn wipe_derived(&self, item_id: i64) -> Result<()> {
        let mut tx = self.pool().begin().await?;

        for table in [
            "psms",
            "peptides",
            "proteins",
            "engine_attempts",
            "species_file_summaries",
            "run_time_ledgers",
        ] {
            sqlx::query(&format!("DELETE FROM {} WHERE item_id = ?1", table))
                .bind(item_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("INSERT INTO run_time_ledgers (item_id) VALUES (?1)")
            .bind(item_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE work_items SET total_runtime = 0 WHERE id = ?1")
            .bind(item_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::test_support::{add_item, store_with_project};

    #[test]
    fn test_columns_are_unique() {
        let mut fields = vec![LedgerField::Conversion];
        for pass in Pass::BOTH {
            fields.extend([
                LedgerField::Search(pass),
                LedgerField::Score(pass),
                LedgerField::QuantPrep(pass),
                LedgerField::Quant(pass),
                LedgerField::Ingest(pass),
                LedgerField::Aggregate(pass),
            ]);
        }
        let mut columns: Vec<_> = fields.iter().map(|f| f.column()).collect();
        columns.sort();
        columns.dedup();
        assert_eq!(columns.len(), 13);
    }

    #[test]
    fn test_totals() {
        let ledger = RunTimeLedger {
            conversion: 10,
            search_1: 100,
            aggregate_1: 5,
            search_2: 200,
            ingest_2: 7,
            ..Default::default()
        };
        assert_eq!(ledger.total_through(Pass::Profile), 115);
        assert_eq!(ledger.total(), 322);
        assert_eq!(ledger.get(LedgerField::Ingest(Pass::Proteome)), 7);
    }

    #[tokio::test]
    async fn test_record_duration_writes_one_field() {
        let store = store_with_project().await;
        let item = add_item(&store, "run01", 0).await;

        store
            .record_duration(item.id, LedgerField::Score(Pass::Proteome), 42)
            .await
            .unwrap();

        let ledger = store.ledger(item.id).await.unwrap();
        assert_eq!(ledger.score_2, 42);
        assert_eq!(ledger.total(), 42);
    }

    #[tokio::test]
    async fn test_wipe_derived_zeroes_ledger() {
        let store = store_with_project().await;
        let item = add_item(&store, "run01", 0).await;
        store.record_duration(item.id, LedgerField::Conversion, 30).await.unwrap();
        store.set_total_runtime(item.id, 30).await.unwrap();

        store.wipe_derived(item.id).await.unwrap();
        store.wipe_derived(item.id).await.unwrap();

        assert_eq!(store.ledger(item.id).await.unwrap().total(), 0);
        assert_eq!(store.get_item(item.id).await.unwrap().total_runtime, 0);
    }
}
