//! Project progress report

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipeline::status::Status;
use crate::store::{Store, WorkItem};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Frozen item, shown so an operator knows what to reset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrozenItem {
    pub id: i64,
    pub filename: String,
    pub status: Status,
    pub error: i64,
    pub job: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectReport {
    pub project: String,
    pub items: usize,
    /// Item count per status, in pipeline order
    pub statuses: BTreeMap<Status, u64>,
    /// Items with at least one failure at their current status
    pub with_errors: u64,
    pub fatal: Vec<FrozenItem>,
    pub skipped: u64,
    pub finished: u64,
    /// Partitions that still have an eligible item
    pub pending_jobs: Vec<i64>,
}

impl ProjectReport {
    pub fn from_items(project: &str, items: &[WorkItem], error_limit: i64) -> Self {
        let mut statuses = BTreeMap::new();
        let mut pending = BTreeSet::new();
        let mut report = Self {
            project: project.to_string(),
            items: items.len(),
            statuses: BTreeMap::new(),
            with_errors: 0,
            fatal: Vec::new(),
            skipped: 0,
            finished: 0,
            pending_jobs: Vec::new(),
        };

        for item in items {
            *statuses.entry(item.status).or_insert(0u64) += 1;
            if item.error > 0 {
                report.with_errors += 1;
            }
            if item.skip {
                report.skipped += 1;
            }
            if item.status == Status::ItemFinished {
                report.finished += 1;
            }
            if !item.skip && item.is_fatal(error_limit) {
                report.fatal.push(FrozenItem {
                    id: item.id,
                    filename: item.filename.clone(),
                    status: item.status,
                    error: item.error,
                    job: item.job,
                });
            }
            if item.is_eligible(error_limit) {
                pending.insert(item.job);
            }
        }

        report.statuses = statuses;
        report.pending_jobs = pending.into_iter().collect();
        report
    }

    /// Every non-skipped item reached `ITEM_FINISHED`.
    pub fn is_complete(&self) -> bool {
        self.items > 0 && self.finished + self.skipped == self.items as u64
    }
}

pub async fn inspect(store: &Store, config: &PipelineConfig, project: &str) -> Result<ProjectReport> {
    store.get_project(project).await?;
    let items = store.items_in_project(project).await?;
    Ok(ProjectReport::from_items(project, &items, config.error_limit()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::test_support::{add_item, store_with_project};

    #[tokio::test]
    async fn test_report_counts() {
        let store = store_with_project().await;
        let config = PipelineConfig::default();
        let a = add_item(&store, "run01", 0).await;
        let b = add_item(&store, "run02", 1).await;
        let c = add_item(&store, "run03", 2).await;
        let d = add_item(&store, "run04", 2).await;

        store.advance_status(a.id, Status::Added, Status::ItemFinished).await.unwrap();
        store.advance_status(b.id, Status::Added, Status::Score1).await.unwrap();
        for _ in 0..config.error_limit() {
            store.record_failure(b.id, Status::Score1).await.unwrap();
        }
        store.set_skip(c.id, true).await.unwrap();
        store.record_failure(d.id, Status::Added).await.unwrap();

        let report = inspect(&store, &config, "soil").await.unwrap();
        assert_eq!(report.items, 4);
        assert_eq!(report.statuses[&Status::Added], 2);
        assert_eq!(report.statuses[&Status::Score1], 1);
        assert_eq!(report.with_errors, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.finished, 1);
        assert_eq!(report.fatal.len(), 1);
        assert_eq!(report.fatal[0].filename, "run02");
        assert_eq!(report.pending_jobs, vec![2]);
        assert!(!report.is_complete());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["statuses"]["SCORE1"], 1);
    }

    #[tokio::test]
    async fn test_empty_project_is_not_complete() {
        let store = store_with_project().await;
        let report = inspect(&store, &PipelineConfig::default(), "soil").await.unwrap();
        assert_eq!(report.items, 0);
        assert!(report.pending_jobs.is_empty());
        assert!(!report.is_complete());
    }
}
