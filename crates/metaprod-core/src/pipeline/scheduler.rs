//! Partition scheduler
//!
//! One worker process advances one `(project, job)` partition: it keeps
//! picking the highest-status eligible item, runs the step mapped to that
//! status and records the outcome, until nothing in the partition can move.

use super::project::complete_pass;
use super::runner::{StepContext, StepOutcome, StepRunner};
use super::status::{Pass, Status};
use super::step::{next_step, Step};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::inference::infer_item;
use crate::ingest::{ingest_item, IngestOutcome};
use crate::settings::ProjectSettings;
use crate::store::{Store, WorkItem};
use serde::Serialize;
use std::time::Instant;
use tracing::{error, info, warn};

/// Counters of one `advance` run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AdvanceSummary {
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Items whose retry budget ran out during this run
    pub frozen: Vec<i64>,
    pub passes_completed: u64,
}

impl AdvanceSummary {
    pub fn steps(&self) -> u64 {
        self.succeeded + self.failed + self.skipped
    }
}

pub struct Scheduler<'a> {
    store: &'a Store,
    config: &'a PipelineConfig,
    runner: &'a dyn StepRunner,
}

impl<'a> Scheduler<'a> {
    pub fn new(store: &'a Store, config: &'a PipelineConfig, runner: &'a dyn StepRunner) -> Self {
        Self {
            store,
            config,
            runner,
        }
    }

    /// Run the partition until it is idle.
    ///
    /// Returns `Err` only for failures outside any one item (configuration,
    /// database); those stop the loop without touching retry counters.
    #[tracing::instrument(skip(self))]
    pub async fn advance(&self, project: &str, job: i64) -> Result<AdvanceSummary> {
        let settings = self.store.project_settings(project).await?;
        let error_limit = self.config.error_limit();
        let mut summary = AdvanceSummary::default();

        loop {
            let Some(item) = self.store.next_eligible(project, job, error_limit).await? else {
                if self.complete_passes(project, job, &settings, &mut summary).await? {
                    continue;
                }
                break;
            };

            if let Some(reached) = self.run_item(&item, &settings, &mut summary).await? {
                if let Some(pass) = reached.pass().filter(|p| p.done_status() == reached) {
                    if let Some(completion) =
                        complete_pass(self.store, self.config, &settings, project, pass).await?
                    {
                        summary.passes_completed += 1;
                        info!(project = %project, pass = %completion.pass, promoted = completion.promoted, "Pass complete");
                    }
                }
            }
        }

        info!(
            project = %project,
            job,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            frozen = summary.frozen.len(),
            "Partition idle"
        );
        Ok(summary)
    }

    /// Re-check both pass gates. Returns whether this partition got work.
    async fn complete_passes(
        &self,
        project: &str,
        job: i64,
        settings: &ProjectSettings,
        summary: &mut AdvanceSummary,
    ) -> Result<bool> {
        let mut got_work = false;
        for pass in Pass::BOTH {
            if let Some(completion) = complete_pass(self.store, self.config, settings, project, pass).await? {
                summary.passes_completed += 1;
                got_work |= completion.jobs.contains(&job);
            }
        }
        Ok(got_work)
    }

    /// Run the step of one item. Returns the status reached on success.
    async fn run_item(
        &self,
        item: &WorkItem,
        settings: &ProjectSettings,
        summary: &mut AdvanceSummary,
    ) -> Result<Option<Status>> {
        let Some(transition) = next_step(item.status) else {
            return Ok(None);
        };
        let step = transition.step;
        let to = transition.on_success;

        if step.is_skipped(settings) {
            if self.store.advance_status(item.id, item.status, to).await? {
                info!(item_id = item.id, filename = %item.filename, step = %step, to = %to, "Step skipped");
                summary.skipped += 1;
                return Ok(Some(to));
            }
            return Ok(None);
        }

        info!(
            item_id = item.id,
            filename = %item.filename,
            status = %item.status,
            step = %step,
            attempt = item.error + 1,
            "Running step"
        );

        let started = Instant::now();
        let outcome = match self.run_step(item, settings, step, started).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_item_fault() => StepOutcome::failed(started.elapsed(), e.to_string()),
            Err(e) => {
                error!(item_id = item.id, step = %step, error = %e, "Step aborted");
                return Err(e);
            },
        };

        match outcome.failure {
            None => {
                if !self.store.advance_status(item.id, item.status, to).await? {
                    warn!(item_id = item.id, step = %step, "Item changed while the step ran, outcome dropped");
                    return Ok(None);
                }
                if let Some(field) = step.ledger_field() {
                    self.store
                        .record_duration(item.id, field, outcome.elapsed.as_secs() as i64)
                        .await?;
                }
                summary.succeeded += 1;
                info!(item_id = item.id, step = %step, to = %to, seconds = outcome.elapsed.as_secs(), "Step succeeded");
                Ok(Some(to))
            },
            Some(reason) => {
                summary.failed += 1;
                match self.store.record_failure(item.id, item.status).await? {
                    Some(count) if count >= self.config.error_limit() => {
                        error!(
                            item_id = item.id,
                            filename = %item.filename,
                            step = %step,
                            error = count,
                            reason = %reason,
                            "Retry budget spent, item frozen until reset"
                        );
                        summary.frozen.push(item.id);
                    },
                    Some(count) => {
                        warn!(item_id = item.id, step = %step, error = count, reason = %reason, "Step failed");
                    },
                    None => {
                        warn!(item_id = item.id, step = %step, "Item changed while the step ran, failure dropped");
                    },
                }
                Ok(None)
            },
        }
    }

    async fn run_step(
        &self,
        item: &WorkItem,
        settings: &ProjectSettings,
        step: Step,
        started: Instant,
    ) -> Result<StepOutcome> {
        match step {
            Step::Reset => {
                self.store.wipe_derived(item.id).await?;
                let out = self.config.item_out_dir(&item.project, &item.filename);
                if out.exists() {
                    tokio::fs::remove_dir_all(&out)
                        .await
                        .map_err(|e| PipelineError::file(&out, e))?;
                }
                Ok(StepOutcome::success(started.elapsed()))
            },
            Step::Ingest(pass) => {
                let report = self
                    .config
                    .psm_report(&item.project, &item.filename, pass, settings.multiplex);
                if let IngestOutcome::Skipped { psms } =
                    ingest_item(self.store, item.id, pass, report, settings.multiplex).await?
                {
                    info!(item_id = item.id, psms, "Item marked skip");
                }
                Ok(StepOutcome::success(started.elapsed()))
            },
            Step::Aggregate(pass) => {
                let inferred = infer_item(self.store, item.id, pass, settings.run_quantification).await?;
                info!(
                    item_id = item.id,
                    pass = %pass,
                    peptides = inferred.peptides,
                    proteins = inferred.proteins,
                    "Proteins inferred"
                );
                Ok(StepOutcome::success(started.elapsed()))
            },
            Step::Convert
            | Step::Search(_)
            | Step::Score(_)
            | Step::QuantPrep(_)
            | Step::Quant(_) => self.runner.run(StepContext { item, settings, step }).await,
        }
    }
}
