//! Project-level pass completion
//!
//! A pass is complete once no non-skipped item of the project is still
//! below the pass's terminal status. Frozen items count as below, so a
//! single stuck file holds back the project until an operator resets or
//! skips it.

use super::status::Pass;
use crate::aggregate::{regenerate_proteome_fastas, GeneratedFasta};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::executor::remove_output;
use crate::settings::ProjectSettings;
use crate::store::{Store, WorkItem};
use serde::Serialize;
use tracing::{debug, info, warn};

/// What completing a pass did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassCompletion {
    pub pass: Pass,
    /// Items moved out of the pass's terminal status
    pub promoted: usize,
    /// Partitions that received work through the promotion
    pub jobs: Vec<i64>,
    pub species: u64,
    pub fastas: Vec<GeneratedFasta>,
}

/// Aggregate and promote `pass` of `project` if every item got there.
///
/// Returns `None` while the gate is closed or nothing waits at the terminal
/// status. Aggregation is rebuilt from scratch and the promotion is one
/// conditional update, so two workers reaching the gate together produce
/// the same result.
pub async fn complete_pass(
    store: &Store,
    config: &PipelineConfig,
    settings: &ProjectSettings,
    project: &str,
    pass: Pass,
) -> Result<Option<PassCompletion>> {
    let done = pass.done_status();
    let below = store.count_below(project, done).await?;
    if below > 0 {
        debug!(project = %project, pass = %pass, below, "Pass not complete yet");
        return Ok(None);
    }

    let ready = store.items_at(project, done).await?;
    if ready.is_empty() {
        return Ok(None);
    }

    info!(project = %project, pass = %pass, items = ready.len(), "All items finished pass, aggregating");
    let (species, fastas) = aggregate_pass(store, config, settings, project, pass, &ready).await?;

    // no item of the project runs a step until the promotion below
    let temp = config.temp_dir(project);
    match remove_output(&temp).await {
        Ok(true) => debug!(project = %project, path = %temp.display(), "Project temp directory removed"),
        Ok(false) => {},
        Err(e) => warn!(project = %project, path = %temp.display(), error = %e, "Failed to remove project temp directory"),
    }

    let jobs = store.promote(project, done, pass.promoted_status()).await?;
    info!(
        project = %project,
        pass = %pass,
        to = %pass.promoted_status(),
        jobs = ?jobs,
        "Items promoted"
    );

    Ok(Some(PassCompletion {
        pass,
        promoted: ready.len(),
        jobs,
        species,
        fastas,
    }))
}

async fn aggregate_pass(
    store: &Store,
    config: &PipelineConfig,
    settings: &ProjectSettings,
    project: &str,
    pass: Pass,
    ready: &[WorkItem],
) -> Result<(u64, Vec<GeneratedFasta>)> {
    let error_limit = config.error_limit();

    for item in ready {
        store.recompute_nsaf(item.id, pass).await?;
    }
    let species = store.rebuild_species_summaries(project, pass, error_limit).await?;
    store
        .rebuild_species_file_summaries(project, pass, error_limit)
        .await?;

    for item in ready {
        let ledger = store.ledger(item.id).await?;
        store
            .set_total_runtime(item.id, ledger.total_through(pass))
            .await?;
    }

    let fastas = if pass == Pass::Profile && settings.generates_proteome_fasta() {
        regenerate_proteome_fastas(store, config, settings, ready).await?
    } else {
        Vec::new()
    };

    Ok((species, fastas))
}
