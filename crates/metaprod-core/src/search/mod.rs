//! Multi-engine search step
//!
//! One invocation of the search front end runs every enabled engine. Each
//! engine is checked for its own artifact afterwards, and an engine that
//! produced nothing is re-run alone, up to `max_retries` times, instead of
//! repeating the whole batch.

pub mod archive;
pub mod engine;

use crate::error::{PipelineError, Result};
use crate::executor::{remove_output, ExecOutcome, Executor};
use crate::pipeline::status::Pass;
use crate::store::Store;
use crate::toolchain::{TemplateVars, Toolchain};
use async_trait::async_trait;
use engine::SearchEngine;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Why the search step failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SearchFailure {
    /// No engine is switched on for the pass
    NoEnginesEnabled,
    /// The batch invocation did not run to completion
    BatchFailed,
    /// Engines still without output after their retry budget
    MissingEngines(Vec<SearchEngine>),
}

impl std::fmt::Display for SearchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchFailure::NoEnginesEnabled => f.write_str("no search engine enabled"),
            SearchFailure::BatchFailed => f.write_str("search invocation failed"),
            SearchFailure::MissingEngines(engines) => {
                let names: Vec<_> = engines.iter().map(|e| e.as_str()).collect();
                write!(f, "no output from {}", names.join(", "))
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchOutcome {
    pub elapsed: Duration,
    pub failure: Option<SearchFailure>,
}

impl SearchOutcome {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// What the retry controller needs from the search front end of one item
/// and pass.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Remove output left by an earlier search step.
    async fn clear(&self) -> Result<()> {
        Ok(())
    }

    /// Run the front end with only `engines` switched on. `Ok(false)` means
    /// the invocation itself failed.
    async fn invoke(&self, engines: &[SearchEngine]) -> Result<bool>;

    /// Which of `engines` currently have their artifact.
    async fn present(&self, engines: &[SearchEngine]) -> Result<Vec<SearchEngine>>;
}

/// Run the search step for one item and pass.
///
/// Attempt rows are reset first and are the record of which engines need
/// attention when the step fails.
pub async fn run_search(
    store: &Store,
    backend: &dyn SearchBackend,
    item_id: i64,
    pass: Pass,
    engines: &[SearchEngine],
    max_retries: u32,
) -> Result<SearchOutcome> {
    let started = Instant::now();
    let finish = |failure: Option<SearchFailure>| SearchOutcome {
        elapsed: started.elapsed(),
        failure,
    };

    store.reset_attempts(item_id, pass, engines).await?;
    if engines.is_empty() {
        warn!(item_id, pass = %pass, "No search engines enabled for pass");
        return Ok(finish(Some(SearchFailure::NoEnginesEnabled)));
    }

    backend.clear().await?;
    if !backend.invoke(engines).await? {
        return Ok(finish(Some(SearchFailure::BatchFailed)));
    }

    let present = backend.present(engines).await?;
    let mut still_missing = Vec::new();
    for &engine in engines {
        if present.contains(&engine) {
            store.record_attempt(item_id, pass, engine, true, 0).await?;
            continue;
        }

        let mut recovered = false;
        let mut tries = 0;
        while tries < i64::from(max_retries) {
            tries += 1;
            store.record_attempt(item_id, pass, engine, false, tries).await?;
            warn!(item_id, pass = %pass, engine = %engine, tries, "Engine produced no output, re-running it alone");

            if backend.invoke(&[engine]).await? && backend.present(&[engine]).await?.contains(&engine) {
                recovered = true;
                break;
            }
        }

        if recovered {
            store.record_attempt(item_id, pass, engine, true, 0).await?;
            info!(item_id, pass = %pass, engine = %engine, tries, "Engine recovered");
        } else {
            if tries == 0 {
                store.record_attempt(item_id, pass, engine, false, 0).await?;
            }
            still_missing.push(engine);
        }
    }

    if still_missing.is_empty() {
        Ok(finish(None))
    } else {
        warn!(item_id, pass = %pass, engines = ?still_missing, "Engines without output after retries");
        Ok(finish(Some(SearchFailure::MissingEngines(still_missing))))
    }
}

/// Search backend driving the configured front end through the executor.
///
/// Every invocation's archive is unpacked into `<pass_dir>/search`, so
/// results of single-engine re-runs add to those of the batch. Before an
/// invocation the archive and the artifacts of the engines being run are
/// removed; an engine only counts as present when this run produced it.
pub struct ToolchainSearchBackend<'a> {
    toolchain: &'a Toolchain,
    executor: &'a Executor,
    vars: TemplateVars,
    item_id: i64,
    filename: String,
    archive: PathBuf,
    results_dir: PathBuf,
}

impl<'a> ToolchainSearchBackend<'a> {
    pub fn new(
        toolchain: &'a Toolchain,
        executor: &'a Executor,
        vars: TemplateVars,
        item_id: i64,
        filename: &str,
        pass_dir: PathBuf,
    ) -> Result<Self> {
        let archive = toolchain.search_archive(&vars)?;
        Ok(Self {
            toolchain,
            executor,
            vars,
            item_id,
            filename: filename.to_string(),
            archive,
            results_dir: pass_dir.join("search"),
        })
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }
}

#[async_trait]
impl SearchBackend for ToolchainSearchBackend<'_> {
    async fn clear(&self) -> Result<()> {
        if self.archive.exists() {
            tokio::fs::remove_file(&self.archive)
                .await
                .map_err(|e| PipelineError::file(&self.archive, e))?;
        }
        if self.results_dir.exists() {
            tokio::fs::remove_dir_all(&self.results_dir)
                .await
                .map_err(|e| PipelineError::file(&self.results_dir, e))?;
        }
        Ok(())
    }

    async fn invoke(&self, engines: &[SearchEngine]) -> Result<bool> {
        let mut command = self.toolchain.search_command(&self.vars, engines)?;
        command.outputs.push(self.archive.clone());

        for engine in engines {
            let artifact = self.results_dir.join(engine.artifact(&self.filename));
            remove_output(&artifact)
                .await
                .map_err(|e| PipelineError::file(&artifact, e))?;
        }

        let outcome: ExecOutcome = self.executor.execute(&command, self.item_id).await?;
        if !outcome.succeeded() {
            return Ok(false);
        }

        let archive = self.archive.clone();
        let dest = self.results_dir.clone();
        tokio::task::spawn_blocking(move || archive::extract_flat(&archive, &dest))
            .await
            .map_err(|e| PipelineError::parse(format!("Archive extraction task failed: {}", e)))??;
        Ok(true)
    }

    async fn present(&self, engines: &[SearchEngine]) -> Result<Vec<SearchEngine>> {
        Ok(engines
            .iter()
            .copied()
            .filter(|engine| self.results_dir.join(engine.artifact(&self.filename)).exists())
            .collect())
    }
}
