//! External step runners
//!
//! The scheduler runs internal steps (reset, ingest, aggregate) itself and
//! hands every external step to a [`StepRunner`].

use super::status::Pass;
use super::step::Step;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::executor::Executor;
use crate::search::{run_search, ToolchainSearchBackend};
use crate::settings::ProjectSettings;
use crate::store::{Store, WorkItem};
use crate::toolchain::{TemplateVars, Toolchain};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Item and settings an external step runs for
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub item: &'a WorkItem,
    pub settings: &'a ProjectSettings,
    pub step: Step,
}

/// Observed result of one external step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub elapsed: Duration,
    /// Human readable reason, `None` on success
    pub failure: Option<String>,
}

impl StepOutcome {
    pub fn success(elapsed: Duration) -> Self {
        Self {
            elapsed,
            failure: None,
        }
    }

    pub fn failed(elapsed: Duration, reason: impl Into<String>) -> Self {
        Self {
            elapsed,
            failure: Some(reason.into()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Runs the external steps of the pipeline.
///
/// `Err` means the environment is broken (configuration, database); a step
/// that ran and failed is an `Ok` outcome with a failure reason.
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(&self, ctx: StepContext<'_>) -> Result<StepOutcome>;
}

/// Search database used by `pass` for `item`.
pub fn search_fasta(config: &PipelineConfig, settings: &ProjectSettings, item: &WorkItem, pass: Pass) -> PathBuf {
    match pass {
        Pass::Profile => settings
            .profile_fasta
            .as_deref()
            .map(|p| config.resolve_data_path(p))
            .unwrap_or_else(|| config.profile_fasta(&item.project)),
        Pass::Proteome if settings.generates_proteome_fasta() => {
            config.item_proteome_fasta(&item.project, &item.filename)
        },
        Pass::Proteome => settings
            .proteome_fasta
            .as_deref()
            .map(|p| config.resolve_data_path(p))
            .unwrap_or_else(|| config.shared_proteome_fasta(&item.project)),
    }
}

/// Placeholder values for one item, optionally within a pass.
pub fn template_vars(
    config: &PipelineConfig,
    settings: &ProjectSettings,
    item: &WorkItem,
    pass: Option<Pass>,
) -> TemplateVars {
    let mut vars = TemplateVars::new()
        .set("project", &item.project)
        .set("filename", &item.filename)
        .set("job", item.job)
        .set("raw", &item.raw_path)
        .set_path("data", &config.data_folder)
        .set_path("install", &config.install_folder)
        .set_path("out", &config.item_out_dir(&item.project, &item.filename))
        .set_path("temp", &config.job_temp_dir(&item.project, item.job))
        .set("threads", config.effective_threads())
        .set("memory", config.memory_mb);

    if let Some(pass) = pass {
        vars = vars
            .set("pass", pass.dir_name())
            .set("pass_number", pass.number())
            .set_path("pass_dir", &config.pass_dir(&item.project, &item.filename, pass))
            .set_path("fasta", &search_fasta(config, settings, item, pass));
    }
    vars
}

/// Production runner: renders toolchain templates and runs them through the
/// executor.
pub struct ToolchainRunner {
    config: PipelineConfig,
    store: Store,
    toolchain: Toolchain,
    executor: Executor,
}

impl ToolchainRunner {
    pub fn new(config: PipelineConfig, store: Store, toolchain: Toolchain, executor: Executor) -> Self {
        Self {
            config,
            store,
            toolchain,
            executor,
        }
    }

    async fn ensure_dir(path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| PipelineError::file(path, e))
    }
}

#[async_trait]
impl StepRunner for ToolchainRunner {
    async fn run(&self, ctx: StepContext<'_>) -> Result<StepOutcome> {
        let item = ctx.item;
        let pass = ctx.step.pass();
        let vars = template_vars(&self.config, ctx.settings, item, pass);

        Self::ensure_dir(&self.config.item_out_dir(&item.project, &item.filename)).await?;
        Self::ensure_dir(&self.config.job_temp_dir(&item.project, item.job)).await?;
        let pass_dir = match pass {
            Some(pass) => {
                let dir = self.config.pass_dir(&item.project, &item.filename, pass);
                Self::ensure_dir(&dir).await?;
                Some(dir)
            },
            None => None,
        };

        match (ctx.step, pass_dir) {
            (Step::Search(pass), Some(pass_dir)) => {
                let engines = ctx.settings.engines_for(pass).enabled();
                let backend = ToolchainSearchBackend::new(
                    &self.toolchain,
                    &self.executor,
                    vars,
                    item.id,
                    &item.filename,
                    pass_dir,
                )?;
                let outcome = run_search(
                    &self.store,
                    &backend,
                    item.id,
                    pass,
                    &engines,
                    self.config.max_retries,
                )
                .await?;
                Ok(match outcome.failure {
                    None => StepOutcome::success(outcome.elapsed),
                    Some(failure) => StepOutcome::failed(outcome.elapsed, failure.to_string()),
                })
            },
            (step, _) => {
                let tool = step.tool_step().ok_or_else(|| {
                    PipelineError::configuration(format!("Step {} is not an external step", step))
                })?;
                let command = self.toolchain.command(tool, &vars)?;
                let outcome = self.executor.execute(&command, item.id).await?;
                Ok(match outcome.failure {
                    None => StepOutcome::success(outcome.elapsed),
                    Some(reason) => StepOutcome::failed(outcome.elapsed, reason.to_string()),
                })
            },
        }
    }
}
