//! `metaprod advance` command implementation
//!
//! Runs one `(project, job)` partition in this process. Start one process
//! per job; they coordinate through the database only.

use super::Session;
use crate::error::Result;
use colored::Colorize;
use metaprod_core::executor::{Executor, JobLog};
use metaprod_core::pipeline::{Scheduler, ToolchainRunner};
use metaprod_core::toolchain::Toolchain;
use tracing::info;

pub async fn run(session: &Session, project: &str, job: i64) -> Result<()> {
    let config = &session.config;
    let toolchain = Toolchain::load(&config.toolchain_file)?;
    let log = JobLog::open(config.job_log(project, job)).await?;
    let log_path = log.path().to_path_buf();
    let executor = Executor::new(log);
    let runner = ToolchainRunner::new(config.clone(), session.store.clone(), toolchain, executor);

    info!(project = %project, job, toolchain = %config.toolchain_file.display(), "Worker started");
    let summary = Scheduler::new(&session.store, config, &runner)
        .advance(project, job)
        .await?;

    println!(
        "{} Job {} idle: {} succeeded, {} failed, {} skipped",
        "✓".green(),
        job,
        summary.succeeded,
        summary.failed,
        summary.skipped
    );
    if summary.passes_completed > 0 {
        println!("  Passes completed: {}", summary.passes_completed);
    }
    if !summary.frozen.is_empty() {
        let ids: Vec<String> = summary.frozen.iter().map(|id| id.to_string()).collect();
        println!(
            "{} Retry budget spent for items {}; see {} and 'metaprod reset'",
            "!".yellow().bold(),
            ids.join(", "),
            log_path.display()
        );
    }
    Ok(())
}
