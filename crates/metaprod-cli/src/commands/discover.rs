//! `metaprod discover` command implementation

use super::Session;
use crate::error::{CliError, Result};
use colored::Colorize;
use metaprod_core::discover::discover;

pub async fn run(session: &Session, project: &str, jobs: u32) -> Result<()> {
    if jobs == 0 {
        return Err(CliError::invalid_argument("--jobs must be at least 1"));
    }
    let summary = discover(&session.store, &session.config, project, jobs).await?;

    if summary.found == 0 {
        println!("No .raw or .mzML files in {}", session.config.raw_dir(project).display());
        return Ok(());
    }

    println!(
        "{} {} new, {} already registered ({} files found)",
        "✓".green(),
        summary.added.len().to_string().bold(),
        summary.existing,
        summary.found
    );
    if !summary.added.is_empty() {
        let jobs_used = summary.added.iter().map(|(_, job)| *job).max().map_or(0, |j| j + 1);
        println!("Start workers with 'metaprod advance {} <job>' for jobs 0..{}", project, jobs_used);
    }
    Ok(())
}
