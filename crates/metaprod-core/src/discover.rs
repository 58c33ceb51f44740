//! Input file discovery
//!
//! Walks `<data>/<project>/raw` for `.raw` and `.mzML` files and registers
//! every new file stem as a work item.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::store::{NewWorkItem, Store};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

const INPUT_EXTENSIONS: [&str; 2] = ["raw", "mzML"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoverySummary {
    /// Input files found on disk
    pub found: usize,
    /// Newly registered items as `(item id, job)`
    pub added: Vec<(i64, i64)>,
    /// Stems that were already registered
    pub existing: usize,
}

fn is_input(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| INPUT_EXTENSIONS.contains(&ext))
}

/// Input files under `raw_dir`, sorted by path.
pub fn find_inputs(raw_dir: &Path) -> Result<Vec<PathBuf>> {
    if !raw_dir.exists() {
        return Ok(Vec::new());
    }
    let mut inputs = Vec::new();
    for entry in WalkDir::new(raw_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| PipelineError::Io(e.into()))?;
        if entry.file_type().is_file() && is_input(entry.path()) {
            inputs.push(entry.into_path());
        }
    }
    Ok(inputs)
}

/// Register new input files of `project`, spreading them round-robin over
/// `jobs` partitions. Items already known by stem are left untouched.
///
/// On a project without items, stale job logs and temp folders from an
/// earlier run are removed first.
pub async fn discover(store: &Store, config: &PipelineConfig, project: &str, jobs: u32) -> Result<DiscoverySummary> {
    if jobs == 0 {
        return Err(PipelineError::configuration("Number of jobs must be at least 1"));
    }
    store.get_project(project).await?;
    store.project_settings(project).await?;

    let known: HashSet<String> = store
        .items_in_project(project)
        .await?
        .into_iter()
        .map(|item| item.filename)
        .collect();

    if known.is_empty() {
        for stale in [config.log_dir(project), config.temp_dir(project)] {
            if stale.exists() {
                tokio::fs::remove_dir_all(&stale)
                    .await
                    .map_err(|e| PipelineError::file(&stale, e))?;
                info!(path = %stale.display(), "Removed stale directory");
            }
        }
    }

    let raw_dir = config.raw_dir(project);
    let dir = raw_dir.clone();
    let inputs = tokio::task::spawn_blocking(move || find_inputs(&dir))
        .await
        .map_err(|e| PipelineError::parse(format!("Discovery task failed: {}", e)))??;
    if inputs.is_empty() {
        warn!(project = %project, dir = %raw_dir.display(), "No input files found");
    }

    let mut summary = DiscoverySummary {
        found: inputs.len(),
        ..Default::default()
    };
    let mut seen = known;
    let mut job = 0i64;
    for path in inputs {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };
        if !seen.insert(stem.clone()) {
            summary.existing += 1;
            continue;
        }

        let raw_path = std::path::absolute(&path).unwrap_or(path);
        let item = store
            .insert_item(&NewWorkItem {
                project: project.to_string(),
                filename: stem,
                raw_path: raw_path.display().to_string(),
                job,
                sample: None,
            })
            .await?;
        info!(project = %project, item_id = item.id, filename = %item.filename, job, "Work item added");
        summary.added.push((item.id, job));
        job = (job + 1) % i64::from(jobs);
    }

    Ok(summary)
}
