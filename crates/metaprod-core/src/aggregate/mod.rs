//! Pass-two database regeneration
//!
//! After the whole project finished profiling, the proteomes that make up
//! most of each group's profile NSAF are concatenated into the database the
//! group's items search in pass two.

pub mod fasta;
pub mod selection;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::status::Pass;
use crate::settings::{ProfileType, ProjectSettings, HUMAN_PROTEOME};
use crate::store::{Store, WorkItem};
use fasta::{write_fasta, FastaWriteSummary};
use selection::{merge_shares, select_proteomes, ProteomeShare};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// Database written for one profiling group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedFasta {
    pub group: String,
    pub proteomes: Vec<String>,
    pub items: Vec<i64>,
    pub summary: FastaWriteSummary,
}

/// Group key of an item under the project's profiling mode.
fn group_key(profile_type: ProfileType, item: &WorkItem) -> String {
    match profile_type {
        ProfileType::File => item.filename.clone(),
        ProfileType::Sample => item
            .sample
            .as_ref()
            .map(|s| format!("sample:{}", s))
            .unwrap_or_else(|| item.filename.clone()),
        ProfileType::Project => item.project.clone(),
    }
}

/// Write the pass-two database of every item in `items`.
pub async fn regenerate_proteome_fastas(
    store: &Store,
    config: &PipelineConfig,
    settings: &ProjectSettings,
    items: &[WorkItem],
) -> Result<Vec<GeneratedFasta>> {
    let mut groups: BTreeMap<String, Vec<&WorkItem>> = BTreeMap::new();
    for item in items {
        groups.entry(group_key(settings.profile_type, item)).or_default().push(item);
    }

    let mut generated = Vec::with_capacity(groups.len());
    for (group, members) in groups {
        let mut shares = Vec::new();
        for item in &members {
            shares.extend(
                store
                    .species_file_summaries(item.id, Pass::Profile)
                    .await?
                    .into_iter()
                    .map(|s| ProteomeShare {
                        proteome: s.proteome,
                        nsaf: s.nsaf,
                    }),
            );
        }
        let proteomes = select_proteomes(&merge_shares(shares), settings.profile_threshold);

        let mut sources: Vec<PathBuf> = proteomes.iter().map(|p| config.proteome_source(p)).collect();
        if settings.use_human {
            sources.push(config.proteome_source(HUMAN_PROTEOME));
        }
        if settings.use_contaminants {
            sources.push(config.contaminant_source());
        }

        let Some((first, rest)) = members.split_first() else {
            continue;
        };
        let output = config.item_proteome_fasta(&first.project, &first.filename);
        let copies: Vec<PathBuf> = rest
            .iter()
            .map(|item| config.item_proteome_fasta(&item.project, &item.filename))
            .collect();

        let summary = tokio::task::spawn_blocking(move || -> Result<FastaWriteSummary> {
            let summary = write_fasta(&output, &sources)?;
            for copy in &copies {
                if let Some(parent) = copy.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| PipelineError::file(parent, e))?;
                }
                std::fs::copy(&output, copy).map_err(|e| PipelineError::file(copy, e))?;
            }
            Ok(summary)
        })
        .await
        .map_err(|e| PipelineError::parse(format!("FASTA writer task failed: {}", e)))??;

        info!(
            group = %group,
            proteomes = proteomes.len(),
            items = members.len(),
            records = summary.records,
            missing = summary.missing.len(),
            "Proteome database generated"
        );
        generated.push(GeneratedFasta {
            group,
            proteomes,
            items: members.iter().map(|i| i.id).collect(),
            summary,
        });
    }
    Ok(generated)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pipeline::status::Status;

    fn item(id: i64, filename: &str, sample: Option<&str>) -> WorkItem {
        WorkItem {
            id,
            project: "soil".to_string(),
            filename: filename.to_string(),
            raw_path: String::new(),
            status: Status::Pass1Done,
            error: 0,
            skip: false,
            job: 0,
            sample: sample.map(str::to_string),
            tag: None,
            total_runtime: 0,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_group_keys() {
        let with_sample = item(1, "run01", Some("A"));
        let without = item(2, "run02", None);

        assert_eq!(group_key(ProfileType::File, &with_sample), "run01");
        assert_eq!(group_key(ProfileType::Sample, &with_sample), "sample:A");
        assert_eq!(group_key(ProfileType::Sample, &without), "run02");
        assert_eq!(group_key(ProfileType::Project, &without), "soil");
    }
}
