//! Reference catalog loading
//!
//! The catalog maps every accession a search can report to its length and
//! proteome. It is loaded once per install from UniProt-style FASTA files
//! and a tab-separated proteome list, independently of any project.

pub mod fasta;

use crate::error::{PipelineError, Result};
use crate::settings::{CONTAMINANT_PROTEOME, HUMAN_PROTEOME};
use crate::store::{Proteome, ReferenceProtein, Store};
use fasta::{FastaReader, HeaderParser};
use serde::Serialize;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Proteins sent to the database per transaction
const LOAD_BATCH: usize = 5000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    /// Records read from the file
    pub records: u64,
    /// Catalog rows written
    pub loaded: u64,
    /// Decoys and unparseable headers
    pub skipped: u64,
}

/// Load reference proteins from a FASTA file.
///
/// Parsing runs on a blocking thread and hands batches to the async side,
/// so memory stays bounded for whole-proteome files.
pub async fn load_fasta(store: &Store, path: &Path) -> Result<LoadSummary> {
    let (tx, mut rx) = mpsc::channel::<Vec<ReferenceProtein>>(2);
    let source = path.to_path_buf();

    let parser = tokio::task::spawn_blocking(move || parse_batches(&source, tx));

    let mut loaded = 0;
    while let Some(batch) = rx.recv().await {
        loaded += store.upsert_reference_proteins(&batch).await?;
    }

    let (records, skipped) = parser
        .await
        .map_err(|e| PipelineError::parse(format!("FASTA parser task failed: {}", e)))??;

    info!(
        path = %path.display(),
        records = records,
        loaded = loaded,
        skipped = skipped,
        "Reference proteins loaded"
    );
    Ok(LoadSummary {
        records,
        loaded,
        skipped,
    })
}

fn parse_batches(path: &Path, tx: mpsc::Sender<Vec<ReferenceProtein>>) -> Result<(u64, u64)> {
    let parser = HeaderParser::new()?;
    let mut batch = Vec::with_capacity(LOAD_BATCH);
    let mut records = 0;
    let mut skipped = 0;

    for record in FastaReader::open(path)? {
        let record = record?;
        records += 1;
        match parser.reference_protein(&record) {
            Some(protein) => batch.push(protein),
            None => {
                if !record.header.contains("_REVERSED") {
                    warn!(header = %record.header, "Unrecognized FASTA header");
                }
                skipped += 1;
            },
        }

        if batch.len() >= LOAD_BATCH {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(LOAD_BATCH));
            if tx.blocking_send(full).is_err() {
                // receiver gone: the database side already failed
                return Ok((records, skipped));
            }
        }
    }

    if !batch.is_empty() {
        let _ = tx.blocking_send(batch);
    }
    Ok((records, skipped))
}

/// Load the proteome list.
///
/// The file is tab separated with a header row; columns are matched case
/// insensitively. `Proteome Id` and `Organism` are required, `Organism Id`
/// (taxonomy id) is optional. The human and contaminant proteomes are
/// always added.
pub async fn load_proteomes(store: &Store, path: &Path) -> Result<u64> {
    let source = path.to_path_buf();
    let mut proteomes = tokio::task::spawn_blocking(move || read_proteome_list(&source))
        .await
        .map_err(|e| PipelineError::parse(format!("Proteome reader task failed: {}", e)))??;

    proteomes.push(Proteome {
        id: HUMAN_PROTEOME.to_string(),
        organism: "Homo sapiens".to_string(),
        taxonomy_id: Some(9606),
    });
    proteomes.push(Proteome {
        id: CONTAMINANT_PROTEOME.to_string(),
        organism: "CRAP".to_string(),
        taxonomy_id: None,
    });

    let written = store.upsert_proteomes(&proteomes).await?;
    info!(path = %path.display(), proteomes = written, "Proteome list loaded");
    Ok(written)
}

fn read_proteome_list(path: &Path) -> Result<Vec<Proteome>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)
        .map_err(|e| match e.into_kind() {
            csv::ErrorKind::Io(io) => PipelineError::file(path, io),
            other => PipelineError::parse(format!("{:?}", other)),
        })?;

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_lowercase()).collect();
    let column = |names: &[&str]| headers.iter().position(|h| names.contains(&h.as_str()));

    let id_col = column(&["proteome id", "proteome"]).ok_or_else(|| {
        PipelineError::parse(format!("{}: missing 'Proteome Id' column", path.display()))
    })?;
    let organism_col = column(&["organism"])
        .ok_or_else(|| PipelineError::parse(format!("{}: missing 'Organism' column", path.display())))?;
    let taxid_col = column(&["organism id", "taxonomy id", "taxid"]);

    let mut seen = std::collections::HashSet::new();
    let mut proteomes = Vec::new();
    for row in reader.records() {
        let row = row?;
        let Some(id) = row.get(id_col).map(str::trim).filter(|id| !id.is_empty()) else {
            continue;
        };
        if !seen.insert(id.to_string()) {
            continue;
        }
        proteomes.push(Proteome {
            id: id.to_string(),
            organism: row.get(organism_col).unwrap_or_default().trim().to_string(),
            taxonomy_id: taxid_col.and_then(|c| row.get(c)).and_then(|t| t.trim().parse().ok()),
        });
    }
    Ok(proteomes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_load_fasta() {
        let store = Store::open_in_memory().await.unwrap();
        let file = write_temp(
            ">tr|A1|Protein one OS=Bug one OX=1 GN=abc PE=1 SV=1 UPId=UP1 PPId=UP1\nMKV\nLLA\n\
             >tr|A1_REVERSED|Protein one OS=Bug one OX=1 PE=1 SV=1 UPId=UP1 PPId=UP1\nALLVKM\n\
             >sp|P00761|\nFPTDDDDKIV\n",
        );

        let summary = load_fasta(&store, file.path()).await.unwrap();
        assert_eq!(summary.records, 3);
        assert_eq!(summary.loaded, 2);
        assert_eq!(summary.skipped, 1);

        let found = store
            .reference_proteins(&["A1".to_string(), "P00761".to_string()])
            .await
            .unwrap();
        assert_eq!(found["A1"].length, 6);
        assert_eq!(found["A1"].proteome, "UP1");
        assert_eq!(found["P00761"].proteome, "0");
    }

    #[tokio::test]
    async fn test_load_fasta_missing_file() {
        let store = Store::open_in_memory().await.unwrap();
        let err = load_fasta(&store, Path::new("/nonexistent/profile.fasta")).await.unwrap_err();
        assert!(matches!(err, PipelineError::File { .. }));
    }

    #[tokio::test]
    async fn test_load_proteomes() {
        let store = Store::open_in_memory().await.unwrap();
        let file = write_temp(
            "Proteome Id\tOrganism\tOrganism Id\nUP1\tBug one\t1\nUP2\tBug two\t\nUP1\tduplicate\t1\n",
        );

        // two listed plus human and contaminants
        assert_eq!(load_proteomes(&store, file.path()).await.unwrap(), 4);
        let bug = store.get_proteome("UP1").await.unwrap().unwrap();
        assert_eq!(bug.organism, "Bug one");
        assert_eq!(bug.taxonomy_id, Some(1));
        assert_eq!(store.get_proteome("UP2").await.unwrap().unwrap().taxonomy_id, None);
        assert!(store.get_proteome("0").await.unwrap().is_some());
    }
}
