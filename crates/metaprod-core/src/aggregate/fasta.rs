//! Proteome database writer

use crate::catalog::fasta::{FastaReader, HeaderParser};
use crate::error::{PipelineError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FastaWriteSummary {
    pub records: u64,
    pub duplicates: u64,
    /// Sources that did not exist
    pub missing: Vec<PathBuf>,
}

/// Concatenate `sources` into `output`, keeping the first record of each
/// accession. Missing sources are logged and skipped.
///
/// The file is written to a uniquely named temporary file next to its
/// destination and renamed into place. An interrupted write never leaves a
/// truncated database behind, and two processes completing the same pass
/// each replace the file whole.
pub fn write_fasta(output: &Path, sources: &[PathBuf]) -> Result<FastaWriteSummary> {
    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| PipelineError::file(parent, e))?;
    let partial = NamedTempFile::new_in(parent).map_err(|e| PipelineError::file(parent, e))?;
    let partial_path = partial.path().to_path_buf();
    let mut writer = BufWriter::new(partial);

    let parser = HeaderParser::new()?;
    let mut seen: HashSet<String> = HashSet::new();
    let mut summary = FastaWriteSummary::default();

    for source in sources {
        if !source.exists() {
            warn!(source = %source.display(), "Proteome FASTA missing, skipping");
            summary.missing.push(source.clone());
            continue;
        }

        let mut written = 0u64;
        for record in FastaReader::open(source)? {
            let record = record?;
            let accession = parser
                .accession(&record.header)
                .unwrap_or(record.header.as_str())
                .to_string();
            if !seen.insert(accession) {
                summary.duplicates += 1;
                continue;
            }
            writer
                .write_all(record.to_fasta().as_bytes())
                .map_err(|e| PipelineError::file(&partial_path, e))?;
            written += 1;
        }
        debug!(source = %source.display(), records = written, "Proteome FASTA appended");
        summary.records += written;
    }

    let partial = writer
        .into_inner()
        .map_err(|e| PipelineError::file(&partial_path, e.into_error()))?;
    partial
        .persist(output)
        .map_err(|e| PipelineError::file(output, e.error))?;
    Ok(summary)
}
