//! PSM report ingestion
//!
//! Reads the tab-separated PSM report written by the scoring step, keeps
//! every PSM row and collapses them into one peptide per modified sequence.
//! Multiplexed reports also carry reporter-ion ratios per PSM.

use crate::error::{PipelineError, Result};
use crate::pipeline::status::Pass;
use crate::store::{NewPeptide, NewPsm, ReporterRatio, Store, Validation};
use csv::StringRecord;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// First column of the reporter intensity block
const INTENSITY_COLUMN: &str = "Deisotoped Intensity";
/// First column of the ratio block, one column per channel
const RATIO_COLUMN: &str = "Ratios";

/// Columns of a PSM report row used by ingestion; others are ignored.
#[derive(Debug, Deserialize)]
struct ReportRow {
    #[serde(rename = "Protein(s)")]
    proteins: String,
    #[serde(rename = "Sequence")]
    sequence: String,
    #[serde(rename = "Modified Sequence")]
    modified_sequence: String,
    #[serde(rename = "Variable Modifications", default)]
    variable_modifications: String,
    #[serde(rename = "Fixed Modifications", default)]
    fixed_modifications: String,
    #[serde(rename = "Spectrum Title", default)]
    spectrum_title: String,
    #[serde(rename = "RT", default, deserialize_with = "csv::invalid_option")]
    retention_time: Option<f64>,
    #[serde(rename = "m/z", default, deserialize_with = "csv::invalid_option")]
    mz: Option<f64>,
    #[serde(rename = "Precursor m/z Error [ppm]", default, deserialize_with = "csv::invalid_option")]
    mz_error_ppm: Option<f64>,
    #[serde(rename = "Measured Charge", default)]
    charge: Option<String>,
    #[serde(rename = "Confidence [%]", default, deserialize_with = "csv::invalid_option")]
    confidence: Option<f64>,
    #[serde(rename = "Validation")]
    validation: String,
    #[serde(rename = "Peak Area", default, deserialize_with = "csv::invalid_option")]
    peak_area: Option<f64>,
}

/// Where the ratio columns of a multiplexed report are, and their labels
#[derive(Debug, Clone, PartialEq)]
struct ReporterChannels {
    /// (column index, channel label)
    columns: Vec<(usize, String)>,
}

impl ReporterChannels {
    /// The intensity block and the ratio block have one column per channel,
    /// so the distance between their first columns is the channel count.
    /// Channel labels come from the second header row.
    fn locate(headers: &StringRecord, labels: &StringRecord) -> Result<Self> {
        let position = |name: &str| headers.iter().position(|h| h.trim() == name);
        let (Some(intensity), Some(ratios)) = (position(INTENSITY_COLUMN), position(RATIO_COLUMN)) else {
            return Err(PipelineError::parse(format!(
                "multiplexed report has no '{}' and '{}' columns",
                INTENSITY_COLUMN, RATIO_COLUMN
            )));
        };
        let channels = ratios.checked_sub(intensity).filter(|&n| n > 0).ok_or_else(|| {
            PipelineError::parse(format!("'{}' column precedes '{}'", RATIO_COLUMN, INTENSITY_COLUMN))
        })?;
        if ratios + channels > headers.len() {
            return Err(PipelineError::parse(format!(
                "report has {} columns, {} reporter channels need {}",
                headers.len(),
                channels,
                ratios + channels
            )));
        }

        let columns = (ratios..ratios + channels)
            .map(|i| (i, labels.get(i).unwrap_or_default().trim().to_string()))
            .collect();
        Ok(Self { columns })
    }

    fn ratios(&self, record: &StringRecord) -> Result<Vec<ReporterRatio>> {
        self.columns
            .iter()
            .map(|(i, label)| {
                let value = record.get(*i).unwrap_or_default().trim();
                let ratio = if value.is_empty() {
                    None
                } else {
                    let ratio: f64 = value
                        .parse()
                        .map_err(|_| PipelineError::parse(format!("invalid ratio '{}' for {}", value, label)))?;
                    (ratio.is_finite() && ratio != 0.0).then_some(ratio)
                };
                Ok(ReporterRatio {
                    label: label.clone(),
                    ratio,
                })
            })
            .collect()
    }
}

/// Peptides and PSMs of one report
#[derive(Debug, Clone, PartialEq)]
pub struct PsmReport {
    pub psm_count: usize,
    pub peptides: Vec<NewPeptide>,
    pub psms: Vec<NewPsm>,
}

/// Result of the ingest step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Loaded { psms: usize, peptides: usize },
    /// Too little evidence; the item was marked skip
    Skipped { psms: usize },
}

/// Parse a PSM report.
///
/// Multiplexed reports carry a second header row with reporter labels; it
/// names the ratio channels and is not a PSM. Rows are grouped by modified
/// sequence in report order: accessions, sequence and modifications come
/// from the first row, the peptide is confident when any of its PSMs is.
pub fn read_psm_report(path: &Path, multiplex: bool) -> Result<PsmReport> {
    let file = std::fs::File::open(path).map_err(|e| PipelineError::file(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_reader(file);

    let headers = reader.headers()?.clone();
    let mut records = reader.records();

    let channels = if multiplex {
        match records.next().transpose()? {
            Some(labels) => {
                let channels = ReporterChannels::locate(&headers, &labels)?;
                debug!(report = %path.display(), channels = channels.columns.len(), "Reporter channels");
                Some(channels)
            },
            None => None,
        }
    } else {
        None
    };

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut peptides: Vec<NewPeptide> = Vec::new();
    let mut psms: Vec<NewPsm> = Vec::new();

    for record in records {
        let record = record?;
        let row: ReportRow = record.deserialize(Some(&headers))?;
        let validation = Validation::from_report(&row.validation);
        let ratios = match &channels {
            Some(channels) => channels.ratios(&record)?,
            None => Vec::new(),
        };

        match index.get(&row.modified_sequence) {
            Some(&i) => {
                let peptide = &mut peptides[i];
                peptide.psm_count += 1;
                if validation == Validation::Confident {
                    peptide.validation = Validation::Confident;
                }
                if let Some(area) = row.peak_area {
                    peptide.peak_area = Some(peptide.peak_area.unwrap_or(0.0) + area);
                    peptide.peak_area_psm += 1;
                }
            },
            None => {
                index.insert(row.modified_sequence.clone(), peptides.len());
                peptides.push(NewPeptide {
                    modified_sequence: row.modified_sequence.clone(),
                    sequence: row.sequence.clone(),
                    accessions: row.proteins.clone(),
                    variable_modifications: row.variable_modifications.clone(),
                    fixed_modifications: row.fixed_modifications.clone(),
                    validation,
                    psm_count: 1,
                    peak_area: row.peak_area,
                    peak_area_psm: i64::from(row.peak_area.is_some()),
                });
            },
        }

        psms.push(NewPsm {
            report_row: psms.len() as i64 + 1,
            modified_sequence: row.modified_sequence,
            sequence: row.sequence,
            accessions: row.proteins,
            variable_modifications: row.variable_modifications,
            fixed_modifications: row.fixed_modifications,
            spectrum_title: row.spectrum_title,
            retention_time: row.retention_time,
            mz: row.mz,
            mz_error_ppm: row.mz_error_ppm,
            charge: row.charge.filter(|c| !c.trim().is_empty()),
            confidence: row.confidence,
            validation,
            peak_area: row.peak_area,
            ratios,
        });
    }

    Ok(PsmReport {
        psm_count: psms.len(),
        peptides,
        psms,
    })
}

/// Ingest the report of one item and pass, replacing earlier results.
///
/// A report with at most one PSM marks the item skip and still counts as
/// success; results of an earlier ingest of the pass are cleared either way.
pub async fn ingest_item(
    store: &Store,
    item_id: i64,
    pass: Pass,
    report: PathBuf,
    multiplex: bool,
) -> Result<IngestOutcome> {
    let path = report.clone();
    let parsed = tokio::task::spawn_blocking(move || read_psm_report(&path, multiplex))
        .await
        .map_err(|e| PipelineError::parse(format!("Report reader task failed: {}", e)))??;

    if parsed.psm_count <= 1 {
        warn!(
            item_id,
            pass = %pass,
            psms = parsed.psm_count,
            report = %report.display(),
            "Too few PSMs, skipping item"
        );
        store.replace_report(item_id, pass, &[], &[]).await?;
        store.set_skip(item_id, true).await?;
        return Ok(IngestOutcome::Skipped {
            psms: parsed.psm_count,
        });
    }

    store
        .replace_report(item_id, pass, &parsed.peptides, &parsed.psms)
        .await?;
    info!(
        item_id,
        pass = %pass,
        psms = parsed.psm_count,
        peptides = parsed.peptides.len(),
        "PSM report ingested"
    );
    Ok(IngestOutcome::Loaded {
        psms: parsed.psm_count,
        peptides: parsed.peptides.len(),
    })
}
