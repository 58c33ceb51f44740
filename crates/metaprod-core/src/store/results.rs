//! Peptides, resolved proteins and species summaries
//!
//! Peptides, PSMs and reporter ratios are written by report ingestion,
//! proteins by the inference step. Both are replaced wholesale per item and
//! pass, so re-running either step never leaves stale rows behind.

use super::Store;
use crate::error::Result;
use crate::pipeline::status::Pass;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const INSERT_CHUNK: usize = 500;

const PEPTIDE_COLUMNS: &str = "id, item_id, pass, modified_sequence, sequence, accessions, \
                               variable_modifications, fixed_modifications, validation, psm_count, \
                               peak_area, peak_area_psm, protein_id";

const PSM_COLUMNS: &str = "id, item_id, pass, report_row, peptide_id, modified_sequence, sequence, \
                           accessions, variable_modifications, fixed_modifications, spectrum_title, \
                           retention_time, mz, mz_error_ppm, charge, confidence, validation, peak_area";

const PROTEIN_COLUMNS: &str =
    "id, item_id, pass, accession, psm_count, peptide_count, saf, nsaf, peak_area, peak_area_psm";

/// Validation class assigned by the scoring tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Validation {
    Confident,
    Doubtful,
}

impl Validation {
    /// Anything the scoring tool does not call confident is doubtful.
    pub fn from_report(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("confident") {
            Validation::Confident
        } else {
            Validation::Doubtful
        }
    }
}

impl std::fmt::Display for Validation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Validation::Confident => f.write_str("Confident"),
            Validation::Doubtful => f.write_str("Doubtful"),
        }
    }
}

/// Peptide aggregated from report rows, before it has an id
#[derive(Debug, Clone, PartialEq)]
pub struct NewPeptide {
    pub modified_sequence: String,
    pub sequence: String,
    /// Candidate accessions, comma separated as reported
    pub accessions: String,
    pub variable_modifications: String,
    pub fixed_modifications: String,
    pub validation: Validation,
    pub psm_count: i64,
    pub peak_area: Option<f64>,
    pub peak_area_psm: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PeptideRow {
    pub id: i64,
    pub item_id: i64,
    pub pass: Pass,
    pub modified_sequence: String,
    pub sequence: String,
    pub accessions: String,
    pub variable_modifications: String,
    pub fixed_modifications: String,
    pub validation: Validation,
    pub psm_count: i64,
    pub peak_area: Option<f64>,
    pub peak_area_psm: i64,
    pub protein_id: Option<i64>,
}

impl PeptideRow {
    /// Candidate accessions, trimmed and deduplicated in report order.
    pub fn accession_list(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for accession in self.accessions.split(',').map(str::trim) {
            if !accession.is_empty() && !seen.contains(&accession) {
                seen.push(accession);
            }
        }
        seen
    }
}

/// Reporter-ion ratio of one multiplex channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReporterRatio {
    pub label: String,
    /// `None` for a zero or missing value: not expressed and not detected
    /// cannot be told apart.
    pub ratio: Option<f64>,
}

/// One PSM row of a report, before it has an id
#[derive(Debug, Clone, PartialEq)]
pub struct NewPsm {
    /// 1-based position among the report's PSMs
    pub report_row: i64,
    pub modified_sequence: String,
    pub sequence: String,
    pub accessions: String,
    pub variable_modifications: String,
    pub fixed_modifications: String,
    pub spectrum_title: String,
    pub retention_time: Option<f64>,
    pub mz: Option<f64>,
    pub mz_error_ppm: Option<f64>,
    pub charge: Option<String>,
    pub confidence: Option<f64>,
    pub validation: Validation,
    pub peak_area: Option<f64>,
    /// Channels in report column order; empty unless multiplexed
    pub ratios: Vec<ReporterRatio>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PsmRow {
    pub id: i64,
    pub item_id: i64,
    pub pass: Pass,
    pub report_row: i64,
    pub peptide_id: Option<i64>,
    pub modified_sequence: String,
    pub sequence: String,
    pub accessions: String,
    pub variable_modifications: String,
    pub fixed_modifications: String,
    pub spectrum_title: String,
    pub retention_time: Option<f64>,
    pub mz: Option<f64>,
    pub mz_error_ppm: Option<f64>,
    pub charge: Option<String>,
    pub confidence: Option<f64>,
    pub validation: Validation,
    pub peak_area: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PsmRatioRow {
    pub psm_id: i64,
    pub channel: i64,
    pub label: String,
    pub ratio: Option<f64>,
}

/// Protein resolved by inference together with the peptides assigned to it
#[derive(Debug, Clone, PartialEq)]
pub struct NewProtein {
    pub accession: String,
    pub psm_count: i64,
    pub peptide_count: i64,
    pub saf: f64,
    pub nsaf: f64,
    pub peak_area: Option<f64>,
    pub peak_area_psm: Option<i64>,
    pub peptide_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProteinRow {
    pub id: i64,
    pub item_id: i64,
    pub pass: Pass,
    pub accession: String,
    pub psm_count: i64,
    pub peptide_count: i64,
    pub saf: f64,
    pub nsaf: f64,
    pub peak_area: Option<f64>,
    pub peak_area_psm: Option<i64>,
}

/// Per-proteome totals over a whole project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SpeciesSummary {
    pub project: String,
    pub pass: Pass,
    pub proteome: String,
    pub organism: Option<String>,
    pub psm_count: i64,
    pub peptide_count: i64,
    pub protein_count: i64,
    pub nsaf: f64,
    pub peak_area: Option<f64>,
    pub peak_area_psm: Option<i64>,
}

/// Per-proteome totals for one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SpeciesFileSummary {
    pub item_id: i64,
    pub pass: Pass,
    pub proteome: String,
    pub organism: Option<String>,
    pub psm_count: i64,
    pub peptide_count: i64,
    pub protein_count: i64,
    pub nsaf: f64,
    pub peak_area: Option<f64>,
    pub peak_area_psm: Option<i64>,
}

impl Store {
    /// Replace the peptides of an item and pass, without PSM rows.
    pub async fn replace_peptides(&self, item_id: i64, pass: Pass, peptides: &[NewPeptide]) -> Result<u64> {
        self.replace_report(item_id, pass, peptides, &[]).await
    }

    /// Replace everything ingested from one report: peptides, their PSMs and
    /// reporter ratios. Proteins and the item's species summary of that pass
    /// are dropped too since they were derived from the old peptides.
    ///
    /// PSMs are linked to the peptide with the same modified sequence.
    /// Returns the number of peptides written.
    pub async fn replace_report(
        &self,
        item_id: i64,
        pass: Pass,
        peptides: &[NewPeptide],
        psms: &[NewPsm],
    ) -> Result<u64> {
        let mut tx = self.pool().begin().await?;

        for table in ["species_file_summaries", "psms", "proteins", "peptides"] {
            sqlx::query(&format!("DELETE FROM {} WHERE item_id = ?1 AND pass = ?2", table))
                .bind(item_id)
                .bind(pass)
                .execute(&mut *tx)
                .await?;
        }

        let mut written = 0;
        for chunk in peptides.chunks(INSERT_CHUNK) {
            let mut builder = sqlx::QueryBuilder::new(
                "INSERT INTO peptides (item_id, pass, modified_sequence, sequence, accessions, \
                 variable_modifications, fixed_modifications, validation, psm_count, peak_area, \
                 peak_area_psm) ",
            );
            builder.push_values(chunk, |mut row, peptide| {
                row.push_bind(item_id)
                    .push_bind(pass)
                    .push_bind(&peptide.modified_sequence)
                    .push_bind(&peptide.sequence)
                    .push_bind(&peptide.accessions)
                    .push_bind(&peptide.variable_modifications)
                    .push_bind(&peptide.fixed_modifications)
                    .push_bind(peptide.validation)
                    .push_bind(peptide.psm_count)
                    .push_bind(peptide.peak_area)
                    .push_bind(peptide.peak_area_psm);
            });
            written += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        if psms.is_empty() {
            tx.commit().await?;
            return Ok(written);
        }

        let peptide_ids: HashMap<String, i64> = sqlx::query_as::<_, (String, i64)>(
            "SELECT modified_sequence, id FROM peptides WHERE item_id = ?1 AND pass = ?2",
        )
        .bind(item_id)
        .bind(pass)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

        for chunk in psms.chunks(INSERT_CHUNK) {
            let mut builder = sqlx::QueryBuilder::new(
                "INSERT INTO psms (item_id, pass, report_row, peptide_id, modified_sequence, sequence, \
                 accessions, variable_modifications, fixed_modifications, spectrum_title, retention_time, \
                 mz, mz_error_ppm, charge, confidence, validation, peak_area) ",
            );
            builder.push_values(chunk, |mut row, psm| {
                row.push_bind(item_id)
                    .push_bind(pass)
                    .push_bind(psm.report_row)
                    .push_bind(peptide_ids.get(&psm.modified_sequence).copied())
                    .push_bind(&psm.modified_sequence)
                    .push_bind(&psm.sequence)
                    .push_bind(&psm.accessions)
                    .push_bind(&psm.variable_modifications)
                    .push_bind(&psm.fixed_modifications)
                    .push_bind(&psm.spectrum_title)
                    .push_bind(psm.retention_time)
                    .push_bind(psm.mz)
                    .push_bind(psm.mz_error_ppm)
                    .push_bind(psm.charge.as_deref())
                    .push_bind(psm.confidence)
                    .push_bind(psm.validation)
                    .push_bind(psm.peak_area);
            });
            builder.build().execute(&mut *tx).await?;
        }

        if psms.iter().any(|psm| !psm.ratios.is_empty()) {
            let psm_ids: HashMap<i64, i64> =
                sqlx::query_as::<_, (i64, i64)>("SELECT report_row, id FROM psms WHERE item_id = ?1 AND pass = ?2")
                    .bind(item_id)
                    .bind(pass)
                    .fetch_all(&mut *tx)
                    .await?
                    .into_iter()
                    .collect();

            let ratios: Vec<(i64, i64, &ReporterRatio)> = psms
                .iter()
                .filter_map(|psm| psm_ids.get(&psm.report_row).map(|&id| (id, psm)))
                .flat_map(|(id, psm)| {
                    psm.ratios
                        .iter()
                        .enumerate()
                        .map(move |(channel, ratio)| (id, channel as i64, ratio))
                })
                .collect();

            for chunk in ratios.chunks(INSERT_CHUNK) {
                let mut builder = sqlx::QueryBuilder::new("INSERT INTO psm_ratios (psm_id, channel, label, ratio) ");
                builder.push_values(chunk, |mut row, (psm_id, channel, ratio)| {
                    row.push_bind(*psm_id)
                        .push_bind(*channel)
                        .push_bind(&ratio.label)
                        .push_bind(ratio.ratio);
                });
                builder.build().execute(&mut *tx).await?;
            }
        }

        tx.commit().await?;
        Ok(written)
    }

    /// PSMs of an item and pass in report order.
    pub async fn psms(&self, item_id: i64, pass: Pass) -> Result<Vec<PsmRow>> {
        let rows = sqlx::query_as::<_, PsmRow>(&format!(
            "SELECT {} FROM psms WHERE item_id = ?1 AND pass = ?2 ORDER BY report_row",
            PSM_COLUMNS
        ))
        .bind(item_id)
        .bind(pass)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Reporter ratios of an item and pass, by PSM then channel.
    pub async fn psm_ratios(&self, item_id: i64, pass: Pass) -> Result<Vec<PsmRatioRow>> {
        let rows = sqlx::query_as::<_, PsmRatioRow>(
            r#"
            SELECT r.psm_id, r.channel, r.label, r.ratio
            FROM psm_ratios r
            JOIN psms p ON p.id = r.psm_id
            WHERE p.item_id = ?1 AND p.pass = ?2
            ORDER BY p.report_row, r.channel
            "#,
        )
        .bind(item_id)
        .bind(pass)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn peptides(&self, item_id: i64, pass: Pass) -> Result<Vec<PeptideRow>> {
        let rows = sqlx::query_as::<_, PeptideRow>(&format!(
            "SELECT {} FROM peptides WHERE item_id = ?1 AND pass = ?2 ORDER BY id",
            PEPTIDE_COLUMNS
        ))
        .bind(item_id)
        .bind(pass)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Store the outcome of inference for an item and pass, replacing any
    /// earlier result, and point each assigned peptide at its protein.
    pub async fn save_inference(&self, item_id: i64, pass: Pass, proteins: &[NewProtein]) -> Result<u64> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("UPDATE peptides SET protein_id = NULL WHERE item_id = ?1 AND pass = ?2")
            .bind(item_id)
            .bind(pass)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM proteins WHERE item_id = ?1 AND pass = ?2")
            .bind(item_id)
            .bind(pass)
            .execute(&mut *tx)
            .await?;

        for protein in proteins {
            let protein_id = sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO proteins (item_id, pass, accession, psm_count, peptide_count, saf, nsaf,
                                      peak_area, peak_area_psm)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                RETURNING id
                "#,
            )
            .bind(item_id)
            .bind(pass)
            .bind(&protein.accession)
            .bind(protein.psm_count)
            .bind(protein.peptide_count)
            .bind(protein.saf)
            .bind(protein.nsaf)
            .bind(protein.peak_area)
            .bind(protein.peak_area_psm)
            .fetch_one(&mut *tx)
            .await?;

            for chunk in protein.peptide_ids.chunks(INSERT_CHUNK) {
                let mut builder = sqlx::QueryBuilder::new("UPDATE peptides SET protein_id = ");
                builder.push_bind(protein_id);
                builder.push(" WHERE id IN (");
                let mut separated = builder.separated(", ");
                for id in chunk {
                    separated.push_bind(*id);
                }
                separated.push_unseparated(")");
                builder.build().execute(&mut *tx).await?;
            }
        }

        tx.commit().await?;
        Ok(proteins.len() as u64)
    }

    /// Resolved proteins, most abundant first.
    pub async fn proteins(&self, item_id: i64, pass: Pass) -> Result<Vec<ProteinRow>> {
        let rows = sqlx::query_as::<_, ProteinRow>(&format!(
            "SELECT {} FROM proteins WHERE item_id = ?1 AND pass = ?2 ORDER BY nsaf DESC, accession",
            PROTEIN_COLUMNS
        ))
        .bind(item_id)
        .bind(pass)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Recompute NSAF from stored SAF values. A zero SAF total leaves NSAF at 0.
    pub async fn recompute_nsaf(&self, item_id: i64, pass: Pass) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE proteins
            SET nsaf = COALESCE(
                saf / NULLIF((SELECT SUM(saf) FROM proteins WHERE item_id = ?1 AND pass = ?2), 0),
                0)
            WHERE item_id = ?1 AND pass = ?2
            "#,
        )
        .bind(item_id)
        .bind(pass)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Rebuild the project-wide species summary of a pass from the resolved
    /// proteins of every non-skipped, non-frozen item.
    pub async fn rebuild_species_summaries(&self, project: &str, pass: Pass, error_limit: i64) -> Result<u64> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM species_summaries WHERE project = ?1 AND pass = ?2")
            .bind(project)
            .bind(pass)
            .execute(&mut *tx)
            .await?;

        let written = sqlx::query(
            r#"
            INSERT INTO species_summaries (project, pass, proteome, psm_count, peptide_count,
                                           protein_count, nsaf, peak_area, peak_area_psm)
            SELECT w.project, p.pass, r.proteome,
                   SUM(p.psm_count), SUM(p.peptide_count), COUNT(*), SUM(p.nsaf),
                   SUM(p.peak_area), SUM(p.peak_area_psm)
            FROM proteins p
            JOIN work_items w ON w.id = p.item_id
            JOIN reference_proteins r ON r.accession = p.accession
            WHERE w.project = ?1 AND p.pass = ?2 AND w.skip = 0 AND w.error < ?3
            GROUP BY r.proteome
            "#,
        )
        .bind(project)
        .bind(pass)
        .bind(error_limit)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(written)
    }

    /// Same as [`Store::rebuild_species_summaries`], per item.
    pub async fn rebuild_species_file_summaries(
        &self,
        project: &str,
        pass: Pass,
        error_limit: i64,
    ) -> Result<u64> {
        let mut tx = self.pool().begin().await?;

        sqlx::query(
            r#"
            DELETE FROM species_file_summaries
            WHERE pass = ?2 AND item_id IN (SELECT id FROM work_items WHERE project = ?1)
            "#,
        )
        .bind(project)
        .bind(pass)
        .execute(&mut *tx)
        .await?;

        let written = sqlx::query(
            r#"
            INSERT INTO species_file_summaries (item_id, pass, proteome, psm_count, peptide_count,
                                                protein_count, nsaf, peak_area, peak_area_psm)
            SELECT p.item_id, p.pass, r.proteome,
                   SUM(p.psm_count), SUM(p.peptide_count), COUNT(*), SUM(p.nsaf),
                   SUM(p.peak_area), SUM(p.peak_area_psm)
            FROM proteins p
            JOIN work_items w ON w.id = p.item_id
            JOIN reference_proteins r ON r.accession = p.accession
            WHERE w.project = ?1 AND p.pass = ?2 AND w.skip = 0 AND w.error < ?3
            GROUP BY p.item_id, r.proteome
            "#,
        )
        .bind(project)
        .bind(pass)
        .bind(error_limit)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(written)
    }

    pub async fn species_summaries(&self, project: &str, pass: Pass) -> Result<Vec<SpeciesSummary>> {
        let rows = sqlx::query_as::<_, SpeciesSummary>(
            r#"
            SELECT s.project, s.pass, s.proteome, o.organism, s.psm_count, s.peptide_count,
                   s.protein_count, s.nsaf, s.peak_area, s.peak_area_psm
            FROM species_summaries s
            LEFT JOIN proteomes o ON o.id = s.proteome
            WHERE s.project = ?1 AND s.pass = ?2
            ORDER BY s.nsaf DESC, s.proteome
            "#,
        )
        .bind(project)
        .bind(pass)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn species_file_summaries(&self, item_id: i64, pass: Pass) -> Result<Vec<SpeciesFileSummary>> {
        let rows = sqlx::query_as::<_, SpeciesFileSummary>(
            r#"
            SELECT s.item_id, s.pass, s.proteome, o.organism, s.psm_count, s.peptide_count,
                   s.protein_count, s.nsaf, s.peak_area, s.peak_area_psm
            FROM species_file_summaries s
            LEFT JOIN proteomes o ON o.id = s.proteome
            WHERE s.item_id = ?1 AND s.pass = ?2
            ORDER BY s.nsaf DESC, s.proteome
            "#,
        )
        .bind(item_id)
        .bind(pass)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
