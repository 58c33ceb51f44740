//! Spectral abundance of resolved proteins
//!
//! SAF is the PSM count over the protein length; NSAF divides each SAF by
//! the sum over the item and pass, so it is only known once every protein
//! has been resolved.

use super::parsimony::Assignment;
use super::PeptideEvidence;
use crate::error::{PipelineError, Result};
use crate::store::{NewProtein, ReferenceProtein};
use std::collections::HashMap;

/// Aggregate peptide evidence per resolved protein and normalize.
///
/// Peak areas are summed only when `quantify` is set; otherwise both peak
/// area fields stay empty.
pub fn summarize(
    assignments: &[Assignment],
    evidence: &[PeptideEvidence],
    catalog: &HashMap<String, ReferenceProtein>,
    quantify: bool,
) -> Result<Vec<NewProtein>> {
    let mut proteins = Vec::with_capacity(assignments.len());

    for assignment in assignments {
        let reference = catalog
            .get(&assignment.accession)
            .ok_or_else(|| PipelineError::UnknownAccession(assignment.accession.clone()))?;
        if reference.length <= 0 {
            return Err(PipelineError::parse(format!(
                "Reference protein '{}' has no sequence length",
                reference.accession
            )));
        }

        let assigned: Vec<&PeptideEvidence> = assignment.peptides.iter().map(|i| &evidence[*i]).collect();
        let psm_count: i64 = assigned.iter().map(|p| p.psm_count).sum();

        let (peak_area, peak_area_psm) = if quantify {
            let area = assigned.iter().filter_map(|p| p.peak_area).sum::<f64>();
            let psms = assigned.iter().map(|p| p.peak_area_psm).sum::<i64>();
            (Some(area), Some(psms))
        } else {
            (None, None)
        };

        proteins.push(NewProtein {
            accession: assignment.accession.clone(),
            psm_count,
            peptide_count: assigned.len() as i64,
            saf: psm_count as f64 / reference.length as f64,
            nsaf: 0.0,
            peak_area,
            peak_area_psm,
            peptide_ids: assigned.iter().map(|p| p.id).collect(),
        });
    }

    normalize(&mut proteins);
    Ok(proteins)
}

/// Fill in NSAF from SAF. A zero total leaves every NSAF at 0.
pub fn normalize(proteins: &mut [NewProtein]) {
    let total: f64 = proteins.iter().map(|p| p.saf).sum();
    for protein in proteins.iter_mut() {
        protein.nsaf = if total > 0.0 { protein.saf / total } else { 0.0 };
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::inference::test_support::{catalog_with_lengths, evidence};

    #[test]
    fn test_saf_and_nsaf() {
        let evidence = vec![evidence(10, &["A"], 4), evidence(11, &["A"], 2), evidence(12, &["B"], 2)];
        let assignments = vec![
            Assignment {
                accession: "A".into(),
                peptides: vec![0, 1],
            },
            Assignment {
                accession: "B".into(),
                peptides: vec![2],
            },
        ];
        let catalog = catalog_with_lengths(&[("A", "UP1", 200), ("B", "UP1", 100)]);

        let proteins = summarize(&assignments, &evidence, &catalog, false).unwrap();
        assert_eq!(proteins[0].psm_count, 6);
        assert_eq!(proteins[0].peptide_count, 2);
        assert_eq!(proteins[0].peptide_ids, vec![10, 11]);
        assert!((proteins[0].saf - 0.03).abs() < 1e-12);
        assert!((proteins[1].saf - 0.02).abs() < 1e-12);
        assert!((proteins[0].nsaf - 0.6).abs() < 1e-12);
        assert!((proteins[1].nsaf - 0.4).abs() < 1e-12);
        assert_eq!(proteins[0].peak_area, None);
    }

    #[test]
    fn test_peak_area_only_when_quantifying() {
        let mut first = evidence(1, &["A"], 3);
        first.peak_area = Some(1000.0);
        first.peak_area_psm = 2;
        let mut second = evidence(2, &["A"], 1);
        second.peak_area = None;
        let assignments = vec![Assignment {
            accession: "A".into(),
            peptides: vec![0, 1],
        }];
        let catalog = catalog_with_lengths(&[("A", "UP1", 100)]);

        let proteins = summarize(&assignments, &[first, second], &catalog, true).unwrap();
        assert_eq!(proteins[0].peak_area, Some(1000.0));
        assert_eq!(proteins[0].peak_area_psm, Some(2));
    }

    #[test]
    fn test_zero_length_is_rejected() {
        let assignments = vec![Assignment {
            accession: "A".into(),
            peptides: vec![0],
        }];
        let catalog = catalog_with_lengths(&[("A", "UP1", 0)]);
        assert!(summarize(&assignments, &[evidence(1, &["A"], 1)], &catalog, false).is_err());
    }

    #[test]
    fn test_normalize_zero_total() {
        let mut proteins = vec![NewProtein {
            accession: "A".into(),
            psm_count: 0,
            peptide_count: 0,
            saf: 0.0,
            nsaf: 0.5,
            peak_area: None,
            peak_area_psm: None,
            peptide_ids: vec![],
        }];
        normalize(&mut proteins);
        assert_eq!(proteins[0].nsaf, 0.0);
    }
}
