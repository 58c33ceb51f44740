//! Protein inference
//!
//! Turns one item's peptides into a parsimonious set of proteins
//! ([`parsimony`]) and computes their spectral abundance ([`abundance`]).
//! [`infer_item`] is the whole aggregate step: load, resolve, store.

pub mod abundance;
pub mod parsimony;

use crate::error::{PipelineError, Result};
use crate::pipeline::status::Pass;
use crate::store::{PeptideRow, Store};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info};

pub use parsimony::Assignment;

/// What inference needs to know about a peptide
#[derive(Debug, Clone, PartialEq)]
pub struct PeptideEvidence {
    pub id: i64,
    /// Candidate accessions without duplicates
    pub accessions: Vec<String>,
    pub psm_count: i64,
    pub peak_area: Option<f64>,
    pub peak_area_psm: i64,
}

impl From<&PeptideRow> for PeptideEvidence {
    fn from(row: &PeptideRow) -> Self {
        Self {
            id: row.id,
            accessions: row.accession_list().into_iter().map(String::from).collect(),
            psm_count: row.psm_count,
            peak_area: row.peak_area,
            peak_area_psm: row.peak_area_psm,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InferenceSummary {
    pub peptides: usize,
    /// Peptides left out for having no PSMs or no candidates
    pub excluded: usize,
    pub proteins: usize,
}

/// Resolve and store the proteins of one item and pass.
///
/// An empty reference catalog is a configuration failure. An accession
/// missing from a loaded catalog fails the item.
pub async fn infer_item(store: &Store, item_id: i64, pass: Pass, quantify: bool) -> Result<InferenceSummary> {
    if store.catalog_size().await? == 0 {
        return Err(PipelineError::configuration(
            "Reference catalog is empty; run 'metaprod catalog load-fasta' first",
        ));
    }

    let rows = store.peptides(item_id, pass).await?;
    let total = rows.len();
    let evidence: Vec<PeptideEvidence> = rows
        .iter()
        .filter(|row| row.psm_count > 0)
        .map(PeptideEvidence::from)
        .filter(|peptide| !peptide.accessions.is_empty())
        .collect();

    let accessions: Vec<String> = evidence
        .iter()
        .flat_map(|p| p.accessions.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let catalog = store.reference_proteins(&accessions).await?;
    debug!(item_id, pass = %pass, accessions = accessions.len(), "Loaded catalog entries");

    let assignments = parsimony::resolve(&evidence, &catalog)?;
    let proteins = abundance::summarize(&assignments, &evidence, &catalog, quantify)?;
    store.save_inference(item_id, pass, &proteins).await?;

    let summary = InferenceSummary {
        peptides: evidence.len(),
        excluded: total - evidence.len(),
        proteins: proteins.len(),
    };
    info!(
        item_id,
        pass = %pass,
        peptides = summary.peptides,
        excluded = summary.excluded,
        proteins = summary.proteins,
        "Protein inference complete"
    );
    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod test_support {
    use super::PeptideEvidence;
    use crate::store::ReferenceProtein;
    use std::collections::HashMap;

    pub fn evidence(id: i64, accessions: &[&str], psm_count: i64) -> PeptideEvidence {
        PeptideEvidence {
            id,
            accessions: accessions.iter().map(|a| a.to_string()).collect(),
            psm_count,
            peak_area: None,
            peak_area_psm: 0,
        }
    }

    pub fn catalog_with_lengths(entries: &[(&str, &str, i64)]) -> HashMap<String, ReferenceProtein> {
        entries
            .iter()
            .map(|(accession, proteome, length)| {
                (
                    accession.to_string(),
                    ReferenceProtein {
                        accession: accession.to_string(),
                        proteome: proteome.to_string(),
                        length: *length,
                        description: String::new(),
                        organism: String::new(),
                        gene: None,
                    },
                )
            })
            .collect()
    }

    pub fn catalog(entries: &[(&str, &str)]) -> HashMap<String, ReferenceProtein> {
        let with_lengths: Vec<_> = entries.iter().map(|(a, p)| (*a, *p, 100)).collect();
        catalog_with_lengths(&with_lengths)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::test_support::catalog_with_lengths;
    use super::*;
    use crate::store::test_support::{add_item, store_with_project};
    use crate::store::{NewPeptide, ReferenceProtein, Validation};
    use proptest::prelude::*;
    use std::collections::HashMap;

    fn new_peptide(sequence: &str, accessions: &str, psms: i64) -> NewPeptide {
        NewPeptide {
            modified_sequence: sequence.to_string(),
            sequence: sequence.to_string(),
            accessions: accessions.to_string(),
            variable_modifications: String::new(),
            fixed_modifications: String::new(),
            validation: Validation::Confident,
            psm_count: psms,
            peak_area: None,
            peak_area_psm: 0,
        }
    }

    #[tokio::test]
    async fn test_infer_item_stores_proteins() {
        let store = store_with_project().await;
        let catalog = catalog_with_lengths(&[("A", "UP1", 100), ("B", "UP1", 100), ("C", "UP2", 100)]);
        let entries: Vec<_> = catalog.values().cloned().collect();
        store.upsert_reference_proteins(&entries).await.unwrap();

        let item = add_item(&store, "run01", 0).await;
        store
            .replace_peptides(
                item.id,
                Pass::Profile,
                &[
                    new_peptide("P1", "A,B", 2),
                    new_peptide("P2", "A", 2),
                    new_peptide("P3", "B,C", 1),
                    new_peptide("P4", "C", 0),
                ],
            )
            .await
            .unwrap();

        let summary = infer_item(&store, item.id, Pass::Profile, false).await.unwrap();
        assert_eq!(summary.peptides, 3);
        assert_eq!(summary.excluded, 1);
        assert_eq!(summary.proteins, 2);

        let proteins = store.proteins(item.id, Pass::Profile).await.unwrap();
        let total: f64 = proteins.iter().map(|p| p.nsaf).sum();
        assert!((total - 1.0).abs() < 1e-9);
        let a = proteins.iter().find(|p| p.accession == "A").unwrap();
        assert_eq!(a.psm_count, 4);

        // the zero-PSM peptide stays unassigned
        let peptides = store.peptides(item.id, Pass::Profile).await.unwrap();
        assert!(peptides.iter().find(|p| p.sequence == "P4").unwrap().protein_id.is_none());
    }

    #[tokio::test]
    async fn test_empty_catalog_is_configuration_failure() {
        let store = store_with_project().await;
        let item = add_item(&store, "run01", 0).await;
        let err = infer_item(&store, item.id, Pass::Profile, false).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_unknown_accession_fails_item() {
        let store = store_with_project().await;
        let entries: Vec<_> = catalog_with_lengths(&[("A", "UP1", 100)]).into_values().collect();
        store.upsert_reference_proteins(&entries).await.unwrap();
        let item = add_item(&store, "run01", 0).await;
        store
            .replace_peptides(item.id, Pass::Profile, &[new_peptide("P1", "A,Z", 1)])
            .await
            .unwrap();

        let err = infer_item(&store, item.id, Pass::Profile, false).await.unwrap_err();
        assert!(err.is_item_fault());
    }

    fn random_item() -> impl Strategy<Value = (Vec<PeptideEvidence>, HashMap<String, ReferenceProtein>)> {
        let accession_pool = 1usize..10;
        accession_pool.prop_flat_map(|pool| {
            let peptides = prop::collection::vec(
                (prop::collection::btree_set(0..pool, 1..=pool.min(3)), 1i64..6),
                0..25,
            );
            let proteomes = prop::collection::vec((0u8..3, 20i64..400), pool);
            (peptides, proteomes)
        })
        .prop_map(|(peptides, proteomes)| {
            let evidence = peptides
                .into_iter()
                .enumerate()
                .map(|(i, (candidates, psms))| PeptideEvidence {
                    id: i as i64,
                    accessions: candidates.into_iter().map(|c| format!("P{:02}", c)).collect(),
                    psm_count: psms,
                    peak_area: None,
                    peak_area_psm: 0,
                })
                .collect();
            let catalog = proteomes
                .into_iter()
                .enumerate()
                .map(|(i, (proteome, length))| {
                    let accession = format!("P{:02}", i);
                    (
                        accession.clone(),
                        ReferenceProtein {
                            accession,
                            proteome: format!("UP{}", proteome),
                            length,
                            description: String::new(),
                            organism: String::new(),
                            gene: None,
                        },
                    )
                })
                .collect();
            (evidence, catalog)
        })
    }

    proptest! {
        #[test]
        fn prop_every_peptide_assigned_once((evidence, catalog) in random_item()) {
            let assignments = parsimony::resolve(&evidence, &catalog).unwrap();

            let mut owner = vec![None; evidence.len()];
            for assignment in &assignments {
                prop_assert!(!assignment.peptides.is_empty());
                for &i in &assignment.peptides {
                    prop_assert!(owner[i].is_none());
                    prop_assert!(evidence[i].accessions.contains(&assignment.accession));
                    owner[i] = Some(assignment.accession.clone());
                }
            }
            prop_assert!(owner.iter().all(Option::is_some));
        }

        #[test]
        fn prop_unique_peptides_keep_their_protein((evidence, catalog) in random_item()) {
            let assignments = parsimony::resolve(&evidence, &catalog).unwrap();
            for peptide in evidence.iter().filter(|p| p.accessions.len() == 1) {
                prop_assert!(assignments.iter().any(|a| a.accession == peptide.accessions[0]));
            }
            prop_assert!(assignments.len() <= evidence.len());
        }

        #[test]
        fn prop_resolution_ignores_input_order((evidence, catalog) in random_item()) {
            let forward = parsimony::resolve(&evidence, &catalog).unwrap();
            let reversed: Vec<_> = evidence.iter().rev().cloned().collect();
            let backward = parsimony::resolve(&reversed, &catalog).unwrap();

            let ids = |assignments: &[Assignment], input: &[PeptideEvidence]| {
                let mut out: Vec<(String, Vec<i64>)> = assignments
                    .iter()
                    .map(|a| {
                        let mut ids: Vec<i64> = a.peptides.iter().map(|i| input[*i].id).collect();
                        ids.sort_unstable();
                        (a.accession.clone(), ids)
                    })
                    .collect();
                out.sort();
                out
            };
            prop_assert_eq!(ids(&forward, &evidence), ids(&backward, &reversed));
        }

        #[test]
        fn prop_nsaf_sums_to_one((evidence, catalog) in random_item()) {
            let assignments = parsimony::resolve(&evidence, &catalog).unwrap();
            let proteins = abundance::summarize(&assignments, &evidence, &catalog, false).unwrap();
            if !proteins.is_empty() {
                let total: f64 = proteins.iter().map(|p| p.nsaf).sum();
                prop_assert!((total - 1.0).abs() < 1e-9);
            }
        }
    }
}
