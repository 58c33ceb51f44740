//! Greedy parsimonious peptide to protein assignment
//!
//! Proteins and peptides live in flat arenas addressed by `u32` newtypes.
//! Each round picks the protein explaining the most still-unassigned
//! peptides, breaking ties by unique peptide count, then by how strongly the
//! protein's proteome is represented in the whole item, then by lowest
//! accession. Selection uses a max-heap whose entries may go stale as
//! peptides are taken; a stale entry is re-pushed with its current count
//! when it surfaces.

use super::PeptideEvidence;
use crate::error::{PipelineError, Result};
use crate::store::ReferenceProtein;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct ProteinIdx(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PeptideIdx(u32);

impl ProteinIdx {
    fn get(self) -> usize {
        self.0 as usize
    }
}

impl PeptideIdx {
    fn get(self) -> usize {
        self.0 as usize
    }
}

struct ProteinNode<'a> {
    accession: &'a str,
    peptides: Vec<PeptideIdx>,
    unique: u32,
    species_score: u64,
}

struct PeptideNode {
    candidates: Vec<ProteinIdx>,
    assigned: Option<ProteinIdx>,
}

/// Heap key. Field order is comparison order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Rank<'a> {
    count: u32,
    unique: u32,
    species_score: u64,
    accession: Reverse<&'a str>,
}

impl Rank<'_> {
    fn ties_with(&self, other: &Self) -> bool {
        self.count == other.count
            && self.unique == other.unique
            && self.species_score == other.species_score
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Entry<'a> {
    rank: Rank<'a>,
    protein: ProteinIdx,
}

impl Ord for Entry<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank.cmp(&other.rank).then_with(|| other.protein.cmp(&self.protein))
    }
}

impl PartialOrd for Entry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One resolved protein and the peptides attributed to it (indices into the
/// evidence slice)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub accession: String,
    pub peptides: Vec<usize>,
}

/// Arena built from one item's peptide evidence
struct Graph<'a> {
    proteins: Vec<ProteinNode<'a>>,
    peptides: Vec<PeptideNode>,
    /// Still-unassigned peptides per protein
    remaining: Vec<u32>,
}

impl<'a> Graph<'a> {
    fn build(evidence: &'a [PeptideEvidence], catalog: &HashMap<String, ReferenceProtein>) -> Result<Self> {
        let mut index: HashMap<&'a str, ProteinIdx> = HashMap::new();
        let mut proteins: Vec<ProteinNode<'a>> = Vec::new();
        let mut peptides = Vec::with_capacity(evidence.len());
        let mut proteome_links: HashMap<&str, u64> = HashMap::new();

        for (i, peptide) in evidence.iter().enumerate() {
            let pep_idx = PeptideIdx(i as u32);
            let mut candidates = Vec::with_capacity(peptide.accessions.len());

            for accession in &peptide.accessions {
                let reference = catalog
                    .get(accession)
                    .ok_or_else(|| PipelineError::UnknownAccession(accession.clone()))?;
                *proteome_links.entry(reference.proteome.as_str()).or_default() += 1;

                let idx = *index.entry(accession.as_str()).or_insert_with(|| {
                    proteins.push(ProteinNode {
                        accession: accession.as_str(),
                        peptides: Vec::new(),
                        unique: 0,
                        species_score: 0,
                    });
                    ProteinIdx((proteins.len() - 1) as u32)
                });
                proteins[idx.get()].peptides.push(pep_idx);
                candidates.push(idx);
            }

            if let [only] = candidates.as_slice() {
                proteins[only.get()].unique += 1;
            }
            peptides.push(PeptideNode {
                candidates,
                assigned: None,
            });
        }

        for protein in &mut proteins {
            if let Some(reference) = catalog.get(protein.accession) {
                protein.species_score = proteome_links
                    .get(reference.proteome.as_str())
                    .copied()
                    .unwrap_or(0);
            }
        }

        let remaining = proteins.iter().map(|p| p.peptides.len() as u32).collect();
        Ok(Self {
            proteins,
            peptides,
            remaining,
        })
    }

    fn entry(&self, protein: ProteinIdx) -> Entry<'a> {
        let node = &self.proteins[protein.get()];
        Entry {
            rank: Rank {
                count: self.remaining[protein.get()],
                unique: node.unique,
                species_score: node.species_score,
                accession: Reverse(node.accession),
            },
            protein,
        }
    }

    /// Pop the next entry whose count is current, re-keying stale ones.
    fn pop_current(&self, heap: &mut BinaryHeap<Entry<'a>>) -> Option<Entry<'a>> {
        while let Some(entry) = heap.pop() {
            let current = self.remaining[entry.protein.get()];
            if current == entry.rank.count {
                return Some(entry);
            }
            if current > 0 {
                heap.push(self.entry(entry.protein));
            }
        }
        None
    }

    /// Give every unassigned peptide of `winner` to it.
    fn assign(&mut self, winner: ProteinIdx) -> Vec<usize> {
        let mut taken = Vec::new();
        for pep in self.proteins[winner.get()].peptides.clone() {
            let node = &mut self.peptides[pep.get()];
            if node.assigned.is_some() {
                continue;
            }
            node.assigned = Some(winner);
            for candidate in &node.candidates {
                self.remaining[candidate.get()] -= 1;
            }
            taken.push(pep.get());
        }
        taken
    }
}

/// Resolve a minimal protein set for the given peptides.
///
/// Every accession must be in `catalog`; an unknown accession fails the
/// whole item. Peptides without candidates are never assigned. The result
/// is in selection order.
pub fn resolve(
    evidence: &[PeptideEvidence],
    catalog: &HashMap<String, ReferenceProtein>,
) -> Result<Vec<Assignment>> {
    let mut graph = Graph::build(evidence, catalog)?;

    let mut heap: BinaryHeap<Entry<'_>> = (0..graph.proteins.len())
        .map(|i| graph.entry(ProteinIdx(i as u32)))
        .collect();
    let mut assignments = Vec::new();

    while let Some(winner) = graph.pop_current(&mut heap) {
        if winner.rank.count == 0 {
            continue;
        }

        // Everything still tied once the accession is ignored
        let mut tied = Vec::new();
        while heap.peek().is_some_and(|next| next.rank.ties_with(&winner.rank)) {
            match graph.pop_current(&mut heap) {
                Some(next) if next.rank.ties_with(&winner.rank) => tied.push(next),
                Some(next) => {
                    heap.push(next);
                    break;
                },
                None => break,
            }
        }
        if !tied.is_empty() {
            tracing::info!(
                winner = %winner.rank.accession.0,
                tied = ?tied.iter().map(|e| e.rank.accession.0).collect::<Vec<_>>(),
                peptides = winner.rank.count,
                "Protein tie resolved by accession"
            );
        }
        heap.extend(tied);

        let peptides = graph.assign(winner.protein);
        assignments.push(Assignment {
            accession: winner.rank.accession.0.to_string(),
            peptides,
        });
    }

    Ok(assignments)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::inference::test_support::{catalog, evidence};

    fn winners(assignments: &[Assignment]) -> Vec<(&str, Vec<usize>)> {
        assignments
            .iter()
            .map(|a| (a.accession.as_str(), a.peptides.clone()))
            .collect()
    }

    #[test]
    fn test_uniqueness_breaks_first_tie() {
        // P1 {A, B}, P2 {A}, P3 {B, C}; B and C share UP1's abundance
        let peptides = vec![evidence(1, &["A", "B"], 1), evidence(2, &["A"], 1), evidence(3, &["B", "C"], 1)];
        let catalog = catalog(&[("A", "UP1"), ("B", "UP1"), ("C", "UP2")]);

        let resolved = resolve(&peptides, &catalog).unwrap();
        assert_eq!(winners(&resolved), vec![("A", vec![0, 1]), ("B", vec![2])]);
    }

    #[test]
    fn test_species_abundance_breaks_second_tie() {
        let peptides = vec![
            evidence(1, &["A", "B"], 1),
            evidence(2, &["A"], 1),
            evidence(3, &["B", "C"], 1),
            evidence(4, &["D"], 1),
            evidence(5, &["D"], 1),
            evidence(6, &["D"], 1),
            evidence(7, &["D"], 1),
        ];
        // UP2 has 5 links against UP1's 4, so C beats B for P3
        let catalog = catalog(&[("A", "UP1"), ("B", "UP1"), ("C", "UP2"), ("D", "UP2")]);

        let resolved = resolve(&peptides, &catalog).unwrap();
        let names: Vec<_> = resolved.iter().map(|a| a.accession.as_str()).collect();
        assert_eq!(names, vec!["D", "A", "C"]);
    }

    #[test]
    fn test_full_tie_picks_lowest_accession() {
        let peptides = vec![evidence(1, &["Q2", "Q1"], 3)];
        let catalog = catalog(&[("Q1", "UP1"), ("Q2", "UP1")]);

        let resolved = resolve(&peptides, &catalog).unwrap();
        assert_eq!(winners(&resolved), vec![("Q1", vec![0])]);
    }

    #[test]
    fn test_stale_entries_are_rekeyed() {
        // B starts with 3 peptides but loses two of them to A
        let peptides = vec![
            evidence(1, &["A", "B"], 1),
            evidence(2, &["A", "B"], 1),
            evidence(3, &["A"], 1),
            evidence(4, &["B", "C"], 1),
            evidence(5, &["C"], 1),
        ];
        let catalog = catalog(&[("A", "UP1"), ("B", "UP1"), ("C", "UP1")]);

        let resolved = resolve(&peptides, &catalog).unwrap();
        assert_eq!(winners(&resolved), vec![("A", vec![0, 1, 2]), ("C", vec![3, 4])]);
    }

    #[test]
    fn test_unknown_accession_fails() {
        let peptides = vec![evidence(1, &["A", "MISSING"], 1)];
        let catalog = catalog(&[("A", "UP1")]);

        let err = resolve(&peptides, &catalog).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownAccession(ref a) if a == "MISSING"));
    }

    #[test]
    fn test_no_peptides_no_proteins() {
        assert!(resolve(&[], &HashMap::new()).unwrap().is_empty());
    }
}
