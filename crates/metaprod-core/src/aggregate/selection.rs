//! Proteome selection for the pass-two database

use crate::settings::{CONTAMINANT_PROTEOME, HUMAN_PROTEOME};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Summed profile NSAF of one proteome
#[derive(Debug, Clone, PartialEq)]
pub struct ProteomeShare {
    pub proteome: String,
    pub nsaf: f64,
}

/// Sum shares of the same proteome, e.g. across the files of one sample.
pub fn merge_shares<I>(shares: I) -> Vec<ProteomeShare>
where
    I: IntoIterator<Item = ProteomeShare>,
{
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for share in shares {
        *totals.entry(share.proteome).or_insert(0.0) += share.nsaf;
    }
    totals
        .into_iter()
        .map(|(proteome, nsaf)| ProteomeShare { proteome, nsaf })
        .collect()
}

/// Proteomes covering `threshold_pct` percent of the summed NSAF.
///
/// Contaminants and the human proteome are left out of both the total and
/// the selection. Proteomes are taken by descending NSAF while the running
/// sum before adding them is within the threshold; once it is exceeded,
/// proteomes tied with the last one taken are still included.
pub fn select_proteomes(shares: &[ProteomeShare], threshold_pct: u32) -> Vec<String> {
    let mut ranked: Vec<&ProteomeShare> = shares
        .iter()
        .filter(|s| {
            !s.proteome.is_empty() && s.proteome != CONTAMINANT_PROTEOME && s.proteome != HUMAN_PROTEOME
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.nsaf
            .partial_cmp(&a.nsaf)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.proteome.cmp(&b.proteome))
    });

    let total: f64 = ranked.iter().map(|s| s.nsaf).sum();
    let threshold = total * f64::from(threshold_pct) / 100.0;

    let mut selected = Vec::new();
    let mut running = 0.0;
    let mut last = None;
    for share in ranked {
        if running <= threshold {
            running += share.nsaf;
            last = Some(share.nsaf);
            selected.push(share.proteome.clone());
        } else if last == Some(share.nsaf) {
            selected.push(share.proteome.clone());
        } else {
            break;
        }
    }
    selected
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn share(proteome: &str, nsaf: f64) -> ProteomeShare {
        ProteomeShare {
            proteome: proteome.to_string(),
            nsaf,
        }
    }

    #[test]
    fn test_threshold_and_exclusions() {
        let shares = vec![
            share("UP3", 0.05),
            share("UP1", 0.5),
            share(HUMAN_PROTEOME, 5.0),
            share("UP2", 0.3),
            share("0", 2.0),
            share("UP4", 0.15),
        ];

        // total 1.0, threshold 0.6: UP1 at 0 <= 0.6, UP2 at 0.5 <= 0.6, then 0.8 > 0.6
        assert_eq!(select_proteomes(&shares, 60), vec!["UP1", "UP2"]);
        assert_eq!(select_proteomes(&shares, 100), vec!["UP1", "UP2", "UP4", "UP3"]);
    }

    #[test]
    fn test_ties_with_last_included() {
        let shares = vec![share("UPB", 0.4), share("UPA", 0.4), share("UPC", 0.4), share("UPD", 0.1)];

        // threshold 0.13: UPA taken at 0, running 0.4 exceeds it but UPB and UPC tie
        assert_eq!(select_proteomes(&shares, 10), vec!["UPA", "UPB", "UPC"]);
    }

    #[test]
    fn test_nothing_to_select() {
        assert!(select_proteomes(&[], 90).is_empty());
        assert!(select_proteomes(&[share("0", 1.0)], 90).is_empty());
    }

    #[test]
    fn test_merge_shares() {
        let merged = merge_shares(vec![share("UP1", 0.25), share("UP2", 0.5), share("UP1", 0.25)]);
        assert_eq!(merged, vec![share("UP1", 0.5), share("UP2", 0.5)]);
    }
}
