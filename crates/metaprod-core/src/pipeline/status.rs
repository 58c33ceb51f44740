//! Pipeline status and pass enumerations
//!
//! Declaration order is pipeline order: `Ord` on [`Status`] and the integer
//! stored in `work_items.status` agree, so "highest status first" is a plain
//! `ORDER BY status DESC`.

use serde::{Deserialize, Serialize};

/// Where a work item stands: each value means "ready for step X".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[repr(i32)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Added = 0,
    ConvertedReady = 1,
    Search1 = 2,
    Score1 = 3,
    QuantPrep1 = 4,
    Quant1 = 5,
    Ingest1 = 6,
    Aggregate1 = 7,
    Pass1Done = 8,
    Search2 = 9,
    Score2 = 10,
    QuantPrep2 = 11,
    Quant2 = 12,
    Ingest2 = 13,
    Aggregate2 = 14,
    Pass2Done = 15,
    ItemFinished = 16,
}

impl Status {
    pub const ALL: [Status; 17] = [
        Status::Added,
        Status::ConvertedReady,
        Status::Search1,
        Status::Score1,
        Status::QuantPrep1,
        Status::Quant1,
        Status::Ingest1,
        Status::Aggregate1,
        Status::Pass1Done,
        Status::Search2,
        Status::Score2,
        Status::QuantPrep2,
        Status::Quant2,
        Status::Ingest2,
        Status::Aggregate2,
        Status::Pass2Done,
        Status::ItemFinished,
    ];

    /// Statuses the scheduler never selects. Leaving them is the job of
    /// project-level aggregation.
    pub const TERMINAL: [Status; 3] = [Status::Pass1Done, Status::Pass2Done, Status::ItemFinished];

    pub fn ordinal(self) -> i32 {
        self as i32
    }

    pub fn from_ordinal(value: i32) -> Option<Self> {
        usize::try_from(value).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Added => "ADDED",
            Status::ConvertedReady => "CONVERTED_READY",
            Status::Search1 => "SEARCH_1",
            Status::Score1 => "SCORE_1",
            Status::QuantPrep1 => "QUANT_PREP_1",
            Status::Quant1 => "QUANT_1",
            Status::Ingest1 => "INGEST_1",
            Status::Aggregate1 => "AGGREGATE_1",
            Status::Pass1Done => "PASS1_DONE",
            Status::Search2 => "SEARCH_2",
            Status::Score2 => "SCORE_2",
            Status::QuantPrep2 => "QUANT_PREP_2",
            Status::Quant2 => "QUANT_2",
            Status::Ingest2 => "INGEST_2",
            Status::Aggregate2 => "AGGREGATE_2",
            Status::Pass2Done => "PASS2_DONE",
            Status::ItemFinished => "ITEM_FINISHED",
        }
    }

    /// The pass a status belongs to, `None` for `ADDED`, `CONVERTED_READY`
    /// and `ITEM_FINISHED`.
    pub fn pass(self) -> Option<Pass> {
        match self.ordinal() {
            2..=8 => Some(Pass::Profile),
            9..=15 => Some(Pass::Proteome),
            _ => None,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = metaprod_common::MetaprodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == wanted)
            .ok_or_else(|| metaprod_common::MetaprodError::invalid("status", s))
    }
}

/// One of the two structurally identical traversals of the pipeline.
///
/// The first pass searches a broad profiling database; the second searches a
/// proteome database narrowed down from the first pass results.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[repr(i32)]
#[serde(rename_all = "lowercase")]
pub enum Pass {
    Profile = 1,
    Proteome = 2,
}

impl Pass {
    pub const BOTH: [Pass; 2] = [Pass::Profile, Pass::Proteome];

    pub fn number(self) -> i32 {
        self as i32
    }

    pub fn from_number(value: i32) -> Option<Self> {
        match value {
            1 => Some(Pass::Profile),
            2 => Some(Pass::Proteome),
            _ => None,
        }
    }

    /// Directory name used under each item's output folder.
    pub fn dir_name(self) -> &'static str {
        match self {
            Pass::Profile => "profile",
            Pass::Proteome => "proteome",
        }
    }

    /// Terminal status reached once this pass has been aggregated for an item.
    pub fn done_status(self) -> Status {
        match self {
            Pass::Profile => Status::Pass1Done,
            Pass::Proteome => Status::Pass2Done,
        }
    }

    /// Status items are promoted to once the whole project finished this pass.
    pub fn promoted_status(self) -> Status {
        match self {
            Pass::Profile => Status::Search2,
            Pass::Proteome => Status::ItemFinished,
        }
    }
}

impl std::fmt::Display for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_order_is_pipeline_order() {
        for pair in Status::ALL.windows(2) {
            assert!(pair[0] < pair[1], "{} should precede {}", pair[0], pair[1]);
            assert_eq!(pair[0].ordinal() + 1, pair[1].ordinal());
        }
    }

    #[test]
    fn test_ordinal_round_trip_and_bounds() {
        assert_eq!(Status::from_ordinal(0), Some(Status::Added));
        assert_eq!(Status::from_ordinal(16), Some(Status::ItemFinished));
        assert_eq!(Status::from_ordinal(17), None);
        assert_eq!(Status::from_ordinal(-1), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(Status::Pass1Done.is_terminal());
        assert!(Status::Pass2Done.is_terminal());
        assert!(Status::ItemFinished.is_terminal());
        assert!(!Status::Aggregate2.is_terminal());
        assert!(!Status::Added.is_terminal());
    }

    #[test]
    fn test_parse_status() {
        assert_eq!("search_1".parse::<Status>().unwrap(), Status::Search1);
        assert_eq!("PASS1-DONE".parse::<Status>().unwrap(), Status::Pass1Done);
        assert!("THERMO".parse::<Status>().is_err());
    }

    #[test]
    fn test_pass_membership() {
        assert_eq!(Status::ConvertedReady.pass(), None);
        assert_eq!(Status::Search1.pass(), Some(Pass::Profile));
        assert_eq!(Status::Pass1Done.pass(), Some(Pass::Profile));
        assert_eq!(Status::Search2.pass(), Some(Pass::Proteome));
        assert_eq!(Status::ItemFinished.pass(), None);
        assert_eq!(Pass::Profile.promoted_status(), Status::Search2);
        assert_eq!(Pass::Proteome.done_status(), Status::Pass2Done);
    }
}
