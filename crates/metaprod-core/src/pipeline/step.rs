//! Status to step mapping

use super::status::{Pass, Status};
use crate::settings::ProjectSettings;
use crate::store::LedgerField;
use crate::toolchain::ToolStep;
use serde::Serialize;

/// A unit of work run for one item at one status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Step {
    /// Drop derived records and the working directory
    Reset,
    Convert,
    Search(Pass),
    Score(Pass),
    QuantPrep(Pass),
    Quant(Pass),
    Ingest(Pass),
    Aggregate(Pass),
}

impl Step {
    pub fn pass(self) -> Option<Pass> {
        match self {
            Step::Reset | Step::Convert => None,
            Step::Search(p)
            | Step::Score(p)
            | Step::QuantPrep(p)
            | Step::Quant(p)
            | Step::Ingest(p)
            | Step::Aggregate(p) => Some(p),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Step::Reset => "reset",
            Step::Convert => "convert",
            Step::Search(_) => "search",
            Step::Score(_) => "score",
            Step::QuantPrep(_) => "quant_prep",
            Step::Quant(_) => "quant",
            Step::Ingest(_) => "ingest",
            Step::Aggregate(_) => "aggregate",
        }
    }

    /// Ledger column written when the step succeeds; the reset step is
    /// not timed.
    pub fn ledger_field(self) -> Option<LedgerField> {
        match self {
            Step::Reset => None,
            Step::Convert => Some(LedgerField::Conversion),
            Step::Search(p) => Some(LedgerField::Search(p)),
            Step::Score(p) => Some(LedgerField::Score(p)),
            Step::QuantPrep(p) => Some(LedgerField::QuantPrep(p)),
            Step::Quant(p) => Some(LedgerField::Quant(p)),
            Step::Ingest(p) => Some(LedgerField::Ingest(p)),
            Step::Aggregate(p) => Some(LedgerField::Aggregate(p)),
        }
    }

    /// Toolchain entry of an external step, `None` for internal steps.
    pub fn tool_step(self) -> Option<ToolStep> {
        match self {
            Step::Convert => Some(ToolStep::Convert),
            Step::Search(_) => Some(ToolStep::Search),
            Step::Score(_) => Some(ToolStep::Score),
            Step::QuantPrep(_) => Some(ToolStep::QuantPrep),
            Step::Quant(_) => Some(ToolStep::Quant),
            Step::Reset | Step::Ingest(_) | Step::Aggregate(_) => None,
        }
    }

    /// Whether the project's settings turn this step off.
    pub fn is_skipped(self, settings: &ProjectSettings) -> bool {
        if let Some(pass) = self.pass() {
            if !settings.runs_pass(pass) {
                return true;
            }
        }
        match self {
            Step::QuantPrep(_) => !settings.multiplex,
            Step::Quant(_) => !settings.run_quantification,
            _ => false,
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.pass() {
            Some(pass) => write!(f, "{}_{}", self.name(), pass.number()),
            None => f.write_str(self.name()),
        }
    }
}

/// The step to run at a status and where success leads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub step: Step,
    pub on_success: Status,
}

/// Step mapped to `status`; `None` for statuses the scheduler never runs.
pub fn next_step(status: Status) -> Option<Transition> {
    use Status::*;
    let (step, on_success) = match status {
        Added => (Step::Reset, ConvertedReady),
        ConvertedReady => (Step::Convert, Search1),
        Search1 => (Step::Search(Pass::Profile), Score1),
        Score1 => (Step::Score(Pass::Profile), QuantPrep1),
        QuantPrep1 => (Step::QuantPrep(Pass::Profile), Quant1),
        Quant1 => (Step::Quant(Pass::Profile), Ingest1),
        Ingest1 => (Step::Ingest(Pass::Profile), Aggregate1),
        Aggregate1 => (Step::Aggregate(Pass::Profile), Pass1Done),
        Search2 => (Step::Search(Pass::Proteome), Score2),
        Score2 => (Step::Score(Pass::Proteome), QuantPrep2),
        QuantPrep2 => (Step::QuantPrep(Pass::Proteome), Quant2),
        Quant2 => (Step::Quant(Pass::Proteome), Ingest2),
        Ingest2 => (Step::Ingest(Pass::Proteome), Aggregate2),
        Aggregate2 => (Step::Aggregate(Pass::Proteome), Pass2Done),
        Pass1Done | Pass2Done | ItemFinished => return None,
    };
    Some(Transition { step, on_success })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_every_runnable_status_moves_forward() {
        for status in Status::ALL {
            match next_step(status) {
                Some(transition) => assert!(transition.on_success > status),
                None => assert!(status.is_terminal()),
            }
        }
    }

    #[test]
    fn test_steps_stay_in_their_pass() {
        for status in Status::ALL {
            if let Some(transition) = next_step(status) {
                if let Some(pass) = transition.step.pass() {
                    assert_eq!(status.pass(), Some(pass), "{}", status);
                }
            }
        }
    }

    #[test]
    fn test_skip_rules() {
        let settings = ProjectSettings::default();
        assert!(Step::QuantPrep(Pass::Profile).is_skipped(&settings));
        assert!(Step::Quant(Pass::Proteome).is_skipped(&settings));
        assert!(!Step::Search(Pass::Profile).is_skipped(&settings));

        let settings = ProjectSettings {
            multiplex: true,
            run_quantification: true,
            profile_pass: false,
            ..Default::default()
        };
        assert!(Step::Search(Pass::Profile).is_skipped(&settings));
        assert!(Step::Aggregate(Pass::Profile).is_skipped(&settings));
        assert!(!Step::QuantPrep(Pass::Proteome).is_skipped(&settings));
        assert!(!Step::Quant(Pass::Proteome).is_skipped(&settings));
        assert!(!Step::Convert.is_skipped(&settings));
        assert!(!Step::Reset.is_skipped(&settings));
    }

    #[test]
    fn test_display() {
        assert_eq!(Step::Search(Pass::Proteome).to_string(), "search_2");
        assert_eq!(Step::Convert.to_string(), "convert");
    }
}
