//! Pipeline state machine
//!
//! - [`status`]: the ordered status enumeration and the two passes
//! - [`step`]: which step runs at which status, and when it is skipped
//! - [`runner`]: the seam to external programs
//! - [`scheduler`]: the per-partition loop
//! - [`project`]: the project-wide pass gate and aggregation

pub mod project;
pub mod runner;
pub mod scheduler;
pub mod status;
pub mod step;

pub use project::{complete_pass, PassCompletion};
pub use runner::{StepContext, StepOutcome, StepRunner, ToolchainRunner};
pub use scheduler::{AdvanceSummary, Scheduler};
pub use status::{Pass, Status};
pub use step::{next_step, Step, Transition};
