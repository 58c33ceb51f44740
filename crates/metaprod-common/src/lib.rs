//! MetaProD Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Pieces shared by every MetaProD workspace member.
//!
//! - **Error Handling**: [`MetaprodError`] and the crate-wide [`Result`] alias
//! - **Logging**: [`logging::LogConfig`] and [`logging::init_logging`]
//! - **Durations**: compact human formatting of step runtimes
//!
//! # Example
//!
//! ```no_run
//! use metaprod_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("pipeline worker starting");
//!     Ok(())
//! }
//! ```

pub mod duration;
pub mod error;
pub mod logging;

pub use error::{MetaprodError, Result};
