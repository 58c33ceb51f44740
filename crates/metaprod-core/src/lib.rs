//! MetaProD Core Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Pipeline core for two-pass metaproteomics processing.
//!
//! # Overview
//!
//! Every input file is a work item that moves through an ordered sequence
//! of statuses. Most steps run an external program; ingestion, protein
//! inference and project aggregation run in-process.
//!
//! - **Store**: SQLite persistence of items, ledgers, results and catalog
//! - **Executor**: external programs under a timeout, output to a job log
//! - **Search**: per-engine retry around the multi-engine search step
//! - **Pipeline**: status mapping, the partition scheduler, pass gates
//! - **Inference**: greedy parsimonious peptide to protein assignment
//! - **Aggregate**: proteome selection and pass-two database generation
//!
//! # Example
//!
//! ```no_run
//! use metaprod_core::config::PipelineConfig;
//! use metaprod_core::executor::{Executor, JobLog};
//! use metaprod_core::pipeline::{Scheduler, ToolchainRunner};
//! use metaprod_core::store::Store;
//! use metaprod_core::toolchain::Toolchain;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::load()?;
//!     let store = Store::connect(&config).await?;
//!     let toolchain = Toolchain::load(&config.toolchain_file)?;
//!     let executor = Executor::new(JobLog::open(config.job_log("soil", 0)).await?);
//!     let runner = ToolchainRunner::new(config.clone(), store.clone(), toolchain, executor);
//!
//!     let summary = Scheduler::new(&store, &config, &runner).advance("soil", 0).await?;
//!     println!("{} steps", summary.steps());
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod discover;
pub mod error;
pub mod executor;
pub mod inference;
pub mod ingest;
pub mod inspect;
pub mod pipeline;
pub mod search;
pub mod settings;
pub mod store;
pub mod toolchain;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use store::Store;
