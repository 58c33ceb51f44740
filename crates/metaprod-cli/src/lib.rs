//! MetaProD CLI Library
//!
//! Operator interface to the metaproteomics pipeline.
//!
//! # Overview
//!
//! - **Projects**: create projects and manage their settings (`metaprod project`)
//! - **Discovery**: register new input files as work items (`metaprod discover`)
//! - **Catalog**: load the reference proteins and proteomes (`metaprod catalog`)
//! - **Workers**: advance one partition until idle (`metaprod advance`)
//! - **Recovery**: reset or skip a stuck item (`metaprod reset`, `metaprod skip`)
//! - **Progress**: per-status counts and results (`metaprod inspect`, `metaprod results`)

pub mod commands;
pub mod error;
pub mod progress;

pub use error::{CliError, Result};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// MetaProD - two-pass metaproteomics pipeline
#[derive(Parser, Debug)]
#[command(name = "metaprod")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Pipeline database
    #[arg(long, env = "METAPROD_DATABASE_URL", global = true)]
    pub database_url: Option<String>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage projects
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },

    /// Register new input files of a project
    Discover {
        project: String,

        /// Number of worker partitions to spread new items over
        #[arg(short, long, default_value = "1")]
        jobs: u32,
    },

    /// Manage the reference catalog
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },

    /// Run one partition of a project until nothing can move
    Advance {
        project: String,

        /// Partition to work on
        job: i64,
    },

    /// Clear an item's error counter or send it back to the start
    Reset {
        /// Work item id
        item: i64,

        /// Restart the item from ADDED, discarding its results
        #[arg(long)]
        to_added: bool,

        /// Clear the error counter
        #[arg(long)]
        clear_error: bool,
    },

    /// Exclude an item from processing
    Skip {
        /// Work item id
        item: i64,

        /// Include the item again
        #[arg(long)]
        undo: bool,
    },

    /// Show progress of a project
    Inspect {
        project: String,

        /// Print JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Show the proteins resolved for an item
    Results {
        /// Work item id
        item: i64,

        /// Pass number (1 = profile, 2 = proteome)
        #[arg(short, long, default_value = "2")]
        pass: i32,

        /// Rows to show, highest NSAF first
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

/// Project subcommands
#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Create a project
    Create {
        name: String,

        /// Free-form description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Settings file (TOML); defaults apply otherwise
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },

    /// List projects, or show one with its settings
    Show {
        name: Option<String>,
    },

    /// Print a project's settings, or replace them from a TOML file
    Settings {
        name: String,

        /// Settings file (TOML)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Catalog subcommands
#[derive(Subcommand, Debug)]
pub enum CatalogCommand {
    /// Load reference proteins from UniProt FASTA files
    LoadFasta {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Load the tab-separated proteome list
    LoadProteomes {
        file: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_reset_flags() {
        let cli = Cli::try_parse_from(["metaprod", "reset", "7", "--to-added"]).unwrap();
        match cli.command {
            Commands::Reset {
                item,
                to_added,
                clear_error,
            } => {
                assert_eq!(item, 7);
                assert!(to_added);
                assert!(!clear_error);
            },
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_catalog_requires_files() {
        assert!(Cli::try_parse_from(["metaprod", "catalog", "load-fasta"]).is_err());
    }
}
