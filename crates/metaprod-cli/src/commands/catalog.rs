//! `metaprod catalog` command implementation

use super::Session;
use crate::error::Result;
use crate::progress::create_spinner;
use colored::Colorize;
use metaprod_core::catalog::{load_fasta, load_proteomes};
use std::path::{Path, PathBuf};

/// Load reference proteins from every FASTA file in turn
pub async fn fasta(session: &Session, files: &[PathBuf]) -> Result<()> {
    let mut loaded = 0;
    let mut skipped = 0;

    for file in files {
        let spinner = create_spinner(&format!("Loading {}", file.display()));
        let result = load_fasta(&session.store, file).await;
        spinner.finish_and_clear();
        let summary = result?;

        println!(
            "{} {}: {} proteins loaded, {} skipped",
            "✓".green(),
            file.display(),
            summary.loaded,
            summary.skipped
        );
        loaded += summary.loaded;
        skipped += summary.skipped;
    }

    if files.len() > 1 {
        println!("Total: {} proteins loaded, {} skipped", loaded, skipped);
    }
    println!("Catalog size: {}", session.store.catalog_size().await?);
    Ok(())
}

pub async fn proteomes(session: &Session, file: &Path) -> Result<()> {
    let written = load_proteomes(&session.store, file).await?;
    println!("{} {} proteomes loaded from {}", "✓".green(), written, file.display());
    Ok(())
}
