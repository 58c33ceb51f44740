//! `metaprod results` command implementation

use super::{table, Session};
use crate::error::{CliError, Result};
use colored::Colorize;
use metaprod_common::duration::format_seconds;
use metaprod_core::pipeline::Pass;
use metaprod_core::store::ProteinRow;
use serde::Serialize;

#[derive(Serialize)]
struct ItemResults<'a> {
    item_id: i64,
    filename: &'a str,
    pass: Pass,
    total_runtime: i64,
    proteins: &'a [ProteinRow],
}

pub async fn run(session: &Session, item: i64, pass: i32, limit: usize, json: bool) -> Result<()> {
    let pass = Pass::from_number(pass)
        .ok_or_else(|| CliError::invalid_argument(format!("pass must be 1 or 2, got {}", pass)))?;
    let item = session.store.get_item(item).await?;
    let mut proteins = session.store.proteins(item.id, pass).await?;
    proteins.sort_by(|a, b| b.nsaf.total_cmp(&a.nsaf).then_with(|| a.accession.cmp(&b.accession)));

    if json {
        let results = ItemResults {
            item_id: item.id,
            filename: &item.filename,
            pass,
            total_runtime: item.total_runtime,
            proteins: &proteins,
        };
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    println!(
        "{}",
        format!("{} ({}), pass {}", item.filename, item.id, pass.number()).cyan().bold()
    );
    println!("  Status:  {}", item.status);
    println!("  Runtime: {}", format_seconds(item.total_runtime));

    if proteins.is_empty() {
        println!("No proteins for this pass yet.");
        return Ok(());
    }

    let mut t = table(vec!["Accession", "PSMs", "Peptides", "NSAF", "Peak area"]);
    for protein in proteins.iter().take(limit) {
        t.add_row(vec![
            protein.accession.clone(),
            protein.psm_count.to_string(),
            protein.peptide_count.to_string(),
            format!("{:.6}", protein.nsaf),
            protein
                .peak_area
                .map(|a| format!("{:.1}", a))
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }
    println!("{}", t);
    if proteins.len() > limit {
        println!("Showing {} of {} proteins", limit, proteins.len());
    }
    Ok(())
}
