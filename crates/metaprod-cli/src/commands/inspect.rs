//! `metaprod inspect` command implementation

use super::{table, Session};
use crate::error::Result;
use colored::Colorize;
use metaprod_core::inspect::{inspect, ProjectReport};

pub async fn run(session: &Session, project: &str, json: bool) -> Result<()> {
    let report = inspect(&session.store, &session.config, project).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    display(&report);
    Ok(())
}

fn display(report: &ProjectReport) {
    println!("{}", format!("Project {}", report.project).cyan().bold());
    if report.items == 0 {
        println!("No work items. Run 'metaprod discover {}' first.", report.project);
        return;
    }

    let mut statuses = table(vec!["Status", "Items"]);
    for (status, count) in &report.statuses {
        statuses.add_row(vec![status.to_string(), count.to_string()]);
    }
    println!("{}", statuses);

    println!("  Items:       {}", report.items);
    println!("  Finished:    {}", report.finished);
    println!("  Skipped:     {}", report.skipped);
    println!("  With errors: {}", report.with_errors);

    if report.pending_jobs.is_empty() {
        println!("  Pending jobs: none");
    } else {
        let jobs: Vec<String> = report.pending_jobs.iter().map(|j| j.to_string()).collect();
        println!("  Pending jobs: {}", jobs.join(", "));
    }

    if !report.fatal.is_empty() {
        println!();
        println!("{}", "Frozen items (retry budget spent):".red().bold());
        let mut frozen = table(vec!["Id", "File", "Status", "Errors", "Job"]);
        for item in &report.fatal {
            frozen.add_row(vec![
                item.id.to_string(),
                item.filename.clone(),
                item.status.to_string(),
                item.error.to_string(),
                item.job.to_string(),
            ]);
        }
        println!("{}", frozen);
        println!("Reset them with 'metaprod reset <id> --clear-error'.");
    }

    if report.is_complete() {
        println!("{} All items finished", "✓".green());
    }
}
