//! `metaprod project` command implementation

use super::{table, Session};
use crate::error::Result;
use colored::Colorize;
use metaprod_core::settings::ProjectSettings;
use std::path::Path;

fn read_settings(file: Option<&Path>) -> Result<ProjectSettings> {
    match file {
        Some(path) => Ok(ProjectSettings::from_toml_file(path)?),
        None => Ok(ProjectSettings::default()),
    }
}

/// Create a project and store its settings
pub async fn create(session: &Session, name: &str, description: &str, settings: Option<&Path>) -> Result<()> {
    let settings = read_settings(settings)?;
    let project = session.store.create_project(name, description).await?;
    session.store.save_settings(name, &settings).await?;

    println!("{} Created project {}", "✓".green(), project.name.bold());
    println!("  Raw files go to: {}", session.config.raw_dir(name).display());
    println!("Run 'metaprod discover {}' once they are in place.", name);
    Ok(())
}

/// List all projects, or show one with its settings
pub async fn show(session: &Session, name: Option<&str>) -> Result<()> {
    let Some(name) = name else {
        let projects = session.store.list_projects().await?;
        if projects.is_empty() {
            println!("No projects found.");
            println!("Run 'metaprod project create <name>' to add one.");
            return Ok(());
        }
        let mut t = table(vec!["Project", "Description", "Created"]);
        for project in projects {
            t.add_row(vec![project.name, project.description, project.created_at]);
        }
        println!("{}", t);
        return Ok(());
    };

    let project = session.store.get_project(name).await?;
    let settings = session.store.project_settings(name).await?;

    println!("{}", project.name.cyan().bold());
    if !project.description.is_empty() {
        println!("  {}", project.description);
    }
    println!("  Created: {}", project.created_at);
    println!();
    print_settings(&settings)
}

/// Print settings, or replace them from a TOML file
pub async fn settings(session: &Session, name: &str, file: Option<&Path>) -> Result<()> {
    session.store.get_project(name).await?;
    match file {
        Some(path) => {
            let settings = read_settings(Some(path))?;
            session.store.save_settings(name, &settings).await?;
            println!("{} Settings of {} replaced from {}", "✓".green(), name.bold(), path.display());
            Ok(())
        },
        None => print_settings(&session.store.project_settings(name).await?),
    }
}

/// Settings in the same TOML form `--settings` accepts.
fn print_settings(settings: &ProjectSettings) -> Result<()> {
    let text = toml::to_string_pretty(settings).map_err(anyhow::Error::from)?;
    println!("{}", "Settings:".cyan().bold());
    println!("{}", text);
    Ok(())
}
