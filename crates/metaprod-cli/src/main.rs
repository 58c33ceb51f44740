//! MetaProD CLI - Main entry point

use clap::Parser;
use metaprod_cli::commands::{self, Session};
use metaprod_cli::{CatalogCommand, Cli, Commands, ProjectCommand};
use metaprod_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Verbose mode logs pipeline events to the console at debug level;
    // otherwise only warnings and errors show up next to command output.
    let level = if cli.verbose { LogLevel::Debug } else { LogLevel::Warn };
    let log_config = LogConfig::builder()
        .level(level)
        .output(LogOutput::Console)
        .log_file_prefix("metaprod")
        .build();

    // METAPROD_LOG_* variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The CLI works without logging
    let _guard = init_logging(&log_config).ok();

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn execute_command(cli: &Cli) -> metaprod_cli::Result<()> {
    let session = Session::open(cli.database_url.as_deref()).await?;
    let result = dispatch(&session, &cli.command).await;
    session.close().await;
    result
}

async fn dispatch(session: &Session, command: &Commands) -> metaprod_cli::Result<()> {
    match command {
        Commands::Project { command } => match command {
            ProjectCommand::Create {
                name,
                description,
                settings,
            } => commands::project::create(session, name, description, settings.as_deref()).await,
            ProjectCommand::Show { name } => commands::project::show(session, name.as_deref()).await,
            ProjectCommand::Settings { name, file } => {
                commands::project::settings(session, name, file.as_deref()).await
            },
        },

        Commands::Discover { project, jobs } => commands::discover::run(session, project, *jobs).await,

        Commands::Catalog { command } => match command {
            CatalogCommand::LoadFasta { files } => commands::catalog::fasta(session, files).await,
            CatalogCommand::LoadProteomes { file } => commands::catalog::proteomes(session, file).await,
        },

        Commands::Advance { project, job } => commands::advance::run(session, project, *job).await,

        Commands::Reset {
            item,
            to_added,
            clear_error,
        } => commands::item::reset(session, *item, *to_added, *clear_error).await,

        Commands::Skip { item, undo } => commands::item::skip(session, *item, *undo).await,

        Commands::Inspect { project, json } => commands::inspect::run(session, project, *json).await,

        Commands::Results {
            item,
            pass,
            limit,
            json,
        } => commands::results::run(session, *item, *pass, *limit, *json).await,
    }
}
