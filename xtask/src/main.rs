//! Build automation tasks for MetaProD
//!
//! - Generating the CLI reference from the clap definitions

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for MetaProD", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<metaprod_cli::Cli>();

    let content = format!(
        r#"# MetaProD CLI Reference

Generated from the CLI source code on {}.

## Quick Start

```bash
# Load the reference catalog once per install
metaprod catalog load-proteomes proteomes.tsv
metaprod catalog load-fasta fasta/*.fasta

# Create a project and register its raw files
metaprod project create soil --settings soil.toml
metaprod discover soil --jobs 4

# One worker per job, on as many hosts as you like
metaprod advance soil 0
metaprod advance soil 1

# Watch progress and recover stuck items
metaprod inspect soil
metaprod reset 17 --clear-error
```

## Commands

{}

## Environment Variables

- `METAPROD_DATABASE_URL` - SQLite database (default: `sqlite://metaprod.db?mode=rwc`)
- `METAPROD_DATA_FOLDER` - Root of `<project>/raw`, `<project>/out` and `<project>/fasta`
- `METAPROD_INSTALL_FOLDER` - Root of `log/` and `temp/`
- `METAPROD_FASTA_FOLDER` - Proteome FASTA sources for pass-two databases
- `METAPROD_TOOLCHAIN` - Toolchain file (default: `toolchain.toml`)
- `METAPROD_MAX_RETRIES` - Failures allowed after the first attempt (default: 1)
- `METAPROD_THREADS`, `METAPROD_MEMORY_MB` - Resources handed to external tools
- `METAPROD_LOG_LEVEL`, `METAPROD_LOG_OUTPUT`, `METAPROD_LOG_FORMAT` - Logging

---

*To update, run `cargo run -p xtask -- generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());
    Ok(())
}
