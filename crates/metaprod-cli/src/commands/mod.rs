//! CLI command implementations
//!
//! Each subcommand has its own module. Commands that touch the database
//! take a [`Session`].

pub mod advance;
pub mod catalog;
pub mod discover;
pub mod inspect;
pub mod item;
pub mod project;
pub mod results;

use crate::error::Result;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use metaprod_core::{PipelineConfig, Store};

/// Configuration and an open store, shared by the commands of one run
pub struct Session {
    pub config: PipelineConfig,
    pub store: Store,
}

impl Session {
    /// Load configuration and connect, letting `--database-url` win over
    /// the environment.
    pub async fn open(database_url: Option<&str>) -> Result<Self> {
        let mut config = PipelineConfig::load()?;
        if let Some(url) = database_url {
            config.database_url = url.to_string();
            config.validate()?;
        }
        let store = Store::connect(&config).await?;
        Ok(Self { config, store })
    }

    pub async fn close(self) {
        self.store.close().await;
    }
}

pub(crate) fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);
    table
}
