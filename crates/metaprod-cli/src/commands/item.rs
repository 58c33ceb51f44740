//! `metaprod reset` and `metaprod skip` command implementations

use super::Session;
use crate::error::{CliError, Result};
use colored::Colorize;

pub async fn reset(session: &Session, item: i64, to_added: bool, clear_error: bool) -> Result<()> {
    if !to_added && !clear_error {
        return Err(CliError::invalid_argument(
            "nothing to do; pass --to-added and/or --clear-error",
        ));
    }
    let item = session.store.reset_item(item, to_added, clear_error).await?;
    println!(
        "{} {} ({}) is at {} with {} errors",
        "✓".green(),
        item.filename.bold(),
        item.id,
        item.status,
        item.error
    );
    Ok(())
}

pub async fn skip(session: &Session, item: i64, undo: bool) -> Result<()> {
    session.store.set_skip(item, !undo).await?;
    let item = session.store.get_item(item).await?;
    let verb = if undo { "included again" } else { "skipped" };
    println!("{} {} ({}) {}", "✓".green(), item.filename.bold(), item.id, verb);
    Ok(())
}
