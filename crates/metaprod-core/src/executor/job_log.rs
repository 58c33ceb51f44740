//! Per-project, per-partition log of external program output

use crate::error::{PipelineError, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Append-only log file shared by every step run in one partition
#[derive(Debug, Clone)]
pub struct JobLog {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl JobLog {
    /// Open (creating parents) for appending.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::file(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| PipelineError::file(&path, e))?;

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Timestamped banner separating one step run from the next.
    pub async fn section(&self, item_id: i64, title: &str) -> Result<()> {
        let banner = format!(
            "==== {} item {} {} ====",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            item_id,
            title
        );
        self.line(&banner).await
    }

    pub async fn line(&self, line: &str) -> Result<()> {
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_appends_across_handles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log").join("soil").join("soil_0.log");

        let log = JobLog::open(&path).await.unwrap();
        log.section(7, "convert").await.unwrap();
        log.line("first").await.unwrap();

        let again = JobLog::open(&path).await.unwrap();
        again.line("second").await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("==== ") && lines[0].ends_with("item 7 convert ===="));
        assert_eq!(lines[2], "second");
    }
}
