//! Process-wide pipeline configuration
//!
//! Built once at start-up with [`PipelineConfig::load`] and passed down to the
//! store, the scheduler and the step runners.

use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pipeline::status::Pass;

// ============================================================================
// Defaults
// ============================================================================

/// Default SQLite database, created on first use.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://metaprod.db?mode=rwc";

/// Default number of pooled database connections per worker process.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 4;

/// Default seconds to wait for a locked database before failing a write.
pub const DEFAULT_DATABASE_BUSY_TIMEOUT_SECS: u64 = 30;

/// Default root holding `<project>/raw`, `<project>/out` and `<project>/fasta`.
pub const DEFAULT_DATA_FOLDER: &str = "data";

/// Default root holding `log/`, `temp/` and `fasta/`.
pub const DEFAULT_INSTALL_FOLDER: &str = ".";

/// Default toolchain description file.
pub const DEFAULT_TOOLCHAIN_FILE: &str = "toolchain.toml";

/// Default retry budget: a step may fail this many times after its first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Default thread count handed to external tools, `-1` uses every core.
pub const DEFAULT_THREADS: i32 = -1;

/// Default memory handed to JVM based tools, in megabytes.
pub const DEFAULT_MEMORY_MB: u32 = 8192;

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub database_busy_timeout_secs: u64,
    pub data_folder: PathBuf,
    pub install_folder: PathBuf,
    /// Proteome FASTA sources used to build pass-two databases
    pub fasta_folder: PathBuf,
    pub toolchain_file: PathBuf,
    pub max_retries: u32,
    pub threads: i32,
    pub memory_mb: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let install_folder = PathBuf::from(DEFAULT_INSTALL_FOLDER);
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            database_max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            database_busy_timeout_secs: DEFAULT_DATABASE_BUSY_TIMEOUT_SECS,
            data_folder: PathBuf::from(DEFAULT_DATA_FOLDER),
            fasta_folder: install_folder.join("fasta"),
            install_folder,
            toolchain_file: PathBuf::from(DEFAULT_TOOLCHAIN_FILE),
            max_retries: DEFAULT_MAX_RETRIES,
            threads: DEFAULT_THREADS,
            memory_mb: DEFAULT_MEMORY_MB,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from `.env`, the environment and defaults
    ///
    /// Environment variables:
    /// - `METAPROD_DATABASE_URL`, `METAPROD_DATABASE_MAX_CONNECTIONS`,
    ///   `METAPROD_DATABASE_BUSY_TIMEOUT`
    /// - `METAPROD_DATA_FOLDER`, `METAPROD_INSTALL_FOLDER`, `METAPROD_FASTA_FOLDER`
    /// - `METAPROD_TOOLCHAIN`
    /// - `METAPROD_MAX_RETRIES`, `METAPROD_THREADS`, `METAPROD_MEMORY_MB`
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let install_folder = env_path("METAPROD_INSTALL_FOLDER").unwrap_or(defaults.install_folder);

        let config = Self {
            database_url: std::env::var("METAPROD_DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            database_max_connections: env_parse("METAPROD_DATABASE_MAX_CONNECTIONS")
                .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
            database_busy_timeout_secs: env_parse("METAPROD_DATABASE_BUSY_TIMEOUT")
                .unwrap_or(DEFAULT_DATABASE_BUSY_TIMEOUT_SECS),
            data_folder: env_path("METAPROD_DATA_FOLDER").unwrap_or(defaults.data_folder),
            fasta_folder: env_path("METAPROD_FASTA_FOLDER")
                .unwrap_or_else(|| install_folder.join("fasta")),
            install_folder,
            toolchain_file: env_path("METAPROD_TOOLCHAIN").unwrap_or(defaults.toolchain_file),
            max_retries: env_parse("METAPROD_MAX_RETRIES").unwrap_or(DEFAULT_MAX_RETRIES),
            threads: env_parse("METAPROD_THREADS").unwrap_or(DEFAULT_THREADS),
            memory_mb: env_parse("METAPROD_MEMORY_MB").unwrap_or(DEFAULT_MEMORY_MB),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.is_empty() {
            bail!("METAPROD_DATABASE_URL cannot be empty");
        }
        if !self.database_url.starts_with("sqlite:") {
            bail!("METAPROD_DATABASE_URL must be a sqlite: URL, got '{}'", self.database_url);
        }
        if self.database_max_connections == 0 {
            bail!("METAPROD_DATABASE_MAX_CONNECTIONS must be greater than 0");
        }
        if self.threads == 0 || self.threads < -1 {
            bail!("METAPROD_THREADS must be -1 or a positive number, got {}", self.threads);
        }
        if self.memory_mb < 512 {
            bail!("METAPROD_MEMORY_MB must be at least 512");
        }
        Ok(())
    }

    /// Failure count at which an item is frozen (`1 + max_retries`).
    pub fn error_limit(&self) -> i64 {
        1 + i64::from(self.max_retries)
    }

    /// Thread count handed to external tools.
    pub fn effective_threads(&self) -> usize {
        if self.threads > 0 {
            self.threads as usize
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.database_busy_timeout_secs)
    }

    // ------------------------------------------------------------------------
    // Directory layout
    // ------------------------------------------------------------------------

    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.data_folder.join(project)
    }

    /// Incoming raw files for a project.
    pub fn raw_dir(&self, project: &str) -> PathBuf {
        self.project_dir(project).join("raw")
    }

    /// Working directory of one item; removed when the item is reset.
    pub fn item_out_dir(&self, project: &str, filename: &str) -> PathBuf {
        self.project_dir(project).join("out").join(filename)
    }

    pub fn pass_dir(&self, project: &str, filename: &str, pass: Pass) -> PathBuf {
        self.item_out_dir(project, filename).join(pass.dir_name())
    }

    /// PSM report written by the scoring step.
    pub fn psm_report(&self, project: &str, filename: &str, pass: Pass, multiplex: bool) -> PathBuf {
        let prefix = if multiplex { "r" } else { "ps" };
        self.pass_dir(project, filename, pass)
            .join(format!("{}_{}_Default_PSM_Report.txt", prefix, project))
    }

    /// Default pass-one search database of a project.
    pub fn profile_fasta(&self, project: &str) -> PathBuf {
        self.project_dir(project)
            .join("fasta")
            .join("profile")
            .join(format!("{}_profile.fasta", project))
    }

    /// Default pass-two database when profiling is disabled.
    pub fn shared_proteome_fasta(&self, project: &str) -> PathBuf {
        self.project_dir(project)
            .join("fasta")
            .join("proteome")
            .join(format!("{}_proteome.fasta", project))
    }

    /// Pass-two database generated for one item from its profile results.
    pub fn item_proteome_fasta(&self, project: &str, filename: &str) -> PathBuf {
        self.project_dir(project)
            .join("fasta")
            .join("proteome")
            .join(filename)
            .join(format!("{}_{}_proteome.fasta", project, filename))
    }

    /// Combined output of every external program run by one partition.
    pub fn job_log(&self, project: &str, job: i64) -> PathBuf {
        self.install_folder
            .join("log")
            .join(project)
            .join(format!("{}_{}.log", project, job))
    }

    pub fn log_dir(&self, project: &str) -> PathBuf {
        self.install_folder.join("log").join(project)
    }

    pub fn temp_dir(&self, project: &str) -> PathBuf {
        self.install_folder.join("temp").join(project)
    }

    pub fn job_temp_dir(&self, project: &str, job: i64) -> PathBuf {
        self.temp_dir(project).join(job.to_string())
    }

    pub fn proteome_source(&self, proteome: &str) -> PathBuf {
        self.fasta_folder.join(format!("{}.fasta", proteome))
    }

    pub fn contaminant_source(&self) -> PathBuf {
        self.fasta_folder.join("crap.fasta")
    }

    /// Resolve a possibly relative path against the data folder.
    pub fn resolve_data_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_folder.join(path)
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.error_limit(), 2);
        assert_eq!(config.threads, -1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = PipelineConfig::default();
        config.threads = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.database_url = "postgresql://localhost/metaprod".to_string();
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.memory_mb = 128;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_effective_threads() {
        let mut config = PipelineConfig::default();
        config.threads = 6;
        assert_eq!(config.effective_threads(), 6);
        config.threads = -1;
        assert!(config.effective_threads() >= 1);
    }

    #[test]
    fn test_layout() {
        let config = PipelineConfig {
            data_folder: PathBuf::from("/data"),
            install_folder: PathBuf::from("/opt/metaprod"),
            ..Default::default()
        };

        assert_eq!(config.raw_dir("soil"), PathBuf::from("/data/soil/raw"));
        assert_eq!(
            config.pass_dir("soil", "run01", Pass::Proteome),
            PathBuf::from("/data/soil/out/run01/proteome")
        );
        assert_eq!(
            config.psm_report("soil", "run01", Pass::Profile, false),
            PathBuf::from("/data/soil/out/run01/profile/ps_soil_Default_PSM_Report.txt")
        );
        assert_eq!(
            config.psm_report("soil", "run01", Pass::Profile, true),
            PathBuf::from("/data/soil/out/run01/profile/r_soil_Default_PSM_Report.txt")
        );
        assert_eq!(
            config.job_log("soil", 3),
            PathBuf::from("/opt/metaprod/log/soil/soil_3.log")
        );
        assert_eq!(
            config.item_proteome_fasta("soil", "run01"),
            PathBuf::from("/data/soil/fasta/proteome/run01/soil_run01_proteome.fasta")
        );
    }

    #[test]
    #[serial]
    fn test_load_from_env() {
        std::env::set_var("METAPROD_MAX_RETRIES", "3");
        std::env::set_var("METAPROD_INSTALL_FOLDER", "/opt/metaprod");
        std::env::set_var("METAPROD_THREADS", "not-a-number");

        let config = PipelineConfig::load().unwrap();

        std::env::remove_var("METAPROD_MAX_RETRIES");
        std::env::remove_var("METAPROD_INSTALL_FOLDER");
        std::env::remove_var("METAPROD_THREADS");

        assert_eq!(config.max_retries, 3);
        assert_eq!(config.error_limit(), 4);
        assert_eq!(config.fasta_folder, PathBuf::from("/opt/metaprod/fasta"));
        // unparsable values fall back to the default
        assert_eq!(config.threads, DEFAULT_THREADS);
    }
}
