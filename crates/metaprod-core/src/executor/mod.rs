//! Step executor
//!
//! Runs one external program under a hard timeout, streams its combined
//! output line by line into the partition's [`JobLog`] (and to `debug!`),
//! and checks the declared outputs once it exits. Declared outputs are
//! removed before the program starts, so only a file written by this run
//! counts. The executor never retries; the state machine owns retry
//! accounting.

pub mod job_log;

pub use job_log::JobLog;

use crate::error::{PipelineError, Result};
use crate::toolchain::CommandSpec;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Why an external step did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    /// The program exists but could not be started
    Spawn(String),
    /// Exit code, `None` when killed by a signal
    ExitStatus(Option<i32>),
    TimedOut(Duration),
    /// Exited cleanly without producing these files
    MissingOutput(Vec<PathBuf>),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Spawn(msg) => write!(f, "failed to start: {}", msg),
            FailureReason::ExitStatus(Some(code)) => write!(f, "exited with status {}", code),
            FailureReason::ExitStatus(None) => f.write_str("terminated by signal"),
            FailureReason::TimedOut(limit) => write!(f, "timed out after {}s", limit.as_secs()),
            FailureReason::MissingOutput(paths) => {
                let names: Vec<_> = paths.iter().map(|p| p.display().to_string()).collect();
                write!(f, "missing output: {}", names.join(", "))
            },
        }
    }
}

/// Observed outcome of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecOutcome {
    pub elapsed: Duration,
    pub failure: Option<FailureReason>,
}

impl ExecOutcome {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// Whole seconds, as recorded in the runtime ledger.
    pub fn seconds(&self) -> i64 {
        self.elapsed.as_secs() as i64
    }
}

/// Runs external programs for one partition
#[derive(Debug, Clone)]
pub struct Executor {
    log: JobLog,
}

impl Executor {
    pub fn new(log: JobLog) -> Self {
        Self { log }
    }

    pub fn log(&self) -> &JobLog {
        &self.log
    }

    /// Run `cmd` for `item_id`.
    ///
    /// Step failures come back as an [`ExecOutcome`] with a failure reason.
    /// `Err` is reserved for problems outside the item: a program that does
    /// not exist or cannot be executed is a configuration failure, and a
    /// log that cannot be written is an IO error.
    pub async fn execute(&self, cmd: &CommandSpec, item_id: i64) -> Result<ExecOutcome> {
        if cmd.program.components().count() > 1 && !cmd.program.exists() {
            return Err(PipelineError::configuration(format!(
                "Program for step {} not found: {}",
                cmd.name,
                cmd.program.display()
            )));
        }

        self.log.section(item_id, &cmd.name).await?;
        self.log
            .line(&format!("$ {} {}", cmd.program.display(), cmd.args.join(" ")))
            .await?;

        for output in &cmd.outputs {
            if remove_output(output).await.map_err(|e| PipelineError::file(output, e))? {
                debug!(item_id, step = %cmd.name, output = %output.display(), "Removed earlier output");
            }
        }

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &cmd.working_dir {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| PipelineError::file(dir, e))?;
            command.current_dir(dir);
        }

        let started = Instant::now();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
                return Err(PipelineError::configuration(format!(
                    "Cannot execute {} for step {}: {}",
                    cmd.program.display(),
                    cmd.name,
                    e
                )));
            },
            Err(e) => {
                warn!(item_id, step = %cmd.name, error = %e, "Failed to spawn step");
                return self
                    .finish(cmd, item_id, started, Some(FailureReason::Spawn(e.to_string())))
                    .await;
            },
        };

        // Both streams feed one channel so the log keeps a single writer
        let (tx, rx) = mpsc::channel::<String>(256);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(stderr, tx.clone())));
        }
        drop(tx);
        let writer = tokio::spawn(write_lines(self.log.clone(), rx, item_id, cmd.name.clone()));

        let failure = match tokio::time::timeout(cmd.timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => None,
            Ok(Ok(status)) => Some(FailureReason::ExitStatus(status.code())),
            Ok(Err(e)) => Some(FailureReason::Spawn(e.to_string())),
            Err(_) => {
                warn!(item_id, step = %cmd.name, timeout_secs = cmd.timeout.as_secs(), "Step timed out, killing");
                if let Err(e) = child.kill().await {
                    warn!(item_id, step = %cmd.name, error = %e, "Failed to kill timed out step");
                }
                // descendants may still hold the pipes open
                for reader in &readers {
                    reader.abort();
                }
                Some(FailureReason::TimedOut(cmd.timeout))
            },
        };

        for reader in readers {
            if let Err(e) = reader.await {
                if !e.is_cancelled() {
                    warn!(item_id, step = %cmd.name, error = %e, "Output reader failed");
                }
            }
        }
        if let Ok(Err(e)) = writer.await {
            warn!(item_id, step = %cmd.name, error = %e, "Failed to write job log");
        }

        let failure = failure.or_else(|| {
            let missing: Vec<PathBuf> = cmd.outputs.iter().filter(|p| !p.exists()).cloned().collect();
            (!missing.is_empty()).then_some(FailureReason::MissingOutput(missing))
        });

        self.finish(cmd, item_id, started, failure).await
    }

    async fn finish(
        &self,
        cmd: &CommandSpec,
        item_id: i64,
        started: Instant,
        failure: Option<FailureReason>,
    ) -> Result<ExecOutcome> {
        let outcome = ExecOutcome {
            elapsed: started.elapsed(),
            failure,
        };

        match &outcome.failure {
            None => {
                info!(item_id, step = %cmd.name, seconds = outcome.seconds(), "Step finished");
                self.log
                    .line(&format!("---- {} finished in {}s", cmd.name, outcome.seconds()))
                    .await?;
            },
            Some(reason) => {
                warn!(item_id, step = %cmd.name, reason = %reason, "Step failed");
                self.log.line(&format!("---- {} failed: {}", cmd.name, reason)).await?;
            },
        }
        Ok(outcome)
    }
}

/// Remove a file or directory left at `path`. Returns whether anything was
/// there.
pub(crate) async fn remove_output(path: &Path) -> std::io::Result<bool> {
    let removed = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) => Err(e),
    };
    match removed {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(stream: R, tx: mpsc::Sender<String>) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).await.is_err() {
            break;
        }
    }
}

async fn write_lines(log: JobLog, mut rx: mpsc::Receiver<String>, item_id: i64, step: String) -> Result<()> {
    while let Some(line) = rx.recv().await {
        debug!(item_id, step = %step, "{}", line);
        log.line(&line).await?;
    }
    Ok(())
}
