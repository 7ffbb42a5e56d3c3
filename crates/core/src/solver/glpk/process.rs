//! Running `glpsol` as a subprocess under a hard wall-clock deadline.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use super::error::GlpkError;

/// Marker glpsol prints when its own time limit fires.
const TIME_LIMIT_MARKER: &str = "TIME LIMIT EXCEEDED";

/// Captured output of a finished optimizer run.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Paths of one optimizer invocation.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub model: &'a Path,
    pub data: &'a Path,
    pub output: &'a Path,
}

/// Runs the optimizer binary.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    binary: PathBuf,
    failsafe_factor: f64,
    scale: bool,
}

impl ProcessExecutor {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            failsafe_factor: 1.2,
            scale: false,
        }
    }

    /// Wall-clock deadline as a multiple of the optimizer's own limit.
    pub fn with_failsafe_factor(mut self, factor: f64) -> Self {
        self.failsafe_factor = factor.max(1.0);
        self
    }

    pub fn with_scale(mut self, scale: bool) -> Self {
        self.scale = scale;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn build_args(&self, invocation: Invocation<'_>, budget: Duration) -> Vec<String> {
        let mut args = Vec::with_capacity(9);
        if self.scale {
            args.push("--scale".to_string());
        }
        args.extend([
            "--model".to_string(),
            invocation.model.to_string_lossy().to_string(),
            "--data".to_string(),
            invocation.data.to_string_lossy().to_string(),
            "--tmlim".to_string(),
            budget.as_millis().max(1).to_string(),
            "--output".to_string(),
            invocation.output.to_string_lossy().to_string(),
        ]);
        args
    }

    /// Run the optimizer and wait for it, killing it if it outlives the deadline.
    ///
    /// Returns once the process has exited or been killed and reaped, so no
    /// optimizer survives a timeout.
    pub async fn run(
        &self,
        invocation: Invocation<'_>,
        budget: Duration,
    ) -> Result<ProcessOutput, GlpkError> {
        let budget_ms = budget.as_millis() as u64;
        let deadline = budget.mul_f64(self.failsafe_factor);
        let args = self.build_args(invocation, budget);
        debug!(binary = %self.binary.display(), ?args, "Starting optimizer");

        let started = Instant::now();
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    GlpkError::BinaryNotFound {
                        path: self.binary.clone(),
                    }
                } else {
                    GlpkError::Io(e)
                }
            })?;

        let (Some(mut stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill().await;
            return Err(GlpkError::Io(std::io::Error::other(
                "optimizer pipes were not captured",
            )));
        };

        let waited = timeout(deadline, async {
            let mut out = String::new();
            let mut err = String::new();
            let (read_out, read_err, status) = tokio::join!(
                stdout.read_to_string(&mut out),
                stderr.read_to_string(&mut err),
                child.wait()
            );
            read_out?;
            read_err?;
            Ok::<(ExitStatus, String, String), std::io::Error>((status?, out, err))
        })
        .await;

        let (status, out, err) = match waited {
            Ok(Ok(finished)) => finished,
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(GlpkError::Io(e));
            }
            Err(_) => {
                warn!(
                    budget_ms,
                    deadline_ms = deadline.as_millis() as u64,
                    "Optimizer outlived its deadline, killing it"
                );
                let _ = child.kill().await;
                drop(stdout);
                drop(stderr);
                return Err(GlpkError::Timeout {
                    timeout_ms: budget_ms,
                });
            }
        };

        let elapsed = started.elapsed();
        if out.contains(TIME_LIMIT_MARKER) || err.contains(TIME_LIMIT_MARKER) {
            return Err(GlpkError::Timeout {
                timeout_ms: budget_ms,
            });
        }

        if !status.success() {
            return Err(GlpkError::ProcessFailed {
                exit_code: status.code(),
                output: format!("{}{}", out, err),
            });
        }

        debug!(elapsed_ms = elapsed.as_millis() as u64, "Optimizer finished");
        Ok(ProcessOutput {
            stdout: out,
            stderr: err,
            elapsed,
        })
    }
}
