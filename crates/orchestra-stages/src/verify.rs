//! Shell verification for gates decided by a command's exit code
use async_trait::async_trait;
use orchestra_core::{OrchestraError, Result, ShellVerifySpec};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::debug;

/// Result of running a verification command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutcome {
    pub exit_code: i32,
    /// Combined stdout and stderr
    pub output: String,
    pub duration_ms: u64,
}

#[async_trait]
pub trait ShellVerifier: Send + Sync {
    async fn verify(&self, spec: &ShellVerifySpec) -> Result<ShellOutcome>;
}

/// Runs the command with `sh -c`
#[derive(Debug, Clone)]
pub struct CommandVerifier {
    default_timeout: Duration,
    working_dir: Option<PathBuf>,
}

impl CommandVerifier {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            default_timeout,
            working_dir: None,
        }
    }

    /// Directory used when the spec names none
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl ShellVerifier for CommandVerifier {
    async fn verify(&self, spec: &ShellVerifySpec) -> Result<ShellOutcome> {
        let start = Instant::now();
        let timeout = spec
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        let mut command = tokio::process::Command::new("sh");
        command.arg("-c").arg(&spec.command);
        if let Some(dir) = spec.working_dir.as_ref().map(PathBuf::from).or_else(|| self.working_dir.clone()) {
            command.current_dir(dir);
        }

        let output = match tokio::time::timeout(timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(OrchestraError::ExternalLookup(format!("shell verify '{}': {}", spec.command, e))),
            Err(_) => {
                return Ok(ShellOutcome {
                    exit_code: 124,
                    output: format!("timed out after {}s", timeout.as_secs()),
                    duration_ms: start.elapsed().as_millis() as u64,
                })
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let outcome = ShellOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            output: text,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        debug!(command = %spec.command, exit_code = outcome.exit_code, duration_ms = outcome.duration_ms, "shell verify finished");
        Ok(outcome)
    }
}
