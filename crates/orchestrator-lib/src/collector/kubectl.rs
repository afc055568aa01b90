//! External process boundary for cluster access

use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Hard ceiling on any single kubectl invocation
pub const DEFAULT_KUBECTL_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs cluster CLI commands and returns their stdout
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, args: &[String]) -> Result<String>;
}

/// `kubectl` subprocess runner with a hard timeout
#[derive(Debug, Clone)]
pub struct KubectlRunner {
    program: String,
    timeout: Duration,
}

impl Default for KubectlRunner {
    fn default() -> Self {
        Self::new(DEFAULT_KUBECTL_TIMEOUT)
    }
}

impl KubectlRunner {
    pub fn new(timeout: Duration) -> Self {
        Self::with_program("kubectl", timeout)
    }

    /// Use a different binary, e.g. a pinned kubectl path
    pub fn with_program(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl CommandRunner for KubectlRunner {
    async fn run(&self, args: &[String]) -> Result<String> {
        debug!(program = %self.program, args = ?args, "Running command");

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(OrchestratorError::Resource(format!(
                    "Failed to execute {}: {e}",
                    self.program
                )))
            }
            Err(_) => {
                return Err(OrchestratorError::Resource(format!(
                    "{} command timed out after {}s",
                    self.program,
                    self.timeout.as_secs_f64()
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OrchestratorError::Resource(format!(
                "{} command failed: {}",
                self.program,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_stdout_returned_on_success() {
        let runner = KubectlRunner::with_program("sh", Duration::from_secs(5));
        let out = runner.run(&args(&["-c", "echo pods"])).await.unwrap();
        assert_eq!(out.trim(), "pods");
    }

    #[tokio::test]
    async fn test_non_zero_exit_carries_stderr() {
        let runner = KubectlRunner::with_program("sh", Duration::from_secs(5));
        let err = runner
            .run(&args(&["-c", "echo 'forbidden: namespace' >&2; exit 1"]))
            .await
            .unwrap_err();

        match err {
            OrchestratorError::Resource(message) => {
                assert!(message.contains("forbidden: namespace"), "{message}")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_enforced() {
        let runner = KubectlRunner::with_program("sh", Duration::from_millis(100));
        let started = std::time::Instant::now();
        let err = runner.run(&args(&["-c", "sleep 5"])).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let runner =
            KubectlRunner::with_program("definitely-not-a-kubectl-binary", Duration::from_secs(1));
        let err = runner.run(&args(&["version"])).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Resource(_)));
    }
}
