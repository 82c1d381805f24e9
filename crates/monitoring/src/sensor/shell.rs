//! External command execution for command-based sensors.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{SensorError, SensorOutcome};

/// Timeout for the capability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Captured result of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    /// Non-empty output lines, stdout first.
    pub lines: Vec<String>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs shell commands on behalf of a sensor.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Whether external processes can be run right now. Checked on every
    /// sensor run since hosting policy may change between runs.
    async fn is_available(&self) -> bool;

    /// Run `command` through the shell, bounded by `timeout`.
    async fn execute(&self, command: &str, timeout: Duration) -> SensorOutcome<CommandOutput>;
}

/// Executor backed by `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
}

impl ShellExecutor {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new("sh")
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn is_available(&self) -> bool {
        // Some environments stub out process execution and fail silently, so
        // check that the probe actually echoes back.
        match self.execute("echo \"enabled\"", PROBE_TIMEOUT).await {
            Ok(output) => {
                output.success() && output.lines.first().map(String::as_str) == Some("enabled")
            }
            Err(e) => {
                warn!(error = %e, "Command execution probe failed");
                false
            }
        }
    }

    async fn execute(&self, command: &str, timeout: Duration) -> SensorOutcome<CommandOutput> {
        debug!(command, timeout_secs = timeout.as_secs(), "Executing sensor command");

        let child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SensorError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| SensorError::CommandTimeout {
                command: command.to_string(),
                timeout_secs: timeout.as_secs(),
            })?
            .map_err(|source| SensorError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let lines = String::from_utf8_lossy(&output.stdout)
            .lines()
            .chain(String::from_utf8_lossy(&output.stderr).lines())
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect();

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            lines,
        })
    }
}

/// Build a command that runs `command` inside `working_dir`, with stderr
/// folded into stdout. The directory is shell-quoted so configuration can't
/// change where the command runs.
pub fn build_command(working_dir: &str, command: &str) -> SensorOutcome<String> {
    let quoted = shlex::try_quote(working_dir)
        .map_err(|e| SensorError::invalid_setting("repo_path", e.to_string()))?;
    Ok(format!("cd {quoted} && {command} 2>&1"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_command_quotes_path() {
        let cmd = build_command("/srv/my repo", "git status --porcelain").unwrap();
        assert!(cmd.ends_with(" && git status --porcelain 2>&1"));
        let words = shlex::split(&cmd).unwrap();
        assert_eq!(words[0], "cd");
        assert_eq!(words[1], "/srv/my repo");
        assert_eq!(words[2], "&&");
    }

    #[test]
    fn test_build_command_neutralizes_injection() {
        let cmd = build_command("x; rm -rf /", "true").unwrap();
        let words = shlex::split(&cmd).unwrap();
        assert_eq!(words[1], "x; rm -rf /");
        assert_eq!(words[2], "&&");
    }

    #[test]
    fn test_build_command_rejects_nul() {
        assert!(build_command("a\0b", "true").is_err());
    }

    #[tokio::test]
    async fn test_shell_executor_runs_commands() {
        let executor = ShellExecutor::default();
        assert!(executor.is_available().await);

        let output = executor
            .execute("echo one; echo two >&2; exit 3", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.lines, vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn test_shell_executor_times_out() {
        let executor = ShellExecutor::default();
        let err = executor
            .execute("sleep 5", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, SensorError::CommandTimeout { .. }));
    }

    #[tokio::test]
    async fn test_missing_shell_is_unavailable() {
        let executor = ShellExecutor::new("/nonexistent/shell");
        assert!(!executor.is_available().await);
    }
}
