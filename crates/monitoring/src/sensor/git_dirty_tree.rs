//! Git dirty tree sensor.
//!
//! Inspects a repository with read-only git commands and reports changed or
//! untracked files (CRITICAL), unpushed commits, an unexpected branch and
//! submodules that are uninitialized or dirty (WARNING).

use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::definition::SensorDefinition;
use crate::error::SensorOutcome;
use crate::result::{SensorResult, SensorResultBuilder};
use crate::sensor::shell::{build_command, CommandExecutor};
use crate::sensor::Sensor;
use crate::status::SensorStatus;

/// Plugin kind.
pub const KIND: &str = "git_dirty_tree";

/// Entries shown in a file list preview.
const PREVIEW_ENTRIES: usize = 2;

/// Characters of a path kept in a preview entry.
const PREVIEW_PATH_CHARS: usize = 50;

const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    Branch,
    Status,
    Ahead,
    Submodules,
}

impl Check {
    const fn setting_key(self) -> &'static str {
        match self {
            Self::Branch => "actual_branch_cmd",
            Self::Status => "status_cmd",
            Self::Ahead => "ahead_cmd",
            Self::Submodules => "submodules_cmd",
        }
    }

    const fn default_command(self) -> &'static str {
        match self {
            Self::Branch => "git rev-parse --abbrev-ref HEAD",
            Self::Status => "git status --porcelain",
            Self::Ahead => "git log --oneline @{u}..HEAD",
            Self::Submodules => "git submodule status",
        }
    }

    const fn title(self) -> &'static str {
        match self {
            Self::Branch => "Check branch",
            Self::Status => "Status",
            Self::Ahead => "Ahead",
            Self::Submodules => "Submodules",
        }
    }

    const fn description(self) -> &'static str {
        match self {
            Self::Branch => "Shows the current branch.",
            Self::Status => "Shows uncommitted, changed and deleted files.",
            Self::Ahead => "Shows local commits that have not been pushed.",
            Self::Submodules => {
                "Lists submodules; \"-\" marks uninitialized and \"+\" unexpected state."
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Captured {
    check: Check,
    command: String,
    output: Vec<String>,
}

/// Repository cleanliness sensor.
pub struct GitDirtyTreeSensor {
    executor: Arc<dyn CommandExecutor>,
    captured: Vec<Captured>,
}

impl GitDirtyTreeSensor {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            captured: Vec::new(),
        }
    }

    /// Run one inspection command. A non-zero exit marks the run CRITICAL and
    /// yields no lines for classification; the remaining checks still run.
    async fn run_check(
        &mut self,
        check: Check,
        definition: &SensorDefinition,
        result: &mut SensorResultBuilder,
    ) -> SensorOutcome<Vec<String>> {
        let repo_path = definition
            .setting_str("repo_path")
            .unwrap_or_else(|| ".".to_string());
        let configured = definition
            .setting_str(check.setting_key())
            .unwrap_or_else(|| check.default_command().to_string());
        let timeout = Duration::from_secs(
            definition
                .setting_u64("command_timeout")
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS),
        );

        let command = build_command(&repo_path, &configured)?;
        let output = self.executor.execute(&command, timeout).await?;

        self.captured.push(Captured {
            check,
            command: command.clone(),
            output: output.lines.clone(),
        });

        if output.success() {
            Ok(output.lines)
        } else {
            debug!(
                sensor_id = result.sensor_id(),
                exit_code = output.exit_code,
                "Sensor command failed"
            );
            result
                .add_message(format!(
                    "Non-zero exit code {} for command {}",
                    output.exit_code, command
                ))
                .critical();
            Ok(Vec::new())
        }
    }
}

#[async_trait]
impl Sensor for GitDirtyTreeSensor {
    async fn run(
        &mut self,
        definition: &SensorDefinition,
        result: &mut SensorResultBuilder,
    ) -> SensorOutcome {
        self.captured.clear();

        if !self.executor.is_available().await {
            result
                .set_status(SensorStatus::Unknown)
                .add_message("External command execution is not available in this runtime");
            return Ok(());
        }

        let check_branch = definition.setting_bool("check_branch");
        let actual_branch = if check_branch {
            let lines = self.run_check(Check::Branch, definition, result).await?;
            lines.into_iter().next()
        } else {
            None
        };
        let status = self.run_check(Check::Status, definition, result).await?;
        let ahead = self.run_check(Check::Ahead, definition, result).await?;
        let submodules = self.run_check(Check::Submodules, definition, result).await?;

        let wrong_submodules: Vec<String> = submodules
            .into_iter()
            .filter(|line| line.starts_with('-') || line.starts_with('+'))
            .collect();
        let expected_branch = definition.setting_str("expected_branch").unwrap_or_default();
        let branch_mismatch = actual_branch
            .as_deref()
            .is_some_and(|actual| actual != expected_branch);

        result.set_expected_value(0_u64);

        if status.is_empty() && ahead.is_empty() && !branch_mismatch && wrong_submodules.is_empty()
        {
            result.set_value(0_u64);
            // A failed command already marked the run CRITICAL.
            if result.status() != Some(SensorStatus::Critical) {
                result
                    .add_message("repository clean")
                    .set_status(SensorStatus::Ok);
            }
            return Ok(());
        }

        result.set_value(status.len());

        if !status.is_empty() {
            result
                .add_message(format!(
                    "Files in unexpected state: {}",
                    short_file_list(&status, PREVIEW_ENTRIES, PREVIEW_PATH_CHARS)
                ))
                .critical();
        }
        if !ahead.is_empty() {
            result
                .add_message(format!("Branch is {} ahead of origin", ahead.len()))
                .warning();
        }
        if let Some(actual) = actual_branch.filter(|_| branch_mismatch) {
            result
                .add_message(format!(
                    "Active branch {actual}, expected {expected_branch}"
                ))
                .warning();
        }
        if !wrong_submodules.is_empty() {
            result
                .add_message(format!(
                    "Submodules in unexpected state: {}",
                    short_file_list(&wrong_submodules, PREVIEW_ENTRIES, PREVIEW_PATH_CHARS)
                ))
                .warning();
        }

        Ok(())
    }

    fn verbose_output(&self, _result: &SensorResult) -> Option<String> {
        if self.captured.is_empty() {
            return None;
        }
        let mut out = String::new();
        for captured in &self.captured {
            let _ = writeln!(out, "## {}", captured.check.title());
            let _ = writeln!(out, "Command: {}", captured.command);
            let _ = writeln!(out, "Output:");
            for line in &captured.output {
                let _ = writeln!(out, "{line}");
            }
            let _ = writeln!(out, "({})", captured.check.description());
            out.push('\n');
        }
        Some(out.trim_end().to_string())
    }
}

/// Preview of at most `max_entries` listing lines. Short entries are kept
/// verbatim; long paths are cut to their last `max_chars` characters behind
/// the change-type prefix.
fn short_file_list(lines: &[String], max_entries: usize, max_chars: usize) -> String {
    lines
        .iter()
        .take(max_entries)
        .map(|line| match split_change_type(line) {
            Some((prefix, path)) if path.chars().count() > max_chars => {
                let len = path.chars().count();
                let tail: String = path.chars().skip(len - max_chars).collect();
                format!("{prefix} …{tail}")
            }
            _ => line.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split a listing line into its change type and path. Porcelain lines carry
/// a two-character `XY` code (either may be a space) followed by one space.
fn split_change_type(line: &str) -> Option<(&str, &str)> {
    match (line.get(..2), line.get(2..3), line.get(3..)) {
        (Some(code), Some(" "), Some(path)) if !code.trim().is_empty() => Some((code, path)),
        _ => line.split_once(' '),
    }
}
