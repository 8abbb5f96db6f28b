//! Execution result types.

use std::time::Duration;

/// Result of one remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// The command as submitted.
    pub command: String,
    /// Whether the command exited with status 0.
    pub succeeded: bool,
    /// Sanitized standard output, trimmed, without sentinel lines.
    pub stdout: String,
    /// Sanitized standard error, trimmed. Empty when the transport merges
    /// both streams.
    pub stderr: String,
    /// Exit status reported by the remote shell.
    pub exit_code: Option<i32>,
    /// Tracked working directory after the command.
    pub cwd: Option<String>,
    /// Execution duration.
    pub duration: Duration,
}

impl CommandResult {
    /// Create a result; `succeeded` is derived from the exit code.
    pub fn new(
        command: impl Into<String>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self {
            command: command.into(),
            succeeded: exit_code == Some(0),
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
            cwd: None,
            duration: Duration::ZERO,
        }
    }

    /// Set the tracked working directory.
    pub fn with_cwd(mut self, cwd: Option<String>) -> Self {
        self.cwd = cwd;
        self
    }

    /// Set the duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Check if command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.succeeded
    }

    /// Check if command failed.
    pub fn failed(&self) -> bool {
        !self.succeeded
    }

    /// Standard error if present, otherwise standard output.
    ///
    /// Handy for error messages when the transport merges streams.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success() {
        let result = CommandResult::new("true", "", "", Some(0));
        assert!(result.success());
        assert!(!result.failed());
    }

    #[test]
    fn test_failure() {
        let result = CommandResult::new("false", "", "", Some(1));
        assert!(!result.success());
        assert!(result.failed());

        let result = CommandResult::new("killed", "", "", None);
        assert!(result.failed());
    }

    #[test]
    fn test_diagnostic_prefers_stderr() {
        let result = CommandResult::new("x", "out", "err", Some(1));
        assert_eq!(result.diagnostic(), "err");
        let result = CommandResult::new("x", "out", "", Some(1));
        assert_eq!(result.diagnostic(), "out");
    }

    #[test]
    fn test_builders() {
        let result = CommandResult::new("pwd", "/tmp", "", Some(0))
            .with_cwd(Some("/tmp".into()))
            .with_duration(Duration::from_millis(5));
        assert_eq!(result.cwd.as_deref(), Some("/tmp"));
        assert_eq!(result.duration, Duration::from_millis(5));
    }
}
