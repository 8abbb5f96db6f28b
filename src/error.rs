//! Error types for remote-shell.

use std::time::Duration;

use thiserror::Error;

/// Main error type for remote-shell operations.
#[derive(Error, Debug)]
pub enum RemoteShellError {
    /// The ssh client could not be started or exited before producing output.
    #[error("connection to {target} failed: {message}{}", exit_suffix(.exit_code))]
    ConnectionFailure {
        target: String,
        message: String,
        exit_code: Option<i32>,
    },

    /// A command was attempted while the session is not connected.
    #[error("no active session")]
    NoActiveSession,

    /// The completion sentinel was not observed before the deadline.
    #[error("command `{command}` timed out after {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    /// The remote path does not exist (or is not a directory).
    #[error("remote path not found: {path}")]
    RemoteNotFound { path: String },

    /// Process-level failure: spawn error, crash while a command was running.
    #[error("process error during {context}: {message}{}", exit_suffix(.exit_code))]
    ProcessError {
        context: String,
        message: String,
        exit_code: Option<i32>,
    },

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: crate::session::SessionState,
        to: crate::session::SessionState,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" (exit code {})", code),
        None => String::new(),
    }
}

impl RemoteShellError {
    pub(crate) fn process(
        context: impl Into<String>,
        message: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::ProcessError {
            context: context.into(),
            message: message.into(),
            exit_code,
        }
    }
}

/// Convenience Result type for remote-shell operations.
pub type Result<T> = std::result::Result<T, RemoteShellError>;
