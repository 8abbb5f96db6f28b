//! One-shot execution: a fresh ssh process per command.

use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{CommandResult, RemoteShell};
use crate::error::RemoteShellError;
use crate::output::OutputSanitizer;
use crate::remote_path::shell_quote;
use crate::session::{directory_change, DirectoryChange};
use crate::transport::SshCommand;
use crate::Result;

/// ssh reserves 255 for its own failures (unreachable, auth, ...).
pub const SSH_FAILURE_EXIT: i32 = 255;

/// Printed by the interactive probe once login succeeded.
pub const INTERACTIVE_PROBE_MESSAGE: &str = "SSH connection established successfully";

/// Default one-shot timeout.
pub const DEFAULT_ONESHOT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs every command in its own ssh process.
///
/// Nothing persists between commands except a locally tracked working
/// directory, which is re-entered with a `cd` prefix each time.
pub struct OneShotExecutor {
    base: SshCommand,
    timeout: Duration,
    cwd: Mutex<Option<String>>,
}

impl OneShotExecutor {
    /// Create an executor around `base` (no remote command set).
    pub fn new(base: SshCommand) -> Self {
        Self {
            base,
            timeout: DEFAULT_ONESHOT_TIMEOUT,
            cwd: Mutex::new(None),
        }
    }

    /// Set the per-command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Start in `cwd`.
    pub fn with_cwd(self, cwd: impl Into<String>) -> Self {
        if let Ok(mut current) = self.cwd.lock() {
            *current = Some(cwd.into());
        }
        self
    }

    /// Tracked working directory.
    pub fn cwd(&self) -> Option<String> {
        self.cwd.lock().ok().and_then(|cwd| cwd.clone())
    }

    /// Run `command` remotely in a fresh process.
    pub async fn execute(&self, command: &str) -> Result<CommandResult> {
        let cwd = self.cwd();
        let remote = match cwd {
            Some(ref dir) => format!("cd {} && {}", shell_quote(dir), command),
            None => command.to_string(),
        };

        let invocation = self.base.clone().tty(false).remote_command(remote);
        let mut process = invocation.to_tokio_command();
        process
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("one-shot: {}", invocation.display());
        let start = Instant::now();
        let output = match tokio::time::timeout(self.timeout, process.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(RemoteShellError::process(
                    format!("spawn `{}`", invocation.program),
                    e.to_string(),
                    None,
                ))
            }
            Err(_) => {
                warn!("one-shot `{}` timed out after {:?}", command, self.timeout);
                return Err(RemoteShellError::CommandTimeout {
                    command: command.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        let exit_code = output.status.code();
        let stdout = OutputSanitizer::strip_ansi(&output.stdout).trim().to_string();
        let stderr = OutputSanitizer::strip_ansi(&output.stderr).trim().to_string();

        if exit_code == Some(SSH_FAILURE_EXIT) {
            return Err(RemoteShellError::ConnectionFailure {
                target: self.base.target(),
                message: stderr,
                exit_code,
            });
        }

        let cwd = if exit_code == Some(0) {
            let next = match directory_change(cwd.as_deref(), command) {
                DirectoryChange::Set(dir) => Some(dir),
                DirectoryChange::Unknown => None,
                DirectoryChange::None => cwd,
            };
            if let Ok(mut current) = self.cwd.lock() {
                *current = next.clone();
            }
            next
        } else {
            cwd
        };

        Ok(CommandResult::new(command, stdout, stderr, exit_code)
            .with_cwd(cwd)
            .with_duration(start.elapsed()))
    }
}

#[async_trait]
impl RemoteShell for OneShotExecutor {
    async fn run(&self, command: &str) -> Result<CommandResult> {
        self.execute(command).await
    }
}

/// Outcome of a non-interactive connection probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCheck {
    /// Key-based login works.
    Reachable,
    /// The server wants a password, passphrase or host-key confirmation.
    NeedsInteraction { stderr: String },
    /// Anything else.
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },
}

/// Probe `base` with `BatchMode=yes`, running `exit` remotely.
pub async fn check_connection(base: &SshCommand, timeout: Duration) -> Result<ConnectionCheck> {
    let probe = base
        .clone()
        .batch_mode(true)
        .tty(false)
        .remote_command("exit");
    let mut process = probe.to_tokio_command();
    process
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, process.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(RemoteShellError::process(
                format!("spawn `{}`", probe.program),
                e.to_string(),
                None,
            ))
        }
        Err(_) => {
            return Ok(ConnectionCheck::Failed {
                exit_code: None,
                stderr: format!("no answer within {:?}", timeout),
            })
        }
    };

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let check = if output.status.success() {
        ConnectionCheck::Reachable
    } else if needs_interaction(&stderr) {
        ConnectionCheck::NeedsInteraction { stderr }
    } else {
        ConnectionCheck::Failed {
            exit_code: output.status.code(),
            stderr,
        }
    };
    info!("connection check for {}: {:?}", base.target(), check);
    Ok(check)
}

/// Log in with the terminal attached so the user can answer password or
/// host-key prompts. Returns whether the login succeeded.
pub async fn check_connection_interactive(base: &SshCommand) -> Result<bool> {
    let probe = base
        .clone()
        .batch_mode(false)
        .tty(false)
        .remote_command(format!("echo \"{}\"", INTERACTIVE_PROBE_MESSAGE));
    let mut process = probe.to_tokio_command();
    process
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    info!("interactive connection check for {}", base.target());
    let status = process.status().await.map_err(|e| {
        RemoteShellError::process(format!("spawn `{}`", probe.program), e.to_string(), None)
    })?;
    Ok(status.success())
}

fn needs_interaction(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    [
        "are you sure you want to continue connecting",
        "authenticity",
        "host key verification failed",
        "permission denied",
        "password",
        "passphrase",
    ]
        .iter()
        .any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_interaction() {
        assert!(needs_interaction(
            "alice@h: Permission denied (publickey,password)."
        ));
        assert!(needs_interaction("Host key verification failed."));
        assert!(needs_interaction(
            "The authenticity of host 'h (10.0.0.1)' can't be established.\n\
             Are you sure you want to continue connecting (yes/no/[fingerprint])?"
        ));
        assert!(!needs_interaction(
            "ssh: Could not resolve hostname nowhere: Name or service not known"
        ));
    }

    #[cfg(unix)]
    fn local() -> OneShotExecutor {
        OneShotExecutor::new(SshCommand::raw("/bin/sh", ["-c"]))
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_captures_streams() {
        let result = local().execute("echo out; echo err >&2").await.unwrap();
        assert!(result.succeeded);
        assert_eq!(result.stdout, "out");
        assert_eq!(result.stderr, "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_tracks_cd() {
        let executor = local();
        executor.execute("cd /tmp").await.unwrap();
        assert_eq!(executor.cwd().as_deref(), Some("/tmp"));

        let result = executor.execute("pwd").await.unwrap();
        assert_eq!(result.stdout, "/tmp");

        executor.execute("cd ..").await.unwrap();
        let result = executor.execute("pwd").await.unwrap();
        assert_eq!(result.stdout, "/");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_cd_keeps_cwd() {
        let executor = local().with_cwd("/tmp");
        let result = executor.execute("cd /definitely/not/here").await.unwrap();
        assert!(!result.succeeded);
        assert_eq!(executor.cwd().as_deref(), Some("/tmp"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_255_is_connection_failure() {
        let err = local().execute("echo nope >&2; exit 255").await.unwrap_err();
        match err {
            RemoteShellError::ConnectionFailure {
                message, exit_code, ..
            } => {
                assert_eq!(message, "nope");
                assert_eq!(exit_code, Some(255));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_check_connection_outcomes() {
        let timeout = Duration::from_secs(5);

        let check = check_connection(&SshCommand::raw("/bin/sh", ["-c"]), timeout)
            .await
            .unwrap();
        assert_eq!(check, ConnectionCheck::Reachable);

        let unknown_host = SshCommand::raw(
            "/bin/sh",
            [
                "-c",
                "echo 'Are you sure you want to continue connecting (yes/no)?' >&2; exit 255",
                "fake-ssh",
            ],
        );
        let check = check_connection(&unknown_host, timeout).await.unwrap();
        assert!(matches!(check, ConnectionCheck::NeedsInteraction { .. }));

        let unreachable = SshCommand::raw(
            "/bin/sh",
            ["-c", "echo 'Connection refused' >&2; exit 255", "fake-ssh"],
        );
        match check_connection(&unreachable, timeout).await.unwrap() {
            ConnectionCheck::Failed { exit_code, stderr } => {
                assert_eq!(exit_code, Some(255));
                assert_eq!(stderr, "Connection refused");
            }
            other => panic!("unexpected check: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_check_connection_interactive() {
        // the remote command lands in `sh -c` and must print the probe message
        let login = SshCommand::raw("/bin/sh", ["-c"]);
        assert!(check_connection_interactive(&login).await.unwrap());

        let rejected = SshCommand::raw("/bin/sh", ["-c", "exit 255", "fake-ssh"]);
        assert!(!check_connection_interactive(&rejected).await.unwrap());

        let missing = SshCommand::raw("/definitely/not/ssh", Vec::<String>::new());
        let err = check_connection_interactive(&missing).await.unwrap_err();
        assert!(matches!(err, RemoteShellError::ProcessError { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() {
        let executor = local().with_timeout(Duration::from_millis(100));
        let err = executor.execute("sleep 5").await.unwrap_err();
        assert!(matches!(err, RemoteShellError::CommandTimeout { .. }));
    }
}
