//! Transport process handle.
//!
//! A [`TransportProcess`] owns exactly one spawned ssh client together with
//! its byte streams. Output is pumped by background tasks into a single
//! event channel; a supervisor task publishes the exit status once the
//! process is gone. Dropping the handle kills the process, which in turn ends
//! every pump task, so no stream listener outlives its owner.
//!
//! Two backends exist:
//!
//! - [`TransportKind::Pipes`]: plain pipes via `tokio::process`; stdout and
//!   stderr arrive separately.
//! - [`TransportKind::Pty`]: the client runs inside a local pseudo-terminal
//!   (`portable-pty`), for setups that insist on a controlling terminal.
//!   stdout and stderr arrive combined as [`TransportEvent::Stdout`].

mod pipes;
mod pty;
mod ssh;

pub use ssh::{SshCommand, DEFAULT_PORT};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, trace};

use crate::error::RemoteShellError;
use crate::Result;

/// Read buffer size for the stream pumps.
const READ_BUFFER_SIZE: usize = 4096;

/// How long the supervisor waits for pumps to flush after the process exited.
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Which local plumbing carries the ssh client's streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Separate stdin/stdout/stderr pipes.
    #[default]
    Pipes,
    /// A local pseudo-terminal (combined output).
    Pty,
}

/// Exit information for a finished transport process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, or `None` if the process was killed by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    /// Whether the process exited cleanly with status 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Something observed on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Bytes read from standard output.
    Stdout(Vec<u8>),
    /// Bytes read from standard error.
    Stderr(Vec<u8>),
    /// The process exited; always the last event.
    Exited(ProcessExit),
}

enum Input {
    Pipe(tokio::process::ChildStdin),
    Pty(mpsc::UnboundedSender<Vec<u8>>),
}

enum Killer {
    Pipe(Option<oneshot::Sender<()>>),
    Pty(Box<dyn portable_pty::ChildKiller + Send + Sync>),
}

/// Handle to one spawned remote-shell client process.
pub struct TransportProcess {
    input: Input,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    exit: watch::Receiver<Option<ProcessExit>>,
    killer: Killer,
    pid: Option<u32>,
    /// Keeps the PTY master open for the lifetime of the handle.
    _keepalive: Option<Box<dyn std::any::Any + Send>>,
}

impl TransportProcess {
    /// Spawn the client described by `command` on the chosen backend.
    pub fn spawn(command: &SshCommand, kind: TransportKind) -> Result<Self> {
        debug!("spawning transport ({:?}): {}", kind, command.display());
        match kind {
            TransportKind::Pipes => pipes::spawn(command),
            TransportKind::Pty => pty::spawn(command),
        }
    }

    /// Process ID of the client, if the OS reported one.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Write raw bytes to the client's stdin.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        trace!("transport write: {} bytes", bytes.len());
        match &mut self.input {
            Input::Pipe(stdin) => {
                use tokio::io::AsyncWriteExt;
                stdin.write_all(bytes).await?;
                stdin.flush().await?;
                Ok(())
            }
            Input::Pty(tx) => tx.send(bytes.to_vec()).map_err(|_| {
                RemoteShellError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "pty writer closed",
                ))
            }),
        }
    }

    /// Write a line followed by `\n`.
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        self.write(format!("{}\n", line).as_bytes()).await
    }

    /// Wait for the next event. Returns `None` once the channel is drained
    /// after the process exited.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Take an already-buffered event without waiting.
    pub fn try_next_event(&mut self) -> Option<TransportEvent> {
        self.events.try_recv().ok()
    }

    /// Exit status, if the process has already exited.
    pub fn exit_status(&self) -> Option<ProcessExit> {
        *self.exit.borrow()
    }

    /// Whether the process has exited.
    pub fn has_exited(&self) -> bool {
        self.exit_status().is_some()
    }

    /// Subscribe to the exit notification.
    pub fn exit_watch(&self) -> watch::Receiver<Option<ProcessExit>> {
        self.exit.clone()
    }

    /// Wait up to `timeout` for the process to exit.
    pub async fn wait_exit(&mut self, timeout: Duration) -> Option<ProcessExit> {
        let mut exit = self.exit.clone();
        let status = match tokio::time::timeout(timeout, exit.wait_for(|e| e.is_some())).await {
            Ok(Ok(status)) => *status,
            _ => self.exit_status(),
        };
        status
    }

    /// Force-terminate the process. Safe to call repeatedly.
    pub fn kill(&mut self) {
        if self.has_exited() {
            return;
        }
        match &mut self.killer {
            Killer::Pipe(tx) => {
                if let Some(tx) = tx.take() {
                    debug!("transport: kill requested");
                    let _ = tx.send(());
                }
            }
            Killer::Pty(killer) => {
                debug!("transport: killing pty child");
                if let Err(e) = killer.kill() {
                    debug!("transport: pty kill failed: {}", e);
                }
            }
        }
    }
}

impl Drop for TransportProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> SshCommand {
        // The builder is only a program + argv here; no ssh involved.
        SshCommand::raw("/bin/sh", ["-c", script])
    }

    async fn collect_stdout(transport: &mut TransportProcess) -> (String, Option<ProcessExit>) {
        let mut out = Vec::new();
        let mut exit = None;
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_secs(5), transport.next_event()).await
        {
            match event {
                TransportEvent::Stdout(bytes) => out.extend(bytes),
                TransportEvent::Stderr(_) => {}
                TransportEvent::Exited(status) => exit = Some(status),
            }
        }
        (String::from_utf8_lossy(&out).into_owned(), exit)
    }

    #[tokio::test]
    async fn test_pipes_stdout_and_exit() {
        let mut transport =
            TransportProcess::spawn(&sh("echo hello; exit 3"), TransportKind::Pipes).unwrap();
        let (out, exit) = collect_stdout(&mut transport).await;
        assert_eq!(out, "hello\n");
        assert_eq!(exit, Some(ProcessExit { code: Some(3) }));
        assert!(transport.has_exited());
    }

    #[tokio::test]
    async fn test_pipes_separate_stderr() {
        let mut transport =
            TransportProcess::spawn(&sh("echo oops >&2"), TransportKind::Pipes).unwrap();
        let mut stderr = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_secs(5), transport.next_event()).await
        {
            if let TransportEvent::Stderr(bytes) = event {
                stderr.extend(bytes);
            }
        }
        assert_eq!(stderr, b"oops\n");
    }

    #[tokio::test]
    async fn test_pipes_write_line_roundtrip() {
        let mut transport = TransportProcess::spawn(
            &SshCommand::raw("/bin/sh", Vec::<String>::new()),
            TransportKind::Pipes,
        )
        .unwrap();
        transport.write_line("echo from-stdin").await.unwrap();
        transport.write_line("exit 0").await.unwrap();
        let (out, exit) = collect_stdout(&mut transport).await;
        assert!(out.contains("from-stdin"));
        assert!(exit.unwrap().success());
    }

    #[tokio::test]
    async fn test_kill_running_process() {
        let mut transport = TransportProcess::spawn(&sh("sleep 30"), TransportKind::Pipes).unwrap();
        assert!(transport.pid().is_some());
        assert!(transport.wait_exit(Duration::from_millis(50)).await.is_none());

        transport.kill();
        let exit = transport.wait_exit(Duration::from_secs(5)).await;
        assert!(exit.is_some());
        assert!(!exit.unwrap().success());
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_is_process_error() {
        let result = TransportProcess::spawn(
            &SshCommand::raw("/nonexistent/ssh-binary", Vec::<String>::new()),
            TransportKind::Pipes,
        );
        assert!(matches!(
            result,
            Err(RemoteShellError::ProcessError { .. })
        ));
    }
}
