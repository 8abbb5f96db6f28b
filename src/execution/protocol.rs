//! Sentinel-delimited command execution over a persistent shell.

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, trace, warn};

use super::sentinel::{strip_all_sentinels, Sentinel};
use crate::error::RemoteShellError;
use crate::output::StreamSanitizer;
use crate::transport::{ProcessExit, TransportEvent, TransportProcess};
use crate::Result;

/// Output of one completed command, before session bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

/// A live transport plus the protocol state carried between commands.
///
/// Commands are strictly sequential: the owner must hold exclusive access
/// for the whole of [`run`](Self::run).
pub struct ShellChannel {
    transport: TransportProcess,
    generation: u64,
    /// Sentinels of commands that timed out; their late output is cut from
    /// whatever command reads it.
    abandoned: Vec<Sentinel>,
}

impl ShellChannel {
    /// Wrap a connected transport.
    pub fn new(transport: TransportProcess, generation: u64) -> Self {
        Self {
            transport,
            generation,
            abandoned: Vec::new(),
        }
    }

    /// Identifies which connect produced this channel.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The underlying transport.
    pub fn transport(&self) -> &TransportProcess {
        &self.transport
    }

    /// The underlying transport, mutably.
    pub fn transport_mut(&mut self) -> &mut TransportProcess {
        &mut self.transport
    }

    /// Subscribe to the transport's exit notification.
    pub fn exit_watch(&self) -> watch::Receiver<Option<ProcessExit>> {
        self.transport.exit_watch()
    }

    /// Number of timed-out commands whose completion has not been seen.
    pub fn abandoned_count(&self) -> usize {
        self.abandoned.len()
    }

    /// Drain output that arrived while no command was running.
    ///
    /// Returns the sanitized text (both streams) so callers can log banners.
    pub fn discard_pending(&mut self) -> String {
        let mut text = StreamSanitizer::new();
        while let Some(event) = self.transport.try_next_event() {
            match event {
                TransportEvent::Stdout(bytes) | TransportEvent::Stderr(bytes) => text.feed(&bytes),
                TransportEvent::Exited(_) => break,
            }
        }
        let text = text.into_string();
        self.abandoned
            .retain(|sentinel| sentinel.find_completion(&text).is_none());
        text
    }

    /// Send `command`, then wait for its sentinel or the deadline.
    ///
    /// On timeout the command keeps running remotely; its sentinel is
    /// remembered so the late output cannot leak into a later result.
    pub async fn run(&mut self, command: &str, timeout: Duration) -> Result<Completion> {
        let idle = self.discard_pending();
        if !idle.trim().is_empty() {
            debug!("discarded {} bytes of idle output", idle.len());
        }

        let sentinel = Sentinel::new();
        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + timeout;
        trace!("running `{}` with sentinel {}", command, sentinel.token());

        let script = format!("{}\n{}\n", command, sentinel.echo_command());
        if let Err(e) = self.transport.write(script.as_bytes()).await {
            let exit_code = self.transport.exit_status().and_then(|exit| exit.code);
            return Err(RemoteShellError::process(
                format!("sending `{}`", command),
                e.to_string(),
                exit_code,
            ));
        }

        let mut stdout = StreamSanitizer::new();
        let mut stderr = StreamSanitizer::new();

        loop {
            if let Some(done) = self.try_complete(&sentinel, &mut stdout, &mut stderr, start) {
                return Ok(done);
            }

            let event = match tokio::time::timeout_at(deadline, self.transport.next_event()).await
            {
                Ok(event) => event,
                Err(_) => {
                    warn!("command `{}` timed out after {:?}", command, timeout);
                    self.abandoned.push(sentinel);
                    return Err(RemoteShellError::CommandTimeout {
                        command: command.to_string(),
                        timeout,
                    });
                }
            };

            match event {
                Some(TransportEvent::Stdout(bytes)) => stdout.feed(&bytes),
                Some(TransportEvent::Stderr(bytes)) => stderr.feed(&bytes),
                Some(TransportEvent::Exited(exit)) => {
                    return self.finish_after_exit(command, &sentinel, stdout, stderr, start, exit)
                }
                None => {
                    let exit = self
                        .transport
                        .exit_status()
                        .unwrap_or(ProcessExit { code: None });
                    return self.finish_after_exit(command, &sentinel, stdout, stderr, start, exit);
                }
            }
        }
    }

    /// The process died mid-command. Output already buffered may still hold
    /// the sentinel; otherwise the command is lost.
    fn finish_after_exit(
        &mut self,
        command: &str,
        sentinel: &Sentinel,
        mut stdout: StreamSanitizer,
        mut stderr: StreamSanitizer,
        start: Instant,
        exit: ProcessExit,
    ) -> Result<Completion> {
        while let Some(event) = self.transport.try_next_event() {
            match event {
                TransportEvent::Stdout(bytes) => stdout.feed(&bytes),
                TransportEvent::Stderr(bytes) => stderr.feed(&bytes),
                TransportEvent::Exited(_) => {}
            }
        }

        if let Some(done) = self.try_complete(sentinel, &mut stdout, &mut stderr, start) {
            return Ok(done);
        }

        warn!(
            "remote shell exited ({:?}) while `{}` was running",
            exit.code, command
        );
        Err(RemoteShellError::process(
            format!("command `{}`", command),
            "remote shell exited before the command completed",
            exit.code,
        ))
    }

    fn try_complete(
        &mut self,
        sentinel: &Sentinel,
        stdout: &mut StreamSanitizer,
        stderr: &mut StreamSanitizer,
        start: Instant,
    ) -> Option<Completion> {
        self.cut_abandoned(stdout);

        let found = sentinel.find_completion(stdout.text())?;

        // stderr is pumped separately and may trail the sentinel slightly.
        while let Some(event) = self.transport.try_next_event() {
            match event {
                TransportEvent::Stderr(bytes) => stderr.feed(&bytes),
                TransportEvent::Stdout(bytes) => {
                    trace!("dropping {} bytes received after the sentinel", bytes.len())
                }
                TransportEvent::Exited(_) => {}
            }
        }

        let output = strip_all_sentinels(&stdout.text()[..found.start]);

        Some(Completion {
            stdout: output.trim().to_string(),
            stderr: strip_all_sentinels(stderr.text()).trim().to_string(),
            exit_code: found.exit_code,
            duration: start.elapsed(),
        })
    }

    /// Cut everything up to and including the completion line of any
    /// abandoned sentinel.
    fn cut_abandoned(&mut self, stdout: &mut StreamSanitizer) {
        let mut index = 0;
        while index < self.abandoned.len() {
            match self.abandoned[index].find_completion(stdout.text()) {
                Some(found) => {
                    debug!(
                        "dropping late output of timed-out command ({})",
                        self.abandoned[index].token()
                    );
                    stdout.discard_prefix(found.end);
                    self.abandoned.remove(index);
                }
                None => index += 1,
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::transport::{SshCommand, TransportKind};

    fn local_shell() -> ShellChannel {
        let transport = TransportProcess::spawn(
            &SshCommand::raw("/bin/sh", Vec::<String>::new()),
            TransportKind::Pipes,
        )
        .unwrap();
        ShellChannel::new(transport, 1)
    }

    #[tokio::test]
    async fn test_run_captures_output_and_status() {
        let mut channel = local_shell();
        let done = channel
            .run("echo hello; echo world", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(done.stdout, "hello\nworld");
        assert_eq!(done.exit_code, 0);

        let done = channel
            .run("ls /definitely/not/here 2>/dev/null", Duration::from_secs(5))
            .await
            .unwrap();
        assert_ne!(done.exit_code, 0);
        assert!(done.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_output_without_trailing_newline() {
        let mut channel = local_shell();
        let done = channel
            .run("printf abc", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(done.stdout, "abc");
    }

    #[tokio::test]
    async fn test_timeout_then_next_command_is_clean() {
        let mut channel = local_shell();
        let err = channel
            .run("sleep 1; echo late", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteShellError::CommandTimeout { .. }));
        assert_eq!(channel.abandoned_count(), 1);

        let done = channel
            .run("echo fresh", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(done.stdout, "fresh");
        assert_eq!(channel.abandoned_count(), 0);
    }

    #[tokio::test]
    async fn test_exit_mid_command_is_process_error() {
        let mut channel = local_shell();
        let err = channel
            .run("exit 7", Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            RemoteShellError::ProcessError { exit_code, .. } => assert_eq!(exit_code, Some(7)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_idle_output_is_discarded() {
        let mut channel = local_shell();
        channel
            .run("(sleep 0.2; echo stray) &", Duration::from_secs(5))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let done = channel
            .run("echo mine", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(done.stdout, "mine");
    }
}
