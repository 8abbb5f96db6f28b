//! Pipe-backed transport using `tokio::process`.

use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{
    Input, Killer, ProcessExit, SshCommand, TransportEvent, TransportProcess, PUMP_DRAIN_TIMEOUT,
    READ_BUFFER_SIZE,
};
use crate::error::RemoteShellError;
use crate::Result;

pub(super) fn spawn(command: &SshCommand) -> Result<TransportProcess> {
    let mut cmd = command.to_tokio_command();
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        RemoteShellError::process(format!("spawn `{}`", command.program), e.to_string(), None)
    })?;

    let pid = child.id();
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| RemoteShellError::process("spawn", "child has no stdin", None))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| RemoteShellError::process("spawn", "child has no stdout", None))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| RemoteShellError::process("spawn", "child has no stderr", None))?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (exit_tx, exit_rx) = watch::channel(None);
    let (kill_tx, kill_rx) = oneshot::channel();

    let pumps = [
        tokio::spawn(pump(stdout, events_tx.clone(), TransportEvent::Stdout)),
        tokio::spawn(pump(stderr, events_tx.clone(), TransportEvent::Stderr)),
    ];
    tokio::spawn(supervise(child, kill_rx, pumps, events_tx, exit_tx));

    Ok(TransportProcess {
        input: Input::Pipe(stdin),
        events: events_rx,
        exit: exit_rx,
        killer: Killer::Pipe(Some(kill_tx)),
        pid,
        _keepalive: None,
    })
}

/// Forward one stream into the event channel until EOF.
async fn pump<R>(
    mut reader: R,
    tx: mpsc::UnboundedSender<TransportEvent>,
    wrap: fn(Vec<u8>) -> TransportEvent,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("transport pump: EOF");
                break;
            }
            Ok(n) => {
                trace!("transport pump: read {} bytes", n);
                if tx.send(wrap(buf[..n].to_vec())).is_err() {
                    debug!("transport pump: channel closed");
                    break;
                }
            }
            Err(e) => {
                debug!("transport pump: read error: {}", e);
                break;
            }
        }
    }
}

/// Wait for exit (or a kill request), let the pumps flush, then publish.
async fn supervise(
    mut child: Child,
    mut kill_rx: oneshot::Receiver<()>,
    pumps: [JoinHandle<()>; 2],
    events: mpsc::UnboundedSender<TransportEvent>,
    exit_tx: watch::Sender<Option<ProcessExit>>,
) {
    // A dropped sender also lands in the kill branch.
    let status = tokio::select! {
        status = child.wait() => status,
        _ = &mut kill_rx => {
            if let Err(e) = child.start_kill() {
                warn!("failed to kill transport process: {}", e);
            }
            child.wait().await
        }
    };

    for pump in pumps {
        if tokio::time::timeout(PUMP_DRAIN_TIMEOUT, pump).await.is_err() {
            debug!("transport pump still running after exit; abandoning it");
        }
    }

    let exit = match status {
        Ok(status) => ProcessExit {
            code: status.code(),
        },
        Err(e) => {
            warn!("failed to collect transport exit status: {}", e);
            ProcessExit { code: None }
        }
    };
    debug!("transport exited: {:?}", exit.code);

    exit_tx.send_replace(Some(exit));
    let _ = events.send(TransportEvent::Exited(exit));
}
