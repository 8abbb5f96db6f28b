//! PTY-backed transport using portable-pty.
//!
//! portable-pty only offers blocking handles, so the reader and writer run on
//! blocking threads and talk to the async side through channels.

use std::io::{Read, Write};

use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, trace};

use super::{
    Input, Killer, ProcessExit, SshCommand, TransportEvent, TransportProcess, PUMP_DRAIN_TIMEOUT,
    READ_BUFFER_SIZE,
};
use crate::error::RemoteShellError;
use crate::Result;

/// Wide enough that long listing lines are not wrapped by the terminal.
const PTY_SIZE: PtySize = PtySize {
    rows: 24,
    cols: 512,
    pixel_width: 0,
    pixel_height: 0,
};

fn pty_error(context: &str, e: impl std::fmt::Display) -> RemoteShellError {
    RemoteShellError::process(context, e.to_string(), None)
}

pub(super) fn spawn(command: &SshCommand) -> Result<TransportProcess> {
    let pair = native_pty_system()
        .openpty(PTY_SIZE)
        .map_err(|e| pty_error("open pty", e))?;

    let mut builder = CommandBuilder::new(&command.program);
    builder.args(command.args());

    let mut child = pair
        .slave
        .spawn_command(builder)
        .map_err(|e| pty_error(&format!("spawn `{}`", command.program), e))?;
    // Only the child may hold the slave, otherwise EOF never arrives.
    drop(pair.slave);

    let pid = child.process_id();
    let killer = child.clone_killer();
    let reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| pty_error("clone pty reader", e))?;
    let writer = pair
        .master
        .take_writer()
        .map_err(|e| pty_error("take pty writer", e))?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let (exit_tx, exit_rx) = watch::channel(None);

    let reader_events = events_tx.clone();
    let reader_task = tokio::task::spawn_blocking(move || read_loop(reader, reader_events));
    tokio::task::spawn_blocking(move || write_loop(writer, input_rx));

    tokio::spawn(async move {
        let status = tokio::task::spawn_blocking(move || child.wait()).await;
        let exit = match status {
            Ok(Ok(status)) => ProcessExit {
                code: Some(status.exit_code() as i32),
            },
            Ok(Err(e)) => {
                error!("failed to wait for pty child: {}", e);
                ProcessExit { code: None }
            }
            Err(e) => {
                error!("pty wait task panicked: {}", e);
                ProcessExit { code: None }
            }
        };
        if tokio::time::timeout(PUMP_DRAIN_TIMEOUT, reader_task)
            .await
            .is_err()
        {
            debug!("pty reader still blocked after exit; abandoning it");
        }
        debug!("pty transport exited: {:?}", exit.code);
        exit_tx.send_replace(Some(exit));
        let _ = events_tx.send(TransportEvent::Exited(exit));
    });

    Ok(TransportProcess {
        input: Input::Pty(input_tx),
        events: events_rx,
        exit: exit_rx,
        killer: Killer::Pty(killer),
        pid,
        _keepalive: Some(Box::new(pair.master)),
    })
}

fn read_loop(mut reader: Box<dyn Read + Send>, tx: mpsc::UnboundedSender<TransportEvent>) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                debug!("pty reader: EOF");
                break;
            }
            Ok(n) => {
                trace!("pty reader: read {} bytes", n);
                if tx.send(TransportEvent::Stdout(buf[..n].to_vec())).is_err() {
                    debug!("pty reader: channel closed");
                    break;
                }
            }
            Err(e) => {
                // EIO on Unix means the slave side was closed
                #[cfg(unix)]
                if e.raw_os_error() == Some(libc::EIO) {
                    debug!("pty reader: pty closed (EIO)");
                    break;
                }
                if e.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                error!("pty reader error: {}", e);
                break;
            }
        }
    }
}

fn write_loop(mut writer: Box<dyn Write + Send>, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(data) = rx.blocking_recv() {
        trace!("pty writer: writing {} bytes", data.len());
        if let Err(e) = writer.write_all(&data).and_then(|_| writer.flush()) {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                debug!("pty writer: broken pipe");
            } else {
                error!("pty writer error: {}", e);
            }
            break;
        }
    }
    debug!("pty writer: channel closed");
}
