//! Command execution against a remote shell.
//!
//! This module provides:
//! - the completion-sentinel protocol used over a persistent shell
//! - one-shot execution through a fresh ssh process per command
//! - connection probes
//!
//! # Example
//!
//! ```no_run
//! use remote_shell::execution::RemoteShell;
//! use remote_shell::session::{HostRecord, Session, SessionConfig};
//!
//! # async fn demo() -> remote_shell::Result<()> {
//! let session = Session::new(HostRecord::new("alice", "files.internal"), SessionConfig::default());
//! session.connect().await?;
//! let result = session.run("ls -la").await?;
//! println!("{}", result.stdout);
//! session.disconnect().await?;
//! # Ok(())
//! # }
//! ```

mod oneshot;
mod protocol;
mod result;
mod sentinel;

pub use oneshot::{
    check_connection, check_connection_interactive, ConnectionCheck, OneShotExecutor,
    DEFAULT_ONESHOT_TIMEOUT, SSH_FAILURE_EXIT,
};
pub use protocol::{Completion, ShellChannel};
pub use result::CommandResult;
pub use sentinel::{Sentinel, SentinelMatch, SENTINEL_PREFIX};

use async_trait::async_trait;

use crate::Result;

/// Anything that can run a shell command on the remote host.
///
/// The directory browser only needs this, so it works the same over a
/// persistent [`Session`](crate::session::Session) or a
/// [`OneShotExecutor`].
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run `command` and collect its output.
    async fn run(&self, command: &str) -> Result<CommandResult>;
}

#[async_trait]
impl<T: RemoteShell + ?Sized> RemoteShell for std::sync::Arc<T> {
    async fn run(&self, command: &str) -> Result<CommandResult> {
        (**self).run(command).await
    }
}
