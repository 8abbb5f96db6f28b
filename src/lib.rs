//! # remote-shell
//!
//! Persistent remote shell sessions over the system `ssh` client.
//!
//! This crate keeps one long-lived shell per host, runs commands through it
//! one at a time and tells where each command's output ends by echoing a
//! unique completion marker with the exit status. On top of that it offers
//! one-shot execution, connection probes and a lazily cached browser for
//! remote directories.
//!
//! ## Features
//!
//! - **Persistent sessions**: connect once, run many commands, keep `cd`
//! - **Completion sentinels**: exact output and exit status per command
//! - **Failure tracking**: transport death moves the session to `Error`
//! - **Directory browser**: a few levels fetched at a time, cached
//!
//! ## Quick Start
//!
//! ```no_run
//! use remote_shell::{HostRecord, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> remote_shell::Result<()> {
//!     // Initialize logging
//!     remote_shell::logging::try_init().ok();
//!
//!     let host = HostRecord::new("alice", "files.internal");
//!     let session = Session::new(host, SessionConfig::default());
//!     session.connect().await?;
//!
//!     session.execute_command("cd /srv").await?;
//!     let result = session.execute_command("ls").await?;
//!     println!("{} (exit {:?})", result.stdout, result.exit_code);
//!
//!     session.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod logging;
pub mod output;
pub mod remote_path;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use browser::{DirectoryBrowser, DirectoryCache, DirectoryNode};
pub use error::{RemoteShellError, Result};
pub use execution::{CommandResult, OneShotExecutor, RemoteShell};
pub use output::OutputSanitizer;
pub use session::{
    HostRecord, Session, SessionConfig, SessionContext, SessionRegistry, SessionState,
};
pub use transport::{SshCommand, TransportKind, TransportProcess};
