//! Session management module.
//!
//! A [`Session`] owns one persistent remote shell for one [`HostRecord`]:
//! it connects, queues commands through the sentinel protocol, tracks the
//! working directory and reflects transport death in its [`SessionState`].

mod context;
mod host;
mod lifecycle;
mod registry;
mod state;

pub use context::{directory_change, parse_cwd, DirectoryChange, SessionContext};
pub use host::{ConnectionStatus, HostRecord, SaveHook};
pub use lifecycle::{Session, SessionConfig, DEFAULT_COMMAND_TIMEOUT};
pub use registry::SessionRegistry;
pub use state::SessionState;
