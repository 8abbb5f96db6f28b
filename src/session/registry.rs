//! Registry of live sessions, one per host.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::warn;

use super::host::{HostRecord, SaveHook};
use super::lifecycle::{Session, SessionConfig};
use crate::error::RemoteShellError;
use crate::Result;

/// Thread-safe map from host name to its session.
///
/// Asking twice for the same host returns the same [`Session`], so every
/// caller shares one transport and one command queue.
pub struct SessionRegistry {
    config: SessionConfig,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    /// Create an empty registry; new sessions use `config`.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// The session for `record.name`, created on first use.
    ///
    /// `save_hook` is attached only when the session is created.
    pub fn session_for(
        &self,
        record: HostRecord,
        save_hook: Option<SaveHook>,
    ) -> Result<Arc<Session>> {
        let key = registry_key(&record);

        {
            let sessions = self
                .sessions
                .read()
                .map_err(|_| RemoteShellError::LockPoisoned)?;
            if let Some(session) = sessions.get(&key) {
                return Ok(Arc::clone(session));
            }
        }

        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| RemoteShellError::LockPoisoned)?;

        let session = sessions.entry(key).or_insert_with(|| {
            let mut session = Session::new(record, self.config.clone());
            if let Some(hook) = save_hook {
                session = session.with_save_hook(hook);
            }
            Arc::new(session)
        });
        Ok(Arc::clone(session))
    }

    /// Get the session registered under `name`.
    pub fn get(&self, name: &str) -> Result<Option<Arc<Session>>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| RemoteShellError::LockPoisoned)?;
        Ok(sessions.get(name).cloned())
    }

    /// Check if a session exists.
    pub fn contains(&self, name: &str) -> Result<bool> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| RemoteShellError::LockPoisoned)?;
        Ok(sessions.contains_key(name))
    }

    /// Remove a session from the registry.
    ///
    /// The session itself keeps running until disconnected or dropped.
    pub fn remove(&self, name: &str) -> Result<Option<Arc<Session>>> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| RemoteShellError::LockPoisoned)?;
        Ok(sessions.remove(name))
    }

    /// Get the number of sessions in the registry.
    pub fn count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    /// List all registered host names.
    pub fn names(&self) -> Result<Vec<String>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| RemoteShellError::LockPoisoned)?;
        let mut names: Vec<String> = sessions.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Disconnect every session. Failures are logged, not returned.
    pub async fn disconnect_all(&self) -> Result<()> {
        let sessions: Vec<Arc<Session>> = {
            let sessions = self
                .sessions
                .read()
                .map_err(|_| RemoteShellError::LockPoisoned)?;
            sessions.values().cloned().collect()
        };

        for session in sessions {
            if let Err(e) = session.disconnect().await {
                warn!("disconnect failed: {}", e);
            }
        }
        Ok(())
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

fn registry_key(record: &HostRecord) -> String {
    if record.name.is_empty() {
        record.target()
    } else {
        record.name.clone()
    }
}
