//! Persisted host record.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::remote_path;
use crate::transport::DEFAULT_PORT;

/// Outcome of the most recent connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Never connected.
    #[default]
    Initial,
    /// Last attempt failed.
    Error,
    /// Last attempt succeeded.
    Success,
}

/// Everything needed to reach one remote host, plus what we learned the last
/// time we talked to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostRecord {
    /// Display name; defaults to `user@host`.
    pub name: String,
    pub username: String,
    pub host: String,
    pub port: u16,
    pub identity_file: Option<PathBuf>,
    /// Directory entered right after connecting.
    pub root_path: String,
    /// Working directory tracked at the last disconnect.
    pub current_dir: Option<String>,
    pub status: ConnectionStatus,
    /// Unix timestamp (seconds) of the last successful connect.
    pub last_connection_at: Option<u64>,
}

impl Default for HostRecord {
    fn default() -> Self {
        Self {
            name: String::new(),
            username: String::new(),
            host: String::new(),
            port: DEFAULT_PORT,
            identity_file: None,
            root_path: "/".to_string(),
            current_dir: None,
            status: ConnectionStatus::Initial,
            last_connection_at: None,
        }
    }
}

/// Callback invoked whenever a session updates its host record.
pub type SaveHook = Arc<dyn Fn(&HostRecord) + Send + Sync>;

impl HostRecord {
    /// Create a record for `username@host` with default settings.
    pub fn new(username: impl Into<String>, host: impl Into<String>) -> Self {
        let username = username.into();
        let host = host.into();
        let mut record = Self {
            username,
            host,
            ..Default::default()
        };
        record.name = record.target();
        record
    }

    /// Parse `[user@]host[:port]`.
    ///
    /// Returns `None` for an empty host or an unparsable port.
    pub fn parse_target(target: &str) -> Option<Self> {
        let (username, rest) = match target.rsplit_once('@') {
            Some((user, rest)) => (user, rest),
            None => ("", target),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => (host, Some(port.parse::<u16>().ok()?)),
            None => (rest, None),
        };

        if host.is_empty() {
            return None;
        }

        let mut record = Self::new(username, host);
        if let Some(port) = port {
            record.port = port;
        }
        Some(record)
    }

    /// `user@host`, or just the host when no user is set.
    pub fn target(&self) -> String {
        if self.username.is_empty() {
            self.host.clone()
        } else {
            format!("{}@{}", self.username, self.host)
        }
    }

    /// Root path in normalized form.
    pub fn root(&self) -> String {
        remote_path::normalize(&self.root_path)
    }

    /// Whether the session should `cd` somewhere after connecting.
    pub fn has_custom_root(&self) -> bool {
        !self.root_path.trim().is_empty() && self.root() != "/"
    }

    /// Record a successful connection at the current time.
    pub fn mark_connected(&mut self) {
        self.status = ConnectionStatus::Success;
        self.last_connection_at = Some(unix_now());
    }

    /// Record a failed connection attempt.
    pub fn mark_failed(&mut self) {
        self.status = ConnectionStatus::Error;
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_defaults() {
        let record = HostRecord::new("alice", "example.com");
        assert_eq!(record.name, "alice@example.com");
        assert_eq!(record.port, 22);
        assert_eq!(record.root_path, "/");
        assert_eq!(record.status, ConnectionStatus::Initial);
        assert!(!record.has_custom_root());
    }

    #[test]
    fn test_parse_target() {
        let record = HostRecord::parse_target("bob@files.internal:2222").unwrap();
        assert_eq!(record.username, "bob");
        assert_eq!(record.host, "files.internal");
        assert_eq!(record.port, 2222);

        let record = HostRecord::parse_target("bare-host").unwrap();
        assert_eq!(record.username, "");
        assert_eq!(record.target(), "bare-host");
        assert_eq!(record.port, 22);
    }

    #[test]
    fn test_parse_target_rejects_garbage() {
        assert!(HostRecord::parse_target("").is_none());
        assert!(HostRecord::parse_target("alice@").is_none());
        assert!(HostRecord::parse_target("host:notaport").is_none());
    }

    #[test]
    fn test_custom_root() {
        let mut record = HostRecord::new("alice", "h");
        record.root_path = "/srv/data/".to_string();
        assert!(record.has_custom_root());
        assert_eq!(record.root(), "/srv/data");
    }

    #[test]
    fn test_mark_connected() {
        let mut record = HostRecord::new("alice", "h");
        record.mark_failed();
        assert_eq!(record.status, ConnectionStatus::Error);
        record.mark_connected();
        assert_eq!(record.status, ConnectionStatus::Success);
        assert!(record.last_connection_at.is_some());
    }

    #[test]
    fn test_deserialize_partial() {
        let record: HostRecord =
            serde_json::from_str(r#"{"username": "dave", "host": "db1", "status": "success"}"#)
                .unwrap();
        assert_eq!(record.port, 22);
        assert_eq!(record.root_path, "/");
        assert_eq!(record.status, ConnectionStatus::Success);
    }
}
