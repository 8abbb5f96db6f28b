//! Configuration management for remote-shell.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::browser::DEFAULT_MAX_DEPTH;
use crate::cli::Args;
use crate::session::{HostRecord, SessionConfig};
use crate::transport::TransportKind;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ssh client settings.
    pub ssh: SshSection,
    /// Command execution settings.
    pub execution: ExecutionSection,
    /// Directory browser settings.
    pub browser: BrowserSection,
    /// Logging configuration.
    pub logging: LoggingSection,
    /// Host to connect to when none is given on the command line.
    pub host: Option<HostRecord>,
}

/// ssh client section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSection {
    /// Client binary.
    pub program: String,
    /// Local stream plumbing (`pipes` or `pty`).
    pub transport: TransportKind,
    /// Pass `-o BatchMode=yes`.
    pub batch_mode: bool,
    /// Extra client options.
    pub options: Vec<String>,
    /// Run `ssh-add <identity>` before connecting.
    pub load_agent: bool,
    /// Seconds to wait for the first output.
    pub connect_timeout_secs: u64,
}

impl Default for SshSection {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            transport: TransportKind::default(),
            batch_mode: true,
            options: Vec::new(),
            load_agent: false,
            connect_timeout_secs: 30,
        }
    }
}

/// Command execution section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    /// Per-command timeout in seconds.
    pub timeout_secs: u64,
    /// Disable echo and prompts after connecting.
    pub prepare_shell: bool,
    /// Milliseconds to let login banners arrive after the first output.
    pub settle_ms: u64,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            prepare_shell: true,
            settle_ms: 250,
        }
    }
}

/// Directory browser section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    /// Levels listed per fetch.
    pub max_depth: usize,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(program) = std::env::var("REMOTE_SHELL_SSH_PROGRAM") {
            if !program.is_empty() {
                self.ssh.program = program;
            }
        }

        if let Ok(timeout) = std::env::var("REMOTE_SHELL_TIMEOUT") {
            if let Ok(timeout) = timeout.parse() {
                self.execution.timeout_secs = timeout;
            }
        }

        if let Ok(depth) = std::env::var("REMOTE_SHELL_MAX_DEPTH") {
            if let Ok(depth) = depth.parse() {
                self.browser.max_depth = depth;
            }
        }

        if let Ok(level) = std::env::var("REMOTE_SHELL_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) -> Result<(), ConfigError> {
        if let Some(ref target) = args.target {
            let parsed = HostRecord::parse_target(target)
                .ok_or_else(|| ConfigError::InvalidTarget(target.clone()))?;
            // Keep remembered settings when the file already describes this host.
            let mut host = match self.host.take() {
                Some(existing)
                    if existing.host == parsed.host && existing.username == parsed.username =>
                {
                    existing
                }
                _ => parsed.clone(),
            };
            if target.contains(':') {
                host.port = parsed.port;
            }
            self.host = Some(host);
        }

        if let Some(ref mut host) = self.host {
            if let Some(port) = args.port {
                host.port = port;
            }
            if let Some(ref identity) = args.identity {
                host.identity_file = Some(identity.clone());
            }
            if let Some(ref root) = args.root {
                host.root_path = root.clone();
            }
        }

        if let Some(timeout) = args.timeout_secs {
            self.execution.timeout_secs = timeout;
        }

        if let Some(depth) = args.depth {
            self.browser.max_depth = depth;
        }

        if args.pty {
            self.ssh.transport = TransportKind::Pty;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }

        Ok(())
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        // Start with defaults
        let mut config = Config::default();

        // Load from config file if specified
        if let Some(ref path) = args.config {
            config = Config::from_file(path)?;
        }

        // Apply environment variable overrides
        config.apply_env();

        // Apply CLI argument overrides (highest priority)
        config.apply_args(args)?;

        Ok(config)
    }

    /// Session settings derived from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            ssh_program: self.ssh.program.clone(),
            transport: self.ssh.transport,
            batch_mode: self.ssh.batch_mode,
            ssh_options: self.ssh.options.clone(),
            load_agent: self.ssh.load_agent,
            connect_timeout: Duration::from_secs(self.ssh.connect_timeout_secs),
            settle_delay: Duration::from_millis(self.execution.settle_ms),
            command_timeout: self.command_timeout(),
            prepare_shell: self.execution.prepare_shell,
            ..SessionConfig::default()
        }
    }

    /// The host to connect to.
    pub fn host_record(&self) -> Result<HostRecord, ConfigError> {
        self.host.clone().ok_or(ConfigError::MissingHost)
    }

    /// Per-command timeout.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.execution.timeout_secs)
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Target not of the form `[user@]host[:port]`.
    InvalidTarget(String),
    /// No host on the command line or in the config file.
    MissingHost,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidTarget(target) => write!(f, "invalid target: '{}'", target),
            Self::MissingHost => write!(f, "no host given (pass user@host or set \"host\" in the config file)"),
        }
    }
}

impl std::error::Error for ConfigError {}
