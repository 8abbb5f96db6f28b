//! Builder for ssh client invocations.

use std::path::PathBuf;

use crate::session::HostRecord;

/// Default ssh port.
pub const DEFAULT_PORT: u16 = 22;

/// A configured invocation of the external ssh client.
///
/// Produces `ssh -p <port> [-i <identity>] [-o BatchMode=yes] [options...]
/// [-tt] user@host [command]`. Options always precede the destination; ssh
/// treats anything after it as the remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshCommand {
    /// Client binary.
    pub program: String,
    /// Remote user (omitted from the target when `None`).
    pub user: Option<String>,
    /// Remote host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Private key passed with `-i`.
    pub identity_file: Option<PathBuf>,
    /// Add `-o BatchMode=yes` so the client never prompts.
    pub batch_mode: bool,
    /// Force remote pseudo-terminal allocation (`-tt`).
    pub tty: bool,
    /// Extra client options, inserted before the destination.
    pub options: Vec<String>,
    /// Command executed instead of a login shell.
    pub remote_command: Option<String>,
    /// Verbatim argv replacing everything above except `program`.
    raw_args: Option<Vec<String>>,
}

impl SshCommand {
    /// Create an invocation targeting `host` with defaults.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            program: "ssh".to_string(),
            user: None,
            host: host.into(),
            port: DEFAULT_PORT,
            identity_file: None,
            batch_mode: false,
            tty: false,
            options: Vec::new(),
            remote_command: None,
            raw_args: None,
        }
    }

    /// Build the invocation for a host record.
    pub fn for_host(record: &HostRecord) -> Self {
        let mut command = Self::new(record.host.clone()).port(record.port);
        if !record.username.is_empty() {
            command = command.user(record.username.clone());
        }
        if let Some(ref identity) = record.identity_file {
            command = command.identity_file(identity.clone());
        }
        command
    }

    /// Run `program` with exactly `args`, bypassing ssh argument building.
    ///
    /// Useful for wrapper scripts and for driving a local shell in tests.
    pub fn raw<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let program = program.into();
        let mut command = Self::new("localhost");
        command.program = program;
        command.raw_args = Some(args.into_iter().map(Into::into).collect());
        command
    }

    /// Set the client binary.
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the remote user.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the TCP port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the identity file.
    pub fn identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    /// Enable or disable batch mode.
    pub fn batch_mode(mut self, enabled: bool) -> Self {
        self.batch_mode = enabled;
        self
    }

    /// Request remote pseudo-terminal allocation.
    pub fn tty(mut self, enabled: bool) -> Self {
        self.tty = enabled;
        self
    }

    /// Append a client option (e.g. `-oConnectTimeout=10`).
    pub fn option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    /// Append several client options.
    pub fn options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.extend(options.into_iter().map(Into::into));
        self
    }

    /// Set the remote command.
    pub fn remote_command(mut self, command: impl Into<String>) -> Self {
        self.remote_command = Some(command.into());
        self
    }

    /// `user@host`, or just the host when no user is set.
    pub fn target(&self) -> String {
        match self.user {
            Some(ref user) if !user.is_empty() => format!("{}@{}", user, self.host),
            _ => self.host.clone(),
        }
    }

    /// Argument vector passed to [`program`](Self::program).
    pub fn args(&self) -> Vec<String> {
        if let Some(ref raw) = self.raw_args {
            let mut args = raw.clone();
            if let Some(ref command) = self.remote_command {
                args.push(command.clone());
            }
            return args;
        }

        let mut args = vec!["-p".to_string(), self.port.to_string()];

        if let Some(ref identity) = self.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }

        if self.batch_mode {
            args.push("-o".to_string());
            args.push("BatchMode=yes".to_string());
        }

        args.extend(self.options.iter().cloned());

        if self.tty {
            args.push("-tt".to_string());
        }

        args.push(self.target());

        if let Some(ref command) = self.remote_command {
            args.push(command.clone());
        }

        args
    }

    /// A `tokio::process::Command` for this invocation (stdio not configured).
    pub fn to_tokio_command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(self.args());
        command
    }

    /// Human-readable command line for logs and error messages.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in self.args() {
            line.push(' ');
            if arg.contains(char::is_whitespace) {
                line.push_str(&crate::remote_path::shell_quote(&arg));
            } else {
                line.push_str(&arg);
            }
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_args() {
        let command = SshCommand::new("example.com");
        assert_eq!(command.args(), vec!["-p", "22", "example.com"]);
    }

    #[test]
    fn test_full_args_order() {
        let command = SshCommand::new("example.com")
            .user("alice")
            .port(2222)
            .identity_file("/home/alice/.ssh/id_ed25519")
            .batch_mode(true)
            .option("-oConnectTimeout=10")
            .tty(true);

        assert_eq!(
            command.args(),
            vec![
                "-p",
                "2222",
                "-i",
                "/home/alice/.ssh/id_ed25519",
                "-o",
                "BatchMode=yes",
                "-oConnectTimeout=10",
                "-tt",
                "alice@example.com",
            ]
        );
    }

    #[test]
    fn test_remote_command_is_last() {
        let command = SshCommand::new("example.com")
            .user("bob")
            .remote_command("ls -la");
        let args = command.args();
        assert_eq!(args.last().map(String::as_str), Some("ls -la"));
        assert_eq!(args[args.len() - 2], "bob@example.com");
    }

    #[test]
    fn test_for_host_record() {
        let mut record = HostRecord::new("carol", "files.internal");
        record.port = 2200;
        record.identity_file = Some(PathBuf::from("/keys/carol"));

        let command = SshCommand::for_host(&record);
        assert_eq!(command.target(), "carol@files.internal");
        assert_eq!(command.port, 2200);
        assert_eq!(command.identity_file, Some(PathBuf::from("/keys/carol")));
    }

    #[test]
    fn test_raw_command() {
        let command = SshCommand::raw("/bin/sh", ["-s"]).remote_command("echo hi");
        assert_eq!(command.program, "/bin/sh");
        assert_eq!(command.args(), vec!["-s", "echo hi"]);
    }

    #[test]
    fn test_display_quotes_whitespace() {
        let command = SshCommand::new("h").remote_command("echo hi");
        assert_eq!(command.display(), "ssh -p 22 h 'echo hi'");
    }
}
