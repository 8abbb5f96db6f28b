//! Session execution context and working-directory tracking.

use crate::remote_path;

/// Effect a command has on the tracked working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryChange {
    /// Not a directory change.
    None,
    /// The directory is now this normalized absolute path.
    Set(String),
    /// The directory changed to something that cannot be resolved locally
    /// (`cd`, `cd ~`, `cd -`, shell expansions).
    Unknown,
}

/// Interpret `command` as a `cd` against the previously tracked directory.
///
/// Absolute targets replace the directory, `..` pops one segment and any
/// other relative target is appended.
pub fn directory_change(current: Option<&str>, command: &str) -> DirectoryChange {
    let trimmed = command.trim();
    let argument = if trimmed == "cd" {
        ""
    } else if let Some(rest) = trimmed.strip_prefix("cd ") {
        rest.trim()
    } else {
        return DirectoryChange::None;
    };

    let argument = unquote(argument);
    if argument.is_empty()
        || argument == "-"
        || argument.starts_with('~')
        || argument.contains(['$', '`', ';', '&', '|', '*', '?'])
    {
        return DirectoryChange::Unknown;
    }

    if argument.starts_with('/') {
        return DirectoryChange::Set(remote_path::normalize(argument));
    }

    match current {
        Some(dir) => DirectoryChange::Set(remote_path::join(dir, argument)),
        None => DirectoryChange::Unknown,
    }
}

/// Strip one layer of matching single or double quotes.
fn unquote(argument: &str) -> &str {
    for quote in ['\'', '"'] {
        if argument.len() >= 2 && argument.starts_with(quote) && argument.ends_with(quote) {
            return &argument[1..argument.len() - 1];
        }
    }
    argument
}

/// Whether `command` asks the shell for its working directory.
pub fn is_cwd_query(command: &str) -> bool {
    matches!(command.trim(), "pwd" | "pwd -P" | "pwd -L")
}

/// Parse CWD from `pwd` output: a single absolute path.
pub fn parse_cwd(output: &str) -> Option<String> {
    let trimmed = output.trim();
    if trimmed.starts_with('/') && !trimmed.contains('\n') {
        Some(remote_path::normalize(trimmed))
    } else {
        None
    }
}

/// Execution context for a shell session.
///
/// Tracks the remote working directory locally plus a little bookkeeping
/// about the last command.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    /// Tracked remote working directory (`None` when unknown).
    cwd: Option<String>,
    /// Last command executed.
    last_command: Option<String>,
    /// Exit code of last command.
    last_exit_code: Option<i32>,
    /// Command execution count.
    execution_count: u64,
}

impl SessionContext {
    /// Create a new empty session context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session context with a known working directory.
    pub fn with_cwd(cwd: impl Into<String>) -> Self {
        Self {
            cwd: Some(remote_path::normalize(&cwd.into())),
            ..Default::default()
        }
    }

    /// Get the tracked working directory.
    pub fn cwd(&self) -> Option<&str> {
        self.cwd.as_deref()
    }

    /// Get the last command executed.
    pub fn last_command(&self) -> Option<&str> {
        self.last_command.as_deref()
    }

    /// Get the exit code of the last command.
    pub fn last_exit_code(&self) -> Option<i32> {
        self.last_exit_code
    }

    /// Get the number of commands executed.
    pub fn execution_count(&self) -> u64 {
        self.execution_count
    }

    /// Record a completed command and update the tracked directory.
    ///
    /// Only successful commands move the directory: a failed `cd` leaves the
    /// shell where it was.
    pub fn record_execution(&mut self, command: &str, stdout: &str, exit_code: Option<i32>) {
        self.last_command = Some(command.to_string());
        self.last_exit_code = exit_code;
        self.execution_count += 1;

        if exit_code != Some(0) {
            return;
        }

        match directory_change(self.cwd.as_deref(), command) {
            DirectoryChange::Set(dir) => self.cwd = Some(dir),
            DirectoryChange::Unknown => self.cwd = None,
            DirectoryChange::None => {
                if is_cwd_query(command) {
                    if let Some(dir) = parse_cwd(stdout) {
                        self.cwd = Some(dir);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_cd_replaces() {
        assert_eq!(
            directory_change(Some("/home/alice"), "cd /tmp"),
            DirectoryChange::Set("/tmp".into())
        );
        assert_eq!(
            directory_change(None, "  cd /var/log/  "),
            DirectoryChange::Set("/var/log".into())
        );
    }

    #[test]
    fn test_dotdot_pops_segment() {
        assert_eq!(
            directory_change(Some("/tmp/a"), "cd .."),
            DirectoryChange::Set("/tmp".into())
        );
        assert_eq!(
            directory_change(Some("/"), "cd .."),
            DirectoryChange::Set("/".into())
        );
    }

    #[test]
    fn test_relative_cd_appends() {
        assert_eq!(
            directory_change(Some("/data"), "cd x/y"),
            DirectoryChange::Set("/data/x/y".into())
        );
        assert_eq!(directory_change(None, "cd x"), DirectoryChange::Unknown);
    }

    #[test]
    fn test_quoted_argument() {
        assert_eq!(
            directory_change(Some("/"), "cd '/srv/my data'"),
            DirectoryChange::Set("/srv/my data".into())
        );
    }

    #[test]
    fn test_unresolvable_targets() {
        for command in ["cd", "cd ~", "cd ~/src", "cd -", "cd $HOME", "cd /a && cd b"] {
            assert_eq!(
                directory_change(Some("/data"), command),
                DirectoryChange::Unknown,
                "{command}"
            );
        }
    }

    #[test]
    fn test_not_a_cd() {
        assert_eq!(directory_change(Some("/"), "ls -la"), DirectoryChange::None);
        assert_eq!(directory_change(Some("/"), "cdrecord"), DirectoryChange::None);
    }

    #[test]
    fn test_parse_cwd() {
        assert_eq!(parse_cwd("/home/user\n"), Some("/home/user".to_string()));
        assert_eq!(parse_cwd(""), None);
        assert_eq!(parse_cwd("bash: pwd: oops"), None);
    }

    #[test]
    fn test_record_execution_tracks_cwd() {
        let mut ctx = SessionContext::with_cwd("/tmp/a");

        ctx.record_execution("cd ..", "", Some(0));
        assert_eq!(ctx.cwd(), Some("/tmp"));

        // failed cd leaves the directory alone
        ctx.record_execution("cd /nope", "", Some(1));
        assert_eq!(ctx.cwd(), Some("/tmp"));
        assert_eq!(ctx.last_exit_code(), Some(1));

        ctx.record_execution("cd", "", Some(0));
        assert_eq!(ctx.cwd(), None);

        ctx.record_execution("pwd", "/home/alice\n", Some(0));
        assert_eq!(ctx.cwd(), Some("/home/alice"));
        assert_eq!(ctx.execution_count(), 4);
        assert_eq!(ctx.last_command(), Some("pwd"));
    }
}
