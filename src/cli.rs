//! Command-line interface for remote-shell.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use crate::browser::{BrowseAction, BrowsePrompt, DirectoryView};

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// `[user@]host[:port]`.
    pub target: Option<String>,
    /// Port (overrides the target's).
    pub port: Option<u16>,
    /// Identity file.
    pub identity: Option<PathBuf>,
    /// Root path entered after connecting.
    pub root: Option<String>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Per-command timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Browser listing depth.
    pub depth: Option<usize>,
    /// Commands to run, in order.
    pub exec: Vec<String>,
    /// Open the directory browser.
    pub browse: bool,
    /// Directory the browser starts in (defaults to the root path).
    pub browse_start: Option<String>,
    /// Only probe the connection.
    pub check: bool,
    /// Use a fresh ssh process per command.
    pub one_shot: bool,
    /// Run the client inside a local pseudo-terminal.
    pub pty: bool,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('p') | Long("port") => {
                let value: String = parser.value()?.parse()?;
                result.port = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("port", value))?,
                );
            }
            Short('i') | Long("identity") => {
                result.identity = Some(parser.value()?.parse()?);
            }
            Short('r') | Long("root") => {
                result.root = Some(parser.value()?.parse()?);
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Short('t') | Long("timeout") => {
                let value: String = parser.value()?.parse()?;
                result.timeout_secs = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("timeout", value))?,
                );
            }
            Short('d') | Long("depth") => {
                let value: String = parser.value()?.parse()?;
                result.depth = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("depth", value))?,
                );
            }
            Short('e') | Long("exec") => {
                result.exec.push(parser.value()?.parse()?);
            }
            Long("browse") => {
                result.browse = true;
                if let Some(start) = parser.optional_value() {
                    result.browse_start = Some(start.parse()?);
                }
            }
            Long("check") => {
                result.check = true;
            }
            Long("one-shot") => {
                result.one_shot = true;
            }
            Long("pty") => {
                result.pty = true;
            }
            Value(val) if result.target.is_none() => {
                result.target = Some(val.string()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"remote-shell {version}
Persistent remote shell sessions over the system ssh client

USAGE:
    remote-shell [OPTIONS] [USER@]HOST[:PORT]

OPTIONS:
    -p, --port <PORT>       ssh port [default: 22]
    -i, --identity <FILE>   Private key to authenticate with
    -r, --root <PATH>       Remote directory to enter after connecting
    -c, --config <FILE>     Path to configuration file (JSON)
    -l, --log-level <LVL>   Log level (error, warn, info, debug, trace)
    -t, --timeout <SECS>    Per-command timeout [default: 30]
    -d, --depth <N>         Directory levels listed per fetch [default: 2]
    -e, --exec <CMD>        Run a command (repeatable, runs in order)
        --browse[=PATH]     Browse remote directories and print the selection
        --check             Test the login; falls back to an interactive login
                            when ssh asks for a password or confirmation
        --one-shot          Use a fresh ssh process per command
        --pty               Run ssh inside a local pseudo-terminal
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT VARIABLES:
    REMOTE_SHELL_SSH_PROGRAM  ssh client binary (overrides config)
    REMOTE_SHELL_TIMEOUT      Per-command timeout in seconds
    REMOTE_SHELL_MAX_DEPTH    Directory levels listed per fetch
    REMOTE_SHELL_LOG_LEVEL    Log level (overrides config)
    RUST_LOG                  Alternative log level setting

EXAMPLES:
    # Run two commands in one session
    remote-shell alice@files.internal -e 'cd /srv' -e 'ls -la'

    # Pick a directory interactively
    remote-shell alice@files.internal --browse=/srv

    # Test key-based login
    remote-shell --check -i ~/.ssh/id_ed25519 alice@files.internal:2222

    # Start with config file
    remote-shell -c ~/.config/remote-shell.json
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("remote-shell {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}

/// Line-oriented browse prompt over any reader and writer.
///
/// Commands: a number or name opens an entry, `..` goes up, `.` selects,
/// `+NAME` creates, `r` refreshes, `q` cancels.
pub struct LinePrompt<R, W> {
    input: R,
    output: W,
}

impl LinePrompt<io::StdinLock<'static>, io::Stderr> {
    /// Prompt on stdin, drawing on stderr so stdout stays clean for the
    /// selected path.
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    /// Create a prompt over `input` and `output`.
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    /// Consume the prompt and return its output sink.
    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> BrowsePrompt for LinePrompt<R, W> {
    fn choose(&mut self, view: &DirectoryView) -> io::Result<BrowseAction> {
        loop {
            writeln!(self.output, "\n{}", view.path)?;
            if !view.is_root() {
                writeln!(self.output, "   ..")?;
            }
            for (index, entry) in view.entries.iter().enumerate() {
                let marker = if entry.expandable() { "/" } else { "" };
                writeln!(self.output, "{:>3} {}{}", index + 1, entry.name, marker)?;
            }
            write!(
                self.output,
                "[number|name] open, .. up, . select, +name create, r refresh, q quit > "
            )?;
            self.output.flush()?;

            let line = match self.read_line()? {
                Some(line) => line,
                None => return Ok(BrowseAction::Cancel),
            };

            let action = match line.as_str() {
                "" => continue,
                "." => BrowseAction::Select,
                ".." => BrowseAction::Up,
                "q" => BrowseAction::Cancel,
                "r" => BrowseAction::Refresh,
                other if other.starts_with('+') => {
                    let name = other[1..].trim();
                    if name.is_empty() {
                        continue;
                    }
                    BrowseAction::Create(name.to_string())
                }
                other => match other.parse::<usize>() {
                    Ok(index) if index >= 1 && index <= view.entries.len() => {
                        BrowseAction::Open(view.entries[index - 1].path.clone())
                    }
                    Ok(_) => {
                        writeln!(self.output, "no entry {}", other)?;
                        continue;
                    }
                    Err(_) => BrowseAction::Open(other.to_string()),
                },
            };
            return Ok(action);
        }
    }

    fn confirm_create(&mut self, path: &str) -> io::Result<bool> {
        write!(self.output, "{} does not exist. Create it? [y/N] ", path)?;
        self.output.flush()?;
        let answer = self.read_line()?.unwrap_or_default();
        Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
    }

    fn notice(&mut self, message: &str) {
        let _ = writeln!(self.output, "! {}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::DirectoryEntry;

    fn args(args: &[&str]) -> Vec<OsString> {
        std::iter::once("remote-shell")
            .chain(args.iter().copied())
            .map(OsString::from)
            .collect()
    }

    #[test]
    fn test_default_args() {
        let result = parse_args_from(args(&[])).unwrap();
        assert!(result.target.is_none());
        assert!(result.exec.is_empty());
        assert!(!result.browse);
    }

    #[test]
    fn test_target_and_port() {
        let result = parse_args_from(args(&["alice@files.internal", "-p", "2222"])).unwrap();
        assert_eq!(result.target.as_deref(), Some("alice@files.internal"));
        assert_eq!(result.port, Some(2222));
    }

    #[test]
    fn test_repeated_exec_keeps_order() {
        let result = parse_args_from(args(&["h", "-e", "cd /tmp", "--exec", "pwd"])).unwrap();
        assert_eq!(result.exec, vec!["cd /tmp".to_string(), "pwd".to_string()]);
    }

    #[test]
    fn test_browse_optional_value() {
        let result = parse_args_from(args(&["h", "--browse"])).unwrap();
        assert!(result.browse);
        assert!(result.browse_start.is_none());

        let result = parse_args_from(args(&["h", "--browse=/srv"])).unwrap();
        assert_eq!(result.browse_start.as_deref(), Some("/srv"));
    }

    #[test]
    fn test_flags() {
        let result = parse_args_from(args(&["--check", "--one-shot", "--pty", "h"])).unwrap();
        assert!(result.check);
        assert!(result.one_shot);
        assert!(result.pty);
    }

    #[test]
    fn test_identity_root_config() {
        let result = parse_args_from(args(&[
            "-i",
            "/keys/id",
            "-r",
            "/srv",
            "-c",
            "/etc/remote-shell.json",
        ]))
        .unwrap();
        assert_eq!(result.identity, Some(PathBuf::from("/keys/id")));
        assert_eq!(result.root.as_deref(), Some("/srv"));
        assert_eq!(result.config, Some(PathBuf::from("/etc/remote-shell.json")));
    }

    #[test]
    fn test_help_and_version_flags() {
        assert!(parse_args_from(args(&["-h"])).unwrap().help);
        assert!(parse_args_from(args(&["--help"])).unwrap().help);
        assert!(parse_args_from(args(&["-V"])).unwrap().version);
        assert!(parse_args_from(args(&["--version"])).unwrap().version);
    }

    #[test]
    fn test_invalid_numbers() {
        assert!(parse_args_from(args(&["-p", "invalid"])).is_err());
        assert!(parse_args_from(args(&["-t", "soon"])).is_err());
        assert!(parse_args_from(args(&["-d", "-1"])).is_err());
    }

    #[test]
    fn test_second_positional_rejected() {
        let result = parse_args_from(args(&["h1", "h2"]));
        assert!(matches!(result, Err(ArgsError::UnexpectedArgument(_))));
    }

    fn view() -> DirectoryView {
        DirectoryView {
            path: "/data".to_string(),
            entries: vec![
                DirectoryEntry {
                    path: "/data/x".to_string(),
                    name: "x".to_string(),
                    explored: true,
                    has_children: Some(true),
                },
                DirectoryEntry {
                    path: "/data/y".to_string(),
                    name: "y".to_string(),
                    explored: true,
                    has_children: Some(false),
                },
            ],
        }
    }

    #[test]
    fn test_line_prompt_actions() {
        let input = b"\n7\n2\n..\n.\n+logs\nr\nq\nother\n";
        let mut prompt = LinePrompt::new(&input[..], Vec::new());
        let view = view();

        assert_eq!(prompt.choose(&view).unwrap(), BrowseAction::Open("/data/y".into()));
        assert_eq!(prompt.choose(&view).unwrap(), BrowseAction::Up);
        assert_eq!(prompt.choose(&view).unwrap(), BrowseAction::Select);
        assert_eq!(prompt.choose(&view).unwrap(), BrowseAction::Create("logs".into()));
        assert_eq!(prompt.choose(&view).unwrap(), BrowseAction::Refresh);
        assert_eq!(prompt.choose(&view).unwrap(), BrowseAction::Cancel);
        assert_eq!(prompt.choose(&view).unwrap(), BrowseAction::Open("other".into()));
        // EOF cancels
        assert_eq!(prompt.choose(&view).unwrap(), BrowseAction::Cancel);

        let output = String::from_utf8(prompt.into_output()).unwrap();
        assert!(output.contains("  1 x/"));
        assert!(output.contains("  2 y\n"));
        assert!(output.contains("no entry 7"));
    }

    #[test]
    fn test_line_prompt_confirm() {
        let mut prompt = LinePrompt::new(&b"yes\nn\n"[..], Vec::new());
        assert!(prompt.confirm_create("/data/new").unwrap());
        assert!(!prompt.confirm_create("/data/new").unwrap());
        assert!(!prompt.confirm_create("/data/new").unwrap());
    }
}
