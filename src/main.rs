//! remote-shell binary entry point.

use std::process::ExitCode;
use std::sync::Arc;

use remote_shell::cli::{self, Args, LinePrompt};
use remote_shell::config::Config;
use remote_shell::execution::{
    check_connection, check_connection_interactive, ConnectionCheck, OneShotExecutor, RemoteShell,
};
use remote_shell::{logging, DirectoryBrowser, HostRecord, RemoteShellError, Session};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Run with --help for usage");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };

    // Initialize logging
    logging::try_init_with_level(config.log_filter()).ok();
    debug!("remote-shell v{}", env!("CARGO_PKG_VERSION"));

    let host = match config.host_record() {
        Ok(host) => host,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };

    let outcome = if args.check {
        check(&config, &host).await
    } else if args.one_shot {
        run_one_shot(&args, &config, host).await
    } else {
        run_session(&args, &config, host).await
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn check(config: &Config, host: &HostRecord) -> Result<ExitCode, BoxError> {
    let base = config.session_config().ssh_command(host);
    match check_connection(&base, config.command_timeout()).await? {
        ConnectionCheck::Reachable => {
            println!("{}: key-based login works", host.target());
            Ok(ExitCode::SUCCESS)
        }
        ConnectionCheck::NeedsInteraction { stderr } => {
            println!("{}: login needs a password or confirmation", host.target());
            if !stderr.is_empty() {
                eprintln!("{}", stderr);
            }
            if check_connection_interactive(&base).await? {
                Ok(ExitCode::SUCCESS)
            } else {
                println!("{}: interactive login failed", host.target());
                Ok(ExitCode::FAILURE)
            }
        }
        ConnectionCheck::Failed { exit_code, stderr } => {
            println!("{}: unreachable (exit {:?})", host.target(), exit_code);
            if !stderr.is_empty() {
                eprintln!("{}", stderr);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_one_shot(args: &Args, config: &Config, host: HostRecord) -> Result<ExitCode, BoxError> {
    let base = config.session_config().ssh_command(&host);
    let mut executor = OneShotExecutor::new(base).with_timeout(config.command_timeout());
    if host.has_custom_root() {
        executor = executor.with_cwd(host.root());
    }
    drive(args, config, &executor, &host.root()).await
}

async fn run_session(args: &Args, config: &Config, host: HostRecord) -> Result<ExitCode, BoxError> {
    let root = host.root();
    let session = Session::new(host, config.session_config()).with_save_hook(Arc::new(
        |record: &HostRecord| {
            info!(
                "{} last used {} in {}",
                record.target(),
                record.last_connection_at.unwrap_or_default(),
                record.current_dir.as_deref().unwrap_or("?")
            );
        },
    ));

    session.connect().await?;
    let start = session.cwd().unwrap_or(root);
    let outcome = drive(args, config, &session, &start).await;
    if let Err(e) = session.disconnect().await {
        debug!("disconnect: {}", e);
    }
    outcome
}

/// Run the requested commands, then browse if asked. Reads commands from
/// stdin when neither was requested.
async fn drive<S>(args: &Args, config: &Config, shell: &S, start: &str) -> Result<ExitCode, BoxError>
where
    S: RemoteShell + ?Sized,
{
    let mut status = ExitCode::SUCCESS;

    if args.exec.is_empty() && !args.browse {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let command = line.trim();
            if command.is_empty() {
                continue;
            }
            if let Some(code) = run_command(shell, command).await? {
                status = code;
            }
        }
        return Ok(status);
    }

    for command in &args.exec {
        if let Some(code) = run_command(shell, command).await? {
            status = code;
        }
    }

    if args.browse {
        let start = args.browse_start.as_deref().unwrap_or(start);
        let mut browser = DirectoryBrowser::new(shell, config.browser.max_depth);
        let mut prompt = LinePrompt::stdio();
        match browser.browse(start, &mut prompt).await? {
            Some(path) => println!("{}", path),
            None => status = ExitCode::FAILURE,
        }
    }

    Ok(status)
}

/// Run one command and print its output. Returns the exit code to report
/// when it failed; a timeout is reported and does not stop the run.
async fn run_command<S>(shell: &S, command: &str) -> Result<Option<ExitCode>, BoxError>
where
    S: RemoteShell + ?Sized,
{
    match shell.run(command).await {
        Ok(result) => {
            if !result.stdout.is_empty() {
                println!("{}", result.stdout);
            }
            if !result.stderr.is_empty() {
                eprintln!("{}", result.stderr);
            }
            if result.success() {
                return Ok(None);
            }
            let code = result
                .exit_code
                .and_then(|code| u8::try_from(code).ok())
                .filter(|code| *code != 0)
                .unwrap_or(1);
            Ok(Some(ExitCode::from(code)))
        }
        Err(e @ RemoteShellError::CommandTimeout { .. }) => {
            eprintln!("error: {}", e);
            Ok(Some(ExitCode::FAILURE))
        }
        Err(e) => Err(e.into()),
    }
}
