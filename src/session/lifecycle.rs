//! Persistent remote shell session.

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::context::SessionContext;
use super::host::{HostRecord, SaveHook};
use super::state::SessionState;
use crate::error::RemoteShellError;
use crate::execution::{CommandResult, RemoteShell, ShellChannel};
use crate::output::OutputSanitizer;
use crate::remote_path::shell_quote;
use crate::transport::{ProcessExit, SshCommand, TransportEvent, TransportKind, TransportProcess};
use crate::Result;

/// Default command timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Turns off input echo and prompts so only command output comes back.
const PREPARE_SHELL: &str = "stty -echo 2>/dev/null; PS1=''; PS2=''";

/// How long to wait for a killed transport to be reaped.
const KILL_WAIT: Duration = Duration::from_secs(2);

/// Configuration shared by every session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// ssh client binary.
    pub ssh_program: String,
    /// Local plumbing for the client's streams.
    pub transport: TransportKind,
    /// Never let the client prompt for passwords or host keys.
    pub batch_mode: bool,
    /// Extra client options, e.g. `-oServerAliveInterval=30`.
    pub ssh_options: Vec<String>,
    /// Load the identity file into the agent before connecting.
    pub load_agent: bool,
    /// Agent helper used when `load_agent` is set.
    pub agent_program: String,
    /// Limit for the first byte of output after spawning.
    pub connect_timeout: Duration,
    /// Pause after the first output so login banners can arrive and be
    /// discarded.
    pub settle_delay: Duration,
    /// How long `exit` gets before the transport is killed.
    pub disconnect_grace: Duration,
    /// Timeout for [`Session::execute_command`].
    pub command_timeout: Duration,
    /// Disable echo and prompts right after connecting.
    pub prepare_shell: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            transport: TransportKind::default(),
            batch_mode: true,
            ssh_options: Vec::new(),
            load_agent: false,
            agent_program: "ssh-add".to_string(),
            connect_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_millis(250),
            disconnect_grace: Duration::from_millis(500),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            prepare_shell: true,
        }
    }
}

impl SessionConfig {
    /// The interactive ssh invocation for `record`.
    pub fn ssh_command(&self, record: &HostRecord) -> SshCommand {
        SshCommand::for_host(record)
            .program(self.ssh_program.clone())
            .batch_mode(self.batch_mode)
            .options(self.ssh_options.iter().cloned())
            .tty(true)
    }
}

/// One long-lived remote shell for one host.
///
/// Holds at most one transport process. All commands go through a single
/// async mutex, so they reach the shell strictly one at a time in the order
/// callers acquired it; connect and disconnect take the same lock.
pub struct Session {
    config: SessionConfig,
    record: Mutex<HostRecord>,
    save_hook: Option<SaveHook>,
    state: Arc<watch::Sender<SessionState>>,
    channel: Arc<AsyncMutex<Option<ShellChannel>>>,
    context: Mutex<SessionContext>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    spawns: AtomicU64,
}

impl Session {
    /// Create a disconnected session for `record`.
    pub fn new(record: HostRecord, config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            config,
            record: Mutex::new(record),
            save_hook: None,
            state: Arc::new(state),
            channel: Arc::new(AsyncMutex::new(None)),
            context: Mutex::new(SessionContext::new()),
            monitor: Mutex::new(None),
            spawns: AtomicU64::new(0),
        }
    }

    /// Call `hook` whenever the host record changes.
    pub fn with_save_hook(mut self, hook: SaveHook) -> Self {
        self.save_hook = Some(hook);
        self
    }

    /// Current state.
    pub fn status(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Snapshot of the host record.
    pub fn host(&self) -> Result<HostRecord> {
        self.record
            .lock()
            .map(|record| record.clone())
            .map_err(|_| RemoteShellError::LockPoisoned)
    }

    /// Tracked remote working directory.
    pub fn cwd(&self) -> Option<String> {
        self.context
            .lock()
            .ok()
            .and_then(|ctx| ctx.cwd().map(str::to_string))
    }

    /// Number of transport processes spawned so far.
    pub fn spawn_count(&self) -> u64 {
        self.spawns.load(Ordering::Relaxed)
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open the remote shell.
    ///
    /// Returns immediately if already connected. Otherwise spawns the
    /// client, waits for its first output (connected) or its exit (failed),
    /// prepares the shell and enters the host's root path.
    pub async fn connect(&self) -> Result<()> {
        let mut slot = self.channel.lock().await;
        if slot.is_some() && self.status() == SessionState::Connected {
            debug!("already connected");
            return Ok(());
        }

        // A leftover handle here belongs to a transport that already died.
        if slot.take().is_some() {
            debug!("releasing stale transport before reconnecting");
        }
        if self.status() == SessionState::Connected {
            self.set_state(SessionState::Disconnected);
        }

        let record = self.host()?;
        let target = record.target();

        if self.config.load_agent {
            if let Some(ref identity) = record.identity_file {
                load_identity(&self.config.agent_program, identity).await;
            }
        }

        self.transition(SessionState::Connecting)?;
        info!("connecting to {}", target);

        let command = self.config.ssh_command(&record);
        let mut transport = match TransportProcess::spawn(&command, self.config.transport) {
            Ok(transport) => transport,
            Err(e) => {
                error!("failed to start ssh for {}: {}", target, e);
                self.fail_connect();
                return Err(RemoteShellError::ConnectionFailure {
                    target,
                    message: e.to_string(),
                    exit_code: None,
                });
            }
        };
        let generation = self.spawns.fetch_add(1, Ordering::Relaxed) + 1;

        let first = match wait_for_first_output(&mut transport, self.config.connect_timeout, &target)
            .await
        {
            Ok(first) => first,
            Err(e) => {
                warn!("{}", e);
                transport.kill();
                self.fail_connect();
                return Err(e);
            }
        };

        self.transition(SessionState::Connected)?;
        tokio::time::sleep(self.config.settle_delay).await;

        let mut channel = ShellChannel::new(transport, generation);
        let banner = format!("{}{}", first, channel.discard_pending());
        if !banner.trim().is_empty() {
            debug!("login banner from {}: {}", target, banner.trim());
        }

        if let Some(exit) = channel.transport().exit_status() {
            self.fail_connect();
            return Err(startup_failure(&target, &banner, exit));
        }

        self.spawn_monitor(channel.exit_watch(), generation, target.clone());
        *slot = Some(channel);

        if let Err(e) = self.initialize(&mut slot, &record).await {
            self.stop_monitor();
            if let Some(mut channel) = slot.take() {
                channel.transport_mut().kill();
            }
            self.fail_connect();
            return Err(match e {
                RemoteShellError::ProcessError { exit_code, .. } => {
                    startup_failure(&target, &banner, ProcessExit { code: exit_code })
                }
                other => other,
            });
        }

        self.save_record(|record| record.mark_connected())?;
        info!("connected to {}", target);
        Ok(())
    }

    /// Prepare the shell and enter the root path.
    ///
    /// A root `cd` that fails leaves the session connected with an unknown
    /// working directory; only a dead transport aborts the connect.
    async fn initialize(&self, slot: &mut Option<ShellChannel>, record: &HostRecord) -> Result<()> {
        {
            let mut ctx = self
                .context
                .lock()
                .map_err(|_| RemoteShellError::LockPoisoned)?;
            *ctx = SessionContext::new();
        }

        if self.config.prepare_shell {
            match self
                .run_locked(slot, PREPARE_SHELL, self.config.command_timeout)
                .await
            {
                Ok(_) => {}
                Err(e @ RemoteShellError::ProcessError { .. }) => return Err(e),
                Err(e) => warn!("shell preparation failed: {}", e),
            }
        }

        if record.has_custom_root() {
            let root = record.root();
            let command = format!("cd {}", shell_quote(&root));
            match self
                .run_locked(slot, &command, self.config.command_timeout)
                .await
            {
                Ok(result) if result.succeeded => debug!("entered root path {}", root),
                Ok(result) => warn!(
                    "could not enter root path {}: {}",
                    root,
                    result.diagnostic()
                ),
                Err(e @ RemoteShellError::ProcessError { .. }) => return Err(e),
                Err(e) => warn!("could not enter root path {}: {}", root, e),
            }
        }

        Ok(())
    }

    /// Close the remote shell.
    ///
    /// Sends `exit`, waits the grace period, then kills. Always leaves the
    /// session disconnected; a no-op when nothing is running.
    pub async fn disconnect(&self) -> Result<()> {
        let mut slot = self.channel.lock().await;
        self.stop_monitor();

        let released = match slot.take() {
            Some(mut channel) => {
                let transport = channel.transport_mut();
                if !transport.has_exited() {
                    if let Err(e) = transport.write_line("exit").await {
                        debug!("could not send exit: {}", e);
                    }
                    if transport
                        .wait_exit(self.config.disconnect_grace)
                        .await
                        .is_none()
                    {
                        debug!("transport still running after grace period; killing");
                        transport.kill();
                        transport.wait_exit(KILL_WAIT).await;
                    }
                }
                true
            }
            None => false,
        };

        self.set_state(SessionState::Disconnected);

        if released {
            let cwd = self.cwd();
            self.save_record(|record| record.current_dir = cwd)?;
            info!("disconnected");
        }
        Ok(())
    }

    /// Run `command` with the configured command timeout.
    pub async fn execute_command(&self, command: &str) -> Result<CommandResult> {
        self.execute_command_with_timeout(command, self.config.command_timeout)
            .await
    }

    /// Run `command`, waiting at most `timeout` for its sentinel.
    pub async fn execute_command_with_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandResult> {
        let mut slot = self.channel.lock().await;
        self.run_locked(&mut slot, command, timeout).await
    }

    async fn run_locked(
        &self,
        slot: &mut Option<ShellChannel>,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandResult> {
        if !self.status().can_execute() {
            return Err(RemoteShellError::NoActiveSession);
        }
        let channel = slot.as_mut().ok_or(RemoteShellError::NoActiveSession)?;

        debug!("executing: {}", command);
        let completion = match channel.run(command, timeout).await {
            Ok(completion) => completion,
            Err(e @ RemoteShellError::ProcessError { .. }) => {
                if let Some(exit) = channel.transport().exit_status() {
                    *slot = None;
                    self.settle_after_exit(exit);
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let mut ctx = self
            .context
            .lock()
            .map_err(|_| RemoteShellError::LockPoisoned)?;
        ctx.record_execution(command, &completion.stdout, Some(completion.exit_code));

        Ok(CommandResult::new(
            command,
            completion.stdout,
            completion.stderr,
            Some(completion.exit_code),
        )
        .with_cwd(ctx.cwd().map(str::to_string))
        .with_duration(completion.duration))
    }

    fn transition(&self, target: SessionState) -> Result<()> {
        let mut result = Ok(());
        self.state.send_if_modified(|state| {
            let from = *state;
            result = state.transition_to(target);
            result.is_ok() && from != target
        });
        result
    }

    fn set_state(&self, target: SessionState) {
        self.state.send_if_modified(|state| {
            if *state == target {
                false
            } else {
                *state = target;
                true
            }
        });
    }

    fn settle_after_exit(&self, exit: ProcessExit) {
        let next = if exit.success() {
            SessionState::Disconnected
        } else {
            SessionState::Error
        };
        self.state.send_if_modified(|state| {
            if *state == SessionState::Connected {
                *state = next;
                true
            } else {
                false
            }
        });
    }

    fn fail_connect(&self) {
        self.set_state(SessionState::Error);
        if let Err(e) = self.save_record(|record| record.mark_failed()) {
            warn!("could not update host record: {}", e);
        }
    }

    /// Watch the transport and reflect its exit in the session state.
    fn spawn_monitor(
        &self,
        mut exit: watch::Receiver<Option<ProcessExit>>,
        generation: u64,
        target: String,
    ) {
        let state = Arc::clone(&self.state);
        let channel = Arc::clone(&self.channel);

        let handle = tokio::spawn(async move {
            let status = match exit.wait_for(|e| e.is_some()).await {
                Ok(status) => *status,
                Err(_) => None,
            };
            let status = status.unwrap_or(ProcessExit { code: None });

            let next = if status.success() {
                SessionState::Disconnected
            } else {
                SessionState::Error
            };
            let changed = state.send_if_modified(|state| {
                if *state == SessionState::Connected {
                    *state = next;
                    true
                } else {
                    false
                }
            });
            if changed {
                if status.success() {
                    info!("remote shell on {} exited", target);
                } else {
                    warn!("remote shell on {} died: exit {:?}", target, status.code);
                }
            }

            let mut slot = channel.lock().await;
            if slot.as_ref().map(ShellChannel::generation) == Some(generation) {
                *slot = None;
            }
        });

        if let Ok(mut monitor) = self.monitor.lock() {
            if let Some(previous) = monitor.replace(handle) {
                previous.abort();
            }
        }
    }

    fn stop_monitor(&self) {
        if let Ok(mut monitor) = self.monitor.lock() {
            if let Some(handle) = monitor.take() {
                handle.abort();
            }
        }
    }

    fn save_record<F>(&self, update: F) -> Result<()>
    where
        F: FnOnce(&mut HostRecord),
    {
        let snapshot = {
            let mut record = self
                .record
                .lock()
                .map_err(|_| RemoteShellError::LockPoisoned)?;
            update(&mut record);
            record.clone()
        };
        if let Some(ref hook) = self.save_hook {
            hook(&snapshot);
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_monitor();
    }
}

#[async_trait]
impl RemoteShell for Session {
    async fn run(&self, command: &str) -> Result<CommandResult> {
        self.execute_command(command).await
    }
}

/// Wait for the first chunk of output, or fail if the client exits or stays
/// silent.
async fn wait_for_first_output(
    transport: &mut TransportProcess,
    timeout: Duration,
    target: &str,
) -> Result<String> {
    let event = match tokio::time::timeout(timeout, transport.next_event()).await {
        Ok(event) => event,
        Err(_) => {
            return Err(RemoteShellError::ConnectionFailure {
                target: target.to_string(),
                message: format!("no output within {:?}", timeout),
                exit_code: None,
            })
        }
    };

    match event {
        Some(TransportEvent::Stdout(bytes)) | Some(TransportEvent::Stderr(bytes)) => {
            Ok(OutputSanitizer::strip_ansi(&bytes))
        }
        Some(TransportEvent::Exited(exit)) => Err(RemoteShellError::ConnectionFailure {
            target: target.to_string(),
            message: "ssh exited before producing any output".to_string(),
            exit_code: exit.code,
        }),
        None => Err(RemoteShellError::ConnectionFailure {
            target: target.to_string(),
            message: "transport closed before producing any output".to_string(),
            exit_code: transport.exit_status().and_then(|exit| exit.code),
        }),
    }
}

fn startup_failure(target: &str, banner: &str, exit: ProcessExit) -> RemoteShellError {
    let banner = banner.trim();
    RemoteShellError::ConnectionFailure {
        target: target.to_string(),
        message: if banner.is_empty() {
            "remote shell exited during startup".to_string()
        } else {
            format!("remote shell exited during startup: {}", banner)
        },
        exit_code: exit.code,
    }
}

/// Best effort: a failing agent never blocks the connect.
async fn load_identity(agent_program: &str, identity: &Path) {
    let mut command = tokio::process::Command::new(agent_program);
    command
        .arg(identity)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match tokio::time::timeout(Duration::from_secs(10), command.output()).await {
        Ok(Ok(output)) if output.status.success() => {
            debug!("loaded {} into the agent", identity.display())
        }
        Ok(Ok(output)) => warn!(
            "{} {} failed: {}",
            agent_program,
            identity.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        ),
        Ok(Err(e)) => warn!("could not run {}: {}", agent_program, e),
        Err(_) => warn!("{} timed out", agent_program),
    }
}
