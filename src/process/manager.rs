//! Process manager: spawns approved commands and supervises them to exit.
//!
//! Each spawn:
//! - persists a [`ProcessRecord`] to the registry before any output is read,
//!   so a host crash right after spawn still leaves a recoverable trace;
//! - captures stdout/stderr incrementally into shared buffers;
//! - arms the timeout, escalating `SIGTERM` → grace window → `SIGKILL`;
//! - runs the exit protocol exactly once: remove the registry entry, notify
//!   the audit sink, then publish the [`ProcessExit`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::audit::{JsonlAuditWriter, ProcessAuditSink};
use crate::config::GatewayConfig;
use crate::models::process::{
    Escalation, EscalationStep, ProcessAuditEvent, ProcessExit, ProcessRecord, ProcessState,
};
use crate::process::lifecycle::Lifecycle;
use crate::process::registry::ProcessRegistry;
use crate::{AppError, Result};

/// Default grace window between the graceful signal and the forced kill.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(5000);

/// Total time allowed for draining stdio after the process exits. A
/// grandchild that inherited the pipes may hold them open indefinitely.
const STDIO_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

const READ_CHUNK: usize = 8 * 1024;

/// Parameters for [`ProcessManager::spawn_process`].
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Program to execute; never interpreted by a shell.
    pub command: String,
    /// Argument list.
    pub args: Vec<String>,
    /// Working directory for the child.
    pub cwd: Option<PathBuf>,
    /// Full child environment; replaces the inherited one when set.
    pub env: Option<HashMap<String, String>>,
    /// Timeout in milliseconds; `None` uses the manager default, 0 disables.
    pub timeout_ms: Option<u64>,
    /// Opaque run correlation identifier.
    pub run_id: Option<String>,
    /// Opaque node correlation identifier.
    pub node_id: Option<String>,
}

impl SpawnOptions {
    /// Options for `command` with `args` and no other settings.
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            ..Self::default()
        }
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Replace the child environment.
    #[must_use]
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    /// Set the timeout in milliseconds.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Attach a run correlation identifier.
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Attach a node correlation identifier.
    #[must_use]
    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }
}

type OutputBuffer = Arc<Mutex<Vec<u8>>>;

/// Handle to a supervised child process.
///
/// Cheap to clone; every clone observes the same process.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: u32,
    stdout: OutputBuffer,
    stderr: OutputBuffer,
    stdin: Arc<tokio::sync::Mutex<Option<ChildStdin>>>,
    lifecycle: Arc<Lifecycle>,
    exit_rx: watch::Receiver<Option<ProcessExit>>,
    cancel: CancellationToken,
}

impl ProcessHandle {
    /// OS process identifier.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Standard output captured so far (lossy UTF-8).
    #[must_use]
    pub fn stdout(&self) -> String {
        snapshot(&self.stdout)
    }

    /// Standard error captured so far (lossy UTF-8).
    #[must_use]
    pub fn stderr(&self) -> String {
        snapshot(&self.stderr)
    }

    /// Write `input` to the child's standard input.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if stdin was closed or the write fails.
    pub async fn write_stdin(&self, input: &[u8]) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| AppError::Io("stdin already closed".into()))?;
        stdin
            .write_all(input)
            .await
            .map_err(|err| AppError::Io(format!("stdin write failed: {err}")))?;
        stdin
            .flush()
            .await
            .map_err(|err| AppError::Io(format!("stdin flush failed: {err}")))
    }

    /// Close the child's standard input, signalling end of input.
    pub async fn close_stdin(&self) {
        if let Some(mut stdin) = self.stdin.lock().await.take() {
            if let Err(err) = stdin.shutdown().await {
                debug!(pid = self.pid, %err, "stdin shutdown failed");
            }
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ProcessState {
        self.lifecycle.state()
    }

    /// Signals sent to the process so far, in order.
    #[must_use]
    pub fn escalation(&self) -> Vec<Escalation> {
        self.lifecycle.escalation()
    }

    /// Request termination: graceful signal now, forced kill after the
    /// grace window. Returns immediately; a no-op once termination began.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The exit outcome, if the exit protocol has completed.
    #[must_use]
    pub fn try_exit(&self) -> Option<ProcessExit> {
        self.exit_rx.borrow().clone()
    }

    /// Wait for the exit protocol to complete.
    ///
    /// When this resolves, the registry entry is gone and the audit event
    /// has been recorded.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the supervisor task died without
    /// reporting an exit.
    pub async fn wait(&self) -> Result<ProcessExit> {
        let mut rx = self.exit_rx.clone();
        let value = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| AppError::Spawn("supervisor stopped before reporting exit".into()))?;
        let exit: Option<ProcessExit> = (*value).clone();
        exit.ok_or_else(|| AppError::Spawn("exit signal carried no outcome".into()))
    }
}

/// Spawns and supervises external processes.
pub struct ProcessManager {
    registry: Arc<ProcessRegistry>,
    audit_sink: Option<Arc<dyn ProcessAuditSink>>,
    kill_grace: Duration,
    default_timeout: Option<Duration>,
}

impl ProcessManager {
    /// Manager persisting its registry at `registry_path`, without auditing.
    #[must_use]
    pub fn new(registry_path: PathBuf) -> Self {
        Self {
            registry: Arc::new(ProcessRegistry::new(registry_path)),
            audit_sink: None,
            kill_grace: DEFAULT_KILL_GRACE,
            default_timeout: None,
        }
    }

    /// Manager configured from `config`: registry under the project state
    /// directory, grace window and default timeout from `[process]`, and a
    /// JSONL audit writer when auditing is enabled.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Audit` if the audit directory cannot be created.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let mut manager = Self::new(config.registry_path()).with_kill_grace(config.kill_grace());
        if config.process.default_timeout_ms > 0 {
            manager.default_timeout = Some(Duration::from_millis(config.process.default_timeout_ms));
        }
        if config.process.audit {
            let writer = JsonlAuditWriter::for_project(config)?;
            manager = manager.with_audit_sink(Arc::new(writer));
        }
        Ok(manager)
    }

    /// Notify `sink` once per completed process.
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn ProcessAuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    /// Override the grace window between graceful signal and forced kill.
    #[must_use]
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// The live-process registry.
    #[must_use]
    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Spawn `options.command` and supervise it until exit.
    ///
    /// The registry entry is written before this returns and before any
    /// output is read.
    ///
    /// # Errors
    ///
    /// - `AppError::CommandEmpty` if `options.command` is empty.
    /// - `AppError::Spawn` if the OS refuses to start the process.
    /// - `AppError::Io` if the registry entry cannot be persisted; the child
    ///   is killed in that case.
    pub async fn spawn_process(&self, options: SpawnOptions) -> Result<ProcessHandle> {
        if options.command.is_empty() {
            return Err(AppError::CommandEmpty("a command is required".into()));
        }

        let span = info_span!(
            "spawn_process",
            command = %options.command,
            run_id = options.run_id.as_deref(),
            node_id = options.node_id.as_deref(),
        );

        self.spawn_inner(options).instrument(span).await
    }

    async fn spawn_inner(&self, options: SpawnOptions) -> Result<ProcessHandle> {
        let mut cmd = Command::new(&options.command);
        cmd.args(&options.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }
        if let Some(env) = &options.env {
            cmd.env_clear().envs(env);
        }

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|err| {
            AppError::Spawn(format!("failed to spawn {}: {err}", options.command))
        })?;
        let Some(pid) = child.id() else {
            return Err(AppError::Spawn("spawned process reported no pid".into()));
        };

        let record = ProcessRecord {
            pid,
            command: options.command.clone(),
            args: options.args.clone(),
            run_id: options.run_id.clone(),
            node_id: options.node_id.clone(),
            started_at: Utc::now(),
        };
        if let Err(err) = self.registry.append(record).await {
            warn!(pid, %err, "cannot persist process record, killing child");
            child.kill().await.ok();
            return Err(err);
        }

        info!(pid, args = ?options.args, "process spawned");

        let stdin = child.stdin.take();
        let stdout: OutputBuffer = Arc::default();
        let stderr: OutputBuffer = Arc::default();
        let readers = [
            spawn_reader(child.stdout.take(), Arc::clone(&stdout)),
            spawn_reader(child.stderr.take(), Arc::clone(&stderr)),
        ];

        let lifecycle = Arc::new(Lifecycle::new());
        let (exit_tx, exit_rx) = watch::channel(None);
        let cancel = CancellationToken::new();

        let timeout = options
            .timeout_ms
            .map(Duration::from_millis)
            .or(self.default_timeout)
            .filter(|timeout| !timeout.is_zero());

        let supervisor = Supervisor {
            pid,
            options,
            started,
            timeout,
            kill_grace: self.kill_grace,
            registry: Arc::clone(&self.registry),
            audit_sink: self.audit_sink.clone(),
            lifecycle: Arc::clone(&lifecycle),
            cancel: cancel.clone(),
            exit_tx,
        };
        tokio::spawn(supervisor.run(child, readers).in_current_span());

        Ok(ProcessHandle {
            pid,
            stdout,
            stderr,
            stdin: Arc::new(tokio::sync::Mutex::new(stdin)),
            lifecycle,
            exit_rx,
            cancel,
        })
    }

    /// Return every registry entry and empty the registry.
    ///
    /// Call once at host startup: entries present then belong to processes
    /// that were in flight during an unclean shutdown. Liveness checks and
    /// termination are the caller's decision. A second call returns nothing.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the emptied registry cannot be written.
    pub async fn list_orphaned(&self) -> Result<Vec<ProcessRecord>> {
        let orphans = self.registry.drain().await?;
        if !orphans.is_empty() {
            info!(count = orphans.len(), "orphaned process records recovered");
        }
        Ok(orphans)
    }
}

/// Everything the per-process supervisor task owns.
struct Supervisor {
    pid: u32,
    options: SpawnOptions,
    started: Instant,
    timeout: Option<Duration>,
    kill_grace: Duration,
    registry: Arc<ProcessRegistry>,
    audit_sink: Option<Arc<dyn ProcessAuditSink>>,
    lifecycle: Arc<Lifecycle>,
    cancel: CancellationToken,
    exit_tx: watch::Sender<Option<ProcessExit>>,
}

impl Supervisor {
    async fn run(self, mut child: Child, readers: [Option<JoinHandle<()>>; 2]) {
        let deadline = self.timeout.map(|timeout| self.started + timeout);
        let mut deadline_armed = deadline.is_some();
        let mut kill_at: Option<Instant> = None;
        let mut cancel_seen = false;
        let mut timed_out = false;
        let mut cancelled = false;

        let status = loop {
            tokio::select! {
                status = child.wait() => break status,
                () = sleep_until(far_or(deadline)), if deadline_armed => {
                    deadline_armed = false;
                    timed_out = true;
                    info!(pid = self.pid, "timeout elapsed, terminating");
                    if let Some(at) = self.terminate(&mut child) {
                        kill_at = Some(at);
                    }
                }
                () = self.cancel.cancelled(), if !cancel_seen => {
                    cancel_seen = true;
                    if let Some(at) = self.terminate(&mut child) {
                        cancelled = true;
                        info!(pid = self.pid, "cancel requested, terminating");
                        kill_at = Some(at);
                    } else {
                        debug!(pid = self.pid, "cancel ignored, termination already under way");
                    }
                }
                () = sleep_until(far_or(kill_at)), if kill_at.is_some() => {
                    kill_at = None;
                    warn!(pid = self.pid, "grace window elapsed, killing");
                    self.lifecycle.record_escalation(EscalationStep::Kill, self.elapsed_ms());
                    if let Err(err) = child.start_kill() {
                        debug!(pid = self.pid, %err, "kill failed, process likely exited");
                    }
                }
            }
        };
        let duration_ms = self.elapsed_ms();

        drain_readers(self.pid, readers).await;

        self.finish(status, duration_ms, timed_out, cancelled).await;
    }

    /// Send the graceful signal and return the forced-kill deadline, or
    /// `None` if termination was already under way.
    fn terminate(&self, child: &mut Child) -> Option<Instant> {
        if !self.lifecycle.begin_termination() {
            return None;
        }
        self.lifecycle
            .record_escalation(EscalationStep::Terminate, self.elapsed_ms());
        send_graceful(child, self.pid);
        Some(Instant::now() + self.kill_grace)
    }

    /// Exit protocol: registry removal → audit → publish. Runs at most once.
    async fn finish(
        self,
        status: std::io::Result<ExitStatus>,
        duration_ms: u64,
        timed_out: bool,
        cancelled: bool,
    ) {
        if !self.lifecycle.claim_exit() {
            return;
        }

        match self.registry.remove(self.pid).await {
            Ok(true) => {}
            Ok(false) => debug!(pid = self.pid, "process record already gone"),
            Err(err) => warn!(pid = self.pid, %err, "failed to remove process record"),
        }

        let (exit_code, signal) = match status {
            Ok(status) => (status.code(), signal_name(&status)),
            Err(err) => {
                warn!(pid = self.pid, %err, "failed to wait for process");
                (None, None)
            }
        };

        let event = ProcessAuditEvent {
            pid: self.pid,
            command: self.options.command,
            args: self.options.args,
            cwd: self.options.cwd,
            run_id: self.options.run_id,
            node_id: self.options.node_id,
            exit_code,
            signal: signal.clone(),
            duration_ms,
            timed_out,
            cancelled,
            finished_at: Utc::now(),
        };

        if let Some(sink) = self.audit_sink {
            let outcome = tokio::task::spawn_blocking(move || sink.record(&event)).await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(pid = self.pid, %err, "audit sink rejected event"),
                Err(err) => warn!(pid = self.pid, %err, "audit sink task failed"),
            }
        }

        info!(
            pid = self.pid,
            exit_code,
            signal = signal.as_deref(),
            duration_ms,
            timed_out,
            cancelled,
            "process exited"
        );

        self.lifecycle.mark_terminated();
        self.exit_tx.send_replace(Some(ProcessExit {
            exit_code,
            signal,
            timed_out,
            cancelled,
        }));
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Sleep target that never fires when `at` is unset; the branch using it is
/// disabled in that case, but `select!` still builds the future.
fn far_or(at: Option<Instant>) -> Instant {
    at.unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400 * 365))
}

/// Wait for both readers under one shared deadline, then abort whatever is
/// still attached to an open pipe.
async fn drain_readers(pid: u32, readers: [Option<JoinHandle<()>>; 2]) {
    let mut readers: Vec<JoinHandle<()>> = readers.into_iter().flatten().collect();
    let drained = tokio::time::timeout(STDIO_DRAIN_TIMEOUT, async {
        for reader in &mut readers {
            if let Err(err) = reader.await {
                debug!(pid, %err, "stdio reader task failed");
            }
        }
    })
    .await;

    if drained.is_err() {
        debug!(pid, "stdio still open after exit, abandoning readers");
        for reader in &readers {
            reader.abort();
        }
    }
}

fn spawn_reader<R>(reader: Option<R>, buffer: OutputBuffer) -> Option<JoinHandle<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = reader?;
    Some(tokio::spawn(async move {
        let mut chunk = vec![0_u8; READ_CHUNK];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(read) => buffer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&chunk[..read]),
                Err(err) => {
                    debug!(%err, "stdio read failed");
                    break;
                }
            }
        }
    }))
}

fn snapshot(buffer: &OutputBuffer) -> String {
    let bytes = buffer.lock().unwrap_or_else(PoisonError::into_inner);
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(unix)]
fn send_graceful(_child: &mut Child, pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match i32::try_from(pid) {
        Ok(raw) => {
            if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
                debug!(pid, %err, "SIGTERM failed, process likely exited");
            }
        }
        Err(_) => warn!(pid, "pid out of range for signalling"),
    }
}

#[cfg(not(unix))]
fn send_graceful(child: &mut Child, pid: u32) {
    if let Err(err) = child.start_kill() {
        debug!(pid, %err, "terminate failed, process likely exited");
    }
}

#[cfg(unix)]
fn signal_name(status: &ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;

    let raw = status.signal()?;
    Some(
        nix::sys::signal::Signal::try_from(raw)
            .map_or_else(|_| format!("SIG{raw}"), |signal| signal.as_str().to_owned()),
    )
}

#[cfg(not(unix))]
fn signal_name(_status: &ExitStatus) -> Option<String> {
    None
}
