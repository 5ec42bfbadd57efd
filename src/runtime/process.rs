//! Process lifecycle for the wrapped binary
//!
//! [`Executor::execute`] validates a [`CommandSpec`], spawns exactly one
//! process for it and drives the resulting [`Execution`] to a terminal
//! state. Only precondition violations are returned as errors; spawn
//! failures, non-zero exits, timeouts and cancellations are all recorded in
//! the returned execution.

use crate::core::config::{DEFAULT_GRACE_PERIOD, DEFAULT_TIMEOUT_SECS};
use crate::core::{CancelReason, CommandSpec, Error, Execution, ExecutionState, Result, StreamKind};
use crate::runtime::binary::{BinaryCheck, WhichCheck};
use crate::runtime::coerce::effective_args;
use crate::runtime::stream::{capture, ExecutionEvent, ExecutionStream, LineBuffer};
use async_trait::async_trait;
use chrono::Utc;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

/// Caller-side control for a running execution
///
/// Cancelling is idempotent and has no effect once the execution reached a
/// terminal state.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// Anything that can turn a [`CommandSpec`] into a finished [`Execution`]
///
/// The authentication probe and the client talk to the executor through
/// this seam.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: CommandSpec, cancel: CancelHandle) -> Result<Execution>;

    /// Program name used in messages and suggestions
    fn binary(&self) -> &str;
}

/// Spawns and supervises processes of one binary
///
/// Holds no per-execution state, so a single executor can serve any number
/// of concurrent calls.
#[derive(Debug, Clone)]
pub struct Executor {
    binary: String,
    check: Arc<dyn BinaryCheck>,
    default_timeout: Duration,
    grace_period: Duration,
    inject_format: bool,
    spawned: Arc<AtomicUsize>,
}

impl Executor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            check: Arc::new(WhichCheck),
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            grace_period: DEFAULT_GRACE_PERIOD,
            inject_format: true,
            spawned: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Build an executor from the client configuration
    pub fn from_config(config: &crate::core::Config) -> Self {
        Self::new(config.binary.clone())
            .with_default_timeout(config.timeout())
            .with_grace_period(config.grace_period())
            .with_format_injection(config.prefer_structured_output)
    }

    pub fn with_binary_check(mut self, check: Arc<dyn BinaryCheck>) -> Self {
        self.check = check;
        self
    }

    /// Timeout for specs that do not carry their own
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Window for the process group to exit after SIGTERM and for its pipes
    /// to close, after which the group is killed
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Whether `--format=json` is appended for structured-output commands
    pub fn with_format_injection(mut self, inject: bool) -> Self {
        self.inject_format = inject;
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Number of processes this executor (and its clones) has spawned
    pub fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Run `spec` to completion
    ///
    /// # Errors
    ///
    /// Returns a validation error, without spawning anything, when the
    /// binary is missing, the working directory does not exist or the
    /// argument list is empty.
    pub async fn execute(&self, spec: CommandSpec) -> Result<Execution> {
        self.execute_with(spec, CancelHandle::new()).await
    }

    /// Run `spec` to completion, stopping early when `cancel` fires
    pub async fn execute_with(&self, spec: CommandSpec, cancel: CancelHandle) -> Result<Execution> {
        let execution = self.validate(spec)?;
        Ok(self.run_validated(execution, cancel, None).await)
    }

    /// Run `spec` in the background and observe its output as it arrives
    ///
    /// Validation happens before this returns, so a bad spec fails here and
    /// no task is started. Must be called from within a Tokio runtime.
    pub fn stream(&self, spec: CommandSpec, cancel: CancelHandle) -> Result<ExecutionStream> {
        let execution = self.validate(spec)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let executor = self.clone();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            let execution = executor
                .run_validated(execution, task_cancel, Some(tx.clone()))
                .await;
            let _ = tx.send(ExecutionEvent::Finished(Box::new(execution)));
        });

        Ok(ExecutionStream::new(rx, cancel))
    }

    fn validate(&self, spec: CommandSpec) -> Result<Execution> {
        let timeout = spec.timeout_override().unwrap_or(self.default_timeout);
        let mut execution = Execution::new(spec, timeout);
        execution.transition(ExecutionState::Validating);

        let spec = execution.spec();
        if spec.args().is_empty() {
            return Err(Error::InvalidCommand("argument list is empty".into()));
        }
        if !self.check.is_available(&self.binary) {
            return Err(Error::BinaryNotFound(self.binary.clone()));
        }
        if let Some(dir) = spec.working_directory() {
            if !dir.is_dir() {
                return Err(Error::WorkingDirectoryNotFound(dir.to_path_buf()));
            }
        }

        let argv = effective_args(spec, self.inject_format);
        execution.set_argv(argv);
        Ok(execution)
    }

    async fn run_validated(
        &self,
        mut execution: Execution,
        cancel: CancelHandle,
        events: Option<mpsc::UnboundedSender<ExecutionEvent>>,
    ) -> Execution {
        if cancel.is_cancelled() {
            tracing::debug!(execution_id = %execution.id(), "Cancelled before spawn");
            execution.transition(ExecutionState::Running);
            execution.set_cancel_reason(CancelReason::UserRequested);
            execution.transition(ExecutionState::Cancelled);
            return execution;
        }

        let mut command = Command::new(&self.binary);
        command
            .args(execution.argv())
            .envs(execution.spec().environment())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so termination reaches anything the binary forks
        #[cfg(unix)]
        command.process_group(0);
        if let Some(dir) = execution.spec().working_directory() {
            command.current_dir(dir);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!(
                    execution_id = %execution.id(),
                    binary = %self.binary,
                    error = %err,
                    "Failed to spawn process"
                );
                execution.set_failure(format!("failed to spawn {}: {err}", self.binary));
                execution.transition(ExecutionState::Failed);
                return execution;
            }
        };

        self.spawned.fetch_add(1, Ordering::SeqCst);
        let group = ProcessGroup::of(&child);
        execution.set_pid(child.id());
        execution.transition(ExecutionState::Running);
        tracing::info!(
            execution_id = %execution.id(),
            pid = ?execution.pid(),
            command = %execution.argv().join(" "),
            "Spawned {}",
            self.binary
        );

        // Readers attach to the pipes before anything is awaited
        let stdout_buffer = LineBuffer::default();
        let stderr_buffer = LineBuffer::default();
        let readers = [
            child.stdout.take().map(|pipe| {
                let buffer = stdout_buffer.clone();
                tokio::spawn(capture(pipe, StreamKind::Stdout, buffer, events.clone()))
            }),
            child.stderr.take().map(|pipe| {
                let buffer = stderr_buffer.clone();
                tokio::spawn(capture(pipe, StreamKind::Stderr, buffer, events.clone()))
            }),
        ];
        drop(events);

        let deadline = Instant::now() + execution.timeout();
        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = sleep_until(deadline) => Outcome::Cancelled(CancelReason::Timeout),
            _ = cancel.cancelled() => Outcome::Cancelled(CancelReason::UserRequested),
        };

        // One grace window covers both termination and draining the pipes
        let grace_deadline = Instant::now() + self.grace_period;
        if let Outcome::Cancelled(reason) = outcome {
            tracing::info!(
                execution_id = %execution.id(),
                reason = %reason,
                elapsed_ms = (Utc::now() - execution.started_at()).num_milliseconds(),
                "Stopping process"
            );
            terminate(&mut child, group, grace_deadline).await;
        }

        if !drain(readers, grace_deadline).await {
            tracing::warn!(
                execution_id = %execution.id(),
                "Output pipes still open after the grace window, killing process group"
            );
            group.signal(Signal::Kill);
        }
        execution.set_output(
            std::mem::take(&mut *stdout_buffer.lock()),
            std::mem::take(&mut *stderr_buffer.lock()),
        );

        match outcome {
            Outcome::Exited(Ok(status)) => {
                execution.set_exit_code(status.code());
                if status.success() {
                    execution.transition(ExecutionState::Completed);
                } else {
                    if status.code().is_none() {
                        execution.set_failure(describe_signal(&status));
                    }
                    execution.transition(ExecutionState::Failed);
                }
            }
            Outcome::Exited(Err(err)) => {
                execution.set_failure(format!("failed to wait for process: {err}"));
                execution.transition(ExecutionState::Failed);
            }
            Outcome::Cancelled(reason) => {
                execution.set_cancel_reason(reason);
                execution.transition(ExecutionState::Cancelled);
            }
        }

        tracing::debug!(
            execution_id = %execution.id(),
            state = %execution.state(),
            exit_code = ?execution.exit_code(),
            elapsed_ms = execution.elapsed().as_millis() as u64,
            "Execution finished"
        );
        execution
    }
}

#[async_trait]
impl CommandRunner for Executor {
    async fn run(&self, spec: CommandSpec, cancel: CancelHandle) -> Result<Execution> {
        self.execute_with(spec, cancel).await
    }

    fn binary(&self) -> &str {
        &self.binary
    }
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    Cancelled(CancelReason),
}

/// Wait for the reader tasks to hit EOF, aborting them at `deadline`
///
/// Returns false when a reader had to be abandoned, which means something
/// outside the direct child still holds a pipe open.
async fn drain(readers: [Option<JoinHandle<()>>; 2], deadline: Instant) -> bool {
    let mut clean = true;
    for mut reader in readers.into_iter().flatten() {
        if timeout_at(deadline, &mut reader).await.is_err() {
            reader.abort();
            clean = false;
        }
    }
    clean
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Terminate,
    Kill,
}

/// Process group led by a spawned child
#[derive(Debug, Clone, Copy)]
struct ProcessGroup(Option<u32>);

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self(child.id())
    }

    /// Signal every process in the group; a group that is already gone is
    /// ignored
    fn signal(self, signal: Signal) {
        #[cfg(unix)]
        if let Some(pgid) = self.0 {
            let signal = match signal {
                Signal::Terminate => libc::SIGTERM,
                Signal::Kill => libc::SIGKILL,
            };
            // SAFETY: killpg(2) has no memory-safety preconditions. The group
            // id is the pid of a child spawned with process_group(0).
            unsafe {
                libc::killpg(pgid as libc::pid_t, signal);
            }
        }
        #[cfg(not(unix))]
        let _ = (self, signal);
    }
}

/// Ask the process group to stop, then kill it if the child is still alive
/// at `deadline`
async fn terminate(child: &mut Child, group: ProcessGroup, deadline: Instant) {
    group.signal(Signal::Terminate);
    if cfg!(unix) && timeout_at(deadline, child.wait()).await.is_ok() {
        return;
    }
    tracing::warn!(pid = ?child.id(), "Process ignored SIGTERM, killing");

    group.signal(Signal::Kill);
    if let Err(err) = child.start_kill() {
        tracing::debug!(error = %err, "Process already gone");
    }
    let _ = child.wait().await;
}

#[cfg(unix)]
fn describe_signal(status: &ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => format!("process terminated by signal {signal}"),
        None => "process exited without a status code".to_string(),
    }
}

#[cfg(not(unix))]
fn describe_signal(_status: &ExitStatus) -> String {
    "process exited without a status code".to_string()
}
