use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier of one execution
pub type ExecutionId = Uuid;

/// Immutable description of a command to run against the wrapped binary
///
/// Arguments are relative to the binary and are passed as a flat list, never
/// through a shell. Construct with [`CommandSpec::new`] and the chained
/// setters, then hand the value to the executor, which takes ownership.
///
/// # Examples
///
/// ```rust
/// use gcloud_sdk_rs::CommandSpec;
/// use std::time::Duration;
///
/// let spec = CommandSpec::new(["projects", "list"])
///     .structured_output(true)
///     .timeout(Duration::from_secs(30));
/// assert_eq!(spec.args(), ["projects", "list"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandSpec {
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
    timeout: Option<Duration>,
    requires_confirmation: bool,
    supports_structured_output: bool,
}

impl CommandSpec {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Run the process from `dir` instead of the caller's directory
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable; it overrides any inherited value
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn requires_confirmation(mut self, required: bool) -> Self {
        self.requires_confirmation = required;
        self
    }

    /// Mark the command as accepting `--format=json`
    pub fn structured_output(mut self, supported: bool) -> Self {
        self.supports_structured_output = supported;
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn needs_confirmation(&self) -> bool {
        self.requires_confirmation
    }

    pub fn supports_structured_output(&self) -> bool {
        self.supports_structured_output
    }
}

/// Which pipe a line was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// One captured line of process output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputLine {
    pub stream: StreamKind,
    /// Starts at 1 and increases by one per line within a stream
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub text: String,
    /// Advisory: the line alone parses as a JSON object or array
    pub is_structured: bool,
}

impl OutputLine {
    pub fn new(stream: StreamKind, sequence: u64, text: String) -> Self {
        let is_structured = stream == StreamKind::Stdout && looks_structured(&text);
        Self {
            stream,
            sequence,
            timestamp: Utc::now(),
            text,
            is_structured,
        }
    }
}

fn looks_structured(text: &str) -> bool {
    let trimmed = text.trim();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return false;
    }
    matches!(
        serde_json::from_str::<serde_json::Value>(trimmed),
        Ok(serde_json::Value::Object(_)) | Ok(serde_json::Value::Array(_))
    )
}

/// Lifecycle of an [`Execution`]
///
/// `Created → Validating → Running → {Completed | Failed | Cancelled}`.
/// A spawn error moves `Validating` straight to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Created,
    Validating,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn can_transition_to(self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (Created, Validating)
                | (Validating, Running)
                | (Validating, Failed)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Validating => "validating",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Why a running execution was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CancelReason {
    Timeout,
    UserRequested,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::UserRequested => write!(f, "user-requested"),
        }
    }
}

/// Runtime record of one run of a [`CommandSpec`]
///
/// Only the executor mutates it; once the state is terminal the record is
/// frozen and handed back to the caller.
#[derive(Debug, Clone)]
pub struct Execution {
    id: ExecutionId,
    spec: CommandSpec,
    argv: Vec<String>,
    state: ExecutionState,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    elapsed: Duration,
    timeout: Duration,
    stdout: Vec<OutputLine>,
    stderr: Vec<OutputLine>,
    pid: Option<u32>,
    exit_code: Option<i32>,
    cancel_reason: Option<CancelReason>,
    failure: Option<String>,
}

impl Execution {
    pub(crate) fn new(spec: CommandSpec, timeout: Duration) -> Self {
        let argv = spec.args().to_vec();
        Self {
            id: Uuid::new_v4(),
            spec,
            argv,
            state: ExecutionState::Created,
            started_at: Utc::now(),
            ended_at: None,
            elapsed: Duration::ZERO,
            timeout,
            stdout: Vec::new(),
            stderr: Vec::new(),
            pid: None,
            exit_code: None,
            cancel_reason: None,
            failure: None,
        }
    }

    /// Move to `next`; returns false and leaves the state untouched when the
    /// transition is not allowed
    pub(crate) fn transition(&mut self, next: ExecutionState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                execution_id = %self.id,
                from = %self.state,
                to = %next,
                "Ignoring invalid execution state transition"
            );
            return false;
        }
        tracing::debug!(
            execution_id = %self.id,
            from = %self.state,
            to = %next,
            "Execution state change"
        );
        self.state = next;
        if next.is_terminal() {
            let now = Utc::now();
            self.ended_at = Some(now);
            self.elapsed = (now - self.started_at).to_std().unwrap_or_default();
        }
        true
    }

    pub(crate) fn set_argv(&mut self, argv: Vec<String>) {
        self.argv = argv;
    }

    pub(crate) fn set_pid(&mut self, pid: Option<u32>) {
        self.pid = pid;
    }

    pub(crate) fn set_exit_code(&mut self, code: Option<i32>) {
        self.exit_code = code;
    }

    pub(crate) fn set_cancel_reason(&mut self, reason: CancelReason) {
        self.cancel_reason = Some(reason);
    }

    pub(crate) fn set_failure(&mut self, message: impl Into<String>) {
        self.failure = Some(message.into());
    }

    pub(crate) fn set_output(&mut self, stdout: Vec<OutputLine>, stderr: Vec<OutputLine>) {
        self.stdout = stdout;
        self.stderr = stderr;
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    /// Arguments actually passed to the binary, including any injected
    /// format flag
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Wall time from start to terminal state
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Deadline that applied to this run
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn stdout(&self) -> &[OutputLine] {
        &self.stdout
    }

    pub fn stderr(&self) -> &[OutputLine] {
        &self.stderr
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.cancel_reason
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_reason.is_some()
    }

    /// OS-level failure detail, set when the process could not be spawned
    /// or waited on
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// All stdout text joined with newlines
    pub fn stdout_text(&self) -> String {
        join_lines(&self.stdout)
    }

    pub fn stderr_text(&self) -> String {
        join_lines(&self.stderr)
    }
}

fn join_lines(lines: &[OutputLine]) -> String {
    lines
        .iter()
        .map(|line| line.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Snapshot of the credentials known to the wrapped binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationStatus {
    pub is_authenticated: bool,
    pub active_account: Option<String>,
    pub accounts: Vec<String>,
    pub project: Option<String>,
    pub probed_at: DateTime<Utc>,
}

impl AuthenticationStatus {
    /// The "unknown or not authenticated" snapshot
    pub fn unauthenticated() -> Self {
        Self {
            is_authenticated: false,
            active_account: None,
            accounts: Vec::new(),
            project: None,
            probed_at: Utc::now(),
        }
    }

    /// Whether the snapshot is older than `ttl`
    pub fn is_stale(&self, ttl: Duration) -> bool {
        let age = (Utc::now() - self.probed_at).to_std().unwrap_or_default();
        age >= ttl
    }
}

/// Caller-visible outcome of an operation
///
/// Every outcome, failures included, is reported through this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub command: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub stdout_lines: Vec<String>,
    pub stderr_lines: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_output: Option<serde_json::Value>,
    pub execution_time_ms: u64,
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<CancelReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication_required: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<crate::core::classify::ErrorKind>,
}

impl ExecutionResult {
    /// A failed result for an operation that never spawned a process
    pub fn rejected(command: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            success: false,
            exit_code: None,
            stdout_lines: Vec::new(),
            stderr_lines: Vec::new(),
            structured_output: None,
            execution_time_ms: 0,
            cancelled: false,
            cancel_reason: None,
            authentication_required: None,
            suggestions: Vec::new(),
            error: Some(error.into()),
            error_kind: None,
        }
    }
}
