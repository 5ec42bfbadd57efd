use crate::core::{
    AuthenticationStatus, CancelReason, ClassifiedError, CommandSpec, Config, ErrorClassifier,
    ErrorKind, Execution, ExecutionResult, ExecutionState, Result,
};
use crate::runtime::auth::AuthProbe;
use crate::runtime::binary::BinaryCheck;
use crate::runtime::coerce::coerce;
use crate::runtime::process::{CancelHandle, Executor};
use crate::runtime::stream::ExecutionStream;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// Asked before running a command marked as needing confirmation
#[async_trait]
pub trait ConfirmationHandler: Send + Sync {
    /// Return `false` to decline; the command is then never spawned
    async fn confirm(&self, spec: &CommandSpec) -> bool;
}

/// Approves every command
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

#[async_trait]
impl ConfirmationHandler for AutoApprove {
    async fn confirm(&self, _spec: &CommandSpec) -> bool {
        true
    }
}

/// Result of [`Client::stream_command`]
#[derive(Debug)]
pub enum StreamOutcome {
    Started(ExecutionStream),
    /// The command was refused before a process existed
    Rejected(ExecutionResult),
}

/// High-level entry point for running commands against the wrapped binary
///
/// The `Client` composes the executor, authentication probe, error
/// classifier and output coercion into two operations:
/// [`run_command`](Self::run_command) and
/// [`authentication_status`](Self::authentication_status). Neither returns
/// an error; every outcome is described by an [`ExecutionResult`].
///
/// # Examples
///
/// ```rust,no_run
/// # use gcloud_sdk_rs::{Client, CommandSpec, Config};
/// # #[tokio::main]
/// # async fn main() {
/// let client = Client::new(Config::default());
/// let result = client
///     .run_command(CommandSpec::new(["projects", "list"]).structured_output(true))
///     .await;
///
/// if result.success {
///     println!("{:#?}", result.structured_output);
/// } else {
///     eprintln!("{}", result.error.unwrap_or_default());
///     for suggestion in result.suggestions {
///         eprintln!("  - {suggestion}");
///     }
/// }
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    config: Arc<Config>,
    executor: Executor,
    probe: AuthProbe,
    classifier: Arc<ErrorClassifier>,
    confirmation: Arc<dyn ConfirmationHandler>,
    auth_cache: Arc<Mutex<Option<AuthenticationStatus>>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a new client with the given configuration
    pub fn new(config: Config) -> Self {
        let executor = Executor::from_config(&config);
        Self::from_parts(config, executor, None, None)
    }

    /// Create a new client builder for fluent configuration
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    fn from_parts(
        config: Config,
        executor: Executor,
        classifier: Option<ErrorClassifier>,
        confirmation: Option<Arc<dyn ConfirmationHandler>>,
    ) -> Self {
        let probe = AuthProbe::new(Arc::new(executor.clone()));
        let classifier =
            classifier.unwrap_or_else(|| ErrorClassifier::for_binary(config.binary.clone()));
        Self {
            config: Arc::new(config),
            executor,
            probe,
            classifier: Arc::new(classifier),
            confirmation: confirmation.unwrap_or_else(|| Arc::new(AutoApprove)),
            auth_cache: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Run a command and wait for its result
    pub async fn run_command(&self, spec: CommandSpec) -> ExecutionResult {
        self.run_command_with(spec, CancelHandle::new()).await
    }

    /// Run a command, stopping early when `cancel` fires
    ///
    /// Retryable failures are re-run up to `max_retries` times; each attempt
    /// is a separate execution of its own copy of `spec`. Cancelling during
    /// the delay between attempts returns the last failure without starting
    /// another process.
    pub async fn run_command_with(
        &self,
        spec: CommandSpec,
        cancel: CancelHandle,
    ) -> ExecutionResult {
        if let Some(rejection) = self.preflight(&spec).await {
            return rejection;
        }

        let mut attempt = 0;
        loop {
            let execution = match self
                .executor
                .execute_with(spec.clone(), cancel.clone())
                .await
            {
                Ok(execution) => execution,
                Err(err) => {
                    tracing::warn!(error = %err, "Command rejected during validation");
                    let command = self.display_command(spec.args());
                    return ExecutionResult::rejected(command, err.to_string());
                }
            };

            if execution.state() != ExecutionState::Failed {
                return self.summarize(&execution);
            }

            let classified = self.classifier.classify(&execution);
            if classified.kind == ErrorKind::AuthenticationRequired {
                self.invalidate_auth_cache();
            }
            if !classified.retryable || attempt >= self.config.max_retries {
                return self.summarize_with(&execution, Some(classified));
            }

            attempt += 1;
            tracing::info!(
                kind = %classified.kind,
                attempt,
                max_retries = self.config.max_retries,
                "Retrying failed command"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Cancelled while waiting to retry");
                    return self.summarize_with(&execution, Some(classified));
                }
                _ = tokio::time::sleep(self.config.retry_delay()) => {}
            }
        }
    }

    /// Start a command and observe its output incrementally
    ///
    /// Pass the final [`Execution`] from the stream to
    /// [`summarize`](Self::summarize) to obtain the usual result record.
    pub async fn stream_command(
        &self,
        spec: CommandSpec,
        cancel: CancelHandle,
    ) -> StreamOutcome {
        if let Some(rejection) = self.preflight(&spec).await {
            return StreamOutcome::Rejected(rejection);
        }
        let command = self.display_command(spec.args());
        match self.executor.stream(spec, cancel) {
            Ok(stream) => StreamOutcome::Started(stream),
            Err(err) => {
                StreamOutcome::Rejected(ExecutionResult::rejected(command, err.to_string()))
            }
        }
    }

    /// Report the current credential state of the wrapped binary
    ///
    /// `structured_output` carries the [`AuthenticationStatus`] snapshot.
    pub async fn authentication_status(&self) -> ExecutionResult {
        let started = Instant::now();
        let status = self.auth_status().await;
        let mut result = ExecutionResult::rejected(
            format!("{} auth list", self.config.binary),
            String::new(),
        );
        result.error = None;
        result.success = true;
        result.execution_time_ms = started.elapsed().as_millis() as u64;
        result.authentication_required = Some(!status.is_authenticated);
        if !status.is_authenticated {
            result.suggestions = self.classifier.login_suggestions();
        }
        result.stdout_lines = describe_status(&status);
        result.structured_output = serde_json::to_value(&status).ok();
        result
    }

    /// Cached authentication snapshot, re-probed once older than the TTL
    pub async fn auth_status(&self) -> AuthenticationStatus {
        let ttl = self.config.auth_cache_ttl();
        if let Some(status) = self.auth_cache.lock().as_ref() {
            if !status.is_stale(ttl) {
                tracing::debug!("Authentication cache hit");
                return status.clone();
            }
        }

        tracing::debug!("Authentication cache miss, probing");
        let status = self.probe.probe().await;
        *self.auth_cache.lock() = Some(status.clone());
        status
    }

    /// Forget the cached authentication snapshot
    pub fn invalidate_auth_cache(&self) {
        self.auth_cache.lock().take();
    }

    /// Translate a finished execution into the caller-visible result
    ///
    /// Only failed executions are classified. A timeout is reported through
    /// `cancel_reason` with advice on the limit, not as an error kind.
    pub fn summarize(&self, execution: &Execution) -> ExecutionResult {
        let classified = (execution.state() == ExecutionState::Failed)
            .then(|| self.classifier.classify(execution));
        self.summarize_with(execution, classified)
    }

    fn summarize_with(
        &self,
        execution: &Execution,
        classified: Option<ClassifiedError>,
    ) -> ExecutionResult {
        let coerced = coerce(execution);
        let elapsed_ms = execution.elapsed().as_millis() as u64;
        let stderr_lines = execution
            .stderr()
            .iter()
            .map(|line| line.text.clone())
            .collect();

        let error = match (execution.state(), execution.cancel_reason()) {
            (ExecutionState::Cancelled, Some(CancelReason::Timeout)) => Some(format!(
                "timed out after {elapsed_ms} ms (limit {} ms)",
                execution.timeout().as_millis()
            )),
            (ExecutionState::Cancelled, _) => {
                Some(format!("cancelled by user after {elapsed_ms} ms"))
            }
            (ExecutionState::Failed, _) => Some(failure_message(execution, classified.as_ref())),
            _ => None,
        };

        let suggestions = match (&classified, execution.cancel_reason()) {
            (Some(classified), _) => classified.suggestions.clone(),
            (None, Some(CancelReason::Timeout)) => self.classifier.timeout_suggestions(execution),
            (None, _) => Vec::new(),
        };

        ExecutionResult {
            command: self.display_command(execution.argv()),
            success: execution.state() == ExecutionState::Completed,
            exit_code: execution.exit_code(),
            stdout_lines: coerced.lines,
            stderr_lines,
            structured_output: coerced.structured,
            execution_time_ms: elapsed_ms,
            cancelled: execution.is_cancelled(),
            cancel_reason: execution.cancel_reason(),
            authentication_required: classified
                .as_ref()
                .map(|c| c.kind == ErrorKind::AuthenticationRequired),
            suggestions,
            error,
            error_kind: classified.map(|c| c.kind),
        }
    }

    /// Confirmation and authentication checks that run before anything is
    /// spawned
    async fn preflight(&self, spec: &CommandSpec) -> Option<ExecutionResult> {
        let command = self.display_command(spec.args());

        if self.config.require_authentication && !self.config.is_auth_exempt(spec.args()) {
            let status = self.auth_status().await;
            if !status.is_authenticated {
                tracing::info!(%command, "Refusing to run command without an active account");
                let mut result = ExecutionResult::rejected(
                    command,
                    format!("{} has no active account", self.config.binary),
                );
                result.authentication_required = Some(true);
                result.suggestions = self.classifier.login_suggestions();
                result.error_kind = Some(ErrorKind::AuthenticationRequired);
                return Some(result);
            }
        }

        if spec.needs_confirmation() && !self.confirmation.confirm(spec).await {
            tracing::info!(%command, "Command declined");
            return Some(ExecutionResult::rejected(command, "command declined"));
        }

        None
    }

    fn display_command(&self, args: &[String]) -> String {
        std::iter::once(self.config.binary.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn failure_message(execution: &Execution, classified: Option<&ClassifiedError>) -> String {
    match classified {
        Some(classified) if classified.kind != ErrorKind::Unknown => {
            let detail = classified.lines.first().cloned().unwrap_or_default();
            format!("{}: {detail}", classified.kind)
        }
        _ => {
            let stderr = execution.stderr_text();
            if !stderr.is_empty() {
                stderr
            } else if let Some(failure) = execution.failure() {
                failure.to_string()
            } else {
                format!("exited with code {:?}", execution.exit_code())
            }
        }
    }
}

fn describe_status(status: &AuthenticationStatus) -> Vec<String> {
    let mut lines = Vec::new();
    match &status.active_account {
        Some(account) => lines.push(format!("Active account: {account}")),
        None => lines.push("No active account".to_string()),
    }
    for account in &status.accounts {
        lines.push(format!("Credentialed account: {account}"));
    }
    if let Some(project) = &status.project {
        lines.push(format!("Project: {project}"));
    }
    lines
}

/// Builder for creating `Client` instances with fluent configuration
///
/// # Examples
///
/// ```rust,no_run
/// # use gcloud_sdk_rs::Client;
/// let client = Client::builder()
///     .binary("/usr/lib/google-cloud-sdk/bin/gcloud")
///     .timeout_secs(120)
///     .max_retries(2)
///     .build()
///     .expect("valid configuration");
/// ```
#[derive(Default)]
pub struct ClientBuilder {
    config: Config,
    classifier: Option<ErrorClassifier>,
    confirmation: Option<Arc<dyn ConfirmationHandler>>,
    binary_check: Option<Arc<dyn BinaryCheck>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration directly
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.config.binary = binary.into();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn require_authentication(mut self, required: bool) -> Self {
        self.config.require_authentication = required;
        self
    }

    /// Replace the default stderr matchers
    pub fn classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn confirmation_handler(mut self, handler: Arc<dyn ConfirmationHandler>) -> Self {
        self.confirmation = Some(handler);
        self
    }

    pub fn binary_check(mut self, check: Arc<dyn BinaryCheck>) -> Self {
        self.binary_check = Some(check);
        self
    }

    /// Build the final client instance
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    pub fn build(self) -> Result<Client> {
        self.config.validate()?;
        let mut executor = Executor::from_config(&self.config);
        if let Some(check) = self.binary_check {
            executor = executor.with_binary_check(check);
        }
        Ok(Client::from_parts(
            self.config,
            executor,
            self.classifier,
            self.confirmation,
        ))
    }
}
