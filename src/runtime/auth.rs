//! Authentication probing
//!
//! Runs `auth list --format=json` and `config get-value project` against
//! the wrapped binary and folds the results into an
//! [`AuthenticationStatus`]. Any failure degrades the whole snapshot to
//! "not authenticated"; partial credential state is never reported.

use crate::core::{AuthenticationStatus, CommandSpec, ExecutionState};
use crate::runtime::process::{CancelHandle, CommandRunner};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Literal printed by the binary for a config value that is not set
pub const UNSET_SENTINEL: &str = "(unset)";

/// Time allowed for each diagnostic command
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(20);

/// Why no authentication snapshot could be produced
#[derive(Error, Debug)]
enum SnapshotError {
    #[error("`{command}` could not run: {source}")]
    NotRun {
        command: String,
        source: crate::core::Error,
    },

    #[error("`{command}` ended {state} (exit code {exit_code:?}): {stderr}")]
    Unsuccessful {
        command: String,
        state: ExecutionState,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("unexpected credential list: {0}")]
    CredentialList(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct CredentialRecord {
    account: String,
    #[serde(default)]
    status: Option<String>,
}

/// Queries the wrapped binary for its credential state
#[derive(Clone)]
pub struct AuthProbe {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl std::fmt::Debug for AuthProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthProbe")
            .field("binary", &self.runner.binary())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AuthProbe {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Take a fresh snapshot; never fails
    ///
    /// A broken probe and a genuinely signed-out binary both yield the
    /// unauthenticated snapshot. The reason is logged at `warn` level.
    pub async fn probe(&self) -> AuthenticationStatus {
        match self.try_probe().await {
            Ok(status) => {
                tracing::debug!(
                    authenticated = status.is_authenticated,
                    account = ?status.active_account,
                    project = ?status.project,
                    "Authentication probe finished"
                );
                status
            }
            Err(reason) => {
                tracing::warn!(%reason, "Authentication probe failed, assuming not authenticated");
                AuthenticationStatus::unauthenticated()
            }
        }
    }

    async fn try_probe(&self) -> Result<AuthenticationStatus, SnapshotError> {
        let accounts_output = self
            .run_diagnostic(CommandSpec::new(["auth", "list", "--format=json"]))
            .await?;
        let records = parse_credentials(&accounts_output)?;

        let project_output = self
            .run_diagnostic(CommandSpec::new(["config", "get-value", "project"]))
            .await?;
        let project = parse_config_value(&project_output);

        let active_account = records
            .iter()
            .find(|record| {
                record
                    .status
                    .as_deref()
                    .is_some_and(|status| status.eq_ignore_ascii_case("active"))
            })
            .map(|record| record.account.clone());

        Ok(AuthenticationStatus {
            is_authenticated: active_account.is_some(),
            active_account,
            accounts: records.into_iter().map(|record| record.account).collect(),
            project,
            probed_at: Utc::now(),
        })
    }

    async fn run_diagnostic(&self, spec: CommandSpec) -> Result<String, SnapshotError> {
        let command = spec.args().join(" ");
        let execution = match self
            .runner
            .run(spec.timeout(self.timeout), CancelHandle::new())
            .await
        {
            Ok(execution) => execution,
            Err(source) => return Err(SnapshotError::NotRun { command, source }),
        };

        if execution.state() != ExecutionState::Completed {
            return Err(SnapshotError::Unsuccessful {
                command,
                state: execution.state(),
                exit_code: execution.exit_code(),
                stderr: execution.stderr_text(),
            });
        }
        Ok(execution.stdout_text())
    }
}

fn parse_credentials(stdout: &str) -> Result<Vec<CredentialRecord>, SnapshotError> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(stdout)?)
}

/// Interpret the output of `config get-value`
fn parse_config_value(stdout: &str) -> Option<String> {
    let value = stdout.lines().map(str::trim).rfind(|line| !line.is_empty())?;
    let value = match serde_json::from_str::<serde_json::Value>(value) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(serde_json::Value::Null) => return None,
        _ => value.to_string(),
    };
    if value.is_empty() || value == UNSET_SENTINEL {
        None
    } else {
        Some(value)
    }
}
