use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default binary wrapped by the execution layer
pub const DEFAULT_BINARY: &str = "gcloud";

/// Default command timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Time allowed between the graceful termination signal and the forced kill
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Default lifetime of a cached authentication snapshot
pub const DEFAULT_AUTH_CACHE_TTL_SECS: u64 = 30;

/// Upper bound for the authentication cache lifetime
pub const MAX_AUTH_CACHE_TTL_SECS: u64 = 60;

/// Configuration injected into the [`Client`](crate::Client) at construction
///
/// The execution layer never reads ambient configuration on its own; every
/// tunable value flows through this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Program name or path of the wrapped binary
    pub binary: String,
    /// Timeout applied when a `CommandSpec` does not carry its own
    pub timeout_secs: u64,
    /// Append `--format=json` to commands that support structured output
    pub prefer_structured_output: bool,
    /// How many times a retryable failure is re-run
    pub max_retries: u32,
    /// Delay between retries
    pub retry_delay_ms: u64,
    /// Lifetime of the cached authentication snapshot
    pub auth_cache_ttl_secs: u64,
    /// Grace window between SIGTERM and SIGKILL
    pub grace_period_ms: u64,
    /// Refuse to run non-exempt commands while unauthenticated
    pub require_authentication: bool,
    /// Top-level commands that never need credentials
    pub auth_exempt_commands: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            prefer_structured_output: true,
            max_retries: 0,
            retry_delay_ms: 500,
            auth_cache_ttl_secs: DEFAULT_AUTH_CACHE_TTL_SECS,
            grace_period_ms: DEFAULT_GRACE_PERIOD.as_millis() as u64,
            require_authentication: true,
            auth_exempt_commands: default_exempt_commands(),
        }
    }
}

fn default_exempt_commands() -> Vec<String> {
    ["auth", "config", "version", "info", "help", "components", "init"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Config {
    /// Create a new configuration builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Check the configuration for values the executor cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.binary.trim().is_empty() {
            return Err(Error::InvalidConfig("binary must not be empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "timeout_secs must be greater than zero".into(),
            ));
        }
        if self.auth_cache_ttl_secs == 0 || self.auth_cache_ttl_secs > MAX_AUTH_CACHE_TTL_SECS {
            return Err(Error::InvalidConfig(format!(
                "auth_cache_ttl_secs must be between 1 and {MAX_AUTH_CACHE_TTL_SECS}"
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn auth_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.auth_cache_ttl_secs)
    }

    /// Whether `args` names a command that can run without credentials
    pub fn is_auth_exempt(&self, args: &[String]) -> bool {
        match args.first() {
            Some(first) => self.auth_exempt_commands.iter().any(|c| c == first),
            None => true,
        }
    }
}

/// Fluent builder for [`Config`]
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Program name or path of the wrapped binary
    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.config.binary = binary.into();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn prefer_structured_output(mut self, prefer: bool) -> Self {
        self.config.prefer_structured_output = prefer;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn retry_delay_ms(mut self, delay_ms: u64) -> Self {
        self.config.retry_delay_ms = delay_ms;
        self
    }

    pub fn auth_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.config.auth_cache_ttl_secs = secs;
        self
    }

    pub fn grace_period_ms(mut self, millis: u64) -> Self {
        self.config.grace_period_ms = millis;
        self
    }

    pub fn require_authentication(mut self, required: bool) -> Self {
        self.config.require_authentication = required;
        self
    }

    pub fn auth_exempt_commands(mut self, commands: Vec<String>) -> Self {
        self.config.auth_exempt_commands = commands;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when a value is out of range
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
