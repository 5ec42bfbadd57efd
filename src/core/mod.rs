//! Domain types shared by the runtime and the CLI

pub mod classify;
pub mod config;
pub mod error;
pub mod types;

pub use classify::{ClassifiedError, ErrorClassifier, ErrorKind, Matcher};
pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result};
pub use types::{
    AuthenticationStatus, CancelReason, CommandSpec, Execution, ExecutionId, ExecutionResult,
    ExecutionState, OutputLine, StreamKind,
};
