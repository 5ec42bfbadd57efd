//! # gcloud-sdk-rs
//!
//! A managed execution layer for the `gcloud` command-line tool.
//!
//! Every invocation of the binary goes through one path that validates the
//! request, spawns exactly one process, captures stdout and stderr line by
//! line, enforces a timeout, honours cancellation and turns the outcome into
//! a uniform [`ExecutionResult`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gcloud_sdk_rs::{Client, CommandSpec, Config};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::new(Config::default());
//!
//!     let auth = client.authentication_status().await;
//!     println!("{}", auth.stdout_lines.join("\n"));
//!
//!     let result = client
//!         .run_command(CommandSpec::new(["projects", "list"]).structured_output(true))
//!         .await;
//!     println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
//! }
//! ```
//!
//! ## Lower-level access
//!
//! [`Executor`] runs a single [`CommandSpec`] without the authentication
//! gate, retries or result translation, and [`Executor::stream`] exposes
//! output lines as they arrive.
//!
//! ## Feature Flags
//!
//! - `cli` - the `gcloud-sdk-rs` command-line front end
//! - `full` - everything above

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod core;
pub mod runtime;

#[cfg(feature = "cli")]
#[cfg_attr(docsrs, doc(cfg(feature = "cli")))]
pub mod cli;

pub use crate::core::{
    AuthenticationStatus, CancelReason, ClassifiedError, CommandSpec, Config, ConfigBuilder, Error,
    ErrorClassifier, ErrorKind, Execution, ExecutionId, ExecutionResult, ExecutionState, Matcher,
    OutputLine, Result, StreamKind,
};
pub use crate::runtime::{
    AuthProbe, AutoApprove, BinaryCheck, CancelHandle, Client, ClientBuilder, CommandRunner,
    ConfirmationHandler, ExecutionEvent, ExecutionStream, Executor, StreamOutcome, WhichCheck,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
