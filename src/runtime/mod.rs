//! Process execution, output capture and the [`Client`] facade

pub mod auth;
pub mod binary;
pub mod client;
pub mod coerce;
pub mod process;
pub mod stream;

#[cfg(all(test, unix))]
mod test_support;

#[cfg(all(test, unix))]
mod client_test;

pub use auth::AuthProbe;
pub use binary::{BinaryCheck, WhichCheck};
pub use client::{AutoApprove, Client, ClientBuilder, ConfirmationHandler, StreamOutcome};
pub use coerce::{coerce, effective_args, Coerced};
pub use process::{CancelHandle, CommandRunner, Executor};
pub use stream::{ExecutionEvent, ExecutionStream, OutputLineCodec};
