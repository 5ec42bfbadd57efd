//! Command-line front end for gcloud-sdk-rs.
//! ## Usage
//!
//! ```bash
//! # Run a command and print parsed JSON output
//! gcloud-sdk-rs run --structured -- projects list
//!
//! # Stream output as it arrives, giving up after 30 seconds
//! gcloud-sdk-rs run --stream --timeout 30 -- compute instances list
//!
//! # Check the active account
//! gcloud-sdk-rs auth
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod output;


pub use app::Cli;
pub use error::{CliError, Result};

/// Version information for the CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
