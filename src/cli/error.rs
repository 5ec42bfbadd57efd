use thiserror::Error;

/// Error type for the `gcloud-sdk-rs` command-line front end
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Sdk(#[from] crate::core::Error),
}

impl CliError {
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Get user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        use crate::core::Error;
        match self {
            Self::Sdk(Error::BinaryNotFound(binary)) => format!(
                "'{binary}' was not found. Install the Google Cloud SDK or point --binary at the gcloud executable."
            ),
            Self::Sdk(Error::InvalidConfig(msg)) | Self::Configuration(msg) => format!(
                "Configuration error: {msg}. Run 'gcloud-sdk-rs config path' to locate the config file."
            ),
            Self::InvalidInput(msg) => {
                format!("Invalid input: {msg}. Run 'gcloud-sdk-rs --help' for usage.")
            }
            _ => self.to_string(),
        }
    }
}

/// Convenient result type for the CLI
pub type Result<T> = std::result::Result<T, CliError>;
