use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the execution layer before a process exists
///
/// Everything that happens after a successful spawn is captured inside the
/// returned [`Execution`](crate::core::Execution) instead of surfacing here.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Binary not found: {0}. Make sure it is installed and on PATH")]
    BinaryNotFound(String),

    #[error("Working directory does not exist: {}", .0.display())]
    WorkingDirectoryNotFound(PathBuf),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error belongs to the `validation` category, raised before
    /// any process was spawned
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::BinaryNotFound(_) | Self::WorkingDirectoryNotFound(_) | Self::InvalidCommand(_)
        )
    }

    /// Short machine-readable category name
    pub fn category(&self) -> &'static str {
        match self {
            Self::BinaryNotFound(_)
            | Self::WorkingDirectoryNotFound(_)
            | Self::InvalidCommand(_) => "validation",
            Self::InvalidConfig(_) => "configuration",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_flagged() {
        assert!(Error::BinaryNotFound("gcloud".into()).is_validation());
        assert!(Error::WorkingDirectoryNotFound(PathBuf::from("/nope")).is_validation());
        assert!(Error::InvalidCommand("empty".into()).is_validation());
        assert!(!Error::InvalidConfig("bad".into()).is_validation());
    }

    #[test]
    fn test_error_display_messages() {
        let err = Error::WorkingDirectoryNotFound(PathBuf::from("/does/not/exist"));
        assert_eq!(
            err.to_string(),
            "Working directory does not exist: /does/not/exist"
        );
        assert_eq!(err.category(), "validation");

        let err = Error::BinaryNotFound("gcloud".into());
        assert!(err.to_string().contains("gcloud"));
    }

    #[test]
    fn test_error_conversions() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.category(), "io");

        let json_err = serde_json::from_str::<i32>("nope").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
