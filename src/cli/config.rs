use crate::cli::error::{CliError, Result};
use crate::core::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings file for the gcloud-sdk-rs CLI
///
/// The `[runtime]` table is the library [`Config`] verbatim; the rest only
/// affects how the CLI presents results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    /// Default verbosity level
    #[serde(default)]
    pub verbose: bool,

    /// Execution settings handed to the client
    #[serde(default)]
    pub runtime: Config,

    /// Output formatting preferences
    #[serde(default)]
    pub output: OutputDefaults,
}

/// Output formatting defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDefaults {
    /// Enable colored output by default
    #[serde(default = "default_true")]
    pub color: bool,

    /// Show line timestamps when streaming
    #[serde(default)]
    pub timestamps: bool,
}

impl Default for OutputDefaults {
    fn default() -> Self {
        Self {
            color: default_true(),
            timestamps: false,
        }
    }
}

impl FileConfig {
    /// Load configuration from file, writing defaults if it does not exist
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            let config = Self::default();
            config.save_to_file(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| CliError::configuration(format!("Failed to parse config file: {e}")))
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| CliError::configuration(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        directories::ProjectDirs::from("", "", "gcloud-sdk-rs")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .ok_or_else(|| CliError::configuration("could not determine a home directory"))
    }

    /// Load configuration from the default location
    pub fn load_default() -> Result<Self> {
        Self::load_from_file(Self::default_path()?)
    }

    /// Merge with command-line arguments, giving priority to CLI args
    pub fn merge_with_cli_args(mut self, cli_args: &crate::cli::app::Cli) -> Self {
        if cli_args.verbose {
            self.verbose = true;
        }
        if let Some(binary) = &cli_args.binary {
            self.runtime.binary = binary.clone();
        }
        if cli_args.no_color {
            self.output.color = false;
        }
        self
    }

    /// Validated runtime configuration for the client
    pub fn runtime_config(&self) -> Result<Config> {
        self.runtime.validate()?;
        Ok(self.runtime.clone())
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::app::Cli;
    use clap::Parser;
    use tempfile::tempdir;

    #[test]
    fn test_config_default() {
        let config = FileConfig::default();
        assert!(!config.verbose);
        assert!(config.output.color);
        assert_eq!(config.runtime.binary, "gcloud");
        assert_eq!(config.runtime.timeout_secs, 60);
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut config = FileConfig::default();
        config.verbose = true;
        config.runtime.timeout_secs = 120;
        config.runtime.max_retries = 3;
        config.output.timestamps = true;

        config.save_to_file(&config_path).unwrap();
        let loaded = FileConfig::load_from_file(&config_path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_file_creation() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let config = FileConfig::load_from_file(&config_path).unwrap();

        assert!(config_path.exists());
        assert_eq!(config, FileConfig::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "[runtime]\nmax_retries = 2\n").unwrap();

        let config = FileConfig::load_from_file(&config_path).unwrap();

        assert_eq!(config.runtime.max_retries, 2);
        assert_eq!(config.runtime.binary, "gcloud");
        assert!(config.output.color);
    }

    #[test]
    fn test_malformed_file_is_configuration_error() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "runtime = [not toml").unwrap();

        let err = FileConfig::load_from_file(&config_path).unwrap_err();
        assert!(matches!(err, CliError::Configuration(_)));
    }

    #[test]
    fn test_cli_args_win() {
        let cli = Cli::try_parse_from([
            "gcloud-sdk-rs",
            "--verbose",
            "--no-color",
            "--binary",
            "/opt/google-cloud-sdk/bin/gcloud",
            "auth",
        ])
        .unwrap();

        let config = FileConfig::default().merge_with_cli_args(&cli);

        assert!(config.verbose);
        assert!(!config.output.color);
        assert_eq!(config.runtime.binary, "/opt/google-cloud-sdk/bin/gcloud");
    }

    #[test]
    fn test_invalid_runtime_config_is_rejected() {
        let mut config = FileConfig::default();
        config.runtime.auth_cache_ttl_secs = 600;
        assert!(matches!(
            config.runtime_config(),
            Err(CliError::Sdk(crate::core::Error::InvalidConfig(_)))
        ));
    }
}
