use crate::cli::config::FileConfig;
use crate::cli::error::{CliError, Result};
use crate::cli::output;
use crate::core::{CommandSpec, ExecutionResult};
use crate::runtime::{CancelHandle, Client, ConfirmationHandler, ExecutionEvent, StreamOutcome};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Run gcloud commands with timeouts, cancellation and classified errors
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Name or path of the gcloud binary
    #[arg(long, global = true, env = "GCLOUD_SDK_RS_BINARY")]
    pub binary: Option<String>,

    /// Custom config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a gcloud command
    Run(RunCommand),

    /// Show the active account and project
    Auth(AuthCommand),

    /// Manage configuration settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Debug)]
pub struct RunCommand {
    /// Print output lines as they arrive
    #[arg(long)]
    pub stream: bool,

    /// Print the result record as JSON
    #[arg(long)]
    pub json: bool,

    /// Timeout in seconds for this command
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Working directory for the process
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Extra environment variable, repeatable
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Request JSON output and parse it
    #[arg(long)]
    pub structured: bool,

    /// Ask before running the command
    #[arg(long)]
    pub confirm: bool,

    /// Arguments passed to gcloud, after `--`
    #[arg(last = true, required = true)]
    pub args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct AuthCommand {
    /// Print the result record as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
}

impl Cli {
    /// Execute the CLI command, returning whether it succeeded
    pub async fn execute(self) -> Result<bool> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => FileConfig::default_path()?,
        };
        let config = FileConfig::load_from_file(&path)?.merge_with_cli_args(&self);
        if !config.output.color {
            colored::control::set_override(false);
        }

        match &self.command {
            Commands::Run(cmd) => cmd.execute(&config).await,
            Commands::Auth(cmd) => cmd.execute(&config).await,
            Commands::Config { action } => {
                match action {
                    ConfigAction::Show => {
                        let rendered = toml::to_string_pretty(&config).map_err(|e| {
                            CliError::configuration(format!("Failed to serialize config: {e}"))
                        })?;
                        print!("{rendered}");
                    }
                    ConfigAction::Path => println!("{}", path.display()),
                }
                Ok(true)
            }
        }
    }
}

impl RunCommand {
    /// Build the command spec described by the flags
    pub fn spec(&self) -> CommandSpec {
        let mut spec = CommandSpec::new(self.args.clone())
            .structured_output(self.structured || self.json)
            .requires_confirmation(self.confirm);
        if let Some(secs) = self.timeout {
            spec = spec.timeout(Duration::from_secs(secs));
        }
        if let Some(dir) = &self.cwd {
            spec = spec.working_dir(dir);
        }
        for (key, value) in &self.env {
            spec = spec.env(key, value);
        }
        spec
    }

    async fn execute(&self, config: &FileConfig) -> Result<bool> {
        let client = Client::builder()
            .config(config.runtime_config()?)
            .confirmation_handler(Arc::new(PromptConfirmation))
            .build()?;

        let cancel = CancelHandle::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, cancelling command");
                on_interrupt.cancel();
            }
        });

        let result = if self.stream {
            self.run_streaming(&client, cancel, config.output.timestamps)
                .await
        } else {
            client.run_command_with(self.spec(), cancel).await
        };

        report(&result, self.json, !self.stream)?;
        Ok(result.success)
    }

    async fn run_streaming(
        &self,
        client: &Client,
        cancel: CancelHandle,
        timestamps: bool,
    ) -> ExecutionResult {
        let mut stream = match client.stream_command(self.spec(), cancel).await {
            StreamOutcome::Started(stream) => stream,
            StreamOutcome::Rejected(result) => return result,
        };

        while let Some(event) = stream.next().await {
            match event {
                ExecutionEvent::Line(line) => {
                    println!("{}", output::render_line(&line, timestamps))
                }
                ExecutionEvent::Finished(execution) => return client.summarize(&execution),
            }
        }
        ExecutionResult::rejected(
            self.args.join(" "),
            "execution ended without reporting a result",
        )
    }
}

impl AuthCommand {
    async fn execute(&self, config: &FileConfig) -> Result<bool> {
        let client = Client::new(config.runtime_config()?);
        let result = client.authentication_status().await;
        report(&result, self.json, true)?;
        Ok(result.authentication_required != Some(true))
    }
}

fn report(result: &ExecutionResult, json: bool, include_output: bool) -> Result<()> {
    if json {
        println!("{}", output::render_json(result)?);
    } else {
        println!("{}", output::render_result(result, include_output));
    }
    Ok(())
}

fn parse_env_pair(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}

/// Asks on the terminal before a command runs
struct PromptConfirmation;

#[async_trait]
impl ConfirmationHandler for PromptConfirmation {
    async fn confirm(&self, spec: &CommandSpec) -> bool {
        let question = format!("Run `{}`? [y/N] ", spec.args().join(" "));
        let answer = tokio::task::spawn_blocking(move || {
            let mut stderr = std::io::stderr();
            let _ = write!(stderr, "{question}");
            let _ = stderr.flush();
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_collects_trailing_args() {
        let cli = Cli::try_parse_from([
            "gcloud-sdk-rs",
            "run",
            "--structured",
            "--timeout",
            "30",
            "--env",
            "CLOUDSDK_CORE_PROJECT=demo",
            "--",
            "projects",
            "list",
            "--limit=5",
        ])
        .unwrap();

        let Commands::Run(run) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(run.args, vec!["projects", "list", "--limit=5"]);

        let spec = run.spec();
        assert!(spec.supports_structured_output());
        assert!(!spec.needs_confirmation());
        assert_eq!(spec.timeout_override(), Some(Duration::from_secs(30)));
        assert_eq!(
            spec.environment().get("CLOUDSDK_CORE_PROJECT").map(String::as_str),
            Some("demo")
        );
    }

    #[test]
    fn test_run_requires_args() {
        assert!(Cli::try_parse_from(["gcloud-sdk-rs", "run"]).is_err());
    }

    #[test]
    fn test_env_pair_parsing() {
        assert_eq!(parse_env_pair("A=b=c"), Ok(("A".into(), "b=c".into())));
        assert_eq!(parse_env_pair("EMPTY="), Ok(("EMPTY".into(), String::new())));
        assert!(parse_env_pair("novalue").is_err());
        assert!(parse_env_pair("=x").is_err());
    }

    #[test]
    fn test_json_implies_structured() {
        let cli = Cli::try_parse_from([
            "gcloud-sdk-rs",
            "run",
            "--json",
            "--confirm",
            "--",
            "version",
        ])
        .unwrap();
        let Commands::Run(run) = cli.command else {
            panic!("expected run");
        };
        let spec = run.spec();
        assert!(spec.supports_structured_output());
        assert!(spec.needs_confirmation());
    }

    #[test]
    fn test_config_subcommands_parse() {
        let cli = Cli::try_parse_from(["gcloud-sdk-rs", "config", "path"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Path
            }
        ));
    }
}
