//! Command line interface for the `dendrite` notebook backend.
//!
//! Serving the HTTP API is the default action: running `dendrite` with no
//! subcommand loads the configuration, connects to the cluster and binds the
//! listener. The remaining subcommands are small local utilities, apart from
//! `version` which also reports the Kubernetes API server version.
//!
//! # Examples
//!
//! ```bash
//! # Serve the HTTP API with the default configuration
//! dendrite
//!
//! # Serve with an explicit configuration file
//! dendrite serve --config /etc/dendrite/config.yaml
//!
//! # Print the default configuration in YAML format
//! dendrite default-config
//!
//! # Generate shell completions
//! dendrite completions zsh
//! ```

pub mod error;

use std::{io::Write, path::PathBuf, sync::Arc};

use clap::{CommandFactory, Parser, Subcommand};
use snafu::ResultExt;
use tokio::runtime::Runtime;

pub use self::error::Error;
use crate::{config::Config, gateway::KubeGateway, server};

/// `Cli` is the entry point for the dendrite backend.
///
/// It parses command-line arguments and either serves the HTTP API or runs
/// one of the auxiliary subcommands.
#[derive(Parser)]
#[command(
    name = dendrite_base::CLI_PROGRAM_NAME,
    author,
    version,
    about = "Dendrite: a REST backend managing notebook servers on Kubernetes.",
    long_about = "Dendrite serves the HTTP API used by the notebook frontend to manage \
                  notebook servers, ad-hoc containers, SSH endpoints and browser terminal \
                  sessions on a Kubernetes cluster.",
    color = clap::ColorChoice::Always
)]
pub struct Cli {
    /// The subcommand to execute. Serves the HTTP API when absent.
    #[clap(subcommand)]
    commands: Option<Commands>,

    /// Path to the configuration file.
    ///
    /// Defaults to `~/.config/dendrite/config.yaml` or the path specified by
    /// the `DENDRITE_CONFIG_FILE_PATH` environment variable.
    #[clap(
        long = "config",
        short = 'c',
        env = "DENDRITE_CONFIG_FILE_PATH",
        help = "Specify a configuration file. Defaults to ~/.config/dendrite/config.yaml or \
                DENDRITE_CONFIG_FILE_PATH env var."
    )]
    config_file: Option<PathBuf>,

    /// Sets the logging level for the application.
    ///
    /// Supported levels include `info`, `debug`, and `trace`.
    #[clap(
        long = "log-level",
        env = "DENDRITE_LOG_LEVEL",
        help = "Set the logging level (e.g., info, debug, trace)."
    )]
    log_level: Option<tracing::Level>,
}

/// `Commands` enumerates the available subcommands for the dendrite backend.
#[derive(Clone, Subcommand)]
pub enum Commands {
    /// Serves the HTTP API until shutdown.
    #[command(about = "Serve the HTTP API (the default when no subcommand is given)")]
    Serve,

    /// Displays client and server version information.
    #[command(about = "Display client and server version information")]
    Version {
        /// If true, shows only the client version and does not require a
        /// cluster connection.
        #[clap(long = "client", help = "If true, shows client version only (no cluster required).")]
        client: bool,
    },

    /// Generates a shell completion script for the specified shell.
    #[command(about = "Generate shell completion script for the specified shell (bash, zsh, fish)")]
    Completions { shell: clap_complete::Shell },

    /// Outputs the default configuration in YAML format to standard output.
    #[command(about = "Output the default configuration in YAML format")]
    DefaultConfig,
}

impl Default for Cli {
    /// Creates a new `Cli` instance by parsing command-line arguments.
    fn default() -> Self { Self::parse() }
}

impl Cli {
    /// Loads the application configuration, applying any overrides from CLI
    /// arguments.
    ///
    /// If a configuration file path is provided via the `--config` flag or
    /// `DENDRITE_CONFIG_FILE_PATH` environment variable, it is used.
    /// Otherwise the default search locations are probed. The `log_level`
    /// from CLI arguments (if present) overrides the configuration file's
    /// setting.
    ///
    /// # Errors
    ///
    /// Returns an `Error` if the configuration file cannot be loaded or
    /// parsed.
    fn load_config(&self) -> Result<Config, Error> {
        let mut config =
            Config::load(self.config_file.clone().unwrap_or_else(Config::search_config_file_path))?;

        if let Some(log_level) = self.log_level {
            config.log.level = log_level;
        }

        Ok(config)
    }

    /// Executes the selected subcommand, serving the HTTP API when none is
    /// given.
    ///
    /// `Version --client`, `Completions` and `DefaultConfig` are handled
    /// synchronously without touching the cluster. Everything else loads the
    /// configuration, initializes logging and the Kubernetes client, and runs
    /// inside a fresh tokio runtime.
    ///
    /// # Returns
    ///
    /// A `Result` with the process exit code on success, or an `Error` if an
    /// unrecoverable issue occurs during execution.
    ///
    /// # Errors
    ///
    /// Returns an `Error` if:
    /// - The configuration cannot be loaded via `load_config`.
    /// - The Kubernetes client cannot be initialized (`KubeConfigSnafu`).
    /// - The tokio runtime fails to initialize (`InitializeTokioRuntimeSnafu`).
    /// - The HTTP server terminates abnormally.
    ///
    /// # Panics
    ///
    /// - This method `expect`s on `std::io::stdout().write_all()` operations.
    ///   In a typical CLI environment, writing to `stdout` is expected to
    ///   succeed.
    pub fn run(self) -> Result<i32, Error> {
        let client_version = Self::command().get_version().unwrap_or_default().to_string();
        match self.commands {
            Some(Commands::Version { client }) if client => {
                std::io::stdout()
                    .write_all(Self::command().render_long_version().as_bytes())
                    .expect("Failed to write to stdout");
                std::io::stdout()
                    .write_all(format!("Client Version: {client_version}\n").as_bytes())
                    .expect("Failed to write to stdout");

                return Ok(0);
            }
            Some(Commands::Completions { shell }) => {
                let mut app = Self::command();
                let bin_name = app.get_name().to_string();
                clap_complete::generate(shell, &mut app, bin_name, &mut std::io::stdout());
                return Ok(0);
            }
            Some(Commands::DefaultConfig) => {
                let rendered = serde_yaml::to_string(&Config::default())
                    .context(error::SerializeDefaultConfigSnafu)?;
                std::io::stdout()
                    .write_all(rendered.as_bytes())
                    .expect("Failed to write to stdout");
                return Ok(0);
            }
            _ => {}
        }

        let config = self.load_config()?;
        config.log.registry();

        let fut = async move {
            let kube_client = kube::Client::try_default().await.context(error::KubeConfigSnafu)?;
            match self.commands {
                Some(Commands::Version { .. }) => {
                    let server_version = kube_client.apiserver_version().await.map_or_else(
                        |_| "unknown".to_string(),
                        |info| format!("{}.{}", info.major, info.minor),
                    );
                    let info = format!(
                        "Client Version: {client_version}\nServer Version: {server_version}\n",
                    );
                    std::io::stdout()
                        .write_all(Self::command().render_long_version().as_bytes())
                        .expect("Failed to write to stdout");
                    std::io::stdout()
                        .write_all(info.as_bytes())
                        .expect("Failed to write to stdout");
                }
                _ => server::serve(Arc::new(KubeGateway::new(kube_client)), config).await?,
            }

            Ok(0)
        };

        Runtime::new().context(error::InitializeTokioRuntimeSnafu)?.block_on(fut)
    }
}
