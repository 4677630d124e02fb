use std::path::PathBuf;

use snafu::Snafu;

/// Errors raised while locating, reading or parsing configuration files.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Failed to open config from {}, error: {source}", filename.display()))]
    OpenConfig { filename: PathBuf, source: std::io::Error },

    #[snafu(display("Failed to parse config from {}, error: {source}", filename.display()))]
    ParseConfig { filename: PathBuf, source: serde_yaml::Error },

    #[snafu(display("Failed to resolve file path {}, error: {source}", file_path.display()))]
    ResolveFilePath { file_path: PathBuf, source: std::io::Error },

    /// None of the configured spawner config paths point at an existing file.
    #[snafu(display("Couldn't find any config file."))]
    SpawnerConfigNotFound,

    #[snafu(display("Failed to open spawner config from {}, error: {source}", filename.display()))]
    OpenSpawnerConfig { filename: PathBuf, source: std::io::Error },

    #[snafu(display("Failed to parse spawner config from {}, error: {source}", filename.display()))]
    ParseSpawnerConfig { filename: PathBuf, source: serde_yaml::Error },

    #[snafu(display("Spawner config {} has no spawnerFormDefaults section", filename.display()))]
    MissingSpawnerDefaults { filename: PathBuf },

    #[snafu(display("Failed to encode spawner defaults as JSON, error: {source}"))]
    EncodeSpawnerDefaults { source: serde_json::Error },
}
