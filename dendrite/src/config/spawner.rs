//! Spawner form defaults served to the notebook creation UI.
//!
//! The production configuration is mounted on the server's pod via a
//! ConfigMap, so the file can change while the server runs. A small TTL
//! cache keeps the server from re-reading it on every request.

use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use dendrite_base::consts;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use tokio::sync::Mutex;

use crate::config::error::{self, Error};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnerConfig {
    /// Candidate configuration files, tried in order. The first one that
    /// exists wins.
    #[serde(default = "SpawnerConfig::default_config_paths")]
    pub config_paths: Vec<PathBuf>,

    /// Seconds a loaded configuration is served from cache before the file
    /// is consulted again.
    #[serde(default = "SpawnerConfig::default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            config_paths: Self::default_config_paths(),
            cache_ttl_seconds: Self::default_cache_ttl_seconds(),
        }
    }
}

impl SpawnerConfig {
    #[must_use]
    pub fn default_config_paths() -> Vec<PathBuf> {
        vec![
            PathBuf::from(consts::SPAWNER_UI_CONFIG_PATH),
            PathBuf::from(consts::SPAWNER_UI_CONFIG_DEV_PATH),
        ]
    }

    #[inline]
    #[must_use]
    pub const fn default_cache_ttl_seconds() -> u64 { consts::SPAWNER_UI_CONFIG_TTL.as_secs() }
}

/// Source of the current instant, swapped out in tests.
trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant { Instant::now() }
}

struct CachedDefaults {
    loaded_at: Instant,
    defaults: serde_json::Value,
}

/// TTL cache over the `spawnerFormDefaults` section of the spawner UI
/// configuration file. Only successful loads are cached.
pub struct SpawnerConfigCache {
    paths: Vec<PathBuf>,
    ttl: Duration,
    clock: Box<dyn Clock>,
    cached: Mutex<Option<CachedDefaults>>,
}

impl SpawnerConfigCache {
    #[must_use]
    pub fn new(config: &SpawnerConfig) -> Self { Self::with_clock(config, Box::new(SystemClock)) }

    fn with_clock(config: &SpawnerConfig, clock: Box<dyn Clock>) -> Self {
        Self {
            paths: config.config_paths.clone(),
            ttl: Duration::from_secs(config.cache_ttl_seconds),
            clock,
            cached: Mutex::new(None),
        }
    }

    /// Returns the spawner form defaults, re-reading the configuration file
    /// once the cached copy is older than the TTL.
    pub async fn get(&self) -> Result<serde_json::Value, Error> {
        let now = self.clock.now();
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if now.duration_since(entry.loaded_at) < self.ttl {
                return Ok(entry.defaults.clone());
            }
        }

        let defaults = self.load()?;
        *cached = Some(CachedDefaults { loaded_at: now, defaults: defaults.clone() });
        Ok(defaults)
    }

    fn load(&self) -> Result<serde_json::Value, Error> {
        for path in &self.paths {
            let contents = match std::fs::read(path) {
                Ok(contents) => contents,
                Err(source) if source.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(source)
                        .context(error::OpenSpawnerConfigSnafu { filename: path.clone() });
                }
            };

            let config: serde_yaml::Value = serde_yaml::from_slice(&contents)
                .context(error::ParseSpawnerConfigSnafu { filename: path.clone() })?;
            let defaults = config
                .get("spawnerFormDefaults")
                .cloned()
                .context(error::MissingSpawnerDefaultsSnafu { filename: path.clone() })?;

            tracing::info!("Using config file: {}", path.display());
            return serde_json::to_value(defaults).context(error::EncodeSpawnerDefaultsSnafu);
        }

        tracing::error!("Couldn't find any config file.");
        error::SpawnerConfigNotFoundSnafu.fail()
    }
}
