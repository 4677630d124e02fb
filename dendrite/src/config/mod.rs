mod error;
mod log;
mod spawner;

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
};

use dendrite_base::consts;
use resolve_path::PathResolveExt;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

pub use self::{
    error::Error,
    log::LogConfig,
    spawner::{SpawnerConfig, SpawnerConfigCache},
};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Address the HTTP API binds to.
    #[serde(default = "default_listen_address")]
    pub listen_address: SocketAddr,

    /// Istio gateway, as `namespace/name`, that published terminal routes
    /// attach to.
    #[serde(default = "default_istio_gateway")]
    pub istio_gateway: String,

    #[serde(default = "ShellConfig::default")]
    pub shell: ShellConfig,

    #[serde(default = "SpawnerConfig::default")]
    pub spawner: SpawnerConfig,

    #[serde(default = "LogConfig::default")]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            istio_gateway: default_istio_gateway(),
            shell: ShellConfig::default(),
            spawner: SpawnerConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    pub fn search_config_file_path() -> PathBuf {
        let paths = vec![Self::default_path()]
            .into_iter()
            .chain(dendrite_base::fallback_project_config_directories().into_iter().map(
                |mut path| {
                    path.push(dendrite_base::CONFIG_NAME);
                    path
                },
            ))
            .collect::<Vec<_>>();
        for path in paths {
            let Ok(exists) = path.try_exists() else {
                continue;
            };
            if exists {
                return path;
            }
        }
        Self::default_path()
    }

    #[inline]
    pub fn default_path() -> PathBuf {
        [dendrite_base::PROJECT_CONFIG_DIR.to_path_buf(), PathBuf::from(dendrite_base::CONFIG_NAME)]
            .into_iter()
            .collect()
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let mut config: Self = {
            let path =
                path.as_ref().try_resolve().map(|path| path.to_path_buf()).with_context(|_| {
                    error::ResolveFilePathSnafu { file_path: path.as_ref().to_path_buf() }
                })?;
            let data =
                std::fs::read(&path).context(error::OpenConfigSnafu { filename: path.clone() })?;
            serde_yaml::from_slice(&data).context(error::ParseConfigSnafu { filename: path })?
        };

        config.log.file_path = match config.log.file_path.map(|path| {
            path.try_resolve()
                .map(|path| path.to_path_buf())
                .with_context(|_| error::ResolveFilePathSnafu { file_path: path.clone() })
        }) {
            Some(Ok(path)) => Some(path),
            Some(Err(err)) => return Err(err),
            None => None,
        };

        Ok(config)
    }
}

/// Tunables for CloudShell session orchestration.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellConfig {
    /// Seconds to wait after evicting a previous session before creating its
    /// replacement.
    #[serde(default = "ShellConfig::default_eviction_settle_seconds")]
    pub eviction_settle_seconds: u64,

    /// Seconds between checks for a session's backing service.
    #[serde(default = "ShellConfig::default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,

    /// How many checks to make before giving up on a session.
    #[serde(default = "ShellConfig::default_poll_budget")]
    pub poll_budget: u32,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            eviction_settle_seconds: Self::default_eviction_settle_seconds(),
            poll_interval_seconds: Self::default_poll_interval_seconds(),
            poll_budget: Self::default_poll_budget(),
        }
    }
}

impl ShellConfig {
    #[inline]
    #[must_use]
    pub const fn default_eviction_settle_seconds() -> u64 {
        consts::CLOUDSHELL_EVICTION_SETTLE.as_secs()
    }

    #[inline]
    #[must_use]
    pub const fn default_poll_interval_seconds() -> u64 {
        consts::CLOUDSHELL_POLL_INTERVAL.as_secs()
    }

    #[inline]
    #[must_use]
    pub const fn default_poll_budget() -> u32 { consts::CLOUDSHELL_POLL_BUDGET }
}

const fn default_listen_address() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5000)
}

fn default_istio_gateway() -> String { consts::DEFAULT_ISTIO_GATEWAY.to_string() }
