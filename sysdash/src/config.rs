//! Service list loaded once at startup and shared read-only by every stream.

use crate::probe::DEFAULT_PROBE_TIMEOUT;
use crate::types::ServiceEntry;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("service #{0} has an empty name")]
    EmptyName(usize),
    #[error("duplicate service name {0:?}")]
    DuplicateName(String),
    #[error("service {name:?}: invalid url {url:?}: {source}")]
    InvalidUrl {
        name: String,
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("probe_timeout_secs must be at least 1")]
    ZeroTimeout,
}

/// ```yaml
/// services:
///   - name: api
///     url: http://localhost:8080/health
/// probe_timeout_secs: 2
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

fn default_probe_timeout_secs() -> u64 {
    DEFAULT_PROBE_TIMEOUT.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            services: Vec::new(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let cfg: Config = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    // Names key the `service` events, so they must be present and unique.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.probe_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        let mut seen = HashSet::new();
        for (i, svc) in self.services.iter().enumerate() {
            if svc.name.trim().is_empty() {
                return Err(ConfigError::EmptyName(i));
            }
            if !seen.insert(svc.name.as_str()) {
                return Err(ConfigError::DuplicateName(svc.name.clone()));
            }
            url::Url::parse(&svc.url).map_err(|source| ConfigError::InvalidUrl {
                name: svc.name.clone(),
                url: svc.url.clone(),
                source,
            })?;
        }
        Ok(())
    }
}
