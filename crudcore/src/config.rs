//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: `CRUDCORE_`, nested keys separated by `__`)
//! 2. Configuration file: `./crudcore.toml` or an explicit path
//! 3. Default values
//!
//! ```toml
//! [service]
//! name = "billing"
//! log_level = "debug"
//!
//! [repository]
//! default_page_size = 25
//! max_page_size = 1000
//!
//! [store]
//! simulated_latency_ms = 0
//! ```
//!
//! `CRUDCORE_REPOSITORY__MAX_PAGE_SIZE=200` overrides `repository.max_page_size`.

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file, relative to the working directory
pub const CONFIG_FILE: &str = "crudcore.toml";

/// Prefix of environment variable overrides
pub const ENV_PREFIX: &str = "CRUDCORE_";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,

    /// Repository paging settings
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Reference store settings
    #[serde(default)]
    pub store: StoreConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name, attached to log output
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

/// Repository paging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Page size used when the caller supplies none or one below 1
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Upper bound on any requested page size
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

/// In-memory store settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Sleep applied to each async store call, in milliseconds
    #[serde(default)]
    pub simulated_latency_ms: u64,
}

fn default_service_name() -> String {
    "crudcore".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_page_size() -> usize {
    25
}

fn default_max_page_size() -> usize {
    1000
}

impl Config {
    /// Load configuration from `./crudcore.toml` and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load configuration from a specific file
    ///
    /// A missing file is not an error; defaults and environment variables
    /// still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
        } else {
            tracing::debug!("No configuration file at {}, using defaults", path.display());
        }

        let config: Self = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        let repo = &self.repository;
        if repo.default_page_size == 0 {
            return Err(Error::InvalidConfig(
                "repository.default_page_size must be at least 1".to_string(),
            ));
        }
        if repo.max_page_size < repo.default_page_size {
            return Err(Error::InvalidConfig(format!(
                "repository.max_page_size ({}) must not be below default_page_size ({})",
                repo.max_page_size, repo.default_page_size
            )));
        }
        Ok(())
    }
}
