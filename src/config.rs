//! Registry configuration.
//!
//! Configuration can be loaded from:
//! 1. A TOML file with a `[registry]` table
//! 2. Environment variables (with the `WORKLOAD_REGISTRY_` prefix)
//!
//! Environment variables override TOML configuration.
//!
//! # Example TOML Configuration
//!
//! ```toml
//! [registry]
//! key_prefix = "/registry/workloads"
//!
//! [registry.agent]
//! port = 10250
//! scheme = "https"
//!
//! [registry.store]
//! max_update_attempts = 10
//! request_timeout_ms = 5000
//!
//! [registry.logging]
//! filter = "workload_registry=debug,info"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_AGENT_PORT, DEFAULT_AGENT_SCHEME, DEFAULT_KEY_PREFIX, DEFAULT_MAX_UPDATE_ATTEMPTS,
    DEFAULT_REQUEST_TIMEOUT_MS, ENV_PREFIX,
};

/// Top-level registry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Storage key prefix for workload records.
    pub key_prefix: String,

    /// Where the execution-host agent listens.
    pub agent: AgentConfig,

    /// Compare-and-swap retry and deadline settings.
    pub store: StoreConfig,

    /// Log output settings.
    pub logging: LoggingConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            agent: AgentConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Execution-host agent endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Port the agent serves logs and proxied traffic on.
    pub port: u16,

    /// `http` or `https`.
    pub scheme: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_AGENT_PORT,
            scheme: DEFAULT_AGENT_SCHEME.to_string(),
        }
    }
}

/// Versioned store behaviour.
///
/// # Defaults
///
/// | Setting               | Default | Description                              |
/// |-----------------------|---------|------------------------------------------|
/// | `max_update_attempts` | 10      | CAS attempts before reporting a conflict |
/// | `request_timeout_ms`  | 5,000   | Deadline for one storage round trip      |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Compare-and-swap attempts before a version race is reported as a
    /// conflict.
    pub max_update_attempts: u32,

    /// Deadline for a single storage round trip, in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_update_attempts: DEFAULT_MAX_UPDATE_ATTEMPTS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

/// Log output settings consumed by [`init_logging`](crate::logging::init_logging).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub filter: String,

    /// Emit ANSI colours.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            ansi: true,
        }
    }
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file '{path}': {error}")]
    Io {
        /// Path to the configuration file.
        path: String,
        /// Error message.
        error: String,
    },

    /// The configuration is not valid TOML or has wrong types.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A value is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Offending setting.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl RegistryConfig {
    /// Loads `path` if given, then applies environment overrides and
    /// validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a specific file path, applying environment
    /// overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load(Some(path.as_ref()))
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct FullConfig {
            #[serde(default)]
            registry: RegistryConfig,
        }

        let full: FullConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(full.registry)
    }

    /// Applies `WORKLOAD_REGISTRY_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Applies overrides from an arbitrary variable lookup. Unparseable
    /// numbers are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));

        if let Some(prefix) = var("KEY_PREFIX") {
            self.key_prefix = prefix;
        }
        if let Some(port) = var("AGENT_PORT").and_then(|v| v.parse().ok()) {
            self.agent.port = port;
        }
        if let Some(scheme) = var("AGENT_SCHEME") {
            self.agent.scheme = scheme;
        }
        if let Some(attempts) = var("MAX_UPDATE_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.store.max_update_attempts = attempts;
        }
        if let Some(timeout) = var("REQUEST_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.store.request_timeout_ms = timeout;
        }
        if let Some(filter) = var("LOG_FILTER") {
            self.logging.filter = filter;
        }
    }

    /// Rejects settings the registry cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.key_prefix.starts_with('/') || self.key_prefix.len() < 2 {
            return Err(ConfigError::Invalid {
                field: "key_prefix",
                reason: format!("{:?} must be an absolute, non-root path", self.key_prefix),
            });
        }
        if self.key_prefix.ends_with('/') {
            return Err(ConfigError::Invalid {
                field: "key_prefix",
                reason: "must not end with '/'".to_string(),
            });
        }
        if self.agent.port == 0 {
            return Err(ConfigError::Invalid {
                field: "agent.port",
                reason: "must be non-zero".to_string(),
            });
        }
        if !matches!(self.agent.scheme.as_str(), "http" | "https") {
            return Err(ConfigError::Invalid {
                field: "agent.scheme",
                reason: format!("{:?} is not one of http, https", self.agent.scheme),
            });
        }
        if self.store.max_update_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "store.max_update_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.store.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "store.request_timeout_ms",
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}
