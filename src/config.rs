// SPDX-License-Identifier: Apache-2.0

//! Harness configuration. Defaults are compiled in; a TOML file named by
//! the `TESTKIT_CONFIG` environment variable overrides them. Anything wrong
//! here is a configuration error: fatal, surfaced before any test runs.

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the TOML file to load instead of defaults.
pub const CONFIG_ENV: &str = "TESTKIT_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Name of the arbitrary-precision numeric binding the assertion
    /// extensions compare through. Only `big` is compiled in.
    pub numeric_backend: String,
    /// Upper bound on a single deployment call.
    pub deploy_timeout_ms: u64,
    /// Upper bound the promise-aware assertions wait for a future.
    pub resolve_timeout_ms: u64,
    /// Balance every keyring account starts with, as a decimal literal.
    pub initial_balance: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            numeric_backend: "big".to_string(),
            deploy_timeout_ms: 10_000,
            resolve_timeout_ms: 5_000,
            // one million tokens in the smallest unit
            initial_balance: "1000000000000000000000000".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Loads the configuration: the file named by [`CONFIG_ENV`] when the
    /// variable is set, compiled-in defaults otherwise.
    pub fn load() -> Result<Self, ConfigError> {
        match env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_path(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e.to_string()))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn deploy_timeout(&self) -> Duration {
        Duration::from_millis(self.deploy_timeout_ms)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    /// The configured initial balance as a chain balance.
    pub fn initial_balance(&self) -> Result<u128, ConfigError> {
        self.initial_balance
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidBalance(self.initial_balance.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unable to read config file {0}: {1}")]
    Read(PathBuf, String),

    #[error("malformed config file: {0}")]
    Parse(String),

    #[error("unknown numeric backend '{0}'")]
    UnknownNumericBackend(String),

    #[error("numeric backend '{0}' failed its fixture sanity check")]
    NumericBindingBroken(String),

    #[error("invalid balance literal '{0}'")]
    InvalidBalance(String),
}
