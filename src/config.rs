//! Configuration sources.
//!
//! The adapter reads four string values per logical database name:
//! `<name>.driver`, `<name>.url`, `<name>.user` and `<name>.passwd`.
//! Anything that can answer a key lookup is a [`ConfigurationSource`];
//! [`load`] builds one from `config/dbmigrate.toml` plus `DBMIGRATE__*`
//! environment variables.

use config::{Config, ConfigError, Environment, File};
use std::collections::HashMap;
use std::path::Path;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_FILE: &str = "config/dbmigrate.toml";

/// Prefix of environment variables overriding file values
pub const ENV_PREFIX: &str = "DBMIGRATE";

pub const DRIVER: &str = "driver";
pub const URL: &str = "url";
pub const USER: &str = "user";
pub const PASSWORD: &str = "passwd";

/// Key-value store consulted by the adapter
///
/// Values are looked up lazily, only when an operation needs them.
pub trait ConfigurationSource: Send + Sync {
    /// Returns the value stored under `key`, or `None` if the key is absent
    fn value(&self, key: &str) -> Option<String>;
}

impl ConfigurationSource for Config {
    fn value(&self, key: &str) -> Option<String> {
        self.get_string(key).ok()
    }
}

impl ConfigurationSource for HashMap<String, String> {
    fn value(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Builds the namespaced key `<database>.<property>`
pub fn key(database: &str, property: &str) -> String {
    format!("{database}.{property}")
}

/// Load configuration from a TOML file, falling back to env vars.
///
/// Environment variables use the form `DBMIGRATE__<DATABASE>__<PROPERTY>`,
/// e.g. `DBMIGRATE__MYDB__URL`, and override values from the file.
pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let builder = Config::builder()
        .add_source(File::from(path).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    match builder.build() {
        Ok(cfg) => Ok(cfg),
        Err(err) => {
            // The file exists but could not be parsed; keep going with env only
            if path.exists() {
                log::warn!(
                    "failed to load config file {}, falling back to env: {}",
                    path.display(),
                    err
                );
            }
            Config::builder()
                .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                .build()
                .map_err(|env_err| {
                    ConfigError::Message(format!(
                        "Failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                    ))
                })
        }
    }
}
