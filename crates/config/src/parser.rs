//! Config file loading, saving and the default template

use std::path::Path;

use thiserror::Error;

use crate::substitution::substitute_env;
use crate::Config;

/// Errors raised while loading or saving configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("substitution error: {0}")]
    Substitution(String),
}

/// Load a config file, applying `${ENV_VAR}` substitution first
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let substituted = substitute_env(&raw)?;
    Ok(toml::from_str(&substituted)?)
}

/// Write a config to disk as TOML
pub fn save_config<P: AsRef<Path>>(config: &Config, path: P) -> Result<(), ConfigError> {
    let rendered = toml::to_string_pretty(config)?;
    std::fs::write(path, rendered)?;
    Ok(())
}

/// A fully defaulted config, the starting point `clobd init` writes
pub fn generate_default_config() -> Config {
    Config {
        exchange: Default::default(),
        database: Default::default(),
        server: Default::default(),
        matching: Default::default(),
        log: Default::default(),
    }
}
