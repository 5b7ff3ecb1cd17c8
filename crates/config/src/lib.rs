//! Configuration for the exchange
//!
//! A TOML file with `${ENV_VAR}` substitution, serde-level defaults,
//! and a validation report produced before boot continues.

use serde::{Deserialize, Serialize};

pub mod parser;
pub mod substitution;
pub mod validator;

pub use parser::{generate_default_config, load_config, save_config, ConfigError};
pub use validator::{validate_config, ValidationReport};

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_exchange_name")]
    pub name: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            name: default_exchange_name(),
        }
    }
}

/// Which store backs durability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    /// PostgreSQL via sqlx
    Postgres,
    /// In-process store; state is lost on restart
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_backend")]
    pub backend: DatabaseBackend,
    /// Connection URL; supports `${ENV_VAR}` substitution
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: String::new(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatchingConfig {
    /// Bounded retries for transient durability-unit failures
    #[serde(default = "default_max_unit_retries")]
    pub max_unit_retries: u32,
    /// Upper bound on book snapshot depth requests
    #[serde(default = "default_snapshot_depth_limit")]
    pub snapshot_depth_limit: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_unit_retries: default_max_unit_retries(),
            snapshot_depth_limit: default_snapshot_depth_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// pretty | json | compact
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

fn default_exchange_name() -> String {
    "clob-exchange".to_string()
}

fn default_backend() -> DatabaseBackend {
    DatabaseBackend::Postgres
}

fn default_max_connections() -> u32 {
    10
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_unit_retries() -> u32 {
    5
}

fn default_snapshot_depth_limit() -> usize {
    100
}

fn default_log_format() -> String {
    "pretty".to_string()
}
