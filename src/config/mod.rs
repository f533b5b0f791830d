//! Configuration management
//!
//! Layered: built-in defaults, then an optional TOML file, then
//! `CALLBROKER__SECTION__KEY` environment variables.

use ::config::{ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Default config file, overridden by `CALLBROKER_CONFIG`
pub const DEFAULT_CONFIG_FILE: &str = "callbroker.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub broker: BrokerConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// How long a provider has to acknowledge a new session
    pub create_timeout_ms: u64,
    pub identity_timeout_ms: u64,
    /// Scheme given to dial strings that carry none
    pub default_scheme: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Used when `RUST_LOG` is not set
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker: BrokerConfig {
                create_timeout_ms: 5_000,
                identity_timeout_ms: 2_000,
                default_scheme: "tel".to_string(),
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Config {
    /// Load from `CALLBROKER_CONFIG` (or `callbroker.toml`) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("CALLBROKER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path)
    }

    /// Load with `path` as the file layer. A missing file is not an error.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let defaults = ::config::Config::try_from(&Config::default())?;

        ::config::Config::builder()
            .add_source(defaults)
            .add_source(File::new(path, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("CALLBROKER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
