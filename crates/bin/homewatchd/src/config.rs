//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `homewatch.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

use homewatch_adapter_mqtt::MqttConfig;
use homewatch_adapter_registry_http::RegistryConfig;
use homewatch_app::rebalancer::RebalanceConfig;
use homewatch_domain::rules::RuleVariant;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device registry settings.
    pub registry: RegistryConfig,
    /// Bus connection settings.
    pub mqtt: MqttConfig,
    /// Partitioning and refresh settings.
    pub rebalance: RebalanceSection,
    /// Rule engine settings.
    pub controller: ControllerSection,
    /// Status API settings.
    pub server: ServerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// `[rebalance]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RebalanceSection {
    /// Maximum number of units per controller.
    pub partition_size: usize,
    /// Seconds between registry refreshes.
    pub refresh_interval_secs: u64,
}

/// `[controller]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControllerSection {
    /// Seconds between evaluation passes.
    pub evaluation_interval_secs: u64,
    /// Rule set every controller runs.
    pub rules: RuleVariant,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Serve the status API at all.
    pub enabled: bool,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `homewatch.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if a
    /// value fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("homewatch.toml")?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("HOMEWATCH_REGISTRY_URL") {
            self.registry.url = val;
        }
        if let Some(val) = var("HOMEWATCH_BIND")
            && let Some((host, port)) = val.rsplit_once(':')
        {
            self.server.host = host.to_string();
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Some(val) = var("HOMEWATCH_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.rebalance.refresh_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "refresh_interval_secs must be non-zero".to_string(),
            ));
        }
        if self.controller.evaluation_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "evaluation_interval_secs must be non-zero".to_string(),
            ));
        }
        self.rebalance_config()?;
        Ok(())
    }

    /// Settings for the rebalancer and the controllers it creates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `partition_size` is zero.
    pub fn rebalance_config(&self) -> Result<RebalanceConfig, ConfigError> {
        let partition_size = NonZeroUsize::new(self.rebalance.partition_size).ok_or_else(|| {
            ConfigError::Validation("partition_size must be non-zero".to_string())
        })?;
        Ok(RebalanceConfig {
            partition_size,
            refresh_interval: Duration::from_secs(self.rebalance.refresh_interval_secs),
            evaluation_interval: Duration::from_secs(self.controller.evaluation_interval_secs),
            rules: self.controller.rules.into(),
        })
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for RebalanceSection {
    fn default() -> Self {
        Self {
            partition_size: 5,
            refresh_interval_secs: 60,
        }
    }
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            evaluation_interval_secs: 15,
            rules: RuleVariant::Full,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
            enabled: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "homewatchd=info,homewatch=info,tower_http=debug".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
