use order_relay::config::Config as RelayConfig;
use serde::Deserialize;
use std::fs::File;

#[derive(Debug, Deserialize)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    "order_relay".to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    pub sentry_dsn: Option<String>,
    /// Default filter when `RUST_LOG` is unset
    pub level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(flatten)]
    pub relay: RelayConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    /// Fills credentials the file left out from the process environment.
    pub fn overlay_env(&mut self) {
        self.relay
            .credentials
            .overlay(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
}
