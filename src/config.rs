use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::coordination::RetryPolicy;
use crate::domain::Severity;
use crate::error::{Result, VigilError};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Chain name -> connection settings
    #[serde(default)]
    pub chains: BTreeMap<String, ChainConfig>,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default = "default_sinks")]
    pub sinks: Vec<SinkConfig>,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Session manifest applied at startup (must be a .json file)
    #[serde(default)]
    pub bootstrap_path: Option<String>,
    /// Hard deadline for draining sessions on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_sinks() -> Vec<SinkConfig> {
    vec![SinkConfig {
        kind: SinkKind::Log,
        name: None,
        webhook_url: None,
        min_severity: Severity::Low,
    }]
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC HTTP endpoint
    pub rpc_url: String,
    /// Blocks to stay behind the head to avoid reorgs
    #[serde(default)]
    pub confirmations: u64,
    /// Maximum blocks returned per fetch
    #[serde(default = "default_max_blocks_per_batch")]
    pub max_blocks_per_batch: u64,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Connection attempts at startup before giving up
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

fn default_max_blocks_per_batch() -> u64 {
    25
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_connect_attempts() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Idle sleep when the chain has no new blocks
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Consecutive transient fetch failures before a session fails
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    #[serde(default = "RetryPolicy::collector_default")]
    pub backoff: RetryPolicy,
}

fn default_poll_interval() -> u64 {
    2_000
}

fn default_max_consecutive_failures() -> u32 {
    8
}

impl CollectorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            max_consecutive_failures: default_max_consecutive_failures(),
            backoff: RetryPolicy::collector_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    /// Delivery attempts per sink, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "RetryPolicy::delivery_default")]
    pub backoff: RetryPolicy,
    /// Timeout for a single delivery attempt
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_delivery_timeout_ms() -> u64 {
    10_000
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: RetryPolicy::delivery_default(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Log,
    Feishu,
    Slack,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    pub kind: SinkKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Only findings at or above this severity are routed to the sink
    #[serde(default = "default_min_severity")]
    pub min_severity: Severity,
}

fn default_min_severity() -> Severity {
    Severity::Low
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub backend: StateBackend,
    /// PostgreSQL connection URL (postgres backend only)
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: StateBackend::Memory,
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Serve the HTTP control API
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Write a daily rolling log file into this directory
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            directory: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            chains: BTreeMap::new(),
            collector: CollectorConfig::default(),
            dispatcher: DispatcherConfig::default(),
            sinks: default_sinks(),
            state: StateConfig::default(),
            server: ServerConfig::default(),
            bootstrap_path: None,
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> std::result::Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("shutdown_timeout_secs", default_shutdown_timeout())?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("VIGIL_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (VIGIL_CHAINS__LAYER1__RPC_URL, etc.)
            .add_source(
                Environment::with_prefix("VIGIL")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Reject configurations that would only fail later at runtime
    pub fn validate(&self) -> Result<()> {
        for (name, chain) in &self.chains {
            url::Url::parse(&chain.rpc_url).map_err(|e| {
                VigilError::InvalidConfig(format!("chains.{}.rpc_url: {}", name, e))
            })?;
            if chain.max_blocks_per_batch == 0 {
                return Err(VigilError::InvalidConfig(format!(
                    "chains.{}.max_blocks_per_batch must be positive",
                    name
                )));
            }
        }

        for sink in &self.sinks {
            match sink.kind {
                SinkKind::Log => {}
                SinkKind::Feishu | SinkKind::Slack => {
                    let raw = sink.webhook_url.as_deref().ok_or_else(|| {
                        VigilError::InvalidConfig(format!(
                            "{:?} sink requires webhook_url",
                            sink.kind
                        ))
                    })?;
                    url::Url::parse(raw).map_err(|e| {
                        VigilError::InvalidConfig(format!("sink webhook_url: {}", e))
                    })?;
                }
            }
        }

        if self.state.backend == StateBackend::Postgres && self.state.database_url.is_none() {
            return Err(VigilError::InvalidConfig(
                "state.database_url is required for the postgres backend".to_string(),
            ));
        }

        if self.collector.max_consecutive_failures == 0 {
            return Err(VigilError::InvalidConfig(
                "collector.max_consecutive_failures must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(url: &str) -> ChainConfig {
        ChainConfig {
            rpc_url: url.to_string(),
            confirmations: 0,
            max_blocks_per_batch: 10,
            request_timeout_ms: 1_000,
            connect_attempts: 1,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sinks.len(), 1);
        assert_eq!(config.sinks[0].kind, SinkKind::Log);
    }

    #[test]
    fn test_rejects_bad_rpc_url() {
        let mut config = AppConfig::default();
        config.chains.insert("layer1".into(), chain("not a url"));
        assert!(config.validate().is_err());

        config.chains.insert("layer1".into(), chain("http://localhost:8545"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_webhook_sink_requires_url() {
        let mut config = AppConfig::default();
        config.sinks.push(SinkConfig {
            kind: SinkKind::Slack,
            name: Some("ops".into()),
            webhook_url: None,
            min_severity: Severity::High,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let mut config = AppConfig::default();
        config.state.backend = StateBackend::Postgres;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let config = AppConfig::load_from("/nonexistent/vigil-config").unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.shutdown_timeout_secs, 30);
        assert!(config.chains.is_empty());
    }
}
