//! Configuration management with validation and defaults
//!
//! Values come from a TOML file, then environment variable overrides, then
//! validation. The resulting [`BridgeConfig`] is handed to components at
//! construction time.

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// Complete service configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub nats: NatsConfig,
    pub worker: WorkerConfig,
    pub ergo_node: ErgoNodeConfig,
    pub logging: LoggingConfig,
}

/// HTTP front door
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// First path segment of the game-round endpoint (`/<route>/:game`)
    pub route: String,
    pub request_timeout_secs: u64,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8089,
            route: "rng".to_string(),
            request_timeout_secs: 30,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

/// Message bus connection
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    pub endpoint: String,
    /// Subject carrying oracle-derived round results into the store
    pub random_number_subj: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            endpoint: "nats://127.0.0.1:4222".to_string(),
            random_number_subj: "drand.hash".to_string(),
        }
    }
}

/// Wait-and-deliver worker tuning
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub poll_interval_ms: u64,
    pub deadline_secs: u64,
    pub test_delay_secs: u64,
    pub max_concurrent_workers: usize,
    /// Game name used for the diagnostic endpoint's topic
    pub test_game: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            deadline_secs: 120,
            test_delay_secs: 10,
            max_concurrent_workers: 10_000,
            test_game: "roulette".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    pub fn test_delay(&self) -> Duration {
        Duration::from_secs(self.test_delay_secs)
    }
}

/// Blockchain node REST API
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ErgoNodeConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub wallet_password: Option<String>,
    pub timeout_secs: u64,
    pub retry_max: u32,
    pub retry_wait_min_ms: u64,
    pub retry_wait_max_ms: u64,
}

impl Default for ErgoNodeConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9053".to_string(),
            api_key: None,
            wallet_password: None,
            timeout_secs: 10,
            retry_max: 2,
            retry_wait_min_ms: 200,
            retry_wait_max_ms: 250,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "rng_bridge=info,rng_svc=info,tower_http=info".to_string(),
        }
    }
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and process environment
    pub fn load(&self) -> Result<BridgeConfig, ConfigurationError> {
        self.load_with_env(|key| std::env::var(key).ok())
    }

    /// Load configuration using `lookup` in place of the process environment
    pub fn load_with_env<F>(&self, lookup: F) -> Result<BridgeConfig, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match self.config_path {
            Some(ref path) if Path::new(path).exists() => load_from_file(path)?,
            _ => BridgeConfig::default(),
        };

        apply_env_overrides(&mut config, lookup)?;
        validate(&config)?;

        Ok(config)
    }
}

fn load_from_file(path: &str) -> Result<BridgeConfig, ConfigurationError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

    Ok(toml::from_str(&content)?)
}

fn apply_env_overrides<F>(config: &mut BridgeConfig, lookup: F) -> Result<(), ConfigurationError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("RNG_HOST") {
        config.server.host = host;
    }
    if let Some(port) = lookup("RNG_PORT") {
        config.server.port = port.parse().map_err(|_| ConfigurationError::InvalidValue {
            field: "RNG_PORT".to_string(),
            value: port,
            reason: "Invalid port number".to_string(),
        })?;
    }
    if let Some(route) = lookup("RNG_ROUTE") {
        config.server.route = route;
    }

    if let Some(endpoint) = lookup("NATS_ENDPOINT") {
        config.nats.endpoint = endpoint;
    }
    if let Some(subject) = lookup("NATS_RANDOM_NUMBER_SUBJ") {
        config.nats.random_number_subj = subject;
    }

    if let Some(endpoint) = lookup("ERGO_NODE_ENDPOINT") {
        config.ergo_node.endpoint = endpoint;
    }
    if let Some(key) = lookup("ERGO_NODE_API_KEY") {
        config.ergo_node.api_key = Some(key);
    }
    if let Some(password) = lookup("ERGO_NODE_WALLET_PASSWORD") {
        config.ergo_node.wallet_password = Some(password);
    }

    Ok(())
}

fn require(field: &str, value: &Option<String>) -> Result<(), ConfigurationError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(()),
        _ => Err(ConfigurationError::MissingRequired(field.to_string())),
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Validate configuration values
pub fn validate(config: &BridgeConfig) -> Result<(), ConfigurationError> {
    require("ergo_node.api_key", &config.ergo_node.api_key)?;
    require("ergo_node.wallet_password", &config.ergo_node.wallet_password)?;

    let route = config.server.route.as_str();
    if route.is_empty() || route.contains('/') {
        return Err(invalid("server.route", route, "Route must be a single non-empty path segment"));
    }
    if route.contains([':', '*', '{', '}']) {
        return Err(invalid("server.route", route, "Route cannot contain path parameter syntax"));
    }

    if config.nats.random_number_subj.trim().is_empty() {
        return Err(ConfigurationError::MissingRequired("nats.random_number_subj".to_string()));
    }

    let worker = &config.worker;
    if worker.poll_interval_ms == 0 {
        return Err(invalid("worker.poll_interval_ms", 0, "Poll interval cannot be zero"));
    }
    if worker.deadline_secs == 0 {
        return Err(invalid("worker.deadline_secs", 0, "Deadline cannot be zero"));
    }
    if worker.max_concurrent_workers == 0 {
        return Err(invalid("worker.max_concurrent_workers", 0, "Worker limit cannot be zero"));
    }

    let node = &config.ergo_node;
    if node.retry_wait_min_ms > node.retry_wait_max_ms {
        return Err(invalid(
            "ergo_node.retry_wait_min_ms",
            node.retry_wait_min_ms,
            "Minimum retry wait exceeds maximum",
        ));
    }

    Ok(())
}
