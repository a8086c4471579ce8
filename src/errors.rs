//! Error types for the random-number bridge
//!
//! Startup failures (configuration, connections) are fatal and bubble up to
//! `main`. Request-time failures stay inside their worker.

use thiserror::Error;

/// Root error type for all bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),
}

/// Startup connection errors
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to connect to message bus at {endpoint}: {reason}")]
    Bus { endpoint: String, reason: String },

    #[error("failed to bind listener on {addr}: {reason}")]
    Listener { addr: String, reason: String },
}

/// Terminal conditions of a single wait-and-deliver worker
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Deadline elapsed without the round result showing up
    #[error("timeout - random number not found (box {box_id}, waited {waited_ms}ms)")]
    RandNumNotFound { box_id: String, waited_ms: u64 },

    #[error("worker cancelled by shutdown")]
    Cancelled,
}

/// Outbound publish failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("bus rejected publish: {0}")]
    Bus(String),

    #[error("bus connection closed")]
    Closed,
}

/// Blockchain node client errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node transport error: {0}")]
    Transport(String),

    #[error("node returned http {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode node response: {0}")]
    Decode(String),

    #[error("node client misconfigured: {0}")]
    Config(String),
}

impl NodeError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            NodeError::Transport(_) => true,
            NodeError::Status { status, .. } => *status == 429 || *status >= 500,
            NodeError::Decode(_) | NodeError::Config(_) => false,
        }
    }
}

impl From<toml::de::Error> for ConfigurationError {
    fn from(e: toml::de::Error) -> Self {
        ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e))
    }
}

// Convenience type alias for Results
pub type BridgeResult<T> = Result<T, BridgeError>;
