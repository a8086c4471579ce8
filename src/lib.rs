//! Random-number distribution bridge
//!
//! Frontends ask for the random number of a game round (a box); the bridge
//! answers at once, waits for the oracle-derived value to land in the shared
//! round-result store, and publishes it on `"<game>.<walletAddr>"`.

pub mod api;
pub mod config;
pub mod errors;
pub mod ingest;
pub mod metrics;
pub mod node;
pub mod publisher;
pub mod store;
pub mod worker;

pub use config::{BridgeConfig, ConfigLoader};
pub use errors::{BridgeError, BridgeResult};
pub use publisher::{NatsPublisher, Publisher, RecordingPublisher};
pub use store::{RoundResultSource, RoundResultStore};
pub use worker::{RequestContext, WorkerOutcome, WorkerPool, WorkerSettings};
