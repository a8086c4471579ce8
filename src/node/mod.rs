//! Blockchain node REST client
//!
//! Fee estimation and mempool queries against an Ergo node, with bounded
//! retries on transport failures and server errors.

pub mod client;
pub mod types;

pub use client::{ErgoNodeClient, RetryPolicy};
pub use types::{Asset, DataInput, ErgoBox, Input, Transaction};
