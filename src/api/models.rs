//! API request and response models

use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Query string of the game-round endpoints, kept as ordered pairs so the
/// first occurrence of a repeated key wins and nothing is ever rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct RoundQuery(pub Vec<(String, String)>);

impl RoundQuery {
    /// First value for `key`, or an empty string when absent
    pub fn get(&self, key: &str) -> String {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }

    pub fn box_id(&self) -> String {
        self.get("boxId")
    }

    pub fn wallet_addr(&self) -> String {
        self.get("walletAddr")
    }
}
