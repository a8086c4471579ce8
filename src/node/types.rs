//! Node wire types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unconfirmed (mempool) transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    #[serde(default)]
    pub inputs: Vec<Input>,
    #[serde(default)]
    pub data_inputs: Vec<DataInput>,
    #[serde(default)]
    pub outputs: Vec<ErgoBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Input {
    pub box_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spending_proof: Option<SpendingProof>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingProof {
    pub proof_bytes: String,
    #[serde(default)]
    pub extension: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataInput {
    pub box_id: String,
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErgoBox {
    pub box_id: String,
    pub value: u64,
    pub ergo_tree: String,
    pub creation_height: u32,
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub additional_registers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub token_id: String,
    pub amount: u64,
}
