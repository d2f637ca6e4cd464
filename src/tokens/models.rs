use crate::primitives::{
    Address,
    TxHash,
};

use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeMap;

/// An off-chain document referenced by the token: where it lives and its
/// content hash.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Document {
    pub uri: String,
    pub hash: String,
}

/// Values shared by the create payload and the read model.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBase {
    pub remote_id: String,
    pub asset: Document,
    pub metadata: Document,
    #[serde(default)]
    pub additional_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenRequest {
    #[serde(flatten)]
    pub base: TokenBase,
    #[serde(default)]
    pub parent_ids: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentPatch {
    pub uri: Option<String>,
    pub hash: Option<String>,
}

/// Partial update. Absent fields keep their stored value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTokenRequest {
    pub asset: Option<DocumentPatch>,
    pub metadata: Option<DocumentPatch>,
    pub additional_data: Option<String>,
}

/// Parent/child linkage of a token.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hierarchy {
    /// Whether the linkage has been confirmed.
    pub active: bool,
    pub parent_ids: Vec<u64>,
    pub child_ids: Vec<u64>,
}

/// A token as returned by every token operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenReadModel {
    #[serde(flatten)]
    pub base: TokenBase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<Hierarchy>,
    pub owner_address: Address,
    pub minter_address: Address,
    pub created_on: String,
    pub last_updated_on: String,
    pub token_id: u64,
    pub contract_address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnedToken {
    pub token_id: u64,
    pub transaction_hash: TxHash,
    pub block_number: u64,
}

/// One entry of a token's provenance log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceEntry {
    pub event: String,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: TxHash,
    pub timestamp: String,
    /// Event arguments other than the token id, rendered as strings.
    pub args: BTreeMap<String, String>,
}
