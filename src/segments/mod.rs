//! Segments: named groupings of tokens, each deployed as its own contract by
//! the container.

mod service;
pub use service::SegmentService;

use crate::primitives::Address;

use serde::{
    Deserialize,
    Serialize,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSegmentRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentReadModel {
    pub name: String,
    pub segment_address: Address,
    pub container_address: Address,
    pub token_ids: Vec<u64>,
}
