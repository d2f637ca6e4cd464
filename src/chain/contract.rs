use crate::primitives::{
    Address,
    FixedBytes,
    B256,
};

use alloy_json_abi::{
    Error as AbiError,
    Event,
    Function,
    JsonAbi,
};
use serde::Deserialize;

use std::{
    collections::HashMap,
    fmt,
    sync::Arc,
};

#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("Invalid contract ABI")]
    InvalidAbi(#[from] serde_json::Error),
    #[error("Contract has no method `{method}` taking {arity} arguments")]
    UnknownMethod { method: String, arity: usize },
    #[error("Contract has no event `{0}`")]
    UnknownEvent(String),
    #[error("Event `{event}` has no indexed parameter `{param}`")]
    UnknownIndexedParam { event: String, param: String },
    #[error("Indexed parameter `{0}` is not a single-word value")]
    NonWordTopic(String),
    #[error("ABI encoding error")]
    Abi(#[from] alloy_dyn_abi::Error),
}

/// solc emits a bare ABI array, hardhat/foundry artifacts nest it under `abi`.
#[derive(Deserialize)]
#[serde(untagged)]
enum AbiSource {
    Bare(JsonAbi),
    Artifact { abi: JsonAbi },
}

/// A parsed contract ABI plus lookup tables keyed by selector.
///
/// The event and error tables are built once so decoding a log or a revert is
/// a single map lookup instead of a scan over every declared item.
pub struct ContractInterface {
    abi: JsonAbi,
    events: HashMap<B256, Event>,
    errors: HashMap<FixedBytes<4>, AbiError>,
}

impl ContractInterface {
    /// Parses an ABI JSON document.
    pub fn from_json(json: &str) -> Result<Self, ContractError> {
        let abi = match serde_json::from_str(json)? {
            AbiSource::Bare(abi) => abi,
            AbiSource::Artifact { abi } => abi,
        };
        Ok(Self::from_abi(abi))
    }

    pub fn from_abi(abi: JsonAbi) -> Self {
        let events = abi
            .events()
            .filter(|event| !event.anonymous)
            .map(|event| (event.selector(), event.clone()))
            .collect();
        let errors = abi
            .errors()
            .map(|error| (error.selector(), error.clone()))
            .collect();

        Self {
            abi,
            events,
            errors,
        }
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    /// Resolves `name` to the overload taking `arity` arguments.
    pub fn function(&self, name: &str, arity: usize) -> Result<&Function, ContractError> {
        self.abi
            .functions
            .get(name)
            .and_then(|overloads| overloads.iter().find(|f| f.inputs.len() == arity))
            .ok_or_else(|| ContractError::UnknownMethod {
                method: name.to_owned(),
                arity,
            })
    }

    pub fn event(&self, name: &str) -> Result<&Event, ContractError> {
        self.abi
            .events
            .get(name)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| ContractError::UnknownEvent(name.to_owned()))
    }

    pub fn event_by_selector(&self, selector: &B256) -> Option<&Event> {
        self.events.get(selector)
    }

    pub fn error_by_selector(&self, selector: &FixedBytes<4>) -> Option<&AbiError> {
        self.errors.get(selector)
    }

    /// Topic slot (1..=3) carrying the indexed parameter `param` of `event`.
    pub fn indexed_topic_slot(&self, event: &str, param: &str) -> Result<usize, ContractError> {
        self.event(event)?
            .inputs
            .iter()
            .filter(|input| input.indexed)
            .position(|input| input.name == param)
            .map(|position| position + 1)
            .ok_or_else(|| ContractError::UnknownIndexedParam {
                event: event.to_owned(),
                param: param.to_owned(),
            })
    }
}

impl fmt::Debug for ContractInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractInterface")
            .field("functions", &self.abi.functions.len())
            .field("events", &self.events.len())
            .field("errors", &self.errors.len())
            .finish()
    }
}

/// A deployed contract: address plus interface.
///
/// Cloning is cheap; the interface is shared.
#[derive(Clone)]
pub struct ContractHandle {
    address: Address,
    interface: Arc<ContractInterface>,
}

impl ContractHandle {
    pub fn new(address: Address, interface: Arc<ContractInterface>) -> Self {
        Self { address, interface }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn interface(&self) -> &ContractInterface {
        &self.interface
    }

    /// The same interface bound to another instance.
    pub fn at(&self, address: Address) -> Self {
        Self {
            address,
            interface: Arc::clone(&self.interface),
        }
    }
}

impl fmt::Debug for ContractHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractHandle")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test_contract {
    use super::*;
    use crate::chain::abi;

    #[test]
    fn test_lookup_tables() {
        let token = ContractInterface::from_json(abi::TOKEN_ABI).unwrap();

        let created = token.event("TokenCreated").unwrap();
        assert_eq!(
            token.event_by_selector(&created.selector()).unwrap().name,
            "TokenCreated"
        );

        let not_found = token.abi().errors.get("ERC721NonexistentToken").unwrap()[0].clone();
        assert_eq!(
            token
                .error_by_selector(&not_found.selector())
                .unwrap()
                .name,
            "ERC721NonexistentToken"
        );
    }

    #[test]
    fn test_function_overload_by_arity() {
        let token = ContractInterface::from_json(abi::TOKEN_ABI).unwrap();

        assert_eq!(token.function("mintToken", 7).unwrap().name, "mintToken");
        assert!(matches!(
            token.function("mintToken", 2),
            Err(ContractError::UnknownMethod { arity: 2, .. })
        ));
        assert!(matches!(
            token.function("transferFrom", 3),
            Err(ContractError::UnknownMethod { .. })
        ));
    }

    #[test]
    fn test_indexed_topic_slot() {
        let token = ContractInterface::from_json(abi::TOKEN_ABI).unwrap();

        assert_eq!(token.indexed_topic_slot("Transfer", "tokenId").unwrap(), 3);
        assert_eq!(token.indexed_topic_slot("TokenCreated", "tokenId").unwrap(), 2);
        assert_eq!(token.indexed_topic_slot("AssetUriSet", "tokenId").unwrap(), 1);
        assert!(matches!(
            token.indexed_topic_slot("AssetUriSet", "assetUri"),
            Err(ContractError::UnknownIndexedParam { .. })
        ));
        assert!(matches!(
            token.indexed_topic_slot("Approval", "tokenId"),
            Err(ContractError::UnknownEvent(_))
        ));
    }

    #[test]
    fn test_artifact_abi() {
        let artifact = format!(r#"{{"contractName":"Segment","abi":{}}}"#, abi::SEGMENT_ABI);
        let segment = ContractInterface::from_json(&artifact).unwrap();
        assert!(segment.event("TokenAdded").is_ok());

        assert!(matches!(
            ContractInterface::from_json("{\"not\":\"an abi\"}"),
            Err(ContractError::InvalidAbi(_))
        ));
    }

    #[test]
    fn test_handle_at() {
        let segment = Arc::new(ContractInterface::from_json(abi::SEGMENT_ABI).unwrap());
        let template = ContractHandle::new(Address::ZERO, segment);
        let instance = template.at(Address::repeat_byte(5));

        assert_eq!(instance.address(), Address::repeat_byte(5));
        assert!(instance.interface().event("TokenRemoved").is_ok());
    }
}
