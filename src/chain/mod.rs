//! Chain access: the [`ChainClient`] boundary, contract handles and the
//! JSON-RPC backed client.

mod contract;
pub use contract::{
    ContractError,
    ContractHandle,
    ContractInterface,
};

pub mod abi;

mod rpc;
pub use rpc::AlloyChainClient;

use crate::primitives::{
    Address,
    Bytes,
    ChainTransaction,
    Log,
    SignedTransaction,
    TransactionReceipt,
    TxHash,
    B256,
};

use async_trait::async_trait;
use std::{
    fmt::Debug,
    sync::Arc,
};

/// Shared handle to the single chain connection used by all components.
pub type SharedChainClient = Arc<dyn ChainClient>;

pub type ChainResult<T> = std::result::Result<T, ChainError>;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Execution reverted: {message}")]
    Reverted {
        data: Option<Bytes>,
        message: String,
    },
    #[error("Rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Transport error: {message}")]
    Transport { message: String, transient: bool },
    #[error("Field `{0}` missing from rpc response")]
    MissingField(&'static str),
    #[error("Block {0} not found")]
    BlockNotFound(u64),
}

impl ChainError {
    pub fn revert_data(&self) -> Option<&Bytes> {
        match self {
            ChainError::Reverted { data, .. } => data.as_ref(),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ChainError::Reverted { message, .. }
            | ChainError::Rpc { message, .. }
            | ChainError::Transport { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChainError::Transport {
                transient: true,
                ..
            }
        )
    }
}

/// A read-only call or gas estimation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub input: Bytes,
}

/// Fee parameters quoted by the node, in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimate {
    pub gas_price: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Historical log filter. `None` topics are wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogFilter {
    pub address: Address,
    pub event_signatures: Vec<B256>,
    pub topics: [Option<B256>; 3],
    pub from_block: u64,
    /// `None` queries up to the latest block.
    pub to_block: Option<u64>,
}

impl LogFilter {
    /// Whether `log` would be returned by a node for this filter.
    pub fn matches(&self, log: &Log) -> bool {
        if log.address() != self.address {
            return false;
        }

        let block = log.block_number.unwrap_or_default();
        if block < self.from_block || self.to_block.is_some_and(|to| block > to) {
            return false;
        }

        let topics = log.topics();
        if !self.event_signatures.is_empty()
            && !topics
                .first()
                .is_some_and(|topic0| self.event_signatures.contains(topic0))
        {
            return false;
        }

        self.topics
            .iter()
            .enumerate()
            .all(|(i, expected)| match expected {
                Some(expected) => topics.get(i + 1) == Some(expected),
                None => true,
            })
    }
}

/// JSON-RPC operations the engine needs from a node.
///
/// Implementations must tolerate concurrent outstanding requests.
#[async_trait]
pub trait ChainClient: Debug + Send + Sync {
    /// `eth_chainId`
    async fn chain_id(&self) -> ChainResult<u64>;

    /// `eth_blockNumber`
    async fn block_number(&self) -> ChainResult<u64>;

    /// Next nonce for `address`, including pending transactions.
    async fn nonce(&self, address: Address) -> ChainResult<u64>;

    async fn fee_estimate(&self) -> ChainResult<FeeEstimate>;

    /// `eth_estimateGas`. Reverts surface as [`ChainError::Reverted`].
    async fn estimate_gas(&self, call: &CallRequest) -> ChainResult<u64>;

    /// `eth_call` at `at_block`, or at the latest block when `None`.
    async fn call(&self, call: &CallRequest, at_block: Option<u64>) -> ChainResult<Bytes>;

    /// `eth_sendRawTransaction`
    async fn send_raw_transaction(&self, tx: &SignedTransaction) -> ChainResult<TxHash>;

    /// `eth_getTransactionReceipt`. `None` while the transaction is pending.
    async fn transaction_receipt(&self, hash: TxHash) -> ChainResult<Option<TransactionReceipt>>;

    /// `eth_getTransactionByHash`
    async fn transaction(&self, hash: TxHash) -> ChainResult<Option<ChainTransaction>>;

    /// Timestamp (unix seconds) of block `number`, via `eth_getBlockByNumber`.
    async fn block_timestamp(&self, number: u64) -> ChainResult<u64>;

    /// `eth_getLogs`
    async fn logs(&self, filter: &LogFilter) -> ChainResult<Vec<Log>>;
}
