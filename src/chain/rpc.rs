use crate::{
    chain::{
        CallRequest,
        ChainClient,
        ChainError,
        ChainResult,
        FeeEstimate,
        LogFilter,
    },
    primitives::{
        Address,
        Bytes,
        ChainTransaction,
        Log,
        SignedTransaction,
        TransactionReceipt,
        TxHash,
    },
};

use alloy_network::TransactionBuilder;
use alloy_network_primitives::{
    ReceiptResponse,
    TransactionResponse,
};
use alloy_primitives::U64;
use alloy_provider::{
    Provider,
    RootProvider,
};
use alloy_rpc_types::{
    BlockNumberOrTag,
    Filter,
    TransactionRequest as RpcTransactionRequest,
};
use alloy_transport::{
    RpcError,
    TransportError,
    TransportErrorKind,
};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{
    instrument,
    trace,
};
use url::Url;

/// [`ChainClient`] backed by an alloy [`Provider`].
///
/// ``` no_run
/// use token_engine::chain::{AlloyChainClient, ChainClient};
///
/// #[tokio::main]
/// async fn main() {
///     let client = AlloyChainClient::connect_http("http://127.0.0.1:8545".parse().unwrap());
///     let head = client.block_number().await.unwrap();
///     println!("head: {head}");
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AlloyChainClient<P = RootProvider> {
    provider: P,
}

impl AlloyChainClient {
    /// Client over a plain HTTP JSON-RPC endpoint.
    pub fn connect_http(url: Url) -> Self {
        Self::new(RootProvider::new_http(url))
    }
}

impl<P> AlloyChainClient<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

#[derive(Debug, Deserialize)]
struct BlockTimestamp {
    timestamp: U64,
}

fn rpc_call_request(call: &CallRequest) -> RpcTransactionRequest {
    let request = RpcTransactionRequest::default()
        .with_to(call.to)
        .with_input(call.input.clone());

    match call.from {
        Some(from) => request.with_from(from),
        None => request,
    }
}

fn rpc_filter(filter: &LogFilter) -> Filter {
    let mut rpc_filter = Filter::new()
        .address(filter.address)
        .from_block(filter.from_block);

    if let Some(to_block) = filter.to_block {
        rpc_filter = rpc_filter.to_block(to_block);
    }
    if !filter.event_signatures.is_empty() {
        rpc_filter = rpc_filter.event_signature(filter.event_signatures.clone());
    }

    let [topic1, topic2, topic3] = filter.topics;
    if let Some(topic) = topic1 {
        rpc_filter = rpc_filter.topic1(topic);
    }
    if let Some(topic) = topic2 {
        rpc_filter = rpc_filter.topic2(topic);
    }
    if let Some(topic) = topic3 {
        rpc_filter = rpc_filter.topic3(topic);
    }

    rpc_filter
}

#[async_trait]
impl<P> ChainClient for AlloyChainClient<P>
where
    P: Provider + std::fmt::Debug + Send + Sync + 'static,
{
    async fn chain_id(&self) -> ChainResult<u64> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn block_number(&self) -> ChainResult<u64> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn nonce(&self, address: Address) -> ChainResult<u64> {
        Ok(self
            .provider
            .get_transaction_count(address)
            .pending()
            .await?)
    }

    async fn fee_estimate(&self) -> ChainResult<FeeEstimate> {
        let gas_price = self.provider.get_gas_price().await?;
        let max_priority_fee_per_gas = self.provider.get_max_priority_fee_per_gas().await?;

        Ok(FeeEstimate {
            gas_price,
            max_priority_fee_per_gas,
        })
    }

    async fn estimate_gas(&self, call: &CallRequest) -> ChainResult<u64> {
        let gas: U64 = self
            .provider
            .raw_request("eth_estimateGas".into(), (rpc_call_request(call),))
            .await?;
        Ok(gas.to::<u64>())
    }

    async fn call(&self, call: &CallRequest, at_block: Option<u64>) -> ChainResult<Bytes> {
        let block = at_block.map_or(BlockNumberOrTag::Latest, BlockNumberOrTag::Number);
        Ok(self
            .provider
            .raw_request("eth_call".into(), (rpc_call_request(call), block))
            .await?)
    }

    async fn send_raw_transaction(&self, tx: &SignedTransaction) -> ChainResult<TxHash> {
        let pending = self.provider.send_raw_transaction(&tx.raw).await?;
        Ok(*pending.tx_hash())
    }

    async fn transaction_receipt(&self, hash: TxHash) -> ChainResult<Option<TransactionReceipt>> {
        let Some(receipt) = self.provider.get_transaction_receipt(hash).await? else {
            return Ok(None);
        };

        Ok(Some(TransactionReceipt {
            transaction_hash: receipt.transaction_hash(),
            block_number: receipt
                .block_number()
                .ok_or(ChainError::MissingField("blockNumber"))?,
            logs: receipt.inner.logs().to_vec(),
            success: receipt.status(),
        }))
    }

    async fn transaction(&self, hash: TxHash) -> ChainResult<Option<ChainTransaction>> {
        let transaction = self.provider.get_transaction_by_hash(hash).await?;

        Ok(transaction.map(|tx| ChainTransaction {
            hash: TransactionResponse::tx_hash(&tx),
            from: TransactionResponse::from(&tx),
            block_number: TransactionResponse::block_number(&tx),
        }))
    }

    async fn block_timestamp(&self, number: u64) -> ChainResult<u64> {
        let block: Option<BlockTimestamp> = self
            .provider
            .raw_request(
                "eth_getBlockByNumber".into(),
                (BlockNumberOrTag::Number(number), false),
            )
            .await?;

        block
            .map(|block| block.timestamp.to::<u64>())
            .ok_or(ChainError::BlockNotFound(number))
    }

    #[instrument(skip(self), level = "trace")]
    async fn logs(&self, filter: &LogFilter) -> ChainResult<Vec<Log>> {
        let logs = self.provider.get_logs(&rpc_filter(filter)).await?;
        trace!(count = logs.len(), "Fetched logs");
        Ok(logs)
    }
}

impl From<TransportError> for ChainError {
    fn from(err: TransportError) -> Self {
        if let Some(payload) = err.as_error_resp() {
            let message = payload.message.to_string();
            let data = payload.as_revert_data();

            if data.is_some() || message.to_ascii_lowercase().contains("revert") {
                return ChainError::Reverted { data, message };
            }
            if payload.is_retry_err() {
                return ChainError::Transport {
                    message,
                    transient: true,
                };
            }

            return ChainError::Rpc {
                code: payload.code,
                message,
            };
        }

        ChainError::Transport {
            transient: is_transient(&err),
            message: err.to_string(),
        }
    }
}

/// Rate limits and dropped backends clear up on their own; everything else is
/// reported as permanent.
fn is_transient(err: &TransportError) -> bool {
    match err {
        RpcError::Transport(kind) => match kind {
            TransportErrorKind::BackendGone | TransportErrorKind::MissingBatchResponse(_) => true,
            TransportErrorKind::Custom(custom) => {
                let message = custom.to_string().to_ascii_lowercase();
                message.contains("too many requests")
                    || message.contains("rate limit")
                    || message.contains("timed out")
            }
            _ => false,
        },
        RpcError::NullResp => true,
        RpcError::DeserError { text, .. } => {
            let text = text.to_ascii_lowercase();
            text.contains("rate limit")
                || text.contains("too many requests")
                || text.contains("request limit")
        }
        _ => false,
    }
}
