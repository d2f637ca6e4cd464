//! Transaction submission, confirmation and read-only calls.

mod revert;
pub use revert::{
    is_nonce_conflict,
    RevertKind,
    RevertReason,
};

use crate::{
    chain::{
        CallRequest,
        ChainError,
        ContractHandle,
        SharedChainClient,
    },
    primitives::{
        CallOutput,
        TransactionHandle,
        TransactionReceipt,
        TransactionRequest,
        TxState,
    },
    signer::Signer,
    EngineError,
    EngineResult,
};

use alloy_dyn_abi::FunctionExt;
use alloy_network::TransactionBuilder;
use alloy_rpc_types::TransactionRequest as RpcTransactionRequest;

use std::{
    sync::Arc,
    time::Duration,
};
use tracing::{
    debug,
    info,
    instrument,
    warn,
};

/// Headroom applied on top of `eth_estimateGas`.
const GAS_ESTIMATE_MULTIPLIER: f64 = 1.2;

/// Floor for the receipt poll interval; `tokio::time::interval` rejects zero.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// How long and how often to poll for a receipt.
///
/// A receipt means the transaction is included in one block. Nothing protects
/// the result against reorganizations; treat it as provisional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Builds, signs and sends contract transactions, then waits for them.
///
/// Nothing is retried: a failed submission or an unconfirmed transaction is
/// reported to the caller, who owns the decision to try again.
#[derive(Debug, Clone)]
pub struct TransactionSubmitter {
    chain: SharedChainClient,
    signer: Arc<Signer>,
    policy: ConfirmationPolicy,
}

impl TransactionSubmitter {
    pub fn new(chain: SharedChainClient, signer: Arc<Signer>, policy: ConfirmationPolicy) -> Self {
        Self {
            chain,
            signer,
            policy,
        }
    }

    pub fn sender(&self) -> crate::primitives::Address {
        self.signer.derive_address()
    }

    /// Signs and sends `request`, returning as soon as the node accepts it.
    #[instrument(skip_all, fields(contract = %request.contract.address(), method = %request.method))]
    pub async fn submit(&self, request: TransactionRequest) -> EngineResult<TransactionHandle> {
        let from = self.signer.derive_address();
        let call = CallRequest {
            from: Some(from),
            to: request.contract.address(),
            input: request.calldata()?,
        };

        let gas = self
            .chain
            .estimate_gas(&call)
            .await
            .map_err(|err| submission_error(&request.contract, err))?;
        let fees = self
            .chain
            .fee_estimate()
            .await
            .map_err(|err| submission_error(&request.contract, err))?;
        let nonce = self
            .chain
            .nonce(from)
            .await
            .map_err(|err| submission_error(&request.contract, err))?;
        let chain_id = self
            .chain
            .chain_id()
            .await
            .map_err(|err| submission_error(&request.contract, err))?;

        let params = RpcTransactionRequest::default()
            .with_from(from)
            .with_to(call.to)
            .with_input(call.input.clone())
            .with_nonce(nonce)
            .with_chain_id(chain_id)
            .with_gas_limit(apply_gas_estimate_multiplier(gas))
            .with_max_fee_per_gas(fees.gas_price * 2 + fees.max_priority_fee_per_gas)
            .with_max_priority_fee_per_gas(fees.max_priority_fee_per_gas);

        let signed = self.signer.sign(params).await?;

        let hash = self
            .chain
            .send_raw_transaction(&signed)
            .await
            .map_err(|err| submission_error(&request.contract, err))?;

        info!(%hash, nonce, gas, "Transaction submitted");

        Ok(TransactionHandle {
            hash,
            from,
            request,
            state: TxState::Pending,
        })
    }

    /// Waits until the transaction is included in a block.
    ///
    /// Fails with [`EngineError::Timeout`] if no receipt shows up within the
    /// policy timeout (the transaction may still land later), and with
    /// [`EngineError::Reverted`] if it was mined but failed. Only successful
    /// receipts are returned.
    #[instrument(skip_all, fields(hash = %handle.hash))]
    pub async fn wait_for_confirmation(
        &self,
        handle: &mut TransactionHandle,
    ) -> EngineResult<TransactionReceipt> {
        let receipt = tokio::time::timeout(self.policy.timeout, self.poll_receipt(handle))
            .await
            .map_err(|_| {
                warn!(waited = ?self.policy.timeout, "Transaction not confirmed in time");
                EngineError::Timeout {
                    transaction_hash: handle.hash,
                    waited: self.policy.timeout,
                }
            })??;

        handle.state = TxState::Mined {
            block_number: receipt.block_number,
        };

        if !receipt.success {
            let reason = self.replay_revert(handle, receipt.block_number).await;
            warn!(block = receipt.block_number, %reason, "Transaction reverted");
            return Err(EngineError::Reverted {
                transaction_hash: Some(handle.hash),
                reason,
            });
        }

        debug!(block = receipt.block_number, logs = receipt.logs.len(), "Transaction confirmed");
        Ok(receipt)
    }

    /// Submits `request` and waits for its receipt.
    pub async fn submit_and_confirm(
        &self,
        request: TransactionRequest,
    ) -> EngineResult<TransactionReceipt> {
        let mut handle = self.submit(request).await?;
        self.wait_for_confirmation(&mut handle).await
    }

    /// Executes a read-only call and decodes its return values.
    ///
    /// Reverts surface synchronously as [`EngineError::Reverted`] without a
    /// transaction hash.
    #[instrument(skip_all, fields(contract = %request.contract.address(), method = %request.method))]
    pub async fn call(&self, request: &TransactionRequest) -> EngineResult<CallOutput> {
        let interface = request.contract.interface();
        let function = interface.function(&request.method, request.args.len())?;
        let call = CallRequest {
            from: Some(self.signer.derive_address()),
            to: request.contract.address(),
            input: request.calldata()?,
        };

        let output = self
            .chain
            .call(&call, None)
            .await
            .map_err(|err| match err {
                ChainError::Reverted { .. } => EngineError::Reverted {
                    transaction_hash: None,
                    reason: RevertReason::from_chain_error(interface, &err),
                },
                other => EngineError::Chain(other),
            })?;

        let values = function
            .abi_decode_output(&output, true)
            .map_err(crate::chain::ContractError::from)?;

        Ok(CallOutput {
            method: request.method.clone(),
            values,
        })
    }

    /// Polls until a receipt shows up. Transient query failures are retried
    /// until the caller's timeout; anything else is reported with the hash,
    /// since the transaction may be mined regardless.
    async fn poll_receipt(&self, handle: &TransactionHandle) -> EngineResult<TransactionReceipt> {
        let mut interval = tokio::time::interval(self.policy.poll_interval.max(MIN_POLL_INTERVAL));
        loop {
            interval.tick().await;
            match self.chain.transaction_receipt(handle.hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(err) if err.is_transient() => {
                    warn!(%err, "Receipt query failed, polling again");
                }
                Err(source) => {
                    return Err(EngineError::Confirmation {
                        transaction_hash: handle.hash,
                        source,
                    })
                }
            }
        }
    }

    /// Re-executes a failed transaction at its block to recover the revert data.
    async fn replay_revert(&self, handle: &TransactionHandle, block_number: u64) -> RevertReason {
        let interface = handle.request.contract.interface();
        let input = match handle.request.calldata() {
            Ok(input) => input,
            Err(err) => return RevertReason::unknown(err.to_string()),
        };
        let call = CallRequest {
            from: Some(handle.from),
            to: handle.request.contract.address(),
            input,
        };

        match self.chain.call(&call, Some(block_number)).await {
            Err(err @ ChainError::Reverted { .. }) => RevertReason::from_chain_error(interface, &err),
            Err(err) => RevertReason::unknown(format!("revert reason unavailable: {err}")),
            Ok(_) => RevertReason::unknown("revert reason unavailable"),
        }
    }
}

fn apply_gas_estimate_multiplier(estimate: u64) -> u64 {
    (estimate as f64 * GAS_ESTIMATE_MULTIPLIER).ceil() as u64
}

fn submission_error(contract: &ContractHandle, err: ChainError) -> EngineError {
    if is_nonce_conflict(&err) {
        return EngineError::NonceConflict {
            message: err.message(),
        };
    }

    let revert = matches!(err, ChainError::Reverted { .. })
        .then(|| RevertReason::from_chain_error(contract.interface(), &err));

    EngineError::Submission {
        message: err.message(),
        revert,
    }
}
