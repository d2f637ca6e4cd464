use crate::{
    chain::ContractHandle,
    primitives::{
        DecodedEvent,
        EventArg,
        Log,
        TransactionReceipt,
    },
    tx::RevertReason,
    EngineError,
    EngineResult,
};

use alloy_dyn_abi::EventExt;
use tracing::trace;

/// Decodes `log` against the contract's interface.
///
/// Logs emitted by another address, pending logs without a block number or
/// log index, logs whose first topic matches no declared event, and logs whose
/// payload does not fit the declared shape yield `None`.
pub fn decode_log(contract: &ContractHandle, log: &Log) -> Option<DecodedEvent> {
    if log.address() != contract.address() {
        return None;
    }

    let (Some(block_number), Some(log_index)) = (log.block_number, log.log_index) else {
        trace!("Skipping log without a chain position");
        return None;
    };

    let selector = log.topics().first()?;
    let event = contract.interface().event_by_selector(selector)?;

    let decoded = match event.decode_log(log.data(), true) {
        Ok(decoded) => decoded,
        Err(err) => {
            trace!(event = %event.name, %err, "Skipping undecodable log");
            return None;
        }
    };

    let mut indexed = decoded.indexed.into_iter();
    let mut body = decoded.body.into_iter();
    let args = event
        .inputs
        .iter()
        .map(|input| {
            let value = if input.indexed {
                indexed.next()
            } else {
                body.next()
            }?;
            Some(EventArg {
                name: input.name.clone(),
                value,
            })
        })
        .collect::<Option<Vec<_>>>()?;

    Some(DecodedEvent {
        name: event.name.clone(),
        args,
        address: log.address(),
        block_number,
        log_index,
        transaction_hash: log.transaction_hash.unwrap_or_default(),
    })
}

/// Decodes the receipt logs emitted by `contract` whose event name is one of
/// `names`, in log order.
///
/// Fails with [`EngineError::NoMatchingEvent`] when none match, so callers can
/// index the result without further checks.
pub fn decode_receipt(
    contract: &ContractHandle,
    receipt: &TransactionReceipt,
    names: &[&str],
) -> EngineResult<Vec<DecodedEvent>> {
    for name in names {
        contract.interface().event(name)?;
    }

    if !receipt.success {
        return Err(EngineError::Reverted {
            transaction_hash: Some(receipt.transaction_hash),
            reason: RevertReason::unknown("receipt status is failure"),
        });
    }

    let events: Vec<_> = receipt
        .logs
        .iter()
        .filter_map(|log| decode_log(contract, log))
        .filter(|event| names.contains(&event.name.as_str()))
        .collect();

    if events.is_empty() {
        return Err(EngineError::NoMatchingEvent {
            transaction_hash: receipt.transaction_hash,
            expected: names.iter().map(|name| name.to_string()).collect(),
        });
    }

    Ok(events)
}
