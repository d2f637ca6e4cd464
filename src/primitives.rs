pub use alloy_dyn_abi::DynSolValue;
pub use alloy_primitives::{
    address,
    b256,
    bytes,
    hex,
    keccak256,
    Address,
    Bytes,
    FixedBytes,
    LogData,
    TxHash,
    B256,
    U256,
};
pub use alloy_rpc_types::Log;

use crate::{
    chain::{
        ContractError,
        ContractHandle,
    },
    EngineError,
};

use alloy_dyn_abi::JsonAbiExt;

/// A contract method invocation: target contract, method name and ordered arguments.
///
/// Built fresh for every call and never reused across operations.
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    pub contract: ContractHandle,
    pub method: String,
    pub args: Vec<DynSolValue>,
}

impl TransactionRequest {
    pub fn new(contract: &ContractHandle, method: impl Into<String>, args: Vec<DynSolValue>) -> Self {
        Self {
            contract: contract.clone(),
            method: method.into(),
            args,
        }
    }

    /// ABI-encodes the call, selector included.
    pub fn calldata(&self) -> Result<Bytes, ContractError> {
        let function = self
            .contract
            .interface()
            .function(&self.method, self.args.len())?;
        Ok(function.abi_encode_input(&self.args)?.into())
    }
}

/// State of a submitted transaction as last observed by the submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Pending,
    Mined { block_number: u64 },
}

/// Handle to a transaction that has been accepted by the node.
#[derive(Debug, Clone)]
pub struct TransactionHandle {
    pub hash: TxHash,
    pub from: Address,
    pub request: TransactionRequest,
    pub state: TxState,
}

/// The chain's record of a mined transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionReceipt {
    pub transaction_hash: TxHash,
    pub block_number: u64,
    pub logs: Vec<Log>,
    pub success: bool,
}

/// A signed, RLP encoded transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub hash: TxHash,
    pub from: Address,
    pub to: Address,
    pub input: Bytes,
    pub raw: Bytes,
}

/// The subset of a transaction object the engine reads back from the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTransaction {
    pub hash: TxHash,
    pub from: Address,
    pub block_number: Option<u64>,
}

/// A named event argument.
#[derive(Debug, Clone, PartialEq)]
pub struct EventArg {
    pub name: String,
    pub value: DynSolValue,
}

/// A log decoded against a contract interface.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub name: String,
    /// Arguments in declaration order, indexed and non-indexed merged.
    pub args: Vec<EventArg>,
    pub address: Address,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: TxHash,
}

impl DecodedEvent {
    /// Position used to order events chronologically.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }

    pub fn arg(&self, name: &str) -> Option<&DynSolValue> {
        self.args
            .iter()
            .find(|arg| arg.name == name)
            .map(|arg| &arg.value)
    }

    pub fn uint(&self, name: &str) -> Result<U256, EngineError> {
        self.arg(name)
            .and_then(DynSolValue::as_uint)
            .map(|(value, _)| value)
            .ok_or_else(|| self.shape_error(name))
    }

    pub fn string(&self, name: &str) -> Result<String, EngineError> {
        self.arg(name)
            .and_then(DynSolValue::as_str)
            .map(str::to_owned)
            .ok_or_else(|| self.shape_error(name))
    }

    pub fn address_arg(&self, name: &str) -> Result<Address, EngineError> {
        self.arg(name)
            .and_then(DynSolValue::as_address)
            .ok_or_else(|| self.shape_error(name))
    }

    pub fn bool_arg(&self, name: &str) -> Result<bool, EngineError> {
        self.arg(name)
            .and_then(DynSolValue::as_bool)
            .ok_or_else(|| self.shape_error(name))
    }

    pub fn uint_array(&self, name: &str) -> Result<Vec<U256>, EngineError> {
        let values = self
            .arg(name)
            .and_then(DynSolValue::as_array)
            .ok_or_else(|| self.shape_error(name))?;

        values
            .iter()
            .map(|value| {
                value
                    .as_uint()
                    .map(|(value, _)| value)
                    .ok_or_else(|| self.shape_error(name))
            })
            .collect()
    }

    fn shape_error(&self, arg: &str) -> EngineError {
        EngineError::UnexpectedEventShape {
            event: self.name.clone(),
            arg: arg.to_owned(),
        }
    }
}

/// Decoded return values of a read-only call, in output order.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutput {
    pub method: String,
    pub values: Vec<DynSolValue>,
}

impl CallOutput {
    pub fn value(&self, index: usize) -> Result<&DynSolValue, EngineError> {
        self.values.get(index).ok_or_else(|| self.return_error())
    }

    pub fn string(&self, index: usize) -> Result<String, EngineError> {
        self.value(index)?
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| self.return_error())
    }

    pub fn address(&self, index: usize) -> Result<Address, EngineError> {
        self.value(index)?
            .as_address()
            .ok_or_else(|| self.return_error())
    }

    pub fn bool(&self, index: usize) -> Result<bool, EngineError> {
        self.value(index)?
            .as_bool()
            .ok_or_else(|| self.return_error())
    }

    pub fn uint_array(&self, index: usize) -> Result<Vec<U256>, EngineError> {
        self.array(index)?
            .iter()
            .map(|value| {
                value
                    .as_uint()
                    .map(|(value, _)| value)
                    .ok_or_else(|| self.return_error())
            })
            .collect()
    }

    pub fn address_array(&self, index: usize) -> Result<Vec<Address>, EngineError> {
        self.array(index)?
            .iter()
            .map(|value| value.as_address().ok_or_else(|| self.return_error()))
            .collect()
    }

    fn array(&self, index: usize) -> Result<&[DynSolValue], EngineError> {
        self.value(index)?
            .as_array()
            .ok_or_else(|| self.return_error())
    }

    fn return_error(&self) -> EngineError {
        EngineError::UnexpectedReturn {
            method: self.method.clone(),
        }
    }
}

/// Narrows a uint256 to u64, the width used for ids in read models.
pub fn to_u64(value: U256, what: &'static str) -> Result<u64, EngineError> {
    value
        .try_into()
        .map_err(|_| EngineError::ValueOutOfRange { what })
}
