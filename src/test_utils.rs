#![cfg(any(test, feature = "test"))]

use crate::{
    chain::{
        abi,
        CallRequest,
        ChainClient,
        ChainError,
        ChainResult,
        ContractHandle,
        ContractInterface,
        FeeEstimate,
        LogFilter,
        SharedChainClient,
    },
    config::EngineContext,
    primitives::{
        address,
        keccak256,
        Address,
        Bytes,
        ChainTransaction,
        DynSolValue,
        FixedBytes,
        Log,
        LogData,
        SignedTransaction,
        TransactionReceipt,
        TxHash,
        U256,
    },
    signer::Signer,
    tx::{
        ConfirmationPolicy,
        TransactionSubmitter,
    },
};

use alloy_dyn_abi::{
    FunctionExt,
    JsonAbiExt,
};
use alloy_json_abi::Function;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::{
        BTreeMap,
        HashMap,
    },
    sync::Arc,
};

/// First anvil development account.
pub const TEST_PRIVATE_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const TEST_ADDRESS: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

pub const TOKEN_ADDRESS: Address = Address::new([0x11; 20]);
pub const CONTAINER_ADDRESS: Address = Address::new([0x22; 20]);

pub const CHAIN_ID: u64 = 31337;
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
pub const BLOCK_TIME: u64 = 12;
pub const GAS_ESTIMATE: u64 = 100_000;
pub const GAS_PRICE: u128 = 1_000_000_000;

const FIELD_EVENTS: [&str; 5] = [
    "AssetUriSet",
    "AssetHashSet",
    "MetadataUriSet",
    "MetadataHashSet",
    "AdditionalDataSet",
];

fn interface(json: &str) -> Arc<ContractInterface> {
    Arc::new(ContractInterface::from_json(json).unwrap())
}

pub fn token_handle() -> ContractHandle {
    ContractHandle::new(TOKEN_ADDRESS, interface(abi::TOKEN_ABI))
}

pub fn container_handle() -> ContractHandle {
    ContractHandle::new(CONTAINER_ADDRESS, interface(abi::CONTAINER_ABI))
}

/// Segment interface bound to the zero address; rebind with
/// [`ContractHandle::at`].
pub fn segment_template() -> ContractHandle {
    ContractHandle::new(Address::ZERO, interface(abi::SEGMENT_ABI))
}

pub fn test_signer() -> Signer {
    Signer::from_private_key(Some(TEST_PRIVATE_KEY)).unwrap()
}

/// Builds the log `contract` would emit for `event` with `args` given in
/// declaration order.
pub fn emit(
    contract: &ContractHandle,
    event: &str,
    args: Vec<DynSolValue>,
    block_number: u64,
    log_index: u64,
) -> Log {
    let event = contract.interface().event(event).unwrap();
    assert_eq!(event.inputs.len(), args.len(), "arity of {}", event.name);

    let mut topics = vec![event.selector()];
    let mut body = Vec::new();
    for (input, value) in event.inputs.iter().zip(args) {
        if input.indexed {
            topics.push(
                value
                    .as_word()
                    .unwrap_or_else(|| keccak256(value.abi_encode_packed())),
            );
        } else {
            body.push(value);
        }
    }

    Log {
        inner: alloy_primitives::Log {
            address: contract.address(),
            data: LogData::new_unchecked(topics, DynSolValue::Tuple(body).abi_encode_params().into()),
        },
        block_number: Some(block_number),
        log_index: Some(log_index),
        ..Default::default()
    }
}

/// Revert data for the custom error `name` declared by `contract`.
pub fn custom_error(contract: &ContractHandle, name: &str, args: Vec<DynSolValue>) -> Bytes {
    let error = &contract.interface().abi().errors[name][0];
    let mut data = error.selector().to_vec();
    data.extend(DynSolValue::Tuple(args).abi_encode_params());
    data.into()
}

fn reverted(data: Option<Bytes>) -> ChainError {
    ChainError::Reverted {
        data,
        message: "execution reverted".into(),
    }
}

fn uint(value: U256) -> DynSolValue {
    DynSolValue::Uint(value, 256)
}

fn uint_arg(args: &[DynSolValue], index: usize) -> U256 {
    args[index].as_uint().unwrap().0
}

fn string_arg(args: &[DynSolValue], index: usize) -> String {
    args[index].as_str().unwrap().to_owned()
}

/// A contract call recorded by [`MockChain`] when a transaction is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct SentCall {
    pub from: Address,
    pub to: Address,
    pub method: String,
    pub args: Vec<DynSolValue>,
}

#[derive(Debug, Clone)]
struct TokenRecord {
    owner: Address,
    /// remoteId, assetUri, assetHash, metadataUri, metadataHash, additionalData
    fields: [String; 6],
    active: bool,
    parents: Vec<U256>,
    children: Vec<U256>,
}

#[derive(Debug, Clone)]
struct SegmentRecord {
    address: Address,
    name: String,
    tokens: Vec<U256>,
}

#[derive(Debug, Clone)]
struct MinedTransaction {
    from: Address,
    block_number: u64,
    success: bool,
    logs: Vec<Log>,
}

/// Pending events of one execution, emitted only if it commits.
type Emitted = Vec<(ContractHandle, &'static str, Vec<DynSolValue>)>;

#[derive(Debug, Clone)]
struct MockState {
    head: u64,
    next_token_id: u64,
    tokens: BTreeMap<U256, TokenRecord>,
    segments: Vec<SegmentRecord>,
    logs: Vec<Log>,
    transactions: HashMap<TxHash, MinedTransaction>,
    nonces: HashMap<Address, u64>,
    /// Revert data replayed by `eth_call` at the block of a failed transaction.
    replays: HashMap<u64, Bytes>,
    sent: Vec<SentCall>,
    log_queries: Vec<LogFilter>,
    fail_next_send: Option<String>,
    revert_next_mined: Option<Bytes>,
    withhold_receipts: bool,
    /// Remaining receipt queries to fail, and whether the failure is transient.
    receipt_failures: (usize, bool),
    keep_owner_on_burn: bool,
    zero_owner_on_burn: bool,
    fail_log_queries: bool,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            head: 0,
            next_token_id: 1,
            tokens: BTreeMap::new(),
            segments: Vec::new(),
            logs: Vec::new(),
            transactions: HashMap::new(),
            nonces: HashMap::new(),
            replays: HashMap::new(),
            sent: Vec::new(),
            log_queries: Vec::new(),
            fail_next_send: None,
            revert_next_mined: None,
            withhold_receipts: false,
            receipt_failures: (0, false),
            keep_owner_on_burn: false,
            zero_owner_on_burn: false,
            fail_log_queries: false,
        }
    }
}

/// In-memory chain running the token, container and segment contracts.
///
/// Every sent transaction is mined immediately in its own block; block `n` has
/// timestamp `GENESIS_TIMESTAMP + n * BLOCK_TIME`. Clones share state.
#[derive(Debug, Clone)]
pub struct MockChain {
    state: Arc<Mutex<MockState>>,
    token: ContractHandle,
    container: ContractHandle,
    segment: ContractHandle,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            token: token_handle(),
            container: container_handle(),
            segment: segment_template(),
        }
    }

    pub fn shared(&self) -> SharedChainClient {
        Arc::new(self.clone())
    }

    pub fn submitter(&self) -> TransactionSubmitter {
        TransactionSubmitter::new(
            self.shared(),
            Arc::new(test_signer()),
            ConfirmationPolicy::default(),
        )
    }

    pub fn engine_context(&self) -> EngineContext {
        EngineContext::new(
            self.shared(),
            test_signer(),
            ConfirmationPolicy::default(),
            None,
            self.token.clone(),
            Some(self.container.clone()),
            self.segment.clone(),
        )
    }

    pub fn set_next_token_id(&self, id: u64) {
        self.state.lock().next_token_id = id;
    }

    /// Rejects the next `eth_sendRawTransaction` with `message`.
    pub fn fail_next_send(&self, message: &str) {
        self.state.lock().fail_next_send = Some(message.to_owned());
    }

    pub fn withhold_receipts(&self, withhold: bool) {
        self.state.lock().withhold_receipts = withhold;
    }

    /// Fails the next `count` receipt queries with a transport error
    /// (`transient`) or an rpc error.
    pub fn fail_receipt_queries(&self, count: usize, transient: bool) {
        self.state.lock().receipt_failures = (count, transient);
    }

    /// Mines the next transaction as failed with the token error `name`.
    pub fn revert_next_mined(&self, name: &str, args: Vec<DynSolValue>) {
        self.state.lock().revert_next_mined = Some(custom_error(&self.token, name, args));
    }

    /// Makes `burn` emit its transfer but leave the owner in place.
    pub fn keep_owner_on_burn(&self, keep: bool) {
        self.state.lock().keep_owner_on_burn = keep;
    }

    /// Makes `burn` keep the token but hand it to the zero address, so
    /// `ownerOf` answers instead of reverting.
    pub fn zero_owner_on_burn(&self, zero: bool) {
        self.state.lock().zero_owner_on_burn = zero;
    }

    pub fn fail_log_queries(&self, fail: bool) {
        self.state.lock().fail_log_queries = fail;
    }

    pub fn mine_empty_blocks(&self, count: u64) {
        self.state.lock().head += count;
    }

    /// Appends an event log at `block_number` in a transaction of its own.
    pub fn inject_event(
        &self,
        contract: &ContractHandle,
        event: &str,
        args: Vec<DynSolValue>,
        block_number: u64,
    ) {
        let mut state = self.state.lock();
        let log_index = state
            .logs
            .iter()
            .filter(|log| log.block_number == Some(block_number))
            .count() as u64;

        let mut log = emit(contract, event, args, block_number, log_index);
        let hash = keccak256([block_number.to_be_bytes(), log_index.to_be_bytes()].concat());
        log.transaction_hash = Some(hash);

        state.head = state.head.max(block_number);
        state.transactions.insert(
            hash,
            MinedTransaction {
                from: TEST_ADDRESS,
                block_number,
                success: true,
                logs: vec![log.clone()],
            },
        );
        state.logs.push(log);
    }

    pub fn sent_calls(&self) -> Vec<SentCall> {
        self.state.lock().sent.clone()
    }

    pub fn last_sent_call(&self) -> Option<SentCall> {
        self.state.lock().sent.last().cloned()
    }

    pub fn log_queries(&self) -> Vec<LogFilter> {
        self.state.lock().log_queries.clone()
    }

    fn resolve(&self, state: &MockState, to: Address) -> Option<ContractHandle> {
        if to == TOKEN_ADDRESS {
            Some(self.token.clone())
        } else if to == CONTAINER_ADDRESS {
            Some(self.container.clone())
        } else if state.segments.iter().any(|segment| segment.address == to) {
            Some(self.segment.at(to))
        } else {
            None
        }
    }

    fn function(contract: &ContractHandle, input: &[u8]) -> Option<(Function, Vec<DynSolValue>)> {
        if input.len() < 4 {
            return None;
        }
        let selector = FixedBytes::<4>::from_slice(&input[..4]);
        let function = contract
            .interface()
            .abi()
            .functions()
            .find(|function| function.selector() == selector)?
            .clone();
        let args = function.abi_decode_input(&input[4..], true).ok()?;
        Some((function, args))
    }

    /// Runs a call against `state`, returning the encoded output and the
    /// events it emits.
    fn execute(
        &self,
        state: &mut MockState,
        from: Address,
        to: Address,
        input: &[u8],
    ) -> ChainResult<(Bytes, Emitted)> {
        let contract = self.resolve(state, to).ok_or_else(|| reverted(None))?;
        let (function, args) = Self::function(&contract, input).ok_or_else(|| reverted(None))?;

        let mut emitted = Emitted::new();
        let output = if to == TOKEN_ADDRESS {
            state.token_call(&contract, from, &function.name, &args, &mut emitted)
        } else if to == CONTAINER_ADDRESS {
            state.container_call(&contract, &function.name, &args, &mut emitted)
        } else {
            state.segment_call(&contract, &function.name, &args, &mut emitted)
        }
        .map_err(|data| reverted(Some(data)))?;

        let output = function
            .abi_encode_output(&output)
            .map_err(|err| reverted(Some(Bytes::from(err.to_string().into_bytes()))))?;
        Ok((output.into(), emitted))
    }

    fn simulate(&self, call: &CallRequest) -> ChainResult<Bytes> {
        let mut scratch = self.state.lock().clone();
        let from = call.from.unwrap_or_default();
        self.execute(&mut scratch, from, call.to, &call.input)
            .map(|(output, _)| output)
    }
}

impl MockState {
    fn token(&self, contract: &ContractHandle, id: U256) -> Result<&TokenRecord, Bytes> {
        self.tokens
            .get(&id)
            .ok_or_else(|| custom_error(contract, "ERC721NonexistentToken", vec![uint(id)]))
    }

    fn token_call(
        &mut self,
        contract: &ContractHandle,
        from: Address,
        method: &str,
        args: &[DynSolValue],
        emitted: &mut Emitted,
    ) -> Result<Vec<DynSolValue>, Bytes> {
        match method {
            "mintToken" | "mintTokenWithParents" => {
                let receiver = args[0].as_address().unwrap();
                let remote_id = string_arg(args, 1);
                if self
                    .tokens
                    .values()
                    .any(|token| token.fields[0] == remote_id)
                {
                    return Err(custom_error(
                        contract,
                        "RemoteIdAlreadyExists",
                        vec![DynSolValue::String(remote_id)],
                    ));
                }

                let parents: Vec<U256> = match args.get(7) {
                    Some(parents) => {
                        parents
                            .as_array()
                            .unwrap()
                            .iter()
                            .map(|id| id.as_uint().unwrap().0)
                            .collect()
                    }
                    None => Vec::new(),
                };
                for parent in &parents {
                    self.token(contract, *parent)?;
                }

                let id = U256::from(self.next_token_id);
                self.next_token_id += 1;
                let fields: [String; 6] = std::array::from_fn(|i| string_arg(args, i + 1));
                for parent in &parents {
                    if let Some(parent) = self.tokens.get_mut(parent) {
                        parent.children.push(id);
                    }
                }
                self.tokens.insert(
                    id,
                    TokenRecord {
                        owner: receiver,
                        fields: fields.clone(),
                        active: false,
                        parents: parents.clone(),
                        children: Vec::new(),
                    },
                );

                emitted.push((
                    contract.clone(),
                    "Transfer",
                    vec![
                        DynSolValue::Address(Address::ZERO),
                        DynSolValue::Address(receiver),
                        uint(id),
                    ],
                ));
                let mut created = vec![DynSolValue::Address(receiver), uint(id)];
                created.extend(fields.into_iter().map(DynSolValue::String));
                emitted.push((contract.clone(), "TokenCreated", created));
                if method == "mintTokenWithParents" {
                    emitted.push((
                        contract.clone(),
                        "ParentsLinked",
                        vec![
                            uint(id),
                            DynSolValue::Array(parents.into_iter().map(uint).collect()),
                            DynSolValue::Bool(false),
                        ],
                    ));
                }
                Ok(vec![uint(id)])
            }
            "updateToken" => {
                let id = uint_arg(args, 0);
                let owner = self.token(contract, id)?.owner;
                if owner != from {
                    return Err(custom_error(
                        contract,
                        "ERC721InsufficientApproval",
                        vec![DynSolValue::Address(from), uint(id)],
                    ));
                }
                for (i, event) in FIELD_EVENTS.iter().enumerate() {
                    let value = string_arg(args, i + 1);
                    if value.is_empty() {
                        continue;
                    }
                    if let Some(token) = self.tokens.get_mut(&id) {
                        token.fields[i + 1] = value.clone();
                    }
                    emitted.push((contract.clone(), *event, vec![uint(id), DynSolValue::String(value)]));
                }
                Ok(vec![])
            }
            "burn" => {
                let id = uint_arg(args, 0);
                let owner = self.token(contract, id)?.owner;
                if owner != from {
                    return Err(custom_error(
                        contract,
                        "ERC721IncorrectOwner",
                        vec![DynSolValue::Address(from), uint(id), DynSolValue::Address(owner)],
                    ));
                }
                if self.zero_owner_on_burn {
                    if let Some(token) = self.tokens.get_mut(&id) {
                        token.owner = Address::ZERO;
                    }
                } else if !self.keep_owner_on_burn {
                    self.tokens.remove(&id);
                }
                emitted.push((
                    contract.clone(),
                    "Transfer",
                    vec![
                        DynSolValue::Address(owner),
                        DynSolValue::Address(Address::ZERO),
                        uint(id),
                    ],
                ));
                Ok(vec![])
            }
            "ownerOf" => {
                let token = self.token(contract, uint_arg(args, 0))?;
                Ok(vec![DynSolValue::Address(token.owner)])
            }
            "getToken" => {
                let token = self.token(contract, uint_arg(args, 0))?;
                Ok(token.fields.iter().cloned().map(DynSolValue::String).collect())
            }
            "getHierarchy" => {
                let token = self.token(contract, uint_arg(args, 0))?;
                Ok(vec![
                    DynSolValue::Bool(token.active),
                    DynSolValue::Array(token.parents.iter().copied().map(uint).collect()),
                    DynSolValue::Array(token.children.iter().copied().map(uint).collect()),
                ])
            }
            other => panic!("token method `{other}` is not simulated"),
        }
    }

    fn container_call(
        &mut self,
        contract: &ContractHandle,
        method: &str,
        args: &[DynSolValue],
        emitted: &mut Emitted,
    ) -> Result<Vec<DynSolValue>, Bytes> {
        match method {
            "createSegment" => {
                let name = string_arg(args, 0);
                if self.segments.iter().any(|segment| segment.name == name) {
                    return Err(custom_error(
                        contract,
                        "SegmentAlreadyExists",
                        vec![DynSolValue::String(name)],
                    ));
                }
                let address = Address::from_slice(&keccak256(name.as_bytes())[12..]);
                self.segments.push(SegmentRecord {
                    address,
                    name: name.clone(),
                    tokens: Vec::new(),
                });
                emitted.push((
                    contract.clone(),
                    "SegmentCreated",
                    vec![DynSolValue::Address(address), DynSolValue::String(name)],
                ));
                Ok(vec![DynSolValue::Address(address)])
            }
            "getSegments" => {
                Ok(vec![DynSolValue::Array(
                    self.segments
                        .iter()
                        .map(|segment| DynSolValue::Address(segment.address))
                        .collect(),
                )])
            }
            other => panic!("container method `{other}` is not simulated"),
        }
    }

    fn segment_call(
        &mut self,
        contract: &ContractHandle,
        method: &str,
        args: &[DynSolValue],
        emitted: &mut Emitted,
    ) -> Result<Vec<DynSolValue>, Bytes> {
        let record = self
            .segments
            .iter_mut()
            .find(|segment| segment.address == contract.address())
            .ok_or_else(Bytes::new)?;

        match method {
            "name" => Ok(vec![DynSolValue::String(record.name.clone())]),
            "getTokenIds" => {
                Ok(vec![DynSolValue::Array(
                    record.tokens.iter().copied().map(uint).collect(),
                )])
            }
            "addToken" => {
                let id = uint_arg(args, 0);
                if record.tokens.contains(&id) {
                    return Err(custom_error(contract, "TokenAlreadyInSegment", vec![uint(id)]));
                }
                record.tokens.push(id);
                emitted.push((contract.clone(), "TokenAdded", vec![uint(id)]));
                Ok(vec![])
            }
            "removeToken" => {
                let id = uint_arg(args, 0);
                let Some(position) = record.tokens.iter().position(|token| *token == id) else {
                    return Err(custom_error(contract, "TokenNotInSegment", vec![uint(id)]));
                };
                record.tokens.remove(position);
                emitted.push((contract.clone(), "TokenRemoved", vec![uint(id)]));
                Ok(vec![])
            }
            other => panic!("segment method `{other}` is not simulated"),
        }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn chain_id(&self) -> ChainResult<u64> {
        Ok(CHAIN_ID)
    }

    async fn block_number(&self) -> ChainResult<u64> {
        Ok(self.state.lock().head)
    }

    async fn nonce(&self, address: Address) -> ChainResult<u64> {
        Ok(self
            .state
            .lock()
            .nonces
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    async fn fee_estimate(&self) -> ChainResult<FeeEstimate> {
        Ok(FeeEstimate {
            gas_price: GAS_PRICE,
            max_priority_fee_per_gas: GAS_PRICE,
        })
    }

    async fn estimate_gas(&self, call: &CallRequest) -> ChainResult<u64> {
        self.simulate(call).map(|_| GAS_ESTIMATE)
    }

    async fn call(&self, call: &CallRequest, at_block: Option<u64>) -> ChainResult<Bytes> {
        if let Some(block) = at_block {
            if let Some(data) = self.state.lock().replays.get(&block) {
                return Err(reverted(Some(data.clone())));
            }
        }
        self.simulate(call)
    }

    async fn send_raw_transaction(&self, tx: &SignedTransaction) -> ChainResult<TxHash> {
        let mut state = self.state.lock();
        if let Some(message) = state.fail_next_send.take() {
            return Err(ChainError::Rpc {
                code: -32000,
                message,
            });
        }

        let sent = self
            .resolve(&state, tx.to)
            .and_then(|contract| Self::function(&contract, &tx.input))
            .map_or_else(
                || ("<unknown>".to_owned(), Vec::new()),
                |(function, args)| (function.name, args),
            );
        state.sent.push(SentCall {
            from: tx.from,
            to: tx.to,
            method: sent.0,
            args: sent.1,
        });
        *state.nonces.entry(tx.from).or_default() += 1;

        state.head += 1;
        let block_number = state.head;

        let forced = state.revert_next_mined.take();
        let outcome = match forced {
            Some(data) => Err(reverted(Some(data))),
            None => self.execute(&mut state, tx.from, tx.to, &tx.input),
        };

        let mined = match outcome {
            Ok((_, emitted)) => {
                let logs: Vec<Log> = emitted
                    .into_iter()
                    .enumerate()
                    .map(|(index, (contract, event, args))| {
                        let mut log = emit(&contract, event, args, block_number, index as u64);
                        log.transaction_hash = Some(tx.hash);
                        log
                    })
                    .collect();
                state.logs.extend(logs.iter().cloned());
                MinedTransaction {
                    from: tx.from,
                    block_number,
                    success: true,
                    logs,
                }
            }
            Err(err) => {
                if let Some(data) = err.revert_data() {
                    state.replays.insert(block_number, data.clone());
                }
                MinedTransaction {
                    from: tx.from,
                    block_number,
                    success: false,
                    logs: Vec::new(),
                }
            }
        };
        state.transactions.insert(tx.hash, mined);

        Ok(tx.hash)
    }

    async fn transaction_receipt(&self, hash: TxHash) -> ChainResult<Option<TransactionReceipt>> {
        let mut state = self.state.lock();
        let (remaining, transient) = state.receipt_failures;
        if remaining > 0 {
            state.receipt_failures = (remaining - 1, transient);
            return Err(if transient {
                ChainError::Transport {
                    message: "429 Too Many Requests".into(),
                    transient: true,
                }
            } else {
                ChainError::Rpc {
                    code: -32603,
                    message: "internal error".into(),
                }
            });
        }
        if state.withhold_receipts {
            return Ok(None);
        }
        Ok(state.transactions.get(&hash).map(|mined| {
            TransactionReceipt {
                transaction_hash: hash,
                block_number: mined.block_number,
                logs: mined.logs.clone(),
                success: mined.success,
            }
        }))
    }

    async fn transaction(&self, hash: TxHash) -> ChainResult<Option<ChainTransaction>> {
        Ok(self.state.lock().transactions.get(&hash).map(|mined| {
            ChainTransaction {
                hash,
                from: mined.from,
                block_number: Some(mined.block_number),
            }
        }))
    }

    async fn block_timestamp(&self, number: u64) -> ChainResult<u64> {
        if number > self.state.lock().head {
            return Err(ChainError::BlockNotFound(number));
        }
        Ok(GENESIS_TIMESTAMP + number * BLOCK_TIME)
    }

    async fn logs(&self, filter: &LogFilter) -> ChainResult<Vec<Log>> {
        let mut state = self.state.lock();
        if state.fail_log_queries {
            return Err(ChainError::Transport {
                message: "connection reset".into(),
                transient: true,
            });
        }
        state.log_queries.push(filter.clone());
        Ok(state
            .logs
            .iter()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect())
    }
}
