use super::{
    fields::update_event_kinds,
    models::{
        BurnedToken,
        CreateTokenRequest,
        Document,
        Hierarchy,
        ProvenanceEntry,
        TokenBase,
        TokenReadModel,
        UpdateTokenRequest,
    },
};
use crate::{
    chain::{
        ChainError,
        ContractHandle,
        SharedChainClient,
    },
    events::{
        decode_receipt,
        EventHistoryScanner,
        TOKEN_ID_PARAM,
    },
    primitives::{
        hex,
        to_u64,
        Address,
        DynSolValue,
        TransactionRequest,
        U256,
    },
    tx::TransactionSubmitter,
    utils::{
        iso_timestamp,
        OperationStage,
        OperationTracker,
    },
    EngineError,
    EngineResult,
};

use futures::future::try_join_all;
use std::collections::{
    BTreeMap,
    BTreeSet,
    HashMap,
};
use tracing::{
    debug,
    info,
    instrument,
};

const TRANSFER: &str = "Transfer";
const TOKEN_CREATED: &str = "TokenCreated";
const PARENTS_LINKED: &str = "ParentsLinked";

fn uint(value: u64) -> DynSolValue {
    DynSolValue::Uint(U256::from(value), 256)
}

fn to_ids(values: Vec<U256>, what: &'static str) -> EngineResult<Vec<u64>> {
    values.into_iter().map(|value| to_u64(value, what)).collect()
}

/// Create, read, update and burn operations on the token contract.
///
/// Every operation returns a fully assembled [`TokenReadModel`]. Temporal
/// fields are derived from event history on each read and never cached.
#[derive(Debug, Clone)]
pub struct TokenService {
    token: ContractHandle,
    submitter: TransactionSubmitter,
    scanner: EventHistoryScanner,
    chain: SharedChainClient,
}

impl TokenService {
    pub fn new(
        token: ContractHandle,
        submitter: TransactionSubmitter,
        scanner: EventHistoryScanner,
        chain: SharedChainClient,
    ) -> Self {
        Self {
            token,
            submitter,
            scanner,
            chain,
        }
    }

    pub fn contract(&self) -> &ContractHandle {
        &self.token
    }

    fn request(&self, method: &str, token_id: u64) -> TransactionRequest {
        TransactionRequest::new(&self.token, method, vec![uint(token_id)])
    }

    /// Mints a token to the signer and assembles it from the receipt.
    ///
    /// No history scan is needed: `createdOn` and `lastUpdatedOn` are both the
    /// timestamp of the minting block.
    #[instrument(skip_all, fields(remote_id = %request.base.remote_id))]
    pub async fn create(&self, request: CreateTokenRequest) -> EngineResult<TokenReadModel> {
        let mut tracker = OperationTracker::start("token.create");
        let result = self.create_inner(request, &mut tracker).await;
        tracker.finish(result)
    }

    async fn create_inner(
        &self,
        request: CreateTokenRequest,
        tracker: &mut OperationTracker,
    ) -> EngineResult<TokenReadModel> {
        let CreateTokenRequest { base, parent_ids } = request;
        let linked = !parent_ids.is_empty();

        let mut args = vec![
            DynSolValue::Address(self.submitter.sender()),
            DynSolValue::String(base.remote_id),
            DynSolValue::String(base.asset.uri),
            DynSolValue::String(base.asset.hash),
            DynSolValue::String(base.metadata.uri),
            DynSolValue::String(base.metadata.hash),
            DynSolValue::String(base.additional_data),
        ];
        let method = if linked {
            args.push(DynSolValue::Array(
                parent_ids.into_iter().map(uint).collect(),
            ));
            "mintTokenWithParents"
        } else {
            "mintToken"
        };

        tracker.advance(OperationStage::Submitting);
        let mut handle = self
            .submitter
            .submit(TransactionRequest::new(&self.token, method, args))
            .await?;

        tracker.advance(OperationStage::AwaitingConfirmation);
        let receipt = self.submitter.wait_for_confirmation(&mut handle).await?;

        tracker.advance(OperationStage::Decoding);
        let created = decode_receipt(&self.token, &receipt, &[TOKEN_CREATED])?.remove(0);
        let hierarchy = if linked {
            let event = decode_receipt(&self.token, &receipt, &[PARENTS_LINKED])?.remove(0);
            Some(Hierarchy {
                active: event.bool_arg("active")?,
                parent_ids: to_ids(event.uint_array("parentIds")?, "parent id")?,
                child_ids: Vec::new(),
            })
        } else {
            None
        };

        tracker.advance(OperationStage::AssemblingResult);
        let timestamp = iso_timestamp(self.chain.block_timestamp(receipt.block_number).await?)?;
        let token_id = to_u64(created.uint(TOKEN_ID_PARAM)?, "token id")?;

        info!(token_id, hash = %receipt.transaction_hash, "Token minted");

        Ok(TokenReadModel {
            base: TokenBase {
                remote_id: created.string("remoteId")?,
                asset: Document {
                    uri: created.string("assetUri")?,
                    hash: created.string("assetHash")?,
                },
                metadata: Document {
                    uri: created.string("metadataUri")?,
                    hash: created.string("metadataHash")?,
                },
                additional_data: created.string("additionalData")?,
            },
            hierarchy,
            owner_address: created.address_arg("owner")?,
            minter_address: handle.from,
            created_on: timestamp.clone(),
            last_updated_on: timestamp,
            token_id,
            contract_address: self.token.address(),
        })
    }

    /// Reads current state and derives minter, `createdOn` and
    /// `lastUpdatedOn` from event history.
    #[instrument(skip(self))]
    pub async fn read(&self, token_id: u64) -> EngineResult<TokenReadModel> {
        let mut tracker = OperationTracker::start("token.read");
        tracker.advance(OperationStage::AssemblingResult);
        let result = self.read_inner(token_id).await;
        tracker.finish(result)
    }

    async fn read_inner(&self, token_id: u64) -> EngineResult<TokenReadModel> {
        let id = U256::from(token_id);
        let get_token = self.request("getToken", token_id);
        let owner_of = self.request("ownerOf", token_id);
        let get_hierarchy = self.request("getHierarchy", token_id);
        let update_kinds = update_event_kinds();

        let (fields, owner, linkage, minted, latest_update) = tokio::try_join!(
            self.submitter.call(&get_token),
            self.submitter.call(&owner_of),
            self.submitter.call(&get_hierarchy),
            self.scanner.first_of_kind(&self.token, id, TRANSFER),
            self.scanner
                .latest_across_kinds(&self.token, id, &update_kinds),
        )?;

        let minted = minted.ok_or_else(|| EngineError::MissingHistory {
            token_id,
            event: TRANSFER.to_owned(),
        })?;
        let minter = self
            .chain
            .transaction(minted.transaction_hash)
            .await?
            .ok_or(ChainError::MissingField("transaction"))?
            .from;

        let created_block = minted.block_number;
        let updated_block = latest_update
            .map_or(created_block, |event| event.block_number)
            .max(created_block);
        let (created_at, updated_at) = tokio::try_join!(
            self.chain.block_timestamp(created_block),
            self.chain.block_timestamp(updated_block),
        )?;

        debug!(created_block, updated_block, "Derived token timestamps");

        let active = linkage.bool(0)?;
        let parent_ids = to_ids(linkage.uint_array(1)?, "parent id")?;
        let child_ids = to_ids(linkage.uint_array(2)?, "child id")?;
        let hierarchy = (!parent_ids.is_empty() || !child_ids.is_empty()).then_some(Hierarchy {
            active,
            parent_ids,
            child_ids,
        });

        Ok(TokenReadModel {
            base: TokenBase {
                remote_id: fields.string(0)?,
                asset: Document {
                    uri: fields.string(1)?,
                    hash: fields.string(2)?,
                },
                metadata: Document {
                    uri: fields.string(3)?,
                    hash: fields.string(4)?,
                },
                additional_data: fields.string(5)?,
            },
            hierarchy,
            owner_address: owner.address(0)?,
            minter_address: minter,
            created_on: iso_timestamp(created_at)?,
            last_updated_on: iso_timestamp(updated_at)?,
            token_id,
            contract_address: self.token.address(),
        })
    }

    /// Applies a partial update and returns the token as read afterwards.
    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        token_id: u64,
        request: UpdateTokenRequest,
    ) -> EngineResult<TokenReadModel> {
        let mut tracker = OperationTracker::start("token.update");
        let result = self.update_inner(token_id, request, &mut tracker).await;
        tracker.finish(result)
    }

    async fn update_inner(
        &self,
        token_id: u64,
        request: UpdateTokenRequest,
        tracker: &mut OperationTracker,
    ) -> EngineResult<TokenReadModel> {
        let fields = request.fields();
        if fields.is_empty() {
            return Err(EngineError::EmptyUpdate);
        }
        if let Some(field) = request.cleared_field() {
            return Err(EngineError::EmptyFieldValue {
                field: field.param(),
            });
        }
        debug!(fields = ?fields.iter().map(|(field, _)| field.param()).collect::<Vec<_>>(), "Updating token");

        let mut args = vec![uint(token_id)];
        args.extend(request.update_args().map(DynSolValue::String));

        tracker.advance(OperationStage::Submitting);
        let mut handle = self
            .submitter
            .submit(TransactionRequest::new(&self.token, "updateToken", args))
            .await?;

        tracker.advance(OperationStage::AwaitingConfirmation);
        let receipt = self.submitter.wait_for_confirmation(&mut handle).await?;
        info!(token_id, hash = %receipt.transaction_hash, "Token updated");

        tracker.advance(OperationStage::AssemblingResult);
        self.read_inner(token_id).await
    }

    /// Burns a token and checks that it no longer has an owner.
    ///
    /// A reverting `ownerOf` afterwards is the expected outcome. An owner that
    /// is still set is an [`EngineError::PostCondition`] failure.
    #[instrument(skip(self))]
    pub async fn burn(&self, token_id: u64) -> EngineResult<BurnedToken> {
        let mut tracker = OperationTracker::start("token.burn");
        let result = self.burn_inner(token_id, &mut tracker).await;
        tracker.finish(result)
    }

    async fn burn_inner(
        &self,
        token_id: u64,
        tracker: &mut OperationTracker,
    ) -> EngineResult<BurnedToken> {
        tracker.advance(OperationStage::Submitting);
        let mut handle = self.submitter.submit(self.request("burn", token_id)).await?;

        tracker.advance(OperationStage::AwaitingConfirmation);
        let receipt = self.submitter.wait_for_confirmation(&mut handle).await?;

        tracker.advance(OperationStage::AssemblingResult);
        match self.submitter.call(&self.request("ownerOf", token_id)).await {
            Err(EngineError::Reverted { .. }) => {}
            Ok(output) => {
                let owner = output.address(0)?;
                if owner != Address::ZERO {
                    return Err(EngineError::PostCondition(format!(
                        "token {token_id} is still owned by {owner} after burn"
                    )));
                }
            }
            Err(err) => return Err(err),
        }

        info!(token_id, hash = %receipt.transaction_hash, "Token burned");

        Ok(BurnedToken {
            token_id,
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
        })
    }

    /// The token's provenance log: transfers, creation, parent links and field
    /// updates, oldest first.
    #[instrument(skip(self))]
    pub async fn history(&self, token_id: u64) -> EngineResult<Vec<ProvenanceEntry>> {
        let mut tracker = OperationTracker::start("token.history");
        tracker.advance(OperationStage::AssemblingResult);
        let result = self.history_inner(token_id).await;
        tracker.finish(result)
    }

    async fn history_inner(&self, token_id: u64) -> EngineResult<Vec<ProvenanceEntry>> {
        let kinds: Vec<&str> = [TRANSFER, TOKEN_CREATED, PARENTS_LINKED]
            .into_iter()
            .chain(update_event_kinds())
            .collect();

        let events = self
            .scanner
            .history(&self.token, U256::from(token_id), &kinds)
            .await?;
        if events.is_empty() {
            return Err(EngineError::MissingHistory {
                token_id,
                event: TRANSFER.to_owned(),
            });
        }

        let blocks: BTreeSet<u64> = events.iter().map(|event| event.block_number).collect();
        let timestamps: HashMap<u64, String> = try_join_all(blocks.into_iter().map(|block| {
            async move {
                let seconds = self.chain.block_timestamp(block).await?;
                Ok::<_, EngineError>((block, iso_timestamp(seconds)?))
            }
        }))
        .await?
        .into_iter()
        .collect();

        Ok(events
            .into_iter()
            .map(|event| {
                ProvenanceEntry {
                    timestamp: timestamps[&event.block_number].clone(),
                    args: event
                        .args
                        .iter()
                        .filter(|arg| arg.name != TOKEN_ID_PARAM)
                        .map(|arg| (arg.name.clone(), render_value(&arg.value)))
                        .collect::<BTreeMap<_, _>>(),
                    event: event.name,
                    block_number: event.block_number,
                    log_index: event.log_index,
                    transaction_hash: event.transaction_hash,
                }
            })
            .collect())
    }
}

fn render_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Address(address) => address.to_checksum(None),
        DynSolValue::Uint(value, _) => value.to_string(),
        DynSolValue::Bool(value) => value.to_string(),
        DynSolValue::String(value) => value.clone(),
        DynSolValue::Bytes(bytes) => hex::encode_prefixed(bytes),
        DynSolValue::FixedBytes(word, size) => hex::encode_prefixed(&word[..*size]),
        DynSolValue::Array(values) | DynSolValue::FixedArray(values) => {
            let values: Vec<_> = values.iter().map(render_value).collect();
            format!("[{}]", values.join(","))
        }
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod test_token_service {
    use super::*;
    use crate::{
        test_utils::{
            MockChain,
            TEST_ADDRESS,
        },
        tokens::models::DocumentPatch,
        tx::RevertKind,
    };

    fn r1() -> CreateTokenRequest {
        CreateTokenRequest {
            base: TokenBase {
                remote_id: "r1".into(),
                asset: Document {
                    uri: "u1".into(),
                    hash: "h1".into(),
                },
                metadata: Document {
                    uri: "m1".into(),
                    hash: "mh1".into(),
                },
                additional_data: String::new(),
            },
            parent_ids: Vec::new(),
        }
    }

    fn asset_uri(uri: &str) -> UpdateTokenRequest {
        UpdateTokenRequest {
            asset: Some(DocumentPatch {
                uri: Some(uri.into()),
                hash: None,
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_assembles_from_receipt() {
        let chain = MockChain::new();
        chain.set_next_token_id(7);
        let tokens = chain.engine_context().token_service();

        let token = tokens.create(r1()).await.unwrap();

        assert_eq!(token.token_id, 7);
        assert_eq!(token.base, r1().base);
        assert_eq!(token.hierarchy, None);
        assert_eq!(token.owner_address, TEST_ADDRESS);
        assert_eq!(token.minter_address, TEST_ADDRESS);
        assert_eq!(token.contract_address, tokens.contract().address());
        assert_eq!(token.created_on, token.last_updated_on);

        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["remoteId"], "r1");
        assert_eq!(json["asset"]["uri"], "u1");
        assert!(json.get("hierarchy").is_none());
    }

    #[tokio::test]
    async fn test_create_with_parents() {
        let chain = MockChain::new();
        let tokens = chain.engine_context().token_service();
        let parent = tokens.create(r1()).await.unwrap();

        let mut child = r1();
        child.base.remote_id = "r2".into();
        child.parent_ids = vec![parent.token_id];
        let child = tokens.create(child).await.unwrap();

        assert_eq!(
            child.hierarchy,
            Some(Hierarchy {
                active: false,
                parent_ids: vec![parent.token_id],
                child_ids: vec![],
            })
        );

        let parent = tokens.read(parent.token_id).await.unwrap();
        assert_eq!(
            parent.hierarchy.unwrap().child_ids,
            vec![child.token_id]
        );
    }

    #[tokio::test]
    async fn test_read_matches_create_and_is_idempotent() {
        let chain = MockChain::new();
        let tokens = chain.engine_context().token_service();
        let created = tokens.create(r1()).await.unwrap();

        let first = tokens.read(created.token_id).await.unwrap();
        let second = tokens.read(created.token_id).await.unwrap();

        assert_eq!(first, created);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_update_advances_last_updated_on() {
        let chain = MockChain::new();
        chain.set_next_token_id(7);
        let tokens = chain.engine_context().token_service();
        tokens.create(r1()).await.unwrap();
        let before = tokens.read(7).await.unwrap();

        let after = tokens.update(7, asset_uri("u2")).await.unwrap();

        // Omitted fields go out as empty strings and the contract keeps their
        // stored values, so the read below still shows h1/m1/mh1.
        let call = chain.last_sent_call().unwrap();
        assert_eq!(call.method, "updateToken");
        assert_eq!(
            call.args[1..],
            ["u2", "", "", "", ""].map(|arg| DynSolValue::String(arg.into()))
        );

        assert_eq!(after.base.asset.uri, "u2");
        assert_eq!(after.base.asset.hash, "h1");
        assert_eq!(after.base.metadata.uri, "m1");
        assert_eq!(after.created_on, before.created_on);
        assert!(after.last_updated_on > before.last_updated_on);
        assert_eq!(tokens.read(7).await.unwrap(), after);
    }

    #[tokio::test]
    async fn test_empty_update_is_rejected_locally() {
        let chain = MockChain::new();
        let tokens = chain.engine_context().token_service();
        tokens.create(r1()).await.unwrap();
        let sent = chain.sent_calls().len();

        let err = tokens
            .update(1, UpdateTokenRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::EmptyUpdate));
        assert_eq!(chain.sent_calls().len(), sent);
    }

    #[tokio::test]
    async fn test_update_rejects_empty_value() {
        let chain = MockChain::new();
        let tokens = chain.engine_context().token_service();
        tokens.create(r1()).await.unwrap();
        let sent = chain.sent_calls().len();

        let err = tokens
            .update(
                1,
                UpdateTokenRequest {
                    additional_data: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EngineError::EmptyFieldValue {
                field: "additionalData"
            }
        ));
        assert_eq!(chain.sent_calls().len(), sent);
    }

    #[tokio::test]
    async fn test_read_unknown_token() {
        let chain = MockChain::new();
        let tokens = chain.engine_context().token_service();

        let err = tokens.read(42).await.unwrap_err();
        assert_eq!(err.revert_kind(), Some(RevertKind::NotFound));
    }

    #[tokio::test]
    async fn test_burn() {
        let chain = MockChain::new();
        chain.set_next_token_id(7);
        let tokens = chain.engine_context().token_service();
        tokens.create(r1()).await.unwrap();

        let burned = tokens.burn(7).await.unwrap();
        assert_eq!(burned.token_id, 7);

        let err = tokens.read(7).await.unwrap_err();
        assert_eq!(err.revert_kind(), Some(RevertKind::NotFound));
    }

    #[tokio::test]
    async fn test_burn_to_zero_owner() {
        let chain = MockChain::new();
        let tokens = chain.engine_context().token_service();
        tokens.create(r1()).await.unwrap();
        chain.zero_owner_on_burn(true);

        let burned = tokens.burn(1).await.unwrap();
        assert_eq!(burned.token_id, 1);

        let owner = tokens
            .submitter
            .call(&tokens.request("ownerOf", 1))
            .await
            .unwrap();
        assert_eq!(owner.address(0).unwrap(), Address::ZERO);
    }

    #[tokio::test]
    async fn test_burn_post_condition() {
        let chain = MockChain::new();
        let tokens = chain.engine_context().token_service();
        tokens.create(r1()).await.unwrap();
        chain.keep_owner_on_burn(true);

        let err = tokens.burn(1).await.unwrap_err();
        assert!(matches!(err, EngineError::PostCondition(_)));
    }

    #[tokio::test]
    async fn test_burn_not_owned_token_reverts() {
        let chain = MockChain::new();
        let tokens = chain.engine_context().token_service();

        let err = tokens.burn(3).await.unwrap_err();
        assert_eq!(err.revert_kind(), Some(RevertKind::NotFound));
    }

    #[tokio::test]
    async fn test_history() {
        let chain = MockChain::new();
        let tokens = chain.engine_context().token_service();
        tokens.create(r1()).await.unwrap();
        tokens.update(1, asset_uri("u2")).await.unwrap();

        let history = tokens.history(1).await.unwrap();
        let events: Vec<_> = history.iter().map(|entry| entry.event.as_str()).collect();
        assert_eq!(events, ["Transfer", "TokenCreated", "AssetUriSet"]);

        assert_eq!(history[0].args["from"], Address::ZERO.to_checksum(None));
        assert_eq!(history[2].args["assetUri"], "u2");
        assert!(!history[2].args.contains_key(TOKEN_ID_PARAM));
        assert!(history[0].timestamp < history[2].timestamp);

        assert!(matches!(
            tokens.history(9).await,
            Err(EngineError::MissingHistory { token_id: 9, .. })
        ));
    }

    #[test]
    fn test_render_value() {
        assert_eq!(render_value(&uint(7)), "7");
        assert_eq!(
            render_value(&DynSolValue::Array(vec![uint(1), uint(2)])),
            "[1,2]"
        );
        assert_eq!(render_value(&DynSolValue::Bool(true)), "true");
    }
}
