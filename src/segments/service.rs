use super::{
    CreateSegmentRequest,
    SegmentReadModel,
};
use crate::{
    chain::ContractHandle,
    events::{
        decode_receipt,
        TOKEN_ID_PARAM,
    },
    primitives::{
        to_u64,
        Address,
        DynSolValue,
        TransactionRequest,
        U256,
    },
    tx::TransactionSubmitter,
    utils::{
        OperationStage,
        OperationTracker,
    },
    EngineResult,
};

use tracing::{
    info,
    instrument,
};

/// Segment lifecycle on top of the container contract.
///
/// `segment` is an interface template; every call binds it to the address of
/// the segment instance it targets.
#[derive(Debug, Clone)]
pub struct SegmentService {
    container: ContractHandle,
    segment: ContractHandle,
    submitter: TransactionSubmitter,
}

impl SegmentService {
    pub fn new(
        container: ContractHandle,
        segment: ContractHandle,
        submitter: TransactionSubmitter,
    ) -> Self {
        Self {
            container,
            segment,
            submitter,
        }
    }

    #[instrument(skip_all, fields(name = %request.name))]
    pub async fn create(&self, request: CreateSegmentRequest) -> EngineResult<SegmentReadModel> {
        let mut tracker = OperationTracker::start("segment.create");
        let result = self.create_inner(request, &mut tracker).await;
        tracker.finish(result)
    }

    async fn create_inner(
        &self,
        request: CreateSegmentRequest,
        tracker: &mut OperationTracker,
    ) -> EngineResult<SegmentReadModel> {
        let call = TransactionRequest::new(
            &self.container,
            "createSegment",
            vec![DynSolValue::String(request.name)],
        );

        tracker.advance(OperationStage::Submitting);
        let mut handle = self.submitter.submit(call).await?;

        tracker.advance(OperationStage::AwaitingConfirmation);
        let receipt = self.submitter.wait_for_confirmation(&mut handle).await?;

        tracker.advance(OperationStage::Decoding);
        let created = decode_receipt(&self.container, &receipt, &["SegmentCreated"])?.remove(0);
        let address = created.address_arg("segment")?;
        info!(%address, "Segment created");

        tracker.advance(OperationStage::AssemblingResult);
        self.read_inner(address).await
    }

    #[instrument(skip(self))]
    pub async fn read(&self, address: Address) -> EngineResult<SegmentReadModel> {
        let mut tracker = OperationTracker::start("segment.read");
        tracker.advance(OperationStage::AssemblingResult);
        let result = self.read_inner(address).await;
        tracker.finish(result)
    }

    async fn read_inner(&self, address: Address) -> EngineResult<SegmentReadModel> {
        let segment = self.segment.at(address);
        let name = TransactionRequest::new(&segment, "name", vec![]);
        let token_ids = TransactionRequest::new(&segment, "getTokenIds", vec![]);

        let (name, token_ids) = tokio::try_join!(
            self.submitter.call(&name),
            self.submitter.call(&token_ids),
        )?;

        Ok(SegmentReadModel {
            name: name.string(0)?,
            segment_address: address,
            container_address: self.container.address(),
            token_ids: token_ids
                .uint_array(0)?
                .into_iter()
                .map(|id| to_u64(id, "token id"))
                .collect::<EngineResult<_>>()?,
        })
    }

    /// Every segment of the container, in creation order.
    #[instrument(skip(self))]
    pub async fn list(&self) -> EngineResult<Vec<SegmentReadModel>> {
        let mut tracker = OperationTracker::start("segment.list");
        tracker.advance(OperationStage::AssemblingResult);
        let result = self.list_inner().await;
        tracker.finish(result)
    }

    async fn list_inner(&self) -> EngineResult<Vec<SegmentReadModel>> {
        let addresses = self
            .submitter
            .call(&TransactionRequest::new(&self.container, "getSegments", vec![]))
            .await?
            .address_array(0)?;

        let mut segments = Vec::with_capacity(addresses.len());
        for address in addresses {
            segments.push(self.read_inner(address).await?);
        }
        Ok(segments)
    }

    #[instrument(skip(self))]
    pub async fn add_token(&self, segment: Address, token_id: u64) -> EngineResult<SegmentReadModel> {
        let mut tracker = OperationTracker::start("segment.add_token");
        let result = self
            .membership(segment, token_id, "addToken", "TokenAdded", &mut tracker)
            .await;
        tracker.finish(result)
    }

    #[instrument(skip(self))]
    pub async fn remove_token(
        &self,
        segment: Address,
        token_id: u64,
    ) -> EngineResult<SegmentReadModel> {
        let mut tracker = OperationTracker::start("segment.remove_token");
        let result = self
            .membership(segment, token_id, "removeToken", "TokenRemoved", &mut tracker)
            .await;
        tracker.finish(result)
    }

    async fn membership(
        &self,
        address: Address,
        token_id: u64,
        method: &str,
        event: &str,
        tracker: &mut OperationTracker,
    ) -> EngineResult<SegmentReadModel> {
        let segment = self.segment.at(address);
        let call = TransactionRequest::new(
            &segment,
            method,
            vec![DynSolValue::Uint(U256::from(token_id), 256)],
        );

        tracker.advance(OperationStage::Submitting);
        let mut handle = self.submitter.submit(call).await?;

        tracker.advance(OperationStage::AwaitingConfirmation);
        let receipt = self.submitter.wait_for_confirmation(&mut handle).await?;

        tracker.advance(OperationStage::Decoding);
        let changed = decode_receipt(&segment, &receipt, &[event])?
            .remove(0)
            .uint(TOKEN_ID_PARAM)?;
        info!(segment = %address, token_id = %changed, event, "Segment membership changed");

        tracker.advance(OperationStage::AssemblingResult);
        self.read_inner(address).await
    }
}

#[cfg(test)]
mod test_segment_service {
    use super::*;
    use crate::{
        test_utils::{
            MockChain,
            CONTAINER_ADDRESS,
        },
        tokens::{
            CreateTokenRequest,
            TokenBase,
        },
        tx::RevertKind,
        EngineError,
    };

    fn token(remote_id: &str) -> CreateTokenRequest {
        CreateTokenRequest {
            base: TokenBase {
                remote_id: remote_id.into(),
                ..Default::default()
            },
            parent_ids: vec![],
        }
    }

    fn named(name: &str) -> CreateSegmentRequest {
        CreateSegmentRequest { name: name.into() }
    }

    #[tokio::test]
    async fn test_create_and_read() {
        let chain = MockChain::new();
        let segments = chain.engine_context().segment_service().unwrap();

        let created = segments.create(named("shelf")).await.unwrap();

        assert_eq!(created.name, "shelf");
        assert_eq!(created.container_address, CONTAINER_ADDRESS);
        assert!(created.token_ids.is_empty());
        assert_ne!(created.segment_address, Address::ZERO);
        assert_eq!(segments.read(created.segment_address).await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_duplicate_segment_name() {
        let chain = MockChain::new();
        let segments = chain.engine_context().segment_service().unwrap();
        segments.create(named("shelf")).await.unwrap();

        let err = segments.create(named("shelf")).await.unwrap_err();
        assert_eq!(err.revert_kind(), Some(RevertKind::AlreadyExists));
    }

    #[tokio::test]
    async fn test_list_in_creation_order() {
        let chain = MockChain::new();
        let segments = chain.engine_context().segment_service().unwrap();
        segments.create(named("a")).await.unwrap();
        segments.create(named("b")).await.unwrap();

        let names: Vec<_> = segments
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|segment| segment.name)
            .collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[tokio::test]
    async fn test_add_and_remove_token() {
        let chain = MockChain::new();
        let context = chain.engine_context();
        let segments = context.segment_service().unwrap();
        let tokens = context.token_service();

        let segment = segments.create(named("shelf")).await.unwrap().segment_address;
        let first = tokens.create(token("r1")).await.unwrap().token_id;
        let second = tokens.create(token("r2")).await.unwrap().token_id;

        segments.add_token(segment, first).await.unwrap();
        let both = segments.add_token(segment, second).await.unwrap();
        assert_eq!(both.token_ids, [first, second]);

        let err = segments.add_token(segment, first).await.unwrap_err();
        assert_eq!(err.revert_kind(), Some(RevertKind::AlreadyExists));

        let remaining = segments.remove_token(segment, first).await.unwrap();
        assert_eq!(remaining.token_ids, [second]);

        let err = segments.remove_token(segment, first).await.unwrap_err();
        assert_eq!(err.revert_kind(), Some(RevertKind::NotFound));
    }

    #[tokio::test]
    async fn test_read_unknown_segment() {
        let chain = MockChain::new();
        let segments = chain.engine_context().segment_service().unwrap();

        let err = segments.read(Address::repeat_byte(0x77)).await.unwrap_err();
        assert!(matches!(err, EngineError::Reverted { .. }));
    }
}
