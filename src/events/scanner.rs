use crate::{
    chain::{
        ContractError,
        ContractHandle,
        LogFilter,
        SharedChainClient,
    },
    events::decode_log,
    primitives::{
        DecodedEvent,
        DynSolValue,
        U256,
    },
    EngineResult,
};

use futures::future::try_join_all;
use tracing::{
    debug,
    instrument,
};

/// Name of the indexed token id parameter shared by the token's events.
pub const TOKEN_ID_PARAM: &str = "tokenId";

/// Inclusive block range. `to: None` means the latest block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockRange {
    pub from: u64,
    pub to: Option<u64>,
}

/// A historical query for one event kind of one contract, narrowed by indexed
/// parameter values.
#[derive(Debug, Clone)]
pub struct EventQuery {
    pub contract: ContractHandle,
    pub event: String,
    pub indexed: Vec<(String, DynSolValue)>,
    pub range: BlockRange,
}

impl EventQuery {
    /// All `event` logs of `contract` over the whole chain.
    pub fn new(contract: &ContractHandle, event: impl Into<String>) -> Self {
        Self {
            contract: contract.clone(),
            event: event.into(),
            indexed: Vec::new(),
            range: BlockRange::default(),
        }
    }

    /// Restricts the query to logs whose indexed `param` equals `value`.
    pub fn with_indexed(mut self, param: impl Into<String>, value: DynSolValue) -> Self {
        self.indexed.push((param.into(), value));
        self
    }

    pub fn with_range(mut self, range: BlockRange) -> Self {
        self.range = range;
        self
    }

    /// Shorthand for the common "events of one token" query.
    pub fn for_token(contract: &ContractHandle, event: &str, token_id: U256) -> Self {
        Self::new(contract, event).with_indexed(TOKEN_ID_PARAM, DynSolValue::Uint(token_id, 256))
    }

    pub fn to_filter(&self) -> Result<LogFilter, ContractError> {
        let interface = self.contract.interface();
        let event = interface.event(&self.event)?;

        let mut topics = [None; 3];
        for (param, value) in &self.indexed {
            let slot = interface.indexed_topic_slot(&self.event, param)?;
            let topic = value
                .as_word()
                .ok_or_else(|| ContractError::NonWordTopic(param.clone()))?;
            let entry = topics.get_mut(slot - 1).ok_or_else(|| {
                ContractError::UnknownIndexedParam {
                    event: self.event.clone(),
                    param: param.clone(),
                }
            })?;
            *entry = Some(topic);
        }

        Ok(LogFilter {
            address: self.contract.address(),
            event_signatures: vec![event.selector()],
            topics,
            from_block: self.range.from,
            to_block: self.range.to,
        })
    }
}

/// Reads and orders historical contract events.
///
/// Queries for different event kinds run concurrently; results are combined
/// once all of them finish, and the first failure fails the whole scan.
#[derive(Debug, Clone)]
pub struct EventHistoryScanner {
    chain: SharedChainClient,
    block_span: Option<u64>,
}

impl EventHistoryScanner {
    pub fn new(chain: SharedChainClient) -> Self {
        Self {
            chain,
            block_span: None,
        }
    }

    /// Splits every `eth_getLogs` call into windows of at most `span` blocks,
    /// for nodes that cap the range of a log query.
    pub fn with_block_span(mut self, span: Option<u64>) -> Self {
        self.block_span = span.filter(|span| *span > 0);
        self
    }

    /// Decoded events matching `query`, in chain order.
    #[instrument(skip_all, fields(event = %query.event), level = "debug")]
    pub async fn query(&self, query: &EventQuery) -> EngineResult<Vec<DecodedEvent>> {
        let filter = query.to_filter()?;

        let logs = match self.block_span {
            None => self.chain.logs(&filter).await?,
            Some(span) => {
                let to = match filter.to_block {
                    Some(to) => to,
                    None => self.chain.block_number().await?,
                };
                let windows = windows(filter.from_block, to, span).map(|(from, to)| {
                    let filter = LogFilter {
                        from_block: from,
                        to_block: Some(to),
                        ..filter.clone()
                    };
                    async move { self.chain.logs(&filter).await }
                });
                try_join_all(windows).await?.into_iter().flatten().collect()
            }
        };

        let mut events: Vec<_> = logs
            .iter()
            .filter_map(|log| decode_log(&query.contract, log))
            .filter(|event| event.name == query.event)
            .collect();
        events.sort_by_key(DecodedEvent::position);

        debug!(count = events.len(), "Scanned event history");
        Ok(events)
    }

    /// The most recent event of `token_id` among `kinds`, by block number then
    /// log index. `None` when no event of any kind exists.
    ///
    /// Ties between kinds at the same position are not expected; which one wins
    /// is unspecified.
    pub async fn latest_across_kinds(
        &self,
        contract: &ContractHandle,
        token_id: U256,
        kinds: &[&str],
    ) -> EngineResult<Option<DecodedEvent>> {
        Ok(self
            .scan_kinds(contract, token_id, kinds)
            .await?
            .into_iter()
            .max_by_key(DecodedEvent::position))
    }

    /// The oldest `kind` event of `token_id`.
    pub async fn first_of_kind(
        &self,
        contract: &ContractHandle,
        token_id: U256,
        kind: &str,
    ) -> EngineResult<Option<DecodedEvent>> {
        Ok(self
            .scan_kinds(contract, token_id, &[kind])
            .await?
            .into_iter()
            .min_by_key(DecodedEvent::position))
    }

    /// Every event of `token_id` among `kinds`, oldest first.
    pub async fn history(
        &self,
        contract: &ContractHandle,
        token_id: U256,
        kinds: &[&str],
    ) -> EngineResult<Vec<DecodedEvent>> {
        let mut events = self.scan_kinds(contract, token_id, kinds).await?;
        events.sort_by_key(DecodedEvent::position);
        Ok(events)
    }

    async fn scan_kinds(
        &self,
        contract: &ContractHandle,
        token_id: U256,
        kinds: &[&str],
    ) -> EngineResult<Vec<DecodedEvent>> {
        let queries: Vec<_> = kinds
            .iter()
            .map(|kind| EventQuery::for_token(contract, kind, token_id))
            .collect();

        let results = try_join_all(queries.iter().map(|query| self.query(query))).await?;
        Ok(results.into_iter().flatten().collect())
    }
}

/// Inclusive `[from, to]` windows of at most `span` blocks.
fn windows(from: u64, to: u64, span: u64) -> impl Iterator<Item = (u64, u64)> {
    (from..=to)
        .step_by(span as usize)
        .map(move |start| (start, start.saturating_add(span - 1).min(to)))
}

#[cfg(test)]
mod test_scanner {
    use super::*;
    use crate::{
        primitives::Address,
        test_utils::{
            token_handle,
            MockChain,
        },
        EngineError,
    };

    fn uint(value: u64) -> DynSolValue {
        DynSolValue::Uint(U256::from(value), 256)
    }

    #[test]
    fn test_windows() {
        assert_eq!(windows(0, 9, 5).collect::<Vec<_>>(), [(0, 4), (5, 9)]);
        assert_eq!(windows(0, 10, 5).collect::<Vec<_>>(), [(0, 4), (5, 9), (10, 10)]);
        assert_eq!(windows(3, 3, 100).collect::<Vec<_>>(), [(3, 3)]);
        assert_eq!(windows(5, 4, 2).count(), 0);
    }

    #[test]
    fn test_query_filter_topics() {
        let token = token_handle();

        let filter = EventQuery::for_token(&token, "Transfer", U256::from(7))
            .with_range(BlockRange {
                from: 2,
                to: Some(8),
            })
            .to_filter()
            .unwrap();

        assert_eq!(filter.address, token.address());
        assert_eq!(
            filter.event_signatures,
            vec![token.interface().event("Transfer").unwrap().selector()]
        );
        assert_eq!(filter.topics[0], None);
        assert_eq!(filter.topics[1], None);
        assert_eq!(filter.topics[2], uint(7).as_word());
        assert_eq!((filter.from_block, filter.to_block), (2, Some(8)));
    }

    #[test]
    fn test_query_filter_rejects_bad_params() {
        let token = token_handle();

        let not_indexed = EventQuery::new(&token, "AssetUriSet")
            .with_indexed("assetUri", DynSolValue::String("u".into()));
        assert!(matches!(
            not_indexed.to_filter(),
            Err(ContractError::UnknownIndexedParam { .. })
        ));

        let not_word = EventQuery::new(&token, "AssetUriSet")
            .with_indexed(TOKEN_ID_PARAM, DynSolValue::String("7".into()));
        assert!(matches!(
            not_word.to_filter(),
            Err(ContractError::NonWordTopic(_))
        ));
    }

    #[tokio::test]
    async fn test_latest_across_kinds() {
        let chain = MockChain::new();
        let token = token_handle();
        chain.inject_event(&token, "AssetUriSet", vec![uint(1), DynSolValue::String("a".into())], 100);
        chain.inject_event(&token, "MetadataUriSet", vec![uint(1), DynSolValue::String("m".into())], 105);
        chain.inject_event(&token, "AssetHashSet", vec![uint(2), DynSolValue::String("x".into())], 110);

        let scanner = EventHistoryScanner::new(chain.shared());
        let latest = scanner
            .latest_across_kinds(
                &token,
                U256::from(1),
                &["AssetUriSet", "AssetHashSet", "MetadataUriSet"],
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(latest.name, "MetadataUriSet");
        assert_eq!(latest.block_number, 105);
    }

    #[tokio::test]
    async fn test_latest_orders_by_log_index_within_block() {
        let chain = MockChain::new();
        let token = token_handle();
        chain.inject_event(&token, "MetadataUriSet", vec![uint(1), DynSolValue::String("m".into())], 50);
        chain.inject_event(&token, "AssetUriSet", vec![uint(1), DynSolValue::String("a".into())], 50);

        let scanner = EventHistoryScanner::new(chain.shared());
        let latest = scanner
            .latest_across_kinds(&token, U256::from(1), &["AssetUriSet", "MetadataUriSet"])
            .await
            .unwrap()
            .unwrap();

        assert_eq!(latest.name, "AssetUriSet");
        assert_eq!(latest.log_index, 1);
    }

    #[tokio::test]
    async fn test_no_events_is_none() {
        let chain = MockChain::new();
        let scanner = EventHistoryScanner::new(chain.shared());

        let latest = scanner
            .latest_across_kinds(&token_handle(), U256::from(1), &["AssetUriSet"])
            .await
            .unwrap();
        assert_eq!(latest, None);

        let first = scanner
            .first_of_kind(&token_handle(), U256::from(1), "Transfer")
            .await
            .unwrap();
        assert_eq!(first, None);
    }

    #[tokio::test]
    async fn test_history_and_first_of_kind() {
        let chain = MockChain::new();
        let token = token_handle();
        let transfer = |from: Address, to: Address| {
            vec![DynSolValue::Address(from), DynSolValue::Address(to), uint(4)]
        };
        chain.inject_event(&token, "Transfer", transfer(Address::ZERO, Address::repeat_byte(1)), 10);
        chain.inject_event(&token, "AssetUriSet", vec![uint(4), DynSolValue::String("a".into())], 12);
        chain.inject_event(&token, "Transfer", transfer(Address::repeat_byte(1), Address::repeat_byte(2)), 20);

        let scanner = EventHistoryScanner::new(chain.shared());

        let first = scanner
            .first_of_kind(&token, U256::from(4), "Transfer")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.block_number, 10);

        let history = scanner
            .history(&token, U256::from(4), &["Transfer", "AssetUriSet"])
            .await
            .unwrap();
        let blocks: Vec<_> = history.iter().map(|event| event.block_number).collect();
        assert_eq!(blocks, [10, 12, 20]);
    }

    #[tokio::test]
    async fn test_chunked_query() {
        let chain = MockChain::new();
        let token = token_handle();
        chain.inject_event(&token, "AssetUriSet", vec![uint(1), DynSolValue::String("a".into())], 3);
        chain.inject_event(&token, "AssetUriSet", vec![uint(1), DynSolValue::String("b".into())], 25);
        chain.mine_empty_blocks(30);

        let scanner = EventHistoryScanner::new(chain.shared()).with_block_span(Some(10));
        let events = scanner
            .query(&EventQuery::for_token(&token, "AssetUriSet", U256::from(1)))
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[1].string("assetUri").unwrap(), "b");

        let queries = chain.log_queries();
        assert!(queries.len() >= 3);
        assert!(queries
            .iter()
            .all(|filter| filter.to_block.unwrap() - filter.from_block < 10));
    }

    #[tokio::test]
    async fn test_scan_failure_propagates() {
        let chain = MockChain::new();
        chain.fail_log_queries(true);
        let scanner = EventHistoryScanner::new(chain.shared());

        let err = scanner
            .latest_across_kinds(&token_handle(), U256::from(1), &["AssetUriSet", "Transfer"])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Chain(_)));
    }
}
