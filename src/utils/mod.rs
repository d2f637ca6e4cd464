use crate::{
    EngineError,
    EngineResult,
};

use chrono::{
    DateTime,
    SecondsFormat,
    Utc,
};
use std::fmt;
use tracing::{
    debug,
    warn,
};

/// Formats a block timestamp (unix seconds) as ISO-8601 UTC with millisecond
/// precision, e.g. `2023-11-14T22:13:20.000Z`.
pub fn iso_timestamp(seconds: u64) -> EngineResult<String> {
    let seconds = i64::try_from(seconds).map_err(|_| EngineError::InvalidTimestamp(seconds))?;
    DateTime::<Utc>::from_timestamp(seconds, 0)
        .map(|time| time.to_rfc3339_opts(SecondsFormat::Millis, true))
        .ok_or(EngineError::InvalidTimestamp(seconds as u64))
}

/// Where an engine operation currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStage {
    Building,
    Submitting,
    AwaitingConfirmation,
    Decoding,
    AssemblingResult,
    Done,
    Errored,
}

impl fmt::Display for OperationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationStage::Building => "building",
            OperationStage::Submitting => "submitting",
            OperationStage::AwaitingConfirmation => "awaiting_confirmation",
            OperationStage::Decoding => "decoding",
            OperationStage::AssemblingResult => "assembling_result",
            OperationStage::Done => "done",
            OperationStage::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Tracks the stage of a single operation and logs every transition.
///
/// `Done` and `Errored` are terminal; the tracker ignores transitions out of
/// them.
#[derive(Debug)]
pub struct OperationTracker {
    operation: &'static str,
    stage: OperationStage,
}

impl OperationTracker {
    pub fn start(operation: &'static str) -> Self {
        debug!(operation, stage = %OperationStage::Building, "Operation started");
        Self {
            operation,
            stage: OperationStage::Building,
        }
    }

    pub fn stage(&self) -> OperationStage {
        self.stage
    }

    pub fn advance(&mut self, stage: OperationStage) {
        if self.is_terminal() {
            return;
        }
        debug!(operation = self.operation, from = %self.stage, to = %stage, "Operation stage");
        self.stage = stage;
    }

    /// Moves to `Done` on success or `Errored` on failure, passing the result
    /// through.
    pub fn finish<T>(&mut self, result: EngineResult<T>) -> EngineResult<T> {
        if self.is_terminal() {
            return result;
        }
        match &result {
            Ok(_) => self.advance(OperationStage::Done),
            Err(err) => {
                warn!(operation = self.operation, stage = %self.stage, %err, "Operation failed");
                self.stage = OperationStage::Errored;
            }
        }
        result
    }

    fn is_terminal(&self) -> bool {
        matches!(self.stage, OperationStage::Done | OperationStage::Errored)
    }
}

#[cfg(test)]
mod test_operation {
    use super::*;

    #[test]
    fn test_iso_timestamp() {
        assert_eq!(iso_timestamp(0).unwrap(), "1970-01-01T00:00:00.000Z");
        assert_eq!(
            iso_timestamp(1_700_000_000).unwrap(),
            "2023-11-14T22:13:20.000Z"
        );
        assert!(matches!(
            iso_timestamp(u64::MAX),
            Err(EngineError::InvalidTimestamp(u64::MAX))
        ));
    }

    #[test]
    fn test_iso_timestamps_sort_like_blocks() {
        let earlier = iso_timestamp(1_700_000_012).unwrap();
        let later = iso_timestamp(1_700_000_024).unwrap();
        assert!(earlier < later);
    }

    #[test]
    fn test_tracker_stages() {
        let mut tracker = OperationTracker::start("token.create");
        assert_eq!(tracker.stage(), OperationStage::Building);

        tracker.advance(OperationStage::Submitting);
        tracker.advance(OperationStage::AwaitingConfirmation);
        assert_eq!(tracker.stage(), OperationStage::AwaitingConfirmation);

        assert_eq!(tracker.finish(Ok(5)).unwrap(), 5);
        assert_eq!(tracker.stage(), OperationStage::Done);

        tracker.advance(OperationStage::Decoding);
        assert_eq!(tracker.stage(), OperationStage::Done);
    }

    #[test]
    fn test_tracker_errored_is_terminal() {
        let mut tracker = OperationTracker::start("token.burn");
        tracker.advance(OperationStage::Submitting);

        let result: EngineResult<()> = tracker.finish(Err(EngineError::EmptyUpdate));
        assert!(result.is_err());
        assert_eq!(tracker.stage(), OperationStage::Errored);

        assert!(tracker.finish(Ok(())).is_ok());
        assert_eq!(tracker.stage(), OperationStage::Errored);
    }
}
