use crate::{
    chain::{
        ChainError,
        ContractInterface,
    },
    primitives::{
        Bytes,
        FixedBytes,
    },
};

use alloy_sol_types::decode_revert_reason;
use serde::Serialize;

use std::fmt;

/// Coarse classification of a revert, for callers mapping failures to
/// not-found / conflict / forbidden responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevertKind {
    NotFound,
    AlreadyExists,
    NotAllowed,
    Other,
}

const NOT_FOUND_ERRORS: [&str; 2] = ["ERC721NonexistentToken", "TokenNotInSegment"];
const ALREADY_EXISTS_ERRORS: [&str; 4] = [
    "ERC721InvalidSender",
    "RemoteIdAlreadyExists",
    "SegmentAlreadyExists",
    "TokenAlreadyInSegment",
];
const NOT_ALLOWED_ERRORS: [&str; 3] = [
    "ERC721IncorrectOwner",
    "ERC721InsufficientApproval",
    "OwnableUnauthorizedAccount",
];

impl RevertKind {
    /// Classifies a custom error by name. Known names first, then naming
    /// conventions.
    pub fn from_error_name(name: &str) -> Self {
        if NOT_FOUND_ERRORS.contains(&name) {
            return RevertKind::NotFound;
        }
        if ALREADY_EXISTS_ERRORS.contains(&name) {
            return RevertKind::AlreadyExists;
        }
        if NOT_ALLOWED_ERRORS.contains(&name) {
            return RevertKind::NotAllowed;
        }

        if name.contains("NotFound") || name.contains("Nonexistent") {
            RevertKind::NotFound
        } else if name.contains("AlreadyExists") {
            RevertKind::AlreadyExists
        } else if name.contains("Unauthorized") || name.contains("NotAllowed") {
            RevertKind::NotAllowed
        } else {
            RevertKind::Other
        }
    }
}

/// Decoded reason of a reverted call or transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertReason {
    pub kind: RevertKind,
    /// Custom error name, when the selector matched the contract interface.
    pub error_name: Option<String>,
    pub message: String,
    pub data: Option<Bytes>,
}

impl RevertReason {
    /// A revert whose data could not be recovered.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            kind: RevertKind::Other,
            error_name: None,
            message: message.into(),
            data: None,
        }
    }

    /// Decodes revert data against the interface's custom errors, falling back
    /// to `Error(string)` / `Panic(uint256)`.
    pub fn decode(interface: &ContractInterface, data: Option<&Bytes>, message: &str) -> Self {
        let Some(data) = data.filter(|data| !data.is_empty()) else {
            return Self::unknown(message);
        };

        if data.len() >= 4 {
            let selector = FixedBytes::<4>::from_slice(&data[..4]);
            if let Some(error) = interface.error_by_selector(&selector) {
                return Self {
                    kind: RevertKind::from_error_name(&error.name),
                    error_name: Some(error.name.clone()),
                    message: error.signature(),
                    data: Some(data.clone()),
                };
            }
        }

        Self {
            kind: RevertKind::Other,
            error_name: None,
            message: decode_revert_reason(data).unwrap_or_else(|| message.to_owned()),
            data: Some(data.clone()),
        }
    }

    pub fn from_chain_error(interface: &ContractInterface, err: &ChainError) -> Self {
        Self::decode(interface, err.revert_data(), &err.message())
    }
}

impl fmt::Display for RevertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.message, self.kind)
    }
}

const NONCE_CONFLICT_PATTERNS: [&str; 6] = [
    "nonce too low",
    "nonce is too low",
    "nonce too high",
    "nonce has already been used",
    "already known",
    "replacement transaction underpriced",
];

/// Whether a rejected submission collided with another transaction from the
/// same sender.
pub fn is_nonce_conflict(err: &ChainError) -> bool {
    let message = err.message().to_ascii_lowercase();
    NONCE_CONFLICT_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
}

#[cfg(test)]
mod test_revert {
    use super::*;
    use crate::{
        chain::abi,
        primitives::U256,
    };
    use alloy_dyn_abi::DynSolValue;
    use alloy_sol_types::{
        Revert,
        SolError,
    };

    fn token() -> ContractInterface {
        ContractInterface::from_json(abi::TOKEN_ABI).unwrap()
    }

    fn custom_error(interface: &ContractInterface, name: &str, args: Vec<DynSolValue>) -> Bytes {
        let error = &interface.abi().errors[name][0];
        let mut data = error.selector().to_vec();
        data.extend(DynSolValue::Tuple(args).abi_encode_params());
        data.into()
    }

    #[test]
    fn test_error_name_classification() {
        assert_eq!(
            RevertKind::from_error_name("ERC721NonexistentToken"),
            RevertKind::NotFound
        );
        assert_eq!(
            RevertKind::from_error_name("RemoteIdAlreadyExists"),
            RevertKind::AlreadyExists
        );
        assert_eq!(
            RevertKind::from_error_name("OwnableUnauthorizedAccount"),
            RevertKind::NotAllowed
        );
        assert_eq!(
            RevertKind::from_error_name("ParentNotFound"),
            RevertKind::NotFound
        );
        assert_eq!(
            RevertKind::from_error_name("CallerNotAllowed"),
            RevertKind::NotAllowed
        );
        assert_eq!(
            RevertKind::from_error_name("InsufficientBalance"),
            RevertKind::Other
        );
    }

    #[test]
    fn test_decode_custom_error() {
        let token = token();
        let data = custom_error(
            &token,
            "ERC721NonexistentToken",
            vec![DynSolValue::Uint(U256::from(7), 256)],
        );

        let reason = RevertReason::decode(&token, Some(&data), "execution reverted");

        assert_eq!(reason.kind, RevertKind::NotFound);
        assert_eq!(reason.error_name.as_deref(), Some("ERC721NonexistentToken"));
        assert_eq!(reason.message, "ERC721NonexistentToken(uint256)");
        assert_eq!(reason.data, Some(data));
    }

    #[test]
    fn test_decode_revert_string() {
        let token = token();
        let data: Bytes = Revert {
            reason: "paused".into(),
        }
        .abi_encode()
        .into();

        let reason = RevertReason::decode(&token, Some(&data), "execution reverted");

        assert_eq!(reason.kind, RevertKind::Other);
        assert_eq!(reason.error_name, None);
        assert!(reason.message.contains("paused"));
    }

    #[test]
    fn test_decode_without_data() {
        let token = token();

        let reason = RevertReason::decode(&token, None, "execution reverted");
        assert_eq!(reason, RevertReason::unknown("execution reverted"));

        let empty = Bytes::new();
        let reason = RevertReason::decode(&token, Some(&empty), "execution reverted");
        assert_eq!(reason.kind, RevertKind::Other);
    }

    #[test]
    fn test_nonce_conflict_detection() {
        let conflict = ChainError::Rpc {
            code: -32000,
            message: "Nonce too low: next nonce 4, tx nonce 3".into(),
        };
        assert!(is_nonce_conflict(&conflict));

        let known = ChainError::Rpc {
            code: -32000,
            message: "already known".into(),
        };
        assert!(is_nonce_conflict(&known));

        let funds = ChainError::Rpc {
            code: -32000,
            message: "insufficient funds for gas * price + value".into(),
        };
        assert!(!is_nonce_conflict(&funds));
    }
}
