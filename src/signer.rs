use crate::primitives::{
    Address,
    SignedTransaction,
};

use alloy_consensus::TxEnvelope;
use alloy_eips::eip2718::Encodable2718;
use alloy_network::{
    EthereumWallet,
    TransactionBuilder,
};
use alloy_rpc_types::TransactionRequest as RpcTransactionRequest;
use alloy_signer_local::{
    LocalSignerError,
    PrivateKeySigner,
};

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Signing key is not configured")]
    Missing,
    #[error("Signing key is malformed (length {key_length})")]
    Malformed {
        key_length: usize,
        #[source]
        source: LocalSignerError,
    },
    #[error("Transaction parameters incomplete, missing {0:?}")]
    IncompleteTransaction(Vec<&'static str>),
    #[error("Failed to sign transaction: {0}")]
    Signing(String),
}

/// Holds the single signing credential of the process.
///
/// Never exposes or logs the key; `Debug` prints the derived address only.
pub struct Signer {
    address: Address,
    wallet: EthereumWallet,
}

impl Signer {
    /// Parses a hex encoded secp256k1 private key, with or without `0x`.
    pub fn from_private_key(private_key: Option<&str>) -> Result<Self, CredentialError> {
        let private_key = private_key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(CredentialError::Missing)?;

        let signer: PrivateKeySigner =
            private_key
                .parse()
                .map_err(|source| CredentialError::Malformed {
                    key_length: private_key.len(),
                    source,
                })?;

        Ok(Self::from_local(signer))
    }

    pub fn from_local(signer: PrivateKeySigner) -> Self {
        Self {
            address: signer.address(),
            wallet: EthereumWallet::from(signer),
        }
    }

    pub fn derive_address(&self) -> Address {
        self.address
    }

    /// Signs fully populated transaction parameters into an EIP-2718 envelope.
    pub async fn sign(
        &self,
        params: RpcTransactionRequest,
    ) -> Result<SignedTransaction, CredentialError> {
        let to = params
            .to
            .and_then(|kind| kind.to().copied())
            .ok_or_else(|| CredentialError::IncompleteTransaction(vec!["to"]))?;
        let input = params.input.input().cloned().unwrap_or_default();

        let envelope: TxEnvelope = params
            .with_from(self.address)
            .build(&self.wallet)
            .await
            .map_err(|err| CredentialError::Signing(err.to_string()))?;

        Ok(SignedTransaction {
            hash: *envelope.tx_hash(),
            from: self.address,
            to,
            input,
            raw: envelope.encoded_2718().into(),
        })
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
