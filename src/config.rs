use crate::{
    chain::{
        abi,
        AlloyChainClient,
        ContractError,
        ContractHandle,
        ContractInterface,
        SharedChainClient,
    },
    events::EventHistoryScanner,
    primitives::Address,
    segments::SegmentService,
    signer::{
        CredentialError,
        Signer,
    },
    tokens::TokenService,
    tx::{
        ConfirmationPolicy,
        TransactionSubmitter,
    },
};

use clap::{
    Parser,
    ValueEnum,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    sync::Arc,
    time::Duration,
};
use tracing::info;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Parser, Debug, Clone)]
pub struct EngineConfig {
    /// JSON-RPC endpoint of the node.
    #[arg(long, env = "RPC_URL", default_value = "http://127.0.0.1:8545")]
    pub rpc_url: Url,
    #[arg(long, env = "TOKEN_CONTRACT_ADDRESS")]
    pub token_address: Address,
    /// Required by segment commands only.
    #[arg(long, env = "CONTAINER_CONTRACT_ADDRESS")]
    pub container_address: Option<Address>,
    /// Path to a token ABI (bare array or build artifact). Built-in ABI when
    /// omitted.
    #[arg(long, env = "TOKEN_ABI_PATH")]
    pub token_abi: Option<PathBuf>,
    #[arg(long, env = "CONTAINER_ABI_PATH")]
    pub container_abi: Option<PathBuf>,
    #[arg(long, env = "SEGMENT_ABI_PATH")]
    pub segment_abi: Option<PathBuf>,
    /// Hex encoded signing key. Hidden from help; supply it via the environment.
    #[arg(long, env = "PRIVATE_KEY", hide = true, hide_env_values = true)]
    pub private_key: Option<String>,
    /// How long to wait for a submitted transaction to be mined.
    #[arg(long, env = "CONFIRMATION_TIMEOUT_SECS", default_value = "120")]
    pub confirmation_timeout_secs: u64,
    #[arg(
        long,
        env = "RECEIPT_POLL_INTERVAL_MS",
        default_value = "1000",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub receipt_poll_interval_ms: u64,
    /// Maximum block range per `eth_getLogs` call. Unbounded when omitted.
    #[arg(long, env = "LOG_BLOCK_SPAN")]
    pub log_block_span: Option<u64>,
    /// Default filter directive, `RUST_LOG` takes precedence.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl EngineConfig {
    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            timeout: Duration::from_secs(self.confirmation_timeout_secs),
            poll_interval: Duration::from_millis(self.receipt_poll_interval_ms),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read ABI from {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid ABI")]
    Contract(#[from] ContractError),
    #[error("Invalid signing credential")]
    Credential(#[from] CredentialError),
    #[error("Container contract address is not configured")]
    MissingContainer,
}

/// Loads an ABI from `path`, or parses the built-in `default`.
pub fn load_abi(path: Option<&Path>, default: &str) -> Result<ContractInterface, ConfigError> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path).map_err(|source| {
                ConfigError::Io {
                    path: path.to_owned(),
                    source,
                }
            })?;
            Ok(ContractInterface::from_json(&json)?)
        }
        None => Ok(ContractInterface::from_json(default)?),
    }
}

/// Process-wide handles built once at startup: the chain connection, the
/// signer and the contract handles. Services borrow from it explicitly.
#[derive(Debug, Clone)]
pub struct EngineContext {
    chain: SharedChainClient,
    submitter: TransactionSubmitter,
    scanner: EventHistoryScanner,
    token: ContractHandle,
    container: Option<ContractHandle>,
    segment: ContractHandle,
}

impl EngineContext {
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        let signer = Signer::from_private_key(config.private_key.as_deref())?;
        let chain: SharedChainClient =
            Arc::new(AlloyChainClient::connect_http(config.rpc_url.clone()));

        let token = ContractHandle::new(
            config.token_address,
            Arc::new(load_abi(config.token_abi.as_deref(), abi::TOKEN_ABI)?),
        );
        let container_interface = Arc::new(load_abi(
            config.container_abi.as_deref(),
            abi::CONTAINER_ABI,
        )?);
        let container = config
            .container_address
            .map(|address| ContractHandle::new(address, container_interface));
        let segment = ContractHandle::new(
            Address::ZERO,
            Arc::new(load_abi(config.segment_abi.as_deref(), abi::SEGMENT_ABI)?),
        );

        info!(
            rpc_url = %config.rpc_url,
            signer = %signer.derive_address(),
            token = %token.address(),
            "Engine context ready"
        );

        Ok(Self::new(
            chain,
            signer,
            config.confirmation_policy(),
            config.log_block_span,
            token,
            container,
            segment,
        ))
    }

    pub fn new(
        chain: SharedChainClient,
        signer: Signer,
        policy: ConfirmationPolicy,
        log_block_span: Option<u64>,
        token: ContractHandle,
        container: Option<ContractHandle>,
        segment: ContractHandle,
    ) -> Self {
        let submitter = TransactionSubmitter::new(chain.clone(), Arc::new(signer), policy);
        let scanner = EventHistoryScanner::new(chain.clone()).with_block_span(log_block_span);

        Self {
            chain,
            submitter,
            scanner,
            token,
            container,
            segment,
        }
    }

    pub fn chain(&self) -> &SharedChainClient {
        &self.chain
    }

    pub fn submitter(&self) -> &TransactionSubmitter {
        &self.submitter
    }

    pub fn token_service(&self) -> TokenService {
        TokenService::new(
            self.token.clone(),
            self.submitter.clone(),
            self.scanner.clone(),
            self.chain.clone(),
        )
    }

    pub fn segment_service(&self) -> Result<SegmentService, ConfigError> {
        let container = self.container.clone().ok_or(ConfigError::MissingContainer)?;
        Ok(SegmentService::new(
            container,
            self.segment.clone(),
            self.submitter.clone(),
        ))
    }
}

#[cfg(test)]
mod test_config {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> EngineConfig {
        EngineConfig::try_parse_from(
            ["token-engine", "--token-address", "0x1111111111111111111111111111111111111111"]
                .iter()
                .chain(args),
        )
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);

        assert_eq!(config.token_address, Address::repeat_byte(0x11));
        assert_eq!(config.container_address, None);
        assert_eq!(config.confirmation_policy(), ConfirmationPolicy::default());
        assert_eq!(config.log_block_span, None);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_overrides() {
        let config = parse(&[
            "--confirmation-timeout-secs",
            "5",
            "--receipt-poll-interval-ms",
            "250",
            "--log-block-span",
            "2000",
            "--log-format",
            "json",
        ]);

        assert_eq!(
            config.confirmation_policy(),
            ConfirmationPolicy {
                timeout: Duration::from_secs(5),
                poll_interval: Duration::from_millis(250),
            }
        );
        assert_eq!(config.log_block_span, Some(2000));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_rejects_bad_address() {
        assert!(EngineConfig::try_parse_from(["token-engine", "--token-address", "0x12"]).is_err());
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        assert!(EngineConfig::try_parse_from([
            "token-engine",
            "--token-address",
            "0x1111111111111111111111111111111111111111",
            "--receipt-poll-interval-ms",
            "0",
        ])
        .is_err());
    }

    #[test]
    fn test_load_abi_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"abi":{}}}"#, abi::SEGMENT_ABI).unwrap();

        let segment = load_abi(Some(file.path()), abi::TOKEN_ABI).unwrap();
        assert!(segment.event("TokenAdded").is_ok());

        let token = load_abi(None, abi::TOKEN_ABI).unwrap();
        assert!(token.event("TokenCreated").is_ok());

        assert!(matches!(
            load_abi(Some(Path::new("/nonexistent/abi.json")), abi::TOKEN_ABI),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_context_requires_key() {
        let config = parse(&[]);
        let err = EngineContext::from_config(&EngineConfig {
            private_key: None,
            ..config
        })
        .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::Credential(CredentialError::Missing)
        ));
    }
}
