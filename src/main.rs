use token_engine::{
    config::{
        EngineConfig,
        EngineContext,
        LogFormat,
    },
    primitives::Address,
    segments::CreateSegmentRequest,
    tokens::{
        CreateTokenRequest,
        Document,
        DocumentPatch,
        TokenBase,
        UpdateTokenRequest,
    },
};

use anyhow::Result;
use clap::{
    Args,
    Parser,
    Subcommand,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: EngineConfig,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(subcommand)]
    Token(TokenCommand),
    #[command(subcommand)]
    Segment(SegmentCommand),
}

#[derive(Subcommand, Debug)]
enum TokenCommand {
    /// Mint a token to the signer.
    Mint(MintArgs),
    Get { token_id: u64 },
    /// Update some of a token's fields; omitted fields keep their value.
    Update(UpdateArgs),
    Burn { token_id: u64 },
    /// Print the token's provenance log.
    History { token_id: u64 },
}

#[derive(Args, Debug)]
struct MintArgs {
    #[arg(long)]
    remote_id: String,
    #[arg(long)]
    asset_uri: String,
    #[arg(long)]
    asset_hash: String,
    #[arg(long)]
    metadata_uri: String,
    #[arg(long)]
    metadata_hash: String,
    #[arg(long, default_value = "")]
    additional_data: String,
    #[arg(long = "parent", value_name = "TOKEN_ID")]
    parent_ids: Vec<u64>,
}

impl From<MintArgs> for CreateTokenRequest {
    fn from(args: MintArgs) -> Self {
        CreateTokenRequest {
            base: TokenBase {
                remote_id: args.remote_id,
                asset: Document {
                    uri: args.asset_uri,
                    hash: args.asset_hash,
                },
                metadata: Document {
                    uri: args.metadata_uri,
                    hash: args.metadata_hash,
                },
                additional_data: args.additional_data,
            },
            parent_ids: args.parent_ids,
        }
    }
}

#[derive(Args, Debug)]
struct UpdateArgs {
    token_id: u64,
    #[arg(long)]
    asset_uri: Option<String>,
    #[arg(long)]
    asset_hash: Option<String>,
    #[arg(long)]
    metadata_uri: Option<String>,
    #[arg(long)]
    metadata_hash: Option<String>,
    #[arg(long)]
    additional_data: Option<String>,
}

fn patch(uri: Option<String>, hash: Option<String>) -> Option<DocumentPatch> {
    (uri.is_some() || hash.is_some()).then_some(DocumentPatch { uri, hash })
}

impl From<UpdateArgs> for UpdateTokenRequest {
    fn from(args: UpdateArgs) -> Self {
        UpdateTokenRequest {
            asset: patch(args.asset_uri, args.asset_hash),
            metadata: patch(args.metadata_uri, args.metadata_hash),
            additional_data: args.additional_data,
        }
    }
}

#[derive(Subcommand, Debug)]
enum SegmentCommand {
    Create {
        name: String,
    },
    Get {
        address: Address,
    },
    List,
    AddToken {
        address: Address,
        token_id: u64,
    },
    RemoveToken {
        address: Address,
        token_id: u64,
    },
}

fn init_tracing(config: &EngineConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.log_format {
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.config);

    let context = EngineContext::from_config(&cli.config)?;

    match cli.command {
        Command::Token(command) => {
            let tokens = context.token_service();
            match command {
                TokenCommand::Mint(args) => print_json(&tokens.create(args.into()).await?),
                TokenCommand::Get { token_id } => print_json(&tokens.read(token_id).await?),
                TokenCommand::Update(args) => {
                    let token_id = args.token_id;
                    print_json(&tokens.update(token_id, args.into()).await?)
                }
                TokenCommand::Burn { token_id } => print_json(&tokens.burn(token_id).await?),
                TokenCommand::History { token_id } => {
                    print_json(&tokens.history(token_id).await?)
                }
            }
        }
        Command::Segment(command) => {
            let segments = context.segment_service()?;
            match command {
                SegmentCommand::Create { name } => {
                    print_json(&segments.create(CreateSegmentRequest { name }).await?)
                }
                SegmentCommand::Get { address } => print_json(&segments.read(address).await?),
                SegmentCommand::List => print_json(&segments.list().await?),
                SegmentCommand::AddToken { address, token_id } => {
                    print_json(&segments.add_token(address, token_id).await?)
                }
                SegmentCommand::RemoveToken { address, token_id } => {
                    print_json(&segments.remove_token(address, token_id).await?)
                }
            }
        }
    }
}
