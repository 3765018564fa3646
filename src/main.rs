//! Anchor Relayer - anchors document roots and manages identities on an Ethereum ledger
//!
//! `serve` bootstraps the task queue and metrics endpoint and runs until
//! shutdown. The remaining subcommands perform a single ledger write or read
//! and wait for its confirmation.

use anchor_relayer::anchors::{self, AnchorId, AnchorRepository, DocumentRoot};
use anchor_relayer::config::{ContractAddresses, Settings};
use anchor_relayer::confirmation::{ConfirmationTiming, WatchReceiver};
use anchor_relayer::identity::{self, CentId, IdentityRepository, KeyPurpose};
use anchor_relayer::ledger::{EthersGateway, LedgerGateway};
use anchor_relayer::metrics::MetricsServer;
use anchor_relayer::queue::{TaskParams, TaskQueue};
use anchor_relayer::tx::status::{self, TRANSACTION_STATUS_TASK, TX_HASH_PARAM};
use anchor_relayer::tx::{TransactionStatus, TransactionSubmitter};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "anchor-relayer", version, about = "Anchor document roots on an Ethereum ledger")]
struct Cli {
    /// Configuration file (defaults to $ANCHOR_CONFIG, then config/default.toml)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bootstrap the relayer and serve metrics until shutdown
    Serve,

    /// Print the document root committed under an anchor id
    Root { anchor_id: AnchorId },

    /// Pre-commit an anchor against a signing root
    PreCommit {
        anchor_id: AnchorId,
        signing_root: DocumentRoot,
        owner: CentId,
        /// Hex encoded signature over the signing root
        #[arg(long)]
        signature: String,
        #[arg(long)]
        expiration_block: u64,
    },

    /// Commit a document root under a pre-committed anchor
    Commit {
        anchor_id: AnchorId,
        document_root: DocumentRoot,
        owner: CentId,
        /// Comma separated hex encoded proofs
        #[arg(long, value_delimiter = ',')]
        proofs: Vec<String>,
        #[arg(long)]
        signature: String,
    },

    /// Deploy an identity contract for a participant
    CreateIdentity { owner: CentId },

    /// Add a key to a participant's identity
    AddKey {
        owner: CentId,
        /// Hex encoded 32 byte key
        key: String,
        /// p2p, signing or ethauth
        purpose: KeyPurpose,
    },

    /// Wait for a transaction to be mined
    Status {
        /// Hex encoded transaction hash
        tx_hash: String,
    },
}

/// Everything a command needs, wired once from settings
struct Services {
    settings: Settings,
    queue: Arc<TaskQueue>,
    anchors: AnchorRepository,
    identities: Arc<IdentityRepository>,
}

impl Services {
    fn build(settings: Settings) -> Result<Self> {
        let addresses: ContractAddresses = settings.contracts.addresses()?;
        let gateway: Arc<dyn LedgerGateway> = Arc::new(
            EthersGateway::new(settings.ledger.clone()).context("Failed to initialize ledger gateway")?,
        );
        let timing = ConfirmationTiming::from_config(&settings.ledger);

        let queue = Arc::new(TaskQueue::new(&settings.queue));
        anchors::register(&queue, gateway.clone(), addresses.anchor_repository, timing);
        identity::register(&queue, gateway.clone(), addresses.identity_factory, timing);
        status::register(&queue, gateway.clone(), timing);
        info!("Registered tasks: {:?}", queue.registered_tasks());

        let submitter = Arc::new(TransactionSubmitter::new(gateway, &settings.ledger));
        let identities = Arc::new(IdentityRepository::new(
            submitter.clone(),
            queue.clone(),
            &addresses,
            &settings.ledger,
        ));
        let anchors = AnchorRepository::new(
            submitter,
            queue.clone(),
            identities.clone(),
            addresses.anchor_repository,
            &settings.ledger,
        );

        Ok(Self {
            settings,
            queue,
            anchors,
            identities,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    info!("Starting Anchor Relayer v{}", env!("CARGO_PKG_VERSION"));

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    info!(
        "Loaded configuration for chain {} with {} RPC endpoints",
        settings.ledger.chain_id,
        settings.ledger.rpc_urls.len()
    );

    let services = Services::build(settings)?;

    match cli.command {
        Commands::Serve => serve(services).await,
        Commands::Root { anchor_id } => {
            let root = services.anchors.get_document_root_of(&anchor_id).await?;
            let pre_committed = services.anchors.has_valid_pre_commit(&anchor_id).await?;
            println!("anchor {}: root {} (valid pre-commit: {})", anchor_id, root, pre_committed);
            Ok(())
        }
        Commands::PreCommit {
            anchor_id,
            signing_root,
            owner,
            signature,
            expiration_block,
        } => {
            let rx = services
                .anchors
                .pre_commit(anchor_id, signing_root, owner, decode_hex(&signature)?, expiration_block)
                .await?;
            report(rx).await
        }
        Commands::Commit {
            anchor_id,
            document_root,
            owner,
            proofs,
            signature,
        } => {
            let proofs = proofs
                .iter()
                .map(|p| decode_bytes32(p))
                .collect::<Result<Vec<_>>>()?;
            let rx = services
                .anchors
                .commit(anchor_id, document_root, owner, proofs, decode_hex(&signature)?)
                .await?;
            report(rx).await
        }
        Commands::CreateIdentity { owner } => {
            let rx = services.identities.create_identity(owner).await?;
            report(rx).await
        }
        Commands::AddKey {
            owner,
            key,
            purpose,
        } => {
            let rx = services
                .identities
                .add_key(owner, decode_bytes32(&key)?, purpose)
                .await?;
            report(rx).await
        }
        Commands::Status { tx_hash } => {
            let params = TaskParams::new().with_bytes(TX_HASH_PARAM, &decode_bytes32(&tx_hash)?);
            let status: TransactionStatus = services
                .queue
                .dispatch(TRANSACTION_STATUS_TASK, params)?
                .get_as(services.settings.ledger.wait_timeout())
                .await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
    }
}

async fn serve(services: Services) -> Result<()> {
    let metrics_handle = if services.settings.metrics.enabled {
        let server = MetricsServer::new(services.settings.metrics.port);
        info!("Metrics: http://0.0.0.0:{}/metrics", services.settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run(shutdown_signal()).await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    info!("Anchor Relayer is running");

    match metrics_handle {
        Some(handle) => {
            if let Err(e) = handle.await {
                error!("Metrics server task failed: {}", e);
            }
        }
        None => shutdown_signal().await,
    }

    info!("Anchor Relayer stopped");
    Ok(())
}

/// Wait for a watched write and print its outcome
async fn report<T: Serialize + Debug>(rx: WatchReceiver<T>) -> Result<()> {
    let result = rx
        .await
        .map_err(|_| anyhow!("confirmation router stopped without a result"))?;
    let payload = result.into_result().context("Write was not confirmed")?;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn decode_hex(value: &str) -> Result<Vec<u8>> {
    hex::decode(value.trim_start_matches("0x")).with_context(|| format!("Invalid hex: {}", value))
}

fn decode_bytes32(value: &str) -> Result<[u8; 32]> {
    let bytes = decode_hex(value)?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| anyhow!("Expected 32 bytes, got {} in {}", bytes.len(), value))
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,anchor_relayer=debug,hyper=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("ANCHOR_LOG_FORMAT").map(|f| f == "json").unwrap_or(false) {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping...");
}
