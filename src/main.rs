//! rng-svc
//!
//! Listens for frontend requests for a game's random number, which it takes
//! from the oracle-fed round-result store and publishes on the bus.

use clap::{Parser, Subcommand};
use rng_bridge::{
    api::{server::shutdown_signal, ApiServer, AppState},
    config::BridgeConfig,
    ingest,
    metrics::BridgeMetrics,
    node::ErgoNodeClient,
    BridgeResult, ConfigLoader, NatsPublisher, RoundResultStore, WorkerPool, WorkerSettings,
};
use std::{process::ExitCode, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rng-svc")]
#[command(about = "Serve game-round random numbers from the oracle pool over the message bus", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Override the HTTP listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the HTTP listen port
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP bridge (default)
    Serve,

    /// Ask the node for a fee recommendation
    NodeFee {
        #[arg(long, default_value = "2776")]
        tx_size: u32,
    },

    /// List unconfirmed transactions from the node's mempool
    NodeMempool {
        #[arg(long, default_value = "10")]
        limit: u32,
        #[arg(long, default_value = "0")]
        offset: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match ConfigLoader::new().with_path(&args.config).load() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&BridgeConfig::default());
            error!(error = %e, "required config is absent or invalid");
            return ExitCode::FAILURE;
        }
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    init_tracing(&config);

    let result = match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::NodeFee { tx_size } => node_fee(&config, tx_size).await,
        Command::NodeMempool { limit, offset } => node_mempool(&config, limit, offset).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "rng-svc failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &BridgeConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| config.logging.filter.clone().into()),
        )
        .init();
}

async fn serve(config: BridgeConfig) -> BridgeResult<()> {
    info!("🚀 Starting rng-svc");

    let publisher = NatsPublisher::connect(&config.nats.endpoint).await?;
    info!(endpoint = %config.nats.endpoint, "connected to message bus");

    let store = RoundResultStore::new();
    let ingest_cancel = CancellationToken::new();
    let ingestion = ingest::spawn_ingestion(
        publisher.client(),
        &config.nats.random_number_subj,
        store.clone(),
        ingest_cancel.clone(),
    )
    .await?;

    let metrics = Arc::new(BridgeMetrics::new());
    let pool = WorkerPool::new(
        Arc::new(store),
        Arc::new(publisher.clone()),
        WorkerSettings::from(&config.worker),
        metrics,
    );

    let server = ApiServer::new(config.server.clone(), Arc::new(AppState::new(pool.clone())));
    let listener = server.bind().await?;

    info!("service started...");
    if let Err(e) = server.serve(listener, shutdown_signal()).await {
        error!(error = %e, "http server terminated with error");
    }

    // Workers still waiting are dropped, not drained
    pool.shutdown();
    ingest_cancel.cancel();
    if let Ok(stored) = ingestion.await {
        info!(stored, "round result ingestion stopped");
    }
    if let Err(e) = publisher.flush().await {
        warn!(error = %e, "failed to flush bus connection");
    }

    info!("rng-svc stopped");
    Ok(())
}

async fn node_fee(config: &BridgeConfig, tx_size: u32) -> BridgeResult<()> {
    let client = ErgoNodeClient::new(&config.ergo_node)?;
    let fee = client.get_tx_fee(tx_size).await?;
    info!(tx_size, fee, "node fee recommendation");
    println!("{}", fee);
    Ok(())
}

async fn node_mempool(config: &BridgeConfig, limit: u32, offset: u32) -> BridgeResult<()> {
    let client = ErgoNodeClient::new(&config.ergo_node)?;
    let txs = client.get_unconfirmed_txs(limit, offset).await?;
    info!(count = txs.len(), "unconfirmed transactions");
    for tx in txs {
        println!("{} outputs={}", tx.id, tx.outputs.len());
    }
    Ok(())
}
