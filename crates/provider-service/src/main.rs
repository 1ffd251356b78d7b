use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use provider_config::ConfigLoader;
use provider_ledger::{LedgerClient, LocalWallet, RpcLedger};
use provider_matching::{MatchingEngine, PeerRoles};
use provider_pinning::{IpfsStorage, PinataClient, PinningClient, StorageClient};
use provider_settlement::{NotifierSettings, SettlementConfig, SettlementManager};
use provider_transport::{IpfsPubsub, Transport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Elapsed-time budget for retrying one transient ledger failure.
const LEDGER_RETRY_BUDGET: Duration = Duration::from_secs(120);

#[derive(Parser)]
#[command(name = "lighthouse-provider")]
#[command(about = "Lighthouse matching and settlement provider", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/local.toml")]
	config: PathBuf,

	#[arg(long, env = "PROVIDER_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the provider service
	Start,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	setup_tracing(&cli.log_level)?;

	match cli.command {
		Some(Commands::Start) | None => start_service(cli).await,
		Some(Commands::Validate) => validate_config(cli).await,
	}
}

async fn start_service(cli: Cli) -> Result<()> {
	info!("Starting lighthouse provider");
	info!("Loading configuration from: {:?}", cli.config);

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")?;

	info!("Configuration loaded successfully");
	info!("Topic: {}", config.transport.topic);
	info!("Model: 0x{}", hex::encode(&config.provider.model));

	let transport: Arc<dyn Transport> = Arc::new(IpfsPubsub::new(&config.transport.api_url));

	let wallet =
		LocalWallet::new(&config.ledger.provider_key).context("Invalid provider key")?;
	let oracle = LocalWallet::new(&config.ledger.oracle_key).context("Invalid oracle key")?;
	info!("Operating as {}", wallet.address().to_checksum(None));
	info!("Oracle key at {}", oracle.address().to_checksum(None));

	let ledger: Arc<dyn LedgerClient> = Arc::new(
		RpcLedger::new(
			&config.ledger.rpc_url,
			config.ledger.chain_id,
			wallet,
			config.ledger_timeout(),
		)
		.context("Failed to construct ledger client")?,
	);

	let storage: Arc<dyn StorageClient> = Arc::new(IpfsStorage::new(&config.pinning.ipfs_api_url));
	let pinning: Arc<dyn PinningClient> = Arc::new(PinataClient::new(
		&config.pinning.pinata_api_key,
		&config.pinning.pinata_secret_api_key,
	));

	let settlement = Arc::new(SettlementManager::new(
		ledger.clone(),
		Arc::new(oracle),
		storage,
		pinning,
		transport.clone(),
		config.transport.topic.clone(),
		SettlementConfig {
			lighthouse: config.ledger.lighthouse,
			reward_contract: config.ledger.reward_contract,
			gas_limit: config.ledger.gas_limit,
			gateway: config.pinning.gateway.clone(),
			reward_name: config.provider.reward_name.clone(),
			image_file: config.provider.image_file.clone(),
			notifier: NotifierSettings {
				period: config.notifier_period(),
				max_attempts: config.notifier.max_attempts,
			},
			retry_budget: LEDGER_RETRY_BUDGET,
		},
	));

	let engine = Arc::new(MatchingEngine::new(
		transport,
		ledger,
		settlement,
		config.transport.topic.clone(),
		config.provider.model.clone(),
		PeerRoles::new(
			&config.transport.own_peer_id,
			&config.transport.agent_peer_id,
		),
	));

	let (shutdown, shutdown_rx) = watch::channel(false);
	let mut engine_task = tokio::spawn({
		let engine = engine.clone();
		async move { engine.run(shutdown_rx).await }
	});

	info!("Lighthouse provider started");

	tokio::select! {
		_ = setup_shutdown_signal() => {
			info!("Shutdown signal received, stopping...");
			let _ = shutdown.send(true);
			engine_task
				.await
				.context("Matching engine task failed")?
				.context("Matching engine failed")?;
		}
		result = &mut engine_task => {
			result
				.context("Matching engine task failed")?
				.context("Matching engine failed")?;
		}
	}

	info!("Lighthouse provider stopped");
	Ok(())
}

async fn validate_config(cli: Cli) -> Result<()> {
	info!("Validating configuration file: {:?}", cli.config);

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")?;

	info!("Configuration is valid");
	info!("Topic: {}", config.transport.topic);
	info!("Model: 0x{}", hex::encode(&config.provider.model));
	info!("Own peer: {}", config.transport.own_peer_id);
	info!("Agent peer: {}", config.transport.agent_peer_id);
	info!("Lighthouse: {}", config.ledger.lighthouse.to_checksum(None));
	info!(
		"Reward contract: {}",
		config.ledger.reward_contract.to_checksum(None)
	);

	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		signal::ctrl_c()
			.await
			.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
