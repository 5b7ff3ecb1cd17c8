use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use cli::{Cli, Commands};
use config::{
    generate_default_config, load_config, save_config, validate_config, Config, DatabaseBackend,
};
use matching_engine::{Engine, MatchingConfig};
use observability::{init_logging, LogFormat};
use order_store::{MemoryOrderStore, OrderStore, PgOrderStore};
use server::ApiState;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Start { config } => start_exchange(config).await,
        Commands::Validate { config } => validate_command(config),
        Commands::Init { output } => init_command(output),
    }
}

async fn start_exchange<P: AsRef<Path>>(config_path: P) -> Result<()> {
    let config = load_config(&config_path)
        .with_context(|| format!("loading config {:?}", config_path.as_ref()))?;

    let format: LogFormat = config.log.format.parse().map_err(anyhow::Error::msg)?;
    init_logging("clobd", format)?;

    let report = validate_config(&config);
    for warning in &report.warnings {
        warn!("{}", warning);
    }
    if !report.is_valid() {
        for e in &report.errors {
            error!("{}", e);
        }
        anyhow::bail!("cannot start: configuration is invalid");
    }

    info!(exchange = %config.exchange.name, "Exchange starting");

    let store = build_store(&config).await?;

    let engine = Arc::new(Engine::new(
        Arc::clone(&store),
        MatchingConfig {
            max_unit_retries: config.matching.max_unit_retries,
        },
    ));

    // Recovery failure is fatal: an incomplete book must never accept
    // arrivals.
    let restored = engine
        .recover()
        .await
        .context("rebuilding books from durable state")?;
    info!(orders = restored, "Books rebuilt from durable state");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid server address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let state = ApiState::new(engine, store, config.matching.snapshot_depth_limit);

    // Ctrl+C stops the HTTP surface; matcher drains finish on their
    // own since every mutation commits through an atomic durability
    // unit and restart recovers from the store.
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                signal_token.cancel();
            }
            Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
        }
    });

    server::serve(addr, state, shutdown)
        .await
        .context("http server failed")?;

    info!("Exchange stopped");
    Ok(())
}

async fn build_store(config: &Config) -> Result<Arc<dyn OrderStore>> {
    match config.database.backend {
        DatabaseBackend::Memory => Ok(Arc::new(MemoryOrderStore::new())),
        DatabaseBackend::Postgres => {
            let store =
                PgOrderStore::connect(&config.database.url, config.database.max_connections)
                    .await
                    .context("connecting to postgres")?;
            // Schema mismatch at boot is fatal.
            store.ensure_schema().await.context("verifying schema")?;
            Ok(Arc::new(store))
        }
    }
}

fn validate_command<P: AsRef<Path>>(config_path: P) -> Result<()> {
    let config = load_config(&config_path)
        .with_context(|| format!("loading config {:?}", config_path.as_ref()))?;
    let report = validate_config(&config);

    for warning in &report.warnings {
        println!("warning: {}", warning);
    }
    if !report.is_valid() {
        for e in &report.errors {
            println!("error: {}", e);
        }
        anyhow::bail!("configuration is invalid");
    }

    println!("configuration is valid");
    println!("  exchange: {}", config.exchange.name);
    println!("  backend:  {:?}", config.database.backend);
    println!("  listen:   {}:{}", config.server.host, config.server.port);
    Ok(())
}

fn init_command<P: AsRef<Path>>(output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {:?}", parent))?;
        }
    }

    let config = generate_default_config();
    save_config(&config, output_path)?;

    println!("wrote default configuration to {:?}", output_path);
    println!("set database.url (or switch database.backend to \"memory\"), then:");
    println!("  clobd validate --config {:?}", output_path);
    println!("  clobd start --config {:?}", output_path);
    Ok(())
}
