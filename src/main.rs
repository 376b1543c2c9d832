// src/main.rs
//! Bridge engine CLI: inspect the transaction store and drive transfers
//! against simulated chain backends.
use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use sora_bridge_engine::blockchain::bridge::simulated::{
    ensure_simulation_allowed, MemoryAssetRegistry, SimulatedExternal, SimulatedSora,
};
use sora_bridge_engine::blockchain::bridge::{
    evm, hashi, substrate, EventBus, LoggingSubscriber, StatisticsSubscriber, TracingHooks,
};
use sora_bridge_engine::core::config::EngineConfig;
use sora_bridge_engine::storage::{SqliteStore, TransactionStore};
use sora_bridge_engine::{Bridge, NewTransfer, ProcessOutcome, TransactionType};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "bridge-engine")]
#[command(about = "SORA bridge transaction lifecycle engine")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Engine config file (overrides BRIDGE_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored bridge transactions, newest first
    List,
    /// Print one transaction as JSON
    Show {
        id: String,
    },
    /// Create a transfer and drive it to a terminal state
    Transfer(TransferArgs),
    /// Resume one unfinished transaction, or all of them
    Resume {
        id: Option<String>,
    },
}

#[derive(ClapArgs)]
struct TransferArgs {
    /// Transaction type, e.g. EvmOutgoing
    #[arg(long)]
    kind: TransactionType,
    /// SORA asset id (0x + 64 hex)
    #[arg(long)]
    asset: String,
    #[arg(long)]
    amount: String,
    #[arg(long)]
    from: String,
    #[arg(long)]
    to: String,
    /// External network (parachain name for parachain transfers)
    #[arg(long)]
    network: Option<String>,
    /// Only store the transfer, do not drive it
    #[arg(long)]
    no_process: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging()?;

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_or_default(),
    };

    let store = Arc::new(SqliteStore::new_with_url(&config.store.url).await?);

    match args.command {
        Commands::List => {
            for tx in store.list_transactions().await? {
                println!(
                    "{}  {:<18} {:<18} {} {}",
                    tx.id,
                    tx.kind.as_str(),
                    tx.state.as_str(),
                    tx.amount,
                    tx.start_time.to_rfc3339()
                );
            }
        }
        Commands::Show { id } => {
            let tx = store.get_transaction(&id).await?;
            println!("{}", serde_json::to_string_pretty(&tx)?);
        }
        Commands::Transfer(transfer) => {
            ensure_simulation_allowed()?;
            let (bridge, stats) = build_bridge(&config, store.clone())?;
            let tx = bridge
                .create_transaction(NewTransfer {
                    kind: transfer.kind,
                    asset_address: transfer.asset,
                    amount: transfer.amount,
                    from: transfer.from,
                    to: transfer.to,
                    network: transfer.network,
                })
                .await?;
            println!("{}", tx.id);
            if !transfer.no_process {
                report(&bridge.process(&tx.id).await?);
                log_statistics(&stats);
            }
        }
        Commands::Resume { id } => {
            ensure_simulation_allowed()?;
            let (bridge, stats) = build_bridge(&config, store.clone())?;
            match id {
                Some(id) => report(&bridge.resume(&id).await?),
                None => {
                    for (id, result) in bridge.resume_all().await? {
                        match result {
                            Ok(outcome) => report(&outcome),
                            Err(e) => eprintln!("{}  error: {}", id, e),
                        }
                    }
                }
            }
            log_statistics(&stats);
        }
    }

    Ok(())
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn build_bridge(
    config: &EngineConfig,
    store: Arc<SqliteStore>,
) -> Result<(Bridge, Arc<StatisticsSubscriber>)> {
    let confirm_after = config.simulation.confirm_after;
    let sora = Arc::new(SimulatedSora::new(confirm_after));

    let events = Arc::new(EventBus::new(config.events.buffer_size));
    events.subscribe(Arc::new(LoggingSubscriber::new("log")));
    let stats = Arc::new(StatisticsSubscriber::new("stats"));
    events.subscribe(stats.clone());

    let bridge = Bridge::builder(store, Arc::new(MemoryAssetRegistry::new()))
        .hooks(Arc::new(TracingHooks))
        .events(events)
        .polling(config.polling.clone())
        .register_all(hashi::reducers(
            sora.clone(),
            Arc::new(SimulatedExternal::new("ethereum", confirm_after)),
        ))
        .register_all(evm::reducers(
            sora.clone(),
            Arc::new(SimulatedExternal::new(config.simulation.evm_network.clone(), confirm_after)),
        ))
        .register_all(substrate::reducers(
            sora,
            Arc::new(SimulatedExternal::new("parachain", confirm_after)),
        ))
        .build()?;

    info!("bridge engine ready with simulated backends");
    Ok((bridge, stats))
}

fn log_statistics(stats: &StatisticsSubscriber) {
    let s = stats.get_statistics();
    info!(
        completed = s.completed,
        failed = s.failed,
        step_rejections = s.step_rejections,
        driver_errors = s.driver_errors,
        avg_duration_ms = s.average_duration_ms(),
        "bridge run statistics"
    );
}

fn report(outcome: &ProcessOutcome) {
    let tx = outcome.transaction();
    let status = if outcome.is_completed() { "completed" } else { "failed" };
    match &tx.error {
        Some(error) => println!("{}  {} at {} ({})", tx.id, status, tx.state, error),
        None => println!("{}  {} at {}", tx.id, status, tx.state),
    }
}
