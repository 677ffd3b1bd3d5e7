//! Relay Keeper - claim, swap and compound for AMM relay positions
//!
//! Run with: cargo run -- relay
//!
//! Every invocation does one bounded step of work and persists its place
//! in the state file, so the binary is safe to call from cron or to leave
//! running under `watch`.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use console::style;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod brain;
mod cartographer;
mod chain;
mod config;
mod distribute;
mod executor;
mod pipeline;
mod rewards;
mod simulator;
mod tokens;

use chain::{RelayChain, RpcChain};
use config::{ExecutionMode, KeeperConfig, RunLog};
use distribute::DistributionJob;
use executor::{ExecutionEngine, KeeperOutcome, SimulationOutcome};
use pipeline::state::{load_timestamp, KEEPER_LAST_RUN, LAST_DISTRIBUTION};
use pipeline::{ExecutionState, JsonFileStore, KeyValueStore, MemoryStore, RelayPipeline};

#[derive(Parser, Debug)]
#[command(author, version, about = "Relay keeper")]
struct Cli {
    /// TOML config file (defaults to environment / .env)
    #[arg(long)]
    config: Option<String>,

    /// Network preset (optimism | base)
    #[arg(long)]
    network: Option<String>,

    /// Relay registry to read factories from
    #[arg(long)]
    registry: Option<String>,

    /// State file path
    #[arg(long)]
    storage: Option<String>,

    /// simulation | dry_run
    #[arg(long)]
    mode: Option<String>,

    /// Keep state in memory for this process only
    #[arg(long, default_value_t = false)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// One step of the relay pipeline
    Relay,
    /// Epoch emissions distribution
    Distribute,
    /// Invoke both jobs on an interval until Ctrl+C
    Watch {
        /// Seconds between invocations (overrides config)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Print the persisted pipeline state
    State,
    /// Drop the in-flight cycle (timestamps are kept)
    Reset,
    /// Write the effective configuration to a TOML file
    InitConfig {
        #[arg(default_value = "keeper.toml")]
        path: String,
    },
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🔁 RELAY KEEPER - Claim | Swap | Compound").cyan().bold()
    );
    println!(
        "{}",
        style("    Resumable stages | Epoch gated | Route quoting").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn load_config(cli: &Cli) -> Result<KeeperConfig> {
    let mut config = match &cli.config {
        Some(path) => KeeperConfig::from_file(path)?,
        None => KeeperConfig::from_env()?,
    };

    if let Some(network) = &cli.network {
        let network = network.parse()?;
        if network != config.network {
            let preset = tokens::Deployment::for_network(network);
            config.max_hops = preset.max_hops;
            config.max_routes = preset.max_routes;
        }
        config.network = network;
    }
    if let Some(registry) = &cli.registry {
        config.relay_registry = Some(registry.parse()?);
    }
    if let Some(storage) = &cli.storage {
        config.storage_path = storage.clone();
    }
    if let Some(mode) = &cli.mode {
        config.execution_mode = mode.parse()?;
    }

    Ok(config)
}

fn format_timestamp(ts: Option<u64>) -> String {
    ts.and_then(|t| DateTime::<Utc>::from_timestamp(t as i64, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string())
}

fn print_outcome(job: &str, outcome: &KeeperOutcome, elapsed: Duration) -> Result<()> {
    if outcome.can_execute {
        println!(
            "{} {} produced {} transaction(s) in {:?}",
            style("✓").green(),
            job,
            outcome.transactions.len(),
            elapsed
        );
        for (i, tx) in outcome.transactions.iter().enumerate() {
            let data = hex::encode(&tx.data);
            let preview = if data.len() > 72 { &data[..72] } else { &data };
            println!("   [{}] {:#x} 0x{}…", i, tx.to, preview);
        }
    } else {
        println!(
            "{} {}: {}",
            style("•").yellow(),
            job,
            outcome.message.as_deref().unwrap_or("nothing to do")
        );
    }

    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(())
}

async fn finish(
    job: &str,
    config: &KeeperConfig,
    chain: &dyn RelayChain,
    outcome: &KeeperOutcome,
    started: Instant,
) -> Result<()> {
    print_outcome(job, outcome, started.elapsed())?;

    if outcome.can_execute && config.execution_mode == ExecutionMode::DryRun {
        let engine = ExecutionEngine::new(chain, config.execution_mode, config.keeper_address);
        let results = engine.execute(outcome).await;
        let reverted = results
            .iter()
            .filter(|r| matches!(r, SimulationOutcome::Reverted { .. }))
            .count();
        if reverted > 0 {
            warn!("{} of {} transaction(s) reverted in dry run", reverted, results.len());
        }
    }

    if let Err(e) = RunLog::new(job, config.network, outcome).append_to_file(&config.history_path) {
        warn!("Could not append run history: {}", e);
    }
    Ok(())
}

async fn run_relay(config: &KeeperConfig, chain: &dyn RelayChain, store: &dyn KeyValueStore) -> Result<()> {
    let started = Instant::now();
    let settings = config.pipeline_settings();
    let outcome = RelayPipeline::new(chain, store, &settings).invoke().await;
    finish("relay", config, chain, &outcome, started).await
}

async fn run_distribution(config: &KeeperConfig, chain: &dyn RelayChain, store: &dyn KeyValueStore) -> Result<()> {
    let started = Instant::now();
    let targets = config.distribution_targets();
    let outcome = DistributionJob::new(chain, store, &targets).invoke().await;
    finish("distribute", config, chain, &outcome, started).await
}

async fn print_state(store: &dyn KeyValueStore) -> Result<()> {
    let state = ExecutionState::load(store).await?;
    let last_run = load_timestamp(store, KEEPER_LAST_RUN).await?;
    let last_distribution = load_timestamp(store, LAST_DISTRIBUTION).await?;

    println!("{}", style("═══ PIPELINE STATE ═══").blue().bold());
    println!(
        "   Stage:             {}",
        state.stage.map(|s| s.to_string()).unwrap_or_else(|| "idle".to_string())
    );
    println!("   Keeper last run:   {}", format_timestamp(last_run));
    println!("   Last distribution: {}", format_timestamp(last_distribution));
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

async fn watch(
    config: &KeeperConfig,
    chain: &dyn RelayChain,
    store: &dyn KeyValueStore,
    interval_secs: u64,
) -> Result<()> {
    info!("👀 Watching every {}s (Ctrl+C to stop)", interval_secs);
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    let mut round: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                round += 1;
                info!("Round {} at {}", round, Utc::now().format("%H:%M:%S"));
                if let Err(e) = run_relay(config, chain, store).await {
                    error!("Relay job failed: {}", e);
                }
                if !config.distribution_targets().is_empty() {
                    if let Err(e) = run_distribution(config, chain, store).await {
                        error!("Distribution job failed: {}", e);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down after {} round(s)", round);
                break;
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("relay_keeper=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    print_banner();

    let config = load_config(&cli)?;
    let command = cli.command.clone().unwrap_or(Command::Relay);

    if let Command::InitConfig { path } = &command {
        config.save_to_file(path)?;
        println!("{} Configuration written to {}", style("✓").green(), path);
        return Ok(());
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file");
        return Err(e);
    }
    config.print_summary();
    println!();

    let store: Box<dyn KeyValueStore> = if cli.ephemeral {
        Box::new(MemoryStore::new())
    } else {
        Box::new(JsonFileStore::new(&config.storage_path))
    };

    match command {
        Command::State => print_state(store.as_ref()).await?,
        Command::Reset => {
            ExecutionState::clear(store.as_ref()).await?;
            println!("{} In-flight cycle cleared", style("✓").green());
        }
        Command::Relay | Command::Distribute | Command::Watch { .. } => {
            let chain = RpcChain::new(&config.rpc_url, &config.deployment())?;
            match command {
                Command::Relay => run_relay(&config, &chain, store.as_ref()).await?,
                Command::Distribute => run_distribution(&config, &chain, store.as_ref()).await?,
                Command::Watch { interval } => {
                    let secs = interval.unwrap_or(config.watch_interval_secs);
                    watch(&config, &chain, store.as_ref(), secs).await?
                }
                _ => {}
            }
        }
        Command::InitConfig { .. } => {}
    }

    Ok(())
}
