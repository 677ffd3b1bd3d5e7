//! Keeper Configuration
//!
//! Everything is read from the environment (with `.env` support) or from a
//! TOML file. Network presets supply deployment addresses and routing
//! limits; individual values can be overridden on top.

use alloy_primitives::Address;
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::cartographer::PoolSnapshot;
use crate::distribute::DistributionTargets;
use crate::pipeline::{EpochGate, PipelineSettings};
use crate::rewards::RewardPagination;
use crate::simulator::SlippagePolicy;
use crate::tokens::{Deployment, Network};

// ============================================
// EXECUTION MODE
// ============================================

/// What happens to produced transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionMode {
    /// Print the transactions for an external broadcaster
    #[default]
    Simulation,

    /// Also `eth_call` each one from the keeper address
    DryRun,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Simulation => write!(f, "SIMULATION"),
            ExecutionMode::DryRun => write!(f, "DRY_RUN"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "simulation" => Ok(ExecutionMode::Simulation),
            "dry_run" | "dryrun" | "dry-run" => Ok(ExecutionMode::DryRun),
            other => Err(eyre!("Unknown execution mode: {}", other)),
        }
    }
}

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperConfig {
    // ========== Network Settings ==========
    pub rpc_url: String,
    pub network: Network,

    // ========== Execution Settings ==========
    pub execution_mode: ExecutionMode,

    /// Sender used for dry-run `eth_call`s
    pub keeper_address: Option<Address>,

    /// JSON file holding the pipeline state between invocations
    pub storage_path: String,

    // ========== Deployment Overrides ==========
    pub relay_registry: Option<Address>,
    pub library: Option<Address>,

    // ========== Routing ==========
    pub max_hops: usize,
    pub max_routes: usize,
    pub pools_to_fetch: u64,
    pub pool_page_size: u64,
    pub quote_chunk_size: usize,

    // ========== Slippage ==========
    /// Price impact (percent) above which the high tier applies
    pub max_price_impact_pct: f64,
    pub compounder_slippage_bps: u64,
    pub converter_slippage_bps: u64,
    pub high_slippage_bps: u64,

    // ========== Rewards ==========
    pub rewards_to_fetch: u64,
    pub reward_page_size: u64,
    pub max_reward_calls: u64,
    pub claim_batch_size: usize,

    // ========== Scheduling ==========
    pub watch_interval_secs: u64,

    /// JSONL file every invocation is appended to
    pub history_path: String,

    // ========== Distribution ==========
    pub minter_v1: Option<Address>,
    pub voter_v1: Option<Address>,
    pub minter: Option<Address>,
    pub voter: Option<Address>,
    pub sink_manager: Option<Address>,
}

impl KeeperConfig {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let network: Network = env::var("NETWORK")
            .unwrap_or_else(|_| "optimism".to_string())
            .parse()?;
        let preset = Deployment::for_network(network);

        Ok(Self {
            rpc_url: env::var("RPC_URL").unwrap_or_else(|_| default_rpc_url(network).to_string()),
            network,

            execution_mode: env::var("EXECUTION_MODE")
                .unwrap_or_else(|_| "simulation".to_string())
                .parse()?,
            keeper_address: env_address("KEEPER_ADDRESS")?,
            storage_path: env::var("STORAGE_PATH")
                .unwrap_or_else(|_| "./state/keeper-state.json".to_string()),

            relay_registry: env_address("RELAY_REGISTRY")?,
            library: env_address("LIBRARY_ADDRESS")?,

            max_hops: env_parse("MAX_HOPS", preset.max_hops),
            max_routes: env_parse("MAX_ROUTES", preset.max_routes),
            pools_to_fetch: env_parse("POOLS_TO_FETCH", 600),
            pool_page_size: env_parse("POOL_PAGE_SIZE", 75),
            quote_chunk_size: env_parse("QUOTE_CHUNK_SIZE", 50),

            max_price_impact_pct: env_parse("MAX_PRICE_IMPACT_PCT", 0.5),
            compounder_slippage_bps: env_parse("COMPOUNDER_SLIPPAGE_BPS", 200),
            converter_slippage_bps: env_parse("CONVERTER_SLIPPAGE_BPS", 100),
            high_slippage_bps: env_parse("HIGH_SLIPPAGE_BPS", 500),

            rewards_to_fetch: env_parse("REWARDS_TO_FETCH", 600),
            reward_page_size: env_parse("REWARD_PAGE_SIZE", 100),
            max_reward_calls: env_parse("MAX_REWARD_CALLS", 3),
            claim_batch_size: env_parse("CLAIM_BATCH_SIZE", 3),

            watch_interval_secs: env_parse("WATCH_INTERVAL_SECS", 300),
            history_path: env::var("HISTORY_PATH")
                .unwrap_or_else(|_| "./state/runs.jsonl".to_string()),

            minter_v1: env_address("MINTER_V1")?,
            voter_v1: env_address("VOTER_V1")?,
            minter: env_address("MINTER")?,
            voter: env_address("VOTER")?,
            sink_manager: env_address("SINK_MANAGER")?,
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Network preset with the configured overrides applied
    pub fn deployment(&self) -> Deployment {
        let mut deployment = Deployment::for_network(self.network);
        if let Some(registry) = self.relay_registry {
            deployment.relay_registry = registry;
        }
        if self.library.is_some() {
            deployment.library = self.library;
        }
        deployment.max_hops = self.max_hops;
        deployment.max_routes = self.max_routes;
        deployment
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        let deployment = self.deployment();
        PipelineSettings {
            registry: deployment.relay_registry,
            deployment,
            gate: EpochGate::relay(),
            rewards: RewardPagination {
                ceiling: self.rewards_to_fetch,
                page_size: self.reward_page_size,
                max_calls: self.max_reward_calls,
            },
            claim_batch_size: self.claim_batch_size,
            pools: PoolSnapshot {
                total: self.pools_to_fetch,
                page_size: self.pool_page_size,
            },
            quote_chunk_size: self.quote_chunk_size,
            slippage: SlippagePolicy {
                max_impact_pct: self.max_price_impact_pct,
                compounder_bps: self.compounder_slippage_bps,
                converter_bps: self.converter_slippage_bps,
                high_bps: self.high_slippage_bps,
            },
        }
    }

    pub fn distribution_targets(&self) -> DistributionTargets {
        DistributionTargets {
            minter_v1: self.minter_v1,
            voter_v1: self.voter_v1,
            minter: self.minter,
            voter: self.voter,
            sink_manager: self.sink_manager,
        }
    }

    /// Validate configuration before running
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() || self.rpc_url.contains("YOUR_API_KEY") {
            return Err(eyre!("Invalid RPC_URL - please set a valid RPC endpoint"));
        }

        if self.max_hops == 0 || self.max_hops > 4 {
            return Err(eyre!(
                "MAX_HOPS must be between 1 and 4 (currently {})",
                self.max_hops
            ));
        }
        if self.max_routes == 0 {
            return Err(eyre!("MAX_ROUTES must be at least 1"));
        }
        if self.pool_page_size == 0 || self.reward_page_size == 0 {
            return Err(eyre!("Page sizes must be non-zero"));
        }
        if self.max_reward_calls == 0 || self.claim_batch_size == 0 {
            return Err(eyre!("MAX_REWARD_CALLS and CLAIM_BATCH_SIZE must be non-zero"));
        }
        if !(0.0..100.0).contains(&self.max_price_impact_pct) {
            return Err(eyre!(
                "MAX_PRICE_IMPACT_PCT should be a percentage below 100 (currently {})",
                self.max_price_impact_pct
            ));
        }
        for (name, bps) in [
            ("COMPOUNDER_SLIPPAGE_BPS", self.compounder_slippage_bps),
            ("CONVERTER_SLIPPAGE_BPS", self.converter_slippage_bps),
            ("HIGH_SLIPPAGE_BPS", self.high_slippage_bps),
        ] {
            if bps > 10_000 {
                return Err(eyre!("{} above 10000 bps ({})", name, bps));
            }
        }

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let deployment = self.deployment();
        let set = |a: &Option<Address>| if a.is_some() { "✓ Configured" } else { "✗ Not Set" };

        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              RELAY KEEPER - CONFIGURATION                  ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Execution Mode:    {:^40} ║", self.execution_mode);
        println!("║ Network:           {:^40} ║", self.network);
        println!("║ Reward Token:      {:^40} ║", deployment.reward_symbol);
        println!("║ Storage:           {:^40} ║", self.storage_path);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ ROUTING                                                    ║");
        println!("║ • Max Hops:        {:^40} ║", self.max_hops);
        println!("║ • Max Routes:      {:^40} ║", self.max_routes);
        println!("║ • Pools:           {:^40} ║", format!("{} / {} per page", self.pools_to_fetch, self.pool_page_size));
        println!("║ • Price Impact:    {:^40} ║",
            if deployment.library.is_some() { "✓ Library Set" } else { "✗ High Tier Only" }
        );
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SLIPPAGE                                                   ║");
        println!("║ • Max Impact:      {:>38.2}% ║", self.max_price_impact_pct);
        println!("║ • Compounder:      {:>36} bps ║", self.compounder_slippage_bps);
        println!("║ • Converter:       {:>36} bps ║", self.converter_slippage_bps);
        println!("║ • High Impact:     {:>36} bps ║", self.high_slippage_bps);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ REWARDS                                                    ║");
        println!("║ • Scan Ceiling:    {:^40} ║", self.rewards_to_fetch);
        println!("║ • Pages/Run:       {:^40} ║", format!("{} x {}", self.max_reward_calls, self.reward_page_size));
        println!("║ • Claim Batch:     {:^40} ║", self.claim_batch_size);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ DISTRIBUTION                                               ║");
        println!("║ • v1 Minter/Voter: {:^40} ║", set(&self.minter_v1.and(self.voter_v1)));
        println!("║ • v2 Minter/Voter: {:^40} ║", set(&self.minter.and(self.voter)));
        println!("║ • Sink Manager:    {:^40} ║", set(&self.sink_manager));
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for KeeperConfig {
    fn default() -> Self {
        let preset = Deployment::for_network(Network::Optimism);
        Self {
            rpc_url: default_rpc_url(Network::Optimism).to_string(),
            network: Network::Optimism,
            execution_mode: ExecutionMode::Simulation,
            keeper_address: None,
            storage_path: "./state/keeper-state.json".to_string(),
            relay_registry: None,
            library: None,
            max_hops: preset.max_hops,
            max_routes: preset.max_routes,
            pools_to_fetch: 600,
            pool_page_size: 75,
            quote_chunk_size: 50,
            max_price_impact_pct: 0.5,
            compounder_slippage_bps: 200,
            converter_slippage_bps: 100,
            high_slippage_bps: 500,
            rewards_to_fetch: 600,
            reward_page_size: 100,
            max_reward_calls: 3,
            claim_batch_size: 3,
            watch_interval_secs: 300,
            history_path: "./state/runs.jsonl".to_string(),
            minter_v1: None,
            voter_v1: None,
            minter: None,
            voter: None,
            sink_manager: None,
        }
    }
}

// ============================================
// RUN HISTORY
// ============================================

use chrono::{DateTime, Utc};
use std::io::Write;

use crate::executor::KeeperOutcome;

/// One keeper invocation, as appended to the history file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    pub timestamp: DateTime<Utc>,
    pub job: String,
    pub network: Network,
    pub can_execute: bool,
    pub transactions: usize,
    pub targets: Vec<String>,
    pub message: Option<String>,
}

impl RunLog {
    pub fn new(job: &str, network: Network, outcome: &KeeperOutcome) -> Self {
        Self {
            timestamp: Utc::now(),
            job: job.to_string(),
            network,
            can_execute: outcome.can_execute,
            transactions: outcome.transactions.len(),
            targets: outcome
                .transactions
                .iter()
                .map(|tx| format!("{:#x}", tx.to))
                .collect(),
            message: outcome.message.clone(),
        }
    }

    /// Append this log to a file
    pub fn append_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        let json = serde_json::to_string(self)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }
}

fn default_rpc_url(network: Network) -> &'static str {
    match network {
        Network::Optimism => "https://mainnet.optimism.io",
        Network::Base => "https://mainnet.base.org",
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_address(key: &str) -> Result<Option<Address>> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Address::from_str(value.trim())
            .map(Some)
            .map_err(|e| eyre!("{} is not an address: {}", key, e)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = KeeperConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.execution_mode, ExecutionMode::Simulation);
        assert!(config.distribution_targets().is_empty());
    }

    #[test]
    fn test_invalid_hops() {
        let config = KeeperConfig {
            max_hops: 7,
            ..KeeperConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_apply_to_deployment() {
        let registry = Address::repeat_byte(0x42);
        let config = KeeperConfig {
            network: Network::Base,
            relay_registry: Some(registry),
            library: Some(Address::repeat_byte(0x1b)),
            max_hops: 3,
            max_routes: 50,
            ..KeeperConfig::default()
        };

        let settings = config.pipeline_settings();
        assert_eq!(settings.registry, registry);
        assert_eq!(settings.deployment.library, Some(Address::repeat_byte(0x1b)));
        assert_eq!(settings.deployment.reward_symbol, "AERO");
        assert_eq!(settings.rewards, RewardPagination::default());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = KeeperConfig {
            sink_manager: Some(Address::repeat_byte(0x33)),
            execution_mode: ExecutionMode::DryRun,
            ..KeeperConfig::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: KeeperConfig = toml::from_str(&text).unwrap();

        assert_eq!(parsed.execution_mode, ExecutionMode::DryRun);
        assert_eq!(parsed.sink_manager, config.sink_manager);
    }

    #[test]
    fn test_run_log_appends_lines() {
        let path = std::env::temp_dir().join(format!("relay-keeper-runs-{}.jsonl", std::process::id()));
        let _ = fs::remove_file(&path);

        let rejected = KeeperOutcome::rejected("Too Soon for Execution");
        RunLog::new("relay", Network::Optimism, &rejected).append_to_file(&path).unwrap();
        RunLog::new("distribute", Network::Base, &rejected).append_to_file(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: RunLog = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.job, "relay");
        assert!(!first.can_execute);
        assert_eq!(first.message.as_deref(), Some("Too Soon for Execution"));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("dry-run".parse::<ExecutionMode>().unwrap(), ExecutionMode::DryRun);
        assert!("production".parse::<ExecutionMode>().is_err());
    }
}
