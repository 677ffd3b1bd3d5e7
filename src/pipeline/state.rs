//! Execution State
//!
//! The pipeline's only durable memory. Loaded at the start of every
//! invocation and written back once every read of the step succeeded.
//! A stage of `None` means no cycle is in flight.

use alloy_primitives::{Address, U256};
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::storage::KeyValueStore;

pub const CURR_STAGE: &str = "currStage";
pub const CURR_RELAY: &str = "currRelay";
pub const CURR_FACTORY: &str = "currFactory";
pub const RELAYS_QUEUE: &str = "relaysQueue";
pub const FACTORIES_QUEUE: &str = "factoriesQueue";
pub const IS_AUTO_COMPOUNDER: &str = "isAutoCompounder";
pub const TOKENS_QUEUE: &str = "tokensQueue";
pub const BALANCES_QUEUE: &str = "balancesQueue";
pub const OFFSET: &str = "offset";
pub const CLAIMED_TOKENS: &str = "claimedTokens";
pub const KEEPER_LAST_RUN: &str = "keeperLastRun";
pub const LAST_DISTRIBUTION: &str = "lastDistribution";

/// Keys owned by an in-flight cycle
pub const STAGE_KEYS: [&str; 10] = [
    CURR_STAGE,
    CURR_RELAY,
    CURR_FACTORY,
    RELAYS_QUEUE,
    FACTORIES_QUEUE,
    IS_AUTO_COMPOUNDER,
    TOKENS_QUEUE,
    BALANCES_QUEUE,
    OFFSET,
    CLAIMED_TOKENS,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Claim,
    Swap,
    Compound,
    Complete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Claim => write!(f, "claim"),
            Stage::Swap => write!(f, "swap"),
            Stage::Compound => write!(f, "compound"),
            Stage::Complete => write!(f, "complete"),
        }
    }
}

impl FromStr for Stage {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "claim" => Ok(Stage::Claim),
            "swap" => Ok(Stage::Swap),
            "compound" => Ok(Stage::Compound),
            "complete" => Ok(Stage::Complete),
            other => Err(eyre!("Unknown stage: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    pub stage: Option<Stage>,
    pub current_relay: Option<Address>,
    pub relays_queue: Vec<Address>,
    pub current_factory: Option<Address>,
    pub factories_queue: Vec<Address>,
    pub is_auto_compounder: bool,
    pub tokens_queue: Vec<Address>,
    /// Balance snapshot parallel to `tokens_queue`
    pub balances_queue: Vec<U256>,
    pub offset: u64,
    pub claimed_tokens: Vec<Address>,
}

impl ExecutionState {
    pub async fn load(store: &dyn KeyValueStore) -> Result<Self> {
        let stage = match non_empty(store.get(CURR_STAGE).await?) {
            Some(s) => Some(s.parse()?),
            None => None,
        };

        Ok(Self {
            stage,
            current_relay: parse_opt(store.get(CURR_RELAY).await?)?,
            relays_queue: parse_list(store.get(RELAYS_QUEUE).await?)?,
            current_factory: parse_opt(store.get(CURR_FACTORY).await?)?,
            factories_queue: parse_list(store.get(FACTORIES_QUEUE).await?)?,
            is_auto_compounder: non_empty(store.get(IS_AUTO_COMPOUNDER).await?).as_deref() == Some("true"),
            tokens_queue: parse_list(store.get(TOKENS_QUEUE).await?)?,
            balances_queue: parse_balances(store.get(BALANCES_QUEUE).await?)?,
            offset: parse_opt(store.get(OFFSET).await?)?.unwrap_or(0),
            claimed_tokens: parse_list(store.get(CLAIMED_TOKENS).await?)?,
        })
    }

    /// Write every key; empty values delete their key
    pub async fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        put(store, CURR_STAGE, self.stage.map(|s| s.to_string())).await?;
        put(store, CURR_RELAY, self.current_relay.map(|a| a.to_string())).await?;
        put(store, CURR_FACTORY, self.current_factory.map(|a| a.to_string())).await?;
        put(store, RELAYS_QUEUE, list_value(&self.relays_queue)?).await?;
        put(store, FACTORIES_QUEUE, list_value(&self.factories_queue)?).await?;
        put(store, IS_AUTO_COMPOUNDER, self.stage.map(|_| self.is_auto_compounder.to_string())).await?;
        put(store, TOKENS_QUEUE, list_value(&self.tokens_queue)?).await?;
        let balances: Vec<String> = self.balances_queue.iter().map(|b| b.to_string()).collect();
        put(store, BALANCES_QUEUE, list_value(&balances)?).await?;
        put(store, OFFSET, (self.offset != 0).then(|| self.offset.to_string())).await?;
        put(store, CLAIMED_TOKENS, list_value(&self.claimed_tokens)?).await?;
        Ok(())
    }

    pub async fn clear(store: &dyn KeyValueStore) -> Result<()> {
        for key in STAGE_KEYS {
            store.delete(key).await?;
        }
        Ok(())
    }

    /// No cycle in flight
    pub fn is_idle(&self) -> bool {
        self.stage.is_none()
    }

    /// Drop everything tied to the current relay
    pub fn reset_relay(&mut self) {
        self.current_relay = None;
        self.is_auto_compounder = false;
        self.tokens_queue.clear();
        self.balances_queue.clear();
        self.offset = 0;
        self.claimed_tokens.clear();
    }

    pub fn merge_claimed(&mut self, tokens: &[Address]) {
        for token in tokens {
            if !self.claimed_tokens.contains(token) {
                self.claimed_tokens.push(*token);
            }
        }
    }
}

/// Read a unix timestamp key such as `keeperLastRun`
pub async fn load_timestamp(store: &dyn KeyValueStore, key: &str) -> Result<Option<u64>> {
    Ok(parse_opt::<u64>(store.get(key).await?)?.filter(|t| *t != 0))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_opt<T>(value: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    non_empty(value)
        .map(|v| v.trim().parse::<T>().map_err(|e| eyre!("Bad stored value {:?}: {}", v, e)))
        .transpose()
}

fn parse_list(value: Option<String>) -> Result<Vec<Address>> {
    match non_empty(value) {
        Some(v) => Ok(serde_json::from_str(&v)?),
        None => Ok(Vec::new()),
    }
}

fn parse_balances(value: Option<String>) -> Result<Vec<U256>> {
    let raw: Vec<String> = match non_empty(value) {
        Some(v) => serde_json::from_str(&v)?,
        None => Vec::new(),
    };
    raw.iter()
        .map(|b| U256::from_str(b).map_err(|e| eyre!("Bad stored balance {:?}: {}", b, e)))
        .collect()
}

fn list_value<T: Serialize>(items: &[T]) -> Result<Option<String>> {
    if items.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(items)?))
}

async fn put(store: &dyn KeyValueStore, key: &str, value: Option<String>) -> Result<()> {
    match value {
        Some(v) => store.set(key, &v).await,
        None => store.delete(key).await,
    }
}
