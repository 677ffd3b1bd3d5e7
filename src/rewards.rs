//! Reward Discovery & Claim Encoder
//!
//! Walks the sugar `rewards` view for a relay's voting position a few pages
//! per invocation, splits the rows into fee and bribe reward contracts and
//! encodes batched `claimFees` / `claimBribes` calls.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use eyre::Result;
use futures::future::join_all;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chain::contracts::IRelay;
use crate::chain::RelayChain;
use crate::executor::TxData;

/// One claimable reward row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardRecord {
    pub token: Address,
    /// Fee reward contract, zero when the row is a bribe
    pub fee: Address,
    /// Bribe reward contract, zero when the row is a fee
    pub bribe: Address,
}

/// Reward contract -> reward tokens claimable there, in discovery order
pub type RewardContractInfo = IndexMap<Address, Vec<Address>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewardsToClaim {
    pub fee: RewardContractInfo,
    pub bribe: RewardContractInfo,
}

impl RewardsToClaim {
    pub fn absorb(&mut self, records: &[RewardRecord]) {
        for record in records {
            if !record.fee.is_zero() {
                push_unique(self.fee.entry(record.fee).or_default(), record.token);
            }
            if !record.bribe.is_zero() {
                push_unique(self.bribe.entry(record.bribe).or_default(), record.token);
            }
        }
    }

    /// Every reward token, deduplicated, fee tokens first
    pub fn tokens(&self) -> Vec<Address> {
        let mut tokens = Vec::new();
        for token in self.fee.values().chain(self.bribe.values()).flatten() {
            push_unique(&mut tokens, *token);
        }
        tokens
    }

    pub fn is_empty(&self) -> bool {
        self.fee.is_empty() && self.bribe.is_empty()
    }
}

fn push_unique(list: &mut Vec<Address>, token: Address) {
    if !list.contains(&token) {
        list.push(token);
    }
}

/// Per-invocation limits of the rewards walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPagination {
    /// Rows scanned per cycle
    pub ceiling: u64,
    pub page_size: u64,
    /// Pages read per invocation
    pub max_calls: u64,
}

impl Default for RewardPagination {
    fn default() -> Self {
        Self {
            ceiling: 600,
            page_size: 100,
            max_calls: 3,
        }
    }
}

impl RewardPagination {
    /// `(limit, offset)` pages read in one invocation starting at `offset`
    pub fn pages_from(&self, offset: u64) -> Vec<(u64, u64)> {
        let mut pages = Vec::new();
        let mut start = offset;
        while start < self.ceiling && (pages.len() as u64) < self.max_calls && self.page_size > 0 {
            let end = (start + self.page_size).min(self.ceiling);
            pages.push((end - start, start));
            start = end;
        }
        pages
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryStep {
    /// Nothing left to scan this cycle
    Complete,
    Page {
        rewards: RewardsToClaim,
        next_offset: u64,
    },
}

pub struct RewardDiscovery<'a> {
    chain: &'a dyn RelayChain,
    pagination: RewardPagination,
}

impl<'a> RewardDiscovery<'a> {
    pub fn new(chain: &'a dyn RelayChain, pagination: RewardPagination) -> Self {
        Self { chain, pagination }
    }

    /// Read the next pages of rewards for `position`
    pub async fn discover(&self, position: U256, offset: u64) -> Result<DiscoveryStep> {
        if offset >= self.pagination.ceiling {
            return Ok(DiscoveryStep::Complete);
        }

        let pages = self.pagination.pages_from(offset);
        let results = join_all(
            pages
                .iter()
                .map(|&(limit, start)| self.chain.rewards(limit, start, position)),
        )
        .await;

        let mut rewards = RewardsToClaim::default();
        for (result, (limit, start)) in results.into_iter().zip(&pages) {
            let rows = result?;
            debug!("rewards({}, {}) -> {} rows", limit, start, rows.len());
            rewards.absorb(&rows);
        }

        let next_offset = pages
            .last()
            .map(|&(limit, start)| start + limit)
            .unwrap_or(self.pagination.ceiling);

        info!(
            "Rewards {}..{}: {} fee contracts, {} bribe contracts",
            offset,
            next_offset,
            rewards.fee.len(),
            rewards.bribe.len()
        );
        Ok(DiscoveryStep::Page { rewards, next_offset })
    }
}

/// `claimFees` batches followed by `claimBribes` batches, `batch_size`
/// reward contracts per call
pub fn encode_claims(relay: Address, rewards: &RewardsToClaim, batch_size: usize) -> Vec<TxData> {
    let batch_size = batch_size.max(1);
    let mut txs = Vec::new();

    let fees: Vec<(&Address, &Vec<Address>)> = rewards.fee.iter().collect();
    for batch in fees.chunks(batch_size) {
        let call = IRelay::claimFeesCall {
            _fees: batch.iter().map(|(c, _)| **c).collect(),
            _tokens: batch.iter().map(|(_, t)| (*t).clone()).collect(),
        };
        txs.push(TxData::new(relay, Bytes::from(call.abi_encode())));
    }

    let bribes: Vec<(&Address, &Vec<Address>)> = rewards.bribe.iter().collect();
    for batch in bribes.chunks(batch_size) {
        let call = IRelay::claimBribesCall {
            _bribes: batch.iter().map(|(c, _)| **c).collect(),
            _tokens: batch.iter().map(|(_, t)| (*t).clone()).collect(),
        };
        txs.push(TxData::new(relay, Bytes::from(call.abi_encode())));
    }

    txs
}
