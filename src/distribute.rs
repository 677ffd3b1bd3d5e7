//! Weekly emission distribution
//!
//! Once per epoch, inside its first hour: roll the minter period, push
//! emissions to gauges in batches and claim the sink manager's rebase.
//! v1 calls come first, then v2, then the sink manager.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::chain::contracts::{IMinter, IMinterV1, ISinkManager, IVoter};
use crate::chain::RelayChain;
use crate::executor::{KeeperOutcome, TxData};
use crate::pipeline::state::{load_timestamp, LAST_DISTRIBUTION};
use crate::pipeline::{EpochGate, KeyValueStore};

/// Contracts touched by a distribution. Unset pairs are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionTargets {
    pub minter_v1: Option<Address>,
    pub voter_v1: Option<Address>,
    pub minter: Option<Address>,
    pub voter: Option<Address>,
    pub sink_manager: Option<Address>,
}

impl DistributionTargets {
    pub fn is_empty(&self) -> bool {
        self.minter_v1.is_none() && self.minter.is_none() && self.sink_manager.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MinterVersion {
    V1,
    V2,
}

pub struct DistributionJob<'a> {
    chain: &'a dyn RelayChain,
    store: &'a dyn KeyValueStore,
    targets: &'a DistributionTargets,
    gate: EpochGate,
    /// Gauges per `distribute` call
    pub batch_size: u64,
    pub max_batches: usize,
}

impl<'a> DistributionJob<'a> {
    pub fn new(chain: &'a dyn RelayChain, store: &'a dyn KeyValueStore, targets: &'a DistributionTargets) -> Self {
        Self {
            chain,
            store,
            targets,
            gate: EpochGate::distribution(),
            batch_size: 10,
            max_batches: 3,
        }
    }

    pub async fn invoke(&self) -> KeeperOutcome {
        match self.try_invoke().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Distribution failed: {:#}", e);
                KeeperOutcome::rejected(format!("Rpc call failed: {}", e))
            }
        }
    }

    pub async fn try_invoke(&self) -> Result<KeeperOutcome> {
        if self.targets.is_empty() {
            return Ok(KeeperOutcome::rejected("No distribution targets configured"));
        }

        let now = self.chain.latest_timestamp().await?;
        let last = load_timestamp(self.store, LAST_DISTRIBUTION).await?;
        if !self.gate.can_start(last, now) {
            return Ok(KeeperOutcome::rejected("Too Soon for Execution"));
        }

        let mut txs = Vec::new();
        if let (Some(minter), Some(voter)) = (self.targets.minter_v1, self.targets.voter_v1) {
            txs.extend(self.encode_distribution(minter, voter, MinterVersion::V1).await?);
        }
        if let (Some(minter), Some(voter)) = (self.targets.minter, self.targets.voter) {
            txs.extend(self.encode_distribution(minter, voter, MinterVersion::V2).await?);
        }
        if let Some(sink) = self.targets.sink_manager {
            let data = ISinkManager::claimRebaseAndGaugeRewardsCall {}.abi_encode();
            txs.push(TxData::new(sink, Bytes::from(data)));
        }

        self.store.set(LAST_DISTRIBUTION, &now.to_string()).await?;
        info!("📤 {} distribution transactions, lastDistribution = {}", txs.len(), now);
        Ok(KeeperOutcome::from_transactions(txs))
    }

    async fn encode_distribution(&self, minter: Address, voter: Address, version: MinterVersion) -> Result<Vec<TxData>> {
        let length = self.chain.voter_length(voter).await?;

        let update = match version {
            MinterVersion::V1 => IMinterV1::update_periodCall {}.abi_encode(),
            MinterVersion::V2 => IMinter::updatePeriodCall {}.abi_encode(),
        };
        let mut txs = vec![TxData::new(minter, Bytes::from(update))];

        for start in gauge_batches(length, self.batch_size, self.max_batches) {
            let call = IVoter::distributeCall {
                _start: U256::from(start),
                _finish: U256::from(start + self.batch_size),
            };
            txs.push(TxData::new(voter, Bytes::from(call.abi_encode())));
        }
        Ok(txs)
    }
}

/// Start index of each `distribute(start, start + size)` call
fn gauge_batches(length: u64, size: u64, max_batches: usize) -> Vec<u64> {
    if size == 0 {
        return Vec::new();
    }
    (0..length).step_by(size as usize).take(max_batches).collect()
}
