//! Dry-run execution
//!
//! Replays produced transactions as `eth_call`s from the keeper address.
//! A revert is logged and classified; it never stops the pipeline, since
//! the queued item it belongs to has already been consumed.

use alloy_primitives::Address;
use std::fmt;
use tracing::{info, warn};

use super::{KeeperOutcome, TxData};
use crate::chain::RelayChain;
use crate::config::ExecutionMode;

/// Router revert selectors worth naming
const INSUFFICIENT_OUTPUT_AMOUNT: &str = "0x42301c23";
const K: &str = "0xa932492f";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertKind {
    InsufficientOutputAmount,
    K,
    Unknown,
}

impl RevertKind {
    pub fn classify(error: &str) -> Self {
        if error.contains(INSUFFICIENT_OUTPUT_AMOUNT) {
            RevertKind::InsufficientOutputAmount
        } else if error.contains(K) {
            RevertKind::K
        } else {
            RevertKind::Unknown
        }
    }
}

impl fmt::Display for RevertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevertKind::InsufficientOutputAmount => write!(f, "InsufficientOutputAmount()"),
            RevertKind::K => write!(f, "K()"),
            RevertKind::Unknown => write!(f, "Unknown Error Code"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationOutcome {
    /// Only logged, no call made
    Skipped,
    Success,
    Reverted { kind: RevertKind, reason: String },
}

pub struct ExecutionEngine<'a> {
    chain: &'a dyn RelayChain,
    mode: ExecutionMode,
    keeper: Address,
}

impl<'a> ExecutionEngine<'a> {
    pub fn new(chain: &'a dyn RelayChain, mode: ExecutionMode, keeper: Option<Address>) -> Self {
        Self {
            chain,
            mode,
            keeper: keeper.unwrap_or(Address::ZERO),
        }
    }

    /// One outcome per produced transaction
    pub async fn execute(&self, outcome: &KeeperOutcome) -> Vec<SimulationOutcome> {
        let mut results = Vec::with_capacity(outcome.transactions.len());

        for (i, tx) in outcome.transactions.iter().enumerate() {
            let result = match self.mode {
                ExecutionMode::Simulation => {
                    info!("📋 tx {} -> {:?} ({} bytes)", i, tx.to, tx.data.len());
                    SimulationOutcome::Skipped
                }
                ExecutionMode::DryRun => self.simulate(i, tx).await,
            };
            results.push(result);
        }
        results
    }

    async fn simulate(&self, index: usize, tx: &TxData) -> SimulationOutcome {
        match self.chain.simulate(self.keeper, tx).await {
            Ok(_) => {
                info!("✅ tx {} -> {:?} simulated successfully", index, tx.to);
                SimulationOutcome::Success
            }
            Err(e) => {
                let reason = e.to_string();
                let kind = RevertKind::classify(&reason);
                warn!("❌ tx {} -> {:?} reverted: {}", index, tx.to, kind);
                SimulationOutcome::Reverted { kind, reason }
            }
        }
    }
}
