//! Phase 4: The Executor
//!
//! The keeper never signs. It hands `{to, data}` pairs to an external
//! broadcaster and, in dry-run mode, first `eth_call`s each one to catch
//! reverts early.

mod dry_run;

pub use dry_run::{ExecutionEngine, RevertKind, SimulationOutcome};

use alloy_primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};

/// Transaction handed to the broadcaster
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxData {
    pub to: Address,
    pub data: Bytes,
}

impl TxData {
    pub fn new(to: Address, data: Bytes) -> Self {
        Self { to, data }
    }
}

/// Result of one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeeperOutcome {
    pub can_execute: bool,
    pub transactions: Vec<TxData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl KeeperOutcome {
    /// Executable when there is anything to broadcast
    pub fn from_transactions(transactions: Vec<TxData>) -> Self {
        if transactions.is_empty() {
            return Self::rejected("No transactions to broadcast.");
        }
        Self {
            can_execute: true,
            transactions,
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            can_execute: false,
            transactions: Vec::new(),
            message: Some(message.into()),
        }
    }
}
