//! Chain access for the keeper
//!
//! Every on-chain read the pipeline depends on goes through `RelayChain`,
//! so a run can be replayed against an in-memory chain in tests.

pub mod contracts;
pub mod rpc;

#[cfg(test)]
pub mod mock;

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use eyre::Result;

use crate::brain::Hop;
use crate::cartographer::Pool;
use crate::executor::TxData;
use crate::rewards::RewardRecord;

pub use rpc::RpcChain;

/// Read-only view of the protocol contracts
#[async_trait]
pub trait RelayChain: Send + Sync {
    /// Timestamp of the latest block
    async fn latest_timestamp(&self) -> Result<u64>;

    /// All relay factories known to the registry
    async fn factories(&self, registry: Address) -> Result<Vec<Address>>;

    async fn relays(&self, factory: Address) -> Result<Vec<Address>>;

    async fn high_liquidity_tokens(&self, factory: Address) -> Result<Vec<Address>>;

    /// Token the relay converts into
    async fn relay_token(&self, relay: Address) -> Result<Address>;

    /// Voting position (managed NFT id) held by the relay
    async fn relay_position(&self, relay: Address) -> Result<U256>;

    async fn rewards(&self, limit: u64, offset: u64, position: U256) -> Result<Vec<RewardRecord>>;

    async fn pools(&self, limit: u64, offset: u64) -> Result<Vec<Pool>>;

    /// Router quote. Index 0 is the input amount, the last entry the output.
    async fn amounts_out(&self, amount_in: U256, route: &[Hop]) -> Result<Vec<U256>>;

    /// Trade-invariant delta `(a, b)` of a single hop
    async fn trade_diff(&self, library: Address, amount_in: U256, hop: &Hop) -> Result<(U256, U256)>;

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256>;

    /// Number of pools registered with a voter
    async fn voter_length(&self, voter: Address) -> Result<u64>;

    /// `eth_call` a produced transaction from `from`
    async fn simulate(&self, from: Address, tx: &TxData) -> Result<Bytes>;
}
