//! In-memory chain for tests

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use eyre::{eyre, Result};
use std::collections::HashMap;
use std::sync::Mutex;

use super::RelayChain;
use crate::brain::Hop;
use crate::cartographer::Pool;
use crate::executor::TxData;
use crate::rewards::RewardRecord;

pub const MOCK_FACTORY: Address = Address::repeat_byte(0xfa);

#[derive(Default)]
struct MockState {
    timestamp: u64,
    factories: HashMap<Address, Vec<Address>>,
    relays: HashMap<Address, Vec<Address>>,
    high_liquidity: HashMap<Address, Vec<Address>>,
    relay_tokens: HashMap<Address, Address>,
    positions: HashMap<Address, U256>,
    rewards: Vec<RewardRecord>,
    pools: Vec<Pool>,
    rates: HashMap<Hop, (u64, u64)>,
    trade_diffs: HashMap<Hop, (U256, U256)>,
    balances: HashMap<(Address, Address), U256>,
    voter_lengths: HashMap<Address, u64>,
    reverts: HashMap<Address, String>,
    fail_pools: bool,
    fail_all: bool,
    quote_calls: usize,
    reward_calls: usize,
    reward_positions: Vec<U256>,
}

#[derive(Default)]
pub struct MockChain {
    state: Mutex<MockState>,
}

impl MockChain {
    fn with<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    fn read<T>(&self, f: impl FnOnce(&mut MockState) -> Result<T>) -> Result<T> {
        self.with(|s| {
            if s.fail_all {
                return Err(eyre!("connection refused"));
            }
            f(s)
        })
    }

    pub fn set_timestamp(&self, timestamp: u64) {
        self.with(|s| s.timestamp = timestamp);
    }

    pub fn add_factory(&self, registry: Address, factory: Address) {
        self.with(|s| s.factories.entry(registry).or_default().push(factory));
    }

    pub fn add_relay(&self, factory: Address, relay: Address, token: Address) {
        self.with(|s| {
            s.relays.entry(factory).or_default().push(relay);
            s.relay_tokens.insert(relay, token);
        });
    }

    pub fn set_high_liquidity(&self, factory: Address, tokens: Vec<Address>) {
        self.with(|s| s.high_liquidity.insert(factory, tokens));
    }

    pub fn set_position(&self, relay: Address, position: U256) {
        self.with(|s| s.positions.insert(relay, position));
    }

    pub fn add_reward(&self, record: RewardRecord) {
        self.with(|s| s.rewards.push(record));
    }

    pub fn add_pool(&self, address: Address, token0: Address, token1: Address, stable: bool) {
        self.with(|s| {
            s.pools.push(Pool {
                address,
                token0,
                token1,
                stable,
                factory: MOCK_FACTORY,
            })
        });
    }

    /// `out = in * numerator / denominator` for this hop
    pub fn set_rate(&self, hop: Hop, numerator: u64, denominator: u64) {
        self.with(|s| s.rates.insert(hop, (numerator, denominator)));
    }

    pub fn set_trade_diff(&self, hop: Hop, a: U256, b: U256) {
        self.with(|s| s.trade_diffs.insert(hop, (a, b)));
    }

    pub fn set_balance(&self, token: Address, owner: Address, amount: U256) {
        self.with(|s| s.balances.insert((token, owner), amount));
    }

    pub fn set_voter_length(&self, voter: Address, length: u64) {
        self.with(|s| s.voter_lengths.insert(voter, length));
    }

    pub fn revert_calls_to(&self, to: Address, message: &str) {
        self.with(|s| s.reverts.insert(to, message.to_string()));
    }

    pub fn fail_pools(&self, fail: bool) {
        self.with(|s| s.fail_pools = fail);
    }

    pub fn fail_all(&self, fail: bool) {
        self.with(|s| s.fail_all = fail);
    }

    pub fn quote_calls(&self) -> usize {
        self.with(|s| s.quote_calls)
    }

    pub fn reward_calls(&self) -> usize {
        self.with(|s| s.reward_calls)
    }

    /// Position id of every `rewards` read, in call order
    pub fn reward_positions(&self) -> Vec<U256> {
        self.with(|s| s.reward_positions.clone())
    }
}

fn page<T: Clone>(items: &[T], limit: u64, offset: u64) -> Vec<T> {
    items
        .iter()
        .skip(offset as usize)
        .take(limit as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl RelayChain for MockChain {
    async fn latest_timestamp(&self) -> Result<u64> {
        self.read(|s| Ok(s.timestamp))
    }

    async fn factories(&self, registry: Address) -> Result<Vec<Address>> {
        self.read(|s| Ok(s.factories.get(&registry).cloned().unwrap_or_default()))
    }

    async fn relays(&self, factory: Address) -> Result<Vec<Address>> {
        self.read(|s| Ok(s.relays.get(&factory).cloned().unwrap_or_default()))
    }

    async fn high_liquidity_tokens(&self, factory: Address) -> Result<Vec<Address>> {
        self.read(|s| Ok(s.high_liquidity.get(&factory).cloned().unwrap_or_default()))
    }

    async fn relay_token(&self, relay: Address) -> Result<Address> {
        self.read(|s| {
            s.relay_tokens
                .get(&relay)
                .copied()
                .ok_or_else(|| eyre!("execution reverted: not a relay"))
        })
    }

    async fn relay_position(&self, relay: Address) -> Result<U256> {
        self.read(|s| Ok(s.positions.get(&relay).copied().unwrap_or_default()))
    }

    async fn rewards(&self, limit: u64, offset: u64, position: U256) -> Result<Vec<RewardRecord>> {
        self.read(|s| {
            s.reward_calls += 1;
            s.reward_positions.push(position);
            Ok(page(&s.rewards, limit, offset))
        })
    }

    async fn pools(&self, limit: u64, offset: u64) -> Result<Vec<Pool>> {
        self.read(|s| {
            if s.fail_pools {
                return Err(eyre!("forSwaps reverted"));
            }
            Ok(page(&s.pools, limit, offset))
        })
    }

    async fn amounts_out(&self, amount_in: U256, route: &[Hop]) -> Result<Vec<U256>> {
        self.read(|s| {
            s.quote_calls += 1;
            let mut amounts = vec![amount_in];
            let mut amount = amount_in;
            for hop in route {
                let (num, den) = s
                    .rates
                    .get(hop)
                    .copied()
                    .ok_or_else(|| eyre!("execution reverted: no pool"))?;
                amount = amount * U256::from(num) / U256::from(den);
                amounts.push(amount);
            }
            Ok(amounts)
        })
    }

    async fn trade_diff(&self, _library: Address, _amount_in: U256, hop: &Hop) -> Result<(U256, U256)> {
        self.read(|s| Ok(s.trade_diffs.get(hop).copied().unwrap_or((U256::from(1), U256::from(1)))))
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256> {
        self.read(|s| Ok(s.balances.get(&(token, owner)).copied().unwrap_or_default()))
    }

    async fn voter_length(&self, voter: Address) -> Result<u64> {
        self.read(|s| Ok(s.voter_lengths.get(&voter).copied().unwrap_or_default()))
    }

    async fn simulate(&self, _from: Address, tx: &TxData) -> Result<Bytes> {
        self.read(|s| match s.reverts.get(&tx.to) {
            Some(message) => Err(eyre!("{}", message)),
            None => Ok(Bytes::new()),
        })
    }
}
