//! Phase 5: The Pipeline
//!
//! Drives every relay of every factory through claim -> swap -> compound
//! -> complete across many short, independent invocations. Each
//! invocation loads the persisted `ExecutionState`, performs at most one
//! unit of work (a page of claims, one swap or one compound), writes the
//! advanced state back and returns the encoded transactions.
//!
//! Reads happen first; storage is written only once the whole step
//! succeeded, so a failed invocation is simply retried by the next one.

pub mod epoch;
pub mod relay;
pub mod state;
pub mod storage;

pub use epoch::{EpochGate, EpochWindow};
pub use relay::{Relay, RelayKind};
pub use state::{ExecutionState, Stage};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore};

use alloy_primitives::{Address, Bytes, U256};
use eyre::{eyre, Result};
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::brain::get_routes;
use crate::cartographer::{PoolFetcher, PoolGraph, PoolSnapshot};
use crate::chain::RelayChain;
use crate::executor::{KeeperOutcome, TxData};
use crate::rewards::{encode_claims, DiscoveryStep, RewardDiscovery, RewardPagination};
use crate::simulator::{ImpactEvaluator, RouteQuoter, SlippagePolicy};
use crate::tokens::Deployment;
use state::{load_timestamp, KEEPER_LAST_RUN};

/// Everything an invocation needs besides chain and storage
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub deployment: Deployment,
    /// Registry the factories are read from
    pub registry: Address,
    pub gate: EpochGate,
    pub rewards: RewardPagination,
    pub claim_batch_size: usize,
    pub pools: PoolSnapshot,
    pub quote_chunk_size: usize,
    pub slippage: SlippagePolicy,
}

impl PipelineSettings {
    pub fn for_deployment(deployment: Deployment) -> Self {
        Self {
            registry: deployment.relay_registry,
            deployment,
            gate: EpochGate::relay(),
            rewards: RewardPagination::default(),
            claim_batch_size: 3,
            pools: PoolSnapshot::default(),
            quote_chunk_size: 50,
            slippage: SlippagePolicy::default(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::for_deployment(Deployment::default())
    }
}

/// Outcome of running one stage
#[derive(Debug)]
enum StepResult {
    /// Stop here and hand these out (possibly none)
    Work(Vec<TxData>),
    /// Nothing produced; run the next stage now
    Continue,
}

pub struct RelayPipeline<'a> {
    chain: &'a dyn RelayChain,
    store: &'a dyn KeyValueStore,
    settings: &'a PipelineSettings,
}

impl<'a> RelayPipeline<'a> {
    pub fn new(chain: &'a dyn RelayChain, store: &'a dyn KeyValueStore, settings: &'a PipelineSettings) -> Self {
        Self { chain, store, settings }
    }

    /// Run one invocation. Failures come back as a non-executable outcome.
    pub async fn invoke(&self) -> KeeperOutcome {
        match self.try_invoke().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Relay invocation failed: {:#}", e);
                KeeperOutcome::rejected(format!("Rpc call failed: {}", e))
            }
        }
    }

    pub async fn try_invoke(&self) -> Result<KeeperOutcome> {
        let mut state = ExecutionState::load(self.store).await?;
        let now = self.chain.latest_timestamp().await?;

        if state.is_idle() {
            let last_run = load_timestamp(self.store, KEEPER_LAST_RUN).await?;
            if !self.settings.gate.can_start(last_run, now) {
                debug!("Last run {:?}, now {}: waiting for next epoch", last_run, now);
                return Ok(KeeperOutcome::rejected("Too Soon for Execution"));
            }

            self.seed(&mut state).await?;
            if state.is_idle() {
                warn!("Registry {:?} has no relays", self.settings.registry);
                self.store.set(KEEPER_LAST_RUN, &now.to_string()).await?;
                return Ok(KeeperOutcome::rejected("No relays to process"));
            }
        }

        let transactions = self.run_stages(&mut state).await?;

        if state.is_idle() {
            ExecutionState::clear(self.store).await?;
            self.store.set(KEEPER_LAST_RUN, &now.to_string()).await?;
            info!("🏁 All relays processed, keeperLastRun = {}", now);
        } else {
            state.save(self.store).await?;
        }

        Ok(KeeperOutcome::from_transactions(transactions))
    }

    /// Start a cycle: every factory of the registry, first relay queued
    async fn seed(&self, state: &mut ExecutionState) -> Result<()> {
        let factories = self.chain.factories(self.settings.registry).await?;
        info!("🌱 New cycle: {} factories", factories.len());

        *state = ExecutionState {
            factories_queue: factories,
            ..ExecutionState::default()
        };
        self.advance(state).await
    }

    /// Run stages of the current relay until one produces work or the
    /// relay completes, then move to the next relay
    async fn run_stages(&self, state: &mut ExecutionState) -> Result<Vec<TxData>> {
        let mut transactions = Vec::new();

        while let Some(stage) = state.stage {
            if stage == Stage::Complete {
                break;
            }
            let relay = self.current_relay(state).await?;
            debug!("{} {:?} at stage {}", relay.kind, relay.address, stage);

            let step = match stage {
                Stage::Claim => self.claim(&relay, state).await?,
                Stage::Swap => self.swap(&relay, state).await?,
                Stage::Compound => self.compound(&relay, state).await?,
                Stage::Complete => StepResult::Continue,
            };

            if let StepResult::Work(txs) = step {
                transactions = txs;
                break;
            }
        }

        if state.stage == Some(Stage::Complete) {
            if let Some(relay) = state.current_relay {
                info!("✅ Relay {:?} complete", relay);
            }
            self.advance(state).await?;
        }
        Ok(transactions)
    }

    async fn current_relay(&self, state: &ExecutionState) -> Result<Relay> {
        let address = state.current_relay.ok_or_else(|| eyre!("Stage set without a current relay"))?;
        let factory = state.current_factory.ok_or_else(|| eyre!("Stage set without a current factory"))?;
        Relay::resume(
            self.chain,
            address,
            factory,
            state.is_auto_compounder,
            self.settings.deployment.reward_token,
        )
        .await
    }

    // ============================================
    // CLAIM
    // ============================================

    async fn claim(&self, relay: &Relay, state: &mut ExecutionState) -> Result<StepResult> {
        let discovery = RewardDiscovery::new(self.chain, self.settings.rewards);

        let step = if state.offset >= self.settings.rewards.ceiling {
            DiscoveryStep::Complete
        } else {
            let position = self.chain.relay_position(relay.address).await?;
            discovery.discover(position, state.offset).await?
        };

        match step {
            DiscoveryStep::Complete => {
                state.offset = 0;
                state.stage = Some(Stage::Swap);
                Ok(StepResult::Continue)
            }
            DiscoveryStep::Page { rewards, next_offset } => {
                state.offset = next_offset;
                state.merge_claimed(&rewards.tokens());
                if rewards.is_empty() {
                    debug!("No rewards for {:?} up to offset {}", relay.address, next_offset);
                }
                let calls = encode_claims(relay.address, &rewards, self.settings.claim_batch_size);
                info!("🎁 {} claim calls for {:?} (offset {})", calls.len(), relay.address, next_offset);
                Ok(StepResult::Work(calls))
            }
        }
    }

    // ============================================
    // SWAP
    // ============================================

    async fn swap(&self, relay: &Relay, state: &mut ExecutionState) -> Result<StepResult> {
        let high_liquidity = self.chain.high_liquidity_tokens(relay.factory).await?;

        if state.tokens_queue.is_empty() {
            self.build_token_queue(relay, state, &high_liquidity).await?;
            if state.tokens_queue.is_empty() {
                info!("No tokens to swap for {:?}", relay.address);
                state.stage = Some(relay.kind.stage_after_swaps());
                return Ok(StepResult::Continue);
            }
        }

        let token = state.tokens_queue.remove(0);
        if !state.balances_queue.is_empty() {
            state.balances_queue.remove(0);
        }
        let last = state.tokens_queue.is_empty();

        let balance = self.chain.balance_of(token, relay.address).await?;
        let call = if balance.is_zero() {
            debug!("{:?} balance is zero", token);
            None
        } else {
            let pools = PoolFetcher::new(self.chain, self.settings.pools).fetch_all_pools().await?;
            let graph = PoolGraph::from_pools(&pools);
            self.encode_swap(relay, &graph, token, balance, &high_liquidity).await?
        };

        match call {
            Some(call) if last => {
                let (data, next) = relay.kind.finalize_last_swap(call);
                state.stage = Some(next);
                Ok(StepResult::Work(vec![TxData::new(relay.address, data)]))
            }
            Some(call) => Ok(StepResult::Work(vec![TxData::new(relay.address, call)])),
            None if last => {
                warn!("Skipping {:?}: no usable quote", token);
                state.stage = Some(relay.kind.stage_after_swaps());
                Ok(StepResult::Continue)
            }
            None => {
                warn!("Skipping {:?}: no usable quote, {} tokens left", token, state.tokens_queue.len());
                Ok(StepResult::Work(Vec::new()))
            }
        }
    }

    /// `claimed ∪ high-liquidity − target − excluded`, non-zero balances only
    async fn build_token_queue(&self, relay: &Relay, state: &mut ExecutionState, high_liquidity: &[Address]) -> Result<()> {
        let reward_token = self.settings.deployment.reward_token;
        let excluded = self.settings.deployment.is_excluded_relay(relay.address);

        let mut candidates: Vec<Address> = Vec::new();
        for token in state.claimed_tokens.iter().chain(high_liquidity) {
            if *token == relay.target_token || (excluded && *token == reward_token) {
                continue;
            }
            if !candidates.contains(token) {
                candidates.push(*token);
            }
        }

        let balances = join_all(
            candidates
                .iter()
                .map(|token| self.chain.balance_of(*token, relay.address)),
        )
        .await;

        let mut tokens = Vec::new();
        let mut amounts = Vec::new();
        for (token, balance) in candidates.into_iter().zip(balances) {
            let balance = balance?;
            if !balance.is_zero() {
                tokens.push(token);
                amounts.push(balance);
            }
        }

        info!("🪙 {} tokens to swap for {:?}", tokens.len(), relay.address);
        state.tokens_queue = tokens;
        state.balances_queue = amounts;
        state.claimed_tokens.clear();
        Ok(())
    }

    /// Best route for `amount` of `token` into the relay's target
    async fn encode_swap(
        &self,
        relay: &Relay,
        graph: &PoolGraph,
        token: Address,
        amount: U256,
        high_liquidity: &[Address],
    ) -> Result<Option<Bytes>> {
        let deployment = &self.settings.deployment;
        let routes = get_routes(
            graph,
            token,
            relay.target_token,
            high_liquidity,
            deployment.max_hops,
            deployment.max_routes,
        );
        if routes.is_empty() {
            return Ok(None);
        }

        let quoter = RouteQuoter::new(self.chain, self.settings.quote_chunk_size);
        let Some(quote) = quoter.best_quote(&routes, amount).await else {
            return Ok(None);
        };

        let evaluator = ImpactEvaluator::new(self.chain, deployment.library, self.settings.slippage);
        let slippage = evaluator
            .slippage_bps(
                &quote,
                relay.kind.low_slippage_bps(&self.settings.slippage),
                high_liquidity.contains(&relay.target_token),
            )
            .await?;

        info!(
            "🔀 Swap {:?} -> {:?}: {} in, {} out, {} hops, {} bps",
            token,
            relay.target_token,
            quote.amount_in,
            quote.amount_out,
            quote.route.len(),
            slippage
        );
        Ok(Some(relay.kind.encode_swap(token, slippage, &quote.route)))
    }

    // ============================================
    // COMPOUND
    // ============================================

    async fn compound(&self, relay: &Relay, state: &mut ExecutionState) -> Result<StepResult> {
        state.stage = Some(Stage::Complete);
        if !relay.kind.is_compounder() {
            return Ok(StepResult::Continue);
        }

        let balance = self
            .chain
            .balance_of(self.settings.deployment.reward_token, relay.address)
            .await?;
        if balance.is_zero() {
            return Ok(StepResult::Continue);
        }

        info!("♻️  Compounding {} {} in {:?}", balance, self.settings.deployment.reward_symbol, relay.address);
        Ok(StepResult::Work(vec![TxData::new(relay.address, relay::encode_compound())]))
    }

    // ============================================
    // ADVANCE
    // ============================================

    /// Next relay of the current factory, else the first relay of the next
    /// factory that has any, else idle
    async fn advance(&self, state: &mut ExecutionState) -> Result<()> {
        state.reset_relay();

        loop {
            if !state.relays_queue.is_empty() {
                let address = state.relays_queue.remove(0);
                let factory = state
                    .current_factory
                    .ok_or_else(|| eyre!("Relay queued without a factory"))?;
                let relay = Relay::load(self.chain, address, factory, self.settings.deployment.reward_token).await?;

                info!("➡️  Next relay {:?} ({})", address, relay.kind);
                state.current_relay = Some(address);
                state.is_auto_compounder = relay.kind.is_compounder();
                state.stage = Some(Stage::Claim);
                return Ok(());
            }

            if state.factories_queue.is_empty() {
                *state = ExecutionState::default();
                return Ok(());
            }

            let factory = state.factories_queue.remove(0);
            state.relays_queue = self.chain.relays(factory).await?;
            state.current_factory = Some(factory);
            if state.relays_queue.is_empty() {
                debug!("Factory {:?} has no relays", factory);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;
    use crate::chain::contracts::IRelay;
    use crate::rewards::RewardRecord;
    use alloy_sol_types::SolCall;
    use super::epoch::{HOUR, WEEK};
    use super::state::*;

    const NOW: u64 = 2_800 * WEEK + 2 * HOUR;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn settings() -> PipelineSettings {
        let mut settings = PipelineSettings::default();
        settings.registry = addr(0xaa);
        settings.rewards = RewardPagination {
            ceiling: 300,
            page_size: 100,
            max_calls: 3,
        };
        settings
    }

    fn reward_token() -> Address {
        settings().deployment.reward_token
    }

    /// Factories F1 = [R1], F2 = [R2, R3], all compounders
    fn two_factory_chain() -> MockChain {
        let chain = MockChain::default();
        chain.set_timestamp(NOW);
        chain.add_factory(addr(0xaa), addr(0xf1));
        chain.add_factory(addr(0xaa), addr(0xf2));
        chain.add_relay(addr(0xf1), addr(0x01), reward_token());
        chain.add_relay(addr(0xf2), addr(0x02), reward_token());
        chain.add_relay(addr(0xf2), addr(0x03), reward_token());
        chain
    }

    #[tokio::test]
    async fn test_stage_exhaustion_in_two_invocations() {
        let chain = MockChain::default();
        chain.set_timestamp(NOW);
        chain.add_factory(addr(0xaa), addr(0xf1));
        chain.add_relay(addr(0xf1), addr(0x01), reward_token());
        let store = MemoryStore::new();
        let settings = settings();
        let pipeline = RelayPipeline::new(&chain, &store, &settings);

        let first = pipeline.invoke().await;
        assert!(!first.can_execute);
        assert_eq!(store.snapshot()[CURR_STAGE], "claim");
        assert_eq!(store.snapshot()[OFFSET], "300");

        let second = pipeline.invoke().await;
        assert!(second.transactions.is_empty());
        let values = store.snapshot();
        assert_eq!(values.len(), 1);
        assert_eq!(values[KEEPER_LAST_RUN], NOW.to_string());
    }

    #[tokio::test]
    async fn test_queue_draining_end_to_end() {
        let chain = two_factory_chain();
        for relay in [0x01, 0x02, 0x03] {
            chain.set_balance(reward_token(), addr(relay), U256::from(5));
        }
        let store = MemoryStore::new();
        let settings = settings();
        let pipeline = RelayPipeline::new(&chain, &store, &settings);

        let mut compounded = Vec::new();
        for _ in 0..6 {
            assert!(store.snapshot().get(KEEPER_LAST_RUN).is_none());
            let outcome = pipeline.invoke().await;
            for tx in outcome.transactions {
                assert!(IRelay::compoundCall::abi_decode(&tx.data).is_ok());
                compounded.push(tx.to);
            }
        }

        assert_eq!(compounded, vec![addr(0x01), addr(0x02), addr(0x03)]);
        let values = store.snapshot();
        assert_eq!(values.len(), 1);
        assert_eq!(values[KEEPER_LAST_RUN], NOW.to_string());

        // same epoch: gated
        let outcome = pipeline.invoke().await;
        assert_eq!(outcome.message.as_deref(), Some("Too Soon for Execution"));
    }

    #[tokio::test]
    async fn test_gate_applies_only_to_new_cycles() {
        let chain = two_factory_chain();
        let store = MemoryStore::with_values([(KEEPER_LAST_RUN, (NOW - HOUR).to_string())]);
        let settings = settings();
        let pipeline = RelayPipeline::new(&chain, &store, &settings);

        assert_eq!(pipeline.invoke().await.message.as_deref(), Some("Too Soon for Execution"));
        assert_eq!(store.snapshot().len(), 1);

        // a cycle already in flight keeps running in the same epoch
        let in_flight = ExecutionState {
            stage: Some(Stage::Claim),
            current_relay: Some(addr(0x02)),
            current_factory: Some(addr(0xf2)),
            relays_queue: vec![addr(0x03)],
            is_auto_compounder: true,
            ..ExecutionState::default()
        };
        in_flight.save(&store).await.unwrap();
        pipeline.invoke().await;
        assert_eq!(store.snapshot()[OFFSET], "300");
    }

    #[tokio::test]
    async fn test_claim_pages_emit_batched_claims() {
        let chain = two_factory_chain();
        for i in 0..4u8 {
            chain.add_reward(RewardRecord { token: addr(0x70 + i), fee: addr(0xc0 + i), bribe: Address::ZERO });
        }
        chain.add_reward(RewardRecord { token: addr(0x77), fee: Address::ZERO, bribe: addr(0xb0) });
        chain.set_position(addr(0x01), U256::from(4242));
        let store = MemoryStore::new();
        let settings = settings();
        let pipeline = RelayPipeline::new(&chain, &store, &settings);

        let outcome = pipeline.invoke().await;
        assert!(outcome.can_execute);
        assert_eq!(outcome.transactions.len(), 3);
        assert!(outcome.transactions.iter().all(|tx| tx.to == addr(0x01)));

        let state = ExecutionState::load(&store).await.unwrap();
        assert_eq!(state.stage, Some(Stage::Claim));
        assert_eq!(state.claimed_tokens.len(), 5);
        assert_eq!(chain.reward_positions(), vec![U256::from(4242); chain.reward_calls()]);
        assert!(chain.reward_calls() > 0);
    }

    #[tokio::test]
    async fn test_swap_stage_one_token_per_invocation() {
        let usdc = addr(0x50);
        let op = addr(0x51);
        let velo = reward_token();

        let chain = MockChain::default();
        chain.set_timestamp(NOW);
        chain.set_high_liquidity(addr(0xf1), vec![usdc, op]);
        chain.add_pool(addr(0x90), usdc, velo, false);
        chain.add_pool(addr(0x91), op, velo, false);
        chain.add_relay(addr(0xf1), addr(0x01), velo);
        for token in [usdc, op] {
            chain.set_balance(token, addr(0x01), U256::from(1_000));
            chain.set_rate(
                crate::brain::Hop { from: token, to: velo, stable: false, factory: crate::chain::mock::MOCK_FACTORY },
                2,
                1,
            );
        }

        let store = MemoryStore::new();
        let in_swap = ExecutionState {
            stage: Some(Stage::Swap),
            current_relay: Some(addr(0x01)),
            current_factory: Some(addr(0xf1)),
            is_auto_compounder: true,
            ..ExecutionState::default()
        };
        in_swap.save(&store).await.unwrap();

        let settings = settings();
        let pipeline = RelayPipeline::new(&chain, &store, &settings);

        let first = pipeline.invoke().await;
        assert_eq!(first.transactions.len(), 1);
        let call = IRelay::swapTokenToVELOWithOptionalRouteCall::abi_decode(&first.transactions[0].data).unwrap();
        assert_eq!(call._tokenToSwap, usdc);
        assert_eq!(call._slippage, U256::from(200));

        let state = ExecutionState::load(&store).await.unwrap();
        assert_eq!(state.stage, Some(Stage::Swap));
        assert_eq!(state.tokens_queue, vec![op]);
        assert_eq!(state.balances_queue, vec![U256::from(1_000)]);

        // last token is bundled with compound and completes the relay
        let second = pipeline.invoke().await;
        assert_eq!(second.transactions.len(), 1);
        let multicall = IRelay::multicallCall::abi_decode(&second.transactions[0].data).unwrap();
        assert_eq!(multicall.data.len(), 2);
        assert_eq!(store.snapshot()[KEEPER_LAST_RUN], NOW.to_string());
    }

    #[tokio::test]
    async fn test_unquotable_tokens_fall_through_to_compound() {
        let chain = two_factory_chain();
        let stray = addr(0x66);
        chain.set_high_liquidity(addr(0xf1), vec![stray]);
        chain.set_balance(stray, addr(0x01), U256::from(10));
        chain.set_balance(reward_token(), addr(0x01), U256::from(10));

        let store = MemoryStore::new();
        ExecutionState {
            stage: Some(Stage::Swap),
            current_relay: Some(addr(0x01)),
            current_factory: Some(addr(0xf1)),
            factories_queue: vec![addr(0xf2)],
            is_auto_compounder: true,
            ..ExecutionState::default()
        }
        .save(&store)
        .await
        .unwrap();

        let settings = settings();
        let outcome = RelayPipeline::new(&chain, &store, &settings).invoke().await;

        assert_eq!(outcome.transactions.len(), 1);
        assert!(IRelay::compoundCall::abi_decode(&outcome.transactions[0].data).is_ok());
        let state = ExecutionState::load(&store).await.unwrap();
        assert_eq!(state.current_relay, Some(addr(0x02)));
        assert_eq!(state.relays_queue, vec![addr(0x03)]);
        assert_eq!(state.stage, Some(Stage::Claim));
    }

    #[tokio::test]
    async fn test_unquotable_tokens_take_one_invocation_each() {
        let chain = two_factory_chain();
        let strays = vec![addr(0x61), addr(0x62), addr(0x63)];
        chain.set_high_liquidity(addr(0xf1), strays.clone());
        for token in &strays {
            chain.set_balance(*token, addr(0x01), U256::from(10));
        }
        chain.set_balance(reward_token(), addr(0x01), U256::from(10));

        let store = MemoryStore::new();
        ExecutionState {
            stage: Some(Stage::Swap),
            current_relay: Some(addr(0x01)),
            current_factory: Some(addr(0xf1)),
            factories_queue: vec![addr(0xf2)],
            is_auto_compounder: true,
            ..ExecutionState::default()
        }
        .save(&store)
        .await
        .unwrap();

        let settings = settings();
        let pipeline = RelayPipeline::new(&chain, &store, &settings);

        for remaining in [2usize, 1] {
            let outcome = pipeline.invoke().await;
            assert!(!outcome.can_execute);
            assert!(outcome.transactions.is_empty());

            let state = ExecutionState::load(&store).await.unwrap();
            assert_eq!(state.stage, Some(Stage::Swap));
            assert_eq!(state.current_relay, Some(addr(0x01)));
            assert_eq!(state.tokens_queue, strays[strays.len() - remaining..].to_vec());
            assert!(store.snapshot().get(KEEPER_LAST_RUN).is_none());
        }

        // last token skipped: compound runs in the same invocation
        let outcome = pipeline.invoke().await;
        assert_eq!(outcome.transactions.len(), 1);
        assert!(IRelay::compoundCall::abi_decode(&outcome.transactions[0].data).is_ok());
        let state = ExecutionState::load(&store).await.unwrap();
        assert_eq!(state.current_relay, Some(addr(0x02)));
        assert_eq!(state.stage, Some(Stage::Claim));
    }

    #[tokio::test]
    async fn test_converter_relay_swaps_into_target() {
        let usdc = addr(0x50);
        let target = addr(0x44);

        let chain = MockChain::default();
        chain.set_timestamp(NOW);
        chain.add_relay(addr(0xf1), addr(0x01), target);
        chain.set_high_liquidity(addr(0xf1), vec![usdc, target]);
        chain.add_pool(addr(0x90), usdc, target, false);
        chain.set_balance(usdc, addr(0x01), U256::from(1_000));
        chain.set_balance(reward_token(), addr(0x01), U256::from(1_000));
        chain.set_rate(
            crate::brain::Hop { from: usdc, to: target, stable: false, factory: crate::chain::mock::MOCK_FACTORY },
            3,
            1,
        );

        let store = MemoryStore::new();
        ExecutionState {
            stage: Some(Stage::Swap),
            current_relay: Some(addr(0x01)),
            current_factory: Some(addr(0xf1)),
            is_auto_compounder: false,
            ..ExecutionState::default()
        }
        .save(&store)
        .await
        .unwrap();

        let settings = settings();
        let outcome = RelayPipeline::new(&chain, &store, &settings).invoke().await;

        assert_eq!(outcome.transactions.len(), 1);
        let tx = &outcome.transactions[0];
        assert_eq!(tx.to, addr(0x01));
        let call = IRelay::swapTokenToTokenWithOptionalRouteCall::abi_decode(&tx.data).unwrap();
        assert_eq!(call._tokenToSwap, usdc);
        assert_eq!(call._slippage, U256::from(settings.slippage.converter_bps));
        assert_eq!(call._slippage, U256::from(100));
        assert_eq!(call._optionalRoute.len(), 1);
        assert_eq!(call._optionalRoute[0].to, target);
        assert!(IRelay::multicallCall::abi_decode(&tx.data).is_err());
        assert!(IRelay::compoundCall::abi_decode(&tx.data).is_err());

        // converter completes without compounding and the cycle closes
        let values = store.snapshot();
        assert_eq!(values.len(), 1);
        assert_eq!(values[KEEPER_LAST_RUN], NOW.to_string());
    }

    #[tokio::test]
    async fn test_excluded_relay_keeps_reward_token() {
        let relay = settings().deployment.excluded_relays[0];
        let target = addr(0x44);
        let chain = MockChain::default();
        chain.set_timestamp(NOW);
        chain.add_relay(addr(0xf1), relay, target);
        chain.set_high_liquidity(addr(0xf1), vec![reward_token(), target]);
        chain.set_balance(reward_token(), relay, U256::from(10));

        let store = MemoryStore::new();
        ExecutionState {
            stage: Some(Stage::Swap),
            current_relay: Some(relay),
            current_factory: Some(addr(0xf1)),
            ..ExecutionState::default()
        }
        .save(&store)
        .await
        .unwrap();

        let settings = settings();
        let outcome = RelayPipeline::new(&chain, &store, &settings).invoke().await;

        assert!(outcome.transactions.is_empty());
        assert_eq!(store.snapshot()[KEEPER_LAST_RUN], NOW.to_string());
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let seed = [
            (CURR_STAGE, "claim".to_string()),
            (CURR_RELAY, addr(0x02).to_string()),
            (CURR_FACTORY, addr(0xf2).to_string()),
            (RELAYS_QUEUE, serde_json::to_string(&vec![addr(0x03)]).unwrap()),
            (IS_AUTO_COMPOUNDER, "true".to_string()),
        ];
        let chain = two_factory_chain();
        chain.add_reward(RewardRecord { token: addr(0x70), fee: addr(0xc0), bribe: Address::ZERO });
        let settings = settings();

        let store_a = MemoryStore::with_values(seed.clone());
        let store_b = MemoryStore::with_values(seed);
        let a = RelayPipeline::new(&chain, &store_a, &settings).invoke().await;
        let b = RelayPipeline::new(&chain, &store_b, &settings).invoke().await;

        assert_eq!(a, b);
        assert_eq!(store_a.snapshot(), store_b.snapshot());
    }

    #[tokio::test]
    async fn test_read_failure_leaves_state_untouched() {
        let chain = two_factory_chain();
        let store = MemoryStore::with_values([
            (CURR_STAGE, "claim".to_string()),
            (CURR_RELAY, addr(0x01).to_string()),
            (CURR_FACTORY, addr(0xf1).to_string()),
            (OFFSET, "100".to_string()),
        ]);
        let before = store.snapshot();
        chain.fail_all(true);

        let settings = settings();
        let outcome = RelayPipeline::new(&chain, &store, &settings).invoke().await;

        assert!(!outcome.can_execute);
        assert!(outcome.message.unwrap().starts_with("Rpc call failed"));
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn test_empty_registry_closes_cycle() {
        let chain = MockChain::default();
        chain.set_timestamp(NOW);
        let store = MemoryStore::new();
        let settings = settings();

        let outcome = RelayPipeline::new(&chain, &store, &settings).invoke().await;
        assert_eq!(outcome.message.as_deref(), Some("No relays to process"));
        assert_eq!(store.snapshot()[KEEPER_LAST_RUN], NOW.to_string());
    }
}
