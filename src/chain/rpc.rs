//! `RelayChain` over JSON-RPC
//!
//! Plain `eth_call`s with `sol!`-generated calldata; nothing is signed.

use alloy_eips::BlockNumberOrTag;
use alloy_network::Ethereum;
use alloy_primitives::{Address, Bytes, U256};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use eyre::{eyre, Result};
use tracing::debug;

use super::contracts::{
    IRelay, IRelayFactory, IRelayRegistry, IRouter, ILibrary, ILpSugar, IVoter, IERC20,
};
use super::RelayChain;
use crate::brain::Hop;
use crate::cartographer::Pool;
use crate::executor::TxData;
use crate::rewards::RewardRecord;
use crate::tokens::Deployment;

pub struct RpcChain {
    provider: RootProvider<Ethereum>,
    lp_sugar: Address,
    router: Address,
}

impl RpcChain {
    pub fn new(rpc_url: &str, deployment: &Deployment) -> Result<Self> {
        let provider = RootProvider::<Ethereum>::new_http(rpc_url.parse()?);
        Ok(Self {
            provider,
            lp_sugar: deployment.lp_sugar,
            router: deployment.router,
        })
    }

    async fn call_contract(&self, to: Address, calldata: Vec<u8>) -> Result<Bytes> {
        let tx = TransactionRequest::default()
            .to(to)
            .input(calldata.into());

        self.provider
            .call(tx)
            .await
            .map_err(|e| eyre!("eth_call to {} failed: {}", to, e))
    }
}

#[async_trait]
impl RelayChain for RpcChain {
    async fn latest_timestamp(&self) -> Result<u64> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await?
            .ok_or_else(|| eyre!("Latest block not available"))?;
        Ok(block.header.timestamp)
    }

    async fn factories(&self, registry: Address) -> Result<Vec<Address>> {
        let out = self
            .call_contract(registry, IRelayRegistry::getAllCall {}.abi_encode())
            .await?;
        Ok(IRelayRegistry::getAllCall::abi_decode_returns(&out)?)
    }

    async fn relays(&self, factory: Address) -> Result<Vec<Address>> {
        let out = self
            .call_contract(factory, IRelayFactory::relaysCall {}.abi_encode())
            .await?;
        Ok(IRelayFactory::relaysCall::abi_decode_returns(&out)?)
    }

    async fn high_liquidity_tokens(&self, factory: Address) -> Result<Vec<Address>> {
        let out = self
            .call_contract(factory, IRelayFactory::highLiquidityTokensCall {}.abi_encode())
            .await?;
        Ok(IRelayFactory::highLiquidityTokensCall::abi_decode_returns(&out)?)
    }

    async fn relay_token(&self, relay: Address) -> Result<Address> {
        let out = self
            .call_contract(relay, IRelay::tokenCall {}.abi_encode())
            .await?;
        Ok(IRelay::tokenCall::abi_decode_returns(&out)?)
    }

    async fn relay_position(&self, relay: Address) -> Result<U256> {
        let out = self
            .call_contract(relay, IRelay::mTokenIdCall {}.abi_encode())
            .await?;
        Ok(IRelay::mTokenIdCall::abi_decode_returns(&out)?)
    }

    async fn rewards(&self, limit: u64, offset: u64, position: U256) -> Result<Vec<RewardRecord>> {
        let calldata = ILpSugar::rewardsCall {
            _limit: U256::from(limit),
            _offset: U256::from(offset),
            _venft_id: position,
        }
        .abi_encode();
        let out = self.call_contract(self.lp_sugar, calldata).await?;
        let rows = ILpSugar::rewardsCall::abi_decode_returns(&out)?;

        debug!("rewards({}, {}) returned {} rows", limit, offset, rows.len());
        Ok(rows
            .into_iter()
            .map(|r| RewardRecord {
                token: r.token,
                fee: r.fee,
                bribe: r.bribe,
            })
            .collect())
    }

    async fn pools(&self, limit: u64, offset: u64) -> Result<Vec<Pool>> {
        let calldata = ILpSugar::forSwapsCall {
            _limit: U256::from(limit),
            _offset: U256::from(offset),
        }
        .abi_encode();
        let out = self.call_contract(self.lp_sugar, calldata).await?;
        let rows = ILpSugar::forSwapsCall::abi_decode_returns(&out)?;

        Ok(rows
            .into_iter()
            .map(|lp| Pool {
                address: lp.lp,
                token0: lp.token0,
                token1: lp.token1,
                stable: lp.stable,
                factory: lp.factory,
            })
            .collect())
    }

    async fn amounts_out(&self, amount_in: U256, route: &[Hop]) -> Result<Vec<U256>> {
        let calldata = IRouter::getAmountsOutCall {
            amountIn: amount_in,
            routes: route.iter().map(Hop::to_route).collect(),
        }
        .abi_encode();
        let out = self.call_contract(self.router, calldata).await?;
        Ok(IRouter::getAmountsOutCall::abi_decode_returns(&out)?)
    }

    async fn trade_diff(&self, library: Address, amount_in: U256, hop: &Hop) -> Result<(U256, U256)> {
        let calldata = ILibrary::getTradeDiffCall {
            amountIn: amount_in,
            tokenIn: hop.from,
            tokenOut: hop.to,
            stable: hop.stable,
            factory: hop.factory,
        }
        .abi_encode();
        let out = self.call_contract(library, calldata).await?;
        let diff = ILibrary::getTradeDiffCall::abi_decode_returns(&out)?;
        Ok((diff.a, diff.b))
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256> {
        let out = self
            .call_contract(token, IERC20::balanceOfCall { account: owner }.abi_encode())
            .await?;
        Ok(IERC20::balanceOfCall::abi_decode_returns(&out)?)
    }

    async fn voter_length(&self, voter: Address) -> Result<u64> {
        let out = self
            .call_contract(voter, IVoter::lengthCall {}.abi_encode())
            .await?;
        let length = IVoter::lengthCall::abi_decode_returns(&out)?;
        Ok(length.saturating_to::<u64>())
    }

    async fn simulate(&self, from: Address, tx: &TxData) -> Result<Bytes> {
        let request = TransactionRequest::default()
            .from(from)
            .to(tx.to)
            .input(tx.data.clone().into());

        self.provider
            .call(request)
            .await
            .map_err(|e| eyre!("{}", e))
    }
}
