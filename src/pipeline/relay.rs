//! Relay kinds
//!
//! Auto-compounders convert everything into the native reward token and
//! finish with `compound()`. Auto-converters swap into their own target
//! token and have no compound step.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::state::Stage;
use crate::brain::Hop;
use crate::chain::contracts::IRelay;
use crate::chain::RelayChain;
use crate::simulator::SlippagePolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayKind {
    AutoCompounder,
    AutoConverter,
}

impl fmt::Display for RelayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayKind::AutoCompounder => write!(f, "AutoCompounder"),
            RelayKind::AutoConverter => write!(f, "AutoConverter"),
        }
    }
}

impl RelayKind {
    pub fn classify(target_token: Address, reward_token: Address) -> Self {
        if target_token == reward_token {
            RelayKind::AutoCompounder
        } else {
            RelayKind::AutoConverter
        }
    }

    pub fn from_flag(is_auto_compounder: bool) -> Self {
        if is_auto_compounder {
            RelayKind::AutoCompounder
        } else {
            RelayKind::AutoConverter
        }
    }

    pub fn is_compounder(&self) -> bool {
        matches!(self, RelayKind::AutoCompounder)
    }

    /// `swapTokenTo<Target>WithOptionalRoute(token, slippage, route)`
    pub fn encode_swap(&self, token: Address, slippage_bps: u64, route: &[Hop]) -> Bytes {
        let slippage = U256::from(slippage_bps);
        let route = route.iter().map(Hop::to_route).collect();
        let data = match self {
            RelayKind::AutoCompounder => IRelay::swapTokenToVELOWithOptionalRouteCall {
                _tokenToSwap: token,
                _slippage: slippage,
                _optionalRoute: route,
            }
            .abi_encode(),
            RelayKind::AutoConverter => IRelay::swapTokenToTokenWithOptionalRouteCall {
                _tokenToSwap: token,
                _slippage: slippage,
                _optionalRoute: route,
            }
            .abi_encode(),
        };
        Bytes::from(data)
    }

    /// Calldata of the last swap. Compounders bundle it with `compound()`
    /// and are done in the same transaction.
    pub fn finalize_last_swap(&self, swap: Bytes) -> (Bytes, Stage) {
        match self {
            RelayKind::AutoCompounder => {
                let multicall = IRelay::multicallCall {
                    data: vec![swap, encode_compound()],
                };
                (Bytes::from(multicall.abi_encode()), Stage::Complete)
            }
            RelayKind::AutoConverter => (swap, Stage::Complete),
        }
    }

    /// Stage once the token queue is drained without a final swap
    pub fn stage_after_swaps(&self) -> Stage {
        match self {
            RelayKind::AutoCompounder => Stage::Compound,
            RelayKind::AutoConverter => Stage::Complete,
        }
    }

    pub fn low_slippage_bps(&self, policy: &SlippagePolicy) -> u64 {
        match self {
            RelayKind::AutoCompounder => policy.compounder_bps,
            RelayKind::AutoConverter => policy.converter_bps,
        }
    }
}

pub fn encode_compound() -> Bytes {
    Bytes::from(IRelay::compoundCall {}.abi_encode())
}

/// Relay being processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relay {
    pub address: Address,
    pub factory: Address,
    pub target_token: Address,
    pub kind: RelayKind,
}

impl Relay {
    /// Read the relay's target token and classify it
    pub async fn load(chain: &dyn RelayChain, address: Address, factory: Address, reward_token: Address) -> Result<Self> {
        let target_token = chain.relay_token(address).await?;
        Ok(Self {
            address,
            factory,
            target_token,
            kind: RelayKind::classify(target_token, reward_token),
        })
    }

    /// Rebuild from persisted state; compounders target the reward token
    pub async fn resume(
        chain: &dyn RelayChain,
        address: Address,
        factory: Address,
        is_auto_compounder: bool,
        reward_token: Address,
    ) -> Result<Self> {
        let kind = RelayKind::from_flag(is_auto_compounder);
        let target_token = match kind {
            RelayKind::AutoCompounder => reward_token,
            RelayKind::AutoConverter => chain.relay_token(address).await?,
        };
        Ok(Self {
            address,
            factory,
            target_token,
            kind,
        })
    }
}
