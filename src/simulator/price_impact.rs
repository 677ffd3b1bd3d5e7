//! Price Impact
//!
//! Multiplies the per-hop trade-invariant ratio `b / a` reported by the
//! protocol library into a single 18-decimal fixed point ratio. A hop with
//! `a == 0` forces the ratio to zero, i.e. maximal impact. The result picks
//! the slippage tier passed into the swap call.

use alloy_primitives::{Address, U256};
use eyre::Result;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Quote;
use crate::chain::RelayChain;

/// 1.0 in 18-decimal fixed point
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Slippage tiers in basis points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlippagePolicy {
    /// Impact above this percentage selects the high tier
    pub max_impact_pct: f64,
    pub compounder_bps: u64,
    pub converter_bps: u64,
    pub high_bps: u64,
}

impl Default for SlippagePolicy {
    fn default() -> Self {
        Self {
            max_impact_pct: 0.5,
            compounder_bps: 200,
            converter_bps: 100,
            high_bps: 500,
        }
    }
}

impl SlippagePolicy {
    /// Threshold as an 18-decimal percentage, so 0.5% is `5e17`
    pub fn threshold_wad(&self) -> U256 {
        let micros = (self.max_impact_pct.max(0.0) * 1_000_000.0).round() as u64;
        U256::from(micros) * U256::from(1_000_000_000_000u64)
    }
}

/// `ratio * b / a` for every hop, zero once any `a` is zero
pub fn accumulate_ratio(diffs: &[(U256, U256)]) -> U256 {
    let mut ratio = WAD;
    for &(a, b) in diffs {
        if a.is_zero() {
            ratio = U256::ZERO;
        } else {
            ratio = ratio.saturating_mul(b) / a;
        }
    }
    ratio
}

/// Impact `(1 - ratio) * 100` compared against an 18-decimal threshold.
/// A ratio above one is a favourable trade and never too high.
pub fn impact_exceeds(ratio: U256, threshold_wad: U256) -> bool {
    if ratio >= WAD {
        return false;
    }
    (WAD - ratio).saturating_mul(U256::from(100)) > threshold_wad
}

pub struct ImpactEvaluator<'a> {
    chain: &'a dyn RelayChain,
    library: Option<Address>,
    policy: SlippagePolicy,
}

impl<'a> ImpactEvaluator<'a> {
    pub fn new(chain: &'a dyn RelayChain, library: Option<Address>, policy: SlippagePolicy) -> Self {
        Self { chain, library, policy }
    }

    /// Accumulated ratio of a quote, hop reads fanned out
    pub async fn ratio(&self, library: Address, quote: &Quote) -> Result<U256> {
        let inputs = quote.hop_inputs();
        let results = join_all(
            quote
                .route
                .iter()
                .zip(inputs)
                .map(|(hop, &amount)| self.chain.trade_diff(library, amount, hop)),
        )
        .await;

        let diffs = results.into_iter().collect::<Result<Vec<_>>>()?;
        Ok(accumulate_ratio(&diffs))
    }

    /// Slippage in bps for a quote.
    ///
    /// `low_bps` applies when the impact is within the threshold or when the
    /// destination is itself a high-liquidity token. Without a library the
    /// impact cannot be measured and the high tier applies.
    pub async fn slippage_bps(&self, quote: &Quote, low_bps: u64, destination_is_high_liquidity: bool) -> Result<u64> {
        if destination_is_high_liquidity {
            return Ok(low_bps);
        }
        let Some(library) = self.library else {
            return Ok(self.policy.high_bps);
        };

        let ratio = self.ratio(library, quote).await?;
        let too_high = impact_exceeds(ratio, self.policy.threshold_wad());
        debug!("Trade ratio {} (impact too high: {})", ratio, too_high);

        Ok(if too_high { self.policy.high_bps } else { low_bps })
    }
}
