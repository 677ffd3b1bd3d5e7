//! Phase 3: The Simulator
//!
//! Responsible for:
//! - Quoting candidate routes on-chain and picking the best one
//! - Measuring price impact of the chosen route to pick a slippage tier

mod price_impact;
mod quoter;

pub use price_impact::{accumulate_ratio, impact_exceeds, ImpactEvaluator, SlippagePolicy, WAD};
pub use quoter::{select_best, Quote, RouteQuoter};
