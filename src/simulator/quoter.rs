//! Route Quoter
//!
//! Prices every candidate route with the router's `getAmountsOut` for one
//! concrete input amount. Reads inside a chunk run concurrently; chunks
//! run one after another to keep the RPC load bounded.

use alloy_primitives::U256;
use futures::future::join_all;
use tracing::debug;

use crate::brain::Hop;
use crate::chain::RelayChain;

/// Priced route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub route: Vec<Hop>,
    pub amount_in: U256,
    pub amount_out: U256,
    /// Router amounts; index 0 is the input, one entry per hop after it
    pub amounts: Vec<U256>,
}

impl Quote {
    /// Input amount of every hop
    pub fn hop_inputs(&self) -> &[U256] {
        let hops = self.route.len().min(self.amounts.len());
        &self.amounts[..hops]
    }
}

pub struct RouteQuoter<'a> {
    chain: &'a dyn RelayChain,
    chunk_size: usize,
}

impl<'a> RouteQuoter<'a> {
    pub fn new(chain: &'a dyn RelayChain, chunk_size: usize) -> Self {
        Self {
            chain,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Quote every route. Failed reads and zero outputs are dropped;
    /// surviving quotes keep route order.
    pub async fn fetch_quotes(&self, routes: &[Vec<Hop>], amount_in: U256) -> Vec<Quote> {
        let mut quotes = Vec::new();

        for chunk in routes.chunks(self.chunk_size) {
            let results = join_all(
                chunk
                    .iter()
                    .map(|route| self.chain.amounts_out(amount_in, route)),
            )
            .await;

            for (route, result) in chunk.iter().zip(results) {
                let amounts = match result {
                    Ok(amounts) => amounts,
                    Err(e) => {
                        debug!("Quote failed for {}-hop route: {}", route.len(), e);
                        continue;
                    }
                };
                let Some(&amount_out) = amounts.last() else {
                    continue;
                };
                if amount_out.is_zero() {
                    continue;
                }
                quotes.push(Quote {
                    route: route.clone(),
                    amount_in,
                    amount_out,
                    amounts,
                });
            }
        }
        quotes
    }

    pub async fn best_quote(&self, routes: &[Vec<Hop>], amount_in: U256) -> Option<Quote> {
        let quotes = self.fetch_quotes(routes, amount_in).await;
        debug!("{} of {} routes quoted", quotes.len(), routes.len());
        select_best(quotes)
    }
}

/// Greatest output wins; on ties the later quote replaces the earlier one
pub fn select_best(quotes: Vec<Quote>) -> Option<Quote> {
    quotes
        .into_iter()
        .reduce(|best, quote| if best.amount_out > quote.amount_out { best } else { quote })
}
