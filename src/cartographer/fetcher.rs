//! Pool snapshot fetcher
//!
//! Pulls the `forSwaps` view of the sugar contract in fixed-size pages.
//! Pages are requested concurrently and joined before the graph is built;
//! nothing is cached between runs.

use alloy_primitives::Address;
use eyre::Result;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

use crate::chain::RelayChain;

/// Tradeable pool as reported by the sugar view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pool {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub stable: bool,
    pub factory: Address,
}

/// How much of the pool set is read per run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub total: u64,
    pub page_size: u64,
}

impl Default for PoolSnapshot {
    fn default() -> Self {
        Self {
            total: 600,
            page_size: 75,
        }
    }
}

impl PoolSnapshot {
    /// `(limit, offset)` of every page, in offset order
    pub fn pages(&self) -> Vec<(u64, u64)> {
        if self.page_size == 0 {
            return Vec::new();
        }
        (0..self.total)
            .step_by(self.page_size as usize)
            .map(|offset| ((offset + self.page_size).min(self.total) - offset, offset))
            .collect()
    }
}

pub struct PoolFetcher<'a> {
    chain: &'a dyn RelayChain,
    snapshot: PoolSnapshot,
}

impl<'a> PoolFetcher<'a> {
    pub fn new(chain: &'a dyn RelayChain, snapshot: PoolSnapshot) -> Self {
        Self { chain, snapshot }
    }

    /// Fetch every page; any failing page fails the snapshot
    pub async fn fetch_all_pools(&self) -> Result<Vec<Pool>> {
        let start = Instant::now();
        let pages = self.snapshot.pages();

        let results = join_all(
            pages
                .iter()
                .map(|&(limit, offset)| self.chain.pools(limit, offset)),
        )
        .await;

        let mut pools = Vec::new();
        for (result, (limit, offset)) in results.into_iter().zip(&pages) {
            let page = result?;
            debug!("forSwaps({}, {}) -> {} pools", limit, offset, page.len());
            pools.extend(page);
        }

        info!(
            "Fetched {} pools in {} pages ({:?})",
            pools.len(),
            pages.len(),
            start.elapsed()
        );
        Ok(pools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;

    #[test]
    fn test_snapshot_pages() {
        let pages = PoolSnapshot::default().pages();
        assert_eq!(pages.len(), 8);
        assert_eq!(pages[0], (75, 0));
        assert_eq!(pages[7], (75, 525));

        let uneven = PoolSnapshot { total: 100, page_size: 75 };
        assert_eq!(uneven.pages(), vec![(75, 0), (25, 75)]);
    }

    #[tokio::test]
    async fn test_fetch_all_pools_joins_pages() {
        let chain = MockChain::default();
        for i in 0..5u8 {
            chain.add_pool(Address::repeat_byte(0x10 + i), Address::repeat_byte(1), Address::repeat_byte(2), false);
        }

        let fetcher = PoolFetcher::new(&chain, PoolSnapshot { total: 6, page_size: 2 });
        let pools = fetcher.fetch_all_pools().await.unwrap();

        assert_eq!(pools.len(), 5);
        assert_eq!(pools[0].address, Address::repeat_byte(0x10));
        assert_eq!(pools[4].address, Address::repeat_byte(0x14));
    }

    #[tokio::test]
    async fn test_fetch_fails_when_a_page_fails() {
        let chain = MockChain::default();
        chain.fail_pools(true);

        let fetcher = PoolFetcher::new(&chain, PoolSnapshot::default());
        assert!(fetcher.fetch_all_pools().await.is_err());
    }
}
