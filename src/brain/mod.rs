//! Phase 2: The Brain
//!
//! Responsible for:
//! - Enumerating multi-hop swap routes over the pool graph
//! - Keeping only routes through high-liquidity tokens, capped in number

mod filter;
mod routes;

pub use filter::{cap_routes, RouteFilter};
pub use routes::{Hop, RouteFinder};

use alloy_primitives::Address;

use crate::cartographer::PoolGraph;

/// Enumerate, filter and cap the routes `from -> to`
pub fn get_routes(
    graph: &PoolGraph,
    from: Address,
    to: Address,
    high_liquidity_tokens: &[Address],
    max_hops: usize,
    max_routes: usize,
) -> Vec<Vec<Hop>> {
    let routes = RouteFinder::new(graph, max_hops).find_routes(from, to);
    RouteFilter::new(high_liquidity_tokens, from, to, max_routes).apply(routes)
}
