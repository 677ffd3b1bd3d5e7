//! Route Filter
//!
//! Step 2.2: The Filter
//!
//! Keeps only routes whose every hop endpoint is a high-liquidity token or
//! one of the two swap endpoints, then caps the route count. Capping trims
//! the longest routes first and never drops a direct route.

use alloy_primitives::Address;
use std::collections::HashSet;
use tracing::debug;

use super::Hop;

pub struct RouteFilter {
    allowed: HashSet<Address>,
    max_routes: usize,
}

impl RouteFilter {
    pub fn new(allowed_intermediates: &[Address], from: Address, to: Address, max_routes: usize) -> Self {
        let mut allowed: HashSet<Address> = allowed_intermediates.iter().copied().collect();
        allowed.insert(from);
        allowed.insert(to);
        Self { allowed, max_routes }
    }

    pub fn is_allowed(&self, route: &[Hop]) -> bool {
        route
            .iter()
            .all(|hop| self.allowed.contains(&hop.from) && self.allowed.contains(&hop.to))
    }

    pub fn apply(&self, routes: Vec<Vec<Hop>>) -> Vec<Vec<Hop>> {
        let total = routes.len();
        let kept: Vec<Vec<Hop>> = routes.into_iter().filter(|r| self.is_allowed(r)).collect();
        let filtered = kept.len();
        let capped = cap_routes(kept, self.max_routes);

        debug!(
            "Routes: {} enumerated, {} through allowed tokens, {} after cap",
            total,
            filtered,
            capped.len()
        );
        capped
    }
}

/// Trim to `max_routes`, longest first (earliest of equal length first).
/// Direct routes are never removed, so the result may stay above the cap.
pub fn cap_routes(routes: Vec<Vec<Hop>>, max_routes: usize) -> Vec<Vec<Hop>> {
    if routes.len() <= max_routes {
        return routes;
    }
    let excess = routes.len() - max_routes;

    let mut candidates: Vec<(usize, usize)> = routes
        .iter()
        .enumerate()
        .filter(|(_, r)| r.len() > 1)
        .map(|(i, r)| (i, r.len()))
        .collect();
    candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let removed: HashSet<usize> = candidates.into_iter().take(excess).map(|(i, _)| i).collect();

    routes
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !removed.contains(i))
        .map(|(_, r)| r)
        .collect()
}
