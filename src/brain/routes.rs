//! Route Enumerator
//!
//! Step 2.1: The Pathfinder
//!
//! Enumerates every simple path between two tokens up to `max_hops`
//! edges. A node path is first collected as a list of edge groups (one
//! group per hop, holding every parallel pool for that step), then
//! expanded explicitly into one concrete route per combination.

use alloy_primitives::Address;
use indexmap::IndexMap;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::cartographer::{PoolEdge, PoolGraph};
use crate::chain::contracts::Route;

/// One swap step through a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hop {
    pub from: Address,
    pub to: Address,
    pub stable: bool,
    pub factory: Address,
}

impl Hop {
    /// ABI form used by the router and the relay swap functions
    pub fn to_route(&self) -> Route {
        Route {
            from: self.from,
            to: self.to,
            stable: self.stable,
            factory: self.factory,
        }
    }
}

/// Parallel edges towards one neighbour, in insertion order
type EdgeGroup = Vec<PoolEdge>;

pub struct RouteFinder<'a> {
    graph: &'a PoolGraph,
    max_hops: usize,
}

impl<'a> RouteFinder<'a> {
    pub fn new(graph: &'a PoolGraph, max_hops: usize) -> Self {
        Self { graph, max_hops }
    }

    /// All loop-free routes `from -> to`, unfiltered
    pub fn find_routes(&self, from: Address, to: Address) -> Vec<Vec<Hop>> {
        if self.graph.is_empty() || self.max_hops == 0 || from == to {
            return Vec::new();
        }
        let (Some(source), Some(target)) = (self.graph.get_node(from), self.graph.get_node(to)) else {
            return Vec::new();
        };

        let mut group_paths = Vec::new();
        let mut visited = HashSet::from([source]);
        self.dfs_group_paths(source, target, &mut Vec::new(), &mut visited, &mut group_paths);

        let routes: Vec<Vec<Hop>> = group_paths
            .iter()
            .flat_map(|groups| self.expand(groups))
            .collect();

        debug!(
            "{} node paths expanded into {} routes ({:?} -> {:?})",
            group_paths.len(),
            routes.len(),
            from,
            to
        );
        routes
    }

    /// Outgoing edges of a node grouped by neighbour
    fn neighbours(&self, node: NodeIndex) -> IndexMap<NodeIndex, EdgeGroup> {
        // petgraph yields outgoing edges newest first
        let mut edges: Vec<_> = self.graph.graph.edges(node).collect();
        edges.reverse();

        let mut groups: IndexMap<NodeIndex, EdgeGroup> = IndexMap::new();
        for edge in edges {
            groups.entry(edge.target()).or_default().push(*edge.weight());
        }
        groups
    }

    fn dfs_group_paths(
        &self,
        current: NodeIndex,
        target: NodeIndex,
        path: &mut Vec<EdgeGroup>,
        visited: &mut HashSet<NodeIndex>,
        out: &mut Vec<Vec<EdgeGroup>>,
    ) {
        for (next, group) in self.neighbours(current) {
            if next == target {
                let mut found = path.clone();
                found.push(group);
                out.push(found);
                continue;
            }
            if visited.contains(&next) || path.len() + 1 >= self.max_hops {
                continue;
            }

            visited.insert(next);
            path.push(group);
            self.dfs_group_paths(next, target, path, visited, out);
            path.pop();
            visited.remove(&next);
        }
    }

    /// Cross product of the parallel edges of each hop, edge-major
    fn expand(&self, groups: &[EdgeGroup]) -> Vec<Vec<Hop>> {
        let mut partial: Vec<Vec<Hop>> = Vec::new();

        for (index, group) in groups.iter().enumerate() {
            let mut next = Vec::new();
            for edge in group {
                let Some(hop) = self.graph.hop(edge) else {
                    continue;
                };
                if index == 0 {
                    next.push(vec![hop]);
                } else {
                    for prefix in &partial {
                        let mut route = prefix.clone();
                        route.push(hop);
                        next.push(route);
                    }
                }
            }
            partial = next;
        }
        partial
    }
}
