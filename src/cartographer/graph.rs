//! Pool Graph
//!
//! Directed multigraph keyed by token address. Every pool contributes a
//! forward edge `token0 -> token1` and a reversed edge `token1 -> token0`,
//! each keyed by `(direction, pool)` so parallel pools between the same
//! pair stay distinct.

use alloy_primitives::Address;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use std::collections::HashMap;
use tracing::info;

use super::Pool;
use crate::brain::Hop;

/// Which way an edge traverses its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Reversed,
}

/// Edge data in the pool graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolEdge {
    pub pool: Address,
    pub direction: Direction,
}

pub struct PoolGraph {
    pub graph: DiGraph<Address, PoolEdge>,
    pub token_to_node: HashMap<Address, NodeIndex>,
    edge_keys: HashMap<(Direction, Address), EdgeIndex>,
    pools_by_address: HashMap<Address, Pool>,
}

impl PoolGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            token_to_node: HashMap::new(),
            edge_keys: HashMap::new(),
            pools_by_address: HashMap::new(),
        }
    }

    pub fn from_pools(pools: &[Pool]) -> Self {
        let mut graph = Self::new();
        for pool in pools {
            graph.add_pool(pool);
        }

        info!(
            "Pool graph built: {} Nodes, {} Edges, {} Pools",
            graph.graph.node_count(),
            graph.graph.edge_count(),
            graph.pools_by_address.len()
        );
        graph
    }

    /// Add both edges of a pool. A pool seen twice keeps its edges and
    /// takes the latest record.
    pub fn add_pool(&mut self, pool: &Pool) {
        let node0 = self.get_or_create_node(pool.token0);
        let node1 = self.get_or_create_node(pool.token1);

        for (direction, from, to) in [
            (Direction::Forward, node0, node1),
            (Direction::Reversed, node1, node0),
        ] {
            let key = (direction, pool.address);
            if self.edge_keys.contains_key(&key) {
                continue;
            }
            let edge = self.graph.add_edge(
                from,
                to,
                PoolEdge {
                    pool: pool.address,
                    direction,
                },
            );
            self.edge_keys.insert(key, edge);
        }

        self.pools_by_address.insert(pool.address, *pool);
    }

    fn get_or_create_node(&mut self, token: Address) -> NodeIndex {
        if let Some(&node) = self.token_to_node.get(&token) {
            return node;
        }

        let node = self.graph.add_node(token);
        self.token_to_node.insert(token, node);
        node
    }

    pub fn get_node(&self, token: Address) -> Option<NodeIndex> {
        self.token_to_node.get(&token).copied()
    }

    pub fn get_pool(&self, address: Address) -> Option<&Pool> {
        self.pools_by_address.get(&address)
    }

    pub fn edge(&self, direction: Direction, pool: Address) -> Option<EdgeIndex> {
        self.edge_keys.get(&(direction, pool)).copied()
    }

    /// Swap hop described by an edge; reversed edges swap `from` and `to`
    pub fn hop(&self, edge: &PoolEdge) -> Option<Hop> {
        let pool = self.pools_by_address.get(&edge.pool)?;
        let (from, to) = match edge.direction {
            Direction::Forward => (pool.token0, pool.token1),
            Direction::Reversed => (pool.token1, pool.token0),
        };
        Some(Hop {
            from,
            to,
            stable: pool.stable,
            factory: pool.factory,
        })
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.edge_count() == 0
    }
}

impl Default for PoolGraph {
    fn default() -> Self {
        Self::new()
    }
}
