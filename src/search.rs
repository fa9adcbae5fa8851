// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::{BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};

use crate::{NodeId, PhantomNode};

/// Result of a single shortest-path query: the ordered sequence of traversed
/// graph nodes and the total path cost.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPath {
    pub nodes: Vec<NodeId>,
    pub length: f32,
}

impl RawPath {
    /// The degenerate result signalling that no path was found.
    pub const NONE: Self = Self {
        nodes: Vec::new(),
        length: f32::INFINITY,
    };

    /// Returns whether this is a usable, non-degenerate path: at least one
    /// traversed node AND a finite total length. Checking only one half would
    /// silently accept a non-empty path with an unreachable cost, or an empty
    /// path with a zero cost.
    pub fn exists(&self) -> bool {
        !self.nodes.is_empty() && self.length.is_finite()
    }
}

/// A shortest-path backend over one partition's routing graph.
///
/// Implementations receive resolved [phantom nodes](PhantomNode) and are free
/// to use any search strategy; the router only relies on
/// [RawPath::exists] to tell success from failure. The crate's default
/// backend is [TileGraph].
pub trait PathOracle {
    /// Finds the cheapest path between two phantom nodes.
    /// Returns [RawPath::NONE] (or any other degenerate path) when the two
    /// endpoints are not connected.
    fn find_path(&self, source: &PhantomNode, target: &PhantomNode) -> RawPath;
}

/// An outgoing connection of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub to: NodeId,
    pub weight: f32,
}

/// The precomputed weighted search graph of a single partition.
///
/// Nodes are directed: a two-way road contributes two nodes, one per travel
/// direction. The bundled [PathOracle] implementation runs Dijkstra's
/// algorithm from both entry directions of the source phantom node at once;
/// there is no distance heuristic, as the abstract edge weights carry no
/// coordinates.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileGraph {
    edges: HashMap<NodeId, Vec<GraphEdge>>,
}

impl TileGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or updates an edge from a node.
    pub fn add_edge(&mut self, from: NodeId, edge: GraphEdge) {
        let edges = self.edges.entry(from).or_default();
        if let Some(existing) = edges.iter_mut().find(|e| e.to == edge.to) {
            *existing = edge;
        } else {
            edges.push(edge);
        }
    }

    /// All outgoing edges of a node.
    pub fn edges(&self, from: NodeId) -> &[GraphEdge] {
        self.edges
            .get(&from)
            .map(|e| e.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy)]
struct QueueItem {
    at: NodeId,
    cost: f32,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.cost.eq(&other.cost)
    }
}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        // NOTE: We revert the order of comparison,
        // as lower costs are considered better ("higher"),
        // and Rust's BinaryHeap is a max-heap.
        other.cost.partial_cmp(&self.cost)
    }
}

impl Eq for QueueItem {}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.partial_cmp(self).unwrap()
    }
}

fn reconstruct_nodes(came_from: &HashMap<NodeId, NodeId>, mut last: NodeId) -> Vec<NodeId> {
    let mut path = vec![last];

    while let Some(&nd) = came_from.get(&last) {
        path.push(nd);
        last = nd;
    }

    path.reverse();
    return path;
}

impl PathOracle for TileGraph {
    fn find_path(&self, source: &PhantomNode, target: &PhantomNode) -> RawPath {
        let targets = [target.forward, target.reverse];

        let mut queue: BinaryHeap<QueueItem> = BinaryHeap::default();
        let mut came_from: HashMap<NodeId, NodeId> = HashMap::default();
        let mut known_costs: HashMap<NodeId, f32> = HashMap::default();

        // Both entry directions of the source are equally good starting points.
        for entry in [source.forward, source.reverse].into_iter().flatten() {
            queue.push(QueueItem {
                at: entry,
                cost: 0.0,
            });
            known_costs.insert(entry, 0.0);
        }

        while let Some(item) = queue.pop() {
            if targets.contains(&Some(item.at)) {
                return RawPath {
                    nodes: reconstruct_nodes(&came_from, item.at),
                    length: item.cost,
                };
            }

            // Contrary to the textbook definition, we might keep multiple items in the queue for the same node.
            if item.cost > known_costs.get(&item.at).cloned().unwrap_or(f32::INFINITY) {
                continue;
            }

            for &GraphEdge {
                to: neighbor,
                weight,
            } in self.edges(item.at)
            {
                // Check if this is the cheapest way to the neighbor
                let neighbor_cost = item.cost + weight;
                if neighbor_cost
                    > known_costs
                        .get(&neighbor)
                        .cloned()
                        .unwrap_or(f32::INFINITY)
                {
                    continue;
                }

                came_from.insert(neighbor, item.at);
                known_costs.insert(neighbor, neighbor_cost);
                queue.push(QueueItem {
                    at: neighbor,
                    cost: neighbor_cost,
                });
            }
        }

        return RawPath::NONE;
    }
}
