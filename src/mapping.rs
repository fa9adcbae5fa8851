// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{NodeId, NodePair, SegmentSpan};

/// Persisted decomposition of one graph node into feature polyline spans,
/// in traversal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSegments {
    pub node: NodeId,
    pub spans: Vec<SegmentSpan>,
}

/// The correspondence table between feature polyline segments and graph nodes.
///
/// Built once per loaded partition from the persisted [NodeSegments] list.
/// Supports both directions of lookup: a single point-pair segment resolves
/// to the [NodePair] covering it ([SegmentMap::node_pair]), and a graph node
/// expands back into its ordered spans ([SegmentMap::spans_of]).
#[derive(Debug, Default, Clone)]
pub struct SegmentMap {
    /// Unit segment -> node covering it in ascending point order.
    forward: HashMap<(u32, u32), NodeId>,

    /// Unit segment -> node covering it in descending point order.
    reverse: HashMap<(u32, u32), NodeId>,

    by_node: HashMap<NodeId, Vec<SegmentSpan>>,
}

impl SegmentMap {
    /// Builds the two-way lookup table from the persisted per-node span lists.
    ///
    /// Each span is unrolled into its unit segments: an ascending span exposes
    /// its node as the forward direction of every covered segment, a
    /// descending span as the reverse direction.
    pub fn from_node_segments(items: Vec<NodeSegments>) -> Self {
        let mut map = Self::default();

        for item in items {
            for span in &item.spans {
                let (low, high) = span.point_range();
                for segment_idx in low..high {
                    let key = (span.feature_id, segment_idx);
                    if span.is_ascending() {
                        map.forward.insert(key, item.node);
                    } else {
                        map.reverse.insert(key, item.node);
                    }
                }
            }
            map.by_node.insert(item.node, item.spans);
        }

        map
    }

    /// Resolves the ascending unit segment `segment_idx..segment_idx + 1` of a
    /// feature into the pair of directed nodes covering it. Directions not
    /// exposed in the graph stay unset.
    pub fn node_pair(&self, feature_id: u32, segment_idx: u32) -> NodePair {
        let key = (feature_id, segment_idx);
        NodePair {
            forward: self.forward.get(&key).copied(),
            reverse: self.reverse.get(&key).copied(),
        }
    }

    /// The ordered spans a graph node decomposes into, or an empty slice for
    /// nodes absent from the mapping.
    pub fn spans_of(&self, node: NodeId) -> &[SegmentSpan] {
        self.by_node
            .get(&node)
            .map(|spans| spans.as_slice())
            .unwrap_or_default()
    }

    /// The number of graph nodes present in the table.
    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }
}
