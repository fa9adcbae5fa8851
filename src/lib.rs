// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Point-to-point routing over precomputed, partition-scoped road graphs.
//!
//! Map data is split into self-contained geographic partitions, each holding
//! road feature geometry, a precomputed weighted search graph and the
//! correspondence table between the two. Given a start and a destination
//! coordinate (in projected map units), the [Router] projects both onto the
//! nearest eligible road segments ("phantom nodes"), runs a shortest-path
//! query over the partition's graph, and reconstructs the traveled polyline,
//! correcting the partial first and last segments to the exact projections.
//! Routes never span partitions.
//!
//! The search backend and the data stores are capability traits
//! ([PathOracle], [FeatureSource], [RoutingSource]); the crate ships a
//! Dijkstra backend over the stored graph and file-based ([DirectoryStore])
//! plus in-memory ([MemoryStore]) stores.
//!
//! # Example
//!
//! ```no_run
//! use tileroute::{DirectoryStore, Point, Router};
//!
//! let mut router = Router::new(
//!     DirectoryStore::new("path/to/tiles"),
//!     DirectoryStore::new("path/to/tiles"),
//!     |_: &Point| "andorra".to_string(),
//! );
//!
//! router.set_destination(Point::new(1845.2, 752.9));
//! router.calculate_route(Point::new(1843.7, 751.4), |result| match result {
//!     Ok(route) => println!("route with {} points", route.geometry().len()),
//!     Err(e) => eprintln!("routing failed: {}", e),
//! });
//! ```

mod container;
mod feature;
mod geometry;
mod mapping;
mod matcher;
mod router;
mod search;

pub use container::{
    DataError, DirectoryStore, MemoryStore, RoutingData, RoutingSource, TileData, DATA_EXTENSION,
    ROUTING_EXTENSION,
};
pub use feature::{Feature, FeatureIndex, FeatureKind, FeatureSource};
pub use geometry::{project_to_segment, Point, Rect};
pub use mapping::{NodeSegments, SegmentMap};
pub use matcher::{nearby_candidates, resolve_candidates, Candidate, MAX_CANDIDATES, SEARCH_RADIUS};
pub use router::{Route, RouteError, Router};
pub use search::{GraphEdge, PathOracle, RawPath, TileGraph};

use serde::{Deserialize, Serialize};

/// Identifier of a directed node in a partition's precomputed search graph.
pub type NodeId = u32;

/// A directed sub-range of a road feature's polyline.
///
/// `start > end` means the feature is traversed backward. Candidate spans
/// produced while matching are always single point-pair ranges stored
/// ascending; spans persisted in the [SegmentMap] may cover any range in
/// either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentSpan {
    pub feature_id: u32,
    pub start: u32,
    pub end: u32,
}

impl SegmentSpan {
    /// The ascending unit span covering points `segment_idx` and `segment_idx + 1`.
    pub const fn unit(feature_id: u32, segment_idx: u32) -> Self {
        Self {
            feature_id,
            start: segment_idx,
            end: segment_idx + 1,
        }
    }

    pub fn is_ascending(&self) -> bool {
        self.end > self.start
    }

    /// The covered point indices as an (inclusive) low-to-high range,
    /// regardless of traversal direction.
    pub fn point_range(&self) -> (u32, u32) {
        (self.start.min(self.end), self.start.max(self.end))
    }

    /// Checks whether two spans share at least one point of the same feature.
    pub fn intersects(&self, other: &SegmentSpan) -> bool {
        if self.feature_id != other.feature_id {
            return false;
        }
        let (a_min, a_max) = self.point_range();
        let (b_min, b_max) = other.point_range();
        a_min <= b_max && b_min <= a_max
    }
}

/// The pair of directed graph nodes a road segment corresponds to.
///
/// Either side may be absent when the segment's traversal direction is not
/// exposed in the graph (one-way roads).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodePair {
    pub forward: Option<NodeId>,
    pub reverse: Option<NodeId>,
}

/// A synthetic search endpoint: an arbitrary coordinate projected onto a
/// nearby road segment, resolved into graph-space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhantomNode {
    pub forward: Option<NodeId>,
    pub reverse: Option<NodeId>,

    /// The matched unit span the projection lies on.
    pub span: SegmentSpan,

    /// The exact projected coordinate.
    pub point: Point,
}

impl PhantomNode {
    /// A phantom node is usable as a search endpoint only if the underlying
    /// segment exposes at least one traversal direction in the graph.
    pub fn is_valid(&self) -> bool {
        self.forward.is_some() || self.reverse.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_intersects() {
        let whole = SegmentSpan {
            feature_id: 7,
            start: 0,
            end: 5,
        };
        let backward = SegmentSpan {
            feature_id: 7,
            start: 5,
            end: 2,
        };

        assert!(whole.intersects(&SegmentSpan::unit(7, 2)));
        assert!(whole.intersects(&backward));
        assert!(backward.intersects(&SegmentSpan::unit(7, 4)));

        // Touching at a single shared point still counts.
        assert!(whole.intersects(&SegmentSpan {
            feature_id: 7,
            start: 5,
            end: 9,
        }));

        assert!(!whole.intersects(&SegmentSpan::unit(8, 2)));
        assert!(!whole.intersects(&SegmentSpan {
            feature_id: 7,
            start: 6,
            end: 9,
        }));
    }

    #[test]
    fn phantom_node_validity() {
        let mut node = PhantomNode {
            forward: None,
            reverse: None,
            span: SegmentSpan::unit(1, 0),
            point: Point::new(0.0, 0.0),
        };
        assert!(!node.is_valid());

        node.forward = Some(4);
        assert!(node.is_valid());

        node.forward = None;
        node.reverse = Some(9);
        assert!(node.is_valid());
    }
}
