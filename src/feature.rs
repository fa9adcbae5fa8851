// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::HashMap;

use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

use crate::container::DataError;
use crate::geometry::{Point, Rect};

/// Geometry class of a stored map feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureKind {
    Point,
    Line,
    Area,
}

/// A single map feature of a partition.
///
/// Road eligibility is decided by the data generator's vehicle model and
/// persisted as a plain flag; this crate only ever reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: u32,
    pub kind: FeatureKind,
    pub is_road: bool,
    pub points: Vec<Point>,
}

impl Feature {
    /// Convenience constructor for a vehicle-traversable line feature.
    pub fn road_line(id: u32, points: Vec<Point>) -> Self {
        Self {
            id,
            kind: FeatureKind::Line,
            is_road: true,
            points,
        }
    }

    /// The polyline point at `idx`, if within the geometry.
    pub fn point(&self, idx: u32) -> Option<Point> {
        self.points.get(idx as usize).copied()
    }

    /// The number of point-pair segments of the polyline.
    pub fn segment_count(&self) -> usize {
        self.points.len().saturating_sub(1)
    }
}

/// Capability to enumerate and fetch a partition's map features.
///
/// The spatial query is scoped to a single partition's data, which keeps all
/// candidates matched for one coordinate within one partition by construction.
pub trait FeatureSource {
    /// Invokes `visitor` for every feature whose bounding box intersects `rect`.
    fn for_each_in_rect<F: FnMut(&Feature)>(
        &self,
        partition: &str,
        rect: &Rect,
        visitor: F,
    ) -> Result<(), DataError>;

    /// Fetches a single feature by its identifier.
    fn feature(&self, partition: &str, id: u32) -> Result<Feature, DataError>;
}

/// An R-tree-backed spatial index over one partition's features.
///
/// Features with empty geometry are kept for id lookup but never returned
/// by the rect query.
#[derive(Debug)]
pub struct FeatureIndex {
    features: Vec<Feature>,
    by_id: HashMap<u32, usize>,
    tree: RTree<SpatialRef>,
}

/// Entry stored in the R-tree: a feature's index plus its bounding box.
#[derive(Debug)]
struct SpatialRef {
    idx: usize,
    envelope: AABB<[f64; 2]>,
}

impl SpatialRef {
    fn new(idx: usize, ft: &Feature) -> Option<Self> {
        let first = ft.points.first()?;
        let (mut min_x, mut min_y) = (first.x, first.y);
        let (mut max_x, mut max_y) = (first.x, first.y);
        for pt in &ft.points[1..] {
            min_x = min_x.min(pt.x);
            min_y = min_y.min(pt.y);
            max_x = max_x.max(pt.x);
            max_y = max_y.max(pt.y);
        }

        Some(Self {
            idx,
            envelope: AABB::from_corners([min_x, min_y], [max_x, max_y]),
        })
    }
}

impl RTreeObject for SpatialRef {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl FeatureIndex {
    pub fn new(features: Vec<Feature>) -> Self {
        let by_id = features
            .iter()
            .enumerate()
            .map(|(idx, ft)| (ft.id, idx))
            .collect();

        let spatial = features
            .iter()
            .enumerate()
            .filter_map(|(idx, ft)| SpatialRef::new(idx, ft))
            .collect();

        Self {
            features,
            by_id,
            tree: RTree::bulk_load(spatial),
        }
    }

    /// Invokes `visitor` for every feature whose bounding box intersects `rect`.
    pub fn for_each_in_rect<F: FnMut(&Feature)>(&self, rect: &Rect, mut visitor: F) {
        let envelope = AABB::from_corners([rect.min.x, rect.min.y], [rect.max.x, rect.max.y]);
        for spatial in self.tree.locate_in_envelope_intersecting(&envelope) {
            visitor(&self.features[spatial.idx]);
        }
    }

    pub fn get(&self, id: u32) -> Option<&Feature> {
        self.by_id.get(&id).map(|&idx| &self.features[idx])
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> FeatureIndex {
        FeatureIndex::new(vec![
            Feature::road_line(1, vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)]),
            Feature::road_line(2, vec![Point::new(100.0, 100.0), Point::new(110.0, 100.0)]),
            Feature {
                id: 3,
                kind: FeatureKind::Point,
                is_road: false,
                points: vec![Point::new(5.0, 5.0)],
            },
        ])
    }

    fn ids_in_rect(index: &FeatureIndex, rect: &Rect) -> Vec<u32> {
        let mut ids = vec![];
        index.for_each_in_rect(rect, |ft| ids.push(ft.id));
        ids.sort();
        ids
    }

    #[test]
    fn rect_query_returns_intersecting_features() {
        let index = sample_index();

        let near_origin = Rect::centered_at(Point::new(5.0, 1.0), 6.0);
        assert_eq!(ids_in_rect(&index, &near_origin), vec![1, 3]);

        let far_away = Rect::centered_at(Point::new(105.0, 100.0), 1.0);
        assert_eq!(ids_in_rect(&index, &far_away), vec![2]);

        let empty = Rect::centered_at(Point::new(50.0, 50.0), 1.0);
        assert_eq!(ids_in_rect(&index, &empty), Vec::<u32>::new());
    }

    #[test]
    fn get_by_id() {
        let index = sample_index();
        assert_eq!(index.get(2).map(|ft| ft.id), Some(2));
        assert!(index.get(42).is_none());
    }

    #[test]
    fn empty_geometry_is_skipped_by_the_rect_query() {
        let index = FeatureIndex::new(vec![Feature::road_line(9, vec![])]);
        let everything = Rect::centered_at(Point::new(0.0, 0.0), 1e9);
        assert_eq!(ids_in_rect(&index, &everything), Vec::<u32>::new());
        assert!(index.get(9).is_some());
    }
}
