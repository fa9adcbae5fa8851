// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::container::DataError;
use crate::feature::{FeatureKind, FeatureSource};
use crate::geometry::{project_to_segment, Point, Rect};
use crate::mapping::SegmentMap;
use crate::{Feature, PhantomNode, SegmentSpan};

/// Upper bound of ranked candidates kept per route endpoint.
pub const MAX_CANDIDATES: usize = 10;

/// Radius, in map units, of the spatial query around a route endpoint.
/// Independent of any display scale.
pub const SEARCH_RADIUS: f64 = 1000.0;

/// A projection of a route endpoint onto a nearby road feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Squared distance from the query point to [Candidate::point].
    pub dist: f64,

    pub feature_id: u32,

    /// Index of the point-pair segment the projection lies on.
    pub segment_idx: u32,

    /// The projected point itself.
    pub point: Point,
}

/// Scans road features around `point` and returns the best projection per
/// feature, ranked ascending by squared distance and capped at
/// [MAX_CANDIDATES].
///
/// Only vehicle-traversable line features qualify; other geometry kinds and
/// non-road ways are skipped. An empty result means there is no usable road
/// within [SEARCH_RADIUS] of the point.
pub fn nearby_candidates<S: FeatureSource>(
    source: &S,
    partition: &str,
    point: Point,
) -> Result<Vec<Candidate>, DataError> {
    let rect = Rect::centered_at(point, SEARCH_RADIUS);
    let mut candidates = vec![];

    source.for_each_in_rect(partition, &rect, |ft| {
        if ft.kind != FeatureKind::Line || !ft.is_road {
            return;
        }
        if let Some(best) = best_projection(ft, point) {
            candidates.push(best);
        }
    })?;

    // The sort is stable, so equally-distant features keep their scan order
    // and the ranking stays deterministic for identical input data.
    candidates.sort_by(|a, b| a.dist.partial_cmp(&b.dist).unwrap());
    candidates.truncate(MAX_CANDIDATES);
    Ok(candidates)
}

/// Projects `point` onto every point-pair segment of the feature's polyline
/// and keeps the single closest projection.
fn best_projection(ft: &Feature, point: Point) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;

    for i in 1..ft.points.len() {
        let projected = project_to_segment(ft.points[i - 1], ft.points[i], point);
        let dist = point.square_dist(projected);

        if best.map_or(true, |b| dist < b.dist) {
            best = Some(Candidate {
                dist,
                feature_id: ft.id,
                segment_idx: (i - 1) as u32,
                point: projected,
            });
        }
    }

    best
}

/// Resolves ranked candidates into graph-space [phantom nodes](PhantomNode),
/// preserving the ranking order.
///
/// Candidates whose segment is absent from the mapping keep both node ids
/// unset; the router skips them during endpoint pairing.
pub fn resolve_candidates(candidates: &[Candidate], mapping: &SegmentMap) -> Vec<PhantomNode> {
    candidates
        .iter()
        .map(|c| {
            let pair = mapping.node_pair(c.feature_id, c.segment_idx);
            PhantomNode {
                forward: pair.forward,
                reverse: pair.reverse,
                span: SegmentSpan::unit(c.feature_id, c.segment_idx),
                point: c.point,
            }
        })
        .collect()
}
