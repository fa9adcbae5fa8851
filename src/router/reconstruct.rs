// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::container::DataError;
use crate::feature::{Feature, FeatureSource};
use crate::mapping::SegmentMap;
use crate::search::RawPath;
use crate::{PhantomNode, Point, SegmentSpan};

use super::Route;

/// Converts the oracle's packed path back into the traveled polyline.
///
/// Every traversed node expands (through the mapping's inverse lookup) into
/// its ordered spans, and every span into feature polyline points, honouring
/// the stored traversal direction. The portions of the first and last nodes
/// lying before the projected start and after the projected end are trimmed
/// away; both trims apply when the path consists of a single node. Finally,
/// the first and last raw vertices are replaced with the exact projections,
/// as the true endpoints generally lie strictly between two vertices.
pub(super) fn reconstruct<S: FeatureSource>(
    features: &S,
    partition: &str,
    mapping: &SegmentMap,
    path: &RawPath,
    start: &PhantomNode,
    end: &PhantomNode,
) -> Result<Route, DataError> {
    debug_assert!(path.exists());

    let mut points: Vec<Point> = vec![];
    let last_record = path.nodes.len() - 1;

    for (j, &node) in path.nodes.iter().enumerate() {
        let spans = mapping.spans_of(node);
        if spans.is_empty() {
            return Err(DataError::Inconsistent(
                "traversed node has no segments in the mapping",
            ));
        }

        let mut start_k = 0;
        let mut end_k = spans.len();
        if j == 0 {
            start_k = index_of_intersecting(spans, &start.span)?;
        }
        if j == last_record {
            end_k = index_of_intersecting(spans, &end.span)? + 1;
        }
        if end_k <= start_k {
            return Err(DataError::Inconsistent(
                "exit segment precedes the entry segment",
            ));
        }

        for (k, span) in spans.iter().enumerate().take(end_k).skip(start_k) {
            let ft = features.feature(partition, span.feature_id)?;

            let mut start_idx = span.start;
            let mut end_idx = span.end;

            // Mid-node entry and exit: clip to the matched candidate segment's
            // point range, picking the side matching the stored direction.
            if j == 0 && k == start_k {
                start_idx = if span.is_ascending() {
                    start.span.start
                } else {
                    start.span.end
                };
            }
            if j == last_record && k == end_k - 1 {
                end_idx = if span.is_ascending() {
                    end.span.end
                } else {
                    end.span.start
                };
            }

            emit_span(&ft, start_idx, end_idx, &mut points)?;
        }
    }

    if points.len() < 2 {
        return Err(DataError::Inconsistent("reconstructed geometry is degenerate"));
    }

    points[0] = start.point;
    let last = points.len() - 1;
    points[last] = end.point;

    Ok(Route::new(points))
}

/// Finds the span sharing points with the candidate's matched segment.
fn index_of_intersecting(spans: &[SegmentSpan], seg: &SegmentSpan) -> Result<usize, DataError> {
    spans
        .iter()
        .position(|s| s.intersects(seg))
        .ok_or(DataError::Inconsistent(
            "candidate segment is not part of the traversed node",
        ))
}

/// Appends the polyline points from `start_idx` to `end_idx`, walking down
/// when the span is traversed backward. The final index is always emitted,
/// so a backward walk does not lose its leaving point.
fn emit_span(
    ft: &Feature,
    start_idx: u32,
    end_idx: u32,
    out: &mut Vec<Point>,
) -> Result<(), DataError> {
    if start_idx <= end_idx {
        for idx in start_idx..=end_idx {
            push_point(out, feature_point(ft, idx)?);
        }
    } else {
        let mut idx = start_idx;
        while idx > end_idx {
            push_point(out, feature_point(ft, idx)?);
            idx -= 1;
        }
        push_point(out, feature_point(ft, end_idx)?);
    }
    Ok(())
}

fn feature_point(ft: &Feature, idx: u32) -> Result<Point, DataError> {
    ft.point(idx).ok_or(DataError::Inconsistent(
        "span references a point outside the feature geometry",
    ))
}

/// Consecutive duplicates appear where adjacent segments share a vertex;
/// coincident points must only survive where a turnaround truly happens.
fn push_point(out: &mut Vec<Point>, pt: Point) {
    if out.last() != Some(&pt) {
        out.push(pt);
    }
}
