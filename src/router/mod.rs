// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use log::{debug, error, warn};

use crate::container::{DataError, RoutingSource};
use crate::feature::FeatureSource;
use crate::mapping::SegmentMap;
use crate::matcher::{nearby_candidates, resolve_candidates};
use crate::search::PathOracle;
use crate::{PhantomNode, Point};

mod error;
mod reconstruct;

pub use error::RouteError;

/// A computed route: the continuous polyline from the projected start to the
/// projected destination, in projected map units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Route {
    geometry: Vec<Point>,
}

impl Route {
    pub(crate) fn new(geometry: Vec<Point>) -> Self {
        Self { geometry }
    }

    /// The route polyline. Never empty and never partial: the first point is
    /// the exact projected start, the last the exact projected destination.
    pub fn geometry(&self) -> &[Point] {
        &self.geometry
    }

    /// Total length of the polyline, in map units.
    pub fn length(&self) -> f64 {
        self.geometry
            .windows(2)
            .map(|pair| pair[0].dist(pair[1]))
            .sum()
    }
}

/// Data of the one partition currently loaded.
///
/// An explicit, owned replacement for "currently loaded" global state: the
/// whole context is dropped and rebuilt whenever the requested partition
/// changes, and the dense graph backend is only filled in on demand.
struct PartitionContext<O> {
    name: String,
    mapping: SegmentMap,
    oracle: Option<O>,
}

/// Reloads the partition context if the cached one is for another partition.
/// A failed load leaves the cache cleared, never stale.
fn ensure_loaded<R: RoutingSource>(
    context: &mut Option<PartitionContext<R::Oracle>>,
    routing: &R,
    partition: &str,
) -> Result<(), DataError> {
    if context.as_ref().map(|ctx| ctx.name.as_str()) == Some(partition) {
        return Ok(());
    }

    *context = None;
    let mapping = routing.load_mapping(partition)?;
    debug!("loaded segment mapping of partition {:?}", partition);
    *context = Some(PartitionContext {
        name: partition.to_string(),
        mapping,
        oracle: None,
    });
    Ok(())
}

/// Fills in the context's search backend if it is not loaded yet.
/// A failed load clears the whole context.
fn ensure_oracle<R: RoutingSource>(
    context: &mut Option<PartitionContext<R::Oracle>>,
    routing: &R,
) -> Result<(), DataError> {
    let ctx = context
        .as_mut()
        .expect("ensure_loaded must run before ensure_oracle");
    if ctx.oracle.is_some() {
        return Ok(());
    }

    match routing.load_oracle(&ctx.name) {
        Ok(oracle) => {
            ctx.oracle = Some(oracle);
            Ok(())
        }
        Err(e) => {
            *context = None;
            Err(e)
        }
    }
}

/// The routing engine's entry point.
///
/// Computes one route at a time, synchronously, on the calling thread; the
/// surrounding application is expected to invoke it from a dedicated worker
/// and serialize access. Partition data is cached between requests and
/// reloaded only when a request resolves to a different partition.
pub struct Router<F, R: RoutingSource, P> {
    features: F,
    routing: R,
    partition_of: P,
    destination: Option<Point>,
    context: Option<PartitionContext<R::Oracle>>,
}

impl<F, R, P> Router<F, R, P>
where
    F: FeatureSource,
    R: RoutingSource,
    P: Fn(&Point) -> String,
{
    /// Creates a router over the given data sources. `partition_of` names the
    /// partition containing a point and is used to reject cross-partition
    /// requests.
    pub fn new(features: F, routing: R, partition_of: P) -> Self {
        Self {
            features,
            routing,
            partition_of,
            destination: None,
            context: None,
        }
    }

    /// Remembers the destination for subsequent [Router::calculate_route] calls.
    pub fn set_destination(&mut self, point: Point) {
        self.destination = Some(point);
    }

    /// Computes a route from `start` to the point given to
    /// [Router::set_destination] and delivers the outcome through `callback`.
    ///
    /// Without a destination set beforehand, the outcome is
    /// [RouteError::EndNotFound].
    pub fn calculate_route<C: FnOnce(Result<Route, RouteError>)>(
        &mut self,
        start: Point,
        callback: C,
    ) {
        let result = match self.destination {
            Some(end) => self.route(start, end),
            None => Err(RouteError::EndNotFound),
        };

        match &result {
            Ok(_) => {}
            Err(RouteError::StartNotFound) => warn!("can't find start point node"),
            Err(RouteError::EndNotFound) => warn!("can't find end point node"),
            Err(RouteError::CrossPartition) => warn!("points are in different partitions"),
            Err(RouteError::NoPath) => warn!("route not found"),
            Err(RouteError::Data(e)) => error!("routing data absent or incorrect: {}", e),
        }

        callback(result);
    }

    /// Computes a route between two points.
    pub fn route(&mut self, start: Point, end: Point) -> Result<Route, RouteError> {
        let partition = (self.partition_of)(&start);
        if partition != (self.partition_of)(&end) {
            return Err(RouteError::CrossPartition);
        }

        ensure_loaded(&mut self.context, &self.routing, &partition)?;

        // Candidates are matched against the feature geometry alone; the
        // dense graph data is only pulled in once a path may actually exist.
        let start_candidates = nearby_candidates(&self.features, &partition, start)?;
        if start_candidates.is_empty() {
            return Err(RouteError::StartNotFound);
        }
        let end_candidates = nearby_candidates(&self.features, &partition, end)?;
        if end_candidates.is_empty() {
            return Err(RouteError::EndNotFound);
        }

        let (starts, ends) = {
            let mapping = &self
                .context
                .as_ref()
                .expect("ensure_loaded leaves a loaded context")
                .mapping;
            (
                resolve_candidates(&start_candidates, mapping),
                resolve_candidates(&end_candidates, mapping),
            )
        };

        // A side whose segments are all absent from the graph is as unusable
        // as one with no nearby roads, and gets the same result code.
        if !starts.iter().any(PhantomNode::is_valid) {
            return Err(RouteError::StartNotFound);
        }
        if !ends.iter().any(PhantomNode::is_valid) {
            return Err(RouteError::EndNotFound);
        }

        ensure_oracle(&mut self.context, &self.routing)?;
        let ctx = self
            .context
            .as_ref()
            .expect("ensure_oracle leaves a loaded context");
        let oracle = ctx
            .oracle
            .as_ref()
            .expect("ensure_oracle leaves a loaded oracle");

        // Greedy pairing: both candidate lists are ordered best-first and the
        // end index advances fastest, so the most promising pairs are tried
        // first. Worst case is a full K×K product of oracle calls; whether
        // that bound is acceptable depends on the backend's per-call cost.
        let mut winner = None;
        'pairing: for (si, source) in starts.iter().enumerate() {
            for (ei, target) in ends.iter().enumerate() {
                if !source.is_valid() || !target.is_valid() {
                    continue;
                }

                let path = oracle.find_path(source, target);
                if path.exists() {
                    winner = Some((si, ei, path));
                    break 'pairing;
                }
            }
        }

        let (si, ei, path) = winner.ok_or(RouteError::NoPath)?;
        debug!(
            "found a path of {} nodes using candidate pair ({}, {})",
            path.nodes.len(),
            si,
            ei
        );

        let route = reconstruct::reconstruct(
            &self.features,
            &partition,
            &ctx.mapping,
            &path,
            &starts[si],
            &ends[ei],
        )?;
        Ok(route)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::rc::Rc;

    use super::*;
    use crate::container::{MemoryStore, RoutingData, TileData};
    use crate::feature::{Feature, FeatureIndex};
    use crate::geometry::Rect;
    use crate::mapping::NodeSegments;
    use crate::matcher::MAX_CANDIDATES;
    use crate::search::RawPath;
    use crate::{NodeId, SegmentSpan};

    /// [FeatureSource] double which counts rect queries.
    struct TestFeatures {
        partitions: HashMap<String, FeatureIndex>,
        rect_queries: Cell<usize>,
    }

    impl TestFeatures {
        fn new(partitions: Vec<(&str, Vec<Feature>)>) -> Self {
            Self {
                partitions: partitions
                    .into_iter()
                    .map(|(name, features)| (name.to_string(), FeatureIndex::new(features)))
                    .collect(),
                rect_queries: Cell::new(0),
            }
        }
    }

    impl FeatureSource for TestFeatures {
        fn for_each_in_rect<V: FnMut(&Feature)>(
            &self,
            partition: &str,
            rect: &Rect,
            visitor: V,
        ) -> Result<(), DataError> {
            self.rect_queries.set(self.rect_queries.get() + 1);
            match self.partitions.get(partition) {
                Some(index) => {
                    index.for_each_in_rect(rect, visitor);
                    Ok(())
                }
                None => Err(DataError::UnknownPartition(partition.to_string())),
            }
        }

        fn feature(&self, partition: &str, id: u32) -> Result<Feature, DataError> {
            self.partitions
                .get(partition)
                .and_then(|index| index.get(id).cloned())
                .ok_or(DataError::UnknownFeature(partition.to_string(), id))
        }
    }

    /// Scripted [PathOracle] which records every queried pair (by forward
    /// node ids) and only connects the configured one.
    #[derive(Debug, Clone, Default)]
    struct TestOracle {
        calls: Rc<RefCell<Vec<(Option<NodeId>, Option<NodeId>)>>>,
        connect: Option<(NodeId, NodeId)>,
    }

    impl PathOracle for TestOracle {
        fn find_path(&self, source: &PhantomNode, target: &PhantomNode) -> RawPath {
            self.calls
                .borrow_mut()
                .push((source.forward, target.forward));
            match (source.forward, target.forward) {
                (Some(s), Some(t)) if self.connect == Some((s, t)) => RawPath {
                    nodes: vec![s, t],
                    length: 1.0,
                },
                _ => RawPath::NONE,
            }
        }
    }

    /// [RoutingSource] double with load counters and switchable failures.
    struct TestRouting {
        nodes: Vec<NodeSegments>,
        oracle: TestOracle,
        mapping_loads: Cell<usize>,
        oracle_loads: Cell<usize>,
        fail_mapping: Cell<bool>,
        fail_oracle: Cell<bool>,
    }

    impl TestRouting {
        fn new(nodes: Vec<NodeSegments>, oracle: TestOracle) -> Self {
            Self {
                nodes,
                oracle,
                mapping_loads: Cell::new(0),
                oracle_loads: Cell::new(0),
                fail_mapping: Cell::new(false),
                fail_oracle: Cell::new(false),
            }
        }
    }

    impl RoutingSource for TestRouting {
        type Oracle = TestOracle;

        fn load_mapping(&self, _partition: &str) -> Result<SegmentMap, DataError> {
            self.mapping_loads.set(self.mapping_loads.get() + 1);
            if self.fail_mapping.get() {
                return Err(DataError::Inconsistent("scripted mapping load failure"));
            }
            Ok(SegmentMap::from_node_segments(self.nodes.clone()))
        }

        fn load_oracle(&self, _partition: &str) -> Result<TestOracle, DataError> {
            self.oracle_loads.set(self.oracle_loads.get() + 1);
            if self.fail_oracle.get() {
                return Err(DataError::Inconsistent("scripted oracle load failure"));
            }
            Ok(self.oracle.clone())
        }
    }

    fn one_partition(point: &Point) -> String {
        let _ = point;
        "test".to_string()
    }

    /// A single straight one-way road along y = 0, covered by graph node 1.
    fn straight_road_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store.insert(
            "test",
            TileData {
                features: vec![Feature::road_line(
                    1,
                    vec![
                        Point::new(0.0, 0.0),
                        Point::new(300.0, 0.0),
                        Point::new(600.0, 0.0),
                        Point::new(900.0, 0.0),
                    ],
                )],
            },
            RoutingData {
                nodes: vec![NodeSegments {
                    node: 1,
                    spans: vec![SegmentSpan {
                        feature_id: 1,
                        start: 0,
                        end: 3,
                    }],
                }],
                graph: Default::default(),
            },
        );
        store
    }

    /// `count` parallel roads per side. Start-side feature `100 + i` sits at
    /// `y = 10 * (i + 1)` around `x = 0` and resolves to node `1000 + i`;
    /// end-side feature `200 + j` mirrors it around `x = 10000` with node
    /// `2000 + j`. Candidate ranks therefore equal feature order.
    fn pairing_fixture(count: u32, oracle: TestOracle) -> (TestFeatures, TestRouting) {
        let mut features = vec![];
        let mut nodes = vec![];

        for i in 0..count {
            let y = 10.0 * (i + 1) as f64;
            features.push(Feature::road_line(
                100 + i,
                vec![Point::new(-50.0, y), Point::new(50.0, y)],
            ));
            features.push(Feature::road_line(
                200 + i,
                vec![Point::new(9950.0, y), Point::new(10050.0, y)],
            ));
            nodes.push(NodeSegments {
                node: 1000 + i,
                spans: vec![SegmentSpan::unit(100 + i, 0)],
            });
            nodes.push(NodeSegments {
                node: 2000 + i,
                spans: vec![SegmentSpan::unit(200 + i, 0)],
            });
        }

        (
            TestFeatures::new(vec![("test", features)]),
            TestRouting::new(nodes, oracle),
        )
    }

    #[test]
    fn route_along_a_single_road() {
        let mut router = Router::new(straight_road_store(), straight_road_store(), one_partition);

        let route = router
            .route(Point::new(10.0, 5.0), Point::new(850.0, -5.0))
            .unwrap();

        let geometry = route.geometry();
        assert!(geometry.len() >= 2);
        assert_eq!(geometry.first(), Some(&Point::new(10.0, 0.0)));
        assert_eq!(geometry.last(), Some(&Point::new(850.0, 0.0)));
        // Progress along the road is monotone.
        assert!(geometry.windows(2).all(|w| w[0].x < w[1].x));
        assert_eq!(route.length(), 840.0);
    }

    #[test]
    fn start_not_found_without_touching_the_graph() {
        let (_, routing) = pairing_fixture(3, TestOracle::default());
        let features = TestFeatures::new(vec![("test", vec![])]);
        let mut router = Router::new(features, routing, one_partition);

        let result = router.route(Point::new(0.0, 0.0), Point::new(10000.0, 0.0));
        assert!(matches!(result, Err(RouteError::StartNotFound)));

        // The mapping was loaded, but the dense graph backend never was.
        assert_eq!(router.routing.mapping_loads.get(), 1);
        assert_eq!(router.routing.oracle_loads.get(), 0);
    }

    #[test]
    fn end_not_found_without_touching_the_graph() {
        let (_, routing) = pairing_fixture(3, TestOracle::default());
        let features = TestFeatures::new(vec![(
            "test",
            vec![Feature::road_line(
                100,
                vec![Point::new(-50.0, 10.0), Point::new(50.0, 10.0)],
            )],
        )]);
        let mut router = Router::new(features, routing, one_partition);

        let result = router.route(Point::new(0.0, 0.0), Point::new(10000.0, 0.0));
        assert!(matches!(result, Err(RouteError::EndNotFound)));
        assert_eq!(router.routing.oracle_loads.get(), 0);
    }

    #[test]
    fn cross_partition_before_any_matching() {
        let (features, routing) = pairing_fixture(3, TestOracle::default());
        let mut router = Router::new(features, routing, |point: &Point| {
            if point.x < 5000.0 { "west" } else { "east" }.to_string()
        });

        let result = router.route(Point::new(0.0, 0.0), Point::new(10000.0, 0.0));
        assert!(matches!(result, Err(RouteError::CrossPartition)));

        // Rejected before any candidate matching or data loading.
        assert_eq!(router.features.rect_queries.get(), 0);
        assert_eq!(router.routing.mapping_loads.get(), 0);
    }

    #[test]
    fn unmapped_candidates_report_the_missing_side() {
        // Only the start side's segments exist in the mapping.
        let (features, _) = pairing_fixture(2, TestOracle::default());
        let routing = TestRouting::new(
            vec![
                NodeSegments {
                    node: 1000,
                    spans: vec![SegmentSpan::unit(100, 0)],
                },
                NodeSegments {
                    node: 1001,
                    spans: vec![SegmentSpan::unit(101, 0)],
                },
            ],
            TestOracle::default(),
        );
        let mut router = Router::new(features, routing, one_partition);

        let result = router.route(Point::new(0.0, 0.0), Point::new(10000.0, 0.0));
        assert!(matches!(result, Err(RouteError::EndNotFound)));

        // And with an empty mapping, the start side is reported first.
        let (features, _) = pairing_fixture(2, TestOracle::default());
        let routing = TestRouting::new(vec![], TestOracle::default());
        let mut router = Router::new(features, routing, one_partition);

        let result = router.route(Point::new(0.0, 0.0), Point::new(10000.0, 0.0));
        assert!(matches!(result, Err(RouteError::StartNotFound)));
    }

    #[test]
    fn exhausted_pairing_visits_the_full_product_row_major() {
        // More roads than the candidate cap: exactly K make it to each side.
        let oracle = TestOracle::default();
        let (features, routing) = pairing_fixture(MAX_CANDIDATES as u32 + 2, oracle.clone());
        let mut router = Router::new(features, routing, one_partition);

        let result = router.route(Point::new(0.0, 0.0), Point::new(10000.0, 0.0));
        assert!(matches!(result, Err(RouteError::NoPath)));

        let calls = oracle.calls.borrow();
        assert_eq!(calls.len(), MAX_CANDIDATES * MAX_CANDIDATES);
        for (k, &call) in calls.iter().enumerate() {
            let si = (k / MAX_CANDIDATES) as u32;
            let ei = (k % MAX_CANDIDATES) as u32;
            assert_eq!(call, (Some(1000 + si), Some(2000 + ei)));
        }
    }

    #[test]
    fn pairing_stops_at_the_first_connected_pair() {
        let oracle = TestOracle {
            connect: Some((1001, 2002)),
            ..Default::default()
        };
        let (features, routing) = pairing_fixture(4, oracle.clone());
        let mut router = Router::new(features, routing, one_partition);

        let route = router
            .route(Point::new(0.0, 0.0), Point::new(10000.0, 0.0))
            .unwrap();

        // Pairs (0,0)..(0,3) and (1,0)..(1,2) were tried, nothing after.
        assert_eq!(oracle.calls.borrow().len(), 7);

        // The geometry belongs to the winning pair: start feature 101,
        // end feature 202, with exact projections at the ends.
        assert_eq!(route.geometry().first(), Some(&Point::new(0.0, 20.0)));
        assert_eq!(route.geometry().last(), Some(&Point::new(10000.0, 30.0)));
    }

    #[test]
    fn invalid_candidates_are_skipped_without_oracle_calls() {
        // The best-ranked start road is left out of the mapping.
        let oracle = TestOracle::default();
        let (features, base) = pairing_fixture(3, oracle.clone());
        let nodes: Vec<NodeSegments> = base
            .nodes
            .iter()
            .filter(|ns| ns.node != 1000)
            .cloned()
            .collect();
        let routing = TestRouting::new(nodes, oracle.clone());
        let mut router = Router::new(features, routing, one_partition);

        let result = router.route(Point::new(0.0, 0.0), Point::new(10000.0, 0.0));
        assert!(matches!(result, Err(RouteError::NoPath)));

        // 2 valid start candidates × 3 end candidates.
        let calls = oracle.calls.borrow();
        assert_eq!(calls.len(), 6);
        assert_eq!(calls[0], (Some(1001), Some(2000)));
    }

    #[test]
    fn partition_change_invalidates_the_cache() {
        let west_road = Feature::road_line(1, vec![Point::new(-50.0, 0.0), Point::new(50.0, 0.0)]);
        let east_road =
            Feature::road_line(2, vec![Point::new(9950.0, 0.0), Point::new(10050.0, 0.0)]);
        let features = TestFeatures::new(vec![("west", vec![west_road]), ("east", vec![east_road])]);
        let routing = TestRouting::new(vec![], TestOracle::default());
        let mut router = Router::new(features, routing, |point: &Point| {
            if point.x < 5000.0 { "west" } else { "east" }.to_string()
        });

        // Two requests in the same partition share one load...
        _ = router.route(Point::new(0.0, 10.0), Point::new(0.0, 20.0));
        _ = router.route(Point::new(0.0, 30.0), Point::new(0.0, 40.0));
        assert_eq!(router.routing.mapping_loads.get(), 1);

        // ...and every partition switch forces a reload.
        _ = router.route(Point::new(10000.0, 10.0), Point::new(10000.0, 20.0));
        assert_eq!(router.routing.mapping_loads.get(), 2);
        _ = router.route(Point::new(0.0, 10.0), Point::new(0.0, 20.0));
        assert_eq!(router.routing.mapping_loads.get(), 3);
    }

    #[test]
    fn failed_mapping_load_clears_the_cache() {
        let (features, routing) = pairing_fixture(2, TestOracle::default());
        let mut router = Router::new(features, routing, one_partition);

        router.routing.fail_mapping.set(true);
        let result = router.route(Point::new(0.0, 0.0), Point::new(10000.0, 0.0));
        assert!(matches!(result, Err(RouteError::Data(_))));

        // The failed attempt left no cached context behind: the next request
        // loads again instead of reusing stale data.
        router.routing.fail_mapping.set(false);
        _ = router.route(Point::new(0.0, 0.0), Point::new(10000.0, 0.0));
        assert_eq!(router.routing.mapping_loads.get(), 2);
    }

    #[test]
    fn failed_oracle_load_clears_the_cache() {
        let (features, routing) = pairing_fixture(2, TestOracle::default());
        let mut router = Router::new(features, routing, one_partition);

        router.routing.fail_oracle.set(true);
        let result = router.route(Point::new(0.0, 0.0), Point::new(10000.0, 0.0));
        assert!(matches!(result, Err(RouteError::Data(_))));
        assert_eq!(router.routing.mapping_loads.get(), 1);

        router.routing.fail_oracle.set(false);
        let result = router.route(Point::new(0.0, 0.0), Point::new(10000.0, 0.0));
        assert!(matches!(result, Err(RouteError::NoPath)));
        assert_eq!(router.routing.mapping_loads.get(), 2);
    }

    #[test]
    fn calculate_route_requires_a_destination() {
        let mut router = Router::new(straight_road_store(), straight_road_store(), one_partition);

        let mut delivered = None;
        router.calculate_route(Point::new(10.0, 5.0), |result| delivered = Some(result));
        assert!(matches!(delivered, Some(Err(RouteError::EndNotFound))));
    }

    #[test]
    fn calculate_route_delivers_through_the_callback() {
        let mut router = Router::new(straight_road_store(), straight_road_store(), one_partition);
        router.set_destination(Point::new(850.0, -5.0));

        let mut delivered = None;
        router.calculate_route(Point::new(10.0, 5.0), |result| delivered = Some(result));

        let route = delivered
            .expect("callback must be invoked")
            .expect("route must be found");
        assert_eq!(route.geometry().first(), Some(&Point::new(10.0, 0.0)));
        assert_eq!(route.geometry().last(), Some(&Point::new(850.0, 0.0)));
    }
}
