//! Orchestration: grow a street network in every region of a boundary
//! graph, merge the regions into one city, and cut it into blocks.
//!
//! Regions are the minimal cycles of the boundary graph, processed in
//! [`CycleKey`](crate::cycles::CycleKey) order. Each region draws from its
//! own generator seeded by [`cycle_seed`], so regions never share random
//! state and the result does not depend on how many other regions exist.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::iter;

use log::debug;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::blocks::{Block, extract_blocks};
use crate::cycles::{Cycle, decompose};
use crate::diagnostics::{
    Clock, GenerationDiagnostics, GenerationSummary, StageDiagnostics, StageMetrics,
};
use crate::geometry::{EPSILON, project};
use crate::graph::PlanarGraph;
use crate::grower::{CycleNetwork, GrowthParams, Planted};
use crate::seeds::{cycle_seed, derive_seed};
use crate::topology::TopologyGraph;
use crate::types::{GenerationError, GeometryError, NetworkConfig, Point, Segment, SegmentKey};

/// Perpendicular distance, relative to an edge's length, within which a
/// vertex counts as lying on that edge.
const COLLINEAR_TOLERANCE: f64 = 1e-7;

/// A generated city.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityNetwork {
    /// Every road: the boundary graph with its splits plus all grown roads.
    pub graph: PlanarGraph,
    /// Enclosed blocks of `graph`, sorted by ring key.
    pub blocks: Vec<Block>,
    /// One finished network per region, in region order.
    pub cycle_networks: Vec<CycleNetwork>,
    /// Per region (same order as `cycle_networks`), the parts of its
    /// boundary that no other region shares, as split in `graph`.
    pub outer_edges: Vec<PlanarGraph>,
}

// ---------------------------------------------------------------------------
// Outer edges
// ---------------------------------------------------------------------------

/// How many regions use each original boundary edge, plus a memo of how
/// each original edge is currently split in the union graph.
///
/// The memo is keyed by original edge. Removing a union edge `a–b` must be
/// followed by [`invalidate(a, b)`](Self::invalidate), which drops every
/// memo entry with a part ending at either vertex.
#[derive(Debug, Clone, Default)]
pub struct OuterEdgeIndex {
    usage: BTreeMap<SegmentKey, usize>,
    cache: BTreeMap<SegmentKey, Vec<Segment>>,
}

impl OuterEdgeIndex {
    /// An empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more use of every edge of `ring`.
    pub fn record(&mut self, ring: &Cycle) {
        for edge in ring.edges() {
            *self.usage.entry(edge.key()).or_default() += 1;
        }
    }

    /// Number of recorded rings containing `original`.
    #[must_use]
    pub fn usage(&self, original: &Segment) -> usize {
        self.usage.get(&original.key()).copied().unwrap_or(0)
    }

    /// Whether exactly one region uses `original`.
    #[must_use]
    pub fn is_outer(&self, original: &Segment) -> bool {
        self.usage(original) == 1
    }

    /// Forget memoized splits touching `a` or `b`.
    pub fn invalidate(&mut self, a: Point, b: Point) {
        self.cache
            .retain(|_, parts| !parts.iter().any(|s| s.touches(a) || s.touches(b)));
    }

    /// The union-graph edges that together make up `original`, from
    /// `original.a` to `original.b`.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::InvariantViolation`] if `union` has no
    /// collinear path along `original`.
    pub fn segments_for(
        &mut self,
        original: Segment,
        union: &PlanarGraph,
    ) -> Result<&[Segment], GenerationError> {
        match self.cache.entry(original.key()) {
            Entry::Occupied(entry) => Ok(entry.into_mut().as_slice()),
            Entry::Vacant(entry) => Ok(entry.insert(walk_collinear(original, union)?).as_slice()),
        }
    }

    /// The parts of `ring` used by no other region, as a graph.
    ///
    /// # Errors
    ///
    /// Propagates [`segments_for`](Self::segments_for) failures.
    pub fn outer_graph(
        &mut self,
        ring: &Cycle,
        union: &PlanarGraph,
    ) -> Result<PlanarGraph, GenerationError> {
        let mut outer = PlanarGraph::new();
        for edge in ring.edges() {
            if !self.is_outer(&edge) {
                continue;
            }
            for part in self.segments_for(edge, union)? {
                outer.add_edge(part.a, part.b)?;
            }
        }
        Ok(outer)
    }
}

/// Follow `union` from `original.a` to `original.b`, stepping each time to
/// the nearest neighbour further along the original edge.
fn walk_collinear(
    original: Segment,
    union: &PlanarGraph,
) -> Result<Vec<Segment>, GenerationError> {
    let tolerance = COLLINEAR_TOLERANCE * original.length().max(1.0);
    let mut parts = Vec::new();
    let (mut current, mut r_current) = (original.a, 0.0);

    while current != original.b {
        let mut next: Option<(f64, Point)> = None;
        for n in union.neighbors(current)? {
            let proj = project(n, original.a, original.b)?;
            let ahead = proj.r > r_current && proj.r <= 1.0 + EPSILON;
            if proj.distance <= tolerance && ahead && next.is_none_or(|(r, _)| proj.r < r) {
                next = Some((proj.r, n));
            }
        }
        let Some((r, n)) = next else {
            return Err(GenerationError::InvariantViolation(format!(
                "boundary edge ({}, {})-({}, {}) is broken at ({}, {})",
                original.a.x, original.a.y, original.b.x, original.b.y, current.x, current.y
            )));
        };
        parts.push(Segment::from_distinct(current, n));
        (current, r_current) = (n, r);
    }
    Ok(parts)
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Union every region's network into a copy of `boundary`.
///
/// Split points are gathered per original edge across all regions, so an
/// edge shared by two regions ends up split at both regions' points.
/// Returns the union and the number of distinct split points.
fn merge(
    boundary: &PlanarGraph,
    networks: &[CycleNetwork],
    index: &mut OuterEdgeIndex,
) -> Result<(PlanarGraph, usize), GenerationError> {
    let mut union = boundary.clone();

    let mut splits: BTreeMap<SegmentKey, Vec<Point>> = BTreeMap::new();
    for network in networks {
        for (original, points) in &network.splits {
            splits
                .entry(original.key())
                .or_default()
                .extend(points.iter().copied());
        }
    }

    let mut split_points = 0;
    for (key, points) in splits {
        let original = key.segment();
        let mut chain = points
            .into_iter()
            .map(|p| Ok((project(p, original.a, original.b)?.r, p)))
            .collect::<Result<Vec<(f64, Point)>, GeometryError>>()?;
        chain.sort_by(|x, y| x.0.total_cmp(&y.0));
        chain.dedup_by_key(|(_, p)| p.key());
        split_points += chain.len();

        union.remove_edge(original.a, original.b)?;
        index.invalidate(original.a, original.b);
        let mut prev = original.a;
        for (_, p) in chain.into_iter().chain(iter::once((1.0, original.b))) {
            union.add_edge(prev, p)?;
            prev = p;
        }
    }

    for network in networks {
        for road in &network.roads {
            if !union.has_edge(road.a, road.b) {
                union.add_edge(road.a, road.b)?;
            }
        }
    }
    Ok((union, split_points))
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Grow one region: its ring, with every other boundary edge inside it
/// as a fixed obstacle.
fn grow_region(
    boundary: &PlanarGraph,
    cycle: &Cycle,
    params: GrowthParams,
    master_seed: u64,
) -> Result<CycleNetwork, GenerationError> {
    let ring: HashSet<SegmentKey> = cycle.edges().map(|e| e.key()).collect();
    let obstacles: Vec<Segment> = boundary
        .edges()
        .filter(|e| !ring.contains(&e.key()) && cycle.contains(e.midpoint()))
        .collect();

    let seed = cycle_seed(master_seed, cycle.key());
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let network = Planted::new(cycle, &obstacles, params)?
        .seed(&mut rng)?
        .grow(&mut rng)?
        .close_loose_ends()?;

    debug!(
        "region at ({}, {}) with {} ring edges and {} obstacles: {} roads (seed {seed:#018x})",
        cycle.vertices()[0].x,
        cycle.vertices()[0].y,
        cycle.len(),
        obstacles.len(),
        network.roads.len(),
    );
    Ok(network)
}

/// Sample `topology` into a low-level graph, then grow a city inside it,
/// collecting per-stage diagnostics.
///
/// The sampler draws from its own generator, derived from `config.seed`.
///
/// # Errors
///
/// Returns the errors of [`TopologyGraph::to_low_level`] and
/// [`generate_from_boundary_with_diagnostics`].
pub fn generate_with_diagnostics<C: Clock>(
    topology: &TopologyGraph,
    config: &NetworkConfig,
    clock: &C,
) -> Result<(CityNetwork, GenerationDiagnostics), GenerationError> {
    let total_start = clock.now();
    config.validate()?;

    let start = clock.now();
    let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(config.seed, "topology"));
    let boundary = topology.to_low_level(config, &mut rng)?;
    let sampling = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::TopologySampling {
            topology_edges: topology.edges.len(),
            low_level_edges: boundary.edge_count(),
        },
    };

    grow_city(&boundary, config, clock, Some(sampling), &total_start)
}

/// Grow a city inside an already-sampled boundary graph, collecting
/// per-stage diagnostics.
///
/// # Errors
///
/// Returns [`GenerationError::InvalidConfig`] for a bad `config`,
/// [`GenerationError::EmptyTopology`] if `boundary` has no edges,
/// [`GeometryError::SelfIntersection`] if two of its edges cross, and
/// [`GenerationError::NoContent`] if it encloses no region or no region
/// grows a road.
pub fn generate_from_boundary_with_diagnostics<C: Clock>(
    boundary: &PlanarGraph,
    config: &NetworkConfig,
    clock: &C,
) -> Result<(CityNetwork, GenerationDiagnostics), GenerationError> {
    let total_start = clock.now();
    grow_city(boundary, config, clock, None, &total_start)
}

fn grow_city<C: Clock>(
    boundary: &PlanarGraph,
    config: &NetworkConfig,
    clock: &C,
    topology_sampling: Option<StageDiagnostics>,
    total_start: &C::Instant,
) -> Result<(CityNetwork, GenerationDiagnostics), GenerationError> {
    // 1. Validation.
    let start = clock.now();
    config.validate()?;
    if boundary.edge_count() == 0 {
        return Err(GenerationError::EmptyTopology);
    }
    if let Some((first, second)) = boundary.find_crossing() {
        return Err(GeometryError::SelfIntersection { first, second }.into());
    }
    let validation = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Validation {
            vertices: boundary.vertex_count(),
            edges: boundary.edge_count(),
        },
    };

    // 2. Regions.
    let start = clock.now();
    let regions = decompose(boundary)?;
    if regions.cycles.is_empty() {
        return Err(GenerationError::NoContent);
    }
    debug!(
        "boundary graph has {} regions and {} filaments",
        regions.cycles.len(),
        regions.filaments.len()
    );
    let decomposition = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Decomposition {
            cycles: regions.cycles.len(),
            filaments: regions.filaments.len(),
        },
    };

    // 3. Growth, one region at a time.
    let start = clock.now();
    let params = GrowthParams::from(config);
    let cycle_networks = regions
        .cycles
        .iter()
        .map(|cycle| grow_region(boundary, cycle, params, config.seed))
        .collect::<Result<Vec<_>, _>>()?;
    if cycle_networks.iter().all(|n| n.roads.is_empty()) {
        return Err(GenerationError::NoContent);
    }
    let stats = cycle_networks.iter().map(|n| n.stats);
    let growth = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Growth {
            regions: cycle_networks.len(),
            roads: cycle_networks.iter().map(|n| n.roads.len()).sum(),
            seeds: stats.clone().map(|s| s.seeds).sum(),
            steps: stats.clone().map(|s| s.growth_steps).sum(),
            caps_hit: stats.clone().filter(|s| s.cap_hit).count(),
            loose_ends_closed: stats.clone().map(|s| s.loose_ends_closed).sum(),
            loose_ends_open: stats.map(|s| s.loose_ends_open).sum(),
        },
    };

    // 4. Merge.
    let start = clock.now();
    let mut index = OuterEdgeIndex::new();
    for cycle in &regions.cycles {
        index.record(cycle);
    }
    let (graph, split_points) = merge(boundary, &cycle_networks, &mut index)?;
    let outer_edges = regions
        .cycles
        .iter()
        .map(|cycle| index.outer_graph(cycle, &graph))
        .collect::<Result<Vec<_>, _>>()?;
    let merge_diag = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Merge {
            vertices: graph.vertex_count(),
            edges: graph.edge_count(),
            split_points,
        },
    };

    // 5. Blocks.
    let start = clock.now();
    let blocks = extract_blocks(&graph)?;
    let block_extraction = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::BlockExtraction {
            blocks: blocks.len(),
            total_area: blocks.iter().map(|b| b.area).sum(),
        },
    };
    debug!(
        "city has {} vertices, {} edges and {} blocks",
        graph.vertex_count(),
        graph.edge_count(),
        blocks.len()
    );

    let summary = GenerationSummary {
        cycle_count: cycle_networks.len(),
        vertex_count: graph.vertex_count(),
        edge_count: graph.edge_count(),
        block_count: blocks.len(),
        growth_caps_hit: cycle_networks.iter().filter(|n| n.stats.cap_hit).count(),
        open_loose_ends: cycle_networks
            .iter()
            .map(|n| n.stats.loose_ends_open)
            .sum(),
    };
    let diagnostics = GenerationDiagnostics {
        topology_sampling,
        validation,
        decomposition,
        growth,
        merge: merge_diag,
        block_extraction,
        total_duration: clock.elapsed(total_start),
        summary,
    };
    let city = CityNetwork {
        graph,
        blocks,
        cycle_networks,
        outer_edges,
    };
    Ok((city, diagnostics))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::diagnostics::NoopClock;
    use crate::grower::GrowthStats;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    fn seg(a: Point, b: Point) -> Segment {
        Segment::new(a, b).unwrap()
    }

    fn graph_of(edges: &[(Point, Point)]) -> PlanarGraph {
        let mut g = PlanarGraph::new();
        for &(a, b) in edges {
            g.add_edge(a, b).unwrap();
        }
        g
    }

    /// Two 10x10 squares sharing the edge x = 10.
    fn two_squares() -> PlanarGraph {
        graph_of(&[
            (p(0.0, 0.0), p(10.0, 0.0)),
            (p(10.0, 0.0), p(20.0, 0.0)),
            (p(20.0, 0.0), p(20.0, 10.0)),
            (p(20.0, 10.0), p(10.0, 10.0)),
            (p(10.0, 10.0), p(0.0, 10.0)),
            (p(0.0, 10.0), p(0.0, 0.0)),
            (p(10.0, 0.0), p(10.0, 10.0)),
        ])
    }

    fn left() -> Cycle {
        Cycle::from_ring(vec![p(0.0, 0.0), p(10.0, 0.0), p(10.0, 10.0), p(0.0, 10.0)]).unwrap()
    }

    fn right() -> Cycle {
        Cycle::from_ring(vec![p(10.0, 0.0), p(20.0, 0.0), p(20.0, 10.0), p(10.0, 10.0)])
            .unwrap()
    }

    fn network(cycle: Cycle, splits: Vec<(Segment, Vec<Point>)>, roads: Vec<Segment>) -> CycleNetwork {
        CycleNetwork {
            graph: PlanarGraph::new(),
            cycle,
            roads,
            splits,
            stats: GrowthStats::default(),
        }
    }

    fn shared() -> Segment {
        seg(p(10.0, 0.0), p(10.0, 10.0))
    }

    #[test]
    fn shared_edges_are_not_outer() {
        let mut index = OuterEdgeIndex::new();
        index.record(&left());
        index.record(&right());
        assert_eq!(index.usage(&shared()), 2);
        assert!(!index.is_outer(&shared()));
        assert!(index.is_outer(&seg(p(0.0, 0.0), p(10.0, 0.0))));
        assert_eq!(index.usage(&seg(p(0.0, 0.0), p(20.0, 0.0))), 0);
    }

    #[test]
    fn memo_is_refreshed_after_invalidation() {
        let mut union = two_squares();
        let bottom = seg(p(0.0, 0.0), p(10.0, 0.0));
        let mut index = OuterEdgeIndex::new();
        index.record(&left());
        assert_eq!(index.segments_for(bottom, &union).unwrap().len(), 1);

        union.split_edge(bottom.a, bottom.b, p(4.0, 0.0)).unwrap();
        // Stale until invalidated.
        assert_eq!(index.segments_for(bottom, &union).unwrap().len(), 1);
        index.invalidate(bottom.a, bottom.b);
        let parts = index.segments_for(bottom, &union).unwrap();
        assert_eq!(parts, [seg(p(0.0, 0.0), p(4.0, 0.0)), seg(p(4.0, 0.0), p(10.0, 0.0))]);
    }

    #[test]
    fn walk_ignores_roads_leaving_the_edge() {
        let mut union = two_squares();
        union.split_edge(p(0.0, 0.0), p(10.0, 0.0), p(5.0, 0.0)).unwrap();
        union.add_edge(p(5.0, 0.0), p(5.0, 5.0)).unwrap();
        let parts = walk_collinear(seg(p(10.0, 0.0), p(0.0, 0.0)), &union).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].a, p(10.0, 0.0));
        assert_eq!(parts[1].b, p(0.0, 0.0));
    }

    #[test]
    fn broken_edge_is_an_invariant_violation() {
        let union = graph_of(&[(p(0.0, 0.0), p(4.0, 0.0))]);
        let result = walk_collinear(seg(p(0.0, 0.0), p(10.0, 0.0)), &union);
        assert!(matches!(result, Err(GenerationError::InvariantViolation(_))));
    }

    #[test]
    fn merge_combines_splits_from_both_sides() {
        let boundary = two_squares();
        let networks = vec![
            network(
                left(),
                vec![(shared(), vec![p(10.0, 4.0)])],
                vec![seg(p(5.0, 4.0), p(10.0, 4.0))],
            ),
            network(
                right(),
                vec![(shared(), vec![p(10.0, 7.0), p(10.0, 4.0)])],
                vec![seg(p(10.0, 7.0), p(15.0, 7.0))],
            ),
        ];
        let mut index = OuterEdgeIndex::new();
        let (union, split_points) = merge(&boundary, &networks, &mut index).unwrap();

        assert_eq!(split_points, 2);
        assert!(!union.has_edge(p(10.0, 0.0), p(10.0, 10.0)));
        assert!(union.has_edge(p(10.0, 0.0), p(10.0, 4.0)));
        assert!(union.has_edge(p(10.0, 4.0), p(10.0, 7.0)));
        assert!(union.has_edge(p(10.0, 7.0), p(10.0, 10.0)));
        assert!(union.has_edge(p(5.0, 4.0), p(10.0, 4.0)));
        assert!(union.has_edge(p(10.0, 7.0), p(15.0, 7.0)));
        assert_eq!(union.edge_count(), 7 + 2 + 2);
    }

    #[test]
    fn outer_graph_skips_shared_edge() {
        let boundary = two_squares();
        let networks = vec![network(left(), vec![(shared(), vec![p(10.0, 4.0)])], Vec::new())];
        let mut index = OuterEdgeIndex::new();
        index.record(&left());
        index.record(&right());
        let (union, _) = merge(&boundary, &networks, &mut index).unwrap();

        let outer = index.outer_graph(&left(), &union).unwrap();
        assert_eq!(outer.edge_count(), 3);
        assert!(!outer.contains_vertex(p(10.0, 4.0)));
    }

    #[test]
    fn crossing_boundary_is_rejected() {
        let boundary = graph_of(&[
            (p(0.0, 0.0), p(10.0, 10.0)),
            (p(0.0, 10.0), p(10.0, 0.0)),
        ]);
        let result =
            generate_from_boundary_with_diagnostics(&boundary, &NetworkConfig::default(), &NoopClock);
        assert!(matches!(
            result,
            Err(GenerationError::Geometry(GeometryError::SelfIntersection { .. }))
        ));
    }

    #[test]
    fn tree_boundary_has_no_content() {
        let boundary = graph_of(&[(p(0.0, 0.0), p(10.0, 0.0)), (p(10.0, 0.0), p(10.0, 10.0))]);
        let result =
            generate_from_boundary_with_diagnostics(&boundary, &NetworkConfig::default(), &NoopClock);
        assert!(matches!(result, Err(GenerationError::NoContent)));
    }

    #[test]
    fn empty_boundary_is_rejected() {
        let result = generate_from_boundary_with_diagnostics(
            &PlanarGraph::new(),
            &NetworkConfig::default(),
            &NoopClock,
        );
        assert!(matches!(result, Err(GenerationError::EmptyTopology)));
    }

    #[test]
    fn region_too_small_to_grow_has_no_content() {
        let config = NetworkConfig {
            connectivity: 0.0,
            ..NetworkConfig::default()
        };
        let boundary = graph_of(&[
            (p(0.0, 0.0), p(10.0, 0.0)),
            (p(10.0, 0.0), p(10.0, 10.0)),
            (p(10.0, 10.0), p(0.0, 10.0)),
            (p(0.0, 10.0), p(0.0, 0.0)),
        ]);
        let result = generate_from_boundary_with_diagnostics(&boundary, &config, &NoopClock);
        assert!(matches!(result, Err(GenerationError::NoContent)));
    }

    #[test]
    fn diagnostics_match_the_city() {
        let boundary = graph_of(&[
            (p(0.0, 0.0), p(100.0, 0.0)),
            (p(100.0, 0.0), p(100.0, 100.0)),
            (p(100.0, 100.0), p(0.0, 100.0)),
            (p(0.0, 100.0), p(0.0, 0.0)),
        ]);
        let (city, diag) =
            generate_from_boundary_with_diagnostics(&boundary, &NetworkConfig::default(), &NoopClock)
                .unwrap();
        assert!(diag.topology_sampling.is_none());
        assert_eq!(diag.summary.cycle_count, 1);
        assert_eq!(diag.summary.edge_count, city.graph.edge_count());
        assert_eq!(diag.summary.block_count, city.blocks.len());
        assert_eq!(city.outer_edges.len(), 1);
        // A lone region owns its whole boundary.
        let perimeter: f64 = city.outer_edges[0].edges().map(|e| e.length()).sum();
        assert!((perimeter - 400.0).abs() < 1e-6);
        assert!(matches!(
            diag.block_extraction.metrics,
            StageMetrics::BlockExtraction { total_area, .. } if (total_area - 10_000.0).abs() < 1e-6
        ));
    }
}
