//! Network grower: seed roads on a region's boundary and grow a
//! secondary street network inward, one stage at a time.
//!
//! ```rust
//! # use borough_network::{Cycle, GenerationError, NetworkConfig, Point};
//! # use borough_network::grower::{GrowthParams, Planted};
//! # use rand::SeedableRng;
//! # fn run() -> Result<(), GenerationError> {
//! let ring = Cycle::from_ring(vec![
//!     Point::new(0.0, 0.0),
//!     Point::new(100.0, 0.0),
//!     Point::new(100.0, 100.0),
//!     Point::new(0.0, 100.0),
//! ])?;
//! let params = GrowthParams::from(&NetworkConfig::default());
//! let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);
//! let network = Planted::new(&ring, &[], params)?
//!     .seed(&mut rng)?
//!     .grow(&mut rng)?
//!     .close_loose_ends()?;
//! assert!(!network.roads.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! Each stage consumes `self`. Randomness is drawn only from the `rng`
//! passed in, in a fixed order per branch: angle deviation, then length
//! deviation, then (for snaps) the connectivity roll.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::closer::close_loose_ends;
use crate::cycles::Cycle;
use crate::geometry::{EPSILON, signed_area};
use crate::graph::PlanarGraph;
use crate::region::RegionGraph;
use crate::snap::{SnapOutcome, resolve};
use crate::types::{GenerationError, NetworkConfig, Point, Segment};

/// A vertex together with the direction growth was heading when it got
/// there, in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionFromPoint {
    /// The vertex.
    pub vertex: Point,
    /// Heading on arrival.
    pub direction: f64,
}

/// The subset of [`NetworkConfig`] the grower reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthParams {
    /// Evenly spaced directions around a node, one of them backwards.
    pub roads_from_point: usize,
    /// Probability that an eligible snap is taken.
    pub connectivity: f64,
    /// Nominal road length.
    pub road_segment_length: f64,
    /// Maximum road length deviation.
    pub road_length_deviation: f64,
    /// Maximum branch direction deviation.
    pub road_deviation_angle: f64,
    /// Snap radius.
    pub snap_size: f64,
    /// Seeds per region.
    pub max_start_points: usize,
    /// Queue pops per region before growth stops.
    pub max_growth_steps: usize,
}

impl From<&NetworkConfig> for GrowthParams {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            roads_from_point: config.roads_from_point,
            connectivity: config.connectivity,
            road_segment_length: config.road_segment_length,
            road_length_deviation: config.road_length_deviation,
            road_deviation_angle: config.road_deviation_angle,
            snap_size: config.snap_size,
            max_start_points: config.max_start_points_per_cell,
            max_growth_steps: config.max_growth_steps,
        }
    }
}

impl GrowthParams {
    /// Shortest road growth will place; anything shorter is discarded.
    #[must_use]
    pub const fn min_road_length(&self) -> f64 {
        (0.5 * self.snap_size).max(EPSILON)
    }
}

/// Counters collected while growing one region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrowthStats {
    /// Seeds that started a branch.
    pub seeds: usize,
    /// Growth-queue pops.
    pub growth_steps: usize,
    /// Roads ending at a new vertex.
    pub extended: usize,
    /// Roads ending by splitting an existing road.
    pub road_snaps: usize,
    /// Roads ending at an existing vertex.
    pub node_snaps: usize,
    /// Proposals dropped (rejected roll, duplicate, or crossing).
    pub discarded: usize,
    /// Whether `max_growth_steps` cut growth short.
    pub cap_hit: bool,
    /// Loose ends connected after growth.
    pub loose_ends_closed: usize,
    /// Loose ends left dangling because every connection would cross.
    pub loose_ends_open: usize,
}

/// The finished network of one region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleNetwork {
    /// The region's boundary.
    pub cycle: Cycle,
    /// Boundary (with its splits), fixed edges, and grown roads.
    pub graph: PlanarGraph,
    /// Grown roads only, in edge-index order.
    pub roads: Vec<Segment>,
    /// Points inserted into each original fixed edge.
    pub splits: Vec<(Segment, Vec<Point>)>,
    /// Counters.
    pub stats: GrowthStats,
}

/// What happened to one proposed road.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Placement {
    /// Ended at a new vertex, which keeps growing.
    Extended(Point),
    /// Split an existing road at `point`; `grows` says whether growth
    /// continues from there.
    Split { point: Point, grows: bool },
    /// Joined an existing vertex.
    Merged,
    /// Not placed.
    Discarded,
}

/// State shared by every stage.
#[derive(Debug, Clone)]
struct Growth {
    ring: Cycle,
    region: RegionGraph,
    params: GrowthParams,
    stats: GrowthStats,
}

impl Growth {
    /// Resolve and commit one road from `source` heading `direction` for
    /// `length`.
    fn place<R: Rng>(
        &mut self,
        source: Point,
        direction: f64,
        length: f64,
        rng: &mut R,
    ) -> Result<Placement, GenerationError> {
        let target = source.offset(direction, length);
        let outcome = resolve(self.region.graph(), source, target, self.params.snap_size)?;

        let placement = match outcome {
            _ if source.distance(outcome.endpoint()) < self.params.min_road_length() => {
                Placement::Discarded
            }
            SnapOutcome::NoSnap(end) => {
                if self.region.graph().crosses_existing(source, end) {
                    Placement::Discarded
                } else {
                    self.region.add_road(source, end)?;
                    self.stats.extended += 1;
                    Placement::Extended(end)
                }
            }
            SnapOutcome::RoadSnap { road, point } => {
                let taken = rng.gen_bool(self.params.connectivity);
                if !taken || self.region.graph().crosses_existing(source, point) {
                    Placement::Discarded
                } else {
                    let grows = !self.region.is_fixed(&road)
                        && !(self.region.is_dead_end(road.a) && self.region.is_dead_end(road.b));
                    self.region.split_road(road, point)?;
                    self.region.add_road(source, point)?;
                    if !grows {
                        self.region.mark_dead_end(point);
                    }
                    self.stats.road_snaps += 1;
                    Placement::Split { point, grows }
                }
            }
            SnapOutcome::NodeSnap(vertex) => {
                let taken = rng.gen_bool(self.params.connectivity);
                let redundant = self.region.graph().has_edge(source, vertex)
                    || (self.region.is_dead_end(source) && self.region.is_dead_end(vertex));
                if !taken || redundant || self.region.graph().crosses_existing(source, vertex) {
                    Placement::Discarded
                } else {
                    self.region.add_road(source, vertex)?;
                    self.stats.node_snaps += 1;
                    Placement::Merged
                }
            }
        };
        if placement == Placement::Discarded {
            self.stats.discarded += 1;
        }
        Ok(placement)
    }

    fn draw_length<R: Rng>(&self, rng: &mut R) -> f64 {
        let dev = self.params.road_length_deviation;
        self.params.road_segment_length + rng.gen_range(-dev..=dev)
    }

    fn draw_deviation<R: Rng>(&self, rng: &mut R) -> f64 {
        let dev = self.params.road_deviation_angle;
        rng.gen_range(-dev..=dev)
    }
}

// ───────────────────────── Stage 0: Planted ──────────────────────────

/// A region ready for seeding: its boundary and fixed edges, no roads.
///
/// Call [`seed`](Self::seed) to advance.
#[must_use = "growth stages are consumed by advancing — call .seed() to continue"]
pub struct Planted {
    growth: Growth,
}

impl Planted {
    /// Prepare growth inside `ring`, around the fixed `obstacles`.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Graph`] if an obstacle duplicates a
    /// ring edge.
    pub fn new(
        ring: &Cycle,
        obstacles: &[Segment],
        params: GrowthParams,
    ) -> Result<Self, GenerationError> {
        Ok(Self {
            growth: Growth {
                ring: ring.clone(),
                region: RegionGraph::new(ring, obstacles)?,
                params,
                stats: GrowthStats::default(),
            },
        })
    }

    /// The region's starting graph.
    #[must_use]
    pub const fn graph(&self) -> &PlanarGraph {
        self.growth.region.graph()
    }

    /// Place seed roads at the midpoints of the longest boundary edges,
    /// heading inward, and advance to [`Seeded`].
    ///
    /// # Errors
    ///
    /// Propagates geometry and graph failures.
    pub fn seed<R: Rng>(self, rng: &mut R) -> Result<Seeded, GenerationError> {
        let mut growth = self.growth;
        let ring_edges: Vec<Segment> = growth.ring.edges().collect();

        let mut longest: Vec<usize> = (0..ring_edges.len()).collect();
        longest.sort_by(|&i, &j| ring_edges[j].length().total_cmp(&ring_edges[i].length()));
        longest.truncate(growth.params.max_start_points.min(ring_edges.len()));
        longest.sort_unstable();

        // Rings are counter-clockwise, so the interior is to the left.
        let inward = if signed_area(growth.ring.vertices()) >= 0.0 {
            FRAC_PI_2
        } else {
            -FRAC_PI_2
        };

        let mut queue = Vec::new();
        for i in longest {
            let edge = ring_edges[i];
            let seed = growth.region.split_original(edge, edge.midpoint())?;
            let direction = edge.a.bearing_to(edge.b) + inward;
            let length = growth.draw_length(rng);
            let next = match growth.place(seed, direction, length, rng)? {
                Placement::Extended(end) => Some(end),
                Placement::Split { point, grows: true } => Some(point),
                Placement::Split { grows: false, .. } | Placement::Merged | Placement::Discarded => {
                    None
                }
            };
            if let Some(vertex) = next {
                queue.push(DirectionFromPoint { vertex, direction });
                growth.region.mark_dead_end(seed);
                growth.stats.seeds += 1;
            }
        }
        debug!(
            "seeded {} of {} boundary edges",
            growth.stats.seeds,
            ring_edges.len()
        );
        Ok(Seeded { growth, queue })
    }
}

// ───────────────────────── Stage 1: Seeded ───────────────────────────

/// Seed roads are placed; their far ends wait in the growth queue.
///
/// Call [`grow`](Self::grow) to advance.
#[must_use = "growth stages are consumed by advancing — call .grow() to continue"]
pub struct Seeded {
    growth: Growth,
    queue: Vec<DirectionFromPoint>,
}

impl Seeded {
    /// The current graph.
    #[must_use]
    pub const fn graph(&self) -> &PlanarGraph {
        self.growth.region.graph()
    }

    /// Nodes waiting to grow, last to be popped first.
    #[must_use]
    pub fn queue(&self) -> &[DirectionFromPoint] {
        &self.queue
    }

    /// Grow depth-first from the queued nodes until the queue drains or
    /// `max_growth_steps` pops have happened, and advance to [`Grown`].
    ///
    /// # Errors
    ///
    /// Propagates geometry and graph failures.
    pub fn grow<R: Rng>(self, rng: &mut R) -> Result<Grown, GenerationError> {
        let Self {
            mut growth,
            mut queue,
        } = self;
        let n = growth.params.roads_from_point;
        #[allow(clippy::cast_precision_loss)]
        let spacing = TAU / n as f64;
        let mut stalled = Vec::new();

        while let Some(node) = queue.pop() {
            if growth.stats.growth_steps >= growth.params.max_growth_steps {
                queue.push(node);
                growth.stats.cap_hit = true;
                warn!(
                    "growth cap of {} steps reached with {} nodes queued",
                    growth.params.max_growth_steps,
                    queue.len()
                );
                break;
            }
            growth.stats.growth_steps += 1;

            let mut accepted = 0;
            for i in 1..n {
                #[allow(clippy::cast_precision_loss)]
                let base = (i as f64).mul_add(spacing, node.direction + PI);
                let direction = base + growth.draw_deviation(rng);
                let length = growth.draw_length(rng);
                match growth.place(node.vertex, direction, length, rng)? {
                    Placement::Extended(end) => {
                        queue.push(DirectionFromPoint {
                            vertex: end,
                            direction,
                        });
                        accepted += 1;
                    }
                    Placement::Split { point, grows } => {
                        if grows {
                            queue.push(DirectionFromPoint {
                                vertex: point,
                                direction,
                            });
                        }
                        accepted += 1;
                    }
                    Placement::Merged => accepted += 1,
                    Placement::Discarded => {}
                }
            }
            if accepted == 0 {
                stalled.push(node);
            }
        }

        // Queued nodes left behind by the cap are loose ends too.
        stalled.extend(queue);
        let loose_ends: Vec<DirectionFromPoint> = stalled
            .into_iter()
            .filter(|end| growth.region.graph().degree(end.vertex) == 1)
            .collect();

        debug!(
            "grew {} roads in {} steps, {} loose ends",
            growth.region.grown_roads().len(),
            growth.stats.growth_steps,
            loose_ends.len()
        );
        Ok(Grown { growth, loose_ends })
    }
}

// ───────────────────────── Stage 2: Grown ────────────────────────────

/// Growth has stopped; some roads may still end in the open.
///
/// Call [`close_loose_ends`](Self::close_loose_ends) to finish.
#[must_use = "growth stages are consumed by advancing — call .close_loose_ends() to continue"]
pub struct Grown {
    growth: Growth,
    loose_ends: Vec<DirectionFromPoint>,
}

impl Grown {
    /// The current graph.
    #[must_use]
    pub const fn graph(&self) -> &PlanarGraph {
        self.growth.region.graph()
    }

    /// Grown roads so far.
    #[must_use]
    pub fn roads(&self) -> Vec<Segment> {
        self.growth.region.grown_roads()
    }

    /// Degree-one vertices awaiting connection.
    #[must_use]
    pub fn loose_ends(&self) -> &[DirectionFromPoint] {
        &self.loose_ends
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> &GrowthStats {
        &self.growth.stats
    }

    /// Extend every loose end until it meets the network, and return the
    /// region's finished network.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::UnresolvedLooseEnd`](crate::GeometryError::UnresolvedLooseEnd)
    /// if a loose end reaches nothing, and propagates graph failures.
    pub fn close_loose_ends(self) -> Result<CycleNetwork, GenerationError> {
        let Self {
            mut growth,
            loose_ends,
        } = self;
        let report = close_loose_ends(&mut growth.region, &loose_ends, growth.params.snap_size)?;
        growth.stats.loose_ends_closed = report.closed;
        growth.stats.loose_ends_open = report.left_open;

        let roads = growth.region.grown_roads();
        let splits = growth.region.splits();
        Ok(CycleNetwork {
            cycle: growth.ring,
            graph: growth.region.into_graph(),
            roads,
            splits,
            stats: growth.stats,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    fn square(size: f64) -> Cycle {
        Cycle::from_ring(vec![p(0.0, 0.0), p(size, 0.0), p(size, size), p(0.0, size)]).unwrap()
    }

    fn params() -> GrowthParams {
        GrowthParams::from(&NetworkConfig::default())
    }

    #[test]
    fn single_seed_starts_at_first_edge_midpoint() {
        let params = GrowthParams {
            max_start_points: 1,
            ..params()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let seeded = Planted::new(&square(100.0), &[], params)
            .unwrap()
            .seed(&mut rng)
            .unwrap();
        // Both halves of the split edge plus the seed road.
        assert_eq!(seeded.graph().degree(p(50.0, 0.0)), 3);
        assert_eq!(seeded.queue().len(), 1);
        let end = seeded.queue()[0].vertex;
        assert!((end.x - 50.0).abs() < 1e-9);
        assert!(end.y > 0.0);
    }

    #[test]
    fn seed_road_into_near_wall_is_dropped_without_connectivity() {
        let params = GrowthParams {
            max_start_points: 1,
            connectivity: 0.0,
            ..params()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let seeded = Planted::new(&square(10.0), &[], params)
            .unwrap()
            .seed(&mut rng)
            .unwrap();
        assert_eq!(seeded.graph().degree(p(5.0, 0.0)), 2);
        assert!(seeded.queue().is_empty());
    }

    #[test]
    fn seed_count_is_bounded_by_ring_size() {
        let params = GrowthParams {
            max_start_points: 10,
            ..params()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let seeded = Planted::new(&square(100.0), &[], params)
            .unwrap()
            .seed(&mut rng)
            .unwrap();
        assert!(seeded.queue().len() <= 4);
        assert!(seeded.graph().vertex_count() <= 4 + 2 * 4);
    }

    #[test]
    fn growth_stays_planar() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let grown = Planted::new(&square(100.0), &[], params())
            .unwrap()
            .seed(&mut rng)
            .unwrap()
            .grow(&mut rng)
            .unwrap();
        assert!(!grown.roads().is_empty());
        assert!(grown.graph().find_crossing().is_none());
    }

    #[test]
    fn grown_roads_respect_length_bound() {
        let p = params();
        let bound = p.road_segment_length + p.road_length_deviation + 2.0 * p.snap_size + 1e-9;
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let grown = Planted::new(&square(100.0), &[], p)
            .unwrap()
            .seed(&mut rng)
            .unwrap()
            .grow(&mut rng)
            .unwrap();
        for road in grown.roads() {
            assert!(road.length() <= bound, "road of length {}", road.length());
        }
    }

    #[test]
    fn zero_connectivity_grows_without_snapping() {
        let params = GrowthParams {
            connectivity: 0.0,
            ..params()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let grown = Planted::new(&square(100.0), &[], params)
            .unwrap()
            .seed(&mut rng)
            .unwrap()
            .grow(&mut rng)
            .unwrap();
        assert_eq!(grown.stats().road_snaps, 0);
        assert_eq!(grown.stats().node_snaps, 0);
        // Nothing joins up, so the roads form trees hanging off the seeds:
        // no vertex strictly inside has more than `roads_from_point` edges.
        let ring = square(100.0);
        for road in grown.roads() {
            for v in [road.a, road.b] {
                if ring.contains(v) {
                    assert!(grown.graph().degree(v) <= params.roads_from_point);
                }
            }
        }
    }

    #[test]
    fn growth_cap_stops_early() {
        let params = GrowthParams {
            max_growth_steps: 1,
            ..params()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let grown = Planted::new(&square(100.0), &[], params)
            .unwrap()
            .seed(&mut rng)
            .unwrap()
            .grow(&mut rng)
            .unwrap();
        assert_eq!(grown.stats().growth_steps, 1);
        assert!(grown.stats().cap_hit);
    }

    #[test]
    fn closing_leaves_no_dead_ends_in_simple_square() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let network = Planted::new(&square(100.0), &[], params())
            .unwrap()
            .seed(&mut rng)
            .unwrap()
            .grow(&mut rng)
            .unwrap()
            .close_loose_ends()
            .unwrap();
        assert!(network.graph.find_crossing().is_none());
        let dangling = network
            .graph
            .vertices()
            .filter(|&v| network.graph.degree(v) == 1)
            .count();
        assert_eq!(dangling, network.stats.loose_ends_open);
    }

    #[test]
    fn same_seed_same_network() {
        let run = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let network = Planted::new(&square(80.0), &[], params())
                .unwrap()
                .seed(&mut rng)
                .unwrap()
                .grow(&mut rng)
                .unwrap()
                .close_loose_ends()
                .unwrap();
            serde_json::to_string(&network).unwrap()
        };
        assert_eq!(run(11), run(11));
    }

    #[test]
    fn splits_of_boundary_are_recorded() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let network = Planted::new(&square(100.0), &[], params())
            .unwrap()
            .seed(&mut rng)
            .unwrap()
            .grow(&mut rng)
            .unwrap()
            .close_loose_ends()
            .unwrap();
        let ring = square(100.0);
        let ring_edges: Vec<Segment> = ring.edges().collect();
        assert!(!network.splits.is_empty());
        for (original, points) in &network.splits {
            assert!(ring_edges.contains(original));
            for &pt in points {
                assert!(RegionGraph::lies_on(original, pt));
            }
        }
    }
}
