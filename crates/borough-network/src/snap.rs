//! Snap resolver: decide where a proposed road `source → target` really
//! ends, given the roads already in the graph.
//!
//! # Algorithm overview
//!
//! 1. **Broad phase:** query the graph's R\*-tree for edges whose box
//!    overlaps the proposal's box grown by `snap_size`.
//! 2. **Node snap:** among candidate endpoints (other than `source`) that
//!    project onto the proposal at `r ∈ [0, r_max)` within `snap_size` of
//!    its line, keep the one with the smallest `r`. `r_max` starts at
//!    `1 + snap_size / |source target|`, so the road may reach slightly
//!    past its nominal end.
//! 3. **Road snap:** for candidate edges touching neither `source` nor
//!    `target`, a side-of-line test skips edges that cannot intersect;
//!    otherwise the exact intersection is computed, and if it lies on the
//!    edge at a smaller `r` than the current best, it wins.
//! 4. **Fallback:** with nothing found, if `target` lies within
//!    `snap_size` of an edge, snap to the foot of the perpendicular.
//!
//! A split point within `snap_size` of the split edge's endpoint joins
//! that endpoint instead, so no split leaves a piece shorter than
//! `snap_size`. Ties are broken by candidate order, which is edge-index
//! order.

use std::collections::BTreeSet;

use log::trace;

use crate::geometry::{EPSILON, line_intersection, may_intersect, project};
use crate::graph::PlanarGraph;
use crate::types::{GeometryError, Point, Segment};

/// Where a proposed road ends up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnapOutcome {
    /// Nothing nearby: the road ends at a new vertex at this point.
    NoSnap(Point),

    /// The road ends at this existing vertex.
    NodeSnap(Point),

    /// The road ends at `point`, interior to the existing edge `road`,
    /// which must be split there.
    RoadSnap {
        /// The edge to split.
        road: Segment,
        /// The split point.
        point: Point,
    },
}

impl SnapOutcome {
    /// The endpoint the road would have.
    #[must_use]
    pub const fn endpoint(&self) -> Point {
        match *self {
            Self::NoSnap(p) | Self::NodeSnap(p) | Self::RoadSnap { point: p, .. } => p,
        }
    }

    /// Whether the road attaches to existing geometry.
    #[must_use]
    pub const fn is_snap(&self) -> bool {
        !matches!(self, Self::NoSnap(_))
    }
}

/// Best candidate so far, with its parameter along the proposal.
struct Best {
    r: f64,
    outcome: Option<SnapOutcome>,
}

/// Resolve the proposed road `source → target` against `graph`.
///
/// The returned endpoint is never `source` itself.
///
/// # Errors
///
/// Returns [`GeometryError::DegenerateSegment`] if `source` and `target`
/// coincide.
pub fn resolve(
    graph: &PlanarGraph,
    source: Point,
    target: Point,
    snap_size: f64,
) -> Result<SnapOutcome, GeometryError> {
    let length = source.distance(target);
    if length <= EPSILON {
        return Err(GeometryError::DegenerateSegment { at: source });
    }

    let candidates = graph.edges_near(source, target, snap_size);
    let mut best = Best {
        r: 1.0 + snap_size / length,
        outcome: None,
    };
    let reach = best.r;

    snap_to_nodes(&candidates, source, target, snap_size, &mut best)?;
    snap_to_roads(&candidates, source, target, reach, snap_size, &mut best)?;

    if let Some(outcome) = best.outcome {
        trace!(
            "snap ({}, {}) -> ({}, {}): {outcome:?}",
            source.x, source.y, target.x, target.y
        );
        return Ok(outcome);
    }

    fallback(&candidates, source, target, snap_size)
}

fn snap_to_nodes(
    candidates: &[Segment],
    source: Point,
    target: Point,
    snap_size: f64,
    best: &mut Best,
) -> Result<(), GeometryError> {
    let mut seen = BTreeSet::new();
    for v in candidates.iter().flat_map(|e| [e.a, e.b]) {
        if v.distance(source) <= EPSILON || !seen.insert(v.key()) {
            continue;
        }
        let proj = project(v, source, target)?;
        if proj.r >= 0.0 && proj.r < best.r && proj.distance <= snap_size {
            best.r = proj.r;
            best.outcome = Some(SnapOutcome::NodeSnap(v));
        }
    }
    Ok(())
}

fn snap_to_roads(
    candidates: &[Segment],
    source: Point,
    target: Point,
    reach: f64,
    snap_size: f64,
    best: &mut Best,
) -> Result<(), GeometryError> {
    for road in candidates {
        if road.touches(source)
            || road.touches(target)
            || !may_intersect(source, target, reach, road.a, road.b)
        {
            continue;
        }
        let hit = match line_intersection(source, target, road.a, road.b) {
            Ok(hit) => hit,
            Err(GeometryError::ParallelLines) => continue,
            Err(e) => return Err(e),
        };
        let on_road = (0.0..=1.0).contains(&hit.r_second);
        let ahead = hit.r_first > EPSILON && hit.r_first < best.r;
        if !on_road || !ahead || hit.point.distance(source) <= EPSILON {
            continue;
        }
        let outcome = split_or_join(*road, hit.point, hit.r_second, snap_size);
        if outcome.endpoint().distance(source) > EPSILON {
            best.r = hit.r_first;
            best.outcome = Some(outcome);
        }
    }
    Ok(())
}

fn fallback(
    candidates: &[Segment],
    source: Point,
    target: Point,
    snap_size: f64,
) -> Result<SnapOutcome, GeometryError> {
    let mut nearest: Option<(f64, SnapOutcome)> = None;
    for road in candidates {
        if road.touches(source) {
            continue;
        }
        let proj = project(target, road.a, road.b)?;
        if !(0.0..=1.0).contains(&proj.r) || proj.distance > snap_size {
            continue;
        }
        if nearest.as_ref().is_some_and(|(d, _)| *d <= proj.distance) {
            continue;
        }
        let outcome = split_or_join(*road, proj.foot, proj.r, snap_size);
        if outcome.endpoint().distance(source) > EPSILON {
            nearest = Some((proj.distance, outcome));
        }
    }
    Ok(nearest.map_or(SnapOutcome::NoSnap(target), |(_, outcome)| outcome))
}

/// Split `road` at `point` (parameter `r` along it), or join the nearer
/// endpoint when the point is within `snap_size` of it.
fn split_or_join(road: Segment, point: Point, r: f64, snap_size: f64) -> SnapOutcome {
    let (to_a, to_b) = (point.distance(road.a), point.distance(road.b));
    if r <= EPSILON || r >= 1.0 - EPSILON || to_a.min(to_b) <= snap_size {
        SnapOutcome::NodeSnap(if to_a <= to_b { road.a } else { road.b })
    } else {
        SnapOutcome::RoadSnap { road, point }
    }
}
