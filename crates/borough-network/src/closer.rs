//! Loose-end closing: extend every dead-end road straight ahead until it
//! meets the network.
//!
//! A loose end first probes `snap_size` ahead. If that finds nothing it
//! probes across the whole region (the ring's bounding-box diagonal plus
//! `snap_size`), which from inside a closed ring always meets something.

use log::{debug, warn};

use crate::geometry::EPSILON;
use crate::grower::DirectionFromPoint;
use crate::region::RegionGraph;
use crate::snap::{SnapOutcome, resolve};
use crate::types::{GenerationError, GeometryError};

/// Outcome counts of [`close_loose_ends`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClosingReport {
    /// Loose ends connected to the network.
    pub closed: usize,
    /// Loose ends left open because every connection would cross or
    /// duplicate a road.
    pub left_open: usize,
}

/// Connect each loose end (still of degree one) to the nearest geometry
/// straight ahead of it.
///
/// # Errors
///
/// Returns [`GeometryError::UnresolvedLooseEnd`] if neither probe finds
/// anything to snap to, and propagates graph failures.
pub fn close_loose_ends(
    region: &mut RegionGraph,
    loose_ends: &[DirectionFromPoint],
    snap_size: f64,
) -> Result<ClosingReport, GenerationError> {
    let mut report = ClosingReport::default();
    let reach = region.diagonal() + snap_size;

    for end in loose_ends {
        let vertex = end.vertex;
        if region.graph().degree(vertex) != 1 {
            continue;
        }

        let mut found = None;
        for probe in [snap_size, reach] {
            if probe <= EPSILON {
                continue;
            }
            let target = vertex.offset(end.direction, probe);
            let outcome = resolve(region.graph(), vertex, target, snap_size)?;
            let usable = match outcome {
                SnapOutcome::NoSnap(_) => false,
                SnapOutcome::NodeSnap(v) => !region.graph().has_edge(vertex, v),
                SnapOutcome::RoadSnap { .. } => true,
            };
            if usable {
                found = Some(outcome);
                break;
            }
            if outcome.is_snap() {
                found = Some(outcome);
            }
        }

        let Some(outcome) = found else {
            return Err(GeometryError::UnresolvedLooseEnd { vertex }.into());
        };
        let joint = outcome.endpoint();
        let redundant =
            matches!(outcome, SnapOutcome::NodeSnap(v) if region.graph().has_edge(vertex, v));
        if redundant || region.graph().crosses_existing(vertex, joint) {
            warn!(
                "loose end at ({}, {}) left open: no connection without crossing a road",
                vertex.x, vertex.y
            );
            report.left_open += 1;
            continue;
        }

        match outcome {
            SnapOutcome::NodeSnap(v) => region.add_road(vertex, v)?,
            SnapOutcome::RoadSnap { road, point } => {
                region.split_road(road, point)?;
                region.add_road(vertex, point)?;
            }
            SnapOutcome::NoSnap(_) => {}
        }
        report.closed += 1;
    }

    debug!(
        "closed {} loose ends, {} left open",
        report.closed, report.left_open
    );
    Ok(report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cycles::Cycle;
    use crate::types::{Point, Segment};

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    fn square_region() -> RegionGraph {
        let ring =
            Cycle::from_ring(vec![p(0.0, 0.0), p(100.0, 0.0), p(100.0, 100.0), p(0.0, 100.0)])
                .unwrap();
        RegionGraph::new(&ring, &[]).unwrap()
    }

    fn end(x: f64, y: f64, direction: f64) -> DirectionFromPoint {
        DirectionFromPoint {
            vertex: p(x, y),
            direction,
        }
    }

    #[test]
    fn loose_end_reaches_far_wall() {
        let mut region = square_region();
        region.add_road(p(50.0, 50.0), p(50.0, 60.0)).unwrap();

        let report = close_loose_ends(
            &mut region,
            &[end(50.0, 60.0, std::f64::consts::FRAC_PI_2)],
            3.0,
        )
        .unwrap();
        assert_eq!(report.closed, 1);
        assert_eq!(region.graph().degree(p(50.0, 60.0)), 2);
        let reached = region
            .graph()
            .neighbors(p(50.0, 60.0))
            .unwrap()
            .into_iter()
            .find(|v| v.y > 60.0)
            .unwrap();
        assert!((reached.x - 50.0).abs() < 1e-9);
        assert!((reached.y - 100.0).abs() < 1e-9);
    }

    #[test]
    fn loose_end_snaps_to_nearby_vertex() {
        let mut region = square_region();
        let right = Segment::new(p(100.0, 0.0), p(100.0, 100.0)).unwrap();
        region.split_road(right, p(100.0, 50.0)).unwrap();
        region.add_road(p(50.0, 50.0), p(98.0, 50.0)).unwrap();

        let report = close_loose_ends(&mut region, &[end(98.0, 50.0, 0.0)], 3.0).unwrap();
        assert_eq!(report.closed, 1);
        assert!(region.graph().has_edge(p(98.0, 50.0), p(100.0, 50.0)));
    }

    #[test]
    fn open_space_without_walls_is_unresolved() {
        let ring = Cycle::from_ring(vec![p(0.0, 0.0), p(10.0, 0.0), p(0.0, 10.0)]).unwrap();
        let mut region = RegionGraph::new(&ring, &[]).unwrap();
        region.add_road(p(200.0, 200.0), p(210.0, 200.0)).unwrap();
        let result = close_loose_ends(&mut region, &[end(210.0, 200.0, 0.0)], 1.0);
        assert!(matches!(
            result,
            Err(GenerationError::Geometry(GeometryError::UnresolvedLooseEnd { .. }))
        ));
    }

    #[test]
    fn already_connected_ends_are_skipped() {
        let mut region = square_region();
        let report = close_loose_ends(&mut region, &[end(0.0, 0.0, 0.0)], 3.0).unwrap();
        assert_eq!(report, ClosingReport::default());
    }
}
