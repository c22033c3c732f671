//! Planar geometry primitives: projection onto lines, line and segment
//! intersection, envelopes, ring area and containment.
//!
//! Everything here works on crate [`Point`]s. Conversion to `geo` types
//! happens at the module boundary, only where `geo` does the work.

use geo::{Contains, Coord, LineString, Polygon};
use rstar::AABB;

use crate::types::{GeometryError, Point};

/// Tolerance for treating floating-point quantities as zero.
///
/// Applies to normalized line parameters and to distances in world
/// units alike; generated coordinates are expected to be far larger.
pub const EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Type conversions at the module boundary
// ---------------------------------------------------------------------------

/// Convert a crate `Point` to a `geo::Coord`.
pub(crate) const fn point_to_coord(p: Point) -> Coord<f64> {
    Coord { x: p.x, y: p.y }
}

/// Convert a crate `Point` to a `geo::Point` (the R-tree's envelope type).
pub(crate) const fn point_to_geo(p: Point) -> geo::Point<f64> {
    geo::Point(point_to_coord(p))
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// Result of projecting a point onto the infinite line through `a` and `b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Normalized parameter of the foot: `0` at `a`, `1` at `b`.
    pub r: f64,
    /// Perpendicular distance from the point to the line.
    pub distance: f64,
    /// Foot of the perpendicular.
    pub foot: Point,
}

/// Project `p` onto the line through `a` and `b`.
///
/// # Errors
///
/// Returns [`GeometryError::DegenerateLine`] if `a == b`.
pub fn project(p: Point, a: Point, b: Point) -> Result<Projection, GeometryError> {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx.mul_add(dx, dy * dy);
    if len_sq <= EPSILON * EPSILON {
        return Err(GeometryError::DegenerateLine { at: a });
    }
    let r = (p.x - a.x).mul_add(dx, (p.y - a.y) * dy) / len_sq;
    let foot = a.lerp(b, r);
    Ok(Projection {
        r,
        distance: p.distance(foot),
        foot,
    })
}

/// Signed area of the parallelogram spanned by `a→b` and `a→p`.
///
/// Positive when `p` is to the left of `a→b`.
#[must_use]
pub fn orient(a: Point, b: Point, p: Point) -> f64 {
    (b.x - a.x).mul_add(p.y - a.y, -((b.y - a.y) * (p.x - a.x)))
}

// ---------------------------------------------------------------------------
// Intersection
// ---------------------------------------------------------------------------

/// Intersection of two infinite lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineIntersection {
    /// The intersection point.
    pub point: Point,
    /// Parameter along the first line (`0` at `a1`, `1` at `a2`).
    pub r_first: f64,
    /// Parameter along the second line (`0` at `b1`, `1` at `b2`).
    pub r_second: f64,
}

/// Intersect the line through `a1, a2` with the line through `b1, b2`.
///
/// # Errors
///
/// Returns [`GeometryError::ParallelLines`] if the lines are parallel
/// (including collinear), or [`GeometryError::DegenerateLine`] if either
/// line is defined by two identical points.
pub fn line_intersection(
    a1: Point,
    a2: Point,
    b1: Point,
    b2: Point,
) -> Result<LineIntersection, GeometryError> {
    if a1 == a2 {
        return Err(GeometryError::DegenerateLine { at: a1 });
    }
    if b1 == b2 {
        return Err(GeometryError::DegenerateLine { at: b1 });
    }
    let (dax, day) = (a2.x - a1.x, a2.y - a1.y);
    let (dbx, dby) = (b2.x - b1.x, b2.y - b1.y);
    let denom = dax.mul_add(dby, -(day * dbx));
    let scale = dax.hypot(day) * dbx.hypot(dby);
    if denom.abs() <= EPSILON * scale {
        return Err(GeometryError::ParallelLines);
    }
    let (ox, oy) = (b1.x - a1.x, b1.y - a1.y);
    let r_first = ox.mul_add(dby, -(oy * dbx)) / denom;
    let r_second = ox.mul_add(day, -(oy * dax)) / denom;
    Ok(LineIntersection {
        point: a1.lerp(a2, r_first),
        r_first,
        r_second,
    })
}

/// Cheap rejection test: can segment `a1→a2` (extended to parameter
/// `reach`) possibly intersect segment `b1→b2`?
///
/// Returns `false` when both endpoints of one segment lie strictly on the
/// same side of the other's line, or when the two are parallel.
#[must_use]
pub fn may_intersect(a1: Point, a2: Point, reach: f64, b1: Point, b2: Point) -> bool {
    let a_end = a1.lerp(a2, reach);
    let s1 = orient(a1, a2, b1);
    let s2 = orient(a1, a2, b2);
    if s1 * s2 > 0.0 {
        return false;
    }
    let s3 = orient(b1, b2, a1);
    let s4 = orient(b1, b2, a_end);
    if s3 * s4 > 0.0 {
        return false;
    }
    // Both endpoints of b on a's line: parallel or collinear.
    !(s1 == 0.0 && s2 == 0.0)
}

/// Whether two segments cross at a point interior to both.
///
/// Touching at an endpoint, or meeting at a shared vertex, is not a
/// crossing. Parallel and collinear segments never cross.
#[must_use]
pub fn segments_cross(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    if !bounding_boxes_overlap(a1, a2, b1, b2) {
        return false;
    }
    match line_intersection(a1, a2, b1, b2) {
        Ok(hit) => {
            let inside = |r: f64| r > EPSILON && r < 1.0 - EPSILON;
            inside(hit.r_first) && inside(hit.r_second)
        }
        Err(_) => false,
    }
}

/// Whether the axis-aligned boxes of two segments overlap.
#[must_use]
pub fn bounding_boxes_overlap(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    a1.x.min(a2.x) <= b1.x.max(b2.x)
        && b1.x.min(b2.x) <= a1.x.max(a2.x)
        && a1.y.min(a2.y) <= b1.y.max(b2.y)
        && b1.y.min(b2.y) <= a1.y.max(a2.y)
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// Axis-aligned query box around segment `a→b`, grown by `margin` on
/// every side.
#[must_use]
pub fn segment_envelope(a: Point, b: Point, margin: f64) -> AABB<geo::Point<f64>> {
    AABB::from_corners(
        point_to_geo(Point::new(a.x.min(b.x) - margin, a.y.min(b.y) - margin)),
        point_to_geo(Point::new(a.x.max(b.x) + margin, a.y.max(b.y) + margin)),
    )
}

/// Axis-aligned bounding box of a point set as `(min, max)` corners.
///
/// Returns `None` for an empty set.
#[must_use]
pub fn bounding_box(points: impl IntoIterator<Item = Point>) -> Option<(Point, Point)> {
    points.into_iter().fold(None, |acc, p| match acc {
        None => Some((p, p)),
        Some((lo, hi)) => Some((
            Point::new(lo.x.min(p.x), lo.y.min(p.y)),
            Point::new(hi.x.max(p.x), hi.y.max(p.y)),
        )),
    })
}

// ---------------------------------------------------------------------------
// Rings
// ---------------------------------------------------------------------------

/// Signed area of a ring (shoelace formula). The ring is implicitly
/// closed: the last vertex connects back to the first.
///
/// Positive for counter-clockwise rings.
#[must_use]
pub fn signed_area(ring: &[Point]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f64 = (0..n)
        .map(|i| {
            let p = ring[i];
            let q = ring[(i + 1) % n];
            p.x.mul_add(q.y, -(q.x * p.y))
        })
        .sum();
    twice / 2.0
}

/// Build a `geo::Polygon` from an implicitly closed ring.
#[must_use]
pub fn ring_to_polygon(ring: &[Point]) -> Polygon<f64> {
    let coords: Vec<Coord<f64>> = ring.iter().copied().map(point_to_coord).collect();
    Polygon::new(LineString::from(coords), Vec::new())
}

/// Whether `p` lies strictly inside the ring (not on its boundary).
#[must_use]
pub fn ring_contains(ring: &[Point], p: Point) -> bool {
    ring_to_polygon(ring).contains(&point_to_geo(p))
}
