//! Shared types for the borough network generator.

use std::cmp::Ordering;
use std::f64::consts::{FRAC_PI_4, TAU};

use serde::{Deserialize, Serialize};

/// A 2D point in world coordinates.
///
/// Equality is by value. Two points that compare equal are the same
/// graph vertex.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Bearing from `self` towards `other`, in radians.
    #[must_use]
    pub fn bearing_to(self, other: Self) -> f64 {
        (other.y - self.y).atan2(other.x - self.x)
    }

    /// The point `distance` away from `self` along `angle` (radians).
    #[must_use]
    pub fn offset(self, angle: f64, distance: f64) -> Self {
        Self::new(
            distance.mul_add(angle.cos(), self.x),
            distance.mul_add(angle.sin(), self.y),
        )
    }

    /// Linear interpolation: `t = 0` is `self`, `t = 1` is `other`.
    #[must_use]
    pub fn lerp(self, other: Self, t: f64) -> Self {
        Self::new(
            t.mul_add(other.x - self.x, self.x),
            t.mul_add(other.y - self.y, self.y),
        )
    }

    /// Whether both coordinates are finite.
    #[must_use]
    pub const fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Hashable, totally ordered identity of this point.
    #[must_use]
    pub const fn key(self) -> PointKey {
        PointKey::from_point(self)
    }
}

/// Bit-exact identity of a [`Point`], usable as a map key.
///
/// `-0.0` is folded into `0.0` so the key agrees with `f64` equality.
/// Ordering is lexicographic by `(x, y)`, so the smallest key is the
/// leftmost (then lowest) point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointKey {
    x_bits: u64,
    y_bits: u64,
}

impl PointKey {
    const fn from_point(p: Point) -> Self {
        // `-0.0 + 0.0 == +0.0`, every other value is unchanged.
        Self {
            x_bits: (p.x + 0.0).to_bits(),
            y_bits: (p.y + 0.0).to_bits(),
        }
    }

    /// The point this key identifies.
    #[must_use]
    pub const fn point(self) -> Point {
        Point::new(f64::from_bits(self.x_bits), f64::from_bits(self.y_bits))
    }

    /// Raw bit patterns, used to derive stable hashes.
    #[must_use]
    pub const fn bits(self) -> (u64, u64) {
        (self.x_bits, self.y_bits)
    }
}

impl Ord for PointKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.point();
        let b = other.point();
        a.x.total_cmp(&b.x).then_with(|| a.y.total_cmp(&b.y))
    }
}

impl PartialOrd for PointKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An unordered pair of two distinct points.
///
/// `Segment::new(a, b) == Segment::new(b, a)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Segment {
    /// First endpoint (as given at construction).
    pub a: Point,
    /// Second endpoint (as given at construction).
    pub b: Point,
}

impl Segment {
    /// Create a segment between two distinct points.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::DegenerateSegment`] if `a == b` or either
    /// point is not finite.
    pub fn new(a: Point, b: Point) -> Result<Self, GeometryError> {
        if a == b || !a.is_finite() || !b.is_finite() {
            return Err(GeometryError::DegenerateSegment { at: a });
        }
        Ok(Self { a, b })
    }

    /// Build a segment from endpoints already known to be distinct
    /// (e.g. read back from a [`PlanarGraph`](crate::graph::PlanarGraph)).
    pub(crate) const fn from_distinct(a: Point, b: Point) -> Self {
        Self { a, b }
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.a.distance(self.b)
    }

    /// Midpoint. Exactly the same point whichever way round the
    /// endpoints are stored.
    #[must_use]
    pub fn midpoint(&self) -> Point {
        Point::new((self.a.x + self.b.x) * 0.5, (self.a.y + self.b.y) * 0.5)
    }

    /// Whether `p` is one of the two endpoints.
    #[must_use]
    pub fn touches(&self, p: Point) -> bool {
        self.a == p || self.b == p
    }

    /// Whether the two segments share at least one endpoint.
    #[must_use]
    pub fn shares_endpoint(&self, other: &Self) -> bool {
        self.touches(other.a) || self.touches(other.b)
    }

    /// Order-independent identity, usable as a map key.
    #[must_use]
    pub fn key(&self) -> SegmentKey {
        let ka = self.a.key();
        let kb = self.b.key();
        if ka <= kb {
            SegmentKey(ka, kb)
        } else {
            SegmentKey(kb, ka)
        }
    }
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

/// Order-independent identity of a [`Segment`]: its endpoint keys, sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentKey(pub PointKey, pub PointKey);

impl SegmentKey {
    /// The segment this key identifies, with endpoints in key order.
    #[must_use]
    pub const fn segment(self) -> Segment {
        Segment::from_distinct(self.0.point(), self.1.point())
    }
}

/// How the deviated path sampler picks one point from each fan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SampleSelectionKind {
    /// Pick a fan candidate uniformly at random.
    #[default]
    Random,

    /// Always pick the central candidate (the one closest to the direct
    /// bearing). Consumes no randomness.
    Straightest,
}

/// Configuration for network generation.
///
/// All parameters are validated together by [`validate`](Self::validate)
/// before any generation work starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// Step length when sampling a low-level path along a topology edge.
    pub sample_radius: f64,

    /// Number of candidate points in each sampling fan.
    ///
    /// Must be `1` exactly when `deviation_angle` is `0`.
    pub samples_per_step: usize,

    /// Half-width of the sampling fan in radians, in `[0, π/4)`.
    pub deviation_angle: f64,

    /// The sampler stops once its two growing ends are within this
    /// distance. Must exceed `sample_radius · cos(deviation_angle)`.
    pub sample_stop_distance: f64,

    /// Which fan candidate the sampler keeps.
    pub sample_selection: SampleSelectionKind,

    /// Number of evenly spaced directions around a growth node; one of
    /// them points back along the incoming road, so a node attempts
    /// `roads_from_point - 1` branches.
    pub roads_from_point: usize,

    /// Probability in `[0, 1]` that an eligible snap is taken rather
    /// than the branch being discarded.
    pub connectivity: f64,

    /// Nominal length of a secondary road segment.
    pub road_segment_length: f64,

    /// Maximum absolute deviation from `road_segment_length`.
    pub road_length_deviation: f64,

    /// Snap radius: how close new geometry must come to existing
    /// geometry to merge with it.
    pub snap_size: f64,

    /// Maximum number of seed points placed on each cycle's boundary.
    pub max_start_points_per_cell: usize,

    /// Maximum random deviation of a branch direction, in `[0, 2π)`.
    pub road_deviation_angle: f64,

    /// Maximum number of growth-queue pops per cycle. Bounds runaway
    /// growth; nodes still queued when the cap is hit become loose ends.
    pub max_growth_steps: usize,

    /// Seed for all randomness. Same seed and inputs produce the same city.
    pub seed: u64,
}

impl NetworkConfig {
    /// Default sampling step length.
    pub const DEFAULT_SAMPLE_RADIUS: f64 = 10.0;
    /// Default fan size.
    pub const DEFAULT_SAMPLES_PER_STEP: usize = 5;
    /// Default fan half-width (about 20 degrees).
    pub const DEFAULT_DEVIATION_ANGLE: f64 = 0.35;
    /// Default sampler stop distance.
    pub const DEFAULT_SAMPLE_STOP_DISTANCE: f64 = 15.0;
    /// Default sampling strategy.
    pub const DEFAULT_SAMPLE_SELECTION: SampleSelectionKind = SampleSelectionKind::Random;
    /// Default directions per growth node.
    pub const DEFAULT_ROADS_FROM_POINT: usize = 4;
    /// Default snap acceptance probability.
    pub const DEFAULT_CONNECTIVITY: f64 = 0.8;
    /// Default secondary road length.
    pub const DEFAULT_ROAD_SEGMENT_LENGTH: f64 = 12.0;
    /// Default road length deviation.
    pub const DEFAULT_ROAD_LENGTH_DEVIATION: f64 = 3.0;
    /// Default snap radius.
    pub const DEFAULT_SNAP_SIZE: f64 = 3.0;
    /// Default seeds per cycle.
    pub const DEFAULT_MAX_START_POINTS_PER_CELL: usize = 3;
    /// Default branch direction deviation.
    pub const DEFAULT_ROAD_DEVIATION_ANGLE: f64 = 0.3;
    /// Default growth cap per cycle.
    pub const DEFAULT_MAX_GROWTH_STEPS: usize = 4096;
    /// Default random seed.
    pub const DEFAULT_SEED: u64 = 0;

    /// Check every parameter range.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::InvalidConfig`] naming the first
    /// offending field.
    pub fn validate(&self) -> Result<(), GenerationError> {
        let invalid = |msg: String| Err(GenerationError::InvalidConfig(msg));

        if !(self.sample_radius > 0.0 && self.sample_radius.is_finite()) {
            return invalid(format!(
                "sample_radius must be positive, got {}",
                self.sample_radius
            ));
        }
        if self.samples_per_step < 1 {
            return invalid("samples_per_step must be at least 1".to_string());
        }
        if !(0.0..FRAC_PI_4).contains(&self.deviation_angle) {
            return invalid(format!(
                "deviation_angle must be in [0, π/4), got {}",
                self.deviation_angle
            ));
        }
        if (self.samples_per_step == 1) != (self.deviation_angle == 0.0) {
            return invalid(format!(
                "samples_per_step must be 1 exactly when deviation_angle is 0 \
                 (samples_per_step={}, deviation_angle={})",
                self.samples_per_step, self.deviation_angle
            ));
        }
        let min_stop = self.sample_radius * self.deviation_angle.cos();
        if !(self.sample_stop_distance > min_stop && self.sample_stop_distance.is_finite()) {
            return invalid(format!(
                "sample_stop_distance must exceed sample_radius·cos(deviation_angle) = {min_stop}, got {}",
                self.sample_stop_distance
            ));
        }
        if self.roads_from_point < 2 {
            return invalid(format!(
                "roads_from_point must be at least 2, got {}",
                self.roads_from_point
            ));
        }
        if !(0.0..=1.0).contains(&self.connectivity) {
            return invalid(format!(
                "connectivity must be in [0, 1], got {}",
                self.connectivity
            ));
        }
        if !(self.road_segment_length > 0.0 && self.road_segment_length.is_finite()) {
            return invalid(format!(
                "road_segment_length must be positive, got {}",
                self.road_segment_length
            ));
        }
        if !(0.0..self.road_segment_length).contains(&self.road_length_deviation) {
            return invalid(format!(
                "road_length_deviation must be in [0, road_segment_length), got {}",
                self.road_length_deviation
            ));
        }
        if !(self.snap_size >= 0.0 && self.snap_size.is_finite()) {
            return invalid(format!(
                "snap_size must be non-negative, got {}",
                self.snap_size
            ));
        }
        if self.max_start_points_per_cell < 1 {
            return invalid("max_start_points_per_cell must be at least 1".to_string());
        }
        if !(0.0..TAU).contains(&self.road_deviation_angle) {
            return invalid(format!(
                "road_deviation_angle must be in [0, 2π), got {}",
                self.road_deviation_angle
            ));
        }
        if self.max_growth_steps < 1 {
            return invalid("max_growth_steps must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            sample_radius: Self::DEFAULT_SAMPLE_RADIUS,
            samples_per_step: Self::DEFAULT_SAMPLES_PER_STEP,
            deviation_angle: Self::DEFAULT_DEVIATION_ANGLE,
            sample_stop_distance: Self::DEFAULT_SAMPLE_STOP_DISTANCE,
            sample_selection: Self::DEFAULT_SAMPLE_SELECTION,
            roads_from_point: Self::DEFAULT_ROADS_FROM_POINT,
            connectivity: Self::DEFAULT_CONNECTIVITY,
            road_segment_length: Self::DEFAULT_ROAD_SEGMENT_LENGTH,
            road_length_deviation: Self::DEFAULT_ROAD_LENGTH_DEVIATION,
            snap_size: Self::DEFAULT_SNAP_SIZE,
            max_start_points_per_cell: Self::DEFAULT_MAX_START_POINTS_PER_CELL,
            road_deviation_angle: Self::DEFAULT_ROAD_DEVIATION_ANGLE,
            max_growth_steps: Self::DEFAULT_MAX_GROWTH_STEPS,
            seed: Self::DEFAULT_SEED,
        }
    }
}

/// Degenerate or inconsistent geometry.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum GeometryError {
    /// A segment was built from two identical (or non-finite) points.
    #[error("zero-length segment at ({}, {})", at.x, at.y)]
    DegenerateSegment {
        /// The repeated point.
        at: Point,
    },

    /// A line was defined by two identical points.
    #[error("line through ({}, {}) is undefined: both points coincide", at.x, at.y)]
    DegenerateLine {
        /// The repeated point.
        at: Point,
    },

    /// An intersection was requested between two parallel lines.
    #[error("cannot intersect parallel lines")]
    ParallelLines,

    /// Two edges of an input graph cross away from a shared endpoint.
    #[error(
        "input graph self-intersects: ({}, {})-({}, {}) crosses ({}, {})-({}, {})",
        first.a.x, first.a.y, first.b.x, first.b.y,
        second.a.x, second.a.y, second.b.x, second.b.y
    )]
    SelfIntersection {
        /// One of the crossing edges.
        first: Segment,
        /// The other crossing edge.
        second: Segment,
    },

    /// A loose end found nothing to connect to, even at full reach.
    #[error("loose end at ({}, {}) has no snap target", vertex.x, vertex.y)]
    UnresolvedLooseEnd {
        /// The dangling vertex.
        vertex: Point,
    },

    /// The path sampler failed to converge.
    #[error("path sampler did not converge after {steps} steps")]
    SamplerDiverged {
        /// Steps taken before giving up.
        steps: usize,
    },
}

/// Planar graph bookkeeping errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum GraphError {
    /// The point is not a vertex of the graph.
    #[error("({}, {}) is not a vertex", at.x, at.y)]
    UnknownVertex {
        /// The missing vertex.
        at: Point,
    },

    /// The edge is already present.
    #[error("edge ({}, {})-({}, {}) already exists", edge.a.x, edge.a.y, edge.b.x, edge.b.y)]
    DuplicateEdge {
        /// The duplicated edge.
        edge: Segment,
    },

    /// The edge is not present.
    #[error("edge ({}, {})-({}, {}) does not exist", edge.a.x, edge.a.y, edge.b.x, edge.b.y)]
    MissingEdge {
        /// The missing edge.
        edge: Segment,
    },

    /// An edge from a vertex to itself was requested.
    #[error("edge from ({}, {}) to itself", at.x, at.y)]
    DegenerateEdge {
        /// The vertex.
        at: Point,
    },
}

/// Errors that can occur during network generation.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum GenerationError {
    /// Configuration or input shape is out of range.
    #[error("invalid network configuration: {0}")]
    InvalidConfig(String),

    /// Degenerate geometry.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Graph bookkeeping failure.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The input topology or boundary graph has no edges.
    #[error("input graph has no edges")]
    EmptyTopology,

    /// Growth produced no roads in any region.
    #[error("no road network was produced in any region")]
    NoContent,

    /// An internal invariant was broken; this is a bug.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
}
