//! Deviated path sampler: turn a straight topology edge into an organic
//! polyline by growing from both ends towards each other.
//!
//! Each step fans `samples_per_step` candidate points at distance
//! `sample_radius` around the bearing towards the opposite end, within
//! `±deviation_angle`, and a selection strategy keeps one of them. The
//! two ends alternate until they are within `sample_stop_distance`.

use log::trace;
use rand::Rng;

use crate::geometry::EPSILON;
use crate::types::{GeometryError, Point, SampleSelectionKind};

/// Parameters for [`sample_path`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerParams {
    /// Distance of every step.
    pub sample_radius: f64,
    /// Candidates per fan.
    pub samples_per_step: usize,
    /// Fan half-width in radians.
    pub deviation_angle: f64,
    /// Stop once the two ends are this close.
    pub stop_distance: f64,
}

/// The fan of candidate points for one step from `from` towards `to`.
///
/// With a single sample the fan is just the direct bearing; otherwise the
/// candidates are spread evenly from `bearing - θ` to `bearing + θ`.
#[must_use]
pub fn fan(from: Point, to: Point, params: &SamplerParams) -> Vec<Point> {
    let bearing = from.bearing_to(to);
    let n = params.samples_per_step;
    if n <= 1 {
        return vec![from.offset(bearing, params.sample_radius)];
    }
    #[allow(clippy::cast_precision_loss)]
    let spacing = 2.0 * params.deviation_angle / (n - 1) as f64;
    (0..n)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let angle = (i as f64).mul_add(spacing, bearing - params.deviation_angle);
            from.offset(angle, params.sample_radius)
        })
        .collect()
}

/// Upper bound on steps before the sampler is considered divergent.
fn step_limit(start: Point, end: Point, params: &SamplerParams) -> usize {
    let progress = params.sample_radius * params.deviation_angle.cos();
    let steps = (start.distance(end) / progress).ceil();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let steps = if steps.is_finite() { steps as usize } else { 0 };
    steps.saturating_mul(2).saturating_add(8)
}

/// Sample an organic path from `start` to `end`.
///
/// Returns the path vertices after `start`, ending with `end` itself:
/// `[f1, …, fk, rm, …, r1, end]` where `f` are the forward samples and
/// `r` the reverse samples, so consecutive entries form the polyline.
///
/// `select` picks one point from each non-empty fan.
///
/// # Errors
///
/// Returns [`GeometryError::DegenerateSegment`] if `start == end` and
/// [`GeometryError::SamplerDiverged`] if the ends fail to meet within a
/// step budget derived from the initial distance.
pub fn sample_path(
    start: Point,
    end: Point,
    params: &SamplerParams,
    mut select: impl FnMut(&[Point]) -> Point,
) -> Result<Vec<Point>, GeometryError> {
    if start.distance(end) <= EPSILON {
        return Err(GeometryError::DegenerateSegment { at: start });
    }

    let limit = step_limit(start, end, params);
    let mut forward: Vec<Point> = Vec::new();
    let mut reverse: Vec<Point> = Vec::new();
    let mut front = start;
    let mut back = end;
    let mut steps = 0;
    let mut from_front = true;

    while front.distance(back) >= params.stop_distance {
        if steps >= limit {
            return Err(GeometryError::SamplerDiverged { steps });
        }
        steps += 1;
        if from_front {
            front = select(&fan(front, back, params));
            forward.push(front);
        } else {
            back = select(&fan(back, front, params));
            reverse.push(back);
        }
        from_front = !from_front;
    }

    // The ends may land on top of each other; keep only one of them.
    if front.distance(back) <= EPSILON && reverse.pop().is_none() {
        forward.pop();
    }

    trace!(
        "sampled path ({}, {}) -> ({}, {}) in {steps} steps",
        start.x, start.y, end.x, end.y
    );

    let mut path = forward;
    path.extend(reverse.into_iter().rev());
    path.push(end);
    Ok(path)
}

/// Pick one candidate from a fan according to `kind`.
///
/// `Straightest` consumes no randomness; `Random` draws exactly one index.
/// `candidates` must be non-empty, which every [`fan`] is.
pub fn select_sample<R: Rng>(kind: SampleSelectionKind, candidates: &[Point], rng: &mut R) -> Point {
    match kind {
        SampleSelectionKind::Straightest => candidates[candidates.len() / 2],
        SampleSelectionKind::Random => candidates[rng.gen_range(0..candidates.len())],
    }
}
