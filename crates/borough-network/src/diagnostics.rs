//! Generation diagnostics: timing, counts, and other metrics for each stage.
//!
//! Every call to [`generate_with_diagnostics`](crate::generate_with_diagnostics)
//! collects these alongside the city. Time is read through the [`Clock`]
//! trait so the library never touches a platform timer itself; the plain
//! [`generate`](crate::generate) entry points use [`NoopClock`].
//!
//! Durations go over the wire as `f64` seconds.

use std::fmt::Write as _;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// `#[serde(with = "seconds")]` for `Duration` fields.
mod seconds {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format_args!("invalid stage duration {secs}s: {e}")))
    }
}

/// Source of timestamps for stage timing.
pub trait Clock {
    /// An opaque point in time.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// A [`Clock`] that never advances. Every stage reports a zero duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopClock;

impl Clock for NoopClock {
    type Instant = ();

    fn now(&self) -> Self::Instant {}

    fn elapsed(&self, _since: &Self::Instant) -> Duration {
        Duration::ZERO
    }
}

/// Diagnostics collected from a single generation run.
///
/// Topology sampling only runs when generation starts from a
/// [`TopologyGraph`](crate::TopologyGraph), so its field is `None` for
/// runs that start from a boundary graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationDiagnostics {
    /// Stage 0: sampling topology edges into organic paths.
    pub topology_sampling: Option<StageDiagnostics>,
    /// Stage 1: input validation and the self-intersection check.
    pub validation: StageDiagnostics,
    /// Stage 2: decomposition of the boundary graph into regions.
    pub decomposition: StageDiagnostics,
    /// Stage 3: per-region seeding, growth, and loose-end closing.
    pub growth: StageDiagnostics,
    /// Stage 4: merging every region into the union graph.
    pub merge: StageDiagnostics,
    /// Stage 5: decomposition of the union graph into blocks.
    pub block_extraction: StageDiagnostics,
    /// Total wall-clock duration of the entire run (seconds).
    #[serde(with = "seconds")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: GenerationSummary,
}

/// Diagnostics for a single generation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "seconds")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Topology sampling metrics.
    TopologySampling {
        /// Edges in the input topology.
        topology_edges: usize,
        /// Edges in the sampled low-level graph.
        low_level_edges: usize,
    },
    /// Validation metrics.
    Validation {
        /// Boundary graph vertices.
        vertices: usize,
        /// Boundary graph edges.
        edges: usize,
    },
    /// Region decomposition metrics.
    Decomposition {
        /// Minimal cycles found (one region each).
        cycles: usize,
        /// Filaments found.
        filaments: usize,
    },
    /// Growth metrics, summed over regions.
    Growth {
        /// Regions grown.
        regions: usize,
        /// Roads grown, loose-end closures included.
        roads: usize,
        /// Seeds that started a branch.
        seeds: usize,
        /// Growth-queue pops.
        steps: usize,
        /// Regions whose growth hit `max_growth_steps`.
        caps_hit: usize,
        /// Loose ends connected.
        loose_ends_closed: usize,
        /// Loose ends left dangling.
        loose_ends_open: usize,
    },
    /// Merge metrics.
    Merge {
        /// Vertices in the union graph.
        vertices: usize,
        /// Edges in the union graph.
        edges: usize,
        /// Points inserted into original boundary edges.
        split_points: usize,
    },
    /// Block extraction metrics.
    BlockExtraction {
        /// Enclosed blocks.
        blocks: usize,
        /// Summed block area.
        total_area: f64,
    },
}

/// High-level summary counts for the entire run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    /// Regions grown.
    pub cycle_count: usize,
    /// Vertices in the final road graph.
    pub vertex_count: usize,
    /// Edges in the final road graph.
    pub edge_count: usize,
    /// Enclosed blocks.
    pub block_count: usize,
    /// Regions whose growth hit the step cap.
    pub growth_caps_hit: usize,
    /// Loose ends left dangling.
    pub open_loose_ends: usize,
}

impl GenerationDiagnostics {
    /// Stages that ran, in pipeline order.
    fn stages(&self) -> impl Iterator<Item = (&'static str, &StageDiagnostics)> {
        self.topology_sampling
            .as_ref()
            .map(|s| ("Topology Sampling", s))
            .into_iter()
            .chain([
                ("Validation", &self.validation),
                ("Decomposition", &self.decomposition),
                ("Growth", &self.growth),
                ("Merge", &self.merge),
                ("Block Extraction", &self.block_extraction),
            ])
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let total = millis(self.total_duration);
        let summary = &self.summary;

        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(out, "Generation Diagnostics Report");
        let _ = writeln!(out, "{}", "=".repeat(60));
        let _ = writeln!(
            out,
            "{} regions -> {} vertices / {} edges in {total:.3}ms",
            summary.cycle_count, summary.vertex_count, summary.edge_count,
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "{:<20} {:>11} {:>7}  detail", "stage", "time", "share");
        let _ = writeln!(out, "{}", "-".repeat(80));

        for (name, stage) in self.stages() {
            let ms = millis(stage.duration);
            let share = if total > 0.0 { 100.0 * ms / total } else { 0.0 };
            let _ = writeln!(
                out,
                "{name:<20} {ms:>9.3}ms {share:>6.1}%  {}",
                format_metrics(&stage.metrics),
            );
        }

        let _ = writeln!(out);
        let _ = write!(
            out,
            "{} blocks, {} open loose ends, growth capped in {} regions",
            summary.block_count, summary.open_loose_ends, summary.growth_caps_hit,
        );
        out
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1e3
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::TopologySampling {
            topology_edges,
            low_level_edges,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let ratio = if *topology_edges > 0 {
                *low_level_edges as f64 / *topology_edges as f64
            } else {
                0.0
            };
            format!("{topology_edges} -> {low_level_edges} edges (x{ratio:.1})")
        }
        StageMetrics::Validation { vertices, edges } => {
            format!("{vertices} vertices, {edges} edges, no crossings")
        }
        StageMetrics::Decomposition { cycles, filaments } => {
            format!("{cycles} cycles, {filaments} filaments")
        }
        StageMetrics::Growth {
            regions,
            roads,
            seeds,
            steps,
            caps_hit,
            loose_ends_closed,
            loose_ends_open,
        } => {
            format!(
                "{regions} regions, {roads} roads, {seeds} seeds, {steps} steps (caps={caps_hit}) loose={loose_ends_closed}/{}",
                loose_ends_closed + loose_ends_open,
            )
        }
        StageMetrics::Merge {
            vertices,
            edges,
            split_points,
        } => {
            format!("{vertices} vertices, {edges} edges, {split_points} boundary splits")
        }
        StageMetrics::BlockExtraction { blocks, total_area } => {
            format!("{blocks} blocks, area={total_area:.1}")
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn stage(ms: u64, metrics: StageMetrics) -> StageDiagnostics {
        StageDiagnostics {
            duration: Duration::from_millis(ms),
            metrics,
        }
    }

    fn sample() -> GenerationDiagnostics {
        GenerationDiagnostics {
            topology_sampling: None,
            validation: stage(
                1,
                StageMetrics::Validation {
                    vertices: 40,
                    edges: 40,
                },
            ),
            decomposition: stage(
                2,
                StageMetrics::Decomposition {
                    cycles: 1,
                    filaments: 0,
                },
            ),
            growth: stage(
                20,
                StageMetrics::Growth {
                    regions: 1,
                    roads: 80,
                    seeds: 3,
                    steps: 60,
                    caps_hit: 0,
                    loose_ends_closed: 5,
                    loose_ends_open: 1,
                },
            ),
            merge: stage(
                3,
                StageMetrics::Merge {
                    vertices: 110,
                    edges: 130,
                    split_points: 9,
                },
            ),
            block_extraction: stage(
                4,
                StageMetrics::BlockExtraction {
                    blocks: 21,
                    total_area: 10_000.0,
                },
            ),
            total_duration: Duration::from_millis(30),
            summary: GenerationSummary {
                cycle_count: 1,
                vertex_count: 110,
                edge_count: 130,
                block_count: 21,
                growth_caps_hit: 0,
                open_loose_ends: 1,
            },
        }
    }

    #[test]
    fn millis_converts_correctly() {
        assert!((millis(Duration::from_millis(1234)) - 1234.0).abs() < 0.01);
    }

    #[test]
    fn noop_clock_reports_zero() {
        let clock = NoopClock;
        let start = clock.now();
        assert_eq!(clock.elapsed(&start), Duration::ZERO);
    }

    #[test]
    fn report_lists_every_stage_that_ran() {
        let report = sample().report();
        assert!(report.contains("Generation Diagnostics Report"));
        assert!(!report.contains("Topology Sampling"));
        for name in [
            "Validation",
            "Decomposition",
            "Growth",
            "Merge",
            "Block Extraction",
        ] {
            assert!(report.contains(name), "missing {name}");
        }
        assert!(report.contains("21 blocks"));
        assert!(report.contains("1 open loose ends"));
        assert!(report.contains("loose=5/6"));
    }

    #[test]
    fn report_includes_topology_sampling_when_present() {
        let mut diag = sample();
        diag.topology_sampling = Some(stage(
            5,
            StageMetrics::TopologySampling {
                topology_edges: 4,
                low_level_edges: 40,
            },
        ));
        let report = diag.report();
        assert!(report.contains("Topology Sampling"));
        assert!(report.contains("4 -> 40 edges (x10.0)"));
    }

    #[test]
    fn zero_total_duration_does_not_divide_by_zero() {
        let mut diag = sample();
        diag.total_duration = Duration::ZERO;
        assert!(diag.report().contains("0.0%"));
    }

    #[test]
    fn negative_durations_are_rejected() {
        let mut json = serde_json::to_value(sample()).unwrap();
        json["total_duration"] = serde_json::json!(-1.0);
        assert!(serde_json::from_value::<GenerationDiagnostics>(json).is_err());
    }

    #[test]
    fn durations_serialize_as_seconds() {
        let json = serde_json::to_value(sample()).unwrap();
        let secs = json["total_duration"].as_f64().unwrap();
        assert!((secs - 0.03).abs() < 1e-12);
        let back: GenerationDiagnostics = serde_json::from_value(json).unwrap();
        let diff = back.total_duration.abs_diff(Duration::from_millis(30));
        assert!(diff < Duration::from_micros(1));
    }
}
