//! Topology graphs: the coarse input road layout, and its expansion into
//! an organic low-level graph by sampling every edge.

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::graph::PlanarGraph;
use crate::sampler::{SamplerParams, sample_path, select_sample};
use crate::types::{GenerationError, NetworkConfig, Point};

/// A coarse planar graph of primary roads: vertex positions and edges as
/// index pairs into them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopologyGraph {
    /// Vertex positions.
    pub vertices: Vec<Point>,
    /// Edges as `[from, to]` indices into `vertices`.
    pub edges: Vec<[usize; 2]>,
}

impl TopologyGraph {
    /// Create a topology from vertices and index-pair edges.
    #[must_use]
    pub const fn new(vertices: Vec<Point>, edges: Vec<[usize; 2]>) -> Self {
        Self { vertices, edges }
    }

    /// Check the topology's shape.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::EmptyTopology`] if there are no edges,
    /// and [`GenerationError::InvalidConfig`] for out-of-range indices,
    /// self-loops, repeated edges, repeated or non-finite vertices.
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.edges.is_empty() {
            return Err(GenerationError::EmptyTopology);
        }
        let mut keys = Vec::with_capacity(self.vertices.len());
        for (i, v) in self.vertices.iter().enumerate() {
            if !v.is_finite() {
                return Err(GenerationError::InvalidConfig(format!(
                    "topology vertex {i} is not finite"
                )));
            }
            keys.push(v.key());
        }
        keys.sort_unstable();
        if keys.windows(2).any(|w| w[0] == w[1]) {
            return Err(GenerationError::InvalidConfig(
                "topology repeats a vertex position".to_string(),
            ));
        }

        let mut pairs = Vec::with_capacity(self.edges.len());
        for &[a, b] in &self.edges {
            if a >= self.vertices.len() || b >= self.vertices.len() {
                return Err(GenerationError::InvalidConfig(format!(
                    "topology edge [{a}, {b}] references a missing vertex (have {})",
                    self.vertices.len()
                )));
            }
            if a == b {
                return Err(GenerationError::InvalidConfig(format!(
                    "topology edge [{a}, {b}] is a self-loop"
                )));
            }
            pairs.push((a.min(b), a.max(b)));
        }
        pairs.sort_unstable();
        if let Some(w) = pairs.windows(2).find(|w| w[0] == w[1]) {
            return Err(GenerationError::InvalidConfig(format!(
                "topology edge [{}, {}] is repeated",
                w[0].0, w[0].1
            )));
        }
        Ok(())
    }

    /// Expand every edge into a sampled organic path and collect the
    /// result into a planar graph.
    ///
    /// Edges are sampled in list order, each from its first vertex to its
    /// second, all drawing from `rng`.
    ///
    /// # Errors
    ///
    /// Returns the [`validate`](Self::validate) errors and propagates
    /// sampler failures.
    pub fn to_low_level<R: Rng>(
        &self,
        config: &NetworkConfig,
        rng: &mut R,
    ) -> Result<PlanarGraph, GenerationError> {
        self.validate()?;
        let params = SamplerParams {
            sample_radius: config.sample_radius,
            samples_per_step: config.samples_per_step,
            deviation_angle: config.deviation_angle,
            stop_distance: config.sample_stop_distance,
        };

        let mut graph = PlanarGraph::new();
        for &[a, b] in &self.edges {
            let (start, end) = (self.vertices[a], self.vertices[b]);
            let path = sample_path(start, end, &params, |candidates| {
                select_sample(config.sample_selection, candidates, rng)
            })?;
            let mut prev = start;
            for p in path {
                graph.add_edge(prev, p)?;
                prev = p;
            }
        }
        debug!(
            "sampled {} topology edges into {} low-level edges",
            self.edges.len(),
            graph.edge_count()
        );
        Ok(graph)
    }
}
