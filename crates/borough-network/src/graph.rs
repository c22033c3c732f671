//! Planar road graph: vertices identified by coordinate value, undirected
//! edges, and an R\*-tree over edges for broad-phase spatial queries.
//!
//! Storage is a petgraph [`StableUnGraph`] so that indices of surviving
//! vertices and edges stay valid across removals. A hash map from
//! [`PointKey`] to node index gives value-based vertex lookup; it is only
//! ever probed, never iterated, so it cannot leak hash ordering into the
//! output.

use std::collections::HashMap;

use geo::Line;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableUnGraph};
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::geometry::{point_to_coord, segment_envelope, segments_cross};
use crate::types::{GraphError, Point, PointKey, Segment};

/// A `geo::Line` tagged with the petgraph edge it mirrors, suitable for
/// R\*-tree insertion.
type IndexedEdge = GeomWithData<Line<f64>, EdgeIndex>;

fn indexed_edge(a: Point, b: Point, id: EdgeIndex) -> IndexedEdge {
    GeomWithData::new(Line::new(point_to_coord(a), point_to_coord(b)), id)
}

/// An undirected planar graph of road segments.
///
/// Vertices are unique by coordinate value. There are no self-loops and
/// no parallel edges. Planarity itself is not enforced on insertion; use
/// [`find_crossing`](Self::find_crossing) to check it.
#[derive(Debug, Clone, Default)]
pub struct PlanarGraph {
    graph: StableUnGraph<Point, ()>,
    lookup: HashMap<PointKey, NodeIndex>,
    tree: RTree<IndexedEdge>,
}

impl PlanarGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether the graph has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Whether `p` is a vertex.
    #[must_use]
    pub fn contains_vertex(&self, p: Point) -> bool {
        self.lookup.contains_key(&p.key())
    }

    /// Add a vertex, or return the existing one at the same position.
    pub fn add_vertex(&mut self, p: Point) -> NodeIndex {
        if let Some(&id) = self.lookup.get(&p.key()) {
            return id;
        }
        let id = self.graph.add_node(p);
        self.lookup.insert(p.key(), id);
        id
    }

    fn node(&self, p: Point) -> Result<NodeIndex, GraphError> {
        self.lookup
            .get(&p.key())
            .copied()
            .ok_or(GraphError::UnknownVertex { at: p })
    }

    fn edge_id(&self, a: Point, b: Point) -> Option<EdgeIndex> {
        let na = self.lookup.get(&a.key())?;
        let nb = self.lookup.get(&b.key())?;
        self.graph.find_edge(*na, *nb)
    }

    /// Whether an edge joins `a` and `b` (in either direction).
    #[must_use]
    pub fn has_edge(&self, a: Point, b: Point) -> bool {
        self.edge_id(a, b).is_some()
    }

    /// Add an edge between two points, adding missing vertices.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DegenerateEdge`] if `a == b` and
    /// [`GraphError::DuplicateEdge`] if the edge already exists.
    pub fn add_edge(&mut self, a: Point, b: Point) -> Result<Segment, GraphError> {
        if a == b {
            return Err(GraphError::DegenerateEdge { at: a });
        }
        let segment = Segment::from_distinct(a, b);
        if self.has_edge(a, b) {
            return Err(GraphError::DuplicateEdge { edge: segment });
        }
        let na = self.add_vertex(a);
        let nb = self.add_vertex(b);
        let id = self.graph.add_edge(na, nb, ());
        self.tree.insert(indexed_edge(a, b, id));
        Ok(segment)
    }

    /// Remove the edge between `a` and `b`. Vertices are kept, even if
    /// left isolated.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::MissingEdge`] if there is no such edge.
    pub fn remove_edge(&mut self, a: Point, b: Point) -> Result<(), GraphError> {
        let id = self.edge_id(a, b).ok_or(GraphError::MissingEdge {
            edge: Segment::from_distinct(a, b),
        })?;
        let (na, nb) = self
            .graph
            .edge_endpoints(id)
            .ok_or(GraphError::MissingEdge {
                edge: Segment::from_distinct(a, b),
            })?;
        let (pa, pb) = (self.graph[na], self.graph[nb]);
        self.tree.remove(&indexed_edge(pa, pb, id));
        self.graph.remove_edge(id);
        Ok(())
    }

    /// Split the edge `a–b` at `at`, replacing it by `a–at` and `at–b`.
    ///
    /// `at` is expected to lie on the segment; that is the caller's
    /// responsibility. Returns `at`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::MissingEdge`] if `a–b` is absent,
    /// [`GraphError::DegenerateEdge`] if `at` coincides with an endpoint,
    /// and [`GraphError::DuplicateEdge`] if a half already exists.
    pub fn split_edge(&mut self, a: Point, b: Point, at: Point) -> Result<Point, GraphError> {
        if at == a || at == b {
            return Err(GraphError::DegenerateEdge { at });
        }
        self.remove_edge(a, b)?;
        self.add_edge(a, at)?;
        self.add_edge(at, b)?;
        Ok(at)
    }

    /// Number of edges incident to `p` (zero for unknown points).
    #[must_use]
    pub fn degree(&self, p: Point) -> usize {
        self.lookup
            .get(&p.key())
            .map_or(0, |&id| self.graph.edges(id).count())
    }

    /// Neighbours of `p`, in insertion-dependent but deterministic order.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownVertex`] if `p` is not a vertex.
    pub fn neighbors(&self, p: Point) -> Result<Vec<Point>, GraphError> {
        let id = self.node(p)?;
        Ok(self.graph.neighbors(id).map(|n| self.graph[n]).collect())
    }

    /// All vertices in index order.
    pub fn vertices(&self) -> impl Iterator<Item = Point> + '_ {
        self.graph.node_indices().map(|n| self.graph[n])
    }

    /// All edges in index order.
    pub fn edges(&self) -> impl Iterator<Item = Segment> + '_ {
        self.graph.edge_indices().filter_map(|id| {
            let (a, b) = self.graph.edge_endpoints(id)?;
            Some(Segment::from_distinct(self.graph[a], self.graph[b]))
        })
    }

    /// Edges whose bounding box intersects `envelope`, ordered by edge
    /// index so callers see a deterministic sequence.
    #[must_use]
    pub fn edges_in(&self, envelope: &AABB<geo::Point<f64>>) -> Vec<Segment> {
        let mut hits: Vec<&IndexedEdge> =
            self.tree.locate_in_envelope_intersecting(envelope).collect();
        hits.sort_by_key(|e| e.data.index());
        hits.into_iter()
            .map(|e| {
                let line = e.geom();
                Segment::from_distinct(
                    Point::new(line.start.x, line.start.y),
                    Point::new(line.end.x, line.end.y),
                )
            })
            .collect()
    }

    /// Edges near the segment `a→b`, within `margin` of its bounding box.
    #[must_use]
    pub fn edges_near(&self, a: Point, b: Point, margin: f64) -> Vec<Segment> {
        self.edges_in(&segment_envelope(a, b, margin))
    }

    /// Whether the segment `a→b` would cross an existing edge away from
    /// a shared vertex.
    #[must_use]
    pub fn crosses_existing(&self, a: Point, b: Point) -> bool {
        self.edges_near(a, b, 0.0)
            .iter()
            .any(|e| !e.touches(a) && !e.touches(b) && segments_cross(a, b, e.a, e.b))
    }

    /// Find a pair of edges that cross away from a shared endpoint, if
    /// any. Returns the first pair in edge-index order.
    #[must_use]
    pub fn find_crossing(&self) -> Option<(Segment, Segment)> {
        self.edges().find_map(|edge| {
            self.edges_near(edge.a, edge.b, 0.0)
                .into_iter()
                .find(|other| {
                    !edge.shares_endpoint(other)
                        && segments_cross(edge.a, edge.b, other.a, other.b)
                })
                .map(|other| (edge, other))
        })
    }

    fn to_data(&self) -> GraphData {
        let mut positions: HashMap<NodeIndex, usize> = HashMap::new();
        let mut vertices = Vec::with_capacity(self.vertex_count());
        for id in self.graph.node_indices() {
            positions.insert(id, vertices.len());
            vertices.push(self.graph[id]);
        }
        let edges = self
            .graph
            .edge_indices()
            .filter_map(|id| self.graph.edge_endpoints(id))
            .map(|(a, b)| [positions[&a], positions[&b]])
            .collect();
        GraphData { vertices, edges }
    }
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

/// Serializable form of a [`PlanarGraph`]: vertex positions in index
/// order plus edges as index pairs into that list.
#[derive(Serialize, Deserialize)]
struct GraphData {
    vertices: Vec<Point>,
    edges: Vec<[usize; 2]>,
}

impl Serialize for PlanarGraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_data().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PlanarGraph {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let data = GraphData::deserialize(deserializer)?;
        let mut graph = Self::new();
        for &v in &data.vertices {
            graph.add_vertex(v);
        }
        for [i, j] in data.edges {
            let (Some(&a), Some(&b)) = (data.vertices.get(i), data.vertices.get(j)) else {
                return Err(serde::de::Error::custom(format!(
                    "edge [{i}, {j}] references a missing vertex"
                )));
            };
            graph.add_edge(a, b).map_err(serde::de::Error::custom)?;
        }
        Ok(graph)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    fn square() -> PlanarGraph {
        let mut g = PlanarGraph::new();
        g.add_edge(p(0.0, 0.0), p(10.0, 0.0)).unwrap();
        g.add_edge(p(10.0, 0.0), p(10.0, 10.0)).unwrap();
        g.add_edge(p(10.0, 10.0), p(0.0, 10.0)).unwrap();
        g.add_edge(p(0.0, 10.0), p(0.0, 0.0)).unwrap();
        g
    }

    #[test]
    fn vertices_are_unique_by_value() {
        let mut g = PlanarGraph::new();
        let a = g.add_vertex(p(1.0, 2.0));
        let b = g.add_vertex(p(1.0, 2.0));
        assert_eq!(a, b);
        assert_eq!(g.vertex_count(), 1);
    }

    #[test]
    fn add_edge_rejects_duplicates_in_either_direction() {
        let mut g = PlanarGraph::new();
        g.add_edge(p(0.0, 0.0), p(1.0, 0.0)).unwrap();
        assert!(matches!(
            g.add_edge(p(1.0, 0.0), p(0.0, 0.0)),
            Err(GraphError::DuplicateEdge { .. })
        ));
    }

    #[test]
    fn add_edge_rejects_self_loop() {
        let mut g = PlanarGraph::new();
        assert!(matches!(
            g.add_edge(p(0.0, 0.0), p(0.0, 0.0)),
            Err(GraphError::DegenerateEdge { .. })
        ));
    }

    #[test]
    fn remove_edge_keeps_vertices() {
        let mut g = square();
        g.remove_edge(p(10.0, 0.0), p(0.0, 0.0)).unwrap();
        assert_eq!(g.edge_count(), 3);
        assert_eq!(g.vertex_count(), 4);
        assert_eq!(g.degree(p(0.0, 0.0)), 1);
        assert!(g.edges_near(p(5.0, 0.0), p(5.0, 0.0), 0.1).is_empty());
    }

    #[test]
    fn remove_missing_edge_fails() {
        let mut g = square();
        assert!(matches!(
            g.remove_edge(p(0.0, 0.0), p(10.0, 10.0)),
            Err(GraphError::MissingEdge { .. })
        ));
    }

    #[test]
    fn split_edge_replaces_with_halves() {
        let mut g = square();
        g.split_edge(p(0.0, 0.0), p(10.0, 0.0), p(5.0, 0.0)).unwrap();
        assert_eq!(g.edge_count(), 5);
        assert!(!g.has_edge(p(0.0, 0.0), p(10.0, 0.0)));
        assert!(g.has_edge(p(0.0, 0.0), p(5.0, 0.0)));
        assert!(g.has_edge(p(5.0, 0.0), p(10.0, 0.0)));
        assert_eq!(g.degree(p(5.0, 0.0)), 2);
    }

    #[test]
    fn split_at_endpoint_fails() {
        let mut g = square();
        assert!(g.split_edge(p(0.0, 0.0), p(10.0, 0.0), p(0.0, 0.0)).is_err());
        assert_eq!(g.edge_count(), 4);
    }

    #[test]
    fn edges_near_uses_margin() {
        let g = square();
        let near = g.edges_near(p(5.0, 4.0), p(5.0, 6.0), 0.5);
        assert!(near.is_empty());
        let near = g.edges_near(p(5.0, 4.0), p(5.0, 6.0), 5.0);
        assert_eq!(near.len(), 4);
    }

    #[test]
    fn square_has_no_crossing() {
        assert!(square().find_crossing().is_none());
    }

    #[test]
    fn diagonals_cross() {
        let mut g = square();
        g.add_edge(p(0.0, 0.0), p(10.0, 10.0)).unwrap();
        assert!(g.find_crossing().is_none());
        g.add_edge(p(10.0, 0.0), p(0.0, 10.0)).unwrap();
        let (first, second) = g.find_crossing().unwrap();
        assert!(!first.shares_endpoint(&second));
    }

    #[test]
    fn crosses_existing_ignores_shared_vertices() {
        let g = square();
        assert!(!g.crosses_existing(p(0.0, 0.0), p(5.0, 5.0)));
        assert!(g.crosses_existing(p(5.0, 5.0), p(5.0, -5.0)));
    }

    #[test]
    fn serde_round_trip_preserves_structure() {
        let g = square();
        let json = serde_json::to_string(&g).unwrap();
        let back: PlanarGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(back.vertex_count(), 4);
        assert_eq!(back.edge_count(), 4);
        assert!(back.has_edge(p(10.0, 10.0), p(0.0, 10.0)));
        assert_eq!(json, serde_json::to_string(&back).unwrap());
    }

    #[test]
    fn deserialize_rejects_dangling_index() {
        let json = r#"{"vertices":[{"x":0.0,"y":0.0}],"edges":[[0,3]]}"#;
        assert!(serde_json::from_str::<PlanarGraph>(json).is_err());
    }
}
