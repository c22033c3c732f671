//! Cycle decomposition of a planar graph into minimal cycles (the
//! boundaries of its bounded faces) and filaments (tree-like chains that
//! bound no face).
//!
//! # Algorithm overview
//!
//! Vertices are visited in lexicographic `(x, y)` order. The leftmost
//! remaining vertex is always on the outer boundary of its component:
//!
//! - **Degree 0:** drop it.
//! - **Degree 1:** peel the filament that ends there.
//! - **Otherwise:** walk the face to its clockwise side, taking the
//!   clockwise-most turn first and counter-clockwise-most turns after.
//!   Returning to the start closes a minimal cycle; its first edge is
//!   removed (it cannot bound any other face) and any filaments exposed
//!   by the removal are peeled. Dead-ending instead reveals a filament.
//!
//! Edges that belonged to an extracted cycle are remembered, so peeling
//! them later does not report them again as filaments.

use std::collections::HashMap;
use std::collections::HashSet;

use geo::Polygon;
use serde::{Deserialize, Serialize};

use crate::geometry::{ring_contains, ring_to_polygon, signed_area};
use crate::graph::PlanarGraph;
use crate::types::{GenerationError, Point, PointKey, Segment};

// ---------------------------------------------------------------------------
// Cycle
// ---------------------------------------------------------------------------

/// A closed ring of distinct vertices. The last vertex connects back to
/// the first.
///
/// Rings are normalized: counter-clockwise, starting at their leftmost
/// (then lowest) vertex. Two cycles over the same vertex set in the same
/// graph therefore compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    ring: Vec<Point>,
}

/// Stable identity and sort key of a normalized [`Cycle`]: its first two
/// vertices. Distinct faces of one planar graph never share both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CycleKey(pub PointKey, pub PointKey);

impl Cycle {
    /// Normalize a ring into a cycle.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::InvariantViolation`] if the ring has
    /// fewer than three vertices or repeats a vertex.
    pub fn from_ring(mut ring: Vec<Point>) -> Result<Self, GenerationError> {
        if ring.len() < 3 {
            return Err(GenerationError::InvariantViolation(format!(
                "cycle with {} vertices",
                ring.len()
            )));
        }
        let mut keys: Vec<PointKey> = ring.iter().map(|p| p.key()).collect();
        keys.sort_unstable();
        if keys.windows(2).any(|w| w[0] == w[1]) {
            return Err(GenerationError::InvariantViolation(
                "cycle repeats a vertex".to_string(),
            ));
        }
        if signed_area(&ring) < 0.0 {
            ring.reverse();
        }
        let start = ring
            .iter()
            .enumerate()
            .min_by_key(|(_, p)| p.key())
            .map_or(0, |(i, _)| i);
        ring.rotate_left(start);
        Ok(Self { ring })
    }

    /// The ring's vertices, without repeating the first at the end.
    #[must_use]
    pub fn vertices(&self) -> &[Point] {
        &self.ring
    }

    /// Number of vertices (equal to the number of edges).
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Always `false`: a cycle has at least three vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// The ring's edges in order, the last one closing the ring.
    pub fn edges(&self) -> impl Iterator<Item = Segment> + '_ {
        let n = self.ring.len();
        (0..n).map(move |i| Segment::from_distinct(self.ring[i], self.ring[(i + 1) % n]))
    }

    /// Enclosed area (positive).
    #[must_use]
    pub fn area(&self) -> f64 {
        signed_area(&self.ring)
    }

    /// Sort key and seed identity.
    #[must_use]
    pub fn key(&self) -> CycleKey {
        CycleKey(self.ring[0].key(), self.ring[1].key())
    }

    /// Whether `p` lies strictly inside the ring.
    #[must_use]
    pub fn contains(&self, p: Point) -> bool {
        ring_contains(&self.ring, p)
    }

    /// The ring as a `geo::Polygon` without holes.
    #[must_use]
    pub fn to_polygon(&self) -> Polygon<f64> {
        ring_to_polygon(&self.ring)
    }
}

// ---------------------------------------------------------------------------
// Decomposition
// ---------------------------------------------------------------------------

/// Result of decomposing a planar graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Decomposition {
    /// Minimal cycles, sorted by [`CycleKey`].
    pub cycles: Vec<Cycle>,
    /// Filaments as vertex chains, in extraction order.
    pub filaments: Vec<Vec<Point>>,
}

/// Working copy of the graph that the extraction consumes.
struct Extractor {
    points: Vec<Point>,
    adjacency: Vec<Vec<usize>>,
    removed: Vec<bool>,
    cycle_edges: HashSet<(usize, usize)>,
    out: Decomposition,
}

const fn edge_key(a: usize, b: usize) -> (usize, usize) {
    if a < b { (a, b) } else { (b, a) }
}

/// `u.x * v.y - u.y * v.x`: positive when `v` turns left of `u`.
fn dot_perp(u: (f64, f64), v: (f64, f64)) -> f64 {
    u.0.mul_add(v.1, -(u.1 * v.0))
}

impl Extractor {
    fn new(graph: &PlanarGraph) -> Self {
        let points: Vec<Point> = graph.vertices().collect();
        let index: HashMap<PointKey, usize> = points
            .iter()
            .enumerate()
            .map(|(i, p)| (p.key(), i))
            .collect();
        let mut adjacency = vec![Vec::new(); points.len()];
        for edge in graph.edges() {
            if let (Some(&a), Some(&b)) = (index.get(&edge.a.key()), index.get(&edge.b.key())) {
                adjacency[a].push(b);
                adjacency[b].push(a);
            }
        }
        Self {
            removed: vec![false; points.len()],
            points,
            adjacency,
            cycle_edges: HashSet::new(),
            out: Decomposition::default(),
        }
    }

    fn degree(&self, v: usize) -> usize {
        self.adjacency[v].len()
    }

    fn direction(&self, from: usize, to: usize) -> (f64, f64) {
        let (a, b) = (self.points[from], self.points[to]);
        (b.x - a.x, b.y - a.y)
    }

    fn remove_edge(&mut self, a: usize, b: usize) {
        self.adjacency[a].retain(|&n| n != b);
        self.adjacency[b].retain(|&n| n != a);
    }

    fn remove_vertex(&mut self, v: usize) {
        for n in std::mem::take(&mut self.adjacency[v]) {
            self.adjacency[n].retain(|&m| m != v);
        }
        self.removed[v] = true;
    }

    fn is_cycle_edge(&self, a: usize, b: usize) -> bool {
        self.cycle_edges.contains(&edge_key(a, b))
    }

    /// Pick the neighbour of `curr` reached by the sharpest turn, with
    /// `clockwise` choosing the side. `prev = None` means the walk starts
    /// at `curr` heading down.
    fn most_turned(&self, prev: Option<usize>, curr: usize, clockwise: bool) -> Option<usize> {
        let d_curr = prev.map_or((0.0, -1.0), |p| self.direction(p, curr));
        let mut options = self.adjacency[curr]
            .iter()
            .copied()
            .filter(|&n| Some(n) != prev);
        let mut next = options.next()?;
        let mut d_next = self.direction(curr, next);
        let mut convex = dot_perp(d_next, d_curr) <= 0.0;
        for adj in options {
            let d_adj = self.direction(curr, adj);
            let (a, b) = (dot_perp(d_curr, d_adj), dot_perp(d_next, d_adj));
            let better = match (clockwise, convex) {
                (true, true) => a < 0.0 || b < 0.0,
                (true, false) => a < 0.0 && b < 0.0,
                (false, true) => a > 0.0 && b > 0.0,
                (false, false) => a > 0.0 || b > 0.0,
            };
            if better {
                next = adj;
                d_next = d_adj;
                convex = dot_perp(d_next, d_curr) <= 0.0;
            }
        }
        Some(next)
    }

    fn extract_filament(&mut self, mut v0: usize, mut v1: usize) {
        if self.is_cycle_edge(v0, v1) {
            if self.degree(v0) >= 3 {
                self.remove_edge(v0, v1);
                v0 = v1;
            }
            while self.degree(v0) == 1 {
                v1 = self.adjacency[v0][0];
                if !self.is_cycle_edge(v0, v1) {
                    break;
                }
                self.remove_vertex(v0);
                v0 = v1;
            }
            if self.degree(v0) == 0 {
                self.remove_vertex(v0);
            }
        } else {
            let mut chain = Vec::new();
            if self.degree(v0) >= 3 {
                chain.push(self.points[v0]);
                self.remove_edge(v0, v1);
                v0 = v1;
            }
            while self.degree(v0) == 1 {
                chain.push(self.points[v0]);
                v1 = self.adjacency[v0][0];
                self.remove_vertex(v0);
                v0 = v1;
            }
            chain.push(self.points[v0]);
            if self.degree(v0) == 0 {
                self.remove_vertex(v0);
            }
            self.out.filaments.push(chain);
        }
    }

    fn extract_primitive(&mut self, v0: usize) -> Result<(), GenerationError> {
        let mut visited = vec![false; self.points.len()];
        let mut sequence = vec![v0];
        let Some(v1) = self.most_turned(None, v0, true) else {
            return Ok(());
        };
        let mut prev = v0;
        let mut curr = Some(v1);
        while let Some(c) = curr {
            if c == v0 || visited[c] {
                break;
            }
            sequence.push(c);
            visited[c] = true;
            curr = self.most_turned(Some(prev), c, false);
            prev = c;
        }

        match curr {
            None => {
                // Dead end: a filament, not necessarily rooted at v0.
                let next = self.adjacency[prev][0];
                self.extract_filament(prev, next);
            }
            Some(c) if c == v0 => {
                let ring: Vec<Point> = sequence.iter().map(|&i| self.points[i]).collect();
                for (i, &a) in sequence.iter().enumerate() {
                    let b = sequence[(i + 1) % sequence.len()];
                    self.cycle_edges.insert(edge_key(a, b));
                }
                self.out.cycles.push(Cycle::from_ring(ring)?);
                self.remove_edge(v0, v1);
                if self.degree(v0) == 1 {
                    let n = self.adjacency[v0][0];
                    self.extract_filament(v0, n);
                }
                if self.degree(v1) == 1 {
                    let n = self.adjacency[v1][0];
                    self.extract_filament(v1, n);
                }
            }
            Some(_) => {
                // The walk looped back onto itself away from v0, so v0
                // sits on a filament leading into a cycle. Walk to the
                // filament's far end before peeling it.
                let (mut a, mut b) = (v0, v1);
                let mut guard = self.points.len();
                while self.degree(a) == 2 {
                    if guard == 0 {
                        return Err(GenerationError::InvariantViolation(
                            "degree-2 traversal did not terminate".to_string(),
                        ));
                    }
                    guard -= 1;
                    let first = self.adjacency[a][0];
                    let next = if first == b { self.adjacency[a][1] } else { first };
                    b = a;
                    a = next;
                }
                self.extract_filament(a, b);
            }
        }
        Ok(())
    }

    fn run(mut self) -> Result<Decomposition, GenerationError> {
        let mut order: Vec<usize> = (0..self.points.len()).collect();
        order.sort_by_key(|&i| self.points[i].key());

        let mut cursor = 0;
        let mut budget = self.points.len() + self.adjacency.iter().map(Vec::len).sum::<usize>();
        loop {
            while cursor < order.len() && self.removed[order[cursor]] {
                cursor += 1;
            }
            let Some(&v0) = order.get(cursor) else { break };
            if budget == 0 {
                return Err(GenerationError::InvariantViolation(
                    "cycle extraction made no progress".to_string(),
                ));
            }
            budget -= 1;
            match self.degree(v0) {
                0 => self.remove_vertex(v0),
                1 => {
                    let n = self.adjacency[v0][0];
                    self.extract_filament(v0, n);
                }
                _ => self.extract_primitive(v0)?,
            }
        }

        self.out.cycles.sort_by_key(Cycle::key);
        Ok(self.out)
    }
}

/// Decompose `graph` into minimal cycles and filaments.
///
/// # Errors
///
/// Returns [`GenerationError::InvariantViolation`] if the graph is not
/// planar enough for the face walk to terminate.
pub fn decompose(graph: &PlanarGraph) -> Result<Decomposition, GenerationError> {
    Extractor::new(graph).run()
}
