use crate::{CtpError, Result, F};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque location identifier, compared by id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VertexId(pub usize);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Vertex {
    pub id: VertexId,
    #[serde(default)]
    pub label: String,
}

impl Vertex {
    pub fn new(id: usize) -> Self {
        Self { id: VertexId(id), label: String::new() }
    }
}

/// Undirected weighted edge. The weight is the traversal cost.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Edge {
    pub u: VertexId,
    pub v: VertexId,
    pub w: F,
}

impl Edge {
    pub fn new(u: usize, v: usize, w: F) -> Self {
        Self { u: VertexId(u), v: VertexId(v), w }
    }

    pub fn touches(&self, x: VertexId) -> bool {
        self.u == x || self.v == x
    }
}

/// One adjacency entry: neighbor vertex, index of the edge, edge weight.
pub type Adjacent = (VertexId, usize, F);

/// Physical road graph. Vertex ids are their positions in `vertices`.
///
/// Deserialization goes through [`Graph::new`], so a loaded graph always has
/// its adjacency cache.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(from = "GraphData")]
pub struct Graph {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    #[serde(skip_serializing)]
    adjacency: Vec<Vec<Adjacent>>,
}

/// Serialized form of a [`Graph`].
#[derive(Deserialize)]
struct GraphData {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
}

impl From<GraphData> for Graph {
    fn from(data: GraphData) -> Self {
        Self::new(data.vertices, data.edges)
    }
}

impl Graph {
    pub fn new(vertices: Vec<Vertex>, edges: Vec<Edge>) -> Self {
        let adjacency = build_adjacency(vertices.len(), &edges);
        Self { vertices, edges, adjacency }
    }

    /// Graph with `n` unlabeled vertices.
    pub fn with_vertices(n: usize, edges: Vec<Edge>) -> Self {
        Self::new((0..n).map(Vertex::new).collect(), edges)
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn contains(&self, v: VertexId) -> bool {
        v.0 < self.vertices.len()
    }

    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        (0..self.vertices.len()).map(VertexId)
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Neighbors of `u` with edge index and weight.
    pub fn neighbors(&self, u: VertexId) -> &[Adjacent] {
        self.adjacency.get(u.0).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn edge_between(&self, a: VertexId, b: VertexId) -> Option<usize> {
        self.neighbors(a)
            .iter()
            .find(|(n, _, _)| *n == b)
            .map(|&(_, idx, _)| idx)
    }

    pub fn edge_weight(&self, a: VertexId, b: VertexId) -> Option<F> {
        self.edge_between(a, b).map(|idx| self.edges[idx].w)
    }

    /// Reject graphs the state-space builder cannot work with.
    pub fn validate(&self) -> Result<()> {
        let n = self.vertices.len();
        for (pos, vertex) in self.vertices.iter().enumerate() {
            if vertex.id.0 != pos {
                return Err(CtpError::InvalidGraph(format!(
                    "vertex at position {} has id {}",
                    pos, vertex.id
                )));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for (idx, edge) in self.edges.iter().enumerate() {
            if edge.u.0 >= n || edge.v.0 >= n {
                return Err(CtpError::InvalidGraph(format!(
                    "edge {} references a vertex outside 0..{}",
                    idx, n
                )));
            }
            if edge.u == edge.v {
                return Err(CtpError::InvalidGraph(format!("edge {} is a self-loop", idx)));
            }
            if !edge.w.is_finite() || edge.w < 0.0 {
                return Err(CtpError::InvalidGraph(format!(
                    "edge {} has weight {}",
                    idx, edge.w
                )));
            }
            let key = (edge.u.min(edge.v), edge.u.max(edge.v));
            if !seen.insert(key) {
                return Err(CtpError::InvalidGraph(format!(
                    "edge {} duplicates {} - {}",
                    idx, key.0, key.1
                )));
            }
        }
        Ok(())
    }

    /// 4-connected grid, row-major vertex ids. Wall cells get no edges.
    pub fn grid(width: usize, height: usize, cell_cost: F, walls: Option<&[bool]>) -> Self {
        let is_wall = |id: usize| walls.map_or(false, |w| w.get(id) == Some(&true));
        let mut edges = Vec::new();

        for i in 0..height {
            for j in 0..width {
                let id = i * width + j;
                if is_wall(id) {
                    continue;
                }

                // Right and down only; edges are undirected.
                if j + 1 < width && !is_wall(id + 1) {
                    edges.push(Edge::new(id, id + 1, cell_cost));
                }
                if i + 1 < height && !is_wall(id + width) {
                    edges.push(Edge::new(id, id + width, cell_cost));
                }
            }
        }

        Self::with_vertices(width * height, edges)
    }
}

/// Adjacency lists for fast neighbor queries. Edges are undirected, so each
/// one is listed at both endpoints.
fn build_adjacency(n: usize, edges: &[Edge]) -> Vec<Vec<Adjacent>> {
    let mut adj = vec![Vec::new(); n];

    for (idx, edge) in edges.iter().enumerate() {
        if edge.u.0 < n && edge.v.0 < n {
            adj[edge.u.0].push((edge.v, idx, edge.w));
            if edge.u != edge.v {
                adj[edge.v.0].push((edge.u, idx, edge.w));
            }
        }
    }

    adj
}
