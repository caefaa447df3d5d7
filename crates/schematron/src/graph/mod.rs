//! Dependency graph with cycle detection and topological ordering.
//!
//! Vertices name their parents by id. The migrator uses this to create
//! tables after the tables they reference.

use std::collections::{HashMap, HashSet};

/// Upper bound on relaxation passes in [`Graph::topographic_sort`].
const MAX_SORT_PASSES: usize = 100;

/// A vertex and the ids of the vertices it depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vertex {
    pub id: String,
    pub parents: Vec<String>,
}

impl Vertex {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parents: Vec::new(),
        }
    }

    pub fn with_parents<I, S>(id: impl Into<String>, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            parents: parents.into_iter().map(Into::into).collect(),
        }
    }
}

/// Vertices in insertion order, addressable by id.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    vertices: Vec<Vertex>,
    index: HashMap<String, usize>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex, replacing any earlier vertex with the same id.
    pub fn add_vertex(&mut self, vertex: Vertex) {
        match self.index.get(&vertex.id) {
            Some(&pos) => self.vertices[pos] = vertex,
            None => {
                self.index.insert(vertex.id.clone(), self.vertices.len());
                self.vertices.push(vertex);
            }
        }
    }

    pub fn vertex(&self, id: &str) -> Option<&Vertex> {
        self.index.get(id).map(|&pos| &self.vertices[pos])
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// True if following parent links from `id` leads back to a vertex
    /// already on the current path.
    ///
    /// Two paths reaching the same ancestor (a diamond) are not a cycle.
    pub fn has_cycle_from(&self, id: &str) -> bool {
        let mut path = HashSet::new();
        let mut cleared = HashSet::new();
        self.walk_parents(id, &mut path, &mut cleared)
    }

    /// True if any vertex is part of, or leads into, a cycle.
    pub fn has_cycle(&self) -> bool {
        let mut cleared = HashSet::new();
        self.vertices.iter().any(|v| {
            let mut path = HashSet::new();
            self.walk_parents(&v.id, &mut path, &mut cleared)
        })
    }

    fn walk_parents<'a>(
        &'a self,
        id: &'a str,
        path: &mut HashSet<&'a str>,
        cleared: &mut HashSet<&'a str>,
    ) -> bool {
        if cleared.contains(id) {
            return false;
        }
        if !path.insert(id) {
            return true;
        }
        if let Some(vertex) = self.vertex(id) {
            for parent in &vertex.parents {
                if self.walk_parents(parent, path, cleared) {
                    return true;
                }
            }
        }
        path.remove(id);
        cleared.insert(id);
        false
    }

    /// Vertex ids ordered so every vertex follows its parents.
    ///
    /// Runs relaxation passes over the vertices in insertion order, placing
    /// each vertex once all its parents are placed. Parents outside the graph
    /// count as placed. Stops when every vertex is placed, a pass places
    /// nothing, or the pass ceiling is reached; vertices caught in a cycle are
    /// left out of the result.
    pub fn topographic_sort(&self) -> Vec<String> {
        let mut placed: HashSet<&str> = HashSet::with_capacity(self.vertices.len());
        let mut result = Vec::with_capacity(self.vertices.len());

        for _ in 0..MAX_SORT_PASSES {
            if result.len() == self.vertices.len() {
                break;
            }
            let before = result.len();
            for vertex in &self.vertices {
                if placed.contains(vertex.id.as_str()) {
                    continue;
                }
                let ready = vertex
                    .parents
                    .iter()
                    .all(|p| placed.contains(p.as_str()) || !self.index.contains_key(p));
                if ready {
                    placed.insert(vertex.id.as_str());
                    result.push(vertex.id.clone());
                }
            }
            if result.len() == before {
                break;
            }
        }

        result
    }
}

impl FromIterator<Vertex> for Graph {
    fn from_iter<T: IntoIterator<Item = Vertex>>(iter: T) -> Self {
        let mut graph = Graph::new();
        for vertex in iter {
            graph.add_vertex(vertex);
        }
        graph
    }
}
