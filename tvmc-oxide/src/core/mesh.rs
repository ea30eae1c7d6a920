use std::collections::HashMap;

use glam::DVec3;
use indexmap::IndexSet;

/// Default collapse distance for [`Mesh::remove_duplicate_vertices`].
pub const DEDUP_EPSILON: f64 = 1e-6;

/// Represents a triangle mesh with a derived vertex adjacency structure.
///
/// The adjacency sets are kept in insertion order ([`IndexSet`]), which
/// makes every traversal over a vertex's 1-ring deterministic. The
/// mean-value weight computation depends on that order being stable.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub vertices: Vec<DVec3>,
    pub triangles: Vec<[usize; 3]>,
    adjacency: Vec<IndexSet<usize>>,
}

impl Mesh {
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            triangles: Vec::new(),
            adjacency: Vec::new(),
        }
    }

    pub fn from_parts(vertices: Vec<DVec3>, triangles: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            triangles,
            adjacency: Vec::new(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// One adjacency set per vertex; empty until [`Mesh::compute_adjacency`]
    /// has run.
    pub fn adjacency(&self) -> &[IndexSet<usize>] {
        &self.adjacency
    }

    /// Rebuilds the adjacency structure from the triangle list. Each
    /// triangle contributes its three undirected edges; repeated insertions
    /// are idempotent. The result is symmetric and self-free.
    pub fn compute_adjacency(&mut self) {
        self.adjacency.clear();
        self.adjacency.resize(self.vertices.len(), IndexSet::new());

        for tri in &self.triangles {
            let [i0, i1, i2] = *tri;
            self.adjacency[i0].insert(i1);
            self.adjacency[i0].insert(i2);
            self.adjacency[i1].insert(i0);
            self.adjacency[i1].insert(i2);
            self.adjacency[i2].insert(i0);
            self.adjacency[i2].insert(i1);
        }
    }

    /// Collapses every vertex within `epsilon` of an earlier vertex onto
    /// the first occurrence and remaps the triangle indices. First-seen
    /// order is preserved. Quadratic scan; the meshes this decoder handles
    /// are small enough that a spatial index would not pay for itself.
    pub fn remove_duplicate_vertices(&mut self, epsilon: f64) {
        let mut old_to_new = vec![0usize; self.vertices.len()];
        let mut unique: Vec<DVec3> = Vec::new();

        for (i, v) in self.vertices.iter().enumerate() {
            match unique.iter().position(|u| u.distance(*v) < epsilon) {
                Some(j) => old_to_new[i] = j,
                None => {
                    old_to_new[i] = unique.len();
                    unique.push(*v);
                }
            }
        }

        for tri in &mut self.triangles {
            for idx in tri.iter_mut() {
                *idx = old_to_new[*idx];
            }
        }

        self.vertices = unique;
        self.refresh_adjacency();
    }

    /// 1-to-4 midpoint subdivision. Each triangle `(v0, v1, v2)` is split
    /// into `(v0, m01, m20)`, `(v1, m12, m01)`, `(v2, m20, m12)` and
    /// `(m01, m12, m20)`; midpoints are keyed by the unordered endpoint
    /// pair so adjacent triangles share them. Rounding-induced duplicates
    /// are cleaned up afterwards.
    pub fn subdivide_midpoint(&mut self) {
        let mut edge_to_midpoint: HashMap<(usize, usize), usize> = HashMap::new();
        let mut new_vertices = self.vertices.clone();
        let mut new_triangles = Vec::with_capacity(self.triangles.len() * 4);

        for tri in &self.triangles {
            let [v0, v1, v2] = *tri;

            let mut midpoint = |a: usize, b: usize| -> usize {
                let key = (a.min(b), a.max(b));
                *edge_to_midpoint.entry(key).or_insert_with(|| {
                    let m = 0.5 * (new_vertices[a] + new_vertices[b]);
                    new_vertices.push(m);
                    new_vertices.len() - 1
                })
            };

            let m01 = midpoint(v0, v1);
            let m12 = midpoint(v1, v2);
            let m20 = midpoint(v2, v0);

            new_triangles.push([v0, m01, m20]);
            new_triangles.push([v1, m12, m01]);
            new_triangles.push([v2, m20, m12]);
            new_triangles.push([m01, m12, m20]);
        }

        self.vertices = new_vertices;
        self.triangles = new_triangles;
        self.remove_duplicate_vertices(DEDUP_EPSILON);
    }

    /// Flat triangle index buffer in the layout the host surface consumes.
    pub fn triangle_indices_flat(&self) -> Vec<u32> {
        self.triangles
            .iter()
            .flat_map(|tri| tri.iter().map(|&i| i as u32))
            .collect()
    }

    fn refresh_adjacency(&mut self) {
        if !self.adjacency.is_empty() {
            self.compute_adjacency();
        }
    }
}
