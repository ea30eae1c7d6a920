use glam::DVec3;
use indexmap::IndexSet;

use crate::core::mesh::Mesh;
use crate::core::sparse::CsrMatrix;

/// Row sums at or below this threshold get no normalization entry.
const ROW_SUM_EPSILON: f64 = 1e-8;

/// The anchor vertex indices for a mesh of `n` vertices: `a` evenly spaced
/// samples of `[0, n-1]`, rounded to the nearest integer. The encoder picks
/// anchors by the same rule, so no indices travel in the stream. A single
/// anchor degenerates to vertex 0.
pub fn anchor_indices(n: usize, a: usize) -> Vec<usize> {
    match a {
        0 => Vec::new(),
        1 => vec![0],
        _ => (0..a)
            .map(|i| (i as f64 * (n as f64 - 1.0) / (a as f64 - 1.0)).round() as usize)
            .collect(),
    }
}

/// Mean-value weights over each vertex's 1-ring, as triplets of a sparse
/// `n x n` matrix.
///
/// Neighbours are traversed in the adjacency set's insertion order, and the
/// "previous"/"next" neighbours of the cyclic fan are taken from that same
/// order. For neighbour `j` of vertex `i`:
///
/// `w_ij = (tan(a1 / 2) + tan(a2 / 2)) / |V_j - V_i|`
///
/// where `a1`/`a2` are the angles between `V_j - V_i` and the previous/next
/// neighbour directions. Non-finite weights (degenerate geometry, zero-length
/// edges) are dropped. Vertices with fewer than two neighbours contribute no
/// entries.
pub fn mean_value_weights(
    vertices: &[DVec3],
    adjacency: &[IndexSet<usize>],
) -> Vec<(usize, usize, f64)> {
    let mut triplets = Vec::new();

    for (i, neighbor_set) in adjacency.iter().enumerate() {
        let neighbors: Vec<usize> = neighbor_set.iter().copied().collect();
        let degree = neighbors.len();
        if degree < 2 {
            continue;
        }

        for r in 0..degree {
            let curr = neighbors[r];
            let prev = neighbors[(r + degree - 1) % degree];
            let next = neighbors[(r + 1) % degree];

            let u = (vertices[curr] - vertices[i]).normalize_or_zero();
            let u1 = (vertices[prev] - vertices[i]).normalize_or_zero();
            let u2 = (vertices[next] - vertices[i]).normalize_or_zero();

            let angle1 = u.dot(u1).clamp(-1.0, 1.0).acos();
            let angle2 = u.dot(u2).clamp(-1.0, 1.0).acos();
            let w = ((angle1 / 2.0).tan() + (angle2 / 2.0).tan())
                / (vertices[curr] - vertices[i]).length();

            if w.is_finite() {
                triplets.push((i, curr, w));
            }
        }
    }

    triplets
}

/// Builds the stacked operator `L* = [L; A]` in compressed form, where
/// `L = I - D^-1 W` is the row-normalized mean-value Laplacian and `A` holds
/// one one-hot row per anchor vertex.
pub fn build_laplacian(mesh: &Mesh, anchor_indices: &[usize]) -> CsrMatrix {
    let n = mesh.vertex_count();
    let a = anchor_indices.len();

    let weights = mean_value_weights(&mesh.vertices, mesh.adjacency());
    tracing::debug!(n, nnz = weights.len(), "mean-value weight matrix");

    let mut row_sums = vec![0.0; n];
    for &(i, _, w) in &weights {
        row_sums[i] += w;
    }

    // L = I - D^-1 W; rows whose weight sum vanishes keep their bare
    // identity row.
    let mut triplets = Vec::with_capacity(weights.len() + n + a);
    for i in 0..n {
        triplets.push((i, i, 1.0));
    }
    for &(i, j, w) in &weights {
        if row_sums[i] > ROW_SUM_EPSILON {
            triplets.push((i, j, -w / row_sums[i]));
        }
    }

    for (r, &anchor) in anchor_indices.iter().enumerate() {
        if anchor < n {
            triplets.push((n + r, anchor, 1.0));
        } else {
            tracing::warn!(anchor, n, "anchor index out of range, skipping");
        }
    }

    let l_star = CsrMatrix::from_triplets(n + a, n, &triplets);
    tracing::debug!(
        rows = l_star.nrows(),
        cols = l_star.ncols(),
        nnz = l_star.nnz(),
        "stacked laplacian"
    );
    l_star
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mesh::Mesh;

    fn fan_mesh() -> Mesh {
        // A center vertex surrounded by four corners, four triangles.
        let mut mesh = Mesh::from_parts(
            vec![
                DVec3::new(0.0, 0.0, 0.0),
                DVec3::new(1.0, 0.0, 0.0),
                DVec3::new(0.0, 1.0, 0.0),
                DVec3::new(-1.0, 0.0, 0.0),
                DVec3::new(0.0, -1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3], [0, 3, 4], [0, 4, 1]],
        );
        mesh.compute_adjacency();
        mesh
    }

    #[test]
    fn anchor_law_endpoints_and_monotonicity() {
        let anchors = anchor_indices(50, 5);
        assert_eq!(anchors.len(), 5);
        assert_eq!(anchors[0], 0);
        assert_eq!(anchors[4], 49);
        assert!(anchors.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn anchor_law_degenerate_cases() {
        assert!(anchor_indices(10, 0).is_empty());
        assert_eq!(anchor_indices(10, 1), vec![0]);
        assert_eq!(anchor_indices(10, 2), vec![0, 9]);
    }

    #[test]
    fn weights_skip_low_degree_vertices() {
        let mut mesh = Mesh::from_parts(
            vec![DVec3::ZERO, DVec3::new(1.0, 0.0, 0.0)],
            vec![],
        );
        mesh.compute_adjacency();
        assert!(mean_value_weights(&mesh.vertices, mesh.adjacency()).is_empty());
    }

    #[test]
    fn weights_are_positive_for_a_convex_fan() {
        let mesh = fan_mesh();
        let weights = mean_value_weights(&mesh.vertices, mesh.adjacency());
        assert!(!weights.is_empty());
        assert!(weights.iter().all(|&(_, _, w)| w > 0.0));
        // The center vertex has degree 4, so it owns 4 entries.
        assert_eq!(weights.iter().filter(|&&(i, _, _)| i == 0).count(), 4);
    }

    #[test]
    fn normalized_rows_sum_to_zero() {
        let mesh = fan_mesh();
        let l_star = build_laplacian(&mesh, &[]);
        assert_eq!((l_star.nrows(), l_star.ncols()), (5, 5));

        for r in 0..l_star.nrows() {
            let row = l_star.row_dense(r);
            let sum: f64 = row.iter().sum();
            // 1 on the diagonal minus normalized weights.
            assert!(sum.abs() < 1e-12, "row {r} sums to {sum}");
            assert_eq!(row[r], 1.0);
        }
    }

    #[test]
    fn anchor_rows_are_one_hot() {
        let mesh = fan_mesh();
        let anchors = anchor_indices(5, 2);
        let l_star = build_laplacian(&mesh, &anchors);

        assert_eq!((l_star.nrows(), l_star.ncols()), (7, 5));
        let row = l_star.row_dense(5);
        assert_eq!(row, vec![1.0, 0.0, 0.0, 0.0, 0.0]);
        let row = l_star.row_dense(6);
        assert_eq!(row, vec![0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn isolated_vertices_keep_identity_rows() {
        let mut mesh = Mesh::from_parts(
            vec![
                DVec3::new(0.0, 0.0, 0.0),
                DVec3::new(1.0, 0.0, 0.0),
                DVec3::new(0.0, 1.0, 0.0),
                DVec3::new(5.0, 5.0, 5.0),
            ],
            vec![[0, 1, 2]],
        );
        mesh.compute_adjacency();
        let l_star = build_laplacian(&mesh, &[]);
        assert_eq!(l_star.row_dense(3), vec![0.0, 0.0, 0.0, 1.0]);
    }
}
