/// Compressed sparse row matrix over f64.
///
/// This is the compact form of the stacked operator `L*`. The solver only
/// ever needs the two matrix-vector products, so the type stays minimal:
/// build once from triplets, then multiply.
#[derive(Clone, Debug)]
pub struct CsrMatrix {
    nrows: usize,
    ncols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Builds a compressed matrix from `(row, col, value)` triplets.
    /// Triplets may arrive in any order; entries at the same position are
    /// summed. Out-of-range indices panic, matching the contract of the
    /// assembly code that produces the triplets.
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        triplets: &[(usize, usize, f64)],
    ) -> Self {
        let mut rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); nrows];
        for &(r, c, v) in triplets {
            assert!(r < nrows && c < ncols, "triplet ({r}, {c}) out of range");
            rows[r].push((c, v));
        }

        let mut row_ptr = Vec::with_capacity(nrows + 1);
        let mut col_idx = Vec::with_capacity(triplets.len());
        let mut values = Vec::with_capacity(triplets.len());

        row_ptr.push(0);
        for row in &mut rows {
            row.sort_unstable_by_key(|&(c, _)| c);
            let mut entries = row.iter().copied();
            if let Some((first_col, first_val)) = entries.next() {
                let (mut col, mut acc) = (first_col, first_val);
                for (c, v) in entries {
                    if c == col {
                        acc += v;
                    } else {
                        col_idx.push(col);
                        values.push(acc);
                        (col, acc) = (c, v);
                    }
                }
                col_idx.push(col);
                values.push(acc);
            }
            row_ptr.push(col_idx.len());
        }

        Self {
            nrows,
            ncols,
            row_ptr,
            col_idx,
            values,
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// `out = self · x`. Requires `x.len() == ncols`, `out.len() == nrows`.
    pub fn mul_vec(&self, x: &[f64], out: &mut [f64]) {
        debug_assert_eq!(x.len(), self.ncols);
        debug_assert_eq!(out.len(), self.nrows);
        for (r, out_r) in out.iter_mut().enumerate() {
            let mut acc = 0.0;
            for k in self.row_ptr[r]..self.row_ptr[r + 1] {
                acc += self.values[k] * x[self.col_idx[k]];
            }
            *out_r = acc;
        }
    }

    /// `out = selfᵀ · x`. Requires `x.len() == nrows`, `out.len() == ncols`.
    pub fn mul_transpose_vec(&self, x: &[f64], out: &mut [f64]) {
        debug_assert_eq!(x.len(), self.nrows);
        debug_assert_eq!(out.len(), self.ncols);
        out.fill(0.0);
        for r in 0..self.nrows {
            let x_r = x[r];
            if x_r == 0.0 {
                continue;
            }
            for k in self.row_ptr[r]..self.row_ptr[r + 1] {
                out[self.col_idx[k]] += self.values[k] * x_r;
            }
        }
    }

    /// Dense row extraction, used by tests and diagnostics.
    pub fn row_dense(&self, r: usize) -> Vec<f64> {
        let mut out = vec![0.0; self.ncols];
        for k in self.row_ptr[r]..self.row_ptr[r + 1] {
            out[self.col_idx[k]] = self.values[k];
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example() -> CsrMatrix {
        // [ 1  0  2 ]
        // [ 0  3  0 ]
        CsrMatrix::from_triplets(2, 3, &[(0, 2, 2.0), (0, 0, 1.0), (1, 1, 3.0)])
    }

    #[test]
    fn triplets_compress_in_column_order() {
        let m = example();
        assert_eq!(m.nnz(), 3);
        assert_eq!(m.row_dense(0), vec![1.0, 0.0, 2.0]);
        assert_eq!(m.row_dense(1), vec![0.0, 3.0, 0.0]);
    }

    #[test]
    fn duplicate_triplets_are_summed() {
        let m = CsrMatrix::from_triplets(1, 2, &[(0, 1, 1.0), (0, 1, 2.5), (0, 0, 1.0)]);
        assert_eq!(m.nnz(), 2);
        assert_eq!(m.row_dense(0), vec![1.0, 3.5]);
    }

    #[test]
    fn mul_vec_matches_dense() {
        let m = example();
        let mut out = vec![0.0; 2];
        m.mul_vec(&[1.0, 2.0, 3.0], &mut out);
        assert_eq!(out, vec![7.0, 6.0]);
    }

    #[test]
    fn mul_transpose_vec_matches_dense() {
        let m = example();
        let mut out = vec![0.0; 3];
        m.mul_transpose_vec(&[1.0, 2.0], &mut out);
        assert_eq!(out, vec![1.0, 6.0, 2.0]);
    }

    #[test]
    fn empty_rows_are_allowed() {
        let m = CsrMatrix::from_triplets(3, 2, &[(2, 0, 1.0)]);
        assert_eq!(m.row_dense(0), vec![0.0, 0.0]);
        assert_eq!(m.row_dense(1), vec![0.0, 0.0]);
        assert_eq!(m.row_dense(2), vec![1.0, 0.0]);
    }
}
