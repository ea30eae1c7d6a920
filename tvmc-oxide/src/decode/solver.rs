use faer::Mat;

use crate::core::sparse::CsrMatrix;

#[remain::sorted]
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Err {
    #[error("least-squares CG broke down on column {column} at iteration {iteration}")]
    Breakdown { column: usize, iteration: usize },
    #[error(
        "least-squares CG did not converge on column {column} \
         ({iterations} iterations, relative residual {residual:.3e})"
    )]
    DidNotConverge {
        column: usize,
        iterations: usize,
        residual: f64,
    },
    #[error("operator is {rows} x {cols} but rhs has {rhs_rows} rows")]
    RhsMismatch {
        rows: usize,
        cols: usize,
        rhs_rows: usize,
    },
}

/// Solves `min ||op * X - rhs||_F` column by column with conjugate
/// gradients on the normal equations (CGLS). The normal matrix is never
/// formed; each iteration costs one `op * v` and one `op^T * v` product.
///
/// Convergence is declared when the normal-equation residual `op^T * r`
/// drops below `tolerance` relative to its initial value. An all-zero
/// column short-circuits to the zero solution.
pub fn solve_least_squares(
    op: &CsrMatrix,
    rhs: &Mat<f64>,
    max_iterations: usize,
    tolerance: f64,
) -> Result<Mat<f64>, Err> {
    let (m, n) = (op.nrows(), op.ncols());
    if rhs.nrows() != m {
        return Result::Err(Err::RhsMismatch {
            rows: m,
            cols: n,
            rhs_rows: rhs.nrows(),
        });
    }

    let mut solution = Mat::<f64>::zeros(n, rhs.ncols());
    let mut b = vec![0.0; m];

    for col in 0..rhs.ncols() {
        for i in 0..m {
            b[i] = rhs[(i, col)];
        }
        let x = cgls_column(op, &b, max_iterations, tolerance, col)?;
        for (i, v) in x.into_iter().enumerate() {
            solution[(i, col)] = v;
        }
    }

    Ok(solution)
}

fn cgls_column(
    op: &CsrMatrix,
    b: &[f64],
    max_iterations: usize,
    tolerance: f64,
    column: usize,
) -> Result<Vec<f64>, Err> {
    let (m, n) = (op.nrows(), op.ncols());

    let mut x = vec![0.0; n];
    let mut r = b.to_vec();
    let mut s = vec![0.0; n];
    op.mul_transpose_vec(&r, &mut s);

    let gamma0 = dot(&s, &s);
    if gamma0 == 0.0 {
        // rhs lies in the null space of op^T (or is zero): x = 0 already
        // minimizes the residual.
        return Ok(x);
    }

    let threshold = tolerance * gamma0.sqrt();
    let mut p = s.clone();
    let mut q = vec![0.0; m];
    let mut gamma = gamma0;

    for iteration in 0..max_iterations {
        op.mul_vec(&p, &mut q);
        let q_norm2 = dot(&q, &q);
        if q_norm2 == 0.0 {
            return Result::Err(Err::Breakdown { column, iteration });
        }

        let alpha = gamma / q_norm2;
        axpy(alpha, &p, &mut x);
        axpy(-alpha, &q, &mut r);

        op.mul_transpose_vec(&r, &mut s);
        let gamma_next = dot(&s, &s);
        if gamma_next.sqrt() <= threshold {
            tracing::debug!(
                column,
                iterations = iteration + 1,
                residual = gamma_next.sqrt() / gamma0.sqrt(),
                "least-squares column converged"
            );
            return Ok(x);
        }

        let beta = gamma_next / gamma;
        for (p_i, &s_i) in p.iter_mut().zip(&s) {
            *p_i = s_i + beta * *p_i;
        }
        gamma = gamma_next;
    }

    Result::Err(Err::DidNotConverge {
        column,
        iterations: max_iterations,
        residual: gamma.sqrt() / gamma0.sqrt(),
    })
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (y_i, &x_i) in y.iter_mut().zip(x) {
        *y_i += alpha * x_i;
    }
}
