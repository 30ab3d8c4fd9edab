//! Preconditioned Krylov solvers for sparse systems.

mod amg;
mod krylov;
mod preconditioner;

pub use amg::{Amg, CoarseSolver};
pub use preconditioner::{Identity, Ilu0, Jacobi, Preconditioner};

use crate::{Array1, CsMat, Float};

#[derive(Debug, thiserror::Error)]
pub enum LinearSolveError {
    #[error("{method} reached {iters} iterations with relative residual {error:e}")]
    MaxItersReached {
        method: KrylovMethod,
        error: Float,
        iters: usize,
    },
    #[error("{method} broke down at iteration {iter}")]
    Breakdown { method: KrylovMethod, iter: usize },
    #[error("zero pivot in row {row} during incomplete factorization")]
    ZeroPivot { row: usize },
    #[error("singular coarse-grid matrix of size {size}")]
    SingularMatrix { size: usize },
    #[error("matrix of shape {shape:?} does not match a vector of length {len}")]
    DimensionMismatch { shape: (usize, usize), len: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum KrylovMethod {
    #[strum(serialize = "cg")]
    ConjugateGradient,
    #[strum(serialize = "gmres")]
    Gmres { restart: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreconditionerKind {
    Identity,
    Jacobi,
    Ilu,
    Amg { coarse: CoarseSolver },
}

/// Converged solution together with the number of iterations it took.
#[derive(Clone, Debug)]
pub struct Solution {
    pub x: Array1,
    pub iters: usize,
}

#[derive(Clone, Debug)]
pub struct KrylovSolver {
    method: KrylovMethod,
    preconditioner: PreconditionerKind,
    rel_tol: Float,
    abs_tol: Float,
    max_iters: usize,
    monitor_convergence: bool,
}

impl KrylovSolver {
    pub fn new(method: KrylovMethod, preconditioner: PreconditionerKind) -> Self {
        Self {
            method,
            preconditioner,
            rel_tol: 1e-10,
            abs_tol: 0.,
            max_iters: 1000,
            monitor_convergence: false,
        }
    }

    pub fn with_rel_tol(self, rel_tol: Float) -> Self {
        Self { rel_tol, ..self }
    }

    pub fn with_abs_tol(self, abs_tol: Float) -> Self {
        Self { abs_tol, ..self }
    }

    pub fn with_max_iters(self, max_iters: usize) -> Self {
        Self { max_iters, ..self }
    }

    pub fn with_monitor_convergence(self, monitor_convergence: bool) -> Self {
        Self {
            monitor_convergence,
            ..self
        }
    }

    pub fn method(&self) -> KrylovMethod {
        self.method
    }

    pub fn max_iters(&self) -> usize {
        self.max_iters
    }

    /// Solves `matrix * x = rhs` starting from `x0`.
    ///
    /// Converged once $\|b - A x\| \le \max(\mathrm{rtol} \|b\|, \mathrm{atol})$.
    pub fn solve(
        &self,
        matrix: &CsMat,
        rhs: &Array1,
        x0: Array1,
    ) -> Result<Solution, LinearSolveError> {
        let (rows, cols) = matrix.shape();
        if rows != cols || rows != rhs.len() || rows != x0.len() {
            return Err(LinearSolveError::DimensionMismatch {
                shape: (rows, cols),
                len: rhs.len(),
            });
        }
        let preconditioner: Box<dyn Preconditioner> = match self.preconditioner {
            PreconditionerKind::Identity => Box::new(Identity),
            PreconditionerKind::Jacobi => Box::new(Jacobi::new(matrix)),
            PreconditionerKind::Ilu => Box::new(Ilu0::new(matrix)?),
            PreconditionerKind::Amg { coarse } => Box::new(Amg::new(matrix, coarse)?),
        };
        let tolerance = (self.rel_tol * norm(rhs)).max(self.abs_tol);
        let solution = match self.method {
            KrylovMethod::ConjugateGradient => {
                let preconditioner = preconditioner.as_ref();
                krylov::conjugate_gradient(self, matrix, rhs, x0, preconditioner, tolerance)
            }
            KrylovMethod::Gmres { restart } => {
                krylov::gmres(self, matrix, rhs, x0, preconditioner.as_ref(), tolerance, restart)
            }
        }?;
        if self.monitor_convergence {
            log::info!(
                "{} converged in {} iterations (tolerance {tolerance:e})",
                self.method,
                solution.iters
            );
        }
        Ok(solution)
    }

    fn report(&self, iter: usize, residual_norm: Float) {
        if self.monitor_convergence {
            log::debug!("{} iteration {iter}: residual norm {residual_norm:e}", self.method);
        }
    }
}

pub(crate) fn dot(a: &Array1, b: &Array1) -> Float {
    a.dot(b)
}

pub(crate) fn norm(a: &Array1) -> Float {
    a.dot(a).sqrt()
}

/// Diagonal of a square CSR matrix; missing entries read as zero.
pub(crate) fn diagonal(matrix: &CsMat) -> Array1 {
    let mut diagonal = Array1::zeros(matrix.rows());
    for (i, row) in matrix.outer_iterator().enumerate() {
        for (j, &value) in row.iter() {
            if i == j {
                diagonal[i] += value;
            }
        }
    }
    diagonal
}
