use ndarray as nd;

use crate::{
    linalg::{self, KrylovMethod, KrylovSolver, LinearSolveError, PreconditionerKind},
    Array1, CsMat, Float,
};

/// A nonlinear system `F(x) = 0` with its Jacobian.
///
/// Implementors hold their coefficients immutably; the iterate is always
/// passed in.
pub trait NonlinearProblem {
    /// Writes `F(x)` into `residual`.
    fn residual(&self, x: nd::ArrayView1<Float>, residual: &mut Array1);

    fn jacobian(&self, x: nd::ArrayView1<Float>) -> CsMat;
}

#[derive(Debug, thiserror::Error)]
pub enum NewtonError {
    #[error(
        "Newton solver did not converge after {iterations} iterations \
         (residual norm {residual_norm:e})"
    )]
    NotConverged {
        iterations: usize,
        residual_norm: Float,
    },
    #[error("linear solve failed in Newton iteration {iteration}")]
    LinearSolve {
        iteration: usize,
        #[source]
        source: LinearSolveError,
    },
}

#[derive(Clone, Debug)]
pub struct NewtonSolver {
    max_iterations: usize,
    abs_tol: Float,
    rel_tol: Float,
    linear_solver: KrylovSolver,
    report: bool,
}

impl Default for NewtonSolver {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            abs_tol: 1e-10,
            rel_tol: 1e-9,
            linear_solver: KrylovSolver::new(
                KrylovMethod::Gmres { restart: 30 },
                PreconditionerKind::Ilu,
            ),
            report: true,
        }
    }
}

impl NewtonSolver {
    pub fn with_max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }

    pub fn with_abs_tol(self, abs_tol: Float) -> Self {
        Self { abs_tol, ..self }
    }

    pub fn with_rel_tol(self, rel_tol: Float) -> Self {
        Self { rel_tol, ..self }
    }

    pub fn with_linear_solver(self, linear_solver: KrylovSolver) -> Self {
        Self {
            linear_solver,
            ..self
        }
    }

    pub fn with_report(self, report: bool) -> Self {
        Self { report, ..self }
    }

    /// Iterates `x <- x - J(x)^{-1} F(x)` in place until the residual norm
    /// drops below the absolute tolerance, or below the relative tolerance
    /// times the initial residual norm. Returns the number of iterations.
    pub fn solve<P: NonlinearProblem>(
        &self,
        problem: &P,
        x: &mut Array1,
    ) -> Result<usize, NewtonError> {
        let mut residual = Array1::zeros(x.len());
        problem.residual(x.view(), &mut residual);
        let initial_norm = linalg::norm(&residual);

        let mut iteration = 0;
        let mut residual_norm = initial_norm;
        while !self.converged(iteration, residual_norm, initial_norm) {
            if iteration >= self.max_iterations {
                return Err(NewtonError::NotConverged {
                    iterations: iteration,
                    residual_norm,
                });
            }
            let jacobian = problem.jacobian(x.view());
            let step = self
                .linear_solver
                .solve(&jacobian, &residual, Array1::zeros(x.len()))
                .map_err(|source| NewtonError::LinearSolve { iteration, source })?;
            *x -= &step.x;

            iteration += 1;
            problem.residual(x.view(), &mut residual);
            residual_norm = linalg::norm(&residual);
        }
        if self.report {
            log::info!("Newton solver finished in {iteration} iterations");
        }
        Ok(iteration)
    }

    fn converged(&self, iteration: usize, residual_norm: Float, initial_norm: Float) -> bool {
        let relative = if initial_norm > 0. {
            residual_norm / initial_norm
        } else {
            0.
        };
        if self.report {
            log::info!(
                "Newton iteration {iteration}: r (abs) = {residual_norm:.3e} (tol = {:.3e}) \
                 r (rel) = {relative:.3e} (tol = {:.3e})",
                self.abs_tol,
                self.rel_tol
            );
        }
        residual_norm < self.abs_tol || relative < self.rel_tol
    }
}
