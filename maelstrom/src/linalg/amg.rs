//! Unsmoothed aggregation algebraic multigrid, used as a V-cycle
//! preconditioner.

use nalgebra as na;

use super::{diagonal, LinearSolveError, Preconditioner};
use crate::{Array1, CsMat, Float};

/// Hierarchies stop coarsening at this many unknowns.
const MAX_COARSE_SIZE: usize = 40;
const MAX_LEVELS: usize = 10;
const STRENGTH_THRESHOLD: Float = 0.25;
const SMOOTHING_SWEEPS: usize = 2;
const COARSE_JACOBI_SWEEPS: usize = 20;

/// How the coarsest level is solved.
///
/// `Jacobi` relaxation stays usable when the operator is singular, e.g. a
/// pure Neumann problem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CoarseSolver {
    #[default]
    Direct,
    Jacobi,
}

struct Level {
    matrix: CsMat,
    /// Damped inverse diagonal used by the Jacobi smoother.
    smoother: Array1,
    /// Piecewise-constant interpolation from the next coarser level, stored
    /// as the aggregate index of each fine unknown.
    aggregates: Vec<usize>,
    num_aggregates: usize,
}

enum Coarsest {
    Direct(na::LU<Float, na::Dyn, na::Dyn>),
    Jacobi { matrix: CsMat, smoother: Array1 },
}

pub struct Amg {
    levels: Vec<Level>,
    coarsest: Coarsest,
}

impl Amg {
    pub fn new(matrix: &CsMat, coarse: CoarseSolver) -> Result<Self, LinearSolveError> {
        let mut levels = Vec::new();
        let mut current = matrix.clone();
        while current.rows() > MAX_COARSE_SIZE && levels.len() + 1 < MAX_LEVELS {
            let (aggregates, num_aggregates) = aggregate(&current);
            // Stagnating coarsening would only add cost.
            if 10 * num_aggregates > 9 * current.rows() {
                break;
            }
            let coarse_matrix = galerkin_product(&current, &aggregates, num_aggregates);
            let smoother = damped_inverse_diagonal(&current);
            levels.push(Level {
                matrix: std::mem::replace(&mut current, coarse_matrix),
                smoother,
                aggregates,
                num_aggregates,
            });
        }
        log::debug!(
            "AMG hierarchy: {} levels, coarsest size {}",
            levels.len() + 1,
            current.rows()
        );

        let coarsest = match coarse {
            CoarseSolver::Direct => {
                let size = current.rows();
                let dense = na::DMatrix::from_fn(size, size, |i, j| {
                    current.get(i, j).copied().unwrap_or(0.)
                });
                let lu = dense.lu();
                let pivots = lu.u().diagonal().map(Float::abs);
                if size == 0 || pivots.min() <= 1e-13 * pivots.max() {
                    return Err(LinearSolveError::SingularMatrix { size });
                }
                Coarsest::Direct(lu)
            }
            CoarseSolver::Jacobi => Coarsest::Jacobi {
                smoother: damped_inverse_diagonal(&current),
                matrix: current,
            },
        };
        Ok(Self { levels, coarsest })
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len() + 1
    }

    fn cycle(&self, level: usize, rhs: &Array1) -> Array1 {
        let Some(Level {
            matrix,
            smoother,
            aggregates,
            num_aggregates,
        }) = self.levels.get(level)
        else {
            return self.solve_coarsest(rhs);
        };

        let mut x = Array1::zeros(rhs.len());
        jacobi_sweeps(matrix, smoother, rhs, &mut x, SMOOTHING_SWEEPS);

        let residual = rhs - &(matrix * &x);
        let mut coarse_rhs = Array1::zeros(*num_aggregates);
        for (i, &aggregate) in aggregates.iter().enumerate() {
            coarse_rhs[aggregate] += residual[i];
        }
        let correction = self.cycle(level + 1, &coarse_rhs);
        for (i, &aggregate) in aggregates.iter().enumerate() {
            x[i] += correction[aggregate];
        }

        jacobi_sweeps(matrix, smoother, rhs, &mut x, SMOOTHING_SWEEPS);
        x
    }

    fn solve_coarsest(&self, rhs: &Array1) -> Array1 {
        match &self.coarsest {
            Coarsest::Direct(lu) => {
                let rhs = na::DVector::from_iterator(rhs.len(), rhs.iter().copied());
                // Invertibility was checked on construction.
                lu.solve(&rhs)
                    .map_or_else(|| Array1::zeros(rhs.len()), |x| x.iter().copied().collect())
            }
            Coarsest::Jacobi { matrix, smoother } => {
                let mut x = Array1::zeros(rhs.len());
                jacobi_sweeps(matrix, smoother, rhs, &mut x, COARSE_JACOBI_SWEEPS);
                x
            }
        }
    }
}

impl Preconditioner for Amg {
    fn apply(&self, r: &Array1) -> Array1 {
        self.cycle(0, r)
    }
}

fn jacobi_sweeps(matrix: &CsMat, smoother: &Array1, rhs: &Array1, x: &mut Array1, sweeps: usize) {
    for _ in 0..sweeps {
        let residual = rhs - &(matrix * &*x);
        *x += &(residual * smoother);
    }
}

/// `omega / a_ii`, with `omega` bounded by the Gershgorin estimate of the
/// spectral radius of `D^{-1} A` so that the smoother converges.
fn damped_inverse_diagonal(matrix: &CsMat) -> Array1 {
    let diagonal = diagonal(matrix);
    let radius = matrix
        .outer_iterator()
        .enumerate()
        .filter(|(i, _)| diagonal[*i] != 0.)
        .map(|(i, row)| row.iter().map(|(_, v)| v.abs()).sum::<Float>() / diagonal[i].abs())
        .fold(1., Float::max);
    let omega = 1. / radius;
    diagonal.mapv(|d| if d == 0. { 0. } else { omega / d })
}

/// Greedy aggregation on the strength-of-connection graph.
///
/// Returns the aggregate of every unknown and the number of aggregates.
fn aggregate(matrix: &CsMat) -> (Vec<usize>, usize) {
    let n = matrix.rows();
    let diagonal = diagonal(matrix);
    let strong: Vec<Vec<usize>> = matrix
        .outer_iterator()
        .enumerate()
        .map(|(i, row)| {
            row.iter()
                .filter(|&(j, &value)| {
                    j != i
                        && value.abs()
                            >= STRENGTH_THRESHOLD * (diagonal[i] * diagonal[j]).abs().sqrt()
                })
                .map(|(j, _)| j)
                .collect()
        })
        .collect();

    let mut aggregates: Vec<Option<usize>> = vec![None; n];
    let mut num_aggregates = 0;
    // Seed aggregates at unknowns whose whole neighbourhood is free.
    for i in 0..n {
        if aggregates[i].is_none() && strong[i].iter().all(|&j| aggregates[j].is_none()) {
            aggregates[i] = Some(num_aggregates);
            for &j in &strong[i] {
                aggregates[j] = Some(num_aggregates);
            }
            num_aggregates += 1;
        }
    }
    // Attach leftovers to a neighbouring aggregate from the first pass.
    let first_pass = aggregates.clone();
    for i in 0..n {
        if aggregates[i].is_none() {
            aggregates[i] = strong[i].iter().find_map(|&j| first_pass[j]);
        }
    }
    let aggregates: Vec<usize> = aggregates
        .into_iter()
        .map(|aggregate| {
            aggregate.unwrap_or_else(|| {
                num_aggregates += 1;
                num_aggregates - 1
            })
        })
        .collect();
    (aggregates, num_aggregates)
}

/// `P^T A P` for piecewise-constant `P`.
fn galerkin_product(matrix: &CsMat, aggregates: &[usize], num_aggregates: usize) -> CsMat {
    let mut triplets = sprs::TriMat::new((num_aggregates, num_aggregates));
    for (i, row) in matrix.outer_iterator().enumerate() {
        for (j, &value) in row.iter() {
            triplets.add_triplet(aggregates[i], aggregates[j], value);
        }
    }
    triplets.to_csr()
}
