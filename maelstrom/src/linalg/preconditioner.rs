use super::{diagonal, LinearSolveError};
use crate::{Array1, CsMat, Float};

/// Approximate inverse of a system matrix, `z = M^{-1} r`.
pub trait Preconditioner {
    fn apply(&self, r: &Array1) -> Array1;
}

pub struct Identity;

impl Preconditioner for Identity {
    fn apply(&self, r: &Array1) -> Array1 {
        r.clone()
    }
}

/// Diagonal scaling. Zero diagonal entries are left unscaled.
pub struct Jacobi {
    inverse_diagonal: Array1,
}

impl Jacobi {
    pub fn new(matrix: &CsMat) -> Self {
        let inverse_diagonal = diagonal(matrix).mapv(|d| if d == 0. { 1. } else { 1. / d });
        Self { inverse_diagonal }
    }
}

impl Preconditioner for Jacobi {
    fn apply(&self, r: &Array1) -> Array1 {
        r * &self.inverse_diagonal
    }
}

/// Incomplete LU factorization without fill-in, on the sparsity pattern of
/// the matrix.
pub struct Ilu0 {
    /// Row-wise `(column, value)` pairs sorted by column, holding the strict
    /// lower part of `L` (unit diagonal implied) and the upper part of `U`.
    rows: Vec<Vec<(usize, Float)>>,
    diagonal_positions: Vec<usize>,
}

impl Ilu0 {
    pub fn new(matrix: &CsMat) -> Result<Self, LinearSolveError> {
        let mut rows: Vec<Vec<(usize, Float)>> = matrix
            .outer_iterator()
            .map(|row| {
                let mut entries: Vec<_> = row.iter().map(|(j, &value)| (j, value)).collect();
                entries.sort_unstable_by_key(|&(j, _)| j);
                entries
            })
            .collect();
        let diagonal_positions = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                row.binary_search_by_key(&i, |&(j, _)| j)
                    .map_err(|_| LinearSolveError::ZeroPivot { row: i })
            })
            .collect::<Result<Vec<_>, _>>()?;

        for i in 0..rows.len() {
            for position in 0..diagonal_positions[i] {
                let k = rows[i][position].0;
                let pivot = rows[k][diagonal_positions[k]].1;
                if pivot == 0. {
                    return Err(LinearSolveError::ZeroPivot { row: k });
                }
                let factor = rows[i][position].1 / pivot;
                rows[i][position].1 = factor;
                for later in position + 1..rows[i].len() {
                    let j = rows[i][later].0;
                    if let Ok(upper) = rows[k].binary_search_by_key(&j, |&(column, _)| column) {
                        let update = factor * rows[k][upper].1;
                        rows[i][later].1 -= update;
                    }
                }
            }
            if rows[i][diagonal_positions[i]].1 == 0. {
                return Err(LinearSolveError::ZeroPivot { row: i });
            }
        }
        Ok(Self {
            rows,
            diagonal_positions,
        })
    }
}

impl Preconditioner for Ilu0 {
    fn apply(&self, r: &Array1) -> Array1 {
        let mut z = r.clone();
        for (i, row) in self.rows.iter().enumerate() {
            let lower: Float = row[..self.diagonal_positions[i]]
                .iter()
                .map(|&(j, value)| value * z[j])
                .sum();
            z[i] -= lower;
        }
        for (i, row) in self.rows.iter().enumerate().rev() {
            let position = self.diagonal_positions[i];
            let upper: Float = row[position + 1..]
                .iter()
                .map(|&(j, value)| value * z[j])
                .sum();
            z[i] = (z[i] - upper) / row[position].1;
        }
        z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::test_matrices;
    use crate::test_util::assert_all_close;

    #[test]
    fn test_ilu_is_exact_for_tridiagonal() {
        // A tridiagonal matrix has no fill-in, so ILU(0) is its LU factorization.
        let matrix = test_matrices::advection_diffusion(12, 0.3);
        let ilu = Ilu0::new(&matrix).unwrap();
        let x = Array1::linspace(-1., 2., 12);
        let rhs = &matrix * &x;
        assert_all_close(&ilu.apply(&rhs), &x).abs_tol(Some(1e-12));
    }

    #[test]
    fn test_ilu_missing_diagonal() {
        let mut triplets = sprs::TriMat::new((2, 2));
        triplets.add_triplet(0, 1, 1.);
        triplets.add_triplet(1, 0, 1.);
        let matrix: CsMat = triplets.to_csr();
        assert!(matches!(Ilu0::new(&matrix), Err(LinearSolveError::ZeroPivot { row: 0 })));
    }

    #[test]
    fn test_jacobi() {
        let matrix = test_matrices::poisson_2d(3);
        let r = Array1::from_elem(9, 2.);
        assert_all_close(&Jacobi::new(&matrix).apply(&r), &Array1::from_elem(9, 0.5));
    }
}
