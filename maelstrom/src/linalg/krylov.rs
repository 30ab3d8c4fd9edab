use super::{dot, norm, KrylovMethod, KrylovSolver, LinearSolveError, Preconditioner, Solution};
use crate::{Array1, CsMat, Float};

fn relative(residual_norm: Float, rhs: &Array1) -> Float {
    let rhs_norm = norm(rhs);
    if rhs_norm > 0. {
        residual_norm / rhs_norm
    } else {
        residual_norm
    }
}

/// Preconditioned conjugate gradients. Requires a symmetric positive
/// (semi-)definite matrix and preconditioner.
pub(super) fn conjugate_gradient(
    solver: &KrylovSolver,
    matrix: &CsMat,
    rhs: &Array1,
    mut x: Array1,
    preconditioner: &dyn Preconditioner,
    tolerance: Float,
) -> Result<Solution, LinearSolveError> {
    let method = KrylovMethod::ConjugateGradient;
    let mut r = rhs - &(matrix * &x);
    let mut residual_norm = norm(&r);
    solver.report(0, residual_norm);
    if residual_norm <= tolerance {
        return Ok(Solution { x, iters: 0 });
    }

    let mut z = preconditioner.apply(&r);
    let mut p = z.clone();
    let mut rz = dot(&r, &z);
    for iter in 1..=solver.max_iters() {
        let ap = matrix * &p;
        let pap = dot(&p, &ap);
        if !(pap > 0. && rz.is_finite()) {
            return Err(LinearSolveError::Breakdown { method, iter });
        }
        let alpha = rz / pap;
        x.scaled_add(alpha, &p);
        r.scaled_add(-alpha, &ap);

        residual_norm = norm(&r);
        solver.report(iter, residual_norm);
        if residual_norm <= tolerance {
            return Ok(Solution { x, iters: iter });
        }

        z = preconditioner.apply(&r);
        let rz_next = dot(&r, &z);
        let beta = rz_next / rz;
        rz = rz_next;
        p = &z + &(p * beta);
    }
    Err(LinearSolveError::MaxItersReached {
        method,
        error: relative(residual_norm, rhs),
        iters: solver.max_iters(),
    })
}

/// Restarted GMRES with right preconditioning, so the monitored residual is
/// the unpreconditioned one.
pub(super) fn gmres(
    solver: &KrylovSolver,
    matrix: &CsMat,
    rhs: &Array1,
    mut x: Array1,
    preconditioner: &dyn Preconditioner,
    tolerance: Float,
    restart: usize,
) -> Result<Solution, LinearSolveError> {
    let method = KrylovMethod::Gmres { restart };
    let mut r = rhs - &(matrix * &x);
    let mut beta = norm(&r);
    solver.report(0, beta);
    if beta <= tolerance {
        return Ok(Solution { x, iters: 0 });
    }

    let mut iters = 0;
    while iters < solver.max_iters() {
        let m = restart.max(1).min(solver.max_iters() - iters);
        let mut basis = vec![r / beta];
        let mut directions = Vec::with_capacity(m);
        let mut hessenberg = vec![vec![0.; m]; m + 1];
        let (mut cosines, mut sines) = (vec![0.; m], vec![0.; m]);
        let mut g = vec![0.; m + 1];
        g[0] = beta;

        let mut k = 0;
        while k < m {
            let z = preconditioner.apply(&basis[k]);
            let mut w = matrix * &z;
            directions.push(z);
            for (i, v) in basis.iter().enumerate() {
                let h = dot(&w, v);
                hessenberg[i][k] = h;
                w.scaled_add(-h, v);
            }
            let subdiagonal = norm(&w);
            hessenberg[k + 1][k] = subdiagonal;

            for i in 0..k {
                let (upper, lower) = (hessenberg[i][k], hessenberg[i + 1][k]);
                hessenberg[i][k] = cosines[i] * upper + sines[i] * lower;
                hessenberg[i + 1][k] = -sines[i] * upper + cosines[i] * lower;
            }
            let (a, b) = (hessenberg[k][k], hessenberg[k + 1][k]);
            let denominator = a.hypot(b);
            if denominator == 0. {
                return Err(LinearSolveError::Breakdown {
                    method,
                    iter: iters + 1,
                });
            }
            cosines[k] = a / denominator;
            sines[k] = b / denominator;
            hessenberg[k][k] = denominator;
            hessenberg[k + 1][k] = 0.;
            g[k + 1] = -sines[k] * g[k];
            g[k] *= cosines[k];

            iters += 1;
            k += 1;
            let estimate = g[k].abs();
            solver.report(iters, estimate);
            if estimate <= tolerance || subdiagonal == 0. {
                break;
            }
            basis.push(w / subdiagonal);
        }

        // Back substitution on the rotated (now triangular) Hessenberg matrix.
        let mut y = vec![0.; k];
        for i in (0..k).rev() {
            let tail: Float = (i + 1..k).map(|j| hessenberg[i][j] * y[j]).sum();
            y[i] = (g[i] - tail) / hessenberg[i][i];
        }
        for (y, z) in y.iter().zip(&directions) {
            x.scaled_add(*y, z);
        }

        r = rhs - &(matrix * &x);
        beta = norm(&r);
        if beta <= tolerance {
            return Ok(Solution { x, iters });
        }
    }
    Err(LinearSolveError::MaxItersReached {
        method,
        error: relative(beta, rhs),
        iters,
    })
}
