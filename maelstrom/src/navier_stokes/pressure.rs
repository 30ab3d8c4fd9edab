//! Pressure Poisson problem of the projection step,
//!
//! $$ \langle r \nabla p^{n+1}, \nabla q \rangle = -\frac{\rho}{\Delta t} \langle \operatorname{div} u^*, q \rangle_r + \langle r \nabla p^n, \nabla q \rangle. $$
//!
//! Without pressure boundary conditions the operator has the constants as its
//! null space, and the right-hand side must be orthogonal to them.

use crate::{
    assembly::{self, Flux},
    bcs,
    fields::{Field, VectorJet},
    float_consts::PI,
    linalg::{self, CoarseSolver, KrylovMethod, KrylovSolver, PreconditionerKind},
    Array1, CsMat, Float, IpcsError, Matrix3x2, Vector3,
};

use super::{quadrature_degree, StepInput};

/// Largest admissible $|\langle b, e \rangle| / \|b\|$ for a pure Neumann
/// right-hand side.
pub const CONSISTENCY_TOLERANCE: Float = 1e-12;
const MAX_CG_ITERATIONS: usize = 100;

/// Component of a right-hand side along the normalized constant vector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Consistency {
    pub alpha: Float,
    pub norm_b: Float,
}

impl Consistency {
    pub fn of(rhs: &Array1) -> Self {
        Self {
            alpha: linalg::dot(rhs, &null_space_vector(rhs.len())),
            norm_b: linalg::norm(rhs),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.alpha.abs() <= self.norm_b * CONSISTENCY_TOLERANCE
    }

    pub fn ratio(&self) -> Float {
        if self.norm_b > 0. {
            self.alpha / self.norm_b
        } else {
            0.
        }
    }
}

/// The constant vector of unit length.
pub fn null_space_vector(len: usize) -> Array1 {
    Array1::from_elem(len, 1. / (len as Float).sqrt())
}

/// Removes the constant component in place and returns its size.
pub fn project_out_null_space(rhs: &mut Array1) -> Float {
    let e = null_space_vector(rhs.len());
    let alpha = linalg::dot(rhs, &e);
    rhs.scaled_add(-alpha, &e);
    alpha
}

/// The stiffness matrix $\langle r \nabla p, \nabla q \rangle 2 \pi$.
fn stiffness(input: &StepInput, degree: usize) -> CsMat {
    let space = input.pressure_space;
    assembly::assemble_matrix(space, space, degree, |point| {
        let two_pi_r = 2. * PI * point.r();
        move |p: &VectorJet| Flux {
            source: Vector3::zeros(),
            flux: p.gradient * two_pi_r,
        }
    })
}

fn load(input: &StepInput, tentative: &Field, rotational_form: bool, degree: usize) -> Array1 {
    let density = input.coefficients.density();
    let viscosity = input.coefficients.viscosity();
    assembly::assemble_vector(input.pressure_space, degree, |point| {
        let r = point.r();
        let two_pi_r = 2. * PI * r;
        let u = tentative.evaluate(point);
        let mut gradient = input
            .pressure
            .map_or_else(crate::Vector2::zeros, |p| p.evaluate(point).component_gradient(0));
        if rotational_form {
            gradient -= u.divergence_gradient(r) * viscosity;
        }
        let mut flux = Matrix3x2::zeros();
        flux.set_row(0, &(gradient.transpose() * two_pi_r));
        Flux {
            source: Vector3::new(-density / input.dt * u.divergence(r) * two_pi_r, 0., 0.),
            flux,
        }
    })
}

fn cg(tol: Float, monitor: bool, coarse: CoarseSolver) -> KrylovSolver {
    KrylovSolver::new(
        KrylovMethod::ConjugateGradient,
        PreconditionerKind::Amg { coarse },
    )
    .with_rel_tol(tol)
    .with_max_iters(MAX_CG_ITERATIONS)
    .with_monitor_convergence(monitor)
}

/// Solves for the new pressure given the tentative velocity.
pub fn compute_pressure(
    input: &StepInput,
    tentative: &Field,
    rotational_form: bool,
) -> Result<Field, IpcsError> {
    let space = input.pressure_space;
    let degree = quadrature_degree(tentative.space());
    let matrix = stiffness(input, degree);
    let mut rhs = load(input, tentative, rotational_form, degree);
    let options = input.options;

    let solution = if input.pressure_bcs.is_empty() {
        let consistency = Consistency::of(&rhs);
        if !consistency.is_consistent() {
            let mesh = space.mesh();
            let divergence_integral = assembly::assemble_scalar(mesh, degree, |point| {
                let r = point.r();
                tentative.evaluate(point).divergence(r) * 2. * PI * r
            });
            let boundary_flux = assembly::assemble_boundary_scalar(mesh, degree, |facet| {
                let u = tentative.evaluate(&facet.point).in_plane();
                u.dot(&facet.outward_normal) * 2. * PI * facet.point.r()
            });
            log::error!("System not consistent!");
            log::error!("  int (1/r) div(r u) 2 pi r dx = {divergence_integral:e}");
            log::error!("  int n . u 2 pi r ds = {boundary_flux:e}");
            log::error!(
                "  <b,e> = {:e}, ||b|| = {:e}, <b,e>/||b|| = {:e}",
                consistency.alpha,
                consistency.norm_b,
                consistency.ratio()
            );
            return Err(IpcsError::InconsistentPressureSystem {
                alpha: consistency.alpha,
                norm_b: consistency.norm_b,
                ratio: consistency.ratio(),
                divergence_integral,
                boundary_flux,
            });
        }
        project_out_null_space(&mut rhs);
        cg(options.tol, options.verbose, CoarseSolver::Jacobi).solve(
            &matrix,
            &rhs,
            Array1::zeros(space.num_dofs()),
        )?
    } else {
        let (matrix, rhs) = bcs::assemble_system(matrix, rhs, input.pressure_bcs);
        cg(options.tol, options.verbose, CoarseSolver::Direct).solve(
            &matrix,
            &rhs,
            Array1::zeros(space.num_dofs()),
        )?
    };
    Field::from_dofs(space, solution.x)
}
