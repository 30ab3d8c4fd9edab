//! Projection of the tentative velocity with the pressure increment,
//! $u^{n+1} = u^* - \frac{\Delta t}{\rho} \nabla \phi$.

use crate::{
    assembly::{self, Flux},
    bcs,
    fields::{Field, VectorJet},
    linalg::{CoarseSolver, KrylovMethod, KrylovSolver, PreconditionerKind},
    Float, IpcsError, Matrix3x2, Vector2, Vector3,
};

use super::{quadrature_degree, StepInput};

const MAX_CG_ITERATIONS: usize = 100;

/// $\|\operatorname{div} u\|_{L^2}$ with the cylindrical divergence.
pub fn divergence_norm(velocity: &Field) -> Float {
    let space = velocity.space();
    assembly::assemble_scalar(space.mesh(), quadrature_degree(space), |point| {
        velocity.evaluate(point).divergence(point.r()).powi(2)
    })
    .sqrt()
}

/// Solves $\langle u, v \rangle = \langle u^*, v \rangle - \frac{\Delta t}{\rho} \langle \nabla \phi, v \rangle$
/// with $\phi = p^{n+1} - p^n$, plus $\mu \operatorname{div} u^*$ in rotational
/// form. Returns the new velocity and its divergence norm.
pub fn compute_velocity_correction(
    input: &StepInput,
    tentative: &Field,
    pressure: &Field,
    rotational_form: bool,
) -> Result<(Field, Float), IpcsError> {
    let space = tentative.space();
    let degree = quadrature_degree(space);
    let scale = input.dt / input.coefficients.density();
    let viscosity = input.coefficients.viscosity();

    let mass = assembly::assemble_matrix(space, space, degree, |_| {
        |u: &VectorJet| Flux {
            source: u.value,
            flux: Matrix3x2::zeros(),
        }
    });
    let rhs = assembly::assemble_vector(space, degree, |point| {
        let u = tentative.evaluate(point);
        let mut increment = pressure.evaluate(point).component_gradient(0);
        if let Some(previous) = input.pressure {
            increment -= previous.evaluate(point).component_gradient(0);
        }
        if rotational_form {
            increment += u.divergence_gradient(point.r()) * viscosity;
        }
        let correction: Vector2 = increment * scale;
        Flux {
            source: u.value - Vector3::new(correction[0], correction[1], 0.),
            flux: Matrix3x2::zeros(),
        }
    });

    let (mass, rhs) = bcs::assemble_system(mass, rhs, input.velocity_bcs);
    let mut initial_guess = tentative.dofs().clone();
    for bc in input.velocity_bcs {
        bc.apply_to_vector(&mut initial_guess);
    }
    let solution = KrylovSolver::new(
        KrylovMethod::ConjugateGradient,
        PreconditionerKind::Amg {
            coarse: CoarseSolver::Direct,
        },
    )
    .with_rel_tol(input.options.tol)
    .with_max_iters(MAX_CG_ITERATIONS)
    .with_monitor_convergence(input.options.verbose)
    .solve(&mass, &rhs, initial_guess)?;

    let velocity = Field::from_dofs(space, solution.x)?;
    let norm = divergence_norm(&velocity);
    log::info!("||u||_div = {norm:e}");
    Ok((velocity, norm))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        bcs::DirichletBc,
        geom,
        navier_stokes::{Coefficients, Forcing, SolveOptions},
        space::FunctionSpace,
        test_util::assert_all_close,
    };
    use approx::assert_relative_eq;

    fn spaces() -> (Arc<FunctionSpace>, Arc<FunctionSpace>) {
        let r_axis = geom::Axis::new(1., 2., 3).unwrap();
        let z_axis = geom::Axis::new(0., 1., 3).unwrap();
        let mesh = Arc::new(geom::Mesh::rectangle(&r_axis, &z_axis).unwrap());
        (
            Arc::new(FunctionSpace::new(mesh.clone(), 2, 2).unwrap()),
            Arc::new(FunctionSpace::new(mesh, 1, 1).unwrap()),
        )
    }

    fn input<'a>(
        velocity: &'a Field,
        pressure: Option<&'a Field>,
        pressure_space: &'a Arc<FunctionSpace>,
        velocity_bcs: &'a [DirichletBc],
    ) -> StepInput<'a> {
        StepInput {
            velocity,
            pressure,
            pressure_space,
            forcing: Forcing {
                previous: velocity,
                current: velocity,
            },
            coefficients: Coefficients::new(2., 0.5).unwrap(),
            dt: 0.1,
            velocity_bcs,
            pressure_bcs: &[],
            options: SolveOptions {
                tol: 1e-12,
                verbose: false,
            },
        }
    }

    #[test]
    fn test_divergence_norm() {
        // u = (r, 0) has divergence 2 on a unit area; u = (0, r) is solenoidal.
        let (velocity_space, _) = spaces();
        let radial = Field::interpolate(&velocity_space, |x| Vector3::new(x[0], 0., 0.));
        assert_relative_eq!(divergence_norm(&radial), 2., max_relative = 1e-10);
        let axial = Field::interpolate(&velocity_space, |x| Vector3::new(0., x[0], 0.));
        assert_relative_eq!(divergence_norm(&axial), 0., epsilon = 1e-12);
    }

    #[test]
    fn test_unchanged_pressure_keeps_velocity() {
        let (velocity_space, pressure_space) = spaces();
        let tentative = Field::interpolate(&velocity_space, |x| {
            Vector3::new(x[1] * x[1], x[0] * x[1], 0.)
        });
        let pressure = Field::interpolate_scalar(&pressure_space, |x| x[0] + 2. * x[1]);
        let input = input(&tentative, Some(&pressure), &pressure_space, &[]);
        let (velocity, _) =
            compute_velocity_correction(&input, &tentative, &pressure, false).unwrap();
        assert_all_close(velocity.dofs(), tentative.dofs()).abs_tol(Some(1e-8));
    }

    #[test]
    fn test_pressure_gradient_is_subtracted() {
        // phi = 3 r - z shifts u by -dt / rho (3, -1); div u* = 1 is constant.
        let (velocity_space, pressure_space) = spaces();
        let tentative = Field::interpolate(&velocity_space, |x| Vector3::new(x[0], -x[1], 0.));
        let pressure = Field::interpolate_scalar(&pressure_space, |x| 3. * x[0] - x[1]);
        let input = input(&tentative, None, &pressure_space, &[]);
        let expected = Field::interpolate(&velocity_space, |x| {
            Vector3::new(x[0] - 0.05 * 3., -x[1] + 0.05, 0.)
        });
        for rotational_form in [false, true] {
            let (velocity, _) =
                compute_velocity_correction(&input, &tentative, &pressure, rotational_form)
                    .unwrap();
            assert_all_close(velocity.dofs(), expected.dofs()).abs_tol(Some(1e-8));
        }
    }

    #[test]
    fn test_rotational_form_adds_divergence_gradient() {
        // div (1, 0) = 1/r, so mu grad div u* = (-mu / r^2, 0).
        let (velocity_space, pressure_space) = spaces();
        let tentative = Field::interpolate(&velocity_space, |_| Vector3::new(1., 0., 0.));
        let pressure = Field::interpolate_scalar(&pressure_space, |x| 3. * x[0] - x[1]);
        let input = input(&tentative, None, &pressure_space, &[]);
        let (velocity, _) =
            compute_velocity_correction(&input, &tentative, &pressure, true).unwrap();
        let expected = Field::interpolate(&velocity_space, |x| {
            Vector3::new(0.85 + 0.05 * 0.5 / (x[0] * x[0]), 0.05, 0.)
        });
        assert_all_close(velocity.dofs(), expected.dofs()).abs_tol(Some(1e-3));
    }

    #[test]
    fn test_boundary_conditions_hold() {
        let (velocity_space, pressure_space) = spaces();
        let tentative = Field::interpolate(&velocity_space, |x| Vector3::new(x[0], x[1], 0.));
        let pressure = Field::interpolate_scalar(&pressure_space, |x| x[0] * x[1]);
        let walls = DirichletBc::homogeneous(&velocity_space, 0, |x| {
            (x[0] - 1.).abs() < 1e-12 || (x[0] - 2.).abs() < 1e-12
        })
        .unwrap();
        let bcs = [walls];
        let input = input(&tentative, None, &pressure_space, &bcs);
        let (velocity, _) =
            compute_velocity_correction(&input, &tentative, &pressure, false).unwrap();
        assert!(!bcs[0].dofs().is_empty());
        for &dof in bcs[0].dofs() {
            assert_relative_eq!(velocity.dofs()[dof], 0., epsilon = 1e-10);
        }
    }
}
