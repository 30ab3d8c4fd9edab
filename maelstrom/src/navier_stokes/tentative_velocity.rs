//! Implicit solve for the tentative velocity $u^*$.
//!
//! $$ \rho \frac{u^* - u^n}{\Delta t} 2 \pi r + w_n F(u^n, f^n) + w_{n+1} F(u^*, f^{n+1}) = 0, $$
//!
//! with the weights $(w_n, w_{n+1})$ of the time stepping method and the
//! previous pressure in both momentum residuals.

use ndarray as nd;

use crate::{
    assembly::{self, Flux},
    fields::{Field, VectorJet},
    float_consts::PI,
    linalg::{KrylovMethod, KrylovSolver, PreconditionerKind},
    newton::{NewtonSolver, NonlinearProblem},
    stabilization::{Stabilization, StabilizationParameter},
    Array1, CsMat, Float, IpcsError, Matrix3x2,
};

use super::{momentum::MomentumResidual, quadrature_degree, FlowMode, StepInput, TimeSteppingMethod};

const MAX_NEWTON_ITERATIONS: usize = 5;
const GMRES_RESTART: usize = 30;
const MAX_GMRES_ITERATIONS: usize = 1000;

pub struct TentativeVelocityProblem<'a> {
    input: StepInput<'a>,
    mode: FlowMode,
    /// Weight of the momentum residual at the new time level.
    implicit_weight: Float,
    stabilization: Stabilization,
    stabilization_parameter: &'a dyn StabilizationParameter,
    /// $w_n F(u^n, f^n)$, fixed during the solve.
    explicit_part: Array1,
}

impl<'a> TentativeVelocityProblem<'a> {
    pub fn new(
        input: &StepInput<'a>,
        method: TimeSteppingMethod,
        stabilization: Stabilization,
        stabilization_parameter: &'a dyn StabilizationParameter,
    ) -> Result<Self, IpcsError> {
        let mode = input.validate()?;
        let (explicit_weight, implicit_weight) = method.weights();
        let explicit_part = if explicit_weight > 0. {
            MomentumResidual::new_unchecked(
                input.velocity,
                input.pressure,
                input.forcing.previous,
                input.coefficients,
                mode,
                stabilization,
                stabilization_parameter,
            )
            .assemble()
                * explicit_weight
        } else {
            Array1::zeros(input.velocity.space().num_dofs())
        };
        Ok(Self {
            input: *input,
            mode,
            implicit_weight,
            stabilization,
            stabilization_parameter,
            explicit_part,
        })
    }

    fn iterate(&self, x: nd::ArrayView1<Float>) -> Field {
        let mut field = self.input.velocity.clone();
        field.dofs_mut().assign(&x);
        field
    }

    fn implicit_momentum<'b>(&'b self, velocity: &'b Field) -> Option<MomentumResidual<'b>> {
        (self.implicit_weight > 0.).then(|| {
            MomentumResidual::new_unchecked(
                velocity,
                self.input.pressure,
                self.input.forcing.current,
                self.input.coefficients,
                self.mode,
                self.stabilization,
                self.stabilization_parameter,
            )
        })
    }

    /// Coefficient of the discrete time derivative, $2 \pi r \rho / \Delta t$.
    fn inertia(&self, r: Float) -> Float {
        2. * PI * r * self.input.coefficients.density() / self.input.dt
    }

    /// The residual before boundary conditions are applied.
    pub fn assemble_residual(&self, x: nd::ArrayView1<Float>) -> Array1 {
        let velocity = self.iterate(x);
        let momentum = self.implicit_momentum(&velocity);
        let space = velocity.space();
        let previous = self.input.velocity;
        let residual = assembly::assemble_vector(space, quadrature_degree(space), |point| {
            let increment = velocity.evaluate(point).value - previous.evaluate(point).value;
            let time_derivative = Flux {
                source: increment * self.inertia(point.r()),
                flux: Matrix3x2::zeros(),
            };
            match &momentum {
                Some(momentum) => {
                    time_derivative + momentum.at(point).flux() * self.implicit_weight
                }
                None => time_derivative,
            }
        });
        residual + &self.explicit_part
    }

    /// Runs Newton's method from the previous velocity.
    pub fn solve(&self) -> Result<Field, IpcsError> {
        let options = self.input.options;
        let linear_solver = KrylovSolver::new(
            KrylovMethod::Gmres {
                restart: GMRES_RESTART,
            },
            PreconditionerKind::Ilu,
        )
        .with_rel_tol(options.tol)
        .with_max_iters(MAX_GMRES_ITERATIONS)
        .with_monitor_convergence(options.verbose);
        let newton = NewtonSolver::default()
            .with_max_iterations(MAX_NEWTON_ITERATIONS)
            .with_abs_tol(options.tol)
            .with_rel_tol(0.)
            .with_linear_solver(linear_solver)
            .with_report(options.verbose);

        let mut x = self.input.velocity.dofs().clone();
        newton.solve(self, &mut x)?;
        Field::from_dofs(self.input.velocity.space(), x)
    }
}

impl NonlinearProblem for TentativeVelocityProblem<'_> {
    fn residual(&self, x: nd::ArrayView1<Float>, residual: &mut Array1) {
        residual.assign(&self.assemble_residual(x));
        for bc in self.input.velocity_bcs {
            bc.apply_to_residual(residual, x);
        }
    }

    fn jacobian(&self, x: nd::ArrayView1<Float>) -> CsMat {
        let velocity = self.iterate(x);
        let momentum = self.implicit_momentum(&velocity);
        let space = velocity.space();
        let jacobian = assembly::assemble_matrix(space, space, quadrature_degree(space), |point| {
            let inertia = self.inertia(point.r());
            let state = momentum.as_ref().map(|momentum| momentum.at(point));
            let implicit_weight = self.implicit_weight;
            move |w: &VectorJet| {
                let time_derivative = Flux {
                    source: w.value * inertia,
                    flux: Matrix3x2::zeros(),
                };
                match &state {
                    Some(state) => time_derivative + state.derivative(w) * implicit_weight,
                    None => time_derivative,
                }
            }
        });
        self.input
            .velocity_bcs
            .iter()
            .fold(jacobian, |jacobian, bc| bc.apply_to_matrix(jacobian))
    }
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
        stabilization::Supg,
        test_util::assert_all_close,
        Vector3,
    };
    use strum::IntoEnumIterator;

    struct Setup {
        velocity_space: Arc<FunctionSpace>,
        pressure_space: Arc<FunctionSpace>,
        velocity: Field,
        pressure: Field,
        forcing_previous: Field,
        forcing_current: Field,
        bcs: Vec<DirichletBc>,
    }

    impl Setup {
        fn new(num_components: usize) -> Self {
            let r_axis = geom::Axis::new(1., 2., 3).unwrap();
            let z_axis = geom::Axis::new(0., 1., 3).unwrap();
            let mesh = Arc::new(geom::Mesh::rectangle(&r_axis, &z_axis).unwrap());
            let velocity_space =
                Arc::new(FunctionSpace::new(mesh.clone(), 2, num_components).unwrap());
            let pressure_space = Arc::new(FunctionSpace::new(mesh, 1, 1).unwrap());
            let bcs = (0..num_components)
                .map(|c| DirichletBc::homogeneous(&velocity_space, c, |_| true).unwrap())
                .collect();
            Self {
                velocity: Field::interpolate(&velocity_space, |x| {
                    let bump = (x[0] - 1.) * (2. - x[0]) * x[1] * (1. - x[1]);
                    Vector3::new(bump, 0.5 * bump, -bump)
                }),
                pressure: Field::interpolate_scalar(&pressure_space, |x| x[0] - x[1]),
                forcing_previous: Field::interpolate(&velocity_space, |x| {
                    Vector3::new(0., -1., x[0])
                }),
                forcing_current: Field::interpolate(&velocity_space, |x| {
                    Vector3::new(0.1, -1., x[1])
                }),
                velocity_space,
                pressure_space,
                bcs,
            }
        }

        fn input(&self) -> StepInput<'_> {
            StepInput {
                velocity: &self.velocity,
                pressure: Some(&self.pressure),
                pressure_space: &self.pressure_space,
                forcing: Forcing {
                    previous: &self.forcing_previous,
                    current: &self.forcing_current,
                },
                coefficients: Coefficients::new(1., 0.1).unwrap(),
                dt: 0.05,
                velocity_bcs: &self.bcs,
                pressure_bcs: &[],
                options: SolveOptions {
                    tol: 1e-9,
                    verbose: false,
                },
            }
        }
    }

    fn residual(input: &StepInput, method: TimeSteppingMethod, x: nd::ArrayView1<Float>) -> Array1 {
        TentativeVelocityProblem::new(input, method, Stabilization::StreamlineUpwind, &Supg)
            .unwrap()
            .assemble_residual(x)
    }

    #[test]
    fn test_crank_nicolson_averages_euler_methods() {
        let setup = Setup::new(3);
        let input = setup.input();
        let x = Field::interpolate(&setup.velocity_space, |x| Vector3::new(x[1], x[0], 0.2));
        let x = x.dofs().view();
        let forward = residual(&input, TimeSteppingMethod::ForwardEuler, x);
        let backward = residual(&input, TimeSteppingMethod::BackwardEuler, x);
        let crank_nicolson = residual(&input, TimeSteppingMethod::CrankNicolson, x);
        assert_all_close(&crank_nicolson, &((forward + backward) * 0.5)).abs_tol(Some(1e-12));
    }

    #[test]
    fn test_euler_methods_wrap_momentum_residual() {
        let setup = Setup::new(3);
        let input = setup.input();
        let x = Field::interpolate(&setup.velocity_space, |x| Vector3::new(x[1], -x[0], 0.3));
        // rho (x - u_prev) / dt 2 pi r with rho = 1 and dt = 0.05.
        let space = &setup.velocity_space;
        let time_derivative = assembly::assemble_vector(space, quadrature_degree(space), |point| {
            let increment = x.evaluate(point).value - setup.velocity.evaluate(point).value;
            Flux {
                source: increment * (2. * PI * point.r() / 0.05),
                flux: Matrix3x2::zeros(),
            }
        });
        let momentum = |velocity: &Field, forcing: &Field| {
            MomentumResidual::new(
                velocity,
                Some(&setup.pressure),
                forcing,
                input.coefficients,
                Stabilization::StreamlineUpwind,
                &Supg,
            )
            .unwrap()
            .assemble()
        };

        let backward = residual(&input, TimeSteppingMethod::BackwardEuler, x.dofs().view());
        assert_all_close(
            &(backward - &time_derivative),
            &momentum(&x, &setup.forcing_current),
        )
        .abs_tol(Some(1e-10));

        let forward = residual(&input, TimeSteppingMethod::ForwardEuler, x.dofs().view());
        assert_all_close(
            &(forward - &time_derivative),
            &momentum(&setup.velocity, &setup.forcing_previous),
        )
        .abs_tol(Some(1e-10));
    }

    #[test]
    fn test_euler_methods_agree_at_previous_velocity() {
        let setup = Setup::new(2);
        let input = StepInput {
            forcing: Forcing {
                previous: &setup.forcing_previous,
                current: &setup.forcing_previous,
            },
            ..setup.input()
        };
        let x = setup.velocity.dofs().view();
        assert_all_close(
            &residual(&input, TimeSteppingMethod::ForwardEuler, x),
            &residual(&input, TimeSteppingMethod::BackwardEuler, x),
        )
        .abs_tol(Some(1e-12));
    }

    #[test]
    fn test_rest_state_is_a_fixed_point() {
        let setup = Setup::new(2);
        let velocity = Field::zeros(&setup.velocity_space);
        let forcing = Field::zeros(&setup.velocity_space);
        let input = StepInput {
            velocity: &velocity,
            pressure: None,
            forcing: Forcing {
                previous: &forcing,
                current: &forcing,
            },
            ..setup.input()
        };
        for method in TimeSteppingMethod::iter() {
            let problem = TentativeVelocityProblem::new(
                &input,
                method,
                Stabilization::StreamlineUpwind,
                &Supg,
            )
            .unwrap();
            let tentative = problem.solve().unwrap();
            assert!(tentative.dofs().iter().all(|&value| value == 0.));
        }
    }

    #[test]
    fn test_newton_converges() {
        let setup = Setup::new(3);
        let input = setup.input();
        for stabilization in Stabilization::iter() {
            let problem = TentativeVelocityProblem::new(
                &input,
                TimeSteppingMethod::BackwardEuler,
                stabilization,
                &Supg,
            )
            .unwrap();
            let tentative = problem.solve().unwrap();
            let mut residual = Array1::zeros(tentative.dofs().len());
            problem.residual(tentative.dofs().view(), &mut residual);
            assert!(crate::linalg::norm(&residual) < 1e-9);
            for bc in &setup.bcs {
                assert!(bc.dofs().iter().all(|&dof| tentative.dofs()[dof].abs() < 1e-9));
            }
        }
    }

    #[test]
    fn test_invalid_time_step() {
        let setup = Setup::new(2);
        let input = StepInput {
            dt: 0.,
            ..setup.input()
        };
        let result = TentativeVelocityProblem::new(
            &input,
            TimeSteppingMethod::BackwardEuler,
            Stabilization::None,
            &Supg,
        );
        assert!(matches!(
            result,
            Err(IpcsError::InvalidParameter { name: "dt", .. })
        ));
    }
}
