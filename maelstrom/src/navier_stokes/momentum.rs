//! Weak residual of the momentum equation.
//!
//! The convective term is written in skew-symmetric form,
//!
//! $$ \tfrac{1}{2} \rho \left( \langle (u \cdot \nabla) u, v \rangle - \langle (u \cdot \nabla) v, u \rangle \right), $$
//!
//! which is energy-neutral for any velocity. Integrating the viscous term by
//! parts produces the boundary integral $\mu \langle r \nabla u \cdot n, v \rangle$;
//! it is omitted, i.e. $\nabla u \cdot n$ is assumed to vanish wherever no
//! Dirichlet data is given.

use crate::{
    assembly::{self, Flux, QuadraturePoint},
    fields::{Field, VectorJet},
    float_consts::PI,
    stabilization::{Stabilization, StabilizationParameter},
    Array1, Float, IpcsError, Matrix3x2, Vector2, Vector3,
};

use super::{quadrature_degree, Coefficients, FlowMode};

/// Momentum residual $F(u; v)$ for a fixed velocity, pressure and forcing.
pub struct MomentumResidual<'a> {
    velocity: &'a Field,
    pressure: Option<&'a Field>,
    forcing: &'a Field,
    coefficients: Coefficients,
    mode: FlowMode,
    /// Per-cell SUPG weights, frozen at `velocity`.
    tau: Option<Vec<Float>>,
}

impl<'a> MomentumResidual<'a> {
    pub fn new(
        velocity: &'a Field,
        pressure: Option<&'a Field>,
        forcing: &'a Field,
        coefficients: Coefficients,
        stabilization: Stabilization,
        stabilization_parameter: &dyn StabilizationParameter,
    ) -> Result<Self, IpcsError> {
        let mode = FlowMode::of(velocity.space())?;
        forcing.ensure_same_mesh(velocity.space(), "forcing")?;
        if let Some(pressure) = pressure {
            pressure.ensure_same_mesh(velocity.space(), "pressure")?;
        }
        Ok(Self::new_unchecked(
            velocity,
            pressure,
            forcing,
            coefficients,
            mode,
            stabilization,
            stabilization_parameter,
        ))
    }

    /// Like [`Self::new`] for fields already known to be compatible.
    pub(super) fn new_unchecked(
        velocity: &'a Field,
        pressure: Option<&'a Field>,
        forcing: &'a Field,
        coefficients: Coefficients,
        mode: FlowMode,
        stabilization: Stabilization,
        stabilization_parameter: &dyn StabilizationParameter,
    ) -> Self {
        let tau = match stabilization {
            Stabilization::None => None,
            Stabilization::StreamlineUpwind => Some(
                stabilization_parameter.compute(velocity, coefficients.kinematic_viscosity()),
            ),
        };
        Self {
            velocity,
            pressure,
            forcing,
            coefficients,
            mode,
            tau,
        }
    }

    /// Evaluates the coefficient fields at a quadrature point.
    pub fn at(&self, point: &QuadraturePoint) -> MomentumPoint {
        MomentumPoint {
            r: point.r(),
            density: self.coefficients.density(),
            viscosity: self.coefficients.viscosity(),
            swirl: self.mode.has_swirl(),
            velocity: self.velocity.evaluate(point),
            forcing: self.forcing.evaluate(point).value,
            pressure_gradient: self
                .pressure
                .map_or_else(Vector2::zeros, |p| p.evaluate(point).component_gradient(0)),
            tau: self.tau.as_ref().map(|tau| tau[point.cell]),
        }
    }

    /// Assembles $F(u; v)$ for every test function of the velocity space.
    pub fn assemble(&self) -> Array1 {
        let space = self.velocity.space();
        assembly::assemble_vector(space, quadrature_degree(space), |point| self.at(point).flux())
    }
}

/// The momentum integrand at one point.
#[derive(Clone, Copy, Debug)]
pub struct MomentumPoint {
    r: Float,
    density: Float,
    viscosity: Float,
    swirl: bool,
    velocity: VectorJet,
    forcing: Vector3,
    pressure_gradient: Vector2,
    tau: Option<Float>,
}

impl MomentumPoint {
    /// Terms of order zero in derivatives that come from the cylindrical
    /// metric: $\mu u_r / r$ (and $\mu u_\theta / r$) times $2 \pi$.
    fn metric_viscous(&self, w: &Vector3) -> Vector3 {
        let swirl = if self.swirl { w[2] / self.r } else { 0. };
        Vector3::new(w[0] / self.r, 0., swirl) * (2. * PI * self.viscosity)
    }

    /// Centrifugal and Coriolis terms $\rho (-u_\theta^2, 0, u_r u_\theta)$
    /// times $2 \pi$.
    fn swirl_inertia(&self) -> Vector3 {
        if !self.swirl {
            return Vector3::zeros();
        }
        let u = &self.velocity.value;
        Vector3::new(-u[2] * u[2], 0., u[0] * u[2]) * (2. * PI * self.density)
    }

    fn swirl_inertia_derivative(&self, w: &Vector3) -> Vector3 {
        if !self.swirl {
            return Vector3::zeros();
        }
        let u = &self.velocity.value;
        Vector3::new(-2. * u[2] * w[2], 0., w[0] * u[2] + u[0] * w[2]) * (2. * PI * self.density)
    }

    fn pressure_term(&self) -> Vector3 {
        Vector3::new(self.pressure_gradient[0], self.pressure_gradient[1], 0.) * (2. * PI * self.r)
    }

    fn planar_laplacians(jet: &VectorJet) -> Vector3 {
        Vector3::new(
            jet.planar_laplacian(0),
            jet.planar_laplacian(1),
            jet.planar_laplacian(2),
        )
    }

    /// Strong form of the stationary momentum residual, times $2 \pi r$;
    /// $\operatorname{div}(r \nabla u_c) = \partial_r u_c + r \Delta u_c$.
    fn strong_residual(&self) -> Vector3 {
        let u = &self.velocity;
        let convection = u.gradient * u.in_plane();
        let diffusion = u.gradient.column(0) + Self::planar_laplacians(u) * self.r;
        (convection * self.density - self.forcing) * (2. * PI * self.r)
            - diffusion * (2. * PI * self.viscosity)
            + self.pressure_term()
            + self.metric_viscous(&u.value)
            + self.swirl_inertia()
    }

    fn strong_residual_derivative(&self, w: &VectorJet) -> Vector3 {
        let u = &self.velocity;
        let convection = w.gradient * u.in_plane() + u.gradient * w.in_plane();
        let diffusion = w.gradient.column(0) + Self::planar_laplacians(w) * self.r;
        convection * (2. * PI * self.r * self.density) - diffusion * (2. * PI * self.viscosity)
            + self.metric_viscous(&w.value)
            + self.swirl_inertia_derivative(&w.value)
    }

    pub fn flux(&self) -> Flux {
        let u = &self.velocity;
        let advecting = u.in_plane();
        let two_pi_r = 2. * PI * self.r;

        let convection = u.gradient * advecting;
        let source = (convection * (0.5 * self.density) - self.forcing) * two_pi_r
            + self.metric_viscous(&u.value)
            + self.pressure_term()
            + self.swirl_inertia();
        let mut flux: Matrix3x2 = u.value * advecting.transpose() * (-0.5 * self.density * two_pi_r)
            + u.gradient * (self.viscosity * two_pi_r);
        if let Some(tau) = self.tau {
            flux += self.strong_residual() * advecting.transpose() * tau;
        }
        Flux { source, flux }
    }

    /// Directional derivative of [`Self::flux`] with respect to the velocity.
    pub fn derivative(&self, w: &VectorJet) -> Flux {
        let u = &self.velocity;
        let advecting = u.in_plane();
        let direction = w.in_plane();
        let two_pi_r = 2. * PI * self.r;

        let convection = w.gradient * advecting + u.gradient * direction;
        let source = convection * (0.5 * self.density * two_pi_r)
            + self.metric_viscous(&w.value)
            + self.swirl_inertia_derivative(&w.value);
        let transport = w.value * advecting.transpose() + u.value * direction.transpose();
        let mut flux: Matrix3x2 = transport * (-0.5 * self.density * two_pi_r)
            + w.gradient * (self.viscosity * two_pi_r);
        if let Some(tau) = self.tau {
            flux += (self.strong_residual_derivative(w) * advecting.transpose()
                + self.strong_residual() * direction.transpose())
                * tau;
        }
        Flux { source, flux }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        assembly::assemble_matrix, geom, space::FunctionSpace, stabilization::Supg,
        test_util::assert_all_close,
    };

    fn velocity_space(num_components: usize) -> Arc<FunctionSpace> {
        let r_axis = geom::Axis::new(0.5, 1.5, 2).unwrap();
        let z_axis = geom::Axis::new(0., 1., 2).unwrap();
        let mesh = Arc::new(geom::Mesh::rectangle(&r_axis, &z_axis).unwrap());
        Arc::new(FunctionSpace::new(mesh, 2, num_components).unwrap())
    }

    fn swirling(space: &Arc<FunctionSpace>, scale: Float) -> Field {
        Field::interpolate(space, |x| {
            Vector3::new(x[1] * (1. - x[0]), x[0] * x[0], 0.5 - x[1] * x[0]) * scale
        })
    }

    fn residual_at<'a>(
        velocity: &'a Field,
        pressure: &'a Field,
        forcing: &'a Field,
        stabilization: Stabilization,
    ) -> MomentumResidual<'a> {
        let coefficients = Coefficients::new(1.3, 0.05).unwrap();
        MomentumResidual::new(velocity, Some(pressure), forcing, coefficients, stabilization, &Supg)
            .unwrap()
    }

    /// Central differences of the assembled residual against the assembled
    /// Jacobian.
    fn check_jacobian(num_components: usize, stabilization: Stabilization) {
        let space = velocity_space(num_components);
        let velocity = swirling(&space, 1.);
        let forcing = Field::interpolate(&space, |x| Vector3::new(x[0], -1., 0.3));
        let pressure_space = Arc::new(FunctionSpace::new(space.mesh().clone(), 1, 1).unwrap());
        let pressure = Field::interpolate_scalar(&pressure_space, |x| x[0] * x[1]);

        let base = residual_at(&velocity, &pressure, &forcing, stabilization);
        let jacobian = assemble_matrix(&space, &space, quadrature_degree(&space), |point| {
            let state = base.at(point);
            move |w: &VectorJet| state.derivative(w)
        });

        let direction = swirling(&space, 0.7).into_dofs().mapv(|x| x * x - 0.1);
        let epsilon = 1e-6;
        let shifted = |sign: Float| {
            let dofs = velocity.dofs() + &(&direction * (sign * epsilon));
            let field = Field::from_dofs(&space, dofs).unwrap();
            let mut residual = residual_at(&field, &pressure, &forcing, stabilization);
            // SUPG weights stay frozen at the base velocity.
            residual.tau.clone_from(&base.tau);
            residual.assemble()
        };
        let finite_difference = (shifted(1.) - shifted(-1.)) / (2. * epsilon);
        assert_all_close(&(&jacobian * &direction), &finite_difference)
            .rel_tol(Some(1e-6))
            .abs_tol(Some(1e-8));
    }

    #[test]
    fn test_jacobian_axisymmetric() {
        check_jacobian(2, Stabilization::None);
    }

    #[test]
    fn test_jacobian_swirl() {
        check_jacobian(3, Stabilization::None);
    }

    #[test]
    fn test_jacobian_supg() {
        check_jacobian(3, Stabilization::StreamlineUpwind);
    }

    #[test]
    fn test_skew_symmetric_convection_is_energy_neutral() {
        // Without forcing or pressure and with negligible viscosity, the
        // convective part of <F(u), u> cancels pointwise.
        let space = velocity_space(2);
        let coefficients = Coefficients::new(1., 1e-300).unwrap();
        let velocity = swirling(&space, 1.);
        let zero = Field::zeros(&space);
        let residual = MomentumResidual::new(
            &velocity,
            None,
            &zero,
            coefficients,
            Stabilization::None,
            &Supg,
        )
        .unwrap()
        .assemble();
        let energy = residual.dot(velocity.dofs());
        approx::assert_relative_eq!(energy, 0., epsilon = 1e-12);
    }

    #[test]
    fn test_hydrostatic_balance() {
        // u = 0 with grad p = f leaves no residual at all.
        let space = velocity_space(2);
        let pressure_space = Arc::new(FunctionSpace::new(space.mesh().clone(), 1, 1).unwrap());
        let gravity = 9.81;
        let coefficients = Coefficients::new(2., 0.1).unwrap();
        let pressure = Field::interpolate_scalar(&pressure_space, |x| {
            -coefficients.density() * gravity * x[1]
        });
        let forcing =
            Field::interpolate(&space, |_| Vector3::new(0., -coefficients.density() * gravity, 0.));
        let velocity = Field::zeros(&space);
        let residual = MomentumResidual::new(
            &velocity,
            Some(&pressure),
            &forcing,
            coefficients,
            Stabilization::StreamlineUpwind,
            &Supg,
        )
        .unwrap()
        .assemble();
        assert_all_close(&residual, &Array1::zeros(space.num_dofs())).abs_tol(Some(1e-12));
    }

    #[test]
    fn test_incompatible_forcing() {
        let space = velocity_space(2);
        let other = velocity_space(2);
        let velocity = Field::zeros(&space);
        let forcing = Field::zeros(&other);
        let result = MomentumResidual::new(
            &velocity,
            None,
            &forcing,
            Coefficients::new(1., 1.).unwrap(),
            Stabilization::None,
            &Supg,
        );
        assert!(matches!(result, Err(IpcsError::IncompatibleSpaces(_))));
    }
}
