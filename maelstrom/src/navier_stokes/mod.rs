//! Incremental pressure-correction scheme (IPCS) for the incompressible
//! Navier-Stokes equations in axisymmetric cylindrical coordinates
//!
//! $$ \rho (u_t + (u \cdot \nabla) u) = -\nabla p + \mu \Delta u + f, \quad \operatorname{div} u = 0. $$
//!
//! Velocity components are ordered $(r, z, \theta)$; the azimuthal one is
//! present only for swirling flow. All forms are weighted with $2 \pi r$, the
//! Jacobian of the cylindrical volume element.
//!
//! Each step splits into
//!
//! 1. a nonlinear solve for a tentative velocity $u^*$ using the previous
//!    pressure,
//! 2. a Poisson problem for the new pressure, driven by $\operatorname{div} u^*$,
//! 3. a projection of $u^*$ with the pressure increment.

pub mod momentum;
pub mod pressure;
pub mod tentative_velocity;
pub mod velocity_correction;

pub use momentum::MomentumResidual;
pub use pressure::Consistency;

use std::sync::Arc;

use crate::{
    bcs::DirichletBc,
    fields::Field,
    message::Message,
    space::FunctionSpace,
    stabilization::{Stabilization, StabilizationParameter, Supg},
    Float, IpcsError,
};

pub(crate) fn check_positive(name: &'static str, value: Float) -> Result<Float, IpcsError> {
    if value > 0. {
        Ok(value)
    } else {
        Err(IpcsError::InvalidParameter { name, value })
    }
}

/// Quadrature degree used for all forms over a velocity space.
pub(crate) fn quadrature_degree(velocity_space: &FunctionSpace) -> usize {
    3 * velocity_space.degree() + 1
}

/// Fluid density $\rho$ and dynamic viscosity $\mu$, both strictly positive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coefficients {
    density: Float,
    viscosity: Float,
}

impl Coefficients {
    pub fn new(density: Float, viscosity: Float) -> Result<Self, IpcsError> {
        Ok(Self {
            density: check_positive("density", density)?,
            viscosity: check_positive("viscosity", viscosity)?,
        })
    }

    pub fn density(&self) -> Float {
        self.density
    }

    pub fn viscosity(&self) -> Float {
        self.viscosity
    }

    pub fn kinematic_viscosity(&self) -> Float {
        self.viscosity / self.density
    }
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, strum::EnumString, strum::Display, strum::EnumIter,
)]
pub enum TimeSteppingMethod {
    #[strum(serialize = "forward euler")]
    ForwardEuler,
    #[default]
    #[strum(serialize = "backward euler")]
    BackwardEuler,
    #[strum(serialize = "crank-nicolson")]
    CrankNicolson,
}

impl TimeSteppingMethod {
    pub fn from_name(name: &str) -> Result<Self, IpcsError> {
        name.parse()
            .map_err(|_| IpcsError::UnknownTimeSteppingMethod(name.to_owned()))
    }

    /// Weights of the momentum residual at the previous and at the new time
    /// level.
    pub fn weights(self) -> (Float, Float) {
        match self {
            Self::ForwardEuler => (1., 0.),
            Self::BackwardEuler => (0., 1.),
            Self::CrankNicolson => (0.5, 0.5),
        }
    }
}

/// Whether the azimuthal velocity component is carried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowMode {
    Axisymmetric,
    Swirl,
}

impl FlowMode {
    pub fn of(velocity_space: &FunctionSpace) -> Result<Self, IpcsError> {
        match velocity_space.num_components() {
            2 => Ok(Self::Axisymmetric),
            3 => Ok(Self::Swirl),
            n => Err(IpcsError::UnsupportedSpace(format!(
                "velocity spaces need 2 or 3 components, got {n}"
            ))),
        }
    }

    pub fn has_swirl(self) -> bool {
        self == Self::Swirl
    }
}

/// Volume force at the previous and at the new time level.
#[derive(Clone, Copy, Debug)]
pub struct Forcing<'a> {
    pub previous: &'a Field,
    pub current: &'a Field,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolveOptions {
    /// Absolute Newton tolerance and relative tolerance of every linear solve.
    pub tol: Float,
    /// Report Newton iterations and monitor Krylov convergence.
    pub verbose: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            tol: 1e-10,
            verbose: true,
        }
    }
}

/// The state and data one step starts from.
#[derive(Clone, Copy, Debug)]
pub struct StepInput<'a> {
    pub velocity: &'a Field,
    /// Previous pressure; `None` on a cold start.
    pub pressure: Option<&'a Field>,
    pub pressure_space: &'a Arc<FunctionSpace>,
    pub forcing: Forcing<'a>,
    pub coefficients: Coefficients,
    pub dt: Float,
    pub velocity_bcs: &'a [DirichletBc],
    /// Without pressure boundary conditions the pressure is determined up to
    /// a constant.
    pub pressure_bcs: &'a [DirichletBc],
    pub options: SolveOptions,
}

impl StepInput<'_> {
    fn validate(&self) -> Result<FlowMode, IpcsError> {
        check_positive("dt", self.dt)?;
        let velocity_space = self.velocity.space();
        let mode = FlowMode::of(velocity_space)?;
        if self.pressure_space.num_components() != 1 {
            return Err(IpcsError::UnsupportedSpace(
                "the pressure space must be scalar".to_owned(),
            ));
        }
        if !velocity_space.shares_mesh_with(self.pressure_space) {
            return Err(IpcsError::IncompatibleSpaces(
                "velocity and pressure live on different meshes".to_owned(),
            ));
        }
        for (what, field) in [
            ("previous forcing", self.forcing.previous),
            ("current forcing", self.forcing.current),
        ] {
            field.ensure_same_mesh(velocity_space, what)?;
            if field.space().num_components() != velocity_space.num_components() {
                return Err(IpcsError::IncompatibleSpaces(format!(
                    "{what} has {} components, the velocity {}",
                    field.space().num_components(),
                    velocity_space.num_components()
                )));
            }
        }
        if let Some(pressure) = self.pressure {
            pressure.ensure_same_mesh(velocity_space, "previous pressure")?;
            if pressure.space().num_components() != 1 {
                return Err(IpcsError::UnsupportedSpace(
                    "the previous pressure must be scalar".to_owned(),
                ));
            }
        }
        for (what, bcs, space) in [
            ("velocity", self.velocity_bcs, velocity_space),
            ("pressure", self.pressure_bcs, self.pressure_space),
        ] {
            if bcs.iter().any(|bc| !Arc::ptr_eq(bc.space(), space)) {
                return Err(IpcsError::IncompatibleSpaces(format!(
                    "{what} boundary conditions are defined on another space"
                )));
            }
        }
        Ok(mode)
    }
}

#[derive(Clone, Debug)]
pub struct StepOutput {
    pub velocity: Field,
    pub pressure: Field,
    /// $\|\operatorname{div} u\|_{L^2}$ of the new velocity.
    pub divergence_norm: Float,
}

/// Nominal orders of convergence in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConvergenceOrder {
    pub velocity: usize,
    pub pressure: usize,
}

pub struct Ipcs {
    method: TimeSteppingMethod,
    stabilization: Stabilization,
    rotational_form: bool,
    stabilization_parameter: Box<dyn StabilizationParameter>,
}

impl Default for Ipcs {
    fn default() -> Self {
        Self::new(TimeSteppingMethod::default(), Stabilization::default())
    }
}

impl Ipcs {
    pub const ORDER: ConvergenceOrder = ConvergenceOrder {
        velocity: 1,
        pressure: 0,
    };

    pub fn new(method: TimeSteppingMethod, stabilization: Stabilization) -> Self {
        Self {
            method,
            stabilization,
            rotational_form: false,
            stabilization_parameter: Box::new(Supg),
        }
    }

    pub fn with_rotational_form(self, rotational_form: bool) -> Self {
        Self {
            rotational_form,
            ..self
        }
    }

    pub fn with_stabilization_parameter<P: StabilizationParameter + 'static>(
        self,
        stabilization_parameter: P,
    ) -> Self {
        Self {
            stabilization_parameter: Box::new(stabilization_parameter),
            ..self
        }
    }

    pub fn method(&self) -> TimeSteppingMethod {
        self.method
    }

    pub fn stabilization(&self) -> Stabilization {
        self.stabilization
    }

    /// Advances velocity and pressure by one time step.
    pub fn step(&self, input: &StepInput) -> Result<StepOutput, IpcsError> {
        input.validate()?;

        let tentative = {
            let _message = Message::new("Computing tentative velocity");
            tentative_velocity::TentativeVelocityProblem::new(
                input,
                self.method,
                self.stabilization,
                self.stabilization_parameter.as_ref(),
            )?
            .solve()?
        };

        let pressure = {
            let _message = Message::new("Computing pressure correction");
            pressure::compute_pressure(input, &tentative, self.rotational_form)?
        };

        let (velocity, divergence_norm) = {
            let _message = Message::new("Computing velocity correction");
            velocity_correction::compute_velocity_correction(
                input,
                &tentative,
                &pressure,
                self.rotational_form,
            )?
        };

        Ok(StepOutput {
            velocity,
            pressure,
            divergence_norm,
        })
    }
}
