//! Ready-made annular channel problems.

use std::sync::Arc;

use crate::{
    bcs::DirichletBc,
    fields::Field,
    geom,
    navier_stokes::{Coefficients, Forcing, Ipcs, SolveOptions, StepInput},
    space::FunctionSpace,
    Float, IpcsError, Vector2, Vector3,
};

const INNER_RADIUS: Float = 1.;
const OUTER_RADIUS: Float = 2.;
const HEIGHT: Float = 1.;

/// A flow in the annulus $1 \le r \le 2$, $0 \le z \le 1$, with forcing
/// constant in time.
pub struct Channel {
    pub velocity_space: Arc<FunctionSpace>,
    pub pressure_space: Arc<FunctionSpace>,
    pub velocity: Field,
    pub pressure: Option<Field>,
    pub forcing: Field,
    pub coefficients: Coefficients,
    pub velocity_bcs: Vec<DirichletBc>,
    pub pressure_bcs: Vec<DirichletBc>,
    pub options: SolveOptions,
}

impl Channel {
    fn new(
        num_cells: [usize; 2],
        num_components: usize,
        coefficients: Coefficients,
    ) -> Result<Self, IpcsError> {
        let r_axis = geom::Axis::new(INNER_RADIUS, OUTER_RADIUS, num_cells[0])?;
        let z_axis = geom::Axis::new(0., HEIGHT, num_cells[1])?;
        let mesh = Arc::new(geom::Mesh::rectangle(&r_axis, &z_axis)?);
        let velocity_space = Arc::new(FunctionSpace::new(mesh.clone(), 2, num_components)?);
        let pressure_space = Arc::new(FunctionSpace::new(mesh, 1, 1)?);
        Ok(Self {
            velocity: Field::zeros(&velocity_space),
            pressure: None,
            forcing: Field::zeros(&velocity_space),
            coefficients,
            velocity_bcs: Vec::new(),
            pressure_bcs: Vec::new(),
            options: SolveOptions::default(),
            velocity_space,
            pressure_space,
        })
    }

    pub fn input(&self, dt: Float) -> StepInput<'_> {
        StepInput {
            velocity: &self.velocity,
            pressure: self.pressure.as_ref(),
            pressure_space: &self.pressure_space,
            forcing: Forcing {
                previous: &self.forcing,
                current: &self.forcing,
            },
            coefficients: self.coefficients,
            dt,
            velocity_bcs: &self.velocity_bcs,
            pressure_bcs: &self.pressure_bcs,
            options: self.options,
        }
    }

    /// Takes one step and returns the divergence norm of the new velocity.
    pub fn advance(&mut self, ipcs: &Ipcs, dt: Float) -> Result<Float, IpcsError> {
        let output = ipcs.step(&self.input(dt))?;
        self.velocity = output.velocity;
        self.pressure = Some(output.pressure);
        Ok(output.divergence_norm)
    }
}

fn on_radial_wall(x: Vector2) -> bool {
    (x[0] - INNER_RADIUS).abs() < 1e-12 || (x[0] - OUTER_RADIUS).abs() < 1e-12
}

fn on_lid(x: Vector2) -> bool {
    x[1].abs() < 1e-12 || (x[1] - HEIGHT).abs() < 1e-12
}

fn no_slip(space: &Arc<FunctionSpace>) -> Result<Vec<DirichletBc>, IpcsError> {
    (0..space.num_components())
        .map(|c| DirichletBc::homogeneous(space, c, |_| true))
        .collect()
}

/// Zero normal velocity on every wall.
fn free_slip(space: &Arc<FunctionSpace>) -> Result<Vec<DirichletBc>, IpcsError> {
    Ok(vec![
        DirichletBc::homogeneous(space, 0, on_radial_wall)?,
        DirichletBc::homogeneous(space, 1, on_lid)?,
    ])
}

/// Fluid at rest with no-slip walls and no forcing.
pub fn quiescent_channel(num_cells: [usize; 2]) -> Result<Channel, IpcsError> {
    let mut channel = Channel::new(num_cells, 2, Coefficients::new(1., 1e-2)?)?;
    channel.velocity_bcs = no_slip(&channel.velocity_space)?;
    Ok(channel)
}

/// Fluid at rest under gravity, already in hydrostatic balance, with the
/// pressure pinned at the top.
pub fn hydrostatic_column(num_cells: [usize; 2], gravity: Float) -> Result<Channel, IpcsError> {
    let coefficients = Coefficients::new(1e3, 1e-3)?;
    let mut channel = Channel::new(num_cells, 2, coefficients)?;
    let weight = coefficients.density() * gravity;
    channel.forcing =
        Field::interpolate(&channel.velocity_space, |_| Vector3::new(0., -weight, 0.));
    channel.pressure = Some(Field::interpolate_scalar(&channel.pressure_space, |x| {
        weight * (HEIGHT - x[1])
    }));
    channel.velocity_bcs = no_slip(&channel.velocity_space)?;
    channel.pressure_bcs = vec![DirichletBc::homogeneous(&channel.pressure_space, 0, |x| {
        (x[1] - HEIGHT).abs() < 1e-12
    })?];
    Ok(channel)
}

/// A divergent radial stirring under gravity, with free-slip walls and no
/// initial pressure.
pub fn free_slip_column(num_cells: [usize; 2], gravity: Float) -> Result<Channel, IpcsError> {
    let coefficients = Coefficients::new(1., 1e-2)?;
    let mut channel = Channel::new(num_cells, 2, coefficients)?;
    channel.velocity = Field::interpolate(&channel.velocity_space, |x| {
        let radial = (x[0] - INNER_RADIUS) * (OUTER_RADIUS - x[0]) * (1. + x[1]);
        Vector3::new(radial, 0., 0.)
    });
    let weight = coefficients.density() * gravity;
    channel.forcing =
        Field::interpolate(&channel.velocity_space, |_| Vector3::new(0., -weight, 0.));
    channel.velocity_bcs = free_slip(&channel.velocity_space)?;
    Ok(channel)
}

/// Rigid rotation with angular velocity `omega` between no-slip walls that
/// rotate along, starting without pressure.
pub fn swirl_channel(num_cells: [usize; 2], omega: Float) -> Result<Channel, IpcsError> {
    let mut channel = Channel::new(num_cells, 3, Coefficients::new(1., 1e-2)?)?;
    let rotation = move |x: Vector2| Vector3::new(0., 0., omega * x[0]);
    channel.velocity = Field::interpolate(&channel.velocity_space, rotation);
    let space = &channel.velocity_space;
    channel.velocity_bcs = vec![
        DirichletBc::homogeneous(space, 0, |_| true)?,
        DirichletBc::homogeneous(space, 1, |_| true)?,
        DirichletBc::new(space, 2, |x| rotation(x)[2], |_| true)?,
    ];
    Ok(channel)
}
