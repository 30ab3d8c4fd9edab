use crate::{assembly::QuadraturePoint, fields::Field, Float, IpcsError};

/// Stabilization added to the momentum residual.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, strum::EnumString, strum::Display, strum::EnumIter,
)]
pub enum Stabilization {
    #[default]
    #[strum(serialize = "none")]
    None,
    /// Streamline-upwind Petrov-Galerkin.
    #[strum(serialize = "SUPG")]
    StreamlineUpwind,
}

impl Stabilization {
    pub fn from_name(name: &str) -> Result<Self, IpcsError> {
        name.parse()
            .map_err(|_| IpcsError::UnknownStabilization(name.to_owned()))
    }
}

/// Per-cell stabilization weight $\tau$.
pub trait StabilizationParameter: Send + Sync {
    /// One value per cell of the velocity's mesh.
    fn compute(&self, velocity: &Field, kinematic_viscosity: Float) -> Vec<Float>;
}

/// The classical SUPG weight
/// $\tau = \frac{h}{2 |u| k} \left(\coth \mathrm{Pe} - \frac{1}{\mathrm{Pe}}\right)$
/// with element Péclet number $\mathrm{Pe} = \frac{|u| h}{2 \nu k}$, where
/// $h$ is the cell diameter, $k$ the polynomial degree and $|u|$ the in-plane
/// speed at the centroid.
#[derive(Clone, Copy, Debug, Default)]
pub struct Supg;

impl Supg {
    pub fn tau(speed: Float, diameter: Float, kinematic_viscosity: Float, degree: usize) -> Float {
        let k = degree as Float;
        let peclet = speed * diameter / (2. * kinematic_viscosity * k);
        if peclet < 1e-3 {
            // coth(Pe) - 1/Pe = Pe/3 - Pe^3/45 + ...
            diameter * diameter / (12. * kinematic_viscosity * k * k) * (1. - peclet * peclet / 15.)
        } else {
            diameter / (2. * speed * k) * (1. / peclet.tanh() - 1. / peclet)
        }
    }
}

impl StabilizationParameter for Supg {
    fn compute(&self, velocity: &Field, kinematic_viscosity: Float) -> Vec<Float> {
        let space = velocity.space();
        let mesh = space.mesh();
        (0..mesh.num_cells())
            .map(|cell| {
                let geometry = mesh.cell_geometry(cell);
                let centroid = QuadraturePoint {
                    cell,
                    coordinates: geometry.centroid,
                    weight: geometry.area,
                    barycentric: [1. / 3.; 3],
                    lambda_gradients: &geometry.lambda_gradients,
                };
                let speed = velocity.evaluate(&centroid).in_plane().norm();
                Self::tau(speed, geometry.diameter, kinematic_viscosity, space.degree())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use strum::IntoEnumIterator;

    #[test]
    fn test_names() {
        for stabilization in Stabilization::iter() {
            let name = stabilization.to_string();
            assert_eq!(Stabilization::from_name(&name).unwrap(), stabilization);
        }
        assert_eq!(
            Stabilization::from_name("SUPG").unwrap(),
            Stabilization::StreamlineUpwind
        );
        assert!(matches!(
            Stabilization::from_name("GLS"),
            Err(IpcsError::UnknownStabilization(name)) if name == "GLS"
        ));
    }

    #[test]
    fn test_tau_limits() {
        let (h, nu) = (0.1, 1e-3);
        // Diffusive limit.
        assert_relative_eq!(Supg::tau(0., h, nu, 1), h * h / (12. * nu), max_relative = 1e-12);
        // Continuous across the series switch.
        let switch_speed = 1e-3 * 2. * nu * 2. / h;
        let just_below = Supg::tau(switch_speed * 0.99, h, nu, 2);
        let just_above = Supg::tau(switch_speed * 1.01, h, nu, 2);
        assert_relative_eq!(just_below, just_above, max_relative = 1e-3);
        // Advective limit: tau -> h / (2 |u| k).
        let fast = 1e4;
        assert_relative_eq!(Supg::tau(fast, h, nu, 1), h / (2. * fast), max_relative = 1e-3);
    }
}
