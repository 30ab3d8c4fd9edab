use std::sync::Arc;

use crate::{
    assembly::QuadraturePoint, space::FunctionSpace, Array1, Float, IpcsError, Matrix2,
    Matrix3x2, Vector2, Vector3,
};

/// Value, gradient and per-component Hessians of a (up to) three component
/// field at a point. Components a space does not carry are zero.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VectorJet {
    pub value: Vector3,
    pub gradient: Matrix3x2,
    pub hessians: [Matrix2; 3],
}

impl Default for VectorJet {
    fn default() -> Self {
        Self {
            value: Vector3::zeros(),
            gradient: Matrix3x2::zeros(),
            hessians: [Matrix2::zeros(); 3],
        }
    }
}

impl VectorJet {
    /// The in-plane (advecting) part $(u_r, u_z)$.
    pub fn in_plane(&self) -> Vector2 {
        Vector2::new(self.value[0], self.value[1])
    }

    /// Gradient of component `c`.
    pub fn component_gradient(&self, c: usize) -> Vector2 {
        self.gradient.row(c).transpose()
    }

    /// Laplacian of component `c` in the $(r, z)$ plane.
    pub fn planar_laplacian(&self, c: usize) -> Float {
        self.hessians[c].trace()
    }

    /// Axisymmetric divergence $u_r / r + \partial_r u_r + \partial_z u_z$.
    pub fn divergence(&self, r: Float) -> Float {
        self.value[0] / r + self.gradient[(0, 0)] + self.gradient[(1, 1)]
    }

    /// Gradient of [`Self::divergence`].
    pub fn divergence_gradient(&self, r: Float) -> Vector2 {
        let (h_r, h_z) = (&self.hessians[0], &self.hessians[1]);
        Vector2::new(
            self.gradient[(0, 0)] / r - self.value[0] / (r * r) + h_r[(0, 0)] + h_z[(0, 1)],
            self.gradient[(0, 1)] / r + h_r[(0, 1)] + h_z[(1, 1)],
        )
    }
}

/// A discrete field: DOF values over a [`FunctionSpace`].
#[derive(Clone, Debug)]
pub struct Field {
    space: Arc<FunctionSpace>,
    dofs: Array1,
}

impl Field {
    pub fn zeros(space: &Arc<FunctionSpace>) -> Self {
        Self {
            space: space.clone(),
            dofs: Array1::zeros(space.num_dofs()),
        }
    }

    pub fn from_dofs(space: &Arc<FunctionSpace>, dofs: Array1) -> Result<Self, IpcsError> {
        if dofs.len() != space.num_dofs() {
            return Err(IpcsError::IncompatibleSpaces(format!(
                "{} DOF values for a space with {} DOFs",
                dofs.len(),
                space.num_dofs()
            )));
        }
        Ok(Self {
            space: space.clone(),
            dofs,
        })
    }

    /// Nodal interpolation; component `c` takes `f(x)[c]`.
    pub fn interpolate<F: Fn(Vector2) -> Vector3>(space: &Arc<FunctionSpace>, f: F) -> Self {
        let num_components = space.num_components();
        let mut dofs = Array1::zeros(space.num_dofs());
        for (node, &point) in space.node_coordinates().iter().enumerate() {
            let value = f(point);
            for c in 0..num_components {
                dofs[space.dof(node, c)] = value[c];
            }
        }
        Self {
            space: space.clone(),
            dofs,
        }
    }

    pub fn interpolate_scalar<F: Fn(Vector2) -> Float>(space: &Arc<FunctionSpace>, f: F) -> Self {
        Self::interpolate(space, |x| Vector3::new(f(x), 0., 0.))
    }

    pub fn space(&self) -> &Arc<FunctionSpace> {
        &self.space
    }

    pub fn dofs(&self) -> &Array1 {
        &self.dofs
    }

    pub fn dofs_mut(&mut self) -> &mut Array1 {
        &mut self.dofs
    }

    pub fn into_dofs(self) -> Array1 {
        self.dofs
    }

    /// Nodal values of component `c`.
    pub fn component(&self, c: usize) -> Array1 {
        self.dofs
            .iter()
            .skip(c)
            .step_by(self.space.num_components())
            .copied()
            .collect()
    }

    pub fn ensure_same_mesh(&self, other: &FunctionSpace, what: &str) -> Result<(), IpcsError> {
        if self.space.shares_mesh_with(other) {
            Ok(())
        } else {
            Err(IpcsError::IncompatibleSpaces(format!(
                "{what} lives on a different mesh"
            )))
        }
    }

    /// Evaluates the field at a quadrature point of a cell of its mesh.
    pub fn evaluate(&self, point: &QuadraturePoint) -> VectorJet {
        let basis = self.space.basis(&point.barycentric, point.lambda_gradients);
        let num_components = self.space.num_components();
        let mut jet = VectorJet::default();
        for (basis, &node) in basis.iter().zip(self.space.cell_nodes(point.cell)) {
            for c in 0..num_components {
                let coef = self.dofs[self.space.dof(node, c)];
                jet.value[c] += coef * basis.value;
                jet.gradient[(c, 0)] += coef * basis.gradient[0];
                jet.gradient[(c, 1)] += coef * basis.gradient[1];
                jet.hessians[c] += basis.hessian * coef;
            }
        }
        jet
    }
}
