//! Dirichlet boundary conditions on boundary nodes of a [`FunctionSpace`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ndarray as nd;

use crate::{space::FunctionSpace, Array1, CsMat, Float, IpcsError, Vector2};

/// Prescribed values for one component on the boundary nodes selected by a
/// predicate.
#[derive(Clone, Debug)]
pub struct DirichletBc {
    space: Arc<FunctionSpace>,
    dofs: Vec<usize>,
    values: Vec<Float>,
}

impl DirichletBc {
    pub fn new<G, P>(
        space: &Arc<FunctionSpace>,
        component: usize,
        value: G,
        on_boundary: P,
    ) -> Result<Self, IpcsError>
    where
        G: Fn(Vector2) -> Float,
        P: Fn(Vector2) -> bool,
    {
        if component >= space.num_components() {
            return Err(IpcsError::UnsupportedSpace(format!(
                "boundary condition on component {component} of a {}-component space",
                space.num_components()
            )));
        }
        let (dofs, values) = space
            .boundary_nodes()
            .iter()
            .map(|&node| (node, space.node_coordinates()[node]))
            .filter(|&(_, x)| on_boundary(x))
            .map(|(node, x)| (space.dof(node, component), value(x)))
            .unzip();
        Ok(Self {
            space: space.clone(),
            dofs,
            values,
        })
    }

    pub fn homogeneous<P: Fn(Vector2) -> bool>(
        space: &Arc<FunctionSpace>,
        component: usize,
        on_boundary: P,
    ) -> Result<Self, IpcsError> {
        Self::new(space, component, |_| 0., on_boundary)
    }

    pub fn space(&self) -> &Arc<FunctionSpace> {
        &self.space
    }

    pub fn dofs(&self) -> &[usize] {
        &self.dofs
    }

    fn constrained(&self) -> impl Iterator<Item = (usize, Float)> + '_ {
        self.dofs.iter().copied().zip(self.values.iter().copied())
    }

    /// Sets constrained entries to their prescribed values.
    pub fn apply_to_vector(&self, vector: &mut Array1) {
        for (dof, value) in self.constrained() {
            vector[dof] = value;
        }
    }

    /// Sets constrained residual entries to `x_i - g_i`, the residual
    /// matching a unit Jacobian row.
    pub fn apply_to_residual(&self, residual: &mut Array1, x: nd::ArrayView1<Float>) {
        for (dof, value) in self.constrained() {
            residual[dof] = x[dof] - value;
        }
    }

    /// Replaces constrained rows with unit rows.
    pub fn apply_to_matrix(&self, matrix: CsMat) -> CsMat {
        let rows: HashSet<usize> = self.dofs.iter().copied().collect();
        map_entries(matrix, |row, col, value| {
            if rows.contains(&row) {
                if row == col {
                    1.
                } else {
                    0.
                }
            } else {
                value
            }
        })
    }
}

/// Applies boundary conditions to a linear system while keeping it
/// symmetric: prescribed values are lifted into the right-hand side, then the
/// constrained rows and columns are replaced by the identity.
pub fn assemble_system(matrix: CsMat, mut rhs: Array1, bcs: &[DirichletBc]) -> (CsMat, Array1) {
    let prescribed: HashMap<usize, Float> = bcs.iter().flat_map(|bc| bc.constrained()).collect();
    if prescribed.is_empty() {
        return (matrix, rhs);
    }

    let mut lifting = Array1::zeros(rhs.len());
    for (&dof, &value) in &prescribed {
        lifting[dof] = value;
    }
    rhs -= &(&matrix * &lifting);
    for (&dof, &value) in &prescribed {
        rhs[dof] = value;
    }

    let matrix = map_entries(matrix, |row, col, value| {
        match (prescribed.contains_key(&row), prescribed.contains_key(&col)) {
            (false, false) => value,
            _ if row == col => 1.,
            _ => 0.,
        }
    });
    (matrix, rhs)
}

/// Rewrites every stored entry of a CSR matrix in place of its structure.
fn map_entries<F: Fn(usize, usize, Float) -> Float>(matrix: CsMat, f: F) -> CsMat {
    let matrix = if matrix.is_csr() {
        matrix
    } else {
        matrix.to_csr()
    };
    let shape = matrix.shape();
    let (indptr, indices, mut data) = matrix.into_raw_storage();
    for row in 0..shape.0 {
        for k in indptr[row]..indptr[row + 1] {
            data[k] = f(row, indices[k], data[k]);
        }
    }
    CsMat::new(shape, indptr, indices, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{geom, test_util::assert_all_close};

    fn space() -> Arc<FunctionSpace> {
        let axis = geom::Axis::new(0., 1., 2).unwrap();
        let mesh = Arc::new(geom::Mesh::rectangle(&axis, &axis).unwrap());
        Arc::new(FunctionSpace::new(mesh, 1, 2).unwrap())
    }

    fn laplacian_like(n: usize) -> CsMat {
        let mut triplets = sprs::TriMat::new((n, n));
        for i in 0..n {
            triplets.add_triplet(i, i, 2.);
            if i + 1 < n {
                triplets.add_triplet(i, i + 1, -1.);
                triplets.add_triplet(i + 1, i, -1.);
            }
        }
        triplets.to_csr()
    }

    #[test]
    fn test_selection() {
        let space = space();
        let bottom = DirichletBc::new(&space, 1, |x| x[0], |x| x[1] < 1e-12).unwrap();
        assert_eq!(bottom.dofs(), &[1, 3, 5]);
        assert!(DirichletBc::homogeneous(&space, 2, |_| true).is_err());
    }

    #[test]
    fn test_residual_and_matrix_rows() {
        let space = space();
        let bc = DirichletBc::new(&space, 0, |_| 3., |x| x[0] < 1e-12).unwrap();
        let n = space.num_dofs();
        let x = Array1::from_iter((0..n).map(|i| i as Float));
        let mut residual = Array1::ones(n);
        bc.apply_to_residual(&mut residual, x.view());
        for &dof in bc.dofs() {
            assert_eq!(residual[dof], x[dof] - 3.);
        }

        let matrix = bc.apply_to_matrix(laplacian_like(n));
        for &dof in bc.dofs() {
            let row: Vec<_> = matrix
                .outer_view(dof)
                .unwrap()
                .iter()
                .map(|(j, &v)| (j, v))
                .collect();
            for (col, value) in row {
                assert_eq!(value, if col == dof { 1. } else { 0. });
            }
        }
    }

    #[test]
    fn test_symmetric_application() {
        let space = space();
        let n = space.num_dofs();
        let bc = DirichletBc::new(&space, 0, |x| 1. + x[1], |x| x[0] > 1. - 1e-12).unwrap();
        let matrix = laplacian_like(n);
        let rhs = Array1::from_elem(n, 0.5);
        let (constrained, lifted) = assemble_system(matrix.clone(), rhs.clone(), &[bc.clone()]);

        let dense = constrained.to_dense();
        assert_all_close(&dense, &dense.t().to_owned()).abs_tol(Some(0.));

        // Away from the boundary the lifted system leaves the residual of any
        // vector carrying the boundary values unchanged.
        let mut x = Array1::zeros(n);
        bc.apply_to_vector(&mut x);
        let residual = &lifted - &(&constrained * &x);
        let residual_full = &rhs - &(&matrix * &x);
        for i in (0..n).filter(|i| !bc.dofs().contains(i)) {
            approx::assert_relative_eq!(residual[i], residual_full[i], epsilon = 1e-14);
        }
        for &dof in bc.dofs() {
            approx::assert_relative_eq!(residual[dof], 0., epsilon = 1e-14);
        }
    }
}
