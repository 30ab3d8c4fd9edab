use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use ndarray as nd;

use crate::{geom, IpcsError, Matrix2, Vector2};

/// Value, gradient and Hessian of one scalar basis function at a point.
#[derive(Clone, Copy, Debug)]
pub struct BasisJet {
    pub value: crate::Float,
    pub gradient: Vector2,
    pub hessian: Matrix2,
}

/// Continuous Lagrange space of degree 1 or 2 on a triangle mesh, with
/// `num_components` copies of the scalar space.
///
/// Degrees of freedom are interleaved: the DOF of component `c` at node `n`
/// is `n * num_components + c`.
#[derive(Debug)]
pub struct FunctionSpace {
    mesh: Arc<geom::Mesh>,
    degree: usize,
    num_components: usize,
    node_coordinates: Vec<Vector2>,
    /// Shape `[num_cells, nodes_per_cell]`. Vertex nodes come first, followed
    /// (for degree 2) by the midpoints of local edges 01, 12 and 20.
    cell_nodes: nd::Array2<usize>,
    boundary_nodes: Vec<usize>,
}

impl FunctionSpace {
    pub fn new(
        mesh: Arc<geom::Mesh>,
        degree: usize,
        num_components: usize,
    ) -> Result<Self, IpcsError> {
        if !(1..=2).contains(&degree) {
            return Err(IpcsError::UnsupportedSpace(format!(
                "Lagrange degree {degree} (only 1 and 2 are available)"
            )));
        }
        if !(1..=3).contains(&num_components) {
            return Err(IpcsError::UnsupportedSpace(format!(
                "{num_components} components (1 to 3 are available)"
            )));
        }

        let mut node_coordinates = mesh.vertices().to_vec();
        let nodes_per_cell = if degree == 1 { 3 } else { 6 };
        let mut cell_nodes = nd::Array2::zeros((mesh.num_cells(), nodes_per_cell));
        let mut edge_nodes = HashMap::new();
        for (cell, vertices) in mesh.cells().iter().enumerate() {
            for (local, &vertex) in vertices.iter().enumerate() {
                cell_nodes[[cell, local]] = vertex;
            }
            if degree == 2 {
                for local_edge in 0..3 {
                    let (a, b) = (vertices[local_edge], vertices[(local_edge + 1) % 3]);
                    let node = *edge_nodes.entry((a.min(b), a.max(b))).or_insert_with(|| {
                        node_coordinates.push((mesh.vertices()[a] + mesh.vertices()[b]) / 2.);
                        node_coordinates.len() - 1
                    });
                    cell_nodes[[cell, 3 + local_edge]] = node;
                }
            }
        }

        let boundary_nodes: BTreeSet<usize> = mesh
            .boundary_facets()
            .iter()
            .flat_map(|facet| {
                let mut nodes = facet.vertices.to_vec();
                if degree == 2 {
                    nodes.push(cell_nodes[[facet.cell, 3 + facet.local_edge]]);
                }
                nodes
            })
            .collect();

        Ok(Self {
            mesh,
            degree,
            num_components,
            node_coordinates,
            cell_nodes,
            boundary_nodes: boundary_nodes.into_iter().collect(),
        })
    }

    pub fn mesh(&self) -> &Arc<geom::Mesh> {
        &self.mesh
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn num_components(&self) -> usize {
        self.num_components
    }

    pub fn num_nodes(&self) -> usize {
        self.node_coordinates.len()
    }

    pub fn num_dofs(&self) -> usize {
        self.num_nodes() * self.num_components
    }

    pub fn node_coordinates(&self) -> &[Vector2] {
        &self.node_coordinates
    }

    pub fn boundary_nodes(&self) -> &[usize] {
        &self.boundary_nodes
    }

    pub fn cell_nodes(&self, cell: usize) -> nd::ArrayView1<'_, usize> {
        self.cell_nodes.row(cell)
    }

    pub fn dof(&self, node: usize, component: usize) -> usize {
        node * self.num_components + component
    }

    /// Whether both spaces discretize the same mesh instance.
    pub fn shares_mesh_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.mesh, &other.mesh)
    }

    /// Scalar basis functions of one cell, in local node order.
    pub fn basis(
        &self,
        barycentric: &[crate::Float; 3],
        lambda_gradients: &[Vector2; 3],
    ) -> Vec<BasisJet> {
        let (lambda, grad) = (barycentric, lambda_gradients);
        let vertex = |i: usize| match self.degree {
            1 => BasisJet {
                value: lambda[i],
                gradient: grad[i],
                hessian: Matrix2::zeros(),
            },
            _ => BasisJet {
                value: lambda[i] * (2. * lambda[i] - 1.),
                gradient: grad[i] * (4. * lambda[i] - 1.),
                hessian: grad[i] * grad[i].transpose() * 4.,
            },
        };
        let edge = |k: usize| {
            let (a, b) = (k, (k + 1) % 3);
            let outer = grad[a] * grad[b].transpose();
            BasisJet {
                value: 4. * lambda[a] * lambda[b],
                gradient: (grad[a] * lambda[b] + grad[b] * lambda[a]) * 4.,
                hessian: (outer + outer.transpose()) * 4.,
            }
        };
        let mut jets: Vec<_> = (0..3).map(vertex).collect();
        if self.degree == 2 {
            jets.extend((0..3).map(edge));
        }
        jets
    }
}
