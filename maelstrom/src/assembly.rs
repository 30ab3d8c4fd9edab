//! Cell-wise assembly of integrands into global vectors, sparse matrices and
//! scalars.
//!
//! Integrands are written pointwise. A [`Flux`] holds the parts multiplying a
//! vector test function $v$ and its gradient, so the assembled form is
//!
//! $$ \int \sum_c \Big( s_c v_c + \sum_d F_{cd} \, \partial_d v_c \Big) \, dx. $$

use std::ops;

use rayon::prelude::*;

use crate::{
    fields::VectorJet,
    geom,
    quadrature::{FacetRule, TriangleRule},
    space::FunctionSpace,
    Array1, CsMat, Float, Matrix3x2, Vector2, Vector3,
};

#[derive(Clone, Copy, Debug)]
pub struct QuadraturePoint<'a> {
    pub cell: usize,
    /// Physical $(r, z)$.
    pub coordinates: Vector2,
    /// Quadrature weight times the cell's area scaling (no $2 \pi r$ factor).
    pub weight: Float,
    pub barycentric: [Float; 3],
    pub lambda_gradients: &'a [Vector2; 3],
}

impl QuadraturePoint<'_> {
    pub fn r(&self) -> Float {
        self.coordinates[0]
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FacetPoint<'a> {
    pub point: QuadraturePoint<'a>,
    pub outward_normal: Vector2,
}

/// Pointwise integrand against a vector test function.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Flux {
    pub source: Vector3,
    pub flux: Matrix3x2,
}

impl Default for Flux {
    fn default() -> Self {
        Self {
            source: Vector3::zeros(),
            flux: Matrix3x2::zeros(),
        }
    }
}

impl ops::Add for Flux {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            source: self.source + rhs.source,
            flux: self.flux + rhs.flux,
        }
    }
}

impl ops::AddAssign for Flux {
    fn add_assign(&mut self, rhs: Self) {
        self.source += rhs.source;
        self.flux += rhs.flux;
    }
}

impl ops::Mul<Float> for Flux {
    type Output = Self;

    fn mul(self, rhs: Float) -> Self {
        Self {
            source: self.source * rhs,
            flux: self.flux * rhs,
        }
    }
}

pub fn cell_points<'a>(
    mesh: &'a geom::Mesh,
    cell: usize,
    rule: &'a TriangleRule,
) -> impl Iterator<Item = QuadraturePoint<'a>> + 'a {
    let geometry = mesh.cell_geometry(cell);
    rule.barycentric
        .iter()
        .zip(&rule.weights)
        .map(move |(barycentric, &weight)| QuadraturePoint {
            cell,
            coordinates: mesh.to_physical(cell, barycentric),
            weight: weight * 2. * geometry.area,
            barycentric: *barycentric,
            lambda_gradients: &geometry.lambda_gradients,
        })
}

/// Visits every volume quadrature point of a rule exact to `degree`.
pub fn for_each_point<F: FnMut(&QuadraturePoint)>(mesh: &geom::Mesh, degree: usize, mut f: F) {
    let rule = TriangleRule::new(degree);
    for cell in 0..mesh.num_cells() {
        cell_points(mesh, cell, &rule).for_each(|point| f(&point));
    }
}

fn cell_dofs(space: &FunctionSpace, cell: usize) -> Vec<usize> {
    space
        .cell_nodes(cell)
        .iter()
        .flat_map(|&node| (0..space.num_components()).map(move |c| space.dof(node, c)))
        .collect()
}

/// Contribution of a flux tested against every basis function of a cell, in
/// [`cell_dofs`] order.
fn test_against_basis(
    flux: &Flux,
    basis: &[crate::space::BasisJet],
    num_components: usize,
    weight: Float,
    local: &mut [Float],
) {
    for (a, phi) in basis.iter().enumerate() {
        for c in 0..num_components {
            local[a * num_components + c] += weight
                * (flux.source[c] * phi.value
                    + flux.flux[(c, 0)] * phi.gradient[0]
                    + flux.flux[(c, 1)] * phi.gradient[1]);
        }
    }
}

/// Assembles $\int (s \cdot v + F : \nabla v) \, dx$ over all test functions
/// `v` of `space`.
pub fn assemble_vector<F>(space: &FunctionSpace, degree: usize, integrand: F) -> Array1
where
    F: Fn(&QuadraturePoint) -> Flux + Sync,
{
    let mesh = space.mesh();
    let rule = TriangleRule::new(degree);
    let num_components = space.num_components();
    let contributions: Vec<_> = (0..mesh.num_cells())
        .into_par_iter()
        .map(|cell| {
            let dofs = cell_dofs(space, cell);
            let mut local = vec![0.; dofs.len()];
            for point in cell_points(mesh, cell, &rule) {
                let basis = space.basis(&point.barycentric, point.lambda_gradients);
                test_against_basis(
                    &integrand(&point),
                    &basis,
                    num_components,
                    point.weight,
                    &mut local,
                );
            }
            (dofs, local)
        })
        .collect();

    let mut vector = Array1::zeros(space.num_dofs());
    for (dofs, local) in contributions {
        for (dof, value) in dofs.into_iter().zip(local) {
            vector[dof] += value;
        }
    }
    vector
}

/// Assembles the bilinear form obtained by linearizing an integrand.
///
/// `linearize` is called once per quadrature point and returns the integrand
/// as a function of a trial function's jet, which must be linear in it.
/// Every local test/trial pair enters the sparsity pattern, including zero
/// entries.
pub fn assemble_matrix<G, L>(
    test_space: &FunctionSpace,
    trial_space: &FunctionSpace,
    degree: usize,
    linearize: G,
) -> CsMat
where
    G: Fn(&QuadraturePoint) -> L + Sync,
    L: Fn(&VectorJet) -> Flux,
{
    debug_assert!(test_space.shares_mesh_with(trial_space));
    let mesh = test_space.mesh();
    let rule = TriangleRule::new(degree);
    let test_components = test_space.num_components();
    let trial_components = trial_space.num_components();

    let contributions: Vec<_> = (0..mesh.num_cells())
        .into_par_iter()
        .map(|cell| {
            let test_dofs = cell_dofs(test_space, cell);
            let trial_dofs = cell_dofs(trial_space, cell);
            let mut local = vec![vec![0.; test_dofs.len()]; trial_dofs.len()];
            for point in cell_points(mesh, cell, &rule) {
                let integrand = linearize(&point);
                let test_basis = test_space.basis(&point.barycentric, point.lambda_gradients);
                let trial_basis = trial_space.basis(&point.barycentric, point.lambda_gradients);
                for (a, psi) in trial_basis.iter().enumerate() {
                    for c in 0..trial_components {
                        let mut trial = VectorJet::default();
                        trial.value[c] = psi.value;
                        trial.gradient[(c, 0)] = psi.gradient[0];
                        trial.gradient[(c, 1)] = psi.gradient[1];
                        trial.hessians[c] = psi.hessian;
                        test_against_basis(
                            &integrand(&trial),
                            &test_basis,
                            test_components,
                            point.weight,
                            &mut local[a * trial_components + c],
                        );
                    }
                }
            }
            (test_dofs, trial_dofs, local)
        })
        .collect();

    let mut triplets = sprs::TriMat::new((test_space.num_dofs(), trial_space.num_dofs()));
    for (test_dofs, trial_dofs, local) in contributions {
        for (&col, column) in trial_dofs.iter().zip(&local) {
            for (&row, &value) in test_dofs.iter().zip(column) {
                triplets.add_triplet(row, col, value);
            }
        }
    }
    triplets.to_csr()
}

/// Integrates a pointwise scalar over the mesh.
pub fn assemble_scalar<F>(mesh: &geom::Mesh, degree: usize, integrand: F) -> Float
where
    F: Fn(&QuadraturePoint) -> Float + Sync,
{
    let rule = TriangleRule::new(degree);
    (0..mesh.num_cells())
        .into_par_iter()
        .map(|cell| {
            cell_points(mesh, cell, &rule)
                .map(|point| point.weight * integrand(&point))
                .sum::<Float>()
        })
        .sum()
}

/// Integrates a pointwise scalar over the boundary.
pub fn assemble_boundary_scalar<F>(mesh: &geom::Mesh, degree: usize, integrand: F) -> Float
where
    F: Fn(&FacetPoint) -> Float,
{
    let rule = FacetRule::new(degree);
    let mut total = 0.;
    for facet in mesh.boundary_facets() {
        let geometry = mesh.cell_geometry(facet.cell);
        for (&t, &weight) in rule.nodes.iter().zip(&rule.weights) {
            let mut barycentric = [0.; 3];
            barycentric[facet.local_edge] = 1. - t;
            barycentric[(facet.local_edge + 1) % 3] = t;
            let point = FacetPoint {
                point: QuadraturePoint {
                    cell: facet.cell,
                    coordinates: mesh.to_physical(facet.cell, &barycentric),
                    weight: weight * facet.length,
                    barycentric,
                    lambda_gradients: &geometry.lambda_gradients,
                },
                outward_normal: facet.outward_normal,
            };
            total += point.point.weight * integrand(&point);
        }
    }
    total
}
