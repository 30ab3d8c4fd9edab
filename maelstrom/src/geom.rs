use std::collections::HashMap;

use itertools::iproduct;
use ndarray as nd;

use crate::{Float, Vector2};

pub type CoordArray = nd::Array1<Float>;

#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("an axis needs min < max and at least one cell, got [{min}, {max}] with {num_cells} cells")]
    InvalidAxis {
        min: Float,
        max: Float,
        num_cells: usize,
    },
    #[error("cell {cell} references vertex {vertex}, but the mesh only has {num_vertices} vertices")]
    VertexOutOfRange {
        cell: usize,
        vertex: usize,
        num_vertices: usize,
    },
    #[error("cell {cell} is degenerate or clockwise (signed area {area:e})")]
    DegenerateCell { cell: usize, area: Float },
    #[error("vertex {vertex} lies at negative radius r = {r}")]
    NegativeRadius { vertex: usize, r: Float },
}

/// A fixed $r$ or $z$ axis
#[derive(Clone, Debug)]
pub struct Axis {
    vertices: CoordArray,
}
impl Axis {
    pub fn new(min: Float, max: Float, num_cells: usize) -> Result<Self, MeshError> {
        if num_cells == 0 || min.partial_cmp(&max) != Some(std::cmp::Ordering::Less) {
            return Err(MeshError::InvalidAxis {
                min,
                max,
                num_cells,
            });
        }
        Ok(Self {
            vertices: CoordArray::linspace(min, max, num_cells + 1),
        })
    }

    pub fn vertices(&self) -> &CoordArray {
        &self.vertices
    }
}

/// Which half of a rectangle a triangle of [`Mesh::rectangle`] covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Triangle {
    UpperLeft,
    LowerRight,
}

/// Geometric quantities of one affine triangle, constant over the cell.
#[derive(Clone, Debug)]
pub struct CellGeometry {
    pub area: Float,
    /// Longest edge.
    pub diameter: Float,
    pub centroid: Vector2,
    /// Physical gradients of the barycentric coordinates.
    pub lambda_gradients: [Vector2; 3],
}

/// A facet with exactly one adjacent cell.
#[derive(Clone, Debug)]
pub struct BoundaryFacet {
    pub cell: usize,
    /// Local edge `k` joins local vertices `k` and `(k + 1) % 3`.
    pub local_edge: usize,
    pub vertices: [usize; 2],
    pub outward_normal: Vector2,
    pub length: Float,
}

/// Triangulation of a meridional half-plane section, coordinates ordered
/// $(r, z)$.
#[derive(Clone, Debug)]
pub struct Mesh {
    vertices: Vec<Vector2>,
    cells: Vec<[usize; 3]>,
    geometry: Vec<CellGeometry>,
    boundary_facets: Vec<BoundaryFacet>,
}

impl Mesh {
    /// Builds a mesh from counter-clockwise triangles.
    pub fn new(vertices: Vec<Vector2>, cells: Vec<[usize; 3]>) -> Result<Self, MeshError> {
        if let Some((vertex, point)) = vertices.iter().enumerate().find(|(_, p)| p[0] < 0.) {
            return Err(MeshError::NegativeRadius {
                vertex,
                r: point[0],
            });
        }
        let geometry = cells
            .iter()
            .enumerate()
            .map(|(cell, indices)| {
                if let Some(&vertex) = indices.iter().find(|&&v| v >= vertices.len()) {
                    return Err(MeshError::VertexOutOfRange {
                        cell,
                        vertex,
                        num_vertices: vertices.len(),
                    });
                }
                let points = indices.map(|v| vertices[v]);
                let geometry = compute_cell_geometry(&points);
                if geometry.area <= 0. {
                    return Err(MeshError::DegenerateCell {
                        cell,
                        area: geometry.area,
                    });
                }
                Ok(geometry)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let boundary_facets = find_boundary_facets(&vertices, &cells);
        Ok(Self {
            vertices,
            cells,
            geometry,
            boundary_facets,
        })
    }

    /// Structured mesh of the rectangle spanned by two axes, each rectangle
    /// split along its lower-left to upper-right diagonal.
    pub fn rectangle(r_axis: &Axis, z_axis: &Axis) -> Result<Self, MeshError> {
        let num_r = r_axis.vertices().len();
        let vertices = z_axis
            .vertices()
            .iter()
            .flat_map(|&z| r_axis.vertices().iter().map(move |&r| Vector2::new(r, z)))
            .collect();
        let vertex_index = |i: usize, j: usize| j * num_r + i;
        let cells = iproduct!(
            0..z_axis.vertices().len() - 1,
            0..num_r - 1,
            [Triangle::LowerRight, Triangle::UpperLeft]
        )
        .map(|(j, i, triangle)| match triangle {
            Triangle::LowerRight => [
                vertex_index(i, j),
                vertex_index(i + 1, j),
                vertex_index(i + 1, j + 1),
            ],
            Triangle::UpperLeft => [
                vertex_index(i, j),
                vertex_index(i + 1, j + 1),
                vertex_index(i, j + 1),
            ],
        })
        .collect();
        Self::new(vertices, cells)
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn vertices(&self) -> &[Vector2] {
        &self.vertices
    }

    pub fn cells(&self) -> &[[usize; 3]] {
        &self.cells
    }

    pub fn cell_geometry(&self, cell: usize) -> &CellGeometry {
        &self.geometry[cell]
    }

    pub fn boundary_facets(&self) -> &[BoundaryFacet] {
        &self.boundary_facets
    }

    /// Maps barycentric coordinates in `cell` to a physical point.
    pub fn to_physical(&self, cell: usize, barycentric: &[Float; 3]) -> Vector2 {
        self.cells[cell]
            .iter()
            .zip(barycentric)
            .map(|(&v, &lambda)| self.vertices[v] * lambda)
            .sum()
    }
}

fn compute_cell_geometry(points: &[Vector2; 3]) -> CellGeometry {
    let edge = |k: usize| points[(k + 2) % 3] - points[(k + 1) % 3];
    let twice_area = {
        let (e1, e2) = (points[1] - points[0], points[2] - points[0]);
        e1[0] * e2[1] - e1[1] * e2[0]
    };
    // Gradient of lambda_k is the inward normal of the opposite edge scaled by
    // its length over twice the area.
    let lambda_gradients = [0, 1, 2].map(|k| {
        let e = edge(k);
        Vector2::new(-e[1], e[0]) / twice_area
    });
    let diameter = (0..3).map(|k| edge(k).norm()).fold(0., Float::max);
    CellGeometry {
        area: twice_area / 2.,
        diameter,
        centroid: (points[0] + points[1] + points[2]) / 3.,
        lambda_gradients,
    }
}

fn find_boundary_facets(vertices: &[Vector2], cells: &[[usize; 3]]) -> Vec<BoundaryFacet> {
    let mut edge_owners: HashMap<(usize, usize), Vec<(usize, usize)>> = HashMap::new();
    for (cell, indices) in cells.iter().enumerate() {
        for local_edge in 0..3 {
            let (a, b) = (indices[local_edge], indices[(local_edge + 1) % 3]);
            edge_owners
                .entry((a.min(b), a.max(b)))
                .or_default()
                .push((cell, local_edge));
        }
    }
    let mut facets: Vec<_> = edge_owners
        .into_values()
        .filter(|owners| owners.len() == 1)
        .map(|owners| {
            let (cell, local_edge) = owners[0];
            let a = cells[cell][local_edge];
            let b = cells[cell][(local_edge + 1) % 3];
            let tangent = vertices[b] - vertices[a];
            let length = tangent.norm();
            BoundaryFacet {
                cell,
                local_edge,
                vertices: [a, b],
                // Right-hand normal of a counter-clockwise edge.
                outward_normal: Vector2::new(tangent[1], -tangent[0]) / length,
                length,
            }
        })
        .collect();
    facets.sort_by_key(|facet| (facet.cell, facet.local_edge));
    facets
}
