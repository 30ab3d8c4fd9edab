//! Gauss-Legendre based quadrature rules on the reference triangle and on
//! facets.

use crate::Float;

/// Rule on the reference triangle $\{(\xi, \eta) : \xi, \eta \ge 0, \xi + \eta \le 1\}$.
///
/// Built by collapsing the square $[0, 1]^2$ onto the triangle (Duffy
/// transform), so the weights sum to $1/2$.
#[derive(Clone, Debug)]
pub struct TriangleRule {
    /// Barycentric coordinates $(1 - \xi - \eta, \xi, \eta)$ of each point.
    pub barycentric: Vec<[Float; 3]>,
    pub weights: Vec<Float>,
}

impl TriangleRule {
    /// Rule integrating polynomials of total degree `degree` exactly.
    pub fn new(degree: usize) -> Self {
        // The collapse adds a factor (1 - t), hence one extra degree along t.
        let (nodes, weights) = unit_interval_rule((degree + 3) / 2);
        let mut barycentric = Vec::with_capacity(nodes.len() * nodes.len());
        let mut triangle_weights = Vec::with_capacity(nodes.len() * nodes.len());
        for (&t, &weight_t) in nodes.iter().zip(&weights) {
            for (&s, &weight_s) in nodes.iter().zip(&weights) {
                let xi = s * (1. - t);
                let eta = t;
                barycentric.push([1. - xi - eta, xi, eta]);
                triangle_weights.push(weight_s * weight_t * (1. - t));
            }
        }
        Self {
            barycentric,
            weights: triangle_weights,
        }
    }
}

/// Rule on $[0, 1]$, used along facets. Weights sum to one.
#[derive(Clone, Debug)]
pub struct FacetRule {
    pub nodes: Vec<Float>,
    pub weights: Vec<Float>,
}

impl FacetRule {
    pub fn new(degree: usize) -> Self {
        let (nodes, weights) = unit_interval_rule(degree / 2 + 1);
        Self { nodes, weights }
    }
}

fn unit_interval_rule(num_points: usize) -> (Vec<Float>, Vec<Float>) {
    // `gauss_quad` does not accept fewer than two points.
    let gauss_quad::GaussLegendre { nodes, weights } =
        gauss_quad::GaussLegendre::init(num_points.max(2));
    (
        nodes.into_iter().map(|x| (1. + x) / 2.).collect(),
        weights.into_iter().map(|w| w / 2.).collect(),
    )
}
