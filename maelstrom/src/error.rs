use crate::{geom, linalg, newton, Float};

#[derive(Debug, thiserror::Error)]
pub enum IpcsError {
    #[error("{name} must be strictly positive, got {value}")]
    InvalidParameter { name: &'static str, value: Float },
    #[error("unknown time stepping method '{0}'")]
    UnknownTimeSteppingMethod(String),
    #[error("unknown stabilization '{0}'")]
    UnknownStabilization(String),
    #[error("invalid mesh")]
    Mesh(#[from] geom::MeshError),
    #[error("unsupported function space: {0}")]
    UnsupportedSpace(String),
    #[error("incompatible fields: {0}")]
    IncompatibleSpaces(String),
    #[error("nonlinear solve failed")]
    NonlinearSolve(#[from] newton::NewtonError),
    #[error("linear solve failed")]
    LinearSolve(#[from] linalg::LinearSolveError),
    #[error(
        "System not consistent! <b,e> = {alpha}, ||b|| = {norm_b}, <b,e>/||b|| = {ratio:e}"
    )]
    InconsistentPressureSystem {
        alpha: Float,
        norm_b: Float,
        ratio: Float,
        /// $\int (1/r) \operatorname{div}(r u) \, 2 \pi r \, dx$ of the tentative velocity.
        divergence_integral: Float,
        /// $\int_\Gamma n \cdot u \, 2 \pi r \, ds$ of the tentative velocity.
        boundary_flux: Float,
    },
}
