#![deny(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(
    clippy::cast_precision_loss,
    clippy::many_single_char_names,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::similar_names
)]

pub mod assembly;
pub mod bcs;
pub mod error;
pub mod examples;
pub mod fields;
pub mod geom;
pub mod linalg;
pub mod message;
pub mod navier_stokes;
pub mod newton;
pub mod quadrature;
pub mod space;
pub mod stabilization;
#[cfg(test)]
mod test_util;

use nalgebra as na;
use ndarray as nd;

pub use error::IpcsError;

pub type Float = f64;
pub use std::f64::consts as float_consts;

pub type Array1 = nd::Array1<Float>;
pub type Vector2 = na::Vector2<Float>;
pub type Vector3 = na::Vector3<Float>;
pub type Matrix2 = na::Matrix2<Float>;
/// Gradient of a vector field: row `c` holds $(\partial_r u_c, \partial_z u_c)$.
pub type Matrix3x2 = na::Matrix3x2<Float>;
pub type CsMat = sprs::CsMat<Float>;
