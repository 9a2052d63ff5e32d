//! Linear algebra type aliases for the planar geometry code
//!
//! Triangulation and barycentric interpolation only ever work in 2-D, so the
//! fixed-size nalgebra types keep dimensions checked at compile time.

use nalgebra::{SMatrix, SVector};

pub const PLANE_DIM: usize = 2;

pub type Vec2 = SVector<f64, PLANE_DIM>;
pub type Mat2 = SMatrix<f64, PLANE_DIM, PLANE_DIM>;
