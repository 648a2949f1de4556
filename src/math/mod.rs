//! Mathematical utilities: 3-vector batches, great-circle geometry, spherical
//! coordinates and least squares.

pub mod coords;
pub mod geodesic;
pub mod ols;
pub mod vector;

pub use coords::*;
pub use geodesic::*;
pub use ols::*;
