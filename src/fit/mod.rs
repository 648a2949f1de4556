//! Spline fitting orchestration.
//!
//! Responsibilities:
//!
//! - place knots at quantiles of the domain variable
//! - generate penalty grids
//! - fit control points for one penalty (damped tangent-space iteration)
//! - sweep the grid (parallel) and select the penalty using BIC

pub mod api;
pub mod fitter;
pub mod knots;
pub mod lambda_grid;
pub mod selection;

pub use api::*;
pub use fitter::*;
pub use knots::*;
pub use lambda_grid::*;
pub use selection::*;
