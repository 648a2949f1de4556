//! `sphere-smooth` library crate.
//!
//! Penalized piecewise-geodesic splines for directional data on the unit
//! sphere, with BIC-based choice of the penalty strength.
//!
//! The binary (`ssmooth`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the geometry and fitting modules are reusable on their own

pub mod app;
pub mod cli;
pub mod data;
pub mod debug;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod report;
pub mod spline;
