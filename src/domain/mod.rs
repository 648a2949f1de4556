//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - points on the sphere and observation samples (`Direction`, `Sample`)
//! - spline structure (`KnotSet`, `PenaltyGrid`, `DomainPolicy`)
//! - fit outputs (`FittedSpline`, `FitQuality`, `StopReason`)
//! - run configuration (`FitConfig`, `SimConfig`)

pub mod types;

pub use types::*;
