//! Data sources: synthetic directional samples.

pub mod sample;

pub use sample::*;
