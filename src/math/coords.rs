//! Spherical angles <-> Cartesian directions.
//!
//! Convention: `θ` is the colatitude in `[0, π]` (0 at the north pole, +z),
//! `φ` the azimuth measured from +x toward +y, reported in `[0, 2π)`.

use std::f64::consts::{PI, TAU};

use crate::domain::Direction;
use crate::error::{Result, SphereError};

impl Direction {
    pub fn from_spherical(theta: f64, phi: f64) -> Result<Self> {
        if !(theta.is_finite() && phi.is_finite()) {
            return Err(SphereError::InvalidInput(format!(
                "non-finite spherical angles (theta={theta}, phi={phi})"
            )));
        }
        if !(0.0..=PI).contains(&theta) {
            return Err(SphereError::InvalidInput(format!(
                "colatitude must lie in [0, pi], got {theta}"
            )));
        }
        let s = theta.sin();
        Self::from_xyz(s * phi.cos(), s * phi.sin(), theta.cos())
    }

    /// `(θ, φ)`; the azimuth is 0 at the poles.
    pub fn to_spherical(&self) -> (f64, f64) {
        let v = self.as_vector();
        let theta = v.z.clamp(-1.0, 1.0).acos();
        let mut phi = v.y.atan2(v.x);
        if phi < 0.0 {
            phi += TAU;
        }
        // atan2 of a tiny negative y can round up to exactly 2π.
        if phi >= TAU {
            phi = 0.0;
        }
        (theta, phi)
    }
}

/// Batch form of [`Direction::from_spherical`]; rows are `[θ, φ]`.
pub fn spherical_to_cartesian(rows: &[[f64; 2]]) -> Result<Vec<Direction>> {
    rows.iter()
        .map(|&[theta, phi]| Direction::from_spherical(theta, phi))
        .collect()
}

/// Batch form of [`Direction::to_spherical`]; rows are `[θ, φ]`.
pub fn cartesian_to_spherical(points: &[Direction]) -> Vec<[f64; 2]> {
    points
        .iter()
        .map(|d| {
            let (theta, phi) = d.to_spherical();
            [theta, phi]
        })
        .collect()
}

/// Azimuthal equidistant projection about the north pole: `(θ cos φ, θ sin φ)`.
///
/// Distances from the pole are preserved, so a polar cap maps without folding.
pub fn equal_distance_projection(d: &Direction) -> (f64, f64) {
    let (theta, phi) = d.to_spherical();
    (theta * phi.cos(), theta * phi.sin())
}

pub fn degrees_to_radians(rows: &[[f64; 2]]) -> Vec<[f64; 2]> {
    rows.iter()
        .map(|&[a, b]| [a.to_radians(), b.to_radians()])
        .collect()
}
