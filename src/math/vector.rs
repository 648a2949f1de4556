//! Row-wise vector operations on 3-vectors.
//!
//! Every function takes a batch (`&[Vector3<f64>]`). A single vector is a
//! batch of one: `norm(std::slice::from_ref(&v))`.

use nalgebra::Vector3;

use crate::error::{Result, SphereError};

/// Norms below this have no safe direction.
pub const NORM_EPS: f64 = 1e-12;

/// Euclidean length of each row.
pub fn norm(rows: &[Vector3<f64>]) -> Vec<f64> {
    rows.iter().map(|v| v.norm()).collect()
}

/// Scale each row to unit length.
pub fn normalize(rows: &[Vector3<f64>]) -> Result<Vec<Vector3<f64>>> {
    rows.iter().map(unit).collect()
}

/// Row-aligned dot products.
pub fn dot(a: &[Vector3<f64>], b: &[Vector3<f64>]) -> Result<Vec<f64>> {
    ensure_same_rows(a, b)?;
    Ok(a.iter().zip(b).map(|(u, v)| u.dot(v)).collect())
}

/// Row-aligned cross products.
pub fn cross(a: &[Vector3<f64>], b: &[Vector3<f64>]) -> Result<Vec<Vector3<f64>>> {
    ensure_same_rows(a, b)?;
    Ok(a.iter().zip(b).map(|(u, v)| u.cross(v)).collect())
}

/// Normalize a single row. This is the primitive behind [`normalize`]; every
/// normalization in the crate goes through it.
pub fn unit(v: &Vector3<f64>) -> Result<Vector3<f64>> {
    if !v.iter().all(|c| c.is_finite()) {
        return Err(SphereError::InvalidInput(format!(
            "non-finite vector component in [{}, {}, {}]",
            v.x, v.y, v.z
        )));
    }
    let n = v.norm();
    if n < NORM_EPS {
        return Err(SphereError::DegenerateInput {
            norm: n,
            tolerance: NORM_EPS,
        });
    }
    Ok(v / n)
}

fn ensure_same_rows(a: &[Vector3<f64>], b: &[Vector3<f64>]) -> Result<()> {
    if a.len() != b.len() {
        return Err(SphereError::ShapeMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(())
}
