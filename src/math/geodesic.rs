//! Great-circle geometry on the unit sphere.
//!
//! All functions are pure. Singular configurations are reported, not
//! smoothed over:
//!
//! - coincident points: the geodesic is the constant curve at `p`
//! - (near-)antipodal points: the minor arc is undefined -> `AmbiguousGeodesic`
//!
//! Arc angles inside the tangent frame use `atan2(|q - <p,q>p|, <p,q>)`, which
//! is the same angle as `distance` but keeps full precision at small
//! separations where `acos` loses about half the digits.

use nalgebra::Vector3;

use crate::domain::Direction;
use crate::error::{Result, SphereError};
use crate::math::vector::unit;

/// `|<p, v>|` allowed for a tangent vector (scaled by `max(1, |v|)`).
pub const TANGENT_TOL: f64 = 1e-8;

/// Perpendicular component below which two points count as coincident.
pub const COINCIDENT_EPS: f64 = 1e-12;

/// Perpendicular component below which opposing points count as antipodal.
pub const ANTIPODAL_EPS: f64 = 1e-7;

/// Geodesic distance in `[0, π]`.
pub fn distance(p: &Direction, q: &Direction) -> f64 {
    p.as_vector().dot(q.as_vector()).clamp(-1.0, 1.0).acos()
}

/// Move from `p` along the geodesic with initial velocity `v`.
pub fn exp_map(p: &Direction, v: &Vector3<f64>) -> Result<Direction> {
    let base = p.as_vector();
    let nv = v.norm();
    let inner = base.dot(v);
    if !(inner.abs() <= TANGENT_TOL * nv.max(1.0)) {
        return Err(SphereError::NonTangentInput { inner });
    }
    if nv == 0.0 {
        return Ok(*p);
    }
    Direction::new(base * nv.cos() + v * (nv.sin() / nv))
}

/// Inverse of [`exp_map`]: tangent vector at `p` of length `distance(p, q)`
/// pointing toward `q`.
pub fn log_map(p: &Direction, q: &Direction) -> Result<Vector3<f64>> {
    match tangent_frame(p, q)? {
        Some((w, theta)) => Ok(w * theta),
        None => Ok(Vector3::zeros()),
    }
}

/// Residual vector from `p` to `q` for least squares: [`log_map`], except that
/// a (near-)antipodal `q` maps to a vector of length `distance(p, q)` along the
/// first tangent basis direction. Its norm is always `distance(p, q)`.
pub fn residual_vector(p: &Direction, q: &Direction) -> Result<Vector3<f64>> {
    match log_map(p, q) {
        Err(SphereError::AmbiguousGeodesic { .. }) => {
            let (e1, _) = tangent_basis(p)?;
            Ok(e1 * distance(p, q))
        }
        other => other,
    }
}

/// Point at fraction `s` of the minor arc from `p` to `q`.
pub fn geodesic_point(p: &Direction, q: &Direction, s: f64) -> Result<Direction> {
    if !(s.is_finite() && (0.0..=1.0).contains(&s)) {
        return Err(SphereError::InvalidInput(format!(
            "geodesic fraction must lie in [0, 1], got {s}"
        )));
    }
    if s == 0.0 {
        return Ok(*p);
    }
    let frame = tangent_frame(p, q)?;
    if s == 1.0 {
        return Ok(*q);
    }
    match frame {
        Some((w, theta)) => {
            let a = s * theta;
            Direction::new(p.as_vector() * a.cos() + w * a.sin())
        }
        None => Ok(*p),
    }
}

/// `n` points evenly spaced along the arc, both endpoints included.
pub fn geodesic_path(p: &Direction, q: &Direction, n: usize) -> Result<Vec<Direction>> {
    if n < 2 {
        return Err(SphereError::InvalidInput(format!(
            "a geodesic path needs at least 2 points, got {n}"
        )));
    }
    let last = (n - 1) as f64;
    (0..n).map(|i| geodesic_point(p, q, i as f64 / last)).collect()
}

/// Orthonormal basis `(e1, e2)` of the tangent plane at `p`.
pub fn tangent_basis(p: &Direction) -> Result<(Vector3<f64>, Vector3<f64>)> {
    let v = p.as_vector();
    // Any axis far from `p` works; x unless `p` is close to it.
    let a = if v.x.abs() < 0.9 { Vector3::x() } else { Vector3::y() };
    let e1 = unit(&v.cross(&a))?;
    let e2 = v.cross(&e1);
    Ok((e1, e2))
}

/// Unit tangent at `p` toward `q` and the arc angle, or `None` when coincident.
fn tangent_frame(p: &Direction, q: &Direction) -> Result<Option<(Vector3<f64>, f64)>> {
    let pv = p.as_vector();
    let qv = q.as_vector();
    let c = pv.dot(qv);
    let perp = qv - pv * c;
    let s = perp.norm();

    if c < 0.0 && s < ANTIPODAL_EPS {
        return Err(SphereError::AmbiguousGeodesic {
            separation: s.atan2(c),
        });
    }
    if s < COINCIDENT_EPS {
        return Ok(None);
    }
    Ok(Some((perp / s, s.atan2(c))))
}
