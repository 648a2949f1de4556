//! Piecewise geodesic curves.
//!
//! A curve is a knot set `κ_1 < ... < κ_K` plus one control point per knot.
//! Segment `j` covers `[κ_j, κ_{j+1})` (the last one is closed) and runs along
//! the minor arc from `c_j` to `c_{j+1}` at constant speed:
//!
//! ```text
//! γ(t) = geodesic_point(c_j, c_{j+1}, (t - κ_j) / (κ_{j+1} - κ_j))
//! ```
//!
//! Smoothness is measured by the velocity jump at each interior knot, the
//! difference between the outgoing and incoming geodesic velocities:
//!
//! ```text
//! jump_j = log_{c_j}(c_{j+1}) / Δ_j + log_{c_j}(c_{j-1}) / Δ_{j-1}
//! ```

use nalgebra::Vector3;

use crate::domain::{Direction, DomainPolicy, KnotSet};
use crate::error::{Result, SphereError};
use crate::math::geodesic::{geodesic_point, log_map};

#[derive(Debug, Clone, PartialEq)]
pub struct PiecewiseGeodesic {
    knots: KnotSet,
    control_points: Vec<Direction>,
    policy: DomainPolicy,
}

impl PiecewiseGeodesic {
    pub fn new(
        knots: KnotSet,
        control_points: Vec<Direction>,
        policy: DomainPolicy,
    ) -> Result<Self> {
        if control_points.len() != knots.len() {
            return Err(SphereError::ShapeMismatch {
                left: knots.len(),
                right: control_points.len(),
            });
        }
        Ok(Self {
            knots,
            control_points,
            policy,
        })
    }

    pub fn knots(&self) -> &KnotSet {
        &self.knots
    }

    pub fn control_points(&self) -> &[Direction] {
        &self.control_points
    }

    pub fn policy(&self) -> DomainPolicy {
        self.policy
    }

    /// Segment index and fraction along it for `t`, after applying the domain
    /// policy.
    pub fn locate(&self, t: f64) -> Result<(usize, f64)> {
        if !t.is_finite() {
            return Err(SphereError::InvalidInput(format!(
                "cannot evaluate a curve at t={t}"
            )));
        }
        let lo = self.knots.first();
        let hi = self.knots.last();
        let t = if t < lo || t > hi {
            match self.policy {
                DomainPolicy::Strict => return Err(SphereError::OutOfDomain { t, lo, hi }),
                DomainPolicy::Clamp => t.clamp(lo, hi),
            }
        } else {
            t
        };

        let values = self.knots.values();
        let last_segment = self.knots.segment_count() - 1;
        let j = values
            .partition_point(|&k| k <= t)
            .saturating_sub(1)
            .min(last_segment);
        let s = ((t - values[j]) / self.knots.width(j)).clamp(0.0, 1.0);
        Ok((j, s))
    }

    pub fn evaluate(&self, t: f64) -> Result<Direction> {
        let (j, s) = self.locate(t)?;
        geodesic_point(&self.control_points[j], &self.control_points[j + 1], s)
    }

    pub fn evaluate_many(&self, ts: &[f64]) -> Result<Vec<Direction>> {
        ts.iter().map(|&t| self.evaluate(t)).collect()
    }

    /// Velocity jump at every interior knot (`K - 2` vectors, each tangent at
    /// its control point).
    pub fn velocity_jumps(&self) -> Result<Vec<Vector3<f64>>> {
        let c = &self.control_points;
        (1..c.len().saturating_sub(1))
            .map(|j| {
                let out = log_map(&c[j], &c[j + 1])? / self.knots.width(j);
                let back = log_map(&c[j], &c[j - 1])? / self.knots.width(j - 1);
                Ok(out + back)
            })
            .collect()
    }

    /// `Σ_j |jump_j|^2`.
    pub fn roughness(&self) -> Result<f64> {
        Ok(self.velocity_jumps()?.iter().map(|v| v.norm_squared()).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::geodesic::distance;

    fn equator(angle: f64) -> Direction {
        Direction::from_xyz(angle.cos(), angle.sin(), 0.0).unwrap()
    }

    fn curve(policy: DomainPolicy) -> PiecewiseGeodesic {
        let knots = KnotSet::new(vec![0.0, 1.0, 3.0]).unwrap();
        let cps = vec![
            equator(0.0),
            equator(0.5),
            Direction::from_xyz(0.0, 0.0, 1.0).unwrap(),
        ];
        PiecewiseGeodesic::new(knots, cps, policy).unwrap()
    }

    #[test]
    fn control_point_count_must_match_knots() {
        let knots = KnotSet::new(vec![0.0, 1.0, 2.0]).unwrap();
        let err = PiecewiseGeodesic::new(knots, vec![equator(0.0); 2], DomainPolicy::Strict)
            .unwrap_err();
        assert_eq!(err, SphereError::ShapeMismatch { left: 3, right: 2 });
    }

    #[test]
    fn knots_reproduce_control_points_exactly() {
        let c = curve(DomainPolicy::Strict);
        for (k, cp) in c.knots().values().iter().zip(c.control_points()) {
            assert_eq!(c.evaluate(*k).unwrap(), *cp);
        }
    }

    #[test]
    fn segments_are_half_open() {
        let c = curve(DomainPolicy::Strict);
        assert_eq!(c.locate(1.0).unwrap(), (1, 0.0));
        assert_eq!(c.locate(3.0).unwrap(), (1, 1.0));
        let (j, s) = c.locate(0.5).unwrap();
        assert_eq!(j, 0);
        assert!((s - 0.5).abs() < 1e-15);
    }

    #[test]
    fn constant_speed_within_a_segment() {
        let c = curve(DomainPolicy::Strict);
        let mid = c.evaluate(0.5).unwrap();
        assert!((distance(&equator(0.0), &mid) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn strict_policy_rejects_outside_span() {
        let c = curve(DomainPolicy::Strict);
        assert!(matches!(
            c.evaluate(3.5),
            Err(SphereError::OutOfDomain { hi, .. }) if hi == 3.0
        ));
        assert!(c.evaluate(f64::NAN).is_err());
    }

    #[test]
    fn clamp_policy_pins_to_boundary() {
        let c = curve(DomainPolicy::Clamp);
        assert_eq!(c.evaluate(-2.0).unwrap(), c.control_points()[0]);
        assert_eq!(c.evaluate(10.0).unwrap(), c.control_points()[2]);
    }

    #[test]
    fn straight_curve_has_no_jump() {
        let knots = KnotSet::new(vec![0.0, 1.0, 2.0]).unwrap();
        let cps = vec![equator(0.0), equator(0.3), equator(0.6)];
        let c = PiecewiseGeodesic::new(knots, cps, DomainPolicy::Strict).unwrap();
        let jumps = c.velocity_jumps().unwrap();
        assert_eq!(jumps.len(), 1);
        assert!(jumps[0].norm() < 1e-12);
        assert!(c.roughness().unwrap() < 1e-24);
    }

    #[test]
    fn speed_change_shows_up_as_jump() {
        // Same direction, speed 0.3 then 0.6 per unit t.
        let knots = KnotSet::new(vec![0.0, 1.0, 2.0]).unwrap();
        let cps = vec![equator(0.0), equator(0.3), equator(0.9)];
        let c = PiecewiseGeodesic::new(knots, cps, DomainPolicy::Strict).unwrap();
        let jumps = c.velocity_jumps().unwrap();
        assert!((jumps[0].norm() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn antipodal_neighbours_make_jumps_ambiguous() {
        let knots = KnotSet::new(vec![0.0, 1.0, 2.0]).unwrap();
        let cps = vec![equator(0.0), equator(0.5), equator(0.5 + std::f64::consts::PI)];
        let c = PiecewiseGeodesic::new(knots, cps, DomainPolicy::Strict).unwrap();
        assert!(matches!(
            c.velocity_jumps(),
            Err(SphereError::AmbiguousGeodesic { .. })
        ));
    }
}
