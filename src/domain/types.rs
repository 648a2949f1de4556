//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON/CSV
//! - reloaded later for evaluation or comparisons

use std::path::PathBuf;

use clap::ValueEnum;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{ConvergenceWarning, Result, SphereError};
use crate::math::vector::{normalize, unit};
use crate::spline::PiecewiseGeodesic;

/// A point on the unit sphere.
///
/// Construction renormalizes; a vector too short to carry a direction is
/// rejected. Serialized as a plain `[x, y, z]` array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 3]", into = "[f64; 3]")]
pub struct Direction(Vector3<f64>);

impl Direction {
    pub fn new(v: Vector3<f64>) -> Result<Self> {
        Ok(Self(unit(&v)?))
    }

    pub fn from_xyz(x: f64, y: f64, z: f64) -> Result<Self> {
        Self::new(Vector3::new(x, y, z))
    }

    pub fn as_vector(&self) -> &Vector3<f64> {
        &self.0
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.0.x, self.0.y, self.0.z]
    }
}

impl TryFrom<[f64; 3]> for Direction {
    type Error = SphereError;

    fn try_from(value: [f64; 3]) -> Result<Self> {
        Self::from_xyz(value[0], value[1], value[2])
    }
}

impl From<Direction> for [f64; 3] {
    fn from(value: Direction) -> Self {
        value.to_array()
    }
}

/// An ordered set of directional observations.
///
/// Sorted by `t` on construction; `t` must be finite and strictly increasing
/// after sorting. Immutable afterwards.
#[derive(Debug, Clone)]
pub struct Sample {
    t: Vec<f64>,
    y: Vec<Direction>,
}

impl Sample {
    pub fn new(t: Vec<f64>, y: Vec<Direction>) -> Result<Self> {
        if t.len() != y.len() {
            return Err(SphereError::ShapeMismatch {
                left: t.len(),
                right: y.len(),
            });
        }
        if t.is_empty() {
            return Err(SphereError::InsufficientData(
                "a sample needs at least one observation".to_string(),
            ));
        }
        if let Some(bad) = t.iter().find(|v| !v.is_finite()) {
            return Err(SphereError::InvalidInput(format!(
                "non-finite domain coordinate {bad}"
            )));
        }

        let mut pairs: Vec<(f64, Direction)> = t.into_iter().zip(y).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        if let Some(w) = pairs.windows(2).find(|w| w[1].0 <= w[0].0) {
            return Err(SphereError::InvalidInput(format!(
                "duplicate domain coordinate t={}",
                w[0].0
            )));
        }

        let (t, y) = pairs.into_iter().unzip();
        Ok(Self { t, y })
    }

    /// Build from raw 3-vectors, renormalizing each row.
    pub fn from_vectors(t: Vec<f64>, rows: &[Vector3<f64>]) -> Result<Self> {
        let y = normalize(rows)?
            .into_iter()
            .map(Direction::new)
            .collect::<Result<Vec<_>>>()?;
        Self::new(t, y)
    }

    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn t(&self) -> &[f64] {
        &self.t
    }

    pub fn y(&self) -> &[Direction] {
        &self.y
    }

    /// `(min t, max t)`.
    pub fn span(&self) -> (f64, f64) {
        (self.t[0], self.t[self.t.len() - 1])
    }
}

/// Strictly increasing segment boundaries of a piecewise geodesic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct KnotSet(Vec<f64>);

impl KnotSet {
    pub fn new(values: Vec<f64>) -> Result<Self> {
        if values.len() < 2 {
            return Err(SphereError::InvalidInput(format!(
                "a knot set needs at least 2 knots, got {}",
                values.len()
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(SphereError::InvalidInput("non-finite knot".to_string()));
        }
        if let Some(w) = values.windows(2).find(|w| w[1] <= w[0]) {
            return Err(SphereError::InvalidInput(format!(
                "knots must be strictly increasing ({} then {})",
                w[0], w[1]
            )));
        }
        Ok(Self(values))
    }

    /// `[min t, interior..., max t]`; interior knots must lie strictly inside
    /// the sample span.
    pub fn from_interior(sample: &Sample, interior: &[f64]) -> Result<Self> {
        let (lo, hi) = sample.span();
        if hi <= lo {
            return Err(SphereError::InsufficientData(
                "sample span is empty; cannot place knots".to_string(),
            ));
        }
        if let Some(k) = interior.iter().find(|&&k| !(k > lo && k < hi)) {
            return Err(SphereError::InvalidInput(format!(
                "interior knot {k} is not strictly inside ({lo}, {hi})"
            )));
        }
        let mut values = Vec::with_capacity(interior.len() + 2);
        values.push(lo);
        values.extend_from_slice(interior);
        values.push(hi);
        Self::new(values)
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> f64 {
        self.0[0]
    }

    pub fn last(&self) -> f64 {
        self.0[self.0.len() - 1]
    }

    pub fn segment_count(&self) -> usize {
        self.0.len() - 1
    }

    /// Width of segment `j`.
    pub fn width(&self, j: usize) -> f64 {
        self.0[j + 1] - self.0[j]
    }
}

impl TryFrom<Vec<f64>> for KnotSet {
    type Error = SphereError;

    fn try_from(value: Vec<f64>) -> Result<Self> {
        Self::new(value)
    }
}

impl From<KnotSet> for Vec<f64> {
    fn from(value: KnotSet) -> Self {
        value.0
    }
}

/// Penalty strengths to sweep.
///
/// Non-empty, finite and non-negative; sorted ascending and de-duplicated on
/// construction. `λ = 0` is the unpenalized fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyGrid(Vec<f64>);

impl PenaltyGrid {
    pub fn new(mut values: Vec<f64>) -> Result<Self> {
        if values.is_empty() {
            return Err(SphereError::InvalidInput("penalty grid is empty".to_string()));
        }
        if let Some(bad) = values.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
            return Err(SphereError::InvalidInput(format!(
                "penalty strengths must be finite and >= 0, got {bad}"
            )));
        }
        values.sort_by(|a, b| a.total_cmp(b));
        values.dedup();
        Ok(Self(values))
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// What a curve does with `t` outside its knot span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DomainPolicy {
    /// Fail with `OutOfDomain`.
    #[default]
    Strict,
    /// Pin `t` to the nearest boundary knot.
    Clamp,
}

/// Why the fitter stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Converged,
    /// Damping ran out before the tolerance was met: no nearby step lowers
    /// the objective, so the fit sits at a stationary point to working
    /// precision.
    Stalled,
    MaxIterReached,
}

/// Fit quality diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitQuality {
    /// Sum of squared geodesic distances between observations and the curve.
    pub rss: f64,
    /// Sum of squared velocity jumps over interior knots (before `λ`).
    /// `None` when an unpenalized fit left neighbouring control points
    /// antipodal.
    pub penalty: Option<f64>,
    /// Effective degrees of freedom of the linearized fit.
    pub edf: f64,
    pub bic: f64,
    pub n: usize,
    pub iterations: usize,
    /// Interior knots whose weighted jump is still material.
    pub active_knots: Option<usize>,
}

/// A fitted piecewise geodesic for one penalty strength.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedSpline {
    pub knots: KnotSet,
    pub control_points: Vec<Direction>,
    pub lambda: f64,
    /// `rss + λ · penalty` at the returned control points.
    pub objective: f64,
    pub quality: FitQuality,
    pub stop: StopReason,
    pub warning: Option<ConvergenceWarning>,
    pub policy: DomainPolicy,
}

impl FittedSpline {
    pub fn curve(&self) -> Result<PiecewiseGeodesic> {
        PiecewiseGeodesic::new(self.knots.clone(), self.control_points.clone(), self.policy)
    }

    /// Curve points at each `t`.
    pub fn evaluate(&self, ts: &[f64]) -> Result<Vec<Direction>> {
        self.curve()?.evaluate_many(ts)
    }

    /// Curve points at each `t` as `[θ, φ]` (colatitude, azimuth in radians).
    pub fn evaluate_spherical(&self, ts: &[f64]) -> Result<Vec<[f64; 2]>> {
        let points = self.evaluate(ts)?;
        Ok(crate::math::coords::cartesian_to_spherical(&points))
    }

    /// True unless the iteration cap cut the fit short.
    pub fn converged(&self) -> bool {
        matches!(self.stop, StopReason::Converged | StopReason::Stalled)
    }
}

/// Fitted point and geodesic residual for one observation.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationResidual {
    pub t: f64,
    pub observed: Direction,
    pub fitted: Direction,
    /// Geodesic distance between `observed` and `fitted` (radians).
    pub residual: f64,
}

/// Where observations come from when no CSV is given.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub n: usize,
    pub seed: u64,
    /// Standard deviation of the tangent-plane noise (radians).
    pub noise: f64,
    /// Colatitude of the small circle the track follows (radians).
    pub colatitude: f64,
    /// Azimuth swept from first to last observation (radians).
    pub arc: f64,
    pub t_min: f64,
    pub t_max: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            n: 60,
            seed: 42,
            noise: 0.01,
            colatitude: 1.2,
            arc: 1.5,
            t_min: 0.0,
            t_max: 1.0,
        }
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct FitConfig {
    /// Observations CSV; a synthetic sample is generated when absent.
    pub csv_path: Option<PathBuf>,
    /// Interpret `theta`/`phi` columns as degrees.
    pub degrees: bool,
    pub sim: SimConfig,

    /// Interior knot count for quantile placement.
    pub knot_count: usize,
    /// Explicit interior knots (overrides `knot_count`).
    pub interior_knots: Option<Vec<f64>>,

    /// Single penalty strength (skips selection).
    pub lambda: Option<f64>,
    pub lambda_min: f64,
    pub lambda_max: f64,
    pub lambda_steps: usize,
    /// Prepend `λ = 0` to the sweep.
    pub include_zero: bool,

    pub max_iter: usize,
    pub tolerance: f64,
    pub domain_policy: DomainPolicy,
    /// BIC window within which the larger `λ` wins.
    pub bic_margin: f64,
    /// Weighted-jump threshold below which interior knots are dropped.
    pub prune_below: Option<f64>,

    pub top_n: usize,
    pub export_results: Option<PathBuf>,
    pub export_spline: Option<PathBuf>,
    pub debug_bundle: bool,
}
