//! Quantile knot placement.
//!
//! Interior knots follow the empirical distribution of the domain variable so
//! that every segment carries a similar share of the observations. The
//! quantile rule always picks an observed value (no interpolation):
//!
//! ```text
//! h = floor(m p + 1/2), clamped to [1, m]
//! ```
//!
//! over the `m` interior coordinates (first and last removed; all coordinates
//! when fewer than three).

use crate::domain::{KnotSet, Sample};
use crate::error::{Result, SphereError};

/// Relative gap used to pull coincident or boundary knots apart.
pub const KNOT_NUDGE: f64 = 1e-6;

/// `k` interior knots at probabilities `j / (k + 1)`, `j = 1..=k`.
pub fn knots_quantile(t: &[f64], k: usize) -> Result<Vec<f64>> {
    if k == 0 {
        return Ok(Vec::new());
    }
    if k >= t.len() {
        return Err(SphereError::InsufficientData(format!(
            "{k} interior knots need more than {k} observations, got {}",
            t.len()
        )));
    }
    if t.iter().any(|v| !v.is_finite()) {
        return Err(SphereError::InvalidInput(
            "non-finite domain coordinate".to_string(),
        ));
    }

    let mut sorted = t.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let lo = sorted[0];
    let hi = sorted[sorted.len() - 1];
    let span = hi - lo;
    if !(span > 0.0) {
        return Err(SphereError::InsufficientData(
            "domain variable has zero span".to_string(),
        ));
    }

    let coords = if sorted.len() >= 3 {
        &sorted[1..sorted.len() - 1]
    } else {
        &sorted[..]
    };
    let m = coords.len();

    let mut knots: Vec<f64> = (1..=k)
        .map(|j| {
            let p = j as f64 / (k + 1) as f64;
            let h = ((m as f64 * p + 0.5).floor() as usize).clamp(1, m);
            coords[h - 1]
        })
        .collect();

    let eps = KNOT_NUDGE * span;
    // Forward: strictly above `lo` and the previous knot.
    let mut floor = lo;
    for v in knots.iter_mut() {
        if *v < floor + eps {
            *v = floor + eps;
        }
        floor = *v;
    }
    // Backward: strictly below `hi` and the next knot.
    let mut ceil = hi;
    for v in knots.iter_mut().rev() {
        if *v > ceil - eps {
            *v = ceil - eps;
        }
        ceil = *v;
    }

    let ordered = knots.windows(2).all(|w| w[0] < w[1]);
    if !(ordered && knots[0] > lo && knots[k - 1] < hi) {
        return Err(SphereError::InsufficientData(format!(
            "cannot place {k} distinct interior knots inside ({lo}, {hi})"
        )));
    }
    Ok(knots)
}

impl KnotSet {
    /// Boundary knots at the sample span plus `k` quantile interior knots.
    pub fn quantile(sample: &Sample, k: usize) -> Result<Self> {
        let interior = knots_quantile(sample.t(), k)?;
        Self::from_interior(sample, &interior)
    }
}
