//! Penalty grid generation.
//!
//! The penalty strength is chosen by a deterministic sweep over `λ` values.
//! Log spacing gives every decade the same number of candidates, which matches
//! how the BIC responds to `λ`.

use crate::domain::PenaltyGrid;
use crate::error::{Result, SphereError};

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(SphereError::InvalidInput(format!(
            "invalid lambda range: min={min}, max={max} (must be finite, >0, and max>min)"
        )));
    }
    if steps < 2 {
        return Err(SphereError::InvalidInput("lambda steps must be >= 2".to_string()));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push((ln_min + step * i as f64).exp());
    }
    // Pin the endpoints so a requested bound is hit exactly.
    out[0] = min;
    out[steps - 1] = max;
    Ok(out)
}

impl PenaltyGrid {
    /// `steps` log-spaced strengths in `[min, max]`.
    pub fn log_spaced(min: f64, max: f64, steps: usize) -> Result<Self> {
        Self::new(log_space(min, max, steps)?)
    }

    /// [`PenaltyGrid::log_spaced`] with the unpenalized fit prepended.
    pub fn log_spaced_with_zero(min: f64, max: f64, steps: usize) -> Result<Self> {
        let mut values = vec![0.0];
        values.extend(log_space(min, max, steps)?);
        Self::new(values)
    }
}
