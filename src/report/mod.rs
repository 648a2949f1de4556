//! Reporting utilities: residuals, outlier rankings and formatted terminal output.

pub mod format;

pub use format::*;

use crate::domain::{FittedSpline, ObservationResidual, Sample};
use crate::error::Result;
use crate::math::geodesic::distance;

/// Fitted points and geodesic residuals for each observation.
pub fn compute_residuals(sample: &Sample, fit: &FittedSpline) -> Result<Vec<ObservationResidual>> {
    let curve = fit.curve()?;
    sample
        .t()
        .iter()
        .zip(sample.y())
        .map(|(&t, &observed)| {
            let fitted = curve.evaluate(t)?;
            Ok(ObservationResidual {
                t,
                observed,
                fitted,
                residual: distance(&fitted, &observed),
            })
        })
        .collect()
}

/// The `top_n` observations farthest from the curve, largest first.
pub fn rank_outliers(residuals: &[ObservationResidual], top_n: usize) -> Vec<ObservationResidual> {
    let mut sorted = residuals.to_vec();
    sorted.sort_by(|a, b| b.residual.total_cmp(&a.residual).then(a.t.total_cmp(&b.t)));
    sorted.truncate(top_n);
    sorted
}
