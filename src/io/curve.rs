//! Read/write spline JSON files.
//!
//! Spline JSON is the "portable" representation of a fitted curve:
//! - knots, control points (`[x, y, z]` arrays) and the penalty strength
//! - fit diagnostics (RSS, penalty, edf, BIC) and how the fit stopped
//! - a precomputed evaluation grid for quick plotting elsewhere
//!
//! Reading a file back yields a `FittedSpline` that evaluates exactly like the
//! one that was written.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Direction, DomainPolicy, FitQuality, FittedSpline, KnotSet, StopReason};
use crate::error::{AppError, ConvergenceWarning};

pub const TOOL_NAME: &str = "ssmooth";

/// Points in the precomputed evaluation grid.
pub const GRID_POINTS: usize = 101;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplineFile {
    pub tool: String,
    pub created_at: DateTime<Utc>,
    pub knots: KnotSet,
    pub control_points: Vec<Direction>,
    pub lambda: f64,
    pub objective: f64,
    pub fit_quality: FitQuality,
    pub stop: StopReason,
    #[serde(default)]
    pub warning: Option<ConvergenceWarning>,
    pub domain_policy: DomainPolicy,
    pub grid: SplineGrid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplineGrid {
    pub t: Vec<f64>,
    pub points: Vec<Direction>,
}

impl SplineFile {
    pub fn from_fit(fit: &FittedSpline) -> Result<Self, AppError> {
        let t = even_grid(fit.knots.first(), fit.knots.last(), GRID_POINTS);
        let points = fit.evaluate(&t)?;

        Ok(Self {
            tool: TOOL_NAME.to_string(),
            created_at: Utc::now(),
            knots: fit.knots.clone(),
            control_points: fit.control_points.clone(),
            lambda: fit.lambda,
            objective: fit.objective,
            fit_quality: fit.quality.clone(),
            stop: fit.stop,
            warning: fit.warning,
            domain_policy: fit.policy,
            grid: SplineGrid { t, points },
        })
    }

    pub fn into_fitted(self) -> Result<FittedSpline, AppError> {
        if self.control_points.len() != self.knots.len() {
            return Err(AppError::new(
                2,
                format!(
                    "Spline JSON has {} control points for {} knots.",
                    self.control_points.len(),
                    self.knots.len()
                ),
            ));
        }
        Ok(FittedSpline {
            knots: self.knots,
            control_points: self.control_points,
            lambda: self.lambda,
            objective: self.objective,
            quality: self.fit_quality,
            stop: self.stop,
            warning: self.warning,
            policy: self.domain_policy,
        })
    }
}

/// Write a spline JSON file.
pub fn write_spline_json(path: &Path, fit: &FittedSpline) -> Result<(), AppError> {
    let spline = SplineFile::from_fit(fit)?;
    let file = File::create(path).map_err(|e| {
        AppError::new(2, format!("Failed to create spline JSON '{}': {e}", path.display()))
    })?;

    serde_json::to_writer_pretty(file, &spline)
        .map_err(|e| AppError::new(2, format!("Failed to write spline JSON: {e}")))?;

    Ok(())
}

/// Read a spline JSON file.
pub fn read_spline_json(path: &Path) -> Result<SplineFile, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(2, format!("Failed to open spline JSON '{}': {e}", path.display()))
    })?;
    let spline: SplineFile = serde_json::from_reader(file)
        .map_err(|e| AppError::new(2, format!("Invalid spline JSON: {e}")))?;
    Ok(spline)
}

/// `n` evenly spaced values in `[lo, hi]`, endpoints exact.
pub fn even_grid(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    let n = n.max(2);
    let mut out: Vec<f64> = (0..n)
        .map(|i| lo + (hi - lo) * (i as f64 / (n as f64 - 1.0)))
        .collect();
    out[n - 1] = hi;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit() -> FittedSpline {
        let q = |a: f64| Direction::from_xyz(a.cos(), a.sin(), 0.2).unwrap();
        FittedSpline {
            knots: KnotSet::new(vec![0.0, 0.4, 1.0]).unwrap(),
            control_points: vec![q(0.0), q(0.3), q(0.9)],
            lambda: 0.5,
            objective: 1e-3,
            quality: FitQuality {
                rss: 1e-3,
                penalty: None,
                edf: 4.2,
                bic: -12.0,
                n: 30,
                iterations: 7,
                active_knots: None,
            },
            stop: StopReason::Converged,
            warning: None,
            policy: DomainPolicy::Clamp,
        }
    }

    #[test]
    fn json_round_trip_preserves_evaluation() {
        let original = fit();
        let file = SplineFile::from_fit(&original).unwrap();
        assert_eq!(file.grid.t.len(), GRID_POINTS);
        assert_eq!(file.grid.t[GRID_POINTS - 1], 1.0);

        let json = serde_json::to_string(&file).unwrap();
        let back: SplineFile = serde_json::from_str(&json).unwrap();
        let restored = back.into_fitted().unwrap();
        assert_eq!(restored.knots, original.knots);
        assert_eq!(restored.policy, DomainPolicy::Clamp);

        let ts = [0.0, 0.2, 0.4, 0.77, 1.0, 1.5];
        let a = original.evaluate(&ts).unwrap();
        let b = restored.evaluate(&ts).unwrap();
        for (p, q) in a.iter().zip(&b) {
            assert!((p.as_vector() - q.as_vector()).norm() < 1e-14);
        }
    }

    #[test]
    fn control_point_count_is_checked_on_load() {
        let mut file = SplineFile::from_fit(&fit()).unwrap();
        file.control_points.pop();
        assert_eq!(file.into_fitted().unwrap_err().exit_code(), 2);
    }

    #[test]
    fn file_round_trip() {
        let path = std::env::temp_dir().join(format!("ssmooth-curve-{}.json", std::process::id()));
        write_spline_json(&path, &fit()).unwrap();
        let back = read_spline_json(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(back.tool, TOOL_NAME);
        assert_eq!(back.control_points.len(), 3);
    }
}
