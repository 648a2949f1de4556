//! Penalty selection using BIC.
//!
//! The tool fits every penalty strength on the grid and computes:
//! - RSS (sum of squared geodesic residuals)
//! - effective degrees of freedom of the linearized smoother
//! - BIC = n * ln(RSS/n) + ln(n) * edf
//!
//! Selection rules:
//! 1. Skip grid points whose fit fails geometrically or does not converge
//! 2. Choose the penalty with minimum BIC
//! 3. If another penalty is within `bic_margin` of the best, prefer the larger one

use rayon::prelude::*;

use crate::domain::{FitQuality, FittedSpline, KnotSet, PenaltyGrid, Sample};
use crate::error::{FitFailure, GridFailure, Result, SphereError};
use crate::fit::fitter::{FitOptions, SplineFit, fit_spline, validate_inputs};

/// Floor on `RSS / n` inside the logarithm, so an exact fit stays finite.
pub const RSS_FLOOR: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct SelectionOptions {
    /// BIC window within which the larger penalty wins.
    pub bic_margin: f64,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self { bic_margin: 0.0 }
    }
}

/// Output of the penalty sweep.
#[derive(Debug, Clone)]
pub struct SelectionResult {
    pub best: FittedSpline,
    /// Every converged grid point, in grid order.
    pub fits: Vec<FittedSpline>,
    /// Grid points that were skipped and why.
    pub skipped: Vec<GridFailure>,
}

/// Fit every penalty on the grid (in parallel) and select by BIC.
pub fn select_penalty(
    sample: &Sample,
    knots: &KnotSet,
    grid: &PenaltyGrid,
    opts: &FitOptions,
    sel: &SelectionOptions,
) -> Result<SelectionResult> {
    if !(sel.bic_margin.is_finite() && sel.bic_margin >= 0.0) {
        return Err(SphereError::InvalidInput(format!(
            "bic_margin must be finite and >= 0, got {}",
            sel.bic_margin
        )));
    }
    // Bad options or knots would fail every grid point the same way.
    validate_inputs(sample, knots, opts)?;
    let n = sample.len();

    // Each grid point owns its control points; only the sample and knots are shared.
    let outcomes: Vec<(f64, Result<SplineFit>)> = grid
        .values()
        .par_iter()
        .map(|&lambda| (lambda, fit_spline(sample, knots, lambda, opts)))
        .collect();

    let mut fits = Vec::new();
    let mut skipped = Vec::new();
    for (lambda, outcome) in outcomes {
        let reason = match outcome {
            Ok(fit) => match fit.warning {
                None => {
                    let fitted = to_fitted_spline(fit, n);
                    log::info!(
                        "lambda={:.4e} rss={:.6e} edf={:.3} bic={:.4} iters={}",
                        lambda,
                        fitted.quality.rss,
                        fitted.quality.edf,
                        fitted.quality.bic,
                        fitted.quality.iterations
                    );
                    fits.push(fitted);
                    continue;
                }
                Some(w) => FitFailure::NotConverged(w),
            },
            Err(e) => FitFailure::Geometry(e),
        };
        log::warn!("skipping lambda={lambda:.4e}: {reason}");
        skipped.push(GridFailure { lambda, reason });
    }

    if fits.is_empty() {
        return Err(SphereError::SelectionFailed(skipped));
    }

    let best = select_by_bic(&fits, sel.bic_margin).clone();
    Ok(SelectionResult {
        best,
        fits,
        skipped,
    })
}

pub fn to_fitted_spline(fit: SplineFit, n: usize) -> FittedSpline {
    let bic = bic(n, fit.rss, fit.edf);

    FittedSpline {
        knots: fit.knots,
        control_points: fit.control_points,
        lambda: fit.lambda,
        objective: fit.objective,
        quality: FitQuality {
            rss: fit.rss,
            penalty: fit.penalty,
            edf: fit.edf,
            bic,
            n,
            iterations: fit.iterations,
            active_knots: fit.active_knots,
        },
        stop: fit.stop,
        warning: fit.warning,
        policy: fit.policy,
    }
}

pub fn bic(n: usize, rss: f64, edf: f64) -> f64 {
    let n_f = n as f64;
    let rss_per = (rss / n_f).max(RSS_FLOOR);
    n_f * rss_per.ln() + n_f.ln() * edf
}

/// Minimum BIC; anything within `margin` of it counts as tied and the
/// largest penalty among the tied fits wins.
fn select_by_bic(fits: &[FittedSpline], margin: f64) -> &FittedSpline {
    let best_bic = fits
        .iter()
        .map(|f| f.quality.bic)
        .fold(f64::INFINITY, f64::min);

    let mut chosen = &fits[0];
    let mut found = false;
    for f in fits {
        if f.quality.bic <= best_bic + margin && (!found || f.lambda > chosen.lambda) {
            chosen = f;
            found = true;
        }
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, DomainPolicy, StopReason};

    fn fitted(lambda: f64, bic: f64) -> FittedSpline {
        FittedSpline {
            knots: KnotSet::new(vec![0.0, 1.0]).unwrap(),
            control_points: vec![Direction::from_xyz(0.0, 0.0, 1.0).unwrap(); 2],
            lambda,
            objective: 0.0,
            quality: FitQuality {
                rss: 0.0,
                penalty: Some(0.0),
                edf: 0.0,
                bic,
                n: 10,
                iterations: 0,
                active_knots: Some(0),
            },
            stop: StopReason::Converged,
            warning: None,
            policy: DomainPolicy::Strict,
        }
    }

    #[test]
    fn minimum_bic_wins() {
        let fits = vec![fitted(0.0, 5.0), fitted(1.0, 3.0), fitted(10.0, 4.0)];
        assert_eq!(select_by_bic(&fits, 0.0).lambda, 1.0);
    }

    #[test]
    fn exact_ties_prefer_larger_penalty() {
        let fits = vec![fitted(0.0, 3.0), fitted(1.0, 3.0), fitted(10.0, 4.0)];
        assert_eq!(select_by_bic(&fits, 0.0).lambda, 1.0);
    }

    #[test]
    fn margin_widens_the_tie() {
        let fits = vec![fitted(0.0, 3.0), fitted(1.0, 3.5), fitted(10.0, 4.5)];
        assert_eq!(select_by_bic(&fits, 1.0).lambda, 1.0);
        assert_eq!(select_by_bic(&fits, 2.0).lambda, 10.0);
    }

    #[test]
    fn bic_floors_the_residual() {
        let n = 20;
        let exact = bic(n, 0.0, 2.0);
        let expected = 20.0 * 1e-12f64.ln() + 20f64.ln() * 2.0;
        assert!((exact - expected).abs() < 1e-9);
        assert!(bic(n, 1.0, 2.0) > exact);
    }

    fn equator(angle: f64) -> Direction {
        Direction::from_xyz(angle.cos(), angle.sin(), 0.0).unwrap()
    }

    /// A great circle with a deterministic wobble off the equator.
    fn wobbly_equator(n: usize) -> Sample {
        let t: Vec<f64> = (0..n).map(|i| i as f64 / (n - 1) as f64).collect();
        let y = t
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let theta = std::f64::consts::FRAC_PI_2 + 0.01 * (7.0 * i as f64).sin();
                Direction::from_spherical(theta, 1.5 * s).unwrap()
            })
            .collect();
        Sample::new(t, y).unwrap()
    }

    #[test]
    fn exact_great_circle_prefers_largest_penalty() {
        let t: Vec<f64> = (0..20).map(|i| i as f64 / 19.0).collect();
        let y = t.iter().map(|&s| equator(s)).collect();
        let sample = Sample::new(t, y).unwrap();
        let knots = KnotSet::quantile(&sample, 1).unwrap();
        let grid = PenaltyGrid::new(vec![0.0, 1e-3, 1.0, 1e3]).unwrap();

        let sel = select_penalty(&sample, &knots, &grid, &FitOptions::default(), &SelectionOptions::default())
            .unwrap();
        assert_eq!(sel.fits.len(), 4);
        assert!(sel.skipped.is_empty());
        for f in &sel.fits {
            assert!(f.quality.rss < 1e-20);
            assert_eq!(f.quality.iterations, 0);
        }
        // Every fit is exact, so the smallest edf (largest penalty) wins.
        assert_eq!(sel.best.lambda, 1e3);
    }

    #[test]
    fn stiff_spline_matches_single_geodesic() {
        let sample = wobbly_equator(40);
        let geodesic = KnotSet::quantile(&sample, 0).unwrap();
        let knotted = KnotSet::quantile(&sample, 3).unwrap();
        let opts = FitOptions::default();

        let plain = to_fitted_spline(fit_spline(&sample, &geodesic, 0.0, &opts).unwrap(), sample.len());
        let stiff = to_fitted_spline(fit_spline(&sample, &knotted, 1e4, &opts).unwrap(), sample.len());
        assert!(stiff.converged());

        let ts: Vec<f64> = (0..=20).map(|i| i as f64 / 20.0).collect();
        let a = plain.evaluate(&ts).unwrap();
        let b = stiff.evaluate(&ts).unwrap();
        for (p, q) in a.iter().zip(&b) {
            assert!(crate::math::geodesic::distance(p, q) < 0.02);
        }
    }

    #[test]
    fn rss_grows_and_penalty_shrinks_with_lambda() {
        let t: Vec<f64> = (0..30).map(|i| i as f64 / 29.0).collect();
        let y = t
            .iter()
            .map(|&s| Direction::from_spherical(0.9, 2.0 * s).unwrap())
            .collect();
        let sample = Sample::new(t, y).unwrap();
        let knots = KnotSet::quantile(&sample, 3).unwrap();
        let grid = PenaltyGrid::new(vec![1e-2, 1e-1, 1.0, 10.0]).unwrap();

        let sel = select_penalty(&sample, &knots, &grid, &FitOptions::default(), &SelectionOptions::default())
            .unwrap();
        assert_eq!(sel.fits.len(), 4);
        let slack = |v: f64| 1e-12 + 1e-6 * v.abs();
        for w in sel.fits.windows(2) {
            let (lo, hi) = (&w[0].quality, &w[1].quality);
            assert!(hi.rss + slack(lo.rss) >= lo.rss);
            assert!(hi.penalty.unwrap() <= lo.penalty.unwrap() + slack(lo.penalty.unwrap()));
        }
    }

    #[test]
    fn antipodal_grid_point_is_skipped() {
        let mut t = vec![0.0, 0.25, 0.5, 0.75];
        let mut y: Vec<Direction> = t.iter().map(|&s| equator(-0.4 + 0.4 * s)).collect();
        for i in 0..5 {
            let s = 2.0 + 0.25 * i as f64;
            t.push(s);
            y.push(equator(std::f64::consts::PI + 0.4 * (s - 2.0)));
        }
        let sample = Sample::new(t, y).unwrap();
        let knots = KnotSet::new(vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        let opts = FitOptions {
            initial_control_points: Some(vec![
                equator(-0.4),
                equator(0.0),
                equator(std::f64::consts::PI),
                equator(std::f64::consts::PI + 0.4),
            ]),
            ..FitOptions::default()
        };
        let grid = PenaltyGrid::new(vec![0.0, 1.0]).unwrap();

        let sel = select_penalty(&sample, &knots, &grid, &opts, &SelectionOptions::default()).unwrap();
        assert_eq!(sel.best.lambda, 0.0);
        assert_eq!(sel.best.quality.penalty, None);
        assert_eq!(sel.skipped.len(), 1);
        assert_eq!(sel.skipped[0].lambda, 1.0);
        assert!(matches!(
            sel.skipped[0].reason,
            FitFailure::Geometry(SphereError::AmbiguousGeodesic { .. })
        ));
    }

    #[test]
    fn negative_margin_is_rejected() {
        let t: Vec<f64> = (0..5).map(|i| i as f64).collect();
        let y = vec![Direction::from_xyz(1.0, 0.0, 0.0).unwrap(); 5];
        let sample = Sample::new(t, y).unwrap();
        let knots = KnotSet::quantile(&sample, 1).unwrap();
        let grid = PenaltyGrid::new(vec![0.0]).unwrap();
        let sel = SelectionOptions { bic_margin: -1.0 };
        assert!(matches!(
            select_penalty(&sample, &knots, &grid, &FitOptions::default(), &sel),
            Err(SphereError::InvalidInput(_))
        ));
    }

    #[test]
    fn opposite_outlier_does_not_empty_the_grid() {
        let h = std::f64::consts::FRAC_1_SQRT_2;
        let y = vec![
            equator(0.0),
            Direction::from_xyz(-h, -h, 0.0).unwrap(),
            equator(std::f64::consts::FRAC_PI_2),
        ];
        let sample = Sample::new(vec![0.0, 0.5, 1.0], y).unwrap();
        let knots = KnotSet::quantile(&sample, 0).unwrap();
        let grid = PenaltyGrid::new(vec![0.0, 1.0]).unwrap();

        let sel = select_penalty(&sample, &knots, &grid, &FitOptions::default(), &SelectionOptions::default())
            .unwrap();
        assert!(sel.skipped.iter().all(|g| !matches!(
            g.reason,
            FitFailure::Geometry(SphereError::AmbiguousGeodesic { .. })
        )));
        assert!(!sel.fits.is_empty());
    }

    #[test]
    fn shared_input_errors_fail_before_the_sweep() {
        let t: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let y = t.iter().map(|&s| equator(0.1 * s)).collect();
        let sample = Sample::new(t, y).unwrap();
        let grid = PenaltyGrid::new(vec![0.0, 1.0]).unwrap();

        let short = KnotSet::new(vec![0.0, 2.0]).unwrap();
        assert!(matches!(
            select_penalty(&sample, &short, &grid, &FitOptions::default(), &SelectionOptions::default()),
            Err(SphereError::OutOfDomain { .. })
        ));

        let knots = KnotSet::quantile(&sample, 1).unwrap();
        let opts = FitOptions {
            max_iter: 0,
            ..FitOptions::default()
        };
        assert!(matches!(
            select_penalty(&sample, &knots, &grid, &opts, &SelectionOptions::default()),
            Err(SphereError::InvalidInput(_))
        ));
    }
}
