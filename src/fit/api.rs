//! Fitting entry point.
//!
//! One call covers the knot choices (count, interior values, full set) and the
//! penalty choices (a single strength or a BIC sweep).

use crate::domain::{FittedSpline, KnotSet, PenaltyGrid, Sample};
use crate::error::Result;
use crate::fit::fitter::{FitOptions, fit_spline};
use crate::fit::selection::{SelectionOptions, SelectionResult, select_penalty, to_fitted_spline};

/// How the knot set is obtained.
#[derive(Debug, Clone)]
pub enum KnotSpec {
    /// `k` interior knots at quantiles of `t`.
    Count(usize),
    /// Interior knots; the boundary knots come from the sample span.
    Interior(Vec<f64>),
    Explicit(KnotSet),
}

impl KnotSpec {
    pub fn resolve(&self, sample: &Sample) -> Result<KnotSet> {
        match self {
            KnotSpec::Count(k) => KnotSet::quantile(sample, *k),
            KnotSpec::Interior(values) => KnotSet::from_interior(sample, values),
            KnotSpec::Explicit(knots) => Ok(knots.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum PenaltySpec {
    Single(f64),
    Grid(PenaltyGrid),
}

#[derive(Debug, Clone)]
pub enum FitOutcome {
    /// A single-penalty fit; a `ConvergenceWarning` may be attached.
    Single(FittedSpline),
    Selection(SelectionResult),
}

impl FitOutcome {
    pub fn best(&self) -> &FittedSpline {
        match self {
            FitOutcome::Single(fit) => fit,
            FitOutcome::Selection(sel) => &sel.best,
        }
    }

    pub fn into_best(self) -> FittedSpline {
        match self {
            FitOutcome::Single(fit) => fit,
            FitOutcome::Selection(sel) => sel.best,
        }
    }
}

pub fn fit(
    sample: &Sample,
    knots: &KnotSpec,
    penalty: &PenaltySpec,
    opts: &FitOptions,
    sel: &SelectionOptions,
) -> Result<FitOutcome> {
    let knots = knots.resolve(sample)?;
    log::info!(
        "fitting n={} observations with {} knots",
        sample.len(),
        knots.len()
    );

    match penalty {
        PenaltySpec::Single(lambda) => {
            let raw = fit_spline(sample, &knots, *lambda, opts)?;
            Ok(FitOutcome::Single(to_fitted_spline(raw, sample.len())))
        }
        PenaltySpec::Grid(grid) => {
            let result = select_penalty(sample, &knots, grid, opts, sel)?;
            log::info!(
                "selected lambda={:.4e} (bic={:.4}) from {} converged / {} skipped",
                result.best.lambda,
                result.best.quality.bic,
                result.fits.len(),
                result.skipped.len()
            );
            Ok(FitOutcome::Selection(result))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Direction;

    fn sample() -> Sample {
        let t: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let y = t
            .iter()
            .map(|&s| Direction::from_spherical(1.0, 0.1 * s).unwrap())
            .collect();
        Sample::new(t, y).unwrap()
    }

    #[test]
    fn knot_specs_resolve_against_the_sample() {
        let s = sample();
        assert_eq!(KnotSpec::Count(0).resolve(&s).unwrap().values(), &[0.0, 11.0]);
        assert_eq!(
            KnotSpec::Interior(vec![4.0, 7.5]).resolve(&s).unwrap().values(),
            &[0.0, 4.0, 7.5, 11.0]
        );
        let explicit = KnotSet::new(vec![-1.0, 20.0]).unwrap();
        assert_eq!(KnotSpec::Explicit(explicit.clone()).resolve(&s).unwrap(), explicit);
    }

    #[test]
    fn single_penalty_returns_a_scored_fit() {
        let s = sample();
        let out = fit(
            &s,
            &KnotSpec::Count(1),
            &PenaltySpec::Single(0.5),
            &FitOptions::default(),
            &SelectionOptions::default(),
        )
        .unwrap();
        let best = out.best();
        assert!(matches!(out, FitOutcome::Single(_)));
        assert_eq!(best.lambda, 0.5);
        assert!(best.quality.bic.is_finite());
        assert_eq!(best.quality.n, 12);
    }
}
