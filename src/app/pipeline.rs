//! Shared "fit pipeline" logic.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! CSV ingest or synthetic sample -> knots -> fit/selection -> residuals -> outliers

use std::path::Path;

use crate::data::generate_sample;
use crate::domain::{FitConfig, KnotSet, ObservationResidual, PenaltyGrid, Sample};
use crate::error::AppError;
use crate::fit::{FitOptions, FitOutcome, KnotSpec, PenaltySpec, SelectionOptions};
use crate::io::ingest::{RowError, load_sample};

/// Where the debug bundle lands.
pub const DEBUG_DIR: &str = "debug";

/// All computed outputs of a single `ssmooth fit` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub sample: Sample,
    /// Human-readable description of where the sample came from.
    pub source: String,
    pub row_errors: Vec<RowError>,
    pub knots: KnotSet,
    pub outcome: FitOutcome,
    pub residuals: Vec<ObservationResidual>,
    pub outliers: Vec<ObservationResidual>,
}

/// Execute the full fitting pipeline and return the computed outputs.
pub fn run_fit(config: &FitConfig) -> Result<RunOutput, AppError> {
    // 1) Load or generate observations.
    let (sample, source, row_errors) = match &config.csv_path {
        Some(path) => {
            let ingest = load_sample(path, config.degrees)?;
            (ingest.sample, path.display().to_string(), ingest.row_errors)
        }
        None => {
            let data = generate_sample(&config.sim)?;
            let source = format!(
                "synthetic (n={}, seed={}, noise={})",
                config.sim.n, config.sim.seed, config.sim.noise
            );
            (data.sample, source, Vec::new())
        }
    };

    run_fit_with_sample(config, sample, source, row_errors)
}

/// Execute the fitting pipeline on an already loaded sample.
pub fn run_fit_with_sample(
    config: &FitConfig,
    sample: Sample,
    source: String,
    row_errors: Vec<RowError>,
) -> Result<RunOutput, AppError> {
    // 2) Knots and penalty choice.
    let knot_spec = match &config.interior_knots {
        Some(values) => KnotSpec::Interior(values.clone()),
        None => KnotSpec::Count(config.knot_count),
    };
    let knots = knot_spec.resolve(&sample)?;
    let penalty = penalty_spec(config)?;

    let opts = FitOptions {
        max_iter: config.max_iter,
        tolerance: config.tolerance,
        domain_policy: config.domain_policy,
        prune_below: config.prune_below,
        ..FitOptions::default()
    };
    let sel = SelectionOptions {
        bic_margin: config.bic_margin,
    };

    // 3) Fit (and select).
    let outcome = crate::fit::fit(&sample, &KnotSpec::Explicit(knots.clone()), &penalty, &opts, &sel)?;

    if config.debug_bundle {
        match &outcome {
            FitOutcome::Selection(selection) => {
                crate::debug::write_debug_bundle(Path::new(DEBUG_DIR), &sample, &knots, selection, config)?;
            }
            FitOutcome::Single(_) => log::warn!("debug bundle needs a penalty sweep; skipped"),
        }
    }

    // 4) Residuals and outliers.
    let residuals = crate::report::compute_residuals(&sample, outcome.best())?;
    let outliers = crate::report::rank_outliers(&residuals, config.top_n);

    Ok(RunOutput {
        sample,
        source,
        row_errors,
        knots,
        outcome,
        residuals,
        outliers,
    })
}

fn penalty_spec(config: &FitConfig) -> Result<PenaltySpec, AppError> {
    if let Some(lambda) = config.lambda {
        return Ok(PenaltySpec::Single(lambda));
    }
    let grid = if config.include_zero {
        PenaltyGrid::log_spaced_with_zero(config.lambda_min, config.lambda_max, config.lambda_steps)?
    } else {
        PenaltyGrid::log_spaced(config.lambda_min, config.lambda_max, config.lambda_steps)?
    };
    Ok(PenaltySpec::Grid(grid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DomainPolicy, SimConfig};

    fn config() -> FitConfig {
        FitConfig {
            csv_path: None,
            degrees: false,
            sim: SimConfig {
                n: 30,
                ..SimConfig::default()
            },
            knot_count: 2,
            interior_knots: None,
            lambda: None,
            lambda_min: 1e-3,
            lambda_max: 1.0,
            lambda_steps: 3,
            include_zero: true,
            max_iter: 200,
            tolerance: 1e-9,
            domain_policy: DomainPolicy::Strict,
            bic_margin: 0.0,
            prune_below: None,
            top_n: 5,
            export_results: None,
            export_spline: None,
            debug_bundle: false,
        }
    }

    #[test]
    fn synthetic_run_selects_from_grid() {
        let run = run_fit(&config()).unwrap();
        assert_eq!(run.sample.len(), 30);
        assert_eq!(run.knots.len(), 4);
        assert_eq!(run.residuals.len(), 30);
        assert_eq!(run.outliers.len(), 5);
        assert!(run.source.starts_with("synthetic"));

        let FitOutcome::Selection(sel) = &run.outcome else {
            panic!("expected a selection");
        };
        assert_eq!(sel.fits.len() + sel.skipped.len(), 4);
        assert!(sel.fits.iter().any(|f| f.lambda == sel.best.lambda));
    }

    #[test]
    fn fixed_lambda_skips_selection() {
        let cfg = FitConfig {
            lambda: Some(0.1),
            interior_knots: Some(vec![0.5]),
            ..config()
        };
        let run = run_fit(&cfg).unwrap();
        assert!(matches!(run.outcome, FitOutcome::Single(_)));
        assert_eq!(run.knots.len(), 3);
        assert_eq!(run.outcome.best().lambda, 0.1);
    }

    #[test]
    fn pruning_never_adds_knots() {
        let cfg = FitConfig {
            lambda: Some(1.0),
            knot_count: 4,
            prune_below: Some(1e-4),
            ..config()
        };
        let run = run_fit(&cfg).unwrap();
        let best = run.outcome.best();
        assert!(best.knots.len() <= run.knots.len());
        assert_eq!(best.control_points.len(), best.knots.len());
        assert_eq!(best.knots.first(), run.knots.first());
        assert_eq!(best.knots.last(), run.knots.last());
    }

    #[test]
    fn invalid_grid_is_an_input_error() {
        let cfg = FitConfig {
            lambda_min: -1.0,
            ..config()
        };
        assert_eq!(run_fit(&cfg).unwrap_err().exit_code(), 2);
    }
}
