//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - loads or generates observations
//! - runs spline fitting + penalty selection
//! - prints reports
//! - writes optional exports

use std::fs::File;
use std::io::Write;

use clap::Parser;

use crate::cli::{Cli, Command, EvalArgs, FitArgs, SimArgs, SimulateArgs};
use crate::domain::{FitConfig, SimConfig};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `ssmooth` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Eval(args) => handle_eval(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

/// `warn` by default, `info` with `--verbose`; `RUST_LOG` wins over both.
fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    // A second init (e.g. from tests) is harmless.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .try_init();
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args);
    let run = pipeline::run_fit(&config)?;

    if !run.row_errors.is_empty() {
        eprintln!("Skipped {} malformed row(s).", run.row_errors.len());
    }

    println!(
        "{}",
        crate::report::format_run_summary(&run.source, &run.sample, &run.outcome)
    );
    if config.top_n > 0 {
        println!("{}", crate::report::format_outliers(&run.outliers));
    }

    // Optional exports.
    if let Some(path) = &config.export_results {
        crate::io::export::write_results_csv(path, &run.residuals)?;
        log::info!("results written to {}", path.display());
    }
    if let Some(path) = &config.export_spline {
        crate::io::curve::write_spline_json(path, run.outcome.best())?;
        log::info!("spline written to {}", path.display());
    }

    Ok(())
}

fn handle_eval(args: EvalArgs) -> Result<(), AppError> {
    let file = crate::io::curve::read_spline_json(&args.spline)?;
    let mut fit = file.into_fitted()?;
    if let Some(policy) = args.domain_policy {
        fit.policy = policy;
    }

    let ts = match (args.t, args.grid) {
        (Some(ts), _) => ts,
        (None, Some(n)) => crate::io::curve::even_grid(fit.knots.first(), fit.knots.last(), n),
        (None, None) => crate::io::curve::even_grid(
            fit.knots.first(),
            fit.knots.last(),
            crate::io::curve::GRID_POINTS,
        ),
    };
    let points = fit.evaluate(&ts)?;

    println!("t,theta,phi,x,y,z");
    for (t, p) in ts.iter().zip(&points) {
        let (theta, phi) = p.to_spherical();
        let [x, y, z] = p.to_array();
        println!("{t},{theta:.12},{phi:.12},{x:.12},{y:.12},{z:.12}");
    }
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let data = crate::data::generate_sample(&sim_config_from_args(&args.sim))?;
    log::info!(
        "simulated {} points, max displacement {:.4} rad",
        data.stats.n_points,
        data.stats.max_noise
    );

    match &args.output {
        Some(path) => {
            let mut file = File::create(path).map_err(|e| {
                AppError::new(2, format!("Failed to create sample CSV '{}': {e}", path.display()))
            })?;
            crate::io::export::write_sample_csv(&mut file, &data.sample)?;
            file.flush()
                .map_err(|e| AppError::new(2, format!("Failed to write sample CSV: {e}")))?;
        }
        None => {
            let stdout = std::io::stdout();
            crate::io::export::write_sample_csv(&mut stdout.lock(), &data.sample)?;
        }
    }
    Ok(())
}

fn sim_config_from_args(args: &SimArgs) -> SimConfig {
    SimConfig {
        n: args.sample_count,
        seed: args.seed,
        noise: args.noise,
        colatitude: args.colatitude,
        arc: args.arc,
        ..SimConfig::default()
    }
}

pub fn fit_config_from_args(args: &FitArgs) -> FitConfig {
    FitConfig {
        csv_path: args.csv.clone(),
        degrees: args.degrees,
        sim: sim_config_from_args(&args.sim),
        knot_count: args.knots,
        interior_knots: args.interior_knots.clone(),
        lambda: args.lambda,
        lambda_min: args.lambda_min,
        lambda_max: args.lambda_max,
        lambda_steps: args.lambda_steps,
        include_zero: !args.no_zero,
        max_iter: args.max_iter,
        tolerance: args.tolerance,
        domain_policy: args.domain_policy,
        bic_margin: args.bic_margin,
        prune_below: args.prune_below,
        top_n: args.top,
        export_results: args.export.clone(),
        export_spline: args.export_spline.clone(),
        debug_bundle: args.debug_bundle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_mirrors_flags() {
        let cli = Cli::parse_from([
            "ssmooth", "fit", "--lambda", "0.5", "--no-zero", "-n", "25", "--top", "3", "--prune-below", "1e-4",
        ]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        let cfg = fit_config_from_args(&args);
        assert_eq!(cfg.lambda, Some(0.5));
        assert!(!cfg.include_zero);
        assert_eq!(cfg.sim.n, 25);
        assert_eq!(cfg.top_n, 3);
        assert_eq!(cfg.prune_below, Some(1e-4));
        assert_eq!(cfg.sim.t_max, 1.0);
    }
}
