//! Command-line parsing for the spherical spline smoother.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the geometry/fitting code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::DomainPolicy;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "ssmooth",
    version,
    about = "Penalized piecewise-geodesic smoothing of directional data"
)]
pub struct Cli {
    /// Log progress (info level); `RUST_LOG` overrides.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit a spline (CSV or synthetic data), print diagnostics and optionally export.
    Fit(FitArgs),
    /// Evaluate a previously exported spline JSON.
    Eval(EvalArgs),
    /// Write a synthetic sample as CSV.
    Simulate(SimulateArgs),
}

/// Synthetic sample settings (used when no CSV is given).
#[derive(Debug, Args, Clone)]
pub struct SimArgs {
    /// Number of synthetic observations.
    #[arg(short = 'n', long, default_value_t = 60)]
    pub sample_count: usize,

    /// Random seed for sample generation.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Tangent-plane noise standard deviation (radians).
    #[arg(long, default_value_t = 0.01)]
    pub noise: f64,

    /// Colatitude of the synthetic track (radians).
    #[arg(long, default_value_t = 1.2)]
    pub colatitude: f64,

    /// Azimuth swept by the synthetic track (radians).
    #[arg(long, default_value_t = 1.5)]
    pub arc: f64,
}

/// Options for fitting.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Observations CSV (`t,theta,phi` or `t,x,y,z`). Synthetic data when omitted.
    #[arg(long, value_name = "CSV")]
    pub csv: Option<PathBuf>,

    /// Interpret `theta`/`phi` columns as degrees.
    #[arg(long)]
    pub degrees: bool,

    #[command(flatten)]
    pub sim: SimArgs,

    /// Number of interior knots placed at quantiles of `t`.
    #[arg(short = 'k', long, default_value_t = 4)]
    pub knots: usize,

    /// Explicit interior knots (comma-separated); overrides `--knots`.
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub interior_knots: Option<Vec<f64>>,

    /// Fit a single penalty strength instead of selecting one.
    #[arg(long)]
    pub lambda: Option<f64>,

    /// Smallest penalty on the selection grid.
    #[arg(long, default_value_t = 1e-4)]
    pub lambda_min: f64,

    /// Largest penalty on the selection grid.
    #[arg(long, default_value_t = 1e2)]
    pub lambda_max: f64,

    /// Log-spaced grid steps between `--lambda-min` and `--lambda-max`.
    #[arg(long, default_value_t = 13)]
    pub lambda_steps: usize,

    /// Leave the unpenalized fit (lambda = 0) off the grid.
    #[arg(long)]
    pub no_zero: bool,

    /// Iteration cap per penalty.
    #[arg(long, default_value_t = 200)]
    pub max_iter: usize,

    /// Relative objective decrease that counts as converged.
    #[arg(long, default_value_t = 1e-9)]
    pub tolerance: f64,

    /// What the fitted curve does with `t` outside its knot span.
    #[arg(long, value_enum, default_value_t = DomainPolicy::Strict)]
    pub domain_policy: DomainPolicy,

    /// BIC window within which the larger penalty wins.
    #[arg(long, default_value_t = 0.0)]
    pub bic_margin: f64,

    /// Drop interior knots whose weighted velocity jump falls below this value.
    #[arg(long)]
    pub prune_below: Option<f64>,

    /// Show the top-N largest residuals.
    #[arg(long, default_value_t = 10)]
    pub top: usize,

    /// Export per-observation results to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export the chosen spline (knots + control points + grid) to JSON.
    #[arg(long = "export-spline")]
    pub export_spline: Option<PathBuf>,

    /// Write a markdown debug bundle of the penalty sweep under `./debug`.
    #[arg(long)]
    pub debug_bundle: bool,
}

/// Options for evaluating a saved spline.
#[derive(Debug, Args)]
pub struct EvalArgs {
    /// Spline JSON file produced by `ssmooth fit --export-spline`.
    #[arg(long, value_name = "JSON")]
    pub spline: PathBuf,

    /// Domain values to evaluate at (comma-separated).
    #[arg(long, value_delimiter = ',', num_args = 1.., conflicts_with = "grid")]
    pub t: Option<Vec<f64>>,

    /// Evaluate on an even grid of this many points over the knot span.
    #[arg(long)]
    pub grid: Option<usize>,

    /// Override the domain policy stored in the file.
    #[arg(long, value_enum)]
    pub domain_policy: Option<DomainPolicy>,
}

/// Options for writing a synthetic sample.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub sim: SimArgs,

    /// Output CSV (stdout when omitted).
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_defaults_parse() {
        let cli = Cli::parse_from(["ssmooth", "fit"]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.knots, 4);
        assert!(args.csv.is_none());
        assert_eq!(args.domain_policy, DomainPolicy::Strict);
        assert!(!cli.verbose);
    }

    #[test]
    fn interior_knots_are_comma_separated() {
        let cli = Cli::parse_from(["ssmooth", "-v", "fit", "--interior-knots", "0.2,0.5", "--domain-policy", "clamp"]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.interior_knots, Some(vec![0.2, 0.5]));
        assert_eq!(args.domain_policy, DomainPolicy::Clamp);
        assert!(cli.verbose);
    }

    #[test]
    fn eval_rejects_t_with_grid() {
        let res = Cli::try_parse_from(["ssmooth", "eval", "--spline", "a.json", "--t", "0.1", "--grid", "5"]);
        assert!(res.is_err());
    }
}
