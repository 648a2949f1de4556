//! Debug bundle writer for inspecting a penalty sweep.
//!
//! The bundle is a single markdown file with the run settings, the sample,
//! every scored and skipped penalty and each converged curve on a shared grid.

use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::domain::{FitConfig, FittedSpline, KnotSet, Sample};
use crate::error::AppError;
use crate::fit::SelectionResult;
use crate::io::curve::even_grid;

/// Rows in the curve grid section.
const GRID_ROWS: usize = 21;

pub fn write_debug_bundle(
    dir: &Path,
    sample: &Sample,
    knots: &KnotSet,
    selection: &SelectionResult,
    config: &FitConfig,
) -> Result<PathBuf, AppError> {
    create_dir_all(dir).map_err(|e| AppError::new(4, format!("Failed to create debug dir: {e}")))?;

    let ts = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("ssmooth_debug_n{}_{}.md", sample.len(), ts));

    let text = render_bundle(sample, knots, selection, config);
    let mut file = File::create(&path)
        .map_err(|e| AppError::new(4, format!("Failed to create debug file: {e}")))?;
    file.write_all(text.as_bytes())
        .map_err(|e| AppError::new(4, format!("Failed to write debug bundle: {e}")))?;

    log::info!("debug bundle written to {}", path.display());
    Ok(path)
}

fn render_bundle(
    sample: &Sample,
    knots: &KnotSet,
    selection: &SelectionResult,
    config: &FitConfig,
) -> String {
    let mut out = String::new();

    out.push_str("# ssmooth debug bundle\n");
    out.push_str(&format!("- generated: {}\n", Local::now().to_rfc3339()));
    match &config.csv_path {
        Some(p) => out.push_str(&format!("- source: {}\n", p.display())),
        None => out.push_str(&format!(
            "- source: synthetic (seed={}, noise={:.4}, colatitude={:.4}, arc={:.4})\n",
            config.sim.seed, config.sim.noise, config.sim.colatitude, config.sim.arc
        )),
    }
    out.push_str(&format!("- n: {}\n", sample.len()));
    out.push_str(&format!("- knots: {}\n", fmt_vec(knots.values())));
    out.push_str(&format!(
        "- lambda grid: [{:.3e}, {:.3e}] x {} (zero included: {})\n",
        config.lambda_min, config.lambda_max, config.lambda_steps, config.include_zero
    ));
    out.push_str(&format!(
        "- max_iter={} tolerance={:.1e} policy={:?} bic_margin={} prune_below={:?}\n",
        config.max_iter, config.tolerance, config.domain_policy, config.bic_margin, config.prune_below
    ));

    out.push_str("\n## Sample points\n");
    out.push_str("| t | theta | phi |\n| - | - | - |\n");
    for (t, y) in sample.t().iter().zip(sample.y()) {
        let (theta, phi) = y.to_spherical();
        out.push_str(&format!("| {t:.6} | {theta:.6} | {phi:.6} |\n"));
    }

    out.push_str("\n## Penalty sweep\n");
    out.push_str("| lambda | rss | penalty | edf | bic | iters | active | chosen |\n");
    out.push_str("| - | - | - | - | - | - | - | - |\n");
    for fit in &selection.fits {
        let chosen = if fit.lambda == selection.best.lambda { "*" } else { "" };
        out.push_str(&format!(
            "| {:.4e} | {:.6e} | {} | {:.3} | {:.3} | {} | {} | {} |\n",
            fit.lambda,
            fit.quality.rss,
            fmt_opt(fit.quality.penalty),
            fit.quality.edf,
            fit.quality.bic,
            fit.quality.iterations,
            fit.quality
                .active_knots
                .map(|k| k.to_string())
                .unwrap_or_else(|| "-".to_string()),
            chosen
        ));
    }
    for skipped in &selection.skipped {
        out.push_str(&format!("- skipped {:.4e}: {}\n", skipped.lambda, skipped.reason));
    }

    out.push_str("\n## Curve grid (theta, phi)\n");
    out.push_str("| t |");
    for fit in &selection.fits {
        out.push_str(&format!(" {:.3e} |", fit.lambda));
    }
    out.push_str("\n| - |");
    for _ in &selection.fits {
        out.push_str(" - |");
    }
    out.push('\n');

    let ts = even_grid(knots.first(), knots.last(), GRID_ROWS);
    let columns: Vec<Option<Vec<[f64; 2]>>> = selection
        .fits
        .iter()
        .map(|fit: &FittedSpline| fit.evaluate_spherical(&ts).ok())
        .collect();
    for (row, t) in ts.iter().enumerate() {
        out.push_str(&format!("| {t:.4} |"));
        for col in &columns {
            match col {
                Some(points) => {
                    let [theta, phi] = points[row];
                    out.push_str(&format!(" {theta:.4}, {phi:.4} |"));
                }
                None => out.push_str(" - |"),
            }
        }
        out.push('\n');
    }

    out
}

fn fmt_vec(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{v:.6}")).collect();
    format!("[{}]", parts.join(", "))
}

fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{v:.4e}"),
        _ => "-".to_string(),
    }
}
