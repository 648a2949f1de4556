//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/fitting code stays clean and testable
//! - output changes are localized

use crate::domain::{FittedSpline, ObservationResidual, Sample, StopReason};
use crate::fit::FitOutcome;

/// Format the full run summary (dataset stats + penalty diagnostics + chosen fit).
pub fn format_run_summary(source: &str, sample: &Sample, outcome: &FitOutcome) -> String {
    let mut out = String::new();
    let (t_min, t_max) = sample.span();

    out.push_str("=== ssmooth - penalized spherical spline ===\n");
    out.push_str(&format!("Source: {source}\n"));
    out.push_str(&format!(
        "Points: n={} | t=[{:.4}, {:.4}]\n",
        sample.len(),
        t_min,
        t_max
    ));

    match outcome {
        FitOutcome::Single(fit) => {
            out.push_str("\nFixed penalty (no selection).\n");
            if let Some(w) = &fit.warning {
                out.push_str(&format!("warning: {w}\n"));
            }
        }
        FitOutcome::Selection(sel) => {
            out.push_str("\nPenalty diagnostics:\n");
            out.push_str(&format_score_table(&sel.fits, sel.best.lambda));
            for skipped in &sel.skipped {
                out.push_str(&format!(
                    "  (skipped lambda={:.4e}) {}\n",
                    skipped.lambda, skipped.reason
                ));
            }
        }
    }

    let best = outcome.best();
    out.push_str("\nChosen fit:\n");
    out.push_str(&format!("- lambda: {:.6e}\n", best.lambda));
    out.push_str(&format!("- knots : {}\n", fmt_vec(best.knots.values())));
    out.push_str(&format!(
        "- rss={:.6e} penalty={} edf={:.3} bic={:.3}\n",
        best.quality.rss,
        fmt_opt(best.quality.penalty),
        best.quality.edf,
        best.quality.bic
    ));
    out.push_str(&format!(
        "- active knots: {} of {} | iterations: {} | stop: {}\n",
        best.quality
            .active_knots
            .map(|k| k.to_string())
            .unwrap_or_else(|| "-".to_string()),
        best.knots.len().saturating_sub(2),
        best.quality.iterations,
        stop_label(best.stop)
    ));
    out.push_str("- control points (theta, phi):\n");
    for (k, c) in best.knots.values().iter().zip(&best.control_points) {
        let (theta, phi) = c.to_spherical();
        out.push_str(&format!("    t={k:<10.4} ({theta:.6}, {phi:.6})\n"));
    }
    out.push('\n');

    out
}

/// One row per scored penalty; `*` marks the chosen one.
pub fn format_score_table(fits: &[FittedSpline], chosen: f64) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "  {:>12} {:>14} {:>12} {:>8} {:>12} {:>6}\n",
            "lambda", "rss", "penalty", "edf", "bic", "iters"
        )
        .as_str(),
    );
    for fit in fits {
        let mark = if fit.lambda == chosen { "*" } else { " " };
        out.push_str(&format!(
            "{mark} {:>12.4e} {:>14.6e} {:>12} {:>8.3} {:>12.3} {:>6}\n",
            fit.lambda,
            fit.quality.rss,
            fmt_opt(fit.quality.penalty),
            fit.quality.edf,
            fit.quality.bic,
            fit.quality.iterations
        ));
    }
    out
}

/// Format the largest-residual table.
pub fn format_outliers(rows: &[ObservationResidual]) -> String {
    let mut out = String::new();

    out.push_str("Largest residuals:\n");
    out.push_str(
        format!(
            "{:>10} {:>10} {:>10} {:>10} {:>10} {:>12}\n",
            "t", "theta_obs", "phi_obs", "theta_fit", "phi_fit", "residual"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<10} {:-<10} {:-<10} {:-<10} {:-<10} {:-<12}\n",
            "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for r in rows {
        let (to, po) = r.observed.to_spherical();
        let (tf, pf) = r.fitted.to_spherical();
        out.push_str(
            format!(
                "{:>10.4} {:>10.5} {:>10.5} {:>10.5} {:>10.5} {:>12.4e}\n",
                r.t, to, po, tf, pf, r.residual
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

fn stop_label(stop: StopReason) -> &'static str {
    match stop {
        StopReason::Converged => "converged",
        StopReason::Stalled => "stalled",
        StopReason::MaxIterReached => "max-iter",
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.4e}")).unwrap_or_else(|| "-".to_string())
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.6}")).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, DomainPolicy, FitQuality, KnotSet};

    fn fitted(lambda: f64, bic: f64) -> FittedSpline {
        FittedSpline {
            knots: KnotSet::new(vec![0.0, 0.5, 1.0]).unwrap(),
            control_points: vec![Direction::from_xyz(1.0, 0.0, 0.0).unwrap(); 3],
            lambda,
            objective: 0.0,
            quality: FitQuality {
                rss: 0.01,
                penalty: if lambda == 0.0 { None } else { Some(0.2) },
                edf: 3.5,
                bic,
                n: 20,
                iterations: 4,
                active_knots: Some(1),
            },
            stop: StopReason::Converged,
            warning: None,
            policy: DomainPolicy::Strict,
        }
    }

    #[test]
    fn score_table_marks_chosen_row() {
        let table = format_score_table(&[fitted(0.0, 1.0), fitted(0.5, -2.0)], 0.5);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with(' '));
        assert!(lines[2].starts_with('*'));
        assert!(lines[1].contains(" - "));
    }

    #[test]
    fn outlier_table_has_header_and_rows() {
        let d = Direction::from_xyz(0.0, 1.0, 0.0).unwrap();
        let rows = vec![ObservationResidual {
            t: 0.25,
            observed: d,
            fitted: d,
            residual: 0.0,
        }];
        let text = format_outliers(&rows);
        assert_eq!(text.lines().count(), 4);
        assert!(text.lines().nth(3).unwrap().trim_start().starts_with("0.2500"));
    }

    #[test]
    fn summary_lists_control_points() {
        let sample = Sample::new(
            vec![0.0, 1.0],
            vec![Direction::from_xyz(1.0, 0.0, 0.0).unwrap(); 2],
        )
        .unwrap();
        let text = format_run_summary("test", &sample, &FitOutcome::Single(fitted(0.5, 0.0)));
        assert!(text.contains("Source: test"));
        assert!(text.contains("active knots: 1 of 1"));
        assert_eq!(text.matches("    t=").count(), 3);
    }
}
