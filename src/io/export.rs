//! Export per-observation results to CSV.
//!
//! The export is meant to be easy to consume in spreadsheets or downstream scripts.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::{ObservationResidual, Sample};
use crate::error::AppError;

pub const RESULTS_HEADER: &str =
    "t,theta_obs,phi_obs,theta_fit,phi_fit,x_obs,y_obs,z_obs,x_fit,y_fit,z_fit,residual";

/// Write per-observation results to a CSV file.
pub fn write_results_csv(path: &Path, residuals: &[ObservationResidual]) -> Result<(), AppError> {
    let mut file = File::create(path).map_err(|e| {
        AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display()))
    })?;
    write_results(&mut file, residuals)
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV: {e}")))
}

/// Write a sample as `t,theta,phi` (radians), the layout `load_sample` reads.
pub fn write_sample_csv<W: Write>(out: &mut W, sample: &Sample) -> Result<(), AppError> {
    write_sample(out, sample).map_err(|e| AppError::new(2, format!("Failed to write sample CSV: {e}")))
}

fn write_sample<W: Write>(out: &mut W, sample: &Sample) -> std::io::Result<()> {
    writeln!(out, "t,theta,phi")?;
    for (t, y) in sample.t().iter().zip(sample.y()) {
        let (theta, phi) = y.to_spherical();
        writeln!(out, "{t},{theta:.15},{phi:.15}")?;
    }
    Ok(())
}

fn write_results<W: Write>(out: &mut W, residuals: &[ObservationResidual]) -> std::io::Result<()> {
    writeln!(out, "{RESULTS_HEADER}")?;
    for r in residuals {
        let (to, po) = r.observed.to_spherical();
        let (tf, pf) = r.fitted.to_spherical();
        let o = r.observed.as_vector();
        let f = r.fitted.as_vector();
        writeln!(
            out,
            "{},{:.12},{:.12},{:.12},{:.12},{:.12},{:.12},{:.12},{:.12},{:.12},{:.12},{:.6e}",
            r.t, to, po, tf, pf, o.x, o.y, o.z, f.x, f.y, f.z, r.residual
        )?;
    }
    Ok(())
}
