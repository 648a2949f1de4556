//! Least squares solvers.
//!
//! The fitter repeatedly solves small damped problems of the form:
//!
//! ```text
//! minimize |J δ + r|^2 + μ |δ|^2
//! ```
//!
//! where `J` has one row per residual component and two columns per control
//! point. We stack `sqrt(μ) I` under `J` and solve the tall system with SVD
//! (nalgebra's `QR::solve` is intended for square systems and will panic for
//! non-square matrices).

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Levenberg–Marquardt step: `argmin |J δ + r|^2 + μ |δ|^2`.
pub fn solve_damped(j: &DMatrix<f64>, r: &DVector<f64>, mu: f64) -> Option<DVector<f64>> {
    let (m, p) = j.shape();
    let damp = mu.max(0.0).sqrt();

    let mut a = DMatrix::<f64>::zeros(m + p, p);
    a.view_mut((0, 0), (m, p)).copy_from(j);
    for k in 0..p {
        a[(m + k, k)] = damp;
    }
    let mut b = DVector::<f64>::zeros(m + p);
    for i in 0..m {
        b[i] = -r[i];
    }

    solve_least_squares(&a, &b)
}

/// `tr((H_d + λ H_p + ρ I)^{-1} H_d)`: the trace of the linearized smoother.
pub fn smoother_trace(
    h_data: &DMatrix<f64>,
    h_penalty: &DMatrix<f64>,
    lambda: f64,
    ridge: f64,
) -> Option<f64> {
    let p = h_data.nrows();
    let a = h_data + h_penalty * lambda + DMatrix::<f64>::identity(p, p) * ridge;

    let solved = match a.clone().cholesky() {
        Some(chol) => chol.solve(h_data),
        None => a.pseudo_inverse(1e-12).ok()? * h_data,
    };
    let tr = solved.trace();
    tr.is_finite().then_some(tr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn damped_step_shrinks_toward_zero() {
        let j = DMatrix::<f64>::identity(2, 2);
        let r = DVector::from_row_slice(&[1.0, -2.0]);

        let gn = solve_damped(&j, &r, 0.0).unwrap();
        assert!((gn[0] + 1.0).abs() < 1e-12);
        assert!((gn[1] - 2.0).abs() < 1e-12);

        // (1 + μ) δ = -r
        let lm = solve_damped(&j, &r, 1.0).unwrap();
        assert!((lm[0] + 0.5).abs() < 1e-12);
        assert!((lm[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn smoother_trace_counts_free_parameters() {
        let hd = DMatrix::<f64>::identity(3, 3);
        let hp = DMatrix::<f64>::zeros(3, 3);
        let edf = smoother_trace(&hd, &hp, 0.0, 0.0).unwrap();
        assert!((edf - 3.0).abs() < 1e-12);

        // A heavy penalty on one direction removes it.
        let mut hp = DMatrix::<f64>::zeros(3, 3);
        hp[(0, 0)] = 1.0;
        let edf = smoother_trace(&hd, &hp, 1e9, 0.0).unwrap();
        assert!((edf - 2.0).abs() < 1e-6);
    }
}
