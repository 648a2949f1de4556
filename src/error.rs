//! Error types.
//!
//! Two layers:
//!
//! - [`SphereError`]: the library taxonomy (geometry preconditions, data
//!   sufficiency, fit failures). Geometry errors are surfaced to the caller of
//!   the offending primitive and never approximated away.
//! - [`AppError`]: what the binary prints, carrying a process exit code.
//!
//! Non-convergence is not an error: it travels as a [`ConvergenceWarning`]
//! attached to the fit that produced it.

use serde::{Deserialize, Serialize};

/// Library error taxonomy.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SphereError {
    #[error("degenerate vector: norm {norm:e} is below tolerance {tolerance:e}")]
    DegenerateInput { norm: f64, tolerance: f64 },

    #[error("shape mismatch: {left} rows vs {right} rows")]
    ShapeMismatch { left: usize, right: usize },

    #[error("vector is not tangent to its base point: |<p, v>| = {inner:e}")]
    NonTangentInput { inner: f64 },

    #[error("geodesic between (near-)antipodal points is ambiguous (separation {separation:.12} rad)")]
    AmbiguousGeodesic { separation: f64 },

    #[error("t = {t} lies outside the knot span [{lo}, {hi}]")]
    OutOfDomain { t: f64, lo: f64, hi: f64 },

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("numerical failure: {0}")]
    Numerical(String),

    #[error("every penalty on the grid failed ({} grid points)", .0.len())]
    SelectionFailed(Vec<GridFailure>),
}

pub type Result<T> = std::result::Result<T, SphereError>;

/// Iteration budget exhausted before the objective settled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceWarning {
    pub iterations: usize,
    pub last_objective: f64,
}

impl std::fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "no convergence after {} iterations (objective {:.6e})",
            self.iterations, self.last_objective
        )
    }
}

/// Why a grid point was excluded from selection.
#[derive(Debug, Clone, PartialEq)]
pub enum FitFailure {
    Geometry(SphereError),
    NotConverged(ConvergenceWarning),
}

impl std::fmt::Display for FitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitFailure::Geometry(e) => write!(f, "{e}"),
            FitFailure::NotConverged(w) => write!(f, "{w}"),
        }
    }
}

/// A skipped grid point.
#[derive(Debug, Clone, PartialEq)]
pub struct GridFailure {
    pub lambda: f64,
    pub reason: FitFailure,
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<SphereError> for AppError {
    fn from(err: SphereError) -> Self {
        let exit_code = match &err {
            SphereError::DegenerateInput { .. }
            | SphereError::ShapeMismatch { .. }
            | SphereError::NonTangentInput { .. }
            | SphereError::InvalidInput(_)
            | SphereError::OutOfDomain { .. } => 2,
            SphereError::InsufficientData(_) => 3,
            SphereError::AmbiguousGeodesic { .. }
            | SphereError::Numerical(_)
            | SphereError::SelectionFailed(_) => 4,
        };

        let mut message = err.to_string();
        if let SphereError::SelectionFailed(failures) = &err {
            for f in failures {
                message.push_str(&format!("\n  lambda={:.6e}: {}", f.lambda, f.reason));
            }
        }
        AppError::new(exit_code, message)
    }
}
