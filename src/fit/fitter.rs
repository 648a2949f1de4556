//! Penalized fitting of a piecewise geodesic for one penalty strength.
//!
//! Given:
//! - a sample `(t_i, y_i)`
//! - a knot set `κ_1 < ... < κ_K`
//! - a penalty strength `λ >= 0`
//!
//! we look for control points `C` minimizing
//!
//! ```text
//! Σ_i d(γ_C(t_i), y_i)^2 + λ Σ_j |jump_j|^2
//! ```
//!
//! with a Riemannian Levenberg–Marquardt iteration:
//!
//! - each control point moves in its own tangent plane (2 coordinates)
//! - residuals are `log_{γ(t_i)}(y_i)` (norm = geodesic distance) and
//!   `sqrt(λ) · jump_j`
//! - the Jacobian is taken by central differences through `exp_map`
//! - steps are retracted back onto the sphere through `exp_map`
//!
//! `λ = 0` drops the penalty rows entirely, so a curve whose empty segments
//! join (near-)antipodal control points can still be fitted unpenalized.
//!
//! With `prune_below` set (and `λ > 0`), every time the iteration settles the
//! interior knots whose weighted jump `(w_j |jump_j|)^2` is below the threshold
//! are removed together with their control points, and the iteration resumes
//! on the smaller curve. The returned fit carries the pruned knot set.

use nalgebra::{DMatrix, DVector, Vector3};
use std::f64::consts::FRAC_PI_4;

use crate::domain::{Direction, DomainPolicy, KnotSet, Sample, StopReason};
use crate::error::{ConvergenceWarning, Result, SphereError};
use crate::math::geodesic::{exp_map, residual_vector, tangent_basis};
use crate::math::{smoother_trace, solve_damped};
use crate::spline::PiecewiseGeodesic;

/// Objective below which the fit is exact for all practical purposes.
pub const OBJECTIVE_FLOOR: f64 = 1e-24;

/// Weighted jump `(w_j |jump_j|)^2` at or above which a knot counts as active.
pub const ACTIVE_KNOT_THRESHOLD: f64 = 1e-4;

/// Ridge added to the normal matrix when computing effective degrees of freedom.
pub const EDF_RIDGE: f64 = 1e-8;

const MU_INIT: f64 = 1e-3;
const MU_MIN: f64 = 1e-12;
const MU_MAX: f64 = 1e10;
const MU_GROW: f64 = 4.0;
const MU_SHRINK: f64 = 1.0 / 3.0;

/// Fitting options that affect how each penalized fit is run.
#[derive(Debug, Clone)]
pub struct FitOptions {
    /// Accepted iterations before giving up with a `ConvergenceWarning`.
    pub max_iter: usize,
    /// Relative objective decrease below which the fit counts as converged.
    pub tolerance: f64,
    /// Tangent-coordinate step used for the finite-difference Jacobian.
    pub fd_step: f64,
    pub domain_policy: DomainPolicy,
    /// Starting control points (one per knot). When absent, the observation
    /// nearest in `t` to each knot is used.
    pub initial_control_points: Option<Vec<Direction>>,
    /// Drop interior knots whose weighted jump falls below this value.
    pub prune_below: Option<f64>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iter: 200,
            tolerance: 1e-9,
            fd_step: 1e-6,
            domain_policy: DomainPolicy::Strict,
            initial_control_points: None,
            prune_below: None,
        }
    }
}

/// Where a fitter is in its run.
#[derive(Debug, Clone, PartialEq)]
pub enum FitState {
    Initialized,
    Iterating,
    Converged,
    /// No damped step lowers the objective any more.
    Stalled,
    MaxIterReached,
    Failed(SphereError),
}

impl FitState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FitState::Initialized | FitState::Iterating)
    }
}

/// Raw result of one penalized fit.
#[derive(Debug, Clone)]
pub struct SplineFit {
    pub knots: KnotSet,
    pub control_points: Vec<Direction>,
    pub lambda: f64,
    pub objective: f64,
    pub rss: f64,
    /// `Σ |jump_j|^2`; `None` when the jumps are undefined, which only a
    /// `λ = 0` fit can leave behind.
    pub penalty: Option<f64>,
    pub edf: f64,
    pub active_knots: Option<usize>,
    pub iterations: usize,
    pub stop: StopReason,
    pub warning: Option<ConvergenceWarning>,
    pub history: Vec<f64>,
    pub policy: DomainPolicy,
}

/// One penalized fit, advanced explicitly with [`PenalizedFitter::step`].
#[derive(Debug)]
pub struct PenalizedFitter<'a> {
    sample: &'a Sample,
    knots: KnotSet,
    lambda: f64,
    opts: FitOptions,
    control_points: Vec<Direction>,
    state: FitState,
    objective: f64,
    mu: f64,
    iterations: usize,
    history: Vec<f64>,
}

impl<'a> PenalizedFitter<'a> {
    pub fn new(sample: &'a Sample, knots: &KnotSet, lambda: f64, opts: &FitOptions) -> Result<Self> {
        if !(lambda.is_finite() && lambda >= 0.0) {
            return Err(SphereError::InvalidInput(format!(
                "penalty strength must be finite and >= 0, got {lambda}"
            )));
        }
        validate_inputs(sample, knots, opts)?;

        let control_points = match &opts.initial_control_points {
            Some(cps) => cps.clone(),
            None => nearest_observations(sample, knots),
        };

        Ok(Self {
            sample,
            knots: knots.clone(),
            lambda,
            opts: opts.clone(),
            control_points,
            state: FitState::Initialized,
            objective: f64::NAN,
            mu: MU_INIT,
            iterations: 0,
            history: Vec::new(),
        })
    }

    pub fn state(&self) -> &FitState {
        &self.state
    }

    /// Objective at the current control points (`NaN` before the first step).
    pub fn objective(&self) -> f64 {
        self.objective
    }

    /// Objective after initialization, after every accepted iteration and
    /// after every pruning (which can raise it).
    pub fn history(&self) -> &[f64] {
        &self.history
    }

    pub fn control_points(&self) -> &[Direction] {
        &self.control_points
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Advance by one transition. Terminal states are left unchanged.
    pub fn step(&mut self) -> &FitState {
        match self.state {
            FitState::Initialized => self.initialize(),
            FitState::Iterating => self.iterate(),
            _ => {}
        }
        &self.state
    }

    /// Step until a terminal state, then compute diagnostics.
    pub fn run(mut self) -> Result<SplineFit> {
        while !self.state.is_terminal() {
            self.step();
        }
        self.finish()
    }

    fn initialize(&mut self) {
        match self.evaluate(&self.control_points) {
            Ok(r) => {
                self.objective = r.objective();
                self.history.push(self.objective);
                if self.objective < OBJECTIVE_FLOOR {
                    self.settle(FitState::Converged);
                } else {
                    self.state = FitState::Iterating;
                }
            }
            Err(e) => self.state = FitState::Failed(e),
        }
    }

    fn iterate(&mut self) {
        let (jac, r) = match self.jacobian(&self.control_points) {
            Ok(v) => v,
            Err(e) => {
                self.state = FitState::Failed(e);
                return;
            }
        };

        loop {
            if self.mu > MU_MAX {
                log::debug!(
                    "lambda={:.3e}: damping exhausted at objective {:.6e}",
                    self.lambda,
                    self.objective
                );
                self.settle(FitState::Stalled);
                return;
            }

            let Some(delta) = solve_damped(&jac, &r, self.mu) else {
                self.mu *= MU_GROW;
                continue;
            };
            let trial = match self.retract(&self.control_points, &delta) {
                Some(Ok(cps)) => cps,
                _ => {
                    self.mu *= MU_GROW;
                    continue;
                }
            };
            let trial_objective = match self.evaluate(&trial) {
                Ok(res) => res.objective(),
                Err(_) => {
                    self.mu *= MU_GROW;
                    continue;
                }
            };

            if !(trial_objective < self.objective) {
                self.mu *= MU_GROW;
                continue;
            }

            let decrease = (self.objective - trial_objective) / self.objective.max(f64::MIN_POSITIVE);
            self.control_points = trial;
            self.objective = trial_objective;
            self.history.push(trial_objective);
            self.iterations += 1;
            self.mu = (self.mu * MU_SHRINK).max(MU_MIN);

            log::debug!(
                "lambda={:.3e} iter={} objective={:.9e} mu={:.1e}",
                self.lambda,
                self.iterations,
                self.objective,
                self.mu
            );

            if decrease < self.opts.tolerance || self.objective < OBJECTIVE_FLOOR {
                self.settle(FitState::Converged);
            } else if self.iterations >= self.opts.max_iter {
                self.state = FitState::MaxIterReached;
            }
            return;
        }
    }

    /// The iteration came to rest on the current knots. With pruning on,
    /// drop inactive knots and keep iterating; otherwise enter `rest`.
    fn settle(&mut self, rest: FitState) {
        loop {
            match self.prune() {
                Ok(0) => {
                    self.state = rest;
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    self.state = FitState::Failed(e);
                    return;
                }
            }
            match self.evaluate(&self.control_points) {
                Ok(r) => {
                    self.objective = r.objective();
                    self.history.push(self.objective);
                    self.mu = MU_INIT;
                }
                Err(e) => {
                    self.state = FitState::Failed(e);
                    return;
                }
            }
            if self.objective >= OBJECTIVE_FLOOR {
                self.state = FitState::Iterating;
                return;
            }
        }
    }

    /// Remove interior knots below the pruning threshold; returns how many.
    fn prune(&mut self) -> Result<usize> {
        let Some(threshold) = self.opts.prune_below else {
            return Ok(0);
        };
        if self.lambda == 0.0 || self.knots.len() <= 2 {
            return Ok(0);
        }

        let curve = PiecewiseGeodesic::new(
            self.knots.clone(),
            self.control_points.clone(),
            self.opts.domain_policy,
        )?;
        let jumps = curve.velocity_jumps()?;
        let last = self.knots.len() - 1;
        let keep: Vec<bool> = (0..=last)
            .map(|j| j == 0 || j == last || weighted_jump(&self.knots, j, &jumps[j - 1]) >= threshold)
            .collect();
        let removed = keep.iter().filter(|k| !**k).count();
        if removed == 0 {
            return Ok(0);
        }

        let values: Vec<f64> = self
            .knots
            .values()
            .iter()
            .zip(&keep)
            .filter_map(|(&v, &k)| k.then_some(v))
            .collect();
        let cps: Vec<Direction> = self
            .control_points
            .iter()
            .zip(&keep)
            .filter_map(|(&c, &k)| k.then_some(c))
            .collect();
        log::debug!(
            "lambda={:.3e}: pruned {removed} knot(s), {} remain",
            self.lambda,
            values.len()
        );
        self.knots = KnotSet::new(values)?;
        self.control_points = cps;
        Ok(removed)
    }

    fn finish(self) -> Result<SplineFit> {
        let stop = match self.state {
            FitState::Converged => StopReason::Converged,
            FitState::Stalled => StopReason::Stalled,
            FitState::MaxIterReached => StopReason::MaxIterReached,
            FitState::Failed(e) => return Err(e),
            FitState::Initialized | FitState::Iterating => {
                return Err(SphereError::Numerical(
                    "fit finished before reaching a terminal state".to_string(),
                ));
            }
        };
        let warning = (stop == StopReason::MaxIterReached).then(|| {
            log::warn!(
                "lambda={:.3e}: {} iterations without convergence",
                self.lambda,
                self.iterations
            );
            ConvergenceWarning {
                iterations: self.iterations,
                last_objective: self.objective,
            }
        });

        let res = self.evaluate(&self.control_points)?;
        let rss = res.rss();
        let curve = PiecewiseGeodesic::new(
            self.knots.clone(),
            self.control_points.clone(),
            self.opts.domain_policy,
        )?;
        let (penalty, active_knots) = match curve.velocity_jumps() {
            Ok(jumps) => {
                let penalty = jumps.iter().map(|v| v.norm_squared()).sum();
                (Some(penalty), Some(count_active(&self.knots, &jumps)))
            }
            Err(e) if self.lambda == 0.0 => {
                log::debug!("unpenalized fit leaves velocity jumps undefined: {e}");
                (None, None)
            }
            Err(e) => return Err(e),
        };
        let edf = self.effective_dof()?;

        Ok(SplineFit {
            knots: self.knots,
            control_points: self.control_points,
            lambda: self.lambda,
            objective: self.objective,
            rss,
            penalty,
            edf,
            active_knots,
            iterations: self.iterations,
            stop,
            warning,
            history: self.history,
            policy: self.opts.domain_policy,
        })
    }

    /// `tr((H_d + λ H_p + ρ I)^{-1} H_d)` at the current control points.
    fn effective_dof(&self) -> Result<f64> {
        let (jac, _) = self.jacobian(&self.control_points)?;
        let n_data = 3 * self.sample.len();
        let p = jac.ncols();

        let j_data = jac.rows(0, n_data);
        let h_data = j_data.transpose() * j_data;
        let h_penalty = if jac.nrows() > n_data {
            // Penalty rows carry sqrt(λ); undo it so λ enters once.
            let j_pen = jac.rows(n_data, jac.nrows() - n_data) / self.lambda.sqrt();
            j_pen.transpose() * &j_pen
        } else {
            DMatrix::<f64>::zeros(p, p)
        };

        smoother_trace(&h_data, &h_penalty, self.lambda, EDF_RIDGE).ok_or_else(|| {
            SphereError::Numerical("effective degrees of freedom are not finite".to_string())
        })
    }

    fn evaluate(&self, cps: &[Direction]) -> Result<Residuals> {
        let curve = PiecewiseGeodesic::new(self.knots.clone(), cps.to_vec(), self.opts.domain_policy)?;
        let data = self
            .sample
            .t()
            .iter()
            .zip(self.sample.y())
            .map(|(&t, y)| residual_vector(&curve.evaluate(t)?, y))
            .collect::<Result<Vec<_>>>()?;
        let jumps = if self.lambda > 0.0 {
            let w = self.lambda.sqrt();
            curve.velocity_jumps()?.into_iter().map(|v| v * w).collect()
        } else {
            Vec::new()
        };
        Ok(Residuals { data, jumps })
    }

    /// Finite-difference Jacobian (central) and the residual vector at `cps`.
    fn jacobian(&self, cps: &[Direction]) -> Result<(DMatrix<f64>, DVector<f64>)> {
        let r0 = self.evaluate(cps)?.flatten();
        let h = self.opts.fd_step;
        let mut jac = DMatrix::<f64>::zeros(r0.len(), 2 * cps.len());

        for (k, c) in cps.iter().enumerate() {
            let (e1, e2) = tangent_basis(c)?;
            for (a, e) in [e1, e2].iter().enumerate() {
                let mut plus = cps.to_vec();
                let mut minus = cps.to_vec();
                plus[k] = exp_map(c, &(e * h))?;
                minus[k] = exp_map(c, &(e * -h))?;
                let rp = self.evaluate(&plus)?.flatten();
                let rm = self.evaluate(&minus)?.flatten();
                jac.set_column(2 * k + a, &((rp - rm) / (2.0 * h)));
            }
        }
        Ok((jac, r0))
    }

    /// Apply tangent-coordinate step `delta`. `None` when some control point
    /// would move farther than π/4.
    fn retract(&self, cps: &[Direction], delta: &DVector<f64>) -> Option<Result<Vec<Direction>>> {
        let mut out = Vec::with_capacity(cps.len());
        for (k, c) in cps.iter().enumerate() {
            let (a, b) = (delta[2 * k], delta[2 * k + 1]);
            if (a * a + b * b).sqrt() > FRAC_PI_4 {
                return None;
            }
            let step = tangent_basis(c).and_then(|(e1, e2)| exp_map(c, &(e1 * a + e2 * b)));
            match step {
                Ok(d) => out.push(d),
                Err(e) => return Some(Err(e)),
            }
        }
        Some(Ok(out))
    }
}

/// Checks shared by every penalty strength: options, knot coverage of the
/// sample and the initial control point count.
pub fn validate_inputs(sample: &Sample, knots: &KnotSet, opts: &FitOptions) -> Result<()> {
    if opts.max_iter == 0 {
        return Err(SphereError::InvalidInput("max_iter must be >= 1".to_string()));
    }
    if !(opts.tolerance.is_finite() && opts.tolerance > 0.0) {
        return Err(SphereError::InvalidInput(format!(
            "tolerance must be finite and > 0, got {}",
            opts.tolerance
        )));
    }
    if !(opts.fd_step.is_finite() && opts.fd_step > 0.0) {
        return Err(SphereError::InvalidInput(format!(
            "finite-difference step must be finite and > 0, got {}",
            opts.fd_step
        )));
    }
    if let Some(eps) = opts.prune_below {
        if !(eps.is_finite() && eps > 0.0) {
            return Err(SphereError::InvalidInput(format!(
                "pruning threshold must be finite and > 0, got {eps}"
            )));
        }
    }

    let (lo, hi) = (knots.first(), knots.last());
    if let Some(&t) = sample.t().iter().find(|&&t| t < lo || t > hi) {
        return Err(SphereError::OutOfDomain { t, lo, hi });
    }
    if let Some(cps) = &opts.initial_control_points {
        if cps.len() != knots.len() {
            return Err(SphereError::ShapeMismatch {
                left: knots.len(),
                right: cps.len(),
            });
        }
    }
    Ok(())
}

/// Run one penalized fit to completion.
pub fn fit_spline(sample: &Sample, knots: &KnotSet, lambda: f64, opts: &FitOptions) -> Result<SplineFit> {
    PenalizedFitter::new(sample, knots, lambda, opts)?.run()
}

struct Residuals {
    data: Vec<Vector3<f64>>,
    jumps: Vec<Vector3<f64>>,
}

impl Residuals {
    fn rss(&self) -> f64 {
        self.data.iter().map(|v| v.norm_squared()).sum()
    }

    fn objective(&self) -> f64 {
        self.rss() + self.jumps.iter().map(|v| v.norm_squared()).sum::<f64>()
    }

    fn flatten(&self) -> DVector<f64> {
        DVector::from_iterator(
            3 * (self.data.len() + self.jumps.len()),
            self.data.iter().chain(&self.jumps).flat_map(|v| [v.x, v.y, v.z]),
        )
    }
}

/// The observation nearest in `t` to each knot (earlier one on ties).
fn nearest_observations(sample: &Sample, knots: &KnotSet) -> Vec<Direction> {
    let t = sample.t();
    knots
        .values()
        .iter()
        .map(|&k| {
            let i = t.partition_point(|&v| v < k);
            let best = if i == 0 {
                0
            } else if i == t.len() || (k - t[i - 1]) <= (t[i] - k) {
                i - 1
            } else {
                i
            };
            sample.y()[best]
        })
        .collect()
}

/// `(w_j |jump_j|)^2` at interior knot `j`, `w_j` the mean adjacent width.
fn weighted_jump(knots: &KnotSet, j: usize, jump: &Vector3<f64>) -> f64 {
    let w = 0.5 * (knots.width(j - 1) + knots.width(j));
    (w * jump.norm()).powi(2)
}

fn count_active(knots: &KnotSet, jumps: &[Vector3<f64>]) -> usize {
    jumps
        .iter()
        .enumerate()
        .filter(|(idx, v)| weighted_jump(knots, idx + 1, v) >= ACTIVE_KNOT_THRESHOLD)
        .count()
}
