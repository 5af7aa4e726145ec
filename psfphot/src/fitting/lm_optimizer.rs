//! Weighted Levenberg-Marquardt optimizer for profile and plane fitting.
//!
//! Generic over the parameter count so the same loop drives the 3-parameter
//! sky plane and the 1-, 3- and 5-parameter PSF fits. Uses f64 throughout.
//!
//! Every full pass over the data (model values, or model values plus
//! Jacobian) counts as one evaluation. A fit that exhausts
//! [`LmConfig::max_evaluations`] without converging fails with
//! [`FitError::EvaluationLimit`].

use serde::{Deserialize, Serialize};

use super::linear_solver::{invert, solve};
use crate::aperture::PixelSet;
use crate::error::FitError;

/// Configuration for Levenberg-Marquardt optimization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmConfig {
    /// Hard ceiling on model evaluations for one optimization run.
    pub max_evaluations: usize,
    /// Relative parameter-step tolerance for convergence.
    pub xtol: f64,
    /// Relative chi-square change tolerance for convergence.
    pub ftol: f64,
    /// Initial damping parameter.
    pub initial_lambda: f64,
    /// Factor to increase lambda on failed step.
    pub lambda_up: f64,
    /// Factor to decrease lambda on successful step.
    pub lambda_down: f64,
    /// Damping above which no downhill step is left and the current point is
    /// accepted as the minimum.
    pub max_lambda: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_evaluations: 100_000,
            xtol: 1e-10,
            ftol: 1e-10,
            initial_lambda: 0.001,
            lambda_up: 10.0,
            lambda_down: 0.1,
            max_lambda: 1e10,
        }
    }
}

impl LmConfig {
    /// Same tolerances with a different evaluation ceiling.
    pub fn with_max_evaluations(max_evaluations: usize) -> Self {
        Self {
            max_evaluations,
            ..Self::default()
        }
    }

    pub fn validate(&self) {
        assert!(
            self.max_evaluations > 0,
            "max_evaluations must be positive"
        );
        assert!(self.xtol > 0.0, "xtol must be positive, got {}", self.xtol);
        assert!(self.ftol > 0.0, "ftol must be positive, got {}", self.ftol);
        assert!(
            self.lambda_up > 1.0 && self.lambda_down > 0.0 && self.lambda_down < 1.0,
            "lambda_up must be > 1 and lambda_down in (0, 1)"
        );
    }
}

/// Models that can be fit with L-M optimization.
pub trait LmModel<const N: usize> {
    /// Evaluate the model at a point.
    fn evaluate(&self, x: f64, y: f64, params: &[f64; N]) -> f64;

    /// Partial derivatives with respect to each parameter at a point.
    fn jacobian_row(&self, x: f64, y: f64, params: &[f64; N]) -> [f64; N];

    /// Apply parameter constraints after an update.
    fn constrain(&self, _params: &mut [f64; N]) {}
}

/// Converged optimizer state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LmFit<const N: usize> {
    pub params: [f64; N],
    /// Weighted sum of squared residuals at `params`.
    pub chi2: f64,
    pub iterations: usize,
    pub evaluations: usize,
}

/// Optimizer result after the covariance retry policy has run.
#[derive(Debug, Clone, PartialEq)]
pub struct RetriedFit<const N: usize> {
    pub fit: LmFit<N>,
    /// One-sigma parameter errors, or why they could not be estimated.
    pub errors: Result<[f64; N], FitError>,
    /// Whether a second optimization was seeded from the first solution.
    pub retried: bool,
    /// Evaluations summed over both runs.
    pub evaluations: usize,
}

/// Minimize `sum(((z - model) / sigma)^2)` starting from `initial`.
///
/// `sigma` holds per-pixel standard deviations; `None` means unit weights.
pub fn optimize<const N: usize, M: LmModel<N>>(
    model: &M,
    data: &PixelSet,
    sigma: Option<&[f64]>,
    initial: [f64; N],
    config: &LmConfig,
) -> Result<LmFit<N>, FitError> {
    debug_assert!(sigma.is_none_or(|s| s.len() == data.len()));
    if data.len() <= N {
        return Err(FitError::DegeneratePixelBox {
            pixels: data.len(),
            required: N + 1,
        });
    }

    let inv_sigma = inverse_sigma(data.len(), sigma);
    let mut params = initial;
    model.constrain(&mut params);

    let mut evaluations = 1;
    let mut chi2 = compute_chi2(model, data, &inv_sigma, &params);
    if !chi2.is_finite() {
        return Err(FitError::NonFinite { evaluations });
    }

    let mut lambda = config.initial_lambda;
    let mut iterations = 0;
    let mut jacobian = Vec::with_capacity(data.len());
    let mut residuals = Vec::with_capacity(data.len());
    let mut need_jacobian = true;
    let mut hessian = [[0.0f64; N]; N];
    let mut gradient = [0.0f64; N];

    loop {
        if chi2 == 0.0 {
            break;
        }
        if evaluations >= config.max_evaluations {
            return Err(FitError::EvaluationLimit { evaluations });
        }
        iterations += 1;

        if need_jacobian {
            fill_jacobian_residuals(
                model,
                data,
                &inv_sigma,
                &params,
                &mut jacobian,
                &mut residuals,
            );
            evaluations += 1;
            (hessian, gradient) = compute_hessian_gradient(&jacobian, &residuals);
            need_jacobian = false;
        }

        // Marquardt scaling, with a floor tied to the largest curvature so a
        // parameter the data does not constrain still gets a finite step.
        let diag_floor = (0..N).map(|i| hessian[i][i]).fold(0.0f64, f64::max) * 1e-12;
        let mut damped = hessian;
        for (i, row) in damped.iter_mut().enumerate() {
            row[i] += lambda * row[i].max(diag_floor);
        }

        let Some(delta) = solve(&damped, &gradient) else {
            return Err(FitError::SingularSystem { evaluations });
        };

        let mut trial = params;
        for (p, d) in trial.iter_mut().zip(delta.iter()) {
            *p += d;
        }
        model.constrain(&mut trial);

        let trial_chi2 = compute_chi2(model, data, &inv_sigma, &trial);
        evaluations += 1;

        if trial_chi2.is_finite() && trial_chi2 < chi2 {
            let relative_drop = (chi2 - trial_chi2) / chi2;
            let small_step = params
                .iter()
                .zip(trial.iter())
                .all(|(&old, &new)| (new - old).abs() <= config.xtol * (old.abs() + config.xtol));

            params = trial;
            chi2 = trial_chi2;
            lambda *= config.lambda_down;
            need_jacobian = true;

            if small_step || relative_drop < config.ftol {
                break;
            }
        } else {
            // A rejected step that only differs by rounding is a minimum too
            if trial_chi2.is_finite() && (trial_chi2 - chi2) / chi2 < config.ftol {
                break;
            }
            lambda *= config.lambda_up;
            if lambda > config.max_lambda {
                break;
            }
        }
    }

    Ok(LmFit {
        params,
        chi2,
        iterations,
        evaluations,
    })
}

/// One-sigma parameter errors from the scaled inverse normal matrix.
///
/// Covariance = (JᵀWJ)⁻¹ · chi2 / (n - N), i.e. the weights are treated as
/// relative and rescaled by the reduced chi-square of the fit.
pub fn parameter_errors<const N: usize, M: LmModel<N>>(
    model: &M,
    data: &PixelSet,
    sigma: Option<&[f64]>,
    fit: &LmFit<N>,
) -> Result<[f64; N], FitError> {
    let dof = data.len().saturating_sub(N);
    if dof == 0 {
        return Err(FitError::SingularCovariance);
    }

    let inv_sigma = inverse_sigma(data.len(), sigma);
    let mut jacobian = Vec::with_capacity(data.len());
    let mut residuals = Vec::with_capacity(data.len());
    fill_jacobian_residuals(
        model,
        data,
        &inv_sigma,
        &fit.params,
        &mut jacobian,
        &mut residuals,
    );
    let (hessian, _) = compute_hessian_gradient(&jacobian, &residuals);

    let covariance = invert(&hessian).ok_or(FitError::SingularCovariance)?;
    let scale = fit.chi2 / dof as f64;

    let mut errors = [0.0f64; N];
    for (i, err) in errors.iter_mut().enumerate() {
        let variance = covariance[i][i] * scale;
        if !variance.is_finite() || variance < 0.0 {
            return Err(FitError::SingularCovariance);
        }
        *err = variance.sqrt();
    }
    Ok(errors)
}

/// Optimize, and if the covariance cannot be estimated, optimize once more
/// seeded from the first solution.
///
/// Divergence of the first run is returned as an error. If the second run
/// diverges the first solution is kept and its covariance error reported.
pub fn optimize_with_retry<const N: usize, M: LmModel<N>>(
    model: &M,
    data: &PixelSet,
    sigma: Option<&[f64]>,
    initial: [f64; N],
    config: &LmConfig,
) -> Result<RetriedFit<N>, FitError> {
    let first = optimize(model, data, sigma, initial, config)?;
    let first_errors = parameter_errors(model, data, sigma, &first);
    if first_errors.is_ok() {
        return Ok(RetriedFit {
            fit: first,
            errors: first_errors,
            retried: false,
            evaluations: first.evaluations,
        });
    }

    tracing::debug!("Covariance estimation failed, retrying from first solution");
    match optimize(model, data, sigma, first.params, config) {
        Ok(second) => Ok(RetriedFit {
            fit: second,
            errors: parameter_errors(model, data, sigma, &second),
            retried: true,
            evaluations: first.evaluations + second.evaluations,
        }),
        Err(err) => Ok(RetriedFit {
            fit: first,
            errors: Err(err),
            retried: true,
            evaluations: first.evaluations + err.evaluations().unwrap_or(0),
        }),
    }
}

fn inverse_sigma(len: usize, sigma: Option<&[f64]>) -> Vec<f64> {
    match sigma {
        Some(sigma) => sigma.iter().map(|&s| 1.0 / s).collect(),
        None => vec![1.0; len],
    }
}

fn compute_chi2<const N: usize, M: LmModel<N>>(
    model: &M,
    data: &PixelSet,
    inv_sigma: &[f64],
    params: &[f64; N],
) -> f64 {
    data.iter()
        .zip(inv_sigma.iter())
        .map(|((x, y, z), &w)| {
            let residual = (z - model.evaluate(x, y, params)) * w;
            residual * residual
        })
        .sum()
}

/// Fill weighted jacobian and residual buffers, reusing existing allocations.
fn fill_jacobian_residuals<const N: usize, M: LmModel<N>>(
    model: &M,
    data: &PixelSet,
    inv_sigma: &[f64],
    params: &[f64; N],
    jacobian: &mut Vec<[f64; N]>,
    residuals: &mut Vec<f64>,
) {
    jacobian.clear();
    residuals.clear();

    for ((x, y, z), &w) in data.iter().zip(inv_sigma.iter()) {
        let mut row = model.jacobian_row(x, y, params);
        for v in row.iter_mut() {
            *v *= w;
        }
        jacobian.push(row);
        residuals.push((z - model.evaluate(x, y, params)) * w);
    }
}

/// Compute Hessian approximation (JᵀJ) and gradient (Jᵀr).
/// Only the upper triangle is accumulated, then mirrored.
#[allow(clippy::needless_range_loop)]
fn compute_hessian_gradient<const N: usize>(
    jacobian: &[[f64; N]],
    residuals: &[f64],
) -> ([[f64; N]; N], [f64; N]) {
    let mut hessian = [[0.0f64; N]; N];
    let mut gradient = [0.0f64; N];

    for (row, &r) in jacobian.iter().zip(residuals.iter()) {
        for i in 0..N {
            gradient[i] += row[i] * r;
            for j in i..N {
                hessian[i][j] += row[i] * row[j];
            }
        }
    }

    for i in 1..N {
        for j in 0..i {
            hessian[i][j] = hessian[j][i];
        }
    }

    (hessian, gradient)
}
