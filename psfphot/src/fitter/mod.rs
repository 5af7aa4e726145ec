//! Moffat PSF fitting around a known source position.
//!
//! Three modes, from most to least freedom:
//!
//! - **Free**: amplitude, α, β and centre, for bright isolated sources.
//! - **FixedShape**: α and β taken from a prior (usually measured on
//!   reference stars), amplitude and centre fitted.
//! - **FluxOnly**: shape and centre fixed, only the amplitude fitted. This is
//!   forced photometry for faint sources whose centre cannot be trusted.
//!
//! Every mode fits a square box of sky-subtracted pixels weighted by
//! σ = √(|I| + noise²), where noise is the local sky noise. The result is
//! checked by [`validate`](crate::validator::validate) before it is returned
//! as a success.

mod models;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::aperture::{PixelSet, pixel_box};
use crate::config::Config;
use crate::error::FitError;
use crate::fitting::{LmConfig, LmModel, optimize_with_retry};
use crate::image::Image;
use crate::psf::{Moffat, PsfModel, PsfShape, ShapePrior};
use crate::sky::SkyModel;
use crate::validator::{Rejection, validate, validate_shape};

use models::{FixedShapeMoffat, FluxOnlyMoffat, FreeMoffat};

/// What to fit and what to take as given.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FitMode {
    /// Fit everything, seeding the shape from an approximate FWHM.
    Free { seed_fwhm: f64 },
    /// Fit amplitude and centre with a known shape.
    FixedShape(ShapePrior),
    /// Fit the amplitude only, with known shape and centre.
    FluxOnly(ShapePrior),
}

impl FitMode {
    pub fn kind(&self) -> FitModeKind {
        match self {
            Self::Free { .. } => FitModeKind::Free,
            Self::FixedShape(_) => FitModeKind::FixedShape,
            Self::FluxOnly(_) => FitModeKind::FluxOnly,
        }
    }
}

/// [`FitMode`] without its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitModeKind {
    Free,
    FixedShape,
    FluxOnly,
}

/// A converged PSF fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PsfFit {
    pub mode: FitModeKind,
    pub model: PsfModel,
    /// One-sigma errors in the same layout as `model`. Fixed parameters carry
    /// the prior's errors, or zero for a fixed centre.
    pub errors: PsfModel,
    /// Σ((I − M)/σ)² / (n − p).
    pub reduced_chi2: f64,
    pub pixels: usize,
    pub evaluations: usize,
    pub retried: bool,
}

/// Why no fit was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SkipReason {
    /// The supplied shape prior failed the shape checks.
    InvalidShape(Rejection),
    /// The free-fit seed FWHM is not a positive finite number.
    InvalidSeed { fwhm: f64 },
}

/// Result of one PSF fit call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FitOutcome {
    NotAttempted(SkipReason),
    Diverged(FitError),
    Rejected { fit: PsfFit, rejection: Rejection },
    Success(PsfFit),
}

impl FitOutcome {
    /// The validated fit, if any.
    pub fn success(&self) -> Option<&PsfFit> {
        match self {
            Self::Success(fit) => Some(fit),
            _ => None,
        }
    }

    /// The converged fit, validated or not.
    pub fn fit(&self) -> Option<&PsfFit> {
        match self {
            Self::Success(fit) | Self::Rejected { fit, .. } => Some(fit),
            Self::NotAttempted(_) | Self::Diverged(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Pixels, weights and seed amplitude shared by all modes.
struct FitBox {
    data: PixelSet,
    sigma: Vec<f64>,
    seed_amplitude: f64,
}

/// Converged parameters with their errors, before mapping back to a model.
struct RawFit<const N: usize> {
    params: [f64; N],
    errors: [f64; N],
    reduced_chi2: f64,
    evaluations: usize,
    retried: bool,
}

/// Fit a PSF to the source at `position` in the requested mode.
pub fn fit_psf(
    image: &Image,
    position: DVec2,
    sky: &SkyModel,
    mode: &FitMode,
    config: &Config,
) -> FitOutcome {
    let outcome = match run_fit(image, position, sky, mode, config) {
        Ok(fit) => match validate(&fit.model, position, fit.mode, &config.validation) {
            Ok(()) => FitOutcome::Success(fit),
            Err(rejection) => FitOutcome::Rejected { fit, rejection },
        },
        Err(outcome) => outcome,
    };

    log_outcome(&outcome, position, mode.kind(), config);
    outcome
}

fn run_fit(
    image: &Image,
    position: DVec2,
    sky: &SkyModel,
    mode: &FitMode,
    config: &Config,
) -> Result<PsfFit, FitOutcome> {
    let box_fwhm = match mode {
        FitMode::Free { seed_fwhm } => {
            if !(seed_fwhm.is_finite() && *seed_fwhm > 0.0) {
                return Err(FitOutcome::NotAttempted(SkipReason::InvalidSeed {
                    fwhm: *seed_fwhm,
                }));
            }
            *seed_fwhm
        }
        FitMode::FixedShape(prior) | FitMode::FluxOnly(prior) => {
            check_prior(prior, config).map_err(FitOutcome::NotAttempted)?
        }
    };

    let fit_box = extract_box(image, position, sky, box_fwhm, config);
    let n = fit_box.data.len();

    let fit = match *mode {
        FitMode::Free { seed_fwhm } => {
            let initial = [
                fit_box.seed_amplitude,
                seed_fwhm / config.fwhm_per_alpha,
                config.seed_beta,
                position.x,
                position.y,
            ];
            let raw = run_lm(&FreeMoffat, &fit_box, initial, &config.free_fit)?;
            let [amplitude, alpha, beta, x0, y0] = raw.params;
            let [e_amplitude, e_alpha, e_beta, e_x0, e_y0] = raw.errors;
            PsfFit {
                mode: FitModeKind::Free,
                model: PsfModel::Moffat(Moffat {
                    amplitude,
                    alpha: alpha.abs(),
                    beta,
                    center: DVec2::new(x0, y0),
                }),
                errors: PsfModel::Moffat(Moffat {
                    amplitude: e_amplitude,
                    alpha: e_alpha,
                    beta: e_beta,
                    center: DVec2::new(e_x0, e_y0),
                }),
                reduced_chi2: raw.reduced_chi2,
                pixels: n,
                evaluations: raw.evaluations,
                retried: raw.retried,
            }
        }
        FitMode::FixedShape(prior) => {
            let (alpha, beta, alpha_err, beta_err) = moffat_prior(&prior);
            let model = FixedShapeMoffat { alpha, beta };
            let initial = [fit_box.seed_amplitude, position.x, position.y];
            let raw = run_lm(&model, &fit_box, initial, &config.fixed_fit)?;
            let [amplitude, x0, y0] = raw.params;
            let [e_amplitude, e_x0, e_y0] = raw.errors;
            PsfFit {
                mode: FitModeKind::FixedShape,
                model: PsfModel::Moffat(Moffat {
                    amplitude,
                    alpha,
                    beta,
                    center: DVec2::new(x0, y0),
                }),
                errors: PsfModel::Moffat(Moffat {
                    amplitude: e_amplitude,
                    alpha: alpha_err,
                    beta: beta_err,
                    center: DVec2::new(e_x0, e_y0),
                }),
                reduced_chi2: raw.reduced_chi2,
                pixels: n,
                evaluations: raw.evaluations,
                retried: raw.retried,
            }
        }
        FitMode::FluxOnly(prior) => {
            let (alpha, beta, alpha_err, beta_err) = moffat_prior(&prior);
            let model = FluxOnlyMoffat {
                alpha,
                beta,
                center: position,
            };
            let seed = [fit_box.seed_amplitude];
            let raw = run_lm(&model, &fit_box, seed, &config.fixed_fit)?;
            PsfFit {
                mode: FitModeKind::FluxOnly,
                model: PsfModel::Moffat(Moffat {
                    amplitude: raw.params[0],
                    alpha,
                    beta,
                    center: position,
                }),
                errors: PsfModel::Moffat(Moffat {
                    amplitude: raw.errors[0],
                    alpha: alpha_err,
                    beta: beta_err,
                    center: DVec2::ZERO,
                }),
                reduced_chi2: raw.reduced_chi2,
                pixels: n,
                evaluations: raw.evaluations,
                retried: raw.retried,
            }
        }
    };

    Ok(fit)
}

/// Shape checks for a prior; returns the FWHM that sizes the fit box.
fn check_prior(prior: &ShapePrior, config: &Config) -> Result<f64, SkipReason> {
    let fwhm = prior.fwhm();
    if !(fwhm > 0.0) {
        return Err(SkipReason::InvalidShape(Rejection::FwhmOutOfRange {
            fwhm,
            min: config.validation.min_fwhm,
            max: config.validation.max_fwhm,
        }));
    }
    validate_shape(&prior.shape, &config.validation).map_err(SkipReason::InvalidShape)?;
    Ok(fwhm)
}

/// (α, β, σα, σβ) of a Moffat prior, with α taken as |α|.
fn moffat_prior(prior: &ShapePrior) -> (f64, f64, f64, f64) {
    let PsfShape::Moffat { alpha, beta } = prior.shape;
    let PsfShape::Moffat {
        alpha: alpha_err,
        beta: beta_err,
    } = prior.errors;
    (alpha.abs(), beta, alpha_err, beta_err)
}

fn extract_box(
    image: &Image,
    position: DVec2,
    sky: &SkyModel,
    fwhm: f64,
    config: &Config,
) -> FitBox {
    let plane = sky.subtraction_plane(config.subtract_sky);
    let data = pixel_box(image, position, config.box_half_width_fwhm * fwhm)
        .map_values(|x, y, z| z - plane.evaluate(x, y));

    let noise2 = sky.noise().powi(2);
    let sigma = data
        .z
        .iter()
        .map(|z| (z.abs() + noise2).sqrt().max(config.min_pixel_sigma))
        .collect();

    // Seed from the pixel containing the nominal position, or the box peak
    // when that pixel lies outside the image.
    let (px, py) = (position.x.floor(), position.y.floor());
    let seed_amplitude = data
        .iter()
        .find(|&(x, y, _)| x == px && y == py)
        .map(|(_, _, z)| z)
        .unwrap_or_else(|| data.z.iter().copied().fold(0.0, f64::max));

    FitBox {
        data,
        sigma,
        seed_amplitude,
    }
}

fn run_lm<const N: usize, M: LmModel<N>>(
    model: &M,
    fit_box: &FitBox,
    initial: [f64; N],
    lm_config: &LmConfig,
) -> Result<RawFit<N>, FitOutcome> {
    let result = optimize_with_retry(
        model,
        &fit_box.data,
        Some(&fit_box.sigma),
        initial,
        lm_config,
    )
    .map_err(FitOutcome::Diverged)?;
    let errors = result.errors.map_err(FitOutcome::Diverged)?;

    let dof = fit_box.data.len() - N;
    Ok(RawFit {
        params: result.fit.params,
        errors,
        reduced_chi2: result.fit.chi2 / dof as f64,
        evaluations: result.evaluations,
        retried: result.retried,
    })
}

fn log_outcome(outcome: &FitOutcome, position: DVec2, mode: FitModeKind, config: &Config) {
    match outcome {
        FitOutcome::Success(fit) => {
            if config.summary() {
                tracing::info!(
                    x = position.x,
                    y = position.y,
                    ?mode,
                    family = ?fit.model.family(),
                    amplitude = fit.model.amplitude(),
                    fwhm = fit.model.fwhm(),
                    reduced_chi2 = fit.reduced_chi2,
                    evaluations = fit.evaluations,
                    "PSF fit accepted"
                );
            }
        }
        FitOutcome::Rejected { rejection, .. } => {
            tracing::warn!(x = position.x, y = position.y, ?mode, "PSF fit rejected: {rejection}");
        }
        FitOutcome::Diverged(err) => {
            tracing::warn!(x = position.x, y = position.y, ?mode, "PSF fit failed: {err}");
        }
        FitOutcome::NotAttempted(reason) => {
            tracing::warn!(x = position.x, y = position.y, ?mode, ?reason, "PSF fit not attempted");
        }
    }
}
