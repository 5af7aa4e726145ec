//! Local sky background as a tilted plane.
//!
//! The sky near a source is sampled in two annuli, [4, 5] and [6, 7] times
//! the configured FWHM. The annulus with the lower mean is assumed to be
//! less contaminated by neighbouring sources and is fit with
//! intensity = a·x + b·y + c by unweighted least squares. The standard
//! deviation of the residuals is the sky noise that later weights the PSF
//! fit and enters every photometric error.

#[cfg(test)]
mod tests;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::aperture::{PixelSet, annulus};
use crate::config::Config;
use crate::error::FitError;
use crate::fitting::{LmModel, optimize_with_retry};
use crate::image::Image;

/// Annulus radii in units of FWHM.
const INNER_ANNULUS: (f64, f64) = (4.0, 5.0);
const OUTER_ANNULUS: (f64, f64) = (6.0, 7.0);
/// Residual scatter below this many ULPs of the sky level counts as noiseless.
const NOISE_FLOOR_ULPS: f64 = 64.0;

/// Coefficients of intensity = a·x + b·y + c.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SkyPlane {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl SkyPlane {
    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    #[inline]
    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        self.a * x + self.b * y + self.c
    }

    fn from_params(params: [f64; 3]) -> Self {
        Self::new(params[0], params[1], params[2])
    }
}

/// Which sky annulus the plane was fit to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnulusChoice {
    Inner,
    Outer,
}

/// A successful sky plane fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyFit {
    pub plane: SkyPlane,
    /// One-sigma coefficient errors; all zero when the covariance could not
    /// be estimated even after a retry.
    pub errors: SkyPlane,
    /// Population standard deviation of the plane residuals.
    pub noise: f64,
    /// Σ(r / noise)² / (n − 3), zero when `noise` is zero.
    pub reduced_chi2: f64,
    pub annulus: AnnulusChoice,
    pub pixels: usize,
    pub retried: bool,
    pub evaluations: usize,
}

/// Sky model near a source.
///
/// `Unavailable` replaces a zero plane with zero noise: callers that need the
/// numbers get zeros from the accessors, callers that care can branch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SkyModel {
    Fitted(SkyFit),
    Unavailable(FitError),
}

impl SkyModel {
    /// Fitted plane, or the zero plane when unavailable.
    pub fn plane(&self) -> SkyPlane {
        match self {
            Self::Fitted(fit) => fit.plane,
            Self::Unavailable(_) => SkyPlane::default(),
        }
    }

    /// Sky noise, or zero when unavailable.
    pub fn noise(&self) -> f64 {
        match self {
            Self::Fitted(fit) => fit.noise,
            Self::Unavailable(_) => 0.0,
        }
    }

    pub fn fit(&self) -> Option<&SkyFit> {
        match self {
            Self::Fitted(fit) => Some(fit),
            Self::Unavailable(_) => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Fitted(_))
    }

    /// Plane to subtract from source pixels under the given policy.
    pub(crate) fn subtraction_plane(&self, subtract_sky: bool) -> SkyPlane {
        if subtract_sky {
            self.plane()
        } else {
            SkyPlane::default()
        }
    }
}

struct PlaneModel;

impl LmModel<3> for PlaneModel {
    #[inline]
    fn evaluate(&self, x: f64, y: f64, params: &[f64; 3]) -> f64 {
        params[0] * x + params[1] * y + params[2]
    }

    #[inline]
    fn jacobian_row(&self, x: f64, y: f64, _params: &[f64; 3]) -> [f64; 3] {
        [x, y, 1.0]
    }
}

/// Fit the sky plane around `position`.
pub fn fit_sky(image: &Image, position: DVec2, config: &Config) -> SkyModel {
    match fit_sky_plane(image, position, config) {
        Ok(fit) => {
            if config.summary() {
                tracing::info!(
                    x = position.x,
                    y = position.y,
                    a = fit.plane.a,
                    b = fit.plane.b,
                    c = fit.plane.c,
                    noise = fit.noise,
                    reduced_chi2 = fit.reduced_chi2,
                    annulus = ?fit.annulus,
                    "Sky plane fitted"
                );
            }
            SkyModel::Fitted(fit)
        }
        Err(err) => {
            tracing::warn!(x = position.x, y = position.y, "Sky fitting failed: {err}");
            SkyModel::Unavailable(err)
        }
    }
}

fn fit_sky_plane(image: &Image, position: DVec2, config: &Config) -> Result<SkyFit, FitError> {
    let fwhm = config.sky_annulus_fwhm;
    let inner = annulus(
        image,
        position,
        INNER_ANNULUS.0 * fwhm,
        INNER_ANNULUS.1 * fwhm,
    );
    let outer = annulus(
        image,
        position,
        OUTER_ANNULUS.0 * fwhm,
        OUTER_ANNULUS.1 * fwhm,
    );

    let (choice, pixels, mean) = select_annulus(inner, outer)?;

    let result = optimize_with_retry(
        &PlaneModel,
        &pixels,
        None,
        [0.0, 0.0, mean],
        &config.sky_fit,
    )?;

    let errors = match result.errors {
        Ok(errors) => SkyPlane::from_params(errors),
        Err(err) => {
            tracing::debug!("Sky plane covariance unavailable after retry: {err}");
            SkyPlane::default()
        }
    };

    let plane = SkyPlane::from_params(result.fit.params);
    let residuals: Vec<f64> = pixels
        .iter()
        .map(|(x, y, z)| z - plane.evaluate(x, y))
        .collect();
    let noise = population_std(&residuals);
    let noise_floor = NOISE_FLOOR_ULPS * f64::EPSILON * mean.abs().max(1.0);
    let reduced_chi2 = if noise > noise_floor {
        let chi2: f64 = residuals.iter().map(|r| (r / noise).powi(2)).sum();
        chi2 / (pixels.len() - 3) as f64
    } else {
        0.0
    };

    Ok(SkyFit {
        plane,
        errors,
        noise,
        reduced_chi2,
        annulus: choice,
        pixels: pixels.len(),
        retried: result.retried,
        evaluations: result.evaluations,
    })
}

/// Pick the annulus with the lower mean; ties go to the inner one.
fn select_annulus(
    inner: PixelSet,
    outer: PixelSet,
) -> Result<(AnnulusChoice, PixelSet, f64), FitError> {
    match (inner.mean(), outer.mean()) {
        (Some(inner_mean), Some(outer_mean)) if outer_mean < inner_mean => {
            Ok((AnnulusChoice::Outer, outer, outer_mean))
        }
        (Some(inner_mean), _) => Ok((AnnulusChoice::Inner, inner, inner_mean)),
        (None, Some(outer_mean)) => Ok((AnnulusChoice::Outer, outer, outer_mean)),
        (None, None) => Err(FitError::EmptyAnnulus),
    }
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}
