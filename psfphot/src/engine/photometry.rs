//! Flux measurement from a fitted profile or a raw aperture.

use std::f64::consts::LN_10;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::aperture::{PixelSet, disk};
use crate::config::Config;
use crate::error::PhotometryError;
use crate::fitter::PsfFit;
use crate::image::Image;
use crate::psf::{FluxIntegral, PsfModel, ShapePrior};
use crate::sky::SkyModel;
use crate::validator::validate_shape;

/// Number of radii sampled by [`aperture_curve`].
pub const CURVE_POINTS: usize = 100;

/// How the flux was summed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhotometryMethod {
    /// Sum of the fitted model over the aperture.
    Psf,
    /// Sum of sky-subtracted image pixels over the aperture.
    Aperture,
}

/// Aperture size for direct photometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ApertureRadius {
    /// Radius in pixels.
    Explicit(f64),
    /// Kron radius of a known shape, clipped like the PSF aperture.
    FromShape(ShapePrior),
}

/// A flux measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhotometryResult {
    pub method: PhotometryMethod,
    pub flux: f64,
    pub flux_err: f64,
    pub snr: f64,
    /// Aperture radius in pixels.
    pub radius: f64,
    /// Pixels summed.
    pub pixels: usize,
    /// Analytic enclosed flux of the fitted profile (PSF photometry only).
    pub integral: Option<FluxIntegral>,
}

impl PhotometryResult {
    /// Magnitude uncertainty, 2.5 / ln(10) / SNR.
    pub fn magnitude_error(&self) -> f64 {
        2.5 / LN_10 / self.snr
    }
}

/// One radius of an aperture curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AperturePoint {
    pub radius: f64,
    pub flux: f64,
    pub noise: f64,
    pub snr: f64,
    pub pixels: usize,
}

/// What an aperture curve sums.
#[derive(Debug, Clone, Copy)]
pub enum CurveSource<'a> {
    /// The fitted model, with residual noise.
    Model(&'a PsfFit),
    /// Cleaned sky-subtracted pixels; `fwhm` scales the radii.
    Aperture { fwhm: f64 },
}

/// Kron radius clipped into [1, `max_aperture_fwhm` · FWHM] pixels.
///
/// The clip is done in FWHM units, upper bound first, so a profile narrower
/// than 1/`max_aperture_fwhm` px still gets a one-pixel aperture.
pub fn optimal_aperture_radius(kron_radius: f64, fwhm: f64, max_aperture_fwhm: f64) -> f64 {
    (kron_radius / fwhm).min(max_aperture_fwhm).max(1.0 / fwhm) * fwhm
}

/// SNR, infinite (with the sign of the flux) when there is no noise.
fn signal_to_noise(flux: f64, noise: f64) -> f64 {
    if noise > 0.0 {
        flux / noise
    } else if flux == 0.0 {
        0.0
    } else {
        f64::INFINITY.copysign(flux)
    }
}

pub(crate) fn psf_photometry(
    image: &Image,
    position: DVec2,
    sky: &SkyModel,
    fit: &PsfFit,
    config: &Config,
) -> Result<PhotometryResult, PhotometryError> {
    let fwhm = fit.model.fwhm();
    if validate_shape(&fit.model.shape(), &config.validation).is_err() {
        return Err(PhotometryError::InvalidShape { fwhm });
    }

    let integral = fit
        .model
        .flux_integral(config.kron_fraction, Some(&fit.errors))?;
    let radius = optimal_aperture_radius(integral.radius, fwhm, config.max_aperture_fwhm);

    let pixels = sky_subtracted_disk(image, position, sky, radius, config);
    if pixels.is_empty() {
        return Err(PhotometryError::EmptyAperture { radius });
    }
    let (flux, noise) = model_flux_and_noise(&fit.model, &pixels);

    Ok(PhotometryResult {
        method: PhotometryMethod::Psf,
        flux,
        flux_err: noise,
        snr: signal_to_noise(flux, noise),
        radius,
        pixels: pixels.len(),
        integral: Some(integral),
    })
}

pub(crate) fn aperture_photometry(
    image: &Image,
    position: DVec2,
    sky: &SkyModel,
    aperture: &ApertureRadius,
    config: &Config,
) -> Result<PhotometryResult, PhotometryError> {
    let radius = match aperture {
        ApertureRadius::Explicit(radius) => {
            if !(radius.is_finite() && *radius > 0.0) {
                return Err(PhotometryError::InvalidRadius { radius: *radius });
            }
            *radius
        }
        ApertureRadius::FromShape(prior) => {
            let fwhm = prior.fwhm();
            if !(fwhm > 0.0) {
                return Err(PhotometryError::InvalidShape { fwhm });
            }
            let kron = prior.shape.kron_radius(config.kron_fraction)?;
            optimal_aperture_radius(kron, fwhm, config.max_aperture_fwhm)
        }
    };

    let pixels = sky_subtracted_disk(image, position, sky, radius, config);
    if pixels.is_empty() {
        return Err(PhotometryError::EmptyAperture { radius });
    }
    let flux = pixels.sum();
    let flux_err = aperture_noise(flux, sky.noise(), pixels.len());

    Ok(PhotometryResult {
        method: PhotometryMethod::Aperture,
        flux,
        flux_err,
        snr: signal_to_noise(flux, flux_err),
        radius,
        pixels: pixels.len(),
        integral: None,
    })
}

/// Flux, noise and SNR for radii from 1 px to `max_aperture_fwhm` · FWHM.
///
/// Radii whose disk falls entirely outside the image are skipped.
pub(crate) fn aperture_curve(
    image: &Image,
    position: DVec2,
    sky: &SkyModel,
    source: CurveSource<'_>,
    config: &Config,
) -> Result<Vec<AperturePoint>, PhotometryError> {
    let fwhm = match source {
        CurveSource::Model(fit) => fit.model.fwhm(),
        CurveSource::Aperture { fwhm } => fwhm,
    };
    if !(fwhm.is_finite() && fwhm > 0.0) {
        return Err(PhotometryError::InvalidShape { fwhm });
    }

    let lo = 1.0 / fwhm;
    let hi = config.max_aperture_fwhm;
    let step = (hi - lo) / (CURVE_POINTS - 1) as f64;

    let mut curve = Vec::with_capacity(CURVE_POINTS);
    for i in 0..CURVE_POINTS {
        let radius = (lo + step * i as f64) * fwhm;
        let pixels = sky_subtracted_disk(image, position, sky, radius, config);
        if pixels.is_empty() {
            continue;
        }

        let (flux, noise, count) = match source {
            CurveSource::Model(fit) => {
                let (flux, noise) = model_flux_and_noise(&fit.model, &pixels);
                (flux, noise, pixels.len())
            }
            CurveSource::Aperture { .. } => {
                let cleaned = pixels.reject_low_outliers(sky.noise(), config.clean_sigma);
                let flux = cleaned.sum();
                (flux, aperture_noise(flux, sky.noise(), cleaned.len()), cleaned.len())
            }
        };

        curve.push(AperturePoint {
            radius,
            flux,
            noise,
            snr: signal_to_noise(flux, noise),
            pixels: count,
        });
    }

    if curve.is_empty() {
        return Err(PhotometryError::EmptyAperture { radius: hi * fwhm });
    }
    Ok(curve)
}

fn sky_subtracted_disk(
    image: &Image,
    position: DVec2,
    sky: &SkyModel,
    radius: f64,
    config: &Config,
) -> PixelSet {
    let plane = sky.subtraction_plane(config.subtract_sky);
    disk(image, position, radius).map_values(|x, y, z| z - plane.evaluate(x, y))
}

/// Model sum, and the root-sum-square of model minus data.
fn model_flux_and_noise(model: &PsfModel, pixels: &PixelSet) -> (f64, f64) {
    let mut flux = 0.0;
    let mut residual2 = 0.0;
    for (x, y, z) in pixels.iter() {
        let m = model.evaluate(x, y);
        flux += m;
        residual2 += (m - z).powi(2);
    }
    (flux, residual2.sqrt())
}

/// Poisson term of the source plus sky noise over `pixels`.
fn aperture_noise(flux: f64, sky_noise: f64, pixels: usize) -> f64 {
    (flux.abs() + sky_noise * sky_noise * pixels as f64).sqrt()
}
