//! Point-source photometry pipeline.
//!
//! [`PhotometryEngine`] holds only configuration, so one engine can be shared
//! across threads and every call is independent:
//!
//! 1. Sky plane and noise from an annulus around the source
//! 2. PSF fit in a sky-subtracted box ([`FitMode`] picks the free parameters)
//! 3. Validation of the fitted shape
//! 4. Flux summed over a Kron aperture clipped to [1, 3·FWHM] px
//!
//! Each stage is also exposed on its own for callers that reuse a sky model
//! or a shape measured elsewhere.

mod photometry;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::PhotometryError;
use crate::fitter::{FitMode, FitOutcome, PsfFit, fit_psf};
use crate::image::Image;
use crate::sky::{SkyModel, fit_sky};

pub use photometry::{
    ApertureRadius, AperturePoint, CURVE_POINTS, CurveSource, PhotometryMethod,
    PhotometryResult, optimal_aperture_radius,
};

/// Everything produced by one [`PhotometryEngine::measure`] call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub sky: SkyModel,
    pub fit: FitOutcome,
    pub photometry: Result<PhotometryResult, PhotometryError>,
}

/// Photometry engine.
///
/// # Example
///
/// ```rust,ignore
/// use psfphot::{Config, FitMode, PhotometryEngine};
///
/// let engine = PhotometryEngine::new(Config::default());
/// let measurement = engine.measure(&image, position, &FitMode::Free { seed_fwhm: 3.5 });
/// if let Ok(result) = measurement.photometry {
///     println!("flux {} ± {}", result.flux, result.flux_err);
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct PhotometryEngine {
    config: Config,
}

impl PhotometryEngine {
    /// Create an engine, panicking if `config` is invalid.
    pub fn new(config: Config) -> Self {
        config.validate();
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fit the local sky plane around `position`.
    pub fn fit_sky(&self, image: &Image, position: DVec2) -> SkyModel {
        fit_sky(image, position, &self.config)
    }

    /// Fit and validate a PSF at `position` against an already fitted sky.
    pub fn fit_psf(
        &self,
        image: &Image,
        position: DVec2,
        sky: &SkyModel,
        mode: &FitMode,
    ) -> FitOutcome {
        fit_psf(image, position, sky, mode, &self.config)
    }

    /// Sum a fitted model over its optimal aperture centred on `position`.
    pub fn psf_photometry(
        &self,
        image: &Image,
        position: DVec2,
        sky: &SkyModel,
        fit: &PsfFit,
    ) -> Result<PhotometryResult, PhotometryError> {
        let result = photometry::psf_photometry(image, position, sky, fit, &self.config);
        self.log_result(position, &result);
        result
    }

    /// Sum sky-subtracted pixels inside `aperture`.
    pub fn aperture_photometry(
        &self,
        image: &Image,
        position: DVec2,
        sky: &SkyModel,
        aperture: &ApertureRadius,
    ) -> Result<PhotometryResult, PhotometryError> {
        let result =
            photometry::aperture_photometry(image, position, sky, aperture, &self.config);
        self.log_result(position, &result);
        result
    }

    /// Flux and SNR as a function of aperture radius.
    pub fn aperture_curve(
        &self,
        image: &Image,
        position: DVec2,
        sky: &SkyModel,
        source: CurveSource<'_>,
    ) -> Result<Vec<AperturePoint>, PhotometryError> {
        let curve = photometry::aperture_curve(image, position, sky, source, &self.config)?;
        if self.config.detailed() {
            for point in &curve {
                tracing::debug!(
                    radius = point.radius,
                    flux = point.flux,
                    noise = point.noise,
                    snr = point.snr,
                    "Aperture curve"
                );
            }
        }
        Ok(curve)
    }

    /// Run sky fitting, PSF fitting, validation and PSF photometry.
    pub fn measure(&self, image: &Image, position: DVec2, mode: &FitMode) -> Measurement {
        let sky = self.fit_sky(image, position);
        let fit = self.fit_psf(image, position, &sky, mode);
        let photometry = match fit.success() {
            Some(psf_fit) => {
                if self.config.detailed() {
                    let source = CurveSource::Model(psf_fit);
                    if let Err(err) = self.aperture_curve(image, position, &sky, source) {
                        tracing::debug!(
                            x = position.x,
                            y = position.y,
                            "No aperture curve: {err}"
                        );
                    }
                }
                self.psf_photometry(image, position, &sky, psf_fit)
            }
            None => Err(PhotometryError::FitUnavailable),
        };

        Measurement {
            sky,
            fit,
            photometry,
        }
    }

    fn log_result(&self, position: DVec2, result: &Result<PhotometryResult, PhotometryError>) {
        match result {
            Ok(result) => {
                if self.config.summary() {
                    tracing::info!(
                        x = position.x,
                        y = position.y,
                        method = ?result.method,
                        flux = result.flux,
                        flux_err = result.flux_err,
                        snr = result.snr,
                        radius = result.radius,
                        "Photometry"
                    );
                }
            }
            Err(err) => {
                tracing::warn!(
                    x = position.x,
                    y = position.y,
                    "Photometry failed: {err}"
                );
            }
        }
    }
}
