//! Psfphot - Point-source PSF photometry.
//!
//! Measures the flux of a single point source at a known position:
//! - Local sky background as a fitted plane with a noise estimate
//! - Moffat PSF fitting (free, fixed shape, or flux only)
//! - Physical validation of the fitted profile
//! - Flux and SNR over an optimal Kron aperture, or a raw aperture
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use glam::DVec2;
//! use psfphot::{Config, FitMode, Image, PhotometryEngine};
//!
//! let image = Image::new(width, height, pixels);
//! let engine = PhotometryEngine::new(Config::default());
//! let position = DVec2::new(412.3, 288.9);
//! let measurement = engine.measure(&image, position, &FitMode::Free { seed_fwhm: 4.0 });
//!
//! match measurement.photometry {
//!     Ok(result) => println!("flux {} ± {}, SNR {}", result.flux, result.flux_err, result.snr),
//!     Err(err) => println!("no measurement: {err}"),
//! }
//! ```

pub mod aperture;
mod config;
mod engine;
mod error;
pub mod fitter;
pub mod fitting;
mod image;
pub mod psf;
pub mod sky;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Core types
// ============================================================================

pub use aperture::PixelSet;
pub use image::Image;

// ============================================================================
// Configuration
// ============================================================================

pub use config::{Config, ValidationConfig, Verbosity};
pub use fitting::LmConfig;

// ============================================================================
// Errors
// ============================================================================

pub use error::{FitError, PhotometryError, UndefinedIntegral};
pub use validator::Rejection;

// ============================================================================
// PSF models
// ============================================================================

pub use psf::{FluxIntegral, Moffat, PsfFamily, PsfModel, PsfShape, ShapePrior};

// ============================================================================
// Sky and fitting
// ============================================================================

pub use fitter::{FitMode, FitModeKind, FitOutcome, PsfFit, SkipReason};
pub use sky::{AnnulusChoice, SkyFit, SkyModel, SkyPlane};

// ============================================================================
// Photometry
// ============================================================================

pub use engine::{
    ApertureRadius, AperturePoint, CURVE_POINTS, CurveSource, Measurement, PhotometryEngine,
    PhotometryMethod, PhotometryResult, optimal_aperture_radius,
};
