//! Configuration types for the photometry engine.
//!
//! This module defines the flat [`Config`] struct used by
//! [`PhotometryEngine`](crate::PhotometryEngine). Parameters are grouped by
//! comments into pipeline stages. Every type deserializes with defaults for
//! missing fields, so drivers can load partial settings from JSON.

use serde::{Deserialize, Serialize};

use crate::fitting::LmConfig;

// ============================================================================
// Enums
// ============================================================================

/// How much the engine reports through `tracing`.
///
/// Failures and rejections are always logged at `warn`. This only controls
/// the informational output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// No informational logging.
    #[default]
    Quiet,
    /// One `info` line per fit and per photometric measurement.
    Summary,
    /// Summary plus `debug` aperture curves.
    Detailed,
}

// ============================================================================
// Fit Validation
// ============================================================================

/// Physical sanity bounds for a fitted or supplied PSF shape.
///
/// The defaults are empirical for ground-based seeing on a typical CCD pixel
/// scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Smallest acceptable FWHM in pixels.
    pub min_fwhm: f64,
    /// Largest acceptable FWHM in pixels.
    pub max_fwhm: f64,
    /// Largest distance between the fitted and the nominal centre (free fit only).
    pub max_center_offset: f64,
    /// The Moffat slope must exceed this for the flux integral to converge.
    pub min_beta: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_fwhm: 1.0,
            max_fwhm: 20.0,
            max_center_offset: 10.0,
            min_beta: 1.0,
        }
    }
}

impl ValidationConfig {
    pub fn validate(&self) {
        assert!(
            self.min_fwhm >= 0.0,
            "min_fwhm must be non-negative, got {}",
            self.min_fwhm
        );
        assert!(
            self.max_fwhm >= self.min_fwhm,
            "max_fwhm ({}) must be >= min_fwhm ({})",
            self.max_fwhm,
            self.min_fwhm
        );
        assert!(
            self.max_center_offset > 0.0,
            "max_center_offset must be positive, got {}",
            self.max_center_offset
        );
        assert!(
            self.min_beta >= 1.0,
            "min_beta must be >= 1 for a finite flux integral, got {}",
            self.min_beta
        );
    }
}

// ============================================================================
// Photometry Engine Configuration
// ============================================================================

/// Configuration for sky fitting, PSF fitting and photometry.
///
/// # Example
///
/// ```rust,ignore
/// use psfphot::{Config, Verbosity};
///
/// let mut config = Config::default();
/// config.verbosity = Verbosity::Summary;
/// config.subtract_sky = false;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // -- Sky background --
    /// FWHM in pixels that scales the sky annuli ([4, 5] and [6, 7] × FWHM).
    pub sky_annulus_fwhm: f64,
    /// Subtract the fitted sky plane before PSF fitting and photometry.
    /// The sky is fitted either way since its noise weights the PSF fit.
    pub subtract_sky: bool,
    /// Optimizer settings for the sky plane.
    pub sky_fit: LmConfig,

    // -- PSF fitting --
    /// Half-width of the fitting box in units of the PSF FWHM.
    pub box_half_width_fwhm: f64,
    /// Initial Moffat β for the free fit.
    pub seed_beta: f64,
    /// FWHM/α ratio used to seed α for the free fit.
    pub fwhm_per_alpha: f64,
    /// Lower bound on per-pixel sigma, keeps weights finite on noiseless data.
    pub min_pixel_sigma: f64,
    /// Optimizer settings for the free (5-parameter) fit.
    pub free_fit: LmConfig,
    /// Optimizer settings for the fixed-shape and flux-only fits.
    pub fixed_fit: LmConfig,

    // -- Validation --
    pub validation: ValidationConfig,

    // -- Photometry --
    /// Fraction of the total light that defines the Kron aperture.
    pub kron_fraction: f64,
    /// Upper aperture bound in units of FWHM.
    pub max_aperture_fwhm: f64,
    /// Pixels below `-clean_sigma * noise` are dropped from raw aperture curves.
    pub clean_sigma: f64,

    // -- Reporting --
    pub verbosity: Verbosity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Sky background
            sky_annulus_fwhm: 5.0,
            subtract_sky: true,
            sky_fit: LmConfig::with_max_evaluations(100_000),

            // PSF fitting
            box_half_width_fwhm: 3.0,
            seed_beta: 4.765,
            fwhm_per_alpha: 0.7914,
            min_pixel_sigma: 1e-6,
            free_fit: LmConfig::with_max_evaluations(1_000_000),
            fixed_fit: LmConfig::with_max_evaluations(100_000),

            // Validation
            validation: ValidationConfig::default(),

            // Photometry
            kron_fraction: 0.9,
            max_aperture_fwhm: 3.0,
            clean_sigma: 5.0,

            // Reporting
            verbosity: Verbosity::Quiet,
        }
    }
}

impl Config {
    /// Validate the configuration, panicking if invalid.
    pub fn validate(&self) {
        // Sky
        assert!(
            self.sky_annulus_fwhm > 0.0,
            "sky_annulus_fwhm must be positive, got {}",
            self.sky_annulus_fwhm
        );
        self.sky_fit.validate();

        // PSF fitting
        assert!(
            self.box_half_width_fwhm > 0.0,
            "box_half_width_fwhm must be positive, got {}",
            self.box_half_width_fwhm
        );
        assert!(
            self.seed_beta > 1.0,
            "seed_beta must be > 1, got {}",
            self.seed_beta
        );
        assert!(
            self.fwhm_per_alpha > 0.0,
            "fwhm_per_alpha must be positive, got {}",
            self.fwhm_per_alpha
        );
        assert!(
            self.min_pixel_sigma > 0.0,
            "min_pixel_sigma must be positive, got {}",
            self.min_pixel_sigma
        );
        self.free_fit.validate();
        self.fixed_fit.validate();

        // Validation
        self.validation.validate();

        // Photometry
        assert!(
            self.kron_fraction > 0.0 && self.kron_fraction < 1.0,
            "kron_fraction must be in (0, 1), got {}",
            self.kron_fraction
        );
        assert!(
            self.max_aperture_fwhm > 0.0,
            "max_aperture_fwhm must be positive, got {}",
            self.max_aperture_fwhm
        );
        assert!(
            self.clean_sigma > 0.0,
            "clean_sigma must be positive, got {}",
            self.clean_sigma
        );
    }

    pub(crate) fn summary(&self) -> bool {
        self.verbosity >= Verbosity::Summary
    }

    pub(crate) fn detailed(&self) -> bool {
        self.verbosity >= Verbosity::Detailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate();
    }

    #[test]
    fn test_default_evaluation_ceilings() {
        let config = Config::default();
        assert_eq!(config.free_fit.max_evaluations, 1_000_000);
        assert_eq!(config.fixed_fit.max_evaluations, 100_000);
        assert_eq!(config.sky_fit.max_evaluations, 100_000);
    }

    #[test]
    #[should_panic(expected = "kron_fraction must be in (0, 1)")]
    fn test_invalid_kron_fraction_panics() {
        let config = Config {
            kron_fraction: 1.0,
            ..Default::default()
        };
        config.validate();
    }

    #[test]
    #[should_panic(expected = "max_fwhm")]
    fn test_inverted_fwhm_bounds_panic() {
        let mut config = Config::default();
        config.validation.min_fwhm = 5.0;
        config.validation.max_fwhm = 2.0;
        config.validate();
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "subtract_sky": false, "verbosity": "Detailed" }"#).unwrap();
        assert!(!config.subtract_sky);
        assert!(config.detailed());
        assert_eq!(config.kron_fraction, 0.9);
        assert_eq!(config.validation, ValidationConfig::default());
    }

    #[test]
    fn test_verbosity_ordering() {
        assert!(Verbosity::Detailed > Verbosity::Summary);
        assert!(Verbosity::Summary > Verbosity::Quiet);
    }
}
