//! Error types for fitting and photometry.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Numerical failure of a sky or PSF fit.
#[derive(Debug, Clone, Copy, PartialEq, Error, Serialize, Deserialize)]
pub enum FitError {
    #[error("Pixel sample too small to fit: {pixels} pixels, need at least {required}")]
    DegeneratePixelBox { pixels: usize, required: usize },

    #[error("No sky annulus pixels inside the image")]
    EmptyAnnulus,

    #[error("Normal equations became singular after {evaluations} evaluations")]
    SingularSystem { evaluations: usize },

    #[error("Covariance matrix is singular or not positive")]
    SingularCovariance,

    #[error("Optimizer did not converge within {evaluations} evaluations")]
    EvaluationLimit { evaluations: usize },

    #[error("Model evaluation produced non-finite values after {evaluations} evaluations")]
    NonFinite { evaluations: usize },
}

impl FitError {
    /// Evaluations spent before the failure, when the optimizer ran at all.
    pub fn evaluations(&self) -> Option<usize> {
        match self {
            Self::SingularSystem { evaluations }
            | Self::EvaluationLimit { evaluations }
            | Self::NonFinite { evaluations } => Some(*evaluations),
            Self::DegeneratePixelBox { .. } | Self::EmptyAnnulus | Self::SingularCovariance => {
                None
            }
        }
    }
}

/// Flux-integral and Kron-radius formulas are only defined for a convergent
/// profile (`beta > 1`) and an enclosed fraction strictly inside (0, 1).
#[derive(Debug, Clone, Copy, PartialEq, Error, Serialize, Deserialize)]
#[error("Flux integral undefined for beta = {beta}, fraction = {fraction}")]
pub struct UndefinedIntegral {
    pub beta: f64,
    pub fraction: f64,
}

/// Why a photometric measurement could not be produced.
#[derive(Debug, Clone, Copy, PartialEq, Error, Serialize, Deserialize)]
pub enum PhotometryError {
    #[error("PSF shape is invalid (FWHM = {fwhm})")]
    InvalidShape { fwhm: f64 },

    #[error(transparent)]
    UndefinedIntegral(#[from] UndefinedIntegral),

    #[error("Aperture radius must be positive and finite, got {radius}")]
    InvalidRadius { radius: f64 },

    #[error("Aperture of radius {radius} contains no image pixels")]
    EmptyAperture { radius: f64 },

    #[error("No validated PSF fit available for model photometry")]
    FitUnavailable,
}
