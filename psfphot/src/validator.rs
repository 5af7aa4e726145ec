//! Physical sanity checks for fitted and supplied PSF shapes.
//!
//! A converged optimizer says nothing about whether the profile is a star:
//! sub-pixel or huge widths, flux that never converges, or a centre that
//! wandered onto a neighbour are all rejected here.

use glam::DVec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ValidationConfig;
use crate::fitter::FitModeKind;
use crate::psf::{PsfModel, PsfShape};

/// Why a fit or shape prior was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Error, Serialize, Deserialize)]
pub enum Rejection {
    #[error("FWHM {fwhm:.3} outside [{min}, {max}]")]
    FwhmOutOfRange { fwhm: f64, min: f64, max: f64 },

    #[error("Profile slope {beta:.3} <= {min_beta}, flux integral diverges")]
    DivergentShape { beta: f64, min_beta: f64 },

    #[error("Fitted centre drifted {offset:.2} px from the source (limit {max})")]
    CenterDrift { offset: f64, max: f64 },

    #[error("Fitted amplitude {amplitude} is not positive")]
    NonPositiveAmplitude { amplitude: f64 },
}

/// Check a bare shape: FWHM within bounds and a convergent profile.
pub fn validate_shape(shape: &PsfShape, config: &ValidationConfig) -> Result<(), Rejection> {
    let fwhm = shape.fwhm();
    if !(fwhm >= config.min_fwhm && fwhm <= config.max_fwhm) {
        return Err(Rejection::FwhmOutOfRange {
            fwhm,
            min: config.min_fwhm,
            max: config.max_fwhm,
        });
    }

    match *shape {
        PsfShape::Moffat { beta, .. } => {
            if !(beta > config.min_beta) {
                return Err(Rejection::DivergentShape {
                    beta,
                    min_beta: config.min_beta,
                });
            }
        }
    }
    Ok(())
}

/// Check a fitted model produced in `mode` for a source nominally at `nominal`.
///
/// Centre drift and amplitude sign are only checked for the free fit; the
/// other modes either fix the centre or accept any amplitude a forced
/// measurement produces.
pub fn validate(
    model: &PsfModel,
    nominal: DVec2,
    mode: FitModeKind,
    config: &ValidationConfig,
) -> Result<(), Rejection> {
    validate_shape(&model.shape(), config)?;

    if mode == FitModeKind::Free {
        let offset = model.center().distance(nominal);
        if !(offset <= config.max_center_offset) {
            return Err(Rejection::CenterDrift {
                offset,
                max: config.max_center_offset,
            });
        }

        let amplitude = model.amplitude();
        if !(amplitude > 0.0) {
            return Err(Rejection::NonPositiveAmplitude { amplitude });
        }
    }
    Ok(())
}
