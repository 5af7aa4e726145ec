//! Point-spread-function models.
//!
//! The Moffat profile models a stellar PSF with extended wings:
//!
//! I(r) = A × (1 + (r/α)²)^(-β)
//!
//! where r is the distance from the centre (x₀, y₀), α is the core width and
//! β the wing slope. Its total flux πα²A/(β − 1) is finite only for β > 1,
//! which is also what makes a Kron-style enclosed-light radius exist.
//!
//! [`PsfModel`] and [`PsfShape`] are tagged over the supported profile
//! families so evaluation, FWHM and flux integrals dispatch on the tag.


use std::f64::consts::PI;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::UndefinedIntegral;

/// Supported PSF profile families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PsfFamily {
    Moffat,
}

/// Parameters of a circular Moffat profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Moffat {
    /// Peak intensity A.
    pub amplitude: f64,
    /// Core width α in pixels.
    pub alpha: f64,
    /// Wing slope β.
    pub beta: f64,
    /// Profile centre (x₀, y₀).
    pub center: DVec2,
}

/// Analytic enclosed flux for a Kron-style light fraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FluxIntegral {
    /// Fraction of the total light enclosed.
    pub fraction: f64,
    /// Flux inside `radius`.
    pub flux: f64,
    /// First-order propagated error of `flux`, when parameter errors were given.
    pub flux_err: Option<f64>,
    /// Radius enclosing `fraction` of the light.
    pub radius: f64,
}

impl Moffat {
    #[inline]
    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        let r2 = (x - self.center.x).powi(2) + (y - self.center.y).powi(2);
        moffat_profile(r2, self.amplitude, self.alpha, self.beta)
    }

    #[inline]
    pub fn fwhm(&self) -> f64 {
        moffat_fwhm(self.alpha, self.beta)
    }

    /// Flux inside radius `r`: πα²A/(β − 1) · (1 − (1 + r²/α²)^(1 − β)).
    pub fn enclosed_flux(&self, r: f64) -> Result<f64, UndefinedIntegral> {
        if !(self.beta > 1.0) {
            return Err(UndefinedIntegral {
                beta: self.beta,
                fraction: f64::NAN,
            });
        }
        let alpha2 = self.alpha * self.alpha;
        let total = PI * alpha2 * self.amplitude / (self.beta - 1.0);
        Ok(total * (1.0 - (1.0 + r * r / alpha2).powf(1.0 - self.beta)))
    }

    /// Flux and radius for enclosed light `fraction`.
    ///
    /// With `errors`, the flux error is the quadrature sum of the partial
    /// derivatives of fπα²A/(β − 1) times each parameter error.
    pub fn flux_integral(
        &self,
        fraction: f64,
        errors: Option<&Moffat>,
    ) -> Result<FluxIntegral, UndefinedIntegral> {
        let radius = moffat_kron_radius(self.alpha, self.beta, fraction)?;
        let alpha = self.alpha.abs();
        let b1 = self.beta - 1.0;
        let flux = fraction * PI * alpha * alpha * self.amplitude / b1;

        let flux_err = errors.map(|err| {
            let d_amplitude = fraction * PI * alpha * alpha / b1;
            let d_alpha = 2.0 * fraction * PI * alpha * self.amplitude / b1;
            let d_beta = flux / b1;
            ((d_amplitude * err.amplitude).powi(2)
                + (d_alpha * err.alpha).powi(2)
                + (d_beta * err.beta).powi(2))
            .sqrt()
        });

        Ok(FluxIntegral {
            fraction,
            flux,
            flux_err,
            radius,
        })
    }
}

#[inline]
pub(crate) fn moffat_profile(r2: f64, amplitude: f64, alpha: f64, beta: f64) -> f64 {
    amplitude * (1.0 + r2 / (alpha * alpha)).powf(-beta)
}

/// FWHM = |α| · 2√(2^(1/β) − 1).
///
/// Returns 0 when the shape has no half-maximum radius (β ≤ 0, or anything
/// that makes 2^(1/β) − 1 non-positive).
pub fn moffat_fwhm(alpha: f64, beta: f64) -> f64 {
    if beta == 0.0 {
        return 0.0;
    }
    let term = 2.0f64.powf(1.0 / beta) - 1.0;
    if term.is_nan() || term <= 0.0 {
        return 0.0;
    }
    alpha.abs() * 2.0 * term.sqrt()
}

/// Inverse of [`moffat_fwhm`] for a known β.
pub fn moffat_fwhm_to_alpha(fwhm: f64, beta: f64) -> f64 {
    fwhm / (2.0 * (2.0f64.powf(1.0 / beta) - 1.0).sqrt())
}

/// Radius enclosing `fraction` of the light: α√((1 − f)^(1/(1 − β)) − 1).
pub fn moffat_kron_radius(alpha: f64, beta: f64, fraction: f64) -> Result<f64, UndefinedIntegral> {
    if !(beta > 1.0) || !(fraction > 0.0 && fraction < 1.0) {
        return Err(UndefinedIntegral { beta, fraction });
    }
    Ok(alpha.abs() * ((1.0 - fraction).powf(1.0 / (1.0 - beta)) - 1.0).sqrt())
}

/// A fitted or synthesized PSF, tagged by family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PsfModel {
    Moffat(Moffat),
}

impl PsfModel {
    pub fn family(&self) -> PsfFamily {
        match self {
            Self::Moffat(_) => PsfFamily::Moffat,
        }
    }

    #[inline]
    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        match self {
            Self::Moffat(m) => m.evaluate(x, y),
        }
    }

    pub fn fwhm(&self) -> f64 {
        match self {
            Self::Moffat(m) => m.fwhm(),
        }
    }

    pub fn amplitude(&self) -> f64 {
        match self {
            Self::Moffat(m) => m.amplitude,
        }
    }

    pub fn center(&self) -> DVec2 {
        match self {
            Self::Moffat(m) => m.center,
        }
    }

    pub fn shape(&self) -> PsfShape {
        match self {
            Self::Moffat(m) => PsfShape::Moffat {
                alpha: m.alpha,
                beta: m.beta,
            },
        }
    }

    /// Analytic flux integral; `errors` must be of the same family.
    pub fn flux_integral(
        &self,
        fraction: f64,
        errors: Option<&PsfModel>,
    ) -> Result<FluxIntegral, UndefinedIntegral> {
        match (self, errors) {
            (Self::Moffat(m), Some(Self::Moffat(e))) => m.flux_integral(fraction, Some(e)),
            (Self::Moffat(m), None) => m.flux_integral(fraction, None),
        }
    }
}

/// Profile shape without amplitude or position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PsfShape {
    Moffat { alpha: f64, beta: f64 },
}

impl PsfShape {
    pub fn family(&self) -> PsfFamily {
        match self {
            Self::Moffat { .. } => PsfFamily::Moffat,
        }
    }

    pub fn fwhm(&self) -> f64 {
        match *self {
            Self::Moffat { alpha, beta } => moffat_fwhm(alpha, beta),
        }
    }

    /// Radius enclosing `fraction` of the light.
    pub fn kron_radius(&self, fraction: f64) -> Result<f64, UndefinedIntegral> {
        match *self {
            Self::Moffat { alpha, beta } => moffat_kron_radius(alpha, beta, fraction),
        }
    }

    /// Place this shape at `center` with peak `amplitude`.
    pub fn to_model(&self, amplitude: f64, center: DVec2) -> PsfModel {
        match *self {
            Self::Moffat { alpha, beta } => PsfModel::Moffat(Moffat {
                amplitude,
                alpha: alpha.abs(),
                beta,
                center,
            }),
        }
    }
}

/// Externally measured PSF shape (typically from bright reference stars in
/// the same exposure) with its one-sigma uncertainties.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapePrior {
    pub shape: PsfShape,
    /// Uncertainties in the same layout as `shape`.
    pub errors: PsfShape,
}

impl ShapePrior {
    pub fn moffat(alpha: f64, alpha_err: f64, beta: f64, beta_err: f64) -> Self {
        Self {
            shape: PsfShape::Moffat { alpha, beta },
            errors: PsfShape::Moffat {
                alpha: alpha_err,
                beta: beta_err,
            },
        }
    }

    pub fn fwhm(&self) -> f64 {
        self.shape.fwhm()
    }
}
