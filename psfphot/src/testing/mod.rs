//! Testing utilities for psfphot.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::image::Image;
use crate::psf::{Moffat, PsfModel};
use crate::sky::{AnnulusChoice, SkyFit, SkyModel, SkyPlane};

/// Initialize tracing subscriber for tests.
/// Safe to call multiple times - will only initialize once.
/// Respects RUST_LOG env var, defaults to "info".
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Seeded random source so every noisy test image is reproducible.
pub struct TestRng(StdRng);

impl TestRng {
    pub fn new(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }

    /// Uniform in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        self.0.random::<f64>()
    }

    /// Standard normal sample (Box-Muller).
    pub fn next_gaussian(&mut self) -> f64 {
        let u1 = self.next_f64().max(f64::MIN_POSITIVE);
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

/// Sky model with an exact flat plane and the given noise.
pub fn flat_sky(level: f64, noise: f64) -> SkyModel {
    SkyModel::Fitted(SkyFit {
        plane: SkyPlane::new(0.0, 0.0, level),
        errors: SkyPlane::default(),
        noise,
        reduced_chi2: 1.0,
        annulus: AnnulusChoice::Inner,
        pixels: 100,
        retried: false,
        evaluations: 0,
    })
}

/// Noiseless sky plane.
pub fn plane_image(width: usize, height: usize, plane: SkyPlane) -> Image {
    Image::from_fn(width, height, |x, y| plane.evaluate(x as f64, y as f64))
}

/// Noiseless Moffat source on top of a sky plane.
pub fn moffat_image(width: usize, height: usize, plane: SkyPlane, source: Moffat) -> Image {
    let model = PsfModel::Moffat(source);
    Image::from_fn(width, height, |x, y| {
        let (fx, fy) = (x as f64, y as f64);
        plane.evaluate(fx, fy) + model.evaluate(fx, fy)
    })
}

/// Add Gaussian noise with per-pixel sigma √(source + sky_sigma²), where the
/// source signal is the value above `sky_level`.
pub fn add_photon_noise(image: &Image, sky_level: f64, sky_sigma: f64, seed: u64) -> Image {
    let mut rng = TestRng::new(seed);
    let mut noisy = image.clone();
    for p in noisy.pixels_mut() {
        let signal = (*p - sky_level).max(0.0);
        *p += rng.next_gaussian() * (signal + sky_sigma * sky_sigma).sqrt();
    }
    noisy
}

/// Add Gaussian noise with constant sigma.
pub fn add_gaussian_noise(image: &Image, sigma: f64, seed: u64) -> Image {
    let mut rng = TestRng::new(seed);
    let mut noisy = image.clone();
    for p in noisy.pixels_mut() {
        *p += rng.next_gaussian() * sigma;
    }
    noisy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_is_deterministic() {
        let mut a = TestRng::new(42);
        let mut b = TestRng::new(42);
        for _ in 0..10 {
            assert_eq!(a.next_f64(), b.next_f64());
        }
    }

    #[test]
    fn test_gaussian_moments() {
        let mut rng = TestRng::new(7);
        let samples: Vec<f64> = (0..20_000).map(|_| rng.next_gaussian()).collect();
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / samples.len() as f64;
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - 1.0).abs() < 0.05, "variance {var}");
    }
}
