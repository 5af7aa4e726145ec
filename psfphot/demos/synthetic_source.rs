//! Example: Measure a synthetic point source
//!
//! Renders a Moffat source on a tilted sky with Gaussian noise, then runs the
//! full pipeline in all three fit modes and logs the results.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example synthetic_source
//! PSFPHOT_CONFIG=config.json PSFPHOT_LOG_DIR=logs cargo run --example synthetic_source
//! ```
//!
//! `PSFPHOT_CONFIG` points at a JSON file with any subset of `Config` fields.

use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use common::FloatExt;
use glam::DVec2;
use psfphot::psf::moffat_fwhm_to_alpha;
use psfphot::{
    ApertureRadius, Config, FitMode, Image, PhotometryEngine, PsfModel, PsfShape, ShapePrior,
    SkyPlane, Verbosity,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const WIDTH: usize = 160;
const HEIGHT: usize = 160;
const SKY_NOISE: f64 = 8.0;
const TRUE_FWHM: f64 = 4.2;
const TRUE_BETA: f64 = 3.5;

fn main() -> anyhow::Result<()> {
    let log_dir = env::var("PSFPHOT_LOG_DIR").ok().map(PathBuf::from);
    common::setup_logging("info", log_dir.as_deref())?;

    let config = load_config()?;
    let engine = PhotometryEngine::new(config);

    let shape = PsfShape::Moffat {
        alpha: moffat_fwhm_to_alpha(TRUE_FWHM, TRUE_BETA),
        beta: TRUE_BETA,
    };
    let truth = shape.to_model(1500.0, DVec2::new(80.4, 79.7));
    let sky = SkyPlane::new(0.015, -0.01, 250.0);
    let image = render(&truth, sky, 17);
    let position = DVec2::new(80.0, 80.0);

    let true_flux = truth
        .flux_integral(engine.config().kron_fraction, None)
        .context("Synthetic profile has no finite flux")?
        .flux;
    let peak = image.pixels().iter().copied().fold(f64::MIN, f64::max);
    let family = shape.family();
    tracing::info!(?family, fwhm = truth.fwhm(), flux_90 = true_flux, peak, "Synthetic source");

    let PsfShape::Moffat { alpha, beta } = shape;
    let prior = ShapePrior::moffat(alpha, 0.05, beta, 0.1);
    let modes = [
        ("free", FitMode::Free { seed_fwhm: 3.5 }),
        ("fixed shape", FitMode::FixedShape(prior)),
        ("flux only", FitMode::FluxOnly(prior)),
    ];

    for (name, mode) in modes {
        let measurement = engine.measure(&image, position, &mode);
        match measurement.photometry {
            Ok(result) => {
                let analytic = result.integral.map(|i| i.flux).unwrap_or(f64::NAN);
                tracing::info!(
                    mode = name,
                    flux = result.flux,
                    flux_err = result.flux_err,
                    snr = result.snr,
                    mag_err = result.magnitude_error(),
                    radius = result.radius,
                    analytic_flux = analytic,
                    matches_truth = analytic.relative_eq(true_flux, 0.05),
                    "Measured"
                );
            }
            Err(err) => tracing::warn!(mode = name, fit = ?measurement.fit, "No photometry: {err}"),
        }
    }

    let sky_model = engine.fit_sky(&image, position);
    let aperture = engine.aperture_photometry(
        &image,
        position,
        &sky_model,
        &ApertureRadius::FromShape(prior),
    )?;
    tracing::info!(
        flux = aperture.flux,
        flux_err = aperture.flux_err,
        snr = aperture.snr,
        radius = aperture.radius,
        "Aperture photometry"
    );

    Ok(())
}

fn load_config() -> anyhow::Result<Config> {
    let Ok(path) = env::var("PSFPHOT_CONFIG") else {
        return Ok(Config {
            verbosity: Verbosity::Summary,
            ..Default::default()
        });
    };
    let text = fs::read_to_string(&path).with_context(|| format!("Failed to read {path}"))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid config in {path}"))
}

fn render(model: &PsfModel, sky: SkyPlane, seed: u64) -> Image {
    let mut rng = StdRng::seed_from_u64(seed);
    Image::from_fn(WIDTH, HEIGHT, |x, y| {
        let (fx, fy) = (x as f64, y as f64);
        let signal = model.evaluate(fx, fy);
        let sigma = (signal + SKY_NOISE * SKY_NOISE).sqrt();
        sky.evaluate(fx, fy) + signal + sigma * gaussian(&mut rng)
    })
}

/// Box-Muller standard normal sample.
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
