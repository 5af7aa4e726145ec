use super::*;
use crate::testing::{add_gaussian_noise, init_tracing, plane_image};

#[test]
fn test_noiseless_plane_recovered() {
    init_tracing();
    let truth = SkyPlane::new(0.01, -0.02, 100.0);
    let image = plane_image(128, 128, truth);

    let sky = fit_sky(&image, DVec2::new(64.0, 64.0), &Config::default());
    let fit = sky.fit().expect("sky fit should succeed");

    assert!((fit.plane.a - 0.01).abs() < 1e-8, "a = {}", fit.plane.a);
    assert!((fit.plane.b + 0.02).abs() < 1e-8, "b = {}", fit.plane.b);
    assert!((fit.plane.c - 100.0).abs() < 1e-6, "c = {}", fit.plane.c);
    assert!(fit.noise < 1e-6, "noise = {}", fit.noise);
    assert!(fit.errors.c < 1e-6);
}

#[test]
fn test_rounding_residuals_give_zero_reduced_chi2() {
    let image = plane_image(128, 128, SkyPlane::new(0.0, 0.0, 100.0));
    let fit = *fit_sky(&image, DVec2::new(64.0, 64.0), &Config::default())
        .fit()
        .unwrap();

    assert!(fit.noise < 1e-9, "noise = {}", fit.noise);
    assert_eq!(fit.reduced_chi2, 0.0);
}

#[test]
fn test_singular_covariance_keeps_plane_with_zero_errors() {
    // A single column leaves the x slope unconstrained
    let image = plane_image(1, 200, SkyPlane::new(0.0, 0.01, 50.0));
    let sky = fit_sky(&image, DVec2::new(0.0, 100.0), &Config::default());

    let SkyModel::Fitted(fit) = sky else {
        panic!("expected a fitted sky, got {sky:?}");
    };
    assert!(fit.retried);
    assert_eq!(fit.errors, SkyPlane::default());
    let at_source = fit.plane.evaluate(0.0, 100.0);
    assert!((at_source - 51.0).abs() < 1e-6, "sky at source = {at_source}");
}

#[test]
fn test_noise_and_reduced_chi2_on_noisy_sky() {
    let flat = plane_image(128, 128, SkyPlane::new(0.0, 0.0, 50.0));
    let image = add_gaussian_noise(&flat, 4.0, 11);
    let sky = fit_sky(&image, DVec2::new(64.0, 64.0), &Config::default());
    let fit = sky.fit().unwrap();

    assert!((fit.noise - 4.0).abs() < 0.4, "noise = {}", fit.noise);
    let at_source = fit.plane.evaluate(64.0, 64.0);
    assert!((at_source - 50.0).abs() < 0.6, "sky at source = {at_source}");
    // Residuals have zero mean, so Σ(r/σ)² = n exactly.
    let expected = fit.pixels as f64 / (fit.pixels - 3) as f64;
    assert!((fit.reduced_chi2 - expected).abs() < 1e-9);
    assert!(fit.errors.c > 0.0);
}

#[test]
fn test_lower_mean_annulus_selected() {
    let center = DVec2::new(64.0, 64.0);
    // Contaminate the inner annulus (radii 20..25) with a ring of extra light
    let image = Image::from_fn(128, 128, |x, y| {
        let d = ((x as f64 - center.x).powi(2) + (y as f64 - center.y).powi(2)).sqrt();
        if (19.5..25.5).contains(&d) {
            180.0
        } else {
            100.0
        }
    });

    let fit = *fit_sky(&image, center, &Config::default()).fit().unwrap();
    assert_eq!(fit.annulus, AnnulusChoice::Outer);
    assert!((fit.plane.c - 100.0).abs() < 1e-6);
}

#[test]
fn test_equal_annuli_prefer_inner() {
    let image = plane_image(128, 128, SkyPlane::new(0.0, 0.0, 10.0));
    let fit = *fit_sky(&image, DVec2::new(64.0, 64.0), &Config::default())
        .fit()
        .unwrap();
    assert_eq!(fit.annulus, AnnulusChoice::Inner);
}

#[test]
fn test_source_outside_image_is_unavailable() {
    let image = plane_image(16, 16, SkyPlane::new(0.0, 0.0, 10.0));
    let sky = fit_sky(&image, DVec2::new(500.0, 500.0), &Config::default());

    assert_eq!(sky, SkyModel::Unavailable(FitError::EmptyAnnulus));
    assert!(!sky.is_available());
    assert_eq!(sky.plane(), SkyPlane::default());
    assert_eq!(sky.noise(), 0.0);
}

#[test]
fn test_too_few_annulus_pixels_is_unavailable() {
    let image = plane_image(3, 3, SkyPlane::new(0.0, 0.0, 10.0));
    let config = Config {
        sky_annulus_fwhm: 0.3,
        ..Default::default()
    };
    // Inner annulus [1.2, 1.5] holds only (1, 1); the outer one has equal mean
    let sky = fit_sky(&image, DVec2::ZERO, &config);
    assert!(matches!(
        sky,
        SkyModel::Unavailable(FitError::DegeneratePixelBox {
            pixels: 1,
            required: 4
        })
    ));
}

#[test]
fn test_subtraction_plane_respects_policy() {
    let image = plane_image(128, 128, SkyPlane::new(0.0, 0.0, 25.0));
    let sky = fit_sky(&image, DVec2::new(64.0, 64.0), &Config::default());
    assert!((sky.subtraction_plane(true).c - 25.0).abs() < 1e-6);
    assert_eq!(sky.subtraction_plane(false), SkyPlane::default());
}
