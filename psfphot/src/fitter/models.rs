//! Moffat models for the three fitting modes.
//!
//! All share I = A·u^(−β), u = 1 + r²/α², and differ only in which
//! parameters are free.

use glam::DVec2;

use crate::fitting::LmModel;

/// Smallest α the optimizer may step to.
const MIN_ALPHA: f64 = 1e-3;

/// Free fit, parameters [A, α, β, x0, y0].
pub(super) struct FreeMoffat;

impl LmModel<5> for FreeMoffat {
    #[inline]
    fn evaluate(&self, x: f64, y: f64, params: &[f64; 5]) -> f64 {
        let [amp, alpha, beta, x0, y0] = *params;
        let r2 = (x - x0).powi(2) + (y - y0).powi(2);
        amp * (1.0 + r2 / (alpha * alpha)).powf(-beta)
    }

    #[inline]
    fn jacobian_row(&self, x: f64, y: f64, params: &[f64; 5]) -> [f64; 5] {
        let [amp, alpha, beta, x0, y0] = *params;
        let dx = x - x0;
        let dy = y - y0;
        let alpha2 = alpha * alpha;
        let r2 = dx * dx + dy * dy;
        let u = 1.0 + r2 / alpha2;
        let u_neg_beta = u.powf(-beta);
        let common = 2.0 * amp * beta * u_neg_beta / (u * alpha2);

        [
            u_neg_beta,
            common * r2 / alpha,
            -amp * u_neg_beta * u.ln(),
            common * dx,
            common * dy,
        ]
    }

    fn constrain(&self, params: &mut [f64; 5]) {
        params[1] = params[1].abs().max(MIN_ALPHA);
    }
}

/// Known shape, parameters [A, x0, y0].
pub(super) struct FixedShapeMoffat {
    pub alpha: f64,
    pub beta: f64,
}

impl LmModel<3> for FixedShapeMoffat {
    #[inline]
    fn evaluate(&self, x: f64, y: f64, params: &[f64; 3]) -> f64 {
        let [amp, x0, y0] = *params;
        let r2 = (x - x0).powi(2) + (y - y0).powi(2);
        amp * (1.0 + r2 / (self.alpha * self.alpha)).powf(-self.beta)
    }

    #[inline]
    fn jacobian_row(&self, x: f64, y: f64, params: &[f64; 3]) -> [f64; 3] {
        let [amp, x0, y0] = *params;
        let dx = x - x0;
        let dy = y - y0;
        let alpha2 = self.alpha * self.alpha;
        let u = 1.0 + (dx * dx + dy * dy) / alpha2;
        let u_neg_beta = u.powf(-self.beta);
        let common = 2.0 * amp * self.beta * u_neg_beta / (u * alpha2);

        [u_neg_beta, common * dx, common * dy]
    }
}

/// Known shape and centre, parameter [A].
pub(super) struct FluxOnlyMoffat {
    pub alpha: f64,
    pub beta: f64,
    pub center: DVec2,
}

impl FluxOnlyMoffat {
    #[inline]
    fn profile(&self, x: f64, y: f64) -> f64 {
        let r2 = (x - self.center.x).powi(2) + (y - self.center.y).powi(2);
        (1.0 + r2 / (self.alpha * self.alpha)).powf(-self.beta)
    }
}

impl LmModel<1> for FluxOnlyMoffat {
    #[inline]
    fn evaluate(&self, x: f64, y: f64, params: &[f64; 1]) -> f64 {
        params[0] * self.profile(x, y)
    }

    #[inline]
    fn jacobian_row(&self, x: f64, y: f64, _params: &[f64; 1]) -> [f64; 1] {
        [self.profile(x, y)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Central finite difference of `model` in parameter `k`.
    fn numeric_derivative<const N: usize, M: LmModel<N>>(
        model: &M,
        x: f64,
        y: f64,
        params: &[f64; N],
        k: usize,
    ) -> f64 {
        let h = 1e-6 * params[k].abs().max(1.0);
        let mut plus = *params;
        let mut minus = *params;
        plus[k] += h;
        minus[k] -= h;
        (model.evaluate(x, y, &plus) - model.evaluate(x, y, &minus)) / (2.0 * h)
    }

    #[test]
    fn test_free_jacobian_matches_finite_differences() {
        let params = [850.0, 2.7, 3.4, 10.3, 9.6];
        for &(x, y) in &[(10.0, 10.0), (12.0, 7.0), (5.0, 14.0)] {
            let analytic = FreeMoffat.jacobian_row(x, y, &params);
            for k in 0..5 {
                let numeric = numeric_derivative(&FreeMoffat, x, y, &params, k);
                let scale = numeric.abs().max(1e-3);
                assert!(
                    (analytic[k] - numeric).abs() / scale < 1e-5,
                    "param {k} at ({x}, {y}): {} vs {numeric}",
                    analytic[k]
                );
            }
        }
    }

    #[test]
    fn test_fixed_shape_jacobian_matches_finite_differences() {
        let model = FixedShapeMoffat {
            alpha: 2.2,
            beta: 2.9,
        };
        let params = [400.0, 20.4, 19.8];
        for &(x, y) in &[(20.0, 20.0), (23.0, 18.0)] {
            let analytic = model.jacobian_row(x, y, &params);
            for k in 0..3 {
                let numeric = numeric_derivative(&model, x, y, &params, k);
                let scale = numeric.abs().max(1e-3);
                assert!((analytic[k] - numeric).abs() / scale < 1e-5);
            }
        }
    }

    #[test]
    fn test_models_agree_on_shared_parameters() {
        let free = [300.0, 2.0, 3.5, 4.2, 5.1];
        let fixed = FixedShapeMoffat {
            alpha: 2.0,
            beta: 3.5,
        };
        let flux_only = FluxOnlyMoffat {
            alpha: 2.0,
            beta: 3.5,
            center: DVec2::new(4.2, 5.1),
        };
        let value = FreeMoffat.evaluate(6.0, 3.0, &free);
        assert_eq!(fixed.evaluate(6.0, 3.0, &[300.0, 4.2, 5.1]), value);
        assert!((flux_only.evaluate(6.0, 3.0, &[300.0]) - value).abs() < 1e-12);
    }

    #[test]
    fn test_free_constrain_keeps_alpha_positive() {
        let mut params = [1.0, -2.5, 3.0, 0.0, 0.0];
        FreeMoffat.constrain(&mut params);
        assert_eq!(params[1], 2.5);
        params[1] = 0.0;
        FreeMoffat.constrain(&mut params);
        assert_eq!(params[1], MIN_ALPHA);
    }
}
