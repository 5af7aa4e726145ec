pub trait FloatExt {
    /// Absolute comparison against [`crate::EPSILON`].
    fn approximately_eq(self, other: Self) -> bool;

    /// Relative comparison: `|a - b| <= tol * max(|a|, |b|)`, falling back to
    /// an absolute `tol` when both values are near zero.
    fn relative_eq(self, other: Self, tol: Self) -> bool;
}

impl FloatExt for f64 {
    fn approximately_eq(self, other: Self) -> bool {
        (self - other).abs() < crate::EPSILON
    }

    fn relative_eq(self, other: Self, tol: Self) -> bool {
        let scale = self.abs().max(other.abs());
        if scale < tol {
            return (self - other).abs() <= tol;
        }
        (self - other).abs() <= tol * scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f64_approximately_eq() {
        assert!(1.0_f64.approximately_eq(1.0));
        assert!((0.1_f64 + 0.2_f64).approximately_eq(0.3));
        assert!(!1.0_f64.approximately_eq(1.0001));
    }

    #[test]
    fn f64_nan_is_never_equal() {
        assert!(!f64::NAN.approximately_eq(f64::NAN));
        assert!(!f64::NAN.relative_eq(1.0, 1e-3));
    }

    #[test]
    fn relative_eq_scales_with_magnitude() {
        assert!(1.0e6_f64.relative_eq(1.0e6 + 0.5, 1e-6));
        assert!(!1.0e6_f64.relative_eq(1.0e6 + 5.0, 1e-6));
        assert!(1.0e-12_f64.relative_eq(0.0, 1e-9));
    }

    #[test]
    fn relative_eq_is_symmetric() {
        let a = 100.0_f64;
        let b = 100.00005_f64;
        assert_eq!(a.relative_eq(b, 1e-6), b.relative_eq(a, 1e-6));
    }
}
