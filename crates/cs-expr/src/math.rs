//! Standard-normal primitives used by the CDF node.

use std::f64::consts::SQRT_2;

/// Natural log of `sqrt(2π)`.
const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_7;

/// Standard normal cumulative distribution Φ(x).
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * statrs::function::erf::erfc(-x / SQRT_2)
}

/// Standard normal density φ(x).
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x - LN_SQRT_2PI).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cdf_reference_values() {
        assert_relative_eq!(norm_cdf(0.0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(norm_cdf(1.96), 0.975_002_104_851_780, epsilon = 1e-9);
        assert_relative_eq!(norm_cdf(-1.0) + norm_cdf(1.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn pdf_is_the_cdf_slope() {
        // centered difference of Φ at a few points
        let h = 1e-6;
        for x in [-2.0, -0.3, 0.0, 0.7, 2.5] {
            let slope = (norm_cdf(x + h) - norm_cdf(x - h)) / (2.0 * h);
            assert_relative_eq!(slope, norm_pdf(x), epsilon = 1e-8);
        }
    }
}
