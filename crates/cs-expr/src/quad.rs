//! Numerical integration kernel for the `Integrate` node.
//!
//! The real line is mapped onto the open interval (−1, 1) through
//! `x = t / (1 − t²)` and the transformed integrand is summed with a fixed
//! composite Simpson rule. The kernel integrates a whole derivatives bundle
//! at once, so the Leibniz rule (derivative of the integral = integral of
//! the derivative) holds by construction.
//!
//! The integrand is expected to decay towards ±∞ (density-like); the grid
//! is clipped just inside ±1, which places the outermost sample near
//! |x| ≈ 5e5 where such integrands have long vanished.

use crate::Derivatives;
use cs_core::Result;

/// Number of Simpson subintervals (even).
const SUBINTERVALS: usize = 512;

/// Clip of the open interval, keeps the change of variable finite.
const EDGE: f64 = 1e-6;

/// Integrate `f` over the real line, accumulating value, gradient and
/// Hessian with the same weights.
pub(crate) fn integrate_bundle<F>(
    mut f: F,
    n: usize,
    gradient: bool,
    hessian: bool,
) -> Result<Derivatives>
where
    F: FnMut(f64) -> Result<Derivatives>,
{
    let a = -1.0 + EDGE;
    let b = 1.0 - EDGE;
    let h = (b - a) / SUBINTERVALS as f64;

    let mut acc = Derivatives::zeroed(n, gradient, hessian);
    for i in 0..=SUBINTERVALS {
        let t = a + h * i as f64;
        let simpson = if i == 0 || i == SUBINTERVALS {
            1.0
        } else if i % 2 == 1 {
            4.0
        } else {
            2.0
        };
        let one_minus_t2 = 1.0 - t * t;
        let x = t / one_minus_t2;
        let jacobian = (1.0 + t * t) / (one_minus_t2 * one_minus_t2);
        let inner = f(x)?;
        acc.add_scaled(&inner, simpson * jacobian * h / 3.0);
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::norm_pdf;
    use approx::assert_relative_eq;

    #[test]
    fn normal_density_integrates_to_one() {
        let total =
            integrate_bundle(|x| Ok(Derivatives::value_only(norm_pdf(x))), 0, false, false)
                .unwrap();
        assert_relative_eq!(total.value, 1.0, epsilon = 1e-8);
    }

    #[test]
    fn first_two_moments_of_the_normal() {
        let mean =
            integrate_bundle(|x| Ok(Derivatives::value_only(x * norm_pdf(x))), 0, false, false)
                .unwrap();
        assert_relative_eq!(mean.value, 0.0, epsilon = 1e-8);

        let second = integrate_bundle(
            |x| Ok(Derivatives::value_only(x * x * norm_pdf(x))),
            0,
            false,
            false,
        )
        .unwrap();
        assert_relative_eq!(second.value, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn derivative_parts_get_the_same_weights() {
        // integrand whose "gradient" slot carries 2·f: the integrated
        // gradient must be exactly twice the integrated value
        let out = integrate_bundle(
            |x| {
                let v = norm_pdf(x);
                Ok(Derivatives { value: v, gradient: Some(vec![2.0 * v]), hessian: None })
            },
            1,
            true,
            false,
        )
        .unwrap();
        assert_relative_eq!(out.gradient.unwrap()[0], 2.0 * out.value, epsilon = 1e-12);
    }
}
