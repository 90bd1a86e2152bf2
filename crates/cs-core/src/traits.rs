//! Core traits for ChoiceStat
//!
//! The outer maximum-likelihood loop never sees expression graphs directly;
//! it talks to a [`LogLikelihood`] surface. This keeps the optimizer free of
//! any dependency on how the likelihood is represented or differentiated.

use crate::Result;

/// A log-likelihood surface over a parameter vector.
///
/// Implementations sum per-observation contributions over a dataset; the
/// gradient and Hessian are exact (not finite-difference) and sized to the
/// free-parameter vector.
pub trait LogLikelihood: Send + Sync {
    /// Number of free parameters.
    fn n_parameters(&self) -> usize;

    /// Log-likelihood at `params`.
    fn log_likelihood(&self, params: &[f64]) -> Result<f64>;

    /// Log-likelihood and its gradient at `params`.
    fn log_likelihood_gradient(&self, params: &[f64]) -> Result<(f64, Vec<f64>)>;

    /// Log-likelihood, gradient and Hessian at `params`.
    #[allow(clippy::type_complexity)]
    fn log_likelihood_hessian(&self, params: &[f64]) -> Result<(f64, Vec<f64>, Vec<Vec<f64>>)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quadratic;

    impl LogLikelihood for Quadratic {
        fn n_parameters(&self) -> usize {
            1
        }

        fn log_likelihood(&self, params: &[f64]) -> Result<f64> {
            Ok(-params[0] * params[0])
        }

        fn log_likelihood_gradient(&self, params: &[f64]) -> Result<(f64, Vec<f64>)> {
            Ok((-params[0] * params[0], vec![-2.0 * params[0]]))
        }

        fn log_likelihood_hessian(&self, params: &[f64]) -> Result<(f64, Vec<f64>, Vec<Vec<f64>>)> {
            Ok((-params[0] * params[0], vec![-2.0 * params[0]], vec![vec![-2.0]]))
        }
    }

    #[test]
    fn trait_object_is_usable() {
        let m: &dyn LogLikelihood = &Quadratic;
        assert_eq!(m.n_parameters(), 1);
        let (f, g) = m.log_likelihood_gradient(&[3.0]).unwrap();
        assert_eq!(f, -9.0);
        assert_eq!(g, vec![-6.0]);
    }
}
