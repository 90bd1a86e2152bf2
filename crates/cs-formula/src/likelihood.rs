//! Sample-level log-likelihood assembled from a parsed formula.
//!
//! A [`Formula`] gives the contribution of one observation; this module
//! sums contributions over a dataset and exposes the
//! [`LogLikelihood`] surface an outer optimizer consumes.

use cs_core::{LogLikelihood, Result};
use cs_expr::{Context, Derivatives};

use crate::Formula;

/// Sum of a formula's per-observation log-likelihood over a dataset.
///
/// Without a data map the formula is summed over rows. With a data map the
/// formula is treated as a per-*individual* contribution (panel convention:
/// the formula itself aggregates the individual's rows, typically through a
/// panel-trajectory or Monte Carlo node) and summed over individuals.
pub struct SampleLikelihood<'a> {
    formula: &'a Formula,
    data: &'a [Vec<f64>],
    fixed_parameters: &'a [f64],
    draws: Option<&'a [Vec<Vec<f64>>]>,
    data_map: Option<&'a [Vec<usize>]>,
    literal_ids: Vec<usize>,
}

impl<'a> SampleLikelihood<'a> {
    /// Likelihood of `formula` over `data`, differentiated against
    /// `literal_ids`.
    pub fn new(
        formula: &'a Formula,
        data: &'a [Vec<f64>],
        fixed_parameters: &'a [f64],
        literal_ids: Vec<usize>,
    ) -> Self {
        Self { formula, data, fixed_parameters, draws: None, data_map: None, literal_ids }
    }

    /// Bind a draw table for formulas with Monte Carlo nodes.
    pub fn with_draws(mut self, draws: &'a [Vec<Vec<f64>>]) -> Self {
        self.draws = Some(draws);
        self
    }

    /// Bind a panel data map and switch to per-individual summation.
    pub fn with_data_map(mut self, data_map: &'a [Vec<usize>]) -> Self {
        self.data_map = Some(data_map);
        self
    }

    fn accumulate(&self, params: &[f64], gradient: bool, hessian: bool) -> Result<Derivatives> {
        let mut base = Context::new(params, self.fixed_parameters).with_data(self.data);
        if let Some(d) = self.draws {
            base = base.with_draws(d);
        }
        if let Some(m) = self.data_map {
            base = base.with_data_map(m);
        }

        let mut acc = Derivatives::zeroed(self.literal_ids.len(), gradient, hessian);
        if let Some(map) = self.data_map {
            for individual in 0..map.len() {
                let ctx = base.at_individual(individual);
                let b = self.formula.evaluate(&ctx, &self.literal_ids, gradient, hessian)?;
                acc.add_scaled(&b, 1.0);
            }
        } else {
            for row in 0..self.data.len() {
                let ctx = base.at_row(row);
                let b = self.formula.evaluate(&ctx, &self.literal_ids, gradient, hessian)?;
                acc.add_scaled(&b, 1.0);
            }
        }
        Ok(acc)
    }
}

impl LogLikelihood for SampleLikelihood<'_> {
    fn n_parameters(&self) -> usize {
        self.literal_ids.len()
    }

    fn log_likelihood(&self, params: &[f64]) -> Result<f64> {
        self.accumulate(params, false, false).map(|d| d.value)
    }

    fn log_likelihood_gradient(&self, params: &[f64]) -> Result<(f64, Vec<f64>)> {
        let d = self.accumulate(params, true, false)?;
        Ok((d.value, d.gradient.unwrap_or_default()))
    }

    fn log_likelihood_hessian(&self, params: &[f64]) -> Result<(f64, Vec<f64>, Vec<Vec<f64>>)> {
        let d = self.accumulate(params, true, true)?;
        Ok((d.value, d.gradient.unwrap_or_default(), d.hessian.unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn row_sum_matches_the_closed_form() {
        // per-row contribution b * x: the sample log-likelihood is b Σx
        let f = Formula::parse(&[
            "<Beta>{1}\"b\"[0]",
            "<Variable>{2}\"x\"[0]",
            "<Times>{3}(2),1,2",
        ])
        .unwrap();
        let data = vec![vec![1.0], vec![2.0], vec![4.0]];
        let ll = SampleLikelihood::new(&f, &data, &[], vec![0]);

        assert_eq!(ll.n_parameters(), 1);
        let (value, grad) = ll.log_likelihood_gradient(&[3.0]).unwrap();
        assert_relative_eq!(value, 21.0, epsilon = 1e-12);
        assert_relative_eq!(grad[0], 7.0, epsilon = 1e-12);
    }

    #[test]
    fn panel_mode_sums_individuals() {
        // per-individual contribution: product over the individual's rows
        // of (b * x); individuals are {rows 0,1} and {row 2}
        let f = Formula::parse(&[
            "<Beta>{1}\"b\"[0]",
            "<Variable>{2}\"x\"[0]",
            "<Times>{3}(2),1,2",
            "<PanelLikelihoodTrajectory>{4},3",
        ])
        .unwrap();
        let data = vec![vec![2.0], vec![3.0], vec![5.0]];
        let data_map = vec![vec![0, 1], vec![2]];
        let ll = SampleLikelihood::new(&f, &data, &[], vec![0]).with_data_map(&data_map);

        // (2b)(3b) + 5b = 6b^2 + 5b
        let (value, grad, hess) = ll.log_likelihood_hessian(&[1.0]).unwrap();
        assert_relative_eq!(value, 11.0, epsilon = 1e-12);
        assert_relative_eq!(grad[0], 17.0, epsilon = 1e-12);
        assert_relative_eq!(hess[0][0], 12.0, epsilon = 1e-12);
    }
}
