//! Value / gradient / Hessian bundle produced by every evaluation.

use serde::{Deserialize, Serialize};

/// Result of one evaluation call.
///
/// `gradient[k]` is ∂value/∂param(literalIds\[k\]) and `hessian[k][l]` the
/// corresponding second partial, both sized to the literal-id list of the
/// call that produced the bundle. The gradient is present iff it was
/// requested, the Hessian iff it was requested — and a Hessian is only ever
/// produced together with a gradient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Derivatives {
    /// Function value under the current context bindings.
    pub value: f64,
    /// First partials, one entry per requested literal id.
    pub gradient: Option<Vec<f64>>,
    /// Second partials, square and symmetric over the requested literal ids.
    pub hessian: Option<Vec<Vec<f64>>>,
}

impl Derivatives {
    /// Bundle carrying only a value (no derivatives requested).
    pub fn value_only(value: f64) -> Self {
        Self { value, gradient: None, hessian: None }
    }

    /// All-zero bundle sized to `n` literal ids, with the requested parts
    /// allocated.
    pub fn zeroed(n: usize, gradient: bool, hessian: bool) -> Self {
        Self {
            value: 0.0,
            gradient: gradient.then(|| vec![0.0; n]),
            hessian: hessian.then(|| vec![vec![0.0; n]; n]),
        }
    }

    /// Number of literal ids this bundle is sized to (0 when value-only).
    pub fn dim(&self) -> usize {
        self.gradient.as_ref().map_or(0, Vec::len)
    }

    /// Multiply the value and every derivative entry by `w`.
    pub fn scale(&mut self, w: f64) {
        self.value *= w;
        if let Some(g) = &mut self.gradient {
            for v in g.iter_mut() {
                *v *= w;
            }
        }
        if let Some(h) = &mut self.hessian {
            for row in h.iter_mut() {
                for v in row.iter_mut() {
                    *v *= w;
                }
            }
        }
    }

    /// Accumulate `w * other` into `self`, part by part.
    ///
    /// Parts missing on either side are treated as zero, which is what the
    /// linear combinators (sums, averages, quadrature) need.
    pub fn add_scaled(&mut self, other: &Derivatives, w: f64) {
        self.value += w * other.value;
        if let (Some(g), Some(og)) = (&mut self.gradient, &other.gradient) {
            for (v, o) in g.iter_mut().zip(og) {
                *v += w * o;
            }
        }
        if let (Some(h), Some(oh)) = (&mut self.hessian, &other.hessian) {
            for (row, orow) in h.iter_mut().zip(oh) {
                for (v, o) in row.iter_mut().zip(orow) {
                    *v += w * o;
                }
            }
        }
    }
}
