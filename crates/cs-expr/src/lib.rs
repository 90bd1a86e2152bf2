//! # cs-expr
//!
//! Expression-graph evaluation and exact differentiation for ChoiceStat.
//!
//! A [`Graph`] is an arena of expression nodes addressed by [`ExprId`]
//! handles; two parents holding the same handle share the subexpression, so
//! the structure is a DAG, not a tree. Evaluating a node produces a
//! [`Derivatives`] bundle: the value, and on request the exact gradient and
//! Hessian with respect to a caller-chosen list of parameter indices.
//!
//! All external state (parameter vectors, row data, Monte Carlo draws,
//! current row/individual/draw) is carried by a [`Context`] passed by
//! reference into every evaluation; the graph itself is immutable after
//! construction.
//!
//! ## Example
//!
//! ```
//! use cs_expr::{Context, Graph};
//!
//! // f(b0, b1) = b0 * exp(b1)
//! let mut g = Graph::new();
//! let b0 = g.beta(0, "scale");
//! let b1 = g.beta(1, "rate");
//! let e = g.exp(b1);
//! let f = g.mul(b0, e);
//!
//! let params = [2.0, 0.0];
//! let ctx = Context::new(&params, &[]);
//! let d = g.evaluate(f, &ctx, &[0, 1], true, false).unwrap();
//! assert_eq!(d.value, 2.0);
//! assert_eq!(d.gradient.as_deref(), Some(&[1.0, 2.0][..]));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod derivatives;
mod eval;
pub mod graph;
pub mod math;
mod quad;

pub use context::{Context, RvBinding};
pub use derivatives::Derivatives;
pub use graph::{ExprId, Graph};
