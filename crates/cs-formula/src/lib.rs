//! # cs-formula
//!
//! Deserialization of ChoiceStat's compact textual formula encoding into a
//! shared expression DAG.
//!
//! Each serialized unit has the shape `<Kind>{id}(args…)`: the kind tag in
//! angle brackets, a graph-unique identifier in braces, and a kind-specific
//! argument payload. Units reference earlier units by identifier, and an
//! identifier seen twice resolves to the *same* node — subexpression sharing
//! falls out of construction, no simplification pass involved.
//!
//! ## Example
//!
//! ```
//! use cs_expr::Context;
//! use cs_formula::Formula;
//!
//! let f = Formula::parse(&[
//!     "<Beta>{1}\"scale\"[0]",
//!     "<Numeric>{2},3",
//!     "<Times>{3}(2),1,2",
//! ])
//! .unwrap();
//!
//! let params = [2.0];
//! let ctx = Context::new(&params, &[]);
//! assert_eq!(f.value(&ctx).unwrap(), 6.0);
//! assert_eq!(f.print(), "(scale*3)");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod formula;
pub mod likelihood;
pub mod scan;

pub use formula::{Formula, Literal, LiteralKind};
pub use likelihood::SampleLikelihood;
