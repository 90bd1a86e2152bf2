//! # cs-core
//!
//! Core types for ChoiceStat:
//! - the error taxonomy shared by the expression engine and the formula
//!   deserializer ([`Error`], [`Result`])
//! - the [`LogLikelihood`](traits::LogLikelihood) trait consumed by outer
//!   optimizers (quasi-Newton, trust-region, …), which are not part of this
//!   workspace

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;

pub use error::{Error, Result};
pub use traits::LogLikelihood;
