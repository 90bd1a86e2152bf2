//! Error types for ChoiceStat

use thiserror::Error;

/// ChoiceStat error type
#[derive(Error, Debug)]
pub enum Error {
    /// A serialized formula string is structurally invalid.
    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),

    /// The `<Kind>` tag of a serialized node is not in the vocabulary.
    #[error("unknown expression kind: {0}")]
    UnknownExpressionKind(String),

    /// The declared arity of a node does not match the supplied arguments.
    #[error("arity mismatch for {kind}: declared {declared}, supplied {supplied}")]
    ArityMismatch {
        /// Wire tag of the offending node.
        kind: String,
        /// Arity declared in the `(…)` payload.
        declared: usize,
        /// Number of arguments actually present.
        supplied: usize,
    },

    /// An argument references a node identifier that was never defined.
    #[error("dangling reference to node {0}")]
    DanglingReference(String),

    /// The evaluation request itself is inconsistent
    /// (e.g. Hessian requested without the gradient).
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),

    /// Differentiation was requested through a non-differentiable expression
    /// whose subgraph contains one of the requested parameters.
    #[error("expression {0} is not differentiable")]
    NotDifferentiable(&'static str),

    /// Evaluation needs a context binding that was never supplied.
    #[error("missing binding: {0}")]
    MissingBinding(&'static str),

    /// An index exceeds the extent of the bound table it indexes into.
    #[error("{what} index {index} out of range (extent {extent})")]
    OutOfRange {
        /// Which index is out of range (row, individual, draw, …).
        what: &'static str,
        /// The offending index value.
        index: usize,
        /// The extent of the bound table.
        extent: usize,
    },

    /// A value left the domain of a numeric operation
    /// (division by zero, log of a non-positive value, invalid power).
    #[error("numeric domain error: {0}")]
    NumericDomain(String),

    /// An integer-keyed selector has no entry for the key.
    #[error("no expression for key {0}")]
    UnknownKey(i64),

    /// The chosen alternative of a logit node is not available.
    #[error("chosen alternative {0} is not available")]
    UnavailableAlternative(i64),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let e = Error::OutOfRange { what: "row", index: 12, extent: 10 };
        assert_eq!(e.to_string(), "row index 12 out of range (extent 10)");

        let e = Error::ArityMismatch { kind: "Plus".into(), declared: 3, supplied: 2 };
        assert!(e.to_string().contains("Plus"));
    }
}
