//! The error kinds surfaced by every fallible operation in this crate.

use thiserror::Error;

/// The distinct failure kinds of the inference engine.
///
/// Every public fallible operation returns one of these; none is retried
/// internally and none is ever silently swallowed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A name does not refer to any variable or node in the network.
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    /// A value label does not belong to a variable's value list.
    #[error("unknown label `{label}` for variable `{variable}`")]
    UnknownLabel {
        /// The variable whose value list was queried.
        variable: String,
        /// The label that was not found.
        label: String,
    },

    /// A CPT or utility tensor's shape does not match the declared shape.
    #[error("shape mismatch for `{node}`: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// The node whose tensor was rejected.
        node: String,
        /// The shape required by the node's current structure.
        expected: Vec<usize>,
        /// The shape that was actually supplied.
        got: Vec<usize>,
    },

    /// An evidence label was not in a variable's values, or a soft-evidence
    /// array's length did not match the variable's cardinality.
    #[error("invalid evidence for `{variable}`: {reason}")]
    InvalidEvidence {
        /// The variable the evidence was about.
        variable: String,
        /// A human-readable reason.
        reason: String,
    },

    /// No clique in a junction tree is a superset of the requested variables.
    #[error("no clique contains all of {0:?}")]
    NoCliqueContains(Vec<String>),

    /// A node with this name already exists in the network.
    #[error("a node named `{0}` already exists")]
    NameConflict(String),

    /// The network backing a junction tree or temporal unroller was mutated
    /// after the tree was built.
    #[error("the network was mutated after this tree was built")]
    StaleTree,

    /// A factor operation would allocate a tensor larger than the
    /// configured cell ceiling.
    #[error("factor of {cells} cells exceeds the configured limit of {limit}")]
    FactorTooLarge {
        /// The number of cells the operation would have allocated.
        cells: usize,
        /// The configured ceiling.
        limit: usize,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
