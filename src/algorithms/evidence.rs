//! Tagged evidence values.
//!
//! Evidence is always one of a hard label or a soft array — never a
//! duck-typed scalar-or-array the caller has to sniff at runtime.

use rustc_hash::FxHashMap;

use crate::core::{Factor, Network, Node};
use crate::error::{EngineError, Result};

/// A single piece of evidence about one variable.
#[derive(Debug, Clone, PartialEq)]
pub enum EvidenceValue {
    /// A single observed label (hard evidence).
    Hard(String),
    /// A soft-evidence array of length `|variable|`. Interpreted as a
    /// direct likelihood or a desired posterior depending on the
    /// `soft_posteriors` flag passed to the operation consuming it.
    Soft(Vec<f64>),
}

/// A mapping from variable name to the evidence observed about it.
pub type Evidence = FxHashMap<String, EvidenceValue>;

/// Looks up the ordered value labels of a discrete or decision node.
pub(crate) fn node_labels(network: &Network, name: &str) -> Result<Vec<String>> {
    match network
        .node(name)
        .ok_or_else(|| EngineError::UnknownVariable(name.to_string()))?
    {
        Node::Discrete(n) => Ok(n.variable().values().to_vec()),
        Node::Decision(n) => Ok(n.decisions().to_vec()),
        Node::Utility(_) => Err(EngineError::UnknownVariable(name.to_string())),
    }
}

/// Builds the evidence factor for one variable's [`EvidenceValue`].
///
/// `prior` must be supplied (the variable's current marginal) when
/// `soft_posteriors` is true and the value is [`EvidenceValue::Soft`].
///
/// # Errors
///
/// Returns [`EngineError::UnknownVariable`] if `variable` is unknown, or
/// [`EngineError::InvalidEvidence`] if the value's shape doesn't match the
/// variable's cardinality.
pub(crate) fn evidence_to_factor(
    network: &Network,
    variable: &str,
    value: &EvidenceValue,
    soft_posteriors: bool,
    prior: Option<&[f64]>,
) -> Result<Factor> {
    let values = node_labels(network, variable)?;
    match value {
        EvidenceValue::Hard(label) => Factor::hard_evidence(variable, values, label),
        EvidenceValue::Soft(ratios) => {
            if soft_posteriors {
                let old = prior.ok_or_else(|| EngineError::InvalidEvidence {
                    variable: variable.to_string(),
                    reason: "all-things-considered evidence requires a prior marginal".into(),
                })?;
                Factor::soft_evidence_posterior(variable, values, old, ratios)
            } else {
                Factor::soft_evidence_likelihood(variable, values, ratios)
            }
        }
    }
}
