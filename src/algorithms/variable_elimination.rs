//! Naive and bucket variable elimination.

use rustc_hash::FxHashMap;

use crate::algorithms::evidence::{evidence_to_factor, Evidence};
use crate::algorithms::ordering::elimination_order;
use crate::core::{Factor, Network, Node};
use crate::error::{EngineError, Result};
use crate::EngineConfig;

fn all_probability_factors(network: &Network) -> Result<Vec<Factor>> {
    network
        .names()
        .iter()
        .filter_map(|name| match network.node(name) {
            Some(Node::Discrete(_)) => Some(Factor::from_discrete_node(network, name)),
            Some(Node::Decision(_)) => Some(Factor::from_decision_node(network, name)),
            Some(Node::Utility(_)) | None => None,
        })
        .collect()
}

fn evidence_factors(network: &Network, evidence: Option<&Evidence>) -> Result<Vec<Factor>> {
    let Some(evidence) = evidence else {
        return Ok(Vec::new());
    };
    evidence
        .iter()
        .map(|(var, val)| evidence_to_factor(network, var, val, false, None))
        .collect()
}

fn require_known(network: &Network, vars: &[String]) -> Result<()> {
    for v in vars {
        if network.node(v).is_none() {
            return Err(EngineError::UnknownVariable(v.clone()));
        }
    }
    Ok(())
}

fn product_all(factors: Vec<Factor>, limit: usize) -> Result<Factor> {
    factors
        .into_iter()
        .try_fold(Factor::trivial(1.0), |acc, f| acc.product(&f, limit))
}

/// Naive variable elimination: multiply every CPT/rule factor and evidence
/// factor together, sum out every non-query variable in any order,
/// normalize.
///
/// # Errors
///
/// Returns [`EngineError::UnknownVariable`] for an unknown query variable,
/// or [`EngineError::InvalidEvidence`]/[`EngineError::FactorTooLarge`] per
/// the underlying factor operations.
pub fn naive(
    network: &Network,
    query: &[String],
    evidence: Option<&Evidence>,
    config: &EngineConfig,
) -> Result<Factor> {
    require_known(network, query)?;
    log::debug!("naive VE over {query:?}");
    let mut factors = all_probability_factors(network)?;
    factors.extend(evidence_factors(network, evidence)?);
    let joint = product_all(factors, config.factor_size_limit)?;
    let to_remove: Vec<String> = joint
        .vars()
        .iter()
        .filter(|v| !query.contains(v))
        .cloned()
        .collect();
    Ok(joint.marginalize(&to_remove).normalize())
}

/// Bucket variable elimination: factors are partitioned into buckets
/// keyed by an elimination order, eliminated bucket by bucket, and routed
/// forward; this keeps intermediate products small for sparse networks
/// where [`naive`] would multiply everything up front.
///
/// # Errors
///
/// See [`naive`].
pub fn bucket(
    network: &Network,
    query: &[String],
    evidence: Option<&Evidence>,
    order: Option<Vec<String>>,
    config: &EngineConfig,
) -> Result<Factor> {
    require_known(network, query)?;
    let base_order = order.unwrap_or_else(|| elimination_order(network, config.default_elimination_order));
    let (non_query, query_tail): (Vec<String>, Vec<String>) = base_order
        .into_iter()
        .partition(|v| !query.contains(v));
    let mut full_order = non_query;
    full_order.extend(query_tail);
    log::debug!("bucket VE over {query:?} with order {full_order:?}");

    let k = full_order.len();
    let n_non_query = k - query.len();
    let position: FxHashMap<&str, usize> = full_order
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect();

    let mut buckets: Vec<Vec<Factor>> = (0..k).map(|_| Vec::new()).collect();
    let mut overflow: Vec<Factor> = Vec::new();

    let mut factors = all_probability_factors(network)?;
    factors.extend(evidence_factors(network, evidence)?);
    for factor in factors {
        let first = factor
            .vars()
            .iter()
            .filter_map(|v| position.get(v.as_str()).copied())
            .min();
        match first {
            Some(p) => buckets[p].push(factor),
            None => overflow.push(factor),
        }
    }

    for i in 0..n_non_query {
        let contents = std::mem::take(&mut buckets[i]);
        if contents.is_empty() {
            continue;
        }
        let product = product_all(contents, config.factor_size_limit)?;
        let summed_out = product.marginalize(std::slice::from_ref(&full_order[i]));
        let dest = summed_out
            .vars()
            .iter()
            .filter_map(|v| position.get(v.as_str()).copied())
            .filter(|&p| p > i)
            .min();
        match dest {
            Some(p) => buckets[p].push(summed_out),
            None => overflow.push(summed_out),
        }
    }

    let mut finals = overflow;
    for bucket in buckets.into_iter().skip(n_non_query) {
        finals.extend(bucket);
    }
    let result = product_all(finals, config.factor_size_limit)?;
    Ok(result.normalize())
}
