//! Generalized variable elimination over (probability, utility) pairs, for
//! influence diagrams with decision and utility nodes.

use rustc_hash::FxHashMap;

use crate::algorithms::evidence::node_labels;
use crate::core::tensor::{cell_count, flat_index, indices, row_major_strides};
use crate::core::{Factor, Network, Node};
use crate::error::{EngineError, Result};

/// A probability/utility factor pair sharing the same elimination
/// machinery: combining multiplies probabilities and adds utilities;
/// marginalizing a variable divides the eliminated joint utility mass back
/// out by the eliminated probability mass.
#[derive(Debug, Clone)]
pub struct JointFactor {
    p: Factor,
    u: Factor,
}

impl JointFactor {
    /// A neutral element: certain (P=1) and worthless (U=0).
    #[must_use]
    pub fn unit() -> Self {
        Self {
            p: Factor::trivial(1.0),
            u: Factor::trivial(0.0),
        }
    }

    /// The probability component.
    #[must_use]
    pub fn probability(&self) -> &Factor {
        &self.p
    }

    /// The utility component.
    #[must_use]
    pub fn utility(&self) -> &Factor {
        &self.u
    }

    /// A discrete node contributes its CPT in the probability slot and no
    /// utility.
    ///
    /// # Errors
    ///
    /// See [`Factor::from_discrete_node`].
    pub fn from_discrete_node(network: &Network, name: &str) -> Result<Self> {
        Ok(Self {
            p: Factor::from_discrete_node(network, name)?,
            u: Factor::trivial(0.0),
        })
    }

    /// A utility node contributes its table in the utility slot and a
    /// certain probability.
    ///
    /// # Errors
    ///
    /// See [`Factor::from_utility_node`].
    pub fn from_utility_node(network: &Network, name: &str) -> Result<Self> {
        Ok(Self {
            p: Factor::trivial(1.0),
            u: Factor::from_utility_node(network, name)?,
        })
    }

    /// A decision node contributes its rule in the probability slot and no
    /// utility.
    ///
    /// # Errors
    ///
    /// See [`Factor::from_decision_node`].
    pub fn from_decision_node(network: &Network, name: &str) -> Result<Self> {
        Ok(Self {
            p: Factor::from_decision_node(network, name)?,
            u: Factor::trivial(0.0),
        })
    }

    /// Combine((P₁,U₁),(P₂,U₂)) = (P₁·P₂, U₁+U₂).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::FactorTooLarge`] if either component would
    /// exceed `factor_size_limit` cells.
    pub fn combine(&self, other: &Self, factor_size_limit: usize) -> Result<Self> {
        Ok(Self {
            p: self.p.product(&other.p, factor_size_limit)?,
            u: self.u.add(&other.u, factor_size_limit)?,
        })
    }

    /// Sums `var` out of the probability component and folds its
    /// contribution out of the utility component: `U' := marginalize(P·U,
    /// v) / marginalize(P, v)`, with `0/0 := 0`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::FactorTooLarge`] if the intermediate `P·U`
    /// product would exceed `factor_size_limit` cells.
    pub fn marginalize_out(&self, var: &str, factor_size_limit: usize) -> Result<Self> {
        let remove = [var.to_string()];
        let p_prime = self.p.marginalize(&remove);
        let pu = self.p.product(&self.u, factor_size_limit)?;
        let pu_marginal = pu.marginalize(&remove);
        let u_prime = pu_marginal.divide(&p_prime, factor_size_limit)?;
        Ok(Self { p: p_prime, u: u_prime })
    }

    fn mentions(&self, var: &str) -> bool {
        self.p.has_var(var) || self.u.has_var(var)
    }
}

/// Builds the joint-factor contribution of every discrete, utility and
/// decision node in `network`.
///
/// # Errors
///
/// Propagates any error from the per-node-type constructors.
pub fn all_joint_factors(network: &Network) -> Result<Vec<JointFactor>> {
    network
        .names()
        .iter()
        .map(|name| match network.node(name) {
            Some(Node::Discrete(_)) => JointFactor::from_discrete_node(network, name),
            Some(Node::Utility(_)) => JointFactor::from_utility_node(network, name),
            Some(Node::Decision(_)) => JointFactor::from_decision_node(network, name),
            None => Err(EngineError::UnknownVariable(name.clone())),
        })
        .collect()
}

/// Generalized variable elimination: repeatedly gathers every factor
/// mentioning the next variable in `eliminate`, combines them, marginalizes
/// the variable out, and folds the result back into the working set.
/// Returns the final combination of whatever is left.
///
/// # Errors
///
/// See [`JointFactor::combine`] and [`JointFactor::marginalize_out`].
pub fn generalized_ve(
    factors: Vec<JointFactor>,
    eliminate: &[String],
    factor_size_limit: usize,
) -> Result<JointFactor> {
    let mut working = factors;
    for var in eliminate {
        let (mentioning, rest): (Vec<JointFactor>, Vec<JointFactor>) =
            working.into_iter().partition(|f| f.mentions(var));
        working = rest;
        if mentioning.is_empty() {
            continue;
        }
        let mut combined = JointFactor::unit();
        for f in &mentioning {
            combined = combined.combine(f, factor_size_limit)?;
        }
        working.push(combined.marginalize_out(var, factor_size_limit)?);
    }
    let mut result = JointFactor::unit();
    for f in &working {
        result = result.combine(f, factor_size_limit)?;
    }
    Ok(result)
}

fn non_utility_names(network: &Network) -> Vec<String> {
    network
        .names()
        .iter()
        .filter(|n| !matches!(network.node(n), Some(Node::Utility(_))))
        .cloned()
        .collect()
}

/// Sets every named decision node to a deterministic rule, eliminates every
/// non-utility variable, and returns the scalar expected utility.
///
/// # Errors
///
/// Propagates errors from setting the decision rules or from
/// [`generalized_ve`].
pub fn expected_utility(
    network: &Network,
    decisions: &[(String, String)],
    factor_size_limit: usize,
) -> Result<f64> {
    let mut net = network.clone();
    for (name, decision) in decisions {
        net.set_decision_deterministic(name, decision)?;
    }
    let factors = all_joint_factors(&net)?;
    let eliminate = non_utility_names(&net);
    let result = generalized_ve(factors, &eliminate, factor_size_limit)?;
    Ok(result.utility().table().first().copied().unwrap_or(0.0))
}

/// Iterated optimization over an acyclic relevance graph: initializes every
/// unfixed decision node to fully-mixed, then for each decision `D` in
/// `order`, eliminates every variable except `D` and its information
/// parents, and picks the `D`-value (or, when `D` has information parents,
/// the per-parent-assignment policy) that maximizes the remaining utility.
///
/// `fixed` pins named decisions to a caller-chosen label instead of
/// optimizing them.
///
/// # Errors
///
/// Returns [`EngineError::UnknownVariable`] if an entry of `order` is not a
/// decision node, or propagates errors from [`generalized_ve`].
pub fn optimal_decisions(
    network: &Network,
    order: &[String],
    fixed: Option<&FxHashMap<String, String>>,
    factor_size_limit: usize,
) -> Result<FxHashMap<String, String>> {
    let mut net = network.clone();
    let mut chosen: FxHashMap<String, String> = FxHashMap::default();

    for name in net.names().to_vec() {
        if !matches!(net.node(&name), Some(Node::Decision(_))) {
            continue;
        }
        match fixed.and_then(|m| m.get(&name)) {
            Some(label) => {
                net.set_decision_deterministic(&name, label)?;
                chosen.insert(name.clone(), label.clone());
            }
            None => net.set_decision_fully_mixed(&name)?,
        }
    }

    for d in order {
        if chosen.contains_key(d) {
            continue;
        }
        let (decisions, info_parents) = match net.node(d) {
            Some(Node::Decision(n)) => (n.decisions().to_vec(), n.parents().to_vec()),
            _ => return Err(EngineError::UnknownVariable(d.clone())),
        };
        let factors = all_joint_factors(&net)?;
        let eliminate: Vec<String> = net
            .names()
            .iter()
            .filter(|n| *n != d && !info_parents.contains(n) && !matches!(net.node(n), Some(Node::Utility(_))))
            .cloned()
            .collect();
        let result = generalized_ve(factors, &eliminate, factor_size_limit)?;
        let utility = result.utility().clone();

        if info_parents.is_empty() {
            let best = argmax_label(&utility, &decisions);
            net.set_decision_deterministic(d, &best)?;
            chosen.insert(d.clone(), best);
        } else {
            let parent_values: Vec<Vec<String>> = info_parents
                .iter()
                .map(|p| node_labels(&net, p))
                .collect::<Result<_>>()?;
            let parent_dims: Vec<usize> = parent_values.iter().map(Vec::len).collect();
            let shape: Vec<usize> = std::iter::once(decisions.len())
                .chain(parent_dims.iter().copied())
                .collect();
            let strides = row_major_strides(&shape);
            let mut rule = vec![0.0; cell_count(&shape)];
            for combo in indices(&parent_dims) {
                let selection: Vec<(String, Vec<String>)> = info_parents
                    .iter()
                    .enumerate()
                    .map(|(axis, p)| (p.clone(), vec![parent_values[axis][combo[axis]].clone()]))
                    .collect();
                let slice = utility.get_potential(Some(&selection))?;
                let best_decision = slice
                    .iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
                    .map_or(0, |(i, _)| i);
                let mut index = vec![best_decision];
                index.extend(combo.iter().copied());
                rule[flat_index(&strides, &index)] = 1.0;
            }
            net.set_cpt(d, rule)?;
            // Record a representative label; callers needing the full
            // parent-dependent policy should read it back off `net`.
            chosen.insert(d.clone(), decisions[0].clone());
        }
    }
    Ok(chosen)
}

fn argmax_label(factor: &Factor, labels: &[String]) -> String {
    factor
        .table()
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)).map_or_else(|| labels[0].clone(), |(i, _)| labels[i].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Variable;

    // "Find the PhD" scenario: a single decision (apply to program A or B),
    // an uncertain outcome conditioned on the decision, and a utility over
    // the outcome.
    fn phd_network() -> Network {
        let mut net = Network::new();
        net.add_decision("apply_to", vec!["a".to_string(), "b".to_string()])
            .unwrap();
        net.add_discrete(Variable::new(
            "admitted",
            vec!["yes".to_string(), "no".to_string()],
        ))
        .unwrap();
        net.add_edge("apply_to", "admitted").unwrap();
        net.add_utility("payoff").unwrap();
        net.add_edge("admitted", "payoff").unwrap();

        // P(admitted | apply_to): program A is a reach, program B is a safety.
        // axes (admitted, apply_to), row-major: [yes|a, yes|b, no|a, no|b]
        net.set_cpt("admitted", vec![0.2, 0.9, 0.8, 0.1]).unwrap();
        // utility(admitted): being admitted is worth much more than not.
        net.set_cpt("payoff", vec![100.0, 0.0]).unwrap();
        net
    }

    #[test]
    fn test_expected_utility_matches_hand_computation() {
        let net = phd_network();
        let limit = usize::MAX;
        let eu_a = expected_utility(&net, &[("apply_to".to_string(), "a".to_string())], limit).unwrap();
        let eu_b = expected_utility(&net, &[("apply_to".to_string(), "b".to_string())], limit).unwrap();
        assert!((eu_a - 20.0).abs() < 1e-9, "{eu_a}");
        assert!((eu_b - 90.0).abs() < 1e-9, "{eu_b}");
    }

    #[test]
    fn test_optimal_decision_picks_the_safety_program() {
        let net = phd_network();
        let order = vec!["apply_to".to_string()];
        let decisions = optimal_decisions(&net, &order, None, usize::MAX).unwrap();
        assert_eq!(decisions.get("apply_to").map(String::as_str), Some("b"));
    }

    #[test]
    fn test_combine_and_marginalize_out_recovers_expectation() {
        // Two independent coins and a utility that only depends on the first.
        let mut net = Network::new();
        net.add_discrete(Variable::new("x", vec!["h".to_string(), "t".to_string()]))
            .unwrap();
        net.add_discrete(Variable::new("y", vec!["h".to_string(), "t".to_string()]))
            .unwrap();
        net.add_utility("u").unwrap();
        net.add_edge("x", "u").unwrap();
        net.set_cpt("x", vec![0.5, 0.5]).unwrap();
        net.set_cpt("y", vec![0.5, 0.5]).unwrap();
        net.set_cpt("u", vec![10.0, 0.0]).unwrap();

        let factors = all_joint_factors(&net).unwrap();
        let result = generalized_ve(
            factors,
            &["x".to_string(), "y".to_string()],
            usize::MAX,
        )
        .unwrap();
        assert!((result.utility().table()[0] - 5.0).abs() < 1e-9);
    }
}
