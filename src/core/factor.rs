//! The factor algebra over discrete variables.

use rustc_hash::FxHashMap;

use crate::core::network::Network;
use crate::core::node::Node;
use crate::core::tensor::{cell_count, flat_index, indices, row_major_strides};
use crate::error::{EngineError, Result};

/// Divides `a` by `b`, defining `1/0 := 0` (and, transitively, `0/0 := 0`).
///
/// The single fixed policy for this crate's factor algebra: division by
/// zero never produces `NaN`.
#[inline]
fn safe_div(a: f64, b: f64) -> f64 {
    if b == 0.0 {
        0.0
    } else {
        a / b
    }
}

/// A labeled dense tensor over a set of discrete variables.
///
/// A factor is value-like: every operator below takes owned or borrowed
/// inputs and returns a fresh `Factor` rather than mutating an operand, so
/// no two factors ever alias the same underlying buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    vars: Vec<String>,
    values: Vec<Vec<String>>,
    table: Vec<f64>,
}

impl Factor {
    fn dims(&self) -> Vec<usize> {
        self.values.iter().map(Vec::len).collect()
    }

    fn strides(&self) -> Vec<usize> {
        row_major_strides(&self.dims())
    }

    /// The ordered variable names, axis by axis.
    #[must_use]
    pub fn vars(&self) -> &[String] {
        &self.vars
    }

    /// Whether `var` is one of this factor's variables.
    #[must_use]
    pub fn has_var(&self, var: &str) -> bool {
        self.vars.iter().any(|v| v == var)
    }

    /// The ordered value labels for one of this factor's variables.
    #[must_use]
    pub fn values_of(&self, var: &str) -> Option<&[String]> {
        self.vars
            .iter()
            .position(|v| v == var)
            .map(|axis| self.values[axis].as_slice())
    }

    /// The flat, row-major table of potentials.
    #[must_use]
    pub fn table(&self) -> &[f64] {
        &self.table
    }

    /// The sum of every entry in the table.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.table.iter().sum()
    }

    fn new_raw(vars: Vec<String>, values: Vec<Vec<String>>, table: Vec<f64>) -> Self {
        debug_assert_eq!(vars.len(), values.len());
        debug_assert_eq!(table.len(), values.iter().map(Vec::len).product::<usize>());
        Self { vars, values, table }
    }

    /// A factor that is identically 1 over the given variables.
    #[must_use]
    pub fn unit(vars: Vec<String>, values: Vec<Vec<String>>) -> Self {
        let dims: Vec<usize> = values.iter().map(Vec::len).collect();
        let table = vec![1.0; cell_count(&dims)];
        Self::new_raw(vars, values, table)
    }

    /// A factor that is identically 0 over the given variables.
    #[must_use]
    pub fn zero(vars: Vec<String>, values: Vec<Vec<String>>) -> Self {
        let dims: Vec<usize> = values.iter().map(Vec::len).collect();
        let table = vec![0.0; cell_count(&dims)];
        Self::new_raw(vars, values, table)
    }

    /// A rank-0 factor holding a single scalar value.
    #[must_use]
    pub fn trivial(p: f64) -> Self {
        Self::new_raw(Vec::new(), Vec::new(), vec![p])
    }

    /// Builds a factor from a discrete node's CPT: `vars = [self, parents...]`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownVariable`] if `name` is not a discrete
    /// node in `network`.
    pub fn from_discrete_node(network: &Network, name: &str) -> Result<Self> {
        let node = network
            .node(name)
            .ok_or_else(|| EngineError::UnknownVariable(name.to_string()))?;
        let Node::Discrete(discrete) = node else {
            return Err(EngineError::UnknownVariable(name.to_string()));
        };
        let mut vars = vec![name.to_string()];
        let mut values = vec![discrete.variable().values().to_vec()];
        for parent in discrete.parents() {
            vars.push(parent.clone());
            values.push(node_labels(network, parent)?);
        }
        Ok(Self::new_raw(vars, values, discrete.cpt().to_vec()))
    }

    /// Builds a factor from a utility node's table: `vars = parents`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownVariable`] if `name` is not a utility
    /// node in `network`.
    pub fn from_utility_node(network: &Network, name: &str) -> Result<Self> {
        let node = network
            .node(name)
            .ok_or_else(|| EngineError::UnknownVariable(name.to_string()))?;
        let Node::Utility(utility) = node else {
            return Err(EngineError::UnknownVariable(name.to_string()));
        };
        let mut vars = Vec::new();
        let mut values = Vec::new();
        for parent in utility.parents() {
            vars.push(parent.clone());
            values.push(node_labels(network, parent)?);
        }
        Ok(Self::new_raw(vars, values, utility.table().to_vec()))
    }

    /// Builds a factor from a decision node's rule: `vars = [self, parents...]`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownVariable`] if `name` is not a decision
    /// node in `network`.
    pub fn from_decision_node(network: &Network, name: &str) -> Result<Self> {
        let node = network
            .node(name)
            .ok_or_else(|| EngineError::UnknownVariable(name.to_string()))?;
        let Node::Decision(decision) = node else {
            return Err(EngineError::UnknownVariable(name.to_string()));
        };
        let mut vars = vec![name.to_string()];
        let mut values = vec![decision.decisions().to_vec()];
        for parent in decision.parents() {
            vars.push(parent.clone());
            values.push(node_labels(network, parent)?);
        }
        Ok(Self::new_raw(vars, values, decision.rule().to_vec()))
    }

    /// Builds a normalized joint histogram factor from joint samples.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownVariable`] if a sample is missing one
    /// of `vars`, or [`EngineError::UnknownLabel`] if a sample's label is
    /// not one of that variable's values.
    pub fn from_samples(
        vars: &[(String, Vec<String>)],
        samples: &[FxHashMap<String, String>],
    ) -> Result<Self> {
        let dims: Vec<usize> = vars.iter().map(|(_, v)| v.len()).collect();
        let strides = row_major_strides(&dims);
        let mut table = vec![0.0; cell_count(&dims)];
        for sample in samples {
            let mut index = Vec::with_capacity(vars.len());
            for (name, values) in vars {
                let label = sample
                    .get(name)
                    .ok_or_else(|| EngineError::UnknownVariable(name.clone()))?;
                let idx = values
                    .iter()
                    .position(|v| v == label)
                    .ok_or_else(|| EngineError::UnknownLabel {
                        variable: name.clone(),
                        label: label.clone(),
                    })?;
                index.push(idx);
            }
            table[flat_index(&strides, &index)] += 1.0;
        }
        let vars_list = vars.iter().map(|(n, _)| n.clone()).collect();
        let values_list = vars.iter().map(|(_, v)| v.clone()).collect();
        Ok(Self::new_raw(vars_list, values_list, table).normalize())
    }

    /// A one-hot factor over `variable` observing `label` (hard evidence).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidEvidence`] if `label` is not in `values`.
    pub fn hard_evidence(variable: &str, values: Vec<String>, label: &str) -> Result<Self> {
        let idx = values
            .iter()
            .position(|v| v == label)
            .ok_or_else(|| EngineError::InvalidEvidence {
                variable: variable.to_string(),
                reason: format!("`{label}` is not a value of `{variable}`"),
            })?;
        let mut table = vec![0.0; values.len()];
        table[idx] = 1.0;
        Ok(Self::new_raw(vec![variable.to_string()], vec![values], table))
    }

    /// A soft-evidence factor under the likelihood-ratio ("nothing else
    /// considered") interpretation: `ratios` becomes the potential directly.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidEvidence`] if `ratios.len() != values.len()`.
    pub fn soft_evidence_likelihood(
        variable: &str,
        values: Vec<String>,
        ratios: &[f64],
    ) -> Result<Self> {
        if ratios.len() != values.len() {
            return Err(EngineError::InvalidEvidence {
                variable: variable.to_string(),
                reason: format!(
                    "expected {} entries, got {}",
                    values.len(),
                    ratios.len()
                ),
            });
        }
        Ok(Self::new_raw(
            vec![variable.to_string()],
            vec![values],
            ratios.to_vec(),
        ))
    }

    /// A soft-evidence factor under the all-things-considered ("desired
    /// posterior") interpretation: the likelihood ratio whose posterior
    /// equals `new` given the prior `old`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidEvidence`] if `old` or `new` does not
    /// have length `values.len()`.
    pub fn soft_evidence_posterior(
        variable: &str,
        values: Vec<String>,
        old: &[f64],
        new: &[f64],
    ) -> Result<Self> {
        if old.len() != values.len() || new.len() != values.len() {
            return Err(EngineError::InvalidEvidence {
                variable: variable.to_string(),
                reason: format!(
                    "expected {} entries, got old={} new={}",
                    values.len(),
                    old.len(),
                    new.len()
                ),
            });
        }
        let reference = new
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map_or(0, |(i, _)| i);
        let mut table = vec![0.0; values.len()];
        for i in 0..values.len() {
            table[i] = if i == reference {
                1.0
            } else if old[i] == 0.0 {
                0.0
            } else {
                (new[i] / old[i]) * safe_div(old[reference], new[reference])
            };
        }
        Ok(Self::new_raw(vec![variable.to_string()], vec![values], table))
    }

    /// Element-wise multiplies `self` and `other`.
    ///
    /// Result variables are `self.vars` followed by `other.vars \ self.vars`
    /// in `other`'s order (left-biased axis order).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::FactorTooLarge`] if the result tensor would
    /// exceed `factor_size_limit` cells.
    pub fn product(&self, other: &Self, factor_size_limit: usize) -> Result<Self> {
        let mut vars = self.vars.clone();
        let mut values = self.values.clone();
        for (axis, var) in other.vars.iter().enumerate() {
            if !self.has_var(var) {
                vars.push(var.clone());
                values.push(other.values[axis].clone());
            }
        }
        let dims: Vec<usize> = values.iter().map(Vec::len).collect();
        let cells = cell_count(&dims);
        if cells > factor_size_limit {
            return Err(EngineError::FactorTooLarge {
                cells,
                limit: factor_size_limit,
            });
        }
        let self_pos: Vec<usize> = self
            .vars
            .iter()
            .map(|v| vars.iter().position(|w| w == v).unwrap())
            .collect();
        let other_pos: Vec<usize> = other
            .vars
            .iter()
            .map(|v| vars.iter().position(|w| w == v).unwrap())
            .collect();
        let self_strides = self.strides();
        let other_strides = other.strides();
        let mut table = vec![0.0; cells];
        for (flat, full_index) in indices(&dims).enumerate() {
            let self_index: Vec<usize> = self_pos.iter().map(|&p| full_index[p]).collect();
            let other_index: Vec<usize> = other_pos.iter().map(|&p| full_index[p]).collect();
            let a = self.table[flat_index(&self_strides, &self_index)];
            let b = other.table[flat_index(&other_strides, &other_index)];
            table[flat] = a * b;
        }
        Ok(Self::new_raw(vars, values, table))
    }

    /// Element-wise adds `self` and `other`, broadcasting over variables
    /// each does not share with the other exactly as [`Factor::product`]
    /// does. Used to combine utility tables over a generalized-VE working
    /// set, where two utility factors rarely share the same variable set.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::FactorTooLarge`] if the result tensor would
    /// exceed `factor_size_limit` cells.
    pub(crate) fn add(&self, other: &Self, factor_size_limit: usize) -> Result<Self> {
        let mut vars = self.vars.clone();
        let mut values = self.values.clone();
        for (axis, var) in other.vars.iter().enumerate() {
            if !self.has_var(var) {
                vars.push(var.clone());
                values.push(other.values[axis].clone());
            }
        }
        let dims: Vec<usize> = values.iter().map(Vec::len).collect();
        let cells = cell_count(&dims);
        if cells > factor_size_limit {
            return Err(EngineError::FactorTooLarge {
                cells,
                limit: factor_size_limit,
            });
        }
        let self_pos: Vec<usize> = self
            .vars
            .iter()
            .map(|v| vars.iter().position(|w| w == v).unwrap())
            .collect();
        let other_pos: Vec<usize> = other
            .vars
            .iter()
            .map(|v| vars.iter().position(|w| w == v).unwrap())
            .collect();
        let self_strides = self.strides();
        let other_strides = other.strides();
        let mut table = vec![0.0; cells];
        for (flat, full_index) in indices(&dims).enumerate() {
            let self_index: Vec<usize> = self_pos.iter().map(|&p| full_index[p]).collect();
            let other_index: Vec<usize> = other_pos.iter().map(|&p| full_index[p]).collect();
            let a = self.table[flat_index(&self_strides, &self_index)];
            let b = other.table[flat_index(&other_strides, &other_index)];
            table[flat] = a + b;
        }
        Ok(Self::new_raw(vars, values, table))
    }

    /// Replaces every entry `p` with `1/p`, defining `1/0 := 0`.
    #[must_use]
    pub fn invert(&self) -> Self {
        let table = self.table.iter().map(|&p| safe_div(1.0, p)).collect();
        Self::new_raw(self.vars.clone(), self.values.clone(), table)
    }

    /// Divides `self` by `other`; defined only when `vars(other) ⊆ vars(self)`.
    ///
    /// Equivalent to `self.product(&other.invert(), limit)`. Divisor
    /// entries that are zero propagate as zero in the quotient.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ShapeMismatch`] if `other` has a variable not
    /// in `self`, or [`EngineError::FactorTooLarge`] per [`Factor::product`].
    pub fn divide(&self, other: &Self, factor_size_limit: usize) -> Result<Self> {
        for var in &other.vars {
            if !self.has_var(var) {
                return Err(EngineError::ShapeMismatch {
                    node: var.clone(),
                    expected: self.dims(),
                    got: other.dims(),
                });
            }
        }
        self.product(&other.invert(), factor_size_limit)
    }

    /// Sums `remove` out of this factor along their axes, dropping them.
    #[must_use]
    pub fn marginalize(&self, remove: &[String]) -> Self {
        let keep_axes: Vec<usize> = (0..self.vars.len())
            .filter(|&i| !remove.iter().any(|r| r == &self.vars[i]))
            .collect();
        let vars = keep_axes.iter().map(|&i| self.vars[i].clone()).collect();
        let values: Vec<Vec<String>> = keep_axes.iter().map(|&i| self.values[i].clone()).collect();
        let new_dims: Vec<usize> = values.iter().map(Vec::len).collect();
        let new_strides = row_major_strides(&new_dims);
        let mut table = vec![0.0; cell_count(&new_dims)];
        let old_strides = self.strides();
        for full_index in indices(&self.dims()) {
            let sub_index: Vec<usize> = keep_axes.iter().map(|&i| full_index[i]).collect();
            let flat_new = flat_index(&new_strides, &sub_index);
            let flat_old = flat_index(&old_strides, &full_index);
            table[flat_new] += self.table[flat_old];
        }
        Self::new_raw(vars, values, table)
    }

    /// Divides every entry by the table sum; if the sum is zero the factor
    /// is returned unchanged, so callers can distinguish "structurally
    /// unreachable evidence" from a buggy tensor.
    #[must_use]
    pub fn normalize(&self) -> Self {
        let total = self.sum();
        if total == 0.0 {
            return self.clone();
        }
        let table = self.table.iter().map(|&x| x / total).collect();
        Self::new_raw(self.vars.clone(), self.values.clone(), table)
    }

    /// Returns the sub-tensor restricting each named variable to the given
    /// labels, in the requested order; variables not mentioned keep their
    /// full extent. With no selection, returns a copy of the whole table.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownLabel`] for any requested label that
    /// is not one of the variable's values.
    pub fn get_potential(&self, selection: Option<&[(String, Vec<String>)]>) -> Result<Vec<f64>> {
        let sel_map: FxHashMap<&str, &Vec<String>> = selection
            .map(|s| s.iter().map(|(k, v)| (k.as_str(), v)).collect())
            .unwrap_or_default();
        let mut axis_indices: Vec<Vec<usize>> = Vec::with_capacity(self.vars.len());
        for (axis, var) in self.vars.iter().enumerate() {
            if let Some(labels) = sel_map.get(var.as_str()) {
                let mut idxs = Vec::with_capacity(labels.len());
                for label in *labels {
                    let idx = self.values[axis].iter().position(|v| v == label).ok_or_else(|| {
                        EngineError::UnknownLabel {
                            variable: var.clone(),
                            label: label.clone(),
                        }
                    })?;
                    idxs.push(idx);
                }
                axis_indices.push(idxs);
            } else {
                axis_indices.push((0..self.values[axis].len()).collect());
            }
        }
        let strides = self.strides();
        let mut out = Vec::with_capacity(axis_indices.iter().map(Vec::len).product());
        collect_selection(&axis_indices, &strides, &self.table, &mut Vec::new(), &mut out);
        Ok(out)
    }
}

fn collect_selection(
    axis_indices: &[Vec<usize>],
    strides: &[usize],
    table: &[f64],
    current: &mut Vec<usize>,
    out: &mut Vec<f64>,
) {
    if current.len() == axis_indices.len() {
        out.push(table[flat_index(strides, current)]);
        return;
    }
    let axis = current.len();
    for &idx in &axis_indices[axis] {
        current.push(idx);
        collect_selection(axis_indices, strides, table, current, out);
        current.pop();
    }
}

fn node_labels(network: &Network, name: &str) -> Result<Vec<String>> {
    match network
        .node(name)
        .ok_or_else(|| EngineError::UnknownVariable(name.to_string()))?
    {
        Node::Discrete(n) => Ok(n.variable().values().to_vec()),
        Node::Decision(n) => Ok(n.decisions().to_vec()),
        Node::Utility(_) => Err(EngineError::UnknownVariable(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("v{i}")).collect()
    }

    #[test]
    fn test_product_left_biased_order() {
        // f1 over A: (0.3, 0.7)
        let f1 = Factor::new_raw(vec!["A".into()], vec![labels(2)], vec![0.3, 0.7]);
        // f2 over (A,B): rows ((0.2,0.4),(0.4,0.1),(0.4,0.5)) with A axis 0
        // laid out as described in the scenario: table is A-major, B has 3 values
        let f2 = Factor::new_raw(
            vec!["A".into(), "B".into()],
            vec![labels(2), labels(3)],
            vec![0.2, 0.4, 0.4, 0.4, 0.1, 0.5],
        );
        let product = f1.product(&f2, usize::MAX).unwrap();
        assert_eq!(product.vars(), &["A", "B"]);
        let expected_table = [0.06, 0.12, 0.12, 0.28, 0.07, 0.35];
        for (a, b) in product.table().iter().zip(expected_table.iter()) {
            assert!((a - b).abs() < 1e-9, "{a} vs {b}");
        }
        let marginal_a = product.marginalize(&["A".to_string()]);
        assert_eq!(marginal_a.vars(), &["B"]);
        let expected = [0.34, 0.19, 0.47];
        for (a, b) in marginal_a.table().iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-9, "{a} vs {b}");
        }
    }

    #[test]
    fn test_commutativity_under_permutation() {
        let a = Factor::new_raw(vec!["A".into()], vec![labels(2)], vec![0.3, 0.7]);
        let b = Factor::new_raw(
            vec!["B".into()],
            vec![labels(2)],
            vec![0.1, 0.9],
        );
        let ab = a.product(&b, usize::MAX).unwrap();
        let ba = b.product(&a, usize::MAX).unwrap();
        assert_eq!(ab.vars(), &["A", "B"]);
        assert_eq!(ba.vars(), &["B", "A"]);
        for av in &a.values[0] {
            for bv in &b.values[0] {
                let sel_ab = ab
                    .get_potential(Some(&[
                        ("A".to_string(), vec![av.clone()]),
                        ("B".to_string(), vec![bv.clone()]),
                    ]))
                    .unwrap();
                let sel_ba = ba
                    .get_potential(Some(&[
                        ("A".to_string(), vec![av.clone()]),
                        ("B".to_string(), vec![bv.clone()]),
                    ]))
                    .unwrap();
                assert_eq!(sel_ab, sel_ba);
            }
        }
    }

    #[test]
    fn test_divide_zero_propagates() {
        let a = Factor::new_raw(vec!["A".into()], vec![labels(2)], vec![0.4, 0.6]);
        let b = Factor::new_raw(vec!["A".into()], vec![labels(2)], vec![0.0, 2.0]);
        let q = a.divide(&b, usize::MAX).unwrap();
        assert_eq!(q.table(), &[0.0, 0.3]);
    }

    #[test]
    fn test_normalize_zero_untouched() {
        let f = Factor::zero(vec!["A".into()], vec![labels(2)]);
        let n = f.normalize();
        assert_eq!(n.table(), &[0.0, 0.0]);
    }

    #[test]
    fn test_hard_evidence_matches_one_hot_soft() {
        let hard = Factor::hard_evidence("A", labels(3), "v1").unwrap();
        let soft =
            Factor::soft_evidence_likelihood("A", labels(3), &[0.0, 1.0, 0.0]).unwrap();
        assert_eq!(hard.table(), soft.table());
    }

    #[test]
    fn test_soft_evidence_posterior_identity() {
        let old = [0.6, 0.4];
        let posterior = Factor::soft_evidence_posterior("A", labels(2), &old, &old).unwrap();
        let prior = Factor::new_raw(vec!["A".into()], vec![labels(2)], old.to_vec());
        let product = prior.product(&posterior, usize::MAX).unwrap().normalize();
        for (p, o) in product.table().iter().zip(old.iter()) {
            assert!((p - o).abs() < 1e-9);
        }
    }
}
