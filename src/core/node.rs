//! Discrete, utility and decision nodes.

use crate::core::tensor::{cell_count, row_major_strides};
use crate::core::variable::Variable;
use crate::error::{EngineError, Result};

/// A conditional probability table, utility table, or decision rule node.
#[derive(Debug, Clone)]
pub enum Node {
    /// A discrete random variable with a conditional probability tensor.
    Discrete(DiscreteNode),
    /// A utility node: a real-valued table over its parents' instantiations.
    Utility(UtilityNode),
    /// A decision node: a distribution over decisions given information parents.
    Decision(DecisionNode),
}

impl Node {
    /// The node's name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Node::Discrete(n) => n.variable.name(),
            Node::Utility(n) => &n.name,
            Node::Decision(n) => &n.name,
        }
    }

    /// The node's ordered parent names.
    #[must_use]
    pub fn parents(&self) -> &[String] {
        match self {
            Node::Discrete(n) => &n.parents,
            Node::Utility(n) => &n.parents,
            Node::Decision(n) => &n.parents,
        }
    }

    pub(crate) fn remove_parent(&mut self, parent: &str) {
        match self {
            Node::Discrete(n) => n.parents.retain(|p| p != parent),
            Node::Utility(n) => n.parents.retain(|p| p != parent),
            Node::Decision(n) => n.parents.retain(|p| p != parent),
        }
        self.invalidate();
    }

    pub(crate) fn add_parent(&mut self, parent: String) {
        match self {
            Node::Discrete(n) => n.parents.push(parent),
            Node::Utility(n) => n.parents.push(parent),
            Node::Decision(n) => n.parents.push(parent),
        }
        self.invalidate();
    }

    pub(crate) fn invalidate(&mut self) {
        match self {
            Node::Discrete(n) => {
                n.valid = false;
                let shape = n.shape();
                n.cpt = vec![0.0; cell_count(&shape)];
            }
            Node::Utility(n) => {
                n.valid = false;
                let shape = n.shape();
                n.table = vec![0.0; cell_count(&shape)];
            }
            Node::Decision(n) => {
                n.valid = false;
                let shape = n.shape();
                n.rule = vec![0.0; cell_count(&shape)];
            }
        }
    }
}

/// A discrete random variable node with its conditional probability tensor.
#[derive(Debug, Clone)]
pub struct DiscreteNode {
    variable: Variable,
    parents: Vec<String>,
    cpt: Vec<f64>,
    valid: bool,
}

impl DiscreteNode {
    /// Creates a node with no parents and a zeroed, invalid CPT.
    #[must_use]
    pub fn new(variable: Variable) -> Self {
        let n = variable.cardinality();
        Self {
            variable,
            parents: Vec::new(),
            cpt: vec![0.0; n],
            valid: false,
        }
    }

    /// The node's underlying variable.
    #[must_use]
    pub fn variable(&self) -> &Variable {
        &self.variable
    }

    /// The node's ordered parents.
    #[must_use]
    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    /// Whether the CPT has been assigned since the last structural edit.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The expected tensor shape: (|self|, |parent0|, |parent1|, ...).
    ///
    /// Parent cardinalities are not known to this node in isolation; the
    /// owning [`crate::core::Network`] resolves them and calls
    /// [`DiscreteNode::shape_with_parent_cardinalities`].
    #[must_use]
    pub(crate) fn shape(&self) -> Vec<usize> {
        vec![self.variable.cardinality()]
    }

    pub(crate) fn shape_with_parent_cardinalities(&self, parent_cards: &[usize]) -> Vec<usize> {
        let mut shape = vec![self.variable.cardinality()];
        shape.extend_from_slice(parent_cards);
        shape
    }

    /// The flat conditional probability tensor.
    #[must_use]
    pub fn cpt(&self) -> &[f64] {
        &self.cpt
    }

    pub(crate) fn set_cpt_raw(&mut self, cpt: Vec<f64>) {
        self.cpt = cpt;
        self.valid = true;
    }

    pub(crate) fn cpt_mut(&mut self) -> &mut [f64] {
        &mut self.cpt
    }

    pub(crate) fn set_values(&mut self, values: Vec<String>) {
        self.variable.set_values(values);
    }

    pub(crate) fn set_parents_raw(&mut self, parents: Vec<String>) {
        self.parents = parents;
    }

    pub(crate) fn rename(&mut self, new_name: &str) {
        self.variable.rename(new_name);
    }
}

/// A real-valued utility node over its parents' instantiations.
#[derive(Debug, Clone)]
pub struct UtilityNode {
    name: String,
    parents: Vec<String>,
    table: Vec<f64>,
    valid: bool,
}

impl UtilityNode {
    /// Creates a utility node with no parents and a zeroed, invalid table.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parents: Vec::new(),
            table: vec![0.0],
            valid: false,
        }
    }

    /// The node's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The node's ordered parents.
    #[must_use]
    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    /// Whether the table has been assigned since the last structural edit.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn shape(&self) -> Vec<usize> {
        Vec::new()
    }

    pub(crate) fn shape_with_parent_cardinalities(&self, parent_cards: &[usize]) -> Vec<usize> {
        parent_cards.to_vec()
    }

    /// The flat utility tensor.
    #[must_use]
    pub fn table(&self) -> &[f64] {
        &self.table
    }

    pub(crate) fn set_table_raw(&mut self, table: Vec<f64>) {
        self.table = table;
        self.valid = true;
    }

    pub(crate) fn set_parents_raw(&mut self, parents: Vec<String>) {
        self.parents = parents;
    }

    pub(crate) fn rename(&mut self, new_name: &str) {
        self.name = new_name.to_string();
    }
}

/// A decision node: a rule over a finite set of decisions conditioned on
/// information parents.
#[derive(Debug, Clone)]
pub struct DecisionNode {
    name: String,
    decisions: Vec<String>,
    parents: Vec<String>,
    rule: Vec<f64>,
    valid: bool,
}

impl DecisionNode {
    /// Creates a decision node with the given finite set of decisions.
    #[must_use]
    pub fn new(name: impl Into<String>, decisions: Vec<String>) -> Self {
        let n = decisions.len();
        Self {
            name: name.into(),
            decisions,
            parents: Vec::new(),
            rule: vec![0.0; n],
            valid: false,
        }
    }

    /// The node's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The finite set of decisions, in order.
    #[must_use]
    pub fn decisions(&self) -> &[String] {
        &self.decisions
    }

    /// The node's ordered information parents.
    #[must_use]
    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    pub(crate) fn shape(&self) -> Vec<usize> {
        vec![self.decisions.len()]
    }

    pub(crate) fn shape_with_parent_cardinalities(&self, parent_cards: &[usize]) -> Vec<usize> {
        let mut shape = vec![self.decisions.len()];
        shape.extend_from_slice(parent_cards);
        shape
    }

    /// The flat decision rule tensor, shape (|decisions|, |parent0|, ...).
    #[must_use]
    pub fn rule(&self) -> &[f64] {
        &self.rule
    }

    /// Sets a deterministic rule: zero everywhere, 1 on the slice selecting
    /// `decision` (broadcast across any information-parent axes).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownLabel`] if `decision` is not one of
    /// this node's decisions.
    pub fn set_deterministic(&mut self, decision: &str, parent_cards: &[usize]) -> Result<()> {
        let d_index = self
            .decisions
            .iter()
            .position(|d| d == decision)
            .ok_or_else(|| EngineError::UnknownLabel {
                variable: self.name.clone(),
                label: decision.to_string(),
            })?;
        let shape = self.shape_with_parent_cardinalities(parent_cards);
        let strides = row_major_strides(&shape);
        self.rule = vec![0.0; cell_count(&shape)];
        let rest: usize = shape[1..].iter().product();
        for offset in 0..rest {
            self.rule[d_index * strides[0] + offset] = 1.0;
        }
        self.valid = true;
        Ok(())
    }

    /// Sets a fully-mixed (uniform) rule over the decisions.
    pub fn set_fully_mixed(&mut self, parent_cards: &[usize]) {
        let shape = self.shape_with_parent_cardinalities(parent_cards);
        let n_decisions = self.decisions.len();
        let p = 1.0 / n_decisions as f64;
        self.rule = vec![p; cell_count(&shape)];
        self.valid = true;
    }

    pub(crate) fn set_rule_raw(&mut self, rule: Vec<f64>) {
        self.rule = rule;
        self.valid = true;
    }

    pub(crate) fn set_parents_raw(&mut self, parents: Vec<String>) {
        self.parents = parents;
    }

    pub(crate) fn rename(&mut self, new_name: &str) {
        self.name = new_name.to_string();
    }
}
