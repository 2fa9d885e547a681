//! The variable registry and directed acyclic graph of nodes.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::core::node::{DecisionNode, DiscreteNode, Node, UtilityNode};
use crate::core::tensor::{cell_count, row_major_strides};
use crate::core::variable::Variable;
use crate::error::{EngineError, Result};

/// A directed acyclic graph of discrete, utility and decision nodes.
///
/// Nodes hold only their parents' *names*, in a deterministic order; the
/// network owns the adjacency and is the only place a parent name is
/// resolved back into a node. This avoids the back-reference ownership
/// puzzle that cyclic node/parent references would create.
#[derive(Debug, Clone, Default)]
pub struct Network {
    nodes: FxHashMap<String, Node>,
    order: Vec<String>,
    children: FxHashMap<String, Vec<String>>,
    generation: u64,
}

impl Network {
    /// Creates an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A monotonically increasing counter bumped on every structural
    /// mutation. A [`crate::algorithms::JunctionTree`] snapshots this at
    /// build time and compares it on every later call to detect staleness.
    #[must_use]
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    fn bump_generation(&mut self) {
        self.generation += 1;
    }

    /// The node names, in registration order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Looks up a node by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    fn node_mut(&mut self, name: &str) -> Result<&mut Node> {
        self.nodes
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownVariable(name.to_string()))
    }

    fn require(&self, name: &str) -> Result<&Node> {
        self.nodes
            .get(name)
            .ok_or_else(|| EngineError::UnknownVariable(name.to_string()))
    }

    /// Cardinality of a discrete variable or the number of decisions of a
    /// decision node; utility nodes have no cardinality of their own.
    fn cardinality(&self, name: &str) -> Result<usize> {
        match self.require(name)? {
            Node::Discrete(n) => Ok(n.variable().cardinality()),
            Node::Decision(n) => Ok(n.decisions().len()),
            Node::Utility(_) => Err(EngineError::UnknownVariable(name.to_string())),
        }
    }

    fn parent_cardinalities(&self, parents: &[String]) -> Result<Vec<usize>> {
        parents.iter().map(|p| self.cardinality(p)).collect()
    }

    /// Adds a node to the network.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NameConflict`] if a node with this name
    /// already exists.
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        let name = node.name().to_string();
        if self.nodes.contains_key(&name) {
            return Err(EngineError::NameConflict(name));
        }
        log::debug!("adding node `{name}`");
        self.order.push(name.clone());
        self.children.insert(name.clone(), Vec::new());
        self.nodes.insert(name, node);
        self.bump_generation();
        Ok(())
    }

    /// Convenience wrapper around [`Network::add_node`] for discrete nodes.
    ///
    /// # Errors
    ///
    /// See [`Network::add_node`].
    pub fn add_discrete(&mut self, variable: Variable) -> Result<()> {
        self.add_node(Node::Discrete(DiscreteNode::new(variable)))
    }

    /// Convenience wrapper around [`Network::add_node`] for utility nodes.
    ///
    /// # Errors
    ///
    /// See [`Network::add_node`].
    pub fn add_utility(&mut self, name: impl Into<String>) -> Result<()> {
        self.add_node(Node::Utility(UtilityNode::new(name)))
    }

    /// Convenience wrapper around [`Network::add_node`] for decision nodes.
    ///
    /// # Errors
    ///
    /// See [`Network::add_node`].
    pub fn add_decision(&mut self, name: impl Into<String>, decisions: Vec<String>) -> Result<()> {
        self.add_node(Node::Decision(DecisionNode::new(name, decisions)))
    }

    /// Adds an edge `parent -> child`, appending `parent` to the child's
    /// parent order and invalidating the child's tensor shape.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownVariable`] if either endpoint does not
    /// exist.
    pub fn add_edge(&mut self, parent: &str, child: &str) -> Result<()> {
        self.require(parent)?;
        self.node_mut(child)?.add_parent(parent.to_string());
        self.children
            .entry(parent.to_string())
            .or_default()
            .push(child.to_string());
        log::debug!("added edge `{parent}` -> `{child}`");
        self.bump_generation();
        Ok(())
    }

    /// Removes the edge `parent -> child`, invalidating the child's tensor.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownVariable`] if either endpoint does not
    /// exist.
    pub fn remove_edge(&mut self, parent: &str, child: &str) -> Result<()> {
        self.require(parent)?;
        self.node_mut(child)?.remove_parent(parent);
        if let Some(kids) = self.children.get_mut(parent) {
            kids.retain(|c| c != child);
        }
        log::debug!("removed edge `{parent}` -> `{child}`");
        self.bump_generation();
        Ok(())
    }

    /// Replaces a discrete variable's value list, invalidating its own CPT
    /// and the CPT shape of every direct child (does not cascade further).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownVariable`] if `name` does not exist or
    /// is not a discrete node.
    pub fn change_values(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        match self.node_mut(name)? {
            Node::Discrete(n) => n.set_values(values),
            _ => return Err(EngineError::UnknownVariable(name.to_string())),
        }
        self.node_mut(name)?.invalidate();
        let children = self.children.get(name).cloned().unwrap_or_default();
        for child in children {
            self.node_mut(&child)?.invalidate();
        }
        log::debug!("changed values of `{name}`");
        self.bump_generation();
        Ok(())
    }

    /// Atomically renames a node across the node map, parent lists, and
    /// edges.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownVariable`] if `old` does not exist, or
    /// [`EngineError::NameConflict`] if `new` is already taken.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        if old == new {
            return Ok(());
        }
        let mut node = self
            .nodes
            .remove(old)
            .ok_or_else(|| EngineError::UnknownVariable(old.to_string()))?;
        if self.nodes.contains_key(new) {
            self.nodes.insert(old.to_string(), node);
            return Err(EngineError::NameConflict(new.to_string()));
        }
        rename_in_place(&mut node, old, new);
        self.nodes.insert(new.to_string(), node);
        for name in &mut self.order {
            if name == old {
                *name = new.to_string();
            }
        }
        for other in self.nodes.values_mut() {
            if other.parents().iter().any(|p| p == old) {
                let mut parents: Vec<String> = other.parents().to_vec();
                for p in &mut parents {
                    if p == old {
                        *p = new.to_string();
                    }
                }
                set_parents(other, parents);
            }
        }
        if let Some(kids) = self.children.remove(old) {
            self.children.insert(new.to_string(), kids);
        }
        for kids in self.children.values_mut() {
            for k in kids.iter_mut() {
                if k == old {
                    *k = new.to_string();
                }
            }
        }
        log::debug!("renamed `{old}` to `{new}`");
        self.bump_generation();
        Ok(())
    }

    /// Computes the expected tensor shape for a node given the current
    /// network structure: `(|self|, |parent0|, |parent1|, ...)` for
    /// discrete/decision nodes, `(|parent0|, ...)` for utility nodes.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownVariable`] if `name` does not exist.
    pub fn expected_shape(&self, name: &str) -> Result<Vec<usize>> {
        let node = self.require(name)?;
        let parent_cards = self.parent_cardinalities(node.parents())?;
        Ok(match node {
            Node::Discrete(n) => n.shape_with_parent_cardinalities(&parent_cards),
            Node::Utility(n) => n.shape_with_parent_cardinalities(&parent_cards),
            Node::Decision(n) => n.shape_with_parent_cardinalities(&parent_cards),
        })
    }

    /// Sets a node's full tensor (CPT, utility table, or decision rule).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ShapeMismatch`] if `values.len()` does not
    /// match the node's expected shape's cell count, or
    /// [`EngineError::UnknownVariable`] if `name` does not exist.
    pub fn set_cpt(&mut self, name: &str, values: Vec<f64>) -> Result<()> {
        let expected = self.expected_shape(name)?;
        let expected_cells = cell_count(&expected);
        if values.len() != expected_cells {
            return Err(EngineError::ShapeMismatch {
                node: name.to_string(),
                expected,
                got: vec![values.len()],
            });
        }
        match self.node_mut(name)? {
            Node::Discrete(n) => n.set_cpt_raw(values),
            Node::Utility(n) => n.set_table_raw(values),
            Node::Decision(n) => n.set_rule_raw(values),
        }
        log::debug!("set tensor of `{name}`");
        Ok(())
    }

    /// Writes `p` into the slice of `name`'s CPT matching `value` and the
    /// (possibly underspecified) parent assignment; unspecified parents
    /// broadcast across their axes. Entries not covered are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownVariable`], or
    /// [`EngineError::UnknownLabel`] if `value` or a parent assignment is
    /// not one of the relevant variable's labels.
    pub fn set_probability(
        &mut self,
        name: &str,
        value: &str,
        p: f64,
        parent_values: &[(String, String)],
    ) -> Result<()> {
        let node = self.require(name)?;
        let parents = node.parents().to_vec();
        let parent_cards = self.parent_cardinalities(&parents)?;
        let self_card = self.cardinality(name)?;
        let mut shape = vec![self_card];
        shape.extend_from_slice(&parent_cards);
        let strides = row_major_strides(&shape);

        let value_index = self.label_index(name, value)?;
        let fixed = self.resolve_partial_assignment(&parents, parent_values)?;

        let axes_to_iterate: Vec<usize> = (0..parents.len())
            .filter(|axis| fixed[*axis].is_none())
            .collect();
        let free_dims: Vec<usize> = axes_to_iterate.iter().map(|&a| parent_cards[a]).collect();

        let node = self.node_mut(name)?;
        let cells = cell_count(&shape);
        let buf = match node {
            Node::Discrete(n) => {
                if n.cpt().len() != cells {
                    n.set_cpt_raw(vec![0.0; cells]);
                }
                n.cpt_mut()
            }
            _ => return Err(EngineError::UnknownVariable(name.to_string())),
        };

        for combo in crate::core::tensor::indices(&free_dims) {
            let mut index = vec![0usize; shape.len()];
            index[0] = value_index;
            for (axis, &parent_axis) in axes_to_iterate.iter().enumerate() {
                index[parent_axis + 1] = combo[axis];
            }
            for (axis, slot) in fixed.iter().enumerate() {
                if let Some(v) = slot {
                    index[axis + 1] = *v;
                }
            }
            let flat = crate::core::tensor::flat_index(&strides, &index);
            buf[flat] = p;
        }
        Ok(())
    }

    /// Reads the sub-slice of `name`'s CPT matching `value` and the
    /// (possibly underspecified) parent assignment, as a fresh copy.
    ///
    /// # Errors
    ///
    /// See [`Network::set_probability`].
    pub fn get_probability(
        &self,
        name: &str,
        value: &str,
        parent_values: &[(String, String)],
    ) -> Result<Vec<f64>> {
        let node = self.require(name)?;
        let parents = node.parents().to_vec();
        let parent_cards = self.parent_cardinalities(&parents)?;
        let self_card = self.cardinality(name)?;
        let mut shape = vec![self_card];
        shape.extend_from_slice(&parent_cards);
        let strides = row_major_strides(&shape);

        let value_index = self.label_index(name, value)?;
        let fixed = self.resolve_partial_assignment(&parents, parent_values)?;

        let axes_to_iterate: Vec<usize> = (0..parents.len())
            .filter(|axis| fixed[*axis].is_none())
            .collect();
        let free_dims: Vec<usize> = axes_to_iterate.iter().map(|&a| parent_cards[a]).collect();

        let cpt = match node {
            Node::Discrete(n) => n.cpt(),
            _ => return Err(EngineError::UnknownVariable(name.to_string())),
        };

        let mut out = Vec::with_capacity(crate::core::tensor::cell_count(&free_dims));
        for combo in crate::core::tensor::indices(&free_dims) {
            let mut index = vec![0usize; shape.len()];
            index[0] = value_index;
            for (axis, &parent_axis) in axes_to_iterate.iter().enumerate() {
                index[parent_axis + 1] = combo[axis];
            }
            for (axis, slot) in fixed.iter().enumerate() {
                if let Some(v) = slot {
                    index[axis + 1] = *v;
                }
            }
            let flat = crate::core::tensor::flat_index(&strides, &index);
            out.push(cpt[flat]);
        }
        Ok(out)
    }

    fn label_index(&self, variable: &str, label: &str) -> Result<usize> {
        match self.require(variable)? {
            Node::Discrete(n) => n.variable().index_of(label),
            Node::Decision(n) => n.decisions().iter().position(|d| d == label),
            Node::Utility(_) => None,
        }
        .ok_or_else(|| EngineError::UnknownLabel {
            variable: variable.to_string(),
            label: label.to_string(),
        })
    }

    fn resolve_partial_assignment(
        &self,
        parents: &[String],
        parent_values: &[(String, String)],
    ) -> Result<Vec<Option<usize>>> {
        let mut fixed = vec![None; parents.len()];
        for (var, label) in parent_values {
            let axis = parents
                .iter()
                .position(|p| p == var)
                .ok_or_else(|| EngineError::UnknownVariable(var.clone()))?;
            fixed[axis] = Some(self.label_index(var, label)?);
        }
        Ok(fixed)
    }

    /// Sets a decision node's rule to the deterministic choice `decision`,
    /// broadcasting across its information parents.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownVariable`] if `name` is not a decision
    /// node, or [`EngineError::UnknownLabel`] if `decision` is not one of
    /// its decisions.
    pub fn set_decision_deterministic(&mut self, name: &str, decision: &str) -> Result<()> {
        let parents = self.require(name)?.parents().to_vec();
        let parent_cards = self.parent_cardinalities(&parents)?;
        match self.node_mut(name)? {
            Node::Decision(n) => n.set_deterministic(decision, &parent_cards),
            _ => Err(EngineError::UnknownVariable(name.to_string())),
        }
    }

    /// Sets a decision node's rule to fully-mixed (uniform over decisions).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownVariable`] if `name` is not a decision
    /// node.
    pub fn set_decision_fully_mixed(&mut self, name: &str) -> Result<()> {
        let parents = self.require(name)?.parents().to_vec();
        let parent_cards = self.parent_cardinalities(&parents)?;
        match self.node_mut(name)? {
            Node::Decision(n) => {
                n.set_fully_mixed(&parent_cards);
                Ok(())
            }
            _ => Err(EngineError::UnknownVariable(name.to_string())),
        }
    }

    /// The undirected moral graph: every node is connected to its parents,
    /// and all co-parents of a common child are pairwise connected.
    #[must_use]
    pub(crate) fn moral_graph(&self) -> FxHashMap<String, FxHashSet<String>> {
        let mut adjacency: FxHashMap<String, FxHashSet<String>> = FxHashMap::default();
        for name in &self.order {
            adjacency.entry(name.clone()).or_default();
        }
        for name in &self.order {
            let node = &self.nodes[name];
            let parents = node.parents();
            for parent in parents {
                adjacency.entry(name.clone()).or_default().insert(parent.clone());
                adjacency
                    .entry(parent.clone())
                    .or_default()
                    .insert(name.clone());
            }
            for i in 0..parents.len() {
                for j in (i + 1)..parents.len() {
                    adjacency
                        .entry(parents[i].clone())
                        .or_default()
                        .insert(parents[j].clone());
                    adjacency
                        .entry(parents[j].clone())
                        .or_default()
                        .insert(parents[i].clone());
                }
            }
        }
        adjacency
    }
}

fn rename_in_place(node: &mut Node, _old: &str, new: &str) {
    match node {
        Node::Discrete(n) => n.rename(new),
        Node::Utility(n) => n.rename(new),
        Node::Decision(n) => n.rename(new),
    }
}

fn set_parents(node: &mut Node, parents: Vec<String>) {
    match node {
        Node::Discrete(n) => n.set_parents_raw(parents),
        Node::Utility(n) => n.set_parents_raw(parents),
        Node::Decision(n) => n.set_parents_raw(parents),
    }
}
