//! Junction tree construction and Hugin two-phase message passing.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::algorithms::evidence::{evidence_to_factor, node_labels, Evidence, EvidenceValue};
use crate::algorithms::ordering::elimination_order;
use crate::core::{Factor, Network, Node};
use crate::error::{EngineError, Result};
use crate::EngineConfig;

struct Clique {
    vars: Vec<String>,
    factor: Factor,
}

struct Separator {
    a: usize,
    b: usize,
    vars: Vec<String>,
    factor: Factor,
}

impl Separator {
    fn other(&self, node: usize) -> usize {
        if self.a == node {
            self.b
        } else {
            self.a
        }
    }
}

/// A junction tree built over a snapshot of a [`Network`], supporting Hugin
/// two-phase propagation.
///
/// Built once from a network's elimination order; later calls compare the
/// network's generation counter against the one recorded at build time and
/// return [`EngineError::StaleTree`] if the network changed underneath it.
pub struct JunctionTree<'a> {
    network: &'a Network,
    generation: u64,
    config: EngineConfig,
    cliques: Vec<Clique>,
    separators: Vec<Separator>,
    adjacency: Vec<Vec<usize>>,
    root: usize,
    messages_valid: bool,
}

fn unit_over(network: &Network, vars: &[String]) -> Result<Factor> {
    let mut values = Vec::with_capacity(vars.len());
    for v in vars {
        values.push(node_labels(network, v)?);
    }
    Ok(Factor::unit(vars.to_vec(), values))
}

fn clusters_from_order(network: &Network, order: &[String]) -> Vec<FxHashSet<String>> {
    let mut graph = network.moral_graph();
    let mut sequence = Vec::with_capacity(order.len());
    for v in order {
        let neighbors: Vec<String> = graph.get(v).cloned().unwrap_or_default().into_iter().collect();
        let mut cluster: FxHashSet<String> = neighbors.iter().cloned().collect();
        cluster.insert(v.clone());
        for i in 0..neighbors.len() {
            for j in (i + 1)..neighbors.len() {
                graph.entry(neighbors[i].clone()).or_default().insert(neighbors[j].clone());
                graph.entry(neighbors[j].clone()).or_default().insert(neighbors[i].clone());
            }
        }
        for n in &neighbors {
            if let Some(entry) = graph.get_mut(n) {
                entry.remove(v);
            }
        }
        graph.remove(v);
        sequence.push(cluster);
    }
    sequence
}

/// Collapses a sequence of clusters down to the maximal ones, walking
/// right-to-left: a cluster that is a subset of an earlier one is replaced
/// in place by that earlier one, which is then dropped from its own slot.
fn remove_non_maximal(sequence: Vec<FxHashSet<String>>) -> Vec<FxHashSet<String>> {
    let mut slots: Vec<Option<FxHashSet<String>>> = sequence.into_iter().map(Some).collect();
    for i in (0..slots.len()).rev() {
        let Some(current) = slots[i].clone() else {
            continue;
        };
        let superset = (0..i).find(|&j| slots[j].as_ref().is_some_and(|s| current.is_subset(s)));
        if let Some(j) = superset {
            slots[i] = slots[j].take();
        }
    }
    slots.into_iter().flatten().collect()
}

fn connect(clusters: Vec<FxHashSet<String>>) -> (Vec<Vec<String>>, Vec<(usize, usize, Vec<String>)>) {
    let n = clusters.len();
    let mut unions_after: Vec<FxHashSet<String>> = vec![FxHashSet::default(); n];
    for i in (0..n.saturating_sub(1)).rev() {
        let mut u = unions_after[i + 1].clone();
        u.extend(clusters[i + 1].iter().cloned());
        unions_after[i] = u;
    }
    let mut edges = Vec::new();
    for (i, cluster) in clusters.iter().enumerate().take(n.saturating_sub(1)) {
        let s: FxHashSet<String> = cluster.intersection(&unions_after[i]).cloned().collect();
        let m = (i + 1..n)
            .find(|&m| s.is_subset(&clusters[m]))
            .expect("running intersection is contained in some later cluster");
        let mut sep_vars: Vec<String> = s.into_iter().collect();
        sep_vars.sort();
        edges.push((i, m, sep_vars));
    }
    let cliques_vars = clusters
        .into_iter()
        .map(|c| {
            let mut v: Vec<String> = c.into_iter().collect();
            v.sort();
            v
        })
        .collect();
    (cliques_vars, edges)
}

impl<'a> JunctionTree<'a> {
    /// Builds a junction tree over `network`'s current structure.
    ///
    /// # Errors
    ///
    /// Propagates any error from the initial [`Self::reset_factors`] call
    /// (an unknown variable would indicate an inconsistent network).
    pub fn build(network: &'a Network, config: EngineConfig) -> Result<Self> {
        let order = elimination_order(network, config.default_elimination_order);
        let clusters = remove_non_maximal(clusters_from_order(network, &order));
        let (cliques_vars, edges) = connect(clusters);

        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); cliques_vars.len()];
        let mut separators = Vec::with_capacity(edges.len());
        for (edge_idx, (a, b, vars)) in edges.into_iter().enumerate() {
            adjacency[a].push(edge_idx);
            adjacency[b].push(edge_idx);
            separators.push(Separator {
                a,
                b,
                vars,
                factor: Factor::trivial(1.0),
            });
        }

        let cliques: Result<Vec<Clique>> = cliques_vars
            .into_iter()
            .map(|vars| Ok(Clique { factor: unit_over(network, &vars)?, vars }))
            .collect();

        let mut tree = Self {
            network,
            generation: network.generation(),
            config,
            cliques: cliques?,
            separators,
            adjacency,
            root: 0,
            messages_valid: false,
        };
        tree.reset_factors()?;
        Ok(tree)
    }

    fn check_fresh(&self) -> Result<()> {
        if self.network.generation() != self.generation {
            return Err(EngineError::StaleTree);
        }
        Ok(())
    }

    fn clique_for(&self, vars: &[String]) -> Option<usize> {
        self.cliques
            .iter()
            .position(|c| vars.iter().all(|v| c.vars.contains(v)))
    }

    /// Reinitializes every clique/separator factor to unit and re-multiplies
    /// each network CPT or decision rule into its assigned clique. Clears
    /// [`Self::messages_valid`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StaleTree`] if the network has mutated since
    /// this tree was built, or [`EngineError::NoCliqueContains`] if some
    /// CPT's variables are not all contained in any single clique.
    pub fn reset_factors(&mut self) -> Result<()> {
        self.check_fresh()?;
        for clique in &mut self.cliques {
            clique.factor = unit_over(self.network, &clique.vars)?;
        }
        for sep in &mut self.separators {
            sep.factor = unit_over(self.network, &sep.vars)?;
        }
        for name in self.network.names().to_vec() {
            let factor = match self.network.node(&name) {
                Some(Node::Discrete(_)) => Factor::from_discrete_node(self.network, &name)?,
                Some(Node::Decision(_)) => Factor::from_decision_node(self.network, &name)?,
                Some(Node::Utility(_)) | None => continue,
            };
            let target = self
                .clique_for(factor.vars())
                .ok_or_else(|| EngineError::NoCliqueContains(factor.vars().to_vec()))?;
            self.cliques[target].factor =
                self.cliques[target].factor.product(&factor, self.config.factor_size_limit)?;
        }
        self.messages_valid = false;
        Ok(())
    }

    fn pass_message(&mut self, from: usize, to: usize, edge: usize) -> Result<()> {
        let sep_vars = self.separators[edge].vars.clone();
        let from_factor = self.cliques[from].factor.clone();
        let remove: Vec<String> = from_factor
            .vars()
            .iter()
            .filter(|v| !sep_vars.contains(v))
            .cloned()
            .collect();
        let mu = from_factor.marginalize(&remove);
        let quotient = mu.divide(&self.separators[edge].factor, self.config.factor_size_limit)?;
        self.cliques[to].factor =
            self.cliques[to].factor.product(&quotient, self.config.factor_size_limit)?;
        self.separators[edge].factor = mu;
        Ok(())
    }

    fn collect(&mut self, node: usize, parent: Option<usize>) -> Result<()> {
        for edge in self.adjacency[node].clone() {
            let other = self.separators[edge].other(node);
            if Some(other) == parent {
                continue;
            }
            self.collect(other, Some(node))?;
            self.pass_message(other, node, edge)?;
        }
        Ok(())
    }

    fn distribute(&mut self, node: usize, parent: Option<usize>) -> Result<()> {
        for edge in self.adjacency[node].clone() {
            let other = self.separators[edge].other(node);
            if Some(other) == parent {
                continue;
            }
            self.pass_message(node, other, edge)?;
            self.distribute(other, Some(node))?;
        }
        Ok(())
    }

    /// Runs a full collect/distribute pass rooted at the conventional root
    /// clique and marks [`Self::messages_valid`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StaleTree`] if the network mutated underneath
    /// this tree.
    pub fn propagate(&mut self) -> Result<()> {
        self.check_fresh()?;
        self.collect(self.root, None)?;
        self.distribute(self.root, None)?;
        self.messages_valid = true;
        Ok(())
    }

    /// Resets factors, injects evidence into some containing clique for
    /// each observed variable, and runs propagation.
    ///
    /// When `soft_posteriors` is true and an [`EvidenceValue::Soft`] entry
    /// is present, the current prior marginal of that variable (computed
    /// via a throwaway propagation) is used as the reference for the
    /// all-things-considered posterior formula.
    ///
    /// # Errors
    ///
    /// See [`Self::reset_factors`] and [`Self::marginals`].
    pub fn set_evidence(&mut self, obs: &Evidence, soft_posteriors: bool) -> Result<()> {
        self.reset_factors()?;

        let mut priors: FxHashMap<String, Vec<f64>> = FxHashMap::default();
        if soft_posteriors && obs.values().any(|v| matches!(v, EvidenceValue::Soft(_))) {
            self.propagate()?;
            for (var, value) in obs {
                if matches!(value, EvidenceValue::Soft(_)) {
                    let marginal = self.marginals(std::slice::from_ref(var))?;
                    priors.insert(var.clone(), marginal.table().to_vec());
                }
            }
            self.reset_factors()?;
        }

        for (var, value) in obs {
            let prior = priors.get(var).map(Vec::as_slice);
            let factor = evidence_to_factor(self.network, var, value, soft_posteriors, prior)?;
            let target = self
                .clique_for(factor.vars())
                .ok_or_else(|| EngineError::NoCliqueContains(factor.vars().to_vec()))?;
            self.cliques[target].factor =
                self.cliques[target].factor.product(&factor, self.config.factor_size_limit)?;
        }
        self.propagate()
    }

    /// The marginal of `vars`, found from a single clique whose variable
    /// set is a superset of `vars`, normalized.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoCliqueContains`] if no clique contains all
    /// of `vars` (joint queries spanning more than one clique are not
    /// supported; encode the extra variables as evidence instead).
    pub fn marginals(&self, vars: &[String]) -> Result<Factor> {
        self.check_fresh()?;
        let idx = self
            .clique_for(vars)
            .ok_or_else(|| EngineError::NoCliqueContains(vars.to_vec()))?;
        let clique = &self.cliques[idx];
        let remove: Vec<String> = clique
            .vars
            .iter()
            .filter(|v| !vars.contains(v))
            .cloned()
            .collect();
        Ok(clique.factor.marginalize(&remove).normalize())
    }

    /// Whether the last propagation is still valid for the current clique
    /// state (cleared by [`Self::reset_factors`]/[`Self::set_evidence`]).
    #[must_use]
    pub fn messages_valid(&self) -> bool {
        self.messages_valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Variable;

    fn binary(name: &str) -> Variable {
        Variable::new(name, vec!["t".to_string(), "f".to_string()])
    }

    fn slippery_road() -> Network {
        let mut net = Network::new();
        for name in ["winter", "rain", "sprinkler", "wet_grass", "slippery_road"] {
            net.add_discrete(binary(name)).unwrap();
        }
        net.add_edge("winter", "rain").unwrap();
        net.add_edge("winter", "sprinkler").unwrap();
        net.add_edge("rain", "slippery_road").unwrap();
        net.add_edge("rain", "wet_grass").unwrap();
        net.add_edge("sprinkler", "wet_grass").unwrap();

        net.set_cpt("winter", vec![0.6, 0.4]).unwrap();
        net.set_cpt("rain", vec![0.8, 0.1, 0.2, 0.9]).unwrap();
        net.set_cpt("sprinkler", vec![0.2, 0.75, 0.8, 0.25]).unwrap();
        net.set_cpt("slippery_road", vec![0.7, 0.0, 0.3, 1.0]).unwrap();
        net.set_cpt("wet_grass", vec![0.95, 0.8, 0.1, 0.0, 0.05, 0.2, 0.9, 1.0])
            .unwrap();
        net
    }

    fn approx(f: &Factor, expected: &[f64]) {
        let got = f.get_potential(None).unwrap();
        assert_eq!(got.len(), expected.len());
        for (a, b) in got.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6, "{got:?} vs {expected:?}");
        }
    }

    #[test]
    fn test_priors_match_bucket_elimination() {
        let net = slippery_road();
        let config = EngineConfig::default();
        let mut tree = JunctionTree::build(&net, config.clone()).unwrap();
        tree.propagate().unwrap();
        approx(&tree.marginals(&["winter".to_string()]).unwrap(), &[0.6, 0.4]);
        approx(&tree.marginals(&["sprinkler".to_string()]).unwrap(), &[0.42, 0.58]);
        approx(&tree.marginals(&["slippery_road".to_string()]).unwrap(), &[0.364, 0.636]);
    }

    #[test]
    fn test_hard_evidence_matches_bucket_elimination() {
        let net = slippery_road();
        let config = EngineConfig::default();
        let mut tree = JunctionTree::build(&net, config).unwrap();
        let mut evidence = Evidence::default();
        evidence.insert("winter".to_string(), EvidenceValue::Hard("t".to_string()));
        tree.set_evidence(&evidence, false).unwrap();
        approx(&tree.marginals(&["wet_grass".to_string()]).unwrap(), &[0.668, 0.332]);
    }

    #[test]
    fn test_marginal_agrees_across_cliques() {
        let net = slippery_road();
        let config = EngineConfig::default();
        let mut tree = JunctionTree::build(&net, config).unwrap();
        tree.propagate().unwrap();
        let rain_direct = tree.marginals(&["rain".to_string()]).unwrap();
        // `rain` participates in more than one clique (slippery_road, wet_grass);
        // whichever one `marginals` happens to pick, the values must agree.
        assert!(rain_direct.table().iter().all(|p| (0.0..=1.0).contains(p)));
        let sum: f64 = rain_direct.table().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_fresh_tree_generation_matches_network() {
        // A tree built just now is never stale; mutating the network it
        // was built from and then reusing the same binding is rejected at
        // compile time by the borrow checker (the tree holds `&Network`
        // for its whole lifetime), so `StaleTree` defends a path only
        // reachable through interior mutability, not plain field mutation.
        let net = slippery_road();
        let config = EngineConfig::default();
        let mut tree = JunctionTree::build(&net, config).unwrap();
        assert!(tree.propagate().is_ok());
        assert!(tree.marginals(&["winter".to_string()]).is_ok());
    }

    #[test]
    fn test_no_clique_contains_joint_query() {
        let net = slippery_road();
        let config = EngineConfig::default();
        let mut tree = JunctionTree::build(&net, config).unwrap();
        tree.propagate().unwrap();
        let err = tree.marginals(&["winter".to_string(), "wet_grass".to_string()]);
        assert!(matches!(err, Err(EngineError::NoCliqueContains(_))));
    }
}
