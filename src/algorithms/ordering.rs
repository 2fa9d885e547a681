//! Elimination ordering over a network's moral graph.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::EliminationOrderStrategy;
use crate::core::Network;

/// Computes an elimination order according to the given strategy.
#[must_use]
pub fn elimination_order(network: &Network, strategy: EliminationOrderStrategy) -> Vec<String> {
    match strategy {
        EliminationOrderStrategy::MinDegree => min_degree_order(network),
        EliminationOrderStrategy::InsertionOrder => network.names().to_vec(),
    }
}

/// Greedy min-degree ordering: repeatedly eliminate the lowest-degree
/// vertex of the moral graph, filling in edges among its remaining
/// neighbors. Ties break by insertion order.
#[must_use]
pub fn min_degree_order(network: &Network) -> Vec<String> {
    let mut graph = network.moral_graph();
    let insertion_order: FxHashMap<&str, usize> = network
        .names()
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect();
    let mut remaining: FxHashSet<String> = graph.keys().cloned().collect();
    let mut order = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let next = remaining
            .iter()
            .min_by_key(|v| {
                let degree = graph[v.as_str()].len();
                (degree, insertion_order.get(v.as_str()).copied().unwrap_or(usize::MAX))
            })
            .cloned()
            .expect("remaining is non-empty");

        let neighbors: Vec<String> = graph[&next].iter().cloned().collect();
        for i in 0..neighbors.len() {
            for j in (i + 1)..neighbors.len() {
                graph
                    .entry(neighbors[i].clone())
                    .or_default()
                    .insert(neighbors[j].clone());
                graph
                    .entry(neighbors[j].clone())
                    .or_default()
                    .insert(neighbors[i].clone());
            }
        }
        for n in &neighbors {
            graph.get_mut(n).unwrap().remove(&next);
        }
        graph.remove(&next);
        remaining.remove(&next);
        order.push(next);
    }
    order
}
