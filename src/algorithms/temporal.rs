//! Two-slice temporal unrolling over a dynamic Bayesian network.
//!
//! A [`TemporalUnroller`] holds a prior-slice network (`B₀`), a transition
//! network (`B→`) and a list of `(placeholder, canonical)` transition pairs:
//! `canonical` is the name a modeled quantity goes by in both networks;
//! `placeholder` exists only in `B→`, has no parents, and is re-seeded every
//! step from the previous step's marginal of `canonical`.

use rustc_hash::FxHashMap;

use crate::algorithms::evidence::{Evidence, EvidenceValue};
use crate::algorithms::junction_tree::JunctionTree;
use crate::core::{Factor, Network};
use crate::error::Result;
use crate::{EngineConfig, TemporalPolicy};

/// Unrolls a two-slice dynamic Bayesian network forward in time, one slice
/// at a time, under a [`TemporalPolicy`].
///
/// Rather than caching a self-referential [`JunctionTree`] across calls,
/// each query or step builds one fresh from the current network snapshot
/// and replays whatever evidence is in effect; a tree's construction cost
/// is linear in the network, so this keeps the type ordinary to hold
/// without unsafe code or an arena.
pub struct TemporalUnroller {
    prior_network: Network,
    transition_network: Network,
    transitions: Vec<(String, String)>,
    config: EngineConfig,
    policy: TemporalPolicy,
    t: u64,
    pending_evidence: Evidence,
    queued_feedback: Evidence,
    last_applied_evidence: Evidence,
    last_soft_posteriors: bool,
}

impl TemporalUnroller {
    /// Builds an unroller at `t = 0`, about to run inference over `B₀`.
    #[must_use]
    pub fn new(
        prior_network: Network,
        transition_network: Network,
        transitions: Vec<(String, String)>,
        config: EngineConfig,
    ) -> Self {
        let policy = config.temporal_policy;
        Self {
            prior_network,
            transition_network,
            transitions,
            config,
            policy,
            t: 0,
            pending_evidence: Evidence::default(),
            queued_feedback: Evidence::default(),
            last_applied_evidence: Evidence::default(),
            last_soft_posteriors: false,
        }
    }

    /// The current time index, starting at 0.
    #[must_use]
    pub fn time(&self) -> u64 {
        self.t
    }

    /// The feedback policy in effect.
    #[must_use]
    pub fn policy(&self) -> TemporalPolicy {
        self.policy
    }

    fn current_network(&self) -> &Network {
        if self.t == 0 {
            &self.prior_network
        } else {
            &self.transition_network
        }
    }

    /// Queues evidence for the current slice without advancing time;
    /// merged with any evidence already queued, new values winning on key
    /// conflicts.
    pub fn set_evidence(&mut self, obs: Evidence) {
        for (k, v) in obs {
            self.pending_evidence.insert(k, v);
        }
    }

    fn effective_soft_posteriors(&self, requested: bool) -> bool {
        match self.policy {
            TemporalPolicy::SoftEvidenceFeedback => true,
            TemporalPolicy::PriorFeedback => requested,
        }
    }

    fn effective_evidence(&self) -> Evidence {
        let mut merged = Evidence::default();
        if matches!(self.policy, TemporalPolicy::SoftEvidenceFeedback) {
            for (k, v) in &self.queued_feedback {
                merged.insert(k.clone(), v.clone());
            }
        }
        for (k, v) in &self.pending_evidence {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }

    fn build_and_propagate(&self, evidence: &Evidence, soft_posteriors: bool) -> Result<JunctionTree<'_>> {
        let mut tree = JunctionTree::build(self.current_network(), self.config.clone())?;
        tree.set_evidence(evidence, soft_posteriors)?;
        Ok(tree)
    }

    /// Advances time by one step: applies evidence (pre-queued, freshly
    /// supplied, or both — new values win on conflicts) and propagates,
    /// then folds the resulting marginals forward per [`TemporalPolicy`].
    ///
    /// # Errors
    ///
    /// Propagates any [`crate::error::EngineError`] from building the tree,
    /// applying evidence, or reading marginals back out.
    pub fn unroll(&mut self, obs: Option<Evidence>, soft_posteriors: bool) -> Result<()> {
        if let Some(obs) = obs {
            self.set_evidence(obs);
        }
        let evidence = self.effective_evidence();
        let soft_posteriors = self.effective_soft_posteriors(soft_posteriors);
        let tree = self.build_and_propagate(&evidence, soft_posteriors)?;
        let mut forwarded: Vec<(String, Vec<f64>)> = Vec::with_capacity(self.transitions.len());
        for (placeholder, canonical) in &self.transitions {
            let marginal = tree.marginals(std::slice::from_ref(canonical))?;
            forwarded.push((placeholder.clone(), marginal.table().to_vec()));
        }
        drop(tree);

        match self.policy {
            TemporalPolicy::PriorFeedback => {
                for (placeholder, table) in forwarded {
                    self.transition_network.set_cpt(&placeholder, table)?;
                }
            }
            TemporalPolicy::SoftEvidenceFeedback => {
                self.queued_feedback.clear();
                for (placeholder, table) in forwarded {
                    self.queued_feedback.insert(placeholder, EvidenceValue::Soft(table));
                }
            }
        }

        self.pending_evidence.clear();
        self.t += 1;
        // Recompute against the post-increment state: `current_network()` now
        // points at the next slice, and under `SoftEvidenceFeedback` that
        // slice's effective evidence is the feedback just queued above, not
        // whatever was used to build this step's tree.
        self.last_applied_evidence = self.effective_evidence();
        self.last_soft_posteriors = soft_posteriors;
        Ok(())
    }

    /// The joint marginal of `vars` under the evidence last applied (via
    /// [`Self::unroll`], or none if called before the first unroll).
    ///
    /// # Errors
    ///
    /// See [`JunctionTree::marginals`].
    pub fn marginals(&self, vars: &[String]) -> Result<Factor> {
        let tree = self.build_and_propagate(&self.last_applied_evidence, self.last_soft_posteriors)?;
        tree.marginals(vars)
    }

    /// The marginal distribution of a single variable, as a label-to-
    /// probability map.
    ///
    /// # Errors
    ///
    /// See [`Self::marginals`].
    pub fn marginal_probabilities(&self, var: &str) -> Result<FxHashMap<String, f64>> {
        let owned = var.to_string();
        let factor = self.marginals(std::slice::from_ref(&owned))?;
        let labels = factor.values_of(var).unwrap_or(&[]);
        Ok(labels.iter().cloned().zip(factor.table().iter().copied()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Variable;

    // A single binary variable "weather" that persists across slices with
    // a little noise, unrolled with no evidence: the marginal sequence
    // should be a fixed point of the transition CPT, since the transition
    // matrix's stationary distribution is the prior.
    fn weather_dbn() -> (Network, Network, Vec<(String, String)>) {
        let mut b0 = Network::new();
        b0.add_discrete(Variable::new("weather", vec!["sun".to_string(), "rain".to_string()]))
            .unwrap();
        b0.set_cpt("weather", vec![0.5, 0.5]).unwrap();

        let mut b_next = Network::new();
        b_next
            .add_discrete(Variable::new("weather_prev", vec!["sun".to_string(), "rain".to_string()]))
            .unwrap();
        b_next
            .add_discrete(Variable::new("weather", vec!["sun".to_string(), "rain".to_string()]))
            .unwrap();
        b_next.add_edge("weather_prev", "weather").unwrap();
        b_next.set_cpt("weather_prev", vec![0.5, 0.5]).unwrap();
        // A symmetric transition matrix: P(weather=sun|prev=sun)=0.5 keeps
        // the uniform prior a fixed point.
        b_next
            .set_cpt("weather", vec![0.5, 0.5, 0.5, 0.5])
            .unwrap();

        (b0, b_next, vec![("weather_prev".to_string(), "weather".to_string())])
    }

    #[test]
    fn test_prior_feedback_fixed_point_is_invariant() {
        let (b0, b_next, transitions) = weather_dbn();
        let config = EngineConfig::default();
        let mut unroller = TemporalUnroller::new(b0, b_next, transitions, config);

        let p0 = unroller.marginals(&["weather".to_string()]).unwrap();
        assert!((p0.table()[0] - 0.5).abs() < 1e-9);

        for _ in 0..3 {
            unroller.unroll(None, false).unwrap();
            let p = unroller.marginals(&["weather".to_string()]).unwrap();
            assert!((p.table()[0] - 0.5).abs() < 1e-6, "{:?}", p.table());
        }
        assert_eq!(unroller.time(), 3);
    }

    #[test]
    fn test_soft_evidence_feedback_preserves_uncertainty_under_no_evidence() {
        let (b0, b_next, transitions) = weather_dbn();
        let mut config = EngineConfig::default();
        config.temporal_policy = TemporalPolicy::SoftEvidenceFeedback;
        let mut unroller = TemporalUnroller::new(b0, b_next, transitions, config);

        for _ in 0..3 {
            unroller.unroll(None, false).unwrap();
            let p = unroller.marginals(&["weather".to_string()]).unwrap();
            assert!((p.table()[0] - 0.5).abs() < 1e-6, "{:?}", p.table());
        }
        assert_eq!(unroller.policy(), TemporalPolicy::SoftEvidenceFeedback);
    }

    // Same two slices as `weather_dbn`, but with an asymmetric transition so
    // pinning slice 0's value has an observable, hand-checkable effect on
    // slice 1's marginal instead of being washed out by a fixed point.
    fn weather_dbn_asymmetric() -> (Network, Network, Vec<(String, String)>) {
        let mut b0 = Network::new();
        b0.add_discrete(Variable::new("weather", vec!["sun".to_string(), "rain".to_string()]))
            .unwrap();
        b0.set_cpt("weather", vec![0.5, 0.5]).unwrap();

        let mut b_next = Network::new();
        b_next
            .add_discrete(Variable::new("weather_prev", vec!["sun".to_string(), "rain".to_string()]))
            .unwrap();
        b_next
            .add_discrete(Variable::new("weather", vec!["sun".to_string(), "rain".to_string()]))
            .unwrap();
        b_next.add_edge("weather_prev", "weather").unwrap();
        b_next.set_cpt("weather_prev", vec![0.5, 0.5]).unwrap();
        // P(weather=sun|prev=sun)=0.9, P(weather=sun|prev=rain)=0.2
        b_next.set_cpt("weather", vec![0.9, 0.2, 0.1, 0.8]).unwrap();

        (b0, b_next, vec![("weather_prev".to_string(), "weather".to_string())])
    }

    #[test]
    fn test_hard_evidence_shifts_the_marginal() {
        let (b0, b_next, transitions) = weather_dbn_asymmetric();
        let config = EngineConfig::default();
        let mut unroller = TemporalUnroller::new(b0, b_next, transitions, config);

        let mut evidence = Evidence::default();
        evidence.insert("weather".to_string(), EvidenceValue::Hard("rain".to_string()));
        unroller.unroll(Some(evidence), false).unwrap();
        // weather_prev is forwarded as the certain distribution (0, 1), so
        // weather at t=1 is exactly P(weather|prev=rain) = (0.2, 0.8).
        let p = unroller.marginals(&["weather".to_string()]).unwrap();
        assert!((p.table()[1] - 0.8).abs() < 1e-9, "{:?}", p.table());

        // Evidence does not persist past the step it was supplied for: a
        // second, evidence-free unroll should follow the transition matrix
        // from the forwarded (0.2, 0.8) prior, not re-pin weather to rain.
        unroller.unroll(None, false).unwrap();
        let p2 = unroller.marginals(&["weather".to_string()]).unwrap();
        let expected_sun = 0.2 * 0.9 + 0.8 * 0.2;
        assert!((p2.table()[0] - expected_sun).abs() < 1e-9, "{:?}", p2.table());
    }
}
