//! Engine-wide configuration knobs.

/// Strategy used to pick an elimination order when the caller does not
/// supply one explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EliminationOrderStrategy {
    /// Greedy min-degree ordering over the moralized interaction graph.
    #[default]
    MinDegree,
    /// The degenerate ordering that returns variables in registration order.
    InsertionOrder,
}

/// The feedback policy used by a [`crate::algorithms::TemporalUnroller`]
/// when folding a slice's posterior back into the next slice's prior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemporalPolicy {
    /// Collapse the posterior into the CPT of the transition target.
    #[default]
    PriorFeedback,
    /// Carry the posterior forward as soft evidence instead.
    SoftEvidenceFeedback,
}

/// Engine-wide configuration, threaded through variable elimination,
/// junction tree construction and temporal unrolling.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Elimination order strategy used when none is supplied explicitly.
    pub default_elimination_order: EliminationOrderStrategy,
    /// Maximum number of cells a single factor's tensor may hold.
    ///
    /// Exceeding this ceiling during a product fails with
    /// [`crate::error::EngineError::FactorTooLarge`] rather than allocating.
    pub factor_size_limit: usize,
    /// Feedback policy used by temporal unrolling.
    pub temporal_policy: TemporalPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_elimination_order: EliminationOrderStrategy::default(),
            factor_size_limit: 10_000_000,
            temporal_policy: TemporalPolicy::default(),
        }
    }
}
