//! Retrieval gate: decides whether retrieved chunks are relevant enough to
//! ground a response.
//!
//! The gate queries the [`LiveIndex`] for the top-K chunks and hands them to
//! a [`RelevancePolicy`]. Whatever survives the policy is used as context;
//! if nothing survives, the turn is answered without document context.
//!
//! Two policies ship with the crate:
//!
//! | Policy | Keeps |
//! |--------|-------|
//! | [`AnyMatch`] | every retrieved chunk (nonempty means usable) |
//! | [`MinScore`] | chunks scoring at or above a fixed threshold |

use tracing::debug;

use crate::error::IndexError;
use crate::index::LiveIndex;
use crate::models::{RetrievalResult, ScoredChunk};

/// Strategy for filtering retrieved chunks before they are used as context.
pub trait RelevancePolicy: Send + Sync {
    /// Short name for logs (e.g. `"min_score"`).
    fn name(&self) -> &str;

    /// Keep the hits that are relevant. Must preserve order.
    fn admit(&self, hits: Vec<ScoredChunk>) -> Vec<ScoredChunk>;
}

/// Treats any retrieved chunk as relevant.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyMatch;

impl RelevancePolicy for AnyMatch {
    fn name(&self) -> &str {
        "any"
    }

    fn admit(&self, hits: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
        hits
    }
}

/// Discards hits whose score is below `threshold`.
#[derive(Debug, Clone, Copy)]
pub struct MinScore {
    pub threshold: f32,
}

impl MinScore {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl RelevancePolicy for MinScore {
    fn name(&self) -> &str {
        "min_score"
    }

    fn admit(&self, hits: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
        hits.into_iter()
            .filter(|h| h.score >= self.threshold)
            .collect()
    }
}

/// Outcome of the gate for one query.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Relevant context was found; the result is nonempty.
    Relevant(RetrievalResult),
    /// Nothing relevant (or no index yet).
    NoContext,
}

impl GateDecision {
    pub fn is_relevant(&self) -> bool {
        matches!(self, GateDecision::Relevant(_))
    }
}

/// Top-K retrieval followed by a relevance decision.
pub struct RetrievalGate {
    policy: Box<dyn RelevancePolicy>,
    top_k: usize,
}

impl RetrievalGate {
    pub fn new(policy: Box<dyn RelevancePolicy>, top_k: usize) -> Self {
        Self { policy, top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Apply the policy to an already-retrieved result.
    pub fn decide(&self, result: RetrievalResult) -> GateDecision {
        let retrieved = result.len();
        let admitted = self.policy.admit(result.hits);
        debug!(
            policy = self.policy.name(),
            retrieved,
            admitted = admitted.len(),
            "retrieval gate"
        );
        if admitted.is_empty() {
            GateDecision::NoContext
        } else {
            GateDecision::Relevant(RetrievalResult::new(admitted))
        }
    }

    /// Retrieve the top-K chunks for `query` and decide on them.
    pub async fn retrieve(&self, index: &LiveIndex, query: &str) -> Result<GateDecision, IndexError> {
        let result = index.query(query, self.top_k).await?;
        Ok(self.decide(result))
    }
}
