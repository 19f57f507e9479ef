//! Exact repetition detector.

use super::types::{LoopType, StepObservation, StrategyMatch};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

pub(crate) const STRATEGY: &str = "exact_hash";

/// Detects a step whose (action, state, outcome) fingerprint recurs in the window.
pub struct ExactMatchDetector {
    threshold: usize,
}

impl ExactMatchDetector {
    /// Create a detector that fires at `threshold` occurrences of the newest step.
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(2),
        }
    }

    /// Evaluate the window; newest step last.
    pub fn evaluate(&self, window: &VecDeque<StepObservation>) -> StrategyMatch {
        let Some(newest) = window.back() else {
            return StrategyMatch::none(STRATEGY);
        };
        if window.len() < self.threshold {
            return StrategyMatch::none(STRATEGY);
        }

        let key = Self::hash_step(newest);
        let matched_turns: Vec<u64> = window
            .iter()
            .filter(|step| Self::hash_step(step) == key)
            .map(|step| step.turn)
            .collect();

        if matched_turns.len() < self.threshold {
            return StrategyMatch::none(STRATEGY);
        }

        StrategyMatch {
            strategy: STRATEGY.to_string(),
            confidence: 1.0,
            matched_turns,
            loop_type: LoopType::Exact,
        }
    }

    /// Fingerprint a step. `serde_json::Map` iterates in key order, so equal
    /// snapshots hash equally regardless of insertion order.
    pub(crate) fn hash_step(step: &StepObservation) -> String {
        let mut hasher = Sha256::new();
        hasher.update(step.action.as_bytes());
        hasher.update(b"\x1f");
        for (key, value) in &step.state {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.to_string().as_bytes());
            hasher.update(b";");
        }
        hasher.update(b"\x1f");
        hasher.update(step.outcome.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
