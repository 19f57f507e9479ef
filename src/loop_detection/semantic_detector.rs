//! Semantic repetition detector.

use super::types::{LoopType, StepObservation, StrategyMatch};
use lazy_regex::lazy_regex;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

pub(crate) const STRATEGY: &str = "semantic_similarity";

static RE_PUNCTUATION: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"[^\w\s]");

/// Detects a newest step whose wording nearly matches an earlier one.
pub struct SemanticDetector {
    threshold: f64,
}

impl SemanticDetector {
    /// Create a detector that fires at Jaccard similarity ≥ `threshold`.
    #[must_use]
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: crate::utils::clamp_unit(threshold),
        }
    }

    /// Evaluate the window; newest step last.
    pub fn evaluate(&self, window: &VecDeque<StepObservation>) -> StrategyMatch {
        let Some(newest) = window.back() else {
            return StrategyMatch::none(STRATEGY);
        };
        if window.len() < 2 {
            return StrategyMatch::none(STRATEGY);
        }

        let newest_tokens = tokenize(&newest.action, &newest.outcome);
        let best = window
            .iter()
            .take(window.len() - 1)
            .map(|step| {
                let tokens = tokenize(&step.action, &step.outcome);
                (step.turn, jaccard(&newest_tokens, &tokens))
            })
            .fold(None::<(u64, f64)>, |best, candidate| match best {
                Some(current) if current.1 >= candidate.1 => Some(current),
                _ => Some(candidate),
            });

        let Some((turn, similarity)) = best else {
            return StrategyMatch::none(STRATEGY);
        };

        debug!(similarity, threshold = self.threshold, "semantic_detector: best similarity");

        if similarity <= 0.0 || similarity < self.threshold {
            return StrategyMatch::none(STRATEGY);
        }

        StrategyMatch {
            strategy: STRATEGY.to_string(),
            confidence: similarity,
            matched_turns: vec![turn, newest.turn],
            loop_type: LoopType::Semantic,
        }
    }
}

/// Lowercase, strip punctuation and split on whitespace.
pub(crate) fn tokenize(action: &str, outcome: &str) -> HashSet<String> {
    let text = format!("{action} {outcome}").to_lowercase();
    RE_PUNCTUATION
        .replace_all(&text, "")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Intersection over union; two empty sets score `0.0`.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(steps: Vec<StepObservation>) -> VecDeque<StepObservation> {
        steps.into_iter().collect()
    }

    #[test]
    fn tokenizer_normalizes_text() {
        let tokens = tokenize("Read FILE: src/main.rs!", "Done.");
        assert!(tokens.contains("read"));
        assert!(tokens.contains("file"));
        assert!(tokens.contains("srcmainrs"));
        assert!(tokens.contains("done"));
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn detects_reworded_repeat() {
        let detector = SemanticDetector::new(0.85);
        let steps = window(vec![
            StepObservation::new(1, "search the docs for retry policy", "no results found"),
            StepObservation::new(2, "compile project", "ok"),
            StepObservation::new(3, "Search the docs for retry policy!", "No results found."),
        ]);
        let result = detector.evaluate(&steps);
        assert_eq!(result.loop_type, LoopType::Semantic);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.matched_turns, vec![1, 3]);
    }

    #[test]
    fn below_threshold_is_ignored() {
        let detector = SemanticDetector::new(0.85);
        let steps = window(vec![
            StepObservation::new(1, "search docs retry policy", "nothing"),
            StepObservation::new(2, "search docs backoff policy", "found one"),
        ]);
        assert!(!detector.evaluate(&steps).is_match());
    }

    #[test]
    fn empty_text_never_matches() {
        let detector = SemanticDetector::new(0.0);
        let steps = window(vec![
            StepObservation::new(1, "", "..."),
            StepObservation::new(2, "", "!"),
        ]);
        assert!(!detector.evaluate(&steps).is_match());
    }

    #[test]
    fn jaccard_is_intersection_over_union() {
        let a = tokenize("a b c", "");
        let b = tokenize("b c d", "");
        assert!((jaccard(&a, &b) - 0.5).abs() < f64::EPSILON);
    }
}
