//! Dead-end detector.

use super::types::{LoopType, StepObservation, StrategyMatch};
use std::collections::{HashSet, VecDeque};

pub(crate) const STRATEGY: &str = "dead_end";
const CONFIDENCE: f64 = 0.8;

/// Detects varied actions that leave the numeric progress field flat or falling.
pub struct DeadEndDetector {
    threshold: usize,
}

impl DeadEndDetector {
    /// Create a detector that inspects the last `threshold` steps.
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(2),
        }
    }

    /// Evaluate the window; newest step last.
    pub fn evaluate(&self, window: &VecDeque<StepObservation>) -> StrategyMatch {
        if window.len() < self.threshold {
            return StrategyMatch::none(STRATEGY);
        }

        let recent: Vec<&StepObservation> = window.iter().skip(window.len() - self.threshold).collect();

        let progress_increased = recent
            .windows(2)
            .any(|pair| pair[1].progress() > pair[0].progress());
        if progress_increased {
            return StrategyMatch::none(STRATEGY);
        }

        // Identical actions are repetition, which the other strategies own.
        let distinct_actions: HashSet<String> = recent
            .iter()
            .map(|step| step.action.trim().to_lowercase())
            .collect();
        if distinct_actions.len() < 2 {
            return StrategyMatch::none(STRATEGY);
        }

        StrategyMatch {
            strategy: STRATEGY.to_string(),
            confidence: CONFIDENCE,
            matched_turns: recent.iter().map(|step| step.turn).collect(),
            loop_type: LoopType::DeadEnd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(progress: &[f64], actions: &[&str]) -> VecDeque<StepObservation> {
        progress
            .iter()
            .zip(actions)
            .enumerate()
            .map(|(i, (p, action))| StepObservation::new(i as u64, *action, "").with_progress(*p))
            .collect()
    }

    #[test]
    fn flat_progress_with_distinct_actions() {
        let detector = DeadEndDetector::new(5);
        let window = steps(&[0.3; 5], &["grep", "open", "edit", "build", "test"]);
        let result = detector.evaluate(&window);
        assert_eq!(result.loop_type, LoopType::DeadEnd);
        assert_eq!(result.confidence, 0.8);
        assert_eq!(result.matched_turns.len(), 5);
    }

    #[test]
    fn falling_progress_counts_as_stalled() {
        let detector = DeadEndDetector::new(3);
        let window = steps(&[0.5, 0.4, 0.4], &["a", "b", "c"]);
        assert!(detector.evaluate(&window).is_match());
    }

    #[test]
    fn any_increase_clears_dead_end() {
        let detector = DeadEndDetector::new(5);
        let window = steps(&[0.3, 0.3, 0.31, 0.31, 0.31], &["a", "b", "c", "d", "e"]);
        assert!(!detector.evaluate(&window).is_match());
    }

    #[test]
    fn only_last_threshold_steps_matter() {
        let detector = DeadEndDetector::new(3);
        let window = steps(&[0.1, 0.5, 0.5, 0.5], &["a", "b", "c", "d"]);
        let result = detector.evaluate(&window);
        assert_eq!(result.matched_turns, vec![1, 2, 3]);
    }

    #[test]
    fn identical_actions_are_left_to_other_strategies() {
        let detector = DeadEndDetector::new(3);
        let window = steps(&[0.2; 3], &["retry", "Retry", "retry "]);
        assert!(!detector.evaluate(&window).is_match());
    }

    #[test]
    fn short_window_never_matches() {
        let detector = DeadEndDetector::new(5);
        let window = steps(&[0.0; 4], &["a", "b", "c", "d"]);
        assert!(!detector.evaluate(&window).is_match());
    }
}
