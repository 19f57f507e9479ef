//! Oscillation detector.

use super::labeler::StateLabeler;
use super::types::{LoopType, StepObservation, StrategyMatch};
use std::collections::VecDeque;

pub(crate) const STRATEGY: &str = "oscillation";
const MAX_CONFIDENCE: f64 = 0.95;

/// Detects state labels alternating A,B,A,B,... at the tail of the window.
pub struct OscillationDetector {
    threshold: usize,
}

impl OscillationDetector {
    /// Create a detector that needs `threshold` full A/B cycles.
    #[must_use]
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(2),
        }
    }

    /// Evaluate the window; newest step last.
    ///
    /// Confidence is `cycles / (threshold + 1)`, capped at 0.95, where
    /// `cycles` counts full A/B pairs in the trailing alternating run.
    #[allow(clippy::cast_precision_loss)]
    pub fn evaluate(
        &self,
        window: &VecDeque<StepObservation>,
        labeler: &dyn StateLabeler,
    ) -> StrategyMatch {
        let min_run = self.threshold * 2;
        if window.len() < min_run {
            return StrategyMatch::none(STRATEGY);
        }

        let labels: Vec<String> = window.iter().map(|step| labeler.label(step)).collect();
        let run = Self::alternating_run(&labels);
        if run < min_run {
            return StrategyMatch::none(STRATEGY);
        }

        let cycles = run / 2;
        let confidence = (cycles as f64 / (self.threshold as f64 + 1.0)).min(MAX_CONFIDENCE);
        let matched_turns = window
            .iter()
            .skip(window.len() - run)
            .map(|step| step.turn)
            .collect();

        StrategyMatch {
            strategy: STRATEGY.to_string(),
            confidence,
            matched_turns,
            loop_type: LoopType::Oscillation,
        }
    }

    /// Length of the trailing run where every label equals the one two steps later
    /// and the last two labels differ.
    fn alternating_run(labels: &[String]) -> usize {
        let n = labels.len();
        if n < 2 || labels[n - 1] == labels[n - 2] {
            return 0;
        }

        let mut run = 2;
        for i in (0..n - 2).rev() {
            if labels[i] != labels[i + 2] {
                break;
            }
            run += 1;
        }
        run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loop_detection::labeler::{DefaultStateLabeler, MockStateLabeler};

    fn phases(labels: &[&str]) -> VecDeque<StepObservation> {
        labels
            .iter()
            .enumerate()
            .map(|(i, phase)| {
                StepObservation::new(i as u64, format!("step {i}"), "").with_field("phase", *phase)
            })
            .collect()
    }

    #[test]
    fn detects_abab_with_threshold_two() {
        let detector = OscillationDetector::new(2);
        let result = detector.evaluate(&phases(&["a", "b", "a", "b", "a"]), &DefaultStateLabeler);
        assert_eq!(result.loop_type, LoopType::Oscillation);
        assert!(result.confidence > 0.0);
        assert_eq!(result.matched_turns, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn confidence_grows_with_cycles_and_caps() {
        let detector = OscillationDetector::new(2);
        let short = detector.evaluate(&phases(&["a", "b", "a", "b"]), &DefaultStateLabeler);
        let long = detector.evaluate(
            &phases(&["a", "b", "a", "b", "a", "b", "a", "b", "a", "b"]),
            &DefaultStateLabeler,
        );
        assert!(long.confidence > short.confidence);
        assert!(long.confidence <= MAX_CONFIDENCE);
    }

    #[test]
    fn default_threshold_needs_six_entries() {
        let detector = OscillationDetector::new(3);
        let five = detector.evaluate(&phases(&["a", "b", "a", "b", "a"]), &DefaultStateLabeler);
        let six = detector.evaluate(&phases(&["a", "b", "a", "b", "a", "b"]), &DefaultStateLabeler);
        assert!(!five.is_match());
        assert!((six.confidence - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn run_broken_by_third_state() {
        let detector = OscillationDetector::new(2);
        let result = detector.evaluate(&phases(&["a", "b", "c", "b", "a", "b"]), &DefaultStateLabeler);
        assert!(!result.is_match());
    }

    #[test]
    fn repetition_is_not_oscillation() {
        let detector = OscillationDetector::new(2);
        let result = detector.evaluate(&phases(&["a", "a", "a", "a", "a"]), &DefaultStateLabeler);
        assert!(!result.is_match());
    }

    #[test]
    fn uses_supplied_labeler_once_per_step() {
        let mut labeler = MockStateLabeler::new();
        labeler
            .expect_label()
            .times(4)
            .returning(|step| if step.turn % 2 == 0 { "x" } else { "y" }.to_string());
        let detector = OscillationDetector::new(2);
        let result = detector.evaluate(&phases(&["a", "a", "a", "a"]), &labeler);
        assert!(result.is_match());
    }
}
