//! Loop detector coordinating the four strategies over a sliding window.

use super::config::LoopDetectionConfig;
use super::dead_end_detector::DeadEndDetector;
use super::exact_detector::ExactMatchDetector;
use super::labeler::{DefaultStateLabeler, StateLabeler};
use super::oscillation_detector::OscillationDetector;
use super::semantic_detector::SemanticDetector;
use super::types::{LoopDetection, StepObservation};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// Central coordinator for loop detection.
///
/// Owns a FIFO window of at most `window_size` observations. [`detect`]
/// is a pure function of that window.
///
/// [`detect`]: LoopDetector::detect
pub struct LoopDetector {
    config: LoopDetectionConfig,
    window: VecDeque<StepObservation>,
    labeler: Arc<dyn StateLabeler>,
    exact: ExactMatchDetector,
    semantic: SemanticDetector,
    oscillation: OscillationDetector,
    dead_end: DeadEndDetector,
}

impl LoopDetector {
    /// Create a detector using the default state labeler.
    #[must_use]
    pub fn new(config: LoopDetectionConfig) -> Self {
        Self::with_labeler(config, Arc::new(DefaultStateLabeler))
    }

    /// Create a detector with a caller-supplied state labeler.
    #[must_use]
    pub fn with_labeler(config: LoopDetectionConfig, labeler: Arc<dyn StateLabeler>) -> Self {
        let window_size = config.window_size.max(1);
        Self {
            window: VecDeque::with_capacity(window_size),
            labeler,
            exact: ExactMatchDetector::new(config.exact_hash_threshold),
            semantic: SemanticDetector::new(config.semantic_threshold),
            oscillation: OscillationDetector::new(config.oscillation_threshold),
            dead_end: DeadEndDetector::new(config.dead_end_threshold),
            config,
        }
    }

    /// Append an observation, evicting the oldest beyond `window_size`.
    pub fn record(&mut self, observation: StepObservation) {
        let capacity = self.config.window_size.max(1);
        while self.window.len() >= capacity {
            self.window.pop_front();
        }
        self.window.push_back(observation);
    }

    /// Run every strategy and return the highest-confidence match.
    ///
    /// Ties go to the strategy with the higher inherent certainty:
    /// exact, then oscillation, then semantic, then dead end.
    #[must_use]
    pub fn detect(&self) -> LoopDetection {
        if !self.config.enabled {
            debug!("loop_detector: detection disabled");
            return LoopDetection::none();
        }

        let matches = vec![
            self.exact.evaluate(&self.window),
            self.oscillation.evaluate(&self.window, self.labeler.as_ref()),
            self.semantic.evaluate(&self.window),
            self.dead_end.evaluate(&self.window),
        ];

        for result in &matches {
            debug!(
                strategy = %result.strategy,
                confidence = result.confidence,
                window_len = self.window.len(),
                "loop_detector: strategy evaluated"
            );
        }

        let detection = LoopDetection::from_matches(matches);
        if detection.detected {
            warn!(
                strategy = %detection.strategy,
                loop_type = ?detection.loop_type,
                confidence = detection.confidence,
                matched_turns = ?detection.matched_turns,
                "loop_detector: LOOP DETECTED"
            );
        }
        detection
    }

    /// Clear the window.
    pub fn reset(&mut self) {
        self.window.clear();
    }

    /// Observations currently in the window, oldest first.
    pub fn window(&self) -> impl Iterator<Item = &StepObservation> {
        self.window.iter()
    }

    /// Number of observations in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Whether the window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &LoopDetectionConfig {
        &self.config
    }
}
