//! Weighted drift scorer with score history.

use super::config::DriftScorerConfig;
use super::trend::compute_trend;
use super::types::{
    DriftAssessment, DriftHistoryEntry, DriftSignals, DriftTrend, ResponseLevel,
    SignalContributions,
};
use crate::utils::{clamp_unit, round_score};
use chrono::Utc;
use std::collections::VecDeque;
use tracing::debug;

/// Combines the five drift signals and tracks the per-session score history.
///
/// ```text
/// overall = 0.35*goal_dna_drift + 0.25*loop_risk + 0.20*|budget_velocity|
///         + 0.15*quality_degradation + 0.05*stuck_time
/// ```
pub struct DriftScorer {
    config: DriftScorerConfig,
    history: VecDeque<DriftHistoryEntry>,
}

impl DriftScorer {
    /// Create a scorer with an empty history.
    #[must_use]
    pub fn new(config: DriftScorerConfig) -> Self {
        Self {
            config,
            history: VecDeque::new(),
        }
    }

    /// Score `signals` and recommend a response. Inputs are clamped, never rejected.
    #[must_use]
    pub fn score(&self, signals: DriftSignals) -> DriftAssessment {
        let signals = signals.clamped();
        let contributions = SignalContributions::from_signals(&signals);
        let overall_score = clamp_unit(round_score(contributions.total()));
        let response_level = ResponseLevel::from_score(overall_score);
        let explanation = Self::explain(overall_score, response_level, &contributions);

        debug!(
            overall_score,
            response_level = %response_level,
            goal_dna_drift = signals.goal_dna_drift,
            loop_risk = signals.loop_risk,
            budget_velocity = signals.budget_velocity,
            quality_degradation = signals.quality_degradation,
            stuck_time = signals.stuck_time,
            "drift_scorer: scored signals"
        );

        DriftAssessment {
            overall_score,
            response_level,
            contributions,
            explanation,
        }
    }

    /// Append a score to the history, evicting the oldest beyond `max_history`.
    pub fn record_drift(&mut self, turn: u64, score: f64) {
        while self.history.len() >= self.config.max_history.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(DriftHistoryEntry {
            turn,
            score: clamp_unit(score),
            timestamp: Utc::now(),
        });
    }

    /// Trend statistics over the last `window` history entries.
    #[must_use]
    pub fn get_drift_trend(&self, window: usize) -> DriftTrend {
        let skip = self.history.len().saturating_sub(window);
        let recent: Vec<&DriftHistoryEntry> = self.history.iter().skip(skip).collect();
        compute_trend(&recent)
    }

    /// Raise `level` one step when the trend is rising and accelerating
    /// past `escalation_acceleration`.
    #[must_use]
    pub fn escalate(&self, level: ResponseLevel, trend: &DriftTrend) -> ResponseLevel {
        let accelerating = trend.velocity > 0.0
            && trend.acceleration > 0.0
            && trend.acceleration >= self.config.escalation_acceleration;
        if accelerating {
            debug!(
                velocity = trend.velocity,
                acceleration = trend.acceleration,
                from = %level,
                "drift_scorer: escalating on accelerating drift"
            );
            level.escalate()
        } else {
            level
        }
    }

    /// Recorded history, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &DriftHistoryEntry> {
        self.history.iter()
    }

    /// Number of recorded entries.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &DriftScorerConfig {
        &self.config
    }

    /// Clear the history at session start.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    fn explain(
        overall_score: f64,
        level: ResponseLevel,
        contributions: &SignalContributions,
    ) -> String {
        let (signal, value) = contributions.dominant();
        if value <= 0.0 {
            return format!("{level}: drift score {overall_score:.3}, no signal contributing");
        }
        format!("{level}: drift score {overall_score:.3}, dominated by {signal} ({value:.3})")
    }
}
