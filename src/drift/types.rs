//! Types for drift scoring.

use crate::utils::{clamp_signed, clamp_unit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Weight of goal drift in the overall score.
pub const GOAL_DNA_WEIGHT: f64 = 0.35;
/// Weight of loop risk in the overall score.
pub const LOOP_RISK_WEIGHT: f64 = 0.25;
/// Weight of `|budget_velocity|` in the overall score.
pub const BUDGET_VELOCITY_WEIGHT: f64 = 0.20;
/// Weight of quality degradation in the overall score.
pub const QUALITY_WEIGHT: f64 = 0.15;
/// Weight of stuck time in the overall score.
pub const STUCK_TIME_WEIGHT: f64 = 0.05;

/// Graduated responses, ordered from least to most disruptive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseLevel {
    /// Keep going.
    #[default]
    Continue,
    /// Re-inject the objective into context.
    InjectReminder,
    /// Summarize progress and regenerate the plan.
    SummarizeReplan,
    /// Restore the last good checkpoint.
    CheckpointReset,
    /// Stop and ask the user.
    AskUser,
}

impl ResponseLevel {
    /// Map a score to its band: `[0,0.3)`, `[0.3,0.5)`, `[0.5,0.7)`,
    /// `[0.7,0.9)`, `[0.9,1]`. Lower bounds are inclusive.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        let score = clamp_unit(score);
        if score >= 0.9 {
            Self::AskUser
        } else if score >= 0.7 {
            Self::CheckpointReset
        } else if score >= 0.5 {
            Self::SummarizeReplan
        } else if score >= 0.3 {
            Self::InjectReminder
        } else {
            Self::Continue
        }
    }

    /// Next more disruptive level, saturating at `AskUser`.
    #[must_use]
    pub fn escalate(self) -> Self {
        match self {
            Self::Continue => Self::InjectReminder,
            Self::InjectReminder => Self::SummarizeReplan,
            Self::SummarizeReplan => Self::CheckpointReset,
            Self::CheckpointReset | Self::AskUser => Self::AskUser,
        }
    }

    /// Stable wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Continue => "CONTINUE",
            Self::InjectReminder => "INJECT_REMINDER",
            Self::SummarizeReplan => "SUMMARIZE_REPLAN",
            Self::CheckpointReset => "CHECKPOINT_RESET",
            Self::AskUser => "ASK_USER",
        }
    }
}

impl std::fmt::Display for ResponseLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five scorer inputs.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DriftSignals {
    /// Divergence from the goal, `[0, 1]`
    pub goal_dna_drift: f64,
    /// Loop detector confidence, `[0, 1]`
    pub loop_risk: f64,
    /// Budget burn direction, `[-1, 1]`
    pub budget_velocity: f64,
    /// Output quality loss, `[0, 1]`
    pub quality_degradation: f64,
    /// Normalized time without progress, `[0, 1]`
    pub stuck_time: f64,
}

impl DriftSignals {
    /// Copy with every field clamped into its interval; NaN becomes `0.0`.
    #[must_use]
    pub fn clamped(&self) -> Self {
        Self {
            goal_dna_drift: clamp_unit(self.goal_dna_drift),
            loop_risk: clamp_unit(self.loop_risk),
            budget_velocity: clamp_signed(self.budget_velocity),
            quality_degradation: clamp_unit(self.quality_degradation),
            stuck_time: clamp_unit(self.stuck_time),
        }
    }
}

/// Weighted contribution of each signal to the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SignalContributions {
    /// `0.35 × goal_dna_drift`
    pub goal_dna_drift: f64,
    /// `0.25 × loop_risk`
    pub loop_risk: f64,
    /// `0.20 × |budget_velocity|`
    pub budget_velocity: f64,
    /// `0.15 × quality_degradation`
    pub quality_degradation: f64,
    /// `0.05 × stuck_time`
    pub stuck_time: f64,
}

impl SignalContributions {
    /// Weight already-clamped signals.
    #[must_use]
    pub fn from_signals(signals: &DriftSignals) -> Self {
        Self {
            goal_dna_drift: GOAL_DNA_WEIGHT * signals.goal_dna_drift,
            loop_risk: LOOP_RISK_WEIGHT * signals.loop_risk,
            budget_velocity: BUDGET_VELOCITY_WEIGHT * signals.budget_velocity.abs(),
            quality_degradation: QUALITY_WEIGHT * signals.quality_degradation,
            stuck_time: STUCK_TIME_WEIGHT * signals.stuck_time,
        }
    }

    /// Sum of all contributions.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.goal_dna_drift
            + self.loop_risk
            + self.budget_velocity
            + self.quality_degradation
            + self.stuck_time
    }

    /// Name and value of the largest contribution. Earlier fields win ties.
    #[must_use]
    pub fn dominant(&self) -> (&'static str, f64) {
        [
            ("goal_dna_drift", self.goal_dna_drift),
            ("loop_risk", self.loop_risk),
            ("budget_velocity", self.budget_velocity),
            ("quality_degradation", self.quality_degradation),
            ("stuck_time", self.stuck_time),
        ]
        .into_iter()
        .fold(("goal_dna_drift", self.goal_dna_drift), |best, candidate| {
            if candidate.1 > best.1 {
                candidate
            } else {
                best
            }
        })
    }
}

/// Result of [`DriftScorer::score`](super::DriftScorer::score).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftAssessment {
    /// Weighted score in `[0, 1]`
    pub overall_score: f64,
    /// Recommended response
    pub response_level: ResponseLevel,
    /// Per-signal breakdown
    pub contributions: SignalContributions,
    /// Human-readable summary
    pub explanation: String,
}

/// One recorded score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftHistoryEntry {
    /// Turn index
    pub turn: u64,
    /// Overall score at that turn
    pub score: f64,
    /// Recording time
    pub timestamp: DateTime<Utc>,
}

/// Trend statistics over the most recent history entries.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DriftTrend {
    /// Mean score
    pub mean: f64,
    /// Sample standard deviation
    pub std_dev: f64,
    /// Least-squares slope of score against turn
    pub slope: f64,
    /// `slope > 0`
    pub is_increasing: bool,
    /// Same as `slope`
    pub velocity: f64,
    /// Slope of the newer half minus slope of the older half
    pub acceleration: f64,
    /// Entries the statistics were computed from
    pub samples: usize,
}
