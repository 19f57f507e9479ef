//! Types for loop detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key of the numeric progress field inside a state snapshot.
pub const PROGRESS_KEY: &str = "progress";

/// Types of detected loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoopType {
    /// Identical (action, state, outcome) repeated.
    Exact,
    /// Near-identical action/outcome wording.
    Semantic,
    /// State alternating between two labels.
    Oscillation,
    /// Varied actions without any progress.
    DeadEnd,
    /// Nothing detected.
    None,
}

impl LoopType {
    /// Short hint for the planning collaborator.
    #[must_use]
    pub fn suggestion(self) -> &'static str {
        match self {
            Self::Exact => {
                "The same step was repeated verbatim. Change the action or its inputs before retrying."
            }
            Self::Semantic => {
                "Recent steps are near-duplicates. Summarize what was learned and try a different approach."
            }
            Self::Oscillation => {
                "The agent is alternating between two states. Commit to one path or re-plan."
            }
            Self::DeadEnd => {
                "Progress has stalled despite varied actions. Re-plan or ask for guidance."
            }
            Self::None => "",
        }
    }
}

/// One recorded agent step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepObservation {
    /// Turn index
    pub turn: u64,
    /// Action description
    pub action: String,
    /// State snapshot; may carry a numeric `progress` field
    pub state: Map<String, Value>,
    /// Outcome text
    pub outcome: String,
    /// Recording time
    pub timestamp: DateTime<Utc>,
}

impl StepObservation {
    /// Create an observation with an empty state snapshot, stamped now.
    #[must_use]
    pub fn new(turn: u64, action: impl Into<String>, outcome: impl Into<String>) -> Self {
        Self {
            turn,
            action: action.into(),
            state: Map::new(),
            outcome: outcome.into(),
            timestamp: Utc::now(),
        }
    }

    /// Replace the whole state snapshot.
    #[must_use]
    pub fn with_state(mut self, state: Map<String, Value>) -> Self {
        self.state = state;
        self
    }

    /// Set a single state field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.state.insert(key.into(), value.into());
        self
    }

    /// Set the numeric `progress` field.
    #[must_use]
    pub fn with_progress(self, progress: f64) -> Self {
        self.with_field(PROGRESS_KEY, progress)
    }

    /// Override the recording time.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Numeric progress, `0.0` when absent or not a number.
    #[must_use]
    pub fn progress(&self) -> f64 {
        self.state
            .get(PROGRESS_KEY)
            .and_then(Value::as_f64)
            .filter(|value| value.is_finite())
            .unwrap_or(0.0)
    }
}

/// Raw output of a single detection strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyMatch {
    /// Strategy name (`exact_hash`, `semantic_similarity`, `oscillation`, `dead_end`)
    pub strategy: String,
    /// Confidence in `[0, 1]`; zero means no detection
    pub confidence: f64,
    /// Turns that took part in the match
    pub matched_turns: Vec<u64>,
    /// Loop type, `None` when nothing matched
    pub loop_type: LoopType,
}

impl StrategyMatch {
    /// A "no detection" result for `strategy`.
    #[must_use]
    pub fn none(strategy: &str) -> Self {
        Self {
            strategy: strategy.to_string(),
            confidence: 0.0,
            matched_turns: Vec::new(),
            loop_type: LoopType::None,
        }
    }

    /// Whether this strategy fired.
    #[must_use]
    pub fn is_match(&self) -> bool {
        self.confidence > 0.0
    }
}

/// Result of [`LoopDetector::detect`](super::LoopDetector::detect).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopDetection {
    /// Whether any strategy fired
    pub detected: bool,
    /// Name of the winning strategy (`none` when nothing fired)
    pub strategy: String,
    /// Confidence of the winning strategy
    pub confidence: f64,
    /// Turns matched by the winning strategy
    pub matched_turns: Vec<u64>,
    /// Loop type of the winning strategy
    pub loop_type: LoopType,
    /// Hint for the planning collaborator
    pub suggestion: String,
    /// Every strategy's raw output, in tie-break order
    pub all_detections: Vec<StrategyMatch>,
}

impl LoopDetection {
    /// Empty result with no strategy output.
    #[must_use]
    pub fn none() -> Self {
        Self::from_matches(Vec::new())
    }

    /// Pick the strongest match. `matches` must be in tie-break order:
    /// on equal confidence the earlier entry wins.
    pub(crate) fn from_matches(matches: Vec<StrategyMatch>) -> Self {
        let best = matches
            .iter()
            .filter(|candidate| candidate.is_match())
            .fold(None::<&StrategyMatch>, |best, candidate| match best {
                Some(current) if current.confidence >= candidate.confidence => Some(current),
                _ => Some(candidate),
            })
            .cloned();

        match best {
            Some(best) => Self {
                detected: true,
                suggestion: best.loop_type.suggestion().to_string(),
                strategy: best.strategy,
                confidence: best.confidence,
                matched_turns: best.matched_turns,
                loop_type: best.loop_type,
                all_detections: matches,
            },
            None => Self {
                detected: false,
                strategy: "none".to_string(),
                confidence: 0.0,
                matched_turns: Vec::new(),
                loop_type: LoopType::None,
                suggestion: String::new(),
                all_detections: matches,
            },
        }
    }

    /// Loop risk signal for the drift scorer.
    #[must_use]
    pub fn loop_risk(&self) -> f64 {
        self.confidence
    }
}
