//! Configuration for drift scoring.

use crate::config::{invalid, load_layered};
use crate::error::AntiDriftError;
use serde::{Deserialize, Serialize};

/// Drift scorer configuration loaded from env/files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftScorerConfig {
    /// History entries kept before the oldest is evicted
    #[serde(rename = "drift_max_history")]
    pub max_history: usize,

    /// Entries used by the session when computing the trend
    #[serde(rename = "drift_trend_window")]
    pub trend_window: usize,

    /// Acceleration at which a rising trend escalates the response one level
    #[serde(rename = "drift_escalation_acceleration")]
    pub escalation_acceleration: f64,
}

impl Default for DriftScorerConfig {
    fn default() -> Self {
        Self {
            max_history: 10_000,
            trend_window: 10,
            escalation_acceleration: 0.05,
        }
    }
}

impl DriftScorerConfig {
    /// Load drift scorer settings from config files and environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        load_layered(Self::default(), "drift")
    }

    pub(crate) fn validate(&self) -> Result<(), AntiDriftError> {
        if self.max_history == 0 {
            return Err(invalid("drift_max_history", "must be at least 1"));
        }
        if self.trend_window < 2 {
            return Err(invalid("drift_trend_window", "must be at least 2"));
        }
        if self.escalation_acceleration.is_nan() || self.escalation_acceleration < 0.0 {
            return Err(invalid("drift_escalation_acceleration", "must be non-negative"));
        }
        Ok(())
    }
}
