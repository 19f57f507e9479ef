//! Configuration for loop detection.

use crate::config::{invalid, load_layered};
use crate::error::AntiDriftError;
use serde::{Deserialize, Serialize};

/// Loop detection configuration loaded from env/files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopDetectionConfig {
    /// Global toggle
    #[serde(rename = "loop_detection_enabled")]
    pub enabled: bool,

    /// Number of recent steps kept for analysis
    #[serde(rename = "loop_window_size")]
    pub window_size: usize,

    /// Occurrences of the newest step fingerprint that count as a loop
    #[serde(rename = "loop_exact_hash_threshold")]
    pub exact_hash_threshold: usize,

    /// Minimum Jaccard similarity for a semantic repeat
    #[serde(rename = "loop_semantic_threshold")]
    pub semantic_threshold: f64,

    /// Full A/B cycles required for an oscillation
    #[serde(rename = "loop_oscillation_threshold")]
    pub oscillation_threshold: usize,

    /// Steps without progress before a dead end is reported
    #[serde(rename = "loop_dead_end_threshold")]
    pub dead_end_threshold: usize,
}

impl Default for LoopDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_size: 10,
            exact_hash_threshold: 2,
            semantic_threshold: 0.85,
            oscillation_threshold: 3,
            dead_end_threshold: 5,
        }
    }
}

impl LoopDetectionConfig {
    /// Load loop detection settings from config files and environment variables.
    ///
    /// Priority: env vars → config files → defaults.
    #[must_use]
    pub fn from_env() -> Self {
        load_layered(Self::default(), "loop_detection")
    }

    pub(crate) fn validate(&self) -> Result<(), AntiDriftError> {
        if self.window_size == 0 {
            return Err(invalid("loop_window_size", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.semantic_threshold) {
            return Err(invalid("loop_semantic_threshold", "must be within [0, 1]"));
        }
        Ok(())
    }
}
