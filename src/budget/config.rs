//! Configuration for budget control.

use crate::config::{invalid, load_layered};
use crate::error::AntiDriftError;
use serde::{Deserialize, Serialize};

/// Budget controller configuration loaded from env/files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Step allowance at task start
    #[serde(rename = "budget_initial_steps")]
    pub initial_steps: u64,
    /// Token allowance at task start
    #[serde(rename = "budget_initial_tokens")]
    pub initial_tokens: u64,

    /// Steps averaged into the velocity
    #[serde(rename = "budget_velocity_window")]
    pub velocity_window: usize,
    /// Velocity at or above which the budget expands
    #[serde(rename = "budget_min_velocity")]
    pub min_velocity: f64,
    /// Multiplier applied while progressing
    #[serde(rename = "budget_expansion_factor")]
    pub expansion_factor: f64,
    /// Multiplier applied while below `min_velocity`
    #[serde(rename = "budget_contraction_factor")]
    pub contraction_factor: f64,
    /// Consecutive zero-velocity steps that trigger the aggressive contraction
    #[serde(rename = "budget_stuck_streak")]
    pub stuck_streak: usize,
    /// Multiplier applied once when `stuck_streak` is reached
    #[serde(rename = "budget_stuck_contraction_factor")]
    pub stuck_contraction_factor: f64,

    /// Margin over the historical mean for task recommendations
    #[serde(rename = "budget_recommendation_multiplier")]
    pub recommendation_multiplier: f64,
    /// Recommended steps for a task type without history
    #[serde(rename = "budget_default_recommended_steps")]
    pub default_recommended_steps: u64,
    /// Recommended tokens for a task type without history
    #[serde(rename = "budget_default_recommended_tokens")]
    pub default_recommended_tokens: u64,

    /// Completion signal an extension request must exceed
    #[serde(rename = "budget_extension_completion_threshold")]
    pub extension_completion_threshold: f64,
    /// Share of the initial budget that extensions may add per task
    #[serde(rename = "budget_extension_cap_ratio")]
    pub extension_cap_ratio: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            initial_steps: 50,
            initial_tokens: 100_000,
            velocity_window: 10,
            min_velocity: 0.01,
            expansion_factor: 1.5,
            contraction_factor: 0.7,
            stuck_streak: 5,
            stuck_contraction_factor: 0.5,
            recommendation_multiplier: 1.2,
            default_recommended_steps: 25,
            default_recommended_tokens: 50_000,
            extension_completion_threshold: 0.9,
            extension_cap_ratio: 0.2,
        }
    }
}

impl BudgetConfig {
    /// Load budget settings from config files and environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        load_layered(Self::default(), "budget")
    }

    pub(crate) fn validate(&self) -> Result<(), AntiDriftError> {
        if self.velocity_window == 0 {
            return Err(invalid("budget_velocity_window", "must be at least 1"));
        }
        if self.stuck_streak == 0 {
            return Err(invalid("budget_stuck_streak", "must be at least 1"));
        }
        if self.expansion_factor.is_nan() || self.expansion_factor < 1.0 {
            return Err(invalid("budget_expansion_factor", "must be at least 1.0"));
        }
        for (key, factor) in [
            ("budget_contraction_factor", self.contraction_factor),
            ("budget_stuck_contraction_factor", self.stuck_contraction_factor),
        ] {
            if factor.is_nan() || factor <= 0.0 || factor > 1.0 {
                return Err(invalid(key, "must be within (0, 1]"));
            }
        }
        if self.recommendation_multiplier.is_nan() || self.recommendation_multiplier <= 0.0 {
            return Err(invalid("budget_recommendation_multiplier", "must be positive"));
        }
        for (key, ratio) in [
            ("budget_extension_completion_threshold", self.extension_completion_threshold),
            ("budget_extension_cap_ratio", self.extension_cap_ratio),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(invalid(key, "must be within [0, 1]"));
            }
        }
        Ok(())
    }
}
