//! Types for budget control.

use super::profile::TaskProfileStore;
use serde::{Deserialize, Serialize};

/// Externally visible budget ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    /// Steps left; never below zero
    pub steps_remaining: u64,
    /// Tokens left; never below zero
    pub tokens_remaining: u64,
    /// Mean progress per step over the velocity window
    pub velocity: f64,
    /// Multiplier applied by the most recent step
    pub adjustment_factor: f64,
    /// Either allowance reached zero
    pub exhausted: bool,
}

/// Usage reported for one step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepUsage {
    /// Turn index
    pub turn: u64,
    /// Tokens consumed by the step
    pub tokens_used: u64,
    /// Progress made by the step, `[-1, 1]`
    pub progress_delta: f64,
}

/// Budget recommendation for a task type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRecommendation {
    /// Recommended step allowance
    pub steps: u64,
    /// Recommended token allowance
    pub tokens: u64,
    /// Completed tasks the recommendation is based on; zero for the default
    pub samples: u64,
}

impl BudgetRecommendation {
    /// Whether the recommendation comes from learned history.
    #[must_use]
    pub fn is_learned(&self) -> bool {
        self.samples > 0
    }
}

/// Request for budget beyond the per-step expansion rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionRequest {
    /// Why the extension is needed
    pub justification: String,
    /// Extra steps requested
    pub requested_steps: u64,
    /// Extra tokens requested
    pub requested_tokens: u64,
    /// Caller's estimate of task completion, `[0, 1]`
    pub completion_signal: f64,
}

/// Outcome of an emergency extension request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyExtension {
    /// Justification from the request
    pub justification: String,
    /// Steps requested
    pub requested_steps: u64,
    /// Tokens requested
    pub requested_tokens: u64,
    /// Whether the extension was granted
    pub approved: bool,
    /// Steps added to the budget
    pub granted_steps: u64,
    /// Tokens added to the budget
    pub granted_tokens: u64,
    /// Reason for a rejection
    pub rejection_reason: Option<String>,
}

/// Full controller state for persistence across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSnapshot {
    /// Current ledger
    pub state: BudgetState,
    /// Step allowance the current task started with
    pub initial_steps: u64,
    /// Token allowance the current task started with
    pub initial_tokens: u64,
    /// Steps recorded since task start
    pub steps_consumed: u64,
    /// Tokens recorded since task start
    pub tokens_consumed: u64,
    /// Steps granted by emergency extensions
    pub extension_steps: u64,
    /// Tokens granted by emergency extensions
    pub extension_tokens: u64,
    /// Granted extension steps not yet spent
    pub extension_steps_left: u64,
    /// Total step allowance banked at the start of the current adjustment period
    pub anchor_steps: u64,
    /// Steps recorded in the current adjustment period
    pub period_steps: usize,
    /// Steps left from the adjusted allowance, excluding extensions
    pub allowance_steps: u64,
    /// Consecutive zero-velocity steps
    pub zero_velocity_streak: usize,
    /// Velocity window, oldest first
    pub recent: Vec<StepUsage>,
    /// Learned task profiles
    pub profiles: TaskProfileStore,
}
