//! Velocity-driven step/token budget controller.

use super::config::BudgetConfig;
use super::profile::TaskProfileStore;
use super::types::{
    BudgetRecommendation, BudgetSnapshot, BudgetState, EmergencyExtension, ExtensionRequest,
    StepUsage,
};
use crate::utils::{clamp_signed, clamp_unit, scale_ceil, scale_floor};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Velocities closer to zero than this count as "no progress".
const ZERO_VELOCITY: f64 = 1e-12;

/// Mutable budget ledger for one session.
///
/// Steps are tracked against an anchor: the total allowance banked when the
/// current adjustment period began. Each [`record_step`] sets the allowance to
/// `floor((anchor - consumed) × factor)`, so the factor applies once to the
/// unconsumed part and never compounds within a period. A period ends when
/// the factor changes or `velocity_window` steps have passed; the allowance
/// left at that point becomes the next anchor, which is how expansion and
/// contraction carry forward. The total allowance never exceeds
/// `initial × expansion_factor`.
///
/// Emergency extensions form a separate pool, spent only once the adjusted
/// allowance is gone and never scaled.
///
/// [`record_step`]: BudgetController::record_step
pub struct BudgetController {
    config: BudgetConfig,
    initial_steps: u64,
    initial_tokens: u64,
    steps_consumed: u64,
    tokens_consumed: u64,
    extension_steps: u64,
    extension_tokens: u64,
    extension_steps_left: u64,
    anchor_steps: u64,
    period_steps: usize,
    allowance_steps: u64,
    tokens_remaining: u64,
    velocity: f64,
    adjustment_factor: f64,
    zero_velocity_streak: usize,
    recent: VecDeque<StepUsage>,
    profiles: TaskProfileStore,
}

impl BudgetController {
    /// Create a controller holding the configured initial budget.
    #[must_use]
    pub fn new(config: BudgetConfig) -> Self {
        let (steps, tokens) = (config.initial_steps, config.initial_tokens);
        let mut controller = Self {
            recent: VecDeque::with_capacity(config.velocity_window.max(1)),
            config,
            initial_steps: 0,
            initial_tokens: 0,
            steps_consumed: 0,
            tokens_consumed: 0,
            extension_steps: 0,
            extension_tokens: 0,
            extension_steps_left: 0,
            anchor_steps: 0,
            period_steps: 0,
            allowance_steps: 0,
            tokens_remaining: 0,
            velocity: 0.0,
            adjustment_factor: 1.0,
            zero_velocity_streak: 0,
            profiles: TaskProfileStore::new(),
        };
        controller.begin_task(steps, tokens);
        controller
    }

    /// Seed the controller with previously learned task profiles.
    #[must_use]
    pub fn with_profiles(mut self, profiles: TaskProfileStore) -> Self {
        self.profiles = profiles;
        self
    }

    /// Reset the ledger at a task boundary. Learned profiles are kept.
    pub fn begin_task(&mut self, steps: u64, tokens: u64) {
        self.initial_steps = steps;
        self.initial_tokens = tokens;
        self.steps_consumed = 0;
        self.tokens_consumed = 0;
        self.extension_steps = 0;
        self.extension_tokens = 0;
        self.extension_steps_left = 0;
        self.anchor_steps = steps;
        self.period_steps = 0;
        self.allowance_steps = steps;
        self.tokens_remaining = tokens;
        self.velocity = 0.0;
        self.adjustment_factor = 1.0;
        self.zero_velocity_streak = 0;
        self.recent.clear();
        debug!(steps, tokens, "budget: ledger reset");
    }

    /// Record one step and apply exactly one budget adjustment.
    ///
    /// `progress_delta` is clamped into `[-1, 1]`.
    pub fn record_step(&mut self, turn: u64, tokens_used: u64, progress_delta: f64) -> BudgetState {
        let progress_delta = clamp_signed(progress_delta);
        let consumed_before = self.steps_consumed;
        let allowance_before = self.allowance_steps;
        if allowance_before == 0 && self.extension_steps_left > 0 {
            self.extension_steps_left -= 1;
        }
        self.steps_consumed = self.steps_consumed.saturating_add(1);
        self.tokens_consumed = self.tokens_consumed.saturating_add(tokens_used);

        let window = self.config.velocity_window.max(1);
        while self.recent.len() >= window {
            self.recent.pop_front();
        }
        self.recent.push_back(StepUsage {
            turn,
            tokens_used,
            progress_delta,
        });
        self.velocity = self.window_velocity();

        if self.velocity.abs() < ZERO_VELOCITY {
            self.zero_velocity_streak = self.zero_velocity_streak.saturating_add(1);
        } else {
            self.zero_velocity_streak = 0;
        }

        let factor = if self.zero_velocity_streak == self.config.stuck_streak {
            self.config.stuck_contraction_factor
        } else if self.velocity >= self.config.min_velocity {
            self.config.expansion_factor
        } else {
            self.config.contraction_factor
        };

        #[allow(clippy::float_cmp)]
        let factor_changed = factor != self.adjustment_factor;
        if factor_changed || self.period_steps >= window {
            self.anchor_steps = consumed_before.saturating_add(allowance_before);
            self.period_steps = 0;
            debug!(
                turn,
                anchor_steps = self.anchor_steps,
                factor_changed,
                "budget: allowance banked"
            );
        }
        self.period_steps = self.period_steps.saturating_add(1);
        self.adjustment_factor = factor;

        let unconsumed = self.anchor_steps.saturating_sub(self.steps_consumed);
        let ceiling_left = self.step_ceiling().saturating_sub(self.steps_consumed);
        self.allowance_steps = scale_floor(unconsumed, factor).min(ceiling_left);
        self.tokens_remaining = self
            .initial_tokens
            .saturating_add(self.extension_tokens)
            .saturating_sub(self.tokens_consumed);

        debug!(
            turn,
            tokens_used,
            progress_delta,
            velocity = self.velocity,
            factor,
            zero_velocity_streak = self.zero_velocity_streak,
            steps_remaining = self.steps_remaining(),
            tokens_remaining = self.tokens_remaining,
            "budget: step recorded"
        );

        if self.zero_velocity_streak == self.config.stuck_streak {
            warn!(turn, streak = self.zero_velocity_streak, "budget: stalled, aggressive contraction applied");
        }
        if self.is_exhausted() {
            warn!(
                turn,
                steps_remaining = self.steps_remaining(),
                tokens_remaining = self.tokens_remaining,
                "budget: exhausted"
            );
        }

        self.get_status()
    }

    /// Current ledger.
    #[must_use]
    pub fn get_status(&self) -> BudgetState {
        BudgetState {
            steps_remaining: self.steps_remaining(),
            tokens_remaining: self.tokens_remaining,
            velocity: self.velocity,
            adjustment_factor: self.adjustment_factor,
            exhausted: self.is_exhausted(),
        }
    }

    /// Whether either allowance reached zero. The controller takes no action on it.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.steps_remaining() == 0 || self.tokens_remaining == 0
    }

    /// Grant extra budget when the task is nearly complete.
    ///
    /// Approved only if `completion_signal` exceeds the configured threshold
    /// and all extensions of this task stay below `extension_cap_ratio` of
    /// the initial budget. Rejections leave the budget unchanged.
    pub fn request_emergency_extension(&mut self, request: ExtensionRequest) -> EmergencyExtension {
        let completion = clamp_unit(request.completion_signal);
        let cap_steps = scale_floor(self.initial_steps, self.config.extension_cap_ratio);
        let cap_tokens = scale_floor(self.initial_tokens, self.config.extension_cap_ratio);
        let reaches_cap = |granted: u64, requested: u64, cap: u64| {
            requested > 0 && granted.saturating_add(requested) >= cap
        };

        let rejection = if completion <= self.config.extension_completion_threshold {
            Some(format!(
                "completion signal {completion:.2} does not exceed {:.2}",
                self.config.extension_completion_threshold
            ))
        } else if request.requested_steps == 0 && request.requested_tokens == 0 {
            Some("nothing requested".to_string())
        } else if reaches_cap(self.extension_steps, request.requested_steps, cap_steps)
            || reaches_cap(self.extension_tokens, request.requested_tokens, cap_tokens)
        {
            Some(format!(
                "request must stay below the extension cap of {cap_steps} steps / {cap_tokens} tokens \
                 ({} steps / {} tokens already granted)",
                self.extension_steps, self.extension_tokens
            ))
        } else {
            None
        };

        if let Some(reason) = rejection {
            warn!(
                justification = %request.justification,
                requested_steps = request.requested_steps,
                requested_tokens = request.requested_tokens,
                completion,
                reason = %reason,
                "budget: emergency extension rejected"
            );
            return EmergencyExtension {
                justification: request.justification,
                requested_steps: request.requested_steps,
                requested_tokens: request.requested_tokens,
                approved: false,
                granted_steps: 0,
                granted_tokens: 0,
                rejection_reason: Some(reason),
            };
        }

        self.extension_steps += request.requested_steps;
        self.extension_tokens += request.requested_tokens;
        self.extension_steps_left = self.extension_steps_left.saturating_add(request.requested_steps);
        self.tokens_remaining = self.tokens_remaining.saturating_add(request.requested_tokens);

        info!(
            justification = %request.justification,
            granted_steps = request.requested_steps,
            granted_tokens = request.requested_tokens,
            completion,
            "budget: emergency extension approved"
        );

        EmergencyExtension {
            justification: request.justification,
            requested_steps: request.requested_steps,
            requested_tokens: request.requested_tokens,
            approved: true,
            granted_steps: request.requested_steps,
            granted_tokens: request.requested_tokens,
            rejection_reason: None,
        }
    }

    /// Fold a completed task into the learned profile for `task_type`.
    pub fn record_task_completion(
        &mut self,
        task_type: &str,
        steps_used: u64,
        tokens_used: u64,
        total_progress: f64,
    ) {
        self.profiles
            .record(task_type, steps_used, tokens_used, total_progress);
        info!(task_type, steps_used, tokens_used, total_progress, "budget: task profile updated");
    }

    /// Recommended budget for `task_type`: historical mean × multiplier,
    /// or the configured conservative default without history.
    #[must_use]
    pub fn get_task_budget_recommendation(&self, task_type: &str) -> BudgetRecommendation {
        recommend(&self.config, &self.profiles, task_type)
    }

    /// Steps recorded since the task began.
    #[must_use]
    pub fn steps_consumed(&self) -> u64 {
        self.steps_consumed
    }

    /// Tokens recorded since the task began.
    #[must_use]
    pub fn tokens_consumed(&self) -> u64 {
        self.tokens_consumed
    }

    /// Upper bound on the adjusted step allowance, consumed steps included.
    #[must_use]
    pub fn step_ceiling(&self) -> u64 {
        scale_floor(self.initial_steps, self.config.expansion_factor).max(self.initial_steps)
    }

    /// Learned task profiles.
    #[must_use]
    pub fn profiles(&self) -> &TaskProfileStore {
        &self.profiles
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Capture the full ledger for persistence.
    #[must_use]
    pub fn snapshot(&self) -> BudgetSnapshot {
        BudgetSnapshot {
            state: self.get_status(),
            initial_steps: self.initial_steps,
            initial_tokens: self.initial_tokens,
            steps_consumed: self.steps_consumed,
            tokens_consumed: self.tokens_consumed,
            extension_steps: self.extension_steps,
            extension_tokens: self.extension_tokens,
            extension_steps_left: self.extension_steps_left,
            anchor_steps: self.anchor_steps,
            period_steps: self.period_steps,
            allowance_steps: self.allowance_steps,
            zero_velocity_streak: self.zero_velocity_streak,
            recent: self.recent.iter().copied().collect(),
            profiles: self.profiles.clone(),
        }
    }

    /// Rebuild a controller from a [`snapshot`](Self::snapshot).
    #[must_use]
    pub fn restore(config: BudgetConfig, snapshot: BudgetSnapshot) -> Self {
        Self {
            config,
            initial_steps: snapshot.initial_steps,
            initial_tokens: snapshot.initial_tokens,
            steps_consumed: snapshot.steps_consumed,
            tokens_consumed: snapshot.tokens_consumed,
            extension_steps: snapshot.extension_steps,
            extension_tokens: snapshot.extension_tokens,
            extension_steps_left: snapshot.extension_steps_left,
            anchor_steps: snapshot.anchor_steps,
            period_steps: snapshot.period_steps,
            allowance_steps: snapshot.allowance_steps,
            tokens_remaining: snapshot.state.tokens_remaining,
            velocity: snapshot.state.velocity,
            adjustment_factor: snapshot.state.adjustment_factor,
            zero_velocity_streak: snapshot.zero_velocity_streak,
            recent: snapshot.recent.into_iter().collect(),
            profiles: snapshot.profiles,
        }
    }

    fn steps_remaining(&self) -> u64 {
        self.allowance_steps.saturating_add(self.extension_steps_left)
    }

    #[allow(clippy::cast_precision_loss)]
    fn window_velocity(&self) -> f64 {
        if self.recent.is_empty() {
            return 0.0;
        }
        let total: f64 = self.recent.iter().map(|usage| usage.progress_delta).sum();
        total / self.recent.len() as f64
    }
}

/// Shared by the controller and the pooled registry store.
pub(crate) fn recommend(
    config: &BudgetConfig,
    profiles: &TaskProfileStore,
    task_type: &str,
) -> BudgetRecommendation {
    match profiles.get(task_type) {
        Some(profile) if profile.completed_tasks() > 0 => BudgetRecommendation {
            steps: scale_ceil(profile.steps_used.mean, config.recommendation_multiplier),
            tokens: scale_ceil(profile.tokens_used.mean, config.recommendation_multiplier),
            samples: profile.completed_tasks(),
        },
        _ => BudgetRecommendation {
            steps: config.default_recommended_steps,
            tokens: config.default_recommended_tokens,
            samples: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> BudgetController {
        BudgetController::new(BudgetConfig::default())
    }

    fn extension(completion_signal: f64, steps: u64, tokens: u64) -> ExtensionRequest {
        ExtensionRequest {
            justification: "final verification pass".to_string(),
            requested_steps: steps,
            requested_tokens: tokens,
            completion_signal,
        }
    }

    #[test]
    fn productive_steps_expand_without_compounding() {
        let mut budget = controller();
        for turn in 1..=10 {
            budget.record_step(turn, 2_000, 0.05);
        }
        let status = budget.get_status();
        assert_eq!(status.tokens_remaining, 80_000);
        assert_eq!(status.steps_remaining, 60);
        assert!((status.velocity - 0.05).abs() < 1e-12);
        assert_eq!(status.adjustment_factor, 1.5);
        assert!(!status.exhausted);
    }

    #[test]
    fn first_productive_step_expands() {
        let mut budget = controller();
        let status = budget.record_step(1, 100, 0.2);
        assert_eq!(status.steps_remaining, 73);
    }

    #[test]
    fn slow_progress_contracts() {
        let mut budget = controller();
        let status = budget.record_step(1, 100, 0.005);
        // (50 - 1) × 0.7
        assert_eq!(status.steps_remaining, 34);
        assert_eq!(status.adjustment_factor, 0.7);
    }

    #[test]
    fn aggressive_contraction_applies_once_on_streak() {
        let mut budget = controller();
        let factors: Vec<f64> = (1..=6)
            .map(|turn| budget.record_step(turn, 100, 0.0).adjustment_factor)
            .collect();
        assert_eq!(factors, vec![0.7, 0.7, 0.7, 0.7, 0.5, 0.7]);
    }

    #[test]
    fn fifth_stalled_step_halves_remaining() {
        let mut budget = controller();
        for turn in 1..=4 {
            budget.record_step(turn, 100, 0.0);
        }
        let status = budget.record_step(5, 100, 0.0);
        // Banked anchor 4 + 32, then (36 - 5) × 0.5
        assert_eq!(status.steps_remaining, 15);
    }

    #[test]
    fn productive_run_outlasts_initial_budget() {
        let mut budget = controller();
        let mut steps = 0;
        while !budget.is_exhausted() && steps < 1_000 {
            steps += 1;
            budget.record_step(steps, 100, 0.05);
        }
        assert!(steps > 50);
        assert_eq!(steps, budget.step_ceiling());
    }

    #[test]
    fn stalled_run_exhausts_early() {
        let mut budget = controller();
        let mut steps = 0;
        while !budget.is_exhausted() && steps < 1_000 {
            steps += 1;
            budget.record_step(steps, 100, 0.0);
        }
        assert!(steps < 25, "stalled run lasted {steps} steps");
    }

    #[test]
    fn expansion_carries_into_next_period() {
        let mut budget = controller();
        for turn in 1..=10 {
            budget.record_step(turn, 0, 0.05);
        }
        // Anchor becomes 10 + 60; capped by the 75-step ceiling.
        let status = budget.record_step(11, 0, 0.05);
        assert_eq!(status.steps_remaining, 64);
    }

    #[test]
    fn negative_velocity_is_not_a_stall() {
        let mut budget = controller();
        let factors: Vec<f64> = (1..=6)
            .map(|turn| budget.record_step(turn, 100, -0.2).adjustment_factor)
            .collect();
        assert_eq!(factors, vec![0.7; 6]);
    }

    #[test]
    fn progress_resets_stall_streak() {
        let mut budget = controller();
        for turn in 1..=4 {
            budget.record_step(turn, 100, 0.0);
        }
        budget.record_step(5, 100, 0.5);
        let status = budget.record_step(6, 100, 0.0);
        assert_ne!(status.adjustment_factor, 0.5);
    }

    #[test]
    fn velocity_uses_sliding_window() {
        let mut budget = BudgetController::new(BudgetConfig {
            velocity_window: 2,
            ..BudgetConfig::default()
        });
        budget.record_step(1, 0, 1.0);
        budget.record_step(2, 0, 0.0);
        let status = budget.record_step(3, 0, 0.0);
        assert_eq!(status.velocity, 0.0);
    }

    #[test]
    fn budget_never_goes_negative() {
        let mut budget = controller();
        let status = budget.record_step(1, u64::MAX, -5.0);
        assert_eq!(status.tokens_remaining, 0);
        assert!(status.exhausted);
        for turn in 2..200 {
            budget.record_step(turn, u64::MAX, -1.0);
        }
        let status = budget.get_status();
        assert_eq!(status.steps_remaining, 0);
        assert_eq!(status.tokens_remaining, 0);
        assert!(budget.is_exhausted());
    }

    #[test]
    fn extension_approved_near_completion() {
        let mut budget = controller();
        let before = budget.get_status();
        let result = budget.request_emergency_extension(extension(0.95, 5, 10_000));
        assert!(result.approved);
        assert_eq!(result.granted_steps, 5);
        let after = budget.get_status();
        assert_eq!(after.steps_remaining, before.steps_remaining + 5);
        assert_eq!(after.tokens_remaining, before.tokens_remaining + 10_000);
    }

    #[test]
    fn extension_rejected_when_incomplete() {
        let mut budget = controller();
        budget.record_step(1, 1_000, 0.1);
        let before = budget.get_status();
        let result = budget.request_emergency_extension(extension(0.5, 5, 10_000));
        assert!(!result.approved);
        assert!(result.rejection_reason.is_some());
        assert_eq!(budget.get_status(), before);
    }

    #[test]
    fn extensions_are_capped_cumulatively() {
        let mut budget = controller();
        // Cap is 20% of 50 steps = 10, and grants must stay below it.
        assert!(budget.request_emergency_extension(extension(0.95, 6, 0)).approved);
        assert!(!budget.request_emergency_extension(extension(0.95, 6, 0)).approved);
        assert!(!budget.request_emergency_extension(extension(0.95, 4, 0)).approved);
        assert!(budget.request_emergency_extension(extension(0.95, 3, 0)).approved);
        assert!(!budget.request_emergency_extension(extension(0.99, 1, 0)).approved);
    }

    #[test]
    fn extension_at_cap_is_rejected() {
        let mut budget = controller();
        let result = budget.request_emergency_extension(extension(0.95, 10, 0));
        assert!(!result.approved);
        assert_eq!(budget.get_status().steps_remaining, 50);
    }

    #[test]
    fn extension_is_not_scaled() {
        let mut budget = controller();
        assert!(budget.request_emergency_extension(extension(0.95, 9, 0)).approved);
        let status = budget.record_step(1, 0, 0.5);
        // floor(49 × 1.5) + 9
        assert_eq!(status.steps_remaining, 82);
    }

    #[test]
    fn extension_is_spent_after_allowance() {
        let mut budget = controller();
        let mut turn = 0;
        while !budget.is_exhausted() {
            turn += 1;
            budget.record_step(turn, 0, 0.0);
        }
        assert!(budget.request_emergency_extension(extension(0.95, 5, 0)).approved);
        for left in (0..5).rev() {
            turn += 1;
            assert_eq!(budget.record_step(turn, 0, 0.0).steps_remaining, left);
        }
        assert!(budget.is_exhausted());
    }

    #[test]
    fn recommendation_uses_history_with_margin() {
        let mut budget = controller();
        assert_eq!(
            budget.get_task_budget_recommendation("refactor"),
            BudgetRecommendation {
                steps: 25,
                tokens: 50_000,
                samples: 0
            }
        );
        budget.record_task_completion("refactor", 20, 40_000, 1.0);
        budget.record_task_completion("refactor", 30, 60_000, 1.0);
        let recommendation = budget.get_task_budget_recommendation("refactor");
        assert_eq!(recommendation.steps, 30);
        assert_eq!(recommendation.tokens, 60_000);
        assert!(recommendation.is_learned());
    }

    #[test]
    fn begin_task_keeps_profiles() {
        let mut budget = controller();
        budget.record_task_completion("docs", 10, 1_000, 1.0);
        budget.record_step(1, 500, 0.0);
        budget.begin_task(40, 8_000);
        let status = budget.get_status();
        assert_eq!(status.steps_remaining, 40);
        assert_eq!(status.tokens_remaining, 8_000);
        assert_eq!(status.adjustment_factor, 1.0);
        assert_eq!(budget.profiles().len(), 1);
    }

    #[test]
    fn snapshot_restores_ledger() {
        let mut budget = controller();
        for turn in 1..=3 {
            budget.record_step(turn, 1_000, 0.0);
        }
        let mut restored = BudgetController::restore(BudgetConfig::default(), budget.snapshot());
        assert_eq!(restored.get_status(), budget.get_status());
        // Streak continues across the restore.
        restored.record_step(4, 0, 0.0);
        let status = restored.record_step(5, 0, 0.0);
        assert_eq!(status.adjustment_factor, 0.5);
    }
}
