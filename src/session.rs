//! Anti-drift session
//!
//! One instance per agent session, constructed and owned by the caller.
//! Runs the per-step control flow: record the observation, detect loops,
//! score drift, then settle the budget.

use crate::budget::{
    BudgetController, BudgetRecommendation, BudgetState, EmergencyExtension, ExtensionRequest,
    TaskProfileStore,
};
use crate::config::AntiDriftConfig;
use crate::drift::{DriftAssessment, DriftScorer, DriftSignals, DriftTrend, ResponseLevel};
use crate::error::AntiDriftError;
use crate::loop_detection::{LoopDetection, LoopDetector, LoopType, StateLabeler, StepObservation};
use crate::utils::{clamp_signed, clamp_unit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything the orchestrator reports for one step.
///
/// Signals left as `None` fall back to `0.0`.
#[derive(Debug, Clone)]
pub struct TurnInput {
    /// The step itself
    pub observation: StepObservation,
    /// From the goal-tracking collaborator
    pub goal_dna_drift: Option<f64>,
    /// From the context/quality collaborator
    pub quality_degradation: Option<f64>,
    /// Budget burn direction, `[-1, 1]`
    pub budget_velocity: Option<f64>,
    /// Normalized time without progress
    pub stuck_time: Option<f64>,
    /// Tokens the step consumed
    pub tokens_used: u64,
    /// Progress the step made
    pub progress_delta: f64,
}

impl TurnInput {
    /// Input with no external signals.
    #[must_use]
    pub fn new(observation: StepObservation, tokens_used: u64, progress_delta: f64) -> Self {
        Self {
            observation,
            goal_dna_drift: None,
            quality_degradation: None,
            budget_velocity: None,
            stuck_time: None,
            tokens_used,
            progress_delta,
        }
    }

    /// Set the goal drift signal.
    #[must_use]
    pub fn goal_dna_drift(mut self, value: f64) -> Self {
        self.goal_dna_drift = Some(value);
        self
    }

    /// Set the quality degradation signal.
    #[must_use]
    pub fn quality_degradation(mut self, value: f64) -> Self {
        self.quality_degradation = Some(value);
        self
    }

    /// Set the budget velocity signal.
    #[must_use]
    pub fn budget_velocity(mut self, value: f64) -> Self {
        self.budget_velocity = Some(value);
        self
    }

    /// Set the stuck time signal.
    #[must_use]
    pub fn stuck_time(mut self, value: f64) -> Self {
        self.stuck_time = Some(value);
        self
    }
}

/// Emitted whenever the effective response is more than `CONTINUE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionEvent {
    /// Session identifier
    pub session_id: String,
    /// Turn that triggered the event
    pub turn: u64,
    /// Recommended response
    pub response_level: ResponseLevel,
    /// Loop type behind the score, `NONE` if no loop
    pub loop_type: LoopType,
    /// Drift score
    pub overall_score: f64,
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
}

/// Outcome of [`AntiDriftSession::evaluate_turn`].
#[derive(Debug, Clone)]
pub struct TurnReport {
    /// Turn index
    pub turn: u64,
    /// Loop detector output
    pub loop_detection: LoopDetection,
    /// Drift scorer output
    pub assessment: DriftAssessment,
    /// Trend after recording this turn
    pub trend: DriftTrend,
    /// Response after trend escalation
    pub response_level: ResponseLevel,
    /// Budget after this step
    pub budget: BudgetState,
    /// Set when `response_level` is not `CONTINUE`
    pub event: Option<InterventionEvent>,
}

/// A finished task, as folded into the learned profiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTask {
    /// Task type key
    pub task_type: String,
    /// Steps recorded
    pub steps_used: u64,
    /// Tokens recorded
    pub tokens_used: u64,
    /// Progress reached, `[0, 1]`
    pub total_progress: f64,
}

#[derive(Debug)]
struct ActiveTask {
    task_type: String,
    started_at: DateTime<Utc>,
    accumulated_progress: f64,
}

/// Per-session anti-drift engine.
pub struct AntiDriftSession {
    session_id: String,
    config: AntiDriftConfig,
    loop_detector: LoopDetector,
    drift_scorer: DriftScorer,
    budget: BudgetController,
    active_task: Option<ActiveTask>,
}

impl AntiDriftSession {
    /// Create a session.
    ///
    /// # Errors
    ///
    /// Returns `AntiDriftError::InvalidConfig` if `config` fails validation.
    pub fn new(session_id: impl Into<String>, config: AntiDriftConfig) -> Result<Self, AntiDriftError> {
        config.validate()?;
        Ok(Self {
            session_id: session_id.into(),
            loop_detector: LoopDetector::new(config.loop_detection.clone()),
            drift_scorer: DriftScorer::new(config.drift.clone()),
            budget: BudgetController::new(config.budget.clone()),
            config,
            active_task: None,
        })
    }

    /// Replace the default state labeler used for oscillation analysis.
    #[must_use]
    pub fn with_labeler(mut self, labeler: Arc<dyn StateLabeler>) -> Self {
        self.loop_detector = LoopDetector::with_labeler(self.config.loop_detection.clone(), labeler);
        self
    }

    /// Seed learned task profiles, e.g. restored from storage or a shared pool.
    #[must_use]
    pub fn with_profiles(mut self, profiles: TaskProfileStore) -> Self {
        self.budget = BudgetController::new(self.config.budget.clone()).with_profiles(profiles);
        self
    }

    /// Begin a task, resetting the loop window and the budget ledger.
    ///
    /// The budget comes from this session's learned recommendation when the
    /// task type has history, otherwise from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AntiDriftError::TaskAlreadyActive` if a task is running.
    pub fn start_task(&mut self, task_type: &str) -> Result<BudgetState, AntiDriftError> {
        let recommendation = self.budget.get_task_budget_recommendation(task_type);
        self.start_task_with_recommendation(task_type, recommendation)
    }

    /// Begin a task budgeted by `recommendation`, e.g. one computed from a
    /// shared profile pool. Unlearned recommendations fall back to configuration.
    ///
    /// # Errors
    ///
    /// Returns `AntiDriftError::TaskAlreadyActive` if a task is running.
    pub fn start_task_with_recommendation(
        &mut self,
        task_type: &str,
        recommendation: BudgetRecommendation,
    ) -> Result<BudgetState, AntiDriftError> {
        if let Some(task) = &self.active_task {
            return Err(AntiDriftError::TaskAlreadyActive(task.task_type.clone()));
        }

        let (steps, tokens) = if recommendation.is_learned() {
            (recommendation.steps, recommendation.tokens)
        } else {
            (self.config.budget.initial_steps, self.config.budget.initial_tokens)
        };

        self.loop_detector.reset();
        self.budget.begin_task(steps, tokens);
        self.active_task = Some(ActiveTask {
            task_type: task_type.to_string(),
            started_at: Utc::now(),
            accumulated_progress: 0.0,
        });

        info!(
            session_id = %self.session_id,
            task_type,
            steps,
            tokens,
            learned = recommendation.is_learned(),
            "anti_drift: task started"
        );
        Ok(self.budget.get_status())
    }

    /// Run the full per-step control flow.
    ///
    /// # Errors
    ///
    /// Returns `AntiDriftError::TaskNotStarted` without an active task.
    pub fn evaluate_turn(&mut self, input: TurnInput) -> Result<TurnReport, AntiDriftError> {
        let Some(task) = self.active_task.as_mut() else {
            return Err(AntiDriftError::TaskNotStarted);
        };

        let turn = input.observation.turn;
        self.loop_detector.record(input.observation);
        let loop_detection = self.loop_detector.detect();

        let signals = DriftSignals {
            goal_dna_drift: input.goal_dna_drift.unwrap_or(0.0),
            loop_risk: loop_detection.loop_risk(),
            budget_velocity: input.budget_velocity.unwrap_or(0.0),
            quality_degradation: input.quality_degradation.unwrap_or(0.0),
            stuck_time: input.stuck_time.unwrap_or(0.0),
        };
        let assessment = self.drift_scorer.score(signals);
        self.drift_scorer.record_drift(turn, assessment.overall_score);
        let trend = self.drift_scorer.get_drift_trend(self.config.drift.trend_window);
        let response_level = self.drift_scorer.escalate(assessment.response_level, &trend);

        let budget = self
            .budget
            .record_step(turn, input.tokens_used, input.progress_delta);
        task.accumulated_progress =
            clamp_unit(task.accumulated_progress + clamp_signed(input.progress_delta));

        let event = (response_level != ResponseLevel::Continue).then(|| InterventionEvent {
            session_id: self.session_id.clone(),
            turn,
            response_level,
            loop_type: loop_detection.loop_type,
            overall_score: assessment.overall_score,
            timestamp: Utc::now(),
        });

        if let Some(event) = &event {
            warn!(
                session_id = %event.session_id,
                turn,
                response_level = %event.response_level,
                raw_level = %assessment.response_level,
                loop_type = ?event.loop_type,
                overall_score = event.overall_score,
                "anti_drift: intervention recommended"
            );
        } else {
            debug!(
                session_id = %self.session_id,
                turn,
                overall_score = assessment.overall_score,
                "anti_drift: turn evaluated"
            );
        }

        Ok(TurnReport {
            turn,
            loop_detection,
            assessment,
            trend,
            response_level,
            budget,
            event,
        })
    }

    /// Close the active task and fold it into the learned profiles.
    ///
    /// `total_progress` overrides the progress accumulated from step deltas.
    ///
    /// # Errors
    ///
    /// Returns `AntiDriftError::TaskNotStarted` without an active task.
    pub fn complete_task(&mut self, total_progress: Option<f64>) -> Result<CompletedTask, AntiDriftError> {
        let task = self.active_task.take().ok_or(AntiDriftError::TaskNotStarted)?;
        let completed = CompletedTask {
            steps_used: self.budget.steps_consumed(),
            tokens_used: self.budget.tokens_consumed(),
            total_progress: clamp_unit(total_progress.unwrap_or(task.accumulated_progress)),
            task_type: task.task_type,
        };

        self.budget.record_task_completion(
            &completed.task_type,
            completed.steps_used,
            completed.tokens_used,
            completed.total_progress,
        );

        let elapsed = Utc::now() - task.started_at;
        info!(
            session_id = %self.session_id,
            task_type = %completed.task_type,
            steps_used = completed.steps_used,
            tokens_used = completed.tokens_used,
            total_progress = completed.total_progress,
            elapsed_secs = elapsed.num_seconds(),
            "anti_drift: task completed"
        );
        Ok(completed)
    }

    /// Ask for budget beyond the per-step expansion rule.
    ///
    /// # Errors
    ///
    /// Returns `AntiDriftError::TaskNotStarted` without an active task.
    pub fn request_emergency_extension(
        &mut self,
        request: ExtensionRequest,
    ) -> Result<EmergencyExtension, AntiDriftError> {
        if self.active_task.is_none() {
            return Err(AntiDriftError::TaskNotStarted);
        }
        Ok(self.budget.request_emergency_extension(request))
    }

    /// Budget recommendation for `task_type` from this session's profiles.
    #[must_use]
    pub fn budget_recommendation(&self, task_type: &str) -> BudgetRecommendation {
        self.budget.get_task_budget_recommendation(task_type)
    }

    /// Session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Type of the running task, if any.
    #[must_use]
    pub fn active_task_type(&self) -> Option<&str> {
        self.active_task.as_ref().map(|task| task.task_type.as_str())
    }

    /// Loop detector.
    #[must_use]
    pub fn loop_detector(&self) -> &LoopDetector {
        &self.loop_detector
    }

    /// Drift scorer.
    #[must_use]
    pub fn drift_scorer(&self) -> &DriftScorer {
        &self.drift_scorer
    }

    /// Budget controller.
    #[must_use]
    pub fn budget(&self) -> &BudgetController {
        &self.budget
    }
}
