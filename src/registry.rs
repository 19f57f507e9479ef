//! Anti-drift session registry
//!
//! Holds one [`AntiDriftSession`] per running agent session and, optionally,
//! a task-profile pool shared between them. The pool is only written under
//! its write lock, so profile learning has a single writer at a time.

use crate::budget::{recommend, BudgetConfig, BudgetRecommendation, BudgetState, TaskProfileStore};
use crate::error::AntiDriftError;
use crate::session::{AntiDriftSession, CompletedTask};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Registry of concurrently running anti-drift sessions.
///
/// Generic over the session ID type so any transport key works.
pub struct SessionRegistry<Id: Hash + Eq + Clone + Send + Sync + std::fmt::Debug + 'static> {
    sessions: RwLock<HashMap<Id, Arc<Mutex<AntiDriftSession>>>>,
    profiles: RwLock<TaskProfileStore>,
    budget_config: BudgetConfig,
}

impl<Id: Hash + Eq + Clone + Send + Sync + std::fmt::Debug + 'static> SessionRegistry<Id> {
    /// Create an empty registry with an empty profile pool.
    #[must_use]
    pub fn new(budget_config: BudgetConfig) -> Self {
        Self::with_profiles(budget_config, TaskProfileStore::new())
    }

    /// Create a registry whose pool starts from `profiles`.
    #[must_use]
    pub fn with_profiles(budget_config: BudgetConfig, profiles: TaskProfileStore) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            profiles: RwLock::new(profiles),
            budget_config,
        }
    }

    /// Get an existing session or create one using `factory`.
    ///
    /// New sessions are seeded with the current profile pool.
    ///
    /// # Errors
    ///
    /// Propagates the factory's error.
    pub async fn get_or_create<F>(
        &self,
        id: Id,
        factory: F,
    ) -> Result<Arc<Mutex<AntiDriftSession>>, AntiDriftError>
    where
        F: FnOnce() -> Result<AntiDriftSession, AntiDriftError>,
    {
        if let Some(session) = self.get(&id).await {
            return Ok(session);
        }

        let seeded = factory()?.with_profiles(self.profiles_snapshot().await);

        let mut sessions = self.sessions.write().await;
        // Another task may have inserted while the factory ran.
        let session = sessions
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(seeded)))
            .clone();
        Ok(session)
    }

    /// Get session if exists
    pub async fn get(&self, id: &Id) -> Option<Arc<Mutex<AntiDriftSession>>> {
        let sessions = self.sessions.read().await;
        sessions.get(id).cloned()
    }

    /// Check if session exists
    pub async fn contains(&self, id: &Id) -> bool {
        let sessions = self.sessions.read().await;
        sessions.contains_key(id)
    }

    /// Remove a session
    pub async fn remove(&self, id: &Id) -> Option<Arc<Mutex<AntiDriftSession>>> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id)
    }

    /// Number of registered sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is registered
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Start a task on a registered session, budgeted from the shared pool.
    ///
    /// # Errors
    ///
    /// Returns `AntiDriftError::SessionNotFound` for an unknown session and
    /// `AntiDriftError::TaskAlreadyActive` if it is already running a task.
    pub async fn start_task(&self, id: &Id, task_type: &str) -> Result<BudgetState, AntiDriftError> {
        let Some(session) = self.get(id).await else {
            warn!(session = ?id, "No session found to start task");
            return Err(AntiDriftError::SessionNotFound(format!("{id:?}")));
        };

        let recommendation = self.budget_recommendation(task_type).await;
        let mut session = session.lock().await;
        session.start_task_with_recommendation(task_type, recommendation)
    }

    /// Complete the session's active task and fold it into the shared pool.
    ///
    /// # Errors
    ///
    /// Returns `AntiDriftError::SessionNotFound` for an unknown session and
    /// `AntiDriftError::TaskNotStarted` for one without an active task.
    pub async fn complete_task(
        &self,
        id: &Id,
        total_progress: Option<f64>,
    ) -> Result<CompletedTask, AntiDriftError> {
        let Some(session) = self.get(id).await else {
            warn!(session = ?id, "No session found to complete task");
            return Err(AntiDriftError::SessionNotFound(format!("{id:?}")));
        };

        let completed = {
            let mut session = session.lock().await;
            session.complete_task(total_progress)?
        };

        self.record_task_completion(&completed).await;
        Ok(completed)
    }

    /// Fold a completed task into the shared pool.
    pub async fn record_task_completion(&self, completed: &CompletedTask) {
        let mut profiles = self.profiles.write().await;
        profiles.record(
            &completed.task_type,
            completed.steps_used,
            completed.tokens_used,
            completed.total_progress,
        );
        info!(task_type = %completed.task_type, "Pooled task profile updated");
    }

    /// Copy of the shared pool, e.g. for persistence.
    pub async fn profiles_snapshot(&self) -> TaskProfileStore {
        self.profiles.read().await.clone()
    }

    /// Budget recommendation for `task_type` from the shared pool.
    pub async fn budget_recommendation(&self, task_type: &str) -> BudgetRecommendation {
        let profiles = self.profiles.read().await;
        recommend(&self.budget_config, &profiles, task_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AntiDriftConfig;
    use crate::loop_detection::StepObservation;
    use crate::session::TurnInput;

    fn factory(id: &'static str) -> impl FnOnce() -> Result<AntiDriftSession, AntiDriftError> {
        move || AntiDriftSession::new(id, AntiDriftConfig::default())
    }

    #[tokio::test]
    async fn get_or_create_reuses_sessions() -> Result<(), AntiDriftError> {
        let registry = SessionRegistry::<u64>::new(BudgetConfig::default());
        let first = registry.get_or_create(7, factory("a")).await?;
        let second = registry.get_or_create(7, factory("b")).await?;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().await.session_id(), "a");
        assert_eq!(registry.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn remove_drops_session() -> Result<(), AntiDriftError> {
        let registry = SessionRegistry::<String>::new(BudgetConfig::default());
        registry.get_or_create("s".to_string(), factory("s")).await?;
        assert!(registry.remove(&"s".to_string()).await.is_some());
        assert!(!registry.contains(&"s".to_string()).await);
        assert!(registry.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn completions_are_pooled_across_sessions() -> Result<(), AntiDriftError> {
        let registry = SessionRegistry::<u64>::new(BudgetConfig::default());

        for (id, steps) in [(1_u64, 10_u64), (2, 20)] {
            let session = registry.get_or_create(id, factory("pooled")).await?;
            {
                let mut session = session.lock().await;
                session.start_task("triage")?;
                for turn in 0..steps {
                    let observation =
                        StepObservation::new(turn, format!("inspect {turn}"), "ok").with_progress(0.0);
                    session.evaluate_turn(TurnInput::new(observation, 100, 0.05))?;
                }
            }
            registry.complete_task(&id, Some(1.0)).await?;
        }

        let recommendation = registry.budget_recommendation("triage").await;
        assert_eq!(recommendation.samples, 2);
        assert_eq!(recommendation.steps, 18);

        // A session created now starts from the pooled history.
        let late = registry.get_or_create(3, factory("late")).await?;
        let status = late.lock().await.start_task("triage")?;
        assert_eq!(status.steps_remaining, 18);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_session_fails() {
        let registry = SessionRegistry::<u64>::new(BudgetConfig::default());
        assert!(matches!(
            registry.complete_task(&42, None).await,
            Err(AntiDriftError::SessionNotFound(id)) if id == "42"
        ));
        assert!(matches!(
            registry.start_task(&42, "triage").await,
            Err(AntiDriftError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn existing_session_sees_pooled_completion() -> Result<(), AntiDriftError> {
        let registry = SessionRegistry::<u64>::new(BudgetConfig::default());
        let worker = registry.get_or_create(1, factory("worker")).await?;
        registry.get_or_create(2, factory("idle")).await?;

        registry.start_task(&1, "triage").await?;
        {
            let mut worker = worker.lock().await;
            for turn in 0..10 {
                let observation = StepObservation::new(turn, format!("inspect {turn}"), "ok");
                worker.evaluate_turn(TurnInput::new(observation, 100, 0.05))?;
            }
        }
        registry.complete_task(&1, Some(1.0)).await?;

        // Session 2 existed before the completion was pooled.
        let status = registry.start_task(&2, "triage").await?;
        assert_eq!(status.steps_remaining, 12);
        assert_eq!(status.tokens_remaining, 1_200);
        Ok(())
    }
}
