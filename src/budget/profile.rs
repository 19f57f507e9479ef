//! Historical task profiles.
//!
//! Each task type keeps Welford accumulators over completed tasks, so memory
//! stays bounded by the number of task types rather than task count.

use crate::error::AntiDriftError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Incremental mean/variance accumulator (Welford).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RunningStats {
    /// Samples seen
    pub count: u64,
    /// Running mean
    pub mean: f64,
    /// Sum of squared deviations from the mean
    pub m2: f64,
}

impl RunningStats {
    /// Fold one sample in.
    #[allow(clippy::cast_precision_loss)]
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Sample variance; zero below two samples.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// Sample standard deviation.
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Aggregates for one task type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProfile {
    /// Task type key
    pub task_type: String,
    /// Steps used per completed task
    pub steps_used: RunningStats,
    /// Tokens used per completed task
    pub tokens_used: RunningStats,
    /// Progress reached per completed task
    pub total_progress: RunningStats,
    /// Time of the last update
    pub updated_at: DateTime<Utc>,
}

impl TaskProfile {
    fn new(task_type: &str) -> Self {
        Self {
            task_type: task_type.to_string(),
            steps_used: RunningStats::default(),
            tokens_used: RunningStats::default(),
            total_progress: RunningStats::default(),
            updated_at: Utc::now(),
        }
    }

    /// Completed tasks folded into this profile.
    #[must_use]
    pub fn completed_tasks(&self) -> u64 {
        self.steps_used.count
    }
}

/// Task profiles keyed by task type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskProfileStore {
    profiles: BTreeMap<String, TaskProfile>,
}

impl TaskProfileStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one completed task into the profile for `task_type`.
    #[allow(clippy::cast_precision_loss)]
    pub fn record(&mut self, task_type: &str, steps_used: u64, tokens_used: u64, total_progress: f64) {
        let profile = self
            .profiles
            .entry(task_type.to_string())
            .or_insert_with(|| TaskProfile::new(task_type));
        profile.steps_used.push(steps_used as f64);
        profile.tokens_used.push(tokens_used as f64);
        profile.total_progress.push(crate::utils::clamp_unit(total_progress));
        profile.updated_at = Utc::now();
    }

    /// Profile for `task_type`, if any task of that type completed.
    #[must_use]
    pub fn get(&self, task_type: &str) -> Option<&TaskProfile> {
        self.profiles.get(task_type)
    }

    /// All profiles in task-type order.
    pub fn iter(&self) -> impl Iterator<Item = &TaskProfile> {
        self.profiles.values()
    }

    /// Number of task types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Whether no task has completed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns `AntiDriftError::Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String, AntiDriftError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON produced by [`to_json`](Self::to_json).
    ///
    /// # Errors
    ///
    /// Returns `AntiDriftError::Serialization` on malformed input.
    pub fn from_json(json: &str) -> Result<Self, AntiDriftError> {
        Ok(serde_json::from_str(json)?)
    }
}
