#![deny(missing_docs)]
//! Oxide Agent anti-drift control core.
//!
//! Observes every step an agent takes and turns it into three decisions:
//! whether the agent is looping, how far it has drifted from its objective,
//! and how much step/token budget it should still be allowed to spend.
//! The core only recommends; the hosting orchestrator acts.

/// Step/token budget ledger with historical task profiling.
pub mod budget;
/// Layered configuration loading.
pub mod config;
/// Multi-signal drift scoring and trend analysis.
pub mod drift;
/// Crate error type.
pub mod error;
/// Loop detection over a sliding window of step observations.
pub mod loop_detection;
/// Registry of concurrently running sessions.
pub mod registry;
/// Per-session orchestration of the three components.
pub mod session;
/// Numeric helpers.
pub mod utils;

pub use budget::{
    BudgetConfig, BudgetController, BudgetRecommendation, BudgetSnapshot, BudgetState,
    EmergencyExtension, ExtensionRequest, RunningStats, StepUsage, TaskProfile, TaskProfileStore,
};
pub use config::AntiDriftConfig;
pub use drift::{
    DriftAssessment, DriftHistoryEntry, DriftScorer, DriftScorerConfig, DriftSignals,
    DriftTrend, ResponseLevel, SignalContributions,
};
pub use error::AntiDriftError;
pub use loop_detection::{
    DefaultStateLabeler, LoopDetection, LoopDetectionConfig, LoopDetector, LoopType,
    StateLabeler, StepObservation, StrategyMatch,
};
pub use registry::SessionRegistry;
pub use session::{AntiDriftSession, CompletedTask, InterventionEvent, TurnInput, TurnReport};
