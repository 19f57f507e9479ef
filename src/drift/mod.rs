//! Drift scoring subsystem.
//!
//! Fuses five scalar signals into one weighted score, maps it to a graduated
//! response and keeps a per-session score history for trend analysis.

mod config;
mod scorer;
mod trend;
mod types;

pub use config::DriftScorerConfig;
pub use scorer::DriftScorer;
pub use types::{
    DriftAssessment, DriftHistoryEntry, DriftSignals, DriftTrend, ResponseLevel,
    SignalContributions,
};
