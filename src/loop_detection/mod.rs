//! Loop detection subsystem for agent execution.
//!
//! Four independent strategies run over a bounded window of recent steps;
//! the coordinating [`LoopDetector`] reports the strongest match.

mod config;
mod dead_end_detector;
mod detector;
mod exact_detector;
mod labeler;
mod oscillation_detector;
mod semantic_detector;
mod types;

pub use config::LoopDetectionConfig;
pub use detector::LoopDetector;
pub use labeler::{DefaultStateLabeler, StateLabeler};
pub use types::{LoopDetection, LoopType, StepObservation, StrategyMatch};
