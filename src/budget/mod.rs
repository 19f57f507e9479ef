//! Budget control subsystem.
//!
//! A per-session step/token ledger that expands under efficient progress,
//! contracts when progress stalls, learns per-task-type budgets from
//! completed tasks and grants bounded emergency extensions.

mod config;
mod controller;
mod profile;
mod types;

pub use config::BudgetConfig;
pub(crate) use controller::recommend;
pub use controller::BudgetController;
pub use profile::{RunningStats, TaskProfile, TaskProfileStore};
pub use types::{
    BudgetRecommendation, BudgetSnapshot, BudgetState, EmergencyExtension, ExtensionRequest,
    StepUsage,
};
