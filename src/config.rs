//! Configuration and settings management
//!
//! Every component has a flat settings struct whose keys carry a component
//! prefix (`loop_`, `drift_`, `budget_`). Values are layered from built-in
//! defaults, optional config files and environment variables.

use crate::budget::BudgetConfig;
use crate::drift::DriftScorerConfig;
use crate::error::AntiDriftError;
use crate::loop_detection::LoopDetectionConfig;
use config::{Config, ConfigError, Environment, File};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Settings for all three anti-drift components.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AntiDriftConfig {
    /// Loop detector settings
    pub loop_detection: LoopDetectionConfig,
    /// Drift scorer settings
    pub drift: DriftScorerConfig,
    /// Budget controller settings
    pub budget: BudgetConfig,
}

impl AntiDriftConfig {
    /// Load every component's settings from config files and environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            loop_detection: LoopDetectionConfig::from_env(),
            drift: DriftScorerConfig::from_env(),
            budget: BudgetConfig::from_env(),
        }
    }

    /// Reject settings no component can operate with.
    ///
    /// # Errors
    ///
    /// Returns `AntiDriftError::InvalidConfig` naming the first offending key.
    pub fn validate(&self) -> Result<(), AntiDriftError> {
        self.loop_detection.validate()?;
        self.drift.validate()?;
        self.budget.validate()
    }
}

/// Layer `defaults` under `config/default`, `config/{RUN_MODE}`,
/// `config/local` and the process environment, in that priority order.
///
/// Falls back to `defaults` with a warning when any layer fails to load.
pub(crate) fn load_layered<T>(defaults: T, component: &'static str) -> T
where
    T: Serialize + DeserializeOwned,
{
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

    let config = Config::try_from(&defaults).and_then(|base| {
        Config::builder()
            .add_source(base)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::default().ignore_empty(true))
            .build()
    });

    match config.and_then(Config::try_deserialize) {
        Ok(settings) => settings,
        Err(err) => warn_and_default(err, component, defaults),
    }
}

fn warn_and_default<T>(err: ConfigError, component: &'static str, defaults: T) -> T {
    warn!(error = %err, component, "Failed to load anti-drift config, using defaults");
    defaults
}

pub(crate) fn invalid(key: &str, reason: &str) -> AntiDriftError {
    AntiDriftError::InvalidConfig(format!("{key}: {reason}"))
}
