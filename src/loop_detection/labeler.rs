//! State labeling for oscillation analysis.

use super::types::{StepObservation, PROGRESS_KEY};
use sha2::{Digest, Sha256};

const LABEL_KEYS: [&str; 4] = ["phase", "status", "state", "mode"];
const FINGERPRINT_LEN: usize = 12;

/// Derives a cheap categorical label from a step's state snapshot.
///
/// Implemented for any `Fn(&StepObservation) -> String`, so callers can pass a
/// closure instead of a dedicated type.
#[cfg_attr(test, mockall::automock)]
pub trait StateLabeler: Send + Sync {
    /// Label for `observation`. Equal labels mean "same state".
    fn label(&self, observation: &StepObservation) -> String;
}

impl<F> StateLabeler for F
where
    F: Fn(&StepObservation) -> String + Send + Sync,
{
    fn label(&self, observation: &StepObservation) -> String {
        self(observation)
    }
}

/// Default labeler.
///
/// Uses the first string value found under `phase`, `status`, `state` or
/// `mode`. Snapshots without any of those are labeled by a short SHA-256
/// fingerprint of every field except `progress`, so a steadily advancing
/// progress counter alone never produces a new label.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStateLabeler;

impl StateLabeler for DefaultStateLabeler {
    fn label(&self, observation: &StepObservation) -> String {
        if let Some(label) = LABEL_KEYS
            .iter()
            .find_map(|key| observation.state.get(*key).and_then(|value| value.as_str()))
        {
            return label.to_string();
        }

        let mut hasher = Sha256::new();
        for (key, value) in &observation.state {
            if key == PROGRESS_KEY {
                continue;
            }
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.to_string().as_bytes());
            hasher.update(b";");
        }
        let digest = format!("{:x}", hasher.finalize());
        digest[..FINGERPRINT_LEN].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_phase_field() {
        let step = StepObservation::new(1, "a", "b")
            .with_field("status", "running")
            .with_field("phase", "search");
        assert_eq!(DefaultStateLabeler.label(&step), "search");
    }

    #[test]
    fn fingerprint_ignores_progress() {
        let a = StepObservation::new(1, "a", "b")
            .with_field("file", "main.rs")
            .with_progress(0.1);
        let b = StepObservation::new(2, "c", "d")
            .with_field("file", "main.rs")
            .with_progress(0.9);
        let c = StepObservation::new(3, "c", "d").with_field("file", "lib.rs");
        assert_eq!(DefaultStateLabeler.label(&a), DefaultStateLabeler.label(&b));
        assert_ne!(DefaultStateLabeler.label(&a), DefaultStateLabeler.label(&c));
        assert_eq!(DefaultStateLabeler.label(&c).len(), 12);
    }

    #[test]
    fn closures_are_labelers() {
        let labeler = |step: &StepObservation| step.action.clone();
        assert_eq!(labeler.label(&StepObservation::new(1, "open", "")), "open");
    }
}
