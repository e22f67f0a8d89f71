//! Error types for the integration engine.

use qss_core::{ActorId, CoreError, SimTime};
use qss_solver::SolverError;
use thiserror::Error;

/// Errors raised while configuring or running integrators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("Invalid {parameter} = {value}: {reason}")]
    Configuration {
        parameter: &'static str,
        value: String,
        reason: String,
    },

    #[error("Stepper `{name}` not found (available: {})", available.join(", "))]
    StepperNotFound { name: String, available: Vec<String> },

    #[error("Stepper `{name}` could not be constructed: {message}")]
    StepperConstruction { name: String, message: String },

    #[error("{actor} requires a QSS director, but the scheduler is `{scheduler}`")]
    UnsupportedScheduler { actor: String, scheduler: String },

    #[error("Integration failed in {actor}: {source}")]
    Integration {
        actor: String,
        #[source]
        source: SolverError,
    },

    #[error("{actor} has not been initialized")]
    NotInitialized { actor: String },

    #[error("Firing of {actor} requested at {requested}, before the current time {now}")]
    FireInPast {
        actor: ActorId,
        requested: SimTime,
        now: SimTime,
    },

    #[error("Unknown actor: {name}")]
    UnknownActor { name: String },

    #[error("Run exceeded {limit} firings")]
    FiringLimit { limit: u64 },

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    pub(crate) fn integration(actor: &str) -> impl FnOnce(SolverError) -> SimError + '_ {
        move |source| SimError::Integration {
            actor: actor.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_lists_alternatives() {
        let err = SimError::StepperNotFound {
            name: "QSS9".into(),
            available: vec!["QSS1".into(), "QSS2Fd".into()],
        };
        assert_eq!(
            err.to_string(),
            "Stepper `QSS9` not found (available: QSS1, QSS2Fd)"
        );
    }

    #[test]
    fn integration_keeps_solver_source() {
        use std::error::Error;
        let err = SimError::integration("x")(SolverError::Validation {
            message: "need initial value for state 0".into(),
        });
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("Integration failed in x"));
    }
}
