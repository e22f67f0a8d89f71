//! Run-wide QSS configuration and the stepper factory.

use qss_core::{DEFAULT_ERROR_TOLERANCE, SimTime, Tolerance};
use qss_solver::{DEFAULT_STEPPER, QuantizedStepper, StepperCtor, StepperRegistry};
use tracing::debug;

use crate::error::{SimError, SimResult};

/// Holds the default error tolerance and the selected stepper kind, and
/// builds steppers for integrators.
///
/// Stepper names are checked when a stepper is built, not when selected.
#[derive(Debug, Clone)]
pub struct QssDirector {
    error_tolerance: f64,
    stepper_kind: String,
    registry: StepperRegistry,
    start_time: SimTime,
    stop_time: SimTime,
}

impl Default for QssDirector {
    fn default() -> Self {
        Self::new()
    }
}

impl QssDirector {
    pub fn new() -> Self {
        Self::with_registry(StepperRegistry::with_builtin())
    }

    pub fn with_registry(registry: StepperRegistry) -> Self {
        Self {
            error_tolerance: DEFAULT_ERROR_TOLERANCE,
            stepper_kind: DEFAULT_STEPPER.to_string(),
            registry,
            start_time: SimTime::ZERO,
            stop_time: SimTime::POSITIVE_INFINITY,
        }
    }

    /// Set the default quantization tolerance. On error the previous value
    /// is kept.
    pub fn set_error_tolerance(&mut self, value: f64) -> SimResult<()> {
        if !value.is_finite() || value < 0.0 {
            return Err(SimError::Configuration {
                parameter: "error_tolerance",
                value: value.to_string(),
                reason: "must be a finite value >= 0".to_string(),
            });
        }
        self.error_tolerance = value;
        Ok(())
    }

    pub fn error_tolerance(&self) -> f64 {
        self.error_tolerance
    }

    /// The tolerance integrators use when they have no override: the
    /// error tolerance as both absolute and relative part.
    pub fn default_tolerance(&self) -> Tolerance {
        Tolerance {
            absolute: self.error_tolerance,
            relative: self.error_tolerance,
        }
    }

    pub fn select_stepper_kind(&mut self, name: impl Into<String>) {
        self.stepper_kind = name.into();
    }

    pub fn stepper_kind(&self) -> &str {
        &self.stepper_kind
    }

    pub fn register_stepper(&mut self, name: impl Into<String>, ctor: StepperCtor) {
        self.registry.register(name, ctor);
    }

    pub fn available_steppers(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Build a fresh stepper of the selected kind.
    pub fn new_stepper(&self) -> SimResult<Box<dyn QuantizedStepper>> {
        let name = self.stepper_kind.as_str();
        let ctor = self
            .registry
            .get(name)
            .ok_or_else(|| SimError::StepperNotFound {
                name: name.to_string(),
                available: self.registry.names(),
            })?;
        let stepper = ctor().map_err(|message| SimError::StepperConstruction {
            name: name.to_string(),
            message,
        })?;
        debug!(stepper = name, "constructed stepper");
        Ok(stepper)
    }

    pub fn start_time(&self) -> SimTime {
        self.start_time
    }

    pub fn stop_time(&self) -> SimTime {
        self.stop_time
    }

    /// Set the run window. `stop` may be `POSITIVE_INFINITY`.
    pub fn set_time_window(&mut self, start: SimTime, stop: SimTime) -> SimResult<()> {
        if start.is_positive_infinite() {
            return Err(SimError::Configuration {
                parameter: "start_time",
                value: start.to_string(),
                reason: "must be finite".to_string(),
            });
        }
        if stop < start {
            return Err(SimError::Configuration {
                parameter: "stop_time",
                value: stop.to_string(),
                reason: format!("must not be before start_time {start}"),
            });
        }
        self.start_time = start;
        self.stop_time = stop;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn defaults() {
        let director = QssDirector::new();
        assert_eq!(director.error_tolerance(), 1e-4);
        assert_eq!(director.stepper_kind(), "QSS1");
        assert_eq!(director.stop_time(), SimTime::POSITIVE_INFINITY);
    }

    #[test]
    fn negative_tolerance_keeps_previous_value() {
        let mut director = QssDirector::new();
        director.set_error_tolerance(1e-3).unwrap();
        let err = director.set_error_tolerance(-1.0).unwrap_err();
        assert!(matches!(
            err,
            SimError::Configuration {
                parameter: "error_tolerance",
                ..
            }
        ));
        assert_eq!(director.error_tolerance(), 1e-3);
    }

    #[test]
    fn zero_tolerance_is_accepted() {
        let mut director = QssDirector::new();
        director.set_error_tolerance(0.0).unwrap();
        assert_eq!(director.default_tolerance().quantum(5.0), qss_core::MIN_QUANTUM);
    }

    #[test]
    fn unknown_kind_fails_only_when_building() {
        let mut director = QssDirector::new();
        director.select_stepper_kind("QSS9");
        assert_eq!(director.stepper_kind(), "QSS9");
        match director.new_stepper() {
            Err(SimError::StepperNotFound { name, available }) => {
                assert_eq!(name, "QSS9");
                assert!(available.contains(&"QSS1".to_string()));
            }
            other => panic!("unexpected: {:?}", other.map(|s| s.name())),
        }
    }

    #[test]
    fn refusing_ctor_surfaces_as_construction_error() {
        let mut director = QssDirector::new();
        director.register_stepper("Broken", Arc::new(|| Err("no licence".to_string())));
        director.select_stepper_kind("Broken");
        let err = director.new_stepper().err().unwrap();
        assert_eq!(
            err,
            SimError::StepperConstruction {
                name: "Broken".into(),
                message: "no licence".into()
            }
        );
    }

    #[test]
    fn each_call_builds_a_new_stepper() {
        let director = QssDirector::new();
        let a = director.new_stepper().unwrap();
        let b = director.new_stepper().unwrap();
        assert_eq!(a.name(), b.name());
        assert!(a.current_simulation_time().is_none());
    }

    #[test]
    fn stop_before_start_is_rejected() {
        let mut director = QssDirector::new();
        let err = director
            .set_time_window(SimTime::new(2.0).unwrap(), SimTime::new(1.0).unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("stop_time"));
    }
}
