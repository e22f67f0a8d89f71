//! Name → constructor table for steppers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::liqss1::Liqss1Stepper;
use crate::qss1::Qss1Stepper;
use crate::qss2::Qss2FdStepper;
use crate::qss3::Qss3FdStepper;
use crate::stepper::QuantizedStepper;

/// Stepper used when nothing else is selected.
pub const DEFAULT_STEPPER: &str = "QSS1";

/// Builds a fresh, unbound stepper, or explains why it could not.
pub type StepperCtor =
    Arc<dyn Fn() -> Result<Box<dyn QuantizedStepper>, String> + Send + Sync>;

#[derive(Clone, Default)]
pub struct StepperRegistry {
    ctors: BTreeMap<String, StepperCtor>,
}

impl StepperRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding QSS1, QSS2Fd, QSS3Fd and LIQSS1.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("QSS1", Arc::new(|| Ok(Box::new(Qss1Stepper::new()) as Box<dyn QuantizedStepper>)));
        registry.register("QSS2Fd", Arc::new(|| Ok(Box::new(Qss2FdStepper::new()) as Box<dyn QuantizedStepper>)));
        registry.register("QSS3Fd", Arc::new(|| Ok(Box::new(Qss3FdStepper::new()) as Box<dyn QuantizedStepper>)));
        registry.register("LIQSS1", Arc::new(|| Ok(Box::new(Liqss1Stepper::new()) as Box<dyn QuantizedStepper>)));
        registry
    }

    /// Add or replace the constructor for `name`.
    pub fn register(&mut self, name: impl Into<String>, ctor: StepperCtor) {
        self.ctors.insert(name.into(), ctor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ctors.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.ctors.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&StepperCtor> {
        self.ctors.get(name)
    }
}

impl fmt::Debug for StepperRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepperRegistry")
            .field("names", &self.names())
            .finish()
    }
}
