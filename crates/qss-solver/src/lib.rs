//! Quantized-state steppers.
//!
//! A stepper integrates `dx/dt = f(t, x, u)` by keeping, for every state, a
//! continuous model (the stepper's own estimate of the trajectory) and a
//! quantized model (the one it publishes). The quantized model is replaced
//! only when the continuous one drifts from it by more than one quantum.
//!
//! The [`QuantizedStepper`] trait is the contract drivers program against.
//! [`QssStepper`] implements it once on top of [`StepperCore`]; a [`Scheme`]
//! supplies the order-specific pieces (QSS1, QSS2, QSS3, LIQSS1).

pub mod derivative;
pub mod error;
pub mod liqss1;
pub mod qss1;
pub mod qss2;
pub mod qss3;
pub mod registry;
pub mod roots;
pub mod scheme;
pub mod stepper;

pub use derivative::{DerivativeError, DerivativeFunction, FnDerivative, LinearSystem};
pub use error::{SolverError, SolverResult};
pub use liqss1::{Liqss1, Liqss1Stepper};
pub use qss1::{Qss1, Qss1Stepper};
pub use qss2::{Qss2Fd, Qss2FdStepper};
pub use qss3::{Qss3Fd, Qss3FdStepper};
pub use registry::{DEFAULT_STEPPER, StepperCtor, StepperRegistry};
pub use scheme::Scheme;
pub use stepper::{QssStepper, QuantizedStepper, StepperCore};
