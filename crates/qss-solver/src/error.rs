//! Error types for stepper operations.

use qss_core::{CoreError, SimTime};
use thiserror::Error;

use crate::derivative::DerivativeError;

/// Errors raised by steppers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("No derivative function bound (needed by {operation})")]
    NotBound { operation: &'static str },

    #[error("{what} can only be set once")]
    AlreadyInitialized { what: &'static str },

    #[error("{what} has not been set")]
    NotInitialized { what: &'static str },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: String },

    #[error("Index out of bounds: {what} (index={index}, len={len})")]
    IndexOob {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Simulation time must advance (from {from} to {to})")]
    TimeMustAdvance { from: SimTime, to: SimTime },

    #[error("State model {index} is waiting to be quantized")]
    PendingQuantization { index: usize },

    #[error(transparent)]
    Derivative(#[from] DerivativeError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type SolverResult<T> = Result<T, SolverError>;
