//! The right-hand side `dx/dt = f(t, x, u)` seen by a stepper.

use nalgebra::{DMatrix, DVector};
use qss_core::SimTime;
use thiserror::Error;

use crate::error::{SolverError, SolverResult};

/// Failure reported by a derivative function.
///
/// `status` mirrors the integer status codes of model-exchange style
/// callbacks; zero is never used for a failure.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Derivative evaluation failed (status {status}): {message}")]
pub struct DerivativeError {
    pub status: i32,
    pub message: String,
}

impl DerivativeError {
    pub fn new(status: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unsupported(what: &str) -> Self {
        Self::new(-1, format!("{what} not provided"))
    }
}

/// Evaluates state derivatives for a stepper.
///
/// Takes `&mut self` so implementations can cache work between calls.
pub trait DerivativeFunction {
    fn state_count(&self) -> usize;

    fn input_count(&self) -> usize;

    /// Write `f(time, states, inputs)` into `out` (`out.len() == state_count`).
    fn evaluate_derivatives(
        &mut self,
        time: SimTime,
        states: &[f64],
        inputs: &[f64],
        out: &mut [f64],
    ) -> Result<(), DerivativeError>;

    fn provides_directional_derivatives(&self) -> bool {
        false
    }

    /// Write the total time derivative of `f` along the direction
    /// `(1, state_seed, input_seed)` in `(t, x, u)` space into `out`.
    fn evaluate_directional_derivatives(
        &mut self,
        _time: SimTime,
        _states: &[f64],
        _inputs: &[f64],
        _state_seed: &[f64],
        _input_seed: &[f64],
        _out: &mut [f64],
    ) -> Result<(), DerivativeError> {
        Err(DerivativeError::unsupported("directional derivatives"))
    }
}

/// Closure-backed derivative function.
pub struct FnDerivative<F> {
    states: usize,
    inputs: usize,
    f: F,
}

impl<F> FnDerivative<F>
where
    F: FnMut(SimTime, &[f64], &[f64], &mut [f64]) -> Result<(), DerivativeError>,
{
    pub fn new(states: usize, inputs: usize, f: F) -> Self {
        Self { states, inputs, f }
    }
}

impl<F> DerivativeFunction for FnDerivative<F>
where
    F: FnMut(SimTime, &[f64], &[f64], &mut [f64]) -> Result<(), DerivativeError>,
{
    fn state_count(&self) -> usize {
        self.states
    }

    fn input_count(&self) -> usize {
        self.inputs
    }

    fn evaluate_derivatives(
        &mut self,
        time: SimTime,
        states: &[f64],
        inputs: &[f64],
        out: &mut [f64],
    ) -> Result<(), DerivativeError> {
        (self.f)(time, states, inputs, out)
    }
}

/// Linear time-invariant system `dx/dt = A·x + B·u`.
#[derive(Clone, Debug)]
pub struct LinearSystem {
    a: DMatrix<f64>,
    b: DMatrix<f64>,
}

impl LinearSystem {
    /// `a` must be `n×n` with `n > 0`; `b` must be `n×m`.
    pub fn new(a: DMatrix<f64>, b: DMatrix<f64>) -> SolverResult<Self> {
        if a.nrows() == 0 || !a.is_square() {
            return Err(SolverError::InvalidArg {
                what: format!("A must be square and non-empty, got {}x{}", a.nrows(), a.ncols()),
            });
        }
        if b.nrows() != a.nrows() {
            return Err(SolverError::InvalidArg {
                what: format!("B must have {} rows, got {}", a.nrows(), b.nrows()),
            });
        }
        Ok(Self { a, b })
    }

    /// Autonomous system `dx/dt = A·x`.
    pub fn autonomous(a: DMatrix<f64>) -> SolverResult<Self> {
        let n = a.nrows();
        Self::new(a, DMatrix::zeros(n, 0))
    }

    fn apply(&self, x: &[f64], u: &[f64], out: &mut [f64]) {
        let x = DVector::from_column_slice(x);
        let u = DVector::from_column_slice(u);
        let dx = &self.a * x + &self.b * u;
        out.copy_from_slice(dx.as_slice());
    }
}

impl DerivativeFunction for LinearSystem {
    fn state_count(&self) -> usize {
        self.a.nrows()
    }

    fn input_count(&self) -> usize {
        self.b.ncols()
    }

    fn evaluate_derivatives(
        &mut self,
        _time: SimTime,
        states: &[f64],
        inputs: &[f64],
        out: &mut [f64],
    ) -> Result<(), DerivativeError> {
        self.apply(states, inputs, out);
        Ok(())
    }

    fn provides_directional_derivatives(&self) -> bool {
        true
    }

    fn evaluate_directional_derivatives(
        &mut self,
        _time: SimTime,
        _states: &[f64],
        _inputs: &[f64],
        state_seed: &[f64],
        input_seed: &[f64],
        out: &mut [f64],
    ) -> Result<(), DerivativeError> {
        self.apply(state_seed, input_seed, out);
        Ok(())
    }
}
