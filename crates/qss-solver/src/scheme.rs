//! The order-specific half of a stepper.

use qss_core::{ModelPolynomial, SimTime};

use crate::error::SolverResult;
use crate::roots::min_positive_root;
use crate::stepper::StepperCore;

/// Plugs into [`QssStepper`](crate::QssStepper) to make a concrete stepper.
///
/// The core has already checked binding, indices and the time cursor before
/// any of these run.
pub trait Scheme: Default {
    const NAME: &'static str;
    const STATE_MODEL_ORDER: usize;

    /// Replace the quantized model of `index` at the cursor.
    fn quantize(&mut self, core: &mut StepperCore, index: usize) -> SolverResult<()>;

    /// Recompute every continuous model at the cursor.
    fn rate_event(&mut self, core: &mut StepperCore) -> SolverResult<()>;

    /// Seconds after `from` until state `index` leaves its quantum band.
    fn predict_dt(&self, core: &StepperCore, index: usize, from: SimTime) -> f64 {
        band_exit_dt(core.q_model(index), core.c_model(index), core.quantum(index), from)
    }
}

/// Time after `from` at which `|c - q|` first reaches `dq`.
///
/// Zero if the models are already a quantum apart, infinite if they never
/// separate.
pub fn band_exit_dt(q: &ModelPolynomial, c: &ModelPolynomial, dq: f64, from: SimTime) -> f64 {
    let mut c_at = c.clone();
    c_at.rebase(from);
    let mut q_at = q.clone();
    q_at.rebase(from);

    let mut error: Vec<f64> = c_at
        .coeffs
        .iter()
        .enumerate()
        .map(|(k, ck)| ck - q_at.coeffs.get(k).copied().unwrap_or(0.0))
        .collect();
    if error[0].abs() >= dq {
        return 0.0;
    }
    if error[1..].iter().all(|e| *e == 0.0) {
        return f64::INFINITY;
    }

    let mut lower = error.clone();
    lower[0] += dq;
    error[0] -= dq;
    min_positive_root(&error).min(min_positive_root(&lower))
}

/// Publish the continuous model of `index`, truncated to the quantized order.
pub fn quantize_from_continuous(core: &mut StepperCore, index: usize) -> SolverResult<()> {
    let t = core.current_time()?;
    core.c_model_mut(index).rebase(t);
    let continuous = core.c_model(index).coeffs.clone();
    let q = core.q_model_mut(index);
    let order = q.coeffs.len();
    q.coeffs.copy_from_slice(&continuous[..order]);
    q.t_ref = t;
    Ok(())
}

/// Step for finite differences of order `root` around `t`.
pub fn difference_step(t: SimTime, root: i32) -> f64 {
    f64::EPSILON.powf(1.0 / f64::from(root)) * t.seconds().abs().max(1.0)
}
