//! Per-state integrator driving a quantized-state stepper through the
//! scheduler's fire/postfire protocol.
//!
//! Each integrator solves `dx/dt = u` where `u` is its input. It emits a new
//! output only when the stepper publishes a new quantized model, and keeps
//! at most one firing request outstanding with the scheduler.

use qss_core::{ActorId, ModelPolynomial, SimTime, SmoothValue, Tolerance};
use qss_solver::{DerivativeError, DerivativeFunction, QuantizedStepper};
use tracing::{debug, warn};

use crate::error::{SimError, SimResult};
use crate::scheduler::Scheduler;

/// User-facing integrator parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegratorParams {
    pub initial_state: f64,
    /// Overrides the director's default tolerance.
    pub tolerance: Option<Tolerance>,
    /// Attach the state model's derivatives to published outputs.
    pub propagate_derivatives: bool,
}

impl Default for IntegratorParams {
    fn default() -> Self {
        Self {
            initial_state: 0.0,
            tolerance: None,
            propagate_derivatives: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    /// Initialized; the first postfire has not run yet.
    FirstRound,
    Steady,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegratorStats {
    pub outputs: u64,
    pub quantization_events: u64,
    pub rate_events: u64,
    pub refire_requests: u64,
    pub refire_cancellations: u64,
}

/// What to tell the scheduler after a new prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefirePlan {
    pub cancel: Option<SimTime>,
    pub request: Option<SimTime>,
}

/// Decide how to move from the `previous` firing request to `predicted`.
///
/// A previous request at or before `now` has already been consumed and
/// counts as no request. A live request is withdrawn if the prediction
/// moved. A new request is made whenever the prediction differs from the
/// live one and is finite, including a prediction at `now` itself.
pub fn plan_refire(previous: Option<SimTime>, predicted: SimTime, now: SimTime) -> RefirePlan {
    let live = previous.filter(|p| *p > now);
    let cancel = live.filter(|p| *p != predicted);
    let request =
        (live != Some(predicted) && !predicted.is_positive_infinite()).then_some(predicted);
    RefirePlan { cancel, request }
}

/// `dx/dt = u` for one state and one input.
#[derive(Debug, Default)]
struct InputRate;

impl DerivativeFunction for InputRate {
    fn state_count(&self) -> usize {
        1
    }

    fn input_count(&self) -> usize {
        1
    }

    fn evaluate_derivatives(
        &mut self,
        _time: SimTime,
        _states: &[f64],
        inputs: &[f64],
        out: &mut [f64],
    ) -> Result<(), DerivativeError> {
        out[0] = inputs[0];
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
        _state_seed: &[f64],
        input_seed: &[f64],
        out: &mut [f64],
    ) -> Result<(), DerivativeError> {
        out[0] = input_seed[0];
        Ok(())
    }
}

/// Seed an input model from a sample taken at `t`.
fn load_input(model: &mut ModelPolynomial, sample: &SmoothValue, t: SimTime) {
    model.set_from_derivatives(sample.value(), sample.derivatives().unwrap_or(&[]), t);
}

pub struct Integrator {
    id: ActorId,
    name: String,
    params: IntegratorParams,
    stepper: Option<Box<dyn QuantizedStepper>>,
    phase: Phase,
    last_request: Option<SimTime>,
    stats: IntegratorStats,
}

impl Integrator {
    pub fn new(id: ActorId, name: impl Into<String>, params: IntegratorParams) -> Self {
        Self {
            id,
            name: name.into(),
            params,
            stepper: None,
            phase: Phase::Uninitialized,
            last_request: None,
            stats: IntegratorStats::default(),
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &IntegratorParams {
        &self.params
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn stats(&self) -> IntegratorStats {
        self.stats
    }

    /// The firing currently requested from the scheduler, if any.
    pub fn pending_refire(&self) -> Option<SimTime> {
        self.last_request
    }

    pub fn stepper(&self) -> Option<&dyn QuantizedStepper> {
        self.stepper.as_deref()
    }

    /// The output never depends on the input within the same instant, so
    /// feedback loops through an integrator need no extra delay.
    pub fn output_depends_on_input(&self) -> bool {
        false
    }

    /// Build a fresh stepper and request the bootstrap firing at the
    /// current time.
    pub fn initialize(&mut self, sched: &mut dyn Scheduler) -> SimResult<()> {
        let director = sched
            .qss_director()
            .ok_or_else(|| SimError::UnsupportedScheduler {
                actor: self.name.clone(),
                scheduler: sched.name().to_string(),
            })?;
        let tolerance = match self.params.tolerance {
            Some(t) => Tolerance::new(t.absolute, t.relative).map_err(|err| {
                SimError::Configuration {
                    parameter: "tolerance",
                    value: format!("({}, {})", t.absolute, t.relative),
                    reason: err.to_string(),
                }
            })?,
            None => director.default_tolerance(),
        };
        let mut stepper = director.new_stepper()?;

        let now = sched.current_time();
        let stop = sched.model_stop_time();
        stepper
            .bind(Box::new(InputRate))
            .and_then(|()| stepper.set_simulation_time(now))
            .and_then(|()| stepper.set_event_time_ceiling(stop))
            .and_then(|()| stepper.set_state_value(0, self.params.initial_state))
            .and_then(|()| stepper.set_quantization_tolerance(0, tolerance))
            .map_err(SimError::integration(&self.name))?;

        self.stepper = Some(stepper);
        self.phase = Phase::FirstRound;
        self.last_request = None;
        self.stats = IntegratorStats::default();
        sched.fire_at(self.id, now)?;
        debug!(actor = %self.name, %now, ?tolerance, "initialized");
        Ok(())
    }

    /// Bring the stepper up to the current time and return the new output,
    /// if there is one.
    pub fn fire(&mut self, sched: &mut dyn Scheduler) -> SimResult<Option<SmoothValue>> {
        let now = sched.current_time();
        let first_round = self.phase == Phase::FirstRound;
        let stepper = attached(&mut self.stepper, &self.name)?;
        let cursor = stepper.current_simulation_time().unwrap_or(now);

        let mut quantized = 0;
        if cursor < now {
            stepper
                .step_to_time(now)
                .map_err(SimError::integration(&self.name))?;
            quantized = quantize_flagged(stepper, &self.name)?;
        } else if !first_round {
            // refired within the current instant
            let (due, states) = stepper.earliest_quantization_events();
            if due <= now {
                for index in states {
                    stepper
                        .trigger_quantization_event(index)
                        .map_err(SimError::integration(&self.name))?;
                    quantized += 1;
                }
            }
        }
        self.stats.quantization_events += quantized;

        if quantized == 0 && !first_round {
            return Ok(None);
        }
        let output = published(stepper, self.params.propagate_derivatives, &self.name)?;
        self.stats.outputs += 1;
        debug!(actor = %self.name, %now, value = output.value(), "output");
        Ok(Some(output))
    }

    /// Take the input sample of this instant, refresh rates and re-plan the
    /// next firing.
    pub fn postfire(
        &mut self,
        sched: &mut dyn Scheduler,
        input: Option<&SmoothValue>,
    ) -> SimResult<bool> {
        let now = sched.current_time();
        let input = input.filter(|sample| !sample.is_nil());
        let stepper = attached(&mut self.stepper, &self.name)?;

        if stepper.current_simulation_time().is_some_and(|cursor| cursor < now) {
            warn!(actor = %self.name, %now, "postfire without fire; catching up");
            stepper
                .step_to_time(now)
                .map_err(SimError::integration(&self.name))?;
            self.stats.quantization_events += quantize_flagged(stepper, &self.name)?;
        }

        match self.phase {
            Phase::Uninitialized => {
                return Err(SimError::NotInitialized {
                    actor: self.name.clone(),
                });
            }
            Phase::FirstRound => {
                let sample = input.cloned().unwrap_or(SmoothValue::ZERO);
                let mut model = ModelPolynomial::new(stepper.state_model_order());
                load_input(&mut model, &sample, now);
                stepper
                    .add_input_model(0, model)
                    .and_then(|()| stepper.validate())
                    .and_then(|()| stepper.trigger_quantization_event(0))
                    .and_then(|()| stepper.trigger_rate_event())
                    .map_err(SimError::integration(&self.name))?;
                self.stats.quantization_events += 1;
                self.stats.rate_events += 1;
                self.phase = Phase::Steady;
            }
            Phase::Steady => {
                if let Some(sample) = input {
                    if let Some(model) = stepper.input_model_mut(0) {
                        load_input(model, sample, now);
                    }
                }
                if stepper.need_rate_event() {
                    stepper
                        .trigger_rate_event()
                        .map_err(SimError::integration(&self.name))?;
                    self.stats.rate_events += 1;
                }
            }
        }

        let predicted = stepper.predict_quantization_event_time_earliest();
        self.apply_refire(sched, predicted, now)?;
        Ok(true)
    }

    fn apply_refire(
        &mut self,
        sched: &mut dyn Scheduler,
        predicted: SimTime,
        now: SimTime,
    ) -> SimResult<()> {
        // a request at or before now was consumed by this firing
        self.last_request = self.last_request.filter(|p| *p > now);
        let plan = plan_refire(self.last_request, predicted, now);
        if let Some(stale) = plan.cancel {
            sched.cancel_fire_at(self.id, stale);
            self.stats.refire_cancellations += 1;
            self.last_request = None;
            debug!(actor = %self.name, %stale, "cancelled refire");
        }
        if let Some(t) = plan.request {
            sched.fire_at(self.id, t)?;
            self.stats.refire_requests += 1;
            self.last_request = Some(t);
            debug!(actor = %self.name, %t, "requested refire");
        }
        Ok(())
    }
}

fn attached<'a>(
    stepper: &'a mut Option<Box<dyn QuantizedStepper>>,
    name: &str,
) -> SimResult<&'a mut (dyn QuantizedStepper + 'static)> {
    stepper.as_deref_mut().ok_or_else(|| SimError::NotInitialized {
        actor: name.to_string(),
    })
}

/// Quantize every flagged state; returns how many were quantized.
fn quantize_flagged(stepper: &mut dyn QuantizedStepper, name: &str) -> SimResult<u64> {
    let quantized = stepper
        .trigger_quantization_events(false)
        .map_err(SimError::integration(name))?;
    Ok(quantized.len() as u64)
}

fn published(
    stepper: &dyn QuantizedStepper,
    propagate_derivatives: bool,
    name: &str,
) -> SimResult<SmoothValue> {
    let model = stepper.state_model(0).ok_or_else(|| SimError::NotInitialized {
        actor: name.to_string(),
    })?;
    if propagate_derivatives && model.maximum_order() > 0 {
        let derivatives = model.derivatives_at(model.t_ref);
        return Ok(SmoothValue::with_derivatives(model.value(), derivatives));
    }
    Ok(SmoothValue::new(model.value()))
}
