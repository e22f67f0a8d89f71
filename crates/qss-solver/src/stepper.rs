//! The stepper contract and the bookkeeping shared by every scheme.

use qss_core::{ModelPolynomial, SimTime, Tolerance, ensure_finite};
use tracing::trace;

use crate::derivative::DerivativeFunction;
use crate::error::{SolverError, SolverResult};
use crate::scheme::Scheme;

/// Tolerance a state has until one is configured.
pub const DEFAULT_STATE_TOLERANCE: Tolerance = Tolerance {
    absolute: 1e-20,
    relative: 1e-16,
};

/// What a driver may do with a quantized-state stepper.
///
/// Configuration order: [`bind`](Self::bind), then the time cursor, ceiling,
/// initial values, tolerances and input models, then [`validate`](Self::validate)
/// exactly once before the first step.
pub trait QuantizedStepper {
    /// Registry name of the scheme, e.g. `"QSS1"`.
    fn name(&self) -> &'static str;

    /// Maximum order of the published (quantized) state models.
    fn state_model_order(&self) -> usize;

    fn bind(&mut self, function: Box<dyn DerivativeFunction>) -> SolverResult<()>;

    fn state_count(&self) -> usize;

    fn input_count(&self) -> usize;

    /// Seed the time cursor. Can only be done once.
    fn set_simulation_time(&mut self, t0: SimTime) -> SolverResult<()>;

    /// Predicted events later than `t_max` are reported as never happening.
    fn set_event_time_ceiling(&mut self, t_max: SimTime) -> SolverResult<()>;

    fn set_state_value(&mut self, index: usize, value: f64) -> SolverResult<()>;

    fn set_quantization_tolerance(&mut self, index: usize, tolerance: Tolerance)
    -> SolverResult<()>;

    /// Hand over the model the stepper reads for input `index`.
    fn add_input_model(&mut self, index: usize, model: ModelPolynomial) -> SolverResult<()>;

    /// Writable access to an input model. Marks a rate event as needed.
    fn input_model_mut(&mut self, index: usize) -> Option<&mut ModelPolynomial>;

    fn validate(&self) -> SolverResult<()>;

    /// Integrate from the cursor to `t`, flagging states that need a
    /// quantization event at `t`.
    fn step_to_time(&mut self, t: SimTime) -> SolverResult<()>;

    fn need_quantization_event_index(&self) -> Option<usize>;

    /// Every state currently flagged for a quantization event, ascending.
    fn need_quantization_event_indexes(&self) -> Vec<usize>;

    /// Publish a fresh model for `index` at the cursor and clear its flag.
    fn trigger_quantization_event(&mut self, index: usize) -> SolverResult<()>;

    fn need_rate_event(&self) -> bool;

    /// Recompute the continuous models after inputs or quantized states changed.
    fn trigger_rate_event(&mut self) -> SolverResult<()>;

    fn predict_quantization_event_time(&mut self, index: usize) -> SolverResult<SimTime>;

    /// Earliest predicted event over all states, or `POSITIVE_INFINITY`.
    fn predict_quantization_event_time_earliest(&mut self) -> SimTime;

    /// Earliest predicted event together with the states predicted to need
    /// it. The list is empty when no event is predicted.
    fn earliest_quantization_events(&mut self) -> (SimTime, Vec<usize>) {
        let earliest = self.predict_quantization_event_time_earliest();
        if earliest.is_positive_infinite() {
            return (earliest, Vec::new());
        }
        let states = (0..self.state_count())
            .filter(|&index| {
                self.predict_quantization_event_time(index)
                    .is_ok_and(|t| t == earliest)
            })
            .collect();
        (earliest, states)
    }

    /// Quantize every flagged state, or every state with `force_all`.
    /// Returns the quantized indices in order.
    fn trigger_quantization_events(&mut self, force_all: bool) -> SolverResult<Vec<usize>> {
        let indexes: Vec<usize> = if force_all {
            (0..self.state_count()).collect()
        } else {
            self.need_quantization_event_indexes()
        };
        for &index in &indexes {
            self.trigger_quantization_event(index)?;
        }
        Ok(indexes)
    }

    fn state_model(&self, index: usize) -> Option<&ModelPolynomial>;

    fn continuous_state_model(&self, index: usize) -> Option<&ModelPolynomial>;

    fn quantum(&self, index: usize) -> Option<f64>;

    fn current_simulation_time(&self) -> Option<SimTime>;

    /// Step to `t`, quantize every flagged state and refresh the rates.
    /// Returns the quantized indices in order.
    fn advance_to_time(&mut self, t: SimTime) -> SolverResult<Vec<usize>> {
        let predicted = self.predict_quantization_event_time_earliest();
        if t > predicted {
            return Err(SolverError::InvalidArg {
                what: format!("proposed time {t} is past the next event time {predicted}"),
            });
        }
        self.step_to_time(t)?;
        let quantized = self.trigger_quantization_events(false)?;
        if self.need_rate_event() {
            self.trigger_rate_event()?;
        }
        Ok(quantized)
    }

    fn evaluate_state_model(&self, index: usize, t: SimTime) -> Option<f64> {
        self.state_model(index).map(|m| m.evaluate(t))
    }

    fn evaluate_state_model_continuous(&self, index: usize, t: SimTime) -> Option<f64> {
        self.continuous_state_model(index).map(|m| m.evaluate(t))
    }
}

/// Per-state models, flags and caches shared by all schemes.
pub struct StepperCore {
    function: Option<Box<dyn DerivativeFunction>>,
    state_model_order: usize,
    q_models: Vec<ModelPolynomial>,
    c_models: Vec<ModelPolynomial>,
    seeded: Vec<bool>,
    input_models: Vec<Option<ModelPolynomial>>,
    tolerances: Vec<Tolerance>,
    quanta: Vec<f64>,
    need_quant: Vec<bool>,
    need_rate: bool,
    predicted: Vec<Option<SimTime>>,
    current: Option<SimTime>,
    ceiling: SimTime,
}

impl StepperCore {
    pub fn new(state_model_order: usize) -> Self {
        Self {
            function: None,
            state_model_order,
            q_models: Vec::new(),
            c_models: Vec::new(),
            seeded: Vec::new(),
            input_models: Vec::new(),
            tolerances: Vec::new(),
            quanta: Vec::new(),
            need_quant: Vec::new(),
            need_rate: true,
            predicted: Vec::new(),
            current: None,
            ceiling: SimTime::POSITIVE_INFINITY,
        }
    }

    pub fn state_count(&self) -> usize {
        self.q_models.len()
    }

    pub fn input_count(&self) -> usize {
        self.input_models.len()
    }

    pub fn current_time(&self) -> SolverResult<SimTime> {
        self.current.ok_or(SolverError::NotInitialized {
            what: "simulation time",
        })
    }

    pub fn q_model(&self, index: usize) -> &ModelPolynomial {
        &self.q_models[index]
    }

    pub fn q_model_mut(&mut self, index: usize) -> &mut ModelPolynomial {
        &mut self.q_models[index]
    }

    pub fn c_model(&self, index: usize) -> &ModelPolynomial {
        &self.c_models[index]
    }

    pub fn c_model_mut(&mut self, index: usize) -> &mut ModelPolynomial {
        &mut self.c_models[index]
    }

    pub fn tolerance(&self, index: usize) -> Tolerance {
        self.tolerances[index]
    }

    pub fn quantum(&self, index: usize) -> f64 {
        self.quanta[index]
    }

    /// Re-reference every continuous model at `t`.
    pub fn rebase_continuous(&mut self, t: SimTime) {
        for model in &mut self.c_models {
            model.rebase(t);
        }
    }

    pub fn quantized_states_at(&self, t: SimTime) -> Vec<f64> {
        self.q_models.iter().map(|m| m.evaluate(t)).collect()
    }

    pub fn quantized_slopes_at(&self, t: SimTime) -> Vec<f64> {
        self.q_models
            .iter()
            .map(|m| m.evaluate_derivative(t, 1))
            .collect()
    }

    pub fn inputs_at(&self, t: SimTime) -> Vec<f64> {
        self.input_models
            .iter()
            .map(|m| m.as_ref().map_or(0.0, |m| m.evaluate(t)))
            .collect()
    }

    pub fn input_slopes_at(&self, t: SimTime) -> Vec<f64> {
        self.input_models
            .iter()
            .map(|m| m.as_ref().map_or(0.0, |m| m.evaluate_derivative(t, 1)))
            .collect()
    }

    /// `f(t, states, inputs)`.
    pub fn evaluate(&mut self, t: SimTime, states: &[f64], inputs: &[f64]) -> SolverResult<Vec<f64>> {
        let mut out = vec![0.0; self.state_count()];
        let function = self.function.as_mut().ok_or(SolverError::NotBound {
            operation: "evaluate_derivatives",
        })?;
        function.evaluate_derivatives(t, states, inputs, &mut out)?;
        Ok(out)
    }

    /// `f` along the quantized states and input models at `t`.
    pub fn evaluate_along_models(&mut self, t: SimTime) -> SolverResult<Vec<f64>> {
        let states = self.quantized_states_at(t);
        let inputs = self.inputs_at(t);
        self.evaluate(t, &states, &inputs)
    }

    /// Total time derivative of `f` along the models at `t`, if the bound
    /// function can provide it.
    pub fn directional_along_models(&mut self, t: SimTime) -> SolverResult<Option<Vec<f64>>> {
        let provides = self
            .function
            .as_ref()
            .is_some_and(|f| f.provides_directional_derivatives());
        if !provides {
            return Ok(None);
        }
        let states = self.quantized_states_at(t);
        let inputs = self.inputs_at(t);
        let state_seed = self.quantized_slopes_at(t);
        let input_seed = self.input_slopes_at(t);
        let mut out = vec![0.0; self.state_count()];
        let function = self.function.as_mut().ok_or(SolverError::NotBound {
            operation: "evaluate_directional_derivatives",
        })?;
        function.evaluate_directional_derivatives(
            t,
            &states,
            &inputs,
            &state_seed,
            &input_seed,
            &mut out,
        )?;
        Ok(Some(out))
    }

    fn require_bound(&self, operation: &'static str) -> SolverResult<()> {
        if self.function.is_none() {
            return Err(SolverError::NotBound { operation });
        }
        Ok(())
    }

    fn check_state(&self, index: usize) -> SolverResult<()> {
        if index >= self.state_count() {
            return Err(SolverError::IndexOob {
                what: "state",
                index,
                len: self.state_count(),
            });
        }
        Ok(())
    }

    fn invalidate_predictions(&mut self) {
        self.predicted.fill(None);
    }
}

/// A stepper made of the shared core plus one scheme.
pub struct QssStepper<S> {
    core: StepperCore,
    scheme: S,
}

impl<S: Scheme> QssStepper<S> {
    pub fn new() -> Self {
        Self {
            core: StepperCore::new(S::STATE_MODEL_ORDER),
            scheme: S::default(),
        }
    }

    pub fn core(&self) -> &StepperCore {
        &self.core
    }

    fn predict(&mut self, index: usize) -> SimTime {
        if let Some(t) = self.core.predicted[index] {
            return t;
        }
        let predicted = match self.core.current {
            None => SimTime::POSITIVE_INFINITY,
            Some(from) => {
                let dt = self.scheme.predict_dt(&self.core, index, from);
                if dt.is_nan() || dt == f64::INFINITY {
                    SimTime::POSITIVE_INFINITY
                } else {
                    from.add_secs(dt.max(0.0))
                }
            }
        };
        let predicted = if predicted > self.core.ceiling {
            SimTime::POSITIVE_INFINITY
        } else {
            predicted
        };
        self.core.predicted[index] = Some(predicted);
        predicted
    }
}

impl<S: Scheme> Default for QssStepper<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Scheme> QuantizedStepper for QssStepper<S> {
    fn name(&self) -> &'static str {
        S::NAME
    }

    fn state_model_order(&self) -> usize {
        self.core.state_model_order
    }

    fn bind(&mut self, function: Box<dyn DerivativeFunction>) -> SolverResult<()> {
        if self.core.function.is_some() {
            return Err(SolverError::AlreadyInitialized {
                what: "derivative function",
            });
        }
        let states = function.state_count();
        let inputs = function.input_count();
        if states == 0 {
            return Err(SolverError::InvalidArg {
                what: "derivative function must have at least one state".to_string(),
            });
        }
        let order = self.core.state_model_order;
        let core = &mut self.core;
        core.q_models = vec![ModelPolynomial::new(order); states];
        core.c_models = vec![ModelPolynomial::new(order + 1); states];
        core.seeded = vec![false; states];
        core.input_models = vec![None; inputs];
        core.tolerances = vec![DEFAULT_STATE_TOLERANCE; states];
        core.quanta = vec![DEFAULT_STATE_TOLERANCE.quantum(0.0); states];
        core.need_quant = vec![true; states];
        core.need_rate = true;
        core.predicted = vec![None; states];
        core.function = Some(function);
        Ok(())
    }

    fn state_count(&self) -> usize {
        self.core.state_count()
    }

    fn input_count(&self) -> usize {
        self.core.input_count()
    }

    fn set_simulation_time(&mut self, t0: SimTime) -> SolverResult<()> {
        if self.core.current.is_some() {
            return Err(SolverError::AlreadyInitialized {
                what: "simulation time",
            });
        }
        if t0.is_positive_infinite() {
            return Err(SolverError::InvalidArg {
                what: "initial simulation time must be finite".to_string(),
            });
        }
        self.core.current = Some(t0);
        Ok(())
    }

    fn set_event_time_ceiling(&mut self, t_max: SimTime) -> SolverResult<()> {
        if let Some(current) = self.core.current {
            if t_max < current {
                return Err(SolverError::InvalidArg {
                    what: format!("event time ceiling {t_max} is before the current time {current}"),
                });
            }
        }
        self.core.ceiling = t_max;
        self.core.invalidate_predictions();
        Ok(())
    }

    fn set_state_value(&mut self, index: usize, value: f64) -> SolverResult<()> {
        self.core.require_bound("set_state_value")?;
        self.core.check_state(index)?;
        let t = self.core.current_time()?;
        let value = ensure_finite(value, "state value")?;
        let core = &mut self.core;
        core.q_models[index].make_constant(value, t);
        core.c_models[index].make_constant(value, t);
        core.seeded[index] = true;
        core.need_quant[index] = true;
        core.need_rate = true;
        core.predicted[index] = None;
        core.quanta[index] = core.tolerances[index].quantum(value);
        Ok(())
    }

    fn set_quantization_tolerance(
        &mut self,
        index: usize,
        tolerance: Tolerance,
    ) -> SolverResult<()> {
        self.core.require_bound("set_quantization_tolerance")?;
        self.core.check_state(index)?;
        let tolerance = Tolerance::new(tolerance.absolute, tolerance.relative)?;
        let core = &mut self.core;
        core.tolerances[index] = tolerance;
        core.quanta[index] = tolerance.quantum(core.q_models[index].value());
        core.need_quant[index] = true;
        core.predicted[index] = None;
        Ok(())
    }

    fn add_input_model(&mut self, index: usize, model: ModelPolynomial) -> SolverResult<()> {
        self.core.require_bound("add_input_model")?;
        let len = self.core.input_count();
        let slot = self
            .core
            .input_models
            .get_mut(index)
            .ok_or(SolverError::IndexOob {
                what: "input variable",
                index,
                len,
            })?;
        *slot = Some(model);
        self.core.need_rate = true;
        Ok(())
    }

    fn input_model_mut(&mut self, index: usize) -> Option<&mut ModelPolynomial> {
        let model = self.core.input_models.get_mut(index)?.as_mut()?;
        self.core.need_rate = true;
        Some(model)
    }

    fn validate(&self) -> SolverResult<()> {
        let fail = |message: String| -> SolverResult<()> { Err(SolverError::Validation { message }) };
        let Some(function) = &self.core.function else {
            return fail("must bind a derivative function".to_string());
        };
        if function.state_count() != self.core.state_count()
            || function.input_count() != self.core.input_count()
        {
            return fail(format!(
                "derivative function reports {} states and {} inputs, stepper has {} and {}",
                function.state_count(),
                function.input_count(),
                self.core.state_count(),
                self.core.input_count()
            ));
        }
        if self.core.current.is_none() {
            return fail("must set the simulation time".to_string());
        }
        if let Some(index) = self.core.seeded.iter().position(|s| !s) {
            return fail(format!("need initial value for state {index}"));
        }
        if let Some(index) = self.core.input_models.iter().position(Option::is_none) {
            return fail(format!("need model for input variable {index}"));
        }
        Ok(())
    }

    fn step_to_time(&mut self, t: SimTime) -> SolverResult<()> {
        self.core.require_bound("step_to_time")?;
        let from = self.core.current_time()?;
        if t <= from {
            return Err(SolverError::TimeMustAdvance { from, to: t });
        }
        if let Some(index) = self.need_quantization_event_index() {
            return Err(SolverError::PendingQuantization { index });
        }
        if self.core.need_rate {
            self.trigger_rate_event()?;
        }
        for index in 0..self.core.state_count() {
            if self.predict(index) <= t {
                self.core.need_quant[index] = true;
            }
        }
        self.core.current = Some(t);
        trace!(stepper = S::NAME, %from, to = %t, "stepped");
        Ok(())
    }

    fn need_quantization_event_index(&self) -> Option<usize> {
        self.core.need_quant.iter().position(|need| *need)
    }

    fn need_quantization_event_indexes(&self) -> Vec<usize> {
        (0..self.core.state_count())
            .filter(|&index| self.core.need_quant[index])
            .collect()
    }

    fn trigger_quantization_event(&mut self, index: usize) -> SolverResult<()> {
        self.core.require_bound("trigger_quantization_event")?;
        self.core.check_state(index)?;
        self.core.current_time()?;
        self.scheme.quantize(&mut self.core, index)?;
        let core = &mut self.core;
        core.need_rate = true;
        core.predicted[index] = None;
        core.quanta[index] = core.tolerances[index].quantum(core.q_models[index].value());
        core.need_quant[index] = false;
        Ok(())
    }

    fn need_rate_event(&self) -> bool {
        self.core.need_rate
    }

    fn trigger_rate_event(&mut self) -> SolverResult<()> {
        self.core.require_bound("trigger_rate_event")?;
        self.core.current_time()?;
        self.core.invalidate_predictions();
        self.scheme.rate_event(&mut self.core)?;
        self.core.need_rate = false;
        Ok(())
    }

    fn predict_quantization_event_time(&mut self, index: usize) -> SolverResult<SimTime> {
        self.core.check_state(index)?;
        Ok(self.predict(index))
    }

    fn predict_quantization_event_time_earliest(&mut self) -> SimTime {
        (0..self.core.state_count())
            .map(|index| self.predict(index))
            .min()
            .unwrap_or(SimTime::POSITIVE_INFINITY)
    }

    fn state_model(&self, index: usize) -> Option<&ModelPolynomial> {
        self.core.q_models.get(index)
    }

    fn continuous_state_model(&self, index: usize) -> Option<&ModelPolynomial> {
        self.core.c_models.get(index)
    }

    fn quantum(&self, index: usize) -> Option<f64> {
        self.core.quanta.get(index).copied()
    }

    fn current_simulation_time(&self) -> Option<SimTime> {
        self.core.current
    }
}
