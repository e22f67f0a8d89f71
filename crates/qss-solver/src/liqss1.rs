//! Linearly implicit first-order QSS, for stiff systems.
//!
//! The published value of a state is placed at the edge of its quantum band
//! the trajectory is heading to, or at the local equilibrium of its own
//! derivative when that lies inside the band.

use qss_core::{SimTime, ensure_finite};

use crate::error::SolverResult;
use crate::scheme::Scheme;
use crate::stepper::{QssStepper, StepperCore};

#[derive(Debug, Default)]
pub struct Liqss1;

pub type Liqss1Stepper = QssStepper<Liqss1>;

impl Scheme for Liqss1 {
    const NAME: &'static str = "LIQSS1";
    const STATE_MODEL_ORDER: usize = 0;

    fn quantize(&mut self, core: &mut StepperCore, index: usize) -> SolverResult<()> {
        let t = core.current_time()?;
        core.c_model_mut(index).rebase(t);
        let x = core.c_model(index).value();
        let dq = core.tolerance(index).quantum(x);

        let mut states = core.quantized_states_at(t);
        let inputs = core.inputs_at(t);
        states[index] = x + dq;
        let d_up = core.evaluate(t, &states, &inputs)?[index];
        states[index] = x - dq;
        let d_down = core.evaluate(t, &states, &inputs)?[index];
        ensure_finite(d_up, "state derivative")?;
        ensure_finite(d_down, "state derivative")?;

        let q = if d_up > 0.0 && d_down > 0.0 {
            x + dq
        } else if d_up < 0.0 && d_down < 0.0 {
            x - dq
        } else {
            let gain = (d_up - d_down) / (2.0 * dq);
            if gain == 0.0 {
                x
            } else {
                (x + dq - d_up / gain).clamp(x - dq, x + dq)
            }
        };
        core.q_model_mut(index).make_constant(q, t);
        Ok(())
    }

    fn rate_event(&mut self, core: &mut StepperCore) -> SolverResult<()> {
        let t = core.current_time()?;
        core.rebase_continuous(t);
        let slopes = core.evaluate_along_models(t)?;
        for (index, slope) in slopes.into_iter().enumerate() {
            core.c_model_mut(index).coeffs[1] = ensure_finite(slope, "state derivative")?;
        }
        Ok(())
    }

    fn predict_dt(&self, core: &StepperCore, index: usize, from: SimTime) -> f64 {
        let c = core.c_model(index);
        let slope = c.evaluate_derivative(from, 1);
        if slope == 0.0 {
            return f64::INFINITY;
        }
        let offset = c.evaluate(from) - core.q_model(index).evaluate(from);
        if offset != 0.0 && offset.signum() != slope.signum() {
            // heading towards the published value
            return -offset / slope;
        }
        ((slope.signum() * core.quantum(index) - offset) / slope).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DMatrix;
    use qss_core::Tolerance;

    use super::*;
    use crate::derivative::LinearSystem;
    use crate::stepper::QuantizedStepper;

    fn at(secs: f64) -> SimTime {
        SimTime::new(secs).unwrap()
    }

    fn stiff(x0: f64) -> Liqss1Stepper {
        let a = DMatrix::from_row_slice(1, 1, &[-1000.0]);
        let mut stepper = Liqss1Stepper::new();
        stepper.bind(Box::new(LinearSystem::autonomous(a).unwrap())).unwrap();
        stepper.set_simulation_time(at(0.0)).unwrap();
        stepper.set_state_value(0, x0).unwrap();
        stepper
            .set_quantization_tolerance(0, Tolerance::new(0.01, 0.0).unwrap())
            .unwrap();
        stepper.validate().unwrap();
        stepper
    }

    #[test]
    fn decaying_state_is_published_at_lower_band_edge() {
        let mut stepper = stiff(1.0);
        stepper.trigger_quantization_event(0).unwrap();
        assert!((stepper.state_model(0).unwrap().value() - 0.99).abs() < 1e-12);
    }

    #[test]
    fn equilibrium_inside_band_is_published_exactly() {
        let mut stepper = stiff(0.005);
        stepper.trigger_quantization_event(0).unwrap();
        assert!(stepper.state_model(0).unwrap().value().abs() < 1e-15);
    }

    #[test]
    fn stiff_decay_settles_without_chattering() {
        let mut stepper = stiff(1.0);
        stepper.trigger_quantization_event(0).unwrap();
        stepper.trigger_rate_event().unwrap();
        let mut events = 0;
        loop {
            let next = stepper.predict_quantization_event_time_earliest();
            if next > at(1.0) || events > 1000 {
                break;
            }
            stepper.advance_to_time(next).unwrap();
            events += 1;
        }
        assert!(events < 200, "{events} events");
        assert!(stepper.state_model(0).unwrap().value().abs() <= 0.01);
    }
}
