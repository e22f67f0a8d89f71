//! Second-order QSS: linear published states, quadratic continuous models.
//!
//! The second derivative comes from the function's directional derivatives
//! when it has them, otherwise from a forward difference along the models.

use qss_core::ensure_finite;

use crate::error::SolverResult;
use crate::scheme::{Scheme, difference_step, quantize_from_continuous};
use crate::stepper::{QssStepper, StepperCore};

#[derive(Debug, Default)]
pub struct Qss2Fd;

pub type Qss2FdStepper = QssStepper<Qss2Fd>;

impl Scheme for Qss2Fd {
    const NAME: &'static str = "QSS2Fd";
    const STATE_MODEL_ORDER: usize = 1;

    fn quantize(&mut self, core: &mut StepperCore, index: usize) -> SolverResult<()> {
        quantize_from_continuous(core, index)
    }

    fn rate_event(&mut self, core: &mut StepperCore) -> SolverResult<()> {
        let t = core.current_time()?;
        core.rebase_continuous(t);
        let slopes = core.evaluate_along_models(t)?;
        let curvatures = match core.directional_along_models(t)? {
            Some(exact) => exact,
            None => {
                let h = difference_step(t, 2);
                let ahead = core.evaluate_along_models(t.add_secs(h))?;
                ahead
                    .iter()
                    .zip(&slopes)
                    .map(|(fh, f0)| (fh - f0) / h)
                    .collect()
            }
        };
        for (index, (slope, curvature)) in slopes.into_iter().zip(curvatures).enumerate() {
            let c = core.c_model_mut(index);
            c.coeffs[1] = ensure_finite(slope, "state derivative")?;
            c.coeffs[2] = ensure_finite(curvature, "state second derivative")? / 2.0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DMatrix;
    use qss_core::{ModelPolynomial, SimTime, Tolerance};

    use super::*;
    use crate::derivative::{FnDerivative, LinearSystem};
    use crate::stepper::QuantizedStepper;

    fn at(secs: f64) -> SimTime {
        SimTime::new(secs).unwrap()
    }

    #[test]
    fn ramp_input_gives_exact_quadratic() {
        let mut stepper = Qss2FdStepper::new();
        stepper
            .bind(Box::new(FnDerivative::new(1, 1, |_, _, u, out| {
                out[0] = u[0];
                Ok(())
            })))
            .unwrap();
        stepper.set_simulation_time(at(0.0)).unwrap();
        stepper.set_state_value(0, 0.0).unwrap();
        let mut ramp = ModelPolynomial::new(1);
        ramp.coeffs[1] = 1.0;
        stepper.add_input_model(0, ramp).unwrap();
        stepper.validate().unwrap();
        stepper.trigger_quantization_event(0).unwrap();
        stepper.trigger_rate_event().unwrap();

        let c = stepper.continuous_state_model(0).unwrap();
        assert_eq!(c.coeffs[1], 0.0);
        assert!((c.coeffs[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn directional_derivatives_are_used_when_provided() {
        let system = LinearSystem::new(
            DMatrix::from_row_slice(1, 1, &[-2.0]),
            DMatrix::from_row_slice(1, 1, &[1.0]),
        )
        .unwrap();
        let mut stepper = Qss2FdStepper::new();
        stepper.bind(Box::new(system)).unwrap();
        stepper.set_simulation_time(at(0.0)).unwrap();
        stepper.set_state_value(0, 1.0).unwrap();
        stepper
            .add_input_model(0, ModelPolynomial::constant(1, 4.0, at(0.0)))
            .unwrap();
        stepper
            .set_quantization_tolerance(0, Tolerance::uniform(1e-3).unwrap())
            .unwrap();
        stepper.validate().unwrap();
        stepper.trigger_quantization_event(0).unwrap();
        stepper.trigger_rate_event().unwrap();
        stepper.trigger_quantization_event(0).unwrap();
        stepper.trigger_rate_event().unwrap();

        // f = -2x + u = 2, f' = -2·f = -4
        let c = stepper.continuous_state_model(0).unwrap();
        assert_eq!(c.coeffs, vec![1.0, 2.0, -2.0]);
    }
}
