//! Third-order QSS: quadratic published states, cubic continuous models.

use qss_core::{SimTime, ensure_finite};

use crate::error::SolverResult;
use crate::scheme::{Scheme, difference_step, quantize_from_continuous};
use crate::stepper::{QssStepper, StepperCore};

#[derive(Debug, Default)]
pub struct Qss3Fd;

pub type Qss3FdStepper = QssStepper<Qss3Fd>;

impl Qss3Fd {
    /// First and second time derivatives of `f` along the models at `t`.
    fn derivatives(core: &mut StepperCore, t: SimTime, f0: &[f64]) -> SolverResult<(Vec<f64>, Vec<f64>)> {
        if let Some(d0) = core.directional_along_models(t)? {
            let h = difference_step(t, 2);
            if let Some(dh) = core.directional_along_models(t.add_secs(h))? {
                let second = dh.iter().zip(&d0).map(|(b, a)| (b - a) / h).collect();
                return Ok((d0, second));
            }
        }
        let h = difference_step(t, 3);
        let f1 = core.evaluate_along_models(t.add_secs(h))?;
        let f2 = core.evaluate_along_models(t.add_secs(2.0 * h))?;
        let first = (0..f0.len())
            .map(|i| (-3.0 * f0[i] + 4.0 * f1[i] - f2[i]) / (2.0 * h))
            .collect();
        let second = (0..f0.len())
            .map(|i| (f0[i] - 2.0 * f1[i] + f2[i]) / (h * h))
            .collect();
        Ok((first, second))
    }
}

impl Scheme for Qss3Fd {
    const NAME: &'static str = "QSS3Fd";
    const STATE_MODEL_ORDER: usize = 2;

    fn quantize(&mut self, core: &mut StepperCore, index: usize) -> SolverResult<()> {
        quantize_from_continuous(core, index)
    }

    fn rate_event(&mut self, core: &mut StepperCore) -> SolverResult<()> {
        let t = core.current_time()?;
        core.rebase_continuous(t);
        let f0 = core.evaluate_along_models(t)?;
        let (first, second) = Self::derivatives(core, t, &f0)?;
        for index in 0..f0.len() {
            let c = core.c_model_mut(index);
            c.coeffs[1] = ensure_finite(f0[index], "state derivative")?;
            c.coeffs[2] = ensure_finite(first[index], "state second derivative")? / 2.0;
            c.coeffs[3] = ensure_finite(second[index], "state third derivative")? / 6.0;
        }
        Ok(())
    }
}
