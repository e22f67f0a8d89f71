//! First-order QSS: piecewise-constant published states, linear continuous
//! models.

use qss_core::ensure_finite;

use crate::error::SolverResult;
use crate::scheme::{Scheme, quantize_from_continuous};
use crate::stepper::{QssStepper, StepperCore};

#[derive(Debug, Default)]
pub struct Qss1;

pub type Qss1Stepper = QssStepper<Qss1>;

impl Scheme for Qss1 {
    const NAME: &'static str = "QSS1";
    const STATE_MODEL_ORDER: usize = 0;

    fn quantize(&mut self, core: &mut StepperCore, index: usize) -> SolverResult<()> {
        quantize_from_continuous(core, index)
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
}
