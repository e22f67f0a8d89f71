//! Quantized-state integration inside a discrete-event scheduler.
//!
//! The [`Integrator`] drives one stepper per state variable through the
//! scheduler's fire/postfire protocol. The [`QssDirector`] holds run-wide
//! tolerance and stepper selection, and [`run_network`] wires integrators
//! and piecewise-constant sources onto an [`EventCalendar`].

pub mod director;
pub mod error;
pub mod integrator;
pub mod scheduler;
pub mod sim;

pub use director::QssDirector;
pub use error::{SimError, SimResult};
pub use integrator::{
    Integrator, IntegratorParams, IntegratorStats, Phase, RefirePlan, plan_refire,
};
pub use scheduler::{EventCalendar, Scheduler};
pub use sim::{InputSource, NetworkNode, OutputSample, SimOptions, SimRecord, run_network};
