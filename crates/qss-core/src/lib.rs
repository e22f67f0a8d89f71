//! qss-core: shared foundation for the quantized-state engine.
//!
//! Contains:
//! - time (totally ordered simulation time + uom conversions)
//! - numeric (Real + tolerances + quantum rule + float helpers)
//! - polynomial (local polynomial models of states and inputs)
//! - smooth (scalar values that carry derivatives)
//! - ids (compact actor identifiers)
//! - timing (opt-in wall-clock timers)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod polynomial;
pub mod smooth;
pub mod time;
pub mod timing;

// Re-exports: nice ergonomics for downstream crates
pub use error::{CoreError, CoreResult};
pub use ids::*;
pub use numeric::*;
pub use polynomial::ModelPolynomial;
pub use smooth::SmoothValue;
pub use time::{SimTime, Time, s};
