use crate::{CoreError, CoreResult};

/// Floating point type used throughout the engine
pub type Real = f64;

/// Director-level error tolerance used when nothing else is configured.
pub const DEFAULT_ERROR_TOLERANCE: Real = 1e-4;

/// Smallest quantum a state can ever get.
pub const MIN_QUANTUM: Real = 1e-20;

/// Absolute/relative tolerance pair.
///
/// Both components are finite and non-negative. Used both for float
/// comparisons and as the quantization tolerance of one state.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tolerance {
    pub absolute: Real,
    pub relative: Real,
}

impl Tolerance {
    /// Tolerance for comparing computed floats.
    pub const COMPARISON: Tolerance = Tolerance {
        absolute: 1e-12,
        relative: 1e-9,
    };

    pub fn new(absolute: Real, relative: Real) -> CoreResult<Self> {
        let absolute = ensure_tolerance(absolute, "absolute tolerance")?;
        let relative = ensure_tolerance(relative, "relative tolerance")?;
        Ok(Self { absolute, relative })
    }

    /// Same value for both components.
    pub fn uniform(value: Real) -> CoreResult<Self> {
        Self::new(value, value)
    }

    /// Quantum for a state whose quantized value is `value`.
    ///
    /// `max(relative * |value|, absolute)`, never below [`MIN_QUANTUM`].
    pub fn quantum(&self, value: Real) -> Real {
        let dq = (self.relative * value.abs()).max(self.absolute);
        if dq.is_nan() || dq < MIN_QUANTUM {
            MIN_QUANTUM
        } else {
            dq
        }
    }
}

pub fn nearly_equal(a: Real, b: Real, tol: Tolerance) -> bool {
    let diff = (a - b).abs();
    if diff <= tol.absolute {
        return true;
    }
    diff <= tol.relative * a.abs().max(b.abs())
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, CoreError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

fn ensure_tolerance(v: Real, what: &'static str) -> CoreResult<Real> {
    if v.is_finite() && v >= 0.0 {
        Ok(v)
    } else {
        Err(CoreError::InvalidTolerance { what, value: v })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearly_equal_basic() {
        let tol = Tolerance::COMPARISON;
        assert!(nearly_equal(1.0, 1.0 + 1e-12, tol));
        assert!(nearly_equal(0.0, 1e-13, tol));
        assert!(!nearly_equal(1.0, 1.0 + 1e-6, tol));
    }

    #[test]
    fn ensure_finite_detects_nan() {
        let err = ensure_finite(Real::NAN, "test").unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("Non-finite"));
    }

    #[test]
    fn tolerance_rejects_negative_components() {
        assert!(matches!(
            Tolerance::new(-1.0, 0.0),
            Err(CoreError::InvalidTolerance { value, .. }) if value == -1.0
        ));
        assert!(Tolerance::new(0.0, -1e-3).is_err());
        assert!(Tolerance::new(f64::NAN, 0.0).is_err());
        assert!(Tolerance::new(0.0, 0.0).is_ok());
    }

    #[test]
    fn quantum_uses_larger_of_absolute_and_relative() {
        let tol = Tolerance::new(1e-4, 1e-2).unwrap();
        assert_eq!(tol.quantum(0.0), 1e-4);
        assert!(nearly_equal(tol.quantum(-50.0), 0.5, Tolerance::COMPARISON));
    }

    #[test]
    fn zero_tolerance_still_gives_positive_quantum() {
        let tol = Tolerance::new(0.0, 0.0).unwrap();
        assert_eq!(tol.quantum(3.0), MIN_QUANTUM);
    }
}
