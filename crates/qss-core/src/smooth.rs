//! Scalars that carry derivatives.
//!
//! A [`SmoothValue`] is a double plus an optional list of time derivatives
//! `[x', x'', …]`. Downstream consumers can extrapolate it locally without
//! forcing the producer to publish a new value.
//!
//! Derivative arrays are immutable and shared: cloning a value or reusing an
//! operand's derivatives in a result never copies them.

use core::fmt;
use core::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::polynomial::factorial;
use crate::{CoreError, CoreResult};

#[derive(Clone, Debug)]
pub struct SmoothValue {
    value: f64,
    derivatives: Option<Arc<[f64]>>,
}

impl SmoothValue {
    /// The "missing" value.
    pub const NIL: SmoothValue = SmoothValue {
        value: f64::NAN,
        derivatives: None,
    };

    pub const ZERO: SmoothValue = SmoothValue {
        value: 0.0,
        derivatives: None,
    };

    pub fn new(value: f64) -> Self {
        Self {
            value,
            derivatives: None,
        }
    }

    /// Takes ownership of `derivatives`. An empty list means "no derivatives".
    pub fn with_derivatives(value: f64, derivatives: impl Into<Arc<[f64]>>) -> Self {
        let derivatives: Arc<[f64]> = derivatives.into();
        Self {
            value,
            derivatives: (!derivatives.is_empty()).then_some(derivatives),
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn derivatives(&self) -> Option<&[f64]> {
        self.derivatives.as_deref()
    }

    /// Number of derivatives carried (0 when none).
    pub fn order(&self) -> usize {
        self.derivatives.as_ref().map_or(0, |d| d.len())
    }

    pub fn is_nil(&self) -> bool {
        self.value.is_nan()
    }

    pub fn add(&self, other: &SmoothValue) -> SmoothValue {
        let derivatives = match (&self.derivatives, &other.derivatives) {
            (None, None) => None,
            (Some(d), None) | (None, Some(d)) => Some(Arc::clone(d)),
            (Some(a), Some(b)) => Some(combine(a, b, |x, y| x + y, |y| y)),
        };
        SmoothValue {
            value: self.value + other.value,
            derivatives,
        }
    }

    pub fn subtract(&self, other: &SmoothValue) -> SmoothValue {
        let derivatives = match (&self.derivatives, &other.derivatives) {
            (None, None) => None,
            (Some(d), None) => Some(Arc::clone(d)),
            (None, Some(d)) => Some(d.iter().map(|x| -x).collect()),
            (Some(a), Some(b)) => Some(combine(a, b, |x, y| x - y, |y| -y)),
        };
        SmoothValue {
            value: self.value - other.value,
            derivatives,
        }
    }

    /// Scales `self` (value and derivatives) by the scalar value of `other`.
    ///
    /// The derivatives of `other` are not used.
    pub fn multiply(&self, other: &SmoothValue) -> SmoothValue {
        self.scaled(other.value, |x, factor| x * factor)
    }

    /// Divides `self` (value and derivatives) by the scalar value of `other`.
    ///
    /// The derivatives of `other` are not used, so this is not the quotient
    /// rule. Consumers rely on this behavior.
    pub fn divide(&self, other: &SmoothValue) -> SmoothValue {
        self.scaled(other.value, |x, divisor| x / divisor)
    }

    pub fn negate(&self) -> SmoothValue {
        SmoothValue {
            value: -self.value,
            derivatives: self
                .derivatives
                .as_ref()
                .map(|d| d.iter().map(|x| -x).collect()),
        }
    }

    /// Ordering is undefined for smooth values.
    pub fn is_less_than(&self, _other: &SmoothValue) -> CoreResult<bool> {
        Err(CoreError::UnsupportedOperation {
            operation: "isLessThan",
            type_name: "SmoothValue",
        })
    }

    /// Taylor extrapolation `dt` seconds ahead, derivatives included.
    pub fn extrapolate(&self, dt: f64) -> SmoothValue {
        let Some(d) = &self.derivatives else {
            return self.clone();
        };
        // coefficients of the local polynomial, highest order last
        let coeffs: Vec<f64> = core::iter::once(self.value)
            .chain(d.iter().enumerate().map(|(k, x)| x / factorial(k + 1)))
            .collect();
        let shifted: Vec<f64> = (0..coeffs.len())
            .map(|k| {
                let mut acc = 0.0;
                for j in (k..coeffs.len()).rev() {
                    let ff: f64 = ((j - k + 1)..=j).map(|i| i as f64).product();
                    acc = acc * dt + coeffs[j] * ff;
                }
                acc
            })
            .collect();
        SmoothValue::with_derivatives(shifted[0], shifted[1..].to_vec())
    }

    fn scaled(&self, factor: f64, op: impl Fn(f64, f64) -> f64) -> SmoothValue {
        SmoothValue {
            value: op(self.value, factor),
            derivatives: self
                .derivatives
                .as_ref()
                .map(|d| d.iter().map(|x| op(*x, factor)).collect()),
        }
    }
}

/// Element-wise combination sized to the longer array. `tail` maps entries
/// of `b` that have no partner in `a`; entries of `a` pass through as-is.
fn combine(
    a: &[f64],
    b: &[f64],
    both: impl Fn(f64, f64) -> f64,
    tail: impl Fn(f64) -> f64,
) -> Arc<[f64]> {
    (0..a.len().max(b.len()))
        .map(|i| match (a.get(i), b.get(i)) {
            (Some(x), Some(y)) => both(*x, *y),
            (Some(x), None) => *x,
            (None, Some(y)) => tail(*y),
            (None, None) => 0.0,
        })
        .collect()
}

impl Default for SmoothValue {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<f64> for SmoothValue {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl PartialEq for SmoothValue {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.derivatives() == other.derivatives()
    }
}

impl Hash for SmoothValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // 0.0 and -0.0 compare equal
        let bits = if self.value == 0.0 {
            0
        } else {
            self.value.to_bits()
        };
        bits.hash(state);
    }
}

impl fmt::Display for SmoothValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.derivatives {
            None => write!(f, "smooth({})", self.value),
            Some(d) => write!(f, "smooth({}, {:?})", self.value, d),
        }
    }
}

macro_rules! forward_binop {
    ($trait:ident, $method:ident, $inner:ident) => {
        impl core::ops::$trait<&SmoothValue> for &SmoothValue {
            type Output = SmoothValue;
            fn $method(self, rhs: &SmoothValue) -> SmoothValue {
                SmoothValue::$inner(self, rhs)
            }
        }

        impl core::ops::$trait for SmoothValue {
            type Output = SmoothValue;
            fn $method(self, rhs: SmoothValue) -> SmoothValue {
                SmoothValue::$inner(&self, &rhs)
            }
        }

        impl core::ops::$trait<f64> for SmoothValue {
            type Output = SmoothValue;
            fn $method(self, rhs: f64) -> SmoothValue {
                SmoothValue::$inner(&self, &SmoothValue::new(rhs))
            }
        }

        impl core::ops::$trait<f64> for &SmoothValue {
            type Output = SmoothValue;
            fn $method(self, rhs: f64) -> SmoothValue {
                SmoothValue::$inner(self, &SmoothValue::new(rhs))
            }
        }
    };
}

forward_binop!(Add, add, add);
forward_binop!(Sub, sub, subtract);
forward_binop!(Mul, mul, multiply);
forward_binop!(Div, div, divide);

impl core::ops::Neg for SmoothValue {
    type Output = SmoothValue;
    fn neg(self) -> SmoothValue {
        self.negate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Tolerance, nearly_equal};

    fn sv(value: f64, d: &[f64]) -> SmoothValue {
        SmoothValue::with_derivatives(value, d.to_vec())
    }

    #[test]
    fn add_without_derivatives() {
        let r = SmoothValue::new(1.0).add(&SmoothValue::new(2.5));
        assert_eq!(r, SmoothValue::new(3.5));
        assert!(r.derivatives().is_none());
    }

    #[test]
    fn add_reuses_the_only_derivative_array() {
        let a = sv(1.0, &[2.0, 3.0]);
        let r = a.add(&SmoothValue::new(1.0));
        assert_eq!(r, sv(2.0, &[2.0, 3.0]));
        let (Some(ra), Some(aa)) = (&r.derivatives, &a.derivatives) else {
            panic!("derivatives expected");
        };
        assert!(Arc::ptr_eq(ra, aa));
    }

    #[test]
    fn add_mixed_lengths_passes_tail_through() {
        let r = sv(1.0, &[1.0]).add(&sv(2.0, &[10.0, 20.0, 30.0]));
        assert_eq!(r, sv(3.0, &[11.0, 20.0, 30.0]));
    }

    #[test]
    fn subtract_negates_right_only_derivatives() {
        let r = SmoothValue::new(5.0).subtract(&sv(2.0, &[1.0, -4.0]));
        assert_eq!(r, sv(3.0, &[-1.0, 4.0]));
    }

    #[test]
    fn subtract_mixed_lengths() {
        let r = sv(5.0, &[1.0, 2.0, 3.0]).subtract(&sv(1.0, &[1.0]));
        assert_eq!(r, sv(4.0, &[0.0, 2.0, 3.0]));
        let r = sv(5.0, &[1.0]).subtract(&sv(1.0, &[1.0, 2.0]));
        assert_eq!(r, sv(4.0, &[0.0, -2.0]));
    }

    #[test]
    fn divide_ignores_divisor_derivatives() {
        let r = sv(6.0, &[3.0]).divide(&sv(2.0, &[99.0]));
        assert_eq!(r, sv(3.0, &[1.5]));
    }

    #[test]
    fn divide_plain_dividend_is_scalar_division() {
        let r = SmoothValue::new(6.0).divide(&sv(4.0, &[1.0]));
        assert_eq!(r, SmoothValue::new(1.5));
    }

    #[test]
    fn multiply_scales_derivatives() {
        let r = sv(2.0, &[1.0, -0.5]) * sv(4.0, &[7.0]);
        assert_eq!(r, sv(8.0, &[4.0, -2.0]));
    }

    #[test]
    fn equality_requires_matching_derivatives() {
        assert_ne!(sv(1.0, &[1.0]), SmoothValue::new(1.0));
        assert_ne!(sv(1.0, &[1.0]), sv(1.0, &[1.0, 0.0]));
        assert_eq!(sv(1.0, &[]), SmoothValue::new(1.0));
    }

    #[test]
    fn nil_is_nan() {
        assert!(SmoothValue::NIL.is_nil());
        assert!(!SmoothValue::ZERO.is_nil());
    }

    #[test]
    fn ordering_is_unsupported() {
        let err = SmoothValue::new(1.0)
            .is_less_than(&SmoothValue::new(2.0))
            .unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedOperation { .. }));
        assert!(err.to_string().contains("isLessThan"));
    }

    #[test]
    fn extrapolate_follows_taylor_series() {
        // x = 1 + 2t + 3t^2  -> x' = 2 + 6t, x'' = 6
        let v = sv(1.0, &[2.0, 6.0]);
        let e = v.extrapolate(2.0);
        let tol = Tolerance::COMPARISON;
        assert!(nearly_equal(e.value(), 17.0, tol));
        let d = e.derivatives().unwrap();
        assert!(nearly_equal(d[0], 14.0, tol));
        assert!(nearly_equal(d[1], 6.0, tol));
    }

    #[test]
    fn display() {
        assert_eq!(SmoothValue::new(2.0).to_string(), "smooth(2)");
        assert_eq!(sv(2.0, &[0.5]).to_string(), "smooth(2, [0.5])");
    }
}
