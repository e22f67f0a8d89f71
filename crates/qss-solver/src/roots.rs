//! Smallest positive real root of low-degree polynomials.
//!
//! Coefficients are given in ascending order: `coeffs[k]` multiplies `x^k`.
//! All functions return `f64::INFINITY` when no positive real root exists.

use core::f64::consts::PI;

/// Smallest root `> 0` of a polynomial of degree at most 3.
pub fn min_positive_root(coeffs: &[f64]) -> f64 {
    let degree = coeffs.iter().rposition(|c| *c != 0.0).unwrap_or(0);
    match degree {
        0 => f64::INFINITY,
        1 => positive(-coeffs[0] / coeffs[1]),
        2 => min_positive_root2(coeffs[2], coeffs[1], coeffs[0]),
        3 => min_positive_root3(coeffs[3], coeffs[2], coeffs[1], coeffs[0]),
        _ => f64::INFINITY,
    }
}

/// Smallest root `> 0` of `a·x² + b·x + c`.
pub fn min_positive_root2(a: f64, b: f64, c: f64) -> f64 {
    if a == 0.0 {
        return if b == 0.0 {
            f64::INFINITY
        } else {
            positive(-c / b)
        };
    }
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return f64::INFINITY;
    }
    // avoid cancellation between -b and sqrt(disc)
    let q = -0.5 * (b + b.signum() * disc.sqrt());
    if q == 0.0 {
        return f64::INFINITY;
    }
    positive(q / a).min(positive(c / q))
}

/// Smallest root `> 0` of `a·x³ + b·x² + c·x + d`.
pub fn min_positive_root3(a: f64, b: f64, c: f64, d: f64) -> f64 {
    if a == 0.0 {
        return min_positive_root2(b, c, d);
    }
    let (p2, p1, p0) = (b / a, c / a, d / a);
    let shift = p2 / 3.0;
    // depressed cubic y^3 + p y + q with x = y - shift
    let p = p1 - p2 * p2 / 3.0;
    let q = 2.0 * p2 * p2 * p2 / 27.0 - p2 * p1 / 3.0 + p0;
    let disc = (q / 2.0).powi(2) + (p / 3.0).powi(3);

    let mut candidates = [f64::NAN; 3];
    if disc > 0.0 {
        let s = disc.sqrt();
        candidates[0] = (-q / 2.0 + s).cbrt() + (-q / 2.0 - s).cbrt() - shift;
    } else if p == 0.0 {
        candidates[0] = -shift;
    } else {
        let r = 2.0 * (-p / 3.0).sqrt();
        let arg = (3.0 * q / (2.0 * p) * (-3.0 / p).sqrt()).clamp(-1.0, 1.0);
        let phi = arg.acos() / 3.0;
        for (k, slot) in candidates.iter_mut().enumerate() {
            *slot = r * (phi - 2.0 * PI * k as f64 / 3.0).cos() - shift;
        }
    }

    candidates
        .iter()
        .filter(|x| x.is_finite())
        .map(|&x| polish(x, [d, c, b, a]))
        .fold(f64::INFINITY, |best, x| best.min(positive(x)))
}

/// A few Newton steps on the unreduced cubic.
fn polish(mut x: f64, coeffs: [f64; 4]) -> f64 {
    for _ in 0..3 {
        let f = ((coeffs[3] * x + coeffs[2]) * x + coeffs[1]) * x + coeffs[0];
        let df = (3.0 * coeffs[3] * x + 2.0 * coeffs[2]) * x + coeffs[1];
        if df == 0.0 || !f.is_finite() {
            break;
        }
        let next = x - f / df;
        if !next.is_finite() {
            break;
        }
        x = next;
    }
    x
}

fn positive(x: f64) -> f64 {
    if x > 0.0 { x } else { f64::INFINITY }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn finds_smallest_positive_of_three_roots(
            r1 in -10.0_f64..10.0,
            r2 in -10.0_f64..10.0,
            r3 in -10.0_f64..10.0,
            scale in prop_oneof![0.1_f64..10.0, -10.0_f64..-0.1],
        ) {
            // keep roots apart so the expected answer is well conditioned
            prop_assume!((r1 - r2).abs() > 0.1 && (r2 - r3).abs() > 0.1 && (r1 - r3).abs() > 0.1);
            prop_assume!(r1.abs() > 0.05 && r2.abs() > 0.05 && r3.abs() > 0.05);
            let a = scale;
            let b = -scale * (r1 + r2 + r3);
            let c = scale * (r1 * r2 + r1 * r3 + r2 * r3);
            let d = -scale * r1 * r2 * r3;
            let expected = [r1, r2, r3]
                .into_iter()
                .filter(|r| *r > 0.0)
                .fold(f64::INFINITY, f64::min);
            let got = min_positive_root3(a, b, c, d);
            if expected.is_infinite() {
                prop_assert!(got.is_infinite());
            } else {
                prop_assert!((got - expected).abs() < 1e-6, "got {got}, expected {expected}");
            }
        }
    }
}
