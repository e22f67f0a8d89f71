//! Local polynomial models of states and inputs.
//!
//! A model is `x(t) = c[0] + c[1]·dt + c[2]·dt² + …` with `dt = t - t_ref`.
//! Coefficient `k` is the `k`-th derivative at `t_ref` divided by `k!`, so
//! `c[0]` is the value at `t_ref` exactly.

use core::fmt;

use crate::SimTime;

#[derive(Clone, Debug, PartialEq)]
pub struct ModelPolynomial {
    pub coeffs: Vec<f64>,
    pub t_ref: SimTime,
}

impl ModelPolynomial {
    /// Zero polynomial of the given maximum order, referenced at `t = 0`.
    pub fn new(order: usize) -> Self {
        Self {
            coeffs: vec![0.0; order + 1],
            t_ref: SimTime::ZERO,
        }
    }

    /// Constant polynomial of the given order.
    pub fn constant(order: usize, value: f64, t_ref: SimTime) -> Self {
        let mut model = Self::new(order);
        model.make_constant(value, t_ref);
        model
    }

    pub fn maximum_order(&self) -> usize {
        self.coeffs.len() - 1
    }

    /// Value at the reference time.
    pub fn value(&self) -> f64 {
        self.coeffs[0]
    }

    pub fn evaluate(&self, t: SimTime) -> f64 {
        let dt = t.subtract_to_f64(self.t_ref);
        self.evaluate_dt(dt)
    }

    /// Value `dt` seconds after the reference time.
    pub fn evaluate_dt(&self, dt: f64) -> f64 {
        self.coeffs.iter().rev().fold(0.0, |acc, c| acc * dt + c)
    }

    /// `k`-th time derivative at `t`. Zero above the model order.
    pub fn evaluate_derivative(&self, t: SimTime, k: usize) -> f64 {
        if k > self.maximum_order() {
            return 0.0;
        }
        let dt = t.subtract_to_f64(self.t_ref);
        let mut acc = 0.0;
        for j in (k..self.coeffs.len()).rev() {
            acc = acc * dt + self.coeffs[j] * falling_factorial(j, k);
        }
        acc
    }

    /// Derivatives `x'(t), x''(t), …` up to the model order.
    pub fn derivatives_at(&self, t: SimTime) -> Vec<f64> {
        (1..=self.maximum_order())
            .map(|k| self.evaluate_derivative(t, k))
            .collect()
    }

    /// Re-express the same function with `t` as reference time.
    pub fn rebase(&mut self, t: SimTime) {
        if t == self.t_ref {
            return;
        }
        let shifted: Vec<f64> = (0..self.coeffs.len())
            .map(|k| self.evaluate_derivative(t, k) / factorial(k))
            .collect();
        self.coeffs = shifted;
        self.t_ref = t;
    }

    pub fn make_constant(&mut self, value: f64, t_ref: SimTime) {
        self.coeffs.fill(0.0);
        self.coeffs[0] = value;
        self.t_ref = t_ref;
    }

    /// Seed from a value and its time derivatives at `t_ref`.
    ///
    /// Derivatives beyond the model order are dropped; missing ones are zero.
    pub fn set_from_derivatives(&mut self, value: f64, derivatives: &[f64], t_ref: SimTime) {
        self.make_constant(value, t_ref);
        for (k, d) in derivatives.iter().enumerate().take(self.maximum_order()) {
            self.coeffs[k + 1] = d / factorial(k + 1);
        }
    }
}

impl fmt::Display for ModelPolynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.coeffs[0])?;
        for (k, c) in self.coeffs.iter().enumerate().skip(1) {
            write!(f, " + {c}*dt^{k}")?;
        }
        write!(f, " (t_ref={})", self.t_ref)
    }
}

pub fn factorial(k: usize) -> f64 {
    (1..=k).fold(1.0, |acc, i| acc * i as f64)
}

/// `j! / (j-k)!`
fn falling_factorial(j: usize, k: usize) -> f64 {
    ((j - k + 1)..=j).fold(1.0, |acc, i| acc * i as f64)
}
