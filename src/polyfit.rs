use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::ensure_same_length;
use crate::math::vandermonde;
use crate::solver::least_squares;
use crate::Result;

/// A polynomial in the power basis
///
/// Coefficient `k` multiplies `x^k`, so a polynomial of order `m` holds `m + 1` coefficients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polynomial(Vec<f64>);

impl Polynomial {
    pub const fn new(coefficients: Vec<f64>) -> Self {
        Self(coefficients)
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.0
    }

    pub fn into_coefficients(self) -> Vec<f64> {
        self.0
    }

    /// The order of the polynomial, or `None` if it has no coefficients
    pub fn order(&self) -> Option<usize> {
        self.0.len().checked_sub(1)
    }

    /// Evaluate `Σ c[k] x^k`
    pub fn evaluate(&self, x: f64) -> f64 {
        evaluate(&self.0, x)
    }

    /// Evaluate the analytic first derivative `Σ k c[k] x^(k - 1)`
    pub fn derivative(&self, x: f64) -> f64 {
        derivative(&self.0, x)
    }

    pub fn evaluate_all(&self, x: &[f64]) -> Vec<f64> {
        x.iter().map(|&x| self.evaluate(x)).collect()
    }

    pub fn derivative_all(&self, x: &[f64]) -> Vec<f64> {
        x.iter().map(|&x| self.derivative(x)).collect()
    }

    /// The derivative as a polynomial one order lower
    #[must_use]
    pub fn differentiate(&self) -> Self {
        Self(
            self.0
                .iter()
                .enumerate()
                .skip(1)
                .map(|(k, c)| scale(k) * c)
                .collect(),
        )
    }
}

impl From<Vec<f64>> for Polynomial {
    fn from(coefficients: Vec<f64>) -> Self {
        Self(coefficients)
    }
}

impl From<Array1<f64>> for Polynomial {
    fn from(coefficients: Array1<f64>) -> Self {
        Self(coefficients.to_vec())
    }
}

#[allow(clippy::cast_precision_loss)]
fn scale(k: usize) -> f64 {
    k as f64
}

/// Evaluate the power-basis polynomial with `coefficients` at `x` by Horner's rule
pub fn evaluate(coefficients: &[f64], x: f64) -> f64 {
    coefficients
        .iter()
        .rev()
        .fold(0.0, |acc, c| acc.mul_add(x, *c))
}

/// Evaluate the first derivative of the power-basis polynomial with `coefficients` at `x`
pub fn derivative(coefficients: &[f64], x: f64) -> f64 {
    coefficients
        .iter()
        .enumerate()
        .skip(1)
        .rev()
        .fold(0.0, |acc, (k, c)| acc.mul_add(x, scale(k) * c))
}

/// Ordinary least-squares polynomial fit of `y` on `x` of the given `order`
///
/// # Errors
/// - If `x` and `y` have different lengths
/// - If there are fewer than `order + 1` samples, or the samples cannot identify every coefficient
pub fn polyfit(x: &[f64], y: &[f64], order: usize) -> Result<Polynomial> {
    ensure_same_length("polyfit", x.len(), y.len())?;
    let design = vandermonde(x, order)?;
    let target = Array1::from(y.to_vec());
    let solution = least_squares(&design, &target)?;
    Ok(Polynomial::from(solution.coefficients))
}
