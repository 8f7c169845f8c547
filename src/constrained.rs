//! Monotone polynomial regression
//!
//! The fit runs in two stages. Stage one is an ordinary least-squares polynomial fit. If the
//! requested shape is already satisfied on the sample domain the stage one coefficients are
//! returned as they are. Otherwise the analytic derivative of the stage one polynomial is sampled on
//! an even grid over `[min(x), max(x)]`, shifted until it clears zero by `slack`, and re-fitted in
//! the derivative basis `k x^(k - 1)`. Only the linear coefficient of the stage one fit is replaced
//! by the re-fitted one.
//!
//! Because the shifted target differs from the stage one derivative by a constant, the derivative
//! basis represents it exactly and the spliced polynomial's derivative equals the shifted target
//! on the grid.

use std::fmt;
use std::str::FromStr;

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ensure_same_length;
use crate::math::{linspace, vandermonde};
use crate::polyfit::{polyfit, Polynomial};
use crate::solver::least_squares;
use crate::{Error, Result};

/// Shape constraint applied to a fitted polynomial
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The derivative is non-negative over the fitted domain
    #[serde(alias = "inc")]
    Increasing,
    /// The derivative is non-positive over the fitted domain
    #[serde(alias = "dec")]
    Decreasing,
    /// An ordinary least-squares fit
    #[default]
    #[serde(alias = "orig")]
    Unconstrained,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "increasing" | "inc" => Ok(Self::Increasing),
            "decreasing" | "dec" => Ok(Self::Decreasing),
            "unconstrained" | "orig" => Ok(Self::Unconstrained),
            other => Err(Error::Shape(format!(
                "fit mode must be increasing, decreasing or unconstrained, found `{other}`"
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Increasing => "increasing",
            Self::Decreasing => "decreasing",
            Self::Unconstrained => "unconstrained",
        };
        write!(f, "{name}")
    }
}

const fn default_slack() -> f64 {
    0.1
}

/// Configuration of a single constrained polynomial fit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstrainedFit {
    /// Polynomial order
    pub order: usize,
    #[serde(default)]
    pub mode: Mode,
    /// Margin by which the derivative must clear zero. Only the magnitude is used.
    #[serde(default = "default_slack")]
    pub slack: f64,
    /// Number of grid points on which the derivative is constrained. Defaults to the sample count.
    #[serde(default)]
    pub discretization_count: Option<usize>,
}

impl ConstrainedFit {
    pub const fn new(order: usize, mode: Mode, slack: f64) -> Self {
        Self {
            order,
            mode,
            slack,
            discretization_count: None,
        }
    }

    pub const fn unconstrained(order: usize) -> Self {
        Self::new(order, Mode::Unconstrained, default_slack())
    }

    #[must_use]
    pub const fn with_discretization_count(mut self, count: usize) -> Self {
        self.discretization_count = Some(count);
        self
    }

    /// Check the configuration can be applied to a fit.
    ///
    /// # Errors
    /// Fails if a constrained mode has zero or non-finite slack, or if the discretization count is
    /// zero.
    pub fn validate(&self) -> Result<()> {
        if self.mode != Mode::Unconstrained && (self.slack == 0.0 || !self.slack.is_finite()) {
            return Err(Error::Configuration(format!(
                "slack must be non-zero and finite for a {} fit, found {}",
                self.mode, self.slack
            )));
        }
        if self.discretization_count == Some(0) {
            return Err(Error::Configuration(
                "discretization count must be positive".to_owned(),
            ));
        }
        Ok(())
    }

    /// Fit a polynomial of `y` on `x` honouring the configured shape constraint
    ///
    /// # Errors
    /// - [`Error::Shape`] if `x` and `y` have different lengths
    /// - [`Error::Configuration`] if the configuration is invalid, see [`Self::validate`]
    /// - [`Error::Numerical`] if either least-squares stage cannot be solved
    pub fn fit(&self, x: &[f64], y: &[f64]) -> Result<Polynomial> {
        ensure_same_length("constrained fit", x.len(), y.len())?;
        self.validate()?;

        let first_stage = polyfit(x, y, self.order)?;
        let increasing = match self.mode {
            Mode::Unconstrained => return Ok(first_stage),
            Mode::Increasing => true,
            Mode::Decreasing => false,
        };

        let (x_min, x_max) = x
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &xi| {
                (lo.min(xi), hi.max(xi))
            });
        let grid = linspace(
            x_min,
            x_max,
            self.discretization_count.unwrap_or(x.len()),
        );
        let derivative = first_stage.derivative_all(&grid);
        let slack = self.slack.abs();

        let target: Vec<f64> = if increasing {
            let lowest = derivative.iter().copied().fold(f64::INFINITY, f64::min);
            if lowest >= 0.0 {
                debug!(order = self.order, "fit is already monotonically increasing");
                return Ok(first_stage);
            }
            debug!(lowest, slack, "shifting derivative to enforce increasing fit");
            derivative.iter().map(|d| d - lowest + slack).collect()
        } else {
            let highest = derivative.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if highest <= 0.0 {
                debug!(order = self.order, "fit is already monotonically decreasing");
                return Ok(first_stage);
            }
            debug!(highest, slack, "shifting derivative to enforce decreasing fit");
            derivative.iter().map(|d| d - highest - slack).collect()
        };

        let second_stage = fit_derivative(&grid, &target, self.order)?;
        let mut coefficients = first_stage.into_coefficients();
        coefficients[1] = second_stage[0];
        Ok(Polynomial::new(coefficients))
    }
}

/// Least-squares fit of `target` in the derivative basis `k x^(k - 1)` for `k = 1..=order`
///
/// The returned coefficients are `[b1, b2, ..., b_order]` of the polynomial whose derivative
/// approximates `target`.
fn fit_derivative(grid: &[f64], target: &[f64], order: usize) -> Result<Array1<f64>> {
    #[allow(clippy::cast_precision_loss)]
    let multipliers: Array1<f64> = (1..=order).map(|k| k as f64).collect();
    let design = vandermonde(grid, order - 1)? * &multipliers;
    let solution = least_squares(&design, &Array1::from(target.to_vec()))?;
    Ok(solution.coefficients)
}

/// Fit a polynomial of `order` to `y` on `x` that is monotone in the direction given by `mode`
///
/// Convenience wrapper around [`ConstrainedFit::fit`].
///
/// # Errors
/// See [`ConstrainedFit::fit`].
pub fn constrained_polyfit(
    x: &[f64],
    y: &[f64],
    order: usize,
    mode: Mode,
    slack: f64,
    discretization_count: Option<usize>,
) -> Result<Polynomial> {
    ConstrainedFit {
        order,
        mode,
        slack,
        discretization_count,
    }
    .fit(x, y)
}
