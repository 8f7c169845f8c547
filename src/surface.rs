//! Bivariate polynomial surfaces
//!
//! A surface `z = Σ c_k x^i_k y^j_k` is fitted to values laid out on the grid spanned by two sample
//! vectors. The value array `z` has one row per `y` sample and one column per `x` sample, so `z[[r,
//! c]]` is the value at `(x[c], y[r])`.
//!
//! Fitted surfaces work in normalized inputs: each sample vector is mapped onto `[-1, 1]` before the
//! design is built, and the map is stored with the coefficients so evaluation applies it too.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ensure_same_length;
use crate::math::{outer_product, powers};
use crate::solver::least_squares;
use crate::{Error, Result};

/// Exponents `(i, j)` of the term `x^i y^j`
pub type Term = (usize, usize);

/// The affine map `v -> (v - offset) / scale` applied to one surface input
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    pub offset: f64,
    pub scale: f64,
}

impl Default for Normalization {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Normalization {
    pub const IDENTITY: Self = Self {
        offset: 0.,
        scale: 1.,
    };

    /// The map taking the range of `v` onto `[-1, 1]`
    ///
    /// Empty or constant samples give the identity.
    pub fn spanning(v: &[f64]) -> Self {
        let (lo, hi) = v
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &vi| {
                (lo.min(vi), hi.max(vi))
            });
        let half_range = (hi - lo) / 2.;
        if half_range.is_normal() {
            Self {
                offset: lo + half_range,
                scale: half_range,
            }
        } else {
            Self::IDENTITY
        }
    }

    pub fn apply(&self, v: f64) -> f64 {
        (v - self.offset) / self.scale
    }

    /// # Errors
    /// Fails with [`Error::Configuration`] if the offset is not finite or the scale is zero,
    /// subnormal or not finite
    pub fn validate(&self) -> Result<()> {
        if !self.offset.is_finite() || !self.scale.is_normal() {
            return Err(Error::Configuration(format!(
                "normalization offset {} and scale {} do not define an invertible map",
                self.offset, self.scale
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct RawSurface {
    coefficients: Vec<f64>,
    terms: Vec<Term>,
    #[serde(default)]
    x_normalization: Normalization,
    #[serde(default)]
    y_normalization: Normalization,
}

/// A bivariate polynomial as parallel lists of coefficients and term exponents
///
/// Terms are powers of the normalized inputs. A surface built with [`Polynomial2D::new`] uses the
/// identity map, so its terms are powers of the raw inputs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSurface")]
pub struct Polynomial2D {
    coefficients: Vec<f64>,
    terms: Vec<Term>,
    x_normalization: Normalization,
    y_normalization: Normalization,
}

impl TryFrom<RawSurface> for Polynomial2D {
    type Error = Error;

    fn try_from(raw: RawSurface) -> Result<Self> {
        Self::new(raw.coefficients, raw.terms)?
            .with_normalization(raw.x_normalization, raw.y_normalization)
    }
}

/// A fitted surface together with its residual
#[derive(Clone, Debug)]
pub struct SurfaceFit {
    pub polynomial: Polynomial2D,
    /// `Σ (model - z)²` over every grid point
    pub residual_sum_of_squares: f64,
}

impl Polynomial2D {
    /// # Errors
    /// Fails if `coefficients` and `terms` differ in length
    pub fn new(coefficients: Vec<f64>, terms: Vec<Term>) -> Result<Self> {
        ensure_same_length("surface terms", coefficients.len(), terms.len())?;
        Ok(Self {
            coefficients,
            terms,
            x_normalization: Normalization::IDENTITY,
            y_normalization: Normalization::IDENTITY,
        })
    }

    /// Replace the maps applied to `x` and `y` before the terms are evaluated
    ///
    /// # Errors
    /// Fails if either map is not invertible, see [`Normalization::validate`]
    pub fn with_normalization(mut self, x: Normalization, y: Normalization) -> Result<Self> {
        x.validate()?;
        y.validate()?;
        self.x_normalization = x;
        self.y_normalization = y;
        Ok(self)
    }

    pub const fn x_normalization(&self) -> Normalization {
        self.x_normalization
    }

    pub const fn y_normalization(&self) -> Normalization {
        self.y_normalization
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// The coefficient of `x^i y^j` in normalized inputs, if the term is present
    pub fn coefficient(&self, term: Term) -> Option<f64> {
        self.terms
            .iter()
            .position(|t| *t == term)
            .map(|k| self.coefficients[k])
    }

    /// Evaluate at a single point
    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        let (x, y) = (self.x_normalization.apply(x), self.y_normalization.apply(y));
        self.coefficients
            .iter()
            .zip(&self.terms)
            .map(|(c, &(i, j))| c * x.powi(exponent(i)) * y.powi(exponent(j)))
            .sum()
    }

    /// Evaluate at each pair `(x[k], y[k])`
    ///
    /// # Errors
    /// Fails if `x` and `y` differ in length
    pub fn evaluate_vec(&self, x: &[f64], y: &[f64]) -> Result<Vec<f64>> {
        ensure_same_length("surface evaluation", x.len(), y.len())?;
        Ok(x.iter()
            .zip(y)
            .map(|(&xi, &yi)| self.evaluate(xi, yi))
            .collect())
    }

    /// Least-squares fit of a surface to the grid values `z`
    ///
    /// Terms are enumerated with the `y` exponent `j` in `0..=order_y` in the outer position and the
    /// `x` exponent `i` in `0..=order_x` in the inner position. With `max_total_order` set, terms with
    /// `i + j` above it are left out of the solve and reported with a coefficient of exactly zero.
    /// Each input is normalized by [`Normalization::spanning`] its samples.
    ///
    /// # Errors
    /// - [`Error::Shape`] if `z` is not `y.len()` rows by `x.len()` columns
    /// - [`Error::Numerical`] if the grid cannot identify every retained term
    pub fn fit(
        x: &[f64],
        y: &[f64],
        z: &Array2<f64>,
        order_x: usize,
        order_y: usize,
        max_total_order: Option<usize>,
    ) -> Result<SurfaceFit> {
        let (rows, columns) = z.dim();
        ensure_same_length("surface grid rows", y.len(), rows)?;
        ensure_same_length("surface grid columns", x.len(), columns)?;

        let terms: Vec<Term> = (0..=order_y)
            .flat_map(|j| (0..=order_x).map(move |i| (i, j)))
            .collect();
        let retained: Vec<usize> = terms
            .iter()
            .enumerate()
            .filter(|(_, (i, j))| max_total_order.map_or(true, |max| i + j <= max))
            .map(|(k, _)| k)
            .collect();

        let x_normalization = Normalization::spanning(x);
        let y_normalization = Normalization::spanning(y);
        let x_normalized: Vec<f64> = x.iter().map(|&v| x_normalization.apply(v)).collect();
        let y_normalized: Vec<f64> = y.iter().map(|&v| y_normalization.apply(v)).collect();
        let x_powers = power_table(&x_normalized, order_x);
        let y_powers = power_table(&y_normalized, order_y);
        let mut design = Array2::zeros((rows * columns, retained.len()));
        for (column, &k) in retained.iter().enumerate() {
            let (i, j) = terms[k];
            let grid = outer_product(&y_powers.column(j).to_owned(), &x_powers.column(i).to_owned())?;
            design
                .column_mut(column)
                .assign(&grid.into_shape(rows * columns)?);
        }
        let target: Array1<f64> = z.iter().copied().collect();

        let solution = least_squares(&design, &target)?;
        let mut coefficients = vec![0.0; terms.len()];
        for (&k, c) in retained.iter().zip(solution.coefficients.iter()) {
            coefficients[k] = *c;
        }
        debug!(
            num_terms = terms.len(),
            num_retained = retained.len(),
            residual_sum_of_squares = solution.residual_sum_of_squares,
            "fitted polynomial surface"
        );

        Ok(SurfaceFit {
            polynomial: Self::new(coefficients, terms)?
                .with_normalization(x_normalization, y_normalization)?,
            residual_sum_of_squares: solution.residual_sum_of_squares,
        })
    }
}

/// Row `k` holds `v[k]^0, ..., v[k]^degree`
fn power_table(v: &[f64], degree: usize) -> Array2<f64> {
    let mut table = Array2::zeros((v.len(), degree + 1));
    for (mut row, &value) in table.axis_iter_mut(Axis(0)).zip(v) {
        for (entry, power) in row.iter_mut().zip(powers(value, degree)) {
            *entry = power;
        }
    }
    table
}

fn exponent(power: usize) -> i32 {
    i32::try_from(power).unwrap_or(i32::MAX)
}
