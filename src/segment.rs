//! Concavity based segmentation of a sampled curve
//!
//! A curve is split wherever the numerical second derivative (unit spacing, so `x` does not enter)
//! changes sign. Each resulting piece is either concave up or concave down and is a candidate for a
//! single monotone polynomial.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ensure_same_length;
use crate::math::gradient;
use crate::{Error, Result};

/// An inclusive pair of sample indices `[start, end]`
///
/// Consecutive intervals of a decomposition share their boundary index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawInterval")]
pub struct Interval {
    pub start: usize,
    pub end: usize,
}

#[derive(Deserialize)]
struct RawInterval {
    start: usize,
    end: usize,
}

impl TryFrom<RawInterval> for Interval {
    type Error = Error;

    fn try_from(raw: RawInterval) -> Result<Self> {
        Self::try_new(raw.start, raw.end)
    }
}

impl Interval {
    /// # Panics
    /// If `start > end`
    pub fn new(start: usize, end: usize) -> Self {
        assert!(start <= end, "interval start {start} is after its end {end}");
        Self { start, end }
    }

    /// # Errors
    /// Fails with [`Error::Order`] if `start > end`
    pub fn try_new(start: usize, end: usize) -> Result<Self> {
        if start > end {
            return Err(Error::Order(format!(
                "interval start {start} is after its end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub const fn is_reversed(&self) -> bool {
        self.start > self.end
    }

    /// The number of samples covered, counting both end points. Zero for a reversed interval.
    pub const fn len(&self) -> usize {
        if self.is_reversed() {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub const fn is_degenerate(&self) -> bool {
        self.start == self.end
    }

    /// The samples of `values` covered by the interval, or `None` if it runs past the end
    pub fn slice<'a>(&self, values: &'a [f64]) -> Option<&'a [f64]> {
        values.get(self.start..=self.end)
    }
}

impl From<(usize, usize)> for Interval {
    fn from((start, end): (usize, usize)) -> Self {
        Self::new(start, end)
    }
}

/// Indices at which the second derivative of `y` changes sign
///
/// An index `k` is reported when `y''[k - 1]` and `y''[k]` have strictly opposite signs. A run of
/// exact zeros between two values of opposite sign counts as one change, reported at the first zero
/// of the run. A run of zeros between values of the same sign is not a change.
pub fn inflection_points(y: &[f64]) -> Vec<usize> {
    let second_derivative = gradient(&gradient(y));

    let mut points = vec![];
    let mut last_signed: Option<(usize, bool)> = None;
    for (k, value) in second_derivative.iter().enumerate() {
        if *value == 0.0 || value.is_nan() {
            continue;
        }
        let positive = *value > 0.0;
        if let Some((index, was_positive)) = last_signed {
            if positive != was_positive {
                points.push(index + 1);
            }
        }
        last_signed = Some((k, positive));
    }
    points
}

/// Split the curve `(x, y)` into pieces of constant concavity
///
/// Returns the intervals between consecutive inflection points, with the first interval starting
/// at `0` and the last ending at `n - 1`. An empty list means no inflection was found and the
/// whole curve is one piece. A single inflection at either end point gives the single interval
/// `[0, n - 1]`. Intervals with equal end points are dropped.
///
/// # Errors
/// Fails if `x` and `y` have different lengths.
pub fn identify_segments(x: &[f64], y: &[f64]) -> Result<Vec<Interval>> {
    ensure_same_length("curve segmentation", x.len(), y.len())?;
    let n = y.len();
    let points = inflection_points(y);
    debug!(?points, "found inflection points");

    let intervals = match points.as_slice() {
        [] => vec![],
        [only] if *only == 0 || *only == n - 1 => vec![Interval::new(0, n - 1)],
        _ => std::iter::once(0)
            .chain(points.iter().copied())
            .chain(std::iter::once(n - 1))
            .tuple_windows()
            .map(|(start, end)| Interval::new(start, end))
            .filter(|interval| !interval.is_degenerate())
            .collect(),
    };

    Ok(intervals)
}
