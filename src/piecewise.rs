//! Piecewise polynomial models
//!
//! A [`PiecewiseModel`] is an ordered list of [`Segment`]s, each holding the polynomial fitted over
//! one interval of the calibration samples. Segments are ordered by ascending `x`, which is checked
//! when the model is built.
//!
//! Evaluation scans the segments in order over a monotonic query. For each segment the query
//! indices nearest its `x` bounds delimit the points it evaluates. The first segment also takes
//! every point below its lower bound and the last segment every point above its lower bound, so
//! the model extrapolates at both ends. Where two segments claim the same boundary point the later
//! segment's value is kept.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constrained::ConstrainedFit;
use crate::error::ensure_same_length;
use crate::math::{is_monotonic, nearest_index};
use crate::polyfit::Polynomial;
use crate::segment::{identify_segments, Interval};
use crate::{Error, Result};

/// A polynomial valid over one interval of the calibration samples
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    coefficients: Polynomial,
    /// The first and last sample `x` of the interval
    x_interval: (f64, f64),
    /// Sample indices the polynomial was fitted over
    original_interval: Interval,
}

impl Segment {
    pub const fn new(
        original_interval: Interval,
        x_interval: (f64, f64),
        coefficients: Polynomial,
    ) -> Self {
        Self {
            coefficients,
            x_interval,
            original_interval,
        }
    }

    pub const fn original_interval(&self) -> Interval {
        self.original_interval
    }

    pub const fn x_interval(&self) -> (f64, f64) {
        self.x_interval
    }

    pub const fn coefficients(&self) -> &Polynomial {
        &self.coefficients
    }

    pub fn set_original_interval(&mut self, original_interval: Interval) {
        self.original_interval = original_interval;
    }

    pub fn set_x_interval(&mut self, x_interval: (f64, f64)) {
        self.x_interval = x_interval;
    }

    pub fn set_coefficients(&mut self, coefficients: Polynomial) {
        self.coefficients = coefficients;
    }
}

/// How fit configurations are assigned to intervals
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fitting {
    /// Apply one configuration to every interval
    Uniform(ConstrainedFit),
    /// One configuration per interval, in interval order
    PerInterval(Vec<ConstrainedFit>),
}

impl Fitting {
    /// The configuration for each of `num_intervals` intervals
    fn assign(&self, num_intervals: usize) -> Result<Vec<&ConstrainedFit>> {
        let configs = match self {
            Self::Uniform(config) => vec![config; num_intervals],
            Self::PerInterval(configs) => {
                if configs.len() != num_intervals {
                    return Err(Error::Configuration(format!(
                        "{} fit configurations supplied for {num_intervals} intervals",
                        configs.len()
                    )));
                }
                configs.iter().collect()
            }
        };
        for config in &configs {
            config.validate()?;
        }
        Ok(configs)
    }
}

impl From<ConstrainedFit> for Fitting {
    fn from(config: ConstrainedFit) -> Self {
        Self::Uniform(config)
    }
}

#[derive(Serialize, Deserialize)]
struct SegmentList {
    segments: Vec<Segment>,
}

/// An ordered collection of polynomial segments
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SegmentList", into = "SegmentList")]
pub struct PiecewiseModel {
    segments: Vec<Segment>,
}

impl TryFrom<SegmentList> for PiecewiseModel {
    type Error = Error;

    fn try_from(list: SegmentList) -> Result<Self> {
        Self::new(list.segments)
    }
}

impl From<PiecewiseModel> for SegmentList {
    fn from(model: PiecewiseModel) -> Self {
        Self {
            segments: model.segments,
        }
    }
}

impl PiecewiseModel {
    /// Build a model from segments ordered by ascending `x`
    ///
    /// # Errors
    /// - [`Error::Configuration`] if there are no segments
    /// - [`Error::Order`] if a segment's `x` or index interval is reversed, if the index intervals
    ///   leave a gap or overlap, or if the segments are not in ascending order
    pub fn new(segments: Vec<Segment>) -> Result<Self> {
        if segments.is_empty() {
            return Err(Error::Configuration(
                "a piecewise model needs at least one segment".to_owned(),
            ));
        }
        let intervals: Vec<Interval> = segments.iter().map(|s| s.original_interval).collect();
        check_contiguous(&intervals)?;
        for segment in &segments {
            let (lower, upper) = segment.x_interval;
            if lower > upper {
                return Err(Error::Order(format!(
                    "segment x interval ({lower}, {upper}) is reversed"
                )));
            }
        }
        for pair in segments.windows(2) {
            if pair[1].x_interval.0 < pair[0].x_interval.0 {
                return Err(Error::Order(format!(
                    "segment starting at {} follows a segment starting at {}",
                    pair[1].x_interval.0, pair[0].x_interval.0
                )));
            }
        }
        Ok(Self { segments })
    }

    /// Fit a piecewise monotone model to the samples `(x, y)`
    ///
    /// When `intervals` is `None` the curve is split at its inflection points. If no split is
    /// supplied or found the whole range of samples forms one segment. Every configuration is
    /// validated before any segment is fitted.
    ///
    /// # Errors
    /// - [`Error::Shape`] if `x` and `y` differ in length, there are no samples, or an interval
    ///   runs past the samples
    /// - [`Error::Configuration`] if a per-interval fitting has the wrong number of configurations
    ///   or any configuration is invalid
    /// - [`Error::Numerical`] if a segment cannot be fitted
    /// - [`Error::Order`] if an interval is reversed, the intervals are not contiguous, or the
    ///   fitted segments are not in ascending `x`
    pub fn fit(
        x: &[f64],
        y: &[f64],
        fitting: &Fitting,
        intervals: Option<Vec<Interval>>,
    ) -> Result<Self> {
        ensure_same_length("piecewise fit", x.len(), y.len())?;
        if x.is_empty() {
            return Err(Error::Shape("piecewise fit needs at least one sample".to_owned()));
        }

        let mut intervals = match intervals {
            Some(intervals) => intervals,
            None => identify_segments(x, y)?,
        };
        if intervals.is_empty() {
            intervals.push(Interval::new(0, x.len() - 1));
        }
        check_contiguous(&intervals)?;
        let configs = fitting.assign(intervals.len())?;

        let segments = intervals
            .into_iter()
            .zip(configs)
            .map(|(interval, config)| {
                let (xs, ys) = interval
                    .slice(x)
                    .zip(interval.slice(y))
                    .ok_or_else(|| {
                        Error::Shape(format!(
                            "interval [{}, {}] runs past {} samples",
                            interval.start,
                            interval.end,
                            x.len()
                        ))
                    })?;
                let coefficients = config.fit(xs, ys)?;
                debug!(
                    start = interval.start,
                    end = interval.end,
                    mode = %config.mode,
                    "fitted segment"
                );
                Ok(Segment::new(
                    interval,
                    (xs[0], xs[xs.len() - 1]),
                    coefficients,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        info!(num_segments = segments.len(), "fitted piecewise model");
        Self::new(segments)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn into_segments(self) -> Vec<Segment> {
        self.segments
    }

    /// Evaluate the model at every point of a monotonic `query`
    ///
    /// # Errors
    /// Fails with [`Error::Order`] if `query` is neither non-decreasing nor non-increasing.
    pub fn evaluate(&self, query: &[f64]) -> Result<Vec<f64>> {
        if !is_monotonic(query) {
            return Err(Error::Order(
                "query must be monotonically increasing or decreasing".to_owned(),
            ));
        }

        match (query.first(), query.last()) {
            (Some(first), Some(last)) if first > last => {
                let ascending = query.iter().rev().copied().collect::<Vec<_>>();
                let mut values = self.evaluate_ascending(&ascending);
                values.reverse();
                Ok(values)
            }
            _ => Ok(self.evaluate_ascending(query)),
        }
    }

    fn evaluate_ascending(&self, x: &[f64]) -> Vec<f64> {
        let n = x.len();
        let mut y = vec![0.0; n];
        let (Some(&x_first), Some(&x_last)) = (x.first(), x.last()) else {
            return y;
        };

        let lowest = self.segments[0].x_interval.0;
        let highest = self.segments[self.segments.len() - 1].x_interval.0;
        let mut start = 0;
        let mut end = self.segments.len();
        if x_first < lowest && x_last < lowest {
            end = 1;
        }
        if x_first > highest && x_last > highest {
            start = end - 1;
        }

        for k in start..end {
            let segment = &self.segments[k];
            let lo = if k == 0 {
                0
            } else {
                nearest_index(x, segment.x_interval.0).unwrap_or(0)
            };
            let hi = if k == end - 1 {
                n - 1
            } else {
                nearest_index(x, segment.x_interval.1).unwrap_or(n - 1)
            };
            for ii in lo..=hi {
                y[ii] = segment.coefficients.evaluate(x[ii]);
            }
        }
        y
    }
}

/// Each interval runs forwards and starts where the previous one ends
fn check_contiguous(intervals: &[Interval]) -> Result<()> {
    if let Some(reversed) = intervals.iter().find(|interval| interval.is_reversed()) {
        return Err(Error::Order(format!(
            "interval [{}, {}] is reversed",
            reversed.start, reversed.end
        )));
    }
    for pair in intervals.windows(2) {
        if pair[0].end != pair[1].start {
            return Err(Error::Order(format!(
                "interval [{}, {}] does not start where [{}, {}] ends",
                pair[1].start, pair[1].end, pair[0].start, pair[0].end
            )));
        }
    }
    Ok(())
}
