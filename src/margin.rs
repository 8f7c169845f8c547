//! Error margins of a calibrated model
//!
//! Agreement with reference values is summarised by the root-mean-square deviation and the mean
//! bias. The resolution of a channel is the mean change in the calibrated reading caused by a small
//! step `dv` in the measured voltage.

use serde::{Deserialize, Serialize};

use crate::error::ensure_same_length;
use crate::{Error, Result};

/// Closed range a reading is clamped into
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub min: f64,
    pub max: f64,
}

impl Limits {
    /// # Errors
    /// Fails if `min > max` or either bound is NaN
    pub fn new(min: f64, max: f64) -> Result<Self> {
        let limits = Self { min, max };
        limits.validate()?;
        Ok(limits)
    }

    /// # Errors
    /// Fails if `min > max` or either bound is NaN
    pub fn validate(&self) -> Result<()> {
        if self.min.is_nan() || self.max.is_nan() || self.min > self.max {
            return Err(Error::Configuration(format!(
                "limits [{}, {}] do not form a range",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

fn ensure_not_empty(context: &str, len: usize) -> Result<()> {
    if len == 0 {
        return Err(Error::Shape(format!("{context} needs at least one sample")));
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn mean(sum: f64, len: usize) -> f64 {
    sum / len as f64
}

/// Root-mean-square deviation between `actual` and `predicted`
///
/// # Errors
/// Fails if the inputs differ in length or are empty
pub fn rmsd(actual: &[f64], predicted: &[f64]) -> Result<f64> {
    ensure_same_length("rmsd", actual.len(), predicted.len())?;
    ensure_not_empty("rmsd", actual.len())?;
    let sum_of_squares: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    Ok(mean(sum_of_squares, actual.len()).sqrt())
}

/// Mean of `model - known`, in the units of the data
///
/// # Errors
/// Fails if the inputs differ in length or are empty
pub fn mean_bias(known: &[f64], model: &[f64]) -> Result<f64> {
    ensure_same_length("mean bias", known.len(), model.len())?;
    ensure_not_empty("mean bias", known.len())?;
    let sum: f64 = known.iter().zip(model).map(|(k, m)| m - k).sum();
    Ok(mean(sum, known.len()))
}

/// Resolution of a single-input calibration `f` about the voltages `v`
///
/// Computes `|Σ_{k=1}^{n-1} (f(v)[k] - f(v + dv)[k])| / n`. The first sample does not contribute
/// but is counted in `n`. `f` is evaluated once on `v` and once on `v + dv`.
///
/// # Errors
/// Fails if `v` is empty, or if `f` fails or returns the wrong number of values
pub fn resolution_x<F>(v: &[f64], dv: f64, f: F) -> Result<f64>
where
    F: Fn(&[f64]) -> Result<Vec<f64>>,
{
    ensure_not_empty("resolution", v.len())?;
    let stepped: Vec<f64> = v.iter().map(|v| v + dv).collect();
    let base = f(v)?;
    let shifted = f(&stepped)?;
    ensure_same_length("resolution model output", v.len(), base.len())?;
    ensure_same_length("resolution model output", v.len(), shifted.len())?;

    let sum: f64 = base.iter().zip(&shifted).skip(1).map(|(a, b)| a - b).sum();
    Ok(mean(sum, v.len()).abs())
}

/// Resolution of a calibration `f(v, t)` about the voltages `v` at temperatures `t`
///
/// As [`resolution_x`], with the temperature held fixed while the voltage is stepped.
///
/// # Errors
/// Fails if `v` and `t` differ in length or are empty, or if `f` fails or returns the wrong number
/// of values
pub fn resolution_xy<F>(v: &[f64], t: &[f64], dv: f64, f: F) -> Result<f64>
where
    F: Fn(&[f64], &[f64]) -> Result<Vec<f64>>,
{
    ensure_same_length("resolution temperature", v.len(), t.len())?;
    resolution_x(v, dv, |v| f(v, t))
}

/// Clamp every value into `limits`, leaving NaN untouched
pub fn clamp(values: &[f64], limits: Limits) -> Vec<f64> {
    values
        .iter()
        .map(|&value| {
            if value < limits.min {
                limits.min
            } else if value > limits.max {
                limits.max
            } else {
                value
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use ndarray_rand::rand::{Rng, SeedableRng};
    use rand_isaac::Isaac64Rng;

    use super::{clamp, mean_bias, resolution_x, resolution_xy, rmsd, Limits};
    use crate::math::linspace;
    use crate::{Error, Result};

    #[test]
    fn rmsd_of_constant_offset_is_the_offset() -> Result<()> {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let actual: Vec<f64> = (0..50).map(|_| rng.gen_range(0.0..100.0)).collect();
        let predicted: Vec<f64> = actual.iter().map(|a| a - 2.5).collect();

        approx::assert_relative_eq!(rmsd(&actual, &predicted)?, 2.5, max_relative = 1e-12);
        approx::assert_relative_eq!(mean_bias(&actual, &predicted)?, -2.5, max_relative = 1e-12);
        Ok(())
    }

    #[test]
    fn mean_bias_cancels_symmetric_errors() -> Result<()> {
        let known = [1., 2., 3., 4.];
        let model = [2., 1., 4., 3.];
        approx::assert_abs_diff_eq!(mean_bias(&known, &model)?, 0.);
        approx::assert_relative_eq!(rmsd(&known, &model)?, 1.);
        Ok(())
    }

    #[test]
    fn metrics_reject_mismatched_or_empty_inputs() {
        assert!(matches!(rmsd(&[1., 2.], &[1.]), Err(Error::Shape(_))));
        assert!(matches!(mean_bias(&[], &[]), Err(Error::Shape(_))));
    }

    #[test]
    fn resolution_of_a_linear_model_is_its_slope_times_the_step() -> Result<()> {
        let v = linspace(0.5, 2.5, 11);
        let dv = 0.8e-3;
        let resolution = resolution_x(&v, dv, |v| Ok(v.iter().map(|v| 300. - 120. * v).collect()))?;
        // ten of the eleven samples contribute 120 dv each
        approx::assert_relative_eq!(resolution, 120. * dv * 10. / 11., max_relative = 1e-9);
        Ok(())
    }

    #[test]
    fn resolution_holds_temperature_fixed() -> Result<()> {
        let v = linspace(1., 2., 5);
        let t = linspace(10., 30., 5);
        let resolution = resolution_xy(&v, &t, 1e-3, |v, t| {
            Ok(v.iter().zip(t).map(|(v, t)| 50. * v + t * t).collect())
        })?;
        approx::assert_relative_eq!(resolution, 50. * 1e-3 * 4. / 5., max_relative = 1e-9);

        assert!(matches!(
            resolution_xy(&v, &t[..3], 1e-3, |v, _| Ok(v.to_vec())),
            Err(Error::Shape(_))
        ));
        Ok(())
    }

    #[test]
    fn clamp_bounds_values_and_keeps_nan() -> Result<()> {
        let limits = Limits::new(0., 4000.)?;
        let clamped = clamp(&[-3., 12., 5000., f64::NAN], limits);
        assert_eq!(&clamped[..3], &[0., 12., 4000.]);
        assert!(clamped[3].is_nan());
        Ok(())
    }

    #[test]
    fn inverted_limits_are_rejected() {
        assert!(matches!(Limits::new(5., 1.), Err(Error::Configuration(_))));
    }
}
