use std::fs;
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constrained::{ConstrainedFit, Mode};
use crate::error::ensure_same_length;
use crate::margin::{mean_bias, resolution_x, resolution_xy, rmsd, Limits};
use crate::math::linspace;
use crate::piecewise::{Fitting, PiecewiseModel};
use crate::segment::Interval;
use crate::surface::Polynomial2D;
use crate::{Error, Result};

/// Configuration of a calibration run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of leading samples discarded while the sensor equilibrates
    pub equilibration_cut: usize,
    /// Voltage step used to estimate the resolution of each channel
    pub resolution_step: f64,
    pub tds: TdsConfig,
    pub turbidity: TurbidityConfig,
    pub limits: ReadingLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            equilibration_cut: 35,
            resolution_step: 0.8e-3,
            tds: TdsConfig::default(),
            turbidity: TurbidityConfig::default(),
            limits: ReadingLimits::default(),
        }
    }
}

/// Fit of total dissolved solids against TDS channel voltage and temperature
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TdsConfig {
    /// Order of the polynomial smoothing the raw voltage over sample index
    pub smoothing_order: usize,
    pub order_voltage: usize,
    pub order_temperature: usize,
    pub max_total_order: Option<usize>,
}

impl Default for TdsConfig {
    fn default() -> Self {
        Self {
            smoothing_order: 7,
            order_voltage: 7,
            order_temperature: 7,
            max_total_order: None,
        }
    }
}

/// Fit of turbidity against turbidity channel voltage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurbidityConfig {
    /// Order of the polynomial smoothing the raw voltage over sample index
    pub smoothing_order: usize,
    /// Split the voltage to turbidity curve at its inflection points
    pub split_at_inflections: bool,
    /// Monotone fit applied to the smoothed voltage
    pub monotone: ConstrainedFit,
    /// Fit applied to each piece of the voltage to turbidity curve
    pub model: ConstrainedFit,
}

impl Default for TurbidityConfig {
    fn default() -> Self {
        Self {
            smoothing_order: 5,
            split_at_inflections: false,
            monotone: ConstrainedFit::new(5, Mode::Decreasing, 1e-3),
            model: ConstrainedFit::unconstrained(3),
        }
    }
}

/// Physical range of each calibrated reading
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadingLimits {
    /// Nephelometric turbidity units
    pub turbidity: Limits,
    /// Parts per million
    pub tds: Limits,
}

impl Default for ReadingLimits {
    fn default() -> Self {
        Self {
            turbidity: Limits {
                min: 0.,
                max: 4000.,
            },
            tds: Limits { min: 0., max: 3000. },
        }
    }
}

impl Config {
    /// Read a configuration from a TOML file, filling unset fields with defaults
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid TOML or holds an invalid
    /// configuration.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Fails if the resolution step is not finite, a limit is not a range, or a fit configuration
    /// is invalid.
    pub fn validate(&self) -> Result<()> {
        if !self.resolution_step.is_finite() {
            return Err(Error::Configuration(format!(
                "resolution step must be finite, found {}",
                self.resolution_step
            )));
        }
        self.limits.turbidity.validate()?;
        self.limits.tds.validate()?;
        self.turbidity.monotone.validate()?;
        self.turbidity.model.validate()
    }
}

/// Paired reference and sensor samples recorded during calibration
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CalibrationSamples {
    /// Reference total dissolved solids (ppm)
    pub tds: Vec<f64>,
    /// Reference turbidity (NTU)
    pub turbidity: Vec<f64>,
    /// Reference water temperature
    pub temperature: Vec<f64>,
    pub turbidity_voltage: Vec<f64>,
    pub tds_voltage: Vec<f64>,
}

#[derive(Deserialize)]
struct Row(
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
);

impl Row {
    /// The row values, or `None` if any is missing or NaN
    fn values(&self) -> Option<[f64; 5]> {
        let values = [self.0?, self.1?, self.2?, self.3?, self.4?];
        values.iter().all(|v| !v.is_nan()).then_some(values)
    }
}

impl CalibrationSamples {
    /// # Errors
    /// Fails if the columns differ in length
    pub fn new(
        tds: Vec<f64>,
        turbidity: Vec<f64>,
        temperature: Vec<f64>,
        turbidity_voltage: Vec<f64>,
        tds_voltage: Vec<f64>,
    ) -> Result<Self> {
        let n = tds.len();
        ensure_same_length("turbidity samples", n, turbidity.len())?;
        ensure_same_length("temperature samples", n, temperature.len())?;
        ensure_same_length("turbidity voltage samples", n, turbidity_voltage.len())?;
        ensure_same_length("tds voltage samples", n, tds_voltage.len())?;
        Ok(Self {
            tds,
            turbidity,
            temperature,
            turbidity_voltage,
            tds_voltage,
        })
    }

    /// Read samples from a CSV file with a header row
    ///
    /// Columns are reference TDS, reference turbidity, reference temperature, turbidity channel
    /// voltage and TDS channel voltage. Rows with an empty or NaN field are dropped.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or a field is not a number.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)?;

        let mut samples = Self::default();
        let mut dropped = 0;
        for result in rdr.deserialize() {
            let row: Row = result?;
            let Some([tds, turbidity, temperature, turbidity_voltage, tds_voltage]) = row.values()
            else {
                dropped += 1;
                continue;
            };
            samples.tds.push(tds);
            samples.turbidity.push(turbidity);
            samples.temperature.push(temperature);
            samples.turbidity_voltage.push(turbidity_voltage);
            samples.tds_voltage.push(tds_voltage);
        }

        if dropped > 0 {
            warn!(dropped, path = %path.display(), "dropped incomplete calibration rows");
        }
        info!(num_samples = samples.len(), path = %path.display(), "read calibration samples");
        Ok(samples)
    }

    pub fn len(&self) -> usize {
        self.tds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tds.is_empty()
    }

    /// The samples remaining once the first `cut` are discarded
    ///
    /// # Errors
    /// Fails with [`Error::Configuration`] if no samples remain.
    pub fn after_equilibration(&self, cut: usize) -> Result<Self> {
        if cut >= self.len() {
            return Err(Error::Configuration(format!(
                "equilibration cut of {cut} leaves none of {} samples",
                self.len()
            )));
        }
        Ok(Self {
            tds: self.tds[cut..].to_vec(),
            turbidity: self.turbidity[cut..].to_vec(),
            temperature: self.temperature[cut..].to_vec(),
            turbidity_voltage: self.turbidity_voltage[cut..].to_vec(),
            tds_voltage: self.tds_voltage[cut..].to_vec(),
        })
    }
}

/// The calibrated models of both channels
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBundle {
    /// Turbidity as a function of turbidity channel voltage
    pub turbidity: PiecewiseModel,
    /// TDS as a function of TDS channel voltage and temperature
    pub tds: Polynomial2D,
}

impl CalibrationBundle {
    /// # Errors
    /// Returns an error if the bundle cannot be serialized or the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, toml::to_string(self)?)?;
        info!(path = %path.display(), "wrote calibration bundle");
        Ok(())
    }

    /// # Errors
    /// Returns an error if the file cannot be read or does not hold a valid bundle.
    pub fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let bundle = toml::from_str(&contents)?;
        info!(path = %path.display(), "read calibration bundle");
        Ok(bundle)
    }
}

/// Agreement of the calibrated models with the reference samples
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    /// ppm
    pub tds_rmsd: f64,
    /// ppm
    pub tds_mean_bias: f64,
    /// ppm per voltage step
    pub tds_resolution: f64,
    /// NTU
    pub turbidity_rmsd: f64,
    /// NTU
    pub turbidity_mean_bias: f64,
    /// NTU per voltage step
    pub turbidity_resolution: f64,
}

impl CalibrationReport {
    /// # Errors
    /// Returns an error if the report cannot be serialized or the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, toml::to_string(self)?)?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Calibration {
    pub bundle: CalibrationBundle,
    pub report: CalibrationReport,
}

/// Calibrate both channels from a CSV file of samples
///
/// # Errors
/// See [`CalibrationSamples::from_csv`] and [`calibrate`].
pub fn calibrate_file(path: &Path, config: &Config) -> Result<Calibration> {
    let samples = CalibrationSamples::from_csv(path)?;
    calibrate(&samples, config)
}

/// Fit the TDS surface and the turbidity model to the samples
///
/// # Errors
/// Returns an error if the configuration is invalid, the equilibration cut leaves no samples, or
/// any of the fits fail.
pub fn calibrate(samples: &CalibrationSamples, config: &Config) -> Result<Calibration> {
    config.validate()?;
    let samples = samples.after_equilibration(config.equilibration_cut)?;
    let index = sample_index(samples.len());

    // TDS
    let tds_voltage = ConstrainedFit::unconstrained(config.tds.smoothing_order)
        .fit(&index, &samples.tds_voltage)?
        .evaluate_all(&index);
    let grid = Array2::from_shape_fn((samples.len(), samples.len()), |(_, c)| samples.tds[c]);
    let surface = Polynomial2D::fit(
        &tds_voltage,
        &samples.temperature,
        &grid,
        config.tds.order_voltage,
        config.tds.order_temperature,
        config.tds.max_total_order,
    )?
    .polynomial;
    let tds_model = surface.evaluate_vec(&tds_voltage, &samples.temperature)?;
    let tds_rmsd = rmsd(&samples.tds, &tds_model)?;
    let tds_mean_bias = mean_bias(&samples.tds, &tds_model)?;
    info!(tds_rmsd, tds_mean_bias, "fitted TDS surface");

    // Turbidity
    let smoothed = ConstrainedFit::unconstrained(config.turbidity.smoothing_order)
        .fit(&index, &samples.turbidity_voltage)?
        .evaluate_all(&index);
    #[allow(clippy::cast_precision_loss)]
    let elements = linspace(0., samples.len() as f64, samples.len());
    let mut turbidity_voltage = config
        .turbidity
        .monotone
        .fit(&elements, &smoothed)?
        .evaluate_all(&elements);
    let mut turbidity = samples.turbidity.clone();
    if turbidity_voltage.first() > turbidity_voltage.last() {
        turbidity_voltage.reverse();
        turbidity.reverse();
    }

    let intervals =
        (!config.turbidity.split_at_inflections).then(|| vec![Interval::new(0, samples.len() - 1)]);
    let turbidity_model = PiecewiseModel::fit(
        &turbidity_voltage,
        &turbidity,
        &Fitting::Uniform(config.turbidity.model.clone()),
        intervals,
    )?;
    let predicted = turbidity_model.evaluate(&turbidity_voltage)?;
    let turbidity_rmsd = rmsd(&turbidity, &predicted)?;
    let turbidity_mean_bias = mean_bias(&turbidity, &predicted)?;
    info!(
        turbidity_rmsd,
        turbidity_mean_bias,
        num_segments = turbidity_model.segments().len(),
        "fitted turbidity model"
    );

    let turbidity_resolution = resolution_x(&turbidity_voltage, config.resolution_step, |v| {
        turbidity_model.evaluate(v)
    })?;
    let tds_resolution = resolution_xy(
        &tds_voltage,
        &samples.temperature,
        config.resolution_step,
        |v, t| surface.evaluate_vec(v, t),
    )?;
    info!(turbidity_resolution, tds_resolution, "computed resolution");

    Ok(Calibration {
        bundle: CalibrationBundle {
            turbidity: turbidity_model,
            tds: surface,
        },
        report: CalibrationReport {
            tds_rmsd,
            tds_mean_bias,
            tds_resolution,
            turbidity_rmsd,
            turbidity_mean_bias,
            turbidity_resolution,
        },
    })
}

/// `0, 1, ..., n - 1`
#[allow(clippy::cast_precision_loss)]
fn sample_index(n: usize) -> Vec<f64> {
    (0..n).map(|k| k as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::{CalibrationSamples, Config};
    use crate::constrained::Mode;
    use crate::Error;

    #[test]
    fn default_config_matches_bench_constants() {
        let config = Config::default();
        assert_eq!(config.equilibration_cut, 35);
        approx::assert_relative_eq!(config.resolution_step, 0.8e-3);
        assert_eq!(config.tds.order_voltage, 7);
        assert_eq!(config.tds.order_temperature, 7);
        assert_eq!(config.turbidity.monotone.mode, Mode::Decreasing);
        approx::assert_relative_eq!(config.turbidity.monotone.slack, 1e-3);
        assert_eq!(config.limits.turbidity.max, 4000.);
        assert_eq!(config.limits.tds.max, 3000.);
    }

    #[test]
    fn partial_toml_is_completed_with_defaults() {
        let config: Config = toml::from_str(
            r#"
            equilibration_cut = 10

            [tds]
            order_voltage = 3

            [turbidity.monotone]
            order = 4
            mode = "inc"
            slack = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.equilibration_cut, 10);
        assert_eq!(config.tds.order_voltage, 3);
        assert_eq!(config.tds.order_temperature, 7);
        assert_eq!(config.turbidity.monotone.order, 4);
        assert_eq!(config.turbidity.monotone.mode, Mode::Increasing);
        assert_eq!(config.turbidity.smoothing_order, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_survives_a_toml_round_trip() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn inverted_limits_are_rejected() {
        let mut config = Config::default();
        config.limits.tds.min = 5000.;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn equilibration_cut_must_leave_samples() {
        let samples = CalibrationSamples::new(
            vec![1., 2.],
            vec![1., 2.],
            vec![1., 2.],
            vec![1., 2.],
            vec![1., 2.],
        )
        .unwrap();
        assert_eq!(samples.after_equilibration(1).unwrap().tds, vec![2.]);
        assert!(matches!(
            samples.after_equilibration(2),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn mismatched_columns_are_rejected() {
        assert!(matches!(
            CalibrationSamples::new(vec![1.], vec![1.], vec![1., 2.], vec![1.], vec![1.]),
            Err(Error::Shape(_))
        ));
    }
}
