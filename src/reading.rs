//! Conversion of raw sensor voltages into calibrated readings

use std::path::Path;

use crate::calibration::{CalibrationBundle, ReadingLimits};
use crate::margin::clamp;
use crate::Result;

/// Applies a calibration bundle to field measurements
///
/// Every reading is clamped into the physical range of its channel.
#[derive(Clone, Debug)]
pub struct SensorProcessor {
    bundle: CalibrationBundle,
    limits: ReadingLimits,
}

impl SensorProcessor {
    /// # Errors
    /// Fails if either limit is not a range
    pub fn new(bundle: CalibrationBundle, limits: ReadingLimits) -> Result<Self> {
        limits.turbidity.validate()?;
        limits.tds.validate()?;
        Ok(Self { bundle, limits })
    }

    /// Load the bundle written by a calibration run
    ///
    /// # Errors
    /// Fails if the bundle cannot be read or either limit is not a range
    pub fn from_file(path: &Path, limits: ReadingLimits) -> Result<Self> {
        Self::new(CalibrationBundle::read(path)?, limits)
    }

    pub const fn bundle(&self) -> &CalibrationBundle {
        &self.bundle
    }

    pub const fn limits(&self) -> ReadingLimits {
        self.limits
    }

    /// Turbidity (NTU) for a monotonic sequence of turbidity channel voltages
    ///
    /// # Errors
    /// Fails with [`crate::Error::Order`] if `voltage` is not monotonic
    pub fn turbidity(&self, voltage: &[f64]) -> Result<Vec<f64>> {
        let turbidity = self.bundle.turbidity.evaluate(voltage)?;
        Ok(clamp(&turbidity, self.limits.turbidity))
    }

    /// Total dissolved solids (ppm) for paired TDS channel voltages and water temperatures
    ///
    /// # Errors
    /// Fails with [`crate::Error::Shape`] if `voltage` and `temperature` differ in length
    pub fn tds(&self, voltage: &[f64], temperature: &[f64]) -> Result<Vec<f64>> {
        let tds = self.bundle.tds.evaluate_vec(voltage, temperature)?;
        Ok(clamp(&tds, self.limits.tds))
    }
}

#[cfg(test)]
mod tests {
    use super::SensorProcessor;
    use crate::calibration::{CalibrationBundle, ReadingLimits};
    use crate::margin::Limits;
    use crate::piecewise::{PiecewiseModel, Segment};
    use crate::polyfit::Polynomial;
    use crate::segment::Interval;
    use crate::surface::Polynomial2D;
    use crate::{Error, Result};

    fn processor() -> Result<SensorProcessor> {
        // turbidity = 5000 - 2000 v, tds = 1000 v + 10 t
        let turbidity = PiecewiseModel::new(vec![Segment::new(
            Interval::new(0, 10),
            (0., 2.),
            Polynomial::new(vec![5000., -2000.]),
        )])?;
        let tds = Polynomial2D::new(vec![1000., 10.], vec![(1, 0), (0, 1)])?;
        SensorProcessor::new(
            CalibrationBundle { turbidity, tds },
            ReadingLimits::default(),
        )
    }

    #[test]
    fn turbidity_readings_are_clamped() -> Result<()> {
        let processor = processor()?;
        assert_eq!(
            processor.turbidity(&[0., 1., 2., 3.])?,
            vec![4000., 3000., 1000., 0.]
        );
        Ok(())
    }

    #[test]
    fn tds_readings_are_clamped() -> Result<()> {
        let processor = processor()?;
        assert_eq!(
            processor.tds(&[0., 1.5, 3.], &[20., 20., 20.])?,
            vec![200., 1700., 3000.]
        );
        Ok(())
    }

    #[test]
    fn unordered_turbidity_voltages_are_rejected() -> Result<()> {
        let processor = processor()?;
        assert!(matches!(
            processor.turbidity(&[1., 0.5, 1.5]),
            Err(Error::Order(_))
        ));
        assert!(matches!(
            processor.tds(&[1.], &[20., 21.]),
            Err(Error::Shape(_))
        ));
        Ok(())
    }

    #[test]
    fn invalid_limits_are_rejected() -> Result<()> {
        let bundle = processor()?.bundle().clone();
        let limits = ReadingLimits {
            tds: Limits { min: 1., max: 0. },
            ..ReadingLimits::default()
        };
        assert!(matches!(
            SensorProcessor::new(bundle, limits),
            Err(Error::Configuration(_))
        ));
        Ok(())
    }
}
