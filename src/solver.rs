//! Ordinary least squares.
//!
//! Every fit in the crate reduces to minimising `||X β - y||²` for a design matrix `X` with one row
//! per sample and one column per basis function. The solve is delegated to LAPACK through
//! `ndarray-linalg` (SVD based, so a tall system is handled directly rather than through the
//! normal equations).
//!
//! Columns are scaled to unit norm before the solve and the coefficients unscaled afterwards, so
//! high order power bases over wide sample ranges stay well conditioned.
//!
//! A system is rejected rather than regularised when it cannot identify every parameter: either
//! there are more columns than rows, or the effective rank of `X` is below its column count.

use ndarray::{Array1, Array2, Axis};
use ndarray_linalg::LeastSquaresSvd;
use tracing::debug;

use crate::error::ensure_same_length;
use crate::{Error, Result};

/// The result of a least-squares solve
#[derive(Clone, Debug)]
pub struct Solution {
    /// The coefficient vector `β`
    pub coefficients: Array1<f64>,
    /// `||X β - y||²` at the solution
    pub residual_sum_of_squares: f64,
}

/// Solve the least squares problem `min ||X β - y||²`
///
/// # Errors
/// - [`Error::Shape`] if the number of rows of `design` differs from the length of `target`
/// - [`Error::Numerical`] if the system has more parameters than samples, or if the columns of
///   `design` are collinear
pub fn least_squares(design: &Array2<f64>, target: &Array1<f64>) -> Result<Solution> {
    let (num_samples, num_parameters) = design.dim();
    ensure_same_length("least squares target", num_samples, target.len())?;

    if num_parameters == 0 {
        return Err(Error::Numerical(
            "design matrix has no columns to fit".to_owned(),
        ));
    }
    if num_parameters > num_samples {
        return Err(Error::Numerical(format!(
            "underdetermined system: {num_parameters} parameters from {num_samples} samples"
        )));
    }

    let norms = design.map_axis(Axis(0), |column| column.dot(&column).sqrt());
    if let Some(column) = norms.iter().position(|norm| !norm.is_normal()) {
        return Err(Error::Numerical(format!(
            "design matrix column {column} is zero or not finite"
        )));
    }
    let scaled = design / &norms;

    let result = scaled.least_squares(target)?;
    let rank = usize::try_from(result.rank).unwrap_or(0);
    if rank < num_parameters {
        return Err(Error::Numerical(format!(
            "design matrix is rank deficient: rank {rank} with {num_parameters} columns"
        )));
    }

    let coefficients = result.solution / &norms;
    if coefficients.iter().any(|c| !c.is_finite()) {
        return Err(Error::Numerical(
            "least squares produced non-finite coefficients".to_owned(),
        ));
    }

    let residual = design.dot(&coefficients) - target;
    let residual_sum_of_squares = residual.dot(&residual);
    debug!(
        num_samples,
        num_parameters, residual_sum_of_squares, "solved least squares system"
    );

    Ok(Solution {
        coefficients,
        residual_sum_of_squares,
    })
}

#[cfg(test)]
mod tests {
    use ndarray::{arr1, arr2, Array1};
    use ndarray_rand::rand::{Rng, SeedableRng};
    use rand_isaac::Isaac64Rng;

    use super::least_squares;
    use crate::math::vandermonde;
    use crate::{Error, Result};

    #[test]
    fn least_squares_solves_simple_system() -> Result<()> {
        // y = 2 + 3x on x = [0, 1, 2]
        let x = arr2(&[[1.0, 0.0], [1.0, 1.0], [1.0, 2.0]]);
        let y = arr1(&[2.0, 5.0, 8.0]);

        let solution = least_squares(&x, &y)?;
        approx::assert_relative_eq!(solution.coefficients[0], 2.0, epsilon = 1e-10);
        approx::assert_relative_eq!(solution.coefficients[1], 3.0, epsilon = 1e-10);
        approx::assert_abs_diff_eq!(solution.residual_sum_of_squares, 0.0, epsilon = 1e-18);
        Ok(())
    }

    #[test]
    fn noisy_polynomial_coefficients_are_recovered() -> Result<()> {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let coeffs = [0.5, -1.25, 0.75];

        let x = (0..200_u32).map(|n| f64::from(n) / 50.).collect::<Vec<_>>();
        let y: Array1<f64> = x
            .iter()
            .map(|x| coeffs[0] + coeffs[1] * x + coeffs[2] * x * x + 1e-6 * (rng.gen::<f64>() - 0.5))
            .collect();

        let solution = least_squares(&vandermonde(&x, 2)?, &y)?;
        for (expected, calculated) in coeffs.iter().zip(solution.coefficients.iter()) {
            approx::assert_relative_eq!(expected, calculated, max_relative = 1e-4);
        }
        Ok(())
    }

    #[test]
    fn underdetermined_systems_are_rejected() {
        let x = arr2(&[[1.0, 0.0, 0.0], [1.0, 1.0, 1.0]]);
        let y = arr1(&[1.0, 2.0]);
        assert!(matches!(least_squares(&x, &y), Err(Error::Numerical(_))));
    }

    #[test]
    fn collinear_columns_are_rejected() {
        let x = arr2(&[[1.0, 2.0], [2.0, 4.0], [3.0, 6.0]]);
        let y = arr1(&[1.0, 2.0, 3.0]);
        assert!(matches!(least_squares(&x, &y), Err(Error::Numerical(_))));
    }

    #[test]
    fn high_order_fits_over_wide_ranges_are_solved() -> Result<()> {
        // 2 - x / 100 + (x / 100)^7 over 500 sample indices
        let x = (0..500_u32).map(f64::from).collect::<Vec<_>>();
        let y: Array1<f64> = x
            .iter()
            .map(|x| 2. - x / 100. + (x / 100.).powi(7))
            .collect();

        let solution = least_squares(&vandermonde(&x, 7)?, &y)?;
        approx::assert_relative_eq!(solution.coefficients[0], 2., max_relative = 1e-6);
        approx::assert_relative_eq!(solution.coefficients[1], -1e-2, max_relative = 1e-6);
        approx::assert_relative_eq!(solution.coefficients[7], 1e-14, max_relative = 1e-6);
        Ok(())
    }

    #[test]
    fn zero_columns_are_rejected() {
        let x = arr2(&[[1.0, 0.0], [1.0, 0.0], [1.0, 0.0]]);
        let y = arr1(&[1.0, 2.0, 3.0]);
        assert!(matches!(least_squares(&x, &y), Err(Error::Numerical(_))));
    }

    #[test]
    fn mismatched_targets_are_rejected() {
        let x = arr2(&[[1.0, 0.0], [1.0, 1.0]]);
        let y = arr1(&[1.0, 2.0, 3.0]);
        assert!(matches!(least_squares(&x, &y), Err(Error::Shape(_))));
    }
}
