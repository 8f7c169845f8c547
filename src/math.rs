use itertools::Itertools;
use ndarray::{Array, Array1, Array2};

use crate::error::ensure_same_length;
use crate::Result;

/// Compute the outer product of two one-dimensional vectors of length (m x 1) and (n x 1)
///
/// The outer product is the (m x n) matrix whose elements are products of elements in the first
/// vector with those in the second.
///
/// # Examples
///
/// ```
/// use water_calibration::math::outer_product;
/// use ndarray::{arr1, arr2, Array1};
///
/// let u: Array1<f64> = arr1(&[1., 2., 3.]);
/// let v = arr1(&[4., 5., 6.]);
/// let outer_product = outer_product(&u, &v).unwrap();
///
/// let expected = arr2(&[[4., 5., 6.], [8., 10., 12.], [12., 15., 18.]]);
/// assert_eq!(outer_product, expected);
///```
pub fn outer_product(u: &Array1<f64>, v: &Array1<f64>) -> Result<Array2<f64>> {
    let u: Array2<f64> = u.clone().into_shape((u.len(), 1))?;
    let v: Array2<f64> = v.clone().into_shape((1, v.len()))?;

    Ok(ndarray::linalg::kron(&u, &v))
}

/// The powers `x^0, x^1, ..., x^degree`
pub(crate) fn powers(x: f64, degree: usize) -> impl Iterator<Item = f64> {
    std::iter::successors(Some(1.0), move |p| Some(p * x)).take(degree + 1)
}

/// Generate the Vandermode matrix of `degree` for observations `x`
///
/// The Vandermonde matrix is a (n x degree + 1) matrix. Each row of the matrix is a geometric
/// progression for an individual observation `x` from power `0` to `degree` inclusive.
///
/// # Examples
///
/// ```
/// use water_calibration::math::vandermonde;
/// use ndarray::arr2;
///
/// let observations: Vec<f64> = vec![2., 3.];
/// let vander = vandermonde(&observations, 2).unwrap();
///
/// let expected = arr2(&[[1., 2., 4.], [1., 3., 9.]]);
/// assert_eq!(vander, expected);
/// ```
pub fn vandermonde(x: &[f64], degree: usize) -> Result<Array2<f64>> {
    let vals = x.iter().flat_map(|&xi| powers(xi, degree));

    Ok(Array::from_iter(vals).into_shape((x.len(), degree + 1))?)
}

/// Numerical first derivative of `y` assuming unit spacing
///
/// Interior points use the central difference `(y[k + 1] - y[k - 1]) / 2`, the two end points use
/// one-sided first order differences. Sequences shorter than two points have a zero derivative.
pub fn gradient(y: &[f64]) -> Vec<f64> {
    let n = y.len();
    if n < 2 {
        return vec![0.0; n];
    }

    let mut dy = Vec::with_capacity(n);
    dy.push(y[1] - y[0]);
    dy.extend(y.iter().tuple_windows().map(|(a, _, c)| (c - a) / 2.0));
    dy.push(y[n - 1] - y[n - 2]);
    dy
}

/// `num` evenly spaced values over the closed interval `[start, end]`
pub fn linspace(start: f64, end: f64, num: usize) -> Vec<f64> {
    match num {
        0 => vec![],
        1 => vec![start],
        _ => {
            #[allow(clippy::cast_precision_loss)]
            let step = (end - start) / (num - 1) as f64;
            #[allow(clippy::cast_precision_loss)]
            let mut values: Vec<f64> = (0..num).map(|k| step.mul_add(k as f64, start)).collect();
            values[num - 1] = end;
            values
        }
    }
}

/// Index of the element of `values` closest to `target`
///
/// Ties resolve to the first such element. Returns `None` for an empty slice.
pub fn nearest_index(values: &[f64], target: f64) -> Option<usize> {
    values
        .iter()
        .map(|v| (v - target).abs())
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (ii, distance)| match best {
            Some((_, closest)) if closest <= distance => best,
            _ => Some((ii, distance)),
        })
        .map(|(ii, _)| ii)
}

/// Whether `x` is monotonically non-decreasing or non-increasing
pub fn is_monotonic(x: &[f64]) -> bool {
    let non_decreasing = x.iter().tuple_windows().all(|(a, b)| b >= a);
    let non_increasing = x.iter().tuple_windows().all(|(a, b)| b <= a);
    non_decreasing || non_increasing
}

/// Drop every pair in which either element is NaN
///
/// # Errors
/// Fails if `x` and `y` are not the same length.
pub fn remove_nan_xy(x: &[f64], y: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
    ensure_same_length("remove_nan_xy", x.len(), y.len())?;
    Ok(x.iter()
        .zip(y)
        .filter(|(xi, yi)| !xi.is_nan() && !yi.is_nan())
        .map(|(xi, yi)| (*xi, *yi))
        .unzip())
}
