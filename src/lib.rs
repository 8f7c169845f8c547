#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// #![warn(clippy::cargo)]

extern crate blas_src;

pub mod calibration;
pub mod constrained;
mod error;
pub mod margin;
pub mod math;
pub mod piecewise;
pub mod polyfit;
pub mod reading;
pub mod segment;
pub mod solver;
pub mod surface;

pub use error::Error;

pub type Result<T> = ::std::result::Result<T, Error>;
