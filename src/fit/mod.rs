//! Fitting front ends.
//!
//! Responsibilities:
//!
//! - nonlinear curve fitting against an arbitrary model closure
//! - errors-in-variables straight-line fitting
//! - uncertainty propagation from the fit covariance into the parameters

pub mod curve;
pub mod linear;

pub use curve::*;
pub use linear::*;
