//! `sigfit` library crate.
//!
//! Uncertainty-aware numerical analysis: measured values carry an optional
//! standard deviation, and every estimator here either consumes or produces
//! them.
//!
//! - [`uncertain`] — scalar/series value types with first-order propagation
//! - [`convert`] — input normalization between plain and uncertain data
//! - [`fit`] — nonlinear curve fitting and errors-in-variables lines
//! - [`peaks`] — peak detection with quadratic sub-sample refinement
//! - [`spectral`] — periodograms, tapers and power bandwidth
//! - [`stats`] — chi-squared goodness of fit

pub mod convert;
pub mod error;
pub mod fit;
pub mod math;
pub mod peaks;
pub mod spectral;
pub mod stats;
pub mod uncertain;

pub use convert::{Deviations, Samples};
pub use error::AnalysisError;
pub use fit::{
    CurveFitOptions, FitResult, GoodnessOfFit, LinearFit, LinearFitOptions, ZeroErrorPolicy,
    curve_fit, curve_fit_checked, linear_fit,
};
pub use peaks::{PeakOptions, PeakSet, RefinedPeak, find_peaks};
pub use spectral::{
    BandwidthOptions, BandwidthResult, Spectrum, SpectrumInput, Taper, periodogram,
    power_bandwidth,
};
pub use stats::{chi_squared, chi_squared_reduced};
pub use uncertain::{UncertainSeries, UncertainValue};
