//! Spectral estimation: tapers, periodograms and power bandwidth.

pub mod bandwidth;
pub mod periodogram;
pub mod window;

pub use bandwidth::*;
pub use periodogram::*;
pub use window::*;
