//! Numerical machinery: damped least squares and special functions.

pub mod lm;
pub mod special;

pub use lm::*;
