//! Error taxonomy for the analysis core.
//!
//! Every failure mode a caller can hit is a distinct variant, and every one of
//! them propagates to the immediate caller: nothing in this crate retries a
//! failed fit or downgrades a degenerate result to NaN/inf. Retry policy, if
//! any, belongs to the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Two paired inputs (e.g. nominal values and their deviations, or a
    /// frequency vector and its PSD vector) disagree in length.
    #[error("shape mismatch in {context}: {left} vs {right} elements")]
    ShapeMismatch {
        context: &'static str,
        left: usize,
        right: usize,
    },

    /// The parameter count of a fit model could not be determined.
    ///
    /// Raised when `curve_fit` is called without an initial guess and without
    /// an explicit parameter count (closures carry no runtime arity).
    #[error("cannot infer the model's parameter count; supply `p0` or set `param_count`")]
    AmbiguousModelSignature,

    /// The nonlinear optimizer exhausted its iteration budget without meeting
    /// any convergence criterion.
    #[error("fit did not converge after {iterations} iterations (cost {cost:.6e})")]
    FitDidNotConverge { iterations: usize, cost: f64 },

    /// A fit produced a numerically zero (or non-finite) coefficient where a
    /// nonzero one is required, e.g. the leading quadratic coefficient during
    /// peak refinement.
    #[error("degenerate fit: {0}")]
    DegenerateFit(&'static str),

    /// A requested frequency band contains no PSD bins.
    #[error("no frequency bins inside the requested band [{lo}, {hi}]")]
    EmptyFrequencyRange { lo: f64, hi: f64 },

    /// An argument failed validation (negative standard deviation, empty
    /// input, non-positive degrees of freedom, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl AnalysisError {
    pub(crate) fn shape(context: &'static str, left: usize, right: usize) -> Self {
        Self::ShapeMismatch {
            context,
            left,
            right,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}
