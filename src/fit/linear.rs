//! Errors-in-variables linear regression.
//!
//! Ordinary least squares only accounts for uncertainty in `y`. When both
//! axes carry measurement uncertainty, the appropriate estimator minimizes
//! the weighted *perpendicular* residuals. We use the York iteration:
//!
//! ```text
//! W_i = ωx_i·ωy_i / (ωx_i + b²·ωy_i)        combined weight per sample
//! β_i = W_i·(U_i/ωy_i + b·V_i/ωx_i)         U, V = weighted-mean-centered x, y
//! b   ← Σ W_i·β_i·V_i / Σ W_i·β_i·U_i       slope update, to convergence
//! ```
//!
//! with `ω = 1/σ²` per axis. Samples with a zero deviation would demand
//! infinite weight, which is numerically unstable; the zero-error policy
//! (an explicit per-call flag) decides whether such a sample falls back to
//! the solver default unit weight or fails the call.
//!
//! Standard errors of slope and intercept follow York's adjusted-abscissa
//! formulas, scaled by the reduced weighted residual sum so they track the
//! observed scatter; `r_squared` compares observed y against the fitted line at the
//! nominal x values only (uncertainty is not propagated into it).

use crate::convert::{Deviations, Samples, normalize};
use crate::error::AnalysisError;
use crate::uncertain::UncertainValue;

/// What to do with a per-sample deviation of exactly zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZeroErrorPolicy {
    /// Give the affected axis sample the solver default unit weight.
    #[default]
    FallBack,
    /// Fail the call with an invalid-input error.
    Strict,
}

/// Per-call configuration for [`linear_fit`].
#[derive(Debug, Clone)]
pub struct LinearFitOptions {
    /// Initial `[slope, intercept]`; the intercept entry is informational
    /// (the iteration only needs a starting slope).
    pub beta0: Option<[f64; 2]>,
    pub zero_error_policy: ZeroErrorPolicy,
    pub max_iterations: usize,
    /// Absolute-plus-relative slope convergence tolerance.
    pub tol: f64,
}

impl Default for LinearFitOptions {
    fn default() -> Self {
        Self {
            beta0: None,
            zero_error_policy: ZeroErrorPolicy::default(),
            max_iterations: 100,
            tol: 1e-12,
        }
    }
}

/// Result of one errors-in-variables line fit.
#[derive(Debug, Clone)]
pub struct LinearFit {
    pub slope: UncertainValue,
    pub intercept: UncertainValue,
    pub r_squared: f64,
    /// Slope iterations consumed.
    pub iterations: usize,
}

impl LinearFit {
    /// Evaluate the fitted line at `x`.
    pub fn eval(&self, x: f64) -> f64 {
        self.slope.nominal * x + self.intercept.nominal
    }
}

/// Fit `y = slope·x + intercept` accounting for uncertainty on both axes.
pub fn linear_fit(
    x: impl Into<Samples>,
    y: impl Into<Samples>,
    x_err: Option<Deviations>,
    y_err: Option<Deviations>,
    options: &LinearFitOptions,
) -> Result<LinearFit, AnalysisError> {
    let x = x.into();
    let y = y.into();
    let (xv, x_dev) = normalize(&x, x_err.as_ref())?;
    let (yv, y_dev) = normalize(&y, y_err.as_ref())?;

    let n = xv.len();
    if yv.len() != n {
        return Err(AnalysisError::shape("linear_fit samples", n, yv.len()));
    }
    if n < 3 {
        return Err(AnalysisError::invalid(
            "linear_fit requires at least three samples",
        ));
    }

    let wx = axis_weights(x_dev.as_deref(), n, options.zero_error_policy)?;
    let wy = axis_weights(y_dev.as_deref(), n, options.zero_error_policy)?;

    let mut b = options.beta0.map_or(0.0, |beta0| beta0[0]);
    let mut iterations = 0;
    let mut converged = false;

    // Per-iteration state reused for the standard errors afterwards.
    let mut w = vec![0.0; n];
    let mut beta = vec![0.0; n];
    let mut x_bar = 0.0;
    let mut y_bar = 0.0;

    while iterations < options.max_iterations {
        iterations += 1;

        let mut w_sum = 0.0;
        let mut sx = 0.0;
        let mut sy = 0.0;
        for i in 0..n {
            w[i] = wx[i] * wy[i] / (wx[i] + b * b * wy[i]);
            w_sum += w[i];
            sx += w[i] * xv[i];
            sy += w[i] * yv[i];
        }
        if w_sum <= 0.0 {
            return Err(AnalysisError::invalid("all sample weights vanished"));
        }
        x_bar = sx / w_sum;
        y_bar = sy / w_sum;

        let mut num = 0.0;
        let mut den = 0.0;
        for i in 0..n {
            let u = xv[i] - x_bar;
            let v = yv[i] - y_bar;
            beta[i] = w[i] * (u / wy[i] + b * v / wx[i]);
            num += w[i] * beta[i] * v;
            den += w[i] * beta[i] * u;
        }
        if den == 0.0 || !den.is_finite() {
            return Err(AnalysisError::DegenerateFit(
                "no usable x variance in linear_fit",
            ));
        }

        let b_new = num / den;
        let delta = (b_new - b).abs();
        b = b_new;
        if delta <= options.tol * (1.0 + b.abs()) {
            converged = true;
            break;
        }
    }

    if !converged {
        return Err(AnalysisError::FitDidNotConverge {
            iterations,
            cost: f64::NAN,
        });
    }

    let a = y_bar - b * x_bar;

    // York standard errors via the adjusted abscissae.
    let w_sum: f64 = w.iter().sum();
    let x_adj: Vec<f64> = beta.iter().map(|&bi| x_bar + bi).collect();
    let x_adj_bar = x_adj
        .iter()
        .zip(w.iter())
        .map(|(&xa, &wi)| wi * xa)
        .sum::<f64>()
        / w_sum;
    let spread: f64 = x_adj
        .iter()
        .zip(w.iter())
        .map(|(&xa, &wi)| wi * (xa - x_adj_bar).powi(2))
        .sum();
    if spread <= 0.0 {
        return Err(AnalysisError::DegenerateFit(
            "no usable x variance in linear_fit",
        ));
    }
    // Scale by the reduced weighted residual sum, as an ODR solver does:
    // without it the reported uncertainties would be a constant of the x-grid
    // and the weights, blind to the observed scatter (unit weights especially).
    let s: f64 = xv
        .iter()
        .zip(yv.iter())
        .zip(w.iter())
        .map(|((&xi, &yi), &wi)| wi * (yi - b * xi - a).powi(2))
        .sum();
    let res_var = s / (n - 2) as f64;
    let var_b = res_var / spread;
    let var_a = res_var * (1.0 / w_sum + x_adj_bar * x_adj_bar / spread);

    // r² against the line at nominal x only.
    let y_mean = yv.iter().sum::<f64>() / n as f64;
    let ss_res: f64 = xv
        .iter()
        .zip(yv.iter())
        .map(|(&xi, &yi)| (yi - (b * xi + a)).powi(2))
        .sum();
    let ss_tot: f64 = yv.iter().map(|&yi| (yi - y_mean).powi(2)).sum();
    let r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 1.0 };

    Ok(LinearFit {
        slope: UncertainValue::new(b, var_b.sqrt())?,
        intercept: UncertainValue::new(a, var_a.sqrt())?,
        r_squared,
        iterations,
    })
}

/// Per-sample `1/σ²` weights for one axis.
///
/// Absent deviations mean the solver default unit weight for every sample;
/// zero deviations are resolved by the policy.
fn axis_weights(
    dev: Option<&[f64]>,
    n: usize,
    policy: ZeroErrorPolicy,
) -> Result<Vec<f64>, AnalysisError> {
    let Some(dev) = dev else {
        return Ok(vec![1.0; n]);
    };
    dev.iter()
        .map(|&s| {
            if s == 0.0 {
                match policy {
                    ZeroErrorPolicy::FallBack => Ok(1.0),
                    ZeroErrorPolicy::Strict => Err(AnalysisError::invalid(
                        "zero per-sample deviation with ZeroErrorPolicy::Strict",
                    )),
                }
            } else {
                Ok(1.0 / (s * s))
            }
        })
        .collect()
}
