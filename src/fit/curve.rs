//! Nonlinear curve fitting with propagated parameter uncertainty.
//!
//! Assumes `y = f(x, p) + eps` and estimates `p` by weighted nonlinear least
//! squares:
//!
//! - `y` deviations, when present, weight the objective as `Σ (r_i / σ_i)²`
//! - `x` deviations are carried through for reporting/plotting only; they
//!   never enter the objective
//! - embedded uncertainty in the samples takes precedence over explicitly
//!   supplied deviations (see [`crate::convert`])
//!
//! The optimized parameters come back as an [`UncertainSeries`] whose
//! deviations are the square roots of the covariance diagonal, with the full
//! covariance matrix retained alongside as a separate artifact. The result
//! also binds the model to the optimized parameters so callers can re-evaluate
//! the fitted curve over an arbitrary x-grid.
//!
//! Each call recomputes from scratch; results are immutable snapshots.

use nalgebra::DMatrix;

use crate::convert::{Deviations, Samples, normalize};
use crate::error::AnalysisError;
use crate::math::lm::{LmOptions, levenberg_marquardt};
use crate::stats::chi_squared;
use crate::uncertain::UncertainSeries;

/// Per-call fitting configuration.
///
/// Immutable once built; there is no process-wide default state.
#[derive(Debug, Clone, Default)]
pub struct CurveFitOptions {
    /// Number of model parameters, used to build a default starting point
    /// (all ones) when `p0` is omitted. Closures carry no runtime arity, so
    /// omitting both `p0` and this count fails with
    /// [`AnalysisError::AmbiguousModelSignature`].
    pub param_count: Option<usize>,
    /// Optimizer iteration controls.
    pub lm: LmOptions,
}

/// Chi-squared goodness-of-fit summary.
#[derive(Debug, Clone, Copy)]
pub struct GoodnessOfFit {
    pub chi_squared: f64,
    pub p_value: f64,
}

/// Result of one `curve_fit` call.
pub struct FitResult<M> {
    params: UncertainSeries,
    covariance: DMatrix<f64>,
    model: M,
    x_dev: Option<Vec<f64>>,
    y_dev: Option<Vec<f64>>,
    goodness: Option<GoodnessOfFit>,
}

// Manual impl: the bound model closure has no Debug representation.
impl<M> std::fmt::Debug for FitResult<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FitResult")
            .field("params", &self.params)
            .field("covariance", &self.covariance)
            .field("x_dev", &self.x_dev)
            .field("y_dev", &self.y_dev)
            .field("goodness", &self.goodness)
            .finish_non_exhaustive()
    }
}

impl<M> FitResult<M>
where
    M: Fn(f64, &[f64]) -> f64,
{
    /// Optimized parameters with per-parameter deviations.
    pub fn params(&self) -> &UncertainSeries {
        &self.params
    }

    /// Full covariance matrix of the optimized parameters.
    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    /// The x deviations used, broadcast per sample (reporting only).
    pub fn x_dev(&self) -> Option<&[f64]> {
        self.x_dev.as_deref()
    }

    /// The y deviations used, broadcast per sample.
    pub fn y_dev(&self) -> Option<&[f64]> {
        self.y_dev.as_deref()
    }

    /// Goodness-of-fit, present when produced by [`curve_fit_checked`].
    pub fn goodness(&self) -> Option<GoodnessOfFit> {
        self.goodness
    }

    /// Evaluate the fitted model at `x`.
    pub fn eval(&self, x: f64) -> f64 {
        (self.model)(x, self.params.nominal())
    }

    /// Evaluate the fitted model over an arbitrary x-grid.
    pub fn eval_many(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.eval(x)).collect()
    }
}

/// Fit `model` to `(x, y)` by weighted nonlinear least squares.
///
/// `model` is `f(x, params) -> y_hat`, called only with plain-numeric x.
/// `p0`, if omitted, defaults to all ones of length
/// `options.param_count`.
///
/// Optimizer failure propagates as [`AnalysisError::FitDidNotConverge`]; the
/// engine never retries with different starting points.
pub fn curve_fit<M>(
    model: M,
    x: impl Into<Samples>,
    y: impl Into<Samples>,
    p0: Option<&[f64]>,
    x_err: Option<Deviations>,
    y_err: Option<Deviations>,
    options: &CurveFitOptions,
) -> Result<FitResult<M>, AnalysisError>
where
    M: Fn(f64, &[f64]) -> f64,
{
    fit_inner(model, x.into(), y.into(), p0, x_err, y_err, options, false)
}

/// [`curve_fit`] plus a chi-squared goodness-of-fit statistic.
///
/// The statistic compares the observed values against the fitted values
/// scaled to the observed sum (so both enter as distributions of equal total
/// weight), with the parameter count as the degrees-of-freedom adjustment.
pub fn curve_fit_checked<M>(
    model: M,
    x: impl Into<Samples>,
    y: impl Into<Samples>,
    p0: Option<&[f64]>,
    x_err: Option<Deviations>,
    y_err: Option<Deviations>,
    options: &CurveFitOptions,
) -> Result<FitResult<M>, AnalysisError>
where
    M: Fn(f64, &[f64]) -> f64,
{
    fit_inner(model, x.into(), y.into(), p0, x_err, y_err, options, true)
}

#[allow(clippy::too_many_arguments)]
fn fit_inner<M>(
    model: M,
    x: Samples,
    y: Samples,
    p0: Option<&[f64]>,
    x_err: Option<Deviations>,
    y_err: Option<Deviations>,
    options: &CurveFitOptions,
    with_goodness: bool,
) -> Result<FitResult<M>, AnalysisError>
where
    M: Fn(f64, &[f64]) -> f64,
{
    let (xv, x_dev) = normalize(&x, x_err.as_ref())?;
    let (yv, y_dev) = normalize(&y, y_err.as_ref())?;

    if xv.len() != yv.len() {
        return Err(AnalysisError::shape("curve_fit samples", xv.len(), yv.len()));
    }
    if xv.is_empty() {
        return Err(AnalysisError::invalid("curve_fit requires at least one sample"));
    }
    if let Some(dev) = &y_dev {
        // Per-sample zero deviations would demand infinite weight.
        if dev.iter().any(|s| *s == 0.0) {
            return Err(AnalysisError::invalid(
                "y deviations must be nonzero per sample (a uniformly-zero vector means exact)",
            ));
        }
    }

    let p0: Vec<f64> = match (p0, options.param_count) {
        (Some(p0), _) => p0.to_vec(),
        (None, Some(n)) => vec![1.0; n],
        (None, None) => return Err(AnalysisError::AmbiguousModelSignature),
    };

    let residuals = |p: &[f64]| -> Vec<f64> {
        xv.iter()
            .zip(yv.iter())
            .enumerate()
            .map(|(i, (&xi, &yi))| {
                let r = yi - model(xi, p);
                match &y_dev {
                    Some(dev) => r / dev[i],
                    None => r,
                }
            })
            .collect()
    };

    let outcome = levenberg_marquardt(residuals, &p0, xv.len(), &options.lm)?;

    let diag: Vec<f64> = (0..outcome.params.len())
        .map(|i| outcome.covariance[(i, i)].max(0.0).sqrt())
        .collect();
    let nominal: Vec<f64> = outcome.params.iter().copied().collect();
    // An underdetermined covariance (n == p) is reported as infinite; the
    // parameter deviations are then left absent rather than infinite.
    let params = if diag.iter().all(|s| s.is_finite()) {
        UncertainSeries::new(nominal, Some(diag))?
    } else {
        UncertainSeries::exact(nominal)
    };

    let goodness = if with_goodness {
        let y_fit: Vec<f64> = xv.iter().map(|&xi| model(xi, params.nominal())).collect();
        Some(goodness_of_fit(&y_fit, &yv, params.len())?)
    } else {
        None
    };

    Ok(FitResult {
        params,
        covariance: outcome.covariance,
        model,
        x_dev,
        y_dev,
        goodness,
    })
}

/// Chi-squared comparison of observed values against fitted values scaled to
/// a common total.
fn goodness_of_fit(
    y_fit: &[f64],
    y_obs: &[f64],
    n_params: usize,
) -> Result<GoodnessOfFit, AnalysisError> {
    let obs_sum: f64 = y_obs.iter().sum();
    let fit_sum: f64 = y_fit.iter().sum();
    if fit_sum == 0.0 {
        return Err(AnalysisError::invalid(
            "goodness-of-fit undefined: fitted values sum to zero",
        ));
    }
    let scale = obs_sum / fit_sum;
    let expected: Vec<f64> = y_fit.iter().map(|&v| v * scale).collect();

    let (chi2, p_value) = chi_squared(
        Samples::from(expected),
        Samples::from(y_obs.to_vec()),
        n_params,
    )?;
    Ok(GoodnessOfFit {
        chi_squared: chi2,
        p_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadratic(x: f64, p: &[f64]) -> f64 {
        p[0] * x * x + p[1] * x + p[2]
    }

    #[test]
    fn recovers_quadratic_exactly_on_noiseless_data() {
        // y = 2x² + 4x + 5 over 101 points, no noise.
        let x: Vec<f64> = (0..101).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|&xi| quadratic(xi, &[2.0, 4.0, 5.0])).collect();

        let fit = curve_fit(
            quadratic,
            x,
            y,
            Some(&[1.0, 1.0, 1.0]),
            None,
            None,
            &CurveFitOptions::default(),
        )
        .unwrap();

        let p = fit.params();
        for (i, expected) in [2.0, 4.0, 5.0].iter().enumerate() {
            let v = p.get(i).unwrap();
            assert!((v.nominal - expected).abs() < 1e-6, "param {i}: {}", v.nominal);
            assert!(v.dev() < 1e-6, "param {i} deviation: {}", v.dev());
        }
    }

    #[test]
    fn eval_matches_model_at_optimum() {
        let x: Vec<f64> = (0..50).map(|i| i as f64 * 0.2).collect();
        let y: Vec<f64> = x.iter().map(|&xi| quadratic(xi, &[1.5, -2.0, 3.0])).collect();

        let fit = curve_fit(
            quadratic,
            x.clone(),
            y,
            Some(&[1.0, 1.0, 1.0]),
            None,
            None,
            &CurveFitOptions::default(),
        )
        .unwrap();

        let resampled: Vec<f64> = (0..200).map(|i| i as f64 * 0.05).collect();
        let curve = fit.eval_many(&resampled);
        for (&xi, &yi) in resampled.iter().zip(curve.iter()) {
            assert!((yi - quadratic(xi, &[1.5, -2.0, 3.0])).abs() < 1e-6);
        }
    }

    #[test]
    fn fit_result_is_debuggable_without_the_model() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&xi| quadratic(xi, &[1.0, 0.0, 0.0])).collect();
        let fit = curve_fit(
            quadratic,
            x,
            y,
            Some(&[1.0, 1.0, 1.0]),
            None,
            None,
            &CurveFitOptions::default(),
        )
        .unwrap();
        let printed = format!("{fit:?}");
        assert!(printed.contains("params"));
        assert!(!printed.contains("model"));
    }

    #[test]
    fn missing_p0_and_param_count_is_ambiguous() {
        let err = curve_fit(
            quadratic,
            vec![0.0, 1.0, 2.0, 3.0],
            vec![0.0, 1.0, 4.0, 9.0],
            None,
            None,
            None,
            &CurveFitOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::AmbiguousModelSignature));
    }

    #[test]
    fn param_count_supplies_default_start() {
        let x: Vec<f64> = (0..30).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|&xi| quadratic(xi, &[2.0, 0.5, -1.0])).collect();

        let options = CurveFitOptions {
            param_count: Some(3),
            ..Default::default()
        };
        let fit = curve_fit(quadratic, x, y, None, None, None, &options).unwrap();
        assert!((fit.params().get(0).unwrap().nominal - 2.0).abs() < 1e-6);
    }

    #[test]
    fn scalar_y_err_broadcasts_to_all_samples() {
        let x: Vec<f64> = (0..40).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|&xi| quadratic(xi, &[1.0, 2.0, 3.0])).collect();

        let fit = curve_fit(
            quadratic,
            x,
            y,
            Some(&[1.0, 1.0, 1.0]),
            None,
            Some(Deviations::Uniform(0.5)),
            &CurveFitOptions::default(),
        )
        .unwrap();
        assert_eq!(fit.y_dev().unwrap().len(), 40);
        assert!(fit.y_dev().unwrap().iter().all(|&s| s == 0.5));
    }

    #[test]
    fn embedded_uncertainty_overrides_explicit_err() {
        let x: Vec<f64> = (0..25).map(|i| i as f64 * 0.2).collect();
        let y_nominal: Vec<f64> = x.iter().map(|&xi| quadratic(xi, &[1.0, 0.0, 2.0])).collect();
        let y = crate::uncertain::UncertainSeries::new(y_nominal, Some(vec![0.3; 25])).unwrap();

        let fit = curve_fit(
            quadratic,
            x,
            y,
            Some(&[1.0, 1.0, 1.0]),
            None,
            Some(Deviations::Uniform(99.0)),
            &CurveFitOptions::default(),
        )
        .unwrap();
        assert!(fit.y_dev().unwrap().iter().all(|&s| s == 0.3));
    }

    #[test]
    fn mismatched_sample_lengths_fail() {
        let err = curve_fit(
            quadratic,
            vec![0.0, 1.0],
            vec![0.0, 1.0, 2.0],
            Some(&[1.0, 1.0, 1.0]),
            None,
            None,
            &CurveFitOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::ShapeMismatch { .. }));
    }

    #[test]
    fn checked_variant_reports_goodness_of_fit() {
        // A perfect fit on a positive distribution: chi2 ~ 0, p ~ 1.
        let x: Vec<f64> = (0..20).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|&xi| quadratic(xi, &[1.0, 1.0, 10.0])).collect();

        let fit = curve_fit_checked(
            quadratic,
            x,
            y,
            Some(&[1.0, 1.0, 1.0]),
            None,
            None,
            &CurveFitOptions::default(),
        )
        .unwrap();

        let gof = fit.goodness().unwrap();
        assert!(gof.chi_squared < 1e-9);
        assert!(gof.p_value > 0.999);
    }
}
