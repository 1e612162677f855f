//! Chi-squared goodness-of-fit test.
//!
//! Compares observed counts/values against expected ones:
//!
//! ```text
//! χ² = Σ (f_obs_i − f_exp_i)² / f_exp_i
//! ```
//!
//! with `dof = n − 1 − ddof` and the p-value taken from the chi-squared
//! survival function. Uncertainty on either input is stripped to nominal
//! values; the test is defined on the values themselves.

use crate::convert::Samples;
use crate::error::AnalysisError;
use crate::math::special::chi_squared_sf;

/// Chi-squared statistic and p-value for `f_obs` against `f_exp`.
///
/// `ddof` is the degrees-of-freedom adjustment (e.g. the number of fitted
/// parameters); `n − 1 − ddof` must be positive.
pub fn chi_squared(
    f_exp: impl Into<Samples>,
    f_obs: impl Into<Samples>,
    ddof: usize,
) -> Result<(f64, f64), AnalysisError> {
    let (chi2, dof) = statistic(&f_exp.into(), &f_obs.into(), ddof)?;
    Ok((chi2, chi_squared_sf(chi2, dof as f64)))
}

/// Reduced variant: the statistic divided by its degrees of freedom.
pub fn chi_squared_reduced(
    f_exp: impl Into<Samples>,
    f_obs: impl Into<Samples>,
    ddof: usize,
) -> Result<(f64, f64), AnalysisError> {
    let (chi2, dof) = statistic(&f_exp.into(), &f_obs.into(), ddof)?;
    Ok((chi2 / dof as f64, chi_squared_sf(chi2, dof as f64)))
}

fn statistic(
    f_exp: &Samples,
    f_obs: &Samples,
    ddof: usize,
) -> Result<(f64, usize), AnalysisError> {
    let exp = f_exp.nominal();
    let obs = f_obs.nominal();
    if exp.len() != obs.len() {
        return Err(AnalysisError::shape("chi_squared inputs", exp.len(), obs.len()));
    }

    let n = exp.len();
    if n < 2 || n <= 1 + ddof {
        return Err(AnalysisError::invalid(format!(
            "chi_squared needs positive degrees of freedom (n = {n}, ddof = {ddof})"
        )));
    }
    if exp.iter().any(|&e| e <= 0.0) {
        return Err(AnalysisError::invalid(
            "chi_squared expects strictly positive expected values",
        ));
    }

    let chi2 = exp
        .iter()
        .zip(obs.iter())
        .map(|(&e, &o)| (o - e) * (o - e) / e)
        .sum();
    Ok((chi2, n - 1 - ddof))
}
