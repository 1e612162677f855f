//! Conversion layer between plain numeric arrays and uncertainty-carrying
//! series.
//!
//! The analysis entry points accept data in one of two tagged forms
//! ([`Samples`]) instead of probing runtime types:
//!
//! - `Plain` — nominal values only; deviations, if any, arrive separately
//! - `Uncertain` — an [`UncertainSeries`] with embedded deviations
//!
//! Precedence rule: when the samples already carry uncertainty, a separately
//! supplied deviation argument is **ignored** — the embedded uncertainty wins.
//! This mirrors how the series was produced (usually by an upstream fit) and
//! keeps one source of truth per call.
//!
//! Broadcasting is explicit: a deviation is either one value for all samples
//! ([`Deviations::Uniform`]) or one value per sample
//! ([`Deviations::PerSample`]); a per-sample vector of the wrong length fails
//! with a shape-mismatch error rather than being silently reshaped.

use crate::error::AnalysisError;
use crate::uncertain::{UncertainSeries, UncertainValue};

/// Input samples for the analysis entry points.
#[derive(Debug, Clone)]
pub enum Samples {
    /// Nominal values only.
    Plain(Vec<f64>),
    /// Values with embedded deviations.
    Uncertain(UncertainSeries),
}

impl Samples {
    pub fn len(&self) -> usize {
        match self {
            Samples::Plain(v) => v.len(),
            Samples::Uncertain(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The nominal values, regardless of variant.
    pub fn nominal(&self) -> &[f64] {
        match self {
            Samples::Plain(v) => v,
            Samples::Uncertain(s) => s.nominal(),
        }
    }
}

impl From<Vec<f64>> for Samples {
    fn from(v: Vec<f64>) -> Self {
        Samples::Plain(v)
    }
}

impl From<&[f64]> for Samples {
    fn from(v: &[f64]) -> Self {
        Samples::Plain(v.to_vec())
    }
}

impl<const N: usize> From<[f64; N]> for Samples {
    fn from(v: [f64; N]) -> Self {
        Samples::Plain(v.to_vec())
    }
}

impl From<UncertainSeries> for Samples {
    fn from(s: UncertainSeries) -> Self {
        Samples::Uncertain(s)
    }
}

/// An explicitly-broadcast deviation argument.
#[derive(Debug, Clone)]
pub enum Deviations {
    /// One deviation applied to every sample.
    Uniform(f64),
    /// One deviation per sample.
    PerSample(Vec<f64>),
}

impl Deviations {
    /// Expand to one deviation per sample, validating length and sign.
    pub fn broadcast(&self, n: usize) -> Result<Vec<f64>, AnalysisError> {
        let dev = match self {
            Deviations::Uniform(s) => vec![*s; n],
            Deviations::PerSample(v) => {
                if v.len() != n {
                    return Err(AnalysisError::shape("deviations", n, v.len()));
                }
                v.clone()
            }
        };
        if dev.iter().any(|s| *s < 0.0) {
            return Err(AnalysisError::invalid(
                "standard deviations must be non-negative",
            ));
        }
        Ok(dev)
    }
}

impl From<f64> for Deviations {
    fn from(s: f64) -> Self {
        Deviations::Uniform(s)
    }
}

impl From<Vec<f64>> for Deviations {
    fn from(v: Vec<f64>) -> Self {
        Deviations::PerSample(v)
    }
}

/// Reduce samples plus an optional deviation argument to the canonical
/// `(nominal, std_dev_or_none)` pair.
///
/// Rules:
/// - embedded uncertainty wins over `err` (see module docs)
/// - a deviation vector that is uniformly zero becomes `None`
/// - `err`, when used, is broadcast and validated against the sample count
pub fn normalize(
    x: &Samples,
    err: Option<&Deviations>,
) -> Result<(Vec<f64>, Option<Vec<f64>>), AnalysisError> {
    match x {
        Samples::Uncertain(series) => {
            Ok((series.nominal().to_vec(), series.std_dev().map(<[f64]>::to_vec)))
        }
        Samples::Plain(nominal) => {
            let dev = match err {
                None => None,
                Some(err) => {
                    let dev = err.broadcast(nominal.len())?;
                    if dev.iter().all(|s| *s == 0.0) {
                        None
                    } else {
                        Some(dev)
                    }
                }
            };
            Ok((nominal.clone(), dev))
        }
    }
}

/// Wrap plain arrays back into the uncertainty-carrying form.
///
/// Inverse of [`normalize`] up to floating tolerance.
pub fn materialize(
    nominal: Vec<f64>,
    std_dev: Option<Vec<f64>>,
) -> Result<UncertainSeries, AnalysisError> {
    UncertainSeries::new(nominal, std_dev)
}

/// Scalar counterpart of [`materialize`].
pub fn materialize_value(nominal: f64, std_dev: f64) -> Result<UncertainValue, AnalysisError> {
    UncertainValue::new(nominal, std_dev)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_uncertainty_wins_over_explicit_err() {
        let series = UncertainSeries::new(vec![1.0, 2.0], Some(vec![0.1, 0.2])).unwrap();
        let x = Samples::from(series);
        let ignored = Deviations::Uniform(9.0);
        let (nominal, dev) = normalize(&x, Some(&ignored)).unwrap();
        assert_eq!(nominal, vec![1.0, 2.0]);
        assert_eq!(dev, Some(vec![0.1, 0.2]));
    }

    #[test]
    fn uniformly_zero_deviation_becomes_none() {
        let x = Samples::from(vec![1.0, 2.0, 3.0]);
        let err = Deviations::PerSample(vec![0.0, 0.0, 0.0]);
        let (_, dev) = normalize(&x, Some(&err)).unwrap();
        assert_eq!(dev, None);
    }

    #[test]
    fn normalize_is_idempotent() {
        let x = Samples::from(vec![1.0, 2.0]);
        let err = Deviations::Uniform(0.5);
        let (n1, d1) = normalize(&x, Some(&err)).unwrap();
        let renormalized = Samples::from(materialize(n1.clone(), d1.clone()).unwrap());
        let (n2, d2) = normalize(&renormalized, None).unwrap();
        assert_eq!(n1, n2);
        assert_eq!(d1, d2);
    }

    #[test]
    fn round_trip_preserves_series() {
        let series = UncertainSeries::new(vec![1.0, 2.0], Some(vec![0.1, 0.0])).unwrap();
        let (nominal, dev) = normalize(&Samples::from(series.clone()), None).unwrap();
        let rebuilt = materialize(nominal, dev).unwrap();
        assert_eq!(rebuilt, series);
    }

    #[test]
    fn scalar_broadcast_matches_per_sample() {
        let uniform = Deviations::Uniform(0.3).broadcast(4).unwrap();
        let per_sample = Deviations::PerSample(vec![0.3; 4]).broadcast(4).unwrap();
        assert_eq!(uniform, per_sample);
    }

    #[test]
    fn per_sample_length_mismatch_fails() {
        let err = Deviations::PerSample(vec![0.1, 0.2])
            .broadcast(3)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::ShapeMismatch { .. }));
    }
}
