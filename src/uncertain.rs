//! Quantities carrying a nominal value and a standard deviation.
//!
//! A measured quantity is represented as `(nominal, std_dev)` where the
//! deviation is *optional*: `None` means the value is exact. A std-dev of
//! exactly `0.0` is normalized to `None` on construction, because downstream
//! algorithms weight samples by `1/σ²` and must never divide by zero
//! implicitly.
//!
//! Arithmetic uses first-order (linearized) propagation and assumes operands
//! are independent:
//!
//! ```text
//! z = f(a, b)   ⇒   σz² = (∂f/∂a · σa)² + (∂f/∂b · σb)²
//! ```
//!
//! Elements of an [`UncertainSeries`] are independent of each other; the joint
//! covariance of parameters estimated by a fit is kept on the fit result as a
//! separate artifact, never folded back into per-element deviations.

use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::error::AnalysisError;

/// A single quantity with an optional standard deviation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UncertainValue {
    pub nominal: f64,
    pub std_dev: Option<f64>,
}

impl UncertainValue {
    /// Create a value with the given deviation.
    ///
    /// A deviation of exactly `0.0` is normalized to "exact" (`None`).
    /// Negative or non-finite deviations are rejected.
    pub fn new(nominal: f64, std_dev: f64) -> Result<Self, AnalysisError> {
        if std_dev < 0.0 || !std_dev.is_finite() {
            return Err(AnalysisError::invalid(format!(
                "standard deviation must be finite and non-negative, got {std_dev}"
            )));
        }
        Ok(Self {
            nominal,
            std_dev: if std_dev == 0.0 { None } else { Some(std_dev) },
        })
    }

    /// An exact value (no uncertainty).
    pub fn exact(nominal: f64) -> Self {
        Self {
            nominal,
            std_dev: None,
        }
    }

    /// The deviation, with "exact" read as zero.
    pub fn dev(&self) -> f64 {
        self.std_dev.unwrap_or(0.0)
    }

    /// Apply a differentiable scalar function via linearized propagation.
    ///
    /// `derivative` is `df/dx` evaluated at the nominal value.
    pub fn map(&self, value: f64, derivative: f64) -> Self {
        let std_dev = self
            .std_dev
            .map(|s| (derivative * s).abs())
            .filter(|s| *s != 0.0);
        Self {
            nominal: value,
            std_dev,
        }
    }

    pub fn powf(&self, exponent: f64) -> Self {
        let v = self.nominal.powf(exponent);
        self.map(v, exponent * self.nominal.powf(exponent - 1.0))
    }

    pub fn sqrt(&self) -> Self {
        let v = self.nominal.sqrt();
        self.map(v, 0.5 / v)
    }

    pub fn ln(&self) -> Self {
        self.map(self.nominal.ln(), 1.0 / self.nominal)
    }

    pub fn abs(&self) -> Self {
        Self {
            nominal: self.nominal.abs(),
            std_dev: self.std_dev,
        }
    }

    pub fn recip(&self) -> Self {
        let v = 1.0 / self.nominal;
        self.map(v, -v * v)
    }

    /// Combine two independent deviations in quadrature, scaled by the
    /// respective sensitivities.
    fn propagate(value: f64, a: &Self, da: f64, b: &Self, db: f64) -> Self {
        let var = a.std_dev.map_or(0.0, |s| (da * s).powi(2))
            + b.std_dev.map_or(0.0, |s| (db * s).powi(2));
        Self {
            nominal: value,
            std_dev: if var > 0.0 { Some(var.sqrt()) } else { None },
        }
    }
}

impl From<f64> for UncertainValue {
    fn from(nominal: f64) -> Self {
        Self::exact(nominal)
    }
}

impl Add for UncertainValue {
    type Output = UncertainValue;
    fn add(self, rhs: Self) -> Self {
        Self::propagate(self.nominal + rhs.nominal, &self, 1.0, &rhs, 1.0)
    }
}

impl Sub for UncertainValue {
    type Output = UncertainValue;
    fn sub(self, rhs: Self) -> Self {
        Self::propagate(self.nominal - rhs.nominal, &self, 1.0, &rhs, -1.0)
    }
}

impl Mul for UncertainValue {
    type Output = UncertainValue;
    fn mul(self, rhs: Self) -> Self {
        Self::propagate(
            self.nominal * rhs.nominal,
            &self,
            rhs.nominal,
            &rhs,
            self.nominal,
        )
    }
}

impl Div for UncertainValue {
    type Output = UncertainValue;
    fn div(self, rhs: Self) -> Self {
        let q = self.nominal / rhs.nominal;
        Self::propagate(q, &self, 1.0 / rhs.nominal, &rhs, -q / rhs.nominal)
    }
}

impl Neg for UncertainValue {
    type Output = UncertainValue;
    fn neg(self) -> Self {
        Self {
            nominal: -self.nominal,
            std_dev: self.std_dev,
        }
    }
}

impl Add<f64> for UncertainValue {
    type Output = UncertainValue;
    fn add(self, rhs: f64) -> Self {
        self + Self::exact(rhs)
    }
}

impl Sub<f64> for UncertainValue {
    type Output = UncertainValue;
    fn sub(self, rhs: f64) -> Self {
        self - Self::exact(rhs)
    }
}

impl Mul<f64> for UncertainValue {
    type Output = UncertainValue;
    fn mul(self, rhs: f64) -> Self {
        self * Self::exact(rhs)
    }
}

impl Div<f64> for UncertainValue {
    type Output = UncertainValue;
    fn div(self, rhs: f64) -> Self {
        self / Self::exact(rhs)
    }
}

/// An array of quantities sharing one optional deviation vector.
///
/// Invariants (enforced on construction):
/// - `std_dev`, when present, has the same length as `nominal`
/// - deviations are finite and non-negative
/// - a deviation vector that is uniformly zero collapses to `None`
#[derive(Debug, Clone, PartialEq)]
pub struct UncertainSeries {
    nominal: Vec<f64>,
    std_dev: Option<Vec<f64>>,
}

impl UncertainSeries {
    pub fn new(nominal: Vec<f64>, std_dev: Option<Vec<f64>>) -> Result<Self, AnalysisError> {
        let std_dev = match std_dev {
            None => None,
            Some(dev) => {
                if dev.len() != nominal.len() {
                    return Err(AnalysisError::shape(
                        "uncertain series",
                        nominal.len(),
                        dev.len(),
                    ));
                }
                if dev.iter().any(|s| *s < 0.0 || !s.is_finite()) {
                    return Err(AnalysisError::invalid(
                        "standard deviations must be finite and non-negative",
                    ));
                }
                // Uniformly-zero deviations mean "exact", not "zero-width
                // confidence interval".
                if dev.iter().all(|s| *s == 0.0) {
                    None
                } else {
                    Some(dev)
                }
            }
        };
        Ok(Self { nominal, std_dev })
    }

    /// A series of exact values.
    pub fn exact(nominal: Vec<f64>) -> Self {
        Self {
            nominal,
            std_dev: None,
        }
    }

    pub fn len(&self) -> usize {
        self.nominal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nominal.is_empty()
    }

    pub fn nominal(&self) -> &[f64] {
        &self.nominal
    }

    pub fn std_dev(&self) -> Option<&[f64]> {
        self.std_dev.as_deref()
    }

    pub fn get(&self, index: usize) -> Option<UncertainValue> {
        let nominal = *self.nominal.get(index)?;
        let std_dev = self
            .std_dev
            .as_ref()
            .map(|dev| dev[index])
            .filter(|s| *s != 0.0);
        Some(UncertainValue { nominal, std_dev })
    }

    pub fn iter(&self) -> impl Iterator<Item = UncertainValue> + '_ {
        (0..self.len()).map(|i| self.get(i).unwrap())
    }

    pub fn into_parts(self) -> (Vec<f64>, Option<Vec<f64>>) {
        (self.nominal, self.std_dev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_deviation_normalizes_to_exact() {
        let v = UncertainValue::new(3.0, 0.0).unwrap();
        assert_eq!(v.std_dev, None);

        let s = UncertainSeries::new(vec![1.0, 2.0], Some(vec![0.0, 0.0])).unwrap();
        assert_eq!(s.std_dev(), None);
    }

    #[test]
    fn negative_deviation_rejected() {
        assert!(UncertainValue::new(1.0, -0.1).is_err());
        assert!(UncertainSeries::new(vec![1.0], Some(vec![-1.0])).is_err());
    }

    #[test]
    fn series_shape_mismatch_rejected() {
        let err = UncertainSeries::new(vec![1.0, 2.0], Some(vec![0.1])).unwrap_err();
        assert!(matches!(err, AnalysisError::ShapeMismatch { .. }));
    }

    #[test]
    fn addition_combines_in_quadrature() {
        let a = UncertainValue::new(1.0, 3.0).unwrap();
        let b = UncertainValue::new(2.0, 4.0).unwrap();
        let c = a + b;
        assert!((c.nominal - 3.0).abs() < 1e-12);
        assert!((c.dev() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn multiplication_scales_sensitivities() {
        // z = a*b with a = 2 ± 0.1, b = 5 ± 0.2:
        // σz = sqrt((5·0.1)² + (2·0.2)²) = sqrt(0.25 + 0.16)
        let a = UncertainValue::new(2.0, 0.1).unwrap();
        let b = UncertainValue::new(5.0, 0.2).unwrap();
        let z = a * b;
        assert!((z.nominal - 10.0).abs() < 1e-12);
        assert!((z.dev() - 0.41_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn division_matches_hand_propagation() {
        // z = a/b with a = 10 ± 0.5, b = 4 ± 0.1:
        // σz = sqrt((0.5/4)² + (10·0.1/16)²)
        let a = UncertainValue::new(10.0, 0.5).unwrap();
        let b = UncertainValue::new(4.0, 0.1).unwrap();
        let z = a / b;
        let expected = ((0.5 / 4.0f64).powi(2) + (10.0 * 0.1 / 16.0f64).powi(2)).sqrt();
        assert!((z.nominal - 2.5).abs() < 1e-12);
        assert!((z.dev() - expected).abs() < 1e-12);
    }

    #[test]
    fn exact_operands_stay_exact() {
        let a = UncertainValue::exact(2.0);
        let b = UncertainValue::exact(3.0);
        assert_eq!((a * b).std_dev, None);
        assert_eq!((a + b).std_dev, None);
    }

    #[test]
    fn sqrt_propagates_half_relative_error() {
        let a = UncertainValue::new(4.0, 0.4).unwrap();
        let r = a.sqrt();
        assert!((r.nominal - 2.0).abs() < 1e-12);
        assert!((r.dev() - 0.4 * 0.5 / 2.0).abs() < 1e-12);
    }

    #[test]
    fn series_elementwise_access() {
        let s = UncertainSeries::new(vec![1.0, 2.0, 3.0], Some(vec![0.0, 0.2, 0.3])).unwrap();
        assert_eq!(s.get(0).unwrap().std_dev, None);
        assert_eq!(s.get(1).unwrap().std_dev, Some(0.2));
        assert_eq!(s.get(3), None);
        assert_eq!(s.iter().count(), 3);
    }
}
