//! Taper window family for spectral estimation.
//!
//! A taper is generated by kind and length. The periodogram default is
//! `Kaiser { beta: 0.0 }`, which is exactly the rectangular window but keeps
//! the conventional parameterization of MATLAB-style `powerbw` (a Kaiser
//! taper sized to the sample count with β = 0).

use crate::math::special::bessel_i0;
use std::f64::consts::PI;

/// Window function kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Taper {
    /// All-ones (no tapering).
    Rectangular,
    Hann,
    Hamming,
    Blackman,
    /// Kaiser window with shape parameter β; β = 0 is rectangular-equivalent.
    Kaiser { beta: f64 },
}

impl Default for Taper {
    fn default() -> Self {
        Taper::Kaiser { beta: 0.0 }
    }
}

impl Taper {
    /// Window coefficient at position `i` of `n` samples.
    pub fn coefficient(&self, i: usize, n: usize) -> f64 {
        if n <= 1 {
            return 1.0;
        }
        let n_f = (n - 1) as f64;
        let i_f = i as f64;

        match self {
            Taper::Rectangular => 1.0,
            Taper::Hann => 0.5 * (1.0 - (2.0 * PI * i_f / n_f).cos()),
            Taper::Hamming => 0.54 - 0.46 * (2.0 * PI * i_f / n_f).cos(),
            Taper::Blackman => {
                // Clamp to 0.0: exactly zero at the endpoints analytically,
                // but the 0.42/0.08 coefficients can produce -ε in floats.
                (0.42 - 0.5 * (2.0 * PI * i_f / n_f).cos()
                    + 0.08 * (4.0 * PI * i_f / n_f).cos())
                .max(0.0)
            }
            Taper::Kaiser { beta } => {
                let ratio = 2.0 * i_f / n_f - 1.0;
                bessel_i0(beta * (1.0 - ratio * ratio).max(0.0).sqrt()) / bessel_i0(*beta)
            }
        }
    }

    /// Generate the full coefficient vector for `n` samples.
    pub fn generate(&self, n: usize) -> Vec<f64> {
        (0..n).map(|i| self.coefficient(i, n)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kaiser_beta_zero_is_all_ones() {
        let w = Taper::Kaiser { beta: 0.0 }.generate(64);
        assert!(w.iter().all(|&c| (c - 1.0).abs() < 1e-15));
    }

    #[test]
    fn kaiser_tapers_toward_edges() {
        let w = Taper::Kaiser { beta: 6.0 }.generate(33);
        // Symmetric, peaked in the middle, attenuated at the edges.
        assert!((w[16] - 1.0).abs() < 1e-12);
        assert!(w[0] < 0.02);
        assert!((w[0] - w[32]).abs() < 1e-12);
        assert!((w[5] - w[27]).abs() < 1e-12);
    }

    #[test]
    fn hann_endpoints_are_zero() {
        let w = Taper::Hann.generate(16);
        assert!(w[0].abs() < 1e-15);
        assert!(w.iter().all(|&c| (0.0..=1.0).contains(&c)));
    }

    #[test]
    fn degenerate_lengths() {
        assert_eq!(Taper::Hann.generate(1), vec![1.0]);
        assert!(Taper::Blackman.generate(0).is_empty());
    }
}
