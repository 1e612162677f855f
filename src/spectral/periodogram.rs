//! Two-sided periodogram with density scaling.
//!
//! The estimate for a tapered signal `x·w` is:
//!
//! ```text
//! Pxx[k] = |X[k]|² / (fs · Σ w_i²)
//! ```
//!
//! which integrates (over frequency) to the mean-square of the signal
//! (Parseval). The spectrum is returned two-sided and frequency-shifted so
//! zero frequency sits at the center and the frequency axis ascends.

use rustfft::{FftPlanner, num_complex::Complex};

use crate::error::AnalysisError;
use crate::spectral::window::Taper;

/// One computed spectrum: paired frequency and PSD vectors.
#[derive(Debug, Clone)]
pub struct Spectrum {
    /// Frequency bins (Hz), ascending, zero-centered.
    pub freq: Vec<f64>,
    /// Power spectral density per bin (power/Hz).
    pub psd: Vec<f64>,
    /// Sampling frequency the spectrum was computed at.
    pub fs: f64,
    /// Frequency resolution (Hz per bin).
    pub resolution: f64,
}

/// Compute the two-sided density-scaled periodogram of `x`.
pub fn periodogram(x: &[f64], fs: f64, taper: &Taper) -> Result<Spectrum, AnalysisError> {
    if x.is_empty() {
        return Err(AnalysisError::invalid("periodogram requires samples"));
    }
    if !(fs.is_finite() && fs > 0.0) {
        return Err(AnalysisError::invalid(format!(
            "sampling frequency must be positive, got {fs}"
        )));
    }

    let n = x.len();
    let window = taper.generate(n);
    let window_power: f64 = window.iter().map(|w| w * w).sum();

    let mut buffer: Vec<Complex<f64>> = x
        .iter()
        .zip(window.iter())
        .map(|(&s, &w)| Complex::new(s * w, 0.0))
        .collect();

    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(n).process(&mut buffer);

    let scale = 1.0 / (fs * window_power);
    let psd_unshifted: Vec<f64> = buffer.iter().map(|c| c.norm_sqr() * scale).collect();
    let freq_unshifted: Vec<f64> = (0..n)
        .map(|k| {
            // Standard FFT bin ordering: non-negative bins first, then the
            // negative half.
            let k_signed = if k <= (n - 1) / 2 {
                k as f64
            } else {
                k as f64 - n as f64
            };
            k_signed * fs / n as f64
        })
        .collect();

    let freq = fft_shift(&freq_unshifted);
    let psd = fft_shift(&psd_unshifted);

    Ok(Spectrum {
        freq,
        psd,
        fs,
        resolution: fs / n as f64,
    })
}

/// Reorder a vector so the zero-frequency bin sits at the center.
fn fft_shift(v: &[f64]) -> Vec<f64> {
    let split = v.len().div_ceil(2);
    let mut out = Vec::with_capacity(v.len());
    out.extend_from_slice(&v[split..]);
    out.extend_from_slice(&v[..split]);
    out
}
