//! −r dB power bandwidth estimation.
//!
//! Given a spectrum (computed here from time samples, or supplied
//! pre-computed), the estimator finds the frequency span over which the PSD
//! stays within `r` decibels of a reference level:
//!
//! 1. reference power = global PSD maximum, or the band mean when explicit
//!    frequency limits are given
//! 2. target level = `reference · 10^(−|r|/10)`
//! 3. scan outward from the reference-power bin in both directions for the
//!    first bin at or below the target; the exact crossing frequency comes
//!    from **log-domain** linear interpolation between that bin and its
//!    threshold-adjacent neighbor (PSD slopes are conventionally read
//!    logarithmically, matching MATLAB's `powerbw`)
//! 4. in-band and total power are trapezoidal integrals of the PSD
//!
//! A side with no crossing degenerates to the spectrum's extreme frequency on
//! that side; that is not an error.

use tracing::debug;

use crate::error::AnalysisError;
use crate::spectral::periodogram::periodogram;
use crate::spectral::window::Taper;

/// Input for one bandwidth estimation, mutually exclusive by construction.
#[derive(Debug, Clone, Copy)]
pub enum SpectrumInput<'a> {
    /// Time-domain samples; the estimator computes the periodogram itself.
    Time { samples: &'a [f64], fs: f64 },
    /// An already-computed spectrum; `freq` and `psd` must pair up.
    Psd { freq: &'a [f64], psd: &'a [f64] },
}

/// Per-call configuration for [`power_bandwidth`].
#[derive(Debug, Clone)]
pub struct BandwidthOptions {
    /// Power drop defining the band edges, in dB. The conventional half-power
    /// bandwidth is 3.01 dB.
    pub rolloff_db: f64,
    /// Optional `(f1, f2)` band; when present the reference power is the mean
    /// PSD over it instead of the global maximum.
    pub freq_lims: Option<(f64, f64)>,
    /// Taper applied in `Time` mode.
    pub taper: Taper,
}

impl Default for BandwidthOptions {
    fn default() -> Self {
        Self {
            rolloff_db: 3.01,
            freq_lims: None,
            taper: Taper::default(),
        }
    }
}

/// Immutable snapshot of one bandwidth estimation.
#[derive(Debug, Clone)]
pub struct BandwidthResult {
    /// `f_hi − f_lo` in Hz.
    pub bandwidth: f64,
    /// Lower band edge.
    pub f_lo: f64,
    /// Upper band edge.
    pub f_hi: f64,
    /// Trapezoidal PSD integral over `[f_lo, f_hi]`.
    pub power_in_band: f64,
    /// Trapezoidal PSD integral over the whole spectrum.
    pub total_power: f64,
    /// Frequency vector the estimate was made over (NaN bins dropped).
    pub freq: Vec<f64>,
    /// PSD vector the estimate was made over (NaN bins dropped).
    pub psd: Vec<f64>,
}

/// Estimate the −r dB power bandwidth of a signal or spectrum.
pub fn power_bandwidth(
    input: SpectrumInput<'_>,
    options: &BandwidthOptions,
) -> Result<BandwidthResult, AnalysisError> {
    if !options.rolloff_db.is_finite() || options.rolloff_db == 0.0 {
        // A zero rolloff puts the target at the reference level itself, which
        // has no crossing to interpolate.
        return Err(AnalysisError::invalid(format!(
            "rolloff must be a nonzero dB value, got {}",
            options.rolloff_db
        )));
    }

    let (freq, psd) = match input {
        SpectrumInput::Time { samples, fs } => {
            // NaN samples are dropped before any computation.
            let clean: Vec<f64> = samples.iter().copied().filter(|v| !v.is_nan()).collect();
            if clean.is_empty() {
                return Err(AnalysisError::invalid("no finite samples to analyze"));
            }
            let spectrum = periodogram(&clean, fs, &options.taper)?;
            (spectrum.freq, spectrum.psd)
        }
        SpectrumInput::Psd { freq, psd } => {
            if freq.len() != psd.len() {
                return Err(AnalysisError::shape("frequency/PSD vectors", freq.len(), psd.len()));
            }
            // Drop a bin when either member of the pair is NaN.
            let pairs: Vec<(f64, f64)> = freq
                .iter()
                .zip(psd.iter())
                .filter(|(f, p)| !f.is_nan() && !p.is_nan())
                .map(|(&f, &p)| (f, p))
                .collect();
            if pairs.is_empty() {
                return Err(AnalysisError::invalid("no finite PSD bins to analyze"));
            }
            (
                pairs.iter().map(|(f, _)| *f).collect(),
                pairs.iter().map(|(_, p)| *p).collect(),
            )
        }
    };

    let (reference, i_ref) = reference_level(&freq, &psd, options.freq_lims)?;
    let target = reference * 10f64.powf(-options.rolloff_db.abs() / 10.0);
    debug!(reference, target, i_ref, "bandwidth threshold scan");

    // Left side: nearest at-or-below-target bin before the reference index.
    let f_lo = match (0..i_ref).rev().find(|&i| psd[i] <= target) {
        Some(i) => interp_log(freq[i], freq[i + 1], psd[i], psd[i + 1], target),
        None => freq[0],
    };

    // Right side: first at-or-below-target bin after the reference index. The
    // scan can match at bin 0 itself when the whole PSD is zero; there is no
    // inward neighbor to interpolate against then.
    let f_hi = match (i_ref..freq.len()).find(|&i| psd[i] <= target) {
        Some(0) => freq[0],
        Some(i) => interp_log(freq[i], freq[i - 1], psd[i], psd[i - 1], target),
        None => freq[freq.len() - 1],
    };

    let in_band: Vec<(f64, f64)> = freq
        .iter()
        .zip(psd.iter())
        .filter(|&(&f, _)| f >= f_lo && f <= f_hi)
        .map(|(&f, &p)| (f, p))
        .collect();

    Ok(BandwidthResult {
        bandwidth: f_hi - f_lo,
        f_lo,
        f_hi,
        power_in_band: trapezoid_pairs(&in_band),
        total_power: trapezoid(&freq, &psd),
        freq,
        psd,
    })
}

/// Resolve the reference power level and the bin index the outward scan
/// starts from.
fn reference_level(
    freq: &[f64],
    psd: &[f64],
    freq_lims: Option<(f64, f64)>,
) -> Result<(f64, usize), AnalysisError> {
    match freq_lims {
        None => {
            let i_max = argmax(psd);
            Ok((psd[i_max], i_max))
        }
        Some((f1, f2)) => {
            let band: Vec<usize> = (0..freq.len())
                .filter(|&i| freq[i] >= f1 && freq[i] <= f2)
                .collect();
            if band.is_empty() {
                return Err(AnalysisError::EmptyFrequencyRange { lo: f1, hi: f2 });
            }
            let mean = band.iter().map(|&i| psd[i]).sum::<f64>() / band.len() as f64;
            // Scan outward from where power concentrates inside the band.
            let i_ref = band
                .iter()
                .copied()
                .max_by(|&a, &b| {
                    psd[a].partial_cmp(&psd[b]).unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or(band[0]);
            Ok((mean, i_ref))
        }
    }
}

fn argmax(v: &[f64]) -> usize {
    let mut best = 0;
    for (i, &x) in v.iter().enumerate() {
        if x > v[best] {
            best = i;
        }
    }
    best
}

/// Linear interpolation in log-power between two adjacent bins.
///
/// `(f_below, p_below)` is the at-or-below-target bin, `(f_above, p_above)`
/// its neighbor toward the peak. Degenerate levels (equal or non-positive
/// power) pin the crossing to the below-target bin.
fn interp_log(f_below: f64, f_above: f64, p_below: f64, p_above: f64, target: f64) -> f64 {
    if p_below <= 0.0 || p_above <= 0.0 || p_below == p_above {
        return f_below;
    }
    let l_below = p_below.log10();
    let l_above = p_above.log10();
    let t = (target.log10() - l_below) / (l_above - l_below);
    f_below + t * (f_above - f_below)
}

fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    let mut total = 0.0;
    for i in 1..x.len() {
        total += 0.5 * (y[i] + y[i - 1]) * (x[i] - x[i - 1]);
    }
    total
}

fn trapezoid_pairs(pairs: &[(f64, f64)]) -> f64 {
    let mut total = 0.0;
    for w in pairs.windows(2) {
        total += 0.5 * (w[1].1 + w[0].1) * (w[1].0 - w[0].0);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sinusoid(f0: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * f0 * i as f64 / fs).sin())
            .collect()
    }

    #[test]
    fn symmetric_psd_interpolates_exact_log_crossings() {
        // Power levels in exact decades: log-domain interpolation lands the
        // -10 dB crossings halfway between bins.
        let freq = [0.0, 1.0, 2.0, 3.0, 4.0];
        let psd = [1e-4, 1e-2, 1.0, 1e-2, 1e-4];
        let options = BandwidthOptions {
            rolloff_db: 10.0,
            ..Default::default()
        };
        let result = power_bandwidth(
            SpectrumInput::Psd {
                freq: &freq,
                psd: &psd,
            },
            &options,
        )
        .unwrap();
        assert!((result.f_lo - 1.5).abs() < 1e-12);
        assert!((result.f_hi - 2.5).abs() < 1e-12);
        assert!((result.bandwidth - 1.0).abs() < 1e-12);
    }

    #[test]
    fn bandwidth_narrows_with_longer_observation() {
        let fs = 100.0;
        let f0 = 10.0;

        let short = power_bandwidth(
            SpectrumInput::Time {
                samples: &sinusoid(f0, fs, 200),
                fs,
            },
            &BandwidthOptions::default(),
        )
        .unwrap();
        let long = power_bandwidth(
            SpectrumInput::Time {
                samples: &sinusoid(f0, fs, 2000),
                fs,
            },
            &BandwidthOptions::default(),
        )
        .unwrap();

        assert!(long.bandwidth < short.bandwidth);
        // The band straddles the tone symmetrically (two-sided spectrum: the
        // detected lobe sits at ±f0).
        let center = 0.5 * (long.f_lo + long.f_hi);
        assert!((center.abs() - f0).abs() < long.bandwidth);
        assert!(long.f_lo < center && center < long.f_hi);
    }

    #[test]
    fn zero_rolloff_is_rejected() {
        // A reference-level bin at index 0 would otherwise make the rightward
        // scan look at its nonexistent left neighbor.
        let freq = [0.0, 1.0, 2.0];
        let psd = [5.0, 1.0, 1.0];
        let options = BandwidthOptions {
            rolloff_db: 0.0,
            ..Default::default()
        };
        let err = power_bandwidth(
            SpectrumInput::Psd {
                freq: &freq,
                psd: &psd,
            },
            &options,
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput(_)));
    }

    #[test]
    fn all_zero_psd_collapses_to_zero_bandwidth() {
        let freq = [0.0, 1.0, 2.0];
        let psd = [0.0, 0.0, 0.0];
        let result = power_bandwidth(
            SpectrumInput::Psd {
                freq: &freq,
                psd: &psd,
            },
            &BandwidthOptions::default(),
        )
        .unwrap();
        assert_eq!(result.f_lo, 0.0);
        assert_eq!(result.f_hi, 0.0);
        assert_eq!(result.bandwidth, 0.0);
    }

    #[test]
    fn mismatched_psd_vectors_fail() {
        let err = power_bandwidth(
            SpectrumInput::Psd {
                freq: &[0.0, 1.0],
                psd: &[1.0],
            },
            &BandwidthOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::ShapeMismatch { .. }));
    }

    #[test]
    fn empty_requested_band_fails() {
        let freq = [0.0, 1.0, 2.0];
        let psd = [1.0, 2.0, 1.0];
        let options = BandwidthOptions {
            freq_lims: Some((10.0, 20.0)),
            ..Default::default()
        };
        let err = power_bandwidth(
            SpectrumInput::Psd {
                freq: &freq,
                psd: &psd,
            },
            &options,
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyFrequencyRange { .. }));
    }

    #[test]
    fn band_limited_reference_uses_mean_power() {
        let freq: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let mut psd = vec![1.0; 10];
        psd[7] = 100.0; // Outside the requested band.
        let options = BandwidthOptions {
            freq_lims: Some((0.0, 5.0)),
            rolloff_db: 3.01,
            ..Default::default()
        };
        let result = power_bandwidth(
            SpectrumInput::Psd {
                freq: &freq,
                psd: &psd,
            },
            &options,
        )
        .unwrap();
        // Reference is the in-band mean (1.0); nothing in the flat region
        // drops below -3 dB of it until the scan leaves toward the edges.
        assert!(result.f_lo <= 0.0 + 1e-12);
        assert!(result.f_hi >= 5.0);
    }

    #[test]
    fn flat_spectrum_degenerates_to_full_span() {
        let freq = [0.0, 1.0, 2.0, 3.0];
        let psd = [2.0, 2.0, 2.0, 2.0];
        let result = power_bandwidth(
            SpectrumInput::Psd {
                freq: &freq,
                psd: &psd,
            },
            &BandwidthOptions::default(),
        )
        .unwrap();
        assert_eq!(result.f_lo, 0.0);
        assert_eq!(result.f_hi, 3.0);
        assert!((result.bandwidth - 3.0).abs() < 1e-12);
        assert!((result.power_in_band - result.total_power).abs() < 1e-12);
    }

    #[test]
    fn nan_bins_are_dropped_pairwise() {
        let freq = [0.0, 1.0, f64::NAN, 3.0, 4.0];
        let psd = [1e-4, 1e-2, 1.0, f64::NAN, 1e-4];
        let result = power_bandwidth(
            SpectrumInput::Psd {
                freq: &freq,
                psd: &psd,
            },
            &BandwidthOptions::default(),
        )
        .unwrap();
        assert_eq!(result.freq, vec![0.0, 1.0, 4.0]);
        assert_eq!(result.psd, vec![1e-4, 1e-2, 1e-4]);
    }

    #[test]
    fn nan_time_samples_are_dropped() {
        let fs = 50.0;
        let mut samples = sinusoid(5.0, fs, 500);
        samples[10] = f64::NAN;
        samples[200] = f64::NAN;
        let result = power_bandwidth(SpectrumInput::Time { samples: &samples, fs }, &BandwidthOptions::default());
        assert!(result.is_ok());
    }
}
