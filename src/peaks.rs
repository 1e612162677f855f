//! Peak detection with sub-sample quadratic refinement.
//!
//! Two stages:
//!
//! 1. a coarse local-maximum detector runs over the *nominal* y values
//!    (uncertainty stripped), yielding integer peak indices plus detector
//!    properties (height, prominence, width), optionally filtered
//! 2. each coarse peak is refined by fitting `a·x² + b·x + c` over a
//!    symmetric window of `n_points` samples per side (clipped at the array
//!    bounds), with the local x-coordinate recentered at the window mean for
//!    numerical conditioning
//!
//! The refined location is the quadratic vertex `-b/(2a)`, un-shifted back to
//! the original frame; its uncertainty and the peak value's uncertainty are
//! propagated from the local fit's covariance through the vertex gradients.
//!
//! A window whose fitted leading coefficient is numerically zero has no true
//! extremum; that fails as [`AnalysisError::DegenerateFit`] rather than
//! emitting an infinite peak location.
//!
//! Output ordering matches the coarse detector (ascending index), not peak
//! height.

use crate::convert::{Deviations, Samples, normalize};
use crate::error::AnalysisError;
use crate::fit::curve::{CurveFitOptions, curve_fit};
use crate::uncertain::UncertainValue;

/// Detector and refinement configuration for one [`find_peaks`] call.
#[derive(Debug, Clone)]
pub struct PeakOptions {
    /// Window half-width (samples per side) for the quadratic refinement.
    pub n_points: usize,
    /// Keep only peaks at least this high.
    pub min_height: Option<f64>,
    /// Keep only peaks with at least this prominence.
    pub min_prominence: Option<f64>,
    /// Keep only the highest peak within any run of this many samples.
    pub min_distance: Option<usize>,
}

impl Default for PeakOptions {
    fn default() -> Self {
        Self {
            n_points: 3,
            min_height: None,
            min_prominence: None,
            min_distance: None,
        }
    }
}

/// One refined peak.
#[derive(Debug, Clone)]
pub struct RefinedPeak {
    /// Sub-sample peak location with propagated uncertainty.
    pub x: UncertainValue,
    /// Peak value at the refined location with propagated uncertainty.
    pub y: UncertainValue,
    /// The coarse integer index this peak was refined from.
    pub index: usize,
}

/// Detector measurements passed through verbatim for the kept peaks.
#[derive(Debug, Clone)]
pub struct PeakProperties {
    pub heights: Vec<f64>,
    pub prominences: Vec<f64>,
    /// Peak width at half prominence, in samples, with the crossings linearly
    /// interpolated between bins.
    pub widths: Vec<f64>,
}

/// Result of one [`find_peaks`] call. Owned by the caller; nothing is shared
/// across calls.
#[derive(Debug, Clone)]
pub struct PeakSet {
    /// Refined peaks, ordered by ascending coarse index.
    pub peaks: Vec<RefinedPeak>,
    /// Raw integer indices from the coarse detector, same order.
    pub indices: Vec<usize>,
    pub properties: PeakProperties,
}

impl PeakSet {
    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }
}

/// Relative threshold below which a fitted leading coefficient counts as zero.
const DEGENERATE_A_TOL: f64 = 1e-10;

/// Detect and refine peaks in `y`.
///
/// `x`, if omitted, defaults to the sample indices. Deviations follow the
/// conversion-layer rules: embedded uncertainty wins, scalars broadcast.
pub fn find_peaks(
    y: impl Into<Samples>,
    x: Option<Samples>,
    y_err: Option<Deviations>,
    x_err: Option<Deviations>,
    options: &PeakOptions,
) -> Result<PeakSet, AnalysisError> {
    if options.n_points == 0 {
        return Err(AnalysisError::invalid("n_points must be at least 1"));
    }

    let y = y.into();
    let (yv, y_dev) = normalize(&y, y_err.as_ref())?;
    let n = yv.len();

    let (xv, x_dev) = match x {
        Some(x) => {
            let (xv, x_dev) = normalize(&x, x_err.as_ref())?;
            if xv.len() != n {
                return Err(AnalysisError::shape("find_peaks x/y", xv.len(), n));
            }
            (xv, x_dev)
        }
        None => ((0..n).map(|i| i as f64).collect(), None),
    };

    let indices = detect(&yv, options);

    let mut peaks = Vec::with_capacity(indices.len());
    for &i in &indices {
        peaks.push(refine(i, &xv, &yv, x_dev.as_deref(), y_dev.as_deref(), options)?);
    }

    let heights = indices.iter().map(|&i| yv[i]).collect();
    let prominences: Vec<f64> = indices.iter().map(|&i| prominence(&yv, i)).collect();
    let widths = indices
        .iter()
        .zip(prominences.iter())
        .map(|(&i, &prom)| half_prominence_width(&yv, i, prom))
        .collect();

    Ok(PeakSet {
        peaks,
        indices,
        properties: PeakProperties {
            heights,
            prominences,
            widths,
        },
    })
}

/// Coarse local-maximum detection over nominal values.
///
/// A sample is a peak when it is strictly higher than both neighbors;
/// plateaus count once, at their midpoint. Filters apply in the order
/// height, prominence, distance (highest peak wins within a distance run).
fn detect(y: &[f64], options: &PeakOptions) -> Vec<usize> {
    let n = y.len();
    let mut peaks = Vec::new();

    let mut i = 1;
    while n >= 3 && i < n - 1 {
        if y[i] > y[i - 1] {
            // Extend across a plateau of equal values.
            let mut j = i;
            while j + 1 < n && y[j + 1] == y[i] {
                j += 1;
            }
            if j + 1 < n && y[j + 1] < y[i] {
                peaks.push((i + j) / 2);
            }
            i = j + 1;
        } else {
            i += 1;
        }
    }

    if let Some(min_height) = options.min_height {
        peaks.retain(|&p| y[p] >= min_height);
    }
    if let Some(min_prominence) = options.min_prominence {
        peaks.retain(|&p| prominence(y, p) >= min_prominence);
    }
    if let Some(min_distance) = options.min_distance {
        peaks = enforce_distance(y, peaks, min_distance);
    }

    peaks
}

/// Topographic prominence of the peak at `index`.
///
/// On each side, scan until a strictly higher sample (or the edge) and track
/// the lowest valley; prominence is the peak height above the higher of the
/// two valley floors.
fn prominence(y: &[f64], index: usize) -> f64 {
    let peak = y[index];

    let mut left_min = peak;
    for &v in y[..index].iter().rev() {
        if v > peak {
            break;
        }
        left_min = left_min.min(v);
    }

    let mut right_min = peak;
    for &v in &y[index + 1..] {
        if v > peak {
            break;
        }
        right_min = right_min.min(v);
    }

    peak - left_min.max(right_min)
}

/// Width of the peak at `index` measured at half its prominence.
///
/// On each side the crossing of the evaluation level is linearly interpolated
/// between the first at-or-below bin and its inward neighbor; a side that
/// never crosses clamps to the array edge.
fn half_prominence_width(y: &[f64], index: usize, prom: f64) -> f64 {
    let level = y[index] - 0.5 * prom;
    let n = y.len();

    let mut left = 0.0;
    for i in (0..index).rev() {
        if y[i] <= level {
            left = i as f64 + (level - y[i]) / (y[i + 1] - y[i]);
            break;
        }
    }

    let mut right = (n - 1) as f64;
    for i in index + 1..n {
        if y[i] <= level {
            right = i as f64 - (level - y[i]) / (y[i - 1] - y[i]);
            break;
        }
    }

    right - left
}

/// Keep only the highest peak within any `min_distance`-sample neighborhood.
fn enforce_distance(y: &[f64], peaks: Vec<usize>, min_distance: usize) -> Vec<usize> {
    let mut by_height: Vec<usize> = peaks.clone();
    by_height.sort_by(|&a, &b| y[b].partial_cmp(&y[a]).unwrap_or(std::cmp::Ordering::Equal));

    let mut kept: Vec<usize> = Vec::new();
    for p in by_height {
        if kept.iter().all(|&k| p.abs_diff(k) >= min_distance) {
            kept.push(p);
        }
    }
    kept.sort_unstable();
    kept
}

/// Refine one coarse peak by a local quadratic fit.
fn refine(
    index: usize,
    x: &[f64],
    y: &[f64],
    x_dev: Option<&[f64]>,
    y_dev: Option<&[f64]>,
    options: &PeakOptions,
) -> Result<RefinedPeak, AnalysisError> {
    let n = y.len();
    let lo = index.saturating_sub(options.n_points);
    let hi = (index + options.n_points).min(n - 1);
    if hi - lo + 1 < 3 {
        return Err(AnalysisError::DegenerateFit(
            "refinement window has fewer than three samples",
        ));
    }

    // Recenter the local x-axis at the window mean for conditioning.
    let window_x = &x[lo..=hi];
    let x0 = window_x.iter().sum::<f64>() / window_x.len() as f64;
    let local_x: Vec<f64> = window_x.iter().map(|&xi| xi - x0).collect();
    let local_y = y[lo..=hi].to_vec();

    let window_err = |dev: Option<&[f64]>| {
        dev.map(|d| Deviations::PerSample(d[lo..=hi].to_vec()))
    };

    let quadratic = |x: f64, p: &[f64]| p[0] * x * x + p[1] * x + p[2];
    let fit = curve_fit(
        quadratic,
        local_x,
        local_y,
        Some(&[1.0, 1.0, 1.0]),
        window_err(x_dev),
        window_err(y_dev),
        &CurveFitOptions::default(),
    )?;

    let p = fit.params().nominal();
    let (a, b, c) = (p[0], p[1], p[2]);
    if !a.is_finite() || a.abs() <= DEGENERATE_A_TOL * c.abs().max(1.0) {
        return Err(AnalysisError::DegenerateFit(
            "quadratic leading coefficient is numerically zero; no extremum in window",
        ));
    }

    let cov = fit.covariance();

    // Vertex location: xv = -b/(2a), un-shifted by the window mean.
    let grad_x = [b / (2.0 * a * a), -1.0 / (2.0 * a), 0.0];
    let x_peak = quadratic_output(x0 - b / (2.0 * a), &grad_x, cov);

    // Vertex value: yv = c - b²/(4a).
    let grad_y = [b * b / (4.0 * a * a), -b / (2.0 * a), 1.0];
    let y_peak = quadratic_output(c - b * b / (4.0 * a), &grad_y, cov);

    Ok(RefinedPeak {
        x: x_peak,
        y: y_peak,
        index,
    })
}

/// Propagate the fit covariance through an output gradient: `σ² = gᵀ C g`.
///
/// An unresolvable covariance (exactly-determined window) leaves the output
/// exact rather than infinitely uncertain.
fn quadratic_output(value: f64, grad: &[f64; 3], cov: &nalgebra::DMatrix<f64>) -> UncertainValue {
    let mut var = 0.0;
    for i in 0..3 {
        for j in 0..3 {
            var += grad[i] * cov[(i, j)] * grad[j];
        }
    }
    let std_dev = var.max(0.0).sqrt();
    if std_dev.is_finite() && std_dev > 0.0 {
        UncertainValue {
            nominal: value,
            std_dev: Some(std_dev),
        }
    } else {
        UncertainValue::exact(value)
    }
}
