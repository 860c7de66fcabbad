/// Density estimation for both figure families.
///
/// ```text
///  ridge:    values ──► bandwidth = C / std ──► Kde1d ──► curve on fixed grid
///  scatter:  (x, y)  ──► n <= threshold ? Kde2d self-density
///                                       : Histogram2d + bilinear lookup
/// ```
pub mod histogram;
pub mod kde;

use log::debug;
use serde::Serialize;

use crate::config::{RidgeSettings, ScatterSettings};
pub use histogram::Histogram2d;
pub use kde::{Kde1d, Kde2d, KernelRank};

// ---------------------------------------------------------------------------
// Summary statistics
// ---------------------------------------------------------------------------

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Every value equal.  Checked up front so constant data has exactly zero
/// spread instead of summation round-off.
fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

/// Population standard deviation (`ddof = 0`).
pub fn std_dev(values: &[f64]) -> f64 {
    if is_constant(values) {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Sample variance (`ddof = 1`).
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 || is_constant(values) {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64
}

/// `n` evenly spaced points from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// Ridge curves
// ---------------------------------------------------------------------------

/// Bandwidth factor for one ridge channel: `constant / std(values)`.
///
/// Constant data is deliberately treated as having a standard deviation of
/// 1, so its factor is `constant` itself.  Figures depend on this choice.
pub fn ridge_bandwidth(values: &[f64], constant: f64) -> f64 {
    let sd = std_dev(values);
    let sd = if sd == 0.0 { 1.0 } else { sd };
    constant / sd
}

/// Scaled density of one channel on the ridge grid.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityCurve {
    pub bandwidth: f64,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl DensityCurve {
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.x.iter().copied().zip(self.y.iter().copied())
    }
}

/// Evaluate the adaptively-bandwidthed KDE of `values` on the configured
/// grid, multiplied by the display amplitude.  `None` for fewer than two
/// values.
pub fn ridge_curve(values: &[f64], settings: &RidgeSettings) -> Option<DensityCurve> {
    let bandwidth = ridge_bandwidth(values, settings.bandwidth_constant);
    let kde = Kde1d::with_factor(values, bandwidth)?;
    let x = linspace(settings.grid_min, settings.grid_max, settings.grid_points);
    let y = kde
        .evaluate_many(&x)
        .into_iter()
        .map(|d| d * settings.amplitude)
        .collect();
    Some(DensityCurve { bandwidth, x, y })
}

// ---------------------------------------------------------------------------
// Scatter point densities
// ---------------------------------------------------------------------------

/// How per-point densities are estimated for one scatter pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DensityMethod {
    ExactKde,
    HistogramInterpolation,
}

impl DensityMethod {
    /// Exact KDE up to and including `max_exact` points.
    pub fn select(n_points: usize, max_exact: usize) -> Self {
        if n_points <= max_exact {
            DensityMethod::ExactKde
        } else {
            DensityMethod::HistogramInterpolation
        }
    }
}

/// Per-point densities plus the method that produced them.
#[derive(Debug, Clone)]
pub struct PointDensity {
    pub method: DensityMethod,
    pub values: Vec<f64>,
}

impl PointDensity {
    pub fn range(&self) -> (f64, f64) {
        self.values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }
}

/// Density at every `(xs[i], ys[i])`.  Every value is finite and
/// non-negative.
///
/// Up to `exact_kde_max_points` the exact KDE is used, including for
/// collinear or repeated points, which get a reduced-rank kernel.
pub fn compute_density(xs: &[f64], ys: &[f64], settings: &ScatterSettings) -> PointDensity {
    let method = DensityMethod::select(xs.len(), settings.exact_kde_max_points);
    if method == DensityMethod::ExactKde {
        if let Some(kde) = Kde2d::new(xs, ys) {
            if kde.rank() != KernelRank::Full {
                debug!(
                    "kernel covariance is singular for {} points, using {:?} kernel",
                    xs.len(),
                    kde.rank()
                );
            }
            return PointDensity {
                method,
                values: sanitize(kde.self_density()),
            };
        }
    }
    let hist = Histogram2d::new(xs, ys, settings.histogram_bins);
    PointDensity {
        method: DensityMethod::HistogramInterpolation,
        values: xs
            .iter()
            .zip(ys)
            .map(|(&x, &y)| hist.interpolate(x, y))
            .collect(),
    }
}

fn sanitize(values: Vec<f64>) -> Vec<f64> {
    values
        .into_iter()
        .map(|v| if v.is_finite() && v > 0.0 { v } else { 0.0 })
        .collect()
}
