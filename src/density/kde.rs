//! Gaussian kernel density estimates.
//!
//! Both estimators follow the usual convention of scaling the sample
//! covariance (`ddof = 1`) by the square of a bandwidth factor.

use std::f64::consts::PI;

use super::{mean, sample_variance};

// ---------------------------------------------------------------------------
// 1D
// ---------------------------------------------------------------------------

/// One-dimensional Gaussian KDE.
#[derive(Debug, Clone)]
pub struct Kde1d {
    data: Vec<f64>,
    sigma: f64,
}

impl Kde1d {
    /// Kernel standard deviation is `factor * std(data, ddof=1)`.
    ///
    /// Constant data has no spread to scale, so a unit standard deviation
    /// is used instead.  Returns `None` for fewer than two points or a
    /// non-positive factor.
    pub fn with_factor(data: &[f64], factor: f64) -> Option<Self> {
        if data.len() < 2 || !(factor > 0.0) {
            return None;
        }
        let var = sample_variance(data);
        let spread = if var > 0.0 && var.is_finite() {
            var.sqrt()
        } else {
            1.0
        };
        Some(Kde1d {
            data: data.to_vec(),
            sigma: factor * spread,
        })
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let norm = 1.0 / ((2.0 * PI).sqrt() * self.sigma * self.data.len() as f64);
        let inv_two_var = 1.0 / (2.0 * self.sigma * self.sigma);
        self.data
            .iter()
            .map(|&xi| {
                let d = x - xi;
                (-d * d * inv_two_var).exp()
            })
            .sum::<f64>()
            * norm
    }

    pub fn evaluate_many(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.evaluate(x)).collect()
    }
}

// ---------------------------------------------------------------------------
// 2D
// ---------------------------------------------------------------------------

/// Two-dimensional Gaussian KDE with Scott's rule bandwidth
/// (`n^(-1/6)` for two dimensions).
///
/// Points that span no area (all on one line, or all identical) have a
/// singular covariance.  Those keep a kernel of matching rank: a 1D kernel
/// along the line, or a point mass.
#[derive(Debug, Clone)]
pub struct Kde2d<'a> {
    xs: &'a [f64],
    ys: &'a [f64],
    kernel: Kernel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kernel {
    /// Inverse kernel covariance, row-major `[a, b, b, c]` stored as `(a, b, c)`.
    Full { inv: (f64, f64, f64), norm: f64 },
    /// Unit direction of the line and the kernel standard deviation along it.
    Line { dir: (f64, f64), sigma: f64, norm: f64 },
    Point,
}

/// Rank of the kernel actually used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelRank {
    Full,
    Line,
    Point,
}

impl<'a> Kde2d<'a> {
    /// Returns `None` for no points or mismatched lengths.
    pub fn new(xs: &'a [f64], ys: &'a [f64]) -> Option<Self> {
        let n = xs.len();
        if n == 0 || ys.len() != n {
            return None;
        }
        if n == 1 {
            return Some(Kde2d {
                xs,
                ys,
                kernel: Kernel::Point,
            });
        }
        let factor = (n as f64).powf(-1.0 / 6.0);
        let f2 = factor * factor;

        let (mx, my) = (mean(xs), mean(ys));
        let mut sxx = 0.0;
        let mut syy = 0.0;
        let mut sxy = 0.0;
        for (&x, &y) in xs.iter().zip(ys) {
            let dx = x - mx;
            let dy = y - my;
            sxx += dx * dx;
            syy += dy * dy;
            sxy += dx * dy;
        }
        let denom = (n - 1) as f64;
        let (cxx, cyy, cxy) = (sxx / denom * f2, syy / denom * f2, sxy / denom * f2);

        let det = cxx * cyy - cxy * cxy;
        // Relative tolerance: a determinant this small against the
        // variances means the points are numerically collinear.
        let kernel = if det.is_finite() && det > 1e-12 * cxx * cyy {
            Kernel::Full {
                inv: (cyy / det, -cxy / det, cxx / det),
                norm: 1.0 / (2.0 * PI * det.sqrt() * n as f64),
            }
        } else {
            line_kernel(cxx, cyy, cxy, n)
        };
        Some(Kde2d { xs, ys, kernel })
    }

    pub fn rank(&self) -> KernelRank {
        match self.kernel {
            Kernel::Full { .. } => KernelRank::Full,
            Kernel::Line { .. } => KernelRank::Line,
            Kernel::Point => KernelRank::Point,
        }
    }

    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        let points = self.xs.iter().zip(self.ys);
        match self.kernel {
            Kernel::Full { inv: (a, b, c), norm } => {
                points
                    .map(|(&xi, &yi)| {
                        let dx = x - xi;
                        let dy = y - yi;
                        (-0.5 * (a * dx * dx + 2.0 * b * dx * dy + c * dy * dy)).exp()
                    })
                    .sum::<f64>()
                    * norm
            }
            Kernel::Line {
                dir: (ux, uy),
                sigma,
                norm,
            } => {
                let inv_two_var = 1.0 / (2.0 * sigma * sigma);
                points
                    .map(|(&xi, &yi)| {
                        let t = (x - xi) * ux + (y - yi) * uy;
                        (-t * t * inv_two_var).exp()
                    })
                    .sum::<f64>()
                    * norm
            }
            Kernel::Point => {
                let hits = points.filter(|&(&xi, &yi)| xi == x && yi == y).count();
                hits as f64 / self.xs.len() as f64
            }
        }
    }

    /// Density at each of the estimator's own points.
    pub fn self_density(&self) -> Vec<f64> {
        self.xs
            .iter()
            .zip(self.ys)
            .map(|(&x, &y)| self.evaluate(x, y))
            .collect()
    }
}

/// Kernel for a rank-deficient covariance.  A rank-one covariance is
/// `trace * u u^T`; `u` is read off the row with the larger diagonal.
fn line_kernel(cxx: f64, cyy: f64, cxy: f64, n: usize) -> Kernel {
    let trace = cxx + cyy;
    if !(trace.is_finite() && trace > 0.0) {
        return Kernel::Point;
    }
    let (vx, vy) = if cxx >= cyy { (cxx, cxy) } else { (cxy, cyy) };
    let len = vx.hypot(vy);
    let sigma = trace.sqrt();
    Kernel::Line {
        dir: (vx / len, vy / len),
        sigma,
        norm: 1.0 / ((2.0 * PI).sqrt() * sigma * n as f64),
    }
}
