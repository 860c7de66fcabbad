/// Square 2D histogram over the data's own range, with bilinear lookup
/// between bin centres.
#[derive(Debug, Clone)]
pub struct Histogram2d {
    bins: usize,
    x_min: f64,
    x_width: f64,
    y_min: f64,
    y_width: f64,
    /// Counts indexed `[x_bin * bins + y_bin]`.
    counts: Vec<f64>,
}

/// Range of finite values; a degenerate range is widened by 0.5 each way.
fn axis_range(values: &[f64]) -> (f64, f64) {
    let (lo, hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() {
        return (0.0, 1.0);
    }
    if lo == hi {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo, hi)
    }
}

impl Histogram2d {
    /// `bins` equal-width bins per axis spanning [min, max]; the last bin
    /// is closed on the right.  Non-finite points are not counted.
    pub fn new(xs: &[f64], ys: &[f64], bins: usize) -> Self {
        let bins = bins.max(2);
        let (x_min, x_max) = axis_range(xs);
        let (y_min, y_max) = axis_range(ys);
        let mut hist = Histogram2d {
            bins,
            x_min,
            x_width: (x_max - x_min) / bins as f64,
            y_min,
            y_width: (y_max - y_min) / bins as f64,
            counts: vec![0.0; bins * bins],
        };
        for (&x, &y) in xs.iter().zip(ys) {
            if let (Some(i), Some(j)) = (hist.x_bin(x), hist.y_bin(y)) {
                hist.counts[i * bins + j] += 1.0;
            }
        }
        hist
    }

    fn bin_of(&self, v: f64, min: f64, width: f64) -> Option<usize> {
        if !v.is_finite() {
            return None;
        }
        let pos = (v - min) / width;
        if pos < 0.0 || pos > self.bins as f64 {
            return None;
        }
        Some((pos as usize).min(self.bins - 1))
    }

    fn x_bin(&self, x: f64) -> Option<usize> {
        self.bin_of(x, self.x_min, self.x_width)
    }

    fn y_bin(&self, y: f64) -> Option<usize> {
        self.bin_of(y, self.y_min, self.y_width)
    }

    pub fn count(&self, x_bin: usize, y_bin: usize) -> f64 {
        self.counts[x_bin * self.bins + y_bin]
    }

    pub fn max_count(&self) -> f64 {
        self.counts.iter().copied().fold(0.0, f64::max)
    }

    /// Bilinear interpolation of the count surface, with grid nodes at the
    /// bin centres.  Points outside the first/last centre get 0.
    pub fn interpolate(&self, x: f64, y: f64) -> f64 {
        let Some((i, tx)) = self.cell(x, self.x_min, self.x_width) else {
            return 0.0;
        };
        let Some((j, ty)) = self.cell(y, self.y_min, self.y_width) else {
            return 0.0;
        };
        let c00 = self.count(i, j);
        let c10 = self.count(i + 1, j);
        let c01 = self.count(i, j + 1);
        let c11 = self.count(i + 1, j + 1);
        c00 * (1.0 - tx) * (1.0 - ty) + c10 * tx * (1.0 - ty) + c01 * (1.0 - tx) * ty + c11 * tx * ty
    }

    /// Lower grid node index and fractional offset for a coordinate.
    fn cell(&self, v: f64, min: f64, width: f64) -> Option<(usize, f64)> {
        if !v.is_finite() {
            return None;
        }
        // Position measured in bin widths from the first centre.
        let pos = (v - min) / width - 0.5;
        let last = (self.bins - 1) as f64;
        if pos < 0.0 || pos > last {
            return None;
        }
        let idx = (pos.floor() as usize).min(self.bins - 2);
        Some((idx, pos - idx as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_land_in_expected_bins_and_max_is_inclusive() {
        let xs = [0.0, 0.1, 9.9, 10.0];
        let ys = [0.0, 0.1, 9.9, 10.0];
        let h = Histogram2d::new(&xs, &ys, 10);
        assert_eq!(h.count(0, 0), 2.0);
        assert_eq!(h.count(9, 9), 2.0);
        assert_eq!(h.max_count(), 2.0);
    }

    #[test]
    fn interpolation_hits_nodes_and_blends_between() {
        // 2 bins of width 1 over [0, 2]: centres at 0.5 and 1.5.
        let xs = [0.0, 0.4, 0.6, 2.0];
        let ys = [0.0, 0.0, 0.0, 2.0];
        let h = Histogram2d::new(&xs, &ys, 2);
        assert_eq!(h.count(0, 0), 3.0);
        assert_eq!(h.count(1, 1), 1.0);
        assert_eq!(h.interpolate(0.5, 0.5), 3.0);
        assert_eq!(h.interpolate(1.5, 1.5), 1.0);
        assert_eq!(h.interpolate(1.0, 0.5), 1.5);
        assert_eq!(h.interpolate(1.0, 1.0), 1.0);
    }

    #[test]
    fn outside_the_centre_grid_is_zero_not_nan() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [0.0, 1.0, 2.0, 3.0];
        let h = Histogram2d::new(&xs, &ys, 3);
        assert_eq!(h.interpolate(0.0, 0.0), 0.0);
        assert_eq!(h.interpolate(-5.0, 1.5), 0.0);
        assert_eq!(h.interpolate(f64::NAN, 1.5), 0.0);
    }

    #[test]
    fn constant_data_gets_a_unit_range() {
        let h = Histogram2d::new(&[4.0; 5], &[7.0; 5], 5);
        assert_eq!(h.max_count(), 5.0);
        assert!((h.interpolate(4.0, 7.0) - 5.0).abs() < 1e-9);
    }
}
