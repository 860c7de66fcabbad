use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use plotters::prelude::*;

use crate::color::{FITC_COLOR, PACIFIC_BLUE_COLOR};
use crate::config::RidgeSettings;
use crate::data::filter::drop_missing;
use crate::density::{ridge_curve, DensityCurve};

const SHADOW_ALPHA: f64 = 0.3;

/// Finite values of both fluorescence channels for one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct RidgeSample {
    pub name: String,
    pub fitc: Vec<f64>,
    pub pacific_blue: Vec<f64>,
}

impl RidgeSample {
    /// Missing and infinite values are dropped from each channel.
    pub fn new(name: &str, fitc: &[f64], pacific_blue: &[f64]) -> Self {
        RidgeSample {
            name: name.to_string(),
            fitc: drop_missing(fitc),
            pacific_blue: drop_missing(pacific_blue),
        }
    }

    /// A density needs more than one point in both channels.
    pub fn is_plottable(&self) -> bool {
        self.fitc.len() > 1 && self.pacific_blue.len() > 1
    }
}

/// One row of the figure.
struct Ridge<'a> {
    sample: &'a RidgeSample,
    fitc: DensityCurve,
    pacific_blue: DensityCurve,
}

/// Render every plottable sample as one stacked figure, rows sorted by
/// sample name.  Returns the names in drawing order; an empty list means
/// nothing was drawn and no file was written.
pub fn render(samples: &[RidgeSample], path: &Path, settings: &RidgeSettings) -> Result<Vec<String>> {
    let mut ordered: Vec<&RidgeSample> = samples.iter().filter(|s| s.is_plottable()).collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name));

    let ridges: Vec<Ridge<'_>> = ordered
        .into_iter()
        .filter_map(|sample| {
            Some(Ridge {
                sample,
                fitc: ridge_curve(&sample.fitc, settings)?,
                pacific_blue: ridge_curve(&sample.pacific_blue, settings)?,
            })
        })
        .collect();
    if ridges.is_empty() {
        return Ok(Vec::new());
    }

    draw(&ridges, path, settings)
        .with_context(|| format!("rendering ridge plot {}", path.display()))?;
    info!("Saved combined stacked density plot to {}", path.display());
    Ok(ridges.iter().map(|r| r.sample.name.clone()).collect())
}

/// Figure height grows by one fixed row per sample plus the axis strip.
pub fn figure_size(n_rows: usize, settings: &RidgeSettings) -> (u32, u32) {
    (
        settings.width_px,
        settings.row_height_px * n_rows as u32 + settings.axis_strip_px,
    )
}

fn draw(ridges: &[Ridge<'_>], path: &Path, settings: &RidgeSettings) -> Result<()> {
    let n = ridges.len();
    let root = BitMapBackend::new(path, figure_size(n, settings)).into_drawing_area();
    root.fill(&WHITE)?;

    // Rows touch: no gap between subplots.  The last row also owns the
    // axis strip.
    let breaks: Vec<u32> = (1..n).map(|i| i as u32 * settings.row_height_px).collect();
    let rows = root.split_by_breakpoints(Vec::<u32>::new(), breaks);

    let x_range = settings.grid_min..settings.grid_max;
    let y_max = settings.y_max;
    for (i, (area, ridge)) in rows.iter().zip(ridges).enumerate() {
        let last = i + 1 == n;
        let mut chart = ChartBuilder::on(area)
            .x_label_area_size(if last { settings.axis_strip_px } else { 0 })
            .build_cartesian_2d(x_range.clone(), 0f64..y_max)?;

        if last {
            chart
                .configure_mesh()
                .disable_x_mesh()
                .disable_y_mesh()
                .disable_y_axis()
                .x_labels(5)
                .x_label_formatter(&|v: &f64| format!("{v:.0}"))
                .draw()?;
        }

        for (curve, color) in [
            (&ridge.fitc, FITC_COLOR),
            (&ridge.pacific_blue, PACIFIC_BLUE_COLOR),
        ] {
            let clipped: Vec<(f64, f64)> = curve.points().map(|(x, y)| (x, y.min(y_max))).collect();
            chart.draw_series(AreaSeries::new(
                clipped.iter().copied(),
                0.0,
                color.mix(SHADOW_ALPHA).filled(),
            ))?;
            chart.draw_series(LineSeries::new(clipped, color.stroke_width(1)))?;
        }
    }

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_point_channel_is_not_plottable() {
        let s = RidgeSample::new("one", &[5.0], &[3.0, 4.0]);
        assert!(!s.is_plottable());
        let s = RidgeSample::new("nan", &[5.0, f64::NAN], &[3.0, 4.0]);
        assert!(!s.is_plottable());
        let s = RidgeSample::new("ok", &[5.0, 6.0], &[3.0, 4.0]);
        assert!(s.is_plottable());
    }

    #[test]
    fn height_scales_with_rows() {
        let settings = RidgeSettings::default();
        let (w1, h1) = figure_size(1, &settings);
        let (w3, h3) = figure_size(3, &settings);
        assert_eq!(w1, w3);
        assert_eq!(h3 - h1, 2 * settings.row_height_px);
    }

    #[test]
    fn nothing_plottable_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("combined_density.png");
        let samples = [RidgeSample::new("a", &[1.0], &[1.0])];
        let drawn = render(&samples, &path, &RidgeSettings::default()).unwrap();
        assert!(drawn.is_empty());
        assert!(!path.exists());
    }
}
