use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use plotters::prelude::*;
use serde::Serialize;

use crate::color::{Colormap, Normalize};
use crate::config::ScatterSettings;
use crate::data::filter::positive_rows;
use crate::data::loader;
use crate::data::model::{channel, EventTable};
use crate::density::{compute_density, DensityMethod, PointDensity};

/// Columns that must be present and positive for a scatter figure.
pub const REQUIRED_COLUMNS: [&str; 3] = [channel::FSC, channel::FITC, channel::PACIFIC_BLUE];

/// One scatter-channel vs fluorescence-channel figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pairing {
    pub x: &'static str,
    pub y: &'static str,
    /// File name suffix, `<name>_<suffix>.png`.
    pub suffix: &'static str,
}

pub const PAIRINGS: [Pairing; 2] = [
    Pairing {
        x: channel::FSC,
        y: channel::FITC,
        suffix: "fitc",
    },
    Pairing {
        x: channel::FSC,
        y: channel::PACIFIC_BLUE,
        suffix: "pb",
    },
];

/// One written figure and the estimator that coloured it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterFigure {
    pub path: PathBuf,
    pub method: DensityMethod,
}

/// What happened to one CSV.
#[derive(Debug, Default)]
pub struct ScatterOutcome {
    pub figures: Vec<ScatterFigure>,
    /// Set when the whole sample was skipped.
    pub skipped: Option<String>,
    /// Pairings that failed, with the reason.
    pub failures: Vec<String>,
}

/// Load one exported CSV and write both density-coloured scatter figures
/// next to it.  Skips (not errors) when columns are missing or no row is
/// positive in all three channels.
pub fn render_csv(csv_path: &Path, settings: &ScatterSettings) -> Result<ScatterOutcome> {
    let sample = loader::load_file(csv_path)?;
    let mut outcome = ScatterOutcome::default();

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|c| sample.table.column(c).is_none())
        .collect();
    if !missing.is_empty() {
        let reason = format!("missing columns {missing:?}");
        warn!("Skipping {}: {reason}", csv_path.display());
        outcome.skipped = Some(reason);
        return Ok(outcome);
    }

    let table = positive_rows(&sample.table, &REQUIRED_COLUMNS)?;
    if table.is_empty() {
        let reason = "no positive data points".to_string();
        warn!("Skipping {}: {reason}", csv_path.display());
        outcome.skipped = Some(reason);
        return Ok(outcome);
    }

    let out_dir = csv_path.parent().unwrap_or(Path::new("."));
    for pairing in PAIRINGS {
        let path = out_dir.join(format!("{}_{}.png", sample.name, pairing.suffix));
        match render_pairing(&table, pairing, &path, settings) {
            Ok(method) => {
                info!("Saved {} vs {} plot to {}", pairing.x, pairing.y, path.display());
                outcome.figures.push(ScatterFigure { path, method });
            }
            Err(e) => {
                error!("Failed to render {}: {e:#}", path.display());
                outcome.failures.push(format!("{}: {e:#}", path.display()));
            }
        }
    }
    Ok(outcome)
}

/// Estimate densities for one pairing and draw the figure.  Returns the
/// estimator used.
pub fn render_pairing(
    table: &EventTable,
    pairing: Pairing,
    path: &Path,
    settings: &ScatterSettings,
) -> Result<DensityMethod> {
    let xs = table.require(pairing.x)?;
    let ys = table.require(pairing.y)?;
    let density = compute_density(xs, ys, settings);
    debug!(
        "{}: {:?} for {} points",
        path.display(),
        density.method,
        xs.len()
    );
    draw(xs, ys, &density, pairing, path, settings)
        .with_context(|| format!("drawing {}", path.display()))?;
    Ok(density.method)
}

fn draw(
    xs: &[f64],
    ys: &[f64],
    density: &PointDensity,
    pairing: Pairing,
    path: &Path,
    settings: &ScatterSettings,
) -> Result<()> {
    let root = BitMapBackend::new(path, (settings.size_px, settings.size_px)).into_drawing_area();
    root.fill(&WHITE)?;

    let axis = settings.axis_min..settings.axis_max;
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(axis.clone().log_scale(), axis.log_scale())?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_desc(pairing.x)
        .y_desc(pairing.y)
        .draw()?;

    let cmap = Colormap::viridis();
    let (lo, hi) = density.range();
    let norm = Normalize::new(lo, hi);
    let in_range = |v: f64| v >= settings.axis_min && v <= settings.axis_max;
    chart.draw_series(
        xs.iter()
            .zip(ys)
            .zip(&density.values)
            .filter(|((x, y), _)| in_range(**x) && in_range(**y))
            .map(|((&x, &y), &d)| Circle::new((x, y), 1, cmap.color_at(norm.apply(d)).filled())),
    )?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairings_share_the_scatter_channel() {
        assert!(PAIRINGS.iter().all(|p| p.x == channel::FSC));
        assert_eq!(PAIRINGS[0].suffix, "fitc");
        assert_eq!(PAIRINGS[1].suffix, "pb");
    }

    #[test]
    fn csv_without_channels_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fluorescence.csv");
        std::fs::write(&path, "A_FITC,A_PacificBlue\n1,2\n").unwrap();
        let outcome = render_csv(&path, &ScatterSettings::default()).unwrap();
        assert!(outcome.figures.is_empty());
        assert!(outcome.skipped.unwrap().contains("FSC-A"));
    }

    #[test]
    fn collinear_sample_reports_exact_kde() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("line.csv");
        let mut csv = String::from("FSC-A,FITC-A,Pacific Blue-A\n");
        for i in 0..40 {
            let fsc = 1000.0 + 25.0 * i as f64;
            csv.push_str(&format!("{fsc},{},{}\n", fsc * 0.5, 300 + (i * 7) % 13));
        }
        std::fs::write(&path, csv).unwrap();

        let outcome = render_csv(&path, &ScatterSettings::default()).unwrap();
        assert!(outcome.failures.is_empty());
        let methods: Vec<DensityMethod> = outcome.figures.iter().map(|f| f.method).collect();
        assert_eq!(methods, [DensityMethod::ExactKde, DensityMethod::ExactKde]);
        assert!(outcome.figures[0].path.ends_with("line_fitc.png"));
    }

    #[test]
    fn csv_without_positive_rows_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("neg.csv");
        std::fs::write(&path, "FSC-A,FITC-A,Pacific Blue-A\n1,-2,3\n0,5,5\n").unwrap();
        let outcome = render_csv(&path, &ScatterSettings::default()).unwrap();
        assert_eq!(outcome.skipped.as_deref(), Some("no positive data points"));
    }
}
