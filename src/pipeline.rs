//! Stage orchestration and the end-of-run summary.

use std::path::PathBuf;

use anyhow::Result;
use log::{error, info, warn};
use serde::Serialize;

use crate::config::Config;
use crate::data::loader;
use crate::ingest::{self, FailedFile, COMBINED_CSV};
use crate::render::ridge::{self, RidgeSample};
use crate::render::scatter::{self, ScatterFigure};

pub const RIDGE_FIGURE: &str = "combined_density.png";

/// What a run produced and what it skipped.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub processed: Vec<String>,
    pub failed: Vec<FailedFile>,
    pub combined_csv: Option<PathBuf>,
    pub ridge: RidgeSummary,
    pub scatter: ScatterSummary,
}

#[derive(Debug, Default, Serialize)]
pub struct RidgeSummary {
    pub figure: Option<PathBuf>,
    /// Row order of the figure, top to bottom.
    pub rows: Vec<String>,
    /// Samples with too few finite values in either channel.
    pub skipped: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct ScatterSummary {
    pub figures: Vec<ScatterFigure>,
    pub skipped: Vec<FailedFile>,
    pub failed: Vec<FailedFile>,
}

/// Ingest, then both figure families.  The ridge figure is drawn from the
/// in-memory columns of the ingest pass; scatter figures re-read the CSVs.
pub fn run_all(config: &Config) -> Result<RunSummary> {
    config.validate()?;
    let outcome = ingest::run(config)?;

    let ridge_skipped: Vec<String> = outcome
        .processed
        .iter()
        .filter(|name| !outcome.ridge_samples.iter().any(|s| &s.name == *name))
        .cloned()
        .collect();
    let ridge = RidgeSummary {
        skipped: ridge_skipped,
        ..render_ridge(&outcome.ridge_samples, config)
    };
    let scatter = run_scatter(config)?;

    info!("Batch conversion and analysis complete.");
    Ok(RunSummary {
        processed: outcome.processed,
        failed: outcome.failed,
        combined_csv: outcome.combined_csv,
        ridge,
        scatter,
    })
}

/// Ingest only.
pub fn run_ingest(config: &Config) -> Result<RunSummary> {
    config.validate()?;
    let outcome = ingest::run(config)?;
    Ok(RunSummary {
        processed: outcome.processed,
        failed: outcome.failed,
        combined_csv: outcome.combined_csv,
        ..RunSummary::default()
    })
}

/// Ridge figure from the derived columns of previously exported CSVs.
pub fn run_ridge(config: &Config) -> Result<RidgeSummary> {
    config.validate()?;
    let mut samples = Vec::new();
    let mut skipped = Vec::new();
    for path in exported_csvs(config)? {
        let sample = match loader::load_file(&path) {
            Ok(sample) => sample,
            Err(e) => {
                error!("Error reading {}: {e:#}", path.display());
                continue;
            }
        };
        let Some((fitc, pacific_blue)) = sample.fluorescence() else {
            warn!(
                "Skipping {}: no derived fluorescence columns",
                path.display()
            );
            continue;
        };
        let ridge = RidgeSample::new(&sample.name, fitc, pacific_blue);
        if ridge.is_plottable() {
            samples.push(ridge);
        } else {
            warn!(
                "Not enough data points to plot densities for {}",
                path.display()
            );
            skipped.push(sample.name);
        }
    }
    Ok(RidgeSummary {
        skipped,
        ..render_ridge(&samples, config)
    })
}

fn render_ridge(samples: &[RidgeSample], config: &Config) -> RidgeSummary {
    let path = config.output_dir.join(RIDGE_FIGURE);
    match ridge::render(samples, &path, &config.ridge) {
        Ok(rows) if rows.is_empty() => {
            warn!("No sample has enough data for the ridge plot");
            RidgeSummary::default()
        }
        Ok(rows) => RidgeSummary {
            figure: Some(path),
            rows,
            skipped: Vec::new(),
        },
        Err(e) => {
            error!("{e:#}");
            RidgeSummary::default()
        }
    }
}

/// Scatter figures for every exported sample CSV.
pub fn run_scatter(config: &Config) -> Result<ScatterSummary> {
    config.validate()?;
    let mut summary = ScatterSummary::default();
    let csvs = exported_csvs(config)?;
    if csvs.is_empty() {
        warn!("No CSV files found in {}", config.output_dir.display());
    }
    for path in csvs {
        info!("Processing: {}", path.display());
        match scatter::render_csv(&path, &config.scatter) {
            Ok(outcome) => {
                if let Some(reason) = outcome.skipped {
                    summary.skipped.push(FailedFile {
                        file: path.clone(),
                        reason,
                    });
                }
                summary.figures.extend(outcome.figures);
                summary
                    .failed
                    .extend(outcome.failures.into_iter().map(|reason| FailedFile {
                        file: path.clone(),
                        reason,
                    }));
            }
            Err(e) => {
                error!("Error processing {}: {e:#}", path.display());
                summary.failed.push(FailedFile {
                    file: path,
                    reason: format!("{e:#}"),
                });
            }
        }
    }
    Ok(summary)
}

/// Per-sample CSVs under the output root; the combined table is left out.
fn exported_csvs(config: &Config) -> Result<Vec<PathBuf>> {
    let combined = config.output_dir.join(COMBINED_CSV);
    Ok(loader::discover_files(&config.output_dir, &["csv"])?
        .into_iter()
        .filter(|p| *p != combined)
        .collect())
}
