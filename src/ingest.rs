//! Ingest-and-transform: parse every instrument file, add the two
//! normalised fluorescence columns, export CSV/JSON, and gather the
//! combined fluorescence table.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::config::{Config, References};
use crate::data::loader::{self, ensure_output_dir, mirrored_dir};
use crate::data::model::{channel, FcsHeader, Metadata, Sample};
use crate::error::ConfigError;
use crate::render::ridge::RidgeSample;

pub const INSTRUMENT_EXTENSIONS: &[&str] = &["fcs"];
pub const COMBINED_CSV: &str = "fluorescence.csv";

// ---------------------------------------------------------------------------
// Normalisation
// ---------------------------------------------------------------------------

/// Converts raw channel intensities into fluorescence relative to a
/// background ratio: `(channel / FSC-A) / reference - 1`.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    fitc_reference: f64,
    pacific_blue_reference: f64,
}

impl Normalizer {
    /// Fails if either reference is zero or non-finite.
    pub fn new(references: References) -> Result<Self, ConfigError> {
        references.validate()?;
        Ok(Normalizer {
            fitc_reference: references.fitc,
            pacific_blue_reference: references.pacific_blue,
        })
    }

    pub fn relative_fluorescence(signal: f64, scatter: f64, reference: f64) -> f64 {
        (signal / scatter) / reference - 1.0
    }

    fn derive(signal: &[f64], scatter: &[f64], reference: f64) -> Vec<f64> {
        signal
            .iter()
            .zip(scatter)
            .map(|(&s, &f)| Self::relative_fluorescence(s, f, reference))
            .collect()
    }

    /// Add `FITC_fluorescence` and `Pacific_Blue_fluorescence` to the
    /// sample's table.  Rows with `FSC-A == 0` end up non-finite.
    pub fn apply(&self, sample: &mut Sample) -> Result<()> {
        let table = &sample.table;
        let fsc = table.require(channel::FSC)?;
        let fitc = Self::derive(table.require(channel::FITC)?, fsc, self.fitc_reference);
        let pacific_blue = Self::derive(
            table.require(channel::PACIFIC_BLUE)?,
            fsc,
            self.pacific_blue_reference,
        );
        sample.table.set_column(channel::FITC_FLUORESCENCE, fitc)?;
        sample
            .table
            .set_column(channel::PACIFIC_BLUE_FLUORESCENCE, pacific_blue)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Combined table
// ---------------------------------------------------------------------------

/// Side-by-side derived columns of every processed sample, aligned by row
/// position.  Samples of different lengths leave trailing empty cells.
#[derive(Debug, Clone, Default)]
pub struct CombinedTable {
    columns: Vec<(String, Vec<f64>)>,
}

impl CombinedTable {
    /// Add `{name}_FITC` and `{name}_PacificBlue`.  A repeated sample name
    /// replaces the earlier columns in place.
    pub fn insert(&mut self, name: &str, fitc: &[f64], pacific_blue: &[f64]) {
        self.put(format!("{name}_FITC"), fitc.to_vec());
        self.put(format!("{name}_PacificBlue"), pacific_blue.to_vec());
    }

    fn put(&mut self, key: String, values: Vec<f64>) {
        match self.columns.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => {
                warn!("Duplicate sample column {key}; keeping the later file");
                slot.1 = values;
            }
            None => self.columns.push((key, values)),
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let headers = self.column_names();
        let columns: Vec<&[f64]> = self.columns.iter().map(|(_, v)| v.as_slice()).collect();
        loader::write_columns_csv(path, &headers, &columns)
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// A file that could not be processed, and why.
#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub file: PathBuf,
    pub reason: String,
}

/// Result of one ingest pass.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    /// Sample names that reached the combined table, in processing order.
    pub processed: Vec<String>,
    pub failed: Vec<FailedFile>,
    /// Derived columns of processed samples, for the ridge figure.
    pub ridge_samples: Vec<RidgeSample>,
    pub csv_files: Vec<PathBuf>,
    pub combined_csv: Option<PathBuf>,
}

/// Run the ingest pass over `config.input_dir`.
///
/// The references are checked before any file is opened.  Every per-file
/// failure is logged and recorded; the batch always continues.
pub fn run(config: &Config) -> Result<IngestOutcome> {
    let normalizer = Normalizer::new(config.references)?;
    let files = loader::discover_files(&config.input_dir, INSTRUMENT_EXTENSIONS)?;
    info!(
        "Found {} instrument file(s) under {}",
        files.len(),
        config.input_dir.display()
    );
    ensure_output_dir(&config.output_dir)?;

    let mut outcome = IngestOutcome::default();
    let mut combined = CombinedTable::default();

    for path in &files {
        let sample = match prepare(path, &normalizer) {
            Ok(sample) => sample,
            Err(e) => {
                error!("Error processing {}: {e:#}", path.display());
                outcome.failed.push(FailedFile {
                    file: path.clone(),
                    reason: format!("{e:#}"),
                });
                continue;
            }
        };

        let Some((fitc, pacific_blue)) = sample.fluorescence() else {
            continue;
        };
        combined.insert(&sample.name, fitc, pacific_blue);
        outcome.processed.push(sample.name.clone());

        let ridge = RidgeSample::new(&sample.name, fitc, pacific_blue);
        if ridge.is_plottable() {
            outcome.ridge_samples.push(ridge);
        } else {
            warn!(
                "Not enough data points to plot densities for {}",
                path.display()
            );
        }

        match export(&sample, path, config) {
            Ok(csv_path) => outcome.csv_files.push(csv_path),
            Err(e) => {
                error!("Error exporting {}: {e:#}", path.display());
                outcome.failed.push(FailedFile {
                    file: path.clone(),
                    reason: format!("{e:#}"),
                });
            }
        }
    }

    if !combined.is_empty() {
        let combined_path = config.output_dir.join(COMBINED_CSV);
        match combined.write(&combined_path) {
            Ok(()) => {
                info!(
                    "Saved combined fluorescence data to {}",
                    combined_path.display()
                );
                outcome.combined_csv = Some(combined_path);
            }
            Err(e) => error!("Failed to write {}: {e:#}", combined_path.display()),
        }
    }

    Ok(outcome)
}

/// Parse one file and add the derived columns.
fn prepare(path: &Path, normalizer: &Normalizer) -> Result<Sample> {
    let mut sample = loader::load_file(path)?;
    debug!(
        "Processing {} - metadata keys: {:?}",
        path.display(),
        sample.metadata.keys().collect::<Vec<_>>()
    );
    debug!("Data preview for {}:\n{}", path.display(), sample.table.preview(5));
    normalizer
        .apply(&mut sample)
        .with_context(|| format!("normalising {}", sample.name))?;
    Ok(sample)
}

/// Sidecar layout: header block first, then every keyword.
#[derive(Serialize)]
struct MetadataSidecar<'a> {
    #[serde(rename = "__header__", skip_serializing_if = "Option::is_none")]
    header: Option<&'a FcsHeader>,
    #[serde(flatten)]
    keywords: &'a Metadata,
}

/// Write `<name>.csv` (and optionally `<name>_meta.json`) into the output
/// directory mirroring the input file's subfolder.
fn export(sample: &Sample, source: &Path, config: &Config) -> Result<PathBuf> {
    let out_dir = mirrored_dir(&config.input_dir, source, &config.output_dir);
    ensure_output_dir(&out_dir)?;

    let csv_path = out_dir.join(format!("{}.csv", sample.name));
    loader::write_table_csv(&csv_path, &sample.table)?;
    info!(
        "Converted data from {} to {}",
        source.display(),
        csv_path.display()
    );

    if config.export_metadata {
        let json_path = out_dir.join(format!("{}_meta.json", sample.name));
        let sidecar = MetadataSidecar {
            header: sample.header.as_ref(),
            keywords: &sample.metadata,
        };
        let json = serde_json::to_string_pretty(&sidecar).context("serialising metadata")?;
        fs::write(&json_path, json)
            .with_context(|| format!("writing {}", json_path.display()))?;
        info!(
            "Exported metadata for {} to {}",
            source.display(),
            json_path.display()
        );
    }

    Ok(csv_path)
}
