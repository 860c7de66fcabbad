use std::fs;
use std::path::Path;

use facs_density::config::Config;
use facs_density::data::fcs::write_fcs;
use facs_density::data::loader;
use facs_density::data::model::{channel, EventTable, Metadata};
use facs_density::density::{ridge_bandwidth, DensityMethod};
use facs_density::error::ConfigError;
use facs_density::pipeline;

/// Deterministic uniform values in [0, 1).
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

fn write_sample(path: &Path, fsc: Vec<f64>, fitc: Vec<f64>, pacific_blue: Vec<f64>) {
    let table = EventTable::new(
        vec![
            channel::FSC.to_string(),
            channel::FITC.to_string(),
            channel::PACIFIC_BLUE.to_string(),
        ],
        vec![fsc, fitc, pacific_blue],
    )
    .unwrap();
    write_fcs(path, &table, &Metadata::new()).unwrap();
}

/// 500 rows whose FITC/FSC ratio is exactly constant.
fn write_constant_ratio_sample(path: &Path) {
    let fsc: Vec<f64> = (0..500).map(|i| 1024.0 + 16.0 * (i % 50) as f64).collect();
    let fitc: Vec<f64> = fsc.iter().map(|v| v * 0.5).collect();
    let pacific_blue: Vec<f64> = (0..500).map(|i| 300.0 + ((i * 7) % 113) as f64).collect();
    write_sample(path, fsc, fitc, pacific_blue);
}

fn write_random_sample(path: &Path, rows: usize, seed: u64) {
    let mut rng = Lcg(seed);
    let mut fsc = Vec::with_capacity(rows);
    let mut fitc = Vec::with_capacity(rows);
    let mut pacific_blue = Vec::with_capacity(rows);
    for _ in 0..rows {
        fsc.push(40_000.0 + 30_000.0 * rng.next());
        fitc.push(100.0 + 400.0 * rng.next());
        pacific_blue.push(500.0 + 1_000.0 * rng.next());
    }
    write_sample(path, fsc, fitc, pacific_blue);
}

fn config_for(input: &Path, output: &Path) -> Config {
    Config {
        input_dir: input.to_path_buf(),
        output_dir: output.to_path_buf(),
        ..Config::default()
    }
}

#[test]
fn two_sample_batch_produces_every_output() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_constant_ratio_sample(&input.path().join("A.fcs"));
    write_random_sample(&input.path().join("B.fcs"), 10_000, 7);

    let config = config_for(input.path(), output.path());
    let summary = pipeline::run_all(&config).unwrap();

    assert_eq!(summary.processed, ["A", "B"]);
    assert!(summary.failed.is_empty());
    assert!(output.path().join("A.csv").exists());
    assert!(output.path().join("B.csv").exists());
    assert!(output.path().join("A_meta.json").exists());

    // Combined table: two columns per sample, padded to the longest sample.
    let mut reader = csv::Reader::from_path(output.path().join("fluorescence.csv")).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(headers, ["A_FITC", "A_PacificBlue", "B_FITC", "B_PacificBlue"]);
    let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
    assert_eq!(rows.len(), 10_000);
    assert!(rows[499].get(0).is_some_and(|c| !c.is_empty()));
    assert_eq!(rows[500].get(0), Some(""));

    // The constant-ratio channel takes the unit-spread bandwidth.
    let a = loader::load_file(&output.path().join("A.csv")).unwrap();
    let (a_fitc, _) = a.fluorescence().unwrap();
    assert_eq!(ridge_bandwidth(a_fitc, config.ridge.bandwidth_constant), 10.0);

    assert_eq!(summary.ridge.rows, ["A", "B"]);
    assert!(summary.ridge.skipped.is_empty());
    let figure = summary.ridge.figure.unwrap();
    assert_eq!(figure, output.path().join("combined_density.png"));
    let (w, h) = image::image_dimensions(&figure).unwrap();
    assert_eq!(w, config.ridge.width_px);
    assert_eq!(h, 2 * config.ridge.row_height_px + config.ridge.axis_strip_px);

    // A's FITC pairing is collinear (FITC = FSC / 2); it still gets the
    // exact estimator like every other pairing under the threshold.
    assert!(summary.scatter.skipped.is_empty());
    assert!(summary.scatter.failed.is_empty());
    let written: Vec<_> = summary
        .scatter
        .figures
        .iter()
        .map(|f| (f.path.file_name().unwrap().to_str().unwrap(), f.method))
        .collect();
    assert_eq!(
        written,
        [
            ("A_fitc.png", DensityMethod::ExactKde),
            ("A_pb.png", DensityMethod::ExactKde),
            ("B_fitc.png", DensityMethod::ExactKde),
            ("B_pb.png", DensityMethod::ExactKde),
        ]
    );
    for figure in &summary.scatter.figures {
        let (w, h) = image::image_dimensions(&figure.path).unwrap();
        assert_eq!((w, h), (config.scatter.size_px, config.scatter.size_px));
    }
}

#[test]
fn single_event_sample_is_skipped_by_the_ridge_only() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_sample(
        &input.path().join("lonely.fcs"),
        vec![50_000.0],
        vec![200.0],
        vec![700.0],
    );

    let summary = pipeline::run_ingest(&config_for(input.path(), output.path())).unwrap();
    assert_eq!(summary.processed, ["lonely"]);
    assert!(summary.failed.is_empty());

    let ridge = pipeline::run_ridge(&config_for(input.path(), output.path())).unwrap();
    assert_eq!(ridge.skipped, ["lonely"]);
    assert!(ridge.rows.is_empty());
    assert!(ridge.figure.is_none());
    assert!(!output.path().join("combined_density.png").exists());
}

#[test]
fn unreadable_file_contributes_no_columns() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    fs::create_dir(input.path().join("plate")).unwrap();
    write_random_sample(&input.path().join("plate").join("good.fcs"), 50, 3);
    fs::write(input.path().join("broken.fcs"), b"not an fcs file").unwrap();

    let mut config = config_for(input.path(), output.path());
    config.export_metadata = false;
    let summary = pipeline::run_ingest(&config).unwrap();

    assert_eq!(summary.processed, ["good"]);
    assert_eq!(summary.failed.len(), 1);
    assert!(summary.failed[0].file.ends_with("broken.fcs"));
    // Subfolders are mirrored under the output root.
    assert!(output.path().join("plate").join("good.csv").exists());
    assert!(!output.path().join("plate").join("good_meta.json").exists());

    let mut reader = csv::Reader::from_path(output.path().join("fluorescence.csv")).unwrap();
    assert_eq!(reader.headers().unwrap().len(), 2);
}

#[test]
fn zero_reference_aborts_before_any_file_is_written() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_random_sample(&input.path().join("A.fcs"), 20, 1);
    let out_dir = output.path().join("out");

    let mut config = config_for(input.path(), &out_dir);
    config.references.fitc = 0.0;
    let err = pipeline::run_all(&config).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::ZeroReference { channel: "FITC" })
    ));
    assert!(!out_dir.exists());
}

#[test]
fn scatter_skips_csv_without_positive_rows() {
    let output = tempfile::tempdir().unwrap();
    fs::write(
        output.path().join("dim.csv"),
        "FSC-A,FITC-A,Pacific Blue-A\n0,5,5\n10,-1,5\n",
    )
    .unwrap();

    let config = config_for(output.path(), output.path());
    let summary = pipeline::run_scatter(&config).unwrap();
    assert!(summary.figures.is_empty());
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.skipped[0].reason, "no positive data points");
}
