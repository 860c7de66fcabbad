use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use super::fcs;
use super::model::{EventTable, Metadata, Sample};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a sample from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.fcs` – flow cytometry list-mode data (keywords become metadata)
/// * `.csv` – header row of column names, one event per row
pub fn load_file(path: &Path) -> Result<Sample> {
    match extension_of(path).as_str() {
        "fcs" => fcs::read_sample(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// File name without extension, used as the sample name.
pub fn sample_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("sample")
        .to_string()
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Recursively collect files under `root` whose extension matches one of
/// `extensions` (case-insensitive).  Paths come back sorted.
pub fn discover_files(root: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    walk(root, extensions, &mut found)
        .with_context(|| format!("scanning {}", root.display()))?;
    found.sort();
    Ok(found)
}

fn walk(dir: &Path, extensions: &[&str], found: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, extensions, found)?;
        } else if extensions.contains(&extension_of(&path).as_str()) {
            found.push(path);
        }
    }
    Ok(())
}

/// Directory under `output_root` mirroring `file`'s location under
/// `input_root`.  Files outside `input_root` map to `output_root` itself.
pub fn mirrored_dir(input_root: &Path, file: &Path, output_root: &Path) -> PathBuf {
    let parent = file.parent().unwrap_or(input_root);
    match parent.strip_prefix(input_root) {
        Ok(relative) => output_root.join(relative),
        Err(_) => output_root.to_path_buf(),
    }
}

/// Create `dir` and its parents.  Calling it on an existing directory is a
/// no-op.
pub fn ensure_output_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating directory {}", dir.display()))
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Read a numeric CSV table.  Empty or non-numeric cells become `NaN`.
fn load_csv(path: &Path) -> Result<Sample> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        for (col, column) in columns.iter_mut().enumerate() {
            let cell = record.get(col).unwrap_or("").trim();
            column.push(cell.parse::<f64>().unwrap_or(f64::NAN));
        }
    }

    let table = EventTable::new(headers, columns)
        .with_context(|| format!("building table from {}", path.display()))?;
    Ok(Sample {
        name: sample_name(path),
        metadata: Metadata::new(),
        header: None,
        table,
    })
}

/// Write a table with a header row.  Non-finite cells are written empty.
pub fn write_table_csv(path: &Path, table: &EventTable) -> Result<()> {
    let (headers, columns): (Vec<&str>, Vec<&[f64]>) = table.iter_columns().unzip();
    write_columns_csv(path, &headers, &columns)
}

/// Write columns side by side, aligned by row position.  Shorter columns
/// are padded with empty cells.
pub fn write_columns_csv(path: &Path, headers: &[&str], columns: &[&[f64]]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(headers).context("writing CSV header")?;

    let n_rows = columns.iter().map(|c| c.len()).max().unwrap_or(0);
    let mut record: Vec<String> = Vec::with_capacity(columns.len());
    for row in 0..n_rows {
        record.clear();
        record.extend(columns.iter().map(|col| match col.get(row) {
            Some(v) if v.is_finite() => v.to_string(),
            _ => String::new(),
        }));
        writer
            .write_record(&record)
            .with_context(|| format!("writing CSV row {row}"))?;
    }
    writer
        .flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}
