use std::collections::BTreeMap;
use std::fmt;

use anyhow::{bail, Context, Result};
use serde::{Serialize, Serializer};

/// Column names produced by the instrument and by normalisation.
pub mod channel {
    pub const FSC: &str = "FSC-A";
    pub const FITC: &str = "FITC-A";
    pub const PACIFIC_BLUE: &str = "Pacific Blue-A";
    pub const FITC_FLUORESCENCE: &str = "FITC_fluorescence";
    pub const PACIFIC_BLUE_FLUORESCENCE: &str = "Pacific_Blue_fluorescence";
}

// ---------------------------------------------------------------------------
// MetadataValue – a single keyword value from an instrument file
// ---------------------------------------------------------------------------

/// A dynamically-typed keyword value.  FCS keywords are all text on disk;
/// values are typed on load so the JSON sidecar carries numbers as numbers.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// Acquisition date (`$DATE`), kept as text.
    Date(String),
    Null,
}

impl MetadataValue {
    /// Type a raw text cell: integer, then float, then bool, else string.
    pub fn guess(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            return MetadataValue::Null;
        }
        if let Ok(i) = s.parse::<i64>() {
            return MetadataValue::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return MetadataValue::Float(f);
        }
        if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") {
            return MetadataValue::Bool(s.eq_ignore_ascii_case("true"));
        }
        MetadataValue::String(s.to_string())
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{s}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Date(d) => write!(f, "{d}"),
            MetadataValue::Null => write!(f, "<null>"),
        }
    }
}

impl Serialize for MetadataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetadataValue::String(s) | MetadataValue::Date(s) => serializer.serialize_str(s),
            MetadataValue::Integer(i) => serializer.serialize_i64(*i),
            MetadataValue::Float(v) => serializer.serialize_f64(*v),
            MetadataValue::Bool(b) => serializer.serialize_bool(*b),
            MetadataValue::Null => serializer.serialize_unit(),
        }
    }
}

/// Keyword → value, ordered by keyword.
pub type Metadata = BTreeMap<String, MetadataValue>;

// ---------------------------------------------------------------------------
// EventTable – column-major numeric table
// ---------------------------------------------------------------------------

/// Ordered rows with named `f64` columns.  Missing cells are `NaN`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTable {
    columns: Vec<String>,
    data: Vec<Vec<f64>>,
}

impl EventTable {
    /// Build a table; every column must have the same length.
    pub fn new(columns: Vec<String>, data: Vec<Vec<f64>>) -> Result<Self> {
        if columns.len() != data.len() {
            bail!(
                "{} column names but {} data columns",
                columns.len(),
                data.len()
            );
        }
        if let Some(first) = data.first() {
            for (name, col) in columns.iter().zip(&data) {
                if col.len() != first.len() {
                    bail!(
                        "column '{name}' has {} rows, expected {}",
                        col.len(),
                        first.len()
                    );
                }
            }
        }
        Ok(EventTable { columns, data })
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.data[i].as_slice())
    }

    /// Like [`column`](Self::column) but fails with the column name.
    pub fn require(&self, name: &str) -> Result<&[f64]> {
        self.column(name)
            .with_context(|| format!("missing column '{name}'"))
    }

    /// Columns in declaration order, paired with their names.
    pub fn iter_columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.data.iter().map(Vec::as_slice))
    }

    /// Append a column, or replace it in place if the name already exists.
    pub fn set_column(&mut self, name: &str, values: Vec<f64>) -> Result<()> {
        if !self.columns.is_empty() && values.len() != self.n_rows() {
            bail!(
                "column '{name}' has {} rows, table has {}",
                values.len(),
                self.n_rows()
            );
        }
        match self.columns.iter().position(|c| c == name) {
            Some(i) => self.data[i] = values,
            None => {
                self.columns.push(name.to_string());
                self.data.push(values);
            }
        }
        Ok(())
    }

    /// New table holding only the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> EventTable {
        let data = self
            .data
            .iter()
            .map(|col| rows.iter().map(|&r| col[r]).collect())
            .collect();
        EventTable {
            columns: self.columns.clone(),
            data,
        }
    }

    /// First `n` rows as a tab-separated block, for debug logging.
    pub fn preview(&self, n: usize) -> String {
        let mut out = self.columns.join("\t");
        for row in 0..self.n_rows().min(n) {
            out.push('\n');
            let cells: Vec<String> = self.data.iter().map(|c| c[row].to_string()).collect();
            out.push_str(&cells.join("\t"));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Sample – one instrument file
// ---------------------------------------------------------------------------

/// Segment layout reported by the FCS HEADER.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FcsHeader {
    #[serde(rename = "FCS format")]
    pub version: String,
    pub text_start: u64,
    pub text_end: u64,
    pub data_start: u64,
    pub data_end: u64,
    pub analysis_start: u64,
    pub analysis_end: u64,
}

/// One parsed instrument file.
#[derive(Debug, Clone)]
pub struct Sample {
    /// File name without extension.
    pub name: String,
    pub metadata: Metadata,
    /// Present only for samples parsed from FCS.
    pub header: Option<FcsHeader>,
    pub table: EventTable,
}

impl Sample {
    /// The two derived fluorescence columns, once normalisation has run.
    pub fn fluorescence(&self) -> Option<(&[f64], &[f64])> {
        Some((
            self.table.column(channel::FITC_FLUORESCENCE)?,
            self.table.column(channel::PACIFIC_BLUE_FLUORESCENCE)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> EventTable {
        EventTable::new(
            vec!["a".into(), "b".into()],
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
        )
        .unwrap()
    }

    #[test]
    fn guess_types_cells() {
        assert_eq!(MetadataValue::guess("12"), MetadataValue::Integer(12));
        assert_eq!(MetadataValue::guess("1.5"), MetadataValue::Float(1.5));
        assert_eq!(MetadataValue::guess("TRUE"), MetadataValue::Bool(true));
        assert_eq!(MetadataValue::guess("  "), MetadataValue::Null);
        assert_eq!(
            MetadataValue::guess("1,2,3,4"),
            MetadataValue::String("1,2,3,4".into())
        );
    }

    #[test]
    fn metadata_serializes_untagged() {
        let mut meta = Metadata::new();
        meta.insert("$PAR".into(), MetadataValue::Integer(3));
        meta.insert("$CYT".into(), MetadataValue::String("FACSCanto".into()));
        meta.insert("EMPTY".into(), MetadataValue::Null);
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(json, r#"{"$CYT":"FACSCanto","$PAR":3,"EMPTY":null}"#);
    }

    #[test]
    fn rejects_ragged_columns() {
        let err = EventTable::new(vec!["a".into(), "b".into()], vec![vec![1.0], vec![]]);
        assert!(err.is_err());
    }

    #[test]
    fn set_column_appends_then_replaces() {
        let mut t = table();
        t.set_column("c", vec![7.0, 8.0, 9.0]).unwrap();
        assert_eq!(t.column_names(), ["a", "b", "c"]);
        t.set_column("a", vec![0.0, 0.0, 0.0]).unwrap();
        assert_eq!(t.n_columns(), 3);
        assert_eq!(t.column("a").unwrap(), [0.0, 0.0, 0.0]);
        assert!(t.set_column("d", vec![1.0]).is_err());
    }

    #[test]
    fn select_rows_keeps_order() {
        let t = table().select_rows(&[2, 0]);
        assert_eq!(t.column("b").unwrap(), [6.0, 4.0]);
        assert_eq!(t.n_rows(), 2);
    }
}
