use std::path::PathBuf;

use thiserror::Error;

/// Problems with the run configuration.  Always fatal, and always raised
/// before the first input file is opened.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{channel} background reference cannot be zero (fluorescence ratio is undefined)")]
    ZeroReference { channel: &'static str },

    #[error("{channel} background reference must be finite, got {value}")]
    NonFiniteReference { channel: &'static str, value: f64 },

    #[error("invalid density grid: {0}")]
    InvalidGrid(String),

    #[error("histogram needs at least 2 bins per axis, got {0}")]
    InvalidBins(usize),

    #[error("invalid scatter axis range [{min}, {max}]: must satisfy 0 < min < max")]
    InvalidAxisRange { min: f64, max: f64 },

    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse JSON config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// FCS parse failures.
#[derive(Debug, Error)]
pub enum FcsError {
    #[error("file too short for an FCS header ({0} bytes)")]
    TruncatedHeader(usize),

    #[error("not an FCS file (magic {0:?})")]
    BadMagic(String),

    #[error("invalid {field} offset in header: {value:?}")]
    BadOffset { field: &'static str, value: String },

    #[error("segment {start}..={end} lies outside the file ({len} bytes)")]
    SegmentOutOfBounds { start: u64, end: u64, len: usize },

    #[error("TEXT segment is empty")]
    EmptyText,

    #[error("missing required keyword {0}")]
    MissingKeyword(String),

    #[error("keyword {key} has invalid value {value:?}")]
    InvalidKeyword { key: String, value: String },

    #[error("unsupported $DATATYPE {0:?}")]
    UnsupportedDataType(String),

    #[error("unsupported $MODE {0:?} (only list mode is supported)")]
    UnsupportedMode(String),

    #[error("unsupported $BYTEORD {0:?}")]
    UnsupportedByteOrder(String),

    #[error("unsupported integer width of {0} bits")]
    UnsupportedBitWidth(u32),

    #[error("DATA segment holds {actual} bytes, {expected} needed")]
    ShortData { expected: usize, actual: usize },
}
