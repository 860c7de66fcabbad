//! Flow Cytometry Standard (FCS 2.0 / 3.0 / 3.1) list-mode reader and a
//! minimal float32 writer.
//!
//! Layout of a file:
//! ```text
//!  HEADER  "FCS3.1    " + six 8-byte ASCII offsets (TEXT, DATA, ANALYSIS)
//!  TEXT    <d>KEY<d>VALUE<d>KEY<d>VALUE<d>...   (d = first byte; dd = literal d)
//!  DATA    $TOT events × $PAR parameters, row-major
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use super::loader::sample_name;
use super::model::{EventTable, FcsHeader, Metadata, MetadataValue, Sample};
use crate::error::FcsError;

const HEADER_LEN: usize = 58;
const DELIMITER: u8 = b'/';

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Parse an FCS file from disk.  The sample name is the file stem.
pub fn read_sample(path: &Path) -> Result<Sample> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let name = sample_name(path);
    let (header, text, table) =
        parse_bytes(&bytes).with_context(|| format!("parsing FCS file {}", path.display()))?;

    let metadata: Metadata = text
        .into_iter()
        .map(|(key, value)| {
            let typed = if key.eq_ignore_ascii_case("$DATE") {
                MetadataValue::Date(value)
            } else {
                MetadataValue::guess(&value)
            };
            (key, typed)
        })
        .collect();

    Ok(Sample {
        name,
        metadata,
        header: Some(header),
        table,
    })
}

/// Parse the raw bytes of an FCS file into header, TEXT keywords and events.
pub fn parse_bytes(bytes: &[u8]) -> Result<(FcsHeader, BTreeMap<String, String>, EventTable), FcsError> {
    let mut header = parse_header(bytes)?;
    let text_bytes = segment(bytes, header.text_start, header.text_end)?;
    let text = parse_text(text_bytes)?;
    let keywords = Keywords::new(&text);

    // Large files store DATA offsets in TEXT and zeros in the header.
    if header.data_start == 0 && header.data_end == 0 {
        header.data_start = keywords.parse_u64("$BEGINDATA")?;
        header.data_end = keywords.parse_u64("$ENDDATA")?;
    }

    if let Some(mode) = keywords.get("$MODE") {
        if !mode.trim().eq_ignore_ascii_case("L") {
            return Err(FcsError::UnsupportedMode(mode.to_string()));
        }
    }

    let n_par = keywords.parse_u64("$PAR")? as usize;
    let layout = DataLayout::from_keywords(&keywords, n_par)?;
    let data = if header.data_end < header.data_start {
        &[][..]
    } else {
        segment(bytes, header.data_start, header.data_end)?
    };
    let row_bytes = layout.row_bytes().ok_or_else(|| FcsError::InvalidKeyword {
        key: "$PAR".to_string(),
        value: n_par.to_string(),
    })?;
    // A table without parameters has no rows, whatever $TOT claims.
    let n_events = match keywords.get("$TOT") {
        _ if row_bytes == 0 => 0,
        Some(_) => keywords.parse_u64("$TOT")?,
        None => (data.len() / row_bytes) as u64,
    };
    let (n_events, expected) = usize::try_from(n_events)
        .ok()
        .and_then(|n| Some((n, n.checked_mul(row_bytes)?)))
        .ok_or_else(|| FcsError::InvalidKeyword {
            key: "$TOT".to_string(),
            value: n_events.to_string(),
        })?;
    if data.len() < expected {
        return Err(FcsError::ShortData {
            expected,
            actual: data.len(),
        });
    }

    let names = (1..=n_par)
        .map(|i| {
            keywords
                .get(&format!("$P{i}N"))
                .map(|n| n.trim().to_string())
                .ok_or_else(|| FcsError::MissingKeyword(format!("$P{i}N")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let columns = layout.decode(data, n_events);
    let table = EventTable::new(names, columns).map_err(|e| FcsError::InvalidKeyword {
        key: "$PAR".to_string(),
        value: e.to_string(),
    })?;

    Ok((header, text, table))
}

fn parse_header(bytes: &[u8]) -> Result<FcsHeader, FcsError> {
    if bytes.len() < HEADER_LEN {
        return Err(FcsError::TruncatedHeader(bytes.len()));
    }
    let version = String::from_utf8_lossy(&bytes[0..6]).to_string();
    if !version.starts_with("FCS") {
        return Err(FcsError::BadMagic(version));
    }

    let field = |idx: usize, name: &'static str| -> Result<u64, FcsError> {
        let start = 10 + idx * 8;
        let raw = String::from_utf8_lossy(&bytes[start..start + 8]).to_string();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(0);
        }
        trimmed.parse::<u64>().map_err(|_| FcsError::BadOffset {
            field: name,
            value: raw.clone(),
        })
    };

    Ok(FcsHeader {
        version,
        text_start: field(0, "TEXT start")?,
        text_end: field(1, "TEXT end")?,
        data_start: field(2, "DATA start")?,
        data_end: field(3, "DATA end")?,
        analysis_start: field(4, "ANALYSIS start")?,
        analysis_end: field(5, "ANALYSIS end")?,
    })
}

/// Inclusive byte range `start..=end`.
fn segment(bytes: &[u8], start: u64, end: u64) -> Result<&[u8], FcsError> {
    if end < start || end as usize >= bytes.len() {
        return Err(FcsError::SegmentOutOfBounds {
            start,
            end,
            len: bytes.len(),
        });
    }
    Ok(&bytes[start as usize..=end as usize])
}

/// Split a TEXT segment into keyword/value pairs.
fn parse_text(text: &[u8]) -> Result<BTreeMap<String, String>, FcsError> {
    let (&delim, rest) = text.split_first().ok_or(FcsError::EmptyText)?;

    let mut tokens: Vec<String> = Vec::new();
    let mut current: Vec<u8> = Vec::new();
    let mut i = 0;
    while i < rest.len() {
        let b = rest[i];
        if b == delim {
            if rest.get(i + 1) == Some(&delim) {
                current.push(delim);
                i += 2;
                continue;
            }
            tokens.push(String::from_utf8_lossy(&current).to_string());
            current.clear();
        } else {
            current.push(b);
        }
        i += 1;
    }
    // Some writers omit the trailing delimiter.
    if !current.is_empty() {
        tokens.push(String::from_utf8_lossy(&current).to_string());
    }

    Ok(tokens
        .chunks_exact(2)
        .map(|kv| (kv[0].trim().to_string(), kv[1].clone()))
        .collect())
}

/// Case-insensitive keyword lookup.
struct Keywords<'a> {
    upper: BTreeMap<String, &'a str>,
}

impl<'a> Keywords<'a> {
    fn new(text: &'a BTreeMap<String, String>) -> Self {
        Keywords {
            upper: text
                .iter()
                .map(|(k, v)| (k.to_ascii_uppercase(), v.as_str()))
                .collect(),
        }
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.upper.get(&key.to_ascii_uppercase()).copied()
    }

    fn require(&self, key: &str) -> Result<&'a str, FcsError> {
        self.get(key)
            .ok_or_else(|| FcsError::MissingKeyword(key.to_string()))
    }

    fn parse_u64(&self, key: &str) -> Result<u64, FcsError> {
        let raw = self.require(key)?;
        raw.trim().parse().map_err(|_| FcsError::InvalidKeyword {
            key: key.to_string(),
            value: raw.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DataType {
    Float32,
    Float64,
    /// Unsigned integers, one field per parameter.
    Integer(Vec<IntField>),
}

/// Stored width of one integer parameter, and the mask selecting its
/// significant bits when `$PnR` is a power of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IntField {
    bits: u32,
    mask: u64,
}

impl IntField {
    fn new(bits: u32, range: Option<u64>) -> Self {
        let full = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
        let mask = match range {
            Some(r) if r.is_power_of_two() => (r - 1) & full,
            _ => full,
        };
        IntField { bits, mask }
    }

    fn width(&self) -> usize {
        (self.bits / 8) as usize
    }
}

struct DataLayout {
    order: ByteOrder,
    kind: DataType,
    n_par: usize,
}

impl DataLayout {
    fn from_keywords(keywords: &Keywords<'_>, n_par: usize) -> Result<Self, FcsError> {
        let byteord = keywords.require("$BYTEORD")?;
        let order = match byteord.trim() {
            "1,2,3,4" | "1,2" | "1" | "1,2,3,4,5,6,7,8" => ByteOrder::Little,
            "4,3,2,1" | "2,1" | "8,7,6,5,4,3,2,1" => ByteOrder::Big,
            other => return Err(FcsError::UnsupportedByteOrder(other.to_string())),
        };

        let datatype = keywords.require("$DATATYPE")?;
        let kind = match datatype.trim().to_ascii_uppercase().as_str() {
            "F" => DataType::Float32,
            "D" => DataType::Float64,
            "I" => {
                let fields = (1..=n_par)
                    .map(|i| {
                        let key = format!("$P{i}B");
                        let bits = match keywords.parse_u64(&key)? {
                            b @ (8 | 16 | 32 | 64) => b as u32,
                            other => {
                                return Err(FcsError::UnsupportedBitWidth(
                                    u32::try_from(other).unwrap_or(u32::MAX),
                                ))
                            }
                        };
                        Ok(IntField::new(bits, parameter_range(keywords, i)))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                DataType::Integer(fields)
            }
            other => return Err(FcsError::UnsupportedDataType(other.to_string())),
        };

        Ok(DataLayout { order, kind, n_par })
    }

    /// Bytes per event, `None` on overflow.
    fn row_bytes(&self) -> Option<usize> {
        match &self.kind {
            DataType::Float32 => self.n_par.checked_mul(4),
            DataType::Float64 => self.n_par.checked_mul(8),
            DataType::Integer(fields) => Some(fields.iter().map(IntField::width).sum()),
        }
    }

    /// Decode `n_events` rows into column-major `f64` vectors.  The caller
    /// has checked that `data` holds at least `n_events` rows.
    fn decode(&self, data: &[u8], n_events: usize) -> Vec<Vec<f64>> {
        let mut columns = vec![Vec::with_capacity(n_events); self.n_par];
        let mut offset = 0;
        for _ in 0..n_events {
            for (p, column) in columns.iter_mut().enumerate() {
                let (width, mask) = match &self.kind {
                    DataType::Float32 => (4, u64::MAX),
                    DataType::Float64 => (8, u64::MAX),
                    DataType::Integer(fields) => (fields[p].width(), fields[p].mask),
                };
                let raw = &data[offset..offset + width];
                offset += width;
                column.push(self.decode_value(raw, mask));
            }
        }
        columns
    }

    fn decode_value(&self, raw: &[u8], mask: u64) -> f64 {
        let mut buf = [0u8; 8];
        let n = raw.len();
        match self.order {
            ByteOrder::Little => buf[..n].copy_from_slice(raw),
            ByteOrder::Big => {
                for (dst, src) in buf[..n].iter_mut().zip(raw.iter().rev()) {
                    *dst = *src;
                }
            }
        }
        match self.kind {
            DataType::Float32 => {
                f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64
            }
            DataType::Float64 => f64::from_le_bytes(buf),
            DataType::Integer(_) => (u64::from_le_bytes(buf) & mask) as f64,
        }
    }
}

/// `$PnR` as an integer.  Some writers store it as a float ("1024.0").
fn parameter_range(keywords: &Keywords<'_>, p: usize) -> Option<u64> {
    let raw = keywords.get(&format!("$P{p}R"))?.trim();
    raw.parse::<u64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|r| r.is_finite() && *r >= 1.0 && r.fract() == 0.0 && *r < 1.8e19)
            .map(|r| r as u64)
    })
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Write `table` as an FCS 3.1 list-mode file with little-endian float32
/// data.  `extra` keywords are added to TEXT; keywords that describe the
/// data layout are always generated here and win over `extra`.
pub fn write_fcs(path: &Path, table: &EventTable, extra: &Metadata) -> Result<()> {
    let n_events = table.n_rows();
    let n_par = table.n_columns();

    let mut keywords: Vec<(String, String)> = vec![
        ("$BYTEORD".into(), "1,2,3,4".into()),
        ("$DATATYPE".into(), "F".into()),
        ("$MODE".into(), "L".into()),
        ("$NEXTDATA".into(), "0".into()),
        ("$BEGINANALYSIS".into(), "0".into()),
        ("$ENDANALYSIS".into(), "0".into()),
        ("$BEGINSTEXT".into(), "0".into()),
        ("$ENDSTEXT".into(), "0".into()),
        ("$PAR".into(), n_par.to_string()),
        ("$TOT".into(), n_events.to_string()),
    ];
    for (i, name) in table.column_names().iter().enumerate() {
        let p = i + 1;
        keywords.push((format!("$P{p}N"), name.clone()));
        keywords.push((format!("$P{p}B"), "32".into()));
        keywords.push((format!("$P{p}E"), "0,0".into()));
        keywords.push((format!("$P{p}R"), "262144".into()));
    }
    for (key, value) in extra {
        let reserved = keywords.iter().any(|(k, _)| k.eq_ignore_ascii_case(key))
            || key.eq_ignore_ascii_case("$BEGINDATA")
            || key.eq_ignore_ascii_case("$ENDDATA");
        if !reserved {
            keywords.push((key.clone(), value.to_string()));
        }
    }

    let data_len = n_events * n_par * 4;
    // Offsets are written zero-padded to a fixed width so the TEXT length
    // does not depend on them.
    let text_without_offsets = encode_text(&keywords, None);
    let text_len = text_without_offsets.len() + offsets_len();
    let text_start = HEADER_LEN;
    let text_end = text_start + text_len - 1;
    let data_start = text_end + 1;
    let data_end = if data_len == 0 {
        data_start
    } else {
        data_start + data_len - 1
    };
    let text = encode_text(&keywords, Some((data_start, data_end)));
    debug_assert_eq!(text.len(), text_len);

    let header_offset = |v: usize| {
        if v > 99_999_999 {
            format!("{:>8}", 0)
        } else {
            format!("{v:>8}")
        }
    };
    let mut out: Vec<u8> = Vec::with_capacity(HEADER_LEN + text_len + data_len);
    out.extend_from_slice(b"FCS3.1    ");
    out.extend_from_slice(header_offset(text_start).as_bytes());
    out.extend_from_slice(header_offset(text_end).as_bytes());
    out.extend_from_slice(header_offset(data_start).as_bytes());
    out.extend_from_slice(header_offset(data_end).as_bytes());
    out.extend_from_slice(format!("{:>8}{:>8}", 0, 0).as_bytes());
    out.extend_from_slice(&text);

    let columns: Vec<&[f64]> = table.iter_columns().map(|(_, c)| c).collect();
    for row in 0..n_events {
        for col in &columns {
            out.extend_from_slice(&(col[row] as f32).to_le_bytes());
        }
    }

    let mut file =
        fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    file.write_all(&out)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

const OFFSET_WIDTH: usize = 20;

fn offsets_len() -> usize {
    // "$BEGINDATA/<20 digits>/$ENDDATA/<20 digits>/"
    "$BEGINDATA".len() + "$ENDDATA".len() + 2 * OFFSET_WIDTH + 4
}

fn encode_text(keywords: &[(String, String)], offsets: Option<(usize, usize)>) -> Vec<u8> {
    let escape = |s: &str| s.replace('/', "//");
    let mut text = String::new();
    text.push(DELIMITER as char);
    for (key, value) in keywords {
        // Empty values are not representable; a single space stands in.
        let value = if value.is_empty() { " " } else { value.as_str() };
        text.push_str(&escape(key));
        text.push('/');
        text.push_str(&escape(value));
        text.push('/');
    }
    if let Some((start, end)) = offsets {
        text.push_str(&format!(
            "$BEGINDATA/{start:0w$}/$ENDDATA/{end:0w$}/",
            w = OFFSET_WIDTH
        ));
    }
    text.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_table() -> EventTable {
        EventTable::new(
            vec!["FSC-A".into(), "FITC-A".into(), "Pacific Blue-A".into()],
            vec![
                vec![1000.0, 2000.0],
                vec![2.5, 3.5],
                vec![12.0, -4.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn text_segment_handles_escaped_delimiters() {
        let text = b"|$CYT|Canto||II|$PAR|3|";
        let parsed = parse_text(text).unwrap();
        assert_eq!(parsed["$CYT"], "Canto|II");
        assert_eq!(parsed["$PAR"], "3");
    }

    #[test]
    fn text_segment_without_trailing_delimiter() {
        let parsed = parse_text(b"/A/1/B/2").unwrap();
        assert_eq!(parsed["B"], "2");
    }

    #[test]
    fn written_file_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tube_01.fcs");
        let mut extra = Metadata::new();
        extra.insert("$CYT".into(), MetadataValue::String("Canto/II".into()));
        extra.insert("$DATE".into(), MetadataValue::Date("16-OCT-2026".into()));
        write_fcs(&path, &small_table(), &extra).unwrap();

        let sample = read_sample(&path).unwrap();
        assert_eq!(sample.name, "tube_01");
        assert_eq!(
            sample.table.column_names(),
            ["FSC-A", "FITC-A", "Pacific Blue-A"]
        );
        assert_eq!(sample.table.column("Pacific Blue-A").unwrap(), [12.0, -4.0]);
        assert_eq!(sample.metadata["$PAR"], MetadataValue::Integer(3));
        assert_eq!(
            sample.metadata["$CYT"],
            MetadataValue::String("Canto/II".into())
        );
        assert_eq!(
            sample.metadata["$DATE"],
            MetadataValue::Date("16-OCT-2026".into())
        );
        let header = sample.header.unwrap();
        assert_eq!(header.version, "FCS3.1");
        assert_eq!(header.text_start, 58);
        assert_eq!(header.data_end - header.data_start + 1, 2 * 3 * 4);
    }

    #[test]
    fn decodes_big_endian_integers() {
        let text = "/$BYTEORD/4,3,2,1/$DATATYPE/I/$PAR/2/$TOT/2/$P1N/FSC-A/$P1B/16/$P2N/SSC-A/$P2B/32/";
        let text_start = HEADER_LEN;
        let text_end = text_start + text.len() - 1;
        let data_start = text_end + 1;
        let data: Vec<u8> = [
            &1u16.to_be_bytes()[..],
            &70000u32.to_be_bytes()[..],
            &513u16.to_be_bytes()[..],
            &2u32.to_be_bytes()[..],
        ]
        .concat();
        let data_end = data_start + data.len() - 1;

        let mut bytes = format!(
            "FCS3.0    {text_start:>8}{text_end:>8}{data_start:>8}{data_end:>8}{:>8}{:>8}",
            0, 0
        )
        .into_bytes();
        bytes.extend_from_slice(text.as_bytes());
        bytes.extend_from_slice(&data);

        let (_, _, table) = parse_bytes(&bytes).unwrap();
        assert_eq!(table.column("FSC-A").unwrap(), [1.0, 513.0]);
        assert_eq!(table.column("SSC-A").unwrap(), [70000.0, 2.0]);
    }

    /// HEADER + TEXT + DATA with the header offsets filled in.
    fn fcs_bytes(text: &str, data: &[u8]) -> Vec<u8> {
        let text_start = HEADER_LEN;
        let text_end = text_start + text.len() - 1;
        let data_start = text_end + 1;
        let data_end = data_start + data.len() - 1;
        let mut bytes = format!(
            "FCS3.0    {text_start:>8}{text_end:>8}{data_start:>8}{data_end:>8}{:>8}{:>8}",
            0, 0
        )
        .into_bytes();
        bytes.extend_from_slice(text.as_bytes());
        bytes.extend_from_slice(data);
        bytes
    }

    #[test]
    fn oversized_event_count_is_a_parse_error() {
        for tot in ["4611686018427387904", "18446744073709551615"] {
            let text = format!("/$BYTEORD/1,2,3,4/$DATATYPE/F/$PAR/1/$TOT/{tot}/$P1N/FSC-A/");
            let err = parse_bytes(&fcs_bytes(&text, &[0u8; 4])).unwrap_err();
            assert!(
                matches!(&err, FcsError::InvalidKeyword { key, .. } if key == "$TOT"),
                "{err:?}"
            );
        }
    }

    #[test]
    fn event_count_beyond_data_is_short_data() {
        let text = "/$BYTEORD/1,2,3,4/$DATATYPE/F/$PAR/2/$TOT/1000000000/$P1N/A/$P2N/B/";
        assert!(matches!(
            parse_bytes(&fcs_bytes(text, &[0u8; 8])),
            Err(FcsError::ShortData {
                expected: 8_000_000_000,
                actual: 8
            })
        ));
    }

    #[test]
    fn integer_values_are_masked_to_their_range() {
        let text = "/$BYTEORD/1,2/$DATATYPE/I/$PAR/2/$TOT/1/\
$P1N/FSC-A/$P1B/16/$P1R/1024/$P2N/SSC-A/$P2B/16/$P2R/1000/";
        let data: Vec<u8> = [&0xFC05u16.to_le_bytes()[..], &0xFC05u16.to_le_bytes()[..]].concat();
        let (_, _, table) = parse_bytes(&fcs_bytes(text, &data)).unwrap();
        // 1024 keeps the low 10 bits; a range that is not a power of two
        // leaves the word as stored.
        assert_eq!(table.column("FSC-A").unwrap(), [5.0]);
        assert_eq!(table.column("SSC-A").unwrap(), [64517.0]);
    }

    #[test]
    fn rejects_non_fcs_and_short_data() {
        assert!(matches!(
            parse_bytes(&[b'x'; 80]),
            Err(FcsError::BadMagic(_))
        ));
        assert!(matches!(
            parse_bytes(b"FCS3.0"),
            Err(FcsError::TruncatedHeader(6))
        ));

        let text = "/$BYTEORD/1,2,3,4/$DATATYPE/F/$PAR/1/$TOT/10/$P1N/FSC-A/";
        let text_end = HEADER_LEN + text.len() - 1;
        let mut bytes = format!(
            "FCS3.0    {:>8}{text_end:>8}{:>8}{:>8}{:>8}{:>8}",
            HEADER_LEN,
            text_end + 1,
            text_end + 4,
            0,
            0
        )
        .into_bytes();
        bytes.extend_from_slice(text.as_bytes());
        bytes.extend_from_slice(&[0u8; 4]);
        assert!(matches!(
            parse_bytes(&bytes),
            Err(FcsError::ShortData {
                expected: 40,
                actual: 4
            })
        ));
    }
}
