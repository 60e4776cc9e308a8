//! Stage 1: tabular file bytes to a header row plus raw rows.

use crate::{Error, Result};
use calamine::{Data, Reader, Xls, Xlsx};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Read, Seek};

const XLSX_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    /// Office Open XML workbook
    Xlsx,
    /// Legacy binary workbook
    Xls,
}

/// Sniff the format from the leading bytes.
pub fn detect(bytes: &[u8]) -> Result<Format> {
    if bytes.starts_with(XLSX_MAGIC) {
        Ok(Format::Xlsx)
    } else if bytes.starts_with(OLE_MAGIC) {
        Ok(Format::Xls)
    } else if bytes.iter().take(1024).any(|b| *b == 0) {
        Err(Error::UnsupportedFormat("unrecognized binary file".into()))
    } else {
        Ok(Format::Csv)
    }
}

/// A raw cell value as it appeared in the file.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Text(String),
    /// Numbers. Spreadsheet date cells arrive as ISO text instead.
    Number(f64),
    Bool(bool),
}

impl RawCell {
    pub fn to_value(&self) -> Value {
        match self {
            RawCell::Text(s) => Value::String(s.clone()),
            RawCell::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => Value::from(*n as i64),
            RawCell::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            RawCell::Bool(b) => Value::Bool(*b),
        }
    }

    fn header_text(&self) -> String {
        crate::coerce::to_text(&self.to_value()).trim().to_string()
    }
}

/// One data row: header to cell. Blank cells are absent.
pub type RawRow = BTreeMap<String, RawCell>;

/// Parsed table: unique headers in column order plus data rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

type Grid = Vec<Vec<Option<RawCell>>>;

/// Parse CSV, XLSX or XLS bytes. Workbooks contribute their first sheet.
pub fn parse(bytes: &[u8]) -> Result<RawTable> {
    if bytes.is_empty() {
        return Err(Error::ImportParse("file is empty".into()));
    }
    let grid = match detect(bytes)? {
        Format::Csv => read_csv(bytes)?,
        Format::Xlsx => {
            let workbook = Xlsx::new(Cursor::new(bytes))
                .map_err(|e| Error::ImportParse(format!("invalid xlsx: {e}")))?;
            read_first_sheet(workbook)?
        }
        Format::Xls => {
            let workbook = Xls::new(Cursor::new(bytes))
                .map_err(|e| Error::ImportParse(format!("invalid xls: {e}")))?;
            read_first_sheet(workbook)?
        }
    };
    Ok(into_table(grid))
}

fn read_csv(bytes: &[u8]) -> Result<Grid> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(bytes);

    let mut grid = Grid::new();
    for result in reader.records() {
        let record = result.map_err(|e| Error::ImportParse(e.to_string()))?;
        grid.push(
            record
                .iter()
                .map(|field| (!field.is_empty()).then(|| RawCell::Text(field.to_string())))
                .collect(),
        );
    }
    Ok(grid)
}

fn read_first_sheet<RS, R>(mut workbook: R) -> Result<Grid>
where
    RS: Read + Seek,
    R: Reader<RS>,
{
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| Error::ImportParse("workbook has no sheets".into()))?;
    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| Error::ImportParse(format!("failed to read sheet '{first}': {e:?}")))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_from_data).collect())
        .collect())
}

fn cell_from_data(data: &Data) -> Option<RawCell> {
    match data {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) if s.trim().is_empty() => None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
            Some(RawCell::Text(s.clone()))
        }
        Data::Int(n) => Some(RawCell::Number(*n as f64)),
        Data::Float(f) => Some(RawCell::Number(*f)),
        Data::Bool(b) => Some(RawCell::Bool(*b)),
        // Decoded against the workbook's own epoch, not the configured one
        Data::DateTime(dt) if dt.is_datetime() => Some(match dt.as_datetime() {
            Some(moment) => RawCell::Text(moment.date().format("%Y-%m-%d").to_string()),
            None => RawCell::Number(dt.as_f64()),
        }),
        Data::DateTime(dt) => Some(RawCell::Number(dt.as_f64())),
    }
}

fn is_blank(row: &[Option<RawCell>]) -> bool {
    row.iter().all(Option::is_none)
}

/// First non-blank row is the header; blank rows are dropped.
fn into_table(grid: Grid) -> RawTable {
    let mut rows = grid.into_iter().filter(|row| !is_blank(row));
    let Some(header_row) = rows.next() else {
        return RawTable::default();
    };

    let mut seen = HashSet::new();
    let headers: Vec<String> = header_row
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let base = cell
                .as_ref()
                .map(RawCell::header_text)
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| format!("column_{}", i + 1));
            unique_header(base, &mut seen)
        })
        .collect();

    let rows = rows
        .map(|cells| {
            headers
                .iter()
                .zip(cells)
                .filter_map(|(header, cell)| cell.map(|c| (header.clone(), c)))
                .collect()
        })
        .collect();

    RawTable { headers, rows }
}

fn unique_header(base: String, seen: &mut HashSet<String>) -> String {
    if seen.insert(base.clone()) {
        return base;
    }
    let mut n = 1;
    loop {
        let candidate = format!("{base}_{n}");
        if seen.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_formats() {
        assert_eq!(detect(b"PK\x03\x04rest").unwrap(), Format::Xlsx);
        assert_eq!(detect(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1, 0]).unwrap(), Format::Xls);
        assert_eq!(detect(b"name,village\n").unwrap(), Format::Csv);
        assert!(matches!(
            detect(&[0x89, b'P', b'N', b'G', 0, 0]),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn csv_headers_and_rows() {
        let table = parse(b"name , village,# members in household\nAsha, Ramgarh ,5\n,,\nRavi,,3\n").unwrap();

        assert_eq!(table.headers, vec!["name", "village", "# members in household"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0]["village"], RawCell::Text("Ramgarh".into()));
        assert!(!table.rows[1].contains_key("village"));
        assert_eq!(table.rows[1]["# members in household"], RawCell::Text("3".into()));
    }

    #[test]
    fn csv_with_bom_and_quotes() {
        let table = parse(b"\xEF\xBB\xBFname,\"Livelihood description, NREGA work\"\nAsha,\"farming, MGNREGA\"\n").unwrap();
        assert_eq!(table.headers[0], "name");
        assert_eq!(table.headers[1], "Livelihood description, NREGA work");
        assert_eq!(
            table.rows[0]["Livelihood description, NREGA work"],
            RawCell::Text("farming, MGNREGA".into())
        );
    }

    #[test]
    fn duplicate_and_blank_headers() {
        let table = parse(b"notes,notes,,notes\na,b,c,d\n").unwrap();
        assert_eq!(table.headers, vec!["notes", "notes_1", "column_3", "notes_2"]);
        assert_eq!(table.rows[0]["column_3"], RawCell::Text("c".into()));
    }

    #[test]
    fn ragged_rows() {
        let table = parse(b"a,b,c\n1\n1,2,3,4\n").unwrap();
        assert_eq!(table.rows[0].len(), 1);
        assert_eq!(table.rows[1].len(), 3);
    }

    #[test]
    fn empty_inputs() {
        assert!(parse(b"").is_err());
        assert_eq!(parse(b"\n\n").unwrap(), RawTable::default());
    }

    #[test]
    fn cell_values() {
        assert_eq!(RawCell::Number(45123.0).to_value(), serde_json::json!(45123));
        assert_eq!(RawCell::Number(2.5).to_value(), serde_json::json!(2.5));
        assert_eq!(cell_from_data(&Data::String("  ".into())), None);
        assert_eq!(cell_from_data(&Data::Int(4)), Some(RawCell::Number(4.0)));
        assert_eq!(cell_from_data(&Data::Bool(true)), Some(RawCell::Bool(true)));
    }
}
