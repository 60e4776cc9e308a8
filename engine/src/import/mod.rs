//! Bulk import normalizer.
//!
//! 1. [`parse`] file bytes into headers and raw rows
//! 2. [`mapping`] headers to fields
//! 3. coerce cells through the schema's coercion table
//! 4. materialize one provisional record per row, zero-filled
//!
//! Stages 1–4 are free of side effects, so a preview can run them on a
//! prefix of the file. Enqueueing into Pending is done by
//! [`Replica::import_bulk`](crate::Replica::import_bulk).

pub mod mapping;
pub mod parse;

pub use mapping::{ColumnMapping, Target};
pub use parse::{RawCell, RawRow, RawTable};

use crate::coerce::{coerce, DateSystem};
use crate::identity::new_provisional_id;
use crate::schema::Schema;
use crate::{Error, Fields, Record, Result};

/// A parsed file together with its editable column mapping.
#[derive(Debug, Clone)]
pub struct ImportSession {
    table: RawTable,
    mapping: ColumnMapping,
    schema: Schema,
    dates: DateSystem,
}

impl ImportSession {
    /// Parse `bytes` and guess a mapping for every column.
    pub fn parse(bytes: &[u8], schema: Schema, dates: DateSystem) -> Result<Self> {
        let table = parse::parse(bytes)?;
        if table.headers.is_empty() {
            return Err(Error::ImportParse("no header row found".into()));
        }
        tracing::debug!(
            columns = table.headers.len(),
            rows = table.rows.len(),
            "parsed import file"
        );
        Ok(Self::from_table(table, schema, dates))
    }

    pub fn from_table(table: RawTable, schema: Schema, dates: DateSystem) -> Self {
        let mapping = ColumnMapping::guess(&table.headers, &schema);
        Self {
            table,
            mapping,
            schema,
            dates,
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.table.headers
    }

    pub fn row_count(&self) -> usize {
        self.table.rows.len()
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    /// Redirect one column before materializing.
    pub fn set_target(&mut self, header: &str, target: Target) -> Result<()> {
        self.mapping.set(header, target, &self.schema)
    }

    /// Materialize the first `limit` rows without enqueueing them.
    pub fn preview(&self, limit: usize) -> Vec<Record> {
        self.table
            .rows
            .iter()
            .take(limit)
            .map(|row| self.materialize_row(row))
            .collect()
    }

    /// Materialize every row.
    pub fn records(&self) -> Vec<Record> {
        self.table
            .rows
            .iter()
            .map(|row| self.materialize_row(row))
            .collect()
    }

    fn materialize_row(&self, row: &RawRow) -> Record {
        let mut fields = Fields::new();
        for (header, field) in self.mapping.mapped() {
            let (Some(cell), Some(def)) = (row.get(header), self.schema.field(field)) else {
                continue;
            };
            if let Some(value) = coerce(def.field_type, &cell.to_value(), self.dates) {
                fields.insert(field.to_string(), value);
            }
        }
        self.schema.zero_fill(&mut fields);
        Record::new(new_provisional_id(), fields)
    }
}

/// CSV header row users fill in to produce a cleanly mapped import.
pub fn template_csv(schema: &Schema) -> Result<String> {
    let headers = mapping::EXACT_HEADERS
        .iter()
        .filter(|(_, field)| schema.contains(field))
        .map(|(header, _)| *header);

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(headers)
        .map_err(|e| Error::ImportParse(e.to_string()))?;
    let bytes = writer
        .into_inner()
        .map_err(|e| Error::ImportParse(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| Error::ImportParse(e.to_string()))
}
