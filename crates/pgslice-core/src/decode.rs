//! Row decoding: raw driver values to typed values and SQL literals.
//!
//! Decoding is driver-agnostic. Database sources convert their native rows
//! into [`RawRow`]s and the decoder dispatches on each column's declared kind.
//! Null is resolved before any type-specific branch runs.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::schema::{ColumnDescriptor, ColumnKind, TableDescriptor};
use crate::session::{ExtractedColumn, ExtractedRow};
use crate::value::{TIMESTAMP_LITERAL_FORMAT, Value, quote_literal};

/// Value as handed over by a database driver.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Text(String),
    Bytes(Vec<u8>),
    Uuid([u8; 16]),
    Int(i64),
    Float(f64),
    Bool(bool),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Json(serde_json::Value),
}

/// One positional value of a fetched row with its column metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct RawField {
    pub name: String,
    pub ordinal: i16,
    pub value: RawValue,
}

/// A row returned by a row source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub fields: Vec<RawField>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field; its ordinal is its position in the row, starting at 1.
    pub fn with(mut self, name: impl Into<String>, value: RawValue) -> Self {
        let ordinal = self.fields.len() as i16 + 1;
        self.fields.push(RawField {
            name: name.into(),
            ordinal,
            value,
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.value)
    }
}

/// Result of decoding one column value.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedValue {
    pub value: Value,
    pub literal: String,
    /// The generic fallback path produced this value.
    pub fallback: bool,
}

impl DecodedValue {
    fn typed(value: Value) -> Self {
        let literal = value.to_literal();
        Self {
            value,
            literal,
            fallback: false,
        }
    }

    fn generic(raw: &RawValue) -> Self {
        let text = generic_string(raw);
        Self {
            literal: quote_literal(&text),
            value: Value::Other(text),
            fallback: true,
        }
    }
}

/// Decode a raw value according to the column's declared kind.
pub fn decode_value(column: &ColumnDescriptor, raw: &RawValue) -> DecodedValue {
    if matches!(raw, RawValue::Null) {
        return DecodedValue::typed(Value::Null);
    }

    let typed = match (&column.kind, raw) {
        (ColumnKind::Text | ColumnKind::Json, RawValue::Text(text)) => {
            Some(Value::Text(text.clone()))
        }
        (ColumnKind::Text | ColumnKind::Json, RawValue::Bytes(bytes)) => {
            String::from_utf8(bytes.clone()).ok().map(Value::Text)
        }
        (ColumnKind::Json | ColumnKind::Jsonb, RawValue::Json(json)) => {
            Some(Value::Json(json.clone()))
        }
        (ColumnKind::Jsonb, RawValue::Text(text)) => {
            serde_json::from_str(text).ok().map(Value::Json)
        }
        (ColumnKind::Uuid, RawValue::Uuid(bytes)) => Some(Value::Uuid(Uuid::from_bytes(*bytes))),
        (ColumnKind::Uuid, RawValue::Bytes(bytes)) => decode_uuid(bytes).map(Value::Uuid),
        (ColumnKind::Uuid, RawValue::Text(text)) => Uuid::parse_str(text).ok().map(Value::Uuid),
        (ColumnKind::Timestamp, RawValue::Timestamp(ts)) => Some(Value::Timestamp(*ts)),
        (ColumnKind::Timestamp, RawValue::TimestampTz(ts)) => Some(Value::Timestamp(ts.naive_utc())),
        (ColumnKind::Timestamp, RawValue::Text(text)) => {
            parse_naive_timestamp(text).map(Value::Timestamp)
        }
        (ColumnKind::TimestampTz, RawValue::TimestampTz(ts)) => Some(Value::TimestampTz(*ts)),
        (ColumnKind::TimestampTz, RawValue::Timestamp(ts)) => {
            Some(Value::TimestampTz(Utc.from_utc_datetime(ts)))
        }
        (ColumnKind::TimestampTz, RawValue::Text(text)) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|ts| Value::TimestampTz(ts.with_timezone(&Utc))),
        (ColumnKind::Integer, RawValue::Int(value)) => Some(Value::Integer(*value)),
        (ColumnKind::Integer, RawValue::Text(text)) => text.trim().parse().ok().map(Value::Integer),
        _ => None,
    };

    match typed {
        Some(value) => DecodedValue::typed(value),
        None => DecodedValue::generic(raw),
    }
}

/// Decode a UUID from its 16-byte binary form.
///
/// Fixed arrays and variable-length byte sequences decode identically; any
/// other length is rejected.
pub fn decode_uuid(bytes: &[u8]) -> Option<Uuid> {
    Uuid::from_slice(bytes).ok()
}

/// Decode every column of `table` from a fetched row.
///
/// Columns are matched by name and emitted in the table's ordinal order. The
/// second element lists columns that went through the generic fallback.
pub fn decode_row(table: &TableDescriptor, raw: &RawRow) -> Result<(ExtractedRow, Vec<String>)> {
    let mut columns = Vec::with_capacity(table.columns.len());
    let mut fallbacks = Vec::new();

    for column in &table.columns {
        let raw_value = raw.get(&column.name).ok_or_else(|| Error::ColumnNotFound {
            table: table.name.clone(),
            column: column.name.clone(),
        })?;
        let decoded = decode_value(column, raw_value);
        if decoded.fallback {
            fallbacks.push(column.name.clone());
        }
        columns.push(ExtractedColumn {
            name: column.name.clone(),
            value: decoded.value,
            literal: decoded.literal,
        });
    }

    let identifier = row_identifier(table, &columns);
    Ok((
        ExtractedRow {
            table: table.name.clone(),
            identifier,
            columns,
        },
        fallbacks,
    ))
}

/// Identifying value of a row: its primary key, or the whole row when the
/// table has none (or the key is null).
fn row_identifier(table: &TableDescriptor, columns: &[ExtractedColumn]) -> String {
    table
        .primary_key
        .as_deref()
        .and_then(|pk| columns.iter().find(|col| col.name == pk))
        .and_then(|col| col.value.key())
        .unwrap_or_else(|| {
            columns
                .iter()
                .map(|col| col.literal.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        })
}

fn parse_naive_timestamp(text: &str) -> Option<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
}

fn generic_string(raw: &RawValue) -> String {
    match raw {
        RawValue::Null => String::new(),
        RawValue::Text(value) => value.clone(),
        RawValue::Bytes(bytes) => {
            let hex: String = bytes.iter().map(|byte| format!("{byte:02x}")).collect();
            format!("\\x{hex}")
        }
        RawValue::Uuid(bytes) => Uuid::from_bytes(*bytes).hyphenated().to_string(),
        RawValue::Int(value) => value.to_string(),
        RawValue::Float(value) => value.to_string(),
        RawValue::Bool(value) => value.to_string(),
        RawValue::Timestamp(value) => value.format(TIMESTAMP_LITERAL_FORMAT).to_string(),
        RawValue::TimestampTz(value) => value.to_rfc3339(),
        RawValue::Json(value) => value.to_string(),
    }
}
