use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

/// Millisecond precision, no zone designator.
pub const TIMESTAMP_LITERAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

/// Decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Uuid(Uuid),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Integer(i64),
    Json(serde_json::Value),
    /// Value of a type outside the closed set, already stringified.
    Other(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// SQL literal for direct embedding in an INSERT statement.
    pub fn to_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Text(value) | Value::Other(value) => quote_literal(value),
            Value::Uuid(value) => quote_literal(&value.hyphenated().to_string()),
            Value::Timestamp(value) => {
                quote_literal(&value.format(TIMESTAMP_LITERAL_FORMAT).to_string())
            }
            Value::TimestampTz(value) => quote_literal(
                &value
                    .naive_utc()
                    .format(TIMESTAMP_LITERAL_FORMAT)
                    .to_string(),
            ),
            Value::Integer(value) => value.to_string(),
            Value::Json(value) => quote_literal(&value.to_string()),
        }
    }

    /// Textual form used to filter lookups and to key visited rows.
    ///
    /// Unlike [`Value::to_literal`] this keeps full timestamp precision, so
    /// binding it back as a parameter matches the stored value exactly.
    /// Returns `None` for null.
    pub fn key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(value) | Value::Other(value) => Some(value.clone()),
            Value::Uuid(value) => Some(value.hyphenated().to_string()),
            Value::Timestamp(value) => Some(value.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Value::TimestampTz(value) => Some(value.to_rfc3339()),
            Value::Integer(value) => Some(value.to_string()),
            Value::Json(value) => Some(value.to_string()),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.key() {
            Some(key) => f.write_str(&key),
            None => f.write_str("NULL"),
        }
    }
}

/// Single-quote a string literal, doubling embedded quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
