use std::time::Duration;

use serde::{Deserialize, Serialize};

use pgslice_core::{
    ExtractionIssue, FkEdge, OrderOptions, RawValue, Result, SchemaGraph, Value, decode_value,
};

/// What to do when a lookup matches more than one row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Multiplicity {
    /// Keep the row with the greatest tie-break value and record a warning.
    #[default]
    Latest,
    /// Fail the extraction.
    Reject,
}

/// Options for the extraction engine.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub multiplicity: Multiplicity,
    /// Upper bound for a single fetch. Exceeding it cancels the extraction.
    pub fetch_timeout: Option<Duration>,
    pub order: OrderOptions,
}

/// Starting point of a traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct Seed {
    pub table: String,
    pub column: String,
    pub value: Value,
}

impl Seed {
    pub fn new(table: impl Into<String>, column: impl Into<String>, value: Value) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            value,
        }
    }

    /// Build a seed from command-line text, typed by the column's kind.
    ///
    /// Text that does not parse as the column's kind is kept verbatim and
    /// cast by the database.
    pub fn parse(graph: &SchemaGraph, table: &str, column: &str, text: &str) -> Result<Self> {
        let descriptor = graph.table(table)?.column(column)?;
        let decoded = decode_value(descriptor, &RawValue::Text(text.to_string()));
        let value = if decoded.fallback {
            Value::Other(text.to_string())
        } else {
            decoded.value
        };
        Ok(Self::new(table, column, value))
    }
}

/// Rows extracted from one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    pub table: String,
    pub rows: u64,
}

/// Report for an extraction run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub seed_table: String,
    pub seed_column: String,
    pub seed_value: String,
    /// Tables in emission order.
    pub tables: Vec<TableReport>,
    pub rows_total: u64,
    pub fetches: u64,
    /// Searches for referencing rows that matched nothing.
    pub empty_dependent_lookups: u64,
    pub issues: Vec<ExtractionIssue>,
    pub external: Vec<FkEdge>,
    pub deferred: Vec<FkEdge>,
}

impl ExtractionReport {
    pub fn new(seed: &Seed) -> Self {
        Self {
            seed_table: seed.table.clone(),
            seed_column: seed.column.clone(),
            seed_value: seed.value.to_string(),
            ..Self::default()
        }
    }

    pub fn issue_count(&self, kind: pgslice_core::IssueKind) -> usize {
        self.issues.iter().filter(|issue| issue.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use pgslice_core::{ColumnDescriptor, TableDescriptor};

    use super::*;

    fn graph() -> SchemaGraph {
        let mut graph = SchemaGraph::new();
        graph
            .add_table(TableDescriptor::new(
                "public",
                "invoice",
                vec![
                    ColumnDescriptor::new(1, "id", "bigint"),
                    ColumnDescriptor::new(2, "total", "numeric(10,2)"),
                ],
            ))
            .unwrap();
        graph
    }

    #[test]
    fn seed_text_is_typed_by_column_kind() {
        let seed = Seed::parse(&graph(), "invoice", "id", "42").unwrap();
        assert_eq!(seed.value, Value::Integer(42));

        let seed = Seed::parse(&graph(), "invoice", "total", "9.99").unwrap();
        assert_eq!(seed.value, Value::Other("9.99".to_string()));
    }

    #[test]
    fn seed_column_must_exist() {
        assert!(Seed::parse(&graph(), "invoice", "nope", "1").is_err());
        assert!(Seed::parse(&graph(), "nope", "id", "1").is_err());
    }
}
