use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Closed classification of declared column types used by the row decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Text,
    Uuid,
    Timestamp,
    TimestampTz,
    Integer,
    Json,
    Jsonb,
    Other(String),
}

impl ColumnKind {
    /// Classify a Postgres type name as reported by the catalog.
    ///
    /// Both the `information_schema` spelling (`character varying`) and the
    /// internal one (`varchar`, `int4`) are accepted. Length modifiers such
    /// as `(255)` are ignored.
    pub fn from_data_type(data_type: &str) -> Self {
        let normalized = data_type.trim().to_lowercase();
        let base = match normalized.find('(') {
            Some(idx) => {
                let mut base = normalized[..idx].trim_end().to_string();
                if let Some(close) = normalized[idx..].find(')') {
                    base.push_str(&normalized[idx + close + 1..]);
                }
                base
            }
            None => normalized,
        };

        match base.as_str() {
            "text" | "character varying" | "varchar" | "character" | "char" | "bpchar"
            | "name" | "citext" => ColumnKind::Text,
            "uuid" => ColumnKind::Uuid,
            "timestamp" | "timestamp without time zone" => ColumnKind::Timestamp,
            "timestamptz" | "timestamp with time zone" => ColumnKind::TimestampTz,
            "smallint" | "integer" | "bigint" | "int" | "int2" | "int4" | "int8" => {
                ColumnKind::Integer
            }
            "json" => ColumnKind::Json,
            "jsonb" => ColumnKind::Jsonb,
            _ => ColumnKind::Other(base),
        }
    }
}

/// Target of a foreign key column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
    /// The column is one pair of a multi-column constraint.
    #[serde(default)]
    pub composite: bool,
}

/// Column metadata for a table in the schema graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub ordinal_position: i16,
    pub name: String,
    /// Declared type as reported by the catalog (e.g. `character varying`).
    pub data_type: String,
    pub kind: ColumnKind,
    pub is_nullable: bool,
    pub default: Option<String>,
    pub references: Option<ForeignKeyRef>,
}

impl ColumnDescriptor {
    pub fn new(ordinal_position: i16, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        Self {
            ordinal_position,
            name: name.into(),
            kind: ColumnKind::from_data_type(&data_type),
            data_type,
            is_nullable: true,
            default: None,
            references: None,
        }
    }

    /// Mark the column as a foreign key to `table.column`.
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ForeignKeyRef {
            table: table.into(),
            column: column.into(),
            composite: false,
        });
        self
    }

    /// Flag the column's foreign key as part of a multi-column constraint.
    pub fn composite(mut self) -> Self {
        if let Some(target) = self.references.as_mut() {
            target.composite = true;
        }
        self
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    pub fn is_foreign_key(&self) -> bool {
        self.references.is_some()
    }
}

/// A table and its columns, ordered by ordinal position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    /// Column identifying a row; also the tie-break column for lookups.
    pub primary_key: Option<String>,
}

impl TableDescriptor {
    pub fn new(
        schema: impl Into<String>,
        name: impl Into<String>,
        mut columns: Vec<ColumnDescriptor>,
    ) -> Self {
        columns.sort_by_key(|col| col.ordinal_position);
        Self {
            schema: schema.into(),
            name: name.into(),
            columns,
            primary_key: None,
        }
    }

    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    pub fn column(&self, name: &str) -> Result<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|col| col.name == name)
            .ok_or_else(|| Error::ColumnNotFound {
                table: self.name.clone(),
                column: name.to_string(),
            })
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|col| col.name == name)
    }

    /// Foreign key columns in ordinal order.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|col| col.is_foreign_key())
    }

    /// Columns of this table that point at `table`.
    pub fn columns_referencing(&self, table: &str) -> impl Iterator<Item = &ColumnDescriptor> {
        self.foreign_keys().filter(move |col| {
            col.references
                .as_ref()
                .is_some_and(|target| target.table == table)
        })
    }

    /// Column used to order candidate rows when a lookup matches several.
    ///
    /// Falls back to the first column when the table has no identifying column.
    pub fn tie_break_column(&self) -> Option<&str> {
        self.primary_key
            .as_deref()
            .filter(|pk| self.has_column(pk))
            .or_else(|| self.columns.first().map(|col| col.name.as_str()))
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}
