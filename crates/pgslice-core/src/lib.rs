//! Core model for pgslice.
//!
//! This crate holds the schema graph, row decoding, the per-extraction
//! session, insertion ordering and INSERT rendering. It performs no I/O;
//! database access lives in the introspect and extract crates.

pub mod config;
pub mod crud;
pub mod decode;
pub mod emit;
pub mod error;
pub mod graph;
pub mod order;
pub mod schema;
pub mod session;
pub mod value;

pub use config::{GeneratorConfig, SchemaConfig, TableConfig};
pub use crud::{render_queries, render_schema_queries, starter_config, to_camel};
pub use decode::{DecodedValue, RawField, RawRow, RawValue, decode_row, decode_uuid, decode_value};
pub use emit::{InsertStatement, ScriptOptions, build_statements, render_script};
pub use error::{Error, Result};
pub use graph::{FkEdge, SchemaGraph};
pub use order::{InsertionOrder, OrderOptions, insertion_order};
pub use schema::{ColumnDescriptor, ColumnKind, ForeignKeyRef, TableDescriptor};
pub use session::{ExtractedColumn, ExtractedRow, ExtractionIssue, ExtractionSession, IssueKind};
pub use value::{Value, quote_ident, quote_literal};
