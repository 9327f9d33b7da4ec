use thiserror::Error;

/// Core error type shared across pgslice crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Two tables were registered under one name.
    #[error("duplicate table: {0}")]
    DuplicateTable(String),
    /// A table referenced by name is not part of the schema graph.
    #[error("unknown table: {0}")]
    UnknownTable(String),
    /// A column referenced by name is not part of its table.
    #[error("column not found: {table}.{column}")]
    ColumnNotFound { table: String, column: String },
    /// The underlying query execution failed.
    #[error("query failed: {0}")]
    Query(String),
    /// The populated tables cannot be put in dependency order.
    #[error("foreign key cycle between tables: {}", .0.join(", "))]
    CycleDetected(Vec<String>),
    /// The traversal was aborted by cancellation or timeout.
    #[error("extraction cancelled: {0}")]
    Cancelled(String),
    /// A lookup matched more than one row and ambiguity is rejected.
    #[error("ambiguous match: {table}.{column} = {value} matched more than one row")]
    AmbiguousMatch {
        table: String,
        column: String,
        value: String,
    },
    /// The schema violates internal invariants.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    /// Configuration could not be read or is incomplete.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Convenience alias for results returned by pgslice crates.
pub type Result<T> = std::result::Result<T, Error>;
