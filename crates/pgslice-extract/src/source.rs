use async_trait::async_trait;

use pgslice_core::{RawRow, Result, TableDescriptor, Value};

/// One filtered lookup: rows of `table` where `column = value`.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub table: &'a TableDescriptor,
    pub column: &'a str,
    pub value: &'a Value,
    /// Candidates are ordered by this column, descending.
    pub tie_break: Option<&'a str>,
    pub limit: usize,
}

/// Query capability the traversal runs against.
///
/// Returned rows carry every column of the table, matched by name.
/// Failures are reported as [`pgslice_core::Error::Query`].
#[async_trait]
pub trait RowSource: Send + Sync {
    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<Vec<RawRow>>;
}
