use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::graph::FkEdge;
use crate::value::Value;

/// One decoded column of an extracted row.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedColumn {
    pub name: String,
    pub value: Value,
    pub literal: String,
}

/// One materialized row, columns in declared ordinal order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRow {
    pub table: String,
    /// Identifying value used to deduplicate rows within a session.
    pub identifier: String,
    pub columns: Vec<ExtractedColumn>,
}

impl ExtractedRow {
    pub fn value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|col| col.name == column)
            .map(|col| &col.value)
    }

    pub fn literals(&self) -> Vec<&str> {
        self.columns.iter().map(|col| col.literal.as_str()).collect()
    }
}

/// Non-fatal traversal outcomes worth reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A lookup matched no row.
    RowAbsent,
    /// A column value was rendered through the generic fallback.
    UnsupportedType,
    /// A lookup matched several rows and the latest one was kept.
    AmbiguousMatch,
    /// A populated table depends on a table that holds no extracted rows.
    ExternalDependency,
    /// A dependency was left out of ordering at the caller's request.
    DeferredDependency,
    /// A lookup followed one column of a multi-column foreign key.
    PartialKey,
}

impl IssueKind {
    pub fn code(self) -> &'static str {
        match self {
            IssueKind::RowAbsent => "row_absent",
            IssueKind::UnsupportedType => "unsupported_type",
            IssueKind::AmbiguousMatch => "ambiguous_match",
            IssueKind::ExternalDependency => "external_dependency",
            IssueKind::DeferredDependency => "deferred_dependency",
            IssueKind::PartialKey => "partial_key",
        }
    }
}

/// Structured record of a non-fatal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionIssue {
    pub kind: IssueKind,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct VisitKey {
    table: String,
    column: String,
    value: String,
}

/// Mutable state of a single extraction.
///
/// Owned by one traversal; never shared between concurrent extractions.
#[derive(Debug, Default)]
pub struct ExtractionSession {
    rows: BTreeMap<String, Vec<ExtractedRow>>,
    visited: BTreeSet<VisitKey>,
    recorded: BTreeSet<(String, String)>,
    unsupported: BTreeSet<(String, String)>,
    partial_keys: BTreeSet<(String, String)>,
    issues: Vec<ExtractionIssue>,
    fetches: u64,
    empty_dependent_lookups: u64,
}

impl ExtractionSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a lookup as issued. Returns `false` if it was already visited.
    ///
    /// Keys are table-qualified so equal identifiers in different tables do
    /// not suppress each other.
    pub fn mark_visited(&mut self, table: &str, column: &str, value: &str) -> bool {
        self.visited.insert(VisitKey {
            table: table.to_string(),
            column: column.to_string(),
            value: value.to_string(),
        })
    }

    pub fn is_visited(&self, table: &str, column: &str, value: &str) -> bool {
        self.visited.contains(&VisitKey {
            table: table.to_string(),
            column: column.to_string(),
            value: value.to_string(),
        })
    }

    /// Append a row unless one with the same (table, identifier) exists.
    pub fn record_row(&mut self, row: ExtractedRow) -> bool {
        if !self
            .recorded
            .insert((row.table.clone(), row.identifier.clone()))
        {
            return false;
        }
        self.rows.entry(row.table.clone()).or_default().push(row);
        true
    }

    pub fn record_fetch(&mut self) {
        self.fetches += 1;
    }

    /// Count a search for referencing rows that found none. Leaf rows
    /// always end this way, so it is not an issue.
    pub fn record_empty_dependent_lookup(&mut self) {
        self.empty_dependent_lookups += 1;
    }

    pub fn record_issue(&mut self, issue: ExtractionIssue) {
        self.issues.push(issue);
    }

    /// Record a fallback decode once per (table, column).
    pub fn record_unsupported(&mut self, table: &str, column: &str, data_type: &str) -> bool {
        if !self
            .unsupported
            .insert((table.to_string(), column.to_string()))
        {
            return false;
        }
        self.issues.push(ExtractionIssue {
            kind: IssueKind::UnsupportedType,
            table: table.to_string(),
            column: Some(column.to_string()),
            message: format!("type '{data_type}' rendered with the generic literal"),
        });
        true
    }

    /// Record a traversal along a composite foreign key once per edge.
    ///
    /// Lookups filter on the edge's column alone, so the matched row may
    /// disagree with the constraint's other columns.
    pub fn record_partial_key(&mut self, edge: &FkEdge) -> bool {
        if !self
            .partial_keys
            .insert((edge.from_table.clone(), edge.from_column.clone()))
        {
            return false;
        }
        self.issues.push(ExtractionIssue {
            kind: IssueKind::PartialKey,
            table: edge.from_table.clone(),
            column: Some(edge.from_column.clone()),
            message: format!("{edge}: followed one column of a composite foreign key"),
        });
        true
    }

    pub fn rows(&self, table: &str) -> &[ExtractedRow] {
        self.rows.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn populated_tables(&self) -> BTreeSet<String> {
        self.rows
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(table, _)| table.clone())
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.values().map(Vec::len).sum()
    }

    pub fn fetches(&self) -> u64 {
        self.fetches
    }

    pub fn empty_dependent_lookups(&self) -> u64 {
        self.empty_dependent_lookups
    }

    pub fn issues(&self) -> &[ExtractionIssue] {
        &self.issues
    }
}
