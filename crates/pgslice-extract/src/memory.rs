use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use async_trait::async_trait;

use pgslice_core::{Error, RawRow, Result, TableDescriptor, Value, decode_value};

use crate::source::{FetchRequest, RowSource};

/// Row source over rows held in memory.
///
/// Lookups compare decoded values, so a row matches when its column decodes
/// to the same value key as the request.
#[derive(Debug, Default)]
pub struct InMemorySource {
    rows: BTreeMap<String, Vec<RawRow>>,
    failing: BTreeSet<String>,
    delay: Option<Duration>,
    fetches: AtomicU64,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: impl Into<String>, row: RawRow) {
        self.rows.entry(table.into()).or_default().push(row);
    }

    pub fn with_row(mut self, table: impl Into<String>, row: RawRow) -> Self {
        self.insert(table, row);
        self
    }

    /// Make every lookup against `table` fail with a query error.
    pub fn fail_on(mut self, table: impl Into<String>) -> Self {
        self.failing.insert(table.into());
        self
    }

    /// Delay every lookup, for exercising timeouts and cancellation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl RowSource for InMemorySource {
    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<Vec<RawRow>> {
        self.fetches.fetch_add(1, AtomicOrdering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let table = request.table;
        if self.failing.contains(&table.name) {
            return Err(Error::Query(format!("relation \"{}\" is unavailable", table.name)));
        }

        let Some(wanted) = request.value.key() else {
            return Ok(Vec::new());
        };
        let rows = self.rows.get(&table.name).map(Vec::as_slice).unwrap_or(&[]);

        let mut matched = Vec::new();
        for row in rows {
            if column_value(table, row, request.column)?.key().as_deref() == Some(wanted.as_str()) {
                matched.push(row);
            }
        }

        if let Some(tie_break) = request.tie_break {
            let mut keyed = Vec::with_capacity(matched.len());
            for row in matched {
                keyed.push((column_value(table, row, tie_break)?, row));
            }
            keyed.sort_by(|(left, _), (right, _)| compare_values(right, left));
            matched = keyed.into_iter().map(|(_, row)| row).collect();
        }

        Ok(matched
            .into_iter()
            .take(request.limit)
            .cloned()
            .collect())
    }
}

fn column_value(table: &TableDescriptor, row: &RawRow, column: &str) -> Result<Value> {
    let descriptor = table.column(column)?;
    let raw = row.get(column).ok_or_else(|| Error::ColumnNotFound {
        table: table.name.clone(),
        column: column.to_string(),
    })?;
    Ok(decode_value(descriptor, raw).value)
}

fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Integer(left), Value::Integer(right)) => left.cmp(right),
        (Value::Timestamp(left), Value::Timestamp(right)) => left.cmp(right),
        (Value::TimestampTz(left), Value::TimestampTz(right)) => left.cmp(right),
        _ => left.key().cmp(&right.key()),
    }
}
