use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pgslice_core::{
    Error, ExtractedRow, ExtractionIssue, ExtractionSession, FkEdge, InsertStatement,
    InsertionOrder, IssueKind, RawRow, Result, SchemaGraph, ScriptOptions, TableDescriptor, Value, build_statements,
    decode_row, insertion_order, render_script,
};

use crate::model::{ExtractOptions, ExtractionReport, Multiplicity, Seed, TableReport};
use crate::source::{FetchRequest, RowSource};

/// Fetch one more row than needed so multiplicity is visible.
const FETCH_LIMIT: usize = 2;

/// Result of an extraction.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub order: InsertionOrder,
    pub statements: Vec<InsertStatement>,
    pub report: ExtractionReport,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Render the statements as a script.
    ///
    /// Constraints are deferred whenever edges were left out of ordering.
    pub fn to_sql(&self, transaction: bool) -> String {
        render_script(
            &self.statements,
            ScriptOptions {
                transaction,
                defer_constraints: !self.order.deferred.is_empty(),
            },
        )
    }
}

/// How a lookup was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    Seed,
    /// Following a foreign key to the row it references.
    Reference,
    /// Searching for rows that reference an extracted row.
    Dependent,
}

#[derive(Debug, Clone)]
struct Visit {
    table: String,
    column: String,
    value: Value,
    lookup: Lookup,
    edge: Option<FkEdge>,
}

/// Entry point for extracting the rows connected to a seed.
pub struct Extractor<'a, S: ?Sized> {
    graph: &'a SchemaGraph,
    source: &'a S,
    options: ExtractOptions,
}

impl<'a, S: RowSource + ?Sized> Extractor<'a, S> {
    pub fn new(graph: &'a SchemaGraph, source: &'a S, options: ExtractOptions) -> Self {
        Self {
            graph,
            source,
            options,
        }
    }

    /// Walk the graph from `seed` and render the connected rows.
    ///
    /// Every call owns a fresh session. The traversal is depth-first and
    /// sequential: one fetch is in flight at a time. Query failures and
    /// cancellation abort the whole extraction.
    pub async fn extract(&self, seed: &Seed, cancel: &CancellationToken) -> Result<Extraction> {
        let start = Instant::now();
        self.graph.table(&seed.table)?.column(&seed.column)?;

        info!(
            event = "extract_started",
            table = %seed.table,
            column = %seed.column,
            value = %seed.value
        );

        let mut session = ExtractionSession::new();
        let mut stack = vec![Visit {
            table: seed.table.clone(),
            column: seed.column.clone(),
            value: seed.value.clone(),
            lookup: Lookup::Seed,
            edge: None,
        }];

        while let Some(visit) = stack.pop() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled("cancellation requested".to_string()));
            }
            let Some(key) = visit.value.key() else {
                continue;
            };
            if !session.mark_visited(&visit.table, &visit.column, &key) {
                continue;
            }

            let table = self.graph.table(&visit.table)?;
            let Some(row) = self.fetch_row(table, &visit, &mut session, cancel).await? else {
                continue;
            };

            let children = self.expand(table, &row)?;
            if !session.record_row(row) {
                continue;
            }
            for edge in children.iter().filter_map(|child| child.edge.as_ref()) {
                if edge.composite && session.record_partial_key(edge) {
                    warn!(event = "partial_key", edge = %edge);
                }
            }
            stack.extend(children.into_iter().rev());
        }

        let order = insertion_order(self.graph, &session.populated_tables(), &self.options.order)?;
        for edge in &order.external {
            warn!(event = "external_dependency", edge = %edge);
            session.record_issue(ExtractionIssue {
                kind: IssueKind::ExternalDependency,
                table: edge.from_table.clone(),
                column: Some(edge.from_column.clone()),
                message: format!("{edge}: target table holds no extracted rows"),
            });
        }
        for edge in &order.deferred {
            info!(event = "dependency_deferred", edge = %edge);
            session.record_issue(ExtractionIssue {
                kind: IssueKind::DeferredDependency,
                table: edge.from_table.clone(),
                column: Some(edge.from_column.clone()),
                message: format!("{edge}: left out of ordering"),
            });
        }

        let statements = build_statements(self.graph, &order, &session)?;

        let mut report = ExtractionReport::new(seed);
        report.tables = order
            .tables
            .iter()
            .map(|table| TableReport {
                table: table.clone(),
                rows: session.rows(table).len() as u64,
            })
            .collect();
        report.rows_total = session.row_count() as u64;
        report.fetches = session.fetches();
        report.empty_dependent_lookups = session.empty_dependent_lookups();
        report.issues = session.issues().to_vec();
        report.external = order.external.clone();
        report.deferred = order.deferred.clone();

        info!(
            event = "extract_finished",
            tables = report.tables.len(),
            rows = report.rows_total,
            fetches = report.fetches,
            issues = report.issues.len(),
            duration_ms = start.elapsed().as_millis() as u64
        );

        Ok(Extraction {
            order,
            statements,
            report,
        })
    }

    /// Fetch and decode the row for one visit. `None` when nothing matched.
    async fn fetch_row(
        &self,
        table: &TableDescriptor,
        visit: &Visit,
        session: &mut ExtractionSession,
        cancel: &CancellationToken,
    ) -> Result<Option<ExtractedRow>> {
        let request = FetchRequest {
            table,
            column: &visit.column,
            value: &visit.value,
            tie_break: table.tie_break_column(),
            limit: FETCH_LIMIT,
        };
        let rows = self.fetch(&request, cancel).await?;
        session.record_fetch();
        debug!(
            event = "row_fetched",
            table = %visit.table,
            column = %visit.column,
            value = %visit.value,
            matched = rows.len()
        );

        let Some(raw) = rows.first() else {
            if visit.lookup == Lookup::Dependent {
                session.record_empty_dependent_lookup();
                debug!(
                    event = "no_dependents",
                    table = %visit.table,
                    column = %visit.column,
                    value = %visit.value
                );
                return Ok(None);
            }
            warn!(
                event = "row_absent",
                table = %visit.table,
                column = %visit.column,
                value = %visit.value
            );
            session.record_issue(ExtractionIssue {
                kind: IssueKind::RowAbsent,
                table: visit.table.clone(),
                column: Some(visit.column.clone()),
                message: format!("no row where {} = {}", visit.column, visit.value),
            });
            return Ok(None);
        };

        if rows.len() > 1 {
            match self.options.multiplicity {
                Multiplicity::Reject => {
                    return Err(Error::AmbiguousMatch {
                        table: visit.table.clone(),
                        column: visit.column.clone(),
                        value: visit.value.to_string(),
                    });
                }
                Multiplicity::Latest => {
                    warn!(
                        event = "ambiguous_match",
                        table = %visit.table,
                        column = %visit.column,
                        value = %visit.value
                    );
                    session.record_issue(ExtractionIssue {
                        kind: IssueKind::AmbiguousMatch,
                        table: visit.table.clone(),
                        column: Some(visit.column.clone()),
                        message: format!(
                            "several rows where {} = {}; kept the latest",
                            visit.column, visit.value
                        ),
                    });
                }
            }
        }

        let (row, fallbacks) = decode_row(table, raw)?;
        for column in fallbacks {
            let data_type = &table.column(&column)?.data_type;
            if session.record_unsupported(&table.name, &column, data_type) {
                warn!(
                    event = "unsupported_type",
                    table = %table.name,
                    column = %column,
                    data_type = %data_type
                );
            }
        }
        Ok(Some(row))
    }

    /// Run one fetch, racing cancellation and the per-fetch timeout.
    async fn fetch(
        &self,
        request: &FetchRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<RawRow>> {
        let fetch = async {
            match self.options.fetch_timeout {
                Some(limit) => tokio::time::timeout(limit, self.source.fetch(request))
                    .await
                    .map_err(|_| {
                        Error::Cancelled(format!(
                            "fetch from {} timed out after {}ms",
                            request.table.name,
                            limit.as_millis()
                        ))
                    })?,
                None => self.source.fetch(request).await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled("cancellation requested".to_string())),
            result = fetch => result,
        }
    }

    /// Lookups reachable from `row`: dependents first, in table-name order,
    /// then referenced rows in column order. Null values are never followed.
    fn expand(&self, table: &TableDescriptor, row: &ExtractedRow) -> Result<Vec<Visit>> {
        let mut visits = Vec::new();

        for edge in self.graph.incoming(&table.name)? {
            if let Some(value) = row.value(&edge.to_column).filter(|value| !value.is_null()) {
                visits.push(Visit {
                    table: edge.from_table.clone(),
                    column: edge.from_column.clone(),
                    value: value.clone(),
                    lookup: Lookup::Dependent,
                    edge: Some(edge),
                });
            }
        }

        for edge in self.graph.outgoing(&table.name)? {
            if let Some(value) = row.value(&edge.from_column).filter(|value| !value.is_null()) {
                visits.push(Visit {
                    table: edge.to_table.clone(),
                    column: edge.to_column.clone(),
                    value: value.clone(),
                    lookup: Lookup::Reference,
                    edge: Some(edge),
                });
            }
        }

        Ok(visits)
    }
}
