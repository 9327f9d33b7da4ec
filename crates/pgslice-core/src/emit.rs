use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graph::SchemaGraph;
use crate::order::InsertionOrder;
use crate::session::ExtractionSession;
use crate::value::quote_ident;

/// One multi-row INSERT, structured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertStatement {
    pub schema: String,
    pub table: String,
    /// Column names in declared ordinal order.
    pub columns: Vec<String>,
    /// Literal values, one inner vector per row, aligned with `columns`.
    pub rows: Vec<Vec<String>>,
}

impl InsertStatement {
    pub fn to_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|col| quote_ident(col))
            .collect::<Vec<_>>()
            .join(",");
        let values = self
            .rows
            .iter()
            .map(|row| format!("({})", row.join(", ")))
            .collect::<Vec<_>>()
            .join(",\n");

        format!(
            "INSERT\nINTO {}.{}({})\nVALUES\n{}\n;",
            quote_ident(&self.schema),
            quote_ident(&self.table),
            columns,
            values
        )
    }
}

/// Build one statement per ordered table from the rows in `session`.
///
/// Tables without rows are skipped.
pub fn build_statements(
    graph: &SchemaGraph,
    order: &InsertionOrder,
    session: &ExtractionSession,
) -> Result<Vec<InsertStatement>> {
    let mut statements = Vec::with_capacity(order.tables.len());

    for name in &order.tables {
        let rows = session.rows(name);
        if rows.is_empty() {
            continue;
        }
        let table = graph.table(name)?;
        statements.push(InsertStatement {
            schema: table.schema.clone(),
            table: table.name.clone(),
            columns: table.columns.iter().map(|col| col.name.clone()).collect(),
            rows: rows
                .iter()
                .map(|row| row.literals().into_iter().map(str::to_string).collect())
                .collect(),
        });
    }

    Ok(statements)
}

/// Options for rendering a statement sequence as a script.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptOptions {
    /// Wrap the statements in BEGIN/COMMIT.
    pub transaction: bool,
    /// Add `SET CONSTRAINTS ALL DEFERRED` after BEGIN.
    pub defer_constraints: bool,
}

/// Concatenate statements, each followed by a newline.
pub fn render_script(statements: &[InsertStatement], options: ScriptOptions) -> String {
    let mut out = String::new();
    let wrap = options.transaction || options.defer_constraints;

    if wrap {
        out.push_str("BEGIN;\n");
        if options.defer_constraints {
            out.push_str("SET CONSTRAINTS ALL DEFERRED;\n");
        }
    }
    for statement in statements {
        out.push_str(&statement.to_sql());
        out.push('\n');
    }
    if wrap {
        out.push_str("COMMIT;\n");
    }
    out
}
