use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::types::{JsonValue, Uuid};
use sqlx::{PgPool, Row, ValueRef};

use pgslice_core::{
    ColumnDescriptor, ColumnKind, Error, RawRow, RawValue, Result, TableDescriptor, quote_ident,
};

use crate::source::{FetchRequest, RowSource};

/// Row source backed by a Postgres pool.
///
/// Filter values are always bound as parameters and cast to the filtered
/// column's declared type on the server.
#[derive(Debug, Clone)]
pub struct PgRowSource {
    pool: PgPool,
}

impl PgRowSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RowSource for PgRowSource {
    async fn fetch(&self, request: &FetchRequest<'_>) -> Result<Vec<RawRow>> {
        let sql = select_sql(request)?;
        let rows = sqlx::query(&sql)
            .bind(request.value.key())
            .fetch_all(&self.pool)
            .await
            .map_err(|err| Error::Query(err.to_string()))?;

        rows.iter()
            .map(|row| read_row(request.table, row))
            .collect()
    }
}

/// Build the lookup statement for `request`. The filter value is `$1`.
pub fn select_sql(request: &FetchRequest<'_>) -> Result<String> {
    let table = request.table;
    let filter = table.column(request.column)?;

    let projection = table
        .columns
        .iter()
        .map(select_expression)
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!(
        "SELECT {projection} FROM {}.{} WHERE {} = CAST($1 AS {})",
        quote_ident(&table.schema),
        quote_ident(&table.name),
        quote_ident(&filter.name),
        filter.data_type
    );
    if let Some(tie_break) = request.tie_break {
        table.column(tie_break)?;
        sql.push_str(&format!(" ORDER BY {} DESC", quote_ident(tie_break)));
    }
    sql.push_str(&format!(" LIMIT {}", request.limit));
    Ok(sql)
}

/// Columns the decoder reads natively are selected as-is; everything else
/// is read as text.
fn select_expression(column: &ColumnDescriptor) -> String {
    let ident = quote_ident(&column.name);
    match column.kind {
        ColumnKind::Uuid | ColumnKind::Timestamp | ColumnKind::TimestampTz | ColumnKind::Jsonb => {
            ident
        }
        ColumnKind::Integer => format!("{ident}::int8 AS {ident}"),
        ColumnKind::Text | ColumnKind::Json | ColumnKind::Other(_) => {
            format!("{ident}::text AS {ident}")
        }
    }
}

fn read_row(table: &TableDescriptor, row: &PgRow) -> Result<RawRow> {
    let mut raw = RawRow::new();
    for (idx, column) in table.columns.iter().enumerate() {
        raw = raw.with(column.name.clone(), read_value(table, column, row, idx)?);
    }
    Ok(raw)
}

fn read_value(
    table: &TableDescriptor,
    column: &ColumnDescriptor,
    row: &PgRow,
    idx: usize,
) -> Result<RawValue> {
    let decode_err = |err: sqlx::Error| {
        Error::Query(format!("decoding {}.{}: {err}", table.name, column.name))
    };

    let is_null = row
        .try_get_raw(idx)
        .map(|value| value.is_null())
        .map_err(decode_err)?;
    if is_null {
        return Ok(RawValue::Null);
    }

    let value = match column.kind {
        ColumnKind::Uuid => row
            .try_get::<Uuid, _>(idx)
            .map(|uuid| RawValue::Uuid(uuid.into_bytes())),
        ColumnKind::Timestamp => row
            .try_get::<NaiveDateTime, _>(idx)
            .map(RawValue::Timestamp),
        ColumnKind::TimestampTz => row
            .try_get::<DateTime<Utc>, _>(idx)
            .map(RawValue::TimestampTz),
        ColumnKind::Jsonb => row.try_get::<JsonValue, _>(idx).map(RawValue::Json),
        ColumnKind::Integer => row.try_get::<i64, _>(idx).map(RawValue::Int),
        ColumnKind::Text | ColumnKind::Json | ColumnKind::Other(_) => {
            row.try_get::<String, _>(idx).map(RawValue::Text)
        }
    };
    value.map_err(decode_err)
}
