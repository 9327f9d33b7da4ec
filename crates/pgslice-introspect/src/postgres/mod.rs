use sqlx::PgPool;

use pgslice_core::{Result, SchemaGraph};

use crate::adapter::Introspector;
use crate::options::IntrospectOptions;

mod mapper;
mod queries;

pub use mapper::{RawSchema, build_graph};
pub use queries::{RawColumn, RawForeignKey, RawPrimaryKey, RawTable};

/// Introspector for PostgreSQL databases.
#[derive(Debug, Clone)]
pub struct PostgresIntrospector {
    pool: PgPool,
}

impl PostgresIntrospector {
    /// Create a new introspector using a pre-configured pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl Introspector for PostgresIntrospector {
    fn engine(&self) -> &'static str {
        "postgres"
    }

    async fn introspect(&self, opts: &IntrospectOptions) -> Result<SchemaGraph> {
        introspect_postgres(&self.pool, opts).await
    }
}

/// Introspect one Postgres schema according to the provided options.
pub async fn introspect_postgres(pool: &PgPool, opts: &IntrospectOptions) -> Result<SchemaGraph> {
    let raw = RawSchema {
        tables: queries::list_tables(pool, &opts.schema).await?,
        columns: queries::list_columns(pool, &opts.schema).await?,
        primary_keys: queries::list_primary_keys(pool, &opts.schema).await?,
        foreign_keys: queries::list_foreign_keys(pool, &opts.schema).await?,
    };
    mapper::build_graph(raw, opts)
}
