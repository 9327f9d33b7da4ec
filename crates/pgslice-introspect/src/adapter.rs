use async_trait::async_trait;

use pgslice_core::{Result, SchemaGraph};

use crate::options::IntrospectOptions;

/// Trait implemented by sources that can describe a schema.
#[async_trait]
pub trait Introspector {
    /// Returns the engine identifier (e.g. `postgres`).
    fn engine(&self) -> &'static str;

    /// Read one schema and return its validated graph.
    async fn introspect(&self, opts: &IntrospectOptions) -> Result<SchemaGraph>;
}
