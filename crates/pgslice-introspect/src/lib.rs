//! Postgres catalog introspection into a [`SchemaGraph`].

pub mod adapter;
pub mod options;
pub mod postgres;

pub use adapter::Introspector;
pub use options::IntrospectOptions;
pub use postgres::{PostgresIntrospector, introspect_postgres};

pub use pgslice_core::SchemaGraph;
