//! Foreign-key-aware extraction of a connected row set.
//!
//! Starting from one seed row, the [`Extractor`] walks the schema graph in
//! both directions, fetching rows through a [`RowSource`], and renders the
//! result as dependency-ordered INSERT statements.

pub mod engine;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod source;

pub use engine::{Extraction, Extractor};
pub use memory::InMemorySource;
pub use model::{ExtractOptions, ExtractionReport, Multiplicity, Seed, TableReport};
pub use postgres::PgRowSource;
pub use source::{FetchRequest, RowSource};
