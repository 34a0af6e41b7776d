//! VitalEdge Metadata Store
//!
//! Relational storage of vector records and their tags, keyed by the same
//! id as the vector index.

mod sqlite;
mod store;
mod types;

pub use sqlite::SqliteMetadataStore;
pub use store::MetadataStore;
pub use types::{RecordMetadata, TagSet, VectorRecord};
