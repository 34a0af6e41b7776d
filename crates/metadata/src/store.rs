use async_trait::async_trait;
use std::collections::BTreeSet;
use vitaledge_common::{Result, VectorId};

use crate::types::{RecordMetadata, VectorRecord};

/// Relational metadata keyed by vector id
///
/// Every write is a single transaction: it is either fully visible or not
/// at all.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a record under a caller-allocated id
    ///
    /// Fails with `DuplicateId` or `DuplicateExternalId` without writing.
    async fn add_record(&self, id: VectorId, metadata: &RecordMetadata) -> Result<VectorRecord>;

    /// Record with its tags, or `NotFound`
    async fn get_record(&self, id: VectorId) -> Result<VectorRecord>;

    /// Records in id order, optionally restricted to one category
    async fn list_records(&self, category: Option<&str>) -> Result<Vec<VectorRecord>>;

    /// Every distinct tag
    async fn list_tags(&self) -> Result<BTreeSet<String>>;

    /// Remove a record and its tag links; tags themselves stay
    async fn delete_record(&self, id: VectorId) -> Result<()>;

    /// Number of stored records
    async fn count(&self) -> Result<usize>;

    /// Stored ids in ascending order
    async fn record_ids(&self) -> Result<Vec<VectorId>>;

    /// Delete `removed` and renumber survivors per `moves` (old, new)
    /// in one transaction
    async fn compact_ids(&self, removed: &[VectorId], moves: &[(VectorId, VectorId)]) -> Result<()>;

    /// Remove every record, tag and link
    async fn clear(&self) -> Result<()>;

    /// Release the underlying connection
    async fn close(&self);
}
