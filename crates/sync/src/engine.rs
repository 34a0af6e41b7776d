use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};
use vitaledge_common::{AppConfig, Result, VectorDbError, VectorId};
use vitaledge_metadata::{MetadataStore, RecordMetadata, SqliteMetadataStore, VectorRecord};
use vitaledge_vector::{DeletionStrategy, VectorIndex, VectorSnapshot};

use crate::persistence::{load_index, save_index};
use crate::types::{
    EngineHealth, EngineState, IndexStats, LoadOutcome, PopulateItem, PopulateReport,
    RebuildReport, SearchHit, SearchResults,
};

/// Index plus lifecycle, guarded together by one lock
struct EngineInner {
    index: VectorIndex,
    state: EngineState,

    /// A persist failed; the file lags the in-memory index
    dirty: bool,
}

impl EngineInner {
    fn transition(&mut self, to: EngineState) {
        debug!("Engine state: {:?} -> {:?}", self.state, to);
        self.state = to;
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == EngineState::Closed {
            return Err(VectorDbError::EngineClosed);
        }
        Ok(())
    }
}

/// How `delete_vector` removes an entry for a given index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeletionPlan {
    /// Remove from both stores; other ids are unaffected
    InPlace,

    /// Rebuild both stores with sequential ids
    Rebuild,
}

impl DeletionPlan {
    fn choose(strategy: DeletionStrategy, allow_rebuild: bool) -> Result<Self> {
        if strategy.preserves_ids() {
            Ok(Self::InPlace)
        } else if allow_rebuild {
            Ok(Self::Rebuild)
        } else {
            Err(VectorDbError::DeletionUnsupported)
        }
    }
}

/// Synchronized vector index and metadata store
///
/// The only component that mutates both stores. Mutations hold the write
/// lock for the whole cross-store operation including persistence; reads
/// hold the read lock while joining index hits with metadata.
pub struct VectorDbService {
    inner: RwLock<EngineInner>,
    metadata: Arc<dyn MetadataStore>,
    index_path: PathBuf,
    dimension: usize,
    allow_rebuild_delete: bool,
    load_outcome: LoadOutcome,
}

impl VectorDbService {
    /// Open the SQLite metadata store and load the index from `config`
    pub async fn open(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let metadata = SqliteMetadataStore::open(&config.metadata_path).await?;
        Self::with_store(config, Arc::new(metadata)).await
    }

    /// Load the index from `config` against an already opened metadata store
    pub async fn with_store(config: &AppConfig, metadata: Arc<dyn MetadataStore>) -> Result<Self> {
        config.validate()?;

        let mut state = EngineState::Uninitialized;
        debug!("Engine state: {:?} -> {:?}", state, EngineState::Loading);
        state = EngineState::Loading;

        let (index, load_outcome) =
            load_index(&config.index_path, config.embedding_dim, metadata.as_ref()).await?;

        let records = metadata.count().await?;
        if records != index.len() {
            warn!(
                "Index holds {} vectors but metadata holds {} records; rebuild or reset required",
                index.len(),
                records
            );
        }

        let mut inner = EngineInner {
            index,
            state,
            dirty: false,
        };
        inner.transition(EngineState::Ready);

        info!(
            "Vector DB service initialized - {} vectors, dim={}, load={:?}",
            inner.index.len(),
            config.embedding_dim,
            load_outcome
        );

        Ok(Self {
            inner: RwLock::new(inner),
            metadata,
            index_path: config.index_path.clone(),
            dimension: config.embedding_dim,
            allow_rebuild_delete: config.allow_rebuild_delete,
            load_outcome,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn load_outcome(&self) -> LoadOutcome {
        self.load_outcome
    }

    pub async fn state(&self) -> EngineState {
        self.inner.read().await.state
    }

    /// Add one vector with its metadata, returning the allocated id
    pub async fn add_vector(&self, embedding: Vec<f32>, metadata: RecordMetadata) -> Result<VectorId> {
        self.check_embedding(&embedding)?;
        metadata.validate()?;

        let mut inner = self.write().await?;
        let id = self.add_locked(&mut inner, embedding, &metadata).await?;
        self.persist_locked(&mut inner).await;

        info!("Vector added: {}", id);
        Ok(id)
    }

    /// Add many vectors, reporting each item's outcome
    ///
    /// A failing item does not stop the batch; the index is persisted once
    /// at the end if anything was added.
    pub async fn bulk_populate(&self, items: Vec<PopulateItem>) -> Result<PopulateReport> {
        let mut inner = self.write().await?;
        let mut report = PopulateReport::default();

        for item in items {
            let outcome = match self
                .check_embedding(&item.embedding)
                .and_then(|_| item.metadata.validate())
            {
                Ok(()) => self.add_locked(&mut inner, item.embedding, &item.metadata).await,
                Err(e) => Err(e),
            };

            if let Err(e) = &outcome {
                warn!("Populate item {} rejected: {}", report.outcomes.len(), e);
            }
            report.outcomes.push(outcome);
        }

        let added = report.succeeded().len();
        if added > 0 {
            self.persist_locked(&mut inner).await;
        }

        info!(
            "Bulk populate completed: {} added, {} failed",
            added,
            report.outcomes.len() - added
        );
        Ok(report)
    }

    /// Nearest vectors joined with their metadata
    ///
    /// Ids without a metadata record stay in the results with `record: None`
    /// and are listed in `missing`.
    pub async fn search_vectors(&self, query: &[f32], top_k: usize) -> Result<SearchResults> {
        self.check_embedding(query)?;

        let inner = self.read().await?;
        self.search_locked(&inner.index, query, top_k).await
    }

    /// Several searches against one consistent view
    pub async fn bulk_search(&self, queries: &[Vec<f32>], top_k: usize) -> Result<Vec<SearchResults>> {
        for query in queries {
            self.check_embedding(query)?;
        }

        let inner = self.read().await?;
        let mut results = Vec::with_capacity(queries.len());
        for query in queries {
            results.push(self.search_locked(&inner.index, query, top_k).await?);
        }
        Ok(results)
    }

    /// Stored embedding for `id`
    pub async fn get_vector(&self, id: VectorId) -> Result<Vec<f32>> {
        self.read().await?.index.get_vector(id)
    }

    /// Metadata record for `id`
    pub async fn get_record(&self, id: VectorId) -> Result<VectorRecord> {
        let _inner = self.read().await?;
        self.metadata.get_record(id).await
    }

    /// Embedding and metadata record for `id` from one consistent view
    pub async fn get_entry(&self, id: VectorId) -> Result<(Vec<f32>, VectorRecord)> {
        let inner = self.read().await?;
        let embedding = inner.index.get_vector(id)?;
        let record = self.metadata.get_record(id).await?;
        Ok((embedding, record))
    }

    /// Point-in-time copy of every stored `(id, vector)` pair
    pub async fn get_all_vectors(&self) -> Result<VectorSnapshot> {
        Ok(self.read().await?.index.snapshot())
    }

    pub async fn list_records(&self, category: Option<&str>) -> Result<Vec<VectorRecord>> {
        let _inner = self.read().await?;
        self.metadata.list_records(category).await
    }

    pub async fn list_tags(&self) -> Result<Vec<String>> {
        let _inner = self.read().await?;
        Ok(self.metadata.list_tags().await?.into_iter().collect())
    }

    /// Delete a vector from both stores
    ///
    /// An index whose removals keep ids stable deletes in place. A compacting
    /// index is rebuilt with fresh sequential ids, which is rejected with
    /// `DeletionUnsupported` unless rebuild deletion is enabled; surviving ids
    /// above the deleted one then shift down by one and the report lists
    /// every change.
    pub async fn delete_vector(&self, id: VectorId) -> Result<RebuildReport> {
        let mut inner = self.write().await?;
        let plan = DeletionPlan::choose(inner.index.deletion_strategy(), self.allow_rebuild_delete)?;

        if !inner.index.contains(id) {
            return Err(VectorDbError::not_found(format!("vector {}", id)));
        }

        match plan {
            DeletionPlan::InPlace => self.delete_in_place(&mut inner, id).await,
            DeletionPlan::Rebuild => self.delete_by_rebuild(&mut inner, id).await,
        }
    }

    async fn delete_in_place(&self, inner: &mut EngineInner, id: VectorId) -> Result<RebuildReport> {
        self.metadata.delete_record(id).await?;
        inner.index.remove_ids(&[id])?;
        self.persist_locked(inner).await;

        info!("Vector {} deleted", id);
        Ok(RebuildReport {
            removed: id,
            renumbered: Vec::new(),
        })
    }

    async fn delete_by_rebuild(&self, inner: &mut EngineInner, id: VectorId) -> Result<RebuildReport> {
        let mut survivors: Vec<(VectorId, Vec<f32>)> = inner
            .index
            .snapshot()
            .iter()
            .filter(|(existing, _)| *existing != id)
            .collect();
        survivors.sort_by_key(|(existing, _)| *existing);

        let (old_ids, vectors): (Vec<VectorId>, Vec<Vec<f32>>) = survivors.into_iter().unzip();
        let new_ids: Vec<VectorId> = (0..old_ids.len() as VectorId).collect();

        let mut rebuilt = VectorIndex::new(self.dimension)?;
        rebuilt.add_with_ids(&vectors, &new_ids)?;

        let moves: Vec<(VectorId, VectorId)> = old_ids.into_iter().zip(new_ids).collect();

        // Metadata commits first; the old index stays live if it fails
        self.metadata.compact_ids(&[id], &moves).await?;
        inner.index = rebuilt;
        self.persist_locked(inner).await;

        let renumbered: Vec<(VectorId, VectorId)> =
            moves.into_iter().filter(|(old, new)| old != new).collect();
        info!(
            "Vector {} deleted by rebuild, {} ids renumbered",
            id,
            renumbered.len()
        );

        Ok(RebuildReport {
            removed: id,
            renumbered,
        })
    }

    /// Remove every vector, record and tag
    pub async fn reset(&self) -> Result<()> {
        let mut inner = self.write().await?;

        self.metadata.clear().await?;
        inner.index.clear();
        self.persist_locked(&mut inner).await;

        info!("Vector database reset");
        Ok(())
    }

    pub async fn health(&self) -> Result<EngineHealth> {
        let inner = self.inner.read().await;
        let records = if inner.state == EngineState::Closed {
            0
        } else {
            self.metadata.count().await?
        };
        let vectors = inner.index.len();

        Ok(EngineHealth {
            state: inner.state,
            load_outcome: self.load_outcome,
            vectors,
            records,
            consistent: inner.state == EngineState::Closed || vectors == records,
        })
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let inner = self.read().await?;

        Ok(IndexStats {
            dimension: inner.index.dimension(),
            vectors: inner.index.len(),
            records: self.metadata.count().await?,
            tags: self.metadata.list_tags().await?.len(),
            deletion_strategy: inner.index.deletion_strategy(),
            rebuild_delete_enabled: self.allow_rebuild_delete,
        })
    }

    /// Flush pending persistence and shut down; later calls fail with
    /// `EngineClosed`
    pub async fn close(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.state == EngineState::Closed {
            return Ok(());
        }

        if inner.dirty {
            inner.transition(EngineState::Persisting);
            save_index(&inner.index, &self.index_path).await?;
            inner.dirty = false;
        }

        inner.transition(EngineState::Closed);
        self.metadata.close().await;

        info!("Vector DB service closed");
        Ok(())
    }

    async fn read(&self) -> Result<RwLockReadGuard<'_, EngineInner>> {
        let inner = self.inner.read().await;
        inner.ensure_open()?;
        Ok(inner)
    }

    async fn write(&self) -> Result<RwLockWriteGuard<'_, EngineInner>> {
        let inner = self.inner.write().await;
        inner.ensure_open()?;
        Ok(inner)
    }

    fn check_embedding(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(VectorDbError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(VectorDbError::invalid_input("embedding contains non-finite values"));
        }

        Ok(())
    }

    /// Index insert then metadata insert, undoing the index insert if the
    /// metadata write fails
    async fn add_locked(
        &self,
        inner: &mut EngineInner,
        embedding: Vec<f32>,
        metadata: &RecordMetadata,
    ) -> Result<VectorId> {
        let id = inner.index.len() as VectorId;
        inner.index.add_with_ids(&[embedding], &[id])?;

        if let Err(e) = self.metadata.add_record(id, metadata).await {
            error!("Metadata write for vector {} failed, rolling back index: {}", id, e);
            if let Err(rollback) = inner.index.remove_ids(&[id]) {
                error!("Index rollback for vector {} failed: {}", id, rollback);
            }
            return Err(e);
        }

        Ok(id)
    }

    async fn search_locked(
        &self,
        index: &VectorIndex,
        query: &[f32],
        top_k: usize,
    ) -> Result<SearchResults> {
        let neighbors = index.search(query, top_k)?;
        let mut results = SearchResults::default();

        for neighbor in neighbors {
            let record = match self.metadata.get_record(neighbor.id).await {
                Ok(record) => Some(record),
                Err(VectorDbError::NotFound(_)) => {
                    results.missing.push(neighbor.id);
                    None
                }
                Err(e) => return Err(e),
            };

            results.hits.push(SearchHit {
                id: neighbor.id,
                distance: neighbor.distance,
                record,
            });
        }

        if !results.missing.is_empty() {
            warn!(
                "Metadata desync: index returned ids {:?} without metadata records",
                results.missing
            );
        }

        debug!("Search completed - {} results (top_k={})", results.len(), top_k);
        Ok(results)
    }

    /// Write the index file; a failure leaves the engine dirty for `close`
    async fn persist_locked(&self, inner: &mut EngineInner) {
        inner.transition(EngineState::Persisting);

        match save_index(&inner.index, &self.index_path).await {
            Ok(()) => inner.dirty = false,
            Err(e) => {
                error!(
                    "Failed to persist index to {}: {}",
                    self.index_path.display(),
                    e
                );
                inner.dirty = true;
            }
        }

        inner.transition(EngineState::Ready);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;
    use vitaledge_vector::{FlatIndex, StoredIndex};

    fn test_config(dir: &Path, dim: usize) -> AppConfig {
        AppConfig {
            embedding_dim: dim,
            index_path: dir.join("data").join("faiss_index"),
            metadata_path: dir.join("data").join("metadata.db"),
            log_dir: dir.join("logs"),
            ..AppConfig::default()
        }
    }

    async fn open_service(dir: &Path, dim: usize) -> VectorDbService {
        VectorDbService::open(&test_config(dir, dim)).await.unwrap()
    }

    /// Wraps the SQLite store to hide records or fail writes on demand
    struct FaultyStore {
        inner: SqliteMetadataStore,
        hide_records: AtomicBool,
        fail_writes: AtomicBool,
    }

    impl FaultyStore {
        async fn open(path: &Path) -> Arc<Self> {
            Arc::new(Self {
                inner: SqliteMetadataStore::open(path).await.unwrap(),
                hide_records: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl MetadataStore for FaultyStore {
        async fn add_record(&self, id: VectorId, metadata: &RecordMetadata) -> Result<VectorRecord> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(anyhow::anyhow!("injected write failure").into());
            }
            self.inner.add_record(id, metadata).await
        }

        async fn get_record(&self, id: VectorId) -> Result<VectorRecord> {
            if self.hide_records.load(Ordering::SeqCst) {
                return Err(VectorDbError::not_found(format!("record {}", id)));
            }
            self.inner.get_record(id).await
        }

        async fn list_records(&self, category: Option<&str>) -> Result<Vec<VectorRecord>> {
            self.inner.list_records(category).await
        }

        async fn list_tags(&self) -> Result<BTreeSet<String>> {
            self.inner.list_tags().await
        }

        async fn delete_record(&self, id: VectorId) -> Result<()> {
            self.inner.delete_record(id).await
        }

        async fn count(&self) -> Result<usize> {
            self.inner.count().await
        }

        async fn record_ids(&self) -> Result<Vec<VectorId>> {
            self.inner.record_ids().await
        }

        async fn compact_ids(&self, removed: &[VectorId], moves: &[(VectorId, VectorId)]) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(anyhow::anyhow!("injected write failure").into());
            }
            self.inner.compact_ids(removed, moves).await
        }

        async fn clear(&self) -> Result<()> {
            self.inner.clear().await
        }

        async fn close(&self) {
            self.inner.close().await
        }
    }

    #[tokio::test]
    async fn test_exact_match_has_zero_distance() {
        let dir = TempDir::new().unwrap();
        let service = open_service(dir.path(), 4).await;

        let id = service
            .add_vector(vec![1.0, 2.0, 3.0, 4.0], RecordMetadata::new("first"))
            .await
            .unwrap();
        assert_eq!(id, 0);

        let results = service.search_vectors(&[1.0, 2.0, 3.0, 4.0], 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results.hits[0].id, 0);
        assert_eq!(results.hits[0].distance, 0.0);
        assert_eq!(results.hits[0].record.as_ref().unwrap().text, "first");
        assert!(results.is_consistent());
    }

    #[tokio::test]
    async fn test_search_orders_by_distance() {
        let dir = TempDir::new().unwrap();
        let service = open_service(dir.path(), 4).await;

        for (i, v) in [[0.0, 0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0], [5.0, 5.0, 5.0, 5.0]]
            .iter()
            .enumerate()
        {
            service
                .add_vector(v.to_vec(), RecordMetadata::new(format!("v{}", i)))
                .await
                .unwrap();
        }

        let results = service.search_vectors(&[0.1, 0.0, 0.0, 0.0], 2).await.unwrap();
        let ids: Vec<VectorId> = results.hits.iter().map(|hit| hit.id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert!(results.hits[0].distance <= results.hits[1].distance);

        let all = service.search_vectors(&[0.0; 4], 10).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_search_empty_index_returns_nothing() {
        let dir = TempDir::new().unwrap();
        let service = open_service(dir.path(), 4).await;

        let results = service.search_vectors(&[0.0; 4], 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_bad_embeddings() {
        let dir = TempDir::new().unwrap();
        let service = open_service(dir.path(), 4).await;

        let err = service
            .add_vector(vec![1.0, 2.0], RecordMetadata::new("short"))
            .await
            .unwrap_err();
        assert!(matches!(err, VectorDbError::DimensionMismatch { expected: 4, actual: 2 }));

        let err = service
            .add_vector(vec![1.0, f32::NAN, 0.0, 0.0], RecordMetadata::new("nan"))
            .await
            .unwrap_err();
        assert!(matches!(err, VectorDbError::InvalidInput(_)));

        let err = service.search_vectors(&[0.0; 3], 1).await.unwrap_err();
        assert!(matches!(err, VectorDbError::DimensionMismatch { .. }));

        let err = service.search_vectors(&[0.0; 4], 0).await.unwrap_err();
        assert!(matches!(err, VectorDbError::InvalidInput(_)));

        assert_eq!(service.stats().await.unwrap().vectors, 0);
    }

    #[tokio::test]
    async fn test_duplicate_external_id_leaves_no_orphan() {
        let dir = TempDir::new().unwrap();
        let service = open_service(dir.path(), 4).await;

        service
            .add_vector(vec![1.0; 4], RecordMetadata::new("a").with_external_id("X"))
            .await
            .unwrap();
        let err = service
            .add_vector(vec![2.0; 4], RecordMetadata::new("b").with_external_id("X"))
            .await
            .unwrap_err();
        assert!(matches!(err, VectorDbError::DuplicateExternalId(ref ext) if ext == "X"));

        let health = service.health().await.unwrap();
        assert_eq!(health.vectors, 1);
        assert_eq!(health.records, 1);
        assert!(health.is_healthy());

        // The failed id is reused by the next successful add
        let id = service
            .add_vector(vec![3.0; 4], RecordMetadata::new("c"))
            .await
            .unwrap();
        assert_eq!(id, 1);
    }

    #[tokio::test]
    async fn test_metadata_failure_rolls_back_index() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path(), 4);
        let store = FaultyStore::open(&config.metadata_path).await;
        let service = VectorDbService::with_store(&config, store.clone()).await.unwrap();

        service.add_vector(vec![1.0; 4], RecordMetadata::new("kept")).await.unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        let err = service
            .add_vector(vec![2.0; 4], RecordMetadata::new("lost"))
            .await
            .unwrap_err();
        assert!(matches!(err, VectorDbError::Other(_)));

        let results = service.search_vectors(&[2.0; 4], 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results.hits[0].id, 0);
        assert!(service.get_vector(1).await.is_err());
    }

    #[tokio::test]
    async fn test_search_reports_missing_metadata() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path(), 4);
        let store = FaultyStore::open(&config.metadata_path).await;
        let service = VectorDbService::with_store(&config, store.clone()).await.unwrap();

        service.add_vector(vec![1.0; 4], RecordMetadata::new("a")).await.unwrap();
        service.add_vector(vec![2.0; 4], RecordMetadata::new("b")).await.unwrap();

        store.hide_records.store(true, Ordering::SeqCst);
        let results = service.search_vectors(&[1.0; 4], 2).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results.missing, vec![0, 1]);
        assert!(results.hits.iter().all(|hit| hit.record.is_none()));
        assert!(matches!(
            results.into_strict(),
            Err(VectorDbError::MetadataDesync(ids)) if ids == vec![0, 1]
        ));
    }

    #[tokio::test]
    async fn test_bulk_populate_partial_failure() {
        let dir = TempDir::new().unwrap();
        let service = open_service(dir.path(), 2).await;

        let report = service
            .bulk_populate(vec![
                PopulateItem::new(vec![0.0, 0.0], RecordMetadata::new("a").with_external_id("A")),
                PopulateItem::new(vec![1.0], RecordMetadata::new("bad dim")),
                PopulateItem::new(vec![1.0, 1.0], RecordMetadata::new("dup").with_external_id("A")),
                PopulateItem::new(vec![2.0, 2.0], RecordMetadata::new("c").with_tags(["x"])),
            ])
            .await
            .unwrap();

        assert_eq!(report.succeeded(), vec![0, 1]);
        let failed: Vec<usize> = report.failed().iter().map(|(position, _)| *position).collect();
        assert_eq!(failed, vec![1, 2]);

        let records = service.list_records(None).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].text, "c");
        assert_eq!(service.list_tags().await.unwrap(), vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn test_persist_and_restore_identical_results() {
        let dir = TempDir::new().unwrap();
        let query = [0.3, 0.1, 0.0, 0.9];

        let before = {
            let service = open_service(dir.path(), 4).await;
            for i in 0..10 {
                let f = i as f32;
                service
                    .add_vector(vec![f, f * 0.5, 1.0 - f, 0.25 * f], RecordMetadata::new(format!("r{}", i)))
                    .await
                    .unwrap();
            }
            let results = service.search_vectors(&query, 5).await.unwrap();
            service.close().await.unwrap();
            results
        };

        let service = open_service(dir.path(), 4).await;
        assert_eq!(service.load_outcome(), LoadOutcome::Restored);

        let after = service.search_vectors(&query, 5).await.unwrap();
        let ids = |r: &SearchResults| r.hits.iter().map(|h| (h.id, h.distance)).collect::<Vec<_>>();
        assert_eq!(ids(&before), ids(&after));
    }

    #[tokio::test]
    async fn test_corrupt_index_recovers_empty() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path(), 4);

        {
            let service = open_service(dir.path(), 4).await;
            service.add_vector(vec![1.0; 4], RecordMetadata::new("a")).await.unwrap();
            service.close().await.unwrap();
        }

        std::fs::write(&config.index_path, b"not an index").unwrap();

        let service = open_service(dir.path(), 4).await;
        assert_eq!(service.load_outcome(), LoadOutcome::RecoveredEmpty);
        assert!(service.search_vectors(&[1.0; 4], 3).await.unwrap().is_empty());
        assert_eq!(service.list_records(None).await.unwrap().len(), 1);

        let health = service.health().await.unwrap();
        assert!(!health.consistent);
    }

    #[tokio::test]
    async fn test_dimension_change_is_fatal() {
        let dir = TempDir::new().unwrap();

        {
            let service = open_service(dir.path(), 4).await;
            service.add_vector(vec![1.0; 4], RecordMetadata::new("a")).await.unwrap();
            service.close().await.unwrap();
        }

        let err = VectorDbService::open(&test_config(dir.path(), 8)).await.err().unwrap();
        assert!(matches!(err, VectorDbError::DimensionChanged { stored: 4, configured: 8 }));
    }

    #[tokio::test]
    async fn test_bare_flat_index_rebuilt_from_metadata() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path(), 2);

        {
            let service = open_service(dir.path(), 2).await;
            service.add_vector(vec![0.0, 0.0], RecordMetadata::new("a")).await.unwrap();
            service.add_vector(vec![3.0, 4.0], RecordMetadata::new("b")).await.unwrap();
            service.close().await.unwrap();
        }

        let mut flat = FlatIndex::new(2).unwrap();
        flat.add(&[vec![0.0, 0.0], vec![3.0, 4.0]]).unwrap();
        let bytes = StoredIndex::Flat(flat).to_bytes().unwrap();
        vitaledge_vector::write_atomic(&config.index_path, &bytes).unwrap();

        let service = open_service(dir.path(), 2).await;
        assert_eq!(service.load_outcome(), LoadOutcome::RebuiltFromMetadata);

        let results = service.search_vectors(&[3.0, 4.0], 1).await.unwrap();
        assert_eq!(results.hits[0].id, 1);
        assert_eq!(results.hits[0].record.as_ref().unwrap().text, "b");
    }

    #[tokio::test]
    async fn test_delete_disabled_by_default() {
        let dir = TempDir::new().unwrap();
        let service = open_service(dir.path(), 2).await;
        service.add_vector(vec![1.0, 1.0], RecordMetadata::new("a")).await.unwrap();

        let err = service.delete_vector(0).await.unwrap_err();
        assert!(matches!(err, VectorDbError::DeletionUnsupported));
        assert_eq!(service.get_vector(0).await.unwrap(), vec![1.0, 1.0]);
    }

    #[tokio::test]
    async fn test_rebuild_delete_renumbers() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig {
            allow_rebuild_delete: true,
            ..test_config(dir.path(), 2)
        };
        let service = VectorDbService::open(&config).await.unwrap();

        for i in 0..4 {
            service
                .add_vector(vec![i as f32, 0.0], RecordMetadata::new(format!("r{}", i)).with_tags(["t"]))
                .await
                .unwrap();
        }

        let report = service.delete_vector(1).await.unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.renumbered, vec![(2, 1), (3, 2)]);

        assert_eq!(service.get_vector(1).await.unwrap(), vec![2.0, 0.0]);
        assert_eq!(service.get_record(1).await.unwrap().text, "r2");
        assert_eq!(service.get_record(2).await.unwrap().text, "r3");
        assert!(matches!(service.get_record(3).await, Err(VectorDbError::NotFound(_))));
        assert!(service.get_record(1).await.unwrap().tags.contains("t"));

        let err = service.delete_vector(9).await.unwrap_err();
        assert!(matches!(err, VectorDbError::NotFound(_)));

        let health = service.health().await.unwrap();
        assert_eq!((health.vectors, health.records), (3, 3));
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_old_index() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig {
            allow_rebuild_delete: true,
            ..test_config(dir.path(), 2)
        };
        let store = FaultyStore::open(&config.metadata_path).await;
        let service = VectorDbService::with_store(&config, store.clone()).await.unwrap();

        service.add_vector(vec![0.0, 0.0], RecordMetadata::new("a")).await.unwrap();
        service.add_vector(vec![1.0, 1.0], RecordMetadata::new("b")).await.unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        assert!(service.delete_vector(0).await.is_err());

        assert_eq!(service.get_vector(0).await.unwrap(), vec![0.0, 0.0]);
        assert_eq!(service.get_all_vectors().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reset_clears_both_stores() {
        let dir = TempDir::new().unwrap();
        let service = open_service(dir.path(), 2).await;
        service
            .add_vector(vec![1.0, 1.0], RecordMetadata::new("a").with_tags(["t"]))
            .await
            .unwrap();

        service.reset().await.unwrap();

        let stats = service.stats().await.unwrap();
        assert_eq!((stats.vectors, stats.records, stats.tags), (0, 0, 0));
        assert_eq!(
            service.add_vector(vec![2.0, 2.0], RecordMetadata::new("b")).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_bulk_search_and_snapshot() {
        let dir = TempDir::new().unwrap();
        let service = open_service(dir.path(), 2).await;
        service.add_vector(vec![0.0, 0.0], RecordMetadata::new("a")).await.unwrap();
        service.add_vector(vec![9.0, 9.0], RecordMetadata::new("b")).await.unwrap();

        let results = service
            .bulk_search(&[vec![0.0, 0.1], vec![9.0, 8.9]], 1)
            .await
            .unwrap();
        assert_eq!(results[0].hits[0].id, 0);
        assert_eq!(results[1].hits[0].id, 1);

        let snapshot = service.get_all_vectors().await.unwrap();
        let pairs: Vec<(VectorId, Vec<f32>)> = snapshot.iter().collect();
        assert_eq!(pairs, vec![(0, vec![0.0, 0.0]), (1, vec![9.0, 9.0])]);
    }

    #[tokio::test]
    async fn test_close_rejects_later_calls() {
        let dir = TempDir::new().unwrap();
        let service = open_service(dir.path(), 2).await;
        assert_eq!(service.state().await, EngineState::Ready);

        service.close().await.unwrap();
        assert_eq!(service.state().await, EngineState::Closed);
        service.close().await.unwrap();

        let err = service
            .add_vector(vec![1.0, 1.0], RecordMetadata::new("late"))
            .await
            .unwrap_err();
        assert!(matches!(err, VectorDbError::EngineClosed));
        assert!(matches!(
            service.search_vectors(&[0.0, 0.0], 1).await,
            Err(VectorDbError::EngineClosed)
        ));
        assert!(!service.health().await.unwrap().is_healthy());
    }

    #[test]
    fn test_deletion_plan_follows_strategy() {
        assert_eq!(
            DeletionPlan::choose(DeletionStrategy::Tombstone, false).unwrap(),
            DeletionPlan::InPlace
        );
        assert_eq!(
            DeletionPlan::choose(DeletionStrategy::Compact, true).unwrap(),
            DeletionPlan::Rebuild
        );
        assert!(matches!(
            DeletionPlan::choose(DeletionStrategy::Compact, false),
            Err(VectorDbError::DeletionUnsupported)
        ));
    }

    #[tokio::test]
    async fn test_three_vectors_nearest_to_second() {
        let dir = TempDir::new().unwrap();
        let service = open_service(dir.path(), 4).await;

        let embeddings = [
            vec![0.0, 0.0, 0.0, 1.0],
            vec![1.0, 2.0, 3.0, 4.0],
            vec![1.0, 2.0, 3.0, 5.0],
        ];
        for (embedding, text) in embeddings.iter().zip(["a", "b", "c"]) {
            service
                .add_vector(embedding.clone(), RecordMetadata::new(text))
                .await
                .unwrap();
        }

        let results = service.search_vectors(&embeddings[1], 2).await.unwrap();
        assert_eq!(results.len(), 2);

        let first = &results.hits[0];
        assert_eq!((first.id, first.distance), (1, 0.0));
        assert_eq!(first.record.as_ref().unwrap().text, "b");

        let second = &results.hits[1];
        assert_eq!(second.id, 2);
        assert!(second.distance > 0.0);
        assert_eq!(second.record.as_ref().unwrap().text, "c");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_get_entry_never_mixes_vectors_during_rebuild() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig {
            allow_rebuild_delete: true,
            ..test_config(dir.path(), 1)
        };
        let service = Arc::new(VectorDbService::open(&config).await.unwrap());

        // Every embedding equals its record text, so a torn read is visible
        let writer = {
            let service = service.clone();
            tokio::spawn(async move {
                let mut next = 0u32;
                for _ in 0..40 {
                    while service.stats().await.unwrap().vectors < 3 {
                        service
                            .add_vector(vec![next as f32], RecordMetadata::new(next.to_string()))
                            .await
                            .unwrap();
                        next += 1;
                    }
                    service.delete_vector(0).await.unwrap();
                }
            })
        };

        let mut checked = 0;
        while !writer.is_finished() {
            match service.get_entry(1).await {
                Ok((embedding, record)) => {
                    assert_eq!(embedding, vec![record.text.parse::<f32>().unwrap()]);
                    checked += 1;
                }
                Err(VectorDbError::NotFound(_)) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
            tokio::task::yield_now().await;
        }

        writer.await.unwrap();
        let (embedding, record) = service.get_entry(1).await.unwrap();
        assert_eq!(embedding, vec![record.text.parse::<f32>().unwrap()]);
        assert!(checked > 0);
    }

    #[tokio::test]
    async fn test_oversized_header_recovers_empty() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path(), 4);
        std::fs::create_dir_all(config.index_path.parent().unwrap()).unwrap();

        let header = vitaledge_vector::IndexHeader {
            kind: vitaledge_vector::IndexKind::Flat,
            dimensions: u32::MAX,
            count: u32::MAX,
        };
        let mut bytes = header.to_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 32]);
        std::fs::write(&config.index_path, &bytes).unwrap();

        let service = VectorDbService::open(&config).await.unwrap();
        assert_eq!(service.load_outcome(), LoadOutcome::RecoveredEmpty);
        assert!(service.search_vectors(&[0.0; 4], 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recovered_empty_ids_collide_until_reset() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path(), 2);

        {
            let service = open_service(dir.path(), 2).await;
            service.add_vector(vec![1.0, 1.0], RecordMetadata::new("a")).await.unwrap();
            service.add_vector(vec![2.0, 2.0], RecordMetadata::new("b")).await.unwrap();
            service.close().await.unwrap();
        }
        std::fs::write(&config.index_path, b"garbage").unwrap();

        let service = open_service(dir.path(), 2).await;
        assert_eq!(service.load_outcome(), LoadOutcome::RecoveredEmpty);

        // The allocator restarts at 0, which the surviving metadata still holds
        let err = service
            .add_vector(vec![3.0, 3.0], RecordMetadata::new("c"))
            .await
            .unwrap_err();
        assert!(matches!(err, VectorDbError::DuplicateId(0)));
        assert_eq!(service.stats().await.unwrap().vectors, 0);
        assert_eq!(service.list_records(None).await.unwrap().len(), 2);

        service.reset().await.unwrap();
        let id = service
            .add_vector(vec![3.0, 3.0], RecordMetadata::new("c"))
            .await
            .unwrap();
        assert_eq!(id, 0);
        assert!(service.health().await.unwrap().is_healthy());
    }
}
