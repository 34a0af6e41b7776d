use serde::{Deserialize, Serialize};
use vitaledge_common::{Result, VectorDbError, VectorId};
use vitaledge_metadata::{RecordMetadata, VectorRecord};
use vitaledge_vector::DeletionStrategy;

/// Engine lifecycle
///
/// `Uninitialized -> Loading -> Ready -> (Persisting <-> Ready) -> Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Uninitialized,
    Loading,
    Ready,
    Persisting,
    Closed,
}

/// How the index came up at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOutcome {
    /// Mapped index file restored as-is
    Restored,

    /// No index file; started empty
    CreatedEmpty,

    /// Index file unreadable; started empty
    RecoveredEmpty,

    /// Bare index file re-mapped using metadata ids
    RebuiltFromMetadata,
}

/// One search hit joined with its metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: VectorId,

    /// Squared L2 distance
    pub distance: f32,

    /// `None` only when the metadata store has no record for `id`
    pub record: Option<VectorRecord>,
}

/// Ordered search hits plus any ids found without metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,

    /// Ids returned by the index that have no metadata record
    pub missing: Vec<VectorId>,
}

impl SearchResults {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Whether every hit resolved to a record
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty()
    }

    /// Hits with their records, or `MetadataDesync` listing the missing ids
    pub fn into_strict(self) -> Result<Vec<(VectorId, f32, VectorRecord)>> {
        if !self.missing.is_empty() {
            return Err(VectorDbError::MetadataDesync(self.missing));
        }

        Ok(self
            .hits
            .into_iter()
            .filter_map(|hit| hit.record.map(|record| (hit.id, hit.distance, record)))
            .collect())
    }
}

/// One entry of a bulk populate request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulateItem {
    pub embedding: Vec<f32>,

    #[serde(flatten)]
    pub metadata: RecordMetadata,
}

impl PopulateItem {
    pub fn new(embedding: Vec<f32>, metadata: RecordMetadata) -> Self {
        Self { embedding, metadata }
    }
}

/// Per-item outcome of a bulk populate, in request order
#[derive(Debug, Default)]
pub struct PopulateReport {
    pub outcomes: Vec<Result<VectorId>>,
}

impl PopulateReport {
    /// Ids assigned to successful items
    pub fn succeeded(&self) -> Vec<VectorId> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.as_ref().ok().copied())
            .collect()
    }

    /// Request positions of failed items with their errors
    pub fn failed(&self) -> Vec<(usize, &VectorDbError)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(position, outcome)| outcome.as_ref().err().map(|e| (position, e)))
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.is_ok())
    }
}

/// Result of a rebuild-based deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub removed: VectorId,

    /// `(old, new)` for every surviving vector whose id changed
    pub renumbered: Vec<(VectorId, VectorId)>,
}

/// Engine health summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineHealth {
    pub state: EngineState,
    pub load_outcome: LoadOutcome,
    pub vectors: usize,
    pub records: usize,

    /// Index and metadata hold the same number of entries
    pub consistent: bool,
}

impl EngineHealth {
    pub fn is_healthy(&self) -> bool {
        self.consistent && matches!(self.state, EngineState::Ready | EngineState::Persisting)
    }
}

/// Index statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub dimension: usize,
    pub vectors: usize,
    pub records: usize,
    pub tags: usize,
    pub deletion_strategy: DeletionStrategy,
    pub rebuild_delete_enabled: bool,
}
