use std::collections::HashSet;

use ndarray::Array2;
use tracing::debug;
use vitaledge_common::{Result, VectorDbError, VectorId};

use crate::flat::FlatIndex;
use crate::id_map::IdMap;
use crate::types::{DeletionStrategy, Neighbor};

/// Exact-search index addressed by caller-supplied ids
///
/// A [`FlatIndex`] plus an [`IdMap`] that is attached exactly once, while the
/// base is still empty.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    base: FlatIndex,
    ids: IdMap,
}

impl VectorIndex {
    /// Create empty index for `dimension`-long vectors
    pub fn new(dimension: usize) -> Result<Self> {
        Self::attach(FlatIndex::new(dimension)?)
    }

    /// Attach an id mapping to a base index
    ///
    /// Fails with `IndexNotEmpty` if the base already holds vectors, since
    /// their positional ids could not be reconciled with caller ids.
    pub fn attach(base: FlatIndex) -> Result<Self> {
        if !base.is_empty() {
            return Err(VectorDbError::IndexNotEmpty(base.len()));
        }

        Ok(Self {
            base,
            ids: IdMap::new(),
        })
    }

    pub(crate) fn from_parts(base: FlatIndex, ids: IdMap) -> Self {
        debug_assert_eq!(base.len(), ids.len());
        Self { base, ids }
    }

    pub fn dimension(&self) -> usize {
        self.base.dimension()
    }

    /// Number of stored vectors
    pub fn len(&self) -> usize {
        self.base.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    pub fn contains(&self, id: VectorId) -> bool {
        self.ids.contains(id)
    }

    /// Stored ids in insertion order
    pub fn ids(&self) -> &[VectorId] {
        self.ids.ids()
    }

    pub fn base(&self) -> &FlatIndex {
        &self.base
    }

    /// Removal strategy of the underlying storage
    pub fn deletion_strategy(&self) -> DeletionStrategy {
        self.base.deletion_strategy()
    }

    /// Add vectors under explicit ids
    ///
    /// Either every vector becomes searchable or none does.
    pub fn add_with_ids(&mut self, vectors: &[Vec<f32>], ids: &[VectorId]) -> Result<()> {
        if vectors.len() != ids.len() {
            return Err(VectorDbError::DimensionMismatch {
                expected: vectors.len(),
                actual: ids.len(),
            });
        }

        let mut batch = HashSet::with_capacity(ids.len());
        for &id in ids {
            if self.ids.contains(id) || !batch.insert(id) {
                return Err(VectorDbError::DuplicateId(id));
            }
        }

        self.base.add(vectors)?;
        for &id in ids {
            self.ids.push(id);
        }

        debug!("Added {} vectors, index size {}", ids.len(), self.len());
        Ok(())
    }

    /// Up to `k` nearest vectors by squared L2 distance
    ///
    /// Sorted ascending by distance, ties by ascending id. An empty index
    /// yields an empty result rather than an error.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Err(VectorDbError::invalid_input("k must be at least 1"));
        }

        let distances = self.base.distances(query)?;
        let mut neighbors: Vec<Neighbor> = distances
            .into_iter()
            .enumerate()
            .filter_map(|(slot, distance)| {
                self.ids.id_at(slot).map(|id| Neighbor::new(id, distance))
            })
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.id.cmp(&b.id))
        });
        neighbors.truncate(k);

        Ok(neighbors)
    }

    /// Nearest stored vector, failing on an empty index
    pub fn nearest(&self, query: &[f32]) -> Result<Neighbor> {
        self.search(query, 1)?
            .into_iter()
            .next()
            .ok_or(VectorDbError::EmptyIndex)
    }

    /// Stored embedding for `id`
    pub fn get_vector(&self, id: VectorId) -> Result<Vec<f32>> {
        self.ids
            .slot_of(id)
            .and_then(|slot| self.base.row(slot))
            .map(|row| row.to_vec())
            .ok_or_else(|| VectorDbError::not_found(format!("vector {}", id)))
    }

    /// Point-in-time copy of every `(id, vector)` pair
    pub fn snapshot(&self) -> VectorSnapshot {
        VectorSnapshot {
            ids: self.ids.ids().to_vec(),
            vectors: self.base.as_array().clone(),
        }
    }

    /// Remove vectors by id
    ///
    /// The base compacts, so internal positions of later vectors change;
    /// the id map is rewritten to follow. Fails with `NotFound` before
    /// touching anything if any id is absent.
    pub fn remove_ids(&mut self, ids: &[VectorId]) -> Result<usize> {
        let mut slots = Vec::with_capacity(ids.len());
        for &id in ids {
            let slot = self
                .ids
                .slot_of(id)
                .ok_or_else(|| VectorDbError::not_found(format!("vector {}", id)))?;
            slots.push(slot);
        }

        self.base.remove_rows(&slots);
        self.ids.remove(ids);

        debug!("Removed {} vectors, index size {}", slots.len(), self.len());
        Ok(slots.len())
    }

    /// Drop every vector, keeping the dimension and the mapping
    pub fn clear(&mut self) {
        self.base.reset();
        self.ids.clear();
    }
}

/// Detached copy of an index's contents
///
/// Iteration is restartable and does not observe later index mutations.
#[derive(Debug, Clone)]
pub struct VectorSnapshot {
    ids: Vec<VectorId>,
    vectors: Array2<f32>,
}

impl VectorSnapshot {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    /// Lazily yield `(id, vector)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (VectorId, Vec<f32>)> + '_ {
        self.ids
            .iter()
            .copied()
            .zip(self.vectors.outer_iter().map(|row| row.to_vec()))
    }
}

impl<'a> IntoIterator for &'a VectorSnapshot {
    type Item = (VectorId, Vec<f32>);
    type IntoIter = Box<dyn Iterator<Item = (VectorId, Vec<f32>)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
