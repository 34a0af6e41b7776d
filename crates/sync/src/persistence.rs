//! Index load/save discipline
//!
//! Startup never fails on a missing or unreadable index file: the engine
//! comes up empty and the condition is logged. Only a dimension conflict
//! with stored data is fatal.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};
use vitaledge_common::{Result, VectorDbError, VectorId};
use vitaledge_metadata::MetadataStore;
use vitaledge_vector::{FlatIndex, StoredIndex, VectorIndex};

use crate::types::LoadOutcome;

/// Load the index at `path`, recovering from file problems
pub async fn load_index(
    path: &Path,
    dimension: usize,
    metadata: &dyn MetadataStore,
) -> Result<(VectorIndex, LoadOutcome)> {
    let owned = path.to_path_buf();
    // A restore that panics on a malformed file counts as corruption
    let restored = tokio::task::spawn_blocking(move || vitaledge_vector::restore(&owned))
        .await
        .unwrap_or_else(|e| Err(VectorDbError::corrupt(format!("restore task failed: {}", e))));

    match restored {
        Ok(stored) => {
            if stored.dimension() != dimension {
                return Err(VectorDbError::DimensionChanged {
                    stored: stored.dimension(),
                    configured: dimension,
                });
            }

            match stored {
                StoredIndex::Mapped(index) => Ok((index, LoadOutcome::Restored)),
                StoredIndex::Flat(flat) => adopt_flat(flat, path, metadata).await,
            }
        }
        Err(e) if e.is_recoverable_at_startup() => {
            let outcome = match e {
                VectorDbError::IndexFileMissing(_) => {
                    info!("No index file at {}, starting empty", path.display());
                    LoadOutcome::CreatedEmpty
                }
                _ => {
                    warn!(
                        "Index file {} could not be restored ({}), starting empty; metadata left untouched. \
                         New ids collide with stored records until POST /admin/reset clears them",
                        path.display(),
                        e
                    );
                    LoadOutcome::RecoveredEmpty
                }
            };
            Ok((VectorIndex::new(dimension)?, outcome))
        }
        Err(e) => Err(e),
    }
}

/// Turn a bare index file into a mapped index
///
/// An empty base takes the mapping directly. A populated one cannot be
/// re-wrapped, so a mapped index is rebuilt from its vectors paired in order
/// with the metadata ids.
async fn adopt_flat(
    flat: FlatIndex,
    path: &Path,
    metadata: &dyn MetadataStore,
) -> Result<(VectorIndex, LoadOutcome)> {
    let dimension = flat.dimension();
    let vectors: Vec<Vec<f32>> = flat
        .as_array()
        .outer_iter()
        .map(|row| row.to_vec())
        .collect();

    match VectorIndex::attach(flat) {
        Ok(index) => return Ok((index, LoadOutcome::CreatedEmpty)),
        Err(VectorDbError::IndexNotEmpty(count)) => {
            warn!(
                "Bare index with {} vectors found at {}, rebuilding id mapping from metadata",
                count,
                path.display()
            );
        }
        Err(e) => return Err(e),
    }

    let ids: Vec<VectorId> = metadata.record_ids().await?;
    if ids.len() != vectors.len() {
        error!(
            "Cannot rebuild index: {} vectors on disk but {} metadata records, starting empty",
            vectors.len(),
            ids.len()
        );
        return Ok((VectorIndex::new(dimension)?, LoadOutcome::RecoveredEmpty));
    }

    let mut index = VectorIndex::new(dimension)?;
    index.add_with_ids(&vectors, &ids)?;
    save_index(&index, path).await?;

    info!("Rebuilt mapped index with {} vectors", index.len());
    Ok((index, LoadOutcome::RebuiltFromMetadata))
}

/// Persist `index` to `path` atomically off the async runtime
pub async fn save_index(index: &VectorIndex, path: &Path) -> Result<()> {
    let bytes = index.to_bytes()?;
    let path: PathBuf = path.to_path_buf();

    tokio::task::spawn_blocking(move || vitaledge_vector::write_atomic(&path, &bytes))
        .await
        .map_err(|e| anyhow::anyhow!("Index persist task failed: {}", e))?
}
