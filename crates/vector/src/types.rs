use serde::{Deserialize, Serialize};
use vitaledge_common::VectorId;

/// Nearest-neighbor search hit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Caller-assigned vector id
    pub id: VectorId,

    /// Squared L2 distance to the query
    pub distance: f32,
}

impl Neighbor {
    pub fn new(id: VectorId, distance: f32) -> Self {
        Self { id, distance }
    }
}

/// How an index reclaims storage when vectors are removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionStrategy {
    /// Removed entries are masked; surviving positions are untouched
    Tombstone,

    /// Storage is compacted; every position after a removed entry shifts down
    Compact,
}

impl DeletionStrategy {
    /// Whether surviving entries keep their positions after a removal
    pub fn preserves_ids(self) -> bool {
        matches!(self, Self::Tombstone)
    }
}

/// Layout of an index file on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Bare exact-search structure with positional ids
    Flat,

    /// Exact-search structure with a caller-id mapping
    Mapped,
}

impl IndexKind {
    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::Flat => 0,
            Self::Mapped => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Flat),
            1 => Some(Self::Mapped),
            _ => None,
        }
    }
}
