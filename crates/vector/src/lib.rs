//! VitalEdge Vector Index
//!
//! Exact L2 nearest-neighbor search over caller-identified embeddings,
//! with a checksummed binary file format.

mod flat;
pub mod format;
mod id_map;
mod index;
mod types;

pub use flat::FlatIndex;
pub use format::{persist, restore, write_atomic, IndexHeader, StoredIndex};
pub use id_map::IdMap;
pub use index::{VectorIndex, VectorSnapshot};
pub use types::{DeletionStrategy, IndexKind, Neighbor};
