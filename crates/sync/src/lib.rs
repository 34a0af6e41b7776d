//! VitalEdge Synchronization Service
//!
//! Keeps the vector index and the metadata store in agreement: one id space,
//! ordered cross-store writes with rollback, and startup recovery.

mod engine;
pub mod persistence;
mod types;

pub use engine::VectorDbService;
pub use types::{
    EngineHealth, EngineState, IndexStats, LoadOutcome, PopulateItem, PopulateReport,
    RebuildReport, SearchHit, SearchResults,
};
