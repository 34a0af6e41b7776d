pub mod config;
pub mod error;
pub mod logger;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::VectorDbError;
pub type Result<T> = std::result::Result<T, VectorDbError>;

/// Identifier shared by a vector and its metadata record
pub type VectorId = u64;
