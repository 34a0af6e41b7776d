use crate::VectorId;

/// VitalEdge error types
#[derive(Debug, thiserror::Error)]
pub enum VectorDbError {
    /// Index dimension must be positive
    #[error("Invalid dimension: {0} (must be greater than zero)")]
    DimensionInvalid(usize),

    /// Vector length does not match the index dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Configured dimension differs from the dimension of stored data
    #[error("Dimension changed: stored index uses {stored}, configuration requests {configured}")]
    DimensionChanged { stored: usize, configured: usize },

    /// Vector id already present
    #[error("Duplicate vector id: {0}")]
    DuplicateId(VectorId),

    /// External id already used by another record
    #[error("Duplicate external id: {0}")]
    DuplicateExternalId(String),

    /// Id mapping can only be attached to an empty base index
    #[error("Cannot attach id mapping: base index already holds {0} vectors")]
    IndexNotEmpty(usize),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation requires at least one stored vector
    #[error("Index is empty")]
    EmptyIndex,

    /// Index file does not exist
    #[error("Index file missing: {0}")]
    IndexFileMissing(String),

    /// Index file could not be decoded
    #[error("Index file corrupt: {0}")]
    IndexCorrupt(String),

    /// Search returned ids without metadata
    #[error("Metadata desynchronized for vector ids {0:?}")]
    MetadataDesync(Vec<VectorId>),

    /// Deletion is disabled by policy
    #[error("Vector deletion is not supported by the current configuration")]
    DeletionUnsupported,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Engine already shut down
    #[error("Engine is closed")]
    EngineClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Metadata database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// General error (anyhow integration)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VectorDbError {
    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create index corruption error
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        Self::IndexCorrupt(msg.into())
    }

    /// File problems the persistence layer recovers from by starting empty
    pub fn is_recoverable_at_startup(&self) -> bool {
        matches!(self, Self::IndexFileMissing(_) | Self::IndexCorrupt(_))
    }
}

// HTTP response conversion
impl VectorDbError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            Self::DimensionInvalid(_) => 400,
            Self::DimensionMismatch { .. } => 400,
            Self::InvalidInput(_) => 400,
            Self::Json(_) => 400,
            Self::NotFound(_) => 404,
            Self::DeletionUnsupported => 405,
            Self::DuplicateId(_) => 409,
            Self::DuplicateExternalId(_) => 409,
            Self::IndexNotEmpty(_) => 409,
            Self::EmptyIndex => 409,
            Self::EngineClosed => 503,
            Self::DimensionChanged { .. } => 500,
            Self::IndexFileMissing(_) => 500,
            Self::IndexCorrupt(_) => 500,
            Self::MetadataDesync(_) => 500,
            Self::Config(_) => 500,
            Self::Io(_) => 500,
            Self::Database(_) => 500,
            Self::Other(_) => 500,
        }
    }
}
