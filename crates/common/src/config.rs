use crate::error::VectorDbError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// VitalEdge application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Embedding dimension (fixed for the lifetime of the index)
    pub embedding_dim: usize,

    /// Binary vector index file path
    pub index_path: PathBuf,

    /// SQLite metadata database path
    pub metadata_path: PathBuf,

    /// Enable rebuild-based vector deletion
    pub allow_rebuild_delete: bool,

    /// Server bind address
    pub server_host: String,

    /// Server port
    pub server_port: u16,

    /// Log directory
    pub log_dir: PathBuf,

    /// Log level
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 384,
            index_path: PathBuf::from("./data/faiss_index"),
            metadata_path: PathBuf::from("./data/metadata.db"),
            allow_rebuild_delete: false,
            server_host: "0.0.0.0".to_string(),
            server_port: 8000,
            log_dir: PathBuf::from("./logs"),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self, VectorDbError> {
        // Load .env file (ignore if not exists)
        let _ = dotenv::dotenv();

        let embedding_dim = match std::env::var("EMBEDDING_DIM") {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                VectorDbError::config(format!("EMBEDDING_DIM must be an integer, got '{}'", raw))
            })?,
            Err(_) => 384,
        };

        let config = Self {
            embedding_dim,
            index_path: Self::get_env_path("VECTOR_DB_PATH")
                .unwrap_or_else(|| PathBuf::from("./data/faiss_index")),
            metadata_path: Self::get_env_path("SQLITE_DB_PATH")
                .unwrap_or_else(|| PathBuf::from("./data/metadata.db")),
            allow_rebuild_delete: std::env::var("ALLOW_REBUILD_DELETE")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            server_host: std::env::var("SERVER_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: std::env::var("SERVER_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8000),
            log_dir: Self::get_env_path("LOG_DIR")
                .unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: std::env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "info".to_string()),
        };

        config.validate()?;
        config.ensure_directories()?;

        Ok(config)
    }

    /// Get PathBuf from environment variable
    fn get_env_path(key: &str) -> Option<PathBuf> {
        std::env::var(key).ok().map(PathBuf::from)
    }

    /// Ensure data and log directories exist, create if not
    pub fn ensure_directories(&self) -> Result<(), VectorDbError> {
        let dirs = [
            self.index_path.parent(),
            self.metadata_path.parent(),
            Some(self.log_dir.as_path()),
        ];

        for dir in dirs.into_iter().flatten() {
            if dir.as_os_str().is_empty() || dir.exists() {
                continue;
            }
            std::fs::create_dir_all(dir).map_err(|e| {
                VectorDbError::config(format!(
                    "Failed to create directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        Ok(())
    }

    /// Get server bind address (host:port)
    pub fn server_bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), VectorDbError> {
        if self.embedding_dim == 0 {
            return Err(VectorDbError::DimensionInvalid(self.embedding_dim));
        }

        if is_blank(&self.index_path) {
            return Err(VectorDbError::config("Index path cannot be empty"));
        }

        if is_blank(&self.metadata_path) {
            return Err(VectorDbError::config("Metadata path cannot be empty"));
        }

        if self.server_port == 0 {
            return Err(VectorDbError::config("Server port cannot be 0"));
        }

        Ok(())
    }
}

fn is_blank(path: &Path) -> bool {
    path.as_os_str().is_empty()
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
