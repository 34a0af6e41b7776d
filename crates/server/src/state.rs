use std::sync::Arc;
use vitaledge_common::{AppConfig, Result};
use vitaledge_sync::VectorDbService;

/// Shared application state
pub struct AppState {
    /// Synchronized vector database
    pub service: Arc<VectorDbService>,
}

impl AppState {
    /// Open the vector database described by `config`
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let service = VectorDbService::open(config).await?;

        Ok(Self {
            service: Arc::new(service),
        })
    }
}
