//! VitalEdge HTTP Server
//!
//! Actix-web JSON adapter over the synchronized vector database

pub mod error;
pub mod routes;
pub mod state;
pub mod types;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tracing::info;
use tracing_actix_web::TracingLogger;
use vitaledge_common::{AppConfig, Result};

pub use state::AppState;

/// Request bodies up to 64 MiB (bulk populate payloads)
const JSON_LIMIT: usize = 64 * 1024 * 1024;

/// Open the database and serve until shutdown, then close it
pub async fn start_server(config: AppConfig) -> Result<()> {
    let bind_addr = config.server_bind_address();
    let state = Arc::new(AppState::new(&config).await?);

    info!("Starting HTTP server on {}", bind_addr);

    let data = web::Data::new(state.clone());
    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(Cors::permissive())
            .app_data(data.clone())
            .app_data(web::JsonConfig::default().limit(JSON_LIMIT))
            .configure(routes::configure)
    })
    .bind(&bind_addr)?
    .run()
    .await?;

    info!("HTTP server stopped, closing vector database");
    state.service.close().await
}
