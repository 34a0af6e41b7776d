use actix_web::{get, post, web, HttpResponse};
use std::sync::Arc;
use tracing::info;

use crate::error::ApiResult;
use crate::state::AppState;
use crate::types::{MetadataQuery, SuccessResponse};

#[get("/health")]
pub async fn health(state: web::Data<Arc<AppState>>) -> ApiResult<HttpResponse> {
    let health = state.service.health().await?;

    let response = if health.is_healthy() {
        HttpResponse::Ok().json(health)
    } else {
        HttpResponse::ServiceUnavailable().json(health)
    };
    Ok(response)
}

#[get("/metadata")]
pub async fn metadata(
    query: web::Query<MetadataQuery>,
    state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let records = state.service.list_records(query.category.as_deref()).await?;
    Ok(HttpResponse::Ok().json(records))
}

#[get("/tags")]
pub async fn tags(state: web::Data<Arc<AppState>>) -> ApiResult<HttpResponse> {
    let tags = state.service.list_tags().await?;
    Ok(HttpResponse::Ok().json(tags))
}

#[get("/stats")]
pub async fn stats(state: web::Data<Arc<AppState>>) -> ApiResult<HttpResponse> {
    let stats = state.service.stats().await?;
    Ok(HttpResponse::Ok().json(stats))
}

#[post("/reset")]
pub async fn reset(state: web::Data<Arc<AppState>>) -> ApiResult<HttpResponse> {
    info!("Database reset requested");
    state.service.reset().await?;

    Ok(HttpResponse::Ok().json(SuccessResponse {
        success: true,
        message: Some("Vector database reset".to_string()),
    }))
}
