use actix_web::{delete, get, post, web, HttpResponse};
use std::sync::Arc;
use tracing::info;
use vitaledge_common::VectorId;
use vitaledge_sync::PopulateItem;

use crate::error::ApiResult;
use crate::state::AppState;
use crate::types::{
    AddVectorResponse, ExportedVector, PopulateRequest, PopulateResponse, VectorResponse,
};

#[post("/vectors")]
pub async fn add_vector(
    req: web::Json<PopulateItem>,
    state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let PopulateItem { embedding, metadata } = req.into_inner();
    let id = state.service.add_vector(embedding, metadata).await?;

    Ok(HttpResponse::Created().json(AddVectorResponse { id }))
}

#[get("/vectors/export")]
pub async fn export_vectors(state: web::Data<Arc<AppState>>) -> ApiResult<HttpResponse> {
    let snapshot = state.service.get_all_vectors().await?;
    let vectors: Vec<ExportedVector> = snapshot
        .iter()
        .map(|(id, embedding)| ExportedVector { id, embedding })
        .collect();

    info!("Exported {} vectors", vectors.len());
    Ok(HttpResponse::Ok().json(vectors))
}

#[get("/vectors/{id}")]
pub async fn get_vector(
    path: web::Path<VectorId>,
    state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let (embedding, metadata) = state.service.get_entry(id).await?;

    Ok(HttpResponse::Ok().json(VectorResponse {
        id,
        embedding,
        metadata,
    }))
}

#[delete("/vectors/{id}")]
pub async fn delete_vector(
    path: web::Path<VectorId>,
    state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let report = state.service.delete_vector(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(report))
}

#[post("/populate")]
pub async fn populate(
    req: web::Json<PopulateRequest>,
    state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let items = req.into_inner().items;
    info!("Populate requested with {} items", items.len());

    let report = state.service.bulk_populate(items).await?;
    Ok(HttpResponse::Ok().json(PopulateResponse::from(report)))
}
