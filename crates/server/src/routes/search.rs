use actix_web::{post, web, HttpResponse};
use std::sync::Arc;

use crate::error::ApiResult;
use crate::state::AppState;
use crate::types::{BulkSearchRequest, SearchRequest, SearchResponse};

#[post("/search")]
pub async fn search(
    req: web::Json<SearchRequest>,
    state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let results = state
        .service
        .search_vectors(&req.query_vector, req.top_k)
        .await?;

    Ok(HttpResponse::Ok().json(SearchResponse::from(results)))
}

#[post("/search/bulk")]
pub async fn bulk_search(
    req: web::Json<BulkSearchRequest>,
    state: web::Data<Arc<AppState>>,
) -> ApiResult<HttpResponse> {
    let responses: Vec<SearchResponse> = state
        .service
        .bulk_search(&req.query_vectors, req.top_k)
        .await?
        .into_iter()
        .map(SearchResponse::from)
        .collect();

    Ok(HttpResponse::Ok().json(responses))
}
