use serde::{Deserialize, Serialize};
use vitaledge_common::VectorId;
use vitaledge_metadata::VectorRecord;
use vitaledge_sync::{PopulateItem, PopulateReport, SearchHit, SearchResults};

fn default_top_k() -> usize {
    5
}

/// Bulk populate request
#[derive(Debug, Deserialize)]
pub struct PopulateRequest {
    pub items: Vec<PopulateItem>,
}

/// Similarity search request
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query_vector: Vec<f32>,

    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

/// Several searches answered together
#[derive(Debug, Deserialize)]
pub struct BulkSearchRequest {
    pub query_vectors: Vec<Vec<f32>>,

    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

/// Metadata listing filter
#[derive(Debug, Deserialize)]
pub struct MetadataQuery {
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AddVectorResponse {
    pub id: VectorId,
}

#[derive(Debug, Serialize)]
pub struct VectorResponse {
    pub id: VectorId,
    pub embedding: Vec<f32>,
    pub metadata: VectorRecord,
}

/// One entry of a vector export
#[derive(Debug, Serialize)]
pub struct ExportedVector {
    pub id: VectorId,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
pub struct PopulateFailure {
    /// Position of the item in the request
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct PopulateResponse {
    pub added: Vec<VectorId>,
    pub failed: Vec<PopulateFailure>,
}

impl From<PopulateReport> for PopulateResponse {
    fn from(report: PopulateReport) -> Self {
        let failed = report
            .failed()
            .into_iter()
            .map(|(index, e)| PopulateFailure {
                index,
                error: e.to_string(),
            })
            .collect();

        Self {
            added: report.succeeded(),
            failed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResultItem {
    pub id: VectorId,
    pub distance: f32,

    /// `null` when the record is missing from the metadata store
    pub metadata: Option<VectorRecord>,
}

impl From<SearchHit> for SearchResultItem {
    fn from(hit: SearchHit) -> Self {
        Self {
            id: hit.id,
            distance: hit.distance,
            metadata: hit.record,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResultItem>,

    /// Ids found in the index without a metadata record
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<VectorId>,
}

impl From<SearchResults> for SearchResponse {
    fn from(results: SearchResults) -> Self {
        Self {
            results: results.hits.into_iter().map(SearchResultItem::from).collect(),
            missing: results.missing,
        }
    }
}

/// Generic success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: u16,
}
