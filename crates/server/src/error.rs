use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use std::fmt;
use vitaledge_common::VectorDbError;

use crate::types::ErrorResponse;

/// Service error carried to the HTTP boundary
#[derive(Debug)]
pub struct ApiError(pub VectorDbError);

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<VectorDbError> for ApiError {
    fn from(err: VectorDbError) -> Self {
        Self(err)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }

        HttpResponse::build(status).json(ErrorResponse {
            error: self.0.to_string(),
            status: status.as_u16(),
        })
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
