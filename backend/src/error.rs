use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;

use crate::db::RepositoryError;
use crate::scan::ScanError;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Errors surfaced by HTTP handlers as `{ "error": … }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Image exceeds the {0} byte limit")]
    PayloadTooLarge(usize),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Scan(err) => match err {
                ScanError::Classification(_) | ScanError::Upload(_) => StatusCode::BAD_GATEWAY,
                ScanError::Persist(_) => StatusCode::INTERNAL_SERVER_ERROR,
                ScanError::AuthRequired => StatusCode::UNAUTHORIZED,
                ScanError::LocationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                ScanError::NotFound(_) => StatusCode::NOT_FOUND,
            },
            ApiError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            ApiError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed: {}", self);
        }
        HttpResponse::build(status).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn scan_errors_map_to_statuses() {
        let cases = [
            (ScanError::Classification("x".into()), StatusCode::BAD_GATEWAY),
            (ScanError::Upload("x".into()), StatusCode::BAD_GATEWAY),
            (ScanError::Persist("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (ScanError::AuthRequired, StatusCode::UNAUTHORIZED),
            (ScanError::LocationUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (ScanError::NotFound(Uuid::nil()), StatusCode::NOT_FOUND),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn oversized_upload_is_413() {
        let err = ApiError::PayloadTooLarge(1024);
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.to_string(), "Image exceeds the 1024 byte limit");
    }

    #[test]
    fn repository_errors_map_to_statuses() {
        assert_eq!(
            ApiError::from(RepositoryError::NotFound).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(RepositoryError::DynamoDb("throttled".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[actix_web::test]
    async fn body_carries_message() {
        let resp = ApiError::BadRequest("No image file provided.".into()).error_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "No image file provided.");
    }
}
