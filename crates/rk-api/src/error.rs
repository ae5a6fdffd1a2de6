//! # ApiError
//!
//! Maps `AppError` onto HTTP responses. Every error body has the shape
//! `{"error": "<message>"}`.

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use rk_core::AppError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
#[error(transparent)]
pub struct ApiError(#[from] pub AppError);

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(..) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Internal details were logged where they happened.
        let message = match &self.0 {
            AppError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "error": message }))
    }
}

/// Turns extractor failures (bad JSON, bad query strings) into 400s with the
/// usual error body.
pub fn bad_request(err: impl std::fmt::Display, _req: &HttpRequest) -> actix_web::Error {
    ApiError(AppError::ValidationError(format!("malformed request: {err}"))).into()
}
