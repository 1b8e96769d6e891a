//! Maps `BrainError` onto HTTP responses for the Turn API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use brain_types::BrainError;
use serde_json::json;

pub struct ApiError(pub BrainError);

impl From<BrainError> for ApiError {
    fn from(err: BrainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BrainError::Validation(_) => StatusCode::BAD_REQUEST,
            BrainError::NotFound(_) => StatusCode::NOT_FOUND,
            BrainError::Eligibility(_) | BrainError::Unauthorized(_) => StatusCode::FORBIDDEN,
            BrainError::Conflict(_) => StatusCode::CONFLICT,
            BrainError::ExternalTransient(_) | BrainError::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "error": self.0.kind(), "message": self.0.to_string() }));
        (status, body).into_response()
    }
}
