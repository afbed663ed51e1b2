//! Maps [`DeployError`] onto HTTP status codes (spec section 7). This is
//! the only place in the crate that makes that decision — everything
//! below the transport stays error-taxonomy-typed, not status-coded.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::DeployError;

#[derive(Serialize)]
struct ErrorBody {
    errors: Vec<String>,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }
}

impl From<DeployError> for ApiError {
    fn from(e: DeployError) -> Self {
        let status = match &e {
            DeployError::Validation(_) => StatusCode::BAD_REQUEST,
            DeployError::NotFound | DeployError::Blacklisted => StatusCode::NOT_FOUND,
            DeployError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                errors: self.message.split("; ").map(str::to_string).collect(),
            }),
        )
            .into_response()
    }
}
