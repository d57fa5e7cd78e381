//! API Routes
//!
//! - `/api/diagnose` - Upload a leaf photo and run the pipeline
//! - `/api/reports/{id}` - Fetch a finished report (JSON, PDF or JSON download)
//! - `/api/health` - Health checks

pub mod diagnose;
pub mod health;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use tracing::{error, info, warn};

use crate::middleware::apply_cors;
use crate::models::{AppState, ErrorResponse};
use crate::types::AppError;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let origins = state.config.server.cors_allowed_origins.clone();

    let api_router = Router::new()
        .merge(diagnose::router(state.clone()))
        .merge(health::router(state));

    apply_cors(api_router, &origins)
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InputRejected(_) => StatusCode::BAD_REQUEST,
            AppError::CapabilityUnavailable(_) | AppError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
            AppError::ValidationFailure(_) | AppError::Export(_) | AppError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(kind = %self.kind(), error = %self, "Request failed");
        } else {
            warn!(kind = %self.kind(), error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            error: self.kind(),
            message: self.user_message(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::InputRejected("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::CapabilityUnavailable("x".into()).status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(AppError::MalformedResponse("x".into()).status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            AppError::ValidationFailure("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
