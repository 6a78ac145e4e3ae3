use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;
use crate::study_plan::PlanError;

/// Failures visible at the HTTP boundary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InsufficientData(String),
    #[error("{0}")]
    Generation(String),
    #[error("{0}")]
    Database(String),
    /// A study plan was only partly saved.
    #[error("{detail}")]
    PlanIncomplete { saved: usize, detail: String },
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Conflict(_) | AppError::InsufficientData(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Generation(_)
            | AppError::Database(_)
            | AppError::PlanIncomplete { .. }
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to the caller. Database and internal faults are
    /// replaced by a generic string; the detail only reaches the log.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(_) => "Database error".to_string(),
            AppError::PlanIncomplete { saved, .. } => {
                format!("Database error after saving {saved} study goal(s)")
            }
            AppError::Internal(_) => "Internal Server Error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(message) => AppError::Conflict(message),
            StoreError::UnknownStudent(_) => AppError::NotFound("Student not found".to_string()),
            other => AppError::Database(other.to_string()),
        }
    }
}

impl From<PlanError> for AppError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::InsufficientData => AppError::InsufficientData(
                "Not enough performance data to generate a plan.".to_string(),
            ),
            PlanError::Generation(_) => AppError::Generation(format!(
                "Failed to generate study plan: {err}. Try again."
            )),
            PlanError::History(_) => AppError::Database(err.to_string()),
            PlanError::Database { ref saved, .. } => AppError::PlanIncomplete {
                saved: saved.len(),
                detail: err.to_string(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        }
        (status, Json(json!({ "message": self.public_message() }))).into_response()
    }
}
