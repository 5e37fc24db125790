//! Application error type and its HTTP mapping.
//!
//! Every handler returns `AppResult<_>`; nothing below the handler boundary
//! builds responses by hand.

use crate::auth::AuthError;
use crate::validation::FieldError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("database: {0}")]
    Database(#[from] DbErr),

    #[error("mail delivery: {0}")]
    Mail(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed on {} field(s)", .0.len())]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("aggregation failed: {0}")]
    Aggregate(#[source] DbErr),

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::Dependency(DependencyError::Database(err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(crate::validation::field_errors(&errors))
    }
}

impl AppError {
    /// `"<what> not found"`
    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("{what} not found"))
    }

    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn aggregate(err: DbErr) -> Self {
        AppError::Aggregate(err)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Auth(e) => e.status_code(),
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Aggregate(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Dependency(DependencyError::Database(DbErr::ConnectionAcquire(_))) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Dependency(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Auth(e) => e.error_type(),
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Aggregate(_) => "AGGREGATE_COMPUTATION_ERROR",
            AppError::Dependency(_) => "DEPENDENCY_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to hand to a client. Server-side failures are replaced by
    /// a generic sentence; the detail only goes to the log.
    fn public_message(&self) -> String {
        match self {
            AppError::Aggregate(_) => "Failed to compute statistics".to_string(),
            AppError::Dependency(_) => "A backing service failed".to_string(),
            AppError::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error_type: &'static str,
    pub message: String,
    pub correlation_id: String,
    pub status_code: u16,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

impl ErrorResponse {
    pub fn new(error_type: &'static str, message: String, status: StatusCode) -> Self {
        Self {
            error_type,
            message,
            correlation_id: Uuid::new_v4().to_string(),
            status_code: status.as_u16(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            details: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = ErrorResponse::new(self.error_type(), self.public_message(), status);

        if status.is_server_error() {
            tracing::error!(
                correlation_id = %body.correlation_id,
                error_type = body.error_type,
                error = %self,
                "request failed"
            );
        }
        tracing::Span::current().record("error", body.error_type);

        if let AppError::Validation(fields) = self {
            body.details = Some(fields);
        }

        (status, Json(body)).into_response()
    }
}
