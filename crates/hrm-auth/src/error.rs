use axum::http::StatusCode;
use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::auth::credentials::SignInRejection;
use crate::response::ApiResponse;

/// Standard error type for the auth core.
#[derive(Debug, Error)]
pub enum HrmError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Validation errors")]
    ValidationErrors(Vec<FieldError>),

    /// An expected sign-in failure (bad password, locked, deactivated...).
    #[error("{0}")]
    SignInRejected(SignInRejection),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl HrmError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            HrmError::NotFound(_) => StatusCode::NOT_FOUND,
            HrmError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HrmError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            HrmError::Forbidden(_) => StatusCode::FORBIDDEN,
            HrmError::Conflict(_) => StatusCode::CONFLICT,
            HrmError::Validation(_) => StatusCode::BAD_REQUEST,
            HrmError::ValidationErrors(_) => StatusCode::BAD_REQUEST,
            HrmError::SignInRejected(rejection) => rejection.status_code(),
            HrmError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            HrmError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HrmError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            HrmError::NotFound(_) => "NOT_FOUND",
            HrmError::BadRequest(_) => "BAD_REQUEST",
            HrmError::Unauthorized(_) => "UNAUTHORIZED",
            HrmError::Forbidden(_) => "FORBIDDEN",
            HrmError::Conflict(_) => "CONFLICT",
            HrmError::Validation(_) => "VALIDATION_ERROR",
            HrmError::ValidationErrors(_) => "VALIDATION_ERROR",
            HrmError::SignInRejected(rejection) => rejection.error_code(),
            HrmError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            HrmError::Internal(_) => "INTERNAL_ERROR",
            HrmError::Database(_) => "DATABASE_ERROR",
        }
    }

    /// Message safe to show to the client. Infrastructure details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            HrmError::ValidationErrors(errs) => errs
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect::<Vec<_>>()
                .join("; "),
            HrmError::Internal(_) | HrmError::Database(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl HrmError {
    /// Map a unique-index violation to `Conflict(message)`; any other database
    /// error stays a `Database` error.
    pub fn conflict_on_unique(err: sea_orm::DbErr, message: impl Into<String>) -> Self {
        match err.sql_err() {
            Some(sea_orm::SqlErr::UniqueConstraintViolation(_)) => {
                HrmError::Conflict(message.into())
            }
            _ => HrmError::Database(err),
        }
    }
}

impl From<validator::ValidationErrors> for HrmError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<FieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid", field));
                    FieldError::with_code(field.to_string(), message, e.code.to_string())
                })
            })
            .collect();
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        HrmError::ValidationErrors(fields)
    }
}

/// Error detail for API responses.
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_locked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verification_required: Option<bool>,
}

/// Field-level validation error.
///
/// ```json
/// {
///   "field": "email",
///   "message": "must be a valid email address",
///   "code": "email"
/// }
/// ```
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl FieldError {
    /// Create a new field error with a code.
    pub fn with_code(
        field: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        FieldError {
            field: field.into(),
            message: message.into(),
            code: Some(code.into()),
        }
    }
}

impl axum::response::IntoResponse for HrmError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();

        match &self {
            HrmError::Internal(detail) => tracing::error!(error = %detail, "internal error"),
            HrmError::Database(err) => tracing::error!(error = %err, "database error"),
            _ => {}
        }

        let mut detail = ErrorDetail {
            code: self.error_code().to_string(),
            message: self.public_message(),
            ..Default::default()
        };

        match &self {
            HrmError::ValidationErrors(errs) => detail.fields = Some(errs.clone()),
            HrmError::SignInRejected(rejection) => {
                detail.account_locked = rejection.account_locked();
                detail.remaining_attempts = rejection.remaining_attempts();
                detail.locked_until = rejection.locked_until();
                detail.email_verification_required = rejection.email_verification_required();
            }
            _ => {}
        }

        let body: ApiResponse<()> = ApiResponse {
            success: false,
            data: None,
            error: Some(detail),
        };

        (status, axum::Json(body)).into_response()
    }
}
