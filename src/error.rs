use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Errors surfaced by the HTTP layer.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    UnprocessableEntity(String),
    #[error("{0}")]
    Dependency(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::UnprocessableEntity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Dependency(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Failures raised by the billing core.
///
/// `Configuration` and `Validation` abort a single bill or apartment and are
/// collected by the batch; `Persistence` and `CommitFailed` are fatal for a run.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate bill: {0}")]
    Duplicate(String),
    #[error("bill commit failed, batch rolled back: {message}")]
    CommitFailed {
        message: String,
        apartment_errors: Vec<String>,
    },
}

impl From<BillingError> for AppError {
    fn from(error: BillingError) -> Self {
        match error {
            BillingError::Configuration(_) | BillingError::Validation(_) => {
                AppError::UnprocessableEntity(error.to_string())
            }
            BillingError::NotFound(message) => AppError::NotFound(message),
            BillingError::Duplicate(_) => AppError::Conflict(error.to_string()),
            BillingError::Persistence(_) => AppError::Dependency(error.to_string()),
            BillingError::CommitFailed {
                ref apartment_errors,
                ..
            } => {
                let mut detail = error.to_string();
                if !apartment_errors.is_empty() {
                    detail.push_str(&format!(
                        " ({} apartment errors before commit: {})",
                        apartment_errors.len(),
                        apartment_errors.join("; ")
                    ));
                }
                AppError::Dependency(detail)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use super::{AppError, BillingError};

    #[test]
    fn maps_billing_errors_to_http_statuses() {
        let cases = [
            (
                BillingError::Configuration("missing price".to_string()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                BillingError::Validation("bad month".to_string()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                BillingError::NotFound("apartment 9 not found".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                BillingError::Duplicate("MF-A101-202412".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                BillingError::Persistence("timeout".to_string()),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (error, expected) in cases {
            let response = AppError::from(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn commit_failure_keeps_apartment_errors_in_detail() {
        let error = BillingError::CommitFailed {
            message: "connection reset".to_string(),
            apartment_errors: vec!["Apartment A-101: no resident".to_string()],
        };
        let app_error = AppError::from(error);
        let detail = app_error.to_string();
        assert!(detail.contains("connection reset"));
        assert!(detail.contains("Apartment A-101: no resident"));
    }
}
