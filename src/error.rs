use opentelemetry_semantic_conventions::{attribute::OTEL_STATUS_CODE, trace::ERROR_TYPE};
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{Span, error, warn};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn log_and_record(&self, ctx: &str) {
        let current_span = Span::current();
        let is_valid_span = !current_span.is_none();

        let message = self.to_string();
        let error_kind = match self {
            AppError::Database(err) => {
                error!(error = %message, context = %ctx, db_error = %err, "Database error");
                "database_error"
            }
            AppError::NotFound(msg) => {
                warn!(message = %msg, context = %ctx, "Not found error");
                "not_found_error"
            }
            AppError::Validation(msg) => {
                warn!(message = %msg, context = %ctx, "Validation error");
                "validation_error"
            }
            AppError::Internal(msg) => {
                error!(message = %msg, context = %ctx, "Internal server error");
                "internal_error"
            }
        };

        if is_valid_span {
            current_span.record("error", tracing::field::display(true));
            current_span.record(ERROR_TYPE, tracing::field::display(error_kind));
            current_span.record("error.message", tracing::field::display(&message));

            if self.status_code() == Status::InternalServerError {
                current_span.record(OTEL_STATUS_CODE, tracing::field::display("ERROR"));
            }
        }
    }

    /// Only a missing row is distinguished; every other failure is a 500.
    pub fn status_code(&self) -> Status {
        match self {
            AppError::NotFound(_) => Status::NotFound,
            AppError::Database(_) | AppError::Validation(_) | AppError::Internal(_) => {
                Status::InternalServerError
            }
        }
    }

    pub fn to_response_with_log(&self, context: &str) -> Custom<Json<serde_json::Value>> {
        self.log_and_record(context);

        let body = match self {
            AppError::NotFound(msg) => json!({ "message": msg }),
            other => json!({ "error": other.to_string() }),
        };

        Custom(self.status_code(), Json(body))
    }
}

impl<'r> rocket::response::Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &'r rocket::Request<'_>) -> rocket::response::Result<'static> {
        self.to_response_with_log(&format!("Request to {} {}", req.method(), req.uri()))
            .respond_to(req)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {}", error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::NotFound("Coach not found".into()).status_code(),
            Status::NotFound
        );
        assert_eq!(
            AppError::Validation("satisfaction_score".into()).status_code(),
            Status::InternalServerError
        );
        assert_eq!(
            AppError::Database(sqlx::Error::RowNotFound).status_code(),
            Status::InternalServerError
        );
    }

    #[test]
    fn test_response_bodies() {
        let not_found = AppError::NotFound("Slot not found".into()).to_response_with_log("test");
        assert_eq!(not_found.0, Status::NotFound);
        assert_eq!((not_found.1).0, json!({ "message": "Slot not found" }));

        let internal = AppError::Internal("boom".into()).to_response_with_log("test");
        assert_eq!(internal.0, Status::InternalServerError);
        assert_eq!((internal.1).0, json!({ "error": "Internal error: boom" }));
    }
}
