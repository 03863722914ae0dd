//! Custom error types for the application.
//!
//! This module defines the primary error type, `LabError`, for the entire application.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of errors that can occur, from configuration and I/O issues to
//! GPIB communication failures and database problems.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps `figment` errors raised while reading the configuration file or
//!   environment overrides.
//! - **`Configuration`**: Semantic errors in an otherwise well-formed configuration
//!   (a zero port, an empty VISA resource string, ...).
//! - **`NotConnected`** / **`Visa`** / **`Timeout`** / **`NoData`**: Instrument-side failures.
//!   `Visa` carries the numeric VISA status code so callers can tell a missing device apart
//!   from a bus error.
//! - **`Storage`** / **`Database`**: Failures writing CSV files or talking to SQLite.
//! - **`Auth`** / **`Forbidden`** / **`NotFound`** / **`Conflict`** / **`InvalidInput`**: Request
//!   level failures surfaced by the web API. Each maps to an HTTP status in the
//!   `ResponseError` implementation below.
//!
//! By using `#[from]`, `LabError` can be created from the underlying error types,
//! which keeps `?` usable throughout the crate.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, LabError>;

/// Status code VISA reports when a resource string names no attached device.
pub const VISA_ERROR_RESOURCE_NOT_FOUND: i32 = -1_073_807_343;

#[derive(Error, Debug)]
pub enum LabError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Instrument error: {0}")]
    Instrument(String),

    #[error("No connection to instrument.")]
    NotConnected,

    #[error("GPIB Communication Error [{code}]: {description}")]
    Visa { code: i32, description: String },

    #[error("Timed out waiting for instrument after {0} ms")]
    Timeout(u64),

    #[error("No data received")]
    NoData,

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<figment::Error> for LabError {
    fn from(value: figment::Error) -> Self {
        LabError::Config(Box::new(value))
    }
}

impl From<bcrypt::BcryptError> for LabError {
    fn from(value: bcrypt::BcryptError) -> Self {
        LabError::Auth(format!("password hashing failed: {value}"))
    }
}

impl From<jsonwebtoken::errors::Error> for LabError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        LabError::Auth(value.to_string())
    }
}

#[cfg(feature = "storage_csv")]
impl From<csv::Error> for LabError {
    fn from(value: csv::Error) -> Self {
        LabError::Storage(value.to_string())
    }
}

impl LabError {
    /// True for failures on the instrument side of the connection.
    pub fn is_instrument_error(&self) -> bool {
        matches!(
            self,
            LabError::Instrument(_)
                | LabError::NotConnected
                | LabError::Visa { .. }
                | LabError::Timeout(_)
                | LabError::NoData
        )
    }

    /// True when VISA reported that no device answers at the resource address.
    pub fn is_resource_not_found(&self) -> bool {
        matches!(self, LabError::Visa { code, .. } if *code == VISA_ERROR_RESOURCE_NOT_FOUND)
    }
}

impl ResponseError for LabError {
    fn status_code(&self) -> StatusCode {
        match self {
            LabError::Auth(_) => StatusCode::UNAUTHORIZED,
            LabError::Forbidden(_) => StatusCode::FORBIDDEN,
            LabError::NotFound(_) => StatusCode::NOT_FOUND,
            LabError::Conflict(_) => StatusCode::CONFLICT,
            LabError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            LabError::NotConnected
            | LabError::Visa { .. }
            | LabError::Instrument(_)
            | LabError::NoData => StatusCode::BAD_GATEWAY,
            LabError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            LabError::FeatureNotEnabled(_) => StatusCode::NOT_IMPLEMENTED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "status": "error",
            "message": self.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visa_error_formats_like_bus_report() {
        let err = LabError::Visa {
            code: -1_073_807_339,
            description: "Timeout expired before operation completed.".into(),
        };
        assert_eq!(
            err.to_string(),
            "GPIB Communication Error [-1073807339]: Timeout expired before operation completed."
        );
        assert!(err.is_instrument_error());
        assert!(!err.is_resource_not_found());
    }

    #[test]
    fn resource_not_found_is_detected() {
        let err = LabError::Visa {
            code: VISA_ERROR_RESOURCE_NOT_FOUND,
            description: "Insufficient location information".into(),
        };
        assert!(err.is_resource_not_found());
    }

    #[test]
    fn request_errors_map_to_http_status() {
        assert_eq!(
            LabError::Auth("bad token".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            LabError::Forbidden("admin only".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            LabError::NotFound("Measurement".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            LabError::Conflict("Email already exists".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(LabError::NotConnected.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(LabError::Timeout(10).status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn not_connected_message_matches_operator_text() {
        assert_eq!(
            LabError::NotConnected.to_string(),
            "No connection to instrument."
        );
    }
}
