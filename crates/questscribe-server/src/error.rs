//! Error types for the command surface.
//!
//! [`ApiError`] unifies tracker, persistence, and request-parsing failures
//! into one enum that converts into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation. The body
//! is always `{"error": ..., "kind": ..., "status": ...}`.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use questscribe_persist::PersistError;
use questscribe_tracker::TrackerError;
use questscribe_types::ValidationError;

/// Errors returned by command handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The addressed entity or marker does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request was malformed or violated an input rule.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A project file had invalid contents.
    #[error("format error: {0}")]
    Format(String),

    /// A project file could not be read or written.
    #[error("I/O error: {0}")]
    Io(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Stable machine-readable name of the error class.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::Format(_) => "format",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }

    /// HTTP status for this error class.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Format(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Io(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        match &err {
            TrackerError::EntityNotFound(_) | TrackerError::MarkerNotFound(_) => {
                Self::NotFound(err.to_string())
            }
            TrackerError::Validation(inner) => Self::Validation(inner.to_string()),
            TrackerError::DuplicateEntity(_)
            | TrackerError::DuplicateMarker(_)
            | TrackerError::DanglingMarker { .. } => Self::Format(err.to_string()),
        }
    }
}

impl From<PersistError> for ApiError {
    fn from(err: PersistError) -> Self {
        match &err {
            PersistError::Io { .. } => Self::Io(err.to_string()),
            PersistError::Format(_) | PersistError::UnsupportedVersion(_) => {
                Self::Format(err.to_string())
            }
            PersistError::Serialization(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use questscribe_types::EntityId;

    use super::*;

    #[test]
    fn tracker_errors_map_to_status_codes() {
        let missing = ApiError::from(TrackerError::EntityNotFound(EntityId::new()));
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.kind(), "not_found");

        let invalid = ApiError::from(TrackerError::Validation(ValidationError::EmptyName));
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn persist_errors_map_to_status_codes() {
        let format = ApiError::from(PersistError::UnsupportedVersion(9));
        assert_eq!(format.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let io = ApiError::from(PersistError::io(
            "/nowhere",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        ));
        assert_eq!(io.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(io.kind(), "io");
    }
}
