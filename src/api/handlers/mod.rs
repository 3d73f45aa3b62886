pub mod sessions;
pub mod system;

pub use sessions::*;
pub use system::*;

use axum::http::StatusCode;

use crate::error::VigilError;

/// Map a service error onto an HTTP status
pub(crate) fn error_response(err: VigilError) -> (StatusCode, String) {
    let status = match &err {
        VigilError::InvalidSpec(_) | VigilError::Json(_) => StatusCode::BAD_REQUEST,
        VigilError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        VigilError::NotAccepting => StatusCode::SERVICE_UNAVAILABLE,
        VigilError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}
