//! Error types for rescuer-alarm
//!
//! Command-channel failures carry a stable [`ErrorCode`]; background failures
//! (subscription, playback) only ever surface as `Error` events.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for rescuer-alarm
#[derive(Error, Debug)]
pub enum Error {
    /// Bad input to a command
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Required platform grant missing
    #[error("Permission required: {0}")]
    PermissionDenied(String),

    /// Platform subsystem unavailable (audio, power, notifications)
    #[error("Platform error: {0}")]
    Platform(String),

    /// Generic start/stop failure of the background worker
    #[error("Service error: {0}")]
    Service(String),

    /// Change feed failure
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Alert sound failed to load or play
    #[error("Playback error: {0}")]
    Playback(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors bubbled up from rescuer-common
    #[error(transparent)]
    Common(#[from] rescuer_common::Error),
}

/// Convenience Result type using rescuer-alarm Error
pub type Result<T> = std::result::Result<T, Error>;

/// Stable error codes reported on the command channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidArgument,
    PermissionRequired,
    PlatformError,
    ServiceError,
    SubscriptionError,
    PlaybackError,
    NotImplemented,
}

impl Error {
    /// Command-channel code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Error::PermissionDenied(_) => ErrorCode::PermissionRequired,
            Error::Platform(_) => ErrorCode::PlatformError,
            Error::Subscription(_) => ErrorCode::SubscriptionError,
            Error::Playback(_) => ErrorCode::PlaybackError,
            Error::Service(_) | Error::Config(_) | Error::Io(_) | Error::Common(_) => {
                ErrorCode::ServiceError
            }
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Error::Platform(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: ErrorCode,
    message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
