use axum::http::StatusCode;
use chrono::NaiveDate;

/// Failures surfaced by the room, check-in and reconciliation layers.
/// None of them end the session; callers report them and carry on.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("room not found: {0}")]
    NotFound(String),

    #[error("room code already taken: {0}")]
    Conflict(String),

    #[error("backend rejected write: {0}")]
    Write(String),

    #[error("realtime subscription failed: {0}")]
    Subscription(String),

    #[error("invalid room code: {0:?}")]
    InvalidCode(String),

    #[error("invalid nickname: {0:?}")]
    InvalidNickname(String),

    #[error("{0} is outside the tracked period")]
    OutOfPeriod(NaiveDate),

    #[error("not in a room")]
    NotJoined,

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        let status = match &err {
            SyncError::NotFound(_) => StatusCode::NOT_FOUND,
            SyncError::Conflict(_) => StatusCode::CONFLICT,
            SyncError::Write(_) => StatusCode::BAD_GATEWAY,
            SyncError::Subscription(_) => StatusCode::SERVICE_UNAVAILABLE,
            SyncError::InvalidCode(_)
            | SyncError::InvalidNickname(_)
            | SyncError::OutOfPeriod(_)
            | SyncError::NotJoined => StatusCode::BAD_REQUEST,
            SyncError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }

        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}
