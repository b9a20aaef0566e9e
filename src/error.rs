use thiserror::Error;

/// Errors produced by the ledger, the file store and the sync client.
///
/// Every variant carries the human readable message that ends up in the
/// `{"message": ...}` body of an API response.
#[derive(Error, Debug)]
pub enum FinError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt ledger file: {0}")]
    Codec(#[from] bincode::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("server request failed: {0}")]
    Transport(String),

    #[error("client is offline")]
    Offline,
}

pub type Result<T> = std::result::Result<T, FinError>;

impl FinError {
    pub fn validation(msg: impl Into<String>) -> Self {
        FinError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        FinError::NotFound(msg.into())
    }

    /// True for failures worth retrying later, i.e. the server could not be reached.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, FinError::Transport(_) | FinError::Offline)
    }
}

#[cfg(feature = "web")]
mod response {
    use super::FinError;
    use axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    };

    impl FinError {
        pub fn status(&self) -> StatusCode {
            match self {
                FinError::Validation(_) | FinError::Json(_) | FinError::Csv(_) => {
                    StatusCode::BAD_REQUEST
                }
                FinError::Conflict(_) => StatusCode::CONFLICT,
                FinError::NotFound(_) => StatusCode::NOT_FOUND,
                FinError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                FinError::Offline | FinError::Transport(_) => StatusCode::BAD_GATEWAY,
                FinError::Io(_) | FinError::Codec(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }
    }

    impl IntoResponse for FinError {
        fn into_response(self) -> Response {
            let status = self.status();
            if status.is_server_error() {
                log::error!("request failed: {}", self);
            }
            (status, Json(serde_json::json!({ "message": self.to_string() }))).into_response()
        }
    }
}
