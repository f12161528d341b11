use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Missing authentication credentials: {0}")]
    MissingCredentials(String),

    #[error("Session expired. Please re-authenticate.")]
    SessionExpired,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{}", upstream_message(*status, body))]
    Upstream { status: Option<u16>, body: String },

    #[error("Unexpected response from Connect+: {0}")]
    UnexpectedResponse(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

fn upstream_message(status: Option<u16>, body: &str) -> String {
    match status {
        Some(code) => format!("API request failed: {code} - {body}"),
        None => format!("API request failed: {body}"),
    }
}

impl AppError {
    /// Machine-readable error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::MissingCredentials(_) => "missing_credentials",
            AppError::SessionExpired => "session_expired",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::Upstream { .. } => "upstream_error",
            AppError::UnexpectedResponse(_) => "unexpected_response",
            AppError::LlmError(_) => "llm_error",
            AppError::Cancelled => "cancelled",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// True for failures that mean the caller must supply fresh credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            AppError::MissingCredentials(_) | AppError::SessionExpired
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingCredentials(_) | AppError::SessionExpired => StatusCode::UNAUTHORIZED,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream { .. }
            | AppError::UnexpectedResponse(_)
            | AppError::LlmError(_)
            | AppError::Cancelled
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), "request failed: {self}");
        } else {
            tracing::warn!(code = self.error_code(), "request rejected: {self}");
        }

        let mut response = (status, self.to_string()).into_response();
        response.headers_mut().insert(
            "x-error-code",
            HeaderValue::from_static(self.error_code()),
        );
        response
    }
}
