use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use md2slack_core::Md2SlackError;

// ---------------------------------------------------------------------------
// Status sentinels
// ---------------------------------------------------------------------------

/// Carries an explicit HTTP status through the `anyhow::Error` chain.
#[derive(Debug)]
struct StatusError {
    status: StatusCode,
    message: String,
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StatusError {}

// ---------------------------------------------------------------------------
// AppError — unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses. Renders `{"error": message}`.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn with_status(status: StatusCode, msg: impl Into<String>) -> Self {
        Self(
            StatusError {
                status,
                message: msg.into(),
            }
            .into(),
        )
    }

    /// 400 Bad Request.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, msg)
    }

    /// 409 Conflict.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CONFLICT, msg)
    }

    /// 501 Not Implemented, for features the server was started without.
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_IMPLEMENTED, msg)
    }

    pub fn status(&self) -> StatusCode {
        if let Some(s) = self.0.downcast_ref::<StatusError>() {
            return s.status;
        }
        match self.0.downcast_ref::<Md2SlackError>() {
            Some(Md2SlackError::RepoPathRequired) => StatusCode::BAD_REQUEST,
            Some(Md2SlackError::TaskNotFound(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_map_to_their_status() {
        assert_eq!(AppError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::not_implemented("x").status(),
            StatusCode::NOT_IMPLEMENTED
        );
    }

    #[test]
    fn core_errors_map_by_kind() {
        let e = AppError::from(Md2SlackError::RepoPathRequired);
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
        let e = AppError::from(Md2SlackError::TaskNotFound("t1".into()));
        assert_eq!(e.status(), StatusCode::NOT_FOUND);
        let e = AppError::from(anyhow::anyhow!("boom"));
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn message_is_preserved() {
        let e = AppError::conflict("run already in progress");
        assert_eq!(e.0.to_string(), "run already in progress");
    }
}
