pub mod chat;
pub mod git;
pub mod run;
pub mod settings;
pub mod state;
pub mod tasks;

use axum::body::Bytes;
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// Decode a JSON request body. Any malformed body is a 400 `invalid json`.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|_| AppError::bad_request("invalid json"))
}

/// Join a blocking task, flattening the join error into [`AppError`].
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let out = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    Ok(out)
}
