use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;

use super::parse_body;
use crate::error::AppError;
use crate::state::{AppState, RunRequest};

/// POST /api/run — queue a report run. Only one run may wait at a time.
pub async fn start_run(State(app): State<AppState>, body: Bytes) -> Result<StatusCode, AppError> {
    let req: RunRequest = parse_body(&body)?;
    let req = RunRequest {
        date: req.date.trim().to_string(),
        repo_path: req.repo_path.trim().to_string(),
        author: req.author.trim().to_string(),
    };
    if req.date.is_empty() {
        return Err(AppError::bad_request("date is required"));
    }
    let date = req.date.clone();
    if !app.try_queue_run(req) {
        return Err(AppError::conflict("run already in progress"));
    }
    app.board.reset(&date, "");
    tracing::info!(date = %date, "run queued");
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/send — post the current report to Slack.
pub async fn send(State(app): State<AppState>) -> Result<StatusCode, AppError> {
    let Some(slack) = app.services.slack.as_ref() else {
        return Err(AppError::bad_request("send not configured"));
    };
    if app.services.debug {
        app.board.log("Debug mode: skipping Slack send");
        return Ok(StatusCode::NO_CONTENT);
    }
    let report = app.board.report();
    slack.client.send_markdown(&slack.config, &report).await?;
    app.board.log("Report sent to Slack");
    Ok(StatusCode::NO_CONTENT)
}
