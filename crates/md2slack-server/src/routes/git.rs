use std::path::PathBuf;

use axum::extract::Query;
use axum::Json;
use md2slack_core::gitdiff::{git_graph, recent_commit_days};
use serde::Deserialize;

use super::blocking;
use crate::error::AppError;

const ACTIVITY_DAYS: u32 = 30;
const GRAPH_LIMIT: usize = 150;

#[derive(Deserialize)]
pub struct PathQuery {
    #[serde(default)]
    pub path: String,
}

impl PathQuery {
    fn required(&self) -> Result<PathBuf, AppError> {
        let path = self.path.trim();
        if path.is_empty() {
            return Err(AppError::bad_request("path is required"));
        }
        Ok(PathBuf::from(path))
    }
}

/// GET /api/recent-activity — days with commits in the last month.
pub async fn recent_activity(Query(q): Query<PathQuery>) -> Result<Json<serde_json::Value>, AppError> {
    let path = q.required()?;
    let dates = blocking(move || Ok(recent_commit_days(&path, ACTIVITY_DAYS)?)).await?;
    Ok(Json(serde_json::json!({ "dates": dates })))
}

/// GET /api/git-graph — recent commits with their graph lanes.
pub async fn graph(Query(q): Query<PathQuery>) -> Result<Json<serde_json::Value>, AppError> {
    let path = q.required()?;
    let commits = blocking(move || Ok(git_graph(&path, GRAPH_LIMIT)?)).await?;
    Ok(Json(serde_json::json!({ "commits": commits })))
}
