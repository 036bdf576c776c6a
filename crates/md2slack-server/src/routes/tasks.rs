use std::path::Path;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use md2slack_core::gitdiff::repo_name_at;
use md2slack_core::task::TaskChange;
use md2slack_llm::pipeline::{edit_tasks_with_action, refine_tasks_with_prompt};
use serde::Deserialize;

use super::{blocking, parse_body};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct TasksBody {
    #[serde(default)]
    pub tasks: Vec<TaskChange>,
}

/// POST /api/tasks — replace the task list wholesale.
pub async fn put_tasks(State(app): State<AppState>, body: Bytes) -> Result<StatusCode, AppError> {
    let body: TasksBody = parse_body(&body)?;
    app.board.set_tasks(body.tasks.clone(), app.board.next_actions());
    app.save(body.tasks).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct UpdateTaskBody {
    pub index: i64,
    pub task: TaskChange,
}

/// POST /api/update-task — overwrite the task at `index`.
pub async fn update_task(
    State(app): State<AppState>,
    body: Bytes,
) -> Result<Json<Vec<TaskChange>>, AppError> {
    let body: UpdateTaskBody = parse_body(&body)?;
    let mut tasks = app.board.tasks();
    let slot = usize::try_from(body.index)
        .ok()
        .and_then(|i| tasks.get_mut(i))
        .ok_or_else(|| AppError::bad_request("index out of bounds"))?;
    *slot = body.task;
    app.board.set_tasks(tasks.clone(), app.board.next_actions());
    app.save(tasks.clone()).await;
    Ok(Json(tasks))
}

#[derive(Deserialize)]
pub struct RefineBody {
    #[serde(default)]
    pub prompt: String,
}

/// POST /api/refine — rewrite the list following a free-form request.
pub async fn refine(State(app): State<AppState>, body: Bytes) -> Result<StatusCode, AppError> {
    let Some(llm) = app.services.llm.as_ref() else {
        return Err(AppError::bad_request("refine not configured"));
    };
    let body: RefineBody = parse_body(&body)?;
    let tasks = refine_tasks_with_prompt(llm, app.board.tasks(), &body.prompt).await;
    app.board.set_tasks(tasks.clone(), app.board.next_actions());
    app.save(tasks).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct ActionBody {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub selected: Vec<i64>,
}

/// POST /api/action — run a named edit over the selected tasks.
pub async fn action(
    State(app): State<AppState>,
    body: Bytes,
) -> Result<Json<Vec<TaskChange>>, AppError> {
    let Some(llm) = app.services.llm.as_ref() else {
        return Err(AppError::bad_request("action not configured"));
    };
    let body: ActionBody = parse_body(&body)?;
    let action = body.action.trim();
    if action.is_empty() || body.selected.is_empty() {
        return Err(AppError::bad_request("action and selected are required"));
    }
    let tasks = app.board.tasks();
    if body
        .selected
        .iter()
        .any(|&i| usize::try_from(i).map_or(true, |i| i >= tasks.len()))
    {
        return Err(AppError::bad_request("selected index out of range"));
    }

    let updated = edit_tasks_with_action(llm, tasks, action, &body.selected).await?;
    app.board.set_tasks(updated.clone(), app.board.next_actions());
    app.save(updated.clone()).await;
    Ok(Json(updated))
}

#[derive(Deserialize)]
pub struct DayQuery {
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub date: String,
}

/// GET /api/load-history — show a saved day. The live task list wins over
/// the one frozen in the history record.
pub async fn load_history(
    State(app): State<AppState>,
    Query(q): Query<DayQuery>,
) -> Result<Json<Vec<TaskChange>>, AppError> {
    let (repo, date) = (q.repo.trim().to_string(), q.date.trim().to_string());
    if repo.is_empty() || date.is_empty() {
        return Err(AppError::bad_request("repo and date are required"));
    }

    let store = Arc::clone(&app.services.store);
    let day = date.clone();
    let (repo_name, tasks, report) = blocking(move || {
        let repo_name = repo_name_at(Path::new(&repo));
        let Some(record) = store.load_history(&repo_name, &day)? else {
            return Ok((repo_name, Vec::new(), String::new()));
        };
        let mut tasks = store.load_tasks(&repo_name, &day)?;
        if tasks.is_empty() {
            tasks = record.tasks;
        }
        Ok((repo_name, tasks, record.report))
    })
    .await?;

    tracing::debug!(repo = %repo_name, date = %date, tasks = tasks.len(), "loaded history");
    app.board.load_history(&repo_name, &date, tasks.clone(), &report);
    Ok(Json(tasks))
}

/// POST /api/clear-tasks — drop the stored task list for a day.
pub async fn clear_tasks(
    State(app): State<AppState>,
    Query(q): Query<DayQuery>,
) -> Result<StatusCode, AppError> {
    let (repo, date) = (q.repo.trim().to_string(), q.date.trim().to_string());
    if repo.is_empty() || date.is_empty() {
        return Err(AppError::bad_request("repo and date are required"));
    }
    let store = Arc::clone(&app.services.store);
    blocking(move || {
        let repo_name = repo_name_at(Path::new(&repo));
        store.delete_all_tasks(&repo_name, &date)?;
        Ok(())
    })
    .await?;
    app.board.clear_tasks();
    Ok(StatusCode::NO_CONTENT)
}
