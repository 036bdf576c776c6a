use std::path::Path;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use md2slack_core::gitdiff::is_git_repo;
use md2slack_core::settings::{build_project_info, ensure_default_project_path, scan_users, Settings};
use serde::Deserialize;

use super::{blocking, parse_body};
use crate::error::AppError;
use crate::state::AppState;

/// `{settings, projects, current_project}` with the working directory's
/// repository folded into the project list.
fn settings_view(settings: &Settings, cwd: &Path) -> serde_json::Value {
    let current = if is_git_repo(cwd) {
        cwd.to_string_lossy().into_owned()
    } else {
        String::new()
    };
    serde_json::json!({
        "settings": settings,
        "projects": build_project_info(&settings.project_paths),
        "current_project": current,
    })
}

/// GET /api/settings
pub async fn get_settings(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let services = app.services.clone();
    let view = blocking(move || {
        let mut settings = Settings::load(&services.settings_path)?;
        let is_repo = is_git_repo(&services.cwd);
        let paths = ensure_default_project_path(&settings.project_paths, &services.cwd, is_repo);
        if paths != settings.project_paths {
            settings.project_paths = paths;
            if let Err(e) = settings.save(&services.settings_path) {
                tracing::warn!(error = %e, "saving default project failed");
            }
        }
        Ok(settings_view(&settings, &services.cwd))
    })
    .await?;
    Ok(Json(view))
}

#[derive(Deserialize)]
pub struct SettingsBody {
    #[serde(default)]
    pub project_paths: Vec<String>,
    #[serde(default)]
    pub usernames: Vec<String>,
}

/// POST /api/settings — replace both lists.
pub async fn save_settings(
    State(app): State<AppState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let body: SettingsBody = parse_body(&body)?;
    let services = app.services.clone();
    let view = blocking(move || {
        let is_repo = is_git_repo(&services.cwd);
        let settings = Settings {
            project_paths: ensure_default_project_path(&body.project_paths, &services.cwd, is_repo),
            usernames: body.usernames,
        }
        .normalized();
        settings.save(&services.settings_path)?;
        Ok(settings_view(&settings, &services.cwd))
    })
    .await?;
    Ok(Json(view))
}

#[derive(Deserialize)]
pub struct ScanBody {
    #[serde(default)]
    pub path: String,
}

/// POST /api/scan-users — author names found in a repository.
pub async fn scan(body: Bytes) -> Result<Json<serde_json::Value>, AppError> {
    let body: ScanBody = parse_body(&body)?;
    let path = body.path.trim().to_string();
    if path.is_empty() {
        return Err(AppError::bad_request("path is required"));
    }
    let usernames = blocking(move || Ok(scan_users(&path)?)).await?;
    Ok(Json(serde_json::json!({ "usernames": usernames })))
}
