pub mod embed;
pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, RunBoard, RunRequest, Services, Slack, Snapshot, Stage, StageStatus};

/// Build the axum Router with all API routes and middleware.
/// Used by [`serve_on`] and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Run board
        .route("/api/state", get(routes::state::get_state))
        .route("/api/run", post(routes::run::start_run))
        .route("/api/send", post(routes::run::send))
        // Tasks
        .route("/api/tasks", post(routes::tasks::put_tasks))
        .route("/api/update-task", post(routes::tasks::update_task))
        .route("/api/refine", post(routes::tasks::refine))
        .route("/api/action", post(routes::tasks::action))
        .route("/api/chat", post(routes::chat::chat))
        // History
        .route("/api/load-history", get(routes::tasks::load_history))
        .route("/api/clear-tasks", post(routes::tasks::clear_tasks))
        // Settings
        .route(
            "/api/settings",
            get(routes::settings::get_settings).post(routes::settings::save_settings),
        )
        .route("/api/scan-users", post(routes::settings::scan))
        // Git
        .route("/api/recent-activity", get(routes::git::recent_activity))
        .route("/api/git-graph", get(routes::git::graph))
        .fallback(embed::static_handler)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Serve the Workspace on an already-bound listener.
pub async fn serve_on(
    app_state: AppState,
    listener: tokio::net::TcpListener,
    open_browser: bool,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(app_state);

    tracing::info!("md2slack workspace listening on http://localhost:{actual_port}");

    if open_browser {
        let url = format!("http://localhost:{actual_port}");
        let _ = open::that(&url);
    }

    axum::serve(listener, app).await?;
    Ok(())
}
