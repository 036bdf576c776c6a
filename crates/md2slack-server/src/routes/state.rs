use axum::extract::State;
use axum::Json;

use crate::state::{AppState, Snapshot};

/// GET /api/state — the run board as the Workspace polls it.
pub async fn get_state(State(app): State<AppState>) -> Json<Snapshot> {
    Json(app.board.snapshot())
}
