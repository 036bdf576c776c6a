use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use md2slack_llm::{chat_with_tools, ChatMessage, LlmError, TaskTools};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::parse_body;
use crate::error::AppError;
use crate::state::{AppState, UNKNOWN_REPO};

#[derive(Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

/// Tool parameters and results are JSON when they parse, text otherwise.
fn json_or_text(s: &str) -> Value {
    serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string()))
}

fn event(name: &str, data: Value) -> Result<Event, Infallible> {
    Ok(Event::default().event(name).data(data.to_string()))
}

/// POST /api/chat — one chat turn over SSE.
///
/// Emits `tool_start` and `tool_end` around every tool call, then either
/// `message {text, tasks}` followed by `done`, or a single `error`.
pub async fn chat(State(app): State<AppState>, body: Bytes) -> Result<impl IntoResponse, AppError> {
    let Some(llm) = app.services.llm.clone() else {
        return Err(AppError::not_implemented("chat handler not implemented"));
    };
    let body: ChatBody = parse_body(&body)?;

    let (tx, rx) = mpsc::unbounded_channel::<Result<Event, Infallible>>();

    // Keep the board's log sinks and add the SSE tool hooks.
    let start_tx = tx.clone();
    let end_tx = tx.clone();
    let mut callbacks = llm.callbacks().clone();
    callbacks.on_tool_start = Some(Arc::new(move |tool: &str, params: &str| {
        let _ = start_tx.send(event(
            "tool_start",
            json!({ "tool": tool, "params": json_or_text(params) }),
        ));
    }));
    callbacks.on_tool_end = Some(Arc::new(move |tool: &str, result: &str| {
        let _ = end_tx.send(event(
            "tool_end",
            json!({ "tool": tool, "result": json_or_text(result) }),
        ));
    }));
    let llm = llm.with_callbacks(callbacks);

    tokio::spawn(async move {
        let (repo, date) = app.board.scope();
        let repo = if repo.is_empty() {
            UNKNOWN_REPO.to_string()
        } else {
            repo
        };
        let tasks = app.board.tasks();
        let store = Arc::clone(&app.services.store);
        let opened = tokio::task::spawn_blocking(move || TaskTools::new(store, repo, date, &tasks))
            .await
            .map_err(|e| LlmError::Tool(format!("task join error: {e}")));
        let reply = match opened {
            Ok(Ok(tools)) => chat_with_tools(&llm, &body.history, tools).await,
            Ok(Err(e)) | Err(e) => Err(e),
        };
        match reply {
            Ok(reply) => {
                let tasks = reply.tasks;
                app.board.set_tasks(tasks.clone(), app.board.next_actions());
                app.save(tasks.clone()).await;
                let _ = tx.send(event("message", json!({ "text": reply.text, "tasks": tasks })));
                let _ = tx.send(event("done", json!({ "status": "complete" })));
            }
            Err(e) => {
                tracing::warn!(error = %e, "chat turn failed");
                let _ = tx.send(event("error", json!({ "message": e.to_string() })));
            }
        }
    });

    Ok(Sse::new(UnboundedReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}
