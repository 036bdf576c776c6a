//! Task tools the synthesis loops hand to the model, and their execution
//! against an in-memory task list.

use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;

use md2slack_core::cast;
use md2slack_core::task::TaskChange;
use serde_json::{json, Value};

use crate::error::LlmError;
use crate::tool_parse::normalize_tool_params;
use crate::types::{ToolCall, ToolSpec};
use crate::Result;

pub const DEFAULT_CONTEXT_RESULTS: i64 = 20;

/// Names accepted by [`apply_tools`], aliases included.
pub const TASK_TOOL_NAMES: &[&str] = &[
    "create_task",
    "edit_task",
    "update_task",
    "delete_task",
    "remove_task",
    "add_details",
    "add_time",
    "add_commit_reference",
    "get_codebase_context",
];

// ---------------------------------------------------------------------------
// Specs
// ---------------------------------------------------------------------------

pub fn task_tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "create_task",
            description: "Create a new task summarized from commits or provided context.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "intent": {"type": "string", "description": "What was done"},
                    "scope": {"type": "string", "description": "Component or area"},
                    "type": {"type": "string", "enum": ["delivery", "fix", "chore", "refactor", "meeting"]},
                    "estimated_hours": {"type": "number", "description": "Time spent in hours"}
                },
                "required": ["intent"]
            }),
        },
        ToolSpec {
            name: "edit_task",
            description: "Edit an existing task by index.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "index": {"type": "integer"},
                    "intent": {"type": "string"},
                    "scope": {"type": "string"},
                    "estimated_hours": {"type": "number"}
                },
                "required": ["index"]
            }),
        },
        ToolSpec {
            name: "delete_task",
            description: "Delete a duplicate or invalid task by index.",
            parameters: json!({
                "type": "object",
                "properties": {"index": {"type": "integer"}},
                "required": ["index"]
            }),
        },
        ToolSpec {
            name: "add_details",
            description: "Append a technical detail explaining why the work mattered.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "index": {"type": "integer"},
                    "technical_why": {"type": "string"}
                },
                "required": ["index", "technical_why"]
            }),
        },
        ToolSpec {
            name: "add_time",
            description: "Add hours to a task's estimate.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "index": {"type": "integer"},
                    "hours": {"type": "number"}
                },
                "required": ["index", "hours"]
            }),
        },
        ToolSpec {
            name: "add_commit_reference",
            description: "Link one of the day's commits to a task.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "index": {"type": "integer"},
                    "hash": {"type": "string"}
                },
                "required": ["index", "hash"]
            }),
        },
        ToolSpec {
            name: "get_codebase_context",
            description: "Search the codebase for context using ripgrep.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "path": {"type": "string", "description": "Optional subdirectory to search"},
                    "max_results": {"type": "integer", "default": DEFAULT_CONTEXT_RESULTS}
                },
                "required": ["query"]
            }),
        },
    ]
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Result of one batch of tool calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutcome {
    pub tasks: Vec<TaskChange>,
    /// One line per call, `Success:`, `Error:` or `Context` prefixed.
    pub log: String,
    /// Status line of the last successful mutation.
    pub status: String,
}

/// Strings join array elements with newlines; everything else goes through
/// the lenient cast.
fn text(v: &Value) -> String {
    match v {
        Value::Array(items) => items.iter().map(cast::string).collect::<Vec<_>>().join("\n"),
        other => cast::string(other),
    }
}

fn index_in(v: &Value, len: usize) -> Option<usize> {
    cast::int(v)
        .and_then(|i| usize::try_from(i).ok())
        .filter(|&i| i < len)
}

fn current_max(tasks: &[TaskChange]) -> i64 {
    tasks.len() as i64 - 1
}

fn hours(h: f64) -> String {
    if h.fract() == 0.0 {
        format!("{h:.0}")
    } else {
        h.to_string()
    }
}

/// Apply `calls` to `tasks` in order.
///
/// Commit references are only accepted for hashes in `allowed`; with no
/// list every reference is rejected. Codebase searches run under
/// `search_root`.
pub fn apply_tools(
    calls: &[ToolCall],
    mut tasks: Vec<TaskChange>,
    allowed: Option<&BTreeSet<String>>,
    search_root: &Path,
) -> ToolOutcome {
    let mut logs: Vec<String> = Vec::new();
    let mut status = String::new();

    for call in calls {
        let tool = call.tool.trim().to_ascii_lowercase();
        let params = normalize_tool_params(&tool, call.parameters.clone());
        let get = |k: &str| params.get(k).unwrap_or(&Value::Null);
        let out_of_bounds = |tasks: &[TaskChange]| {
            format!(
                "Error: index {} is out of bounds (current max: {})",
                get("index"),
                current_max(tasks)
            )
        };

        match tool.as_str() {
            "create_task" => {
                let intent = text(get("intent"));
                if intent.is_empty() {
                    logs.push("Error: attempt to create task with empty intent".into());
                    continue;
                }
                let mut task = TaskChange::new(text(get("type")), intent.clone());
                if task.task_type.is_empty() {
                    task.task_type = "delivery".into();
                }
                task.title = text(get("title"));
                task.details = text(get("details"));
                task.scope = text(get("scope"));
                task.estimated_hours = cast::float(get("estimated_hours"));
                tasks.push(task);
                let idx = tasks.len() - 1;
                logs.push(format!("Success: created task with index {idx}"));
                status = format!("Created task #{idx}: {intent}");
            }

            "edit_task" | "update_task" => {
                let Some(idx) = index_in(get("index"), tasks.len()) else {
                    logs.push(out_of_bounds(&tasks));
                    continue;
                };
                let task = &mut tasks[idx];
                for (key, field) in [
                    ("intent", &mut task.task_intent),
                    ("title", &mut task.title),
                    ("details", &mut task.details),
                    ("scope", &mut task.scope),
                    ("type", &mut task.task_type),
                ] {
                    let value = text(get(key));
                    if !value.is_empty() {
                        *field = value;
                    }
                }
                if let Some(h) = cast::float(get("estimated_hours")) {
                    task.estimated_hours = Some(h);
                }
                logs.push(format!("Success: edited task {idx}"));
                status = format!("Edited task #{idx}");
            }

            "delete_task" | "remove_task" => {
                let Some(idx) = index_in(get("index"), tasks.len()) else {
                    logs.push(format!("Error: index {} is out of bounds", get("index")));
                    continue;
                };
                let removed = tasks.remove(idx);
                logs.push(format!("Success: deleted task {idx}"));
                status = format!("Deleted task #{idx}: {}", removed.task_intent);
            }

            "add_details" => {
                let Some(idx) = index_in(get("index"), tasks.len()) else {
                    logs.push(out_of_bounds(&tasks));
                    continue;
                };
                let mut detail = text(get("technical_why"));
                if detail.is_empty() {
                    detail = text(get("details"));
                }
                if detail.is_empty() || detail.contains("...") {
                    continue;
                }
                let why = &mut tasks[idx].technical_why;
                if why.is_empty() {
                    *why = detail;
                } else if !why.contains(&detail) {
                    why.push('\n');
                    why.push_str(&detail);
                }
                logs.push(format!("Success: added detail to task {idx}"));
                status = format!("Updated details for task #{idx}");
            }

            "add_time" => {
                let Some(idx) = index_in(get("index"), tasks.len()) else {
                    logs.push(out_of_bounds(&tasks));
                    continue;
                };
                let Some(h) = cast::float(get("hours")) else {
                    continue;
                };
                let task = &mut tasks[idx];
                task.estimated_hours = Some(task.estimated_hours.unwrap_or(0.0) + h);
                logs.push(format!("Success: added {} hours to task {idx}", hours(h)));
                status = format!("Updated time for task #{idx}");
            }

            "add_commit_reference" => {
                let Some(idx) = index_in(get("index"), tasks.len()) else {
                    logs.push(out_of_bounds(&tasks));
                    continue;
                };
                let hash = text(get("hash"));
                if hash.is_empty() {
                    continue;
                }
                match allowed {
                    Some(list) if !list.is_empty() => {
                        if !list.contains(&hash) {
                            logs.push(format!("Error: commit {hash} is not a valid Phase 1 commit"));
                            continue;
                        }
                    }
                    _ => {
                        logs.push(format!(
                            "Error: commit {hash} is not a valid Phase 1 commit (no allowed list available)"
                        ));
                        continue;
                    }
                }
                let commits = &mut tasks[idx].commits;
                if !commits.contains(&hash) {
                    commits.push(hash.clone());
                }
                logs.push(format!("Success: added commit {hash} to task {idx}"));
                status = format!("Linked commit {hash} to task #{idx}");
            }

            "get_codebase_context" => {
                let query = text(get("query"));
                if query.is_empty() {
                    logs.push("Error: get_codebase_context requires non-empty query".into());
                    continue;
                }
                let max = cast::int(get("max_results"))
                    .filter(|&n| n > 0)
                    .unwrap_or(DEFAULT_CONTEXT_RESULTS);
                match codebase_context(search_root, &query, &text(get("path")), max) {
                    Err(e) => logs.push(format!("Error: get_codebase_context failed: {e}")),
                    Ok(out) if out.is_empty() => {
                        logs.push(format!("Context: no matches for query {query:?}"))
                    }
                    Ok(out) => logs.push(format!("Context (query {query:?}):\n{out}")),
                }
            }

            other => tracing::debug!(tool = other, "ignoring unknown tool call"),
        }
    }

    ToolOutcome {
        tasks,
        log: logs.join("\n"),
        status,
    }
}

/// Search `root` with ripgrep. No matches is an empty string, not an error.
pub fn codebase_context(root: &Path, query: &str, path: &str, max_results: i64) -> Result<String> {
    let mut path = if path.trim().is_empty() {
        ".".to_string()
    } else {
        path.trim().to_string()
    };
    if !path.starts_with('.') && !path.starts_with('/') {
        path = format!("./{path}");
    }
    if let Err(e) = std::fs::metadata(root.join(&path)) {
        return Err(LlmError::Tool(format!("invalid path {path:?}: {e}")));
    }

    let rg = which::which("rg").map_err(|e| LlmError::Tool(format!("rg not available: {e}")))?;
    let output = Command::new(rg)
        .args(["--no-heading", "--line-number", "--max-count"])
        .arg(max_results.to_string())
        .arg(query)
        .arg(&path)
        .current_dir(root)
        .output()
        .map_err(|e| LlmError::Tool(e.to_string()))?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    match output.status.code() {
        Some(0) => Ok(combined.trim().to_string()),
        Some(1) => Ok(String::new()),
        code => Err(LlmError::Tool(format!(
            "rg error (exit {}): {}",
            code.unwrap_or(-1),
            combined.trim()
        ))),
    }
}

/// The `Error:` and `CRITICAL:` lines of a tool log.
pub fn tool_error_summary(log: &str) -> String {
    log.lines()
        .filter(|l| l.contains("Error:") || l.contains("CRITICAL:"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Allowed hashes for prompts: comma separated, or `(none)`.
pub fn commit_list_text(allowed: Option<&BTreeSet<String>>) -> String {
    match allowed {
        Some(list) if !list.is_empty() => list.iter().cloned().collect::<Vec<_>>().join(", "),
        _ => "(none)".to_string(),
    }
}
